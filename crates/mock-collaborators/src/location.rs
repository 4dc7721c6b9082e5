//! Mock location provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use push_core::{Location, LocationProvider};
use tokio::time::sleep;

/// Returns a fixed location (or none) after an optional delay.
#[derive(Debug, Default)]
pub struct MockLocation {
    location: Option<Location>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockLocation {
    /// A provider that always has a fix.
    pub fn at(lat: f64, long: f64) -> Self {
        Self {
            location: Some(Location {
                lat,
                long,
                accuracy: Some(10.0),
                kind: Some(1),
            }),
            ..Default::default()
        }
    }

    /// A provider that never produces a fix.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Delay each answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of location requests.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for MockLocation {
    async fn location(&self, _prompt: bool) -> Option<Location> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.location
    }
}
