//! Mock push registrars.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use push_core::{PushRegistrar, RegistrationOutcome};
use tokio::time::sleep;

/// A registrar that returns a fixed outcome and records each call.
#[derive(Debug)]
pub struct MockRegistrar {
    outcome: Mutex<RegistrationOutcome>,
    sender_ids: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
}

impl MockRegistrar {
    /// A registrar that always hands out `token`.
    pub fn succeeding(token: impl Into<String>) -> Self {
        Self::with_outcome(RegistrationOutcome::success(token))
    }

    /// A registrar that always fails with `status`.
    pub fn failing(status: i32) -> Self {
        Self::with_outcome(RegistrationOutcome::failure(status))
    }

    pub fn with_outcome(outcome: RegistrationOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            sender_ids: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the outcome returned by later calls.
    pub fn set_outcome(&self, outcome: RegistrationOutcome) {
        if let Ok(mut current) = self.outcome.lock() {
            *current = outcome;
        }
    }

    /// Number of registration attempts.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sender ids passed to each attempt, in order.
    pub fn sender_ids(&self) -> Vec<Option<String>> {
        self.sender_ids.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushRegistrar for MockRegistrar {
    async fn register(&self, sender_id: Option<&str>) -> RegistrationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut ids) = self.sender_ids.lock() {
            ids.push(sender_id.map(str::to_string));
        }
        self.outcome
            .lock()
            .map(|outcome| outcome.clone())
            .unwrap_or_else(|_| RegistrationOutcome::failure(-1))
    }

    fn name(&self) -> &str {
        "MockRegistrar"
    }
}

/// A registrar that wraps another registrar and adds artificial delay.
///
/// Useful with a paused clock to control completion order.
pub struct DelayedRegistrar<R: PushRegistrar> {
    inner: R,
    delay: Duration,
}

impl<R: PushRegistrar> DelayedRegistrar<R> {
    pub fn new(inner: R, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// Create a registrar with a delay in milliseconds.
    pub fn with_millis(inner: R, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    /// Get a reference to the wrapped registrar.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: PushRegistrar> PushRegistrar for DelayedRegistrar<R> {
    async fn register(&self, sender_id: Option<&str>) -> RegistrationOutcome {
        sleep(self.delay).await;
        self.inner.register(sender_id).await
    }

    fn name(&self) -> &str {
        "DelayedRegistrar"
    }
}
