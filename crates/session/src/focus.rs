//! Foreground time and session boundary tracking.

use std::time::Duration;

use tokio::time::Instant;

/// Longest single foreground stretch that is counted, in seconds.
const MAX_FOCUS_SECS: i64 = 86_400;

/// Last session time used before any session was recorded, so the first
/// focus always counts as a new session.
pub const INITIAL_LAST_SESSION_MS: i64 = -31_000;

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What to do after the app lost focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusReport {
    /// Nothing was tracked (no focus start, or an implausible duration).
    Ignored,
    /// Active time was saved for a later report.
    Saved { unsent_secs: i64 },
    /// Enough active time accumulated; report it with `on_focus`.
    Send { active_secs: i64 },
}

/// Tracks foreground state, unsent active time, and session boundaries.
#[derive(Debug, Clone)]
pub struct FocusTracker {
    foreground: bool,
    last_tracked: Option<Instant>,
    unsent_active_secs: i64,
    last_session_ms: i64,
    session_threshold: Duration,
    min_report: Duration,
}

impl FocusTracker {
    pub fn new(session_threshold: Duration, min_report: Duration) -> Self {
        Self {
            foreground: false,
            last_tracked: None,
            unsent_active_secs: 0,
            last_session_ms: INITIAL_LAST_SESSION_MS,
            session_threshold,
            min_report,
        }
    }

    /// Restore persisted counters.
    pub fn with_saved(mut self, unsent_active_secs: i64, last_session_ms: i64) -> Self {
        self.unsent_active_secs = unsent_active_secs.max(0);
        self.last_session_ms = last_session_ms;
        self
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    pub fn unsent_active_secs(&self) -> i64 {
        self.unsent_active_secs
    }

    pub fn last_session_ms(&self) -> i64 {
        self.last_session_ms
    }

    /// Whether enough time passed since the last session to start a new one.
    pub fn is_new_session(&self, now_ms: i64) -> bool {
        let elapsed_secs = (now_ms - self.last_session_ms) / 1000;
        elapsed_secs >= self.session_threshold.as_secs() as i64
    }

    /// Mark the app foregrounded.
    ///
    /// Returns whether this starts a new session. The last session time is
    /// moved to `now_ms` either way.
    pub fn on_focus(&mut self, now: Instant, now_ms: i64) -> bool {
        self.foreground = true;
        self.last_tracked = Some(now);
        let new_session = self.is_new_session(now_ms);
        self.last_session_ms = now_ms;
        new_session
    }

    /// Start tracking without changing session state (SDK start).
    pub fn start_tracking(&mut self, now: Instant, foreground: bool) {
        self.foreground = foreground;
        self.last_tracked = Some(now);
    }

    /// Mark the app backgrounded and decide whether to report active time.
    pub fn on_lost_focus(&mut self, now: Instant, now_ms: i64, only_save: bool, has_user: bool) -> FocusReport {
        self.foreground = false;

        let Some(started) = self.last_tracked.replace(now) else {
            return FocusReport::Ignored;
        };

        let elapsed = now.saturating_duration_since(started).as_secs_f64().round() as i64;
        if !(0..=MAX_FOCUS_SECS).contains(&elapsed) {
            return FocusReport::Ignored;
        }

        self.last_session_ms = now_ms;
        let total = self.unsent_active_secs + elapsed;

        if only_save || total < self.min_report.as_secs() as i64 || !has_user {
            self.unsent_active_secs = total;
            return FocusReport::Saved { unsent_secs: total };
        }

        FocusReport::Send { active_secs: total }
    }

    /// The `on_focus` report was accepted.
    pub fn report_sent(&mut self) {
        self.unsent_active_secs = 0;
    }

    /// The `on_focus` report failed; keep the time for next time.
    pub fn report_failed(&mut self, active_secs: i64) {
        self.unsent_active_secs = active_secs;
    }

    /// A state sync succeeded at `now_ms`.
    pub fn record_session(&mut self, now_ms: i64) {
        self.last_session_ms = now_ms;
    }
}
