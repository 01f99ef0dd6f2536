//! Observable state of the current (or last) session.

/// Macro-state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed,
}

/// What the presentation layer sees.
///
/// Transitions:
/// ```text
/// idle ──begin──▶ streaming ──complete──▶ completed
///                     │     ──fail──────▶ failed
///                     └─────cancel──────▶ idle
/// ```
/// `completed` and `failed` stay put until the next `begin`. Invariants:
/// an error implies not streaming, and streaming implies no terminal event
/// has been seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    phase: Phase,
    status_text: String,
    error_text: Option<String>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    /// Start a new request, clearing any previous result or error.
    pub fn begin(&mut self, status_text: impl Into<String>) {
        self.phase = Phase::Streaming;
        self.status_text = status_text.into();
        self.error_text = None;
    }

    /// Replace the status text. Returns whether anything changed.
    pub fn set_status_text(&mut self, status_text: &str) -> bool {
        if !self.is_streaming() || self.status_text == status_text {
            return false;
        }
        self.status_text = status_text.to_string();
        true
    }

    pub fn complete(&mut self) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.phase = Phase::Completed;
        self.status_text.clear();
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.phase = Phase::Failed;
        self.status_text.clear();
        self.error_text = Some(error.into());
        true
    }

    /// Back to idle without an error. No-op unless streaming.
    pub fn cancel(&mut self) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.phase = Phase::Idle;
        self.status_text.clear();
        true
    }

    /// Dismiss a displayed error, returning to idle.
    pub fn clear_error(&mut self) -> bool {
        if self.phase != Phase::Failed {
            return false;
        }
        self.phase = Phase::Idle;
        self.error_text = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(status: &SessionStatus) {
        if status.error_text().is_some() {
            assert!(!status.is_streaming());
        }
    }

    #[test]
    fn test_begin_then_complete() {
        let mut status = SessionStatus::idle();
        status.begin("Processing");
        assert!(status.is_streaming());
        assert_eq!(status.status_text(), "Processing");

        assert!(status.set_status_text("Searching"));
        assert!(!status.set_status_text("Searching"));
        assert!(status.complete());
        assert_eq!(status.phase(), Phase::Completed);
        assert_eq!(status.status_text(), "");
        assert_invariants(&status);
    }

    #[test]
    fn test_fail_sets_error_and_stops_streaming() {
        let mut status = SessionStatus::idle();
        status.begin("Processing");
        assert!(status.fail("HTTP error: status 500"));
        assert_eq!(status.phase(), Phase::Failed);
        assert_eq!(status.error_text(), Some("HTTP error: status 500"));
        assert_invariants(&status);

        // A failed status does not reset by itself.
        assert!(!status.cancel());
        assert!(!status.set_status_text("late"));
        assert_eq!(status.phase(), Phase::Failed);

        status.begin("again");
        assert!(status.error_text().is_none());
    }

    #[test]
    fn test_cancel_returns_to_idle_without_error() {
        let mut status = SessionStatus::idle();
        status.begin("Processing");
        assert!(status.cancel());
        assert_eq!(status.phase(), Phase::Idle);
        assert!(status.error_text().is_none());
        assert!(!status.cancel());
    }

    #[test]
    fn test_terminal_transitions_require_streaming() {
        let mut status = SessionStatus::idle();
        assert!(!status.complete());
        assert!(!status.fail("x"));
        assert_eq!(status, SessionStatus::idle());
    }

    #[test]
    fn test_clear_error() {
        let mut status = SessionStatus::idle();
        status.begin("x");
        status.fail("oops");
        assert!(status.clear_error());
        assert_eq!(status, SessionStatus::idle());
    }
}
