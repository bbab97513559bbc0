//! Terminal outcome of one gateway call, and the guard that makes it
//! single-assignment.
//!
//! Three independent paths can try to finish a request: the reply arriving,
//! the deadline firing, and a broker step failing. [`OutcomeSlot`] is the
//! single authority for "has this call already produced an outcome" —
//! whichever path reaches it first wins, and every later attempt is a
//! no-op. The slot is owned exclusively by the one task handling the
//! request, so no locking is involved.

use crate::envelope::ReplyEnvelope;

/// How a call terminated, for HTTP status mapping at the edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeKind {
    /// A correlated reply arrived in time.
    Success,
    /// The deadline elapsed before a reply arrived.
    TimedOut,
    /// Connecting, declaring, publishing, consuming, or decoding failed.
    UpstreamFailed,
}

/// The committed result of one call: a kind plus the reply envelope the
/// caller receives as the response body.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// Terminal classification.
    pub kind: OutcomeKind,
    /// Body returned to the caller.
    pub reply: ReplyEnvelope,
}

impl Outcome {
    /// A reply-driven success.
    #[must_use]
    pub const fn success(reply: ReplyEnvelope) -> Self {
        Self {
            kind: OutcomeKind::Success,
            reply,
        }
    }

    /// A deadline-driven failure.
    #[must_use]
    pub fn timed_out(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::TimedOut,
            reply: ReplyEnvelope::failure(request_id, message),
        }
    }

    /// A broker-error-driven failure.
    #[must_use]
    pub fn upstream_failed(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::UpstreamFailed,
            reply: ReplyEnvelope::failure(request_id, message),
        }
    }
}

/// Single point of truth for whether a call has already terminated.
#[derive(Debug, Default)]
pub struct OutcomeSlot {
    committed: Option<Outcome>,
    error_logged: bool,
}

impl OutcomeSlot {
    /// An empty slot for a fresh call.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            committed: None,
            error_logged: false,
        }
    }

    /// Commit an outcome if none has been committed yet.
    ///
    /// Returns `true` for the first caller; later callers get `false` and
    /// must not mutate the outward response.
    pub fn try_commit(&mut self, outcome: Outcome) -> bool {
        if self.committed.is_some() {
            return false;
        }
        self.committed = Some(outcome);
        true
    }

    /// Whether an outcome has been committed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.committed.is_some()
    }

    /// Whether a non-success outcome has been committed. Early-exit check
    /// for paths that would otherwise do work only to be discarded.
    #[must_use]
    pub fn already_failed(&self) -> bool {
        self.committed
            .as_ref()
            .is_some_and(|o| o.kind != OutcomeKind::Success)
    }

    /// Claim the right to log this call's failure.
    ///
    /// Returns `true` exactly once so a single failure is not reported
    /// twice across the timeout, error, and boundary paths.
    pub fn mark_error_logged(&mut self) -> bool {
        if self.error_logged {
            return false;
        }
        self.error_logged = true;
        true
    }

    /// Consume the slot, yielding the committed outcome if any.
    #[must_use]
    pub fn into_outcome(self) -> Option<Outcome> {
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_commit_wins() {
        let mut slot = OutcomeSlot::new();
        let success = Outcome::success(ReplyEnvelope::success("R1", json!({"ok": true})));
        assert!(slot.try_commit(success.clone()));
        assert!(!slot.try_commit(Outcome::timed_out("R1", "request timed out after 50ms")));
        assert_eq!(slot.into_outcome(), Some(success));
    }

    #[test]
    fn test_timeout_then_reply_is_a_noop() {
        let mut slot = OutcomeSlot::new();
        assert!(slot.try_commit(Outcome::timed_out("R1", "request timed out after 50ms")));
        assert!(slot.already_failed());
        let late = Outcome::success(ReplyEnvelope::success("R1", json!({"late": true})));
        assert!(!slot.try_commit(late));
        let outcome = slot.into_outcome().unwrap_or_else(|| unreachable!());
        assert_eq!(outcome.kind, OutcomeKind::TimedOut);
    }

    #[test]
    fn test_success_is_not_a_failure() {
        let mut slot = OutcomeSlot::new();
        slot.try_commit(Outcome::success(ReplyEnvelope::success("R1", json!(1))));
        assert!(slot.is_terminal());
        assert!(!slot.already_failed());
    }

    #[test]
    fn test_error_logging_is_claimed_once() {
        let mut slot = OutcomeSlot::new();
        assert!(slot.mark_error_logged());
        assert!(!slot.mark_error_logged());
    }

    #[test]
    fn test_empty_slot_is_not_terminal() {
        let slot = OutcomeSlot::new();
        assert!(!slot.is_terminal());
        assert!(!slot.already_failed());
        assert_eq!(slot.into_outcome(), None);
    }
}
