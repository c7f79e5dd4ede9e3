//! Busy-state machine: three independent signals, one derived flag.

use tern_ai::ToolCallStatus;

/// Effects a transition asks the owner to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    /// Clear the progress indicator (and any held progress update)
    pub clear_progress: bool,
    /// Busy flag before the transition
    pub was_busy: bool,
    /// Busy flag after the transition
    pub is_busy: bool,
}

impl Transition {
    /// Whether the derived busy flag changed
    pub fn busy_changed(&self) -> bool {
        self.was_busy != self.is_busy
    }
}

/// The independent signals behind "is the agent busy".
///
/// `busy` is never stored; it is derived from the three flags on every read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyState {
    /// A request was sent and nothing has started streaming for it yet,
    /// or a follow-up model turn is expected after tools completed
    pub awaiting_first_response: bool,
    /// The model output stream is open
    pub stream_active: bool,
    /// At least one tool in the latest batch is pending, executing or confirming
    pub tool_active: bool,
}

impl BusyState {
    pub fn busy(&self) -> bool {
        self.awaiting_first_response || self.stream_active || self.tool_active
    }

    /// A request was dispatched
    pub fn on_send(&mut self) -> Transition {
        self.apply(|s| {
            s.awaiting_first_response = true;
            false
        })
    }

    pub fn on_start(&mut self) -> Transition {
        self.apply(|s| {
            s.stream_active = true;
            s.awaiting_first_response = false;
            false
        })
    }

    /// The stream closed. While tools are still active the backend will
    /// re-enter the model loop, so the awaiting flag is left alone.
    pub fn on_finish(&mut self) -> Transition {
        self.apply(|s| {
            s.stream_active = false;
            if s.tool_active {
                false
            } else {
                s.awaiting_first_response = false;
                true
            }
        })
    }

    /// Recompute tool activity from the latest batch.
    ///
    /// A batch that goes inactive while still listing tools means results are
    /// on their way back to the model: expect a follow-up turn. An empty batch
    /// means there is nothing left to track.
    pub fn on_tool_batch(&mut self, tools: &[ToolCallStatus]) -> Transition {
        self.apply(|s| {
            let was_active = s.tool_active;
            s.tool_active = tools.iter().any(|t| t.status.is_active());
            if was_active && !s.tool_active {
                s.awaiting_first_response = !tools.is_empty();
            }
            false
        })
    }

    pub fn on_error(&mut self) -> Transition {
        self.apply(|s| {
            s.awaiting_first_response = false;
            s.stream_active = false;
            true
        })
    }

    /// A replaced request finished or failed. Its stream is gone, but the
    /// awaiting flag and progress belong to the request that replaced it.
    pub fn on_superseded_end(&mut self) -> Transition {
        self.apply(|s| {
            s.stream_active = false;
            false
        })
    }

    /// Explicit cancel: everything off, whatever the backend says
    pub fn reset(&mut self) -> Transition {
        self.apply(|s| {
            *s = BusyState::default();
            true
        })
    }

    fn apply(&mut self, f: impl FnOnce(&mut Self) -> bool) -> Transition {
        let was_busy = self.busy();
        let clear_progress = f(self);
        Transition {
            clear_progress,
            was_busy,
            is_busy: self.busy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ai::ToolStatus;

    fn tool(status: ToolStatus) -> ToolCallStatus {
        ToolCallStatus::new("t1", "shell", status)
    }

    #[test]
    fn test_initial_state_idle() {
        let s = BusyState::default();
        assert!(!s.busy());
    }

    #[test]
    fn test_send_start_finish_round_trip() {
        let mut s = BusyState::default();
        assert!(s.on_send().is_busy);
        let t = s.on_start();
        assert!(t.is_busy);
        assert!(!s.awaiting_first_response);
        let t = s.on_finish();
        assert!(!t.is_busy);
        assert!(t.clear_progress);
        assert!(t.busy_changed());
    }

    #[test]
    fn test_finish_with_active_tools_keeps_busy() {
        let mut s = BusyState::default();
        s.on_send();
        s.on_tool_batch(&[tool(ToolStatus::Executing)]);
        let t = s.on_finish();
        assert!(t.is_busy);
        assert!(!t.clear_progress);
        assert!(s.awaiting_first_response);
    }

    #[test]
    fn test_tool_batch_goes_inactive_expects_follow_up() {
        let mut s = BusyState::default();
        s.on_start();
        s.on_tool_batch(&[tool(ToolStatus::Executing)]);
        s.on_finish();
        let t = s.on_tool_batch(&[tool(ToolStatus::Done)]);
        assert!(t.is_busy);
        assert!(s.awaiting_first_response);
        assert!(!s.tool_active);

        // Follow-up model turn
        s.on_start();
        let t = s.on_finish();
        assert!(!t.is_busy);
    }

    #[test]
    fn test_empty_batch_after_active_clears() {
        let mut s = BusyState::default();
        s.on_send();
        assert!(s.on_tool_batch(&[tool(ToolStatus::Executing)]).is_busy);
        assert!(s.on_finish().is_busy);
        let t = s.on_tool_batch(&[]);
        assert!(!t.is_busy);
    }

    #[test]
    fn test_inactive_batch_without_prior_activity_is_noop() {
        let mut s = BusyState::default();
        let t = s.on_tool_batch(&[tool(ToolStatus::Done)]);
        assert!(!t.is_busy);
        assert!(!s.awaiting_first_response);
    }

    #[test]
    fn test_confirming_counts_as_active() {
        let mut s = BusyState::default();
        assert!(s.on_tool_batch(&[tool(ToolStatus::Confirming)]).is_busy);
        assert!(s.on_tool_batch(&[tool(ToolStatus::Pending)]).is_busy);
    }

    #[test]
    fn test_error_collapses_unless_tools_active() {
        let mut s = BusyState::default();
        s.on_send();
        s.on_start();
        assert!(!s.on_error().is_busy);

        let mut s = BusyState::default();
        s.on_send();
        s.on_tool_batch(&[tool(ToolStatus::Executing)]);
        assert!(s.on_error().is_busy);
    }

    #[test]
    fn test_superseded_end_keeps_awaiting() {
        let mut s = BusyState::default();
        s.on_send();
        s.on_start();
        // Replacement request dispatched before the old stream closed
        s.on_send();
        let t = s.on_superseded_end();
        assert!(t.is_busy);
        assert!(!t.busy_changed());
        assert!(!t.clear_progress);
        assert!(s.awaiting_first_response);
        assert!(!s.stream_active);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut s = BusyState::default();
        s.on_send();
        s.on_start();
        s.on_tool_batch(&[tool(ToolStatus::Executing)]);
        let first = s.reset();
        let after_first = s;
        let second = s.reset();
        assert!(!first.is_busy);
        assert!(!second.is_busy);
        assert!(!second.busy_changed());
        assert_eq!(s, after_first);
    }
}
