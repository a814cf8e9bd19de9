//! Trigger/dedup state machine.
//!
//! [`TriggerCore`] owns the decision "does this visibility signal become a
//! load-more trigger". It holds no timers and performs no I/O: every
//! transition returns what the caller has to do (start or cancel the
//! debounce, unobserve a stale target, dispatch), which keeps the ordering
//! rules testable without a scheduler.

use crate::dom::ElementId;

/// Observable state of the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerState {
    /// Nothing observed.
    Idle,
    /// Watching `observed` for a visibility signal.
    Armed,
    /// A signal arrived; waiting for the debounce window to close.
    Debouncing,
    /// Loading or paused; signals are dropped.
    Suppressed,
}

/// Result of feeding a visibility signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Start the debounce timer.
    Debounce,
    /// A window is already open for this element; the signal is absorbed.
    Pending,
    /// Dropped because loading or paused.
    Suppressed,
    /// Dropped because the element is not the observed target.
    NotObserved,
}

/// Result of closing a debounce window or forcing a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Dispatch a trigger for `element`; unobserve `stale` first.
    Emit {
        element: ElementId,
        stale: Option<ElementId>,
    },
    /// `element` already produced a trigger in this loading cycle.
    Duplicate(ElementId),
    /// The list is empty.
    Empty,
    /// Loading or paused.
    Suppressed,
}

#[derive(Clone, Debug)]
pub struct TriggerCore {
    state: TriggerState,
    observed: Option<ElementId>,
    last_emitted: Option<ElementId>,
    loading: bool,
    paused: bool,
}

impl Default for TriggerCore {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerCore {
    pub fn new() -> Self {
        Self {
            state: TriggerState::Idle,
            observed: None,
            last_emitted: None,
            loading: false,
            paused: false,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn observed(&self) -> Option<ElementId> {
        self.observed
    }

    pub fn last_emitted(&self) -> Option<ElementId> {
        self.last_emitted
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_suppressed(&self) -> bool {
        self.loading || self.paused
    }

    fn settle(&mut self) {
        self.state = if self.is_suppressed() {
            TriggerState::Suppressed
        } else if self.observed.is_some() {
            TriggerState::Armed
        } else {
            TriggerState::Idle
        };
    }

    /// Records `element` as the single observed target.
    ///
    /// Returns the previous target if it was different, which the caller
    /// must already have unobserved.
    pub fn arm(&mut self, element: ElementId) -> Option<ElementId> {
        let previous = self.observed.replace(element);
        if self.state != TriggerState::Debouncing {
            self.settle();
        }
        previous.filter(|p| *p != element)
    }

    /// Clears the observed target. Returns it, if any.
    pub fn disarm(&mut self) -> Option<ElementId> {
        let previous = self.observed.take();
        if self.state != TriggerState::Debouncing {
            self.settle();
        }
        previous
    }

    /// A visibility signal for `element` arrived.
    pub fn signal(&mut self, element: ElementId) -> SignalOutcome {
        if self.is_suppressed() {
            return SignalOutcome::Suppressed;
        }
        if self.observed != Some(element) {
            return SignalOutcome::NotObserved;
        }
        if self.state == TriggerState::Debouncing {
            return SignalOutcome::Pending;
        }
        self.state = TriggerState::Debouncing;
        SignalOutcome::Debounce
    }

    /// The debounce window closed. `current_last` is the list's last item
    /// re-read at this moment, since it may have changed during the window.
    pub fn debounce_elapsed(&mut self, current_last: Option<ElementId>) -> Verdict {
        if self.state != TriggerState::Debouncing {
            self.settle();
        }
        self.fire(current_last)
    }

    /// Decides immediately, without a debounce window. Used for proactive
    /// fires after resume and for manual checks.
    pub fn fire(&mut self, candidate: Option<ElementId>) -> Verdict {
        if self.is_suppressed() {
            self.settle();
            return Verdict::Suppressed;
        }
        let Some(element) = candidate else {
            self.settle();
            return Verdict::Empty;
        };
        if self.last_emitted == Some(element) {
            self.settle();
            return Verdict::Duplicate(element);
        }
        self.last_emitted = Some(element);
        let stale = self.observed.take();
        self.state = TriggerState::Idle;
        Verdict::Emit { element, stale }
    }

    /// Drops a pending debounce without deciding. Returns `true` if one was
    /// pending.
    pub fn cancel_debounce(&mut self) -> bool {
        let pending = self.state == TriggerState::Debouncing;
        if pending {
            self.settle();
        }
        pending
    }

    /// Returns `true` if a pending debounce must be cancelled.
    pub fn begin_loading(&mut self) -> bool {
        let pending = self.state == TriggerState::Debouncing;
        self.loading = true;
        self.last_emitted = None;
        self.settle();
        pending
    }

    pub fn end_loading(&mut self) {
        self.loading = false;
        self.settle();
    }

    /// Returns `true` if a pending debounce must be cancelled.
    pub fn pause(&mut self) -> bool {
        let pending = self.state == TriggerState::Debouncing;
        self.paused = true;
        self.settle();
        pending
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.settle();
    }

    /// Forgets the dedup memory, e.g. after the list was replaced.
    pub fn clear_emitted(&mut self) {
        self.last_emitted = None;
    }

    /// Back to a freshly constructed core.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ElementId = ElementId(1);
    const B: ElementId = ElementId(2);

    fn armed(element: ElementId) -> TriggerCore {
        let mut core = TriggerCore::new();
        core.arm(element);
        core
    }

    #[test]
    fn test_signal_for_observed_element_debounces() {
        let mut core = armed(A);
        assert_eq!(core.state(), TriggerState::Armed);
        assert_eq!(core.signal(A), SignalOutcome::Debounce);
        assert_eq!(core.state(), TriggerState::Debouncing);
        assert_eq!(
            core.debounce_elapsed(Some(A)),
            Verdict::Emit {
                element: A,
                stale: Some(A)
            }
        );
        assert_eq!(core.observed(), None);
        assert_eq!(core.last_emitted(), Some(A));
        assert_eq!(core.state(), TriggerState::Idle);
    }

    #[test]
    fn test_signals_inside_window_do_not_restart_it() {
        let mut core = armed(A);
        assert_eq!(core.signal(A), SignalOutcome::Debounce);
        assert_eq!(core.signal(A), SignalOutcome::Pending);
        core.arm(A);
        assert_eq!(core.signal(A), SignalOutcome::Pending);
        assert_eq!(core.state(), TriggerState::Debouncing);
        assert!(matches!(core.debounce_elapsed(Some(A)), Verdict::Emit { .. }));
        assert_eq!(core.signal(A), SignalOutcome::NotObserved);
    }

    #[test]
    fn test_signal_for_other_element_is_ignored() {
        let mut core = armed(A);
        assert_eq!(core.signal(B), SignalOutcome::NotObserved);
        assert_eq!(core.state(), TriggerState::Armed);
    }

    #[test]
    fn test_repeated_signals_emit_once() {
        let mut core = armed(A);
        let mut emitted = 0;
        for _ in 0..5 {
            core.arm(A);
            if core.signal(A) == SignalOutcome::Debounce {
                if let Verdict::Emit { .. } = core.debounce_elapsed(Some(A)) {
                    emitted += 1;
                }
            }
        }
        assert_eq!(emitted, 1);
    }

    #[test]
    fn test_no_signal_accepted_while_loading_or_paused() {
        let mut core = armed(A);
        core.begin_loading();
        assert_eq!(core.signal(A), SignalOutcome::Suppressed);
        assert_eq!(core.state(), TriggerState::Suppressed);
        core.end_loading();

        core.pause();
        assert_eq!(core.signal(A), SignalOutcome::Suppressed);
        assert_eq!(core.fire(Some(A)), Verdict::Suppressed);
        core.resume();
        assert_eq!(core.state(), TriggerState::Armed);
    }

    #[test]
    fn test_pause_cancels_pending_debounce() {
        let mut core = armed(A);
        core.signal(A);
        assert!(core.pause());
        assert_eq!(core.debounce_elapsed(Some(A)), Verdict::Suppressed);
        assert_eq!(core.last_emitted(), None);
    }

    #[test]
    fn test_loading_clears_dedup_memory() {
        let mut core = armed(A);
        core.signal(A);
        core.debounce_elapsed(Some(A));
        assert!(!core.begin_loading());
        assert_eq!(core.last_emitted(), None);
        core.end_loading();

        core.arm(A);
        core.signal(A);
        assert!(matches!(core.debounce_elapsed(Some(A)), Verdict::Emit { .. }));
    }

    #[test]
    fn test_rereads_last_item_after_debounce() {
        let mut core = armed(A);
        core.signal(A);
        // Items were appended during the window; B is now last.
        assert_eq!(
            core.debounce_elapsed(Some(B)),
            Verdict::Emit {
                element: B,
                stale: Some(A)
            }
        );
    }

    #[test]
    fn test_duplicate_returns_to_armed() {
        let mut core = armed(A);
        core.signal(A);
        core.debounce_elapsed(Some(A));

        core.arm(A);
        core.signal(A);
        assert_eq!(core.debounce_elapsed(Some(A)), Verdict::Duplicate(A));
        assert_eq!(core.state(), TriggerState::Armed);
        assert_eq!(core.observed(), Some(A));
    }

    #[test]
    fn test_empty_list_never_emits() {
        let mut core = armed(A);
        core.signal(A);
        assert_eq!(core.debounce_elapsed(None), Verdict::Empty);
    }

    #[test]
    fn test_clear_emitted_allows_same_element_again() {
        let mut core = TriggerCore::new();
        assert!(matches!(core.fire(Some(A)), Verdict::Emit { stale: None, .. }));
        assert_eq!(core.fire(Some(A)), Verdict::Duplicate(A));
        core.clear_emitted();
        assert!(matches!(core.fire(Some(A)), Verdict::Emit { .. }));
    }
}
