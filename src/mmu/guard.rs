// src/mmu/guard.rs - Command-In-Progress Guard (spec.md §4.3).
//
// Grounded on `original_source/.../mmu2_reporting.h`'s RAII reporting
// session pattern (spec.md §9 calls out the scope-guard explicitly). In
// Rust the refcount lives behind a `Drop` impl rather than a destructor, so
// nested guards decrement automatically even on early return via `?`.
use std::sync::{Arc, Mutex};

use super::error_codes::CommandInProgress;

#[derive(Debug, Default)]
struct ManagerState {
    refcount: u32,
    active_command: CommandInProgress,
    /// Suppresses duplicate Begin/End emissions when an outer guard is
    /// already live (spec.md §4.3's `topLevelReportBlock`).
    top_level_report_block: u32,
}

/// Event emitted on the 0->1 / 1->0 refcount transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    Begin(CommandInProgress),
    End(CommandInProgress),
}

/// Shared owner of the refcount and active-command tag; handed to every
/// `CommandInProgressGuard` so nested guards observe the same state.
#[derive(Clone, Default)]
pub struct CommandInProgressManager {
    state: Arc<Mutex<ManagerState>>,
}

impl CommandInProgressManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_command(&self) -> CommandInProgress {
        self.state.lock().expect("guard state mutex poisoned").active_command
    }

    pub fn refcount(&self) -> u32 {
        self.state.lock().expect("guard state mutex poisoned").refcount
    }

    /// Opens a guard for `cmd`, emitting `Begin` on the outermost open.
    pub fn enter(&self, cmd: CommandInProgress) -> (CommandInProgressGuard, Option<GuardEvent>) {
        let mut state = self.state.lock().expect("guard state mutex poisoned");
        let event = if state.refcount == 0 {
            state.active_command = cmd;
            Some(GuardEvent::Begin(cmd))
        } else {
            state.top_level_report_block += 1;
            None
        };
        state.refcount += 1;
        drop(state);
        (
            CommandInProgressGuard {
                manager: self.clone(),
                consumed: false,
            },
            event,
        )
    }

    /// Increments the refcount without allocating a `CommandInProgressGuard`,
    /// for callers whose begin/end straddle multiple `.await` points rather
    /// than a single lexical scope (the Coordinator's `begin_report`); pair
    /// with an explicit `leave()` call.
    pub fn enter_without_guard(&self, cmd: CommandInProgress) -> Option<GuardEvent> {
        let mut state = self.state.lock().expect("guard state mutex poisoned");
        let event = if state.refcount == 0 {
            state.active_command = cmd;
            Some(GuardEvent::Begin(cmd))
        } else {
            state.top_level_report_block += 1;
            None
        };
        state.refcount += 1;
        event
    }

    /// Manual decrement, for callers that track the open/close pairing
    /// themselves instead of holding a `CommandInProgressGuard` value (e.g.
    /// the Coordinator's `begin_report`/`end_report`, which span multiple
    /// `async` calls between open and close).
    pub fn leave(&self) -> Option<GuardEvent> {
        let mut state = self.state.lock().expect("guard state mutex poisoned");
        debug_assert!(state.refcount > 0, "guard underflow");
        state.refcount -= 1;
        if state.refcount == 0 {
            let cmd = state.active_command;
            state.active_command = CommandInProgress::NoCommand;
            Some(GuardEvent::End(cmd))
        } else {
            state.top_level_report_block = state.top_level_report_block.saturating_sub(1);
            None
        }
    }
}

/// RAII guard; `Drop` decrements the shared refcount. Its `End` event (if
/// any) must be collected explicitly via `close()` before drop since Rust
/// destructors cannot return values -- callers that need the event call
/// `close()` at the natural end of the operation, and `Drop` is only the
/// safety net for early-return/panic paths.
pub struct CommandInProgressGuard {
    manager: CommandInProgressManager,
    consumed: bool,
}

impl CommandInProgressGuard {
    /// Explicitly closes the guard early and returns the `End` event, if
    /// this was the outermost guard.
    pub fn close(mut self) -> Option<GuardEvent> {
        self.consumed = true;
        self.manager.leave()
    }
}

impl Drop for CommandInProgressGuard {
    fn drop(&mut self) {
        if !self.consumed {
            self.manager.leave();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outermost_guard_emits_begin_and_end() {
        let mgr = CommandInProgressManager::new();
        let (guard, begin) = mgr.enter(CommandInProgress::ToolChange);
        assert_eq!(begin, Some(GuardEvent::Begin(CommandInProgress::ToolChange)));
        assert_eq!(mgr.refcount(), 1);
        let end = guard.close();
        assert_eq!(end, Some(GuardEvent::End(CommandInProgress::ToolChange)));
        assert_eq!(mgr.refcount(), 0);
        assert_eq!(mgr.active_command(), CommandInProgress::NoCommand);
    }

    #[test]
    fn nested_guard_suppresses_duplicate_begin_end() {
        let mgr = CommandInProgressManager::new();
        let (outer, outer_begin) = mgr.enter(CommandInProgress::ToolChange);
        let (inner, inner_begin) = mgr.enter(CommandInProgress::UnloadFilament);
        assert!(outer_begin.is_some());
        assert!(inner_begin.is_none());
        assert_eq!(mgr.refcount(), 2);

        let inner_end = inner.close();
        assert!(inner_end.is_none());
        assert_eq!(mgr.refcount(), 1);

        let outer_end = outer.close();
        assert_eq!(outer_end, Some(GuardEvent::End(CommandInProgress::ToolChange)));
        assert_eq!(mgr.refcount(), 0);
    }

    #[test]
    fn drop_without_close_still_decrements() {
        let mgr = CommandInProgressManager::new();
        {
            let (_guard, _begin) = mgr.enter(CommandInProgress::Homing);
            assert_eq!(mgr.refcount(), 1);
        }
        assert_eq!(mgr.refcount(), 0);
    }
}
