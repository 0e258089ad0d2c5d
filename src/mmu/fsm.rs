// src/mmu/fsm.rs - FSM driver pumping Reporter state into UI phases (spec.md §4.5).
//
// Grounded on `original_source/src/mmu2/mmu2_fsm.hpp`'s `Fsm` class: a
// `created_this` flag prevents double create/destroy when a print-pause
// collaborator already owns the dialog session.
use super::buttons::ButtonOperation;
use super::catalogue::{self, ErrCode, MmuErrDesc};
use super::progress::{ProgressTracker, TrackedProgress};
use super::reporter::{Report, Reporter};

/// UI phase pushed to the dialog; mirrors the original's
/// `PhasesLoadUnload` enum collapsed to the cases this coordinator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Progress(TrackedProgress),
    ErrWaitingForUser,
}

/// Tracks whether a print-pause collaborator already owns an open dialog
/// session. In a single-binary coordinator this is normally `false`; it
/// exists so `Fsm::activate` matches the original's ownership arbitration.
#[derive(Debug, Default)]
pub struct DialogOwnership {
    pub collaborator_active: bool,
}

#[derive(Debug)]
pub struct Fsm {
    active: bool,
    created_this: bool,
    phase: Phase,
    current_error: Option<&'static MmuErrDesc>,
    selected_operation: Option<ButtonOperation>,
}

impl Default for Fsm {
    fn default() -> Self {
        Self {
            active: false,
            created_this: false,
            phase: Phase::Idle,
            current_error: None,
            selected_operation: None,
        }
    }
}

impl Fsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Creates the session only if neither this driver nor the print-pause
    /// collaborator already own one.
    pub fn activate(&mut self, ownership: &DialogOwnership) {
        if self.active || ownership.collaborator_active {
            return;
        }
        self.active = true;
        self.created_this = true;
    }

    /// Destroys the session only if this driver was the creator.
    pub fn deactivate(&mut self) {
        if self.created_this {
            self.active = false;
            self.created_this = false;
            self.phase = Phase::Idle;
            self.current_error = None;
        }
    }

    /// Called once per main-task iteration. `tracker` is the coordinator's
    /// single long-lived `ProgressTracker` (spec.md §4.2); threading it
    /// through here rather than constructing a fresh one per call is what
    /// lets the ambiguous-code/no-backward-jump behavior hold across reports.
    pub fn run_loop(
        &mut self,
        reporter: &mut Reporter,
        ownership: &DialogOwnership,
        tracker: &mut ProgressTracker,
    ) {
        if !self.active && !reporter.has_pending() {
            return;
        }
        if reporter.has_pending() && !self.active {
            self.activate(ownership);
        }

        if let Some(report) = reporter.consume_report() {
            match report {
                Report::Error { code, .. } => {
                    let desc = &catalogue::ERROR_LIST[catalogue::find_index(code)];
                    if desc.code != ErrCode::ConnectMmuNotResponding {
                        self.current_error = Some(desc);
                        self.phase = Phase::ErrWaitingForUser;
                    }
                }
                Report::Progress {
                    cmd, code, step_progress, ..
                } => {
                    let tracked = tracker.track(cmd, code, step_progress);
                    self.phase = Phase::Progress(tracked);
                }
            }
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_error(&self) -> Option<&'static MmuErrDesc> {
        self.current_error
    }

    /// Queries the current MMU_ERRWaitingForUser phase for a stored button
    /// click, set by the UI via `select_operation`.
    pub fn selected_operation(&self) -> Option<ButtonOperation> {
        self.selected_operation
    }

    pub fn select_operation(&mut self, op: ButtonOperation) {
        self.selected_operation = Some(op);
    }

    pub fn clear_selected_operation(&mut self) {
        self.selected_operation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::error_codes::{CommandInProgress, ProgressCode};
    use crate::mmu::reporter::ErrorSource;

    #[test]
    fn activate_noop_when_collaborator_owns_dialog() {
        let mut fsm = Fsm::new();
        let ownership = DialogOwnership {
            collaborator_active: true,
        };
        fsm.activate(&ownership);
        assert!(!fsm.is_active());
    }

    #[test]
    fn deactivate_only_destroys_when_this_driver_created_it() {
        let mut fsm = Fsm::new();
        let ownership = DialogOwnership::default();
        fsm.activate(&ownership);
        assert!(fsm.is_active());
        fsm.deactivate();
        assert!(!fsm.is_active());
    }

    #[test]
    fn error_report_opens_wait_for_user_phase() {
        let mut fsm = Fsm::new();
        let mut reporter = Reporter::new();
        let ownership = DialogOwnership::default();
        reporter.set_report(Report::Error {
            cmd: CommandInProgress::ToolChange,
            code: ErrCode::MechanicalFindaDidntTrigger,
            source: ErrorSource::Mmu,
        });
        fsm.run_loop(&mut reporter, &ownership, &mut ProgressTracker::new());
        assert_eq!(fsm.phase(), Phase::ErrWaitingForUser);
        assert!(fsm.current_error().is_some());
    }

    #[test]
    fn mmu_not_responding_does_not_open_error_phase() {
        let mut fsm = Fsm::new();
        let mut reporter = Reporter::new();
        let ownership = DialogOwnership::default();
        reporter.set_report(Report::Error {
            cmd: CommandInProgress::NoCommand,
            code: ErrCode::ConnectMmuNotResponding,
            source: ErrorSource::Mmu,
        });
        fsm.run_loop(&mut reporter, &ownership, &mut ProgressTracker::new());
        assert_ne!(fsm.phase(), Phase::ErrWaitingForUser);
    }

    #[test]
    fn progress_report_updates_phase() {
        let mut fsm = Fsm::new();
        let mut reporter = Reporter::new();
        let ownership = DialogOwnership::default();
        reporter.set_report(Report::Progress {
            cmd: CommandInProgress::ToolChange,
            code: ProgressCode::UnloadingToFinda,
            step_progress: 0,
        });
        fsm.run_loop(&mut reporter, &ownership, &mut ProgressTracker::new());
        matches!(fsm.phase(), Phase::Progress(_));
    }

    #[test]
    fn tracker_state_persists_across_separate_run_loop_calls() {
        let mut fsm = Fsm::new();
        let mut reporter = Reporter::new();
        let ownership = DialogOwnership::default();
        let mut tracker = ProgressTracker::new();

        reporter.set_report(Report::Progress {
            cmd: CommandInProgress::ToolChange,
            code: ProgressCode::UnloadingToFinda,
            step_progress: 0,
        });
        fsm.run_loop(&mut reporter, &ownership, &mut tracker);
        let first_pct = match fsm.phase() {
            Phase::Progress(p) => p.percentage,
            _ => panic!("expected progress phase"),
        };

        // Re-reporting the SAME code in a later, separate call must not
        // reset the tracker's memory: percentage must not jump backward.
        reporter.set_report(Report::Progress {
            cmd: CommandInProgress::ToolChange,
            code: ProgressCode::UnloadingToFinda,
            step_progress: 0,
        });
        fsm.run_loop(&mut reporter, &ownership, &mut tracker);
        let second_pct = match fsm.phase() {
            Phase::Progress(p) => p.percentage,
            _ => panic!("expected progress phase"),
        };
        assert_eq!(first_pct, second_pct);

        reporter.set_report(Report::Progress {
            cmd: CommandInProgress::ToolChange,
            code: ProgressCode::FeedingToFinda,
            step_progress: 0,
        });
        fsm.run_loop(&mut reporter, &ownership, &mut tracker);
        let third_pct = match fsm.phase() {
            Phase::Progress(p) => p.percentage,
            _ => panic!("expected progress phase"),
        };
        assert!(third_pct > second_pct);
    }
}
