// src/mmu/progress.rs - progress tracker (spec.md §4.2).
//
// Grounded on `original_source/.../mmu2_reporting.h`'s `CommandInProgress`
// and `ProgressTrackingManager`'s constexpr step tables. Percentage is
// `(index + step_progress/100) * 100 / sequence_length`; a progress code
// that appears twice in its sequence is ambiguous and freezes percentage
// (prevents backward jumps); any `ERR*` code freezes at 50%.
use super::error_codes::{CommandInProgress, ProgressCode};

/// UI-facing mode tag, used to pick the dialog variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadUnloadMode {
    Load,
    Unload,
    Change,
    Cut,
    Eject,
    Test,
}

pub fn mode_for_command(cmd: CommandInProgress) -> LoadUnloadMode {
    match cmd {
        CommandInProgress::ToolChange => LoadUnloadMode::Change,
        CommandInProgress::UnloadFilament => LoadUnloadMode::Unload,
        CommandInProgress::TestLoad => LoadUnloadMode::Test,
        CommandInProgress::CutFilament => LoadUnloadMode::Cut,
        CommandInProgress::EjectFilament => LoadUnloadMode::Eject,
        _ => LoadUnloadMode::Load,
    }
}

use ProgressCode::*;

const TOOL_CHANGE_SEQ: &[ProgressCode] = &[
    UnloadingToFinda,
    FeedingToFinda,
    FeedingToBondtech,
    FeedingToFSensor,
    DisengagingIdler,
];

const LOAD_SEQ: &[ProgressCode] = &[FeedingToFinda, RetractingFromFinda, DisengagingIdler];

const UNLOAD_SEQ: &[ProgressCode] = &[UnloadingToFinda, RetractingFromFinda, DisengagingIdler];

/// 11-step Cut sequence: starts at UnloadingToFinda, passes through
/// PreparingBlade/PerformingCut, ends at ReturningSelector.
/// `DisengagingIdler` deliberately appears twice (steps 3 and 9) -- this is
/// the spec's own named example of an ambiguous code that must freeze
/// percentage rather than jump backward.
const CUT_SEQ: &[ProgressCode] = &[
    UnloadingToFinda,
    RetractingFromFinda,
    DisengagingIdler,
    SelectingFilamentSlot,
    MovingSelector,
    EngagingIdler,
    PreparingBlade,
    PerformingCut,
    DisengagingIdler,
    MovingSelector,
    ReturningSelector,
];

/// 7-step Eject sequence, ending at EjectingFilament.
const EJECT_SEQ: &[ProgressCode] = &[
    UnloadingToFinda,
    RetractingFromFinda,
    DisengagingIdler,
    SelectingFilamentSlot,
    MovingSelector,
    ParkingSelector,
    EjectingFilament,
];

/// TestLoad reuses the Load-like probe sequence (spec.md names no separate
/// table for it; it runs the same feed/retract/disengage motions as Load).
const TEST_LOAD_SEQ: &[ProgressCode] = LOAD_SEQ;

/// LoadToNozzle extends the tool-change-like sequence with a temperature
/// wait and a final LoadingToNozzle pseudo-step.
const LOAD_TO_NOZZLE_SEQ: &[ProgressCode] = &[
    FeedingToFinda,
    RetractingFromFinda,
    DisengagingIdler,
    WaitingForTemperature,
    LoadingToNozzle,
];

fn sequence_for(cmd: CommandInProgress) -> &'static [ProgressCode] {
    match cmd {
        CommandInProgress::ToolChange => TOOL_CHANGE_SEQ,
        CommandInProgress::LoadFilament => LOAD_SEQ,
        CommandInProgress::UnloadFilament => UNLOAD_SEQ,
        CommandInProgress::CutFilament => CUT_SEQ,
        CommandInProgress::EjectFilament => EJECT_SEQ,
        CommandInProgress::TestLoad => TEST_LOAD_SEQ,
        CommandInProgress::LoadToNozzle => LOAD_TO_NOZZLE_SEQ,
        CommandInProgress::Homing | CommandInProgress::Reset | CommandInProgress::NoCommand => &[],
    }
}

fn is_ambiguous(seq: &[ProgressCode], code: ProgressCode) -> bool {
    seq.iter().filter(|&&c| c == code).count() > 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedProgress {
    pub percentage: u8,
    pub mode: LoadUnloadMode,
}

/// Tracks the last-reported percentage per command so ambiguous/error codes
/// can freeze it instead of jumping.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_percentage: Option<u8>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last_percentage = None;
    }

    /// Map `(CommandInProgress, ProgressCode, step_progress 0..100)` to
    /// `(percentage, LoadUnloadMode)` (spec.md §4.2).
    pub fn track(
        &mut self,
        cmd: CommandInProgress,
        code: ProgressCode,
        step_progress: u8,
    ) -> TrackedProgress {
        let mode = mode_for_command(cmd);

        if code.is_error() {
            let pct = 50;
            self.last_percentage = Some(pct);
            return TrackedProgress {
                percentage: pct,
                mode,
            };
        }

        let seq = sequence_for(cmd);
        let pct = match seq.iter().position(|&c| c == code) {
            Some(_) if is_ambiguous(seq, code) => {
                // Ambiguous: keep whatever we last reported (or 0 if none yet).
                self.last_percentage.unwrap_or(0)
            }
            Some(index) => {
                let len = seq.len() as f64;
                let frac = (index as f64 + (step_progress as f64 / 100.0)) / len;
                (frac * 100.0).clamp(0.0, 100.0) as u8
            }
            None => self.last_percentage.unwrap_or(0),
        };

        self.last_percentage = Some(pct);
        TrackedProgress {
            percentage: pct,
            mode,
        }
    }
}

/// 2-byte wire payload for the FSM dialog: `{mode, percentage}`.
pub fn serialize_payload(progress: TrackedProgress) -> [u8; 2] {
    let mode_byte = match progress.mode {
        LoadUnloadMode::Load => 0,
        LoadUnloadMode::Unload => 1,
        LoadUnloadMode::Change => 2,
        LoadUnloadMode::Cut => 3,
        LoadUnloadMode::Eject => 4,
        LoadUnloadMode::Test => 5,
    };
    [mode_byte, progress.percentage]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_change_scenario_matches_spec_example() {
        let mut tracker = ProgressTracker::new();
        let cmd = CommandInProgress::ToolChange;
        assert_eq!(tracker.track(cmd, UnloadingToFinda, 0).percentage, 20);
        assert_eq!(tracker.track(cmd, FeedingToFinda, 0).percentage, 40);
        assert_eq!(tracker.track(cmd, FeedingToBondtech, 0).percentage, 60);
        assert_eq!(tracker.track(cmd, FeedingToFSensor, 0).percentage, 80);
        assert_eq!(tracker.track(cmd, DisengagingIdler, 0).percentage, 100);
    }

    #[test]
    fn ambiguous_code_freezes_percentage_instead_of_jumping_back() {
        let mut tracker = ProgressTracker::new();
        let cmd = CommandInProgress::CutFilament;
        let after_first = tracker.track(cmd, DisengagingIdler, 0).percentage;
        let after_moving = tracker.track(cmd, MovingSelector, 0).percentage;
        assert!(after_moving > after_first);
        // Second DisengagingIdler occurrence is ambiguous: must not change.
        let after_second_disengage = tracker.track(cmd, DisengagingIdler, 0).percentage;
        assert_eq!(after_second_disengage, after_moving);
    }

    #[test]
    fn error_code_freezes_at_fifty_percent() {
        let mut tracker = ProgressTracker::new();
        let cmd = CommandInProgress::ToolChange;
        tracker.track(cmd, FeedingToFinda, 0);
        let err = tracker.track(cmd, ERRWaitingForUser, 0);
        assert_eq!(err.percentage, 50);
    }

    #[test]
    fn mode_mapping_matches_command() {
        assert_eq!(
            mode_for_command(CommandInProgress::UnloadFilament),
            LoadUnloadMode::Unload
        );
        assert_eq!(
            mode_for_command(CommandInProgress::TestLoad),
            LoadUnloadMode::Test
        );
        assert_eq!(
            mode_for_command(CommandInProgress::LoadFilament),
            LoadUnloadMode::Load
        );
    }
}
