// src/mmu/verify.rs - post-load filament verification / try-load (spec.md §4.8).
//
// Grounded on `original_source/.../mmu2_mk4.cpp`'s `loading_test` and the
// `TryLoadUnloadReporter` declared in `mmu2_reporting.h`. After the MMU
// pushes filament, the printer moves it forward then back by a computed
// distance while continuously sampling the filament sensor; any "no
// filament" sample during either leg fails the verification.
use crate::config::MmuConfig;

/// Printer-side filament sensor state (spec.md §6.1 `WhereIsFilament`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilamentSensorState {
    Unavailable,
    NotPresent,
    AtFsensor,
    InNozzle,
}

/// A single sample taken during the forward or backward leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifySample {
    pub leg: VerifyLeg,
    pub distance_traveled_mm: f64,
    pub sensor: FilamentSensorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyLeg {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    /// Filament sensor reported "no filament" during the named leg.
    Failed(VerifyLeg),
}

/// Callback-driven try-load probe: `mover` performs one incremental move of
/// `step_mm` in the given direction and returns the resulting sensor state,
/// standing in for a real printer's blocking extruder move + sensor poll.
pub fn verify_filament_entered_ptfe(
    config: &MmuConfig,
    step_mm: f64,
    mut mover: impl FnMut(VerifyLeg, f64) -> FilamentSensorState,
    mut progress: impl FnMut(VerifySample),
) -> VerifyOutcome {
    let distance = config.verify_load_distance_mm();
    let feed_distance = distance.abs().max(step_mm);

    let mut traveled = 0.0;
    while traveled < feed_distance {
        let step = step_mm.min(feed_distance - traveled);
        traveled += step;
        let sensor = mover(VerifyLeg::Forward, traveled);
        progress(VerifySample {
            leg: VerifyLeg::Forward,
            distance_traveled_mm: traveled,
            sensor,
        });
        if sensor == FilamentSensorState::NotPresent {
            return VerifyOutcome::Failed(VerifyLeg::Forward);
        }
    }

    let mut traveled = 0.0;
    while traveled < feed_distance {
        let step = step_mm.min(feed_distance - traveled);
        traveled += step;
        let sensor = mover(VerifyLeg::Backward, traveled);
        progress(VerifySample {
            leg: VerifyLeg::Backward,
            distance_traveled_mm: traveled,
            sensor,
        });
        if sensor == FilamentSensorState::NotPresent {
            return VerifyOutcome::Failed(VerifyLeg::Backward);
        }
    }

    VerifyOutcome::Success
}

/// Resolution of the try-load progress bar (spec.md §4.8's "dedicated small
/// serialiser"), matching the original's fixed-width pixel count.
pub const TRY_LOAD_PROGRESS_PIXELS: u8 = 20;

/// Per-pixel try-load progress payload pushed to the UI while
/// `verify_filament_entered_ptfe` samples the sensor, standing in for
/// `TryLoadUnloadReporter`'s packed pixel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryLoadProgress {
    pub leg: VerifyLeg,
    pub pixel: u8,
}

/// Converts one `VerifySample` into its pixel payload, given the total
/// distance of the leg it belongs to.
pub fn try_load_progress(sample: VerifySample, total_distance_mm: f64) -> TryLoadProgress {
    let frac = if total_distance_mm > 0.0 {
        (sample.distance_traveled_mm / total_distance_mm).clamp(0.0, 1.0)
    } else {
        1.0
    };
    TryLoadProgress {
        leg: sample.leg,
        pixel: (frac * f64::from(TRY_LOAD_PROGRESS_PIXELS)) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MmuConfig {
        MmuConfig::default()
    }

    #[test]
    fn succeeds_when_sensor_stays_present_throughout() {
        let config = test_config();
        let mut samples = Vec::new();
        let outcome = verify_filament_entered_ptfe(
            &config,
            5.0,
            |_, _| FilamentSensorState::AtFsensor,
            |s| samples.push(s),
        );
        assert_eq!(outcome, VerifyOutcome::Success);
        assert!(!samples.is_empty());
        assert!(samples.iter().any(|s| s.leg == VerifyLeg::Forward));
        assert!(samples.iter().any(|s| s.leg == VerifyLeg::Backward));
    }

    #[test]
    fn fails_on_forward_leg_when_sensor_drops() {
        let config = test_config();
        let outcome = verify_filament_entered_ptfe(
            &config,
            5.0,
            |_, traveled| {
                if traveled > 10.0 {
                    FilamentSensorState::NotPresent
                } else {
                    FilamentSensorState::AtFsensor
                }
            },
            |_| {},
        );
        assert_eq!(outcome, VerifyOutcome::Failed(VerifyLeg::Forward));
    }

    #[test]
    fn try_load_progress_reaches_full_pixel_count_at_end_of_leg() {
        let sample = VerifySample {
            leg: VerifyLeg::Forward,
            distance_traveled_mm: 24.0,
            sensor: FilamentSensorState::AtFsensor,
        };
        let progress = try_load_progress(sample, 24.0);
        assert_eq!(progress.leg, VerifyLeg::Forward);
        assert_eq!(progress.pixel, TRY_LOAD_PROGRESS_PIXELS);
    }

    #[test]
    fn try_load_progress_is_proportional_midway_through_leg() {
        let sample = VerifySample {
            leg: VerifyLeg::Backward,
            distance_traveled_mm: 12.0,
            sensor: FilamentSensorState::AtFsensor,
        };
        let progress = try_load_progress(sample, 24.0);
        assert_eq!(progress.pixel, TRY_LOAD_PROGRESS_PIXELS / 2);
    }
}
