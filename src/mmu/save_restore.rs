// src/mmu/save_restore.rs - print-resume state across error pauses (spec.md §4.7).
//
// Grounded on `original_source/.../mmu2_mk4.cpp`'s `SaveAndPark` /
// `SaveHotendTemp` / `ResumeHotendTemp` / `ResumeUnpark`, and spec.md §9's
// `Timer<T>` wrap-around note: compare `now - started >= period`, never
// `now >= started + period`, since the duration arithmetic must stay valid
// across unsigned wraparound.
use std::time::Duration;

use crate::config::MmuConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownState {
    #[default]
    None,
    CooldownPending,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Wraparound-safe elapsed-time timer (spec.md §9). `now` is supplied by the
/// caller rather than read from a clock so tests can drive it deterministically.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Duration,
    running: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            started: Duration::ZERO,
            running: false,
        }
    }
}

impl Timer {
    pub fn start(&mut self, now: Duration) {
        self.started = now;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `now - started >= period`, computed via `saturating_sub` so it is
    /// well-defined even if `now` wraps relative to `started`.
    pub fn expired(&self, now: Duration, period: Duration) -> bool {
        self.running && now.saturating_sub(self.started) >= period
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SavedState {
    pub position: Option<Position>,
    pub hotend_target: Option<f64>,
    pub park_extruder: bool,
}

impl SavedState {
    pub fn is_saved(&self) -> bool {
        self.position.is_some()
    }
}

/// Owns the snapshot buffer and cooldown machinery used during an error
/// pause. Motion/thermal callbacks are injected so this stays pure of any
/// concrete hardware access (spec.md §6.1's Motion/Thermal collaborators).
#[derive(Debug, Default)]
pub struct SaveRestore {
    pub saved: SavedState,
    pub cooldown: CooldownState,
    pub cooldown_timer: Timer,
}

pub struct ParkPosition {
    pub x: f64,
    pub y: f64,
    pub z_lift: f64,
}

impl SaveRestore {
    pub fn new() -> Self {
        Self::default()
    }

    /// First invocation only (guarded by `saved == None`): snapshot XYZ and
    /// hotend target; if `move_axes`, raise Z and park X/Y, setting
    /// `park_extruder`.
    pub fn save_and_park(
        &mut self,
        current_position: Position,
        current_hotend_target: f64,
        move_axes: bool,
        config: &MmuConfig,
    ) -> Option<ParkPosition> {
        if self.saved.is_saved() {
            return None;
        }
        self.saved.position = Some(current_position);
        self.saved.hotend_target = Some(current_hotend_target);

        if move_axes {
            self.saved.park_extruder = true;
            return Some(ParkPosition {
                x: config.err_pause_position_x,
                y: config.err_pause_position_y,
                z_lift: config.err_pause_z_lift_mm,
            });
        }
        None
    }

    /// If `turn_off_nozzle` and not already in `Cooldown`: snapshot the
    /// current target and arm `CooldownPending`.
    pub fn save_hotend_temp(&mut self, turn_off_nozzle: bool, current_target: f64) {
        if turn_off_nozzle && self.cooldown != CooldownState::Cooldown {
            self.saved.hotend_target = Some(current_target);
            self.cooldown = CooldownState::CooldownPending;
        }
    }

    /// Starts the cooldown timer the first time `CooldownPending` is
    /// observed, and flips to `Cooldown` (target 0) once it expires.
    /// Returns `Some(0.0)` the instant the target should be zeroed.
    pub fn tick_cooldown(&mut self, now: Duration, config: &MmuConfig) -> Option<f64> {
        if self.cooldown != CooldownState::CooldownPending {
            return None;
        }
        if !self.cooldown_timer.is_running() {
            self.cooldown_timer.start(now);
            return None;
        }
        let period = Duration::from_secs(u64::from(config.safety_timer_minutes) * 60);
        if self.cooldown_timer.expired(now, period) {
            self.cooldown = CooldownState::Cooldown;
            self.cooldown_timer.stop();
            return Some(0.0);
        }
        None
    }

    /// Clears `CooldownPending`; if `Cooldown` was set and a target was
    /// saved, returns that target so the caller can re-issue it and wait for
    /// `|target - current| <= 5`. Clears `Cooldown` once called.
    pub fn resume_hotend_temp(&mut self) -> Option<f64> {
        if self.cooldown == CooldownState::CooldownPending {
            self.cooldown = CooldownState::None;
            self.cooldown_timer.stop();
            return None;
        }
        if self.cooldown == CooldownState::Cooldown {
            self.cooldown = CooldownState::None;
            self.cooldown_timer.stop();
            return self.saved.hotend_target;
        }
        None
    }

    /// Returns the saved position to move back to, clearing
    /// `park_extruder`, if it was set.
    pub fn resume_unpark(&mut self) -> Option<Position> {
        if !self.saved.park_extruder {
            return None;
        }
        self.saved.park_extruder = false;
        let position = self.saved.position.take();
        self.saved.hotend_target = None;
        position
    }
}

pub const TARGET_TOLERANCE_C: f64 = 5.0;

pub fn temperature_restored(target: f64, current: f64) -> bool {
    (target - current).abs() <= TARGET_TOLERANCE_C
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MmuConfig {
        MmuConfig::default()
    }

    #[test]
    fn save_and_park_is_idempotent_without_intervening_resume() {
        let mut sr = SaveRestore::new();
        let pos = Position { x: 1.0, y: 2.0, z: 3.0 };
        let first = sr.save_and_park(pos, 200.0, true, &cfg());
        assert!(first.is_some());
        let second = sr.save_and_park(Position { x: 9.0, y: 9.0, z: 9.0 }, 999.0, true, &cfg());
        assert!(second.is_none());
        assert_eq!(sr.saved.position, Some(pos));
    }

    #[test]
    fn cooldown_expires_after_exact_period() {
        let mut sr = SaveRestore::new();
        sr.save_hotend_temp(true, 210.0);
        let config = cfg();
        let period = Duration::from_secs(u64::from(config.safety_timer_minutes) * 60);

        assert_eq!(sr.tick_cooldown(Duration::from_secs(0), &config), None);
        assert_eq!(sr.tick_cooldown(period - Duration::from_secs(1), &config), None);
        assert_eq!(sr.tick_cooldown(period, &config), Some(0.0));
        assert_eq!(sr.cooldown, CooldownState::Cooldown);
    }

    #[test]
    fn stopping_timer_allows_clean_restart() {
        let mut sr = SaveRestore::new();
        let config = cfg();
        sr.save_hotend_temp(true, 210.0);
        sr.tick_cooldown(Duration::from_secs(0), &config);
        sr.resume_hotend_temp();
        assert_eq!(sr.cooldown, CooldownState::None);
        assert!(!sr.cooldown_timer.is_running());

        sr.save_hotend_temp(true, 210.0);
        assert_eq!(sr.tick_cooldown(Duration::from_secs(0), &config), None);
        assert!(sr.cooldown_timer.is_running());
    }

    #[test]
    fn resume_hotend_temp_returns_saved_target_after_cooldown() {
        let mut sr = SaveRestore::new();
        let config = cfg();
        sr.save_hotend_temp(true, 215.0);
        let period = Duration::from_secs(u64::from(config.safety_timer_minutes) * 60);
        sr.tick_cooldown(Duration::from_secs(0), &config);
        sr.tick_cooldown(period, &config);
        let target = sr.resume_hotend_temp();
        assert_eq!(target, Some(215.0));
    }

    #[test]
    fn temperature_restored_checks_tolerance() {
        assert!(temperature_restored(210.0, 206.0));
        assert!(!temperature_restored(210.0, 200.0));
    }
}
