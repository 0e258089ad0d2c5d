// tests/scenarios.rs - end-to-end scenarios from spec.md §8.
use std::sync::Arc;
use std::sync::Mutex;

use mmu_coordinator::config::MmuConfig;
use mmu_coordinator::mmu::coordinator::{Coordinator, CoordinatorState, PrinterCollaborators};
use mmu_coordinator::mmu::error_codes::ErrorCode;
use mmu_coordinator::mmu::error_converter::convert_mmu_error_code;
use mmu_coordinator::mmu::catalogue::ErrCode;
use mmu_coordinator::mmu::progress::{LoadUnloadMode, ProgressTracker};
use mmu_coordinator::mmu::error_codes::{CommandInProgress, ProgressCode};
use mmu_coordinator::mmu::protocol::{FakeProtocol, StepStatus};
use mmu_coordinator::mmu::save_restore::Position;
use mmu_coordinator::mmu::verify::{FilamentSensorState, VerifyOutcome, VerifyLeg};

struct TestCollaborators {
    position: Position,
    hotend_target: Mutex<f64>,
    hotend_current: Mutex<f64>,
}

impl Default for TestCollaborators {
    fn default() -> Self {
        Self {
            position: Position { x: 0.0, y: 0.0, z: 0.0 },
            hotend_target: Mutex::new(210.0),
            hotend_current: Mutex::new(210.0),
        }
    }
}

impl PrinterCollaborators for TestCollaborators {
    fn current_position(&self) -> Position {
        self.position
    }
    fn current_hotend_target(&self) -> f64 {
        *self.hotend_target.lock().unwrap()
    }
    fn current_hotend_temp(&self) -> f64 {
        *self.hotend_current.lock().unwrap()
    }
    fn set_target_hotend(&self, target: f64) {
        *self.hotend_target.lock().unwrap() = target;
    }
    fn printing_is_active(&self) -> bool {
        true
    }
    fn filament_sensor(&self) -> FilamentSensorState {
        FilamentSensorState::AtFsensor
    }
    fn idle_tick(&self) {}
    fn move_extruder_relative(&self, _delta_mm: f64) {}
    fn finda_detects_filament(&self) -> bool {
        true
    }
    fn num_joins(&self) -> u8 {
        0
    }
    fn spool_2(&self, _slot: u8) -> Option<u8> {
        None
    }
    fn enqueue_gcode(&self, _gcode: &str) {}
    fn cutter_enabled(&self) -> bool {
        true
    }
    fn disable_mmu_in_settings(&self) {}
    fn stop_print(&self) {}
}

fn active_coordinator(protocol: FakeProtocol) -> Coordinator<FakeProtocol, TestCollaborators> {
    let mut coord = Coordinator::new(
        MmuConfig::default(),
        Arc::new(protocol),
        Arc::new(TestCollaborators::default()),
    );
    // Scenarios exercise command-level behaviour, not the handshake itself.
    coord.start_active_for_test();
    coord
}

#[tokio::test]
async fn scenario_1_normal_tool_change_reports_expected_progress_sequence() {
    let mut tracker = ProgressTracker::new();
    let cmd = CommandInProgress::ToolChange;

    let steps = [
        (ProgressCode::UnloadingToFinda, 20),
        (ProgressCode::FeedingToFinda, 40),
        (ProgressCode::FeedingToBondtech, 60),
        (ProgressCode::FeedingToFSensor, 80),
        (ProgressCode::DisengagingIdler, 100),
    ];
    for (code, expected_pct) in steps {
        let tracked = tracker.track(cmd, code, 0);
        assert_eq!(tracked.percentage, expected_pct);
        assert_eq!(tracked.mode, LoadUnloadMode::Change);
    }

    let protocol = FakeProtocol::new(vec![StepStatus::Finished]);
    let mut coord = active_coordinator(protocol);
    let ok = coord.tool_change(3).await.unwrap();
    assert!(ok);
    assert_eq!(coord.get_current_tool(), 3);
}

#[tokio::test]
async fn scenario_2_finda_didnt_switch_on_maps_to_catalogue_entry_and_retry_presses_middle() {
    let desc = convert_mmu_error_code(ErrorCode(0x8002));
    assert_eq!(desc.code, ErrCode::MechanicalFindaDidntTrigger);

    let protocol = FakeProtocol::new(vec![]);
    let mut coord = active_coordinator(protocol);
    coord.inject_error_for_test(
        CommandInProgress::LoadFilament,
        ErrorCode(0x8002),
        mmu_coordinator::mmu::reporter::ErrorSource::Mmu,
    );
    // The catalogue entry's Retry slot sits at index 1 (Middle) per the
    // [NoOperation, Retry, Continue] button layout in mmu/catalogue.rs.
    coord.simulate_button_response_for_test(mmu_coordinator::mmu::buttons::ButtonOperation::Retry);
    coord.drive_check_user_input_for_test().await.unwrap();

    let calls = coord.protocol_calls_for_test();
    assert!(calls.iter().any(|c| c == "button(1)"));
}

#[test]
fn scenario_3_pulley_reset_prioritised_over_overtemp_warn() {
    use mmu_coordinator::mmu::error_codes::{TMC_OVER_TEMPERATURE_WARN, TMC_PULLEY_BIT, TMC_RESET};
    let code = TMC_PULLEY_BIT | TMC_RESET | TMC_OVER_TEMPERATURE_WARN;
    let desc = convert_mmu_error_code(code);
    assert_eq!(desc.code, ErrCode::ElectroTmcPulleyDriverReset);
}

#[tokio::test]
async fn scenario_4_three_verify_failures_cut_once_then_report_load_to_extruder_failed() {
    let protocol = FakeProtocol::new(vec![
        StepStatus::Finished,
        StepStatus::Finished,
        StepStatus::Finished,
    ]);
    let mut coord = active_coordinator(protocol);
    let mut attempts = 0;
    let ok = coord
        .tool_change_common_once(2, true, |_| {
            attempts += 1;
            VerifyOutcome::Failed(VerifyLeg::Forward)
        })
        .await
        .unwrap();
    assert!(!ok);
    assert_eq!(attempts, 3);
    let cut_calls = coord
        .protocol_calls_for_test()
        .into_iter()
        .filter(|c| c.starts_with("cut_filament"))
        .count();
    assert_eq!(cut_calls, 1);
}

#[test]
fn scenario_5_cooldown_timer_then_restore_within_tolerance() {
    use mmu_coordinator::mmu::save_restore::{temperature_restored, SaveRestore};
    use std::time::Duration;

    let config = MmuConfig::default();
    let mut sr = SaveRestore::new();
    sr.save_hotend_temp(true, 210.0);

    let period = Duration::from_secs(u64::from(config.safety_timer_minutes) * 60);
    assert_eq!(sr.tick_cooldown(Duration::ZERO, &config), None);
    let zeroed = sr.tick_cooldown(period, &config);
    assert_eq!(zeroed, Some(0.0));

    let restored_target = sr.resume_hotend_temp().unwrap();
    assert_eq!(restored_target, 210.0);
    assert!(temperature_restored(restored_target, 206.0));
    assert!(!temperature_restored(restored_target, 150.0));
}

#[tokio::test]
async fn scenario_6_read_register_while_stopped_returns_false_without_protocol_call() {
    let protocol = FakeProtocol::new(vec![]);
    let mut coord = Coordinator::new(
        MmuConfig::default(),
        Arc::new(protocol),
        Arc::new(TestCollaborators::default()),
    );
    assert_eq!(coord.state(), CoordinatorState::Stopped);
    let result = coord.read_register(0x01).await.unwrap();
    assert_eq!(result, None);
    assert!(coord.protocol_calls_for_test().is_empty());
}
