// src/mmu/coordinator.rs - top-level MMU coordination algorithm (spec.md §4.9).
//
// Grounded on `original_source/.../mmu2_mk4.cpp`'s `MMU2` class: the
// `Start/Stop/tool_change/load_filament/unload/cut_filament/eject_filament`
// public surface, `manage_response`'s blocking-wait switch, and
// `ToolChangeCommonOnce`'s retry/cut-and-retry policy. The single-threaded
// cooperative scheduling model (spec.md §5) maps onto "a single tokio task
// owns this struct" -- every `&mut self` method assumes exclusive access,
// exactly like the original's lack of locking.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::MmuConfig;
use crate::error::CoordinatorError;

use super::buttons::ButtonOperation;
use super::catalogue::{self, ErrCode};
use super::error_codes::{CommandInProgress, ProgressCode};
use super::error_converter::convert_mmu_error_code;
use super::error_codes::ErrorCode;
use super::fsm::{DialogOwnership, Fsm};
use super::guard::CommandInProgressManager;
use super::progress::ProgressTracker;
use super::protocol::{Protocol, ResetLevel, StepStatus};
use super::reporter::{ErrorSource, Report, Reporter};
use super::save_restore::{temperature_restored, Position, SaveRestore};
use super::verify::{self, FilamentSensorState, VerifyLeg, VerifyOutcome};
use super::NO_TOOL;

/// Per-step distance the try-load probe moves the extruder while sampling
/// the filament sensor (spec.md §4.8).
const VERIFY_STEP_MM: f64 = 1.0;

/// Short E-motor retract scheduled for FSENSOR_DIDNT_SWITCH_OFF/
/// FSENSOR_TOO_EARLY before forwarding the user's button to the MMU
/// (spec.md §4.9 `CheckUserInput`).
const HELPER_RETRACT_MM: f64 = -2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Stopped,
    Connecting,
    Active,
}

/// Printer-side state the Coordinator needs but does not own (spec.md §6.1's
/// Motion/Thermal/Print-state collaborators, collapsed to the handful of
/// queries and commands the coordination algorithm actually issues).
pub trait PrinterCollaborators: Send + Sync {
    fn current_position(&self) -> Position;
    fn current_hotend_target(&self) -> f64;
    fn current_hotend_temp(&self) -> f64;
    fn set_target_hotend(&self, target: f64);
    fn printing_is_active(&self) -> bool;
    fn filament_sensor(&self) -> FilamentSensorState;
    /// Invoked once per `manage_response` spin, standing in for the Marlin
    /// idle hook pumping USB/thermal/GUI (spec.md §5).
    fn idle_tick(&self);

    /// Moves the extruder by `delta_mm` (negative retracts); used by the
    /// try-load probe (spec.md §4.8) and the FSENSOR helper retract
    /// (spec.md §4.9 `CheckUserInput`).
    fn move_extruder_relative(&self, delta_mm: f64);

    /// Printer-side FINDA reading, independent of the MMU's own report
    /// (spec.md §6.1 "Filament sensor", §4.9 `CheckFINDARunout`).
    fn finda_detects_filament(&self) -> bool;

    /// Spool-join settings (spec.md §6.1 "Spool join").
    fn num_joins(&self) -> u8;
    fn spool_2(&self, slot: u8) -> Option<u8>;

    /// Enqueues a high-level G-code command for the printer's own planner to
    /// execute (spec.md §6.1 `enqueue_gcode`); used for both `CheckFINDARunout`
    /// and the `Load`/`Eject` menu dispatch.
    fn enqueue_gcode(&self, gcode: &str);

    /// Settings store (spec.md §6.1).
    fn cutter_enabled(&self) -> bool;
    fn disable_mmu_in_settings(&self);
    fn stop_print(&self);
}

/// Cumulative counters exposed by `get_statistics` (SPEC_FULL.md §B
/// supplement -- the original exposes per-axis fail counts via EEPROM that
/// this coordination core tracks in memory instead).
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorStats {
    pub tool_changes: u32,
    pub loads: u32,
    pub unloads: u32,
    pub cuts: u32,
    pub ejects: u32,
    pub tmc_failures: u32,
    pub total_errors: u32,
}

/// Process-wide recursion guard for `mmu_loop` (spec.md §9: "a plain
/// boolean suffices, no atomic needed" under the single-task model, but an
/// `AtomicBool` costs nothing and removes any doubt under `&self` methods).
static MMU_LOOP_REENTERED: AtomicBool = AtomicBool::new(false);

pub struct Coordinator<P: Protocol, C: PrinterCollaborators> {
    protocol: Arc<P>,
    collaborators: Arc<C>,
    config: MmuConfig,

    state: CoordinatorState,
    current_tool: u8,
    tool_change_tool: u8,

    guard_manager: CommandInProgressManager,
    reporter: Reporter,
    progress_tracker: ProgressTracker,
    fsm: Fsm,
    dialog_ownership: DialogOwnership,
    save_restore: SaveRestore,

    last_error_source: ErrorSource,
    printer_error: Option<u16>,
    seen_errors: std::collections::HashSet<u16>,
    stats: CoordinatorStats,

    /// Monotonic clock surrogate for the cooldown timer; advanced explicitly
    /// so tests can drive it deterministically instead of reading a real clock.
    clock: Duration,

    /// Hardware button press latched by `mmu_loop` (spec.md §4.9's
    /// `lastButton`), drained by the next `check_user_input` call.
    last_mmu_button: Option<u8>,

    /// `CheckFINDARunout` is checked at most once per `Finished` occurrence,
    /// reset whenever a new command begins (spec.md §4.9).
    finda_runout_checked: bool,

    /// Non-`None` while `ResumeHotendTemp` is waiting for the hotend to
    /// reach `target` within tolerance (spec.md §4.7); drained by
    /// `manage_response`'s own loop rather than a nested blocking wait.
    restoring_hotend_target: Option<f64>,
}

impl<P: Protocol, C: PrinterCollaborators> Coordinator<P, C> {
    pub fn new(config: MmuConfig, protocol: Arc<P>, collaborators: Arc<C>) -> Self {
        Self {
            protocol,
            collaborators,
            config,
            state: CoordinatorState::Stopped,
            current_tool: NO_TOOL,
            tool_change_tool: NO_TOOL,
            guard_manager: CommandInProgressManager::new(),
            reporter: Reporter::new(),
            progress_tracker: ProgressTracker::new(),
            fsm: Fsm::new(),
            dialog_ownership: DialogOwnership::default(),
            save_restore: SaveRestore::new(),
            last_error_source: ErrorSource::None,
            printer_error: None,
            seen_errors: std::collections::HashSet::new(),
            stats: CoordinatorStats::default(),
            clock: Duration::ZERO,
            last_mmu_button: None,
            finda_runout_checked: false,
            restoring_hotend_target: None,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn get_current_tool(&self) -> u8 {
        self.current_tool
    }

    pub fn get_tool_change_tool(&self) -> u8 {
        self.tool_change_tool
    }

    pub fn get_statistics(&self) -> CoordinatorStats {
        self.stats
    }

    /// Advances the internal clock surrogate; real callers would pass
    /// `Instant::now()`-derived durations, tests pass synthetic ones.
    pub fn advance_clock(&mut self, by: Duration) {
        self.clock += by;
    }

    // ---- state machine -------------------------------------------------

    pub async fn start(&mut self) -> Result<(), CoordinatorError> {
        self.state = CoordinatorState::Connecting;
        self.protocol.start().await?;
        let status = self.protocol.step().await?;
        match status {
            StepStatus::VersionMismatch => {
                self.state = CoordinatorState::Stopped;
                warn!("MMU firmware version mismatch; coordinator stopped");
            }
            StepStatus::CommunicationTimeout | StepStatus::ProtocolError => {
                self.state = CoordinatorState::Connecting;
            }
            _ => {
                self.state = CoordinatorState::Active;
                info!("MMU coordinator active");
            }
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), CoordinatorError> {
        self.protocol.stop().await?;
        self.state = CoordinatorState::Stopped;
        Ok(())
    }

    pub fn stop_keep_powered(&mut self) {
        self.state = CoordinatorState::Stopped;
    }

    pub async fn reset(&mut self, level: ResetLevel) -> Result<(), CoordinatorError> {
        self.protocol.reset_mmu(level).await?;
        self.state = CoordinatorState::Connecting;
        Ok(())
    }

    fn require_active(&self) -> Result<(), CoordinatorError> {
        if self.state != CoordinatorState::Active {
            return Err(CoordinatorError::NotReady(self.state));
        }
        Ok(())
    }

    // ---- reporting -------------------------------------------------------

    fn begin_report(&mut self, cmd: CommandInProgress) {
        self.finda_runout_checked = false;
        let event = self.guard_manager.enter_without_guard(cmd);
        if event.is_some() {
            self.reporter.set_report(Report::Progress {
                cmd,
                code: ProgressCode::EngagingIdler,
                step_progress: 0,
            });
            self.fsm
                .run_loop(&mut self.reporter, &self.dialog_ownership, &mut self.progress_tracker);
        }
    }

    fn end_report(&mut self, cmd: CommandInProgress) {
        let event = self.guard_manager.leave();
        if event.is_some() {
            self.reporter.set_report(Report::Progress {
                cmd,
                code: ProgressCode::OK,
                step_progress: 100,
            });
            self.fsm
                .run_loop(&mut self.reporter, &self.dialog_ownership, &mut self.progress_tracker);
        }
    }

    fn report_progress(&mut self, cmd: CommandInProgress, code: ProgressCode, step_progress: u8) {
        self.reporter.set_report(Report::Progress {
            cmd,
            code,
            step_progress,
        });
        self.fsm
            .run_loop(&mut self.reporter, &self.dialog_ownership, &mut self.progress_tracker);
    }

    fn report_error(&mut self, cmd: CommandInProgress, raw: ErrorCode, source: ErrorSource) {
        let desc = convert_mmu_error_code(raw);
        if self.seen_errors.insert(raw.bits()) {
            self.stats.total_errors += 1;
            if raw.bits() & super::error_codes::TMC_MASK != 0 {
                self.stats.tmc_failures += 1;
            }
            error!(code = ?desc.code, "MMU error reported");
        }
        self.last_error_source = source;
        self.reporter.set_report(Report::Error {
            cmd,
            code: desc.code,
            source,
        });
        self.fsm
            .run_loop(&mut self.reporter, &self.dialog_ownership, &mut self.progress_tracker);
    }

    // ---- non-blocking pump (`mmu_loop`, spec.md §4.9) ---------------------

    pub async fn mmu_loop(&mut self) -> Result<(), CoordinatorError> {
        if MMU_LOOP_REENTERED.swap(true, Ordering::SeqCst) {
            debug!("mmu_loop re-entered; ignoring nested call");
            return Ok(());
        }
        let result = self.mmu_loop_inner().await;
        MMU_LOOP_REENTERED.store(false, Ordering::SeqCst);
        result
    }

    async fn mmu_loop_inner(&mut self) -> Result<(), CoordinatorError> {
        self.check_user_input().await?;

        let status = self.protocol.step().await?;
        let proto_state = self.protocol.state();

        match status {
            StepStatus::Finished => {
                if !self.finda_runout_checked {
                    self.check_finda_runout();
                    self.finda_runout_checked = true;
                }
                self.report_progress(
                    proto_state.command_in_progress,
                    proto_state.progress_code,
                    100,
                );
            }
            StepStatus::ButtonPushed(idx) => {
                self.last_mmu_button = Some(idx);
                self.check_user_input().await?;
            }
            StepStatus::CommandError
            | StepStatus::CommunicationTimeout
            | StepStatus::ProtocolError
            | StepStatus::PrinterError => {
                let raw = ErrorCode(proto_state.error_code);
                let source = if status == StepStatus::PrinterError {
                    ErrorSource::Printer
                } else {
                    ErrorSource::Mmu
                };
                self.report_error(proto_state.command_in_progress, raw, source);
            }
            StepStatus::VersionMismatch => {
                self.state = CoordinatorState::Stopped;
            }
            StepStatus::Processing | StepStatus::Interrupted | StepStatus::CommunicationRecovered => {}
        }

        Ok(())
    }

    /// `CheckFINDARunout` (spec.md §4.9): FINDA reports no filament while the
    /// printer-side sensor still reports filament in the nozzle. Enqueues a
    /// spool-joining filament change if one is configured for the current
    /// slot, otherwise a plain filament change. Issued as G-code, never as
    /// an MMU command (the recursion guard forbids that from here anyway).
    fn check_finda_runout(&mut self) {
        if self.collaborators.finda_detects_filament() {
            return;
        }
        if self.collaborators.filament_sensor() != FilamentSensorState::InNozzle {
            return;
        }

        let joined_slot = if self.collaborators.num_joins() > 0 {
            self.collaborators.spool_2(self.current_tool)
        } else {
            None
        };
        match joined_slot {
            Some(slot) => {
                warn!(tool = self.current_tool, joined = slot, "FINDA runout; enqueuing spool-joined filament change");
                self.collaborators.enqueue_gcode(&format!("M600 T{slot}"));
            }
            None => {
                warn!(tool = self.current_tool, "FINDA runout; enqueuing filament change");
                self.collaborators.enqueue_gcode("M600");
            }
        }
    }

    // ---- blocking wait (`manage_response`, spec.md §4.9) ------------------

    async fn manage_response(&mut self) -> Result<bool, CoordinatorError> {
        loop {
            self.collaborators.idle_tick();
            self.mmu_loop().await?;

            if let Some(target) = self.save_restore.tick_cooldown(self.clock, &self.config) {
                self.collaborators.set_target_hotend(target);
            }

            // §4.7 `ResumeHotendTemp`'s wait loop: re-issued via the same
            // pump this function already runs, rather than a nested
            // blocking call (which would immediately no-op against
            // `mmu_loop`'s reentrancy guard).
            if let Some(target) = self.restoring_hotend_target {
                if temperature_restored(target, self.collaborators.current_hotend_temp()) {
                    self.restoring_hotend_target = None;
                    if let Some(pos) = self.save_restore.resume_unpark() {
                        debug!(?pos, "resuming parked position");
                    }
                    return Ok(true);
                }
                tokio::task::yield_now().await;
                continue;
            }

            let status = self.protocol.step().await?;
            match status {
                StepStatus::Finished => {
                    self.arm_hotend_restore_if_needed();
                    if self.restoring_hotend_target.is_some() {
                        continue;
                    }
                    if let Some(pos) = self.save_restore.resume_unpark() {
                        debug!(?pos, "resuming parked position");
                    }
                    return Ok(true);
                }
                StepStatus::Interrupted => return Ok(false),
                StepStatus::VersionMismatch => {
                    self.check_user_input().await?;
                    return Ok(true);
                }
                StepStatus::PrinterError => {
                    self.save_park_and_cool();
                    self.check_user_input().await?;
                }
                StepStatus::CommandError
                | StepStatus::CommunicationTimeout
                | StepStatus::ProtocolError => {
                    self.save_park_and_cool();
                    self.check_user_input().await?;
                }
                StepStatus::ButtonPushed(idx) => {
                    self.save_park_and_cool();
                    let _ = self.protocol.button(idx).await;
                    self.check_user_input().await?;
                }
                StepStatus::CommunicationRecovered => {
                    self.arm_hotend_restore_if_needed();
                    self.save_restore.resume_unpark();
                }
                StepStatus::Processing => {
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Arms the `ResumeHotendTemp` wait (spec.md §4.7) if a cooled-down
    /// target is pending restore; the caller's own loop pumps until it lands
    /// within tolerance.
    fn arm_hotend_restore_if_needed(&mut self) {
        if let Some(target) = self.save_restore.resume_hotend_temp() {
            self.collaborators.set_target_hotend(target);
            self.restoring_hotend_target = Some(target);
        }
    }

    fn save_park_and_cool(&mut self) {
        let pos = self.collaborators.current_position();
        let target = self.collaborators.current_hotend_target();
        self.save_restore
            .save_and_park(pos, target, true, &self.config);
        self.save_restore.save_hotend_temp(true, target);
    }

    // ---- user input dispatch (`CheckUserInput`, spec.md §4.9) -------------

    async fn check_user_input(&mut self) -> Result<(), CoordinatorError> {
        // Order of checks (spec.md §4.9): the UI-selected response first,
        // then any button the MMU itself latched asynchronously.
        if let Some(op) = self.fsm.selected_operation() {
            self.fsm.clear_selected_operation();
            self.dispatch_button_operation(op).await?;
        }

        if let Some(idx) = self.last_mmu_button.take() {
            if self.last_error_source == ErrorSource::Mmu {
                if let Some(desc) = self.fsm.current_error() {
                    if let Some(&op) = desc.buttons.get(idx as usize) {
                        self.dispatch_button_operation(op).await?;
                    }
                }
            } else {
                self.printer_error = None;
            }
        }

        Ok(())
    }

    /// Acts on one selected `ButtonOperation` (spec.md §4.9 `CheckUserInput`'s
    /// dispatch table).
    async fn dispatch_button_operation(
        &mut self,
        op: ButtonOperation,
    ) -> Result<(), CoordinatorError> {
        self.arm_hotend_restore_if_needed();

        match op {
            ButtonOperation::NoOperation => {}
            // Left/Middle/Right (spec.md §4.9): these are the catalogue's
            // physical button labels, forwarded to the MMU as its wire
            // position rather than interpreted here.
            ButtonOperation::Retry | ButtonOperation::Continue | ButtonOperation::Unload => {
                if self.last_error_source == ErrorSource::Mmu {
                    if let Some(desc) = self.fsm.current_error() {
                        if matches!(
                            desc.code,
                            ErrCode::MechanicalFsensorFilamentStuck
                                | ErrCode::MechanicalFsensorTooEarly
                        ) {
                            self.collaborators.move_extruder_relative(HELPER_RETRACT_MM);
                        }
                        if let Some(index) = button_index_for(desc, op) {
                            self.protocol.button(index).await?;
                        }
                    }
                } else {
                    self.printer_error = None;
                }
            }
            ButtonOperation::ResetMmu => {
                self.reset(ResetLevel::ResetPin).await?;
            }
            ButtonOperation::StopPrint => {
                // Reserved for higher layers (spec.md §4.9): the printer's
                // own print-management stack owns the stop sequence.
                self.collaborators.stop_print();
            }
            ButtonOperation::DisableMmu => {
                self.collaborators.disable_mmu_in_settings();
                self.stop().await?;
            }
            ButtonOperation::TuneMmu => {
                self.tune();
            }
            ButtonOperation::Load => {
                self.collaborators.enqueue_gcode("M701");
            }
            ButtonOperation::Eject => {
                self.collaborators.enqueue_gcode("M702");
            }
        }
        Ok(())
    }

    // ---- register I/O (spec.md §4.10) -------------------------------------

    pub async fn read_register(&mut self, addr: u8) -> Result<Option<u16>, CoordinatorError> {
        if self.state != CoordinatorState::Active {
            return Ok(None);
        }
        loop {
            match self.protocol.read_register(addr).await {
                Ok(value) => return Ok(Some(value)),
                Err(_) => {
                    if !self.manage_response().await? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    pub async fn write_register(&mut self, addr: u8, value: u16) -> Result<bool, CoordinatorError> {
        if self.state != CoordinatorState::Active {
            return Ok(false);
        }
        loop {
            match self.protocol.write_register(addr, value).await {
                Ok(()) => {
                    // Mirror the two registers the printer-side try-load
                    // calculation depends on (spec.md §4.10).
                    const EXTRA_LOAD_DISTANCE_REG: u8 = 0x0B;
                    const PULLEY_SLOW_FEEDRATE_REG: u8 = 0x0C;
                    match addr {
                        EXTRA_LOAD_DISTANCE_REG => {
                            self.config.extra_load_distance_mm = value as f64;
                        }
                        PULLEY_SLOW_FEEDRATE_REG => {
                            self.config.pulley_slow_feed_rate_mm_s = value as f64;
                        }
                        _ => {}
                    }
                    return Ok(true);
                }
                Err(_) => {
                    if !self.manage_response().await? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    // ---- Tune (spec.md §4.11) ---------------------------------------------

    // ---- test/integration helpers ------------------------------------------
    //
    // These expose otherwise-private machinery for black-box integration
    // tests (tests/scenarios.rs) that construct a `Coordinator` directly
    // from its public crate API instead of reaching into the module tree.

    /// Forces `Active` without running the real handshake.
    pub fn start_active_for_test(&mut self) {
        self.state = CoordinatorState::Active;
    }

    /// Injects an error report as if it had arrived via `mmu_loop`.
    pub fn inject_error_for_test(&mut self, cmd: CommandInProgress, raw: ErrorCode, source: ErrorSource) {
        self.report_error(cmd, raw, source);
    }

    /// Simulates the UI delivering a button click to the FSM driver.
    pub fn simulate_button_response_for_test(&mut self, op: ButtonOperation) {
        self.fsm.select_operation(op);
    }

    pub async fn drive_check_user_input_for_test(&mut self) -> Result<(), CoordinatorError> {
        self.check_user_input().await
    }

    pub fn protocol_calls_for_test(&self) -> Vec<String> {
        self.protocol.calls()
    }

    pub fn tune(&mut self) {
        if let Some(desc) = self.fsm.current_error() {
            match desc.code {
                ErrCode::MechanicalSelectorCannotHome | ErrCode::MechanicalIdlerCannotHome => {
                    info!("opening idler-stallguard-threshold tuning UI");
                }
                _ => {}
            }
        }
    }

    // ---- public operations (spec.md §6.2) ----------------------------------

    pub async fn button(&mut self, index: u8) -> Result<(), CoordinatorError> {
        self.protocol.button(index).await?;
        Ok(())
    }

    pub async fn home(&mut self, mode: u8) -> Result<(), CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::Homing);
        self.protocol.home(mode).await?;
        self.manage_response().await?;
        self.end_report(CommandInProgress::Homing);
        Ok(())
    }

    /// `set_filament_type` is a TODO in the original source (spec.md §9
    /// Open Question); reproduced here as a no-op that always succeeds.
    pub fn set_filament_type(&mut self, _slot: u8, _filament_type: u8) -> Result<(), CoordinatorError> {
        Ok(())
    }

    pub async fn unload(&mut self) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::UnloadFilament);
        self.protocol.unload_filament().await?;
        let ok = self.manage_response().await?;
        self.end_report(CommandInProgress::UnloadFilament);
        if ok {
            self.current_tool = NO_TOOL;
            self.tool_change_tool = NO_TOOL;
            self.stats.unloads += 1;
        }
        Ok(ok)
    }

    pub async fn cut_filament(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::CutFilament);
        self.protocol.cut_filament(slot).await?;
        let ok = self.manage_response().await?;
        self.end_report(CommandInProgress::CutFilament);
        if ok {
            self.stats.cuts += 1;
        }
        Ok(ok)
    }

    pub async fn eject_filament(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::EjectFilament);
        self.protocol.eject_filament(slot).await?;
        let ok = self.manage_response().await?;
        self.end_report(CommandInProgress::EjectFilament);
        if ok {
            self.stats.ejects += 1;
        }
        Ok(ok)
    }

    pub async fn load_filament(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::LoadFilament);
        self.protocol.load_filament(slot).await?;
        let ok = self.manage_response().await?;
        self.end_report(CommandInProgress::LoadFilament);
        if ok {
            self.stats.loads += 1;
        }
        Ok(ok)
    }

    pub async fn load_filament_to_nozzle(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::LoadToNozzle);
        self.protocol.load_filament(slot).await?;
        let ok = self.manage_response().await?;
        self.end_report(CommandInProgress::LoadToNozzle);
        if ok {
            self.stats.loads += 1;
        }
        Ok(ok)
    }

    pub async fn loading_test(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.begin_report(CommandInProgress::TestLoad);
        self.protocol.load_filament(slot).await?;
        let ok = self.manage_response().await?;
        if ok {
            let _ = self.unload().await?;
        }
        self.end_report(CommandInProgress::TestLoad);
        Ok(ok)
    }

    /// `tool_change(code, slot)` three-way dispatch (spec.md §6.2):
    /// `'?'` asks the current tool without changing anything, `'x'` forces a
    /// change, `'c'` changes only if `slot` differs from the current tool.
    pub async fn tool_change_code(&mut self, code: char, slot: u8) -> Result<bool, CoordinatorError> {
        match code {
            '?' => Ok(self.current_tool == slot),
            'x' => self.tool_change(slot).await,
            'c' => {
                if self.current_tool == slot {
                    Ok(true)
                } else {
                    self.tool_change(slot).await
                }
            }
            _ => Err(CoordinatorError::Config(format!("unknown tool_change code '{code}'"))),
        }
    }

    pub async fn tool_change_full(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.tool_change(slot).await
    }

    pub async fn tool_change(&mut self, slot: u8) -> Result<bool, CoordinatorError> {
        self.require_active()?;
        self.tool_change_tool = slot;
        self.begin_report(CommandInProgress::ToolChange);

        let mut ok = self.tool_change_common_once_default_verify(slot).await?;
        if !ok {
            // Loop on false by synthesising a printer-side
            // LOAD_TO_EXTRUDER_FAILED error, forcing the user-wait UI, then
            // re-running (spec.md §4.9's `ToolChangeCommonOnce` callers).
            self.protocol
                .set_printer_error(super::error_codes::LOAD_TO_EXTRUDER_FAILED.bits());
            self.report_error(
                CommandInProgress::ToolChange,
                super::error_codes::LOAD_TO_EXTRUDER_FAILED,
                ErrorSource::Printer,
            );
            self.check_user_input().await?;
            ok = self.tool_change_common_once_default_verify(slot).await?;
        }

        self.end_report(CommandInProgress::ToolChange);
        if ok {
            self.current_tool = slot;
            self.stats.tool_changes += 1;
        }
        Ok(ok)
    }

    async fn tool_change_common_once_default_verify(
        &mut self,
        slot: u8,
    ) -> Result<bool, CoordinatorError> {
        let cutter_enabled = self.collaborators.cutter_enabled();
        let config = self.config.clone();
        let collaborators = Arc::clone(&self.collaborators);
        let distance = config.verify_load_distance_mm();

        self.tool_change_common_once(slot, cutter_enabled, move |_attempt| {
            verify::verify_filament_entered_ptfe(
                &config,
                VERIFY_STEP_MM,
                |leg, _traveled| {
                    let delta = match leg {
                        VerifyLeg::Forward => VERIFY_STEP_MM,
                        VerifyLeg::Backward => -VERIFY_STEP_MM,
                    };
                    collaborators.move_extruder_relative(delta);
                    collaborators.filament_sensor()
                },
                |sample| {
                    let tracked = verify::try_load_progress(sample, distance);
                    tracing::trace!(?tracked, "try-load progress");
                },
            )
        })
        .await
    }

    /// `ToolChangeCommonOnce` (spec.md §4.9): outer loop of at most
    /// `MAX_RETRIES` attempts, cutting on the penultimate attempt if
    /// `cutter_enabled`. `verify` is injected so callers (and tests) can
    /// script try-load outcomes without a real filament sensor.
    pub async fn tool_change_common_once(
        &mut self,
        slot: u8,
        cutter_enabled: bool,
        mut verify: impl FnMut(u32) -> VerifyOutcome,
    ) -> Result<bool, CoordinatorError> {
        let max_retries = self.config.max_retries as u32;
        for attempt in 0..max_retries {
            let remaining = max_retries - attempt;

            let mut inner_ok = false;
            for _inner_attempt in 0..max_retries {
                self.protocol.tool_change(slot).await?;
                if self.manage_response().await? {
                    inner_ok = true;
                    break;
                }
                self.protocol.unload_filament().await?;
                self.manage_response().await?;
                self.save_restore.resume_hotend_temp();
            }
            if !inner_ok {
                continue;
            }

            match verify(attempt) {
                VerifyOutcome::Success => return Ok(true),
                VerifyOutcome::Failed(_) => {
                    self.protocol.unload_filament().await?;
                    self.manage_response().await?;
                    if remaining == 2 && cutter_enabled {
                        self.protocol.cut_filament(slot).await?;
                        self.manage_response().await?;
                        self.stats.cuts += 1;
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Maps the catalogue's button array + the selected operation to a wire
/// Right/Middle/Left index (spec.md §4.6 `ButtonAvailable`).
fn button_index_for(desc: &catalogue::MmuErrDesc, op: ButtonOperation) -> Option<u8> {
    desc.buttons.iter().position(|&b| b == op).map(|i| i as u8)
}
