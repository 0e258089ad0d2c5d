// src/mmu/error_converter.rs - pure raw-code -> catalogue lookup (spec.md §4.1).
//
// Grounded on `original_source/src/mmu2/mmu2_error_converter.cpp`'s
// `ConvertMMUErrorCode`: an exact-match switch over the non-TMC codes, then
// a per-axis dispatch (pulley, then selector, then idler) that checks the
// "soldering needs attention" overlay before the TMC flavour priority chain
// IOIN_MISMATCH > RESET > UNDERVOLTAGE > SHORT_TO_GROUND > OVERTEMP_WARN >
// OVERTEMP_ERROR.
use super::catalogue::{self, ErrCode, MmuErrDesc};
use super::error_codes::{self as codes, ErrorCode};

/// Per-axis TMC flavour resolution, shared by the pulley/selector/idler arms.
/// `axis_bit` gates whether this axis reported anything at all; `soldering`,
/// `err_code`, `flavours` are the catalogue entries to use for the overlay
/// and the six flavour bits respectively, in priority order.
struct AxisCodes {
    axis_bit: ErrorCode,
    soldering: ErrCode,
    ioin_mismatch: ErrCode,
    reset: ErrCode,
    undervoltage: ErrCode,
    short_to_ground: ErrCode,
    overtemp_warn: ErrCode,
    overtemp_error: ErrCode,
}

const PULLEY: AxisCodes = AxisCodes {
    axis_bit: codes::TMC_PULLEY_BIT,
    soldering: ErrCode::ElectroMmuPulleySelftestFailed,
    ioin_mismatch: ErrCode::ElectroTmcPulleyDriverError,
    reset: ErrCode::ElectroTmcPulleyDriverReset,
    undervoltage: ErrCode::ElectroTmcPulleyUndervoltageError,
    short_to_ground: ErrCode::ElectroTmcPulleyDriverShorted,
    overtemp_warn: ErrCode::TemperatureWarningTmcPulleyTooHot,
    overtemp_error: ErrCode::TemperatureTmcPulleyOverheatError,
};

const SELECTOR: AxisCodes = AxisCodes {
    axis_bit: codes::TMC_SELECTOR_BIT,
    soldering: ErrCode::ElectroMmuSelectorSelftestFailed,
    ioin_mismatch: ErrCode::ElectroTmcSelectorDriverError,
    reset: ErrCode::ElectroTmcSelectorDriverReset,
    undervoltage: ErrCode::ElectroTmcSelectorUndervoltageError,
    short_to_ground: ErrCode::ElectroTmcSelectorDriverShorted,
    overtemp_warn: ErrCode::TemperatureWarningTmcSelectorTooHot,
    overtemp_error: ErrCode::TemperatureTmcSelectorOverheatError,
};

const IDLER: AxisCodes = AxisCodes {
    axis_bit: codes::TMC_IDLER_BIT,
    soldering: ErrCode::ElectroMmuIdlerSelftestFailed,
    ioin_mismatch: ErrCode::ElectroTmcIdlerDriverError,
    reset: ErrCode::ElectroTmcIdlerDriverReset,
    undervoltage: ErrCode::ElectroTmcIdlerUndervoltageError,
    short_to_ground: ErrCode::ElectroTmcIdlerDriverShorted,
    overtemp_warn: ErrCode::TemperatureWarningTmcIdlerTooHot,
    overtemp_error: ErrCode::TemperatureTmcIdlerOverheatError,
};

fn resolve_axis(code: ErrorCode, axis: &AxisCodes) -> Option<ErrCode> {
    if !code.contains(axis.axis_bit) {
        return None;
    }
    if code.contains(codes::MMU_SOLDERING_NEEDS_ATTENTION) {
        return Some(axis.soldering);
    }
    // Priority order: first match wins, exactly as the original's
    // `else if` chain over ContainsBit.
    if code.contains(codes::TMC_IOIN_MISMATCH) {
        Some(axis.ioin_mismatch)
    } else if code.contains(codes::TMC_RESET) {
        Some(axis.reset)
    } else if code.contains(codes::TMC_UNDERVOLTAGE_ON_CHARGE_PUMP) {
        Some(axis.undervoltage)
    } else if code.contains(codes::TMC_SHORT_TO_GROUND) {
        Some(axis.short_to_ground)
    } else if code.contains(codes::TMC_OVER_TEMPERATURE_WARN) {
        Some(axis.overtemp_warn)
    } else if code.contains(codes::TMC_OVER_TEMPERATURE_ERROR) {
        Some(axis.overtemp_error)
    } else {
        None
    }
}

fn exact_match(code: ErrorCode) -> Option<ErrCode> {
    Some(match code {
        codes::FINDA_DIDNT_SWITCH_ON => ErrCode::MechanicalFindaDidntTrigger,
        codes::FINDA_DIDNT_SWITCH_OFF => ErrCode::MechanicalFindaFilamentStuck,
        codes::FSENSOR_DIDNT_SWITCH_ON => ErrCode::MechanicalFsensorDidntTrigger,
        codes::FSENSOR_DIDNT_SWITCH_OFF => ErrCode::MechanicalFsensorFilamentStuck,
        codes::FSENSOR_TOO_EARLY => ErrCode::MechanicalFsensorTooEarly,
        codes::FINDA_FLICKERS => ErrCode::MechanicalInspectFinda,
        codes::LOAD_TO_EXTRUDER_FAILED => ErrCode::MechanicalLoadToExtruderFailed,
        codes::FILAMENT_EJECTED => ErrCode::SystemFilamentEjected,
        codes::STALLED_PULLEY | codes::MOVE_PULLEY_FAILED => ErrCode::MechanicalPulleyCannotMove,
        codes::HOMING_SELECTOR_FAILED => ErrCode::MechanicalSelectorCannotHome,
        codes::MOVE_SELECTOR_FAILED => ErrCode::MechanicalSelectorCannotMove,
        codes::HOMING_IDLER_FAILED => ErrCode::MechanicalIdlerCannotHome,
        codes::MOVE_IDLER_FAILED => ErrCode::MechanicalIdlerCannotMove,
        codes::MMU_NOT_RESPONDING => ErrCode::ConnectMmuNotResponding,
        codes::PROTOCOL_ERROR => ErrCode::ConnectCommunicationError,
        codes::FILAMENT_ALREADY_LOADED => ErrCode::SystemFilamentAlreadyLoaded,
        codes::INVALID_TOOL => ErrCode::SystemInvalidTool,
        codes::QUEUE_FULL => ErrCode::SystemQueueFull,
        codes::VERSION_MISMATCH => ErrCode::SystemFwUpdateNeeded,
        codes::INTERNAL => ErrCode::SystemFwRuntimeError,
        codes::FINDA_VS_EEPROM_DISREPANCY => ErrCode::SystemUnloadManually,
        _ => return None,
    })
}

/// Convert a raw wire `ErrorCode` into its catalogue entry (spec.md §4.1).
///
/// Dispatch order: exact-match non-TMC codes first, then axis-by-axis
/// (pulley, selector, idler) TMC resolution, then `OtherUnknownError` as the
/// catch-all for anything unrecognised.
pub fn convert_mmu_error_code(code: ErrorCode) -> &'static MmuErrDesc {
    let resolved = exact_match(code)
        .or_else(|| resolve_axis(code, &PULLEY))
        .or_else(|| resolve_axis(code, &SELECTOR))
        .or_else(|| resolve_axis(code, &IDLER))
        .unwrap_or(ErrCode::OtherUnknownError);

    &catalogue::ERROR_LIST[catalogue::find_index(resolved)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finda_didnt_switch_on_maps_to_finda_didnt_trigger() {
        let desc = convert_mmu_error_code(codes::FINDA_DIDNT_SWITCH_ON);
        assert_eq!(desc.code, ErrCode::MechanicalFindaDidntTrigger);
    }

    #[test]
    fn pulley_reset_wins_over_overtemp_warn() {
        // spec.md §8 scenario 3: pulley axis with RESET and OVERTEMP_WARN
        // set simultaneously must resolve to RESET (higher priority).
        let code = codes::TMC_PULLEY_BIT | codes::TMC_RESET | codes::TMC_OVER_TEMPERATURE_WARN;
        let desc = convert_mmu_error_code(code);
        assert_eq!(desc.code, ErrCode::ElectroTmcPulleyDriverReset);
    }

    #[test]
    fn soldering_overlay_takes_precedence_over_flavour_chain() {
        let code = codes::TMC_SELECTOR_BIT | codes::MMU_SOLDERING_NEEDS_ATTENTION;
        let desc = convert_mmu_error_code(code);
        assert_eq!(desc.code, ErrCode::ElectroMmuSelectorSelftestFailed);
    }

    #[test]
    fn idler_short_to_ground_resolves() {
        let code = codes::TMC_IDLER_BIT | codes::TMC_SHORT_TO_GROUND;
        let desc = convert_mmu_error_code(code);
        assert_eq!(desc.code, ErrCode::ElectroTmcIdlerDriverShorted);
    }

    #[test]
    fn unrecognised_code_falls_back_to_unknown() {
        let desc = convert_mmu_error_code(ErrorCode(0x1234));
        assert_eq!(desc.code, ErrCode::OtherUnknownError);
    }
}
