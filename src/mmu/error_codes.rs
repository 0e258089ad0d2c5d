// src/mmu/error_codes.rs - raw wire-level tags exchanged with the MMU.
//
// `ErrorCode` bit layout follows the contract pinned by spec.md §6.3 and
// `original_source/.../mmu2_mk4.cpp`'s `tmcMask` static_assert (0x7E00): the
// six TMC flavour bits occupy bits 9-14 and their union, including the
// "soldering needs attention" overlay, is exactly 0x7E00. The three axis
// bits (pulley/selector/idler) sit outside that mask so the TMC-failure
// counter in `Coordinator::report_error` only counts flavour, never axis
// attribution, exactly as in the original `ReportError`.
//
// Note: `Prusa-Firmware-MMU/src/logic/error_codes.h`, which defines the
// numeric values for the non-TMC exact-match codes, was not present in the
// retrieved reference pack. `FINDA_DIDNT_SWITCH_ON = 0x8002` is pinned by
// spec.md §8 scenario 2; the remaining exact-match codes are assigned
// distinct placeholder values in the same range (see DESIGN.md).

/// Raw 16-bit error code reported by the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const fn contains(self, bit: ErrorCode) -> bool {
        (self.0 & bit.0) == bit.0 && bit.0 != 0
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn union(self, other: ErrorCode) -> ErrorCode {
        ErrorCode(self.0 | other.0)
    }
}

impl std::ops::BitOr for ErrorCode {
    type Output = ErrorCode;
    fn bitor(self, rhs: ErrorCode) -> ErrorCode {
        self.union(rhs)
    }
}

// Exact-match (non-TMC) codes.
pub const OK: ErrorCode = ErrorCode(0x0000);
pub const FINDA_DIDNT_SWITCH_ON: ErrorCode = ErrorCode(0x8002);
pub const FINDA_DIDNT_SWITCH_OFF: ErrorCode = ErrorCode(0x8003);
pub const FSENSOR_DIDNT_SWITCH_ON: ErrorCode = ErrorCode(0x8004);
pub const FSENSOR_DIDNT_SWITCH_OFF: ErrorCode = ErrorCode(0x8005);
pub const FSENSOR_TOO_EARLY: ErrorCode = ErrorCode(0x8006);
pub const FINDA_FLICKERS: ErrorCode = ErrorCode(0x8007);
pub const LOAD_TO_EXTRUDER_FAILED: ErrorCode = ErrorCode(0x8008);
pub const FILAMENT_EJECTED: ErrorCode = ErrorCode(0x8009);
pub const STALLED_PULLEY: ErrorCode = ErrorCode(0x800A);
pub const MOVE_PULLEY_FAILED: ErrorCode = ErrorCode(0x800B);
pub const HOMING_SELECTOR_FAILED: ErrorCode = ErrorCode(0x800C);
pub const MOVE_SELECTOR_FAILED: ErrorCode = ErrorCode(0x800D);
pub const HOMING_IDLER_FAILED: ErrorCode = ErrorCode(0x800E);
pub const MOVE_IDLER_FAILED: ErrorCode = ErrorCode(0x800F);
pub const MMU_NOT_RESPONDING: ErrorCode = ErrorCode(0x8010);
pub const PROTOCOL_ERROR: ErrorCode = ErrorCode(0x8011);
pub const FILAMENT_ALREADY_LOADED: ErrorCode = ErrorCode(0x8012);
pub const INVALID_TOOL: ErrorCode = ErrorCode(0x8013);
pub const QUEUE_FULL: ErrorCode = ErrorCode(0x8014);
pub const VERSION_MISMATCH: ErrorCode = ErrorCode(0x8015);
pub const INTERNAL: ErrorCode = ErrorCode(0x8016);
pub const FINDA_VS_EEPROM_DISREPANCY: ErrorCode = ErrorCode(0x8017);

// Axis attribution bits (outside the TMC mask).
pub const TMC_PULLEY_BIT: ErrorCode = ErrorCode(1 << 6);
pub const TMC_SELECTOR_BIT: ErrorCode = ErrorCode(1 << 7);
pub const TMC_IDLER_BIT: ErrorCode = ErrorCode(1 << 8);

// TMC flavour bits, priority order IOIN_MISMATCH > RESET > UNDERVOLTAGE >
// SHORT_TO_GROUND > OVERTEMP_WARN > OVERTEMP_ERROR (spec.md §3.2, §4.1).
pub const TMC_IOIN_MISMATCH: ErrorCode = ErrorCode(1 << 9);
pub const TMC_RESET: ErrorCode = ErrorCode(1 << 10);
pub const TMC_UNDERVOLTAGE_ON_CHARGE_PUMP: ErrorCode = ErrorCode(1 << 11);
pub const TMC_SHORT_TO_GROUND: ErrorCode = ErrorCode(1 << 12);
pub const TMC_OVER_TEMPERATURE_WARN: ErrorCode = ErrorCode(1 << 13);
pub const TMC_OVER_TEMPERATURE_ERROR: ErrorCode = ErrorCode(1 << 14);

/// Overlay signature recognised as "this axis' soldering needs attention";
/// composed from existing flavour bits so it adds nothing to `TMC_MASK`.
pub const MMU_SOLDERING_NEEDS_ATTENTION: ErrorCode = ErrorCode(TMC_IOIN_MISMATCH.0 | TMC_RESET.0);

/// Union of every TMC-related bit, masking off the reserved top bit.
/// Pinned to 0x7E00 by `original_source/.../mmu2_mk4.cpp`'s `static_assert`.
pub const TMC_MASK: u16 = (TMC_IOIN_MISMATCH.0
    | TMC_RESET.0
    | TMC_UNDERVOLTAGE_ON_CHARGE_PUMP.0
    | TMC_SHORT_TO_GROUND.0
    | TMC_OVER_TEMPERATURE_WARN.0
    | TMC_OVER_TEMPERATURE_ERROR.0
    | MMU_SOLDERING_NEEDS_ATTENTION.0)
    & 0x7fff;

const _: () = assert!(TMC_MASK == 0x7E00);

/// Tag of the currently executing top-level operation (spec.md §3.1).
/// Stored as a raw byte so the extended set (`LoadToNozzle`) can be added
/// without breaking the primary ASCII-valued enum used on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandInProgress {
    #[default]
    NoCommand = 0,
    CutFilament = b'K',
    EjectFilament = b'E',
    Homing = b'H',
    LoadFilament = b'L',
    Reset = b'X',
    ToolChange = b'T',
    UnloadFilament = b'U',
    TestLoad = b't',
    /// Extended tag: `load_filament_to_nozzle` (spec.md §3.1, §B).
    LoadToNozzle = b'N',
}

/// Fine-grained sub-step tag reported by the MMU (spec.md §3.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressCode {
    #[default]
    OK,
    EngagingIdler,
    DisengagingIdler,
    UnloadingToFinda,
    RetractingFromFinda,
    FeedingToFinda,
    FeedingToBondtech,
    FeedingToFSensor,
    SelectingFilamentSlot,
    MovingSelector,
    PreparingBlade,
    PerformingCut,
    ParkingSelector,
    ReturningSelector,
    EjectingFilament,
    WaitingForTemperature,
    LoadingToNozzle,
    ERRWaitingForUser,
    ERRHelpingFilament,
    ERRInternal,
}

impl ProgressCode {
    /// Any `ERR*` progress code freezes tracked percentage at 50% (spec.md §4.2).
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ProgressCode::ERRWaitingForUser
                | ProgressCode::ERRHelpingFilament
                | ProgressCode::ERRInternal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmc_mask_matches_original_firmware_contract() {
        assert_eq!(TMC_MASK, 0x7E00);
    }

    #[test]
    fn axis_bits_are_outside_tmc_mask() {
        assert_eq!(TMC_PULLEY_BIT.0 as u32 & TMC_MASK as u32, 0);
        assert_eq!(TMC_SELECTOR_BIT.0 as u32 & TMC_MASK as u32, 0);
        assert_eq!(TMC_IDLER_BIT.0 as u32 & TMC_MASK as u32, 0);
    }

    #[test]
    fn soldering_overlay_contained_in_mask() {
        assert!(MMU_SOLDERING_NEEDS_ATTENTION.contains(TMC_IOIN_MISMATCH));
        assert!(MMU_SOLDERING_NEEDS_ATTENTION.contains(TMC_RESET));
    }
}
