//! Persistence key derivation.
//!
//! Every slot in the preference store is addressed by a 32-bit FNV-1 hash of
//! a composite string. The strings and the hash must stay bit-for-bit stable:
//! existing devices locate their calibration and dosed records by them.
//!
//! The "dosed" key embeds the day of year, so yesterday's record simply stops
//! being looked up at midnight; no reset step exists. The same key comes back
//! a year later, so the record value carries the absolute day it was written.

use microdoser_traits::WallTime;

const FNV1_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV1_PRIME: u32 = 16_777_619;

/// Value written to a dosed record: `DOSED_TAG | (epoch_day & DOSED_DAY_MASK)`.
const DOSED_TAG: u32 = 0x4D44_0000;
const DOSED_TAG_MASK: u32 = 0xFFFF_0000;
const DOSED_DAY_MASK: u32 = 0x0000_FFFF;
/// Value written by older firmware, which carried no day identifier.
pub const LEGACY_DOSED: u32 = 1;

/// 32-bit FNV-1 (multiply, then xor) over the UTF-8 bytes of `s`.
pub fn fnv1_hash(s: &str) -> u32 {
    let mut hash = FNV1_OFFSET_BASIS;
    for &byte in s.as_bytes() {
        hash = hash.wrapping_mul(FNV1_PRIME);
        hash ^= u32::from(byte);
    }
    hash
}

/// Slot holding the calibration rate (f32 bits).
pub fn calibration_key(pump_id: &str) -> u32 {
    fnv1_hash(&format!("cal_{pump_id}"))
}

/// Slot holding the epoch seconds of the last applied calibration.
pub fn calibration_time_key(pump_id: &str) -> u32 {
    fnv1_hash(&format!("cal_time_{pump_id}"))
}

/// Slot recording that the `hour:minute` entry of `pump_id` dosed on `day_of_year`.
pub fn dose_key(pump_id: &str, hour: u8, minute: u8, day_of_year: u16) -> u32 {
    fnv1_hash(&format!("dose_{pump_id}_{hour}_{minute}_{day_of_year}"))
}

/// Days since the Unix epoch (UTC) of `now`.
#[inline]
pub fn epoch_day(now: &WallTime) -> u32 {
    now.timestamp / 86_400
}

/// Record value marking a dose at `now`.
#[inline]
pub fn dosed_marker(now: &WallTime) -> u32 {
    DOSED_TAG | (epoch_day(now) & DOSED_DAY_MASK)
}

/// Whether a stored tagged record value means "dosed" on the local day of `now`.
///
/// The epoch day is UTC while the key's day of year is local, so one local day
/// spans at most two adjacent epoch days. A record from the same date in an
/// earlier year is hundreds of days off and reads as "not dosed". The legacy
/// value is not accepted here; callers handle it separately.
pub fn is_dosed_marker(value: u32, now: &WallTime) -> bool {
    if value & DOSED_TAG_MASK != DOSED_TAG {
        return false;
    }
    let stored = value & DOSED_DAY_MASK;
    let today = epoch_day(now) & DOSED_DAY_MASK;
    let diff = today.wrapping_sub(stored) & DOSED_DAY_MASK;
    diff <= 1 || diff == DOSED_DAY_MASK
}
