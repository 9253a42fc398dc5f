//! Header patch tables for the legacy container.
//!
//! Both tables come from byte-level analysis of real legacy files and must be
//! reproduced exactly; a different offset produces a file the legacy viewer
//! misreads without complaint.

use crate::utils::ascii_bytes;

/// Per-channel sensitivity byte in the legacy header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSlot {
    pub channel: usize,
    pub offset: usize,
    /// Event/trigger channel; its byte is never patched
    pub marker: bool,
}

const fn slot(channel: usize, offset: usize, marker: bool) -> CalibrationSlot {
    CalibrationSlot { channel, offset, marker }
}

/// Channel index → header offset map. Channels 0 and 18 are markers.
pub const CALIBRATION_TABLE: [CalibrationSlot; 19] = [
    slot(0, 0x0326, true),
    slot(1, 0x0327, false),
    slot(2, 0x0328, false),
    slot(3, 0x0329, false),
    slot(4, 0x032A, false),
    slot(5, 0x032B, false),
    slot(6, 0x032C, false),
    slot(7, 0x032D, false),
    slot(8, 0x032E, false),
    slot(9, 0x032F, false),
    slot(10, 0x0330, false),
    slot(11, 0x0331, false),
    slot(12, 0x0332, false),
    slot(13, 0x0333, false),
    slot(14, 0x0334, false),
    slot(15, 0x0335, false),
    slot(16, 0x0336, false),
    slot(17, 0x0337, false),
    slot(18, 0x0338, true),
];

/// Sensitivity code for 1 µV/bit, the finest the legacy viewer supports
pub const MAX_SENSITIVITY: u8 = 1;

/// (offset, length) of every patient/study name slot in the header
pub const IDENTITY_SLOTS: [(usize, usize); 4] = [(0x0080, 32), (0x00A0, 32), (0x00C0, 32), (0x0140, 32)];

/// Marker channel indices in ascending order
pub fn marker_channels() -> Vec<usize> {
    CALIBRATION_TABLE
        .iter()
        .filter(|s| s.marker)
        .map(|s| s.channel)
        .collect()
}

pub fn is_marker_channel(channel: usize) -> bool {
    CALIBRATION_TABLE
        .iter()
        .any(|s| s.channel == channel && s.marker)
}

/// One byte changed by the calibration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationChange {
    pub channel: usize,
    pub offset: usize,
    pub before: u8,
    pub after: u8,
}

/// Writes `name` into every identity slot that fits inside `header`
///
/// The name is reduced to ASCII, capped one byte short of the slot so a NUL
/// always terminates it, and NUL padded. Returns the number of slots written.
pub fn patch_identity(header: &mut [u8], name: &str) -> usize {
    let mut written = 0;
    for &(offset, length) in IDENTITY_SLOTS.iter() {
        if offset + length > header.len() {
            continue;
        }
        let mut field = ascii_bytes(name);
        field.truncate(length.saturating_sub(1));
        field.resize(length, 0);
        header[offset..offset + length].copy_from_slice(&field);
        written += 1;
    }
    written
}

/// Sets every non-marker calibration byte to `value`
pub fn patch_calibration(header: &mut [u8], value: u8) -> Vec<CalibrationChange> {
    let mut changes = Vec::new();
    for slot in CALIBRATION_TABLE.iter().filter(|s| !s.marker) {
        if let Some(byte) = header.get_mut(slot.offset) {
            changes.push(CalibrationChange {
                channel: slot.channel,
                offset: slot.offset,
                before: *byte,
                after: value,
            });
            *byte = value;
        }
    }
    changes
}

/// Header offsets either patch pass may touch.
pub fn patched_offsets() -> Vec<usize> {
    let mut offsets: Vec<usize> = IDENTITY_SLOTS
        .iter()
        .flat_map(|&(offset, length)| offset..offset + length)
        .collect();
    offsets.extend(CALIBRATION_TABLE.iter().filter(|s| !s.marker).map(|s| s.offset));
    offsets
}
