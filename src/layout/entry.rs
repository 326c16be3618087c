//! CMOS layout entries and their validity rules.

use std::fmt;

use crate::accessor::{CMOS_RTC_AREA_SIZE, CMOS_SIZE};
use crate::error::{Error, Result};

const CMOS_BITS: u64 = 8 * CMOS_SIZE as u64;
const RTC_AREA_BITS: u32 = 8 * CMOS_RTC_AREA_SIZE as u32;

/// How a CMOS entry's bits are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Raw bytes, read and written as text.
    String,
    /// A value named by the layout's enumerations.
    Enum,
    /// An unsigned little-endian integer.
    Hex,
    /// Present in the layout but never readable or writable.
    Reserved,
}

impl EntryKind {
    /// Decode the single-character form used by the text layout and the
    /// binary option table.
    pub fn from_char(c: char) -> Option<EntryKind> {
        match c {
            's' => Some(EntryKind::String),
            'e' => Some(EntryKind::Enum),
            'h' => Some(EntryKind::Hex),
            'r' => Some(EntryKind::Reserved),
            _ => None,
        }
    }

    /// The single-character form of this kind.
    pub fn as_char(self) -> char {
        match self {
            EntryKind::String => 's',
            EntryKind::Enum => 'e',
            EntryKind::Hex => 'h',
            EntryKind::Reserved => 'r',
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One named bit-range inside the CMOS region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmosEntry {
    pub(crate) bit: u32,
    pub(crate) length: u32,
    pub(crate) kind: EntryKind,
    pub(crate) config_id: u32,
    pub(crate) name: String,
}

impl CmosEntry {
    /// Create a new entry. Validity is checked when the entry is added to
    /// a [`Layout`](crate::layout::Layout).
    pub fn new(
        bit: u32,
        length: u32,
        kind: EntryKind,
        config_id: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            bit,
            length,
            kind,
            config_id,
            name: name.into(),
        }
    }

    /// Absolute bit offset into the CMOS region.
    pub fn bit(&self) -> u32 {
        self.bit
    }

    /// Width of the entry in bits.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// How the entry's bits are interpreted.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Enumeration id for [`EntryKind::Enum`] entries; unused otherwise.
    pub fn config_id(&self) -> u32 {
        self.config_id
    }

    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this entry's bit-range overlaps another entry's.
    pub(crate) fn overlaps(&self, other: &CmosEntry) -> bool {
        area_overlap(
            u64::from(self.bit),
            u64::from(self.length),
            u64::from(other.bit),
            u64::from(other.length),
        )
    }
}

impl fmt::Display for CmosEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.bit, self.length, self.kind, self.config_id, self.name
        )
    }
}

/// Check that an entry fits the CMOS region, is byte-aligned or confined
/// to a single byte, and has a known kind.
pub(crate) fn verify_entry(e: &CmosEntry) -> Result<()> {
    // The kind is already a closed enum; range and alignment remain.
    if e.length == 0
        || u64::from(e.bit) >= CMOS_BITS
        || u64::from(e.bit) + u64::from(e.length) > CMOS_BITS
    {
        return Err(Error::EntryOutOfRange(e.name.clone()));
    }

    if (e.bit % 8) > 0 && (e.bit / 8) != ((e.bit + e.length - 1) / 8) {
        return Err(Error::EntryUnaligned(e.name.clone()));
    }

    Ok(())
}

/// Check that an entry may be read or written as a parameter.
pub(crate) fn verify_cmos_op(e: &CmosEntry) -> Result<()> {
    if e.kind == EntryKind::Reserved {
        return Err(Error::ReservedParameter(e.name.clone()));
    }

    if e.bit < RTC_AREA_BITS {
        return Err(Error::EntryOverlapsRtc(e.name.clone()));
    }

    if e.length > 64 && e.kind != EntryKind::String {
        return Err(Error::EntryTooWide(e.name.clone()));
    }

    verify_entry(e)
}

/// Closed-range overlap of two areas given as (start, length).
pub(crate) fn area_overlap(s0: u64, l0: u64, s1: u64, l1: u64) -> bool {
    let e0 = s0 + l0 - 1;
    let e1 = s1 + l1 - 1;
    (s1 <= e0) && (s0 <= e1)
}
