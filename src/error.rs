//! Error types for nvram.

use thiserror::Error;

/// Result type alias using nvram's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with CMOS NVRAM.
#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("NVRAM access already in use")]
    AccessInUse,

    #[error("CMOS not opened")]
    NotOpen,

    // Accessor errors
    #[error("invalid CMOS index {0}")]
    InvalidIndex(usize),

    // Coreboot table errors
    #[error("coreboot table not found")]
    TableNotFound,

    #[error("invalid CMOS option table: {0}")]
    InvalidOptionTable(String),

    // Layout validation errors
    #[error("CMOS entry {0} out of range")]
    EntryOutOfRange(String),

    #[error("CMOS entry {0} unaligned spanning multiple bytes")]
    EntryUnaligned(String),

    #[error("CMOS entry {0} has invalid config type")]
    EntryInvalidKind(String),

    #[error("entry {entry} overlaps {other}")]
    EntryOverlap { entry: String, other: String },

    #[error("CMOS entry {0} overlaps RTC area")]
    EntryOverlapsRtc(String),

    #[error("CMOS entry {0} too wide")]
    EntryTooWide(String),

    #[error("duplicate CMOS entry {0}")]
    DuplicateEntry(String),

    #[error("enum value {value} already exists for id {id}")]
    DuplicateEnumItem { id: u32, value: u64 },

    #[error("invalid checksum region: {0}")]
    InvalidChecksumRegion(&'static str),

    // Text layout errors
    #[error("layout parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    // Parameter errors
    #[error("CMOS parameter {0} not found")]
    UnknownParameter(String),

    #[error("CMOS parameter {0} is reserved")]
    ReservedParameter(String),

    #[error("a {expected} value is required for parameter {name}")]
    ValueTypeMismatch {
        name: String,
        expected: &'static str,
    },

    #[error("can not write value {value} to parameter {name} that is only {width}-bits wide")]
    ValueTooWide {
        name: String,
        value: String,
        width: u32,
    },

    #[error("bad value for parameter {0}")]
    BadEnumValue(String),

    // Whole-region copy errors
    #[error("buffer too short: need {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },

    // Checksum errors
    #[error("coreboot CMOS checksum is bad: computed 0x{computed:04X}, stored 0x{stored:04X}")]
    ChecksumMismatch { computed: u16, stored: u16 },

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
