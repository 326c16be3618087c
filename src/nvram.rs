//! NVRAM session: exclusive, typed access to CMOS parameters.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::accessor::AccessSource;
use crate::cmos::Cmos;
use crate::debug_cmos;
use crate::error::{Error, Result};
use crate::layout::{EntryKind, Layout, LayoutSource};

/// Process-wide session lock. Advisory: it serializes sessions within
/// this process and does not coordinate with other processes.
static LOCKED: AtomicBool = AtomicBool::new(false);

/// Reserved parameter name guarding the stored checksum against
/// accidental overwrite.
const CHECKSUM_NAME: &str = "check_sum";

/// A typed CMOS parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A string or enumeration text.
    Text(String),
    /// An unsigned integer.
    Integer(u64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => write!(f, "{}", text),
            Value::Integer(n) => write!(f, "0x{:X}", n),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Integer(n)
    }
}

/// Decode up to eight little-endian bytes.
fn le_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    for (slot, &byte) in raw.iter_mut().zip(bytes.iter()) {
        *slot = byte;
    }
    u64::from_le_bytes(raw)
}

/// Check that a value fits an entry's bit width.
fn verify_value_width(name: &str, value: u64, length: u32) -> Result<()> {
    if length < 64 && value >= (1u64 << length) {
        return Err(Error::ValueTooWide {
            name: name.to_string(),
            value: format!("0x{:X}", value),
            width: length,
        });
    }
    Ok(())
}

/// An exclusive NVRAM session binding a [`Layout`] to a CMOS accessor.
///
/// Use [`Nvram::builder()`] to pick the layout and CMOS sources. Only
/// one session may exist per process at a time; a second open fails with
/// [`Error::AccessInUse`].
///
/// # Example
///
/// ```rust,no_run
/// use nvram::Nvram;
///
/// let mut nv = Nvram::builder().open()?;
/// let baud = nv.read_parameter("baud_rate")?;
/// println!("baud_rate = {}", baud);
/// nv.close()?;
/// # Ok::<(), nvram::Error>(())
/// ```
pub struct Nvram {
    layout: Layout,
    cmos: Cmos,
    modified: bool,
    closed: bool,
}

impl Nvram {
    /// Create a new session builder.
    pub fn builder() -> crate::builder::NvramBuilder {
        crate::builder::NvramBuilder::new()
    }

    /// Open a session from explicit layout and accessor sources.
    pub fn open(layout_source: LayoutSource, access_source: AccessSource) -> Result<Nvram> {
        // Only one NVRAM access is allowed at a time.
        if LOCKED
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AccessInUse);
        }

        match Self::open_locked(layout_source, access_source) {
            Ok(nvram) => Ok(nvram),
            Err(err) => {
                LOCKED.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    fn open_locked(layout_source: LayoutSource, access_source: AccessSource) -> Result<Nvram> {
        let layout = layout_source.load()?;

        let mut cmos = Cmos::open(&access_source)?;
        cmos.set_checksum_region(layout.checksum_region());

        Ok(Nvram {
            layout,
            cmos,
            modified: false,
            closed: false,
        })
    }

    /// The layout this session is bound to.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Close the session.
    ///
    /// If parameters were written, the checksum is recomputed and stored
    /// first. A checksum write failure is reported but never prevents
    /// the accessor close and the release of the session lock.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut checksum_result = Ok(());
        if self.modified {
            debug_cmos!("NVRAM modified, computing checksum");
            checksum_result = self.update_checksum();
        }

        let close_result = self.cmos.close();
        LOCKED.store(false, Ordering::Release);

        checksum_result.and(close_result)
    }

    fn update_checksum(&mut self) -> Result<()> {
        let sum = self.cmos.compute_checksum()?;
        debug_cmos!("NVRAM modified, writing checksum {:#06X}", sum);
        self.cmos.write_checksum(sum)?;
        self.modified = false;
        Ok(())
    }

    /// Compare the computed checksum against the stored one.
    ///
    /// A mismatch is a warning-class error carrying both values.
    pub fn validate_checksum(&mut self) -> Result<()> {
        let computed = self.cmos.compute_checksum()?;
        let stored = self.cmos.read_checksum()?;

        if computed != stored {
            return Err(Error::ChecksumMismatch { computed, stored });
        }
        Ok(())
    }

    fn find_entry(&self, name: &str) -> Result<&crate::layout::CmosEntry> {
        if name == CHECKSUM_NAME {
            return Err(Error::UnknownParameter(name.to_string()));
        }
        self.layout
            .find_entry(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    /// Read the current value of a named parameter.
    pub fn read_parameter(&mut self, name: &str) -> Result<Value> {
        let entry = self.find_entry(name)?.clone();
        let raw = self.cmos.read_entry(&entry)?;

        match entry.kind() {
            EntryKind::String => Ok(Value::Text(String::from_utf8_lossy(&raw).into_owned())),
            EntryKind::Enum => {
                let n = le_u64(&raw);
                match self.layout.find_enum_text(entry.config_id(), n) {
                    Some(text) => Ok(Value::Text(text.to_string())),
                    None => Ok(Value::Text(format!("0x{:X} # Bad Value", n))),
                }
            }
            EntryKind::Hex => Ok(Value::Integer(le_u64(&raw))),
            EntryKind::Reserved => Err(Error::ReservedParameter(name.to_string())),
        }
    }

    /// Write a value to a named parameter.
    ///
    /// Strings must fit the entry's width; enumeration texts must name a
    /// known value of the entry's enumeration; integers must fit the
    /// entry's width. The checksum is refreshed when the session closes.
    pub fn write_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let entry = self.find_entry(name)?.clone();

        let raw: Vec<u8> = match entry.kind() {
            EntryKind::String => {
                let Value::Text(text) = value else {
                    return Err(Error::ValueTypeMismatch {
                        name: name.to_string(),
                        expected: "string",
                    });
                };
                if (text.len() * 8) as u32 > entry.length() {
                    return Err(Error::ValueTooWide {
                        name: name.to_string(),
                        value: text,
                        width: entry.length(),
                    });
                }

                let mut buffer = vec![0u8; ((entry.length() + 7) / 8) as usize];
                buffer[..text.len()].copy_from_slice(text.as_bytes());
                buffer
            }

            EntryKind::Enum => {
                let Value::Text(text) = value else {
                    return Err(Error::ValueTypeMismatch {
                        name: name.to_string(),
                        expected: "string",
                    });
                };
                let n = self
                    .layout
                    .find_enum_value(entry.config_id(), &text)
                    .ok_or_else(|| Error::BadEnumValue(name.to_string()))?;
                verify_value_width(name, n, entry.length())?;
                n.to_le_bytes().to_vec()
            }

            EntryKind::Hex => {
                let Value::Integer(n) = value else {
                    return Err(Error::ValueTypeMismatch {
                        name: name.to_string(),
                        expected: "integer",
                    });
                };
                verify_value_width(name, n, entry.length())?;
                n.to_le_bytes().to_vec()
            }

            EntryKind::Reserved => return Err(Error::ReservedParameter(name.to_string())),
        };

        self.cmos.write_entry(&entry, &raw)?;
        self.modified = true;
        Ok(())
    }

    /// Snapshot the general-purpose CMOS area.
    pub fn dump_memory(&mut self) -> Result<Vec<u8>> {
        self.cmos.dump()
    }

    /// Write a snapshot back into the general-purpose CMOS area.
    pub fn restore_memory(&mut self, data: &[u8]) -> Result<()> {
        self.cmos.restore(data)
    }
}

impl Drop for Nvram {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}
