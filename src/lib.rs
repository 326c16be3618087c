//! # nvram
//!
//! Programmatic access to the CMOS NVRAM of coreboot-based x86 machines.
//!
//! The crate discovers the coreboot CMOS option table (from physical
//! memory, a binary dump, or the text layout form) and reads and writes
//! the named, bit-packed parameters it describes while maintaining the
//! coreboot CMOS checksum.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nvram::{Nvram, Result};
//!
//! fn main() -> Result<()> {
//!     let mut nv = Nvram::builder().open()?;
//!
//!     let baud = nv.read_parameter("baud_rate")?;
//!     println!("baud_rate = {}", baud);
//!
//!     nv.write_parameter("baud_rate", "115200")?;
//!     nv.close()
//! }
//! ```
//!
//! ## Access paths
//!
//! - **Layout**: the machine's coreboot table scanned through `/dev/mem`,
//!   a `.bin` option table dump, or the human-readable text form.
//! - **CMOS bytes**: the NVRAM hardware behind I/O ports 0x70-0x73
//!   through `/dev/port`, or a memory-mapped image file.
//!
//! Hardware access requires root on x86-64 Linux; file-backed sessions
//! work anywhere.

mod builder;
mod cmos;
mod error;
mod nvram;

pub mod accessor;
pub mod coreboot;
pub mod debug;
pub mod layout;

// Re-exports
pub use accessor::{AccessSource, CmosAccess};
pub use builder::NvramBuilder;
pub use cmos::Cmos;
pub use error::{Error, Result};
pub use layout::{ChecksumRegion, CmosEntry, EntryKind, EnumItem, Layout, LayoutSource};
pub use nvram::{Nvram, Value};
