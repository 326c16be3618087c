//! Session builder for configuring and opening NVRAM access.

use std::path::PathBuf;

use crate::accessor::AccessSource;
use crate::error::Result;
use crate::layout::LayoutSource;
use crate::nvram::Nvram;

/// Builder for an [`Nvram`] session.
///
/// With no configuration the session scans the machine's coreboot table
/// for the layout and drives the NVRAM hardware:
///
/// ```rust,no_run
/// use nvram::Nvram;
///
/// let nv = Nvram::builder().open()?;
/// # Ok::<(), nvram::Error>(())
/// ```
///
/// Both sides can be redirected to files, e.g. for working on a saved
/// CMOS image:
///
/// ```rust,no_run
/// use nvram::Nvram;
///
/// let nv = Nvram::builder()
///     .layout_file("cmos_layout")
///     .cmos_file("cmos.bin")
///     .open()?;
/// # Ok::<(), nvram::Error>(())
/// ```
#[derive(Default)]
pub struct NvramBuilder {
    layout_file: Option<PathBuf>,
    cmos_file: Option<PathBuf>,
}

impl NvramBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a CMOS layout file instead of the machine's coreboot table.
    ///
    /// A name ending in `.bin` is decoded as a binary option table dump;
    /// anything else is parsed as the text layout form.
    pub fn layout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.layout_file = Some(path.into());
        self
    }

    /// Use a memory-mapped CMOS image file instead of the NVRAM
    /// hardware.
    pub fn cmos_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cmos_file = Some(path.into());
        self
    }

    /// Open the NVRAM session.
    pub fn open(self) -> Result<Nvram> {
        let layout_source = match self.layout_file {
            None => LayoutSource::CorebootTable,
            Some(path) if path.extension().is_some_and(|ext| ext == "bin") => {
                LayoutSource::BinaryFile(path)
            }
            Some(path) => LayoutSource::TextFile(path),
        };

        let access_source = match self.cmos_file {
            None => AccessSource::Hardware,
            Some(path) => AccessSource::File(path),
        };

        Nvram::open(layout_source, access_source)
    }
}
