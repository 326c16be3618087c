//! CMOS checksum region descriptor.
//!
//! The region is expressed in bits on the wire and in the text layout
//! form, but held in byte units here; conversion happens only in the
//! constructor and in the display form.

use std::fmt;

use crate::accessor::verify_cmos_byte_index;
use crate::debug_layout;
use crate::error::{Error, Result};
use crate::layout::entry::area_overlap;

/// The byte range that is summed and the two-byte slot the sum is stored
/// in, all in byte units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRegion {
    start: usize,
    end: usize,
    index: usize,
}

impl ChecksumRegion {
    /// The canonical coreboot checksum region: bytes 49..=125 summed,
    /// stored at bytes 126 and 127.
    pub(crate) const DEFAULT: ChecksumRegion = ChecksumRegion {
        start: 49,
        end: 125,
        index: 126,
    };

    /// Create a checksum region from bit offsets, as found in the text
    /// layout and the binary option table.
    pub fn new(start: u32, end: u32, index: u32) -> Result<Self> {
        debug_layout!("New CMOS checksum region {} {} {}", start, end, index);

        if start % 8 != 0 {
            return Err(Error::InvalidChecksumRegion("area start not aligned"));
        }

        if end % 8 != 7 {
            return Err(Error::InvalidChecksumRegion("area end not aligned"));
        }

        if index % 8 != 0 {
            return Err(Error::InvalidChecksumRegion("location not aligned"));
        }

        if end <= start {
            return Err(Error::InvalidChecksumRegion("area empty"));
        }

        let start = (start / 8) as usize;
        let end = (end / 8) as usize;
        let index = (index / 8) as usize;

        if !verify_cmos_byte_index(start) || !verify_cmos_byte_index(end) {
            return Err(Error::InvalidChecksumRegion("area out of range"));
        }

        if !verify_cmos_byte_index(index) || !verify_cmos_byte_index(index + 1) {
            return Err(Error::InvalidChecksumRegion("location out of range"));
        }

        if area_overlap(
            start as u64,
            (end - start + 1) as u64,
            index as u64,
            2,
        ) {
            return Err(Error::InvalidChecksumRegion("location inside summed area"));
        }

        Ok(Self { start, end, index })
    }

    /// First byte of the summed range.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last byte of the summed range, inclusive.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Byte index of the big-endian two-byte checksum store.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Default for ChecksumRegion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ChecksumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.start * 8, self.end * 8, self.index * 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_region() {
        let region = ChecksumRegion::new(392, 1007, 1008).unwrap();
        assert_eq!(region.start(), 49);
        assert_eq!(region.end(), 125);
        assert_eq!(region.index(), 126);
        assert_eq!(region, ChecksumRegion::DEFAULT);
        assert_eq!(region.to_string(), "392 1007 1008");
    }

    #[test]
    fn test_alignment_rules() {
        assert!(matches!(
            ChecksumRegion::new(393, 1007, 1008),
            Err(Error::InvalidChecksumRegion("area start not aligned"))
        ));
        assert!(matches!(
            ChecksumRegion::new(392, 1000, 1008),
            Err(Error::InvalidChecksumRegion("area end not aligned"))
        ));
        assert!(matches!(
            ChecksumRegion::new(392, 1007, 1009),
            Err(Error::InvalidChecksumRegion("location not aligned"))
        ));
    }

    #[test]
    fn test_empty_and_out_of_range_area() {
        assert!(matches!(
            ChecksumRegion::new(1000, 399, 1008),
            Err(Error::InvalidChecksumRegion("area empty"))
        ));
        // Range starting inside the RTC area.
        assert!(matches!(
            ChecksumRegion::new(0, 1007, 1008),
            Err(Error::InvalidChecksumRegion("area out of range"))
        ));
        // Store slot straddling the end of CMOS.
        assert!(matches!(
            ChecksumRegion::new(392, 1007, 2040),
            Err(Error::InvalidChecksumRegion("location out of range"))
        ));
    }

    #[test]
    fn test_store_must_not_overlap_area() {
        // Store at byte 100 falls inside bytes 49..=125.
        assert!(matches!(
            ChecksumRegion::new(392, 1007, 800),
            Err(Error::InvalidChecksumRegion("location inside summed area"))
        ));
        // Store at bytes 48..=49 catches the area's first byte.
        assert!(matches!(
            ChecksumRegion::new(392, 1007, 384),
            Err(Error::InvalidChecksumRegion("location inside summed area"))
        ));
    }
}
