//! Decoder for the binary CMOS option table.
//!
//! The option table is one record inside the coreboot table (tag 0xC8)
//! and carries its own stream of inner records: entries (tag 201),
//! enumeration items (tag 202) and the checksum descriptor (tag 204).
//! The same blob is also what coreboot's build writes to disk, so a raw
//! dump file decodes identically.

use std::path::Path;

use crate::coreboot::CorebootTable;
use crate::debug_layout;
use crate::error::{Error, Result};
use crate::layout::{ChecksumRegion, CmosEntry, EntryKind, EnumItem, Layout};

/// Inner record tags of the CMOS option table.
const LB_TAG_OPTION: u32 = 201;
const LB_TAG_OPTION_ENUM: u32 = 202;
const LB_TAG_OPTION_CHECKSUM: u32 = 204;

/// Outer record tag of the option table itself.
const LB_TAG_CMOS_OPTION_TABLE: u32 = 0xC8;

/// Offset of the inner record stream bound within the option table
/// header: `tag`, `size`, `header_length`.
const OPTION_TABLE_HEADER: usize = 12;

/// Fixed sizes of the inner record shapes, name/text arrays included.
const OPTION_RECORD_SIZE: usize = 56;
const ENUM_RECORD_SIZE: usize = 48;
const CHECKSUM_RECORD_SIZE: usize = 24;

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode a NUL-terminated string from a fixed-size field.
fn read_cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidOptionTable(message.into())
}

impl Layout {
    /// Decode a CMOS option table blob.
    ///
    /// `table` starts at the option table record and must cover at least
    /// the record's own `size`.
    pub fn from_option_table(table: &[u8]) -> Result<Layout> {
        let tag = read_u32(table, 0).ok_or_else(|| invalid("table truncated"))?;
        if tag != LB_TAG_CMOS_OPTION_TABLE {
            return Err(invalid(format!("unexpected tag {:#X}", tag)));
        }

        let size = read_u32(table, 4).ok_or_else(|| invalid("table truncated"))? as usize;
        let header_length =
            read_u32(table, 8).ok_or_else(|| invalid("table truncated"))? as usize;

        if size > table.len() || header_length > size || header_length < OPTION_TABLE_HEADER {
            return Err(invalid("inconsistent table bounds"));
        }

        let mut layout = Layout::new();

        // Walk the inner record stream after the option table header.
        let mut offset = header_length;
        while offset < size {
            let tag = read_u32(table, offset).ok_or_else(|| invalid("record truncated"))?;
            let record_size =
                read_u32(table, offset + 4).ok_or_else(|| invalid("record truncated"))? as usize;

            if record_size < 8 || offset + record_size > size {
                return Err(invalid("bad record size"));
            }
            let record = &table[offset..offset + record_size];

            match tag {
                LB_TAG_OPTION => {
                    if record.len() < OPTION_RECORD_SIZE {
                        return Err(invalid("short option record"));
                    }

                    let bit = read_u32(record, 8).unwrap_or(0);
                    let length = read_u32(record, 12).unwrap_or(0);
                    let config = read_u32(record, 16).unwrap_or(0);
                    let config_id = read_u32(record, 20).unwrap_or(0);
                    let name = read_cstr(&record[24..OPTION_RECORD_SIZE]);

                    let kind = u8::try_from(config)
                        .ok()
                        .and_then(|c| EntryKind::from_char(c as char))
                        .ok_or_else(|| Error::EntryInvalidKind(name.clone()))?;

                    layout.add_entry(CmosEntry::new(bit, length, kind, config_id, name))?;
                }

                LB_TAG_OPTION_ENUM => {
                    if record.len() < ENUM_RECORD_SIZE {
                        return Err(invalid("short enumeration record"));
                    }

                    let config_id = read_u32(record, 8).unwrap_or(0);
                    let value = read_u32(record, 12).unwrap_or(0);
                    let text = read_cstr(&record[16..ENUM_RECORD_SIZE]);

                    layout.add_enum_item(EnumItem::new(config_id, u64::from(value), text))?;
                }

                LB_TAG_OPTION_CHECKSUM => {
                    if record.len() < CHECKSUM_RECORD_SIZE {
                        return Err(invalid("short checksum record"));
                    }

                    let range_start = read_u32(record, 8).unwrap_or(0);
                    let range_end = read_u32(record, 12).unwrap_or(0);
                    let location = read_u32(record, 16).unwrap_or(0);

                    let region = ChecksumRegion::new(range_start, range_end, location)?;
                    layout.set_checksum_region(region);
                }

                _ => {}
            }

            offset += record_size;
        }

        Ok(layout)
    }

    /// Decode a binary CMOS option table dump file.
    pub fn from_option_table_file<P: AsRef<Path>>(path: P) -> Result<Layout> {
        let path = path.as_ref();
        debug_layout!("Reading CMOS option table file {}", path.display());

        let data = std::fs::read(path)?;
        Self::from_option_table(&data)
    }

    /// Load the layout from the machine's coreboot table.
    pub fn from_coreboot_table() -> Result<Layout> {
        let table = CorebootTable::scan()?;
        let option_table = table
            .find_cmos_option_table()
            .ok_or_else(|| invalid("no CMOS option table record"))?;
        Layout::from_option_table(option_table)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for synthetic option table blobs shared with the
    //! coreboot scanner tests.

    use super::*;

    fn push_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    fn push_name(out: &mut Vec<u8>, name: &str) {
        let mut field = [0u8; 32];
        field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&field);
    }

    pub(crate) fn option_record(
        bit: u32,
        length: u32,
        kind: char,
        config_id: u32,
        name: &str,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, LB_TAG_OPTION);
        push_u32(&mut out, OPTION_RECORD_SIZE as u32);
        push_u32(&mut out, bit);
        push_u32(&mut out, length);
        push_u32(&mut out, kind as u32);
        push_u32(&mut out, config_id);
        push_name(&mut out, name);
        out
    }

    pub(crate) fn enum_record(config_id: u32, value: u32, text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, LB_TAG_OPTION_ENUM);
        push_u32(&mut out, ENUM_RECORD_SIZE as u32);
        push_u32(&mut out, config_id);
        push_u32(&mut out, value);
        push_name(&mut out, text);
        out
    }

    pub(crate) fn checksum_record(start: u32, end: u32, location: u32) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, LB_TAG_OPTION_CHECKSUM);
        push_u32(&mut out, CHECKSUM_RECORD_SIZE as u32);
        push_u32(&mut out, start);
        push_u32(&mut out, end);
        push_u32(&mut out, location);
        push_u32(&mut out, 0);
        out
    }

    /// Assemble a full option table blob from inner records.
    pub(crate) fn option_table(records: &[Vec<u8>]) -> Vec<u8> {
        let body: usize = records.iter().map(Vec::len).sum();
        let mut out = Vec::new();
        push_u32(&mut out, LB_TAG_CMOS_OPTION_TABLE);
        push_u32(&mut out, (OPTION_TABLE_HEADER + body) as u32);
        push_u32(&mut out, OPTION_TABLE_HEADER as u32);
        for record in records {
            out.extend_from_slice(record);
        }
        out
    }
}
