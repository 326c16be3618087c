//! Coreboot table discovery.
//!
//! Coreboot publishes its boot information table ("LBIO") in one of two
//! low physical memory windows. The scanner maps those windows through
//! `/dev/mem`, looks for the signature at 16-byte alignment, validates
//! the header and table checksums, walks the records, and chases
//! forwarding records to the table's final home. The CMOS option table
//! is one record of the validated table.
//!
//! All record access goes through bounds-checked slices of an owned copy
//! of the table bytes; a malformed candidate resumes the scan instead of
//! walking wild pointers.

use std::fs::File;
use std::ops::Range;
use std::os::unix::io::AsRawFd;

use crate::debug_table;
use crate::error::{Error, Result};

/// Coreboot table signature, the ASCII bytes "LBIO" little-endian.
const LB_SIGNATURE: u32 = 0x4F49_424C;

/// Record carrying a 64-bit physical address of the real table.
const LB_TAG_FORWARD: u32 = 0x11;

/// Record carrying the CMOS option table.
const LB_TAG_CMOS_OPTION_TABLE: u32 = 0xC8;

/// Physical windows the table may live in, scanned in order.
const SCAN_WINDOWS: [(u64, u64); 2] = [(0x0000_0000, 0x0000_0FFF), (0x000F_0000, 0x000F_FFFF)];

/// Fixed size of the table header: signature, header bytes, header
/// checksum, table bytes, table checksum, table entries.
const HEADER_SIZE: usize = 24;

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(u64::from_le_bytes(raw))
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as u64
    }
}

/// Internet-style 16-bit ones-complement checksum over a byte range.
///
/// Bytes at odd offsets contribute their value shifted into the high
/// half; carries fold back into the low 16 bits as they appear.
pub fn ip_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for (offset, &byte) in data.iter().enumerate() {
        let mut value = u32::from(byte);
        if offset & 1 != 0 {
            value <<= 8;
        }

        sum += value;

        if sum > 0xFFFF {
            sum = (sum + (sum >> 16)) & 0xFFFF;
        }
    }

    (!sum & 0xFFFF) as u16
}

/// Read access to ranges of physical memory.
///
/// This is the seam between the scan algorithm and `/dev/mem`; tests run
/// the scan over a synthetic image instead.
pub trait PhysMemory {
    /// Map the physical byte range `[start, end]` inclusive and return
    /// its contents.
    fn map(&mut self, start: u64, end: u64) -> Result<&[u8]>;
}

struct LbHeader {
    header_bytes: u32,
    table_bytes: u32,
    table_checksum: u32,
    table_entries: u32,
}

impl LbHeader {
    fn parse(data: &[u8]) -> Option<Self> {
        if read_u32(data, 0)? != LB_SIGNATURE {
            return None;
        }
        Some(Self {
            header_bytes: read_u32(data, 4)?,
            table_bytes: read_u32(data, 12)?,
            table_checksum: read_u32(data, 16)?,
            table_entries: read_u32(data, 20)?,
        })
    }
}

/// One record of a validated coreboot table.
struct LbRecord {
    tag: u32,
    range: Range<usize>,
}

/// A validated coreboot table: header plus record stream.
pub struct CorebootTable {
    /// Owned copy of the header and table bytes.
    data: Vec<u8>,
    records: Vec<LbRecord>,
}

impl CorebootTable {
    /// Scan the machine's physical memory through `/dev/mem`.
    pub fn scan() -> Result<Self> {
        let mut mem = DevMem::open()?;
        Self::scan_memory(&mut mem)
    }

    /// Scan physical memory through the given mapper.
    pub fn scan_memory<M: PhysMemory>(mem: &mut M) -> Result<Self> {
        for (start, end) in SCAN_WINDOWS {
            debug_table!("Looking for table @{:#010X}", start);
            match Self::scan_window(mem, start, end) {
                Ok(table) => return Ok(table),
                Err(err) => debug_table!("No table @{:#010X}: {}", start, err),
            }
        }

        Err(Error::TableNotFound)
    }

    /// Scan one physical window for a valid table.
    fn scan_window<M: PhysMemory>(mem: &mut M, start: u64, end: u64) -> Result<Self> {
        let window = mem.map(start, end)?.to_vec();

        let mut offset = 0;
        while offset + HEADER_SIZE <= window.len() {
            if read_u32(&window, offset) == Some(LB_SIGNATURE) {
                debug_table!("Table found @{:#010X}", start + offset as u64);
                match Self::open_at(mem, start + offset as u64, &window[offset..])? {
                    Some(table) => return Ok(table),
                    None => {} // validation failed, resume the scan
                }
            }
            offset += 16;
        }

        Err(Error::TableNotFound)
    }

    /// Validate the table candidate at physical address `phys`.
    ///
    /// Returns `Ok(None)` when the candidate fails a checksum or a
    /// consistency check and the scan should move on. Forward records
    /// hand off to a fresh scan of one page at the forwarded address,
    /// and mapping failures there propagate.
    fn open_at<M: PhysMemory>(
        mem: &mut M,
        phys: u64,
        candidate: &[u8],
    ) -> Result<Option<Self>> {
        let header = match LbHeader::parse(candidate) {
            Some(header) => header,
            None => return Ok(None),
        };

        let header_bytes = header.header_bytes as usize;
        if header_bytes < HEADER_SIZE || header_bytes > candidate.len() {
            return Ok(None);
        }

        if ip_checksum(&candidate[..header_bytes]) != 0 {
            debug_table!("Header checksum bad");
            return Ok(None);
        }

        // Map the header and the full record stream behind it.
        let total = header_bytes as u64 + u64::from(header.table_bytes);
        let data = mem.map(phys, phys + total - 1)?.to_vec();
        if data.len() < total as usize {
            return Ok(None);
        }

        let table = &data[header_bytes..total as usize];
        if u32::from(ip_checksum(table)) != header.table_checksum {
            debug_table!("Table checksum bad");
            return Ok(None);
        }

        // Walk the record stream.
        let mut records = Vec::new();
        let mut forward: Option<u64> = None;
        let mut offset = header_bytes;

        while offset < total as usize {
            let tag = match read_u32(&data, offset) {
                Some(tag) => tag,
                None => return Ok(None),
            };
            let size = match read_u32(&data, offset + 4) {
                Some(size) => size as usize,
                None => return Ok(None),
            };

            if size < 8 || offset + size > total as usize {
                debug_table!("Malformed record @{} size {}", offset, size);
                return Ok(None);
            }

            debug_table!("Found record tag = {:#X} len = {}", tag, size);

            if forward.is_none() && tag == LB_TAG_FORWARD {
                forward = read_u64(&data, offset + 8);
            }

            records.push(LbRecord {
                tag,
                range: offset..offset + size,
            });
            offset += size;
        }

        if records.len() != header.table_entries as usize {
            debug_table!("Unexpected number of table entries");
            return Ok(None);
        }

        if let Some(address) = forward {
            debug_table!("Forwarding table found @{:#010X}", address);
            return Self::scan_window(mem, address, address + page_size() - 1).map(Some);
        }

        Ok(Some(Self { data, records }))
    }

    /// The first CMOS option table record, when present.
    pub fn find_cmos_option_table(&self) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|record| record.tag == LB_TAG_CMOS_OPTION_TABLE)
            .map(|record| &self.data[record.range.clone()])
    }
}

/// Physical memory mapper over `/dev/mem`.
///
/// Each call maps the requested range read-only at page granularity,
/// replacing the previous mapping.
pub struct DevMem {
    file: File,
    mapping: Option<Mapping>,
}

struct Mapping {
    ptr: *mut u8,
    len: usize,
    /// Offset of the requested start within the page-aligned mapping.
    offset: usize,
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

impl DevMem {
    /// Open `/dev/mem` read-only.
    pub fn open() -> Result<Self> {
        Ok(Self {
            file: File::open("/dev/mem")?,
            mapping: None,
        })
    }
}

impl PhysMemory for DevMem {
    fn map(&mut self, start: u64, end: u64) -> Result<&[u8]> {
        // Release the previous window first.
        self.mapping = None;

        let page = page_size() as usize;
        let base = start & !(page as u64 - 1);
        let length = (end - start + 1) as usize;
        let offset = (start - base) as usize;
        let map_len = (offset + length + page - 1) & !(page - 1);

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                base as libc::off_t,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let mapping = self.mapping.insert(Mapping {
            ptr: ptr as *mut u8,
            len: map_len,
            offset,
        });

        Ok(unsafe { std::slice::from_raw_parts(mapping.ptr.add(mapping.offset), length) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::table::test_support;
    use crate::layout::{EntryKind, Layout};

    /// Synthetic physical memory image.
    struct FakeMem {
        image: Vec<u8>,
    }

    impl PhysMemory for FakeMem {
        fn map(&mut self, start: u64, end: u64) -> Result<&[u8]> {
            let start = start as usize;
            let end = end as usize;
            if start > end || end >= self.image.len() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "physical range not mappable",
                )));
            }
            Ok(&self.image[start..=end])
        }
    }

    fn push_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    /// Build an LBIO table (header + records) with valid checksums.
    fn build_table(records: &[Vec<u8>]) -> Vec<u8> {
        let table: Vec<u8> = records.iter().flatten().copied().collect();

        let mut header = Vec::new();
        push_u32(&mut header, LB_SIGNATURE);
        push_u32(&mut header, HEADER_SIZE as u32);
        push_u32(&mut header, 0); // header checksum, patched below
        push_u32(&mut header, table.len() as u32);
        push_u32(&mut header, u32::from(ip_checksum(&table)));
        push_u32(&mut header, records.len() as u32);

        // With the complement stored at an even offset the header sums
        // to zero again.
        let checksum = ip_checksum(&header);
        header[8..12].copy_from_slice(&u32::from(checksum).to_le_bytes());
        debug_assert_eq!(ip_checksum(&header), 0);

        header.extend_from_slice(&table);
        header
    }

    fn record(tag: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, tag);
        push_u32(&mut out, (8 + payload.len()) as u32);
        out.extend_from_slice(payload);
        out
    }

    /// A CMOS option table blob doubles as a tag-0xC8 coreboot record.
    fn cmos_record() -> Vec<u8> {
        test_support::option_table(&[
            test_support::option_record(400, 8, 'h', 0, "boot_count"),
            test_support::enum_record(4, 0, "115200"),
            test_support::checksum_record(440, 1007, 1008),
        ])
    }

    fn image_with_table_at(address: usize, table: &[u8]) -> FakeMem {
        let mut image = vec![0u8; 0x100000];
        image[address..address + table.len()].copy_from_slice(table);
        FakeMem { image }
    }

    #[test]
    fn test_ip_checksum_fold_property() {
        // Appending the checksum at an even offset sums to zero.
        let data: Vec<u8> = (0u16..62).map(|v| (v * 7) as u8).collect();
        let checksum = ip_checksum(&data);

        let mut closed = data.clone();
        closed.extend_from_slice(&checksum.to_le_bytes());
        assert_eq!(ip_checksum(&closed), 0);
    }

    #[test]
    fn test_ip_checksum_known_values() {
        assert_eq!(ip_checksum(&[]), 0xFFFF);
        assert_eq!(ip_checksum(&[0x01]), 0xFFFE);
        assert_eq!(ip_checksum(&[0x00, 0x01]), 0xFEFF);
    }

    #[test]
    fn test_scan_finds_table_in_high_window() {
        let table = build_table(&[record(0x99, &[0u8; 8]), cmos_record()]);
        let mut mem = image_with_table_at(0xF0100, &table);

        let found = CorebootTable::scan_memory(&mut mem).unwrap();
        let option_table = found.find_cmos_option_table().unwrap();

        let layout = Layout::from_option_table(option_table).unwrap();
        let entry = layout.find_entry("boot_count").unwrap();
        assert_eq!(entry.bit(), 400);
        assert_eq!(entry.length(), 8);
        assert_eq!(entry.kind(), EntryKind::Hex);
    }

    #[test]
    fn test_scan_finds_table_in_low_window() {
        let table = build_table(&[cmos_record()]);
        let mut mem = image_with_table_at(0x200, &table);

        let found = CorebootTable::scan_memory(&mut mem).unwrap();
        assert!(found.find_cmos_option_table().is_some());
    }

    #[test]
    fn test_corrupt_table_checksum_not_found() {
        let mut table = build_table(&[cmos_record()]);
        // Flip a byte inside the record stream.
        let last = table.len() - 1;
        table[last] ^= 0xFF;
        let mut mem = image_with_table_at(0xF0100, &table);

        assert!(matches!(
            CorebootTable::scan_memory(&mut mem),
            Err(Error::TableNotFound)
        ));
    }

    #[test]
    fn test_corrupt_header_checksum_not_found() {
        let mut table = build_table(&[cmos_record()]);
        table[9] ^= 0xFF;
        let mut mem = image_with_table_at(0xF0100, &table);

        assert!(matches!(
            CorebootTable::scan_memory(&mut mem),
            Err(Error::TableNotFound)
        ));
    }

    #[test]
    fn test_wrong_entry_count_not_found() {
        let table = {
            let records = [cmos_record()];
            let mut table = build_table(&records);
            // Claim two entries while carrying one; re-seal the header
            // checksum so only the count is inconsistent.
            table[20..24].copy_from_slice(&2u32.to_le_bytes());
            table[8..12].copy_from_slice(&[0; 4]);
            let checksum = ip_checksum(&table[..HEADER_SIZE]);
            table[8..12].copy_from_slice(&u32::from(checksum).to_le_bytes());
            table
        };
        let mut mem = image_with_table_at(0xF0100, &table);

        assert!(matches!(
            CorebootTable::scan_memory(&mut mem),
            Err(Error::TableNotFound)
        ));
    }

    #[test]
    fn test_forward_record_chases_target() {
        let real = build_table(&[cmos_record()]);

        let mut forward_payload = Vec::new();
        forward_payload.extend_from_slice(&0xF8000u64.to_le_bytes());
        let forwarder = build_table(&[record(LB_TAG_FORWARD, &forward_payload)]);

        let mut image = vec![0u8; 0x100000];
        image[0xF0100..0xF0100 + forwarder.len()].copy_from_slice(&forwarder);
        image[0xF8000..0xF8000 + real.len()].copy_from_slice(&real);
        let mut mem = FakeMem { image };

        let found = CorebootTable::scan_memory(&mut mem).unwrap();
        assert!(found.find_cmos_option_table().is_some());
    }

    #[test]
    fn test_empty_image_not_found() {
        let mut mem = FakeMem {
            image: vec![0u8; 0x100000],
        };
        assert!(matches!(
            CorebootTable::scan_memory(&mut mem),
            Err(Error::TableNotFound)
        ));
    }
}
