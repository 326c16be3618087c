//! CMOS accessor backed by a memory-mapped image file.
//!
//! Byte `i` of the file corresponds to CMOS index `i`. The file is mapped
//! shared, so writes land in the image directly. The RTC area is never
//! touched; a file shorter than 256 bytes simply cannot serve the indices
//! past its end.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::accessor::{verify_cmos_byte_index, CmosAccess};
use crate::debug_cmos;
use crate::error::{Error, Result};

/// A writable MAP_SHARED view of an open file.
struct SharedMapping {
    // Keeps the descriptor alive for the lifetime of the mapping.
    _file: File,
    ptr: *mut u8,
    len: usize,
}

// Safety: the mapping is owned and only reached through &mut self.
unsafe impl Send for SharedMapping {}

impl SharedMapping {
    fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len() as usize;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Ok(Self {
            _file: file,
            ptr: ptr as *mut u8,
            len,
        })
    }

    fn get(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }
        Some(unsafe { *self.ptr.add(index) })
    }

    fn set(&mut self, index: usize, value: u8) -> bool {
        if index >= self.len {
            return false;
        }
        unsafe { *self.ptr.add(index) = value };
        true
    }
}

impl Drop for SharedMapping {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
            }
        }
    }
}

/// CMOS accessor over a memory-mapped image file.
pub struct FileAccess {
    map: Option<SharedMapping>,
}

impl FileAccess {
    /// Open and map a CMOS image file read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug_cmos!("Opening CMOS image file {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;

        let map = SharedMapping::new(file)?;
        debug_cmos!("CMOS image mapped, len = {}", map.len);

        Ok(Self { map: Some(map) })
    }
}

impl CmosAccess for FileAccess {
    fn read_byte(&mut self, index: usize) -> Result<u8> {
        let map = self.map.as_ref().ok_or(Error::NotOpen)?;
        if !verify_cmos_byte_index(index) {
            return Err(Error::InvalidIndex(index));
        }
        map.get(index).ok_or(Error::InvalidIndex(index))
    }

    fn write_byte(&mut self, index: usize, value: u8) -> Result<()> {
        let map = self.map.as_mut().ok_or(Error::NotOpen)?;
        if !verify_cmos_byte_index(index) {
            return Err(Error::InvalidIndex(index));
        }
        if !map.set(index, value) {
            return Err(Error::InvalidIndex(index));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug_cmos!("Closing CMOS image file");
        self.map = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_image(name: &str, size: usize) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nvram-file-access-{}-{}", std::process::id(), name));
        std::fs::write(&path, vec![0u8; size]).unwrap();
        path
    }

    #[test]
    fn test_read_write_byte() {
        let path = temp_image("rw", 256);
        let mut access = FileAccess::open(&path).unwrap();

        access.write_byte(14, 0xA5).unwrap();
        assert_eq!(access.read_byte(14).unwrap(), 0xA5);
        access.write_byte(255, 0x5A).unwrap();
        assert_eq!(access.read_byte(255).unwrap(), 0x5A);

        access.close().unwrap();

        // Writes went through the shared mapping into the file.
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data[14], 0xA5);
        assert_eq!(data[255], 0x5A);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_rejects_rtc_and_out_of_range_indices() {
        let path = temp_image("bounds", 256);
        let mut access = FileAccess::open(&path).unwrap();

        assert!(matches!(access.read_byte(0), Err(Error::InvalidIndex(0))));
        assert!(matches!(access.read_byte(13), Err(Error::InvalidIndex(13))));
        assert!(matches!(
            access.write_byte(256, 0),
            Err(Error::InvalidIndex(256))
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_not_open_after_close() {
        let path = temp_image("closed", 256);
        let mut access = FileAccess::open(&path).unwrap();
        access.close().unwrap();

        assert!(matches!(access.read_byte(14), Err(Error::NotOpen)));
        assert!(matches!(access.write_byte(14, 0), Err(Error::NotOpen)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_short_image_rejects_tail_indices() {
        let path = temp_image("short", 64);
        let mut access = FileAccess::open(&path).unwrap();

        assert_eq!(access.read_byte(63).unwrap(), 0);
        assert!(matches!(access.read_byte(64), Err(Error::InvalidIndex(64))));

        let _ = std::fs::remove_file(&path);
    }
}
