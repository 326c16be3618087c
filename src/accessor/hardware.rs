//! CMOS accessor for the NVRAM hardware behind x86 I/O ports.
//!
//! The RTC chip exposes its SRAM through two index/data port pairs:
//! `(0x70, 0x71)` for offsets below 128 and `(0x72, 0x73)` for the upper
//! bank. Ports are driven through `/dev/port`, where a seek position is a
//! port number. Opening raises the I/O privilege level so the port file
//! can be used from user space; closing lowers it again.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;

use crate::accessor::{verify_cmos_byte_index, CmosAccess};
use crate::debug_cmos;
use crate::error::{Error, Result};

/// CMOS accessor driving the index/data port pairs through `/dev/port`.
pub struct PortAccess {
    port_file: Option<File>,
}

/// Set the I/O privilege level for this process.
fn iopl(level: libc::c_int) -> Result<()> {
    let rc = unsafe { libc::syscall(libc::SYS_iopl, level) };
    if rc != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

impl PortAccess {
    /// Raise the I/O privilege level and open `/dev/port`.
    pub fn open() -> Result<Self> {
        debug_cmos!("Opening CMOS port access");

        iopl(3)?;

        let port_file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/port");

        match port_file {
            Ok(file) => Ok(Self {
                port_file: Some(file),
            }),
            Err(err) => {
                // The privilege level must come back down even when the
                // port file is unavailable.
                let _ = iopl(0);
                Err(err.into())
            }
        }
    }

    /// Index/data port pair for a CMOS offset.
    fn ports(index: usize) -> (u64, u64) {
        if index < 128 {
            (0x70, 0x71)
        } else {
            (0x72, 0x73)
        }
    }

    fn read_reg8(&mut self, port: u64) -> Result<u8> {
        let file = self.port_file.as_mut().ok_or(Error::NotOpen)?;
        file.seek(SeekFrom::Start(port))?;
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn write_reg8(&mut self, port: u64, value: u8) -> Result<()> {
        let file = self.port_file.as_mut().ok_or(Error::NotOpen)?;
        file.seek(SeekFrom::Start(port))?;
        file.write_all(&[value])?;
        file.sync_all()?;
        Ok(())
    }
}

impl CmosAccess for PortAccess {
    fn read_byte(&mut self, index: usize) -> Result<u8> {
        if self.port_file.is_none() {
            return Err(Error::NotOpen);
        }
        if !verify_cmos_byte_index(index) {
            return Err(Error::InvalidIndex(index));
        }

        let (index_port, data_port) = Self::ports(index);
        self.write_reg8(index_port, index as u8)?;
        self.read_reg8(data_port)
    }

    fn write_byte(&mut self, index: usize, value: u8) -> Result<()> {
        if self.port_file.is_none() {
            return Err(Error::NotOpen);
        }
        if !verify_cmos_byte_index(index) {
            return Err(Error::InvalidIndex(index));
        }

        let (index_port, data_port) = Self::ports(index);
        self.write_reg8(index_port, index as u8)?;
        self.write_reg8(data_port, value)
    }

    fn close(&mut self) -> Result<()> {
        debug_cmos!("Closing CMOS port access");

        // Drop the port file first so the handle is released even when
        // lowering the privilege level fails.
        self.port_file = None;
        iopl(0)
    }

    fn name(&self) -> &'static str {
        "port"
    }
}

impl Drop for PortAccess {
    fn drop(&mut self) {
        if self.port_file.is_some() {
            let _ = self.close();
        }
    }
}
