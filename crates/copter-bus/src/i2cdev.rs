//! Linux i2c-dev 传输层
//!
//! 通过 `/dev/i2c-N` 字符设备访问总线：
//! - `I2C_SLAVE` ioctl 选择外设地址
//! - `write(2)` 发送 `[register, value]`
//! - `I2C_SMBUS` ioctl（`I2C_SMBUS_I2C_BLOCK_DATA`）做块读写

use crate::transfer::BlockTransfer;
use crate::{BusError, Transport};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use tracing::debug;

/// `linux/i2c-dev.h`
const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_SMBUS: libc::c_ulong = 0x0720;

/// `linux/i2c.h`：不带长度前缀的块传输（长度由 data[0] 指定）
const I2C_SMBUS_I2C_BLOCK_DATA: u32 = 8;

/// `struct i2c_smbus_ioctl_data`
#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut u8,
}

/// 已打开的 `/dev/i2c-N`
#[derive(Debug)]
pub struct I2cDevTransport {
    file: File,
    path: PathBuf,
}

impl I2cDevTransport {
    /// 以读写方式打开 `/dev/i2c-{bus}`
    pub fn open(bus: u8) -> Result<Self, BusError> {
        let path = PathBuf::from(format!("/dev/i2c-{}", bus));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| BusError::Open { bus, source })?;
        debug!("Opened {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Transport for I2cDevTransport {
    fn select_address(&mut self, address: u8) -> io::Result<()> {
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.file.write(bytes)
    }

    fn block_transfer(&mut self, transfer: &mut BlockTransfer) -> io::Result<()> {
        let read_write = transfer.direction() as u8;
        let command = transfer.register();
        let mut request = SmbusIoctlData {
            read_write,
            command,
            size: I2C_SMBUS_I2C_BLOCK_DATA,
            data: transfer.raw_mut().as_mut_ptr(),
        };

        // SAFETY: `data` 指向 `BlockTransfer` 内 34 字节的缓冲区，
        // 与内核 `union i2c_smbus_data` 大小一致，且在 ioctl 返回前一直有效
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SMBUS as _,
                &mut request as *mut SmbusIoctlData,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
