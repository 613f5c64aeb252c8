//! # Copter Bus Layer
//!
//! I2C 总线访问层，提供按外设地址寻址的寄存器读写。
//!
//! ## 特性
//!
//! - 每条总线一把锁：地址选择和随后的数据传输是一个原子操作，
//!   同一物理总线上的两个外设不会交错
//! - 地址缓存：只有目标地址变化时才重新发起地址选择（ioctl 开销远大于一次传输）
//! - 显式的总线注册表 [`BusRegistry`]：每个总线号在进程内只对应一个 [`Bus`]
//! - 传输层抽象 [`Transport`]：Linux 下由 i2c-dev 实现，测试中由 `MockTransport` 实现
//!
//! ## 错误策略
//!
//! 任何底层失败都以 [`BusError`] 返回并携带 OS 层原因，本层不做自动重试。

use std::io;
use thiserror::Error;

mod bus;
mod registry;
pub mod transfer;

#[cfg(target_os = "linux")]
pub mod i2cdev;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bus::{Bus, BusMetrics, BusMetricsSnapshot};
pub use registry::BusRegistry;
pub use transfer::{AUTO_INCREMENT, BLOCK_MAX, BlockTransfer, Direction};

#[cfg(target_os = "linux")]
pub use i2cdev::I2cDevTransport;

#[cfg(any(test, feature = "mock"))]
pub use mock::{BusOp, MockTransport};

/// 总线层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Failed to open I2C bus {bus}: {source}")]
    Open { bus: u8, source: io::Error },

    #[error("Failed to select peripheral 0x{address:02X}: {source}")]
    Select { address: u8, source: io::Error },

    #[error("Transfer to 0x{address:02X} register 0x{register:02X} failed: {source}")]
    Transfer {
        address: u8,
        register: u8,
        source: io::Error,
    },

    #[error("Unexpected number of bytes written to 0x{address:02X}: {written} of {expected}")]
    ShortWrite {
        address: u8,
        written: usize,
        expected: usize,
    },

    #[error("Block length {len} exceeds the 32-byte block limit")]
    BlockTooLong { len: usize },
}

impl BusError {
    /// 获取底层 OS 错误（如果有）
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            BusError::Open { source, .. }
            | BusError::Select { source, .. }
            | BusError::Transfer { source, .. } => Some(source),
            BusError::ShortWrite { .. } | BusError::BlockTooLong { .. } => None,
        }
    }
}

/// 总线传输层
///
/// 对应一个已打开的总线句柄。实现者只负责单次原语操作，
/// 地址缓存和串行化由 [`Bus`] 负责。
pub trait Transport: Send {
    /// 选择后续传输的目标外设地址（Linux 下为 `I2C_SLAVE` ioctl）
    fn select_address(&mut self, address: u8) -> io::Result<()>;

    /// 直接写入原始字节（用于 `[register, value]` 二元组写入）
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// 执行一次块传输（Linux 下为 `I2C_SMBUS` ioctl，`I2C_SMBUS_I2C_BLOCK_DATA`）
    fn block_transfer(&mut self, transfer: &mut BlockTransfer) -> io::Result<()>;
}
