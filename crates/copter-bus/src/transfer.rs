//! 块传输记录
//!
//! 内核 `union i2c_smbus_data` 的定长字节布局：
//!
//! ```text
//! byte 0      : 块长度 N（0..=32）
//! byte 1..=N  : 数据
//! byte N+1..  : 预留（PEC 等）
//! ```
//!
//! 构造时校验长度，传输层只需要把 [`BlockTransfer::raw_mut`] 交给内核。

use crate::BusError;

/// 块传输最大长度（`I2C_SMBUS_BLOCK_MAX`）
pub const BLOCK_MAX: usize = 32;

/// 寄存器地址最高位：请求外设在多字节读取时自动递增寄存器地址
pub const AUTO_INCREMENT: u8 = 0x80;

/// `union i2c_smbus_data` 大小：1 字节长度 + 32 字节数据 + 1 字节 PEC
pub(crate) const SMBUS_DATA_LEN: usize = BLOCK_MAX + 2;

/// 传输方向（与 `I2C_SMBUS_READ` / `I2C_SMBUS_WRITE` 取值一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// 一次块传输的完整描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransfer {
    direction: Direction,
    register: u8,
    data: [u8; SMBUS_DATA_LEN],
}

impl BlockTransfer {
    /// 从 `register` 开始读取 `len` 字节
    pub fn read(register: u8, len: usize) -> Result<Self, BusError> {
        if len > BLOCK_MAX {
            return Err(BusError::BlockTooLong { len });
        }
        let mut data = [0u8; SMBUS_DATA_LEN];
        data[0] = len as u8;
        Ok(Self {
            direction: Direction::Read,
            register,
            data,
        })
    }

    /// 从 `register` 开始写入 `payload`，长度前缀自动填入
    pub fn write(register: u8, payload: &[u8]) -> Result<Self, BusError> {
        if payload.len() > BLOCK_MAX {
            return Err(BusError::BlockTooLong { len: payload.len() });
        }
        let mut data = [0u8; SMBUS_DATA_LEN];
        data[0] = payload.len() as u8;
        data[1..=payload.len()].copy_from_slice(payload);
        Ok(Self {
            direction: Direction::Write,
            register,
            data,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn register(&self) -> u8 {
        self.register
    }

    /// 当前长度前缀（内核读取完成后可能会改写）
    pub fn len(&self) -> usize {
        (self.data[0] as usize).min(BLOCK_MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 有效数据（不含长度前缀）
    pub fn payload(&self) -> &[u8] {
        &self.data[1..=self.len()]
    }

    /// 可写的有效数据区（传输层填充读取结果时使用）
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[1..=len]
    }

    /// 内核视角的原始缓冲区
    pub fn raw_mut(&mut self) -> &mut [u8; SMBUS_DATA_LEN] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_prefixes_length() {
        let transfer = BlockTransfer::write(0x20, &[0x0F, 0x00, 0x08]).unwrap();
        assert_eq!(transfer.direction(), Direction::Write);
        assert_eq!(transfer.register(), 0x20);
        assert_eq!(transfer.len(), 3);
        assert_eq!(transfer.payload(), &[0x0F, 0x00, 0x08]);

        let mut transfer = transfer;
        assert_eq!(transfer.raw_mut()[0], 3);
    }

    #[test]
    fn test_read_reserves_requested_length() {
        let mut transfer = BlockTransfer::read(0x28 | AUTO_INCREMENT, 6).unwrap();
        assert_eq!(transfer.direction(), Direction::Read);
        assert_eq!(transfer.register(), 0xA8);
        assert_eq!(transfer.payload(), &[0u8; 6]);

        transfer.payload_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(transfer.payload(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_block_limit_is_enforced() {
        assert!(BlockTransfer::read(0x00, BLOCK_MAX).is_ok());
        assert!(matches!(
            BlockTransfer::read(0x00, BLOCK_MAX + 1),
            Err(BusError::BlockTooLong { len: 33 })
        ));
        assert!(matches!(
            BlockTransfer::write(0x00, &[0u8; 40]),
            Err(BusError::BlockTooLong { len: 40 })
        ));
    }

    #[test]
    fn test_direction_matches_kernel_flags() {
        assert_eq!(Direction::Read as u8, 1);
        assert_eq!(Direction::Write as u8, 0);
    }
}
