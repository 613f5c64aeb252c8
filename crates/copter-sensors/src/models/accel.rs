//! LSM303 加速度计

use super::{STANDARD_GRAVITY, le_i16};
use crate::{DeviceModel, DeviceSampler, SensorError};
use copter_bus::AUTO_INCREMENT;
use nalgebra::Vector3;

pub const ADDRESS: u8 = 0x19;

pub const CTRL_REG1: u8 = 0x20;
pub const CTRL_REG4: u8 = 0x23;
pub const OUT_X_L: u8 = 0x28;

/// 50 Hz 输出、使能三轴
const POWER_ON: u8 = 0x27;

/// 12 位数据左对齐存放在 16 位寄存器中
const LEFT_JUSTIFY: f32 = 16.0;

/// 满量程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelRange {
    #[default]
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    /// 从 CTRL_REG4 的 FS 位（bit 4-5）解析
    pub fn from_ctrl_reg4(value: u8) -> Self {
        match (value >> 4) & 0x03 {
            0 => AccelRange::G2,
            1 => AccelRange::G4,
            2 => AccelRange::G8,
            _ => AccelRange::G16,
        }
    }

    pub fn ctrl_reg4_bits(self) -> u8 {
        (self as u8) << 4
    }

    /// 每个 12 位计数对应的 mg
    pub fn mg_per_count(self) -> f32 {
        match self {
            AccelRange::G2 => 1.0,
            AccelRange::G4 => 2.0,
            AccelRange::G8 => 4.0,
            AccelRange::G16 => 12.0,
        }
    }
}

/// LSM303 加速度计寄存器模型，输出单位 m/s²
#[derive(Debug, Clone)]
pub struct Lsm303Accel {
    address: u8,
    range: AccelRange,
}

impl Lsm303Accel {
    pub fn new() -> Self {
        Self::with_address(ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            range: AccelRange::default(),
        }
    }

    pub fn range(&self) -> AccelRange {
        self.range
    }
}

impl Default for Lsm303Accel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceModel for Lsm303Accel {
    fn name(&self) -> &'static str {
        "accelerometer"
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn data_register(&self) -> u8 {
        OUT_X_L | AUTO_INCREMENT
    }

    fn decode(&self, raw: &[u8; 6]) -> [i16; 3] {
        [
            le_i16(raw[0], raw[1]),
            le_i16(raw[2], raw[3]),
            le_i16(raw[4], raw[5]),
        ]
    }

    fn scale(&self) -> Vector3<f32> {
        Vector3::repeat(self.range.mg_per_count() / LEFT_JUSTIFY * 1e-3 * STANDARD_GRAVITY)
    }

    fn power_up(&self) -> Vec<(u8, u8)> {
        vec![(CTRL_REG1, POWER_ON)]
    }

    fn register_written(&mut self, register: u8, value: u8) {
        if register == CTRL_REG4 {
            self.range = AccelRange::from_ctrl_reg4(value);
        }
    }
}

impl DeviceSampler<Lsm303Accel> {
    /// 切换满量程
    pub fn set_range(&mut self, range: AccelRange) -> Result<(), SensorError> {
        self.write_register(CTRL_REG4, range.ctrl_reg4_bits())
    }
}
