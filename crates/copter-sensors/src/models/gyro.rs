//! L3GD20 三轴陀螺仪

use super::le_i16;
use crate::{DeviceModel, DeviceSampler, SensorError};
use copter_bus::AUTO_INCREMENT;
use nalgebra::Vector3;

pub const ADDRESS: u8 = 0x6B;
pub const DEVICE_ID: u8 = 0xD4;

pub const WHO_AM_I: u8 = 0x0F;
pub const CTRL_REG1: u8 = 0x20;
pub const CTRL_REG4: u8 = 0x23;
pub const OUT_TEMP: u8 = 0x26;
pub const OUT_X_L: u8 = 0x28;

/// 上电、使能三轴
const POWER_ON: u8 = 0x0F;

/// 满量程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GyroRange {
    #[default]
    Dps250,
    Dps500,
    Dps2000,
}

impl GyroRange {
    /// 从 CTRL_REG4 的 FS 位（bit 4-5）解析
    pub fn from_ctrl_reg4(value: u8) -> Self {
        match (value >> 4) & 0x03 {
            0 => GyroRange::Dps250,
            1 => GyroRange::Dps500,
            _ => GyroRange::Dps2000,
        }
    }

    /// CTRL_REG4 中对应的 FS 位
    pub fn ctrl_reg4_bits(self) -> u8 {
        match self {
            GyroRange::Dps250 => 0x00,
            GyroRange::Dps500 => 0x10,
            GyroRange::Dps2000 => 0x20,
        }
    }

    /// 灵敏度（deg/s 每计数）
    pub fn sensitivity(self) -> f32 {
        match self {
            GyroRange::Dps250 => 0.00875,
            GyroRange::Dps500 => 0.0175,
            GyroRange::Dps2000 => 0.070,
        }
    }
}

/// L3GD20 寄存器模型
///
/// 输出单位为 deg/s。X/Y 轴按机架安装方向交换。
#[derive(Debug, Clone)]
pub struct L3gd20 {
    address: u8,
    range: GyroRange,
}

impl L3gd20 {
    pub fn new() -> Self {
        Self::with_address(ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            range: GyroRange::default(),
        }
    }

    pub fn range(&self) -> GyroRange {
        self.range
    }
}

impl Default for L3gd20 {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceModel for L3gd20 {
    fn name(&self) -> &'static str {
        "gyroscope"
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn data_register(&self) -> u8 {
        OUT_X_L | AUTO_INCREMENT
    }

    fn decode(&self, raw: &[u8; 6]) -> [i16; 3] {
        let y = le_i16(raw[0], raw[1]);
        let x = le_i16(raw[2], raw[3]);
        let z = le_i16(raw[4], raw[5]);
        [x, y, z]
    }

    fn scale(&self) -> Vector3<f32> {
        Vector3::repeat(self.range.sensitivity())
    }

    fn power_up(&self) -> Vec<(u8, u8)> {
        vec![(CTRL_REG1, POWER_ON)]
    }

    fn register_written(&mut self, register: u8, value: u8) {
        if register == CTRL_REG4 {
            self.range = GyroRange::from_ctrl_reg4(value);
        }
    }
}

impl DeviceSampler<L3gd20> {
    /// 片上温度（有符号字节，未校准）
    pub fn read_temperature(&self) -> Result<i8, SensorError> {
        self.read_register(OUT_TEMP)
    }

    /// 设备 ID（L3GD20 为 0xD4）
    pub fn who_am_i(&self) -> Result<u8, SensorError> {
        self.read_register(WHO_AM_I).map(|v| v as u8)
    }

    /// 切换满量程
    pub fn set_range(&mut self, range: GyroRange) -> Result<(), SensorError> {
        self.write_register(CTRL_REG4, range.ctrl_reg4_bits())
    }
}
