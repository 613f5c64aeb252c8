//! LSM303 磁力计

use super::be_i16;
use crate::{DeviceModel, DeviceSampler, SensorError};
use copter_bus::AUTO_INCREMENT;
use nalgebra::Vector3;

pub const ADDRESS: u8 = 0x1E;

pub const CRA_REG: u8 = 0x00;
pub const CRB_REG: u8 = 0x01;
pub const MR_REG: u8 = 0x02;
pub const OUT_X_H: u8 = 0x03;

/// 连续转换模式
const CONTINUOUS: u8 = 0x00;

const GAUSS_TO_MICROTESLA: f32 = 100.0;

/// 增益（CRB_REG 取值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MagGain {
    /// ±1.3 Ga
    #[default]
    Gain1_3 = 0x20,
    /// ±1.9 Ga
    Gain1_9 = 0x40,
    /// ±2.5 Ga
    Gain2_5 = 0x60,
    /// ±4.0 Ga
    Gain4_0 = 0x80,
    /// ±4.7 Ga
    Gain4_7 = 0xA0,
    /// ±5.6 Ga
    Gain5_6 = 0xC0,
    /// ±8.1 Ga
    Gain8_1 = 0xE0,
}

impl MagGain {
    /// (XY 轴 LSB/gauss, Z 轴 LSB/gauss)
    pub fn lsb_per_gauss(self) -> (f32, f32) {
        match self {
            MagGain::Gain1_3 => (1100.0, 980.0),
            MagGain::Gain1_9 => (855.0, 760.0),
            MagGain::Gain2_5 => (670.0, 600.0),
            MagGain::Gain4_0 => (450.0, 400.0),
            MagGain::Gain4_7 => (400.0, 255.0),
            MagGain::Gain5_6 => (330.0, 295.0),
            MagGain::Gain8_1 => (230.0, 205.0),
        }
    }
}

impl TryFrom<u8> for MagGain {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x20 => Ok(MagGain::Gain1_3),
            0x40 => Ok(MagGain::Gain1_9),
            0x60 => Ok(MagGain::Gain2_5),
            0x80 => Ok(MagGain::Gain4_0),
            0xA0 => Ok(MagGain::Gain4_7),
            0xC0 => Ok(MagGain::Gain5_6),
            0xE0 => Ok(MagGain::Gain8_1),
            other => Err(other),
        }
    }
}

/// LSM303 磁力计寄存器模型，输出单位 µT
///
/// 数据寄存器为大端，排列顺序是 X、Z、Y。
#[derive(Debug, Clone)]
pub struct Lsm303Mag {
    address: u8,
    gain: MagGain,
}

impl Lsm303Mag {
    pub fn new() -> Self {
        Self::with_address(ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            gain: MagGain::default(),
        }
    }

    pub fn gain(&self) -> MagGain {
        self.gain
    }
}

impl Default for Lsm303Mag {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceModel for Lsm303Mag {
    fn name(&self) -> &'static str {
        "magnetometer"
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn data_register(&self) -> u8 {
        OUT_X_H | AUTO_INCREMENT
    }

    fn decode(&self, raw: &[u8; 6]) -> [i16; 3] {
        let x = be_i16(raw[0], raw[1]);
        let z = be_i16(raw[2], raw[3]);
        let y = be_i16(raw[4], raw[5]);
        [x, y, z]
    }

    fn scale(&self) -> Vector3<f32> {
        let (xy, z) = self.gain.lsb_per_gauss();
        Vector3::new(
            GAUSS_TO_MICROTESLA / xy,
            GAUSS_TO_MICROTESLA / xy,
            GAUSS_TO_MICROTESLA / z,
        )
    }

    fn power_up(&self) -> Vec<(u8, u8)> {
        vec![(MR_REG, CONTINUOUS), (CRB_REG, self.gain as u8)]
    }

    fn check_write(&self, register: u8, value: u8) -> Result<(), SensorError> {
        if register == CRB_REG && MagGain::try_from(value).is_err() {
            return Err(SensorError::InvalidSetting {
                device: self.name(),
                register,
                value,
            });
        }
        Ok(())
    }

    fn register_written(&mut self, register: u8, value: u8) {
        if register == CRB_REG {
            if let Ok(gain) = MagGain::try_from(value) {
                self.gain = gain;
            }
        }
    }
}

impl DeviceSampler<Lsm303Mag> {
    /// 设置增益，换算系数随寄存器写入一起更新
    pub fn set_gain(&mut self, gain: MagGain) -> Result<(), SensorError> {
        self.write_register(CRB_REG, gain as u8)
    }
}
