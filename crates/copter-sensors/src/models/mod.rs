//! 设备寄存器模型

pub mod accel;
pub mod gyro;
pub mod mag;

pub use accel::{AccelRange, Lsm303Accel};
pub use gyro::{GyroRange, L3gd20};
pub use mag::{Lsm303Mag, MagGain};

/// 标准重力加速度（m/s²）
pub const STANDARD_GRAVITY: f32 = 9.80665;

fn le_i16(lo: u8, hi: u8) -> i16 {
    i16::from_le_bytes([lo, hi])
}

fn be_i16(hi: u8, lo: u8) -> i16 {
    i16::from_be_bytes([hi, lo])
}
