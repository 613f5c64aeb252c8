//! # Copter Sensors
//!
//! 三轴传感器采样模型：陀螺仪（L3GD20）、加速度计和磁力计（LSM303）。
//!
//! 每个传感器由一个通用的 [`DeviceSampler`] 加上一个描述寄存器布局的
//! [`DeviceModel`] 组成：
//!
//! - [`DeviceSampler::measure`]：读取一帧原始数据并累加（读取失败直接丢弃）
//! - [`DeviceSampler::evaluate`]：返回去偏后的均值并清空累加器
//! - [`DeviceSampler::compute_bias`]：把原始均值记为新的偏置（静止标定）
//! - [`DeviceSampler::read_xyz`]：单次读取，不经过累加器
//!
//! 量程/增益寄存器只能通过 [`DeviceSampler::write_register`] 修改，
//! 灵敏度在同一次调用内随硬件配置一起更新。

pub mod error;
pub mod models;
pub mod sampler;

pub use error::SensorError;
pub use models::{
    AccelRange, GyroRange, L3gd20, Lsm303Accel, Lsm303Mag, MagGain, STANDARD_GRAVITY,
};
pub use sampler::{Accumulator, DeviceModel, DeviceSampler};

/// L3GD20 陀螺仪采样器
pub type Gyroscope = DeviceSampler<L3gd20>;

/// LSM303 加速度计采样器
pub type Accelerometer = DeviceSampler<Lsm303Accel>;

/// LSM303 磁力计采样器
pub type Magnetometer = DeviceSampler<Lsm303Mag>;
