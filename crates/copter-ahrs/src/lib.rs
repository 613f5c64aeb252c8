//! # Copter AHRS
//!
//! 姿态估计：四元数形式的 Mahony 互补滤波器，
//! 磁场参考方向按 Madgwick 的方法在线估计，磁干扰只影响航向（yaw）。
//!
//! ## 使用
//!
//! ```
//! use copter_ahrs::MahonyFilter;
//! use nalgebra::Vector3;
//! use std::time::{Duration, Instant};
//!
//! let start = Instant::now();
//! let mut filter = MahonyFilter::new(start);
//!
//! let orientation = filter
//!     .update(
//!         start + Duration::from_millis(20),
//!         Vector3::zeros(),                   // rad/s
//!         Vector3::new(0.01, -0.02, 9.81),    // m/s²
//!         Vector3::new(20.0, 0.3, -40.0),     // µT
//!     )
//!     .unwrap();
//! assert!(orientation.pitch.abs() < 0.1);
//! ```
//!
//! ## 时间间隔
//!
//! 两次更新之间的间隔必须严格为正。间隔为零或为负时
//! [`MahonyFilter::update`] 返回 [`FilterError::NonPositiveInterval`]，
//! 滤波器状态（包括上次更新时间）保持不变。

use thiserror::Error;

mod mahony;
mod orientation;

pub use mahony::{Gains, MahonyFilter};
pub use orientation::Orientation;

/// 滤波器错误类型
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FilterError {
    /// 与上次更新的时间间隔不为正（时钟回退或重复时间戳）
    #[error("Non-positive update interval: {elapsed_ns} ns")]
    NonPositiveInterval { elapsed_ns: i64 },

    /// 输入含有 NaN 或无穷大
    #[error("Non-finite sensor input")]
    NonFiniteInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_error_display() {
        let err = FilterError::NonPositiveInterval { elapsed_ns: -5 };
        assert_eq!(err.to_string(), "Non-positive update interval: -5 ns");
        assert_eq!(FilterError::NonFiniteInput.to_string(), "Non-finite sensor input");
    }
}
