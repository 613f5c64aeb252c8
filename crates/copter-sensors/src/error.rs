//! 传感器层错误类型定义

use copter_bus::BusError;
use thiserror::Error;

/// 传感器层错误类型
#[derive(Error, Debug)]
pub enum SensorError {
    /// 总线错误（携带 OS 层原因）
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 自上次 evaluate / compute_bias 以来没有累积任何样本
    #[error("No {device} samples accumulated")]
    NoSamples { device: &'static str },

    /// 寄存器值不是该设备支持的配置
    #[error("Invalid {device} setting 0x{value:02X} for register 0x{register:02X}")]
    InvalidSetting {
        device: &'static str,
        register: u8,
        value: u8,
    },
}

impl SensorError {
    /// 是否为样本不足（调用方应跳过本次打包而不是中止）
    pub fn is_starvation(&self) -> bool {
        matches!(self, SensorError::NoSamples { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_error_display() {
        let err = SensorError::NoSamples { device: "gyroscope" };
        assert_eq!(err.to_string(), "No gyroscope samples accumulated");
        assert!(err.is_starvation());

        let err = SensorError::InvalidSetting {
            device: "magnetometer",
            register: 0x01,
            value: 0x30,
        };
        assert_eq!(
            err.to_string(),
            "Invalid magnetometer setting 0x30 for register 0x01"
        );
        assert!(!err.is_starvation());
    }

    #[test]
    fn test_bus_error_converts() {
        let err: SensorError = BusError::BlockTooLong { len: 40 }.into();
        assert!(matches!(err, SensorError::Bus(BusError::BlockTooLong { len: 40 })));
    }
}
