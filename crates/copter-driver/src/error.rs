//! 驱动层错误类型定义

use crate::config::ConfigError;
use copter_bus::BusError;
use copter_sensors::SensorError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线错误（打开总线失败等）
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 传感器初始化或标定失败
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 线程创建等 IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 数据通道已关闭（对端线程退出）
    #[error("Channel closed")]
    ChannelClosed,

    /// 后台线程 panic
    #[error("Thread panicked: {0}")]
    ThreadPanicked(String),

    /// 当前平台没有可用的总线传输层
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),
}
