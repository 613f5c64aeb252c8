//! # Copter Driver
//!
//! 姿态估计流水线：采集线程、命令线程、融合线程，以及构建它们的 Builder。
//!
//! ```text
//!   I2C bus ──► acquisition ──(SummarizedSample, rendezvous)──┐
//!                                                             ├──► fusion ──► CopterState / observers
//!   TCP :8042 ──► command ────(RemoteCommand, rendezvous)─────┘
//! ```
//!
//! 滤波器只由融合线程持有；唯一的共享可变状态是每条总线的锁，
//! 它只在一次地址选择加一次传输期间持有。
//!
//! ## 使用
//!
//! ```no_run
//! use copter_driver::{CopterBuilder, CopterConfig};
//!
//! let config = CopterConfig::load("copter.toml").unwrap();
//! let copter = CopterBuilder::new().config(config).build().unwrap();
//! copter.wait().unwrap();
//! ```

pub mod builder;
pub mod calibration;
pub mod config;
pub mod copter;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
pub mod sample;
pub mod sensors;
pub mod state;

pub use builder::CopterBuilder;
pub use calibration::calibrate;
pub use config::{
    AcquisitionConfig, BusConfig, CalibrationConfig, CommandConfig, ConfigError, CopterConfig,
    FilterConfig, ReportConfig,
};
pub use copter::Copter;
pub use error::DriverError;
pub use hooks::{ConsoleReporter, FusionObserver, ObserverSet};
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use pipeline::PipelineConfig;
pub use sample::SummarizedSample;
pub use sensors::SensorSet;
pub use state::{AttitudeState, CommandState, CopterState};
