//! 配置文件（TOML）
//!
//! 所有字段都有默认值，配置文件只需写出要覆盖的部分：
//!
//! ```toml
//! [bus]
//! number = 1
//!
//! [acquisition]
//! rate_hz = 50
//! mag_every = 5
//!
//! [command]
//! listen_addr = "0.0.0.0:8042"
//! layout = "legacy"
//! ```

use crate::pipeline::PipelineConfig;
use copter_ahrs::Gains;
use copter_protocol::CommandLayout;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 总线与外设地址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 总线号（`/dev/i2c-N`）
    pub number: u8,
    pub gyro_address: u8,
    pub accel_address: u8,
    pub mag_address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            number: 1,
            gyro_address: copter_sensors::models::gyro::ADDRESS,
            accel_address: copter_sensors::models::accel::ADDRESS,
            mag_address: copter_sensors::models::mag::ADDRESS,
        }
    }
}

/// 采集节奏
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// 汇总包输出频率
    pub rate_hz: u32,
    /// 从目标周期中扣除的固定开销（微秒）
    pub overhead_us: u64,
    /// 每隔多少个汇总包重新读取一次磁力计
    pub mag_every: u32,
    /// 两次采样之间的间隔（微秒），0 表示不间断采样
    pub measure_interval_us: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50,
            overhead_us: 200,
            mag_every: 5,
            measure_interval_us: 0,
        }
    }
}

impl AcquisitionConfig {
    /// 目标周期 = 1 / rate_hz - overhead
    pub fn period(&self) -> Duration {
        let nominal = Duration::from_secs(1) / self.rate_hz.max(1);
        nominal.saturating_sub(Duration::from_micros(self.overhead_us))
    }
}

/// 滤波器增益
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub proportional_gain: f32,
    pub integral_gain: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let gains = Gains::default();
        Self {
            proportional_gain: gains.proportional,
            integral_gain: gains.integral,
        }
    }
}

impl FilterConfig {
    pub fn gains(&self) -> Gains {
        Gains {
            proportional: self.proportional_gain,
            integral: self.integral_gain,
        }
    }
}

/// 遥控命令监听
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub listen_addr: SocketAddr,
    pub layout: CommandLayout,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8042)),
            layout: CommandLayout::default(),
        }
    }
}

/// 静止标定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub iterations: u32,
    pub interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            iterations: 100,
            interval_ms: 100,
        }
    }
}

/// 控制台姿态输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// 输出间隔（毫秒），0 表示关闭
    pub interval_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopterConfig {
    pub bus: BusConfig,
    pub acquisition: AcquisitionConfig,
    pub filter: FilterConfig,
    pub command: CommandConfig,
    pub calibration: CalibrationConfig,
    pub report: ReportConfig,
}

impl CopterConfig {
    /// 从文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let acq = &self.acquisition;
        if acq.rate_hz == 0 {
            return Err(ConfigError::Invalid("acquisition.rate_hz must be positive".into()));
        }
        if acq.period().is_zero() {
            return Err(ConfigError::Invalid(format!(
                "acquisition.overhead_us ({}) leaves no time in a {} Hz period",
                acq.overhead_us, acq.rate_hz
            )));
        }
        if acq.mag_every == 0 {
            return Err(ConfigError::Invalid("acquisition.mag_every must be positive".into()));
        }

        let filter = &self.filter;
        for (name, gain) in [
            ("filter.proportional_gain", filter.proportional_gain),
            ("filter.integral_gain", filter.integral_gain),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, gain
                )));
            }
        }

        if self.calibration.enabled && self.calibration.iterations == 0 {
            return Err(ConfigError::Invalid(
                "calibration.iterations must be positive when calibration is enabled".into(),
            ));
        }
        Ok(())
    }

    /// 交给采集/融合线程的运行时参数
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            period: self.acquisition.period(),
            mag_every: self.acquisition.mag_every,
            measure_interval: Duration::from_micros(self.acquisition.measure_interval_us),
            report_interval: Duration::from_millis(self.report.interval_ms),
            layout: self.command.layout,
        }
    }
}
