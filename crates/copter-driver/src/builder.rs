//! Builder 模式实现
//!
//! 提供链式构造 [`Copter`] 实例的便捷方式。

use crate::calibration::calibrate;
use crate::config::CopterConfig;
use crate::copter::Copter;
use crate::error::DriverError;
use crate::hooks::{ConsoleReporter, FusionObserver, ObserverSet};
use crate::sensors::SensorSet;
use copter_ahrs::MahonyFilter;
use copter_bus::BusRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Copter Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use copter_driver::{CopterBuilder, CopterConfig};
///
/// let mut config = CopterConfig::default();
/// config.calibration.enabled = true;
///
/// let copter = CopterBuilder::new().config(config).build().unwrap();
/// println!("{}", copter.orientation());
/// ```
pub struct CopterBuilder {
    config: CopterConfig,
    registry: Option<Arc<BusRegistry>>,
    observers: ObserverSet,
    console_report: bool,
}

impl CopterBuilder {
    pub fn new() -> Self {
        Self {
            config: CopterConfig::default(),
            registry: None,
            observers: ObserverSet::new(),
            console_report: true,
        }
    }

    /// 整体替换配置
    pub fn config(mut self, config: CopterConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用外部提供的总线注册表（默认打开 `/dev/i2c-N`）
    pub fn registry(mut self, registry: Arc<BusRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 添加融合回调
    pub fn observer(mut self, observer: Arc<dyn FusionObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// 是否按 `[report].interval_ms` 安装控制台输出（默认安装）
    pub fn console_report(mut self, enabled: bool) -> Self {
        self.console_report = enabled;
        self
    }

    /// 打开总线、初始化传感器、（可选）标定，然后启动三个线程
    ///
    /// 总线打开或传感器初始化失败直接返回错误，不会启动任何线程。
    pub fn build(self) -> Result<Copter, DriverError> {
        let Self {
            config,
            registry,
            mut observers,
            console_report,
        } = self;
        config.validate()?;

        let registry = match registry {
            Some(registry) => registry,
            None => default_registry()?,
        };
        let bus = registry.open(config.bus.number)?;
        let mut sensors = SensorSet::init(bus.clone(), &config.bus)?;

        if config.calibration.enabled {
            calibrate(
                &mut sensors.gyro,
                &mut sensors.accel,
                config.calibration.iterations,
                Duration::from_millis(config.calibration.interval_ms),
            )?;
        }

        let pipeline = config.pipeline_config();
        if console_report && !pipeline.report_interval.is_zero() {
            observers.add(Arc::new(ConsoleReporter::new(pipeline.report_interval)));
        }

        let filter = MahonyFilter::with_gains(Instant::now(), config.filter.gains());
        info!(
            "Starting pipeline on bus {} at {} Hz, commands on {}",
            bus.number(),
            config.acquisition.rate_hz,
            config.command.listen_addr
        );
        Copter::start(
            bus,
            sensors,
            filter,
            pipeline,
            config.command.listen_addr,
            observers,
        )
    }
}

impl Default for CopterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn default_registry() -> Result<Arc<BusRegistry>, DriverError> {
    Ok(Arc::new(BusRegistry::new()))
}

#[cfg(not(target_os = "linux"))]
fn default_registry() -> Result<Arc<BusRegistry>, DriverError> {
    Err(DriverError::Unsupported(
        "no I2C transport on this platform, supply a BusRegistry",
    ))
}
