//! 子命令实现

mod bench;
mod gyro;
mod run;

pub use bench::BenchCommand;
pub use gyro::GyroCommand;
pub use run::RunCommand;

use anyhow::{Context, Result};
use copter_bus::Bus;
#[cfg(target_os = "linux")]
use copter_bus::BusRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// 安装 Ctrl-C 处理，返回运行标志
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        info!("Interrupted, shutting down");
        flag.store(false, Ordering::Release);
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(running)
}

/// 诊断子命令直接打开总线，不经过流水线
#[cfg(target_os = "linux")]
fn open_bus(number: u8) -> Result<Arc<Bus>> {
    BusRegistry::new()
        .open(number)
        .with_context(|| format!("failed to open I2C bus {}", number))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(number: u8) -> Result<Arc<Bus>> {
    anyhow::bail!("I2C bus {} unavailable: i2c-dev is only supported on Linux", number)
}
