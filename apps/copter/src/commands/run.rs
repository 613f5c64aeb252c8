//! 完整流水线

use anyhow::{Context, Result};
use clap::Args;
use copter_driver::{CopterBuilder, CopterConfig};
use copter_protocol::CommandLayout;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// 主线程检查退出条件的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Args, Debug, Default)]
pub struct RunCommand {
    /// 遥控命令监听地址，覆盖配置文件
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// 启动前进行静止标定
    #[arg(long)]
    pub calibrate: bool,

    /// 遥控命令字段布局：declared，或 legacy（第六个字段写入 aux1）
    #[arg(long, value_name = "declared|legacy")]
    pub layout: Option<CommandLayout>,

    /// 打印最终生效的配置后退出
    #[arg(long)]
    pub dump_config: bool,
}

impl RunCommand {
    pub fn execute(&self, mut config: CopterConfig) -> Result<()> {
        if let Some(addr) = self.listen {
            config.command.listen_addr = addr;
        }
        if self.calibrate {
            config.calibration.enabled = true;
        }
        if let Some(layout) = self.layout {
            config.command.layout = layout;
        }
        config.validate()?;

        if self.dump_config {
            print!("{}", config.to_toml_string()?);
            return Ok(());
        }

        let running = super::interrupt_flag()?;
        let copter = CopterBuilder::new()
            .config(config)
            .build()
            .context("failed to start pipeline")?;

        while running.load(Ordering::Acquire) {
            if !copter.is_healthy() {
                warn!("Pipeline stopped unexpectedly");
                return copter.wait().map_err(Into::into);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let metrics = copter.metrics();
        info!(
            "Published {} packages ({:.1}% dropped), {} filter updates, {} commands",
            metrics.packages_published,
            metrics.drop_rate(),
            metrics.filter_updates,
            metrics.commands_received
        );
        copter.shutdown()?;
        Ok(())
    }
}
