//! # Copter
//!
//! 姿态估计流水线与传感器诊断工具。
//!
//! ```bash
//! # 完整流水线（默认子命令）
//! copter --config copter.toml run --calibrate
//!
//! # 陀螺仪原始数据监视
//! copter --bus 1 gyro
//!
//! # 单次读取 + 滤波器更新的耗时测试
//! copter bench --iterations 50000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use copter_driver::CopterConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{BenchCommand, GyroCommand, RunCommand};

/// 四轴飞行器姿态估计
#[derive(Parser, Debug)]
#[command(name = "copter")]
#[command(about = "Quadcopter attitude estimation pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（TOML）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// I2C 总线号，覆盖配置文件
    #[arg(short, long, global = true)]
    bus: Option<u8>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行完整流水线（默认）
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 陀螺仪原始数据监视
    Gyro {
        #[command(flatten)]
        args: GyroCommand,
    },

    /// 传感器读取与滤波器更新耗时测试
    Bench {
        #[command(flatten)]
        args: BenchCommand,
    },
}

/// 未设置 RUST_LOG 时各 crate 的日志级别
const LOG_DIRECTIVES: &[&str] = &[
    "copter=info",
    "copter_driver=info",
    "copter_sensors=info",
    "copter_bus=info",
    "copter_ahrs=info",
];

/// RUST_LOG 非空且可解析时整体取代默认级别
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(LOG_DIRECTIVES.join(",")))
}

fn main() -> Result<()> {
    // 初始化日志：RUST_LOG 优先
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CopterConfig::load(path)?,
        None => CopterConfig::default(),
    };
    if let Some(bus) = cli.bus {
        config.bus.number = bus;
    }

    match cli.command {
        Some(Commands::Run { args }) => args.execute(config),
        Some(Commands::Gyro { args }) => args.execute(&config),
        Some(Commands::Bench { args }) => args.execute(&config),
        None => RunCommand::default().execute(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copter_protocol::CommandLayout;

    #[test]
    fn test_rust_log_raises_crate_level() {
        let filter = log_filter(Some("copter_bus=trace")).to_string();
        assert!(filter.contains("copter_bus=trace"), "{}", filter);
        assert!(!filter.contains("copter_bus=info"), "{}", filter);
    }

    #[test]
    fn test_default_directives_without_rust_log() {
        for rust_log in [None, Some(""), Some("copter_bus=loud")] {
            let filter = log_filter(rust_log).to_string();
            for directive in LOG_DIRECTIVES {
                assert!(filter.contains(directive), "{} missing from {}", directive, filter);
            }
        }
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from(["copter", "--bus", "2", "run", "--layout", "legacy"]).unwrap();
        assert_eq!(cli.bus, Some(2));
        match cli.command {
            Some(Commands::Run { args }) => assert_eq!(args.layout, Some(CommandLayout::Legacy)),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
