//! 单次读取三个传感器并更新滤波器，测量每次迭代的耗时

use anyhow::Result;
use clap::Args;
use copter_ahrs::MahonyFilter;
use copter_driver::{CopterConfig, SensorSet};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::debug;

#[derive(Args, Debug)]
pub struct BenchCommand {
    /// 迭代次数上限（默认一直运行到 Ctrl-C）
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// 每隔多少次迭代打印一次姿态
    #[arg(long, default_value_t = 100)]
    pub print_every: u64,

    /// 每隔多少次迭代打印一次平均耗时
    #[arg(long, default_value_t = 10_000)]
    pub timing_every: u64,
}

impl BenchCommand {
    pub fn execute(&self, config: &CopterConfig) -> Result<()> {
        let running = super::interrupt_flag()?;
        let bus = super::open_bus(config.bus.number)?;
        let sensors = SensorSet::init(bus, &config.bus)?;
        let mut filter = MahonyFilter::with_gains(Instant::now(), config.filter.gains());

        let print_every = self.print_every.max(1);
        let timing_every = self.timing_every.max(1);
        let mut window_start = Instant::now();
        let mut i = 0u64;

        while running.load(Ordering::Acquire) && self.iterations.is_none_or(|n| i < n) {
            i += 1;

            let gyro = sensors.gyro.read_xyz()?;
            let accel = sensors.accel.read_xyz()?;
            let mag = sensors.mag.read_xyz()?;
            match filter.update(Instant::now(), gyro.map(f32::to_radians), accel, mag) {
                Ok(orientation) => {
                    if i % print_every == 0 {
                        println!("{} {}", i, orientation);
                    }
                },
                Err(e) => debug!("Filter update skipped: {}", e),
            }

            if i % timing_every == 0 {
                let elapsed = window_start.elapsed();
                println!(
                    "{:.3} ms/iteration",
                    elapsed.as_secs_f64() * 1000.0 / timing_every as f64
                );
                window_start = Instant::now();
            }
        }
        Ok(())
    }
}
