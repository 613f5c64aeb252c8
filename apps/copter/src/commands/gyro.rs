//! 陀螺仪原始数据监视
//!
//! 每轮取若干次原始读数求平均，打印与上一轮平均值的差。
//! 机体静止时差值应在几个计数以内。

use anyhow::Result;
use clap::Args;
use copter_driver::CopterConfig;
use copter_sensors::{Gyroscope, L3gd20};
use nalgebra::Vector3;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Args, Debug)]
pub struct GyroCommand {
    /// 每轮读数次数
    #[arg(short, long, default_value_t = 10)]
    pub samples: u32,

    /// 两次读数之间的间隔（毫秒）
    #[arg(short, long, default_value_t = 100)]
    pub interval_ms: u64,
}

impl GyroCommand {
    pub fn execute(&self, config: &CopterConfig) -> Result<()> {
        let running = super::interrupt_flag()?;
        let bus = super::open_bus(config.bus.number)?;
        let gyro = Gyroscope::init(bus, L3gd20::with_address(config.bus.gyro_address))?;
        println!(
            "L3GD20 at 0x{:02X}: WHO_AM_I 0x{:02X}, temperature {}",
            config.bus.gyro_address,
            gyro.who_am_i()?,
            gyro.read_temperature()?
        );

        let interval = Duration::from_millis(self.interval_ms);
        let mut previous: Option<Vector3<f32>> = None;

        while running.load(Ordering::Acquire) {
            let mut sum = Vector3::<f32>::zeros();
            let mut count = 0u32;
            for _ in 0..self.samples {
                match gyro.read_raw() {
                    Ok([x, y, z]) => {
                        sum += Vector3::new(f32::from(x), f32::from(y), f32::from(z));
                        count += 1;
                    },
                    Err(e) => warn!("Gyroscope read failed: {}", e),
                }
                thread::sleep(interval);
            }
            if count == 0 {
                continue;
            }

            let mean = sum / count as f32;
            let delta = previous.map_or(Vector3::zeros(), |p| mean - p);
            println!(
                "raw ({:8.1}, {:8.1}, {:8.1})  delta ({:+7.1}, {:+7.1}, {:+7.1})",
                mean.x, mean.y, mean.z, delta.x, delta.y, delta.z
            );
            previous = Some(mean);
        }
        Ok(())
    }
}
