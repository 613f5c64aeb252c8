//! 静止标定
//!
//! 机体静止时连续采样，把均值记为陀螺仪和加速度计的偏置。
//! 加速度计的静止均值里包含重力，只有它与 1 g 的差才是偏置。

use copter_sensors::{Accelerometer, DeviceModel, Gyroscope, STANDARD_GRAVITY, SensorError};
use nalgebra::Vector3;
use std::time::Duration;
use tracing::{info, warn};

/// 采样 `iterations` 轮（每轮陀螺仪、加速度计各一次，间隔 `interval`），
/// 然后依次计算两者的偏置
///
/// 所有读取都失败时返回 [`SensorError::NoSamples`]，偏置保持不变。
pub fn calibrate(
    gyro: &mut Gyroscope,
    accel: &mut Accelerometer,
    iterations: u32,
    interval: Duration,
) -> Result<(), SensorError> {
    info!(
        "Calibrating: {} iterations at {:?}, keep the airframe still",
        iterations, interval
    );
    gyro.reset();
    accel.reset();

    for _ in 0..iterations {
        gyro.measure();
        accel.measure();
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    let (gyro_samples, accel_samples) = (gyro.pending_samples(), accel.pending_samples());
    gyro.compute_bias()?;
    accel.compute_bias()?;
    let accel_bias = remove_gravity(accel.bias(), accel.model().scale());
    accel.set_bias(accel_bias);

    info!(
        "Calibration done ({} gyro / {} accel samples), gyro bias {:?}, accel bias {:?}",
        gyro_samples,
        accel_samples,
        gyro.bias().as_slice(),
        accel.bias().as_slice()
    );
    Ok(())
}

/// 从静止均值（原始计数）中扣除沿测得重力方向的 1 g
///
/// 均值为零向量时无法确定重力方向，不设加速度计偏置。
fn remove_gravity(mean: Vector3<f32>, scale: Vector3<f32>) -> Vector3<f32> {
    match mean.component_mul(&scale).try_normalize(f32::EPSILON) {
        Some(down) => mean - (down * STANDARD_GRAVITY).component_div(&scale),
        None => {
            warn!("No gravity measured during calibration, accelerometer bias left at zero");
            Vector3::zeros()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use copter_bus::{Bus, MockTransport};
    use copter_sensors::{L3gd20, Lsm303Accel};
    use std::sync::Arc;

    fn le(values: [i16; 3]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn setup() -> (MockTransport, Gyroscope, Accelerometer) {
        let mock = MockTransport::new();
        let bus = Arc::new(Bus::new(1, Box::new(mock.clone())));
        let gyro = Gyroscope::new(bus.clone(), L3gd20::new());
        let accel = Accelerometer::new(bus, Lsm303Accel::new());
        (mock, gyro, accel)
    }

    #[test]
    fn test_calibrate_sets_bias_to_mean() {
        let (mock, mut gyro, mut accel) = setup();
        mock.queue_read(0x6B, 0x28, &le([10, 20, 30]));
        mock.queue_read(0x6B, 0x28, &le([30, 40, 50]));
        mock.set_registers(0x6B, 0x28, &le([0, 0, 0]));
        mock.set_registers(0x19, 0x28, &le([0, 0, 16100]));

        calibrate(&mut gyro, &mut accel, 4, Duration::ZERO).unwrap();

        // 陀螺仪 X/Y 交换：(10,20,30)、(30,40,50)、0、0 → 均值 (15, 10, 20)
        assert_eq!(gyro.bias(), Vector3::new(15.0, 10.0, 20.0));
        // ±2 g 量程下 1 g = 16000 计数，只有多出的 100 计入偏置
        assert_relative_eq!(accel.bias(), Vector3::new(0.0, 0.0, 100.0), epsilon = 1e-2);
        assert_eq!(gyro.pending_samples(), 0);
        assert_eq!(accel.pending_samples(), 0);

        // 去偏后静止读数为 1 g
        let level = accel.read_xyz().unwrap();
        assert_relative_eq!(level, Vector3::new(0.0, 0.0, STANDARD_GRAVITY), epsilon = 1e-3);
    }

    #[test]
    fn test_tilt_after_calibration_is_observable() {
        let (mock, mut gyro, mut accel) = setup();
        mock.set_registers(0x6B, 0x28, &le([0, 0, 0]));
        mock.set_registers(0x19, 0x28, &le([0, 0, 16100]));
        calibrate(&mut gyro, &mut accel, 4, Duration::ZERO).unwrap();

        // 横滚 30°：1 g 分到 y/z 两轴，偏置仍在 z 轴
        mock.set_registers(0x19, 0x28, &le([0, 8000, 13856 + 100]));
        let tilted = accel.read_xyz().unwrap();

        let roll = tilted.y.atan2(tilted.z).to_degrees();
        assert_relative_eq!(roll, 30.0, epsilon = 0.1);
        assert_relative_eq!(tilted.norm(), STANDARD_GRAVITY, epsilon = 1e-2);
    }

    #[test]
    fn test_remove_gravity_follows_measured_axis() {
        let scale = Vector3::repeat(STANDARD_GRAVITY / 16000.0);

        // 侧放：重力在 x 轴
        let bias = remove_gravity(Vector3::new(-16050.0, 0.0, 0.0), scale);
        assert_relative_eq!(bias, Vector3::new(-50.0, 0.0, 0.0), epsilon = 1e-2);

        assert_eq!(remove_gravity(Vector3::zeros(), scale), Vector3::zeros());
    }

    #[test]
    fn test_calibrate_without_samples_fails() {
        let (mock, mut gyro, mut accel) = setup();
        mock.fail_address(0x6B);

        let err = calibrate(&mut gyro, &mut accel, 3, Duration::ZERO).unwrap_err();
        assert!(err.is_starvation());
        assert_eq!(gyro.bias(), Vector3::zeros());
    }
}
