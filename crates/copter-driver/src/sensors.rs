//! 三个传感器的集合

use crate::config::BusConfig;
use copter_bus::Bus;
use copter_sensors::{
    Accelerometer, Gyroscope, L3gd20, Lsm303Accel, Lsm303Mag, Magnetometer, SensorError,
};
use std::sync::Arc;
use tracing::info;

/// 同一条总线上的陀螺仪、加速度计和磁力计
///
/// 整个集合由采集线程独占。
#[derive(Debug)]
pub struct SensorSet {
    pub gyro: Gyroscope,
    pub accel: Accelerometer,
    pub mag: Magnetometer,
}

impl SensorSet {
    /// 按配置的地址初始化三个传感器（执行上电寄存器写入）
    ///
    /// 任一传感器初始化失败都直接返回错误。
    pub fn init(bus: Arc<Bus>, config: &BusConfig) -> Result<Self, SensorError> {
        let gyro = Gyroscope::init(bus.clone(), L3gd20::with_address(config.gyro_address))?;
        let accel =
            Accelerometer::init(bus.clone(), Lsm303Accel::with_address(config.accel_address))?;
        let mag = Magnetometer::init(bus.clone(), Lsm303Mag::with_address(config.mag_address))?;
        info!(
            "Sensors ready on bus {} (gyro 0x{:02X}, accel 0x{:02X}, mag 0x{:02X})",
            bus.number(),
            config.gyro_address,
            config.accel_address,
            config.mag_address
        );
        Ok(Self { gyro, accel, mag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copter_bus::{BusOp, MockTransport};

    #[test]
    fn test_init_powers_up_all_devices() {
        let mock = MockTransport::new();
        let bus = Arc::new(Bus::new(1, Box::new(mock.clone())));

        let sensors = SensorSet::init(bus, &BusConfig::default()).unwrap();
        assert_eq!(sensors.gyro.name(), "gyroscope");
        assert_eq!(sensors.accel.name(), "accelerometer");
        assert_eq!(sensors.mag.name(), "magnetometer");

        let selected: Vec<u8> = mock
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                BusOp::Select(address) => Some(address),
                _ => None,
            })
            .collect();
        assert_eq!(selected, vec![0x6B, 0x19, 0x1E]);
        assert_eq!(mock.register(0x19, 0x20), 0x27);
    }

    #[test]
    fn test_init_fails_when_device_missing() {
        let mock = MockTransport::new();
        mock.fail_address(0x19);
        let bus = Arc::new(Bus::new(1, Box::new(mock)));

        let err = SensorSet::init(bus, &BusConfig::default()).unwrap_err();
        assert!(matches!(err, SensorError::Bus(_)));
    }
}
