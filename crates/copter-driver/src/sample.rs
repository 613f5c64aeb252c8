use nalgebra::Vector3;
use std::time::Instant;

/// 一个汇总周期的传感器数据
///
/// 陀螺仪和加速度计为该周期内所有样本的去偏均值，
/// 磁力计为最近一次读取的值（每隔若干个汇总包才重新读取）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummarizedSample {
    /// 打包时刻
    pub timestamp: Instant,
    /// 角速度（deg/s）
    pub gyro: Vector3<f32>,
    /// 加速度（m/s²）
    pub accel: Vector3<f32>,
    /// 磁场（µT）
    pub mag: Vector3<f32>,
    /// 本周期内的采集迭代次数
    pub sample_count: u32,
}
