//! Mahony 滤波器
//!
//! 每一步：
//! 1. 磁力计三轴均非零时，用当前估计把测量场旋到地理系，取水平模长和垂直分量
//!    作为参考磁场 (bx, 0, bz)，再旋回机体系与测量方向做叉积。
//!    参考方向在线估计，因此磁场误差只作用于航向。
//! 2. 加速度计三轴均非零时，估计重力方向与测量方向做叉积，累加到误差。
//! 3. 误差非零时施加比例反馈，积分增益为正时再施加积分反馈。
//! 4. 按修正后的角速度积分四元数并归一化。

use crate::{FilterError, Orientation};
use nalgebra::{Quaternion, Vector3};
use std::time::Instant;
use tracing::trace;

/// 反馈增益
///
/// 数值直接乘在误差项上（即 Mahony 原文中的 2Kp / 2Ki）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub proportional: f32,
    pub integral: f32,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            proportional: 1.0,
            integral: 0.2,
        }
    }
}

/// 四元数姿态估计器
///
/// 只由融合线程持有，不需要加锁。
#[derive(Debug, Clone)]
pub struct MahonyFilter {
    q: Quaternion<f32>,
    last_update: Instant,
    integral_feedback: Vector3<f32>,
    gains: Gains,
}

impl MahonyFilter {
    /// 以单位四元数初始化，`start` 作为第一次更新的参考时刻
    pub fn new(start: Instant) -> Self {
        Self::with_gains(start, Gains::default())
    }

    pub fn with_gains(start: Instant, gains: Gains) -> Self {
        Self {
            q: Quaternion::identity(),
            last_update: start,
            integral_feedback: Vector3::zeros(),
            gains,
        }
    }

    /// 替换初始姿态（会被归一化）
    pub fn with_quaternion(mut self, q: Quaternion<f32>) -> Self {
        self.q = q.normalize();
        self
    }

    /// 融合一组样本
    ///
    /// `gyro` 单位 rad/s；`accel`、`mag` 只使用方向，单位任意。
    /// 时间间隔不为正或输入非有限值时返回错误，状态保持不变。
    pub fn update(
        &mut self,
        timestamp: Instant,
        gyro: Vector3<f32>,
        accel: Vector3<f32>,
        mag: Vector3<f32>,
    ) -> Result<Orientation, FilterError> {
        let dt = match timestamp.checked_duration_since(self.last_update) {
            Some(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f32(),
            Some(_) => return Err(FilterError::NonPositiveInterval { elapsed_ns: 0 }),
            None => {
                let behind = self.last_update.duration_since(timestamp);
                return Err(FilterError::NonPositiveInterval {
                    elapsed_ns: -i64::try_from(behind.as_nanos()).unwrap_or(i64::MAX),
                });
            },
        };

        let finite = |v: &Vector3<f32>| v.iter().all(|c| c.is_finite());
        if !(finite(&gyro) && finite(&accel) && finite(&mag)) {
            return Err(FilterError::NonFiniteInput);
        }

        self.last_update = timestamp;
        self.step(dt, gyro, accel, mag);
        Ok(self.orientation())
    }

    fn step(&mut self, dt: f32, mut gyro: Vector3<f32>, accel: Vector3<f32>, mag: Vector3<f32>) {
        let (q0, q1, q2, q3) = (self.q.w, self.q.i, self.q.j, self.q.k);
        let q0q0 = q0 * q0;
        let q0q1 = q0 * q1;
        let q0q2 = q0 * q2;
        let q0q3 = q0 * q3;
        let q1q1 = q1 * q1;
        let q1q2 = q1 * q2;
        let q1q3 = q1 * q3;
        let q2q2 = q2 * q2;
        let q2q3 = q2 * q3;
        let q3q3 = q3 * q3;

        let mut half_error: Vector3<f32> = Vector3::zeros();

        if let Some(m) = direction(&mag) {
            // 地理系下的测量磁场
            let hx = 2.0 * (m.x * (0.5 - q2q2 - q3q3) + m.y * (q1q2 - q0q3) + m.z * (q1q3 + q0q2));
            let hy = 2.0 * (m.x * (q1q2 + q0q3) + m.y * (0.5 - q1q1 - q3q3) + m.z * (q2q3 - q0q1));
            let bx = (hx * hx + hy * hy).sqrt();
            let bz = 2.0 * (m.x * (q1q3 - q0q2) + m.y * (q2q3 + q0q1) + m.z * (0.5 - q1q1 - q2q2));

            // 机体系下的估计磁场方向（一半）
            let half_w = Vector3::new(
                bx * (0.5 - q2q2 - q3q3) + bz * (q1q3 - q0q2),
                bx * (q1q2 - q0q3) + bz * (q0q1 + q2q3),
                bx * (q0q2 + q1q3) + bz * (0.5 - q1q1 - q2q2),
            );

            half_error += m.cross(&half_w);
        }

        if let Some(a) = direction(&accel) {
            // 机体系下的估计重力方向（一半）
            let half_v = Vector3::new(q1q3 - q0q2, q0q1 + q2q3, q0q0 - 0.5 + q3q3);

            half_error += a.cross(&half_v);
        }

        if self.gains.integral <= 0.0 {
            self.integral_feedback = Vector3::zeros();
        }

        if half_error != Vector3::zeros() {
            if self.gains.integral > 0.0 {
                self.integral_feedback += half_error * (self.gains.integral * dt);
                gyro += self.integral_feedback;
            }
            gyro += half_error * self.gains.proportional;
        }

        // q̇ = ½ q ⊗ (0, ω)
        let g = gyro * (0.5 * dt);
        let dq = Quaternion::new(
            -q1 * g.x - q2 * g.y - q3 * g.z,
            q0 * g.x + q2 * g.z - q3 * g.y,
            q0 * g.y - q1 * g.z + q3 * g.x,
            q0 * g.z + q1 * g.y - q2 * g.x,
        );
        let q = self.q + dq;

        let recip_norm = 1.0 / q.norm_squared().sqrt();
        self.q = q * recip_norm;

        trace!(
            "AHRS step dt={:.4}s error=({:.5}, {:.5}, {:.5})",
            dt, half_error.x, half_error.y, half_error.z
        );
    }

    /// 当前姿态角
    pub fn orientation(&self) -> Orientation {
        Orientation::from_quaternion(&self.q)
    }

    /// 当前四元数（w, i, j, k）
    pub fn quaternion(&self) -> Quaternion<f32> {
        self.q
    }

    /// 积分反馈累加器
    pub fn integral_feedback(&self) -> Vector3<f32> {
        self.integral_feedback
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }
}

/// 三轴均非零时返回单位方向，否则视为无效测量
fn direction(v: &Vector3<f32>) -> Option<Vector3<f32>> {
    if v.iter().all(|c| *c != 0.0) {
        v.try_normalize(f32::MIN_POSITIVE)
    } else {
        None
    }
}
