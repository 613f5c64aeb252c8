use nalgebra::Quaternion;

/// 姿态角（弧度）
///
/// - `yaw`：参考航向与机体前向轴之间的夹角
/// - `pitch`：水平面与机体横轴之间的夹角
/// - `roll`：水平面与机体纵轴之间的夹角
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    /// 从单位四元数导出姿态角
    ///
    /// yaw 由四元数水平分量经 atan2 得到；pitch/roll 由估计重力方向经 atan 得到。
    pub fn from_quaternion(q: &Quaternion<f32>) -> Self {
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

        let grav_x = 2.0 * (q1 * q3 - q0 * q2);
        let grav_y = 2.0 * (q0 * q1 + q2 * q3);
        let grav_z = q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3;

        let yaw = (2.0 * q1 * q2 - 2.0 * q0 * q3).atan2(2.0 * q0 * q0 + 2.0 * q1 * q1 - 1.0);
        let pitch = (grav_x / (grav_y * grav_y + grav_z * grav_z).sqrt()).atan();
        let roll = (grav_y / (grav_x * grav_x + grav_z * grav_z).sqrt()).atan();

        Self { yaw, pitch, roll }
    }

    /// `[yaw, pitch, roll]`，单位为度
    pub fn to_degrees(self) -> [f32; 3] {
        [
            self.yaw.to_degrees(),
            self.pitch.to_degrees(),
            self.roll.to_degrees(),
        ]
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [yaw, pitch, roll] = self.to_degrees();
        write!(f, "YPR({:10.5}, {:10.5}, {:10.5})", yaw, pitch, roll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f32::consts::FRAC_PI_6;

    #[test]
    fn test_identity_is_level() {
        let o = Orientation::from_quaternion(&Quaternion::identity());
        assert_eq!(o, Orientation::default());
    }

    #[test]
    fn test_rotation_about_z_changes_only_yaw() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_6);
        let o = Orientation::from_quaternion(q.quaternion());
        assert_relative_eq!(o.yaw.abs(), FRAC_PI_6, epsilon = 1e-5);
        assert_relative_eq!(o.pitch, 0.0, epsilon = 1e-6);
        assert_relative_eq!(o.roll, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_about_x_changes_only_roll() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_6);
        let o = Orientation::from_quaternion(q.quaternion());
        assert_relative_eq!(o.roll.abs(), FRAC_PI_6, epsilon = 1e-5);
        assert_relative_eq!(o.pitch, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_display_in_degrees() {
        let o = Orientation {
            yaw: std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
            roll: 0.0,
        };
        let text = o.to_string();
        assert!(text.starts_with("YPR(  90.0000"), "{}", text);
        assert!(text.ends_with("   0.00000,    0.00000)"), "{}", text);
    }
}
