use crate::{EulerRot, Mat4, Quat, Vec3};

/// Rigid transform with uniform or non-uniform scale (Euler XYZ).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians (XYZ order).
    pub rotation_euler: Vec3,
    pub scale: Vec3,
}

impl Transform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation_euler: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    #[inline]
    pub fn from_trs(translation: Vec3, rotation_euler: Vec3, scale: Vec3) -> Self {
        Self {
            translation,
            rotation_euler,
            scale,
        }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    #[inline]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        let Vec3 { x, y, z } = self.rotation_euler;
        Quat::from_euler(EulerRot::XYZ, x, y, z)
    }

    /// T * R * S, column-major.
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.translation)
    }

    /// Per-axis linear blend of all three components.
    ///
    /// Written as `a * (1 - t) + b * t` so `t == 0` yields `self` and
    /// `t == 1` yields `other` bit-for-bit.
    #[inline]
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        let blend = |a: Vec3, b: Vec3| a * (1.0 - t) + b * t;
        Self {
            translation: blend(self.translation, other.translation),
            rotation_euler: blend(self.rotation_euler, other.rotation_euler),
            scale: blend(self.scale, other.scale),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
