//! Showcase camera: a look-at rig whose eye is moved by scroll.

use crate::{Mat4, Vec3};

/// Perspective look-at camera (right-handed, +Y up).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    /// Default framing for a showcased model: 45 degree lens, ten units out
    /// on +Z, looking at the origin.
    pub fn showcase(aspect: f32) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            fov_y_rad: 45f32.to_radians(),
            z_near: 0.1,
            z_far: 100.0,
            aspect,
        }
    }

    /// Aspect ratio of a `width`x`height` viewport; degenerate sizes give 1.
    pub fn aspect_of(width: u32, height: u32) -> f32 {
        if width == 0 || height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    /// wgpu clip space (depth in `[0, 1]`).
    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_rad, self.aspect.max(1e-6), self.z_near, self.z_far)
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    /// Normalized device coordinates of a world-space point.
    pub fn project(&self, world: Vec3) -> Vec3 {
        self.proj_view().project_point3(world)
    }

    #[inline]
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    /// Move the eye while keeping the look-at target (scroll-driven dolly).
    #[inline]
    pub fn with_eye(mut self, eye: Vec3) -> Self {
        self.eye = eye;
        self
    }

    #[inline]
    pub fn with_target(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3;

    #[test]
    fn target_projects_to_screen_center() {
        let cam = Camera::showcase(16.0 / 9.0)
            .with_eye(vec3(3.0, 2.0, 6.0))
            .with_target(vec3(0.0, 1.0, 0.0));
        let ndc = cam.project(vec3(0.0, 1.0, 0.0));
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn aspect_guards_zero_sizes() {
        assert_eq!(Camera::aspect_of(1920, 1080), 1920.0 / 1080.0);
        assert_eq!(Camera::aspect_of(0, 1080), 1.0);
        assert_eq!(Camera::showcase(1.0).with_aspect(2.0).aspect, 2.0);
    }
}
