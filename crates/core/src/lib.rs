//! Core types: math re-exports, Transform, Camera, scene and scroll drivers.

use thiserror::Error;

pub use glam::{EulerRot, Mat4, Quat, Vec3, vec3};

pub mod camera;
pub mod quality;
pub mod scene;
pub mod scroll;
pub mod transform;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("keyframe track needs at least one pose")]
    EmptyTrack,
    #[error("unknown quality tier '{0}' (expected low, medium or high)")]
    UnknownQuality(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
