//! Render quality resolved once per scene and threaded through as config.

use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Viewports narrower than this are treated as phones.
pub const MOBILE_MAX_WIDTH: u32 = 768;
/// Viewports narrower than this (and not mobile) get the medium tier.
pub const DESKTOP_MIN_WIDTH: u32 = 1440;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

/// Everything downstream needs to know about the chosen tier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub tier: QualityTier,
    pub antialias: bool,
    pub msaa_samples: u32,
    pub shadows: bool,
    /// Upper bound applied to the device pixel ratio.
    pub max_pixel_ratio: f32,
}

impl QualityTier {
    /// Pick a tier from viewport width; a dense low-width screen still counts
    /// as mobile.
    pub fn detect(viewport_width: u32, device_pixel_ratio: f32) -> Self {
        let tier = if viewport_width < MOBILE_MAX_WIDTH {
            QualityTier::Low
        } else if viewport_width < DESKTOP_MIN_WIDTH {
            QualityTier::Medium
        } else {
            QualityTier::High
        };
        log::info!(
            "Quality tier {} for viewport width {} @ {:.2}x",
            tier,
            viewport_width,
            device_pixel_ratio
        );
        tier
    }

    pub fn settings(self) -> RenderSettings {
        match self {
            QualityTier::Low => RenderSettings {
                tier: self,
                antialias: false,
                msaa_samples: 1,
                shadows: false,
                max_pixel_ratio: 1.0,
            },
            QualityTier::Medium => RenderSettings {
                tier: self,
                antialias: true,
                msaa_samples: 4,
                shadows: false,
                max_pixel_ratio: 1.5,
            },
            QualityTier::High => RenderSettings {
                tier: self,
                antialias: true,
                msaa_samples: 4,
                shadows: true,
                max_pixel_ratio: 2.0,
            },
        }
    }
}

impl RenderSettings {
    /// Effective pixel ratio: the device's, within `[1, max_pixel_ratio]`.
    pub fn pixel_ratio(&self, device_pixel_ratio: f32) -> f32 {
        if device_pixel_ratio.is_nan() {
            return 1.0;
        }
        device_pixel_ratio.clamp(1.0, self.max_pixel_ratio)
    }

    /// Physical size of the render target for a CSS-pixel viewport.
    pub fn render_size(&self, width: u32, height: u32, device_pixel_ratio: f32) -> (u32, u32) {
        let ratio = self.pixel_ratio(device_pixel_ratio);
        let scale = |v: u32| ((v as f32 * ratio).round() as u32).max(1);
        (scale(width), scale(height))
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for QualityTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" | "med" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(CoreError::UnknownQuality(other.to_string())),
        }
    }
}
