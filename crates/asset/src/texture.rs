//! Base-color images normalized to RGBA8 before GPU upload.

use image::{DynamicImage, Rgba, RgbaImage, RgbImage};

#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Pixel layouts the GPU seam accepts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
        }
    }
}

impl TextureData {
    /// RGBA8 texture, or `None` if `data` does not match the dimensions.
    pub fn try_new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let texture = Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        };
        texture.is_valid().then_some(texture)
    }

    /// Expand tightly packed RGB8 pixels to opaque RGBA8.
    pub fn from_rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let rgb = RgbImage::from_raw(width, height, pixels)?;
        Some(Self::from_image(DynamicImage::ImageRgb8(rgb).to_rgba8()))
    }

    /// Two-tone 8px checker, the placeholder's base color map.
    pub fn checkerboard(size: u32) -> Self {
        const LIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);
        const DARK: Rgba<u8> = Rgba([128, 128, 128, 255]);
        Self::from_image(RgbaImage::from_fn(size, size, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { LIGHT } else { DARK }
        }))
    }

    fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            format: TextureFormat::Rgba8,
        }
    }

    /// Non-empty, and `data` holds exactly `width * height` pixels.
    pub fn is_valid(&self) -> bool {
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|px| px.checked_mul(self.format.bytes_per_pixel()));
        self.width > 0 && self.height > 0 && expected == Some(self.data.len())
    }
}
