//! Renderer: wgpu-backed implementation of the asset GPU seam.
//! wgpu = 26.x, no window surface; targets are offscreen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use asset::gpu::{BufferHandle, BufferUsage, GpuDevice, TextureHandle};
use asset::texture::TextureData;
use corelib::quality::{QualityTier, RenderSettings};
use parking_lot::Mutex;
use wgpu::util::{BufferInitDescriptor, DeviceExt, TextureDataOrder};
use wgpu::{
    Buffer, BufferUsages, Device, DeviceDescriptor, Extent3d, Features, Instance,
    InstanceDescriptor, Limits, PowerPreference, Queue, Texture, TextureDescriptor,
    TextureDimension, TextureFormat, TextureUsages, TextureView, TextureViewDescriptor,
};

pub use wgpu::Backends;

const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Offscreen color + depth pair sized for the current quality tier.
pub struct RenderTarget {
    pub color: TextureView,
    pub depth: TextureView,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

pub struct WgpuDevice {
    device: Device,
    queue: Queue,
    settings: RenderSettings,
    adapter_name: String,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, Buffer>>,
    textures: Mutex<HashMap<u64, Texture>>,
}

impl WgpuDevice {
    /// Create a device without a surface. Fails when no adapter matches.
    pub fn headless(settings: &RenderSettings, backends: Backends) -> Result<Self> {
        pollster::block_on(Self::new_async(settings, backends))
    }

    async fn new_async(settings: &RenderSettings, backends: Backends) -> Result<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });

        // Low tier is the phone/laptop case: don't wake a discrete GPU.
        let power_preference = match settings.tier {
            QualityTier::Low => PowerPreference::LowPower,
            QualityTier::Medium | QualityTier::High => PowerPreference::HighPerformance,
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter")?;
        let info = adapter.get_info();
        log::info!(
            "Using adapter '{}' ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Showcase Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("request_device failed")?;

        Ok(Self {
            device,
            queue,
            settings: *settings,
            adapter_name: info.name,
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            textures: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[inline]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.lock().len()
    }

    /// Color and depth attachments at `width`x`height` physical pixels,
    /// multisampled per the quality tier.
    pub fn create_render_target(&self, width: u32, height: u32) -> RenderTarget {
        let width = width.max(1);
        let height = height.max(1);
        let samples = self.settings.msaa_samples.max(1);
        let attachment = |label: &str, format: TextureFormat| {
            self.device
                .create_texture(&TextureDescriptor {
                    label: Some(label),
                    size: Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: samples,
                    dimension: TextureDimension::D2,
                    format,
                    usage: TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&TextureViewDescriptor::default())
        };
        log::debug!("Render target {}x{} ({}x MSAA)", width, height, samples);
        RenderTarget {
            color: attachment("ColorTarget", COLOR_FORMAT),
            depth: attachment("DepthTarget", DEPTH_FORMAT),
            width,
            height,
            samples,
        }
    }

    fn issue(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&self, label: &str, usage: BufferUsage, contents: &[u8]) -> BufferHandle {
        let usage = match usage {
            BufferUsage::Vertex => BufferUsages::VERTEX,
            BufferUsage::Index => BufferUsages::INDEX,
        };
        let buffer = self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: usage | BufferUsages::COPY_DST,
        });
        let id = self.issue();
        self.buffers.lock().insert(id, buffer);
        log::trace!("wgpu buffer '{}' ({} bytes) -> #{}", label, contents.len(), id);
        BufferHandle(id)
    }

    fn create_texture(&self, label: &str, texture: &TextureData) -> TextureHandle {
        let fallback;
        let texture = if texture.is_valid() {
            texture
        } else {
            log::warn!("Texture '{}' has inconsistent dimensions; uploading 1x1 white", label);
            fallback = TextureData {
                width: 1,
                height: 1,
                data: vec![255; 4],
                format: asset::texture::TextureFormat::Rgba8,
            };
            &fallback
        };
        let gpu_texture = self.device.create_texture_with_data(
            &self.queue,
            &TextureDescriptor {
                label: Some(label),
                size: Extent3d {
                    width: texture.width,
                    height: texture.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &texture.data,
        );
        let id = self.issue();
        self.textures.lock().insert(id, gpu_texture);
        log::trace!("wgpu texture '{}' {}x{} -> #{}", label, texture.width, texture.height, id);
        TextureHandle(id)
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        match self.buffers.lock().remove(&handle.0) {
            Some(buffer) => buffer.destroy(),
            None => log::warn!("destroy of unknown buffer #{}", handle.0),
        }
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        match self.textures.lock().remove(&handle.0) {
            Some(texture) => texture.destroy(),
            None => log::warn!("destroy of unknown texture #{}", handle.0),
        }
    }
}
