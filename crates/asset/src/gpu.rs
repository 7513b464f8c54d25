//! GPU seam: the loader uploads decoded meshes/textures through [`GpuDevice`]
//! and gets opaque handles back. Handles are released on the device when
//! their RAII owner drops.

use std::cell::Cell;
use std::rc::Rc;

use crate::texture::TextureData;

/// Opaque GPU buffer id issued by a [`GpuDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque GPU texture id issued by a [`GpuDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
}

pub trait GpuDevice {
    fn create_buffer(&self, label: &str, usage: BufferUsage, contents: &[u8]) -> BufferHandle;
    fn create_texture(&self, label: &str, texture: &TextureData) -> TextureHandle;
    fn destroy_buffer(&self, handle: BufferHandle);
    fn destroy_texture(&self, handle: TextureHandle);
}

/// Owns one device buffer; destroys it on drop.
pub struct GpuBuffer {
    handle: BufferHandle,
    size: usize,
    device: Rc<dyn GpuDevice>,
}

impl GpuBuffer {
    pub fn new(device: &Rc<dyn GpuDevice>, label: &str, usage: BufferUsage, contents: &[u8]) -> Self {
        let handle = device.create_buffer(label, usage, contents);
        Self {
            handle,
            size: contents.len(),
            device: device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
    }
}

/// Owns one device texture; destroys it on drop.
pub struct GpuTexture {
    handle: TextureHandle,
    width: u32,
    height: u32,
    device: Rc<dyn GpuDevice>,
}

impl GpuTexture {
    pub fn new(device: &Rc<dyn GpuDevice>, label: &str, texture: &TextureData) -> Self {
        let handle = device.create_texture(label, texture);
        Self {
            handle,
            width: texture.width,
            height: texture.height,
            device: device.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.device.destroy_texture(self.handle);
    }
}

/// Device without a GPU: hands out ids and counts what is alive.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: Cell<u64>,
    live_buffers: Cell<usize>,
    live_textures: Cell<usize>,
    bytes_uploaded: Cell<usize>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.get()
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.get()
    }

    pub fn bytes_uploaded(&self) -> usize {
        self.bytes_uploaded.get()
    }

    fn issue(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&self, label: &str, usage: BufferUsage, contents: &[u8]) -> BufferHandle {
        let handle = BufferHandle(self.issue());
        self.live_buffers.set(self.live_buffers.get() + 1);
        self.bytes_uploaded.set(self.bytes_uploaded.get() + contents.len());
        log::trace!("headless {:?} buffer '{}' -> {:?}", usage, label, handle);
        handle
    }

    fn create_texture(&self, label: &str, texture: &TextureData) -> TextureHandle {
        let handle = TextureHandle(self.issue());
        self.live_textures.set(self.live_textures.get() + 1);
        self.bytes_uploaded.set(self.bytes_uploaded.get() + texture.data.len());
        log::trace!("headless texture '{}' -> {:?}", label, handle);
        handle
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        log::trace!("headless destroy {:?}", handle);
        self.live_buffers.set(self.live_buffers.get().saturating_sub(1));
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        log::trace!("headless destroy {:?}", handle);
        self.live_textures.set(self.live_textures.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raii_owners_release_on_drop() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GpuDevice> = headless.clone();

        let buffer = GpuBuffer::new(&device, "vb", BufferUsage::Vertex, &[0u8; 64]);
        let texture = GpuTexture::new(&device, "tex", &TextureData::checkerboard(8));
        assert_eq!(headless.live_buffers(), 1);
        assert_eq!(headless.live_textures(), 1);
        assert_eq!(buffer.size(), 64);
        assert_eq!(texture.size(), (8, 8));
        assert_ne!(buffer.handle().0, texture.handle().0);

        drop(buffer);
        drop(texture);
        assert_eq!(headless.live_buffers(), 0);
        assert_eq!(headless.live_textures(), 0);
        assert_eq!(headless.bytes_uploaded(), 64 + 8 * 8 * 4);
    }
}
