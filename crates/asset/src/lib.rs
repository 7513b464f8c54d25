//! Asset side of the showcase: CPU mesh/texture data, OBJ and glTF decoders,
//! byte sources, the GPU upload seam and the coalescing [`AssetCache`].

pub mod cache;
pub mod decoder;
pub mod error;
pub mod gltf;
pub mod gpu;
pub mod mesh;
pub mod model;
pub mod obj;
pub mod source;
pub mod texture;

pub use cache::{AssetCache, DisposeReport, LoadProgress, LoadRequest, LoadTicket};
pub use decoder::{FormatDecoder, ModelDecoder, ObjDecoder};
pub use error::{AssetError, AssetResult};
pub use gpu::{BufferHandle, BufferUsage, GpuDevice, HeadlessDevice, TextureHandle};
pub use model::{Model, ModelData};
pub use source::{AssetSource, FetchProgress, FileSource, MemorySource};
