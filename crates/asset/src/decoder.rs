//! Turning fetched bytes into [`ModelData`].

use std::path::Path;

use crate::error::{AssetError, AssetResult};
use crate::gltf::GltfDecoder;
use crate::model::ModelData;
use crate::obj::load_obj_from_bytes;

pub trait ModelDecoder {
    fn decode(&self, key: &str, bytes: &[u8]) -> AssetResult<ModelData>;
}

/// Wavefront OBJ: one node, one untextured primitive, no clips.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjDecoder;

impl ModelDecoder for ObjDecoder {
    fn decode(&self, key: &str, bytes: &[u8]) -> AssetResult<ModelData> {
        let obj = load_obj_from_bytes(bytes).map_err(|e| AssetError::decode(key, format!("{e:#}")))?;
        Ok(ModelData::from_mesh(obj.name, obj.mesh))
    }
}

/// Picks a decoder from the key's file extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormatDecoder {
    obj: ObjDecoder,
    gltf: GltfDecoder,
}

impl FormatDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelDecoder for FormatDecoder {
    fn decode(&self, key: &str, bytes: &[u8]) -> AssetResult<ModelData> {
        // Ignore query strings on URL-style keys.
        let path = key.split(['?', '#']).next().unwrap_or(key);
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("obj") => self.obj.decode(key, bytes),
            Some("gltf") | Some("glb") => self.gltf.decode(key, bytes),
            Some(other) => Err(AssetError::decode(key, format!("unsupported format '.{other}'"))),
            None => Err(AssetError::decode(key, "no file extension to pick a decoder")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &[u8] = b"o Tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn obj_becomes_single_node_model() {
        let data = ObjDecoder.decode("tri.obj", TRIANGLE).unwrap();
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].name.as_deref(), Some("Tri"));
        assert!(data.animations.is_empty());
    }

    #[test]
    fn dispatch_by_extension() {
        let decoder = FormatDecoder::new();
        assert!(decoder.decode("models/TRI.OBJ?v=3", TRIANGLE).is_ok());
        let err = decoder.decode("hero.fbx", TRIANGLE).unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
        assert!(decoder.decode("noext", TRIANGLE).is_err());
    }

    #[test]
    fn garbage_is_a_decode_error_naming_the_key() {
        let err = FormatDecoder::new().decode("broken.obj", b"f 1 2 3\n").unwrap_err();
        assert_eq!(err.key(), "broken.obj");
        assert!(err.to_string().contains("decode"));
    }
}
