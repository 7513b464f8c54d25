//! glTF 2.0 / GLB decoding via the `gltf` crate (embedded buffers only).

use corelib::transform::Transform;
use corelib::{EulerRot, Quat, Vec3};

use crate::error::{AssetError, AssetResult};
use crate::decoder::ModelDecoder;
use crate::mesh::{MeshData, MeshVertex};
use crate::model::{AnimationClip, ModelData, NodeData, PrimitiveData};
use crate::texture::TextureData;

#[derive(Clone, Copy, Debug, Default)]
pub struct GltfDecoder;

impl ModelDecoder for GltfDecoder {
    fn decode(&self, key: &str, bytes: &[u8]) -> AssetResult<ModelData> {
        let (document, buffers, images) =
            ::gltf::import_slice(bytes).map_err(|e| AssetError::decode(key, e))?;

        log::debug!(
            "glTF '{}': {} scenes, {} nodes, {} meshes, {} animations",
            key,
            document.scenes().count(),
            document.nodes().count(),
            document.meshes().count(),
            document.animations().count()
        );

        // Images that fail to convert leave a hole; primitives referencing
        // them just render untextured.
        let mut textures = Vec::new();
        let image_slots: Vec<Option<usize>> = images
            .into_iter()
            .map(|image| {
                let texture = convert_image(image)?;
                textures.push(texture);
                Some(textures.len() - 1)
            })
            .collect();

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| AssetError::decode(key, "file contains no scene"))?;

        let mut nodes = Vec::new();
        for root in scene.nodes() {
            visit_node(key, &root, None, &buffers, &image_slots, &mut nodes)?;
        }
        if nodes.iter().all(|n| n.primitives.is_empty()) {
            return Err(AssetError::decode(key, "scene contains no triangle geometry"));
        }

        let animations = document
            .animations()
            .enumerate()
            .map(|(i, animation)| AnimationClip {
                name: animation
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("animation#{i}")),
                duration: animation_duration(&animation, &buffers),
            })
            .collect();

        Ok(ModelData {
            nodes,
            textures,
            animations,
        })
    }
}

/// Depth-first, so parents always land before their children.
fn visit_node(
    key: &str,
    node: &::gltf::Node,
    parent: Option<usize>,
    buffers: &[::gltf::buffer::Data],
    image_slots: &[Option<usize>],
    out: &mut Vec<NodeData>,
) -> AssetResult<()> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let (rx, ry, rz) = Quat::from_array(rotation).to_euler(EulerRot::XYZ);
    let local = Transform::from_trs(
        Vec3::from_array(translation),
        Vec3::new(rx, ry, rz),
        Vec3::from_array(scale),
    );

    let mut primitives = Vec::new();
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != ::gltf::mesh::Mode::Triangles {
                log::warn!("'{}': skipping non-triangle primitive in mesh {:?}", key, mesh.name());
                continue;
            }
            primitives.push(read_primitive(key, &primitive, buffers, image_slots)?);
        }
    }

    let index = out.len();
    out.push(NodeData {
        name: node.name().map(str::to_string),
        parent,
        local,
        primitives,
    });

    for child in node.children() {
        visit_node(key, &child, Some(index), buffers, image_slots, out)?;
    }
    Ok(())
}

fn read_primitive(
    key: &str,
    primitive: &::gltf::Primitive,
    buffers: &[::gltf::buffer::Data],
    image_slots: &[Option<usize>],
) -> AssetResult<PrimitiveData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| AssetError::decode(key, "mesh primitive has no positions"))?
        .collect();
    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|n| n.collect())
        .unwrap_or_default();
    let uvs: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|t| t.into_f32().collect())
        .unwrap_or_default();

    let vertices: Vec<MeshVertex> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            MeshVertex::new(
                *p,
                normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]),
                uvs.get(i).copied().unwrap_or([0.0, 0.0]),
            )
        })
        .collect();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        return Err(AssetError::decode(
            key,
            format!("index {} out of range for {} vertices", bad, vertices.len()),
        ));
    }

    let pbr = primitive.material().pbr_metallic_roughness();
    let texture = pbr
        .base_color_texture()
        .and_then(|info| image_slots.get(info.texture().source().index()).copied().flatten());

    Ok(PrimitiveData {
        mesh: MeshData::new(vertices, indices),
        base_color: pbr.base_color_factor(),
        texture,
    })
}

fn convert_image(image: ::gltf::image::Data) -> Option<TextureData> {
    use ::gltf::image::Format;
    match image.format {
        Format::R8G8B8A8 => TextureData::try_new_rgba8(image.width, image.height, image.pixels),
        Format::R8G8B8 => TextureData::from_rgb8(image.width, image.height, image.pixels),
        other => {
            log::warn!("unsupported glTF image format {:?}; texture dropped", other);
            None
        }
    }
}

/// Longest keyframe time across all channels.
fn animation_duration(animation: &::gltf::Animation, buffers: &[::gltf::buffer::Data]) -> f32 {
    let mut max_time = 0.0f32;

    for channel in animation.channels() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));

        if let Some(inputs) = reader.read_inputs() {
            for time in inputs {
                max_time = max_time.max(time);
            }
        }
    }

    max_time
}
