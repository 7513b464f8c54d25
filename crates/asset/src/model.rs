//! Decoded scene graphs: CPU-side [`ModelData`] from decoders and the
//! GPU-backed [`Model`] handed to consumers.

use std::rc::Rc;

use corelib::{Mat4, Vec3};
use corelib::transform::Transform;

use crate::gpu::{BufferUsage, GpuBuffer, GpuDevice, GpuTexture};
use crate::mesh::MeshData;
use crate::obj::load_obj_from_str;
use crate::texture::TextureData;

/// Named animation embedded in a model file.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds.
    pub duration: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveData {
    pub mesh: MeshData,
    pub base_color: [f32; 4],
    /// Index into [`ModelData::textures`].
    pub texture: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeData {
    pub name: Option<String>,
    /// Index of the parent node; parents always precede children.
    pub parent: Option<usize>,
    pub local: Transform,
    pub primitives: Vec<PrimitiveData>,
}

/// Decoder output, not yet on the GPU.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelData {
    pub nodes: Vec<NodeData>,
    pub textures: Vec<TextureData>,
    pub animations: Vec<AnimationClip>,
}

const PLACEHOLDER_CUBE: &str = "\
o Placeholder
v -0.5 -0.5 -0.5
v 0.5 -0.5 -0.5
v 0.5 0.5 -0.5
v -0.5 0.5 -0.5
v -0.5 -0.5 0.5
v 0.5 -0.5 0.5
v 0.5 0.5 0.5
v -0.5 0.5 0.5
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 4/4 3/3 2/2
f 5/1 6/2 7/3 8/4
f 1/1 5/2 8/3 4/4
f 2/1 3/4 7/3 6/2
f 4/1 8/2 7/3 3/4
f 1/1 2/2 6/3 5/4
";

impl ModelData {
    /// Single node wrapping one untextured mesh.
    pub fn from_mesh(name: Option<String>, mesh: MeshData) -> Self {
        Self {
            nodes: vec![NodeData {
                name,
                parent: None,
                local: Transform::identity(),
                primitives: vec![PrimitiveData {
                    mesh,
                    base_color: [1.0, 1.0, 1.0, 1.0],
                    texture: None,
                }],
            }],
            textures: Vec::new(),
            animations: Vec::new(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives().map(|p| p.mesh.triangle_count()).sum()
    }

    /// Union of primitive bounds in mesh space (node transforms ignored).
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.primitives()
            .filter_map(|p| p.mesh.bounds())
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
    }

    fn primitives(&self) -> impl Iterator<Item = &PrimitiveData> {
        self.nodes.iter().flat_map(|n| &n.primitives)
    }

    /// Checkerboard unit cube shown while a model loads or when it failed.
    pub fn placeholder() -> Self {
        let mut data = match load_obj_from_str(PLACEHOLDER_CUBE) {
            Ok(obj) => Self::from_mesh(obj.name, obj.mesh),
            Err(e) => {
                log::error!("built-in placeholder failed to parse: {e:#}");
                return Self::default();
            }
        };
        data.textures.push(TextureData::checkerboard(32));
        if let Some(primitive) = data.nodes[0].primitives.first_mut() {
            primitive.texture = Some(0);
            primitive.base_color = [0.39, 0.4, 0.95, 1.0];
        }
        data
    }
}

/// A mesh primitive resident on the GPU. Immutable and shared between
/// every instance of the model it came from.
pub struct GpuPrimitive {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
    pub base_color: [f32; 4],
    pub texture: Option<Rc<GpuTexture>>,
}

/// One scene-graph node of a [`Model`] instance.
#[derive(Clone)]
pub struct Node {
    pub name: Option<String>,
    pub parent: Option<usize>,
    pub local: Transform,
    pub primitives: Vec<Rc<GpuPrimitive>>,
}

/// Renderable object graph returned by the cache.
///
/// Cloning yields an independent instance: the root transform and every node
/// transform are owned per instance, while GPU primitives are shared and
/// released when the last instance referencing them drops.
#[derive(Clone)]
pub struct Model {
    pub transform: Transform,
    nodes: Vec<Node>,
    animations: Rc<[AnimationClip]>,
}

impl Model {
    /// Upload decoded data, sharing each texture between its primitives.
    pub fn upload(data: ModelData, device: &Rc<dyn GpuDevice>) -> Self {
        let textures: Vec<Rc<GpuTexture>> = data
            .textures
            .iter()
            .enumerate()
            .map(|(i, t)| Rc::new(GpuTexture::new(device, &format!("texture#{i}"), t)))
            .collect();

        let nodes = data
            .nodes
            .into_iter()
            .enumerate()
            .map(|(n, node)| {
                let primitives = node
                    .primitives
                    .iter()
                    .enumerate()
                    .map(|(p, prim)| {
                        let label = format!("node#{n}/prim#{p}");
                        Rc::new(GpuPrimitive {
                            vertices: GpuBuffer::new(
                                device,
                                &format!("{label}/vertices"),
                                BufferUsage::Vertex,
                                prim.mesh.vertex_bytes(),
                            ),
                            indices: GpuBuffer::new(
                                device,
                                &format!("{label}/indices"),
                                BufferUsage::Index,
                                prim.mesh.index_bytes(),
                            ),
                            index_count: prim.mesh.indices.len() as u32,
                            base_color: prim.base_color,
                            texture: prim.texture.and_then(|t| textures.get(t).cloned()),
                        })
                    })
                    .collect();
                Node {
                    name: node.name,
                    parent: node.parent,
                    local: node.local,
                    primitives,
                }
            })
            .collect();

        Self {
            transform: Transform::identity(),
            nodes,
            animations: data.animations.into(),
        }
    }

    /// Explicit spelling of `clone()` for consumers placing a new copy.
    #[inline]
    pub fn instance(&self) -> Model {
        self.clone()
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.name.as_deref() == Some(name))
    }

    #[inline]
    pub fn animations(&self) -> &[AnimationClip] {
        &self.animations
    }

    pub fn primitive_count(&self) -> usize {
        self.nodes.iter().map(|n| n.primitives.len()).sum()
    }

    /// Root transform composed with the node's parent chain.
    pub fn world_matrix(&self, index: usize) -> Option<Mat4> {
        let mut node = self.nodes.get(index)?;
        let mut m = node.local.matrix();
        // Bounded walk: a malformed parent cycle cannot spin forever.
        for _ in 0..self.nodes.len() {
            let Some(parent) = node.parent else { break };
            node = self.nodes.get(parent)?;
            m = node.local.matrix() * m;
        }
        Some(self.transform.matrix() * m)
    }

    /// Break the instance into its primitives so disposal can tell which of
    /// them this instance held last.
    pub(crate) fn into_primitives(self) -> impl Iterator<Item = Rc<GpuPrimitive>> {
        self.nodes.into_iter().flat_map(|n| n.primitives)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("transform", &self.transform)
            .field("nodes", &self.nodes.len())
            .field("primitives", &self.primitive_count())
            .field("animations", &self.animations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use corelib::vec3;

    fn device() -> (Rc<HeadlessDevice>, Rc<dyn GpuDevice>) {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GpuDevice> = headless.clone();
        (headless, device)
    }

    #[test]
    fn placeholder_is_a_textured_cube() {
        let data = ModelData::placeholder();
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.textures.len(), 1);
        let prim = &data.nodes[0].primitives[0];
        assert_eq!(prim.mesh.indices.len(), 36);
        assert_eq!(prim.texture, Some(0));
        assert_eq!(data.triangle_count(), 12);
        let (lo, hi) = data.bounds().unwrap();
        assert_eq!((lo, hi), (Vec3::splat(-0.5), Vec3::splat(0.5)));
    }

    #[test]
    fn upload_creates_and_drop_releases() {
        let (headless, device) = device();
        let model = Model::upload(ModelData::placeholder(), &device);
        assert_eq!(headless.live_buffers(), 2);
        assert_eq!(headless.live_textures(), 1);
        assert_eq!(model.primitive_count(), 1);
        drop(model);
        assert_eq!(headless.live_buffers(), 0);
        assert_eq!(headless.live_textures(), 0);
    }

    #[test]
    fn clones_have_independent_transforms_and_shared_gpu_state() {
        let (headless, device) = device();
        let original = Model::upload(ModelData::placeholder(), &device);
        let mut a = original.instance();
        let b = original.clone();

        a.transform.translation = vec3(3.0, 0.0, 0.0);
        a.node_mut(0).unwrap().local.scale = Vec3::splat(2.0);

        assert_eq!(b.transform, Transform::identity());
        assert_eq!(original.nodes()[0].local, Transform::identity());
        assert!(Rc::ptr_eq(&a.nodes()[0].primitives[0], &b.nodes()[0].primitives[0]));

        drop(original);
        drop(a);
        assert_eq!(headless.live_buffers(), 2, "b still holds the primitive");
        drop(b);
        assert_eq!(headless.live_buffers(), 0);
    }

    #[test]
    fn world_matrix_walks_parents() {
        let (_headless, device) = device();
        let mut data = ModelData::placeholder();
        data.nodes[0].local = Transform::from_translation(vec3(1.0, 0.0, 0.0));
        data.nodes.push(NodeData {
            name: Some("child".into()),
            parent: Some(0),
            local: Transform::from_translation(vec3(0.0, 2.0, 0.0)),
            primitives: vec![],
        });
        let mut model = Model::upload(data, &device);
        model.transform.translation = vec3(0.0, 0.0, 5.0);

        let child = model.find_node("child").unwrap();
        let origin = model.world_matrix(child).unwrap().transform_point3(Vec3::ZERO);
        assert!((origin - vec3(1.0, 2.0, 5.0)).length() < 1e-6);
        assert!(model.world_matrix(9).is_none());
    }
}
