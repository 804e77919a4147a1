//! Scene graph and hierarchical scene organization.
//!
//! Every node owns a local transform relative to its parent and a world
//! transform that is recomputed top down by
//! [`SceneNode::update_world_transforms`]. Nodes with geometry upload their
//! world transform into a one element instance buffer.

use std::collections::HashMap;

use cgmath::Quaternion;
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        geometry::{MeshData, compute_normals},
        instance::{Instance, InstanceRaw},
        model::{self, ModelVertex},
    },
    framing::Aabb,
    render::Instanced,
};

pub trait SceneNode {
    fn get_local_transform(&self) -> &Instance;

    fn set_local_transform(&mut self, instance: Instance);

    fn get_world_transform(&self) -> &Instance;

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>>;

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>>;

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.get_children_mut().push(child);
    }

    /// Recomputes this node's world transform from its parent's and recurses.
    fn update_world_transforms(&mut self, parents_world_transform: &Instance);

    /// Treats this node as a root.
    fn update_world_transform_all(&mut self) {
        self.update_world_transforms(&Instance::default());
    }

    /// Bounds of this node's own geometry in its local space.
    fn local_bounds(&self) -> Option<Aabb> {
        None
    }

    /// Bounds of this node and all descendants in world space. World
    /// transforms have to be up to date.
    fn world_bounds(&self) -> Option<Aabb> {
        let own = self
            .local_bounds()
            .map(|bounds| bounds.transformed(&self.get_world_transform().to_matrix()));
        self.get_children()
            .iter()
            .filter_map(|child| child.world_bounds())
            .fold(own, |acc, bounds| {
                Some(acc.map_or(bounds, |acc| acc.union(bounds)))
            })
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue);

    fn get_render(&self) -> Vec<Instanced<'_>>;
}

/// Propagates `world = parent * local` to `world` and returns it for the children.
fn propagate(local: &Instance, world: &mut Instance, parent: &Instance) -> Instance {
    *world = parent * local;
    world.clone()
}

/// A node without geometry that only groups and transforms its children.
#[derive(Default)]
pub struct ContainerNode {
    pub children: Vec<Box<dyn SceneNode>>,
    local: Instance,
    world: Instance,
}

impl ContainerNode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneNode for ContainerNode {
    fn get_local_transform(&self) -> &Instance {
        &self.local
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.local = instance;
    }

    fn get_world_transform(&self) -> &Instance {
        &self.world
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn update_world_transforms(&mut self, parents_world_transform: &Instance) {
        let world = propagate(&self.local, &mut self.world, parents_world_transform);
        for child in self.children.iter_mut() {
            child.update_world_transforms(&world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue) {
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue));
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .collect()
    }
}

/// A node that draws a [`model::Model`] with its world transform.
pub struct ModelNode {
    children: Vec<Box<dyn SceneNode>>,
    instance_buffer: wgpu::Buffer,
    local: Instance,
    world: Instance,
    model: model::Model,
    double_sided: bool,
}

impl ModelNode {
    pub fn new(device: &wgpu::Device, name: &str, model: model::Model, double_sided: bool) -> Self {
        let world = Instance::default();
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} Instance Buffer")),
            contents: bytemuck::cast_slice(&[world.to_raw()]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            children: vec![],
            instance_buffer,
            local: Instance::default(),
            world,
            model,
            double_sided,
        }
    }

    pub fn model_mut(&mut self) -> &mut model::Model {
        &mut self.model
    }
}

impl SceneNode for ModelNode {
    fn get_local_transform(&self) -> &Instance {
        &self.local
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.local = instance;
    }

    fn get_world_transform(&self) -> &Instance {
        &self.world
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn update_world_transforms(&mut self, parents_world_transform: &Instance) {
        let world = propagate(&self.local, &mut self.world, parents_world_transform);
        for child in self.children.iter_mut() {
            child.update_world_transforms(&world);
        }
    }

    fn local_bounds(&self) -> Option<Aabb> {
        self.model.bounds()
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue) {
        let raw: [InstanceRaw; 1] = [self.world.to_raw()];
        queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&raw));
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue));
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .chain([Instanced {
                instance: &self.instance_buffer,
                model: &self.model,
                amount: 1,
                double_sided: self.double_sided,
            }])
            .collect()
    }
}

/// Maps indices into the model wide material list to indices into the list
/// of one node, in first use order.
#[derive(Debug, Default)]
struct MaterialRemap {
    local: HashMap<usize, usize>,
    order: Vec<usize>,
}

impl MaterialRemap {
    /// The node local index of `global`, or `None` if there are only
    /// `available` materials.
    fn local_index(&mut self, global: usize, available: usize) -> Option<usize> {
        if global >= available {
            return None;
        }
        let next = self.order.len();
        let local = *self.local.entry(global).or_insert(next);
        if local == next {
            self.order.push(global);
        }
        Some(local)
    }

    /// The global indices in node local order.
    fn globals(&self) -> &[usize] {
        &self.order
    }
}

/// The local transform of a glTF node.
fn local_instance(transform: gltf::scene::Transform) -> Instance {
    let (translation, rotation, scale) = transform.decomposed();
    Instance {
        position: translation.into(),
        // glTF stores quaternions as [x, y, z, w]
        rotation: Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: scale.into(),
    }
}

/// Converts a glTF node and its subtree into scene nodes.
///
/// `materials` holds one entry per glTF material followed by a default
/// material for primitives without one. Each model node receives clones of
/// only the materials its primitives reference.
pub fn to_scene_node(
    node: gltf::scene::Node,
    buffers: &[Vec<u8>],
    device: &wgpu::Device,
    materials: &[model::Material],
) -> Box<dyn SceneNode> {
    let name = node.name().unwrap_or("node").to_string();
    let mut scene_node: Box<dyn SceneNode> = match node.mesh() {
        Some(mesh) => {
            let default_material = materials.len().saturating_sub(1);
            let mut meshes = Vec::new();
            let mut remap = MaterialRemap::default();
            let mut double_sided = false;

            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "Skipping {:?} primitive {} of mesh {name}",
                        primitive.mode(),
                        primitive.index()
                    );
                    continue;
                }
                let Some(data) = read_primitive(&primitive, buffers) else {
                    log::warn!(
                        "Primitive {} of mesh {name} has no positions",
                        primitive.index()
                    );
                    continue;
                };

                let material = primitive.material();
                double_sided |= material.double_sided();
                let global = material.index().unwrap_or(default_material);
                let local = remap
                    .local_index(global, materials.len())
                    .or_else(|| remap.local_index(default_material, materials.len()));
                let mesh_name = format!("{}#{}", mesh.name().unwrap_or(&name), primitive.index());
                let local = local.unwrap_or_else(|| {
                    log::warn!("Mesh {mesh_name} has no material and will not be drawn");
                    usize::MAX
                });

                meshes.push(model::Mesh::from_data(device, &mesh_name, &data, local));
            }

            let model = model::Model {
                meshes,
                materials: remap
                    .globals()
                    .iter()
                    .map(|&global| materials[global].clone())
                    .collect(),
            };
            Box::new(ModelNode::new(device, &name, model, double_sided))
        }
        None => Box::new(ContainerNode::new()),
    };

    scene_node.set_local_transform(local_instance(node.transform()));

    for child in node.children() {
        let child_node = to_scene_node(child, buffers, device, materials);
        scene_node.add_child(child_node);
    }

    scene_node
}

fn read_primitive(primitive: &gltf::Primitive, buffers: &[Vec<u8>]) -> Option<MeshData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

    let mut vertices: Vec<ModelVertex> = reader
        .read_positions()?
        .map(|position| ModelVertex {
            position,
            ..Default::default()
        })
        .collect();

    if let Some(tex_coords) = reader.read_tex_coords(0) {
        vertices
            .iter_mut()
            .zip(tex_coords.into_f32())
            .for_each(|(vertex, uv)| vertex.tex_coords = uv);
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };

    match reader.read_normals() {
        Some(normals) => vertices
            .iter_mut()
            .zip(normals)
            .for_each(|(vertex, normal)| vertex.normal = normal),
        None => compute_normals(&mut vertices, &indices),
    }

    Some(MeshData { vertices, indices })
}
