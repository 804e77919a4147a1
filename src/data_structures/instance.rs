//! Instance transformation data for GPU rendering.
//!
//! An [`Instance`] is a translation, rotation and scale. Scene nodes keep a
//! local and a world instance; the world one is packed into [`InstanceRaw`]
//! and read by the vertex shader as a per-instance vertex buffer.

use std::ops::Mul;

use cgmath::{Matrix, Matrix3, Matrix4, One, Quaternion, SquareMatrix, Vector3};

use crate::data_structures::model;

/// Per-instance transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn with_rotation(mut self, rotation: Quaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vector3::new(scale, scale, scale);
        self
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Matrix that keeps normals perpendicular to surfaces under non uniform scale.
    pub fn normal_matrix(&self) -> Matrix3<f32> {
        let m = self.to_matrix();
        let upper = Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate());
        upper
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or_else(|| Matrix3::from(self.rotation))
    }

    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw {
            model: self.to_matrix().into(),
            normal: self.normal_matrix().into(),
        }
    }
}

impl Mul<Instance> for Instance {
    type Output = Self;

    fn mul(self, rhs: Instance) -> Self::Output {
        &self * &rhs
    }
}

/// Parent times child: the child's transform expressed in the parent's space.
impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Instance {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl From<Vector3<f32>> for Instance {
    fn from(position: Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

/**
 * Model matrix as four vec4 columns (locations 5-8) followed by the normal
 * matrix as three vec3 columns (locations 9-11).
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // The shader only moves on to the next instance when it starts a new instance
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, InnerSpace, Rotation3, Transform};

    use super::*;

    fn approx_v(a: Vector3<f32>, b: Vector3<f32>) -> bool {
        (a - b).magnitude() < 1e-4
    }

    #[test]
    fn composition_matches_matrix_product() {
        let parent = Instance {
            position: Vector3::new(20.0, 20.0, 20.0),
            rotation: Quaternion::from_angle_y(Deg(30.0)),
            scale: Vector3::new(0.5, 0.5, 0.5),
        };
        let child = Instance {
            position: Vector3::new(2.0, 0.0, -4.0),
            rotation: Quaternion::from_angle_x(Deg(-90.0)),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        let world = &parent * &child;
        let expected = parent.to_matrix() * child.to_matrix();
        let p = cgmath::Point3::new(1.0, 2.0, 3.0);
        let a = world.to_matrix().transform_point(p);
        let b = expected.transform_point(p);
        assert!(approx_v(
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(b.x, b.y, b.z)
        ));
    }

    #[test]
    fn identity_is_neutral() {
        let child = Instance::from(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(Instance::new() * child.clone(), child);
    }

    #[test]
    fn normal_matrix_keeps_normals_perpendicular_under_non_uniform_scale() {
        let instance = Instance {
            scale: Vector3::new(4.0, 1.0, 1.0),
            ..Default::default()
        };
        // the surface x + y = 0 has normal (1, 1, 0); scaled by 4 in x it becomes x/4 + y = 0
        let normal = (instance.normal_matrix() * Vector3::new(1.0, 1.0, 0.0)).normalize();
        let expected = Vector3::new(0.25, 1.0, 0.0).normalize();
        assert!(approx_v(normal, expected));
    }

    #[test]
    fn raw_layout_matches_struct() {
        use model::Vertex;
        let desc = InstanceRaw::desc();
        assert_eq!(desc.array_stride as usize, std::mem::size_of::<InstanceRaw>());
        assert_eq!(desc.attributes.last().map(|a| a.shader_location), Some(11));
    }
}
