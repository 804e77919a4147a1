//! CPU side mesh generation.
//!
//! Texture coordinates use the wgpu convention: `(0, 0)` is the top left texel.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Point3, Vector3};

use crate::{data_structures::model::ModelVertex, framing::Aabb};

/// Vertices and triangle list indices ready to be uploaded.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| Point3::from(v.position)))
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// UV sphere around the origin.
///
/// Produces `(width_segments + 1) * (height_segments + 1)` vertices. The seam
/// column is duplicated so texture coordinates can wrap, and the pole rows
/// emit a single triangle per segment with their u shifted by half a segment.
pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);

    let mut vertices = Vec::with_capacity(((width_segments + 1) * (height_segments + 1)) as usize);
    let mut grid = Vec::with_capacity(height_segments as usize + 1);

    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let u_offset = if iy == 0 {
            0.5 / width_segments as f32
        } else if iy == height_segments {
            -0.5 / width_segments as f32
        } else {
            0.0
        };

        let mut row = Vec::with_capacity(width_segments as usize + 1);
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let (phi, theta) = (u * 2.0 * PI, v * PI);

            let position = Vector3::new(
                -radius * phi.cos() * theta.sin(),
                radius * theta.cos(),
                radius * phi.sin() * theta.sin(),
            );
            let normal = if position.magnitude2() > 0.0 {
                position.normalize()
            } else {
                Vector3::unit_y()
            };

            row.push(vertices.len() as u32);
            vertices.push(ModelVertex {
                position: position.into(),
                tex_coords: [u + u_offset, v],
                normal: normal.into(),
            });
        }
        grid.push(row);
    }

    let mut indices = Vec::new();
    for iy in 0..height_segments as usize {
        for ix in 0..width_segments as usize {
            let a = grid[iy][ix + 1];
            let b = grid[iy][ix];
            let c = grid[iy + 1][ix];
            let d = grid[iy + 1][ix + 1];

            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments as usize - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    MeshData { vertices, indices }
}

/// A single quad in the XY plane facing +Z.
pub fn plane(width: f32, height: f32) -> MeshData {
    let (hw, hh) = (width * 0.5, height * 0.5);
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        ModelVertex {
            position: [-hw, hh, 0.0],
            tex_coords: [0.0, 0.0],
            normal,
        },
        ModelVertex {
            position: [hw, hh, 0.0],
            tex_coords: [1.0, 0.0],
            normal,
        },
        ModelVertex {
            position: [-hw, -hh, 0.0],
            tex_coords: [0.0, 1.0],
            normal,
        },
        ModelVertex {
            position: [hw, -hh, 0.0],
            tex_coords: [1.0, 1.0],
            normal,
        },
    ];
    MeshData {
        vertices,
        indices: vec![0, 2, 1, 2, 3, 1],
    }
}

/// Replaces every normal with the area weighted average of its adjacent faces.
///
/// Vertices that belong to no triangle, or only to degenerate ones, point up.
pub fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut sums = vec![Vector3::new(0.0_f32, 0.0, 0.0); vertices.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let p0 = Vector3::from(vertices[i0].position);
        let p1 = Vector3::from(vertices[i1].position);
        let p2 = Vector3::from(vertices[i2].position);
        // unnormalized, so larger faces weigh more
        let face = (p1 - p0).cross(p2 - p0);
        sums[i0] += face;
        sums[i1] += face;
        sums[i2] += face;
    }

    for (vertex, sum) in vertices.iter_mut().zip(sums) {
        vertex.normal = if sum.magnitude2() > 0.0 {
            sum.normalize().into()
        } else {
            [0.0, 1.0, 0.0]
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn sphere_counts() {
        let mesh = sphere(3.0, 15, 15);
        assert_eq!(mesh.vertices.len(), 256);
        // two triangles per quad, one per quad on the two pole rows
        assert_eq!(mesh.triangle_count(), 15 * 15 * 2 - 2 * 15);
        assert_eq!(mesh.indices.len(), 1260);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn sphere_vertices_lie_on_the_radius_with_outward_normals() {
        let mesh = sphere(3.0, 15, 15);
        for v in &mesh.vertices {
            let p = Vector3::from(v.position);
            let n = Vector3::from(v.normal);
            assert!(approx(p.magnitude(), 3.0));
            assert!(approx(n.magnitude(), 1.0));
            assert!(p.dot(n) > 0.0);
        }
        let bounds = mesh.bounds().unwrap();
        assert!(approx(bounds.max.y, 3.0));
        assert!(approx(bounds.min.y, -3.0));
    }

    #[test]
    fn sphere_triangles_face_outward() {
        let mesh = sphere(1.0, 8, 6);
        for tri in mesh.indices.chunks_exact(3) {
            let p: Vec<Vector3<f32>> = tri
                .iter()
                .map(|&i| Vector3::from(mesh.vertices[i as usize].position))
                .collect();
            let face = (p[1] - p[0]).cross(p[2] - p[0]);
            let centroid = (p[0] + p[1] + p[2]) / 3.0;
            assert!(face.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn sphere_pole_rows_shift_u() {
        let mesh = sphere(1.0, 4, 2);
        assert!(approx(mesh.vertices[0].tex_coords[0], 0.125));
        assert!(approx(mesh.vertices[0].tex_coords[1], 0.0));
        let last = mesh.vertices.last().unwrap();
        assert!(approx(last.tex_coords[0], 1.0 - 0.125));
        assert!(approx(last.tex_coords[1], 1.0));
    }

    #[test]
    fn sphere_clamps_segments() {
        let mesh = sphere(1.0, 0, 0);
        assert_eq!(mesh.vertices.len(), 4 * 3);
        assert_eq!(mesh.triangle_count(), 3 * 2 * 2 - 2 * 3);
    }

    #[test]
    fn plane_faces_positive_z() {
        let mesh = plane(3.0, 3.0);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.min, Point3::new(-1.5, -1.5, 0.0));
        assert_eq!(bounds.max, Point3::new(1.5, 1.5, 0.0));
        for tri in mesh.indices.chunks_exact(3) {
            let p: Vec<Vector3<f32>> = tri
                .iter()
                .map(|&i| Vector3::from(mesh.vertices[i as usize].position))
                .collect();
            assert!((p[1] - p[0]).cross(p[2] - p[0]).z > 0.0);
        }
    }

    #[test]
    fn compute_normals_matches_the_face() {
        let mut mesh = plane(2.0, 1.0);
        mesh.vertices.iter_mut().for_each(|v| v.normal = [0.0; 3]);
        compute_normals(&mut mesh.vertices, &mesh.indices);
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn compute_normals_defaults_unused_vertices_to_up() {
        let mut vertices = plane(1.0, 1.0).vertices;
        compute_normals(&mut vertices, &[]);
        assert!(vertices.iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
    }
}
