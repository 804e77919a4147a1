use crate::data_structures::{
    geometry::{MeshData, compute_normals},
    model::{self, ModelVertex},
};

/// Converts a triangulated, single index OBJ mesh.
///
/// OBJ texture coordinates start at the bottom left, so v is flipped. Meshes
/// exported without normals get smooth ones. Returns `None` if an index points
/// past the vertex list.
pub fn build_mesh_data(mesh: &tobj::Mesh) -> Option<MeshData> {
    let mut vertices = (0..mesh.positions.len() / 3)
        .map(|i| ModelVertex {
            position: [
                mesh.positions[i * 3],
                mesh.positions[i * 3 + 1],
                mesh.positions[i * 3 + 2],
            ],
            tex_coords: [
                mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ],
            normal: [
                mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
            ],
        })
        .collect::<Vec<_>>();

    if mesh.indices.iter().any(|&i| i as usize >= vertices.len()) {
        return None;
    }
    if mesh.normals.len() < mesh.positions.len() {
        compute_normals(&mut vertices, &mesh.indices);
    }

    Some(MeshData {
        vertices,
        indices: mesh.indices.clone(),
    })
}

/// Uploads every OBJ model as one mesh. Meshes without a material use
/// `default_material`.
pub fn load_meshes(
    models: &[tobj::Model],
    file_name: &str,
    device: &wgpu::Device,
    default_material: usize,
) -> Vec<model::Mesh> {
    models
        .iter()
        .enumerate()
        .filter_map(|(idx, m)| match build_mesh_data(&m.mesh) {
            Some(data) => Some(model::Mesh::from_data(
                device,
                &format!("{file_name}:{}", m.name),
                &data,
                m.mesh.material_id.unwrap_or(default_material),
            )),
            None => {
                log::warn!(
                    "Mesh at index {idx} in file {file_name} references vertices it does not have and is skipped."
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};

    use super::*;

    const QUAD: &str = "\
o quad
v -1 0 1
v 1 0 1
v 1 0 -1
v -1 0 -1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    fn load(text: &str) -> Vec<tobj::Model> {
        let (models, _) = tobj::load_obj_buf(
            &mut BufReader::new(Cursor::new(text)),
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            |_| Err(tobj::LoadError::OpenFileFailed),
        )
        .unwrap();
        models
    }

    #[test]
    fn quad_is_triangulated_with_flipped_v() {
        let models = load(QUAD);
        assert_eq!(models.len(), 1);
        let data = build_mesh_data(&models[0].mesh).unwrap();
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.triangle_count(), 2);
        // vt 0 0 is the bottom left of the image
        assert_eq!(data.vertices[0].tex_coords, [0.0, 1.0]);
        assert_eq!(data.vertices[2].tex_coords, [1.0, 0.0]);
    }

    #[test]
    fn missing_normals_are_generated() {
        let models = load(QUAD);
        let data = build_mesh_data(&models[0].mesh).unwrap();
        // counter clockwise seen from above
        for v in &data.vertices {
            assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut mesh = load(QUAD).remove(0).mesh;
        mesh.indices.push(42);
        assert!(build_mesh_data(&mesh).is_none());
    }
}
