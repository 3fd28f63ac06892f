use glam::Vec3;

use crate::SceneError;

/// Immutable authored geometry for one object.
///
/// Positions, normals and texture attributes are parallel per-vertex arrays;
/// `indices` reference into them. `doubles` pairs vertices that occupy the
/// same position but were split for per-face attributes (UV seams); smooth
/// normal generation sums each pair so the seam does not show as a crease.
#[derive(Debug, Clone)]
pub struct MeshData {
    verts: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    indices: Vec<u16>,
    doubles: Vec<(u16, u16)>,
}

impl MeshData {
    /// Build a mesh, generating smooth normals when `normals` is `None`.
    ///
    /// Generation assumes triangle lists; meshes for line or point materials
    /// should pass explicit (possibly empty-layout) normals.
    pub fn new(
        verts: Vec<f32>,
        indices: Vec<u16>,
        normals: Option<Vec<f32>>,
        uvs: Vec<f32>,
        doubles: Vec<(u16, u16)>,
    ) -> Result<Self, SceneError> {
        if verts.len() % 3 != 0 {
            return Err(SceneError::BadVertexArray(verts.len()));
        }
        let count = verts.len() / 3;
        for (position, &value) in indices.iter().enumerate() {
            if value as usize >= count {
                return Err(SceneError::IndexOutOfRange {
                    value,
                    position,
                    count,
                });
            }
        }
        for &(a, b) in &doubles {
            for (position, value) in [(0, a), (1, b)] {
                if value as usize >= count {
                    return Err(SceneError::IndexOutOfRange {
                        value,
                        position,
                        count,
                    });
                }
            }
        }

        let normals = match normals {
            Some(normals) => {
                if normals.len() != verts.len() {
                    return Err(SceneError::NormalSizeMismatch {
                        normals: normals.len(),
                        verts: verts.len(),
                    });
                }
                normals
            }
            None => compute_smooth_normals(&verts, &indices, &doubles),
        };

        Ok(Self {
            verts,
            normals,
            uvs,
            indices,
            doubles,
        })
    }

    pub fn verts(&self) -> &[f32] {
        &self.verts
    }

    pub fn normals(&self) -> &[f32] {
        &self.normals
    }

    pub fn uvs(&self) -> &[f32] {
        &self.uvs
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn doubles(&self) -> &[(u16, u16)] {
        &self.doubles
    }

    pub fn vertex_count(&self) -> usize {
        self.verts.len() / 3
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Area-weighted smooth normals: accumulate face cross products per vertex,
/// merge doubled pairs, then normalize.
fn compute_smooth_normals(verts: &[f32], indices: &[u16], doubles: &[(u16, u16)]) -> Vec<f32> {
    let count = verts.len() / 3;
    let mut acc = vec![Vec3::ZERO; count];

    let pos = |i: usize| Vec3::new(verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]);
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let face = (pos(b) - pos(a)).cross(pos(c) - pos(a));
        acc[a] += face;
        acc[b] += face;
        acc[c] += face;
    }

    for &(a, b) in doubles {
        let merged = acc[a as usize] + acc[b as usize];
        acc[a as usize] = merged;
        acc[b as usize] = merged;
    }

    let mut normals = Vec::with_capacity(verts.len());
    for n in acc {
        let n = n.normalize_or_zero();
        normals.extend_from_slice(&[n.x, n.y, n.z]);
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad_split_at_seam() -> (Vec<f32>, Vec<u16>) {
        // Two triangles in the XY plane sharing an edge, with the shared
        // vertices duplicated (indices 1/4 and 2/5 coincide).
        #[rustfmt::skip]
        let verts = vec![
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            1.0, 1.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
        ];
        let indices = vec![0, 1, 2, 4, 3, 5];
        (verts, indices)
    }

    #[test]
    fn bad_vertex_array_rejected() {
        let err = MeshData::new(vec![0.0; 4], vec![], None, vec![], vec![]).unwrap_err();
        assert!(matches!(err, SceneError::BadVertexArray(4)));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let err = MeshData::new(vec![0.0; 9], vec![0, 1, 3], None, vec![], vec![]).unwrap_err();
        assert!(matches!(
            err,
            SceneError::IndexOutOfRange {
                value: 3,
                position: 2,
                ..
            }
        ));
    }

    #[test]
    fn explicit_normals_must_match_vertex_count() {
        let err =
            MeshData::new(vec![0.0; 9], vec![0, 1, 2], Some(vec![0.0; 6]), vec![], vec![])
                .unwrap_err();
        assert!(matches!(err, SceneError::NormalSizeMismatch { .. }));
    }

    #[test]
    fn flat_triangle_gets_plane_normal() {
        let mesh = MeshData::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2],
            None,
            vec![],
            vec![],
        )
        .unwrap();
        for v in 0..3 {
            assert_relative_eq!(mesh.normals()[v * 3 + 2], 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn doubles_merge_seam_normals() {
        let (verts, indices) = quad_split_at_seam();
        let mesh = MeshData::new(verts, indices, None, vec![], vec![(1, 4), (2, 5)]).unwrap();

        // Both halves of each doubled vertex end up with the same normal.
        assert_eq!(&mesh.normals()[3..6], &mesh.normals()[12..15]);
        assert_eq!(&mesh.normals()[6..9], &mesh.normals()[15..18]);
        assert_relative_eq!(mesh.normals()[5], 1.0, epsilon = 1e-6);
    }
}
