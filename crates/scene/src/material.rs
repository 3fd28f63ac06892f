use serde::{Deserialize, Serialize};

use crate::{MeshData, SceneError};

/// Stable identifier for a shader program as authored content names it.
///
/// The simulation side never touches GPU state; backends resolve handles to
/// compiled programs when a frame is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramHandle(pub u64);

/// Primitive topology the material's index data describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    Triangles,
    Lines,
    Points,
}

/// One per-vertex attribute in an interleaved layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Position,
    Normal,
    TexCoord,
    Color,
}

impl AttributeKind {
    /// Floats per vertex this attribute occupies.
    pub fn size(self) -> usize {
        match self {
            AttributeKind::Position | AttributeKind::Normal | AttributeKind::Color => 3,
            AttributeKind::TexCoord => 2,
        }
    }
}

/// Ordered interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexLayout {
    attrs: Vec<AttributeKind>,
}

impl VertexLayout {
    pub fn new(attrs: Vec<AttributeKind>) -> Self {
        Self { attrs }
    }

    /// Position plus smooth normal; the baseline lit layout.
    pub fn lit() -> Self {
        Self::new(vec![AttributeKind::Position, AttributeKind::Normal])
    }

    /// Position, normal and texture coordinate.
    pub fn textured() -> Self {
        Self::new(vec![
            AttributeKind::Position,
            AttributeKind::Normal,
            AttributeKind::TexCoord,
        ])
    }

    pub fn attrs(&self) -> &[AttributeKind] {
        &self.attrs
    }

    /// Floats per vertex across all attributes.
    pub fn stride(&self) -> usize {
        self.attrs.iter().map(|a| a.size()).sum()
    }
}

/// Appearance of an object: which program draws it, what vertex data that
/// program expects, and how indices are interpreted.
///
/// Materials are immutable and shared between objects via `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub program: ProgramHandle,
    pub layout: VertexLayout,
    pub topology: Topology,
}

impl Material {
    pub fn new(program: ProgramHandle, layout: VertexLayout, topology: Topology) -> Self {
        Self {
            program,
            layout,
            topology,
        }
    }

    /// Interleave one object's vertex data into `out` per this layout,
    /// returning the number of floats written.
    ///
    /// `verts` is the object's working (possibly animated) position buffer;
    /// normals and texture attributes come from the authored mesh. Attribute
    /// arrays that are too short for the layout are rejected rather than
    /// silently zero-filled.
    pub fn pack_vertices(
        &self,
        verts: &[f32],
        mesh: &MeshData,
        out: &mut [f32],
    ) -> Result<usize, SceneError> {
        let count = verts.len() / 3;
        let needed = count * self.stride();
        if out.len() < needed {
            return Err(SceneError::StagingOverflow {
                needed,
                available: out.len(),
            });
        }

        for attr in self.layout.attrs() {
            let expected = count * attr.size();
            let source = match attr {
                AttributeKind::Position => verts,
                AttributeKind::Normal => mesh.normals(),
                AttributeKind::TexCoord | AttributeKind::Color => mesh.uvs(),
            };
            if source.len() != expected {
                return Err(SceneError::AttributeSizeMismatch {
                    len: source.len(),
                    expected,
                });
            }
        }

        let stride = self.stride();
        for v in 0..count {
            let mut cursor = v * stride;
            for attr in self.layout.attrs() {
                let size = attr.size();
                let source = match attr {
                    AttributeKind::Position => verts,
                    AttributeKind::Normal => mesh.normals(),
                    AttributeKind::TexCoord | AttributeKind::Color => mesh.uvs(),
                };
                out[cursor..cursor + size].copy_from_slice(&source[v * size..v * size + size]);
                cursor += size;
            }
        }
        Ok(needed)
    }

    pub fn stride(&self) -> usize {
        self.layout.stride()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vertex_mesh() -> MeshData {
        MeshData::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![],
            Some(vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0]),
            vec![0.25, 0.75, 0.5, 1.0],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn layout_stride_sums_attribute_sizes() {
        assert_eq!(VertexLayout::lit().stride(), 6);
        assert_eq!(VertexLayout::textured().stride(), 8);
    }

    #[test]
    fn pack_interleaves_per_layout() {
        let mesh = two_vertex_mesh();
        let material = Material::new(ProgramHandle(1), VertexLayout::textured(), Topology::Triangles);
        let mut out = vec![0.0; 16];

        let written = material
            .pack_vertices(mesh.verts(), &mesh, &mut out)
            .unwrap();
        assert_eq!(written, 16);
        assert_eq!(
            out,
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.25, 0.75, // vertex 0
                1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.5, 1.0, // vertex 1
            ]
        );
    }

    #[test]
    fn pack_uses_working_positions_not_authored() {
        let mesh = two_vertex_mesh();
        let material = Material::new(ProgramHandle(1), VertexLayout::lit(), Topology::Triangles);
        let posed = vec![5.0, 5.0, 5.0, 6.0, 5.0, 5.0];
        let mut out = vec![0.0; 12];

        material.pack_vertices(&posed, &mesh, &mut out).unwrap();
        assert_eq!(&out[0..3], &[5.0, 5.0, 5.0]);
        assert_eq!(&out[3..6], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn pack_rejects_short_output() {
        let mesh = two_vertex_mesh();
        let material = Material::new(ProgramHandle(1), VertexLayout::lit(), Topology::Triangles);
        let mut out = vec![0.0; 11];

        let err = material
            .pack_vertices(mesh.verts(), &mesh, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            SceneError::StagingOverflow {
                needed: 12,
                available: 11,
            }
        ));
    }

    #[test]
    fn pack_rejects_missing_texcoords() {
        let mesh = MeshData::new(
            vec![0.0; 6],
            vec![],
            Some(vec![0.0; 6]),
            vec![],
            vec![],
        )
        .unwrap();
        let material =
            Material::new(ProgramHandle(1), VertexLayout::textured(), Topology::Triangles);
        let mut out = vec![0.0; 16];

        let err = material
            .pack_vertices(mesh.verts(), &mesh, &mut out)
            .unwrap_err();
        assert!(matches!(err, SceneError::AttributeSizeMismatch { .. }));
    }
}
