use glam::{Mat4, Quat, Vec3};

use crate::ArmatureError;

/// An authored bone: an object-space rest position and its child subtree.
///
/// This is the construction-time shape; a [`Skeleton`] flattens it and the
/// tree is not kept around afterwards.
#[derive(Debug, Clone, Default)]
pub struct BoneDef {
    pub rest: Vec3,
    pub children: Vec<BoneDef>,
}

impl BoneDef {
    pub fn new(rest: Vec3) -> Self {
        Self {
            rest,
            children: Vec::new(),
        }
    }

    pub fn with_children(rest: Vec3, children: Vec<BoneDef>) -> Self {
        Self { rest, children }
    }
}

/// One bone in a flattened skeleton.
///
/// Identity is the index into the skeleton's bone array. The rest position is
/// fixed at construction; the rotation is the mutable pose state, updated
/// every tick by whatever drives the animation.
#[derive(Debug, Clone)]
pub struct Bone {
    index: usize,
    parent: Option<usize>,
    rest: Vec3,
    rotation: Quat,
}

impl Bone {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn rest(&self) -> Vec3 {
        self.rest
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// The bone's local posed transform: a rotation about its own rest
    /// position. The rest point itself is a fixed point of this matrix, so a
    /// bone pivots in place instead of orbiting the object origin.
    fn pivot_matrix(&self) -> Mat4 {
        let q = self.rotation;
        Mat4::from_rotation_translation(q, self.rest - q * self.rest)
    }
}

/// A flattened bone forest with per-bone pose rotations.
///
/// Built once from authored [`BoneDef`] roots; the flat array is a depth-first
/// traversal, so every bone appears after its parent and
/// [`Skeleton::write_matrices`] can run as a single forward pass.
#[derive(Debug, Clone)]
pub struct Skeleton {
    id: String,
    bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(id: impl Into<String>, roots: &[BoneDef]) -> Self {
        let mut bones = Vec::new();
        for root in roots {
            flatten(root, None, &mut bones);
        }
        Self {
            id: id.into(),
            bones,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn rotation(&self, index: usize) -> Result<Quat, ArmatureError> {
        self.bone(index).map(|b| b.rotation)
    }

    /// Set one bone's pose rotation. The quaternion is expected to be unit
    /// length; it is normalized here so accumulated drift from upstream math
    /// cannot shear the skinned mesh.
    pub fn set_rotation(&mut self, index: usize, rotation: Quat) -> Result<(), ArmatureError> {
        let count = self.bones.len();
        let bone = self
            .bones
            .get_mut(index)
            .ok_or(ArmatureError::BoneIndexOutOfRange { index, count })?;
        bone.rotation = rotation.normalize();
        Ok(())
    }

    /// Reset every bone to the identity rotation.
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.rotation = Quat::IDENTITY;
        }
    }

    /// Write the current posed bone-to-object matrices into `out`.
    ///
    /// Fills `bone_count() * 16` floats starting at `offset`, one column-major
    /// 4x4 matrix per bone, indexed by bone index. A root's matrix is its
    /// pivot-preserving rotation; a child's is its parent's matrix composed
    /// with its own pivot-preserving rotation, so rotations compound down the
    /// hierarchy. The flat order guarantees each parent matrix is written
    /// before any child reads it back.
    pub fn write_matrices(&self, out: &mut [f32], offset: usize) {
        for bone in &self.bones {
            let local = bone.pivot_matrix();
            let matrix = match bone.parent {
                Some(parent) => {
                    let base = offset + parent * 16;
                    let parent_matrix = Mat4::from_cols_slice(&out[base..base + 16]);
                    parent_matrix * local
                }
                None => local,
            };
            let base = offset + bone.index * 16;
            matrix.write_cols_to_slice(&mut out[base..base + 16]);
        }
    }

    fn bone(&self, index: usize) -> Result<&Bone, ArmatureError> {
        self.bones.get(index).ok_or(ArmatureError::BoneIndexOutOfRange {
            index,
            count: self.bones.len(),
        })
    }
}

fn flatten(def: &BoneDef, parent: Option<usize>, out: &mut Vec<Bone>) {
    let index = out.len();
    out.push(Bone {
        index,
        parent,
        rest: def.rest,
        rotation: Quat::IDENTITY,
    });
    for child in &def.children {
        flatten(child, Some(index), out);
    }
}
