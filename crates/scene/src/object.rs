use std::sync::Arc;

use glam::{Mat4, Vec3};

use ketch_animation::{
    FrameResult, MeshAnimation, MeshAnimationData, Movement, MovementData,
};
use ketch_armature::skeleton::Skeleton;

use crate::{Material, MeshData, SceneError};

/// Stable identity of a live object, assigned at insertion and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Bookkeeping the frame pack step reads and refreshes each tick.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub vertex_count: usize,
    pub index_count: usize,
    /// Soft-delete flag; the object stays in place until an explicit flush.
    pub deleted: bool,
    /// Ticks remaining during which the working vertices must be restaged.
    /// Held at 2 while geometry changes so both alternating staging sets see
    /// the update.
    pub geometry_dirty: u8,
    /// Float offset of this object's interleaved span in the staging VBO,
    /// valid for the frame most recently packed.
    pub vbo_offset: usize,
    /// Index offset of this object's span in the staging IBO.
    pub ibo_offset: usize,
}

/// Per-tick advancement capability.
///
/// Transform and geometry passes are split so containers can run them in
/// distinct phases; the geometry pass has a default no-op for objects that
/// never deform.
pub trait Advance {
    fn advance_transform(&mut self, time: u64);

    fn advance_geometry(&mut self, _time: u64) {}
}

/// One weighted bone reference for a vertex.
#[derive(Debug, Clone, Copy)]
pub struct VertexInfluence {
    pub bone: usize,
    pub weight: f32,
}

/// A posed skeleton attached to an object, with per-vertex bone weights.
///
/// Skinning reads the authored rest positions and writes the object's working
/// buffer, so repeated poses do not accumulate error.
#[derive(Debug)]
pub struct ArmatureBinding {
    skeleton: Skeleton,
    influences: Vec<Vec<VertexInfluence>>,
    /// Scratch pose matrices, 16 floats per bone.
    matrices: Vec<f32>,
}

impl ArmatureBinding {
    pub fn new(
        skeleton: Skeleton,
        influences: Vec<Vec<VertexInfluence>>,
    ) -> Result<Self, SceneError> {
        let count = skeleton.bone_count();
        for (vertex, list) in influences.iter().enumerate() {
            for influence in list {
                if influence.bone >= count {
                    return Err(SceneError::InvalidInfluence {
                        vertex,
                        bone: influence.bone,
                        count,
                    });
                }
            }
        }
        let matrices = vec![0.0; count * 16];
        Ok(Self {
            skeleton,
            influences,
            matrices,
        })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn vertex_count(&self) -> usize {
        self.influences.len()
    }

    /// Pose `rest` through the skeleton's current rotations into `out`.
    ///
    /// Vertices with no influences copy through unchanged; weighted vertices
    /// blend the bone-transformed positions.
    pub fn skin(&mut self, rest: &[f32], out: &mut [f32]) {
        self.skeleton.write_matrices(&mut self.matrices, 0);

        for (vertex, list) in self.influences.iter().enumerate() {
            let base = vertex * 3;
            let p = Vec3::new(rest[base], rest[base + 1], rest[base + 2]);
            if list.is_empty() {
                out[base..base + 3].copy_from_slice(&rest[base..base + 3]);
                continue;
            }
            let mut acc = Vec3::ZERO;
            for influence in list {
                let m = Mat4::from_cols_slice(
                    &self.matrices[influence.bone * 16..influence.bone * 16 + 16],
                );
                acc += influence.weight * m.transform_point3(p);
            }
            out[base] = acc.x;
            out[base + 1] = acc.y;
            out[base + 2] = acc.z;
        }
    }
}

/// One live object: authored geometry plus the mutable state the simulation
/// advances every tick.
pub struct SceneObject {
    mesh: MeshData,
    /// Working vertex positions; what the pack step reads. Starts as a copy
    /// of the authored positions and is overwritten by animation or skinning.
    pub verts: Vec<f32>,
    pub model_matrix: Mat4,
    pub material: Option<Arc<Material>>,
    movement: Option<Arc<dyn Movement>>,
    movement_data: MovementData,
    animation: Option<Arc<MeshAnimation>>,
    animation_data: Option<MeshAnimationData>,
    armature: Option<ArmatureBinding>,
    pub info: Metadata,
}

impl SceneObject {
    pub fn new(mesh: MeshData) -> Self {
        let verts = mesh.verts().to_vec();
        let info = Metadata {
            vertex_count: mesh.vertex_count(),
            index_count: mesh.index_count(),
            geometry_dirty: 2,
            ..Metadata::default()
        };
        Self {
            mesh,
            verts,
            model_matrix: Mat4::IDENTITY,
            material: None,
            movement: None,
            movement_data: MovementData::default(),
            animation: None,
            animation_data: None,
            armature: None,
            info,
        }
    }

    pub fn with_material(mut self, material: Arc<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    /// Begin a movement at `time`, capturing the current model matrix as its
    /// reference frame.
    pub fn start_movement(&mut self, movement: Arc<dyn Movement>, time: u64, duration: u64) {
        self.movement_data.set(time, duration, self.model_matrix);
        self.movement = Some(movement);
    }

    /// Stop the active movement, keeping the transform it last produced.
    pub fn end_movement(&mut self) {
        self.movement = None;
    }

    pub fn has_movement(&self) -> bool {
        self.movement.is_some()
    }

    /// Begin a mesh animation, capturing the current working vertices so
    /// playback can blend out of the present pose before `start_time`.
    pub fn start_animation(
        &mut self,
        animation: Arc<MeshAnimation>,
        trigger_time: u64,
        start_time: u64,
        duration: u64,
        loop_threshold: f32,
    ) -> Result<(), SceneError> {
        if animation.frame_len() != self.verts.len() {
            return Err(SceneError::AnimationSizeMismatch {
                id: animation.id().to_owned(),
                frame_len: animation.frame_len(),
                verts: self.verts.len(),
            });
        }
        self.animation_data = Some(MeshAnimationData::new(
            trigger_time,
            start_time,
            duration,
            loop_threshold,
            self.verts.clone(),
        ));
        self.animation = Some(animation);
        Ok(())
    }

    /// Drop the active animation, keeping the pose it last wrote.
    pub fn clear_animation(&mut self) {
        self.animation = None;
        self.animation_data = None;
    }

    pub fn has_animation(&self) -> bool {
        self.animation.is_some()
    }

    /// Attach a posed skeleton. The binding's influence lists must cover the
    /// mesh one-to-one.
    pub fn bind_armature(&mut self, binding: ArmatureBinding) -> Result<(), SceneError> {
        if binding.vertex_count() != self.mesh.vertex_count() {
            return Err(SceneError::InfluenceCountMismatch {
                influences: binding.vertex_count(),
                verts: self.mesh.vertex_count(),
            });
        }
        self.armature = Some(binding);
        Ok(())
    }

    pub fn armature_mut(&mut self) -> Option<&mut ArmatureBinding> {
        self.armature.as_mut()
    }

    /// Flag for removal; storage is reclaimed by the container's next flush.
    pub fn mark_for_deletion(&mut self) {
        self.info.deleted = true;
    }
}

impl Advance for SceneObject {
    fn advance_transform(&mut self, time: u64) {
        if let Some(movement) = &self.movement {
            self.model_matrix = movement.advance(&self.movement_data, time);
        }
    }

    fn advance_geometry(&mut self, time: u64) {
        if let (Some(animation), Some(data)) = (&self.animation, &self.animation_data) {
            if animation.get_frame(time, data, &mut self.verts) == FrameResult::Finished {
                self.clear_animation();
            }
            self.info.geometry_dirty = 2;
        } else if let Some(armature) = &mut self.armature {
            armature.skin(self.mesh.verts(), &mut self.verts);
            self.info.geometry_dirty = 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ketch_animation::{Keyframe, LinearMovement};
    use ketch_armature::skeleton::BoneDef;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_2;

    fn triangle() -> MeshData {
        MeshData::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2],
            None,
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn movement_updates_model_matrix() {
        let mut object = SceneObject::new(triangle());
        object.start_movement(Arc::new(LinearMovement { velocity: Vec3::X }), 0, 0);

        object.advance_transform(2000);
        let p = object.model_matrix.transform_point3(Vec3::ZERO);
        assert_relative_eq!(p, Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);

        object.end_movement();
        object.advance_transform(5000);
        assert_relative_eq!(
            object.model_matrix.transform_point3(Vec3::ZERO),
            Vec3::new(2.0, 0.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn animation_size_mismatch_rejected() {
        let mut object = SceneObject::new(triangle());
        let animation = Arc::new(
            MeshAnimation::new("short", vec![Keyframe::new(vec![0.0; 3])], vec![0.0]).unwrap(),
        );
        let err = object
            .start_animation(animation, 0, 0, 1000, 0.0)
            .unwrap_err();
        assert!(matches!(err, SceneError::AnimationSizeMismatch { .. }));
    }

    #[test]
    fn finished_animation_clears_binding_and_holds_pose() {
        let mut object = SceneObject::new(triangle());
        let target = vec![1.0; 9];
        let animation = Arc::new(
            MeshAnimation::new(
                "once",
                vec![Keyframe::new(vec![0.5; 9]), Keyframe::new(target.clone())],
                vec![0.0, 0.5],
            )
            .unwrap(),
        );
        object.start_animation(animation, 0, 0, 1000, 1.0).unwrap();
        assert!(object.has_animation());

        object.advance_geometry(250);
        assert!(object.has_animation());

        object.advance_geometry(1000);
        assert!(!object.has_animation());
        assert_eq!(object.verts, target);

        // Further ticks leave the final pose alone.
        object.advance_geometry(9999);
        assert_eq!(object.verts, target);
    }

    #[test]
    fn skinning_follows_bone_rotation() {
        let mut object = SceneObject::new(triangle());
        let skeleton = Skeleton::new("arm", &[BoneDef::new(Vec3::ZERO)]);
        let influences = vec![
            vec![VertexInfluence { bone: 0, weight: 1.0 }],
            vec![VertexInfluence { bone: 0, weight: 1.0 }],
            vec![],
        ];
        let binding = ArmatureBinding::new(skeleton, influences).unwrap();
        object.bind_armature(binding).unwrap();

        object
            .armature_mut()
            .unwrap()
            .skeleton_mut()
            .set_rotation(0, Quat::from_rotation_z(FRAC_PI_2))
            .unwrap();
        object.advance_geometry(0);

        // Vertex 1 at (1,0,0) rotates to (0,1,0); vertex 2 is uninfluenced.
        assert_relative_eq!(object.verts[3], 0.0, epsilon = 1e-5);
        assert_relative_eq!(object.verts[4], 1.0, epsilon = 1e-5);
        assert_eq!(&object.verts[6..9], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn influence_out_of_range_rejected() {
        let skeleton = Skeleton::new("arm", &[BoneDef::new(Vec3::ZERO)]);
        let err = ArmatureBinding::new(
            skeleton,
            vec![vec![VertexInfluence { bone: 1, weight: 1.0 }]],
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::InvalidInfluence { bone: 1, .. }));
    }

    #[test]
    fn binding_must_cover_every_vertex() {
        let mut object = SceneObject::new(triangle());
        let skeleton = Skeleton::new("arm", &[BoneDef::new(Vec3::ZERO)]);
        let binding = ArmatureBinding::new(skeleton, vec![vec![]]).unwrap();
        let err = object.bind_armature(binding).unwrap_err();
        assert!(matches!(
            err,
            SceneError::InfluenceCountMismatch {
                influences: 1,
                verts: 3,
            }
        ));
    }

    #[test]
    fn mark_for_deletion_is_soft() {
        let mut object = SceneObject::new(triangle());
        assert!(!object.info.deleted);
        object.mark_for_deletion();
        assert!(object.info.deleted);
        assert_eq!(object.info.vertex_count, 3);
    }
}
