use std::sync::Arc;

use glam::Vec3;
use ketch_animation::{Keyframe, MeshAnimation, SpinMovement};
use ketch_engine::EngineHandle;
use ketch_scene::{Material, MeshData, ProgramHandle, SceneObject, Topology, VertexLayout};

pub const LIT_PROGRAM: ProgramHandle = ProgramHandle(1);

/// A unit cube with smooth generated normals.
pub fn cube() -> MeshData {
    let p = 0.5_f32;
    #[rustfmt::skip]
    let verts = vec![
        -p, -p, -p,
         p, -p, -p,
         p,  p, -p,
        -p,  p, -p,
        -p, -p,  p,
         p, -p,  p,
         p,  p,  p,
        -p,  p,  p,
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1,  0, 3, 2, // -Z
        4, 5, 6,  4, 6, 7, // +Z
        0, 1, 5,  0, 5, 4, // -Y
        3, 6, 2,  3, 7, 6, // +Y
        0, 7, 3,  0, 4, 7, // -X
        1, 2, 6,  1, 6, 5, // +X
    ];
    MeshData::new(verts, indices, None, vec![], vec![]).expect("cube mesh is valid")
}

/// A looping pulse that scales the cube up and back.
pub fn pulse_animation(mesh: &MeshData) -> MeshAnimation {
    let rest: Vec<f32> = mesh.verts().to_vec();
    let swollen: Vec<f32> = rest.iter().map(|v| v * 1.5).collect();
    MeshAnimation::new(
        "pulse",
        vec![
            Keyframe::new(rest.clone()),
            Keyframe::new(swollen),
            Keyframe::new(rest),
        ],
        vec![0.0, 0.5, 1.0],
    )
    .expect("pulse animation is valid")
}

/// Spawn a row of spinning cubes; the first one also pulses.
pub fn populate(handle: &EngineHandle, count: usize) {
    let material = Arc::new(Material::new(
        LIT_PROGRAM,
        VertexLayout::lit(),
        Topology::Triangles,
    ));

    for n in 0..count {
        let mesh = cube();
        let animation = (n == 0).then(|| Arc::new(pulse_animation(&mesh)));
        let mut object = SceneObject::new(mesh).with_material(Arc::clone(&material));
        object.model_matrix = glam::Mat4::from_translation(Vec3::new(n as f32 * 2.0, 0.0, 0.0));
        let id = handle.add_object(object);

        let rate = 0.5 + n as f32 * 0.2;
        handle.run(move |engine| {
            let time = engine.time_ms();
            if let Some(object) = engine.object_mut(id) {
                object.start_movement(
                    Arc::new(SpinMovement {
                        axis: Vec3::Y,
                        rate,
                    }),
                    time,
                    0,
                );
                if let Some(animation) = animation {
                    // Looping pulse: two-second cycle, never finishes.
                    let _ = object.start_animation(animation, time, time, 2000, 0.0);
                }
            }
        });
    }
}
