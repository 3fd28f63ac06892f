use std::sync::Arc;

use glam::{Mat4, Vec3};
use ketch_animation::{Keyframe, MeshAnimation, SpinMovement};
use ketch_engine::EngineHandle;
use ketch_scene::{
    AttributeKind, Material, MeshData, ObjectId, ProgramHandle, SceneObject, Topology,
    VertexLayout,
};

pub const LIT_PROGRAM: ProgramHandle = ProgramHandle(1);
pub const UNLIT_PROGRAM: ProgramHandle = ProgramHandle(2);

fn cube() -> MeshData {
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
        0, 2, 1,  0, 3, 2,
        4, 5, 6,  4, 6, 7,
        0, 1, 5,  0, 5, 4,
        3, 6, 2,  3, 7, 6,
        0, 7, 3,  0, 4, 7,
        1, 2, 6,  1, 6, 5,
    ];
    MeshData::new(verts, indices, None, vec![], vec![]).expect("cube mesh is valid")
}

/// Floor grid as a line-list mesh, position-only layout.
fn floor_grid(half_extent: i32, spacing: f32) -> MeshData {
    let extent = half_extent as f32 * spacing;
    let mut verts = Vec::new();
    let mut indices = Vec::new();

    for i in -half_extent..=half_extent {
        let offset = i as f32 * spacing;
        for (a, b) in [
            ([-extent, 0.0, offset], [extent, 0.0, offset]),
            ([offset, 0.0, -extent], [offset, 0.0, extent]),
        ] {
            let base = (verts.len() / 3) as u16;
            verts.extend_from_slice(&a);
            verts.extend_from_slice(&b);
            indices.extend_from_slice(&[base, base + 1]);
        }
    }

    let normals = vec![0.0; verts.len()];
    MeshData::new(verts, indices, Some(normals), vec![], vec![]).expect("grid mesh is valid")
}

fn pulse_animation(mesh: &MeshData) -> MeshAnimation {
    let rest: Vec<f32> = mesh.verts().to_vec();
    let swollen: Vec<f32> = rest.iter().map(|v| v * 1.4).collect();
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

/// Spawn the floor and a ring of cubes; returns the cube ids.
pub fn populate(handle: &EngineHandle, cubes: usize) -> Vec<ObjectId> {
    let lit = Arc::new(Material::new(
        LIT_PROGRAM,
        VertexLayout::lit(),
        Topology::Triangles,
    ));
    let unlit = Arc::new(Material::new(
        UNLIT_PROGRAM,
        VertexLayout::new(vec![AttributeKind::Position]),
        Topology::Lines,
    ));

    let floor = SceneObject::new(floor_grid(10, 1.0)).with_material(unlit);
    handle.add_object(floor);

    let mut ids = Vec::with_capacity(cubes);
    for n in 0..cubes {
        let angle = n as f32 / cubes.max(1) as f32 * std::f32::consts::TAU;
        let mesh = cube();
        let animation = (n == 0).then(|| Arc::new(pulse_animation(&mesh)));
        let mut object = SceneObject::new(mesh).with_material(Arc::clone(&lit));
        object.model_matrix = Mat4::from_translation(Vec3::new(
            angle.cos() * 4.0,
            0.5,
            angle.sin() * 4.0,
        ));
        let id = handle.add_object(object);
        ids.push(id);

        handle.run(move |engine| {
            let time = engine.time_ms();
            if let Some(object) = engine.object_mut(id) {
                object.start_movement(
                    Arc::new(SpinMovement {
                        axis: Vec3::Y,
                        rate: 0.8,
                    }),
                    time,
                    0,
                );
                if let Some(animation) = animation {
                    let _ = object.start_animation(animation, time, time, 2000, 0.0);
                }
            }
        });
    }
    ids
}

/// Spawn one extra spinning cube at a position, for interactive use.
pub fn spawn_cube(handle: &EngineHandle, position: Vec3) -> ObjectId {
    let lit = Arc::new(Material::new(
        LIT_PROGRAM,
        VertexLayout::lit(),
        Topology::Triangles,
    ));
    let mut object = SceneObject::new(cube()).with_material(lit);
    object.model_matrix = Mat4::from_translation(position);
    let id = handle.add_object(object);
    handle.run(move |engine| {
        let time = engine.time_ms();
        if let Some(object) = engine.object_mut(id) {
            object.start_movement(
                Arc::new(SpinMovement {
                    axis: Vec3::Y,
                    rate: 1.2,
                }),
                time,
                0,
            );
        }
    });
    id
}
