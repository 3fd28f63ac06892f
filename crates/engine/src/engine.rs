use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use glam::Mat4;
use tracing::{debug, info, warn};

use ketch_common::{ConfigError, EngineConfig, Light};
use ketch_scene::{Advance, ObjectId, SceneObject};

use crate::pipe::FramePipe;
use crate::snapshot::{DrawRecord, RenderData};
use crate::staging::StagingBuffers;

/// Deferred closure run on the simulation thread between ticks.
pub type Action = Box<dyn FnOnce(&mut Engine) + Send>;

/// State both threads touch directly, outside the frame hand-off.
struct Shared {
    paused: AtomicBool,
    ending: AtomicBool,
    flush_requested: AtomicBool,
    next_id: AtomicU64,
    light: Mutex<Light>,
    view: Mutex<Mat4>,
}

impl Shared {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            ending: AtomicBool::new(false),
            flush_requested: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            light: Mutex::new(Light::default()),
            view: Mutex::new(Mat4::IDENTITY),
        }
    }
}

struct LiveObject {
    id: ObjectId,
    object: SceneObject,
}

/// The simulation: owns every live object, advances them once per tick, and
/// publishes a frame snapshot through the pipe.
///
/// # Invariants
/// - Objects keep their insertion order; draw records and staging spans are
///   packed in that order every frame.
/// - A soft-deleted object occupies its arena slot until a flush compacts the
///   arena, so ids handed to callers stay unambiguous in between.
/// - The staging set published in a frame is not written again until the
///   frame after next.
pub struct Engine {
    config: EngineConfig,
    objects: Vec<LiveObject>,
    staging: [Arc<Mutex<StagingBuffers>>; 2],
    active: usize,
    /// Staging sets that need a full repack after a layout change.
    layout_dirty: [bool; 2],
    pipe: Arc<FramePipe<RenderData>>,
    shared: Arc<Shared>,
    inserts: Receiver<(ObjectId, SceneObject)>,
    removals: Receiver<ObjectId>,
    actions: Receiver<Action>,
    /// Engine time the current tick poses for, ms since the epoch.
    time_ms: u64,
    epoch: Instant,
}

impl Engine {
    /// Validate the config, spawn the simulation thread, and return the
    /// cross-thread handle.
    pub fn start(config: EngineConfig) -> Result<EngineHandle, ConfigError> {
        config.validate()?;

        let (insert_tx, insert_rx) = crossbeam_channel::unbounded();
        let (removal_tx, removal_rx) = crossbeam_channel::unbounded();
        let (action_tx, action_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::new());
        let pipe = Arc::new(FramePipe::new());

        let engine = Engine {
            staging: [
                Arc::new(Mutex::new(StagingBuffers::new(&config))),
                Arc::new(Mutex::new(StagingBuffers::new(&config))),
            ],
            config,
            objects: Vec::new(),
            active: 0,
            layout_dirty: [true; 2],
            pipe: Arc::clone(&pipe),
            shared: Arc::clone(&shared),
            inserts: insert_rx,
            removals: removal_rx,
            actions: action_rx,
            time_ms: 0,
            epoch: Instant::now(),
        };

        let thread = thread::Builder::new()
            .name("ketch-sim".into())
            .spawn(move || engine.run())
            .expect("spawn simulation thread");

        Ok(EngineHandle {
            shared,
            pipe,
            inserts: insert_tx,
            removals: removal_tx,
            actions: action_tx,
            thread: Some(thread),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Engine time of the tick currently being simulated.
    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects
            .iter_mut()
            .find(|live| live.id == id)
            .map(|live| &mut live.object)
    }

    fn run(mut self) {
        info!(
            max_objects = self.config.max_objects,
            interval_ms = self.config.frame_interval.as_millis() as u64,
            "simulation thread started"
        );
        self.time_ms = self.epoch.elapsed().as_millis() as u64;

        while !self.shared.ending.load(Ordering::Acquire) {
            self.drain_commands();

            if self.shared.flush_requested.swap(false, Ordering::AcqRel) {
                self.flush_deleted();
            }

            if self.shared.paused.load(Ordering::Acquire) {
                thread::park_timeout(self.config.frame_interval);
                continue;
            }

            self.advance();
            let frame = self.pack();
            match self.pipe.publish(frame) {
                Ok(collected_at) => {
                    // Pose the next frame for when it will actually be shown:
                    // one nominal interval past the consumer's pickup.
                    let collect_ms =
                        collected_at.saturating_duration_since(self.epoch).as_millis() as u64;
                    self.time_ms = collect_ms + self.config.frame_interval.as_millis() as u64;
                }
                Err(_) => break,
            }
            self.active ^= 1;
        }
        info!("simulation thread ended");
    }

    fn drain_commands(&mut self) {
        while let Ok((id, object)) = self.inserts.try_recv() {
            if self.objects.len() >= self.config.max_objects {
                warn!(id = id.0, "object limit reached, insert dropped");
                continue;
            }
            debug!(id = id.0, verts = object.info.vertex_count, "object added");
            self.objects.push(LiveObject { id, object });
            self.layout_dirty = [true; 2];
        }

        while let Ok(id) = self.removals.try_recv() {
            match self.objects.iter_mut().find(|live| live.id == id) {
                Some(live) => {
                    live.object.mark_for_deletion();
                    self.layout_dirty = [true; 2];
                }
                None => warn!(id = id.0, "removal of unknown object ignored"),
            }
        }

        let actions: Vec<Action> = self.actions.try_iter().collect();
        for action in actions {
            action(self);
        }
    }

    /// Compact the arena, dropping every soft-deleted object.
    fn flush_deleted(&mut self) {
        let before = self.objects.len();
        self.objects.retain(|live| !live.object.info.deleted);
        let dropped = before - self.objects.len();
        if dropped > 0 {
            info!(dropped, remaining = self.objects.len(), "flushed deleted objects");
            self.layout_dirty = [true; 2];
        }
    }

    fn advance(&mut self) {
        for live in &mut self.objects {
            if live.object.info.deleted {
                continue;
            }
            live.object.advance_transform(self.time_ms);
            live.object.advance_geometry(self.time_ms);
        }
    }

    /// Fill the active staging set and build the frame snapshot.
    ///
    /// After a layout change every span is rewritten; otherwise only objects
    /// whose geometry moved since this set was last packed are restaged.
    /// Objects that will not fit or cannot be packed are skipped with a
    /// warning, never a panic.
    fn pack(&mut self) -> RenderData {
        let rebuild = self.layout_dirty[self.active];
        let mut buffers = self.staging[self.active]
            .lock()
            .expect("staging mutex poisoned");

        let mut vbo_cursor = 0usize;
        let mut ibo_cursor = 0usize;
        let mut records = Vec::new();

        for live in &mut self.objects {
            let object = &mut live.object;
            if object.info.deleted {
                continue;
            }
            let Some(material) = object.material.clone() else {
                warn!(id = live.id.0, "object has no material, skipped");
                continue;
            };

            let float_count = object.info.vertex_count * material.stride();
            let index_count = object.info.index_count;
            if vbo_cursor + float_count > buffers.vbo.len()
                || ibo_cursor + index_count > buffers.ibo.len()
            {
                warn!(
                    id = live.id.0,
                    vbo_cursor, ibo_cursor, "staging capacity exceeded, object skipped"
                );
                continue;
            }

            if rebuild || object.info.geometry_dirty > 0 {
                let span = &mut buffers.vbo[vbo_cursor..vbo_cursor + float_count];
                if let Err(error) = material.pack_vertices(&object.verts, object.mesh(), span) {
                    warn!(id = live.id.0, %error, "object could not be packed, skipped");
                    continue;
                }
                buffers.vbo_range.mark(vbo_cursor, vbo_cursor + float_count);
                if object.info.geometry_dirty > 0 {
                    object.info.geometry_dirty -= 1;
                }
            }
            if rebuild {
                buffers.ibo[ibo_cursor..ibo_cursor + index_count]
                    .copy_from_slice(object.mesh().indices());
                buffers.ibo_range.mark(ibo_cursor, ibo_cursor + index_count);
            }

            object.info.vbo_offset = vbo_cursor;
            object.info.ibo_offset = ibo_cursor;
            records.push(DrawRecord {
                program: material.program,
                topology: material.topology,
                index_count,
                vbo_offset: vbo_cursor,
                ibo_offset: ibo_cursor,
                model: object.model_matrix,
            });
            vbo_cursor += float_count;
            ibo_cursor += index_count;
        }

        self.layout_dirty[self.active] = false;
        drop(buffers);

        let view = *self.shared.view.lock().expect("view mutex poisoned");
        let light = *self.shared.light.lock().expect("light mutex poisoned");
        RenderData {
            buffers: Arc::clone(&self.staging[self.active]),
            view,
            light,
            records,
            time_ms: self.time_ms,
        }
    }
}

/// Cross-thread control surface for a running [`Engine`].
///
/// Dropping the handle ends the simulation thread and joins it.
pub struct EngineHandle {
    shared: Arc<Shared>,
    pipe: Arc<FramePipe<RenderData>>,
    inserts: Sender<(ObjectId, SceneObject)>,
    removals: Sender<ObjectId>,
    actions: Sender<Action>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Queue an object for insertion at the next tick. Ids are allocated
    /// here, so the caller can reference the object before it lands.
    pub fn add_object(&self, object: SceneObject) -> ObjectId {
        let id = ObjectId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.inserts.send((id, object));
        id
    }

    /// Soft-delete an object at the next tick; storage is reclaimed by the
    /// next [`flush_deleted`](Self::flush_deleted).
    pub fn remove_object(&self, id: ObjectId) {
        let _ = self.removals.send(id);
    }

    /// Run a closure on the simulation thread between ticks, with mutable
    /// access to the engine.
    pub fn run(&self, action: impl FnOnce(&mut Engine) + Send + 'static) {
        let _ = self.actions.send(Box::new(action));
    }

    /// Request compaction of soft-deleted objects at the next tick.
    pub fn flush_deleted(&self) {
        self.shared.flush_requested.store(true, Ordering::Release);
    }

    /// Stop advancing and publishing; the consumer sees no frames while
    /// paused.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Replace the global light captured into the next frame snapshot.
    pub fn set_light(&self, light: Light) {
        *self.shared.light.lock().expect("light mutex poisoned") = light;
    }

    /// Replace the view matrix captured into the next frame snapshot.
    pub fn set_view(&self, view: Mat4) {
        *self.shared.view.lock().expect("view mutex poisoned") = view;
    }

    /// The frame hand-off the consumer collects from.
    pub fn pipe(&self) -> Arc<FramePipe<RenderData>> {
        Arc::clone(&self.pipe)
    }

    /// Ask the simulation thread to exit; returns without joining. Idempotent.
    pub fn end(&self) {
        self.shared.ending.store(true, Ordering::Release);
        self.pipe.shutdown();
    }

    /// End the simulation and wait for the thread to exit.
    pub fn join(mut self) {
        self.end();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.end();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use ketch_animation::LinearMovement;
    use ketch_scene::{Material, MeshData, ProgramHandle, Topology, VertexLayout};
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        EngineConfig {
            frame_interval: Duration::from_millis(5),
            ..EngineConfig::default()
        }
    }

    fn triangle_object() -> SceneObject {
        let mesh = MeshData::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2],
            None,
            vec![],
            vec![],
        )
        .unwrap();
        SceneObject::new(mesh).with_material(Arc::new(Material::new(
            ProgramHandle(1),
            VertexLayout::lit(),
            Topology::Triangles,
        )))
    }

    #[test]
    fn zero_capacity_config_rejected() {
        let config = EngineConfig {
            vbo_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(Engine::start(config).is_err());
    }

    #[test]
    fn frames_carry_packed_objects() {
        let handle = Engine::start(test_config()).unwrap();
        handle.add_object(triangle_object());
        let pipe = handle.pipe();

        // The object lands at the next tick; frames published before the
        // insert drained may be empty.
        let frame = loop {
            let frame = pipe.collect().unwrap();
            if !frame.records.is_empty() {
                break frame;
            }
        };

        assert_eq!(frame.records.len(), 1);
        let record = frame.records[0];
        assert_eq!(record.index_count, 3);
        assert_eq!(record.vbo_offset, 0);

        let buffers = frame.buffers.lock().unwrap();
        // Interleaved position + normal, vertex 1 position at floats 6..9.
        assert_eq!(&buffers.vbo[6..9], &[1.0, 0.0, 0.0]);
        assert_eq!(&buffers.ibo[..3], &[0, 1, 2]);
        assert!(!buffers.vbo_range.is_empty());
        drop(buffers);

        handle.join();
    }

    #[test]
    fn consecutive_frames_alternate_staging_sets() {
        let handle = Engine::start(test_config()).unwrap();
        let pipe = handle.pipe();

        let a = pipe.collect().unwrap();
        let b = pipe.collect().unwrap();
        assert!(!Arc::ptr_eq(&a.buffers, &b.buffers));

        let c = pipe.collect().unwrap();
        assert!(Arc::ptr_eq(&a.buffers, &c.buffers));

        handle.join();
    }

    #[test]
    fn movement_advances_between_frames() {
        let handle = Engine::start(test_config()).unwrap();
        let id = handle.add_object(triangle_object());
        handle.run(move |engine| {
            let time = engine.time_ms();
            let object = engine.object_mut(id).unwrap();
            object.start_movement(
                Arc::new(LinearMovement {
                    velocity: Vec3::new(100.0, 0.0, 0.0),
                }),
                time,
                0,
            );
        });
        let pipe = handle.pipe();

        let first = loop {
            let frame = pipe.collect().unwrap();
            if !frame.records.is_empty() {
                break frame;
            }
        };
        let x0 = first.records[0].model.w_axis.x;
        let t0 = first.time_ms;
        drop(first);

        // The queued frame may predate the movement; keep collecting until
        // the object has visibly moved.
        let mut moved = false;
        for _ in 0..100 {
            std::thread::sleep(Duration::from_millis(10));
            let frame = pipe.collect().unwrap();
            assert!(frame.time_ms >= t0);
            if frame.records[0].model.w_axis.x > x0 {
                moved = true;
                break;
            }
        }
        assert!(moved, "object never moved past {x0}");

        handle.join();
    }

    #[test]
    fn removed_objects_skip_packing_and_flush_compacts() {
        let handle = Engine::start(test_config()).unwrap();
        let id = handle.add_object(triangle_object());
        handle.add_object(triangle_object());
        let pipe = handle.pipe();

        let frame = loop {
            let frame = pipe.collect().unwrap();
            if frame.records.len() == 2 {
                break frame;
            }
        };
        drop(frame);

        handle.remove_object(id);
        let frame = loop {
            let frame = pipe.collect().unwrap();
            if frame.records.len() == 1 {
                break frame;
            }
        };
        // Soft-deleted: still occupying its arena slot.
        drop(frame);
        let (count_tx, count_rx) = crossbeam_channel::bounded(1);
        handle.run(move |engine| {
            let _ = count_tx.send(engine.object_count());
        });
        pipe.collect();
        assert_eq!(count_rx.recv().unwrap(), 2);

        handle.flush_deleted();
        let (count_tx, count_rx) = crossbeam_channel::bounded(1);
        handle.run(move |engine| {
            let _ = count_tx.send(engine.object_count());
        });
        loop {
            pipe.collect();
            if let Ok(count) = count_rx.try_recv() {
                assert_eq!(count, 1);
                break;
            }
        }

        handle.join();
    }

    #[test]
    fn object_without_material_is_skipped() {
        let mesh = MeshData::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2],
            None,
            vec![],
            vec![],
        )
        .unwrap();
        let handle = Engine::start(test_config()).unwrap();
        handle.add_object(SceneObject::new(mesh));
        handle.add_object(triangle_object());
        let pipe = handle.pipe();

        let frame = loop {
            let frame = pipe.collect().unwrap();
            if !frame.records.is_empty() {
                break frame;
            }
        };
        assert_eq!(frame.records.len(), 1);
        drop(frame);

        handle.join();
    }

    #[test]
    fn light_and_view_are_snapshotted() {
        let handle = Engine::start(test_config()).unwrap();
        let light = Light {
            vector: Vec3::new(0.0, 0.0, 1.0),
            color: Vec3::new(1.0, 0.0, 0.0),
        };
        handle.set_light(light);
        handle.set_view(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
        let pipe = handle.pipe();

        let frame = loop {
            let frame = pipe.collect().unwrap();
            if frame.light.color.x == 1.0 && frame.light.color.y == 0.0 {
                break frame;
            }
        };
        assert_eq!(frame.light.vector, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(frame.view.w_axis.z, -5.0);
        drop(frame);

        handle.join();
    }

    #[test]
    fn end_unblocks_a_blocked_publisher() {
        let handle = Engine::start(test_config()).unwrap();
        // Never collect; the simulation blocks inside its first publish.
        std::thread::sleep(Duration::from_millis(30));
        handle.join();
    }
}
