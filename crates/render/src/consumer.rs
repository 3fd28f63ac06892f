use std::time::Instant;

use glam::Mat4;
use tracing::{info, warn};

use ketch_engine::{FramePipe, RenderData};

use crate::backend::{DrawCall, RenderBackend};
use crate::program::ProgramCache;
use crate::RenderError;

/// Outcome of consuming one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStatus {
    /// A frame was uploaded and drawn.
    Frame,
    /// The pipe is shut down; no more frames will arrive.
    Shutdown,
}

const FPS_LOG_WINDOW: u64 = 120;

/// Drives a [`RenderBackend`] from the engine's frame pipe.
///
/// Owns the projection matrix (an output concern, so it lives on this side of
/// the pipe) and the program cache. One `consume` call handles exactly one
/// frame: collect, upload dirty spans, submit draws.
pub struct FrameConsumer {
    cache: ProgramCache,
    proj: Mat4,
    frames: u64,
    window_start: Instant,
}

impl FrameConsumer {
    pub fn new(proj: Mat4) -> Self {
        Self {
            cache: ProgramCache::new(),
            proj,
            frames: 0,
            window_start: Instant::now(),
        }
    }

    /// Replace the projection applied to every subsequent frame's view.
    pub fn set_projection(&mut self, proj: Mat4) {
        self.proj = proj;
    }

    /// Drop all linked programs, e.g. after a GPU context loss.
    pub fn invalidate_programs(&mut self) {
        self.cache.invalidate_all();
    }

    /// Collect one frame, blocking until the simulation publishes it.
    ///
    /// Dirty staging spans are uploaded under the staging lock and their
    /// markers cleared, then one draw is submitted per record. A draw whose
    /// program fails to link aborts the frame with the error; the markers
    /// stay cleared because the uploads already happened.
    pub fn consume<B: RenderBackend>(
        &mut self,
        pipe: &FramePipe<RenderData>,
        backend: &mut B,
    ) -> Result<ConsumeStatus, RenderError> {
        let Some(frame) = pipe.collect() else {
            info!("frame pipe shut down, consumer stopping");
            return Ok(ConsumeStatus::Shutdown);
        };

        {
            let mut buffers = frame.buffers.lock().expect("staging mutex poisoned");
            let vbo_span = buffers.vbo_range.take();
            if !vbo_span.is_empty() {
                backend
                    .upload_vertices(vbo_span.start(), &buffers.vbo[vbo_span.start()..vbo_span.end()]);
            }
            let ibo_span = buffers.ibo_range.take();
            if !ibo_span.is_empty() {
                backend
                    .upload_indices(ibo_span.start(), &buffers.ibo[ibo_span.start()..ibo_span.end()]);
            }
        }

        backend.begin_frame(self.proj * frame.view, frame.light);
        for record in &frame.records {
            let program = match self.cache.resolve(record.program, backend) {
                Ok(program) => program,
                Err(error) => {
                    warn!(%error, "aborting frame");
                    return Err(error);
                }
            };
            backend.draw(&DrawCall {
                program,
                topology: record.topology,
                index_count: record.index_count,
                vbo_offset: record.vbo_offset,
                ibo_offset: record.ibo_offset,
                model: record.model,
            });
        }
        backend.end_frame();

        self.frames += 1;
        if self.frames % FPS_LOG_WINDOW == 0 {
            let elapsed = self.window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                info!(fps = format!("{:.1}", FPS_LOG_WINDOW as f64 / elapsed), "render window");
            }
            self.window_start = Instant::now();
        }
        Ok(ConsumeStatus::Frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use glam::Vec3;
    use ketch_common::{EngineConfig, Light};
    use ketch_engine::{DrawRecord, Engine, StagingBuffers};
    use ketch_scene::{Material, MeshData, ProgramHandle, SceneObject, Topology, VertexLayout};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Publish blocks until the frame is collected, so tests feed the pipe
    /// from a helper thread and consume on their own.
    fn publish_detached(
        pipe: &Arc<FramePipe<RenderData>>,
        frame: RenderData,
    ) -> thread::JoinHandle<()> {
        let pipe = Arc::clone(pipe);
        thread::spawn(move || {
            pipe.publish(frame).unwrap();
        })
    }

    fn frame_with(records: Vec<DrawRecord>, fill: &[f32]) -> RenderData {
        let config = EngineConfig {
            vbo_capacity: 64,
            ibo_capacity: 32,
            ..EngineConfig::default()
        };
        let mut buffers = StagingBuffers::new(&config);
        buffers.vbo[..fill.len()].copy_from_slice(fill);
        buffers.vbo_range.mark(0, fill.len());
        buffers.ibo[..3].copy_from_slice(&[0, 1, 2]);
        buffers.ibo_range.mark(0, 3);
        RenderData {
            buffers: Arc::new(Mutex::new(buffers)),
            view: Mat4::IDENTITY,
            light: Light::default(),
            records,
            time_ms: 0,
        }
    }

    fn record(program: u64) -> DrawRecord {
        DrawRecord {
            program: ProgramHandle(program),
            topology: Topology::Triangles,
            index_count: 3,
            vbo_offset: 0,
            ibo_offset: 0,
            model: Mat4::IDENTITY,
        }
    }

    #[test]
    fn consume_uploads_dirty_spans_and_draws() {
        let pipe = Arc::new(FramePipe::new());
        let frame = frame_with(vec![record(1)], &[1.0, 2.0, 3.0, 4.0]);
        let buffers = Arc::clone(&frame.buffers);
        let producer = publish_detached(&pipe, frame);

        let mut consumer = FrameConsumer::new(Mat4::IDENTITY);
        let mut backend = RecordingBackend::new();
        let status = consumer.consume(&pipe, &mut backend).unwrap();
        producer.join().unwrap();

        assert_eq!(status, ConsumeStatus::Frame);
        assert_eq!(&backend.vertices[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&backend.indices[..3], &[0, 1, 2]);
        assert_eq!(backend.draws.len(), 1);
        assert_eq!(backend.frames_ended, 1);

        // Markers cleared under the lock.
        let buffers = buffers.lock().unwrap();
        assert!(buffers.vbo_range.is_empty());
        assert!(buffers.ibo_range.is_empty());
    }

    #[test]
    fn clean_spans_upload_nothing() {
        let pipe = Arc::new(FramePipe::new());
        let frame = frame_with(vec![record(1)], &[1.0]);
        {
            let mut buffers = frame.buffers.lock().unwrap();
            buffers.vbo_range.clear();
            buffers.ibo_range.clear();
        }
        let producer = publish_detached(&pipe, frame);

        let mut consumer = FrameConsumer::new(Mat4::IDENTITY);
        let mut backend = RecordingBackend::new();
        consumer.consume(&pipe, &mut backend).unwrap();
        producer.join().unwrap();

        assert!(backend.vertices.is_empty());
        assert!(backend.indices.is_empty());
        assert_eq!(backend.draws.len(), 1);
    }

    #[test]
    fn programs_link_once_across_frames() {
        let pipe = Arc::new(FramePipe::new());
        let mut consumer = FrameConsumer::new(Mat4::IDENTITY);
        let mut backend = RecordingBackend::new();

        for _ in 0..3 {
            let producer = publish_detached(&pipe, frame_with(vec![record(7), record(7)], &[0.0]));
            consumer.consume(&pipe, &mut backend).unwrap();
            producer.join().unwrap();
        }
        assert_eq!(backend.links, 1);
    }

    #[test]
    fn link_failure_aborts_frame() {
        let pipe = Arc::new(FramePipe::new());
        let producer = publish_detached(&pipe, frame_with(vec![record(9)], &[0.0]));

        let mut consumer = FrameConsumer::new(Mat4::IDENTITY);
        let mut backend = RecordingBackend::new();
        backend.fail_handle(ProgramHandle(9));

        let err = consumer.consume(&pipe, &mut backend).unwrap_err();
        producer.join().unwrap();
        assert!(matches!(err, RenderError::ProgramLink { .. }));
        assert_eq!(backend.frames_ended, 0);
    }

    #[test]
    fn shutdown_reported_after_drain() {
        let pipe = Arc::new(FramePipe::new());
        let producer = publish_detached(&pipe, frame_with(vec![], &[0.0]));

        let mut consumer = FrameConsumer::new(Mat4::IDENTITY);
        let mut backend = RecordingBackend::new();

        assert_eq!(
            consumer.consume(&pipe, &mut backend).unwrap(),
            ConsumeStatus::Frame
        );
        producer.join().unwrap();
        pipe.shutdown();
        assert_eq!(
            consumer.consume(&pipe, &mut backend).unwrap(),
            ConsumeStatus::Shutdown
        );
    }

    #[test]
    fn projection_multiplies_view() {
        let pipe = Arc::new(FramePipe::new());
        let mut frame = frame_with(vec![], &[0.0]);
        frame.view = Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
        let producer = publish_detached(&pipe, frame);

        let proj = Mat4::from_scale(Vec3::splat(2.0));
        let mut consumer = FrameConsumer::new(proj);
        let mut backend = RecordingBackend::new();
        consumer.consume(&pipe, &mut backend).unwrap();
        producer.join().unwrap();

        assert_eq!(backend.last_view_proj.w_axis.z, -4.0);
    }

    fn lit_triangle() -> SceneObject {
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
    fn restaged_object_leaves_static_neighbor_untouched() {
        let config = EngineConfig {
            frame_interval: Duration::from_millis(5),
            ..EngineConfig::default()
        };
        let handle = Engine::start(config).unwrap();
        handle.add_object(lit_triangle());
        let moving = handle.add_object(lit_triangle());
        let pipe = handle.pipe();

        let mut consumer = FrameConsumer::new(Mat4::IDENTITY);
        let mut backend = RecordingBackend::new();

        // Both objects pack at 18 floats each (3 verts, position + normal).
        // Consume until the full 36-float span has been uploaded, then a few
        // more frames so both staging sets settle and uploads stop.
        while backend.vertices.len() < 36 {
            consumer.consume(&pipe, &mut backend).unwrap();
        }
        for _ in 0..6 {
            consumer.consume(&pipe, &mut backend).unwrap();
        }

        // Sentinel over the first object's span; only a fresh upload covering
        // it could overwrite this.
        for v in &mut backend.vertices[..18] {
            *v = 99.0;
        }

        handle.run(move |engine| {
            let object = engine.object_mut(moving).unwrap();
            object.verts[0] = 9.0;
            object.info.geometry_dirty = 2;
        });

        let mut restaged = false;
        for _ in 0..100 {
            consumer.consume(&pipe, &mut backend).unwrap();
            if backend.vertices[18] == 9.0 {
                restaged = true;
                break;
            }
        }
        assert!(restaged, "mutated vertex never reached the backend");
        assert!(
            backend.vertices[..18].iter().all(|&v| v == 99.0),
            "static object's span was re-uploaded"
        );

        handle.join();
    }
}
