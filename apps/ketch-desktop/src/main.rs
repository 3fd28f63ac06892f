mod scene_setup;

use anyhow::Result;
use clap::Parser;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use ketch_common::EngineConfig;
use ketch_engine::{Engine, EngineHandle, FramePipe, RenderData};
use ketch_render::{ConsumeStatus, FrameConsumer};
use ketch_render_wgpu::{FlyCamera, WgpuBackend};

#[derive(Parser)]
#[command(name = "ketch-desktop", about = "Windowed viewer for the ketch engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Number of demo cubes to spawn
    #[arg(long, default_value = "6")]
    cubes: usize,
}

struct App {
    cubes: usize,
    handle: EngineHandle,
    pipe: Arc<FramePipe<RenderData>>,
    consumer: FrameConsumer,
    camera: FlyCamera,
    keys_held: HashSet<KeyCode>,
    mouse_captured: bool,
    last_frame: Instant,
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    backend: Option<WgpuBackend>,
}

impl App {
    fn new(cubes: usize) -> Result<Self> {
        let handle = Engine::start(EngineConfig::default())?;
        let pipe = handle.pipe();
        scene_setup::populate(&handle, cubes);

        let camera = FlyCamera::default();
        let consumer = FrameConsumer::new(camera.projection_matrix());

        Ok(Self {
            cubes,
            handle,
            pipe,
            consumer,
            camera,
            keys_held: HashSet::new(),
            mouse_captured: false,
            last_frame: Instant::now(),
            window: None,
            surface: None,
            surface_config: None,
            backend: None,
        })
    }

    fn update_camera(&mut self, dt: f32) {
        let boost = if self.keys_held.contains(&KeyCode::ShiftLeft) {
            3.0
        } else {
            1.0
        };
        let dt = dt * boost;

        if self.keys_held.contains(&KeyCode::KeyW) {
            self.camera.move_forward(dt);
        }
        if self.keys_held.contains(&KeyCode::KeyS) {
            self.camera.move_forward(-dt);
        }
        if self.keys_held.contains(&KeyCode::KeyA) {
            self.camera.move_right(-dt);
        }
        if self.keys_held.contains(&KeyCode::KeyD) {
            self.camera.move_right(dt);
        }
        if self.keys_held.contains(&KeyCode::Space) {
            self.camera.move_up(dt);
        }
        if self.keys_held.contains(&KeyCode::ControlLeft) {
            self.camera.move_up(-dt);
        }

        self.handle.set_view(self.camera.view_matrix());
        self.consumer.set_projection(self.camera.projection_matrix());
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
        }
        if !pressed {
            return;
        }

        match key {
            KeyCode::KeyP => {
                if self.handle.is_paused() {
                    self.handle.resume();
                    tracing::info!("resumed");
                } else {
                    self.handle.pause();
                    tracing::info!("paused");
                }
            }
            KeyCode::KeyN => {
                let position = self.camera.position + self.camera.forward() * 4.0;
                let id = scene_setup::spawn_cube(&self.handle, position);
                self.cubes += 1;
                tracing::info!(id = id.0, "spawned cube");
            }
            KeyCode::KeyF => {
                self.handle.flush_deleted();
                tracing::info!("flush requested");
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(0.1);
        self.last_frame = now;
        self.update_camera(dt);

        // A paused engine publishes nothing; do not block on the pipe.
        if self.handle.is_paused() {
            return;
        }

        let (Some(surface), Some(backend)) = (&self.surface, &mut self.backend) else {
            return;
        };

        let output = match surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(config) = &self.surface_config {
                    surface.configure(backend.device(), config);
                }
                return;
            }
            Err(error) => {
                tracing::error!(%error, "surface unavailable");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        backend.set_target(view);

        match self.consumer.consume(&self.pipe, backend) {
            Ok(ConsumeStatus::Frame) => output.present(),
            Ok(ConsumeStatus::Shutdown) => event_loop.exit(),
            Err(error) => tracing::error!(%error, "frame failed"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("ketch")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .expect("create surface");

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("find adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ketch_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .expect("create device");

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.camera.set_aspect(size.width, size.height);

        let mut backend = WgpuBackend::new(
            device,
            queue,
            format,
            &EngineConfig::default(),
            size.width,
            size.height,
        );
        backend.register_default_programs(scene_setup::LIT_PROGRAM, scene_setup::UNLIT_PROGRAM);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            "GPU initialized"
        );

        self.window = Some(window);
        self.surface = Some(surface);
        self.surface_config = Some(config);
        self.backend = Some(backend);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.handle.end();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let (Some(surface), Some(config), Some(backend)) = (
                    &self.surface,
                    &mut self.surface_config,
                    &mut self.backend,
                ) {
                    config.width = new_size.width.max(1);
                    config.height = new_size.height.max(1);
                    surface.configure(backend.device(), config);
                    backend.resize(config.width, config.height);
                    self.camera.set_aspect(config.width, config.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                self.handle_key(key, state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state,
                ..
            } => {
                self.mouse_captured = state == ElementState::Pressed;
                if let Some(window) = &self.window {
                    window.set_cursor_visible(!self.mouse_captured);
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.mouse_captured {
                self.camera.rotate(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("ketch-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(cli.cubes)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
