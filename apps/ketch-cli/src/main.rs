mod demo;

use clap::{Parser, Subcommand};
use glam::Mat4;
use tracing_subscriber::EnvFilter;

use ketch_common::EngineConfig;
use ketch_engine::Engine;
use ketch_render::{ConsumeStatus, FrameConsumer, RecordingBackend};

#[derive(Parser)]
#[command(name = "ketch-cli", about = "Headless driver for the ketch engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine configuration defaults
    Info,
    /// Simulate and consume frames without a GPU
    Run {
        /// Number of frames to consume
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Number of cubes to spawn
        #[arg(short, long, default_value = "4")]
        objects: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            let config = EngineConfig::default();
            println!("ketch-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("vbo capacity:   {} floats", config.vbo_capacity);
            println!("ibo capacity:   {} indices", config.ibo_capacity);
            println!("max objects:    {}", config.max_objects);
            println!("frame interval: {:?}", config.frame_interval);
        }
        Commands::Run { frames, objects } => {
            tracing::info!(frames, objects, "running headless");
            let handle = Engine::start(EngineConfig::default())?;
            demo::populate(&handle, objects);
            let pipe = handle.pipe();

            let mut backend = RecordingBackend::new();
            let mut consumer = FrameConsumer::new(Mat4::IDENTITY);

            let mut consumed = 0u64;
            while consumed < frames {
                match consumer.consume(&pipe, &mut backend)? {
                    ConsumeStatus::Frame => consumed += 1,
                    ConsumeStatus::Shutdown => break,
                }
            }

            println!("frames consumed:  {consumed}");
            println!("draws last frame: {}", backend.draw_count());
            println!("programs linked:  {}", backend.links);
            println!("vertex floats:    {}", backend.vertices.len());
            println!("indices:          {}", backend.indices.len());

            handle.join();
        }
    }

    Ok(())
}
