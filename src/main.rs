//! CLI entry point for rover-link.
//!
//! Wires the full pipeline together: mock producers feeding the timestep
//! ring, the episode scheduler, and the TCP trainer client. A trainer must be
//! listening at the configured address; everything on the robot side is
//! self-contained.
//!
//! # Usage
//!
//! Run one trial against the configured trainer:
//! ```bash
//! rover-link run
//! ```
//!
//! With a different config overlay and trainer:
//! ```bash
//! rover-link run --config field --trainer 10.0.0.5:7777
//! ```

// Use mimalloc for improved allocation performance under many small
// per-sample allocations from concurrent producer tasks.
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rover_link::buffer::TimestepRingBuffer;
use rover_link::config::Settings;
use rover_link::metrics::PipelineMetrics;
use rover_link::policy::{RandomActionSelector, TiltMonitor};
use rover_link::producer::mock::{
    MockBatteryMonitor, MockCamera, MockMicrophone, MockOrientationSensor, MockWheelEncoder,
};
use rover_link::producer::{GrantAll, Producer, ProducerLifecycle};
use rover_link::scheduler::{EpisodeScheduler, SchedulerConfig};
use rover_link::serializer::EpisodeSerializer;
use rover_link::storage::FsModelStore;
use rover_link::transport::{TrainerClient, TrainerEndpoint};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rover-link")]
#[command(about = "Timestep aggregation and episode transport for remote training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one trial: collect episodes and exchange them with the trainer
    Run {
        /// Config overlay name under config/ (without extension)
        #[arg(long)]
        config: Option<String>,

        /// Trainer address override, host:port
        #[arg(long)]
        trainer: Option<String>,

        /// Episode count override
        #[arg(long)]
        episodes: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            trainer,
            episodes,
        } => run_trial(config.as_deref(), trainer, episodes).await,
    }
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_trial(
    config_name: Option<&str>,
    trainer_override: Option<String>,
    episodes_override: Option<u32>,
) -> Result<()> {
    let mut settings = Settings::new(config_name)?;
    if let Some(addr) = trainer_override {
        settings.trainer.addr = addr;
    }
    if let Some(episodes) = episodes_override {
        settings.pipeline.max_episodes = episodes;
    }
    settings.validate()?;
    init_tracing(&settings.log_level);

    let metrics = Arc::new(PipelineMetrics::default());
    let ring = Arc::new(TimestepRingBuffer::new(settings.pipeline.ring_slots)?);

    let mut lifecycle =
        ProducerLifecycle::new(settings.pipeline.permission_timeout, Arc::clone(&metrics));
    for producer in enabled_producers(&settings, &ring) {
        lifecycle.register(producer)?;
    }

    let (client, handle) = TrainerClient::new(TrainerEndpoint {
        addr: settings.trainer.addr.clone(),
        connect_timeout: settings.trainer.connect_timeout,
        response_timeout: settings.trainer.response_timeout,
        max_header_bytes: settings.trainer.max_header_bytes,
        max_payload_bytes: settings.trainer.max_payload_bytes,
    });
    tokio::spawn(client.run());

    let mut scheduler = EpisodeScheduler::new(
        SchedulerConfig {
            tick_interval: settings.pipeline.tick_interval,
            max_timesteps: settings.pipeline.max_timesteps,
            max_episodes: settings.pipeline.max_episodes,
        },
        ring,
        EpisodeSerializer::new(),
        lifecycle,
        Arc::new(handle),
        Box::new(RandomActionSelector::default()),
        Some(Box::new(TiltMonitor::new(1.2))),
        Arc::new(FsModelStore::new(settings.storage.model_dir.clone())),
        Arc::clone(&metrics),
    );

    let summary = scheduler.run_trial(&GrantAll).await?;
    let counters = metrics.snapshot();
    info!(
        trial_id = %summary.trial_id,
        episodes_sent = summary.episodes_sent,
        episodes_dropped = summary.episodes_dropped,
        timesteps = summary.timesteps_recorded,
        blobs_saved = counters.model_blobs_saved,
        permission_denials = counters.permission_denials,
        "trial complete"
    );
    Ok(())
}

fn enabled_producers(
    settings: &Settings,
    ring: &Arc<TimestepRingBuffer>,
) -> Vec<Arc<dyn Producer>> {
    let sensor = settings.producers.sensor_interval;
    let mut producers: Vec<Arc<dyn Producer>> = Vec::new();
    if settings.producers.wheel_encoder {
        producers.push(Arc::new(MockWheelEncoder::new(Arc::clone(ring), sensor)));
    }
    if settings.producers.orientation_sensor {
        producers.push(Arc::new(MockOrientationSensor::new(
            Arc::clone(ring),
            sensor,
        )));
    }
    if settings.producers.battery_monitor {
        producers.push(Arc::new(MockBatteryMonitor::new(Arc::clone(ring), sensor)));
    }
    if settings.producers.microphone {
        producers.push(Arc::new(MockMicrophone::new(Arc::clone(ring), sensor)));
    }
    if settings.producers.camera {
        producers.push(Arc::new(MockCamera::new(
            Arc::clone(ring),
            settings.producers.camera_interval,
        )));
    }
    producers
}
