//! Particle Capture CLI
//!
//! Runs one acquisition session and polls it the way a preview window
//! would, logging the status line once per second.

use clap::Parser;
use particle_capture::{
    capture::{FileConfig, FrameSource, SimulatedCamera},
    metrics::{MetricsRegistry, MetricsSnapshot},
    pipeline::{self, AcquisitionState, PipelineError, RunSession},
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Command-line arguments. Flags override values from the config file.
#[derive(Debug, Parser)]
#[command(name = "particle-capture", version, about = "Acquire and save camera frames")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parent directory for session folders.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target persisted frames per second.
    #[arg(long)]
    save_rate: Option<f64>,

    /// Preview polling rate in Hz.
    #[arg(long)]
    preview_fps: Option<u32>,

    /// Fixed camera gain.
    #[arg(long)]
    gain: Option<f64>,

    /// Retrieval timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use the simulated camera even when a real backend is built in.
    #[arg(long)]
    simulate: bool,

    /// Frame rate of the simulated camera.
    #[arg(long)]
    sim_fps: Option<f64>,

    /// Stop after this many seconds.
    #[arg(short, long)]
    duration: Option<f64>,

    /// Print Prometheus metrics when the session ends.
    #[arg(long)]
    metrics: bool,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Particle Capture v{}", particle_capture::VERSION);

    match run(&args) {
        Ok(AcquisitionState::Failed) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Could not start acquisition");
            eprintln!("Failed to start acquisition: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<FileConfig, PipelineError> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    if let Some(output) = &args.output {
        config.storage.base_dir = output.clone();
    }
    if let Some(rate) = args.save_rate {
        config.pipeline.save_rate = rate;
    }
    if let Some(fps) = args.preview_fps {
        config.pipeline.preview_fps = fps;
    }
    if let Some(gain) = args.gain {
        config.capture.gain = gain;
    }
    if let Some(timeout) = args.timeout_ms {
        config.capture.retrieve_timeout_ms = timeout;
    }
    if let Some(fps) = args.sim_fps {
        config.simulation.fps = fps;
    }

    config.validate()?;
    Ok(config)
}

fn simulated(config: &FileConfig) -> Box<dyn FrameSource + Send> {
    Box::new(SimulatedCamera::new(config.simulation.clone()))
}

#[cfg(feature = "camera")]
fn select_source(args: &Args, config: &FileConfig) -> Box<dyn FrameSource + Send> {
    if args.simulate {
        simulated(config)
    } else {
        Box::new(particle_capture::capture::NativeCamera::new())
    }
}

#[cfg(not(feature = "camera"))]
fn select_source(args: &Args, config: &FileConfig) -> Box<dyn FrameSource + Send> {
    if !args.simulate {
        warn!("Built without the `camera` feature, using the simulated camera");
    }
    simulated(config)
}

fn run(args: &Args) -> Result<AcquisitionState, PipelineError> {
    let config = load_config(args)?;

    let session = RunSession::create(&config.storage.base_dir)?;
    info!(images = %session.images_dir().display(), "Images will be saved here");

    let source = select_source(args, &config);
    let (mut handle, monitor) = pipeline::start(source, &config, &session)?;

    let stop = handle.stop_signal();
    if let Err(e) = ctrlc::set_handler(move || stop.request()) {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut last_report = Instant::now();

    loop {
        let tick = monitor.poll();
        if let Some(frame) = &tick.frame {
            debug!(sequence = frame.sequence(), "Preview frame");
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            info!("{}", tick.status_line);
            last_report = Instant::now();
        }
        if tick.state.is_terminal() || handle.is_finished() {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            monitor.stop();
        }
        std::thread::sleep(monitor.interval());
    }

    let state = handle.stop();
    let final_tick = monitor.poll();
    info!(
        state = %state,
        saved = final_tick.saved,
        retrieved = monitor.status().retrieved_count(),
        "{}",
        final_tick.status_line
    );

    if args.metrics {
        match MetricsRegistry::new() {
            Ok(registry) => {
                registry.update(&MetricsSnapshot::from_status(
                    monitor.status(),
                    monitor.pending(),
                ));
                match registry.encode() {
                    Ok(text) => println!("{}", text),
                    Err(e) => warn!(error = %e, "Failed to encode metrics"),
                }
            }
            Err(e) => warn!(error = %e, "Failed to create metrics registry"),
        }
    }

    Ok(state)
}
