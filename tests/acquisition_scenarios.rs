//! End-to-end sessions against the simulated camera.

use particle_capture::capture::{CaptureConfig, FileConfig, SimulatedCamera, SimulationConfig};
use particle_capture::pipeline::{self, AcquisitionState, RunSession};
use std::path::Path;
use std::time::{Duration, Instant};

fn config(simulation: SimulationConfig) -> FileConfig {
    let mut config = FileConfig::default();
    config.capture = CaptureConfig {
        retrieve_timeout_ms: 50,
        ..CaptureConfig::with_dimensions(64, 48)
    };
    config.simulation = simulation;
    config
}

fn saved_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn missing_camera_reports_error_and_saves_nothing() {
    let base = tempfile::tempdir().unwrap();
    let config = config(SimulationConfig::default());
    let session = RunSession::create(base.path()).unwrap();

    let (mut handle, monitor) = pipeline::start(SimulatedCamera::absent(), &config, &session).unwrap();

    assert_eq!(handle.wait(), AcquisitionState::Failed);
    let tick = monitor.poll();
    assert!(tick.error.contains("camera device not found"));
    assert!(tick.status_line.starts_with("[!] "));
    assert_eq!(tick.saved, 0);
    assert!(tick.frame.is_none());
    assert!(saved_files(session.images_dir()).is_empty());
}

#[test]
fn hundred_frames_at_hundred_hz_saved_at_sixty() {
    let base = tempfile::tempdir().unwrap();
    let config = config(SimulationConfig {
        fps: 100.0,
        frame_limit: Some(100),
        ..Default::default()
    });
    let session = RunSession::create(base.path()).unwrap();
    let camera = SimulatedCamera::new(config.simulation.clone());
    let probe = camera.probe();

    let (mut handle, monitor) = pipeline::start(camera, &config, &session).unwrap();

    let started = Instant::now();
    let mut previewed = 0;
    while started.elapsed() < Duration::from_millis(1300) {
        // Sample occupancy before draining.
        assert!(monitor.pending() <= config.pipeline.preview_capacity);
        if monitor.poll().frame.is_some() {
            previewed += 1;
        }
        std::thread::sleep(monitor.interval());
    }

    assert_eq!(handle.stop(), AcquisitionState::Stopped);
    assert!(!probe.is_open());

    let saved = monitor.saved_count();
    assert!((55..=61).contains(&saved), "saved {} frames", saved);
    assert!(previewed > 0);

    let files = saved_files(session.images_dir());
    assert_eq!(files.len() as u64, saved);
    for (index, name) in files.iter().enumerate() {
        assert_eq!(name, &format!("frame_{:06}.jpg", index));
    }
}

#[test]
fn device_failure_stays_latched() {
    let base = tempfile::tempdir().unwrap();
    let config = config(SimulationConfig {
        fps: 200.0,
        fail_after: Some(10),
        ..Default::default()
    });
    let session = RunSession::create(base.path()).unwrap();
    let camera = SimulatedCamera::new(config.simulation.clone());
    let probe = camera.probe();

    let (mut handle, monitor) = pipeline::start(camera, &config, &session).unwrap();

    assert_eq!(handle.wait(), AcquisitionState::Failed);
    assert!(!probe.is_open());
    for _ in 0..5 {
        let tick = monitor.poll();
        assert_eq!(tick.state, AcquisitionState::Failed);
        assert!(tick.error.contains("simulated device failure"));
    }
    assert_eq!(handle.stop(), AcquisitionState::Failed);
}

#[test]
fn write_failures_do_not_stop_acquisition() {
    let base = tempfile::tempdir().unwrap();
    let config = config(SimulationConfig {
        fps: 100.0,
        ..Default::default()
    });
    let session = RunSession::create(base.path()).unwrap();
    std::fs::remove_dir_all(session.images_dir()).unwrap();

    let (mut handle, monitor) =
        pipeline::start(SimulatedCamera::new(config.simulation.clone()), &config, &session)
            .unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let tick = monitor.poll();
    assert_eq!(tick.state, AcquisitionState::Running);
    assert_eq!(tick.error, "");
    assert!(tick.status_line.contains("last write error"));
    assert!(monitor.status().write_failures() > 0);
    assert_eq!(monitor.saved_count(), 0);

    assert_eq!(handle.stop(), AcquisitionState::Stopped);
}

#[test]
fn write_failure_halts_when_configured() {
    let base = tempfile::tempdir().unwrap();
    let mut config = config(SimulationConfig {
        fps: 100.0,
        ..Default::default()
    });
    config.storage.halt_on_write_error = true;
    let session = RunSession::create(base.path()).unwrap();
    std::fs::remove_dir_all(session.images_dir()).unwrap();
    let camera = SimulatedCamera::new(config.simulation.clone());
    let probe = camera.probe();

    let (mut handle, monitor) = pipeline::start(camera, &config, &session).unwrap();

    assert_eq!(handle.wait(), AcquisitionState::Failed);
    assert!(monitor.error_text().contains("failed to write"));
    assert!(!probe.is_open());
}

#[test]
fn invalid_config_rejected_before_spawn() {
    let base = tempfile::tempdir().unwrap();
    let mut config = config(SimulationConfig::default());
    config.pipeline.save_rate = -1.0;
    let session = RunSession::create(base.path()).unwrap();

    let result = pipeline::start(SimulatedCamera::default(), &config, &session);
    assert!(matches!(result, Err(pipeline::PipelineError::Config(_))));
}
