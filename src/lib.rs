#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World Engine
//!
//! The core of a procedurally generated voxel landscape streamed around a moving viewpoint.
//!
//! This crate holds everything beneath the visuals: a sparse voxel store with elevation and
//! occupancy queries, a bounded pool of chunk handles, a cooperative priority-lane
//! scheduler that serializes every world mutation, and a rule-driven generator that fills
//! chunks deterministically from seeded noise. Rendering, input and cameras live outside
//! and talk to the core through chunk attribute buffers, block queries and a per-frame
//! `update()` call.
//!
//! ## Key Modules
//!
//! * `core` - Shared single-threaded resource handles
//! * `engine_state` - The top-level owner, configuration, scheduler and voxel world
//!
//! ## Usage
//!
//! ```rust
//! use voxel_world_engine::engine_state::{config::EngineConfig, EngineState};
//! use web_time::Duration;
//!
//! let mut engine_state = EngineState::new(EngineConfig::default()).unwrap();
//! engine_state.set_viewpoint(0.0, 0.0);
//! engine_state.update(Duration::from_millis(16));
//! ```
//!
//! The `voxel-world-engine` binary runs a headless walk through the world via [`run`].

use log::{error, info};
use std::process::ExitCode;
use web_time::{Duration, Instant};

use engine_state::{
    config::{ConfigError, EngineConfig},
    EngineState,
};

pub mod core;
pub mod engine_state;

/// Frames simulated by the headless walk.
const SIMULATED_FRAMES: usize = 600;
/// Host frame time of the headless walk.
const FRAME_TIME: Duration = Duration::from_millis(16);
/// Blocks the viewpoint advances per frame.
const WALK_SPEED: f64 = 0.25;

/// Runs a headless walk through the world and logs what the core did.
///
/// Reads an optional JSON configuration path from the first command-line argument.
/// Logging is configured through `RUST_LOG`.
pub fn run() -> ExitCode {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    match simulate(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn simulate(config_path: Option<String>) -> Result<(), ConfigError> {
    let config = match config_path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            EngineConfig::from_path(path)?
        }
        None => EngineConfig::default(),
    };

    let mut engine_state = EngineState::new(config)?;
    let started = Instant::now();
    let mut tasks_taken = 0;

    for frame in 0..SIMULATED_FRAMES {
        let x = frame as f64 * WALK_SPEED;
        engine_state.set_viewpoint(x, 0.0);
        tasks_taken += engine_state.update(FRAME_TIME);
    }
    tasks_taken += engine_state.run_until_idle(100_000);

    let x = SIMULATED_FRAMES as f64 * WALK_SPEED;
    info!(
        "Walk finished in {:?}: {} tasks run, {} chunks generated, {} loaded, {} blocks stored",
        started.elapsed(),
        tasks_taken,
        engine_state.world().generated_count(),
        engine_state.chunks().loaded_chunks().len(),
        engine_state.store().get().len()
    );
    info!(
        "Ground at the viewpoint: elevation {}, solid ground {}",
        engine_state.elevation_at(x, 0.0),
        engine_state.elevation_at_position(x, f64::from(engine_state.config().world_height), 0.0, 1.0)
    );
    Ok(())
}
