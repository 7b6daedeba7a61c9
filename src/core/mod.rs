//! # Core Module
//!
//! Shared-ownership primitives used to wire the engine's systems together.
//!
//! The engine is single-threaded by construction: the scheduler runs exactly one task at a
//! time on the thread that calls `tick()`. Systems are therefore shared through
//! [`StResource`], a reference-counted cell, instead of process-wide singletons. The
//! top-level [`EngineState`](crate::engine_state::EngineState) creates every system once
//! and hands clones of these handles to the components that need them.

pub mod st_resource;

pub use st_resource::StResource;
