//! # Voxel Task System
//!
//! Task runners for world mutation. Each runs through the
//! [`TaskManager`](crate::engine_state::task_management::TaskManager), one at a time:
//!
//! * `ChunkGenerationTask` - writes a chunk's blocks (Normal lane)
//! * `ChunkLightingTask` - recomputes a chunk's lighting (Post lane)
//! * `ChunkSyncTask` - refreshes a chunk handle's buffer (Reversed lane)

pub mod chunk_generation_task;
pub mod chunk_sync_task;
