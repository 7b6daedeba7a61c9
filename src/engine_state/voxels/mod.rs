//! # Voxel World Core
//!
//! This module contains the voxel world itself: its storage, its generation and the chunk
//! handles through which a renderer reads it.
//!
//! ## Architecture
//!
//! The voxel system is organized into several key components, leaf-first:
//!
//! * **NoiseSource**: Seeded randomness and coherent noise
//! * **Block**: Block types, their attributes and individual voxels
//! * **BlockStore**: The one sparse map of every block, with spatial queries
//! * **Generation**: Rules describing what to place, and the generator applying them
//! * **Lighting**: Ambient occlusion pass over a chunk
//! * **World**: Per-chunk generation state, scheduling generation and lighting
//! * **Chunk**: Chunk identities, attribute buffers and the handle pool
//! * **Tasks**: Task runners queued on the scheduler
//!
//! ## Data Flow
//!
//! 1. A chunk handle is loaded for `(cx, cz)` and asks the world generator for the chunk
//! 2. The generator queues generation (Normal lane) and lighting (Post lane)
//! 3. Generation and lighting write into the block store and record the chunk as updated
//! 4. The engine turns updates into sync tasks (Reversed lane) for loaded handles
//! 5. Each sync rewrites the handle's buffer from the store
//!
//! ## Mutation
//!
//! The block store is the only shared mutable world state. Everything that writes to it
//! runs as a scheduler task, and the scheduler runs one task at a time, so the store needs
//! no locking.

pub mod block;
pub mod block_store;
pub mod chunk;
pub mod generation;
pub mod lighting;
pub mod noise_source;
pub mod tasks;
pub mod world;
