//! # Chunk Generation Tasks
//!
//! Runners queued by the [`WorldGenerator`](crate::engine_state::voxels::world::WorldGenerator):
//! one generates a chunk's blocks, the other recomputes its lighting.

use log::{info, warn};
use std::rc::Rc;

use crate::{
    core::StResource,
    engine_state::{
        task_management::task::{Done, TaskRunner},
        voxels::{
            block_store::BlockStore,
            chunk::ChunkId,
            generation::ChunkGenerator,
            lighting,
            world::{GenerationRecord, GenerationState},
        },
    },
};

/// A task that writes a chunk's blocks by applying the generation rules.
///
/// Besides the chunk itself, chunks within the generator's reach that hold blocks still
/// needing a sync are recorded as updated, since structures may overhang the chunk border.
///
/// The task only runs for a chunk that is still in flight. If the chunk was canceled (or
/// already generated) after the task was queued, it logs a warning and does nothing.
pub struct ChunkGenerationTask {
    /// The chunk to generate
    chunk: ChunkId,
    /// The store the chunk's blocks are written into
    store: StResource<BlockStore>,
    /// The rules applied
    generator: Rc<ChunkGenerator>,
    /// Generation state, flipped to done on completion
    record: StResource<GenerationRecord>,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `chunk` - The chunk to generate
    /// * `store` - The block store to write into
    /// * `generator` - The rule set to apply
    /// * `record` - The generation record to update
    pub fn new(
        chunk: ChunkId,
        store: StResource<BlockStore>,
        generator: Rc<ChunkGenerator>,
        record: StResource<GenerationRecord>,
    ) -> Self {
        ChunkGenerationTask {
            chunk,
            store,
            generator,
            record,
        }
    }
}

impl TaskRunner for ChunkGenerationTask {
    fn run(self: Box<Self>, done: Done) {
        let state = self.record.get().state(self.chunk);
        if state != GenerationState::InFlight {
            warn!(
                "Skipping generation of chunk {}: expected in flight, found {:?}",
                self.chunk, state
            );
            return;
        }

        let placed = self.generator.generate(&mut self.store.get_mut(), self.chunk);

        let mut record = self.record.get_mut();
        record.set(self.chunk, GenerationState::Done);
        record.mark_updated(self.chunk);
        record.mark_generated(self.chunk);

        // Structures rooted near the border reach into nearby chunks
        let store = self.store.get();
        let chunk_size = store.chunk_size();
        let ring = (self.generator.reach() + chunk_size - 1) / chunk_size;
        for dz in -ring..=ring {
            for dx in -ring..=ring {
                let neighbour = ChunkId::new(self.chunk.cx + dx, self.chunk.cz + dz);
                if neighbour != self.chunk
                    && store.count_blocks_need_update(neighbour.cx, neighbour.cz) > 0
                {
                    record.mark_updated(neighbour);
                }
            }
        }
        info!("Chunk {} generated ({} blocks)", self.chunk, placed);

        done.finish();
    }
}

/// A task that recomputes lighting for every block of a chunk.
pub struct ChunkLightingTask {
    chunk: ChunkId,
    store: StResource<BlockStore>,
    record: StResource<GenerationRecord>,
    radius: i32,
}

impl ChunkLightingTask {
    /// Creates a lighting task sampling neighbours within `radius`.
    pub fn new(
        chunk: ChunkId,
        store: StResource<BlockStore>,
        record: StResource<GenerationRecord>,
        radius: i32,
    ) -> Self {
        ChunkLightingTask {
            chunk,
            store,
            record,
            radius,
        }
    }
}

impl TaskRunner for ChunkLightingTask {
    fn run(self: Box<Self>, done: Done) {
        let changed = lighting::update_chunk_lighting(
            &mut self.store.get_mut(),
            self.chunk.cx,
            self.chunk.cz,
            self.radius,
        );
        if changed > 0 {
            self.record.get_mut().mark_updated(self.chunk);
        }
        done.finish();
    }
}
