//! # World Module
//!
//! This module provides the `WorldGenerator`, which decides when chunks get generated and
//! relit, and queues that work on the [`TaskManager`].
//!
//! ## Generation State
//!
//! Each chunk id moves through `Unrequested → InFlight → Done`. The first
//! [`WorldGenerator::check_generation`] for a chunk queues its generation task and marks it
//! in flight; the task marks it done after writing the chunk's blocks. `cancel()` drops
//! every queued generation task and moves in-flight chunks back to `Unrequested` so a later
//! check can retry them. `Done` is never undone.
//!
//! ## Ordering
//!
//! Generation runs in the Normal lane and lighting in the Post lane, so a chunk's
//! generation normally completes before its lighting pass. This is not a causal guarantee
//! across chunks: a chunk can be relit before its neighbour has been generated, leaving its
//! edge slightly under-occluded until the next lighting pass for it runs. Finished
//! generations are collected in a second feed; [`WorldGenerator::queue_neighbour_lighting`]
//! drains it and relights every generated chunk close enough to have been affected.
//!
//! ## Update Feed
//!
//! Every generation and lighting pass records its chunk in an update feed. The engine
//! drains the feed and asks loaded chunk handles to resync.

use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::core::StResource;
use crate::engine_state::task_management::{task::Lane, TaskManager};

use super::block_store::BlockStore;
use super::chunk::ChunkId;
use super::generation::ChunkGenerator;
use super::lighting;
use super::tasks::chunk_generation_task::{ChunkGenerationTask, ChunkLightingTask};

/// Where a chunk is in its generation life.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GenerationState {
    /// Never requested, or requested and then canceled.
    Unrequested,
    /// A generation task is queued or running.
    InFlight,
    /// The chunk's blocks have been written.
    Done,
}

/// Generation state of every chunk ever requested, plus the feed of recently updated chunks.
#[derive(Debug, Default)]
pub struct GenerationRecord {
    states: HashMap<ChunkId, GenerationState>,
    updated: Vec<ChunkId>,
    generated: Vec<ChunkId>,
}

impl GenerationRecord {
    /// State of a chunk. Chunks never seen are `Unrequested`.
    pub fn state(&self, chunk: ChunkId) -> GenerationState {
        self.states
            .get(&chunk)
            .copied()
            .unwrap_or(GenerationState::Unrequested)
    }

    /// Sets the state of a chunk.
    pub fn set(&mut self, chunk: ChunkId, state: GenerationState) {
        self.states.insert(chunk, state);
    }

    /// Moves every in-flight chunk back to `Unrequested`, returning how many moved.
    pub fn reset_in_flight(&mut self) -> usize {
        let mut reset = 0;
        for state in self.states.values_mut() {
            if *state == GenerationState::InFlight {
                *state = GenerationState::Unrequested;
                reset += 1;
            }
        }
        reset
    }

    /// Number of chunks in `state`.
    pub fn count(&self, state: GenerationState) -> usize {
        self.states.values().filter(|value| **value == state).count()
    }

    /// Records that a chunk's blocks changed.
    pub fn mark_updated(&mut self, chunk: ChunkId) {
        if !self.updated.contains(&chunk) {
            self.updated.push(chunk);
        }
    }

    /// Drains the update feed, oldest first.
    pub fn take_updated(&mut self) -> Vec<ChunkId> {
        std::mem::take(&mut self.updated)
    }

    /// Returns `true` if the update feed is not empty.
    pub fn has_updates(&self) -> bool {
        !self.updated.is_empty()
    }

    /// Records that a chunk's generation finished.
    pub fn mark_generated(&mut self, chunk: ChunkId) {
        self.generated.push(chunk);
    }

    /// Drains the chunks generated since the last call.
    pub fn take_generated(&mut self) -> Vec<ChunkId> {
        std::mem::take(&mut self.generated)
    }
}

/// Schedules and performs chunk generation and lighting.
///
/// Cloning yields another handle to the same record, store and scheduler.
#[derive(Clone)]
pub struct WorldGenerator {
    store: StResource<BlockStore>,
    task_manager: TaskManager,
    generator: Rc<ChunkGenerator>,
    record: StResource<GenerationRecord>,
    lighting_radius: i32,
}

impl WorldGenerator {
    /// Creates a world generator writing into `store` and queueing on `task_manager`.
    ///
    /// # Arguments
    /// * `store` - The block store generation writes into
    /// * `task_manager` - The scheduler generation and lighting tasks run on
    /// * `generator` - The rule set applied to each chunk
    /// * `lighting_radius` - Half-width of the neighbourhood sampled by lighting passes
    pub fn new(
        store: StResource<BlockStore>,
        task_manager: TaskManager,
        generator: ChunkGenerator,
        lighting_radius: i32,
    ) -> Self {
        WorldGenerator {
            store,
            task_manager,
            generator: Rc::new(generator),
            record: StResource::new(GenerationRecord::default()),
            lighting_radius,
        }
    }

    /// Requests generation of chunk `(cx, cz)`.
    ///
    /// An unrequested chunk gets a generation task (Normal lane) and is marked in flight.
    /// Every call also queues a lighting pass (Post lane) for the chunk.
    ///
    /// # Returns
    /// `true` if the chunk's blocks are already generated.
    pub fn check_generation(&self, cx: i32, cz: i32) -> bool {
        let chunk = ChunkId::new(cx, cz);
        let id = chunk.to_string();
        let state = self.record.get().state(chunk);

        if state == GenerationState::Unrequested {
            self.record.get_mut().set(chunk, GenerationState::InFlight);
            debug!("Queueing generation of chunk {}", chunk);
            self.task_manager.add(
                ChunkGenerationTask::new(
                    chunk,
                    self.store.clone(),
                    self.generator.clone(),
                    self.record.clone(),
                ),
                &["world", "generate", id.as_str()],
                Lane::Normal,
                true,
            );
        }

        self.queue_lighting(chunk, false);

        state == GenerationState::Done
    }

    fn queue_lighting(&self, chunk: ChunkId, replace: bool) {
        let id = chunk.to_string();
        self.task_manager.add(
            ChunkLightingTask::new(
                chunk,
                self.store.clone(),
                self.record.clone(),
                self.lighting_radius,
            ),
            &["world", "generate", "shading", id.as_str()],
            Lane::Post,
            replace,
        );
    }

    /// Queues a lighting pass (Post lane) for every generated chunk near a chunk whose
    /// generation finished since the last call.
    ///
    /// A chunk is near enough when blocks written by the new chunk's structures can fall
    /// within the lighting radius of its blocks. Already queued passes for the same chunk
    /// are replaced rather than duplicated.
    ///
    /// # Returns
    /// The number of chunks queued for relighting.
    pub fn queue_neighbour_lighting(&self) -> usize {
        let generated = self.record.get_mut().take_generated();
        if generated.is_empty() {
            return 0;
        }

        let chunk_size = self.store.get().chunk_size();
        let reach = self.generator.reach() + self.lighting_radius;
        let ring = (reach + chunk_size - 1) / chunk_size;

        let mut relit = BTreeSet::new();
        {
            let record = self.record.get();
            for chunk in &generated {
                for dz in -ring..=ring {
                    for dx in -ring..=ring {
                        let neighbour = ChunkId::new(chunk.cx + dx, chunk.cz + dz);
                        if neighbour != *chunk && record.state(neighbour) == GenerationState::Done {
                            relit.insert(neighbour);
                        }
                    }
                }
            }
        }

        for neighbour in &relit {
            self.queue_lighting(*neighbour, true);
        }
        if !relit.is_empty() {
            debug!("Queued relighting of {} chunks next to {} new ones", relit.len(), generated.len());
        }
        relit.len()
    }

    /// Generation state of chunk `(cx, cz)`.
    pub fn generation_state(&self, cx: i32, cz: i32) -> GenerationState {
        self.record.get().state(ChunkId::new(cx, cz))
    }

    /// Drops every queued generation and lighting task and returns in-flight chunks to
    /// `Unrequested`.
    ///
    /// # Returns
    /// The number of queued tasks removed.
    pub fn cancel(&self) -> usize {
        let flushed = self.task_manager.flush(&["world", "generate"]);
        let reset = self.record.get_mut().reset_in_flight();
        info!("Canceled world generation: {} tasks flushed, {} chunks reset", flushed, reset);
        flushed
    }

    /// Applies every rule to chunk `(cx, cz)` immediately, bypassing the scheduler.
    ///
    /// Marks the chunk done and updated. Returns the number of blocks written.
    pub fn generate_with_rules(&self, cx: i32, cz: i32) -> usize {
        let chunk = ChunkId::new(cx, cz);
        let placed = self.generator.generate(&mut self.store.get_mut(), chunk);
        let mut record = self.record.get_mut();
        record.set(chunk, GenerationState::Done);
        record.mark_updated(chunk);
        record.mark_generated(chunk);
        placed
    }

    /// Relights chunk `(cx, cz)` immediately, bypassing the scheduler.
    ///
    /// Returns the number of blocks whose lightness changed. Only a pass that changed
    /// something is recorded in the update feed.
    pub fn update_chunk_lighting(&self, cx: i32, cz: i32) -> usize {
        let changed =
            lighting::update_chunk_lighting(&mut self.store.get_mut(), cx, cz, self.lighting_radius);
        if changed > 0 {
            self.record.get_mut().mark_updated(ChunkId::new(cx, cz));
        }
        changed
    }

    /// Drains the feed of chunks generated or relit since the last call.
    pub fn take_updated_chunks(&self) -> Vec<ChunkId> {
        self.record.get_mut().take_updated()
    }

    /// Returns `true` if chunks were generated or relit since the feed was last drained.
    pub fn needs_update(&self) -> bool {
        self.record.get().has_updates()
    }

    /// Number of chunks whose generation completed.
    pub fn generated_count(&self) -> usize {
        self.record.get().count(GenerationState::Done)
    }

    /// The store generation writes into.
    pub fn store(&self) -> &StResource<BlockStore> {
        &self.store
    }

    /// The scheduler generation runs on.
    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }
}
