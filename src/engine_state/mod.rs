//! # Engine State Module
//!
//! The top-level owner of the voxel world core.
//!
//! ## Key Components
//!
//! * `EngineState` - Constructs every system once and drives them each frame
//! * `config` - Engine configuration and its validation
//! * `task_management` - The cooperative scheduler all world mutation runs through
//! * `voxels` - Block storage, generation and chunk handles
//!
//! ## Construction Order
//!
//! `EngineState::new` builds the systems leaf-first and hands each one the shared handles it
//! depends on: noise source, block store, scheduler, world generator, chunk lifecycle. No
//! system is a process-wide singleton; dropping the `EngineState` tears all of them down.
//!
//! ## Frame Flow
//!
//! The host calls [`EngineState::update`] once per frame with the elapsed time. The tick
//! driver converts that into scheduler ticks at the configured rate. Chunks next to newly
//! generated ones get another lighting pass, and chunks that were generated or relit during
//! those ticks get a sync queued for their handles. Viewpoint
//! movement goes through [`EngineState::set_viewpoint`], which loads the chunks around
//! the viewpoint and unloads the rest.

use cgmath::Point3;
use log::{debug, info, trace};
use std::{collections::HashSet, rc::Rc};
use web_time::Duration;

use crate::core::StResource;
use config::{ConfigError, EngineConfig};
use task_management::{driver::TickDriver, TaskManager};
use voxels::{
    block::Block,
    block_store::BlockStore,
    chunk::{
        chunk_pool::{ChunkHandle, ChunkLifecycle},
        ChunkId,
    },
    generation::ChunkGenerator,
    noise_source::NoiseSource,
    world::WorldGenerator,
};

pub mod config;
pub mod task_management;
pub mod voxels;

/// The main state container for the voxel world core.
///
/// # Examples
///
/// ```
/// use voxel_world_engine::engine_state::{config::EngineConfig, EngineState};
/// use web_time::Duration;
///
/// let config = EngineConfig { chunk_size: 4, world_height: 12, ..Default::default() };
/// let mut engine_state = EngineState::new(config).unwrap();
/// engine_state.set_viewpoint(0.0, 0.0);
///
/// // Host loop
/// for _ in 0..10 {
///     engine_state.update(Duration::from_millis(16));
/// }
/// ```
pub struct EngineState {
    /// Validated configuration the systems were built from
    config: EngineConfig,
    /// Seeded noise shared with the generator
    noise: Rc<NoiseSource>,
    /// Every block of the world
    store: StResource<BlockStore>,
    /// Scheduler for all world mutation
    task_manager: TaskManager,
    /// Generation and lighting scheduling
    world: WorldGenerator,
    /// Chunk handles and their buffers
    chunks: ChunkLifecycle,
    /// Converts frame time into scheduler ticks
    driver: TickDriver,
    /// Chunk containing the viewpoint, once one was set
    viewpoint_chunk: Option<ChunkId>,
}

impl EngineState {
    /// Creates every system from `config` and starts the scheduler.
    ///
    /// # Returns
    /// An error if `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let noise = Rc::new(NoiseSource::new(config.seed));
        let store = StResource::new(BlockStore::new(config.chunk_size, config.world_height));
        let task_manager = TaskManager::new(config.seed as u64);
        let world = WorldGenerator::new(
            store.clone(),
            task_manager.clone(),
            ChunkGenerator::with_default_rules(noise.clone()),
            config.lighting_radius,
        );
        let chunks = ChunkLifecycle::new(world.clone(), config.pool_limit, config.sync_interval());
        let driver = TickDriver::new(config.rate);

        task_manager.start();
        info!(
            "Engine state initialized (seed {}, chunk size {}, world height {}, {} ticks/s)",
            config.seed, config.chunk_size, config.world_height, config.rate
        );

        Ok(EngineState {
            config,
            noise,
            store,
            task_manager,
            world,
            chunks,
            driver,
            viewpoint_chunk: None,
        })
    }

    /// Advances the engine by `elapsed` of host time.
    ///
    /// Runs the scheduler ticks due at the configured rate, then dispatches the world's
    /// feeds (neighbour relighting, syncs for updated loaded chunks) and retries deferred
    /// syncs.
    ///
    /// # Returns
    /// The number of tasks taken from the scheduler.
    pub fn update(&mut self, elapsed: Duration) -> usize {
        let due = self.driver.advance(elapsed);
        let taken = (0..due).filter(|_| self.task_manager.tick()).count();
        trace!("Update: {} ticks due, {} tasks taken", due, taken);

        self.dispatch_world_updates();
        let retried = self.chunks.retry_pending_syncs();
        if retried > 0 {
            debug!("Retrying {} deferred chunk syncs", retried);
        }
        taken
    }

    /// Ticks until the scheduler is idle or `max_ticks` ticks ran, dispatching the world's
    /// feeds along the way. Returns the number of tasks taken.
    ///
    /// Syncs deferred by the sync interval are left pending and retried by the next
    /// [`update`](Self::update).
    pub fn run_until_idle(&mut self, max_ticks: usize) -> usize {
        let mut taken = 0;
        while taken < max_ticks {
            taken += self.task_manager.run_until_idle(max_ticks - taken);
            if self.dispatch_world_updates() == 0 {
                break;
            }
        }
        taken
    }

    fn dispatch_world_updates(&self) -> usize {
        let relit = self.world.queue_neighbour_lighting();

        let mut requested = 0;
        for chunk in self.world.take_updated_chunks() {
            if let Some(handle) = self.chunks.handle_for(chunk.cx, chunk.cz) {
                if self.chunks.request_sync(handle) {
                    requested += 1;
                }
            }
        }
        if requested > 0 {
            debug!("Requested {} chunk syncs", requested);
        }
        relit + requested
    }

    /// Loads chunk `(cx, cz)`, returning its handle.
    pub fn load_chunk(&self, cx: i32, cz: i32) -> ChunkHandle {
        self.chunks.load(cx, cz)
    }

    /// Unloads chunk `(cx, cz)`. Returns `true` if its handle was pooled.
    pub fn unload_chunk(&self, cx: i32, cz: i32) -> bool {
        self.chunks.unload_chunk(cx, cz)
    }

    /// Moves the viewpoint to world column `(x, z)`.
    ///
    /// Every chunk within `draw_chunks` of the viewpoint's chunk is loaded and marked
    /// active; loaded chunks outside that range are unloaded. Moving within the same chunk
    /// does nothing.
    pub fn set_viewpoint(&mut self, x: f64, z: f64) {
        let center = ChunkId::containing(x, z, self.config.chunk_size);
        if self.viewpoint_chunk == Some(center) {
            return;
        }
        self.viewpoint_chunk = Some(center);

        let radius = self.config.draw_chunks;
        let mut wanted = HashSet::new();
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                wanted.insert(ChunkId::new(center.cx + dx, center.cz + dz));
            }
        }

        let mut unloaded = 0;
        for chunk in self.chunks.loaded_chunks() {
            if !wanted.contains(&chunk) && self.chunks.unload_chunk(chunk.cx, chunk.cz) {
                unloaded += 1;
            }
        }

        // Nearest chunks first
        let mut ordered: Vec<_> = wanted.into_iter().collect();
        ordered.sort_by_key(|chunk| (center.distance(chunk), chunk.cx, chunk.cz));
        for chunk in &ordered {
            let handle = self.chunks.load(chunk.cx, chunk.cz);
            self.chunks.set_active(handle, true);
        }

        info!(
            "Viewpoint moved to chunk {}: {} chunks in range, {} unloaded",
            center,
            ordered.len(),
            unloaded
        );
    }

    /// The block at `(x, y, z)` after flooring, cloned out of the store.
    pub fn block_at(&self, x: f64, y: f64, z: f64) -> Option<Block> {
        self.store.get().get_block_at(x, y, z).cloned()
    }

    /// Highest occupied height of the column under `(x, z)`, or `-1`.
    pub fn elevation_at(&self, x: f64, z: f64) -> i32 {
        self.store
            .get()
            .get_elevation_at(x.floor() as i32, z.floor() as i32)
    }

    /// Highest height at or below `y` whose block is at least `min_tangibility` solid.
    pub fn elevation_at_position(&self, x: f64, y: f64, z: f64, min_tangibility: f32) -> i32 {
        self.store
            .get()
            .get_elevation_at_position(x, y, z, min_tangibility)
    }

    /// Tangibility of the block at `(x, y, z)`, or `0` for an empty cell.
    pub fn tangibility_at(&self, x: f64, y: f64, z: f64) -> f32 {
        self.store.get().get_tangibility_at_position(x, y, z)
    }

    /// Whether the block at `position` exists.
    pub fn is_occupied(&self, position: Point3<i32>) -> bool {
        self.store.get().is_occupied(position)
    }

    /// The configuration the engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared noise source.
    pub fn noise(&self) -> &NoiseSource {
        &self.noise
    }

    /// The block store.
    pub fn store(&self) -> &StResource<BlockStore> {
        &self.store
    }

    /// The scheduler.
    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    /// The world generator.
    pub fn world(&self) -> &WorldGenerator {
        &self.world
    }

    /// The chunk lifecycle manager.
    pub fn chunks(&self) -> &ChunkLifecycle {
        &self.chunks
    }

    /// The chunk containing the viewpoint.
    pub fn viewpoint_chunk(&self) -> Option<ChunkId> {
        self.viewpoint_chunk
    }
}

impl Drop for EngineState {
    fn drop(&mut self) {
        self.task_manager.stop();
        let flushed = self.task_manager.flush::<&str>(&[]);
        debug!("Engine state dropped, {} queued tasks discarded", flushed);
    }
}
