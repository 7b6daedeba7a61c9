//! # Chunk Pool Module
//!
//! Bounded reuse of chunk handles and the buffers they own.
//!
//! ## Arena
//!
//! Handles are indices into a slot array plus a generation counter. Releasing a handle
//! bumps its slot's generation, so a handle kept past its release (for example inside a
//! queued task) no longer resolves to the slot once it is rebound.
//!
//! Released slots go onto a free list bounded by `pool_limit`; their buffers stay
//! allocated and are reused by the next load. A release that finds the free list full drops
//! the slot's buffer and leaves the slot vacant. Vacant slots are reused before the arena
//! grows.
//!
//! ## Lifecycle
//!
//! [`ChunkLifecycle`] binds handles to chunk coordinates, asks the
//! [`WorldGenerator`] for generation, and keeps each handle's buffer in sync with the
//! [`BlockStore`]. Syncs rewrite a whole buffer, so they are rate-limited per handle; a
//! sync that arrives too early is remembered and retried by
//! [`ChunkLifecycle::retry_pending_syncs`].

use log::{debug, warn};
use std::collections::HashMap;
use web_time::{Duration, Instant};

use crate::core::StResource;
use crate::engine_state::task_management::{task::Lane, TaskManager};
use crate::engine_state::voxels::{
    block_store::BlockStore, tasks::chunk_sync_task::ChunkSyncTask, world::WorldGenerator,
};

use super::{ChunkBuffer, ChunkId};

/// Stable reference to a pool slot, valid until the slot is released.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    index: usize,
    generation: u32,
}

impl ChunkHandle {
    /// Slot index in the arena.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Result of a sync attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The buffer was rewritten.
    Synced {
        /// Cells holding a block after the rewrite.
        occupied: usize,
    },
    /// Nothing changed since the last sync.
    Unchanged,
    /// Too soon after the previous sync; retried later.
    Deferred,
    /// The handle is released or bound to other coordinates.
    Stale,
}

#[derive(Debug)]
struct ChunkSlot {
    generation: u32,
    binding: Option<ChunkId>,
    buffer: Option<ChunkBuffer>,
    active: bool,
    needs_first_sync: bool,
    sync_pending: bool,
    last_sync: Option<Instant>,
}

impl ChunkSlot {
    fn new() -> Self {
        ChunkSlot {
            generation: 0,
            binding: None,
            buffer: None,
            active: false,
            needs_first_sync: true,
            sync_pending: false,
            last_sync: None,
        }
    }
}

/// Arena of chunk slots with a bounded free list.
#[derive(Debug)]
pub struct ChunkPool {
    slots: Vec<ChunkSlot>,
    free: Vec<usize>,
    vacant: Vec<usize>,
    loaded: HashMap<ChunkId, ChunkHandle>,
    pool_limit: usize,
    chunk_size: i32,
    world_height: i32,
    sync_interval: Duration,
}

impl ChunkPool {
    /// Creates an empty pool.
    ///
    /// # Arguments
    /// * `chunk_size` - Edge length of a chunk in blocks
    /// * `world_height` - Vertical extent of the world in blocks
    /// * `pool_limit` - Maximum number of released slots kept for reuse
    /// * `sync_interval` - Minimum time between two syncs of the same handle
    pub fn new(chunk_size: i32, world_height: i32, pool_limit: usize, sync_interval: Duration) -> Self {
        ChunkPool {
            slots: Vec::new(),
            free: Vec::new(),
            vacant: Vec::new(),
            loaded: HashMap::new(),
            pool_limit,
            chunk_size,
            world_height,
            sync_interval,
        }
    }

    /// Takes a slot for a new binding: a pooled one if available, otherwise a vacant or
    /// new one with a freshly allocated buffer.
    pub fn acquire(&mut self) -> ChunkHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = match self.vacant.pop() {
                    Some(index) => index,
                    None => {
                        self.slots.push(ChunkSlot::new());
                        self.slots.len() - 1
                    }
                };
                self.slots[index].buffer = Some(ChunkBuffer::new(self.chunk_size, self.world_height));
                index
            }
        };

        ChunkHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Binds a handle to chunk coordinates, resetting its sync state.
    ///
    /// Returns `false` for a stale handle.
    pub fn bind(&mut self, handle: ChunkHandle, chunk: ChunkId) -> bool {
        let slot = match self.slot_mut(handle) {
            Some(slot) => slot,
            None => return false,
        };
        slot.binding = Some(chunk);
        slot.needs_first_sync = true;
        slot.sync_pending = false;
        slot.last_sync = None;
        slot.active = false;
        self.loaded.insert(chunk, handle);
        true
    }

    /// Unbinds a handle and returns its slot to the pool.
    ///
    /// # Returns
    /// `true` if the slot went onto the free list, `false` if the free list was full (the
    /// buffer is dropped) or the handle was stale.
    pub fn release(&mut self, handle: ChunkHandle) -> bool {
        let pooled = self.free.len() < self.pool_limit;
        let slot = match self.slot_mut(handle) {
            Some(slot) => slot,
            None => return false,
        };

        let binding = slot.binding.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.active = false;
        slot.sync_pending = false;
        if pooled {
            if let Some(buffer) = slot.buffer.as_mut() {
                buffer.clear();
            }
        } else {
            slot.buffer = None;
        }

        if let Some(chunk) = binding {
            self.loaded.remove(&chunk);
        }
        if pooled {
            self.free.push(handle.index);
        } else {
            self.vacant.push(handle.index);
        }
        pooled
    }

    /// Returns `true` if the handle still refers to its slot.
    pub fn is_valid(&self, handle: ChunkHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// The chunk a handle is bound to.
    pub fn binding(&self, handle: ChunkHandle) -> Option<ChunkId> {
        self.slot(handle).and_then(|slot| slot.binding)
    }

    /// The handle bound to `chunk`, if loaded.
    pub fn handle_for(&self, chunk: ChunkId) -> Option<ChunkHandle> {
        self.loaded.get(&chunk).copied()
    }

    /// Every loaded chunk, in no particular order.
    pub fn loaded_chunks(&self) -> Vec<ChunkId> {
        self.loaded.keys().copied().collect()
    }

    /// Sets the caller-managed active flag.
    pub fn set_active(&mut self, handle: ChunkHandle, active: bool) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.active = active;
        }
    }

    /// Whether the handle was last marked active.
    pub fn is_active(&self, handle: ChunkHandle) -> bool {
        self.slot(handle).map(|slot| slot.active).unwrap_or(false)
    }

    /// The handle's attribute buffer.
    pub fn buffer(&self, handle: ChunkHandle) -> Option<&ChunkBuffer> {
        self.slot(handle).and_then(|slot| slot.buffer.as_ref())
    }

    /// Number of slots on the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of loaded chunks.
    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    /// Number of slots ever allocated.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Maximum length of the free list.
    pub fn pool_limit(&self) -> usize {
        self.pool_limit
    }

    /// Handles whose last sync was deferred, with their bindings.
    pub fn pending_syncs(&self) -> Vec<(ChunkHandle, ChunkId)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.sync_pending)
            .filter_map(|(index, slot)| {
                slot.binding.map(|chunk| {
                    let handle = ChunkHandle {
                        index,
                        generation: slot.generation,
                    };
                    (handle, chunk)
                })
            })
            .collect()
    }

    /// Pulls the chunk's blocks into the handle's buffer.
    ///
    /// The handle must still be bound to `expected`; otherwise nothing is written and the
    /// sync is reported stale. The first sync after a bind always rewrites the buffer; later
    /// ones only when blocks of the chunk changed. Rewrites clear the blocks' update flags.
    pub fn sync(
        &mut self,
        handle: ChunkHandle,
        expected: ChunkId,
        store: &mut BlockStore,
        now: Instant,
    ) -> SyncOutcome {
        let (chunk_size, world_height, interval) =
            (self.chunk_size, self.world_height, self.sync_interval);
        let slot = match self.slot_mut(handle) {
            Some(slot) if slot.binding == Some(expected) => slot,
            _ => return SyncOutcome::Stale,
        };

        if let Some(last_sync) = slot.last_sync {
            if now.saturating_duration_since(last_sync) < interval {
                slot.sync_pending = true;
                return SyncOutcome::Deferred;
            }
        }
        slot.sync_pending = false;

        if !slot.needs_first_sync && store.count_blocks_need_update(expected.cx, expected.cz) == 0 {
            return SyncOutcome::Unchanged;
        }

        let buffer = slot
            .buffer
            .get_or_insert_with(|| ChunkBuffer::new(chunk_size, world_height));
        let occupied = buffer.fill(store, expected);
        store.mark_blocks_updated(expected.cx, expected.cz);
        slot.needs_first_sync = false;
        slot.last_sync = Some(now);
        SyncOutcome::Synced { occupied }
    }

    fn slot(&self, handle: ChunkHandle) -> Option<&ChunkSlot> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
    }

    fn slot_mut(&mut self, handle: ChunkHandle) -> Option<&mut ChunkSlot> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
    }
}

/// Loads, unloads and syncs chunk handles.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ChunkLifecycle {
    pool: StResource<ChunkPool>,
    world: WorldGenerator,
    store: StResource<BlockStore>,
    task_manager: TaskManager,
}

impl ChunkLifecycle {
    /// Creates a lifecycle manager on top of a world generator.
    ///
    /// # Arguments
    /// * `world` - Generates the chunks this manager loads; also supplies the store and
    ///   scheduler
    /// * `pool_limit` - Maximum number of released handles kept for reuse
    /// * `sync_interval` - Minimum time between two buffer rewrites of one handle
    pub fn new(world: WorldGenerator, pool_limit: usize, sync_interval: Duration) -> Self {
        let store = world.store().clone();
        let (chunk_size, world_height) = {
            let store = store.get();
            (store.chunk_size(), store.world_height())
        };
        ChunkLifecycle {
            pool: StResource::new(ChunkPool::new(chunk_size, world_height, pool_limit, sync_interval)),
            task_manager: world.task_manager().clone(),
            store,
            world,
        }
    }

    /// Binds a handle to chunk `(cx, cz)`.
    ///
    /// A chunk that is already loaded keeps its handle. Loading only queues work and never
    /// borrows the block store, so it may be called from inside a task runner.
    pub fn load(&self, cx: i32, cz: i32) -> ChunkHandle {
        let chunk = ChunkId::new(cx, cz);
        if let Some(handle) = self.pool.get().handle_for(chunk) {
            return handle;
        }
        let handle = self.pool.get_mut().acquire();
        self.setup(handle, cx, cz);
        handle
    }

    /// Rebinds `handle` to chunk `(cx, cz)` and requests the chunk's generation. An already
    /// generated chunk gets a sync queued in the Pre lane, ahead of all other work;
    /// otherwise the buffer stays stale until the generation results are synced.
    pub fn setup(&self, handle: ChunkHandle, cx: i32, cz: i32) {
        let chunk = ChunkId::new(cx, cz);
        if !self.pool.get_mut().bind(handle, chunk) {
            warn!("Cannot set up chunk {} on a released handle", chunk);
            return;
        }

        if self.world.check_generation(cx, cz) {
            self.queue_sync(handle, Lane::Pre);
            debug!("Chunk {} loaded from generated blocks", chunk);
        } else {
            debug!("Chunk {} loaded, waiting for generation", chunk);
        }
    }

    /// Unbinds a handle and returns it to the pool.
    ///
    /// Queued sync work for the chunk is flushed before the handle can be rebound.
    ///
    /// # Returns
    /// `true` if the handle was pooled for reuse.
    pub fn unload(&self, handle: ChunkHandle) -> bool {
        let chunk = match self.pool.get().binding(handle) {
            Some(chunk) => chunk,
            None => return false,
        };

        let id = chunk.to_string();
        let flushed = self.task_manager.flush(&["chunk", id.as_str()]);
        let pooled = self.pool.get_mut().release(handle);
        debug!("Chunk {} unloaded ({} tasks flushed, pooled: {})", chunk, flushed, pooled);
        pooled
    }

    /// Unloads chunk `(cx, cz)` if it is loaded.
    pub fn unload_chunk(&self, cx: i32, cz: i32) -> bool {
        let handle = self.pool.get().handle_for(ChunkId::new(cx, cz));
        handle.map(|handle| self.unload(handle)).unwrap_or(false)
    }

    /// Sets the handle's active flag.
    pub fn set_active(&self, handle: ChunkHandle, active: bool) {
        self.pool.get_mut().set_active(handle, active);
    }

    /// Queues a sync of the handle's buffer (Reversed lane, debounced per chunk).
    ///
    /// Returns `false` for a handle that is not bound.
    pub fn request_sync(&self, handle: ChunkHandle) -> bool {
        self.queue_sync(handle, Lane::Reversed)
    }

    fn queue_sync(&self, handle: ChunkHandle, lane: Lane) -> bool {
        let chunk = match self.pool.get().binding(handle) {
            Some(chunk) => chunk,
            None => return false,
        };

        let id = chunk.to_string();
        self.task_manager.add(
            ChunkSyncTask::new(handle, chunk, self.pool.clone(), self.store.clone()),
            &["chunk", id.as_str()],
            lane,
            true,
        );
        true
    }

    /// Syncs the handle's buffer right away, outside the scheduler.
    ///
    /// Borrows the block store mutably; must not be called while a task runner holds it.
    pub fn sync(&self, handle: ChunkHandle) -> SyncOutcome {
        let chunk = match self.pool.get().binding(handle) {
            Some(chunk) => chunk,
            None => return SyncOutcome::Stale,
        };
        self.pool
            .get_mut()
            .sync(handle, chunk, &mut self.store.get_mut(), Instant::now())
    }

    /// Queues syncs for every handle whose last sync was deferred.
    pub fn retry_pending_syncs(&self) -> usize {
        let pending = self.pool.get().pending_syncs();
        pending
            .into_iter()
            .filter(|(handle, _)| self.request_sync(*handle))
            .count()
    }

    /// The handle bound to chunk `(cx, cz)`.
    pub fn handle_for(&self, cx: i32, cz: i32) -> Option<ChunkHandle> {
        self.pool.get().handle_for(ChunkId::new(cx, cz))
    }

    /// Every loaded chunk.
    pub fn loaded_chunks(&self) -> Vec<ChunkId> {
        self.pool.get().loaded_chunks()
    }

    /// Runs `f` on the handle's buffer, the renderer's view of the chunk.
    pub fn with_buffer<R>(&self, handle: ChunkHandle, f: impl FnOnce(&ChunkBuffer) -> R) -> Option<R> {
        self.pool.get().buffer(handle).map(f)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &StResource<ChunkPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::{
        block::block_type::BlockType, generation::ChunkGenerator, noise_source::NoiseSource,
    };
    use cgmath::Point3;
    use std::rc::Rc;

    fn lifecycle(pool_limit: usize) -> ChunkLifecycle {
        let task_manager = TaskManager::new(0);
        task_manager.start();
        let world = WorldGenerator::new(
            StResource::new(BlockStore::new(4, 8)),
            task_manager,
            ChunkGenerator::with_default_rules(Rc::new(NoiseSource::new(11))),
            1,
        );
        ChunkLifecycle::new(world, pool_limit, Duration::ZERO)
    }

    #[test]
    fn free_list_never_exceeds_pool_limit() {
        let pool_limit = 3;
        let chunks = lifecycle(pool_limit);
        let handles: Vec<_> = (0..pool_limit as i32 + 5).map(|cx| chunks.load(cx, 0)).collect();
        assert_eq!(chunks.pool().get().slot_count(), pool_limit + 5);

        for handle in handles {
            chunks.unload(handle);
            assert!(chunks.pool().get().free_len() <= pool_limit);
        }
        assert_eq!(chunks.pool().get().free_len(), pool_limit);
        assert_eq!(chunks.pool().get().loaded_len(), 0);

        // Reloading reuses slots instead of growing the arena.
        for cx in 0..pool_limit as i32 + 5 {
            chunks.load(cx, 7);
        }
        assert_eq!(chunks.pool().get().slot_count(), pool_limit + 5);
    }

    #[test]
    fn released_handles_go_stale() {
        let mut pool = ChunkPool::new(4, 8, 2, Duration::ZERO);
        let mut store = BlockStore::new(4, 8);
        let first = pool.acquire();
        pool.bind(first, ChunkId::new(0, 0));
        assert!(pool.release(first));

        let second = pool.acquire();
        assert_eq!(second.index(), first.index());
        pool.bind(second, ChunkId::new(5, 5));

        assert!(!pool.is_valid(first));
        assert_eq!(pool.binding(first), None);
        assert_eq!(
            pool.sync(first, ChunkId::new(0, 0), &mut store, Instant::now()),
            SyncOutcome::Stale
        );
        assert_eq!(
            pool.sync(second, ChunkId::new(0, 0), &mut store, Instant::now()),
            SyncOutcome::Stale
        );
        assert!(!pool.release(first));
    }

    #[test]
    fn sync_skips_unchanged_chunks() {
        let mut pool = ChunkPool::new(4, 8, 2, Duration::ZERO);
        let mut store = BlockStore::new(4, 8);
        store.place(Point3::new(1, 0, 1), BlockType::Bedrock);
        let chunk = ChunkId::new(0, 0);
        let handle = pool.acquire();
        pool.bind(handle, chunk);

        assert_eq!(
            pool.sync(handle, chunk, &mut store, Instant::now()),
            SyncOutcome::Synced { occupied: 1 }
        );
        assert_eq!(store.count_blocks_need_update(0, 0), 0);
        assert_eq!(pool.sync(handle, chunk, &mut store, Instant::now()), SyncOutcome::Unchanged);

        store.place(Point3::new(1, 1, 1), BlockType::Dirt);
        assert_eq!(
            pool.sync(handle, chunk, &mut store, Instant::now()),
            SyncOutcome::Synced { occupied: 2 }
        );
    }

    #[test]
    fn early_syncs_are_deferred_and_retried() {
        let mut pool = ChunkPool::new(4, 8, 2, Duration::from_secs(3600));
        let mut store = BlockStore::new(4, 8);
        let chunk = ChunkId::new(0, 0);
        let handle = pool.acquire();
        pool.bind(handle, chunk);
        let start = Instant::now();

        assert!(matches!(pool.sync(handle, chunk, &mut store, start), SyncOutcome::Synced { .. }));
        store.place(Point3::new(0, 0, 0), BlockType::Rock);
        assert_eq!(pool.sync(handle, chunk, &mut store, start), SyncOutcome::Deferred);
        assert_eq!(pool.pending_syncs(), vec![(handle, chunk)]);

        let later = start + Duration::from_secs(3601);
        assert!(matches!(pool.sync(handle, chunk, &mut store, later), SyncOutcome::Synced { occupied: 1 }));
        assert!(pool.pending_syncs().is_empty());
    }

    #[test]
    fn load_waits_for_generation_then_syncs_on_reload() {
        let chunks = lifecycle(4);
        let task_manager = chunks.task_manager.clone();

        let handle = chunks.load(0, 0);
        assert_eq!(chunks.load(0, 0), handle);
        assert_eq!(chunks.with_buffer(handle, |buffer| buffer.visible_count()), Some(0));

        task_manager.run_until_idle(20);
        assert!(chunks.request_sync(handle));
        task_manager.run_until_idle(20);
        let visible = chunks.with_buffer(handle, |buffer| buffer.visible_count()).unwrap();
        assert!(visible > 0);

        // Generated chunks get a sync ahead of all other work.
        chunks.unload(handle);
        let reloaded = chunks.load(0, 0);
        assert_eq!(task_manager.queued_in(Lane::Pre), 1);
        assert!(task_manager.tick());
        assert_eq!(chunks.with_buffer(reloaded, |buffer| buffer.visible_count()), Some(visible));
    }

    #[test]
    fn direct_sync_reports_each_outcome() {
        let chunks = lifecycle(4);
        let handle = chunks.load(3, 0);
        chunks.task_manager.run_until_idle(20);

        assert!(matches!(chunks.sync(handle), SyncOutcome::Synced { occupied } if occupied > 0));
        assert_eq!(chunks.sync(handle), SyncOutcome::Unchanged);
        chunks.unload(handle);
        assert_eq!(chunks.sync(handle), SyncOutcome::Stale);
    }

    #[test]
    fn load_leaves_the_store_alone() {
        let chunks = lifecycle(4);
        let task_manager = chunks.task_manager.clone();
        chunks.load(1, 1);
        task_manager.run_until_idle(20);
        chunks.unload_chunk(1, 1);

        let store = chunks.store.clone();
        let borrowed = store.get_mut();
        let handle = chunks.load(1, 1);
        assert_eq!(chunks.handle_for(1, 1), Some(handle));
        drop(borrowed);

        assert_eq!(task_manager.count_matching(&["chunk", "1_1"]), 1);
        task_manager.run_until_idle(20);
        let visible = chunks.with_buffer(handle, |buffer| buffer.visible_count()).unwrap();
        assert_eq!(visible, store.get().count_blocks_in_chunk(1, 1));
    }

    #[test]
    fn unload_flushes_queued_syncs_first() {
        let chunks = lifecycle(4);
        let task_manager = chunks.task_manager.clone();
        let handle = chunks.load(2, 2);
        chunks.request_sync(handle);
        chunks.request_sync(handle);
        assert_eq!(task_manager.count_matching(&["chunk", "2_2"]), 1);

        chunks.unload(handle);
        assert_eq!(task_manager.count_matching(&["chunk", "2_2"]), 0);
        assert!(!chunks.request_sync(handle));
        assert_eq!(chunks.handle_for(2, 2), None);
    }
}
