//! # Chunk Sync Task
//!
//! Refreshes a chunk handle's attribute buffer from the block store.

use log::{debug, warn};
use web_time::Instant;

use crate::{
    core::StResource,
    engine_state::{
        task_management::task::{Done, TaskRunner},
        voxels::{
            block_store::BlockStore,
            chunk::{
                chunk_pool::{ChunkHandle, ChunkPool, SyncOutcome},
                ChunkId,
            },
        },
    },
};

/// A task that syncs one handle's buffer.
///
/// The task remembers the coordinates the handle was bound to when it was queued. If the
/// handle has been released or rebound since, the sync is skipped with a warning: writing
/// would fill a buffer now representing different coordinates.
pub struct ChunkSyncTask {
    /// The handle whose buffer is refreshed
    handle: ChunkHandle,
    /// The chunk the handle was bound to when the task was queued
    chunk: ChunkId,
    /// The pool owning the handle's buffer
    pool: StResource<ChunkPool>,
    /// The store blocks are read from
    store: StResource<BlockStore>,
}

impl ChunkSyncTask {
    /// Creates a new sync task.
    ///
    /// # Arguments
    /// * `handle` - The handle to sync
    /// * `chunk` - The chunk the handle is currently bound to
    /// * `pool` - The pool owning the handle
    /// * `store` - The block store to read from
    pub fn new(
        handle: ChunkHandle,
        chunk: ChunkId,
        pool: StResource<ChunkPool>,
        store: StResource<BlockStore>,
    ) -> Self {
        ChunkSyncTask {
            handle,
            chunk,
            pool,
            store,
        }
    }
}

impl TaskRunner for ChunkSyncTask {
    fn run(self: Box<Self>, done: Done) {
        let outcome = self.pool.get_mut().sync(
            self.handle,
            self.chunk,
            &mut self.store.get_mut(),
            Instant::now(),
        );

        match outcome {
            SyncOutcome::Stale => warn!(
                "Skipping sync of chunk {}: handle {} was rebound",
                self.chunk,
                self.handle.index()
            ),
            outcome => debug!("Synced chunk {}: {:?}", self.chunk, outcome),
        }

        done.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::task_management::{task::Lane, TaskManager};
    use crate::engine_state::voxels::block::block_type::BlockType;
    use cgmath::Point3;
    use web_time::Duration;

    #[test]
    fn sync_task_fills_the_bound_buffer() {
        let pool = StResource::new(ChunkPool::new(4, 6, 4, Duration::ZERO));
        let store = StResource::new(BlockStore::new(4, 6));
        store.get_mut().place(Point3::new(-3, 2, 1), BlockType::Sand);
        let chunk = ChunkId::new(-1, 0);
        let handle = pool.get_mut().acquire();
        pool.get_mut().bind(handle, chunk);

        let task_manager = TaskManager::new(0);
        task_manager.start();
        task_manager.add(
            ChunkSyncTask::new(handle, chunk, pool.clone(), store.clone()),
            &["chunk", "-1_0"],
            Lane::Reversed,
            true,
        );
        assert!(task_manager.tick());

        assert_eq!(pool.get().buffer(handle).map(|buffer| buffer.visible_count()), Some(1));
        assert_eq!(store.get().count_blocks_need_update(-1, 0), 0);
    }

    #[test]
    fn stale_sync_task_leaves_rebound_buffer_alone() {
        let pool = StResource::new(ChunkPool::new(4, 6, 4, Duration::ZERO));
        let store = StResource::new(BlockStore::new(4, 6));
        store.get_mut().place(Point3::new(0, 0, 0), BlockType::Bedrock);
        let handle = pool.get_mut().acquire();
        pool.get_mut().bind(handle, ChunkId::new(0, 0));

        let task_manager = TaskManager::new(0);
        task_manager.start();
        task_manager.add(
            ChunkSyncTask::new(handle, ChunkId::new(0, 0), pool.clone(), store.clone()),
            &["chunk", "0_0"],
            Lane::Reversed,
            true,
        );

        // Rebind without flushing the queued sync.
        pool.get_mut().release(handle);
        let rebound = pool.get_mut().acquire();
        pool.get_mut().bind(rebound, ChunkId::new(9, 9));
        task_manager.tick();

        assert_eq!(pool.get().buffer(rebound).map(|buffer| buffer.visible_count()), Some(0));
        assert_eq!(store.get().count_blocks_need_update(0, 0), 1);
        assert!(!task_manager.is_locked());
    }
}
