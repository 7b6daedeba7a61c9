//! # Chunk Iteration Module
//!
//! This module provides an iterator over every cell of one chunk's voxel box.
//!
//! ## Ownership-Free Iteration
//!
//! `ChunkCellIterator` only carries the chunk's bounds and a cursor, never a borrow of
//! the [`BlockStore`](crate::engine_state::voxels::block_store::BlockStore). Generation
//! walks a chunk with it while writing into the store at the same time, which a borrowing
//! iterator would not allow.
//!
//! ## Order
//!
//! Cells are produced with `z` outermost, `x` in the middle and `y` innermost. Each cell is
//! produced exactly once together with its instance index, so callers get exhaustive,
//! non-overlapping coverage of the box.

use cgmath::Point3;

use super::{instance_index, ChunkId};

/// An iterator over all cells of a chunk, yielding global coordinates and instance indices.
#[derive(Clone, Debug)]
pub struct ChunkCellIterator {
    /// World coordinate of the chunk's lowest `x` column
    origin_x: i32,
    /// World coordinate of the chunk's lowest `z` column
    origin_z: i32,
    /// Edge length of the chunk in blocks
    chunk_size: i32,
    /// Vertical extent of the world in blocks
    world_height: i32,
    /// Current X position within the chunk (0..chunk_size)
    local_x: i32,
    /// Current Y position within the chunk (0..world_height)
    local_y: i32,
    /// Current Z position within the chunk (0..chunk_size)
    local_z: i32,
}

impl ChunkCellIterator {
    /// Creates a new `ChunkCellIterator` for the given chunk.
    ///
    /// # Arguments
    /// * `chunk` - The chunk whose box is traversed
    /// * `chunk_size` - Edge length of a chunk in blocks
    /// * `world_height` - Vertical extent of the world in blocks
    ///
    /// # Returns
    /// An iterator positioned at the chunk's `(bx0, 0, bz0)` corner. A non-positive size or
    /// height produces an empty iterator.
    pub fn new(chunk: ChunkId, chunk_size: i32, world_height: i32) -> Self {
        let (origin_x, origin_z) = chunk.origin(chunk_size);
        let empty = chunk_size <= 0 || world_height <= 0;
        ChunkCellIterator {
            origin_x,
            origin_z,
            chunk_size,
            world_height,
            local_x: 0,
            local_y: 0,
            local_z: if empty { chunk_size.max(0) } else { 0 },
        }
    }

    fn remaining(&self) -> usize {
        if self.local_z >= self.chunk_size {
            return 0;
        }
        let column = self.world_height as usize;
        let plane = self.chunk_size as usize * column;
        let consumed = self.local_z as usize * plane
            + self.local_x as usize * column
            + self.local_y as usize;
        plane * self.chunk_size as usize - consumed
    }
}

impl Iterator for ChunkCellIterator {
    type Item = (Point3<i32>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.local_z >= self.chunk_size {
            return None;
        }

        let local = Point3::new(self.local_x, self.local_y, self.local_z);
        let index = instance_index(self.chunk_size, self.world_height, local);
        let position = Point3::new(
            self.origin_x + self.local_x,
            self.local_y,
            self.origin_z + self.local_z,
        );

        // Advance y, then x, then z
        self.local_y += 1;
        if self.local_y == self.world_height {
            self.local_y = 0;
            self.local_x += 1;
            if self.local_x == self.chunk_size {
                self.local_x = 0;
                self.local_z += 1;
            }
        }

        Some((position, index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkCellIterator {}
