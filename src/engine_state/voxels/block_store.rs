//! # Block Store Module
//!
//! The single sparse map from integer voxel coordinate to [`Block`], plus the spatial
//! queries the rest of the engine runs against it.
//!
//! ## Failure Semantics
//!
//! Nothing here returns an error. Writes outside `[0, world_height)` are dropped silently,
//! since generation routinely produces them at chunk and world edges. Callers that need
//! confirmation look at the `bool` returned by [`BlockStore::set_block`].
//!
//! ## Coordinates
//!
//! Query methods taking `f64` floor their inputs, so a moving actor's position can be
//! passed directly. Methods taking [`Point3<i32>`] address cells exactly.

use cgmath::Point3;
use log::trace;
use std::collections::HashMap;

use super::block::{block_type::BlockType, Block};
use super::chunk::{chunk_iteration::ChunkCellIterator, ChunkId};

/// Sparse voxel storage with elevation, occupancy and chunk traversal queries.
#[derive(Debug, Clone)]
pub struct BlockStore {
    blocks: HashMap<Point3<i32>, Block>,
    chunk_size: i32,
    world_height: i32,
    next_serial: u64,
}

impl BlockStore {
    /// Creates an empty store for chunks of `chunk_size` columns and a world
    /// `world_height` blocks tall.
    pub fn new(chunk_size: i32, world_height: i32) -> Self {
        BlockStore {
            blocks: HashMap::new(),
            chunk_size,
            world_height,
            next_serial: 0,
        }
    }

    /// Edge length of a chunk in blocks.
    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// Vertical extent of the world in blocks.
    pub fn world_height(&self) -> i32 {
        self.world_height
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no block is stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns `true` if `y` is a storable height.
    pub fn in_bounds(&self, y: i32) -> bool {
        (0..self.world_height).contains(&y)
    }

    /// Inserts or overwrites a block at its position.
    ///
    /// # Returns
    /// `false` (and stores nothing) if the block's `y` lies outside `[0, world_height)`.
    pub fn set_block(&mut self, mut block: Block) -> bool {
        if !self.in_bounds(block.position.y) {
            trace!("Dropping out-of-range block at {}", block.id());
            return false;
        }
        block.serial = self.next_serial;
        self.next_serial += 1;
        self.blocks.insert(block.position, block);
        true
    }

    /// Places a fresh, fully lit block of `block_type` at `position`.
    pub fn place(&mut self, position: Point3<i32>, block_type: BlockType) -> bool {
        self.set_block(Block::new(position, block_type))
    }

    /// The block at `(x, y, z)` after flooring each coordinate.
    pub fn get_block_at(&self, x: f64, y: f64, z: f64) -> Option<&Block> {
        self.block(floor_point(x, y, z))
    }

    /// The block at an exact cell.
    pub fn block(&self, position: Point3<i32>) -> Option<&Block> {
        self.blocks.get(&position)
    }

    /// Returns `true` if a block occupies the cell.
    pub fn is_occupied(&self, position: Point3<i32>) -> bool {
        self.blocks.contains_key(&position)
    }

    /// Removes the block at `position`, returning it.
    pub fn kill(&mut self, position: Point3<i32>) -> Option<Block> {
        self.blocks.remove(&position)
    }

    /// Updates lightness and type of an existing block.
    ///
    /// # Returns
    /// `true` if either value changed. An absent block reports no change.
    pub fn update_block(
        &mut self,
        position: Point3<i32>,
        lightness: f32,
        block_type: BlockType,
    ) -> bool {
        self.blocks
            .get_mut(&position)
            .map(|block| block.update(lightness, block_type))
            .unwrap_or(false)
    }

    /// Highest occupied `y` in the column `(x, z)`, or `-1` for an empty column.
    pub fn get_elevation_at(&self, x: i32, z: i32) -> i32 {
        (0..self.world_height)
            .rev()
            .find(|&y| self.is_occupied(Point3::new(x, y, z)))
            .unwrap_or(-1)
    }

    /// The topmost block of the column `(x, z)`.
    pub fn get_most_elevated_block_at(&self, x: i32, z: i32) -> Option<&Block> {
        let elevation = self.get_elevation_at(x, z);
        if elevation < 0 {
            return None;
        }
        self.block(Point3::new(x, elevation, z))
    }

    /// Highest `y` at or below `y` whose block is at least `min_tangibility` solid.
    ///
    /// Resolves the ground under a falling point. Returns `-1` when nothing qualifies.
    pub fn get_elevation_at_position(&self, x: f64, y: f64, z: f64, min_tangibility: f32) -> i32 {
        let cell = floor_point(x, y, z);
        let top = cell.y.min(self.world_height - 1);
        (0..=top)
            .rev()
            .find(|&level| {
                self.block(Point3::new(cell.x, level, cell.z))
                    .map(|block| block.tangibility() >= min_tangibility)
                    .unwrap_or(false)
            })
            .unwrap_or(-1)
    }

    /// Tangibility of the block at `(x, y, z)`, or `0` for an empty cell.
    pub fn get_tangibility_at_position(&self, x: f64, y: f64, z: f64) -> f32 {
        self.get_block_at(x, y, z)
            .map(Block::tangibility)
            .unwrap_or(0.0)
    }

    /// Visits every cell of the cube of half-width `distance` around `center`.
    ///
    /// The callback receives the offset from `center` and the block there, if any. The
    /// center itself is included.
    pub fn iterate_siblings<F>(&self, center: Point3<i32>, distance: i32, mut f: F)
    where
        F: FnMut(i32, i32, i32, Option<&Block>),
    {
        for dx in -distance..=distance {
            for dy in -distance..=distance {
                for dz in -distance..=distance {
                    let position = Point3::new(center.x + dx, center.y + dy, center.z + dz);
                    f(dx, dy, dz, self.block(position));
                }
            }
        }
    }

    /// Cells of one chunk with their instance indices, not borrowing the store.
    pub fn chunk_cells(&self, cx: i32, cz: i32) -> ChunkCellIterator {
        ChunkCellIterator::new(ChunkId::new(cx, cz), self.chunk_size, self.world_height)
    }

    /// Visits every cell of chunk `(cx, cz)` exactly once.
    ///
    /// Order is `z` outer, `x` middle, `y` inner. The callback receives the global
    /// position, the cell's instance index and the block there, if any.
    pub fn traverse_chunk<F>(&self, cx: i32, cz: i32, mut f: F)
    where
        F: FnMut(Point3<i32>, usize, Option<&Block>),
    {
        for (position, index) in self.chunk_cells(cx, cz) {
            f(position, index, self.block(position));
        }
    }

    /// Visits every column of chunk `(cx, cz)`, `z` outer and `x` inner.
    pub fn traverse_chunk_2d<F>(&self, cx: i32, cz: i32, mut f: F)
    where
        F: FnMut(i32, i32),
    {
        let (bx0, bz0) = ChunkId::new(cx, cz).origin(self.chunk_size);
        for z in bz0..bz0 + self.chunk_size {
            for x in bx0..bx0 + self.chunk_size {
                f(x, z);
            }
        }
    }

    /// Clears `needs_update` on every block of the chunk, returning how many were set.
    pub fn mark_blocks_updated(&mut self, cx: i32, cz: i32) -> usize {
        let mut cleared = 0;
        for (position, _) in self.chunk_cells(cx, cz) {
            if let Some(block) = self.blocks.get_mut(&position) {
                if block.needs_update {
                    block.needs_update = false;
                    cleared += 1;
                }
            }
        }
        cleared
    }

    /// Number of blocks in the chunk whose `needs_update` flag is set.
    pub fn count_blocks_need_update(&self, cx: i32, cz: i32) -> usize {
        self.chunk_cells(cx, cz)
            .filter(|(position, _)| {
                self.block(*position)
                    .map(|block| block.needs_update)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Number of blocks stored inside the chunk's box.
    pub fn count_blocks_in_chunk(&self, cx: i32, cz: i32) -> usize {
        self.chunk_cells(cx, cz)
            .filter(|(position, _)| self.is_occupied(*position))
            .count()
    }

    /// Every stored block, in no particular order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}

fn floor_point(x: f64, y: f64, z: f64) -> Point3<i32> {
    Point3::new(x.floor() as i32, y.floor() as i32, z.floor() as i32)
}
