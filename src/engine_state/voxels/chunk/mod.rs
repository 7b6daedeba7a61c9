//! # Chunk Module
//!
//! This module provides the chunk-side view of the world: chunk identities, the flat
//! attribute buffer a chunk handle exposes to the renderer, and the pool that binds
//! handles to chunk coordinates.
//!
//! ## Buffer Layout
//!
//! A chunk buffer covers `chunk_size × world_height × chunk_size` cells. Each cell owns
//! exactly one slot, found through the instance index
//! `x + chunk_size · (y + world_height · z)` over local coordinates. Two parallel arrays
//! share that indexing:
//! - `attributes`: tile coordinates and lightness per cell, laid out for direct upload
//! - `visibility`: a bit vector marking which cells hold a block
//!
//! Air cells keep zeroed attributes and a cleared visibility bit.

use bitvec::prelude::BitVec;
use bytemuck::{Pod, Zeroable};
use cgmath::Point3;
use std::fmt;

use super::block::Block;
use super::block_store::BlockStore;

pub mod chunk_iteration;
pub mod chunk_pool;

/// Identity of a chunk in chunk-grid coordinates.
///
/// Renders as `cx_cz`, the form used in task tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    /// Chunk column along the x axis.
    pub cx: i32,
    /// Chunk column along the z axis.
    pub cz: i32,
}

impl ChunkId {
    /// Creates a chunk id.
    pub fn new(cx: i32, cz: i32) -> Self {
        ChunkId { cx, cz }
    }

    /// The chunk containing the world column `(x, z)`.
    pub fn containing(x: f64, z: f64, chunk_size: i32) -> Self {
        let chunk_size = chunk_size.max(1);
        ChunkId {
            cx: (x.floor() as i32).div_euclid(chunk_size),
            cz: (z.floor() as i32).div_euclid(chunk_size),
        }
    }

    /// World coordinates `(bx0, bz0)` of the chunk's first column.
    pub fn origin(&self, chunk_size: i32) -> (i32, i32) {
        (self.cx * chunk_size, self.cz * chunk_size)
    }

    /// Returns `true` if the world column `(x, z)` lies inside this chunk.
    pub fn contains_column(&self, x: i32, z: i32, chunk_size: i32) -> bool {
        let (bx0, bz0) = self.origin(chunk_size);
        (bx0..bx0 + chunk_size).contains(&x) && (bz0..bz0 + chunk_size).contains(&z)
    }

    /// Chebyshev distance to another chunk, in chunks.
    pub fn distance(&self, other: &ChunkId) -> i32 {
        (self.cx - other.cx).abs().max((self.cz - other.cz).abs())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.cx, self.cz)
    }
}

/// Flat buffer slot of a cell given its local coordinates inside a chunk.
///
/// Bijective over `[0, chunk_size) × [0, world_height) × [0, chunk_size)` onto
/// `[0, chunk_size² · world_height)`.
pub fn instance_index(chunk_size: i32, world_height: i32, local: Point3<i32>) -> usize {
    (local.x + chunk_size * (local.y + world_height * local.z)) as usize
}

/// Number of cells in one chunk.
pub fn cells_per_chunk(chunk_size: i32, world_height: i32) -> usize {
    (chunk_size.max(0) * chunk_size.max(0) * world_height.max(0)) as usize
}

/// Per-cell attributes as the renderer reads them.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceAttributes {
    /// Column and row of the block's atlas tile.
    pub tile: [f32; 2],
    /// Ambient light reaching the block.
    pub lightness: f32,
}

impl InstanceAttributes {
    fn from_block(block: &Block) -> Self {
        let [tile_x, tile_y] = block.block_type.tile();
        InstanceAttributes {
            tile: [tile_x as f32, tile_y as f32],
            lightness: block.lightness,
        }
    }
}

/// The attribute view a chunk handle exposes, sized once and rewritten on every sync.
#[derive(Clone, Debug)]
pub struct ChunkBuffer {
    attributes: Vec<InstanceAttributes>,
    visibility: BitVec,
}

impl ChunkBuffer {
    /// Allocates a zeroed buffer for one chunk.
    pub fn new(chunk_size: i32, world_height: i32) -> Self {
        let cells = cells_per_chunk(chunk_size, world_height);
        let mut visibility = BitVec::with_capacity(cells);
        visibility.resize(cells, false);
        ChunkBuffer {
            attributes: vec![InstanceAttributes::zeroed(); cells],
            visibility,
        }
    }

    /// Number of cells the buffer covers.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` for a zero-sized buffer.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes of every cell, indexed by instance index.
    pub fn attributes(&self) -> &[InstanceAttributes] {
        &self.attributes
    }

    /// Attribute array as raw bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.attributes)
    }

    /// Returns `true` if the cell at `index` holds a block.
    pub fn is_visible(&self, index: usize) -> bool {
        self.visibility.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Number of cells holding a block.
    pub fn visible_count(&self) -> usize {
        self.visibility.count_ones()
    }

    /// Rewrites the whole buffer from the store's view of `chunk`.
    ///
    /// Returns the number of occupied cells.
    pub fn fill(&mut self, store: &BlockStore, chunk: ChunkId) -> usize {
        let attributes = &mut self.attributes;
        let visibility = &mut self.visibility;
        let mut occupied = 0;
        store.traverse_chunk(chunk.cx, chunk.cz, |_, index, block| {
            match block {
                Some(block) => {
                    attributes[index] = InstanceAttributes::from_block(block);
                    visibility.set(index, true);
                    occupied += 1;
                }
                None => {
                    attributes[index] = InstanceAttributes::zeroed();
                    visibility.set(index, false);
                }
            }
        });
        occupied
    }

    /// Clears every cell.
    pub fn clear(&mut self) {
        self.attributes.fill(InstanceAttributes::zeroed());
        self.visibility.fill(false);
    }
}
