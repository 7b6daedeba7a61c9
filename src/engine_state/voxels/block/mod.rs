//! # Block Module
//!
//! Individual voxels and their per-instance state.

use cgmath::Point3;
use std::fmt;

use block_type::BlockType;

pub mod block_type;

/// The underlying integer type used to store block types compactly.
pub type BlockTypeSize = u8;

/// Identity of a block: its integer world coordinate.
///
/// Renders as `bx_by_bz`, the form used in logs and tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub Point3<i32>);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.0.x, self.0.y, self.0.z)
    }
}

/// A single voxel stored in the [`BlockStore`](crate::engine_state::voxels::block_store::BlockStore).
///
/// Blocks never reference chunks; chunk handles read them only while syncing.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// World coordinate of the block.
    pub position: Point3<i32>,
    /// Material of the block.
    pub block_type: BlockType,
    /// Ambient light reaching the block, in `[0, 1]`.
    pub lightness: f32,
    /// Set when the type or lightness changed since the owning chunk last synced.
    pub needs_update: bool,
    /// Creation order, assigned by the store.
    pub serial: u64,
}

impl Block {
    /// Creates a fully lit block that still needs syncing.
    pub fn new(position: Point3<i32>, block_type: BlockType) -> Self {
        Block {
            position,
            block_type,
            lightness: 1.0,
            needs_update: true,
            serial: 0,
        }
    }

    /// The block's identity.
    pub fn id(&self) -> BlockId {
        BlockId(self.position)
    }

    /// Solidity of the block, derived from its type.
    pub fn tangibility(&self) -> f32 {
        self.block_type.tangibility()
    }

    /// Sets lightness and type, returning whether either changed.
    ///
    /// A change raises `needs_update`; an unchanged update leaves a pending flag alone so
    /// an earlier change is not lost before the chunk syncs.
    pub fn update(&mut self, lightness: f32, block_type: BlockType) -> bool {
        let changed = lightness != self.lightness || block_type != self.block_type;
        self.lightness = lightness;
        self.block_type = block_type;
        self.needs_update |= changed;
        changed
    }
}
