//! # Block Type Module
//!
//! The fixed block table: every block type, its atlas tile and its tangibility.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::BlockTypeSize;

/// Enumerates all block types in the voxel world.
///
/// The discriminant is the compact form stored in chunk attribute buffers; `FromPrimitive`
/// converts it back.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
pub enum BlockType {
    /// Placeholder terrain that has not been given a material yet.
    None,
    /// Loose gravel.
    Gravel,
    /// Solid rock.
    Rock,
    /// Dirt, the bulk of the terrain.
    Dirt,
    /// Sand, found near the water line.
    Sand,
    /// The indestructible floor at `y = 0`.
    Bedrock,
    /// Still water.
    Water,
    /// Tree trunk.
    Wood,
    /// Tree crown.
    Leaves,
    /// Grass tuft growing on dirt.
    Grass,
    /// Bamboo stalk growing out of water.
    Bamboo,
    /// A pumpkin.
    Pumpkin,
}

/// Static attributes of one block type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlockAttributes {
    /// Column and row of the type's tile in the texture atlas.
    pub tile: [u8; 2],
    /// Solidity, from 0 (passable) to 1 (solid).
    pub tangibility: f32,
}

/// Attributes for every `BlockType`, indexed by discriminant.
pub static BLOCK_TABLE: [BlockAttributes; 12] = [
    BlockAttributes { tile: [0, 0], tangibility: 1.0 },   // None
    BlockAttributes { tile: [0, 0], tangibility: 1.0 },   // Gravel
    BlockAttributes { tile: [0, 1], tangibility: 1.0 },   // Rock
    BlockAttributes { tile: [2, 0], tangibility: 1.0 },   // Dirt
    BlockAttributes { tile: [2, 1], tangibility: 1.0 },   // Sand
    BlockAttributes { tile: [1, 1], tangibility: 1.0 },   // Bedrock
    BlockAttributes { tile: [15, 13], tangibility: 0.2 }, // Water
    BlockAttributes { tile: [4, 1], tangibility: 1.0 },   // Wood
    BlockAttributes { tile: [4, 3], tangibility: 0.5 },   // Leaves
    BlockAttributes { tile: [7, 2], tangibility: 0.0 },   // Grass
    BlockAttributes { tile: [9, 4], tangibility: 0.6 },   // Bamboo
    BlockAttributes { tile: [6, 7], tangibility: 1.0 },   // Pumpkin
];

impl BlockType {
    /// Converts a stored discriminant back into a `BlockType`.
    ///
    /// Returns `None` for values outside the table.
    pub fn from_index(index: BlockTypeSize) -> Option<Self> {
        FromPrimitive::from_u8(index)
    }

    /// The compact form of this type.
    pub fn index(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    /// Static attributes of this type.
    pub fn attributes(self) -> &'static BlockAttributes {
        &BLOCK_TABLE[self as usize]
    }

    /// Atlas tile coordinates.
    pub fn tile(self) -> [u8; 2] {
        self.attributes().tile
    }

    /// Solidity in `[0, 1]`.
    pub fn tangibility(self) -> f32 {
        self.attributes().tangibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_discriminant_round_trips_and_has_a_table_row() {
        for index in 0..BLOCK_TABLE.len() as BlockTypeSize {
            let block_type = BlockType::from_index(index).unwrap();
            assert_eq!(block_type.index(), index);
        }
        assert_eq!(BlockType::from_index(BLOCK_TABLE.len() as BlockTypeSize), None);
    }

    #[test]
    fn tangibility_stays_in_unit_range() {
        for row in BLOCK_TABLE.iter() {
            assert!((0.0..=1.0).contains(&row.tangibility));
        }
        assert_eq!(BlockType::Bedrock.tangibility(), 1.0);
        assert!(BlockType::Water.tangibility() < BlockType::Dirt.tangibility());
    }
}
