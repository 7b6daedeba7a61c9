//! Multi-block structures placed by generation rules.

use cgmath::Vector3;

use super::rules::Placement;
use crate::engine_state::voxels::block::block_type::BlockType;

/// A single block at the anchor.
pub fn single(block_type: BlockType) -> Vec<Placement> {
    vec![Placement::new(block_type, 0, 0, 0)]
}

/// A vertical run of `height` blocks starting at the anchor.
pub fn pillar(block_type: BlockType, height: i32) -> Vec<Placement> {
    (0..height)
        .map(|dy| Placement::new(block_type, 0, dy, 0))
        .collect()
}

/// A tree: a wooden trunk `height` blocks tall with a checkerboard crown of leaves.
///
/// The crown spans `-crown_width..=crown_width` on both horizontal axes and starts at the
/// top trunk block, rising `crown_height` more levels. Crown cells whose offset sum is odd
/// stay empty. The trunk is listed first so it claims the top block before the crown.
pub fn tree(height: i32, crown_width: i32, crown_height: i32) -> Vec<Placement> {
    let mut placements = pillar(BlockType::Wood, height);
    for dx in -crown_width..=crown_width {
        for dy in 0..=crown_height {
            for dz in -crown_width..=crown_width {
                if (dx + dy + dz).rem_euclid(2) != 0 {
                    continue;
                }
                let offset = Vector3::new(dx, dy + height - 1, dz);
                if placements.iter().any(|placement| placement.offset == offset) {
                    continue;
                }
                placements.push(Placement {
                    block_type: BlockType::Leaves,
                    offset,
                });
            }
        }
    }
    placements
}

/// Three bamboo stalks centred on the anchor, the lowest one block below it.
pub fn bamboo() -> Vec<Placement> {
    (-1..=1)
        .map(|dy| Placement::new(BlockType::Bamboo, 0, dy, 0))
        .collect()
}
