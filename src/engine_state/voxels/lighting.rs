//! # Lighting Module
//!
//! Ambient-occlusion style shading. Blocks with more neighbours above them get darker.
//!
//! For every block of a chunk, each occupied cell in the cube of half-width `radius`
//! around it multiplies the block's lightness by `lerp(1, 0.95, shading)`, where
//! `shading` is non-zero only for neighbours strictly above the block. New values are
//! computed for the whole chunk before any is written, so the pass does not depend on
//! traversal order.

use cgmath::Point3;
use log::debug;

use super::block_store::BlockStore;

/// Lightness multiplier applied by a fully shading neighbour.
const MAX_OCCLUSION: f32 = 0.95;

/// Shading contributed by a neighbour at offset `(dx, dy, dz)`, in `[0, 1]`.
///
/// Neighbours at or below the block's height contribute nothing. Otherwise the factor is
/// the average of four distance terms raised to the power 1.5.
pub fn shading_factor(dx: i32, dy: i32, dz: i32, radius: i32) -> f32 {
    if dy < 1 || radius < 1 {
        return 0.0;
    }
    let radius = radius as f32;
    let terms = [
        (dy as f32 + radius) / (radius * 2.0),
        dx.abs() as f32 / radius,
        dy.abs() as f32 / radius,
        dz.abs() as f32 / radius,
    ];
    terms.iter().map(|term| term.powf(1.5)).sum::<f32>() / 4.0
}

/// Lightness of the block at `position` given its current neighbourhood.
pub fn occluded_lightness(store: &BlockStore, position: Point3<i32>, radius: i32) -> f32 {
    let mut lightness = 1.0f32;
    store.iterate_siblings(position, radius.max(0), |dx, dy, dz, block| {
        if block.is_some() {
            let shading = shading_factor(dx, dy, dz, radius);
            lightness *= 1.0 + (MAX_OCCLUSION - 1.0) * shading;
        }
    });
    lightness
}

/// Recomputes lightness for every block of chunk `(cx, cz)`.
///
/// # Returns
/// The number of blocks whose lightness changed.
pub fn update_chunk_lighting(store: &mut BlockStore, cx: i32, cz: i32, radius: i32) -> usize {
    let mut pending = Vec::new();
    let view: &BlockStore = store;
    view.traverse_chunk(cx, cz, |position, _, block| {
        if let Some(block) = block {
            pending.push((position, occluded_lightness(view, position, radius), block.block_type));
        }
    });

    let changed = pending
        .into_iter()
        .filter(|(position, lightness, block_type)| {
            store.update_block(*position, *lightness, *block_type)
        })
        .count();
    debug!("Relit chunk {}_{}: {} blocks changed", cx, cz, changed);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn only_neighbours_above_shade() {
        assert_eq!(shading_factor(1, 0, 1, 2), 0.0);
        assert_eq!(shading_factor(0, -2, 0, 2), 0.0);

        // (3/4)^1.5 + 0 + (1/2)^1.5 + 0, averaged
        let expected = (0.75f32.powf(1.5) + 0.5f32.powf(1.5)) / 4.0;
        assert!((shading_factor(0, 1, 0, 2) - expected).abs() < 1e-6);
        assert!(shading_factor(2, 2, 2, 2) <= 1.0);
        assert!(shading_factor(2, 2, 2, 2) > shading_factor(0, 1, 0, 2));
    }

    #[test]
    fn lone_block_stays_fully_lit() {
        let mut store = BlockStore::new(4, 8);
        store.place(Point3::new(1, 1, 1), BlockType::Dirt);

        assert_eq!(update_chunk_lighting(&mut store, 0, 0, 2), 0);
        assert_eq!(store.block(Point3::new(1, 1, 1)).unwrap().lightness, 1.0);
    }

    #[test]
    fn covered_blocks_darken_and_pass_is_stable() {
        let mut store = BlockStore::new(4, 8);
        for y in 0..4 {
            store.place(Point3::new(1, y, 1), BlockType::Dirt);
        }
        store.mark_blocks_updated(0, 0);

        assert_eq!(update_chunk_lighting(&mut store, 0, 0, 2), 3);
        let bottom = store.block(Point3::new(1, 0, 1)).unwrap().lightness;
        let top = store.block(Point3::new(1, 3, 1)).unwrap().lightness;
        assert!(bottom < 1.0);
        assert_eq!(top, 1.0);
        assert_eq!(store.count_blocks_need_update(0, 0), 3);

        // Same neighbourhood, same result: nothing changes on a second pass.
        assert_eq!(update_chunk_lighting(&mut store, 0, 0, 2), 0);
    }

    #[test]
    fn zero_radius_leaves_lightness_alone() {
        let mut store = BlockStore::new(4, 8);
        store.place(Point3::new(0, 0, 0), BlockType::Dirt);
        store.place(Point3::new(0, 1, 0), BlockType::Dirt);

        assert_eq!(update_chunk_lighting(&mut store, 0, 0, 0), 0);
    }
}
