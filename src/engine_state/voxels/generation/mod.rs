//! # Generation Module
//!
//! Fills chunks from an ordered rule list.
//!
//! ## Process
//! For every rule, for every creation test of the rule, every cell of the chunk whose
//! height falls inside one of the test's level windows is asked how many times to place
//! the rule's structure there. Placements go straight into the
//! [`BlockStore`], following the test's replacement strategy.
//!
//! Generation is deterministic: the same seed, rules and chunk request order produce the
//! same blocks. Structures may reach outside the chunk being generated; those blocks land
//! in the neighbouring chunk's box like any other write.

use cgmath::{Point3, Vector3};
use log::debug;
use std::rc::Rc;

use rules::{default_rules, Placement, ReplaceFilter, ReplaceStrategy, Rule};

use super::block_store::BlockStore;
use super::chunk::ChunkId;
use super::noise_source::NoiseSource;
use super::block::block_type::BlockType;

pub mod rules;
pub mod structures;

/// Applies generation rules to chunks.
#[derive(Debug)]
pub struct ChunkGenerator {
    noise: Rc<NoiseSource>,
    rules: Vec<Rule>,
}

impl ChunkGenerator {
    /// Creates a generator applying `rules` in order.
    pub fn new(noise: Rc<NoiseSource>, rules: Vec<Rule>) -> Self {
        ChunkGenerator { noise, rules }
    }

    /// Creates a generator with the built-in rule table.
    pub fn with_default_rules(noise: Rc<NoiseSource>) -> Self {
        Self::new(noise, default_rules())
    }

    /// The rules applied, in order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The noise source rules sample.
    pub fn noise(&self) -> &NoiseSource {
        &self.noise
    }

    /// Furthest horizontal offset any rule places a block at.
    pub fn reach(&self) -> i32 {
        self.rules
            .iter()
            .flat_map(|rule| rule.structure.iter())
            .map(|placement| placement.offset.x.abs().max(placement.offset.z.abs()))
            .max()
            .unwrap_or(0)
    }

    /// Runs every rule over the chunk's voxel box.
    ///
    /// # Returns
    /// The number of blocks written.
    pub fn generate(&self, store: &mut BlockStore, chunk: ChunkId) -> usize {
        let world_height = store.world_height();
        let mut placed = 0;

        for rule in &self.rules {
            for test in &rule.create {
                for (position, _) in store.chunk_cells(chunk.cx, chunk.cz) {
                    let window = match test.window_for(position.y) {
                        Some(window) => window,
                        None => continue,
                    };
                    let count = test.placement_count(&self.noise, position, window, world_height);
                    for repetition in 0..count as i32 {
                        let anchor = match test.replace {
                            ReplaceStrategy::Stack => position,
                            _ => position + Vector3::new(0, repetition, 0),
                        };
                        placed += place_structure(
                            store,
                            anchor,
                            &rule.structure,
                            test.replace,
                            &test.filter,
                        );
                    }
                }
            }
        }

        debug!("Generated chunk {}: {} blocks written", chunk, placed);
        placed
    }
}

/// Places a structure at `anchor` using `strategy`.
///
/// With [`ReplaceStrategy::Stack`] the anchor's height is ignored: the structure is rooted
/// one above the anchor column's highest block, provided that block is below the top
/// layer and passes `filter`, and each of its blocks only fills an empty cell. Every other
/// strategy applies to each block's target cell independently.
///
/// # Returns
/// The number of blocks written.
pub fn place_structure(
    store: &mut BlockStore,
    anchor: Point3<i32>,
    structure: &[Placement],
    strategy: ReplaceStrategy,
    filter: &ReplaceFilter,
) -> usize {
    if strategy == ReplaceStrategy::Stack {
        let elevation = store.get_elevation_at(anchor.x, anchor.z);
        if elevation >= store.world_height() - 1 {
            return 0;
        }
        let top = store
            .get_most_elevated_block_at(anchor.x, anchor.z)
            .map(|block| block.block_type);
        if !filter.allows(top) {
            return 0;
        }

        let root = Point3::new(anchor.x, elevation + 1, anchor.z);
        return structure
            .iter()
            .filter(|placement| {
                let target = root + placement.offset;
                !store.is_occupied(target) && store.place(target, placement.block_type)
            })
            .count();
    }

    structure
        .iter()
        .filter(|placement| {
            let target = anchor + placement.offset;
            let existing = store.block(target).map(|block| block.block_type);
            let permitted = match strategy {
                ReplaceStrategy::DontReplace => existing.is_none(),
                ReplaceStrategy::OnlyReplace => existing.is_some(),
                ReplaceStrategy::Replace | ReplaceStrategy::Stack => true,
            };
            permitted && filter.allows(existing) && store.place(target, placement.block_type)
        })
        .count()
}

/// Places a single block using `strategy`, returning whether it was written.
pub fn place_block(
    store: &mut BlockStore,
    position: Point3<i32>,
    block_type: BlockType,
    strategy: ReplaceStrategy,
    filter: &ReplaceFilter,
) -> bool {
    let structure = [Placement::new(block_type, 0, 0, 0)];
    place_structure(store, position, &structure, strategy, filter) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::generation::rules::CreationSource;
    use crate::engine_state::voxels::generation::rules::CreationTest;
    use crate::engine_state::voxels::noise_source::NoiseParams;

    fn open() -> ReplaceFilter {
        ReplaceFilter::default()
    }

    fn type_at(store: &BlockStore, x: i32, y: i32, z: i32) -> Option<BlockType> {
        store.block(Point3::new(x, y, z)).map(|block| block.block_type)
    }

    #[test]
    fn dont_replace_keeps_first_block() {
        let mut store = BlockStore::new(16, 24);
        let cell = Point3::new(5, 3, 5);

        assert!(place_block(&mut store, cell, BlockType::Rock, ReplaceStrategy::DontReplace, &open()));
        assert!(!place_block(&mut store, cell, BlockType::Sand, ReplaceStrategy::DontReplace, &open()));

        assert_eq!(type_at(&store, 5, 3, 5), Some(BlockType::Rock));
    }

    #[test]
    fn only_replace_needs_an_existing_block() {
        let mut store = BlockStore::new(16, 24);

        assert!(!place_block(
            &mut store,
            Point3::new(5, 3, 5),
            BlockType::Gravel,
            ReplaceStrategy::OnlyReplace,
            &open()
        ));
        assert_eq!(type_at(&store, 5, 3, 5), None);

        store.place(Point3::new(5, 3, 5), BlockType::Dirt);
        assert!(place_block(
            &mut store,
            Point3::new(5, 3, 5),
            BlockType::Gravel,
            ReplaceStrategy::OnlyReplace,
            &open()
        ));
        assert_eq!(type_at(&store, 5, 3, 5), Some(BlockType::Gravel));
    }

    #[test]
    fn replace_always_overwrites() {
        let mut store = BlockStore::new(16, 24);
        store.place(Point3::new(1, 1, 1), BlockType::Dirt);

        assert!(place_block(&mut store, Point3::new(1, 1, 1), BlockType::Rock, ReplaceStrategy::Replace, &open()));
        assert!(place_block(&mut store, Point3::new(2, 1, 1), BlockType::Rock, ReplaceStrategy::Replace, &open()));

        assert_eq!(type_at(&store, 1, 1, 1), Some(BlockType::Rock));
        assert_eq!(type_at(&store, 2, 1, 1), Some(BlockType::Rock));
    }

    #[test]
    fn stack_grows_on_the_column_top() {
        let mut store = BlockStore::new(16, 24);
        for y in 0..=2 {
            store.place(Point3::new(5, y, 5), BlockType::Dirt);
        }

        for _ in 0..3 {
            // The anchor height is ignored.
            assert!(place_block(&mut store, Point3::new(5, 17, 5), BlockType::Wood, ReplaceStrategy::Stack, &open()));
        }

        assert_eq!(type_at(&store, 5, 3, 5), Some(BlockType::Wood));
        assert_eq!(type_at(&store, 5, 4, 5), Some(BlockType::Wood));
        assert_eq!(type_at(&store, 5, 5, 5), Some(BlockType::Wood));
        assert_eq!(type_at(&store, 5, 6, 5), None);
        assert_eq!(store.get_elevation_at(5, 5), 5);
    }

    #[test]
    fn stack_stops_below_the_world_top_and_honours_filter() {
        let mut store = BlockStore::new(16, 4);
        for y in 0..4 {
            store.place(Point3::new(0, y, 0), BlockType::Dirt);
        }
        assert!(!place_block(&mut store, Point3::new(0, 0, 0), BlockType::Wood, ReplaceStrategy::Stack, &open()));

        store.place(Point3::new(3, 0, 0), BlockType::Sand);
        let dirt_only = ReplaceFilter {
            include: vec![BlockType::Dirt],
            exclude: vec![],
        };
        assert!(!place_block(&mut store, Point3::new(3, 0, 0), BlockType::Grass, ReplaceStrategy::Stack, &dirt_only));
        assert_eq!(store.get_elevation_at(3, 0), 0);
    }

    #[test]
    fn stacked_structures_only_fill_empty_cells() {
        let mut store = BlockStore::new(16, 24);
        store.place(Point3::new(0, 0, 0), BlockType::Water);
        let written = place_structure(
            &mut store,
            Point3::new(0, 0, 0),
            &structures::bamboo(),
            ReplaceStrategy::Stack,
            &open(),
        );

        assert_eq!(written, 2);
        assert_eq!(type_at(&store, 0, 0, 0), Some(BlockType::Water));
        assert_eq!(type_at(&store, 0, 1, 0), Some(BlockType::Bamboo));
        assert_eq!(type_at(&store, 0, 2, 0), Some(BlockType::Bamboo));
    }

    #[test]
    fn generation_is_deterministic() {
        let first = ChunkGenerator::with_default_rules(Rc::new(NoiseSource::new(123)));
        let second = ChunkGenerator::with_default_rules(Rc::new(NoiseSource::new(123)));
        let mut a = BlockStore::new(8, 16);
        let mut b = BlockStore::new(8, 16);

        for chunk in [ChunkId::new(0, 0), ChunkId::new(1, 0), ChunkId::new(-1, 2)] {
            assert_eq!(first.generate(&mut a, chunk), second.generate(&mut b, chunk));
        }

        assert_eq!(a.len(), b.len());
        for block in a.blocks() {
            let other = b.block(block.position).unwrap();
            assert_eq!(other.block_type, block.block_type);
        }
    }

    #[test]
    fn default_rules_lay_bedrock_and_terrain() {
        let generator = ChunkGenerator::with_default_rules(Rc::new(NoiseSource::new(7)));
        let mut store = BlockStore::new(8, 24);
        generator.generate(&mut store, ChunkId::new(0, 0));

        store.traverse_chunk_2d(0, 0, |x, z| {
            assert_eq!(type_at(&store, x, 0, z), Some(BlockType::Bedrock));
            assert!(store.get_elevation_at(x, z) >= 2);
        });
        for block in store.blocks() {
            assert!((0..24).contains(&block.position.y));
        }
    }

    #[test]
    fn reach_covers_the_widest_structure() {
        let generator = ChunkGenerator::with_default_rules(Rc::new(NoiseSource::new(7)));
        assert_eq!(generator.reach(), 2);

        let pillars = vec![Rule::new("pillar", structures::pillar(BlockType::Rock, 5))];
        assert_eq!(ChunkGenerator::new(Rc::new(NoiseSource::new(7)), pillars).reach(), 0);
    }

    #[test]
    fn repeat_tests_stack_columns_to_their_count() {
        let rules = vec![
            Rule::new("floor", structures::single(BlockType::Bedrock)).with(
                CreationTest::new(CreationSource::Constant { count: 1 }, ReplaceStrategy::Replace)
                    .level(0, 1),
            ),
            Rule::new("layer", structures::single(BlockType::Dirt)).with(
                CreationTest::new(
                    CreationSource::Simplex2D(NoiseParams::new(0, 0.1, 0).shaped(1.0, 0.0)),
                    ReplaceStrategy::Stack,
                )
                .repeat()
                .level(1, 9),
            ),
        ];
        let generator = ChunkGenerator::new(Rc::new(NoiseSource::new(1)), rules);
        let mut store = BlockStore::new(2, 16);

        // Flat 0.5 over an 8-high window stacks 4 blocks on the floor.
        assert_eq!(generator.generate(&mut store, ChunkId::new(0, 0)), 4 + 4 * 4);
        store.traverse_chunk_2d(0, 0, |x, z| assert_eq!(store.get_elevation_at(x, z), 4));
    }
}
