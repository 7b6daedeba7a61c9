//! # Generation Rules
//!
//! Static configuration describing what the generator places and where.
//!
//! A [`Rule`] pairs a structure (blocks at offsets from an anchor) with an ordered list of
//! [`CreationTest`]s. Each test picks the heights it looks at, the source that decides
//! whether (and how often) to place, and how placement treats cells that are already
//! occupied. Noise sources carry their own parameters, so a test cannot ask for a
//! parameter its source does not use.

use cgmath::{Point3, Vector3};

use super::structures;
use crate::engine_state::voxels::block::block_type::BlockType;
use crate::engine_state::voxels::noise_source::{NoiseParams, NoiseSource};

/// One block of a structure, relative to the structure's anchor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Placement {
    /// Block placed at this offset.
    pub block_type: BlockType,
    /// Offset from the anchor.
    pub offset: Vector3<i32>,
}

impl Placement {
    /// Creates a placement at `(dx, dy, dz)` from the anchor.
    pub fn new(block_type: BlockType, dx: i32, dy: i32, dz: i32) -> Self {
        Placement {
            block_type,
            offset: Vector3::new(dx, dy, dz),
        }
    }
}

/// A half-open band of heights, `[min, max)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevelWindow {
    /// Lowest height inside the window.
    pub min: i32,
    /// First height above the window.
    pub max: i32,
}

impl LevelWindow {
    /// Creates the window `[min, max)`.
    pub fn new(min: i32, max: i32) -> Self {
        LevelWindow { min, max }
    }

    /// Returns `true` if `y` lies inside the window.
    pub fn contains(&self, y: i32) -> bool {
        y >= self.min && y < self.max
    }

    /// Number of heights covered.
    pub fn height(&self) -> i32 {
        (self.max - self.min).max(0)
    }
}

/// What decides whether a test places its structure.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CreationSource {
    /// Always places `count` times.
    Constant {
        /// Placements per cell.
        count: u32,
    },
    /// Places once with probability `chance`, from a seeded per-cell value.
    Random {
        /// Mixed into the world seed.
        salt: u32,
        /// Probability in `[0, 1]`.
        chance: f64,
    },
    /// Perlin noise over `(x, z)`.
    Perlin3D(NoiseParams),
    /// Perlin noise over `(x, z, y)`.
    Perlin4D(NoiseParams),
    /// Simplex noise over `(x, z)`.
    Simplex2D(NoiseParams),
    /// Simplex noise over `(x, z, y)`.
    Simplex3D(NoiseParams),
    /// Simplex noise over `(x, z, y, time)`.
    Simplex4D(NoiseParams),
}

impl CreationSource {
    /// Continuous value of a noise source at `position`, `None` for constant and random
    /// sources.
    pub fn noise_value(&self, noise: &NoiseSource, position: Point3<i32>) -> Option<f64> {
        let (x, y, z) = (position.x as f64, position.y as f64, position.z as f64);
        match self {
            CreationSource::Constant { .. } | CreationSource::Random { .. } => None,
            CreationSource::Perlin3D(params) => Some(noise.perlin_3d(x, z, params)),
            CreationSource::Perlin4D(params) => Some(noise.perlin_4d(x, y, z, params)),
            CreationSource::Simplex2D(params) => Some(noise.simplex_2d(x, z, params)),
            CreationSource::Simplex3D(params) => Some(noise.simplex_3d(x, y, z, params)),
            CreationSource::Simplex4D(params) => Some(noise.simplex_4d(x, y, z, params)),
        }
    }
}

/// How a noise value turns into a number of placements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CountMode {
    /// Place once where the value exceeds the threshold.
    Threshold(f64),
    /// Place `floor(value × window height)` times, clamped to the world height. Evaluated
    /// once per column, at the window's lowest height.
    Repeat,
}

/// How a placement treats the cell it targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplaceStrategy {
    /// Place only into an empty cell.
    DontReplace,
    /// Place unconditionally, overwriting whatever is there.
    Replace,
    /// Place only over an existing block.
    OnlyReplace,
    /// Ignore the target height and grow on top of the column's highest block.
    Stack,
}

/// Restricts which existing blocks a placement may act on.
///
/// For [`ReplaceStrategy::Stack`] the filter looks at the column's top block; otherwise at
/// the target cell. An empty cell passes only when `include` is empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplaceFilter {
    /// If not empty, the existing block must be one of these.
    pub include: Vec<BlockType>,
    /// The existing block must not be one of these.
    pub exclude: Vec<BlockType>,
}

impl ReplaceFilter {
    /// Returns `true` if a placement may act on `existing`.
    pub fn allows(&self, existing: Option<BlockType>) -> bool {
        match existing {
            Some(block_type) => {
                !self.exclude.contains(&block_type)
                    && (self.include.is_empty() || self.include.contains(&block_type))
            }
            None => self.include.is_empty(),
        }
    }
}

/// One way a rule's structure gets placed.
#[derive(Clone, Debug, PartialEq)]
pub struct CreationTest {
    /// Decides whether and how often to place.
    pub source: CreationSource,
    /// Turns noise values into placement counts.
    pub count_mode: CountMode,
    /// How placements treat occupied cells.
    pub replace: ReplaceStrategy,
    /// Heights this test is evaluated at.
    pub levels: Vec<LevelWindow>,
    /// Which existing blocks placements may act on.
    pub filter: ReplaceFilter,
}

impl CreationTest {
    /// A test placing once wherever `source` exceeds 0.5, at no heights yet.
    pub fn new(source: CreationSource, replace: ReplaceStrategy) -> Self {
        CreationTest {
            source,
            count_mode: CountMode::Threshold(0.5),
            replace,
            levels: Vec::new(),
            filter: ReplaceFilter::default(),
        }
    }

    /// Adds the height window `[min, max)`.
    pub fn level(mut self, min: i32, max: i32) -> Self {
        self.levels.push(LevelWindow::new(min, max));
        self
    }

    /// Places once where the noise value exceeds `threshold`.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.count_mode = CountMode::Threshold(threshold);
        self
    }

    /// Uses the noise value as a repeat count.
    pub fn repeat(mut self) -> Self {
        self.count_mode = CountMode::Repeat;
        self
    }

    /// Restricts placement to existing blocks of these types.
    pub fn include(mut self, block_types: &[BlockType]) -> Self {
        self.filter.include.extend_from_slice(block_types);
        self
    }

    /// Forbids placement over existing blocks of these types.
    pub fn exclude(mut self, block_types: &[BlockType]) -> Self {
        self.filter.exclude.extend_from_slice(block_types);
        self
    }

    /// The first window containing `y`.
    pub fn window_for(&self, y: i32) -> Option<LevelWindow> {
        self.levels.iter().copied().find(|window| window.contains(y))
    }

    /// Number of times the structure is placed for the cell at `position`.
    pub fn placement_count(
        &self,
        noise: &NoiseSource,
        position: Point3<i32>,
        window: LevelWindow,
        world_height: i32,
    ) -> u32 {
        match self.source {
            CreationSource::Constant { count } => count,
            CreationSource::Random { salt, chance } => {
                let value = noise.random(position.x, position.y, position.z, salt);
                u32::from(value < chance)
            }
            _ => {
                let value = match self.source.noise_value(noise, position) {
                    Some(value) => value,
                    None => return 0,
                };
                match self.count_mode {
                    CountMode::Threshold(threshold) => u32::from(value > threshold),
                    CountMode::Repeat if position.y == window.min => {
                        let count = (value * window.height() as f64).floor();
                        count.clamp(0.0, world_height.max(0) as f64) as u32
                    }
                    CountMode::Repeat => 0,
                }
            }
        }
    }
}

/// A structure and the tests that place it.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// Label used in logs.
    pub name: &'static str,
    /// Blocks placed relative to the anchor.
    pub structure: Vec<Placement>,
    /// Tests applied in order.
    pub create: Vec<CreationTest>,
}

impl Rule {
    /// Creates a rule with no tests.
    pub fn new(name: &'static str, structure: Vec<Placement>) -> Self {
        Rule {
            name,
            structure,
            create: Vec::new(),
        }
    }

    /// Appends a creation test.
    pub fn with(mut self, test: CreationTest) -> Self {
        self.create.push(test);
        self
    }
}

/// The built-in world: bedrock, layered terrain, water, vegetation.
///
/// Order matters. Terrain rules stack columns up first, material rules then rewrite what
/// terrain produced, and decoration rules grow on the final surface.
pub fn default_rules() -> Vec<Rule> {
    use structures::{bamboo, single, tree};
    use BlockType::*;

    vec![
        Rule::new("bedrock", single(Bedrock)).with(
            CreationTest::new(CreationSource::Constant { count: 1 }, ReplaceStrategy::Replace)
                .level(0, 1),
        ),
        Rule::new("soil", single(Dirt)).with(
            CreationTest::new(
                CreationSource::Simplex2D(
                    NoiseParams::new(10, 0.04, 2).scale_step(1.11).shaped(1.0, 0.3),
                ),
                ReplaceStrategy::Stack,
            )
            .repeat()
            .level(1, 8),
        ),
        Rule::new("gravel beds", single(Gravel)).with(
            CreationTest::new(
                CreationSource::Perlin3D(NoiseParams::new(123, 0.06, 1).shaped(1.0, -0.5)),
                ReplaceStrategy::Stack,
            )
            .repeat()
            .level(1, 5),
        ),
        Rule::new("hills", single(Dirt)).with(
            CreationTest::new(
                CreationSource::Simplex2D(
                    NoiseParams::new(2234, 0.02, 3).scale_step(1.6).shaped(1.2, -0.55),
                ),
                ReplaceStrategy::Stack,
            )
            .repeat()
            .level(6, 18)
            .exclude(&[Wood, Leaves]),
        ),
        Rule::new("shore sand", single(Sand)).with(
            CreationTest::new(
                CreationSource::Perlin3D(NoiseParams::new(441, 0.03, 2).shaped(1.0, 0.0)),
                ReplaceStrategy::OnlyReplace,
            )
            .threshold(0.45)
            .level(1, 4)
            .include(&[Dirt, Gravel]),
        ),
        Rule::new("rock veins", single(Rock)).with(
            CreationTest::new(
                CreationSource::Simplex3D(NoiseParams::new(545, 0.09, 2).scale_step(1.5)),
                ReplaceStrategy::OnlyReplace,
            )
            .threshold(0.68)
            .level(1, 12)
            .include(&[Dirt, Gravel]),
        ),
        Rule::new("gravel pockets", single(Gravel)).with(
            CreationTest::new(
                CreationSource::Perlin4D(NoiseParams::new(455, 0.11, 1)),
                ReplaceStrategy::OnlyReplace,
            )
            .threshold(0.72)
            .level(1, 6)
            .include(&[Dirt]),
        ),
        Rule::new("water", single(Water)).with(
            CreationTest::new(CreationSource::Constant { count: 1 }, ReplaceStrategy::DontReplace)
                .level(1, 4),
        ),
        Rule::new("large trees", tree(4, 2, 3)).with(
            CreationTest::new(
                CreationSource::Random {
                    salt: 1233,
                    chance: 0.012,
                },
                ReplaceStrategy::Stack,
            )
            .level(0, 1)
            .include(&[Dirt]),
        ),
        Rule::new("small trees", tree(2, 1, 2)).with(
            CreationTest::new(
                CreationSource::Simplex2D(NoiseParams::new(11313, 0.3, 1).shaped(0.5, 0.0)),
                ReplaceStrategy::Stack,
            )
            .threshold(0.44)
            .level(0, 1)
            .include(&[Dirt]),
        ),
        Rule::new("grass", single(Grass)).with(
            CreationTest::new(
                CreationSource::Simplex2D(
                    NoiseParams::new(1244, 0.2, 2).scale_step(1.1).shaped(1.0, 0.0),
                ),
                ReplaceStrategy::Stack,
            )
            .threshold(0.55)
            .level(0, 1)
            .include(&[Dirt]),
        ),
        Rule::new("bamboo", bamboo()).with(
            CreationTest::new(
                CreationSource::Simplex2D(NoiseParams::new(412, 0.2, 1).scale_step(1.2)),
                ReplaceStrategy::Stack,
            )
            .threshold(0.7)
            .level(0, 1)
            .include(&[Water]),
        ),
        Rule::new("pumpkins", single(Pumpkin)).with(
            CreationTest::new(
                CreationSource::Random {
                    salt: 4410,
                    chance: 0.004,
                },
                ReplaceStrategy::Stack,
            )
            .level(0, 1)
            .include(&[Dirt]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_checks_include_and_exclude() {
        let open = ReplaceFilter::default();
        assert!(open.allows(None));
        assert!(open.allows(Some(BlockType::Rock)));

        let dirt_only = ReplaceFilter {
            include: vec![BlockType::Dirt],
            exclude: vec![],
        };
        assert!(dirt_only.allows(Some(BlockType::Dirt)));
        assert!(!dirt_only.allows(Some(BlockType::Sand)));
        assert!(!dirt_only.allows(None));

        let no_wood = ReplaceFilter {
            include: vec![],
            exclude: vec![BlockType::Wood],
        };
        assert!(!no_wood.allows(Some(BlockType::Wood)));
        assert!(no_wood.allows(None));
    }

    #[test]
    fn windows_are_half_open() {
        let test = CreationTest::new(CreationSource::Constant { count: 1 }, ReplaceStrategy::Replace)
            .level(1, 4)
            .level(10, 11);

        assert_eq!(test.window_for(0), None);
        assert_eq!(test.window_for(3), Some(LevelWindow::new(1, 4)));
        assert_eq!(test.window_for(4), None);
        assert_eq!(test.window_for(10), Some(LevelWindow::new(10, 11)));
    }

    #[test]
    fn repeat_counts_once_per_column_and_clamps() {
        let noise = NoiseSource::new(5);
        // Zero octaves give a flat 0.5 before shaping: 0.5 * 4 - 0.5 = 1.5
        let test = CreationTest::new(
            CreationSource::Perlin3D(NoiseParams::new(0, 0.1, 0).shaped(4.0, -0.5)),
            ReplaceStrategy::Stack,
        )
        .repeat()
        .level(2, 8);
        let window = LevelWindow::new(2, 8);

        assert_eq!(test.placement_count(&noise, Point3::new(0, 2, 0), window, 24), 9);
        assert_eq!(test.placement_count(&noise, Point3::new(0, 3, 0), window, 24), 0);
        assert_eq!(test.placement_count(&noise, Point3::new(0, 2, 0), window, 5), 5);
    }

    #[test]
    fn threshold_and_constant_counts() {
        let noise = NoiseSource::new(5);
        let window = LevelWindow::new(0, 1);
        let flat_high = CreationSource::Simplex2D(NoiseParams::new(0, 0.1, 0).shaped(1.0, 0.2));

        let above = CreationTest::new(flat_high, ReplaceStrategy::Replace).threshold(0.6);
        let below = CreationTest::new(flat_high, ReplaceStrategy::Replace).threshold(0.8);
        let constant = CreationTest::new(CreationSource::Constant { count: 3 }, ReplaceStrategy::Replace);

        assert_eq!(above.placement_count(&noise, Point3::new(1, 0, 1), window, 24), 1);
        assert_eq!(below.placement_count(&noise, Point3::new(1, 0, 1), window, 24), 0);
        assert_eq!(constant.placement_count(&noise, Point3::new(1, 0, 1), window, 24), 3);
    }

    #[test]
    fn random_source_respects_extreme_chances() {
        let noise = NoiseSource::new(8);
        let window = LevelWindow::new(0, 1);
        let never = CreationTest::new(
            CreationSource::Random { salt: 1, chance: 0.0 },
            ReplaceStrategy::Replace,
        );
        let always = CreationTest::new(
            CreationSource::Random { salt: 1, chance: 1.0 },
            ReplaceStrategy::Replace,
        );

        for x in 0..32 {
            let position = Point3::new(x, 0, -x);
            assert_eq!(never.placement_count(&noise, position, window, 24), 0);
            assert_eq!(always.placement_count(&noise, position, window, 24), 1);
        }
    }

    #[test]
    fn default_table_is_well_formed() {
        let rules = default_rules();
        assert_eq!(rules[0].name, "bedrock");
        for rule in &rules {
            assert!(!rule.structure.is_empty(), "{}", rule.name);
            assert!(!rule.create.is_empty(), "{}", rule.name);
            for test in &rule.create {
                assert!(!test.levels.is_empty(), "{}", rule.name);
            }
        }
    }
}
