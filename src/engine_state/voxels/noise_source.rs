//! # Noise Source Module
//!
//! Deterministic seeded randomness and coherent noise for world generation.
//!
//! Every value is a pure function of the world seed, a per-caller salt, the sample
//! coordinates and the sampling parameters. The only state kept is a small cache of
//! constructed noise generators, keyed by kind and effective seed, so repeated samples do
//! not rebuild permutation tables.

use lru::LruCache;
use noise::{NoiseFn, Perlin, Simplex};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, num::NonZeroUsize};

/// Number of distinct `(kind, seed)` generators kept alive.
const GENERATOR_CACHE_SIZE: usize = 32;

/// Third or fourth coordinate used by Perlin samples over a fixed plane. Kept off the
/// integer lattice, where Perlin noise is always zero.
const PERLIN_PLANE: f64 = 0.5;

/// Family of coherent noise.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseKind {
    /// Gradient noise on a square lattice.
    Perlin,
    /// Gradient noise on a simplex lattice.
    Simplex,
}

/// Shaping parameters for one noise-driven creation test.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    /// Mixed into the world seed so different tests sample unrelated fields.
    pub salt: u32,
    /// Frequency applied to the spatial coordinates.
    pub scale: f64,
    /// Number of octaves averaged. Zero yields a flat mid value.
    pub iterations: u32,
    /// Frequency multiplier between successive octaves.
    pub scale_step: f64,
    /// Applied to the normalized value before `addent`.
    pub multiplier: f64,
    /// Added to the scaled value.
    pub addent: f64,
    /// Fourth coordinate for time-varying samples.
    pub time: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        NoiseParams {
            salt: 0,
            scale: 1.0,
            iterations: 1,
            scale_step: 2.0,
            multiplier: 1.0,
            addent: 0.0,
            time: 0.0,
        }
    }
}

impl NoiseParams {
    /// Parameters with the given salt, frequency and octave count; everything else default.
    pub fn new(salt: u32, scale: f64, iterations: u32) -> Self {
        NoiseParams {
            salt,
            scale,
            iterations,
            ..Default::default()
        }
    }

    /// Sets the octave frequency step.
    pub fn scale_step(mut self, scale_step: f64) -> Self {
        self.scale_step = scale_step;
        self
    }

    /// Sets the multiplier and addent applied after normalization.
    pub fn shaped(mut self, multiplier: f64, addent: f64) -> Self {
        self.multiplier = multiplier;
        self.addent = addent;
        self
    }

    /// Sets the time coordinate.
    pub fn at_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }
}

#[derive(Clone)]
enum Generator {
    Perlin(Perlin),
    Simplex(Simplex),
}

impl Generator {
    fn new(kind: NoiseKind, seed: u32) -> Self {
        match kind {
            NoiseKind::Perlin => Generator::Perlin(Perlin::new(seed)),
            NoiseKind::Simplex => Generator::Simplex(Simplex::new(seed)),
        }
    }

    fn get<const N: usize>(&self, point: [f64; N]) -> f64
    where
        Perlin: NoiseFn<f64, N>,
        Simplex: NoiseFn<f64, N>,
    {
        match self {
            Generator::Perlin(perlin) => perlin.get(point),
            Generator::Simplex(simplex) => simplex.get(point),
        }
    }
}

/// Seeded randomness and coherent noise shared by the world generator.
pub struct NoiseSource {
    seed: u32,
    generators: RefCell<LruCache<(NoiseKind, u32), Generator>>,
}

impl NoiseSource {
    /// Creates a noise source for the given world seed.
    pub fn new(seed: u32) -> Self {
        let capacity = NonZeroUsize::new(GENERATOR_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        NoiseSource {
            seed,
            generators: RefCell::new(LruCache::new(capacity)),
        }
    }

    /// The world seed.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Deterministic value in `[0, 1)` for a cell and salt.
    ///
    /// Equal inputs always give equal outputs; neighbouring cells are uncorrelated.
    pub fn random(&self, x: i32, y: i32, z: i32, salt: u32) -> f64 {
        let mut hash = (self.seed as u64) << 32 | salt as u64;
        for coordinate in [x, y, z] {
            hash = mix(hash ^ coordinate as u32 as u64);
        }
        fastrand::Rng::with_seed(hash).f64()
    }

    /// Raw coherent noise in roughly `[-1, 1]` at `point`.
    pub fn sample<const N: usize>(&self, kind: NoiseKind, salt: u32, point: [f64; N]) -> f64
    where
        Perlin: NoiseFn<f64, N>,
        Simplex: NoiseFn<f64, N>,
    {
        let seed = self.seed.wrapping_add(salt);
        let mut generators = self.generators.borrow_mut();
        generators
            .get_or_insert((kind, seed), || Generator::new(kind, seed))
            .get(point)
    }

    /// Octave-averaged noise shaped by `params`.
    ///
    /// Each octave is normalized to `[0, 1]` before averaging; the average is then
    /// multiplied by `multiplier` and offset by `addent`. Only the first `spatial`
    /// coordinates are scaled, the rest (seed planes, time) are passed through.
    pub fn fractal<const N: usize>(
        &self,
        kind: NoiseKind,
        params: &NoiseParams,
        point: [f64; N],
        spatial: usize,
    ) -> f64
    where
        Perlin: NoiseFn<f64, N>,
        Simplex: NoiseFn<f64, N>,
    {
        let average = if params.iterations == 0 {
            0.5
        } else {
            let mut total = 0.0;
            let mut frequency = params.scale;
            for _ in 0..params.iterations {
                let mut scaled = point;
                for coordinate in scaled.iter_mut().take(spatial) {
                    *coordinate *= frequency;
                }
                let value = self.sample(kind, params.salt, scaled);
                total += ((value + 1.0) / 2.0).clamp(0.0, 1.0);
                frequency *= params.scale_step;
            }
            total / params.iterations as f64
        };
        average * params.multiplier + params.addent
    }

    /// Perlin noise over `(x, z)` on a fixed plane.
    pub fn perlin_3d(&self, x: f64, z: f64, params: &NoiseParams) -> f64 {
        self.fractal(NoiseKind::Perlin, params, [x, z, PERLIN_PLANE], 2)
    }

    /// Perlin noise over `(x, z, y)` on a fixed plane.
    pub fn perlin_4d(&self, x: f64, y: f64, z: f64, params: &NoiseParams) -> f64 {
        self.fractal(NoiseKind::Perlin, params, [x, z, y, PERLIN_PLANE], 3)
    }

    /// Simplex noise over `(x, z)`.
    pub fn simplex_2d(&self, x: f64, z: f64, params: &NoiseParams) -> f64 {
        self.fractal(NoiseKind::Simplex, params, [x, z], 2)
    }

    /// Simplex noise over `(x, z, y)`.
    pub fn simplex_3d(&self, x: f64, y: f64, z: f64, params: &NoiseParams) -> f64 {
        self.fractal(NoiseKind::Simplex, params, [x, z, y], 3)
    }

    /// Simplex noise over `(x, z, y, time)`.
    pub fn simplex_4d(&self, x: f64, y: f64, z: f64, params: &NoiseParams) -> f64 {
        self.fractal(NoiseKind::Simplex, params, [x, z, y, params.time], 3)
    }
}

impl std::fmt::Debug for NoiseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseSource")
            .field("seed", &self.seed)
            .field("cached_generators", &self.generators.borrow().len())
            .finish()
    }
}

// splitmix64 finalizer
fn mix(mut value: u64) -> u64 {
    value = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    value = (value ^ (value >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    value = (value ^ (value >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    value ^ (value >> 31)
}
