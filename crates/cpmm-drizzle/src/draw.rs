//! Random draws for the drizzle job.
//!
//! The job never touches a global generator: the draw source is injected so
//! tests can pin draws and production can be replayed from a seed.

use parking_lot::Mutex;
use rand::distributions::Open01;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Source of drizzle fractions and discovery order.
pub trait DrawSource: Send + Sync {
    /// Sample from the open interval (0, 1).
    fn unit(&self) -> f64;

    /// Randomize processing order in place.
    fn shuffle<T>(&self, items: &mut [T]);
}

/// Seedable generator behind a mutex, shared by concurrent drizzles.
pub struct SeededDraw {
    rng: Mutex<StdRng>,
}

impl SeededDraw {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn from_config(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::from_seed)
    }
}

impl DrawSource for SeededDraw {
    fn unit(&self) -> f64 {
        self.rng.lock().sample(Open01)
    }

    fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *self.rng.lock());
    }
}

/// Constant draw that keeps discovery order. For tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub f64);

impl DrawSource for FixedDraw {
    fn unit(&self) -> f64 {
        self.0
    }

    fn shuffle<T>(&self, _items: &mut [T]) {}
}
