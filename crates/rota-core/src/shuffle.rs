use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Uniform Fisher-Yates permutation using a fresh clock-seeded generator.
pub fn shuffle<T>(items: Vec<T>) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(clock_seed());
    shuffle_with(items, &mut rng)
}

pub fn shuffle_with<T, R: Rng + ?Sized>(mut items: Vec<T>, rng: &mut R) -> Vec<T> {
    items.shuffle(rng);
    items
}

/// Shuffled `0..n`, the order in which a batch of `n` rows gets assigned.
pub fn shuffled_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    shuffle_with((0..n).collect(), rng)
}

pub fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
