//! Batch loading over rollout stores.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rlprep_core::Result;

use crate::store::RolloutStore;

/// Configuration for batch iteration.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// Batch size.
    pub batch_size: usize,
    /// Whether to shuffle example order.
    pub shuffle: bool,
    /// Random seed for shuffling.
    pub seed: u64,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            shuffle: false,
            seed: 42,
            drop_last: false,
        }
    }
}

impl LoaderConfig {
    /// Config with the given batch size and defaults otherwise.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Set whether to shuffle.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the shuffle seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set whether to drop the last incomplete batch.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

/// Iterator yielding padded batches from a [`RolloutStore`].
///
/// Example order is a seeded permutation; a failure while building one
/// example surfaces as an `Err` batch without aborting iteration.
pub struct BatchLoader<'a, S: RolloutStore> {
    store: &'a S,
    config: LoaderConfig,
    indices: Vec<usize>,
    position: usize,
}

impl<'a, S: RolloutStore> BatchLoader<'a, S> {
    /// Create a new loader over `store`.
    pub fn new(store: &'a S, config: LoaderConfig) -> Self {
        let mut indices: Vec<usize> = (0..store.len()).collect();
        if config.shuffle {
            let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
            indices.shuffle(&mut rng);
        }
        Self {
            store,
            config,
            indices,
            position: 0,
        }
    }

    /// Number of batches this loader yields.
    pub fn num_batches(&self) -> usize {
        let n = self.indices.len();
        if self.config.batch_size == 0 {
            return 0;
        }
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            (n + self.config.batch_size - 1) / self.config.batch_size
        }
    }

    /// Total number of examples.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the underlying store is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Reset for a new epoch, reshuffling with `new_seed` when given.
    pub fn reset(&mut self, new_seed: Option<u64>) {
        self.position = 0;
        if self.config.shuffle {
            let seed = new_seed.unwrap_or(self.config.seed);
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            self.indices.shuffle(&mut rng);
        }
    }

    /// Get the next batch.
    pub fn next_batch(&mut self) -> Option<Result<S::Batch>> {
        if self.config.batch_size == 0 || self.position >= self.indices.len() {
            return None;
        }

        let batch_end = (self.position + self.config.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.position..batch_end];

        if self.config.drop_last && batch_indices.len() < self.config.batch_size {
            return None;
        }

        let mut items = Vec::with_capacity(batch_indices.len());
        for &index in batch_indices {
            match self.store.get(index) {
                Ok(item) => items.push(item),
                Err(e) => {
                    self.position = batch_end;
                    return Some(Err(e));
                }
            }
        }
        self.position = batch_end;

        Some(Ok(self.store.collate(&items)))
    }
}

impl<'a, S: RolloutStore> Iterator for BatchLoader<'a, S> {
    type Item = Result<S::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
