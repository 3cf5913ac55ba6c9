/// Vertex Identifier Pool
///
/// Hands out unique vertex ids for one snapshot. Concrete objects claim the
/// ids recorded in the dump; summary vertices draw fresh random ids.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::vertex::ModelError;

pub struct IdAllocator {
    in_use: HashSet<u64>,
    rng: StdRng,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic fresh ids, for reproducible output and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            in_use: HashSet::new(),
            rng,
        }
    }

    /// Reserve `id`. Fails if something already holds it.
    pub fn claim(&mut self, id: u64) -> Result<(), ModelError> {
        if self.in_use.insert(id) {
            Ok(())
        } else {
            Err(ModelError::IdInUse(id))
        }
    }

    /// Draw an id that nothing holds yet and reserve it.
    pub fn fresh(&mut self) -> u64 {
        loop {
            let id: u64 = self.rng.gen();
            if self.in_use.insert(id) {
                return id;
            }
        }
    }

    pub fn is_in_use(&self, id: u64) -> bool {
        self.in_use.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }

    /// Forget every reservation.
    pub fn reset(&mut self) {
        self.in_use.clear();
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("in_use", &self.in_use.len())
            .finish()
    }
}
