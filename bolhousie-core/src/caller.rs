//! Caller sequencer: the shuffled pool of items still to be called.
//!
//! Items with an audio cue are called first; each subset is shuffled independently so the
//! order stays unpredictable within a subset.

use std::collections::{HashSet, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::{Catalog, Item};
use crate::session::Call;

/// Ids of items whose audio cue exists.
pub type AudioIndex = HashSet<String>;

#[derive(Debug, Clone, Default)]
pub struct Caller {
    pool: VecDeque<Item>,
}

impl Caller {
    /// Empty pool; every call reports exhaustion until rebuilt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from every catalog item not in `shown`.
    pub fn build<R: Rng + ?Sized>(
        catalog: &Catalog,
        audio: &AudioIndex,
        shown: &HashSet<String>,
        rng: &mut R,
    ) -> Self {
        let (mut with_audio, mut without_audio): (Vec<Item>, Vec<Item>) = catalog
            .items()
            .iter()
            .filter(|i| !shown.contains(&i.id))
            .cloned()
            .partition(|i| audio.contains(&i.id));
        with_audio.shuffle(rng);
        without_audio.shuffle(rng);
        let pool = with_audio.into_iter().chain(without_audio).collect();
        Self { pool }
    }

    /// Pop the head of the pool and pick one of its taglines at random.
    pub fn next_call<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Call, CallerError> {
        let item = self.pool.pop_front().ok_or(CallerError::Exhausted)?;
        let tagline = item
            .taglines
            .choose(rng)
            .cloned()
            .ok_or_else(|| CallerError::NoTagline(item.id.clone()))?;
        Ok(Call { item, tagline })
    }

    pub fn remaining(&self) -> usize {
        self.pool.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallerError {
    #[error("show over: every item has been called")]
    Exhausted,
    #[error("item {0:?} has no taglines")]
    NoTagline(String),
}
