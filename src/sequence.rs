use std::sync::{Arc, Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::tetromino::Tetromino;

/// Append-only piece order derived from one seed, dealt in shuffled bags of
/// all seven pieces. Indices are generated on demand, so it never runs out.
pub struct PieceSequence {
    seed: u64,
    rng: StdRng,
    pieces: Vec<Tetromino>,
}

impl PieceSequence {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            pieces: Vec::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn get(&mut self, index: usize) -> Tetromino {
        while self.pieces.len() <= index {
            self.refill();
        }
        self.pieces[index]
    }

    pub fn generated(&self) -> usize {
        self.pieces.len()
    }

    fn refill(&mut self) {
        let mut bag = Tetromino::all();
        bag.shuffle(&mut self.rng);
        self.pieces.extend(bag);
    }
}

/// Handle to the one sequence a room deals from. Every session keeps its own
/// cursor; generating new pieces is serialized behind the lock, so index `k`
/// is the same piece for everyone holding a clone of the handle.
#[derive(Clone)]
pub struct SharedSequence {
    inner: Arc<Mutex<PieceSequence>>,
    seed: u64,
}

impl SharedSequence {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PieceSequence::new(seed))),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn piece_at(&self, index: usize) -> Tetromino {
        // `refill` appends whole bags, so a poisoned lock still guards a
        // consistent sequence.
        let mut sequence = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        sequence.get(index)
    }
}
