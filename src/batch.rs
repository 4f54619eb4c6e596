use crate::error::{Error, Result};
use log::debug;
use ndarray_rand::rand::{Rng, seq::SliceRandom};
use std::slice::Chunks;

/// Splits the sample indices `0..len` of a dataset into batches of at most `batch_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSampler {
    len: usize,
    batch_size: usize,
}

impl BatchSampler {
    pub fn new(len: usize, batch_size: usize) -> Result<BatchSampler> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1".into()));
        }

        Ok(BatchSampler { len, batch_size })
    }

    /// Number of batches in one pass. Only the last one may be short.
    pub fn num_batches(&self) -> usize {
        self.len.div_ceil(self.batch_size)
    }

    // A pass in the dataset's own order.
    pub fn sequential(&self) -> Pass {
        Pass {
            order: (0..self.len).collect(),
            batch_size: self.batch_size,
        }
    }

    // A pass over a fresh permutation of the individual sample indices. Each call draws a new
    // permutation from `rng`, so calling it once per epoch gives independent epochs.
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Pass {
        let mut order: Vec<usize> = (0..self.len).collect();
        order.shuffle(rng);
        debug!(
            "shuffled {} samples into {} batches",
            self.len,
            self.num_batches()
        );

        Pass {
            order,
            batch_size: self.batch_size,
        }
    }
}

/// The traversal order of one pass. Batches are sliced off lazily while iterating.
#[derive(Debug, Clone)]
pub struct Pass {
    order: Vec<usize>,
    batch_size: usize,
}

impl Pass {
    pub fn batches(&self) -> Chunks<'_, usize> {
        self.order.chunks(self.batch_size)
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

impl<'a> IntoIterator for &'a Pass {
    type Item = &'a [usize];
    type IntoIter = Chunks<'a, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches()
    }
}
