//! Branch-structured work splitting.
//!
//! Parallel operators advance as a set of *branches* that move in lockstep:
//! each branch works on a contiguous range of the population or of an input
//! group, accumulates into branch-private partial state, and the partials
//! meet in a single-owner reduction section at the points where the
//! pipeline synchronises. Operators receive the branch layout through
//! [`Branches`] and keep one partial slot per branch, so partial updates
//! stay idempotent and invisible until reduced.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::ops::Range;

use crate::errors::{Error, Result};

/// Layout of the branch set executing an operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Branches {
    count: usize,
}

impl Branches {
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::ArgumentOutOfRange {
                argument: "count",
                reason: "at least one branch is required",
            });
        }
        Ok(Self { count })
    }

    /// Single-branch layout, the degenerate case with no partials to merge.
    pub fn single() -> Self {
        Self { count: 1 }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> impl Iterator<Item = Branch> {
        let count = self.count;
        (0..count).map(move |index| Branch { index, count })
    }
}

/// One worker inside a branch set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    pub index: usize,
    pub count: usize,
}

impl Branch {
    /// Contiguous share of `total` items owned by this branch. Remainder
    /// items go to the leading branches, so ranges cover `0..total` with
    /// no overlap.
    pub fn split_work(&self, total: usize) -> Range<usize> {
        let base = total / self.count;
        let remainder = total % self.count;
        let extra = usize::from(self.index < remainder);
        let start = self.index * base + self.index.min(remainder);
        start..start + base + extra
    }

    /// Share of the upper-triangle pair iteration: this branch owns rows
    /// `i` of all pairs `(i, j)`, `i < j < total`.
    pub fn split_pairs(&self, total: usize) -> Range<usize> {
        self.split_work(total.saturating_sub(1))
    }
}

/// Independent random streams, one per branch, derived from a master seed.
#[derive(Debug)]
pub struct RandomStreams {
    streams: Vec<SmallRng>,
}

impl RandomStreams {
    pub fn new(master_seed: u64, branches: &Branches) -> Self {
        let streams = (0..branches.count())
            .map(|index| {
                SmallRng::seed_from_u64(
                    master_seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15),
                )
            })
            .collect();
        Self { streams }
    }

    pub fn branch(&mut self, index: usize) -> &mut SmallRng {
        &mut self.streams[index]
    }
}
