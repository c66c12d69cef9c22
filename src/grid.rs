//! Hypergrid partitioning of objective space.
//!
//! PESA and PAES map chromosomes onto coarse grid cells (*hyperboxes*) of
//! objective space and use cell occupancy as a crowding measure. The grid
//! is configured per objective; cell coordinates are stored in a
//! chromosome tag, cell occupancy in a density buffer built from the
//! coordinate-sorted nondominated set.

use crate::errors::{Error, Result};
use crate::fitness::Fitness;
use crate::tags::SizableTag;
use itertools::Itertools;
use std::cmp::Ordering;

/// Coordinates of one grid cell, one index per objective.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct HyperBox(pub Vec<usize>);

impl SizableTag for HyperBox {
    fn with_len(len: usize) -> Self {
        Self(vec![0; len])
    }

    fn set_len(&mut self, len: usize) {
        self.0.resize(len, 0);
    }

    fn reset(&mut self) {
        self.0.iter_mut().for_each(|coordinate| *coordinate = 0);
    }
}

/// Per-objective split of objective space into equally sized cells.
#[derive(Clone, Debug)]
pub struct HyperGrid {
    lower: Vec<f32>,
    upper: Vec<f32>,
    divisions: Vec<usize>,
}

impl HyperGrid {
    pub fn new(lower: Vec<f32>, upper: Vec<f32>, divisions: Vec<usize>) -> Result<Self> {
        if lower.len() != upper.len() || lower.len() != divisions.len() {
            return Err(Error::ArgumentOutOfRange {
                argument: "divisions",
                reason: "bounds and division counts must cover the same objectives",
            });
        }
        if divisions.iter().any(|count| *count == 0) {
            return Err(Error::ArgumentOutOfRange {
                argument: "divisions",
                reason: "every objective needs at least one cell",
            });
        }
        Ok(Self {
            lower,
            upper,
            divisions,
        })
    }

    /// Same bounds and division count for every objective.
    pub fn uniform(objectives: usize, lower: f32, upper: f32, divisions: usize) -> Result<Self> {
        Self::new(
            vec![lower; objectives],
            vec![upper; objectives],
            vec![divisions; objectives],
        )
    }

    pub fn objectives(&self) -> usize {
        self.divisions.len()
    }

    /// Cell coordinates of a fitness value, clamped to the grid edges.
    pub fn cell_of(&self, fitness: &dyn Fitness, cell: &mut HyperBox) {
        cell.set_len(self.divisions.len());
        for objective in 0..self.divisions.len() {
            let span = self.upper[objective] - self.lower[objective];
            let normalized = if span > 0.0 {
                (fitness.component(objective) - self.lower[objective]) / span
            } else {
                0.0
            };
            let scaled = (normalized * self.divisions[objective] as f32).floor();
            let clamped = scaled.max(0.0) as usize;
            cell.0[objective] = clamped.min(self.divisions[objective] - 1);
        }
    }
}

/// Density record of one occupied cell: the coordinate-sorted member
/// sequence holds its chromosomes at `start .. start + span`, of which
/// `count` are still alive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HyperBoxInfo {
    pub cell: HyperBox,
    pub start: usize,
    pub span: usize,
    pub count: usize,
}

impl HyperBoxInfo {
    pub fn remove_member(&mut self) {
        self.count = self.count.saturating_sub(1);
    }
}

/// Build density records from cell coordinates listed in sorted order.
/// Returns the records plus, per input position, the record index.
pub fn build_density(sorted_cells: &[HyperBox]) -> (Vec<HyperBoxInfo>, Vec<usize>) {
    let mut infos: Vec<HyperBoxInfo> = Vec::new();
    let mut assignment = Vec::with_capacity(sorted_cells.len());

    let mut start = 0;
    for (run, cell) in sorted_cells.iter().dedup_with_count() {
        assignment.extend(std::iter::repeat(infos.len()).take(run));
        infos.push(HyperBoxInfo {
            cell: cell.clone(),
            start,
            span: run,
            count: run,
        });
        start += run;
    }

    (infos, assignment)
}

/// Per-branch most-crowded-cell cache with a single global reduction.
///
/// Each branch scans its share of the density buffer and offers its local
/// maximum; the reduction picks the global one. A branch only rescans when
/// the cell it offered was touched by a removal.
#[derive(Clone, Debug, Default)]
pub struct CrowdingStorage {
    branch_max: Vec<Option<(usize, usize)>>,
    global: Option<usize>,
}

impl CrowdingStorage {
    pub fn resize(&mut self, branch_count: usize) {
        self.branch_max.resize(branch_count, None);
    }

    pub fn restart(&mut self) {
        self.branch_max.iter_mut().for_each(|slot| *slot = None);
        self.global = None;
    }

    pub fn clear_branch(&mut self, branch: usize) {
        self.branch_max[branch] = None;
    }

    /// Offer a `(info index, live count)` candidate from one branch.
    pub fn offer(&mut self, branch: usize, info_index: usize, count: usize) {
        match self.branch_max[branch] {
            Some((_, best)) if best >= count => {}
            _ => self.branch_max[branch] = Some((info_index, count)),
        }
    }

    /// Whether the branch's cached candidate was invalidated by the last
    /// global pick.
    pub fn requires_update(&self, branch: usize) -> bool {
        match (self.global, self.branch_max[branch]) {
            (None, _) | (_, None) => true,
            (Some(global), Some((cached, _))) => cached == global,
        }
    }

    /// Reduce the branch candidates to the globally most crowded cell.
    pub fn reduce(&mut self) -> Option<usize> {
        self.global = self
            .branch_max
            .iter()
            .flatten()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(index, _)| *index);
        self.global
    }
}

/// Lexicographic order of two cells, for coordinate sorting.
pub fn compare_cells(first: &HyperBox, second: &HyperBox) -> Ordering {
    first.0.cmp(&second.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::VectorFitness;

    #[test]
    fn cells_cover_the_grid_with_clamping() {
        let grid = HyperGrid::uniform(2, 0.0, 4.0, 2).unwrap();
        let mut cell = HyperBox::default();

        grid.cell_of(&VectorFitness::new(vec![1.0, 3.0]), &mut cell);
        assert_eq!(cell.0, vec![0, 1]);

        grid.cell_of(&VectorFitness::new(vec![-5.0, 99.0]), &mut cell);
        assert_eq!(cell.0, vec![0, 1]);
    }

    #[test]
    fn density_groups_contiguous_cells() {
        let cells = vec![
            HyperBox(vec![0, 0]),
            HyperBox(vec![0, 0]),
            HyperBox(vec![0, 1]),
            HyperBox(vec![1, 1]),
        ];
        let (infos, assignment) = build_density(&cells);

        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].start, 0);
        assert_eq!(infos[0].count, 2);
        assert_eq!(infos[1].start, 2);
        assert_eq!(assignment, vec![0, 0, 1, 2]);
    }

    #[test]
    fn crowding_reduction_picks_the_fullest_cell() {
        let mut crowding = CrowdingStorage::default();
        crowding.resize(2);
        crowding.offer(0, 0, 3);
        crowding.offer(1, 2, 5);
        assert_eq!(crowding.reduce(), Some(2));
        assert!(crowding.requires_update(1));
        assert!(!crowding.requires_update(0));
    }
}
