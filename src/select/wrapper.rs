pub use super::bottom::BottomSelection as SelectBottom;
pub use super::random::RandomSelection as SelectRandom;
pub use super::roulette::RouletteWheelSelection as SelectRouletteWheel;
pub use super::top::TopSelection as SelectTop;
pub use super::tournament::TournamentSelection as SelectTournament;
pub use super::Select;

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::Population;
use crate::tags::TagId;

#[derive(Clone, Debug)]
pub enum Wrapper {
    Top(SelectTop),
    Bottom(SelectBottom),
    Random(SelectRandom),
    RouletteWheel(SelectRouletteWheel),
    Tournament(SelectTournament),
}

impl Select for Wrapper {
    fn selection_count(&self) -> usize {
        match self {
            Wrapper::Top(select) => select.selection_count(),
            Wrapper::Bottom(select) => select.selection_count(),
            Wrapper::Random(select) => select.selection_count(),
            Wrapper::RouletteWheel(select) => select.selection_count(),
            Wrapper::Tournament(select) => select.selection_count(),
        }
    }

    fn crossover_buffers_tag(&self) -> Option<TagId> {
        match self {
            Wrapper::Top(select) => select.crossover_buffers_tag(),
            Wrapper::Bottom(select) => select.crossover_buffers_tag(),
            Wrapper::Random(select) => select.crossover_buffers_tag(),
            Wrapper::RouletteWheel(select) => select.crossover_buffers_tag(),
            Wrapper::Tournament(select) => select.crossover_buffers_tag(),
        }
    }

    fn selected_tag(&self) -> Option<TagId> {
        match self {
            Wrapper::Top(select) => select.selected_tag(),
            Wrapper::Bottom(select) => select.selected_tag(),
            Wrapper::Random(select) => select.selected_tag(),
            Wrapper::RouletteWheel(select) => select.selected_tag(),
            Wrapper::Tournament(select) => select.selected_tag(),
        }
    }

    fn run(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: Option<&MatingSetup>,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        match self {
            Wrapper::Top(select) => select.run(population, output, mating, branches, streams),
            Wrapper::Bottom(select) => select.run(population, output, mating, branches, streams),
            Wrapper::Random(select) => select.run(population, output, mating, branches, streams),
            Wrapper::RouletteWheel(select) => {
                select.run(population, output, mating, branches, streams)
            }
            Wrapper::Tournament(select) => {
                select.run(population, output, mating, branches, streams)
            }
        }
    }
}

impl From<SelectTop> for Wrapper {
    fn from(select: SelectTop) -> Self {
        Wrapper::Top(select)
    }
}
impl From<SelectBottom> for Wrapper {
    fn from(select: SelectBottom) -> Self {
        Wrapper::Bottom(select)
    }
}
impl From<SelectRandom> for Wrapper {
    fn from(select: SelectRandom) -> Self {
        Wrapper::Random(select)
    }
}
impl From<SelectRouletteWheel> for Wrapper {
    fn from(select: SelectRouletteWheel) -> Self {
        Wrapper::RouletteWheel(select)
    }
}
impl From<SelectTournament> for Wrapper {
    fn from(select: SelectTournament) -> Self {
        Wrapper::Tournament(select)
    }
}
