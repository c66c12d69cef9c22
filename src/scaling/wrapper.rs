pub use super::nsga::NsgaScaling as ScalingNsga;
pub use super::nsga2::Nsga2Scaling as ScalingNsga2;
pub use super::pesa::PesaScaling as ScalingPesa;
pub use super::sharing::FitnessSharingScaling as ScalingSharing;
pub use super::spea::SpeaScaling as ScalingSpea;
pub use super::spea2::Spea2Scaling as ScalingSpea2;
pub use super::Scaling;

use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::fitness::Fitness;
use crate::population::Population;

/// All scaling operations behind one dispatchable type. PAES is absent on
/// purpose: its archive logic is a replacement operation, not a scaling
/// one.
#[derive(Clone, Debug)]
pub enum Wrapper {
    Sharing(ScalingSharing),
    Nsga(ScalingNsga),
    Nsga2(ScalingNsga2),
    Pesa(ScalingPesa),
    Spea(ScalingSpea),
    Spea2(ScalingSpea2),
}

impl Scaling for Wrapper {
    fn scaled_prototype(&self) -> Box<dyn Fitness> {
        match self {
            Wrapper::Sharing(scaling) => scaling.scaled_prototype(),
            Wrapper::Nsga(scaling) => scaling.scaled_prototype(),
            Wrapper::Nsga2(scaling) => scaling.scaled_prototype(),
            Wrapper::Pesa(scaling) => scaling.scaled_prototype(),
            Wrapper::Spea(scaling) => scaling.scaled_prototype(),
            Wrapper::Spea2(scaling) => scaling.scaled_prototype(),
        }
    }

    fn prepare_tags(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        match self {
            Wrapper::Sharing(scaling) => scaling.prepare_tags(population, branches),
            Wrapper::Nsga(scaling) => scaling.prepare_tags(population, branches),
            Wrapper::Nsga2(scaling) => scaling.prepare_tags(population, branches),
            Wrapper::Pesa(scaling) => scaling.prepare_tags(population, branches),
            Wrapper::Spea(scaling) => scaling.prepare_tags(population, branches),
            Wrapper::Spea2(scaling) => scaling.prepare_tags(population, branches),
        }
    }

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        match self {
            Wrapper::Sharing(scaling) => scaling.clear_tags(population),
            Wrapper::Nsga(scaling) => scaling.clear_tags(population),
            Wrapper::Nsga2(scaling) => scaling.clear_tags(population),
            Wrapper::Pesa(scaling) => scaling.clear_tags(population),
            Wrapper::Spea(scaling) => scaling.clear_tags(population),
            Wrapper::Spea2(scaling) => scaling.clear_tags(population),
        }
    }

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        match self {
            Wrapper::Sharing(scaling) => scaling.update(population, branches),
            Wrapper::Nsga(scaling) => scaling.update(population, branches),
            Wrapper::Nsga2(scaling) => scaling.update(population, branches),
            Wrapper::Pesa(scaling) => scaling.update(population, branches),
            Wrapper::Spea(scaling) => scaling.update(population, branches),
            Wrapper::Spea2(scaling) => scaling.update(population, branches),
        }
    }

    fn run(
        &self,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        match self {
            Wrapper::Sharing(scaling) => scaling.run(population, branches, streams),
            Wrapper::Nsga(scaling) => scaling.run(population, branches, streams),
            Wrapper::Nsga2(scaling) => scaling.run(population, branches, streams),
            Wrapper::Pesa(scaling) => scaling.run(population, branches, streams),
            Wrapper::Spea(scaling) => scaling.run(population, branches, streams),
            Wrapper::Spea2(scaling) => scaling.run(population, branches, streams),
        }
    }
}

impl From<ScalingSharing> for Wrapper {
    fn from(scaling: ScalingSharing) -> Self {
        Wrapper::Sharing(scaling)
    }
}
impl From<ScalingNsga> for Wrapper {
    fn from(scaling: ScalingNsga) -> Self {
        Wrapper::Nsga(scaling)
    }
}
impl From<ScalingNsga2> for Wrapper {
    fn from(scaling: ScalingNsga2) -> Self {
        Wrapper::Nsga2(scaling)
    }
}
impl From<ScalingPesa> for Wrapper {
    fn from(scaling: ScalingPesa) -> Self {
        Wrapper::Pesa(scaling)
    }
}
impl From<ScalingSpea> for Wrapper {
    fn from(scaling: ScalingSpea) -> Self {
        Wrapper::Spea(scaling)
    }
}
impl From<ScalingSpea2> for Wrapper {
    fn from(scaling: ScalingSpea2) -> Self {
        Wrapper::Spea2(scaling)
    }
}
