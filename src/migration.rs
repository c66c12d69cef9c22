//! Migration and adoption between populations.
//!
//! A migration port is a bounded buffer of genotype references sitting
//! between two populations. The migration side selects chromosomes with a
//! wrapped selection operation and pushes their genotypes into the port;
//! the adoption side drains the port, wraps each genotype in a fresh
//! storage object of the target population and hands the batch to a
//! wrapped replacement operation.

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomePtr;
use crate::errors::{Error, Result};
use crate::group::ChromosomeGroup;
use crate::population::Population;
use crate::replace::Replace;
use crate::select::Select;
use crate::tags::{TagId, TypedTagLifecycle};
use std::fmt::Debug;

/// Bounded buffer of migrating genotypes.
#[derive(Clone, Debug, Default)]
pub struct MigrationPort {
    chromosomes: Vec<ChromosomePtr>,
    capacity: usize,
}

impl MigrationPort {
    pub fn new(capacity: usize) -> Self {
        Self {
            chromosomes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chromosomes.len() >= self.capacity
    }

    /// Push one genotype. Fails when the port is at capacity.
    pub fn insert(&mut self, chromosome: ChromosomePtr) -> Result<()> {
        if self.is_full() {
            return Err(Error::InvalidOperation("migration port is full"));
        }
        self.chromosomes.push(chromosome);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.chromosomes.clear();
    }

    pub fn drain(&mut self) -> Vec<ChromosomePtr> {
        std::mem::take(&mut self.chromosomes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChromosomePtr> {
        self.chromosomes.iter()
    }
}

/// Selects emigrants and fills the port with their genotypes.
pub trait Migration: Debug + Send + Sync {
    fn prepare(
        &self,
        population: &mut Population,
        port: &mut MigrationPort,
        branches: &Branches,
    ) -> Result<()>;

    fn clear(&self, population: &mut Population, port: &mut MigrationPort) -> Result<()>;

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()>;

    fn run(
        &self,
        population: &mut Population,
        port: &mut MigrationPort,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()>;
}

/// Migration backed by an arbitrary selection operation. The selection
/// output lives in a population tag between generations.
#[derive(Debug)]
pub struct SelectionMigration<S: Select> {
    pub selection: S,
    pub selection_output_tag: TagId,
}

impl<S: Select> SelectionMigration<S> {
    pub fn new(selection: S, selection_output_tag: TagId) -> Self {
        Self {
            selection,
            selection_output_tag,
        }
    }
}

impl<S: Select> Migration for SelectionMigration<S> {
    fn prepare(
        &self,
        population: &mut Population,
        _port: &mut MigrationPort,
        branches: &Branches,
    ) -> Result<()> {
        let handle = population.add_population_tag::<ChromosomeGroup>(
            self.selection_output_tag,
            Box::new(TypedTagLifecycle::<ChromosomeGroup>::default()),
        )?;
        let mut output = population.take_population_tag(handle)?;
        self.selection.prepare(population, &mut output, None, branches)?;
        population.put_population_tag(handle, output)
    }

    fn clear(&self, population: &mut Population, port: &mut MigrationPort) -> Result<()> {
        port.clear();
        let handle =
            population.population_tag_handle::<ChromosomeGroup>(self.selection_output_tag)?;
        let mut output = population.take_population_tag(handle)?;
        self.selection.clear(population, &mut output)?;
        population.remove_population_tag(self.selection_output_tag)
    }

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        self.selection.update(population, None, branches)
    }

    fn run(
        &self,
        population: &mut Population,
        port: &mut MigrationPort,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let handle =
            population.population_tag_handle::<ChromosomeGroup>(self.selection_output_tag)?;
        let mut output = population.take_population_tag(handle)?;

        let result = (|| -> Result<()> {
            self.selection
                .run(population, &mut output, None, branches, streams)?;
            port.clear();
            for position in 0..output.len() {
                let genotype = population.storage(output.get(position)).chromosome_ptr()?;
                port.insert(genotype)?;
            }
            Ok(())
        })();

        if result.is_err() {
            port.clear();
        }
        output.clear(population.pool_mut(), false);
        population.put_population_tag(handle, output)?;
        result
    }
}

/// Integrates immigrants through a wrapped replacement operation.
pub trait Adoption: Debug + Send + Sync {
    fn prepare(
        &self,
        port: &mut MigrationPort,
        population: &mut Population,
        branches: &Branches,
    ) -> Result<()>;

    fn clear(&self, port: &mut MigrationPort, population: &mut Population) -> Result<()>;

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()>;

    fn run(
        &self,
        port: &mut MigrationPort,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()>;
}

/// Adoption backed by an arbitrary replacement operation.
#[derive(Debug)]
pub struct ReplacementAdoption<R: Replace> {
    pub replacement: R,
    pub replacement_input_tag: TagId,
}

impl<R: Replace> ReplacementAdoption<R> {
    pub fn new(replacement: R, replacement_input_tag: TagId) -> Self {
        Self {
            replacement,
            replacement_input_tag,
        }
    }
}

impl<R: Replace> Adoption for ReplacementAdoption<R> {
    fn prepare(
        &self,
        _port: &mut MigrationPort,
        population: &mut Population,
        branches: &Branches,
    ) -> Result<()> {
        let handle = population.add_population_tag::<ChromosomeGroup>(
            self.replacement_input_tag,
            Box::new(TypedTagLifecycle::<ChromosomeGroup>::default()),
        )?;
        let mut input = population.take_population_tag(handle)?;
        input.set_recycling(true);
        self.replacement.prepare(&mut input, population, branches)?;
        population.put_population_tag(handle, input)
    }

    fn clear(&self, port: &mut MigrationPort, population: &mut Population) -> Result<()> {
        port.clear();
        let handle =
            population.population_tag_handle::<ChromosomeGroup>(self.replacement_input_tag)?;
        let mut input = population.take_population_tag(handle)?;
        self.replacement.clear(&mut input, population)?;
        population.remove_population_tag(self.replacement_input_tag)
    }

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        self.replacement.update(population, branches)
    }

    fn run(
        &self,
        port: &mut MigrationPort,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let handle =
            population.population_tag_handle::<ChromosomeGroup>(self.replacement_input_tag)?;
        let mut input = population.take_population_tag(handle)?;
        input.set_recycling(true);

        let result = (|| -> Result<()> {
            for genotype in port.drain() {
                let id = population.acquire_storage()?;
                population.storage_mut(id).set_chromosome(genotype, None);
                population.calculate_fitness(id)?;
                input.add(population.pool(), id)?;
            }
            self.replacement
                .run(&mut input, population, branches, streams)
        })();

        if result.is_err() {
            input.clear(population.pool_mut(), false);
        }
        population.put_population_tag(handle, input)?;
        result
    }
}
