//! A population evaluation and scaling engine for evolutionary
//! computation.
//!
//! The crate owns the hard middle of a genetic algorithm: the population
//! of candidate solutions, parallel fitness assignment and scaling, the
//! selection/coupling/replacement pipeline, and the statistics that track
//! it all incrementally. Chromosome encodings and problem definitions
//! stay outside; they plug in through the capability traits of
//! [`chromosome`] and [`evaluation`].
//!
//! There are four main elements to this approach:
//! * The [`Population`](population::Population): a pooled container of
//!   [storage objects](storage::ChromosomeStorage) with typed
//!   [tags](tags), flags, side groups for the chromosomes that entered or
//!   left during a generation, [events](events) and
//!   [statistics](statistics)
//! * The pipeline operators: [`select`], [`couple`] and [`replace`]
//! * The [`scaling`] operations that turn raw fitness into scaled
//!   fitness, from plain fitness sharing to the Pareto family (NSGA-I/II,
//!   PESA, PAES, SPEA-I/II)
//! * The [`branch`] model: operators split their work into contiguous
//!   per-branch ranges with branch-private partial state and explicit
//!   reduction points
//!
//! ## Quick usage
//!
//! ```ignore
//! use genetic_population::branch::{Branches, RandomStreams};
//! use genetic_population::population::{Population, PopulationParams, FillOptions};
//!
//! let mut population = Population::builder()
//!     .with_params(PopulationParams::new(100, 10, FillOptions::default())?)
//!     .with_initializer(Box::new(my_initializer))
//!     .with_fitness_operation(Box::new(my_fitness))
//!     .with_fitness_comparator(Box::new(my_comparator))
//!     .with_seed(42)
//!     .build()?;
//!
//! population.initialize()?;
//!
//! let branches = Branches::new(4)?;
//! let mut streams = RandomStreams::new(42, &branches);
//! // per generation: assign_raw_fitness, scaling.run, select.run,
//! // replace.run, population.next_generation(&branches)
//! ```

pub mod branch;
pub mod chromosome;
pub mod couple;
pub mod errors;
pub mod evaluation;
pub mod events;
pub mod fitness;
pub mod grid;
pub mod group;
pub mod migration;
pub mod population;
pub mod replace;
pub mod scaling;
pub mod select;
pub mod sorting;
pub mod statistics;
pub mod storage;
pub mod tags;
