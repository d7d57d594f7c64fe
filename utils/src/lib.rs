//! Ambient utilities shared across the workspace that do not belong to any
//! one crate's core responsibility: a capped global allocator, rayon
//! threadpool sizing, and the two periodic background tasks ([`task_manager::Task`]
//! implementations) an embedder can opt into — size recalculation and
//! snapshot persistence.

pub mod allocator;
pub mod parallel;
pub mod persistence;
pub mod size_calculation;

pub use parallel::chunk_size;
pub use persistence::{Persistence, PersistenceSource, PersistenceTaskError};
pub use size_calculation::{SizeCalculation, SizeCalculationHandler};
