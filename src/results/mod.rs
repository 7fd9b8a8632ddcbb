//! Scored candidates and the bounded sets that hold them.

pub mod best_set;
pub mod candidate;
pub mod frontier;
pub mod store;
pub mod weights;

pub use best_set::{BoundedResultSet, ResultBatch, DEFAULT_KEEP_SIZE, DEFAULT_TRIM_FACTOR};
pub use candidate::{CandidatePayload, ScoredCandidate, WeightingMode};
pub use frontier::{pareto_front, FrontierExtractor, HullError, QuickHullFrontier};
pub use store::{ResultKey, ResultStore};
pub use weights::{generate_one_distributions, sort_weights_for};
