//! couplingmap finds element pairs on which several coupling views of a code
//! base disagree, such as classes that reference each other heavily but are
//! never changed together.
//!
//! ```rust,no_run
//! use couplingmap::analysis::{DisagreementAnalyzer, NodeFilterMode, PathKindFilter, ViewRegistry};
//! use couplingmap::results::{sort_weights_for, WeightingMode};
//! use std::sync::Arc;
//!
//! # fn main() -> couplingmap::errors::Result<()> {
//! let analyzer = DisagreementAnalyzer::new(
//!     "jfreechart",
//!     Arc::new(ViewRegistry::new("data")),
//!     Arc::new(PathKindFilter),
//! );
//! let views = vec!["references".to_string(), "evolutionary".to_string()];
//! let pattern: couplingmap::core::Pattern = "1,0:Hidden dependency".parse()?;
//! let sets = analyzer.analyze_disagreements(&views, &[pattern.clone()], NodeFilterMode::Classes)?;
//! for candidate in sets[0].get_best_sorted(&sort_weights_for(&pattern), WeightingMode::Linear) {
//!     println!("{} -> {}", candidate.payload.first, candidate.payload.second);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod distributed;
pub mod errors;
pub mod graph;
pub mod progress;
pub mod results;

pub use crate::analysis::{DisagreementAnalyzer, NodeFilterMode};
pub use crate::core::{ElementId, Pattern};
pub use crate::errors::{Error, Result};
pub use crate::graph::CouplingGraph;
pub use crate::results::{BoundedResultSet, ScoredCandidate};
