//! Pattern analysis over coupling views.
//!
//! - [`views`] resolves view names to coupling graphs
//! - [`filter`] narrows the node universe to one granularity
//! - [`matcher`] scores a single pair against the patterns
//! - [`disagreements`] drives the whole analysis, in process or distributed

pub mod disagreements;
pub mod filter;
pub mod matcher;
pub mod views;

pub use disagreements::{AnalysisSettings, DisagreementAnalyzer, ExecutionMode};
pub use filter::{NodeFilter, NodeFilterMode, PairFilter, PathKindFilter};
pub use matcher::{analyze_pair, PairAnalyzer};
pub use views::{ViewProvider, ViewRegistry, DATA_DIR_ENV};
