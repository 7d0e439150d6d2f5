//! Must-copy dataflow analysis: for every block of a control-flow graph,
//! which storage locations are guaranteed to hold identical values.
//!
//! The facts at one program point form a [`CopyState`], a partition of the
//! tracked locations into [`AbstractValue`] classes. [`CopyAnalysis`] runs
//! the transfer functions and the merge operator to a fixpoint.

mod cancel;
mod config;
mod driver;
mod entity_set;
mod error;
mod kind;
mod lattice;
mod merge;
mod predicate;
mod result;
mod state;
mod transfer;
mod value;

pub use cancel::{Cancellation, CancellationToken, NeverCancel};
pub use config::AnalysisConfig;
pub use driver::{CopyAnalysis, analyze};
pub use entity_set::EntitySet;
pub use error::AnalysisError;
pub use kind::AbstractValueKind;
pub use lattice::JoinSemiLattice;
pub use merge::{merge, merge_reachable};
pub use predicate::{
    PredicateValueKind, evaluate_condition, evaluate_equality, is_edge_feasible, refine_along_edge,
};
pub use result::CopyAnalysisResult;
pub use state::{CopyState, StateDisplay};
pub use transfer::Transfer;
pub use value::{AbstractValue, ValueDisplay};
