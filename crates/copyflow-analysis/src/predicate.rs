//! Branch conditions decided from copy facts.
//!
//! Two locations in the same reference-copy class hold the same reference,
//! so a reference-equality test between them always succeeds. Copy facts
//! never prove inequality: two distinct classes may still hold equal values.

use copyflow_ir::{Edge, EdgeCondition, EntityId};

use crate::kind::AbstractValueKind;
use crate::state::CopyState;

/// What the copy facts say about a predicate.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PredicateValueKind {
    AlwaysTrue,
    AlwaysFalse,
    Unknown,
}

impl PredicateValueKind {
    pub fn negate(self) -> Self {
        match self {
            PredicateValueKind::AlwaysTrue => PredicateValueKind::AlwaysFalse,
            PredicateValueKind::AlwaysFalse => PredicateValueKind::AlwaysTrue,
            PredicateValueKind::Unknown => PredicateValueKind::Unknown,
        }
    }

    /// The value of "this predicate evaluates to `when`".
    fn expecting(self, when: bool) -> Self {
        if when { self } else { self.negate() }
    }
}

/// Evaluate `lhs` reference-equals `rhs` in `state`.
pub fn evaluate_equality(state: &CopyState, lhs: EntityId, rhs: EntityId) -> PredicateValueKind {
    if lhs.is_value_type() || rhs.is_value_type() {
        return PredicateValueKind::Unknown;
    }
    if lhs == rhs {
        return PredicateValueKind::AlwaysTrue;
    }
    let class = state.class_of(lhs);
    if class.kind() == AbstractValueKind::KnownReferenceCopy && class.contains(rhs) {
        PredicateValueKind::AlwaysTrue
    } else {
        PredicateValueKind::Unknown
    }
}

/// Evaluate the condition under which `edge` is taken.
pub fn evaluate_condition(state: &CopyState, condition: &EdgeCondition) -> PredicateValueKind {
    evaluate_equality(state, condition.lhs, condition.rhs).expecting(condition.when)
}

/// Whether control can flow along `edge` when leaving a block in `state`.
///
/// Statically unreachable edges never are; a guarded edge is infeasible
/// when its condition is decided false.
pub fn is_edge_feasible(state: &CopyState, edge: &Edge) -> bool {
    if edge.unreachable {
        return false;
    }
    match &edge.condition {
        Some(condition) => evaluate_condition(state, condition) != PredicateValueKind::AlwaysFalse,
        None => true,
    }
}

/// The state flowing along a feasible `edge`: taking an equality edge
/// proves both sides hold the same reference.
pub fn refine_along_edge(state: CopyState, edge: &Edge) -> CopyState {
    match edge.condition {
        Some(EdgeCondition { lhs, rhs, when: true })
            if !lhs.is_value_type() && !rhs.is_value_type() =>
        {
            state.record_equal(lhs, rhs)
        }
        _ => state,
    }
}
