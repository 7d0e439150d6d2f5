use copyflow_ir::{Block, EdgeRef, EntityId};
use rustc_hash::FxHashMap;

use crate::predicate::PredicateValueKind;
use crate::state::CopyState;
use crate::value::AbstractValue;

/// Copy facts at the entry and exit of every block of one graph.
#[derive(Clone, Debug)]
pub struct CopyAnalysisResult {
    entry_states: Vec<CopyState>,
    exit_states: Vec<CopyState>,
    reachable: Vec<bool>,
    edge_predicates: FxHashMap<EdgeRef, PredicateValueKind>,
    visits: usize,
}

impl CopyAnalysisResult {
    pub(crate) fn new(
        entry_states: Vec<CopyState>,
        exit_states: Vec<CopyState>,
        reachable: Vec<bool>,
        edge_predicates: FxHashMap<EdgeRef, PredicateValueKind>,
        visits: usize,
    ) -> Self {
        debug_assert_eq!(entry_states.len(), exit_states.len());
        debug_assert_eq!(entry_states.len(), reachable.len());
        Self {
            entry_states,
            exit_states,
            reachable,
            edge_predicates,
            visits,
        }
    }

    pub fn entry_state(&self, block: Block) -> &CopyState {
        &self.entry_states[block.index()]
    }

    pub fn exit_state(&self, block: Block) -> &CopyState {
        &self.exit_states[block.index()]
    }

    pub fn class_at_entry(&self, block: Block, entity: EntityId) -> AbstractValue {
        self.entry_state(block).class_of(entity)
    }

    pub fn class_at_exit(&self, block: Block, entity: EntityId) -> AbstractValue {
        self.exit_state(block).class_of(entity)
    }

    /// Whether control reaches `block` along feasible edges. Unreachable
    /// blocks report the states obtained from an empty entry state.
    pub fn is_reachable(&self, block: Block) -> bool {
        self.reachable[block.index()]
    }

    /// The decided value of a guarded edge's condition at the fixpoint.
    /// `Unknown` for unguarded edges and edges whose source was never
    /// reached.
    pub fn edge_predicate(&self, edge: EdgeRef) -> PredicateValueKind {
        self.edge_predicates
            .get(&edge)
            .copied()
            .unwrap_or(PredicateValueKind::Unknown)
    }

    /// Number of block visits the fixpoint took.
    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn len(&self) -> usize {
        self.entry_states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_states.is_empty()
    }
}
