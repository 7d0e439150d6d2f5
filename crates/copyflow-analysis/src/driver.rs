use std::collections::BTreeSet;

use copyflow_ir::{Block, ControlFlowGraph, EdgeRef};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::cancel::Cancellation;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::lattice::JoinSemiLattice;
use crate::merge::merge;
use crate::predicate::{PredicateValueKind, evaluate_condition, is_edge_feasible, refine_along_edge};
use crate::result::CopyAnalysisResult;
use crate::state::CopyState;
use crate::transfer::Transfer;

/// Run the copy analysis over `cfg` with the default configuration.
pub fn analyze(
    cfg: &ControlFlowGraph,
    cancellation: &impl Cancellation,
) -> Result<CopyAnalysisResult, AnalysisError> {
    CopyAnalysis::new(cfg).run(cancellation)
}

/// Worklist fixpoint computation of copy facts for one graph.
///
/// Each block's entry state is the merge of the states recorded on its
/// feasible incoming edges (plus the empty state for the entry block). A
/// block is re-run whenever one of those edge states changes, until nothing
/// changes. All bookkeeping lives in [`run`](Self::run), so independent runs
/// may execute concurrently.
///
/// ```
/// use copyflow_analysis::{CopyAnalysis, NeverCancel};
/// use copyflow_ir::{CfgBuilder, Operand};
///
/// let mut builder = CfgBuilder::new();
/// let a = builder.local().name("a").new();
/// let b = builder.local().name("b").new();
/// let entry = builder.block();
/// builder.assign(entry, b, Operand::Fresh).assign(entry, a, b);
/// let cfg = builder.finish().unwrap();
///
/// let result = CopyAnalysis::new(&cfg)
///     .with_max_iterations(100)
///     .run(&NeverCancel)
///     .unwrap();
/// assert!(result.exit_state(entry).are_copies(a, b));
/// ```
pub struct CopyAnalysis<'a> {
    cfg: &'a ControlFlowGraph,
    config: AnalysisConfig,
}

impl<'a> CopyAnalysis<'a> {
    pub fn new(cfg: &'a ControlFlowGraph) -> Self {
        Self {
            cfg,
            config: AnalysisConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Fail with [`AnalysisError::FuelExhausted`] after `max` block visits.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = Some(max);
        self
    }

    pub fn with_cascading_invalidation(mut self, enabled: bool) -> Self {
        self.config.cascading_invalidation = enabled;
        self
    }

    pub fn with_branch_predicates(mut self, enabled: bool) -> Self {
        self.config.branch_predicates = enabled;
        self
    }

    pub fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.config.invariant_checks = enabled;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(
        &self,
        cancellation: &impl Cancellation,
    ) -> Result<CopyAnalysisResult, AnalysisError> {
        let cfg = self.cfg;
        let transfer = Transfer::new(cfg.entities())
            .with_cascading_invalidation(self.config.cascading_invalidation);

        let mut fixpoint = Fixpoint::new(cfg);
        let mut visits = 0;
        fixpoint.worklist.push(cfg.entry());

        loop {
            if cancellation.is_cancelled() {
                debug!("cancelled after {visits} block visits");
                return Err(AnalysisError::Cancelled);
            }
            let Some(block) = fixpoint.worklist.pop() else {
                break;
            };

            visits += 1;
            if let Some(limit) = self.config.max_iterations {
                if visits > limit {
                    debug!("giving up after {limit} block visits");
                    return Err(AnalysisError::FuelExhausted { limit });
                }
            }
            debug!("visit {block:?} (#{visits})");

            let incoming = fixpoint.incoming_state(block);
            let entry = match &fixpoint.entry_states[block.index()] {
                Some(previous) => previous.join(&incoming),
                None => incoming,
            };
            let exit = transfer.block(entry.clone(), &cfg.block(block).operations);
            if self.config.invariant_checks {
                if let Err(violation) = exit.check_invariants() {
                    panic!("copy state at exit of {block:?} is malformed: {violation}");
                }
            }
            fixpoint.entry_states[block.index()] = Some(entry);

            if fixpoint.exit_states[block.index()].as_ref() == Some(&exit) {
                trace!("{block:?} is stable");
                continue;
            }
            self.propagate(&mut fixpoint, block, &exit);
            fixpoint.exit_states[block.index()] = Some(exit);
        }

        debug!(
            "fixpoint after {visits} block visits over {} blocks",
            cfg.len()
        );
        Ok(fixpoint.finish(&transfer, visits))
    }

    /// Record the states leaving `block` along each successor edge and
    /// queue the targets whose incoming state changed.
    fn propagate(&self, fixpoint: &mut Fixpoint<'_>, block: Block, exit: &CopyState) {
        let predicates = self.config.branch_predicates;
        for (index, edge) in self.cfg.successors(block).iter().enumerate() {
            let edge_ref = EdgeRef {
                source: block,
                index,
            };
            let feasible = if predicates {
                if let Some(condition) = &edge.condition {
                    let value = evaluate_condition(exit, condition);
                    trace!("{edge_ref:?} condition is {value:?}");
                    fixpoint.edge_predicates.insert(edge_ref, value);
                }
                is_edge_feasible(exit, edge)
            } else {
                !edge.unreachable
            };

            let state = match (feasible, predicates) {
                (false, _) => None,
                (true, true) => Some(refine_along_edge(exit.clone(), edge)),
                (true, false) => Some(exit.clone()),
            };
            let slot = &mut fixpoint.edge_states[block.index()][index];
            if *slot == state {
                continue;
            }
            let target_visited = fixpoint.entry_states[edge.target.index()].is_some();
            let has_state = state.is_some();
            *slot = state;
            if has_state || target_visited {
                fixpoint.worklist.push(edge.target);
            }
        }
    }
}

/// Where a block stands in the worklist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockStatus {
    Unvisited,
    Queued,
    Stable,
}

/// Blocks waiting to be visited, popped in reverse postorder so that a
/// block's forward predecessors are usually visited before it.
struct Worklist<'a> {
    cfg: &'a ControlFlowGraph,
    queued: BTreeSet<usize>,
    status: Vec<BlockStatus>,
}

impl<'a> Worklist<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        Self {
            cfg,
            queued: BTreeSet::new(),
            status: vec![BlockStatus::Unvisited; cfg.len()],
        }
    }

    fn push(&mut self, block: Block) {
        if self.status[block.index()] == BlockStatus::Queued {
            return;
        }
        let Some(position) = self.cfg.rpo_index(block) else {
            unreachable!("{block:?} was queued but is not reachable from the entry");
        };
        self.queued.insert(position);
        self.status[block.index()] = BlockStatus::Queued;
    }

    fn pop(&mut self) -> Option<Block> {
        let position = self.queued.pop_first()?;
        let block = self.cfg.reverse_postorder()[position];
        self.status[block.index()] = BlockStatus::Stable;
        Some(block)
    }
}

/// Per-run bookkeeping, indexed by block.
struct Fixpoint<'a> {
    cfg: &'a ControlFlowGraph,
    worklist: Worklist<'a>,
    entry_states: Vec<Option<CopyState>>,
    exit_states: Vec<Option<CopyState>>,
    /// State leaving each block along each of its successor edges; `None`
    /// while the source is unvisited or the edge is infeasible.
    edge_states: Vec<SmallVec<[Option<CopyState>; 2]>>,
    edge_predicates: FxHashMap<EdgeRef, PredicateValueKind>,
}

impl<'a> Fixpoint<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        let edge_states = cfg
            .blocks()
            .map(|block| {
                cfg.successors(block)
                    .iter()
                    .map(|_| None)
                    .collect::<SmallVec<[Option<CopyState>; 2]>>()
            })
            .collect();
        Self {
            cfg,
            worklist: Worklist::new(cfg),
            entry_states: vec![None; cfg.len()],
            exit_states: vec![None; cfg.len()],
            edge_states,
            edge_predicates: FxHashMap::default(),
        }
    }

    fn incoming_state(&self, block: Block) -> CopyState {
        let initial = CopyState::new();
        let mut inputs: Vec<&CopyState> = Vec::new();
        if block == self.cfg.entry() {
            inputs.push(&initial);
        }
        for edge in self.cfg.predecessors(block) {
            if let Some(state) = &self.edge_states[edge.source.index()][edge.index] {
                inputs.push(state);
            }
        }
        merge(inputs)
    }

    fn finish(self, transfer: &Transfer<'_>, visits: usize) -> CopyAnalysisResult {
        let cfg = self.cfg;
        let reachable: Vec<bool> = self.entry_states.iter().map(Option::is_some).collect();
        let mut entry_states = Vec::with_capacity(cfg.len());
        let mut exit_states = Vec::with_capacity(cfg.len());
        for (block, (entry, exit)) in cfg
            .blocks()
            .zip(self.entry_states.into_iter().zip(self.exit_states))
        {
            match (entry, exit) {
                (Some(entry), Some(exit)) => {
                    entry_states.push(entry);
                    exit_states.push(exit);
                }
                _ => {
                    trace!("{block:?} is unreachable");
                    let exit = transfer.block(CopyState::new(), &cfg.block(block).operations);
                    entry_states.push(CopyState::new());
                    exit_states.push(exit);
                }
            }
        }
        CopyAnalysisResult::new(
            entry_states,
            exit_states,
            reachable,
            self.edge_predicates,
            visits,
        )
    }
}
