use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

use copyflow_analysis::{
    AbstractValueKind, AnalysisError, Cancellation, CancellationToken, CopyAnalysis, CopyState,
    JoinSemiLattice, NeverCancel, PredicateValueKind, Transfer, analyze, merge,
};
use copyflow_ir::{CfgBuilder, EdgeRef, Operand};
use copyflow_test_utils::lattice::{assert_merge_order_independent, assert_semilattice_laws};
use copyflow_test_utils::programs::{diamond, opaque_loop, straight_line};
use copyflow_test_utils::dump_result;
use test_log::test;

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn straight_line_copies_form_one_reference_class() {
    let program = straight_line();
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    let class = result.class_at_exit(program.entry, program.a);
    assert_eq!(class.kind(), AbstractValueKind::KnownReferenceCopy);
    assert_eq!(class, result.class_at_exit(program.entry, program.b));
    assert_eq!(class, result.class_at_exit(program.entry, program.c));
    assert_eq!(class.len(), 3);

    insta::assert_snapshot!(dump_result(&program.cfg, &result), @r"
    bb0
      entry:
        (empty)
      exit:
        {a, b, c} ref
    ");
}

#[test]
fn diverging_branches_lose_the_copy() {
    let program = diamond(false);
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    assert!(result.exit_state(program.then_block).are_copies(program.a, program.b));
    assert!(result.exit_state(program.else_block).are_copies(program.a, program.c));
    let merged = result.class_at_entry(program.join, program.a);
    assert_eq!(merged.kind(), AbstractValueKind::Unknown);
    assert!(!result.entry_state(program.join).are_copies(program.a, program.b));
    assert!(!result.entry_state(program.join).are_copies(program.a, program.c));

    insta::assert_snapshot!(dump_result(&program.cfg, &result), @r"
    bb0
      entry:
        (empty)
      exit:
        {b} ref
        {c} ref
    bb1
      entry:
        {b} ref
        {c} ref
      exit:
        {a, b} ref
        {c} ref
    bb2
      entry:
        {b} ref
        {c} ref
      exit:
        {a, c} ref
        {b} ref
    bb3
      entry:
        a: unknown
        b: unknown
        c: unknown
      exit:
        a: unknown
        b: unknown
        c: unknown
    ");
}

#[test]
fn converging_branches_keep_the_copy() {
    let program = diamond(true);
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    let class = result.class_at_entry(program.join, program.a);
    assert_eq!(class.kind(), AbstractValueKind::KnownReferenceCopy);
    assert_eq!(
        class.entities().as_slice(),
        &[program.a, program.b, program.c]
    );
}

#[test]
fn loop_with_opaque_write_forgets_the_copy() {
    let program = opaque_loop();
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    assert!(result.exit_state(program.entry).are_copies(program.a, program.b));
    assert_eq!(
        result.class_at_entry(program.header, program.a).kind(),
        AbstractValueKind::Unknown
    );
    assert_eq!(
        result.class_at_entry(program.exit, program.a).kind(),
        AbstractValueKind::Unknown
    );
    // The header is visited again once the back edge carries a state.
    assert!(result.visits() > program.cfg.len());
    assert!(result.is_reachable(program.body));
}

#[test]
fn loop_header_only_moves_up() {
    let program = opaque_loop();
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    let before_loop = result.exit_state(program.entry);
    let header = result.entry_state(program.header);
    let back_edge = result.exit_state(program.body);
    assert!(before_loop.is_subseteq(header));
    assert!(back_edge.is_subseteq(header));
    assert_eq!(header.check_invariants(), Ok(()));
}

#[test]
fn loop_header_never_regains_a_lost_copy() {
    let program = opaque_loop();
    let cfg = &program.cfg;
    let transfer = Transfer::new(cfg.entities());
    let before_loop = transfer.block(CopyState::new(), &cfg.block(program.entry).operations);

    let mut header = before_loop.clone();
    let mut lost = BTreeSet::new();
    let mut stable = false;
    for iteration in 0..10 {
        let after_body = transfer.block(header.clone(), &cfg.block(program.body).operations);
        let next = header.join(&merge([&before_loop, &after_body]));
        assert!(header.is_subseteq(&next), "header moved down on iteration {iteration}");
        for entity in cfg.entities().ids() {
            let known = next.class_of(entity).is_known();
            assert!(
                !(known && lost.contains(&entity)),
                "{} regained a class on iteration {iteration}",
                cfg.entities().display(entity)
            );
            if next.is_tracked(entity) && !known {
                lost.insert(entity);
            }
        }
        if next == header {
            stable = true;
            break;
        }
        header = next;
    }

    assert!(stable);
    assert!(lost.contains(&program.a));
    assert_eq!(&header, analyze(cfg, &NeverCancel).unwrap().entry_state(program.header));
}

// ---------------------------------------------------------------------------
// Reachability and predicates
// ---------------------------------------------------------------------------

#[test]
fn unreachable_edges_contribute_nothing() {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let c = builder.local().name("c").new();
    let entry = builder.block();
    let taken = builder.block();
    let dead = builder.block();
    let join = builder.block();
    builder
        .assign(entry, b, Operand::Fresh)
        .assign(entry, c, Operand::Fresh)
        .jump(entry, taken)
        .unreachable_edge(entry, dead);
    builder.assign(taken, a, b).jump(taken, join);
    builder.assign(dead, a, c).jump(dead, join);
    let cfg = builder.finish().unwrap();

    let result = analyze(&cfg, &NeverCancel).unwrap();
    assert!(result.entry_state(join).are_copies(a, b));
    assert!(!result.is_reachable(dead));
    assert!(result.entry_state(dead).is_empty());
    assert!(result.exit_state(dead).are_copies(a, c));
}

#[test]
fn orphan_blocks_are_reported_unreachable() {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let entry = builder.block();
    let orphan = builder.block();
    builder.assign(entry, a, Operand::Fresh);
    builder.assign(orphan, a, b);
    let cfg = builder.finish().unwrap();

    let result = analyze(&cfg, &NeverCancel).unwrap();
    assert!(result.is_reachable(entry));
    assert!(!result.is_reachable(orphan));
    assert_eq!(result.entry_state(orphan), &CopyState::new());
    assert!(result.exit_state(orphan).are_copies(a, b));
}

#[test]
fn decided_conditions_prune_edges() {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let entry = builder.block();
    let equal = builder.block();
    let different = builder.block();
    builder
        .assign(entry, a, Operand::Fresh)
        .assign(entry, b, a)
        .branch_on(entry, a, b, equal, different);
    let cfg = builder.finish().unwrap();

    let result = analyze(&cfg, &NeverCancel).unwrap();
    assert!(result.is_reachable(equal));
    assert!(!result.is_reachable(different));
    let taken = EdgeRef {
        source: entry,
        index: 0,
    };
    let pruned = EdgeRef {
        source: entry,
        index: 1,
    };
    assert_eq!(result.edge_predicate(taken), PredicateValueKind::AlwaysTrue);
    assert_eq!(result.edge_predicate(pruned), PredicateValueKind::AlwaysFalse);

    let plain = CopyAnalysis::new(&cfg)
        .with_branch_predicates(false)
        .run(&NeverCancel)
        .unwrap();
    assert!(plain.is_reachable(different));
    assert_eq!(plain.edge_predicate(pruned), PredicateValueKind::Unknown);
}

#[test]
fn equality_edge_proves_a_copy() {
    let mut builder = CfgBuilder::new();
    let p = builder.parameter().name("p").new();
    let q = builder.parameter().name("q").new();
    let entry = builder.block();
    let equal = builder.block();
    let different = builder.block();
    builder.branch_on(entry, p, q, equal, different);
    let cfg = builder.finish().unwrap();

    let result = analyze(&cfg, &NeverCancel).unwrap();
    assert!(result.entry_state(equal).are_copies(p, q));
    assert!(!result.entry_state(different).are_copies(p, q));
    assert!(result.is_reachable(different));
}

// ---------------------------------------------------------------------------
// Cancellation and fuel
// ---------------------------------------------------------------------------

#[test]
fn cancelled_run_returns_no_result() {
    let program = opaque_loop();
    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(
        analyze(&program.cfg, &token).unwrap_err(),
        AnalysisError::Cancelled
    );
    assert_eq!(
        analyze(&program.cfg, &AtomicBool::new(true)).unwrap_err(),
        AnalysisError::Cancelled
    );
    assert!(analyze(&program.cfg, &AtomicBool::new(false)).is_ok());
}

/// Counts polls and reports cancellation once `after` of them have passed.
struct CancelAfter {
    polls: Cell<usize>,
    after: usize,
}

impl CancelAfter {
    fn new(after: usize) -> Self {
        Self {
            polls: Cell::new(0),
            after,
        }
    }
}

impl Cancellation for CancelAfter {
    fn is_cancelled(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        polls > self.after
    }
}

#[test]
fn cancellation_is_polled_once_per_visit() {
    let program = opaque_loop();
    let counter = CancelAfter::new(usize::MAX);
    let result = analyze(&program.cfg, &counter).unwrap();
    // One poll per visit, plus the one that finds the worklist empty.
    assert_eq!(counter.polls.get(), result.visits() + 1);
}

#[test]
fn cancellation_mid_run_discards_the_result() {
    let program = opaque_loop();
    let cancel = CancelAfter::new(3);
    assert_eq!(
        analyze(&program.cfg, &cancel).unwrap_err(),
        AnalysisError::Cancelled
    );
    assert_eq!(cancel.polls.get(), 4);
}

#[test]
fn exhausted_fuel_is_an_error() {
    let program = opaque_loop();
    let err = CopyAnalysis::new(&program.cfg)
        .with_max_iterations(2)
        .run(&NeverCancel)
        .unwrap_err();
    assert_eq!(err, AnalysisError::FuelExhausted { limit: 2 });
    assert_eq!(err.to_string(), "no fixpoint after 2 block visits");

    let generous = CopyAnalysis::new(&program.cfg)
        .with_max_iterations(100)
        .run(&NeverCancel);
    assert!(generous.is_ok());
}

#[test]
fn independent_runs_share_nothing() {
    let program = opaque_loop();
    let token = CancellationToken::new();
    let expected = analyze(&program.cfg, &NeverCancel).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| analyze(&program.cfg, &token)))
            .collect();
        for handle in handles {
            let result = handle.join().unwrap().unwrap();
            for block in program.cfg.blocks() {
                assert_eq!(result.entry_state(block), expected.entry_state(block));
                assert_eq!(result.exit_state(block), expected.exit_state(block));
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Lattice laws over computed states
// ---------------------------------------------------------------------------

#[test]
fn computed_states_satisfy_join_laws() {
    let mut states = Vec::new();
    for program in [diamond(false), diamond(true)] {
        let result = analyze(&program.cfg, &NeverCancel).unwrap();
        for block in program.cfg.blocks() {
            states.push(result.entry_state(block).clone());
            states.push(result.exit_state(block).clone());
        }
    }
    states.dedup();
    assert_semilattice_laws(&states);
    for window in states.windows(5) {
        assert_merge_order_independent(window);
    }
}
