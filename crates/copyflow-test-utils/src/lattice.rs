//! Assertion helpers for verifying join-semilattice laws.
//!
//! These check properties over a given set of sample elements and collect all
//! violations into a single report, so you can see every failing law at once
//! rather than fixing them one at a time.
//!
//! # Example
//!
//! ```
//! use copyflow_analysis::CopyState;
//! use copyflow_test_utils::lattice::assert_semilattice_laws;
//!
//! assert_semilattice_laws(&[CopyState::new()]);
//! ```

use std::fmt::{Debug, Write};

use copyflow_analysis::{CopyState, JoinSemiLattice, merge};

/// Collect violations into a `Vec<String>`, then panic with a combined report
/// if any were found.
fn report(violations: Vec<String>) {
    if violations.is_empty() {
        return;
    }
    let mut msg = format!("{} lattice law violation(s):\n", violations.len());
    for (i, v) in violations.iter().enumerate() {
        let _ = writeln!(msg, "  {}. {}", i + 1, v);
    }
    panic!("{msg}");
}

/// Check that `join` is commutative, associative, and idempotent over the
/// given elements.
///
/// For every pair `(a, b)` and triple `(a, b, c)` drawn from `elements`:
/// - **Commutative**: `a.join(&b) == b.join(&a)`
/// - **Associative**: `a.join(&b).join(&c) == a.join(&b.join(&c))`
/// - **Idempotent**: `a.join(&a) == a`
pub fn assert_join_laws<L: JoinSemiLattice + PartialEq + Debug>(elements: &[L]) {
    let mut violations = Vec::new();
    check_join_laws(elements, &mut violations);
    report(violations);
}

/// Check that `is_subseteq` agrees with `join`: for every pair,
/// `a.is_subseteq(&b)` if and only if `a.join(&b) == b`, and both operands
/// are below their join.
pub fn assert_ordering_consistent<L: JoinSemiLattice + PartialEq + Debug>(elements: &[L]) {
    let mut violations = Vec::new();
    check_ordering_consistent(elements, &mut violations);
    report(violations);
}

/// Join laws plus ordering consistency, reported together.
pub fn assert_semilattice_laws<L: JoinSemiLattice + PartialEq + Debug>(elements: &[L]) {
    let mut violations = Vec::new();
    check_join_laws(elements, &mut violations);
    check_ordering_consistent(elements, &mut violations);
    report(violations);
}

/// Check that the n-ary [`merge`] of `states` gives the same state for
/// every permutation of the inputs, and that it agrees with a left fold of
/// binary joins.
///
/// # Panics
///
/// Panics if given more than eight states; the check is exhaustive.
pub fn assert_merge_order_independent(states: &[CopyState]) {
    assert!(
        states.len() <= 8,
        "{} states is too many to permute exhaustively",
        states.len()
    );
    let mut violations = Vec::new();
    let expected = merge(states);

    let reordered = permutations(states.len())
        .into_iter()
        .find(|order| merge(order.iter().map(|&index| &states[index])) != expected);
    if let Some(order) = reordered {
        violations.push(format!("merge depends on order: {order:?} of {states:?}"));
    }
    if let Some((first, rest)) = states.split_first() {
        let folded = rest.iter().fold(first.clone(), |acc, state| acc.join(state));
        if folded != expected {
            violations.push(format!(
                "n-ary merge {expected:?} differs from folded joins {folded:?}"
            ));
        }
    }
    if let Err(violation) = expected.check_invariants() {
        violations.push(format!("merged state is malformed: {violation}"));
    }
    for state in states {
        if !state.is_subseteq(&expected) {
            violations.push(format!("input {state:?} is not below the merge"));
        }
    }
    report(violations);
}

// ---- internal helpers that push violations instead of panicking ----

/// Every ordering of `0..len`, generated with Heap's algorithm.
fn permutations(len: usize) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut all = vec![order.clone()];
    let mut counters = vec![0; len];
    let mut i = 1;
    while i < len {
        if counters[i] < i {
            if i % 2 == 0 {
                order.swap(0, i);
            } else {
                order.swap(counters[i], i);
            }
            all.push(order.clone());
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
    all
}

fn check_join_laws<L: JoinSemiLattice + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    for a in elements {
        // idempotent
        if a.join(a) != *a {
            v.push(format!("join not idempotent: {a:?}.join({a:?}) != {a:?}"));
        }
        for b in elements {
            // commutative
            if a.join(b) != b.join(a) {
                v.push(format!(
                    "join not commutative: {a:?}.join({b:?}) != {b:?}.join({a:?})"
                ));
            }
            // associative
            for c in elements {
                if a.join(b).join(c) != a.join(&b.join(c)) {
                    v.push(format!(
                        "join not associative: ({a:?}.join({b:?})).join({c:?}) != {a:?}.join({b:?}.join({c:?}))"
                    ));
                }
            }
        }
    }
}

fn check_ordering_consistent<L: JoinSemiLattice + PartialEq + Debug>(
    elements: &[L],
    v: &mut Vec<String>,
) {
    for a in elements {
        for b in elements {
            let sub = a.is_subseteq(b);
            let join_agrees = a.join(b) == *b;
            if sub != join_agrees {
                v.push(format!(
                    "ordering inconsistent with join: {a:?}.is_subseteq({b:?}) = {sub}, \
                     but {a:?}.join({b:?}) == {b:?} is {join_agrees}"
                ));
            }
            let joined = a.join(b);
            if !a.is_subseteq(&joined) {
                v.push(format!("{a:?} is not below {a:?}.join({b:?})"));
            }
        }
    }
}
