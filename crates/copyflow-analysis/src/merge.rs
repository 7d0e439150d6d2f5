//! The join of copy states at control-flow merge points.
//!
//! A fact survives the merge only if every reachable predecessor proves it.
//! For an entity known everywhere, its merged class is the intersection of
//! its classes; anything else degrades to `Unknown`.

use copyflow_ir::EntityId;
use rustc_hash::FxHashSet;

use crate::entity_set::EntitySet;
use crate::kind::AbstractValueKind;
use crate::state::CopyState;
use crate::value::AbstractValue;

/// Merge the states flowing into one program point.
///
/// The result does not depend on the order of `states`, and merging a state
/// with itself returns it unchanged. No input yields the empty state.
pub fn merge<'a>(states: impl IntoIterator<Item = &'a CopyState>) -> CopyState {
    let inputs: Vec<&CopyState> = states.into_iter().collect();
    match inputs.as_slice() {
        [] => CopyState::new(),
        [single] => (*single).clone(),
        _ => merge_all(&inputs),
    }
}

/// Merge `states[i]` for every `i` with `reachable[i]`. Unreachable
/// predecessors contribute no constraint.
///
/// # Panics
///
/// Panics if the two slices differ in length.
pub fn merge_reachable(states: &[CopyState], reachable: &[bool]) -> CopyState {
    assert_eq!(
        states.len(),
        reachable.len(),
        "one reachability flag per predecessor state"
    );
    merge(
        states
            .iter()
            .zip(reachable)
            .filter(|(_, reachable)| **reachable)
            .map(|(state, _)| state),
    )
}

fn merge_all(inputs: &[&CopyState]) -> CopyState {
    let mut keys: FxHashSet<EntityId> = FxHashSet::default();
    for state in inputs {
        keys.extend(state.iter().map(|(entity, _)| entity));
    }

    let mut merged = CopyState::new();
    let mut done: FxHashSet<EntityId> = FxHashSet::default();
    for entity in keys {
        if done.contains(&entity) {
            continue;
        }
        match merge_entity(inputs, entity) {
            Merged::Class(class) => {
                done.extend(class.entities().iter());
                merged = merged.with_class(class);
            }
            Merged::Other(value) => {
                done.insert(entity);
                merged = merged.with_non_copy(entity, value);
            }
        }
    }
    merged
}

enum Merged {
    Class(AbstractValue),
    Other(AbstractValue),
}

fn merge_entity(inputs: &[&CopyState], entity: EntityId) -> Merged {
    let values: Vec<Option<&AbstractValue>> =
        inputs.iter().map(|state| state.get(entity)).collect();

    let known: Vec<&AbstractValue> = values
        .iter()
        .flatten()
        .copied()
        .filter(|value| value.is_known())
        .collect();
    if known.len() == values.len() {
        return merge_known(entity, &known);
    }
    if !known.is_empty() {
        return Merged::Other(AbstractValue::unknown());
    }

    // Every input is absent or non-known here; keys come from some input, so
    // at least one is present.
    let mut kinds = values
        .iter()
        .map(|value| value.map(|value| value.kind()));
    let first = kinds.next().flatten();
    let agreed = match first {
        Some(kind) if kinds.all(|other| other == Some(kind)) => kind,
        _ => AbstractValueKind::Unknown,
    };
    Merged::Other(match agreed {
        AbstractValueKind::Invalid => AbstractValue::invalid(),
        AbstractValueKind::NotApplicable => AbstractValue::not_applicable(),
        _ => AbstractValue::unknown(),
    })
}

fn merge_known(entity: EntityId, classes: &[&AbstractValue]) -> Merged {
    let mut members: EntitySet = classes[0].entities().clone();
    for class in &classes[1..] {
        members = members.intersection(class.entities());
    }
    debug_assert!(members.contains(entity));

    let collapsed = members.len() == 1 && classes.iter().any(|class| class.len() > 1);
    if collapsed {
        return Merged::Other(AbstractValue::unknown());
    }
    let all_reference = classes
        .iter()
        .all(|class| class.kind() == AbstractValueKind::KnownReferenceCopy);
    Merged::Class(AbstractValue::from_entities_with_reference_flag(
        members,
        all_reference,
    ))
}
