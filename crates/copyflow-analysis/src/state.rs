use std::fmt;

use copyflow_ir::{EntityId, EntityTable};
use rpds::HashTrieMapSync;
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::entity_set::EntitySet;
use crate::kind::AbstractValueKind;
use crate::value::AbstractValue;

/// Copy facts at one program point: a partition of the tracked entities
/// into classes of locations proven to hold equal values.
///
/// Every known class is recorded under each of its members, and a member
/// always maps to a class that contains it. Entities mapped to an unknown
/// kind are tracked but belong to no class; absent entities are untracked.
///
/// The map is persistent: cloning a state is constant time and the
/// states of neighbouring program points share their unchanged entries.
/// Operations consume the state and return the successor.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CopyState {
    values: HashTrieMapSync<EntityId, AbstractValue, FxBuildHasher>,
}

// `FxBuildHasher` is not `Debug`, so the map cannot use the derive.
impl fmt::Debug for CopyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyState")
            .field("values", &fmt::from_fn(|f| f.debug_map().entries(self.values.iter()).finish()))
            .finish()
    }
}

impl CopyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The class of `entity`, or an `Unknown` value if it is untracked.
    pub fn class_of(&self, entity: EntityId) -> AbstractValue {
        match self.values.get(&entity) {
            Some(value) => {
                debug_assert!(!value.is_known() || value.contains(entity));
                value.clone()
            }
            None => AbstractValue::unknown(),
        }
    }

    pub fn get(&self, entity: EntityId) -> Option<&AbstractValue> {
        self.values.get(&entity)
    }

    pub fn is_tracked(&self, entity: EntityId) -> bool {
        self.values.contains_key(&entity)
    }

    /// Whether `a` and `b` are in the same known class.
    pub fn are_copies(&self, a: EntityId, b: EntityId) -> bool {
        match self.values.get(&a) {
            Some(value) => value.is_known() && value.contains(b),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.size()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &AbstractValue)> {
        self.values.iter().map(|(entity, value)| (*entity, value))
    }

    /// Every tracked entity, sorted.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self.values.keys().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// The distinct known classes, ordered by their smallest member.
    pub fn classes(&self) -> Vec<AbstractValue> {
        let mut seen = FxHashSet::default();
        let mut classes: Vec<AbstractValue> = self
            .values
            .values()
            .filter(|value| value.is_known())
            .filter(|value| seen.insert(value.entities().first()))
            .cloned()
            .collect();
        classes.sort_by_key(|value| value.entities().first());
        classes
    }

    /// `target := <value of class source>`.
    ///
    /// `target` leaves its current class and joins `source`. A known
    /// `source` is extended with `target`; an unknown one leaves `target` in
    /// a class of its own. Members of `source` that are currently recorded in
    /// other classes are moved out of them first, so `source` does not have
    /// to come from this state.
    pub fn record_assignment(mut self, target: EntityId, source: &AbstractValue) -> Self {
        if !source.is_known() {
            self.detach(target);
            self.values
                .insert_mut(target, AbstractValue::singleton(target));
            return self;
        }
        if source.contains(target) && self.values.get(&target) == Some(source) {
            return self;
        }

        self.detach(target);
        let joined = source.with_entity_added(target);
        for member in source.entities() {
            if self.values.get(&member) != Some(source) {
                self.detach(member);
            }
        }
        self.install(&joined);
        self
    }

    /// `target := <untrackable value>`: `target` stays tracked as `Unknown`.
    pub fn record_assignment_unknown_source(self, target: EntityId) -> Self {
        self.record_non_copy(target, AbstractValue::unknown())
    }

    /// `target := <statically invalid value>`.
    pub fn record_assignment_invalid_source(self, target: EntityId) -> Self {
        self.record_non_copy(target, AbstractValue::invalid())
    }

    fn record_non_copy(mut self, target: EntityId, value: AbstractValue) -> Self {
        self.detach(target);
        self.values.insert_mut(target, value);
        self
    }

    /// `entity` may have been written behind the analysis' back.
    ///
    /// Only `entity` itself is affected; locations reached through it are
    /// the caller's concern.
    pub fn invalidate(self, entity: EntityId) -> Self {
        self.record_assignment_unknown_source(entity)
    }

    /// `entity` goes out of scope: it leaves its class and is no longer
    /// tracked.
    pub fn remove_entity_from_scope(mut self, entity: EntityId) -> Self {
        self.detach(entity);
        self
    }

    /// Batch form of [`remove_entity_from_scope`](Self::remove_entity_from_scope).
    pub fn remove_entities_from_scope(mut self, entities: &EntitySet) -> Self {
        let mut affected: Vec<AbstractValue> = Vec::new();
        for entity in entities {
            if let Some(value) = self.take(entity) {
                if value.is_known() && !affected.contains(&value) {
                    affected.push(value);
                }
            }
        }
        for class in affected {
            let removed = class.entities().intersection(entities);
            if removed.len() == class.len() {
                continue;
            }
            let remaining = class.with_entities_removed(&removed);
            self.install(&remaining);
        }
        self
    }

    /// Record that `a` and `b` hold the same value: their classes (or the
    /// locations themselves, if untracked) become one class.
    pub fn record_equal(self, a: EntityId, b: EntityId) -> Self {
        if self.are_copies(a, b) {
            return self;
        }
        let class_a = self.known_class_or_singleton(a);
        let class_b = self.known_class_or_singleton(b);
        let both_reference = class_a.kind() == AbstractValueKind::KnownReferenceCopy
            && class_b.kind() == AbstractValueKind::KnownReferenceCopy;
        let merged = AbstractValue::from_entities_with_reference_flag(
            class_a.entities().union(class_b.entities()),
            both_reference,
        );
        let mut state = self;
        for member in merged.entities() {
            state.values.remove_mut(&member);
        }
        state.install(&merged);
        state
    }

    fn known_class_or_singleton(&self, entity: EntityId) -> AbstractValue {
        match self.values.get(&entity) {
            Some(value) if value.is_known() => value.clone(),
            _ => AbstractValue::singleton(entity),
        }
    }

    /// Take `entity` out of its class, rewriting the entries of the members
    /// that stay behind. The entity ends up untracked.
    fn detach(&mut self, entity: EntityId) {
        let Some(old) = self.take(entity) else {
            return;
        };
        if old.is_known() && old.len() > 1 {
            let rest = old.with_entity_removed(entity);
            self.install(&rest);
        }
    }

    fn take(&mut self, entity: EntityId) -> Option<AbstractValue> {
        let value = self.values.get(&entity).cloned()?;
        self.values.remove_mut(&entity);
        Some(value)
    }

    /// Record `class` under each of its members, replacing their entries.
    pub(crate) fn with_class(mut self, class: AbstractValue) -> Self {
        debug_assert!(class.is_known());
        self.install(&class);
        self
    }

    /// Record a non-copy entry for `entity` without touching other entries.
    pub(crate) fn with_non_copy(mut self, entity: EntityId, value: AbstractValue) -> Self {
        debug_assert!(!value.is_known());
        self.values.insert_mut(entity, value);
        self
    }

    fn install(&mut self, class: &AbstractValue) {
        for member in class.entities() {
            self.values.insert_mut(member, class.clone());
        }
    }

    /// Check the partition invariants: containment and closure. Returns a
    /// description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (entity, value) in self.values.iter() {
            if !value.is_known() {
                continue;
            }
            if !value.contains(*entity) {
                return Err(format!("{entity:?} maps to {value:?} which does not contain it"));
            }
            for member in value.entities() {
                match self.values.get(&member) {
                    Some(other) if other == value => {}
                    other => {
                        return Err(format!(
                            "{entity:?} and {member:?} share {value:?} but {member:?} maps to {other:?}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn display<'a>(&'a self, table: &'a EntityTable) -> StateDisplay<'a> {
        StateDisplay { state: self, table }
    }
}

/// Renders a state one class per line, followed by the tracked entities
/// that belong to no class. Output is sorted and stable.
pub struct StateDisplay<'a> {
    state: &'a CopyState,
    table: &'a EntityTable,
}

impl fmt::Display for StateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self
            .state
            .classes()
            .iter()
            .map(|class| class.display(self.table).to_string())
            .collect();
        for entity in self.state.entities() {
            let Some(value) = self.state.values.get(&entity) else {
                continue;
            };
            if !value.is_known() {
                lines.push(format!(
                    "{}: {}",
                    self.table.display(entity),
                    value.display(self.table)
                ));
            }
        }
        if lines.is_empty() {
            return f.write_str("(empty)");
        }
        f.write_str(&lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use copyflow_ir::CfgBuilder;

    use super::*;

    struct Locals {
        builder: CfgBuilder,
        a: EntityId,
        b: EntityId,
        c: EntityId,
        v: EntityId,
    }

    fn locals() -> Locals {
        let mut builder = CfgBuilder::new();
        let a = builder.local().name("a").new();
        let b = builder.local().name("b").new();
        let c = builder.local().name("c").new();
        let v = builder.local().name("v").value_type(true).new();
        Locals { builder, a, b, c, v }
    }

    #[test]
    fn untracked_entity_is_unknown() {
        let l = locals();
        let state = CopyState::new();
        assert_eq!(state.class_of(l.a), AbstractValue::unknown());
        assert!(!state.is_tracked(l.a));
    }

    #[test]
    fn assignment_chain_builds_one_class() {
        let l = locals();
        let state = CopyState::new().record_assignment(l.b, &AbstractValue::unknown());
        let source = state.class_of(l.b);
        let state = state.record_assignment(l.a, &source);
        let source = state.class_of(l.a);
        let state = state.record_assignment(l.c, &source);

        let class = state.class_of(l.a);
        assert_eq!(class.entities().as_slice(), &[l.a, l.b, l.c]);
        assert_eq!(class.kind(), AbstractValueKind::KnownReferenceCopy);
        assert_eq!(state.class_of(l.b), class);
        assert_eq!(state.class_of(l.c), class);
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn reassignment_leaves_old_class_consistent() {
        let l = locals();
        let state = CopyState::new().record_equal(l.a, l.b).record_equal(l.b, l.c);
        assert_eq!(state.class_of(l.a).len(), 3);

        let state = state.record_assignment_unknown_source(l.b);
        assert_eq!(state.class_of(l.b).kind(), AbstractValueKind::Unknown);
        assert!(state.is_tracked(l.b));
        assert_eq!(state.class_of(l.a).entities().as_slice(), &[l.a, l.c]);
        assert_eq!(state.class_of(l.c), state.class_of(l.a));
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn scope_exit_drops_the_entity() {
        let l = locals();
        let state = CopyState::new().record_equal(l.a, l.b);
        let state = state.remove_entity_from_scope(l.a);
        assert!(!state.is_tracked(l.a));
        assert_eq!(state.class_of(l.b), AbstractValue::singleton(l.b));
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn batch_scope_exit_shrinks_classes() {
        let l = locals();
        let state = CopyState::new()
            .record_equal(l.a, l.b)
            .record_equal(l.a, l.c)
            .record_assignment(l.v, &AbstractValue::unknown());
        let exiting: EntitySet = [l.a, l.b, l.v].into_iter().collect();
        let state = state.remove_entities_from_scope(&exiting);
        assert_eq!(state.entities(), vec![l.c]);
        assert_eq!(state.class_of(l.c), AbstractValue::singleton(l.c));
    }

    #[test]
    fn assigning_within_the_same_class_is_a_no_op() {
        let l = locals();
        let state = CopyState::new().record_equal(l.a, l.b);
        let again = state.clone().record_assignment(l.a, &state.class_of(l.b));
        assert_eq!(again, state);
    }

    #[test]
    fn foreign_source_members_are_moved() {
        let l = locals();
        let state = CopyState::new().record_equal(l.a, l.b);
        let source = AbstractValue::singleton(l.b);
        let state = state.record_assignment(l.c, &source);
        assert!(state.are_copies(l.b, l.c));
        assert_eq!(state.class_of(l.a), AbstractValue::singleton(l.a));
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn value_type_target_degrades_reference_class() {
        let l = locals();
        let state = CopyState::new().record_assignment(l.a, &AbstractValue::unknown());
        let source = state.class_of(l.a);
        let state = state.record_assignment(l.v, &source);
        let class = state.class_of(l.v);
        assert_eq!(class.kind(), AbstractValueKind::KnownValueCopy);
        assert_eq!(class.entities().as_slice(), &[l.a, l.v]);
    }

    #[test]
    fn display_is_sorted() {
        let l = locals();
        let state = CopyState::new()
            .record_equal(l.c, l.b)
            .record_assignment_unknown_source(l.a)
            .record_assignment_invalid_source(l.v);
        assert_eq!(
            state.display(l.builder.entities()).to_string(),
            "{b, c} ref\na: unknown\nv: invalid"
        );
        assert_eq!(
            CopyState::new().display(l.builder.entities()).to_string(),
            "(empty)"
        );
    }

    #[test]
    fn successor_states_leave_the_original_intact() {
        let l = locals();
        let before = CopyState::new().record_equal(l.a, l.b);
        let after = before
            .clone()
            .record_assignment_unknown_source(l.a)
            .remove_entity_from_scope(l.b);
        assert!(before.are_copies(l.a, l.b));
        assert_eq!(before.len(), 2);
        assert_eq!(after.class_of(l.a).kind(), AbstractValueKind::Unknown);
        assert!(!after.is_tracked(l.b));
        assert_eq!(after.check_invariants(), Ok(()));
    }
}
