//! Transfer functions: the effect of one operation on the copy facts.
//!
//! A write to `e` changes more than `e` when cascading invalidation is on:
//!
//! - locations reached through `e` (`e.f`, `e[0]`) hold different values;
//! - a value-type container of `e` (`s` for `s.f`) holds a different value,
//!   and so on up to the first reference-typed ancestor;
//! - a write that goes through a reference may be observed through any other
//!   reference, so tracked locations ending in the same access behind some
//!   other reference are forgotten as well;
//! - locations that share `e`'s storage end up in `e`'s class, and locations
//!   that share storage with a changed container are forgotten along with
//!   everything reached through them.
//!
//! Forgotten locations stay tracked as `Unknown`.

use copyflow_ir::{Access, EntityId, EntityTable, Operand, Operation};
use log::trace;
use smallvec::SmallVec;

use crate::entity_set::EntitySet;
use crate::kind::AbstractValueKind;
use crate::state::CopyState;
use crate::value::AbstractValue;

/// Applies operations to copy states for one control-flow graph.
#[derive(Clone, Copy, Debug)]
pub struct Transfer<'a> {
    entities: &'a EntityTable,
    cascade: bool,
}

impl<'a> Transfer<'a> {
    pub fn new(entities: &'a EntityTable) -> Self {
        Self {
            entities,
            cascade: true,
        }
    }

    pub fn with_cascading_invalidation(mut self, enabled: bool) -> Self {
        self.cascade = enabled;
        self
    }

    /// Run every operation of a block in order.
    pub fn block(&self, state: CopyState, operations: &[Operation]) -> CopyState {
        operations
            .iter()
            .fold(state, |state, operation| self.operation(state, operation))
    }

    pub fn operation(&self, state: CopyState, operation: &Operation) -> CopyState {
        trace!("transfer {operation:?}");
        match operation {
            Operation::Assign { target, source } => self.assign(state, *target, *source),
            Operation::Declare { target } => self.assign(state, *target, Operand::Fresh),
            Operation::Invalidate { entity } => self.assign(state, *entity, Operand::Opaque),
            Operation::ScopeExit { entities } => self.scope_exit(state, entities),
        }
    }

    fn assign(&self, state: CopyState, target: EntityId, source: Operand) -> CopyState {
        let source = match source {
            Operand::Entity(entity) if entity == target => return state,
            Operand::Entity(entity)
                if state.class_of(entity).kind() == AbstractValueKind::Invalid =>
            {
                Operand::Invalid
            }
            other => other,
        };

        let containers = if self.cascade {
            self.containers(target)
        } else {
            SmallVec::new()
        };
        let clobbered = self.clobbered_by_write(target, &containers);
        let source_class = source
            .entity()
            .and_then(|entity| self.source_class(&state, entity, &clobbered));

        let state = self.forget(state, &clobbered);
        let state = match (source, source_class) {
            (_, Some(class)) => state.record_assignment(target, &class),
            (Operand::Opaque, None) => state.record_assignment_unknown_source(target),
            (Operand::Invalid, None) => state.record_assignment_invalid_source(target),
            (Operand::Entity(_) | Operand::Fresh, None) => {
                state.record_assignment(target, &AbstractValue::unknown())
            }
        };
        let state = self.sync_address_group(state, target);
        containers
            .iter()
            .fold(state, |state, &container| self.sync_address_group(state, container))
    }

    /// The class `target` joins when it is assigned from `source`, leaving
    /// out members whose value the write changes. `None` if nothing is left.
    fn source_class(
        &self,
        state: &CopyState,
        source: EntityId,
        clobbered: &EntitySet,
    ) -> Option<AbstractValue> {
        let class = state.class_of(source);
        let class = if class.is_known() {
            class
        } else {
            self.default_class(source)
        };
        let remaining = class.entities().difference(clobbered);
        if remaining.is_empty() {
            return None;
        }
        Some(AbstractValue::from_entities(remaining, class.kind()))
    }

    /// What is known about a location nothing has been recorded for: it
    /// equals itself and whatever shares its storage.
    fn default_class(&self, entity: EntityId) -> AbstractValue {
        let group = self.entities.address_group(entity).unwrap_or_default();
        AbstractValue::for_entities(
            std::iter::once(entity)
                .chain(group.iter().copied())
                .collect(),
        )
    }

    /// Value-type containers whose value a write to `target` changes,
    /// innermost first, up to the first reference-typed ancestor.
    fn containers(&self, target: EntityId) -> SmallVec<[EntityId; 2]> {
        let mut containers = SmallVec::new();
        let mut current = target;
        while let Some(parent) = self.entities.parent(current) {
            if !parent.is_value_type() {
                break;
            }
            containers.push(parent);
            current = parent;
        }
        containers
    }

    /// Every location, other than `target` itself, whose value a write to
    /// `target` changes or may change.
    fn clobbered_by_write(&self, target: EntityId, containers: &[EntityId]) -> EntitySet {
        if !self.cascade {
            return EntitySet::empty();
        }
        let mut clobbered: Vec<EntityId> = self.entities.descendants(target).to_vec();
        if let Some(group) = self.entities.address_group(target) {
            for &member in group {
                clobbered.extend(self.entities.descendants(member));
            }
        }

        for &container in containers {
            clobbered.push(container);
            let Some(group) = self.entities.address_group(container) else {
                continue;
            };
            for &member in group {
                if member == container {
                    continue;
                }
                clobbered.push(member);
                clobbered.extend(self.entities.descendants(member));
            }
        }

        for location in std::iter::once(target).chain(containers.iter().copied()) {
            if !self.reached_through_reference(location) {
                continue;
            }
            let Some(access) = self.last_access(location) else {
                continue;
            };
            for &other in self.entities.ending_in(access) {
                if other != location && self.reached_through_reference(other) {
                    clobbered.push(other);
                    clobbered.extend(self.entities.descendants(other));
                }
            }
        }

        clobbered
            .into_iter()
            .filter(|&entity| entity != target)
            .collect()
    }

    fn last_access(&self, entity: EntityId) -> Option<Access> {
        self.entities.entity(entity).accesses.last().copied()
    }

    /// Whether some proper ancestor of `entity` is a reference, i.e. the
    /// location lives on the heap.
    fn reached_through_reference(&self, entity: EntityId) -> bool {
        let mut current = entity;
        loop {
            match self.entities.parent(current) {
                Some(parent) if parent.is_value_type() => current = parent,
                Some(_) => return true,
                // An ancestor that was never interned is of unknown type.
                None => return !self.entities.entity(current).accesses.is_empty(),
            }
        }
    }

    fn forget(&self, state: CopyState, clobbered: &EntitySet) -> CopyState {
        let tracked: Vec<EntityId> = clobbered
            .iter()
            .filter(|&entity| state.is_tracked(entity))
            .collect();
        tracked.into_iter().fold(state, |state, entity| {
            trace!("forget {}", self.entities.display(entity));
            state.invalidate(entity)
        })
    }

    /// Put every location sharing `target`'s storage into `target`'s class.
    fn sync_address_group(&self, state: CopyState, target: EntityId) -> CopyState {
        let Some(group) = self.entities.address_group(target) else {
            return state;
        };
        let mut state = state;
        for &member in group {
            if member == target {
                continue;
            }
            let value = state.class_of(target);
            state = if value.is_known() {
                state.record_assignment(member, &value)
            } else if value.kind() == AbstractValueKind::Invalid {
                state.record_assignment_invalid_source(member)
            } else {
                state.record_assignment_unknown_source(member)
            };
        }
        state
    }

    fn scope_exit(&self, state: CopyState, entities: &[EntityId]) -> CopyState {
        let mut exiting: Vec<EntityId> = entities.to_vec();
        if self.cascade {
            for &entity in entities {
                exiting.extend(self.entities.descendants(entity));
            }
        }
        let exiting: EntitySet = exiting.into_iter().collect();
        state.remove_entities_from_scope(&exiting)
    }
}
