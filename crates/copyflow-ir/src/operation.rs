use smallvec::SmallVec;

use crate::entity::EntityId;

/// Right-hand side of a write.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// The current value of another tracked location.
    Entity(EntityId),
    /// A newly created value no other location holds yet (allocation,
    /// literal, default value).
    Fresh,
    /// A value the analysis cannot track, such as the result of an
    /// unresolved call.
    Opaque,
    /// A statically erroneous value.
    Invalid,
}

impl Operand {
    pub fn entity(self) -> Option<EntityId> {
        match self {
            Operand::Entity(entity) => Some(entity),
            Operand::Fresh | Operand::Opaque | Operand::Invalid => None,
        }
    }
}

impl From<EntityId> for Operand {
    fn from(value: EntityId) -> Self {
        Operand::Entity(value)
    }
}

/// One abstract operation of a basic block.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// `target := source`
    Assign { target: EntityId, source: Operand },
    /// `target` starts a new lifetime holding a value nothing else holds.
    Declare { target: EntityId },
    /// `entity` may have been written through an alias the analysis cannot
    /// see (address taken, passed by reference, volatile access).
    Invalidate { entity: EntityId },
    /// The listed locals go out of scope.
    ScopeExit { entities: SmallVec<[EntityId; 4]> },
}

impl Operation {
    pub fn assign(target: EntityId, source: impl Into<Operand>) -> Self {
        Operation::Assign {
            target,
            source: source.into(),
        }
    }

    pub fn declare(target: EntityId) -> Self {
        Operation::Declare { target }
    }

    pub fn invalidate(entity: EntityId) -> Self {
        Operation::Invalidate { entity }
    }

    pub fn scope_exit(entities: impl IntoIterator<Item = EntityId>) -> Self {
        Operation::ScopeExit {
            entities: entities.into_iter().collect(),
        }
    }

    /// The location this operation writes, if any.
    pub fn write_target(&self) -> Option<EntityId> {
        match self {
            Operation::Assign { target, .. } | Operation::Declare { target } => Some(*target),
            Operation::Invalidate { entity } => Some(*entity),
            Operation::ScopeExit { .. } => None,
        }
    }

    /// The values this operation reads.
    pub fn read_sources(&self) -> SmallVec<[Operand; 1]> {
        match self {
            Operation::Assign { source, .. } => SmallVec::from_buf([*source]),
            Operation::Declare { .. } => SmallVec::from_buf([Operand::Fresh]),
            Operation::Invalidate { .. } => SmallVec::from_buf([Operand::Opaque]),
            Operation::ScopeExit { .. } => SmallVec::new(),
        }
    }
}
