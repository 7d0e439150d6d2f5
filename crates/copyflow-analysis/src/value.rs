use std::fmt;

use copyflow_ir::{EntityId, EntityTable};

use crate::entity_set::EntitySet;
use crate::kind::AbstractValueKind;

/// One equivalence class of locations proven to hold equal values.
///
/// Immutable. Equality and hashing are structural over `(entities, kind)`,
/// so two values with the same content are interchangeable wherever they
/// were built.
///
/// ## Invariants
///
/// Checked on every construction path; a violation is a bug in the caller
/// and panics.
///
/// - The entity set is empty exactly when the kind is not known.
/// - A [`KnownReferenceCopy`](AbstractValueKind::KnownReferenceCopy) class
///   contains no value-type entity.
/// - A [`KnownValueCopy`](AbstractValueKind::KnownValueCopy) class with a
///   single non-value-type member is promoted to `KnownReferenceCopy`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AbstractValue {
    entities: EntitySet,
    kind: AbstractValueKind,
}

impl AbstractValue {
    pub fn unknown() -> Self {
        Self::without_entities(AbstractValueKind::Unknown)
    }

    pub fn invalid() -> Self {
        Self::without_entities(AbstractValueKind::Invalid)
    }

    pub fn not_applicable() -> Self {
        Self::without_entities(AbstractValueKind::NotApplicable)
    }

    fn without_entities(kind: AbstractValueKind) -> Self {
        Self::new(EntitySet::empty(), kind)
    }

    /// The class of a single location; its kind follows the location's type.
    pub fn singleton(entity: EntityId) -> Self {
        let kind = if entity.is_value_type() {
            AbstractValueKind::KnownValueCopy
        } else {
            AbstractValueKind::KnownReferenceCopy
        };
        Self::new(EntitySet::singleton(entity), kind)
    }

    /// # Panics
    ///
    /// Panics if `entities` is empty, `kind` is not known, or `kind` is
    /// `KnownReferenceCopy` while some member is a value type.
    pub fn from_entities(entities: EntitySet, kind: AbstractValueKind) -> Self {
        assert!(
            kind.is_known(),
            "from_entities requires a known kind, got {kind:?}"
        );
        Self::new(entities, kind)
    }

    pub fn from_entities_with_reference_flag(entities: EntitySet, is_reference_copy: bool) -> Self {
        let kind = if is_reference_copy {
            AbstractValueKind::KnownReferenceCopy
        } else {
            AbstractValueKind::KnownValueCopy
        };
        Self::from_entities(entities, kind)
    }

    /// A class over `entities` whose kind is derived from the member types:
    /// a reference copy when no member is a value type.
    pub fn for_entities(entities: EntitySet) -> Self {
        let is_reference_copy = entities.iter().all(|entity| !entity.is_value_type());
        Self::from_entities_with_reference_flag(entities, is_reference_copy)
    }

    fn new(entities: EntitySet, kind: AbstractValueKind) -> Self {
        assert_eq!(
            entities.is_empty(),
            !kind.is_known(),
            "{kind:?} value cannot hold entities {entities:?}"
        );
        let kind = match kind {
            AbstractValueKind::KnownValueCopy
                if entities.len() == 1 && entities.iter().all(|entity| !entity.is_value_type()) =>
            {
                AbstractValueKind::KnownReferenceCopy
            }
            AbstractValueKind::KnownReferenceCopy => {
                if let Some(entity) = entities.iter().find(|entity| entity.is_value_type()) {
                    panic!("reference copy class {entities:?} contains value-type entity {entity:?}");
                }
                kind
            }
            other => other,
        };
        Self { entities, kind }
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    pub fn kind(&self) -> AbstractValueKind {
        self.kind
    }

    pub fn is_known(&self) -> bool {
        self.kind.is_known()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The same class without `entity`.
    ///
    /// # Panics
    ///
    /// Panics unless `entity` is a member, the class is known and has more
    /// than one member. Dropping the last member of a class is the caller's
    /// job (the location becomes untracked or `Unknown`).
    pub fn with_entity_removed(&self, entity: EntityId) -> Self {
        assert!(
            self.is_known(),
            "cannot remove {entity:?} from a {:?} value",
            self.kind
        );
        assert!(
            self.contains(entity),
            "{entity:?} is not a member of {:?}",
            self.entities
        );
        assert!(
            self.len() > 1,
            "cannot remove the only member {entity:?} of a class"
        );
        Self::new(self.entities.without(entity), self.kind)
    }

    /// Batch form of [`with_entity_removed`](Self::with_entity_removed).
    ///
    /// # Panics
    ///
    /// Panics unless the class is known, `removed` is a subset of it and at
    /// least one member remains.
    pub fn with_entities_removed(&self, removed: &EntitySet) -> Self {
        assert!(
            self.is_known(),
            "cannot remove {removed:?} from a {:?} value",
            self.kind
        );
        assert!(
            removed.is_subset(&self.entities),
            "{removed:?} is not a subset of {:?}",
            self.entities
        );
        let remaining = self.entities.difference(removed);
        assert!(
            !remaining.is_empty(),
            "removing {removed:?} would empty the class"
        );
        Self::new(remaining, self.kind)
    }

    /// This class extended with `entity`. A reference copy that gains a
    /// value-type member degrades to a value copy.
    ///
    /// # Panics
    ///
    /// Panics if the class is not known.
    pub fn with_entity_added(&self, entity: EntityId) -> Self {
        assert!(
            self.is_known(),
            "cannot add {entity:?} to a {:?} value",
            self.kind
        );
        let kind = if entity.is_value_type() {
            AbstractValueKind::KnownValueCopy
        } else {
            self.kind
        };
        Self::new(self.entities.with(entity), kind)
    }

    pub fn display<'a>(&'a self, table: &'a EntityTable) -> ValueDisplay<'a> {
        ValueDisplay { value: self, table }
    }
}

impl Default for AbstractValue {
    fn default() -> Self {
        AbstractValue::unknown()
    }
}

/// Renders a value as `{a, b} ref`, or just the kind for unknown kinds.
pub struct ValueDisplay<'a> {
    value: &'a AbstractValue,
    table: &'a EntityTable,
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.value.is_known() {
            return f.write_str(self.value.kind.label());
        }
        f.write_str("{")?;
        for (position, entity) in self.value.entities.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.table.display(entity))?;
        }
        write!(f, "}} {}", self.value.kind.label())
    }
}

#[cfg(test)]
mod tests {
    use copyflow_ir::CfgBuilder;

    use super::*;

    fn locals() -> (CfgBuilder, EntityId, EntityId, EntityId) {
        let mut builder = CfgBuilder::new();
        let r1 = builder.local().name("r1").new();
        let r2 = builder.local().name("r2").new();
        let v = builder.local().name("v").value_type(true).new();
        (builder, r1, r2, v)
    }

    #[test]
    fn singleton_kind_follows_type() {
        let (_, r1, _, v) = locals();
        assert_eq!(
            AbstractValue::singleton(r1).kind(),
            AbstractValueKind::KnownReferenceCopy
        );
        assert_eq!(
            AbstractValue::singleton(v).kind(),
            AbstractValueKind::KnownValueCopy
        );
    }

    #[test]
    fn single_reference_value_copy_is_promoted() {
        let (_, r1, _, _) = locals();
        let value = AbstractValue::from_entities(
            EntitySet::singleton(r1),
            AbstractValueKind::KnownValueCopy,
        );
        assert_eq!(value.kind(), AbstractValueKind::KnownReferenceCopy);
    }

    #[test]
    fn multi_member_value_copy_is_kept() {
        let (_, r1, r2, _) = locals();
        let value = AbstractValue::from_entities_with_reference_flag([r1, r2].into_iter().collect(), false);
        assert_eq!(value.kind(), AbstractValueKind::KnownValueCopy);
    }

    #[test]
    #[should_panic(expected = "contains value-type entity")]
    fn reference_copy_over_value_type_panics() {
        let (_, r1, _, v) = locals();
        AbstractValue::from_entities(
            [r1, v].into_iter().collect(),
            AbstractValueKind::KnownReferenceCopy,
        );
    }

    #[test]
    #[should_panic(expected = "requires a known kind")]
    fn from_entities_rejects_unknown_kind() {
        let (_, r1, _, _) = locals();
        AbstractValue::from_entities(EntitySet::singleton(r1), AbstractValueKind::Unknown);
    }

    #[test]
    fn removal_renormalizes_to_reference_copy() {
        let (_, r1, _, v) = locals();
        let value = AbstractValue::from_entities(
            [r1, v].into_iter().collect(),
            AbstractValueKind::KnownValueCopy,
        );
        let rest = value.with_entity_removed(v);
        assert_eq!(rest.entities().as_slice(), &[r1]);
        assert_eq!(rest.kind(), AbstractValueKind::KnownReferenceCopy);

        let batch = value.with_entities_removed(&EntitySet::singleton(v));
        assert_eq!(batch, rest);
    }

    #[test]
    #[should_panic(expected = "only member")]
    fn removing_last_member_panics() {
        let (_, r1, _, _) = locals();
        AbstractValue::singleton(r1).with_entity_removed(r1);
    }

    #[test]
    #[should_panic(expected = "cannot remove")]
    fn removing_from_unknown_panics() {
        let (_, r1, _, _) = locals();
        AbstractValue::unknown().with_entity_removed(r1);
    }

    #[test]
    #[should_panic(expected = "not a member")]
    fn removing_non_member_panics() {
        let (_, r1, r2, _) = locals();
        let value = AbstractValue::for_entities([r1, r2].into_iter().collect());
        let (_, _, _, v) = locals();
        value.with_entity_removed(v);
    }

    #[test]
    #[should_panic(expected = "would empty the class")]
    fn batch_removal_of_everything_panics() {
        let (_, r1, r2, _) = locals();
        let value = AbstractValue::for_entities([r1, r2].into_iter().collect());
        value.with_entities_removed(value.entities());
    }

    #[test]
    fn adding_a_value_type_degrades_reference_copy() {
        let (_, r1, r2, v) = locals();
        let value = AbstractValue::for_entities([r1, r2].into_iter().collect());
        assert_eq!(value.kind(), AbstractValueKind::KnownReferenceCopy);
        let widened = value.with_entity_added(v);
        assert_eq!(widened.kind(), AbstractValueKind::KnownValueCopy);
        assert_eq!(widened.len(), 3);
    }

    #[test]
    fn equality_is_structural() {
        let (_, r1, r2, _) = locals();
        let a = AbstractValue::for_entities([r1, r2].into_iter().collect());
        let b = AbstractValue::singleton(r2).with_entity_added(r1);
        assert_eq!(a, b);
    }

    #[test]
    fn display_lists_members() {
        let (builder, r1, r2, _) = locals();
        let value = AbstractValue::for_entities([r2, r1].into_iter().collect());
        assert_eq!(value.display(builder.entities()).to_string(), "{r1, r2} ref");
        assert_eq!(
            AbstractValue::unknown().display(builder.entities()).to_string(),
            "unknown"
        );
    }
}
