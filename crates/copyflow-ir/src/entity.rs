use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::arena::Arena;
use crate::identifier;
use crate::intern::{InternKey, InternTable};

identifier! {
    /// A declared storage root: a local, a parameter or the receiver.
    struct SymbolId
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SymbolKind {
    Local,
    Parameter,
    /// The implicit receiver; its fields are reached through [`Access::Field`].
    This,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
}

/// Interned field name.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldName(u32);

impl From<usize> for FieldName {
    fn from(value: usize) -> Self {
        FieldName(value as u32)
    }
}

impl From<FieldName> for usize {
    fn from(value: FieldName) -> Self {
        value.0 as usize
    }
}

impl InternKey for FieldName {}

/// One step of an access chain below a root symbol.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Access {
    Field(FieldName),
    /// Array element with a statically known index.
    Index(i64),
    TupleElement(u32),
}

/// A trackable storage location: a root symbol followed by an access chain.
///
/// Equality and hashing only look at the root and the chain. The value-type
/// flag is a property of the location, fixed when it is first interned.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisEntity {
    pub root: SymbolId,
    pub accesses: SmallVec<[Access; 2]>,
    pub is_value_type: bool,
}

impl AnalysisEntity {
    pub fn root(root: SymbolId, is_value_type: bool) -> Self {
        Self {
            root,
            accesses: SmallVec::new(),
            is_value_type,
        }
    }

    /// The entity reached from `self` through one more access.
    pub fn child(&self, access: Access, is_value_type: bool) -> Self {
        let mut accesses = self.accesses.clone();
        accesses.push(access);
        Self {
            root: self.root,
            accesses,
            is_value_type,
        }
    }

    /// Whether `self` is reached through `other` (strictly longer chain on the
    /// same root with `other`'s chain as prefix).
    pub fn is_reached_through(&self, other: &AnalysisEntity) -> bool {
        self.root == other.root
            && self.accesses.len() > other.accesses.len()
            && self.accesses.starts_with(&other.accesses)
    }
}

impl PartialEq for AnalysisEntity {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.accesses == other.accesses
    }
}

impl Eq for AnalysisEntity {}

impl Hash for AnalysisEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.accesses.hash(state);
    }
}

/// Handle of an interned [`AnalysisEntity`].
///
/// The handle carries the entity's value-type flag so abstract values can
/// check their invariants without going back to the table.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId {
    index: u32,
    value_type: bool,
}

impl EntityId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn is_value_type(self) -> bool {
        self.value_type
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value_type {
            write!(f, "e{}:val", self.index)
        } else {
            write!(f, "e{}:ref", self.index)
        }
    }
}

/// All storage locations of one procedure.
#[derive(Clone, Debug, Default)]
pub struct EntityTable {
    symbols: Arena<SymbolId, SymbolInfo>,
    fields: InternTable<String, FieldName>,
    entities: InternTable<AnalysisEntity, usize>,
    by_root: FxHashMap<SymbolId, SmallVec<[EntityId; 4]>>,
    by_last_access: FxHashMap<Access, SmallVec<[EntityId; 4]>>,
    address_groups: Vec<SmallVec<[EntityId; 4]>>,
    group_of: FxHashMap<EntityId, usize>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, name: impl Into<String>, kind: SymbolKind) -> SymbolId {
        self.symbols.alloc(SymbolInfo {
            name: name.into(),
            kind,
        })
    }

    pub fn field_name(&mut self, name: impl Into<String>) -> FieldName {
        self.fields.intern(name.into())
    }

    /// Intern `entity`, returning the existing handle for a structurally equal
    /// entity.
    ///
    /// # Panics
    ///
    /// Panics if the root symbol is unknown, or if an equal entity was
    /// interned before with a different value-type flag.
    pub fn intern(&mut self, entity: AnalysisEntity) -> EntityId {
        assert!(
            self.symbols.contains(entity.root),
            "entity refers to unknown symbol {:?}",
            entity.root
        );
        if let Some(index) = self.entities.lookup(&entity) {
            let existing = self.id_at(index);
            assert_eq!(
                existing.is_value_type(),
                entity.is_value_type,
                "entity {} interned twice with different value-type flags",
                self.display(existing)
            );
            return existing;
        }
        let root = entity.root;
        let last_access = entity.accesses.last().copied();
        let value_type = entity.is_value_type;
        let index = self.entities.intern(entity);
        let id = EntityId {
            index: index as u32,
            value_type,
        };
        self.by_root.entry(root).or_default().push(id);
        if let Some(access) = last_access {
            self.by_last_access.entry(access).or_default().push(id);
        }
        id
    }

    /// Intern the root entity of `symbol`.
    pub fn root_entity(&mut self, symbol: SymbolId, is_value_type: bool) -> EntityId {
        self.intern(AnalysisEntity::root(symbol, is_value_type))
    }

    /// Intern the entity reached from `parent` through `access`.
    pub fn child_entity(&mut self, parent: EntityId, access: Access, is_value_type: bool) -> EntityId {
        let child = self.entity(parent).child(access, is_value_type);
        self.intern(child)
    }

    /// Find an already interned entity without inserting it.
    pub fn lookup(&self, entity: &AnalysisEntity) -> Option<EntityId> {
        self.entities.lookup(entity).map(|index| self.id_at(index))
    }

    fn id_at(&self, index: usize) -> EntityId {
        let entity = self
            .entities
            .resolve(index)
            .unwrap_or_else(|| panic!("no entity at index {index}"));
        EntityId {
            index: index as u32,
            value_type: entity.is_value_type,
        }
    }

    /// Whether `id` was handed out by this table, value-type bit included.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities
            .resolve(id.index())
            .is_some_and(|entity| entity.is_value_type == id.is_value_type())
    }

    pub fn entity(&self, id: EntityId) -> &AnalysisEntity {
        self.entities
            .resolve(id.index())
            .unwrap_or_else(|| panic!("unknown entity {id:?}"))
    }

    pub fn symbol(&self, id: SymbolId) -> &SymbolInfo {
        &self.symbols[id]
    }

    pub fn field(&self, name: FieldName) -> &str {
        self.fields
            .resolve(name)
            .map(String::as_str)
            .unwrap_or("<unknown field>")
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.entities.len()).map(|index| self.id_at(index))
    }

    /// The entity one access shorter than `id`, if it was interned.
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        let entity = self.entity(id);
        if entity.accesses.is_empty() {
            return None;
        }
        let mut parent = entity.clone();
        parent.accesses.pop();
        self.lookup(&parent)
    }

    /// Every interned entity reached through `id`, at any depth.
    pub fn descendants(&self, id: EntityId) -> SmallVec<[EntityId; 4]> {
        let entity = self.entity(id);
        let Some(same_root) = self.by_root.get(&entity.root) else {
            return SmallVec::new();
        };
        same_root
            .iter()
            .copied()
            .filter(|&other| self.entity(other).is_reached_through(entity))
            .collect()
    }

    /// Every interned entity whose access chain ends in `access`, in
    /// interning order.
    pub fn ending_in(&self, access: Access) -> &[EntityId] {
        match self.by_last_access.get(&access) {
            Some(entities) => entities.as_slice(),
            None => &[],
        }
    }

    /// Record that `a` and `b` denote the same storage. Groups are merged
    /// transitively.
    pub fn share_address(&mut self, a: EntityId, b: EntityId) {
        if a == b {
            return;
        }
        match (self.group_of.get(&a).copied(), self.group_of.get(&b).copied()) {
            (Some(ga), Some(gb)) if ga == gb => {}
            (Some(ga), Some(gb)) => {
                let moved = std::mem::take(&mut self.address_groups[gb]);
                for &member in &moved {
                    self.group_of.insert(member, ga);
                }
                self.address_groups[ga].extend(moved);
            }
            (Some(g), None) => {
                self.address_groups[g].push(b);
                self.group_of.insert(b, g);
            }
            (None, Some(g)) => {
                self.address_groups[g].push(a);
                self.group_of.insert(a, g);
            }
            (None, None) => {
                let g = self.address_groups.len();
                self.address_groups.push(SmallVec::from_slice(&[a, b]));
                self.group_of.insert(a, g);
                self.group_of.insert(b, g);
            }
        }
    }

    /// The address-shared group containing `id`, if it shares storage with
    /// any other entity. The group includes `id` itself.
    pub fn address_group(&self, id: EntityId) -> Option<&[EntityId]> {
        let g = *self.group_of.get(&id)?;
        Some(self.address_groups[g].as_slice())
    }

    pub fn display(&self, id: EntityId) -> EntityDisplay<'_> {
        EntityDisplay { table: self, id }
    }
}

/// Renders an entity as source-like text, e.g. `a.f[3].1`.
pub struct EntityDisplay<'a> {
    table: &'a EntityTable,
    id: EntityId,
}

impl fmt::Display for EntityDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = self.table.entity(self.id);
        let symbol = self.table.symbol(entity.root);
        match symbol.kind {
            SymbolKind::This => f.write_str("this")?,
            SymbolKind::Local | SymbolKind::Parameter => f.write_str(&symbol.name)?,
        }
        for access in &entity.accesses {
            match access {
                Access::Field(name) => write!(f, ".{}", self.table.field(*name))?,
                Access::Index(index) => write!(f, "[{index}]")?,
                Access::TupleElement(position) => write!(f, ".{position}")?,
            }
        }
        Ok(())
    }
}
