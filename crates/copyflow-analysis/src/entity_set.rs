use std::sync::Arc;

use copyflow_ir::EntityId;

/// Immutable, sorted, duplicate-free set of entities.
///
/// Backed by a shared slice: cloning never copies the members, and every
/// derived set is a fresh allocation, so sets handed out earlier stay valid.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EntitySet(Arc<[EntityId]>);

impl EntitySet {
    pub fn empty() -> Self {
        EntitySet(Arc::from(Vec::new()))
    }

    pub fn singleton(entity: EntityId) -> Self {
        EntitySet(Arc::from(vec![entity]))
    }

    fn from_sorted(entities: Vec<EntityId>) -> Self {
        debug_assert!(entities.windows(2).all(|pair| pair[0] < pair[1]));
        EntitySet(Arc::from(entities))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.0.binary_search(&entity).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.0
    }

    /// The smallest member; used as the representative of a class.
    pub fn first(&self) -> Option<EntityId> {
        self.0.first().copied()
    }

    pub fn is_subset(&self, other: &EntitySet) -> bool {
        self.len() <= other.len() && self.iter().all(|entity| other.contains(entity))
    }

    pub fn with(&self, entity: EntityId) -> Self {
        match self.0.binary_search(&entity) {
            Ok(_) => self.clone(),
            Err(position) => {
                let mut members = Vec::with_capacity(self.len() + 1);
                members.extend_from_slice(&self.0[..position]);
                members.push(entity);
                members.extend_from_slice(&self.0[position..]);
                EntitySet::from_sorted(members)
            }
        }
    }

    pub fn without(&self, entity: EntityId) -> Self {
        self.iter().filter(|&member| member != entity).collect()
    }

    pub fn difference(&self, other: &EntitySet) -> Self {
        self.iter().filter(|&member| !other.contains(member)).collect()
    }

    pub fn intersection(&self, other: &EntitySet) -> Self {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().filter(|&member| large.contains(member)).collect()
    }

    pub fn union(&self, other: &EntitySet) -> Self {
        let (left, right) = (self.as_slice(), other.as_slice());
        let mut members = Vec::with_capacity(left.len() + right.len());
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            match left[i].cmp(&right[j]) {
                std::cmp::Ordering::Less => {
                    members.push(left[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    members.push(right[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    members.push(left[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        members.extend_from_slice(&left[i..]);
        members.extend_from_slice(&right[j..]);
        EntitySet::from_sorted(members)
    }
}

impl Default for EntitySet {
    fn default() -> Self {
        EntitySet::empty()
    }
}

impl FromIterator<EntityId> for EntitySet {
    fn from_iter<T: IntoIterator<Item = EntityId>>(iter: T) -> Self {
        let mut members: Vec<EntityId> = iter.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        EntitySet::from_sorted(members)
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = EntityId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, EntityId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl std::fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}
