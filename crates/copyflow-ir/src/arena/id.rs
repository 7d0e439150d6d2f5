use std::hash::Hash;

/// Raw arena position. Only [`Arena::alloc`](super::Arena::alloc) and
/// [`Arena::next_id`](super::Arena::next_id) hand these out.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Id(pub(crate) usize);

impl Id {
    pub fn raw(self) -> usize {
        self.0
    }
}

pub trait Identifier:
    Sized + Clone + Copy + Hash + Ord + std::fmt::Debug + PartialEq + Eq + From<Id> + Into<Id>
{
}

#[macro_export(local_inner_macros)]
macro_rules! identifier {
    ($(#[$attr:meta])* struct $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub(crate) $crate::Id);

        impl $name {
            /// Position of this item in its owning arena.
            pub fn index(self) -> usize {
                self.0.raw()
            }
        }

        impl From<$crate::Id> for $name {
            fn from(value: $crate::Id) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $crate::Id {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl $crate::Identifier for $name {}
    };
}
