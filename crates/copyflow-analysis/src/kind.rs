/// Classification of an [`AbstractValue`](crate::AbstractValue), ordered from
/// least to most information.
///
/// Only the known/unknown split matters to the analysis; the order is there
/// for readability of dumps and for deterministic sorting.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum AbstractValueKind {
    /// The location is not tracked by this analysis at all.
    NotApplicable,
    /// Statically erroneous or unreachable.
    Invalid,
    /// Nothing is proven about the location.
    Unknown,
    /// Members hold equal values; at least one is a value type.
    KnownValueCopy,
    /// Members hold the same reference; none is a value type.
    KnownReferenceCopy,
}

impl AbstractValueKind {
    pub fn is_known(self) -> bool {
        matches!(
            self,
            AbstractValueKind::KnownValueCopy | AbstractValueKind::KnownReferenceCopy
        )
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            AbstractValueKind::NotApplicable => "n/a",
            AbstractValueKind::Invalid => "invalid",
            AbstractValueKind::Unknown => "unknown",
            AbstractValueKind::KnownValueCopy => "value",
            AbstractValueKind::KnownReferenceCopy => "ref",
        }
    }
}
