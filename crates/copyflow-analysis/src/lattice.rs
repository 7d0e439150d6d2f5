use crate::merge::merge;
use crate::state::CopyState;

/// A join semilattice: `join` is commutative, associative and idempotent,
/// and `is_subseteq` is the order it induces.
pub trait JoinSemiLattice {
    fn join(&self, other: &Self) -> Self;
    fn is_subseteq(&self, other: &Self) -> bool;
}

impl JoinSemiLattice for CopyState {
    fn join(&self, other: &Self) -> Self {
        merge([self, other])
    }

    /// `self` proves at least every fact `other` proves.
    fn is_subseteq(&self, other: &Self) -> bool {
        self.join(other) == *other
    }
}

#[cfg(test)]
mod tests {
    use copyflow_ir::CfgBuilder;

    use super::*;

    #[test]
    fn losing_a_fact_moves_up() {
        let mut builder = CfgBuilder::new();
        let a = builder.local().name("a").new();
        let b = builder.local().name("b").new();
        let c = builder.local().name("c").new();

        let precise = CopyState::new().record_equal(a, b).record_equal(a, c);
        let coarse = CopyState::new()
            .record_equal(a, b)
            .record_assignment_unknown_source(c);
        assert!(precise.is_subseteq(&coarse));
        assert!(!coarse.is_subseteq(&precise));
        assert!(precise.is_subseteq(&precise));
    }
}
