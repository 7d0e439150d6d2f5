/// Knobs of one analysis run. See [`CopyAnalysis`](crate::CopyAnalysis)
/// for the builder methods that set them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Upper bound on block visits before giving up. `None` trusts the
    /// lattice height to end the run.
    pub max_iterations: Option<usize>,
    /// Writing to a location also forgets every tracked location reached
    /// through it (`s := ...` forgets `s.f`).
    pub cascading_invalidation: bool,
    /// Use reference-equality edge conditions to prune infeasible edges and
    /// to learn copy facts on the taken side.
    pub branch_predicates: bool,
    /// Verify the partition invariants after every block.
    pub invariant_checks: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            cascading_invalidation: true,
            branch_predicates: true,
            invariant_checks: cfg!(debug_assertions),
        }
    }
}
