/// Ways a run can end without a result.
///
/// Malformed input is rejected earlier, when the
/// [`ControlFlowGraph`](copyflow_ir::ControlFlowGraph) is built.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// The caller's cancellation signal was raised.
    #[error("analysis was cancelled")]
    Cancelled,
    /// The configured visit budget ran out before a fixpoint was reached.
    #[error("no fixpoint after {limit} block visits")]
    FuelExhausted { limit: usize },
}
