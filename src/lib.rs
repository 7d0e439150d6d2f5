pub use copyflow_analysis as analysis;
pub use copyflow_ir as ir;

pub mod prelude {
    pub use copyflow_analysis::{
        AbstractValue, AbstractValueKind, AnalysisConfig, AnalysisError, Cancellation,
        CancellationToken, CopyAnalysis, CopyAnalysisResult, CopyState, NeverCancel, analyze,
    };
    pub use copyflow_ir::*;
}
