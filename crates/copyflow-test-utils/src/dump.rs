use std::fmt::Write;

use copyflow_analysis::{CopyAnalysisResult, CopyState};
use copyflow_ir::{ControlFlowGraph, EntityTable};

/// A copy state as sorted text, one class per line.
pub fn dump_state(entities: &EntityTable, state: &CopyState) -> String {
    state.display(entities).to_string()
}

/// Entry and exit states of every block, in block order.
///
/// ```text
/// bb0
///   entry:
///     (empty)
///   exit:
///     {a, b} ref
/// ```
pub fn dump_result(cfg: &ControlFlowGraph, result: &CopyAnalysisResult) -> String {
    let entities = cfg.entities();
    let mut out = String::new();
    for block in cfg.blocks() {
        let _ = write!(out, "bb{}", block.index());
        if !result.is_reachable(block) {
            out.push_str(" (unreachable)");
        }
        out.push('\n');
        for (label, state) in [
            ("entry", result.entry_state(block)),
            ("exit", result.exit_state(block)),
        ] {
            let _ = writeln!(out, "  {label}:");
            for line in dump_state(entities, state).lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
    }
    out
}
