use crate::cfg::Block;
use crate::entity::EntityId;

/// A control-flow graph that cannot be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CfgError {
    /// The graph has no blocks.
    #[error("control-flow graph has no blocks")]
    Empty,
    /// The entry block is not part of the graph.
    #[error("entry block {0:?} is not part of the graph")]
    UnknownEntry(Block),
    /// An edge points at a block that does not exist.
    #[error("edge from {from:?} targets unknown block {target:?}")]
    DanglingEdge { from: Block, target: Block },
    /// An operation or edge condition mentions an entity missing from the
    /// entity table.
    #[error("block {block:?} mentions unknown entity {entity:?}")]
    UnknownEntity { block: Block, entity: EntityId },
}
