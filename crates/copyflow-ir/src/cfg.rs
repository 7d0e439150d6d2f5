use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use smallvec::SmallVec;

use crate::arena::Arena;
use crate::entity::{EntityId, EntityTable};
use crate::error::CfgError;
use crate::identifier;
use crate::operation::{Operand, Operation};

identifier! {
    /// A unique identifier for a basic block.
    struct Block
}

/// Condition guarding a conditional edge: the edge is taken when
/// `(lhs reference-equals rhs) == when`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeCondition {
    pub lhs: EntityId,
    pub rhs: EntityId,
    pub when: bool,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    pub target: Block,
    /// Statically known to never be taken.
    pub unreachable: bool,
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    pub fn to(target: Block) -> Self {
        Self {
            target,
            unreachable: false,
            condition: None,
        }
    }

    pub fn unreachable(target: Block) -> Self {
        Self {
            target,
            unreachable: true,
            condition: None,
        }
    }

    pub fn guarded(target: Block, condition: EdgeCondition) -> Self {
        Self {
            target,
            unreachable: false,
            condition: Some(condition),
        }
    }
}

/// An incoming edge: the `index`-th successor edge of `source`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgeRef {
    pub source: Block,
    pub index: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockInfo {
    pub operations: Vec<Operation>,
    pub successors: SmallVec<[Edge; 2]>,
}

/// Control-flow graph of one procedure, together with the storage locations
/// its operations mention.
///
/// Immutable once built; predecessor lists and a reverse postorder from the
/// entry block are computed up front.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    entities: EntityTable,
    blocks: Arena<Block, BlockInfo>,
    entry: Block,
    predecessors: Vec<SmallVec<[EdgeRef; 2]>>,
    reverse_postorder: Vec<Block>,
    rpo_index: Vec<Option<usize>>,
}

impl ControlFlowGraph {
    pub fn new(
        entities: EntityTable,
        blocks: Arena<Block, BlockInfo>,
        entry: Block,
    ) -> Result<Self, CfgError> {
        if blocks.is_empty() {
            return Err(CfgError::Empty);
        }
        if !blocks.contains(entry) {
            return Err(CfgError::UnknownEntry(entry));
        }

        let mut predecessors = vec![SmallVec::new(); blocks.len()];
        for (block, info) in blocks.iter() {
            for operation in &info.operations {
                check_operation(&entities, block, operation)?;
            }
            for (index, edge) in info.successors.iter().enumerate() {
                if !blocks.contains(edge.target) {
                    return Err(CfgError::DanglingEdge {
                        from: block,
                        target: edge.target,
                    });
                }
                if let Some(condition) = edge.condition {
                    check_entity(&entities, block, condition.lhs)?;
                    check_entity(&entities, block, condition.rhs)?;
                }
                predecessors[edge.target.index()].push(EdgeRef {
                    source: block,
                    index,
                });
            }
        }

        let reverse_postorder = reverse_postorder(&blocks, entry);
        let mut rpo_index = vec![None; blocks.len()];
        for (position, block) in reverse_postorder.iter().enumerate() {
            rpo_index[block.index()] = Some(position);
        }

        Ok(Self {
            entities,
            blocks,
            entry,
            predecessors,
            reverse_postorder,
            rpo_index,
        })
    }

    pub fn entry(&self) -> Block {
        self.entry
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn block(&self, block: Block) -> &BlockInfo {
        &self.blocks[block]
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.ids()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn successors(&self, block: Block) -> &[Edge] {
        &self.blocks[block].successors
    }

    pub fn predecessors(&self, block: Block) -> &[EdgeRef] {
        &self.predecessors[block.index()]
    }

    pub fn edge(&self, edge: EdgeRef) -> &Edge {
        &self.blocks[edge.source].successors[edge.index]
    }

    /// Blocks reachable from the entry along any edge, in reverse postorder.
    pub fn reverse_postorder(&self) -> &[Block] {
        &self.reverse_postorder
    }

    /// Position of `block` in [`reverse_postorder`](Self::reverse_postorder),
    /// or `None` if no path from the entry reaches it.
    pub fn rpo_index(&self, block: Block) -> Option<usize> {
        self.rpo_index[block.index()]
    }
}

fn check_entity(entities: &EntityTable, block: Block, entity: EntityId) -> Result<(), CfgError> {
    if entities.contains(entity) {
        Ok(())
    } else {
        Err(CfgError::UnknownEntity { block, entity })
    }
}

fn check_operation(
    entities: &EntityTable,
    block: Block,
    operation: &Operation,
) -> Result<(), CfgError> {
    if let Operation::ScopeExit { entities: exiting } = operation {
        for &entity in exiting {
            check_entity(entities, block, entity)?;
        }
    }
    if let Some(target) = operation.write_target() {
        check_entity(entities, block, target)?;
    }
    for source in operation.read_sources() {
        if let Operand::Entity(entity) = source {
            check_entity(entities, block, entity)?;
        }
    }
    Ok(())
}

fn reverse_postorder(blocks: &Arena<Block, BlockInfo>, entry: Block) -> Vec<Block> {
    let mut graph = DiGraph::<Block, ()>::with_capacity(blocks.len(), blocks.len() * 2);
    let nodes: Vec<NodeIndex> = blocks.ids().map(|block| graph.add_node(block)).collect();
    for (block, info) in blocks.iter() {
        for edge in &info.successors {
            graph.add_edge(nodes[block.index()], nodes[edge.target.index()], ());
        }
    }

    let mut dfs = DfsPostOrder::new(&graph, nodes[entry.index()]);
    let mut order = Vec::with_capacity(blocks.len());
    while let Some(node) = dfs.next(&graph) {
        order.push(graph[node]);
    }
    order.reverse();
    order
}
