use crate::arena::Arena;
use crate::cfg::{Block, BlockInfo, ControlFlowGraph, Edge, EdgeCondition};
use crate::entity::{Access, EntityId, EntityTable, SymbolId, SymbolKind};
use crate::error::CfgError;
use crate::operation::{Operand, Operation};

/// Incremental construction of a [`ControlFlowGraph`].
///
/// ```
/// use copyflow_ir::{CfgBuilder, Operand};
///
/// let mut builder = CfgBuilder::new();
/// let a = builder.local().name("a").new();
/// let b = builder.local().name("b").new();
/// let entry = builder.block();
/// builder.assign(entry, b, Operand::Fresh);
/// builder.assign(entry, a, b);
/// let cfg = builder.finish().unwrap();
/// assert_eq!(cfg.block(entry).operations.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct CfgBuilder {
    entities: EntityTable,
    blocks: Arena<Block, BlockInfo>,
    entry: Option<Block>,
    this: Option<SymbolId>,
}

#[bon::bon]
impl CfgBuilder {
    /// Declare a local and return its root entity.
    #[builder(finish_fn = new)]
    pub fn local(
        &mut self,
        #[builder(into)] name: String,
        /// Whether the local holds a value type (struct, primitive).
        #[builder(default)]
        value_type: bool,
    ) -> EntityId {
        let symbol = self.entities.add_symbol(name, SymbolKind::Local);
        self.entities.root_entity(symbol, value_type)
    }

    /// Declare a parameter and return its root entity.
    #[builder(finish_fn = new)]
    pub fn parameter(
        &mut self,
        #[builder(into)] name: String,
        #[builder(default)] value_type: bool,
    ) -> EntityId {
        let symbol = self.entities.add_symbol(name, SymbolKind::Parameter);
        self.entities.root_entity(symbol, value_type)
    }

    /// A named field reached through `parent`.
    #[builder(finish_fn = new)]
    pub fn field(
        &mut self,
        parent: EntityId,
        #[builder(into)] name: String,
        #[builder(default)] value_type: bool,
    ) -> EntityId {
        let name = self.entities.field_name(name);
        self.entities
            .child_entity(parent, Access::Field(name), value_type)
    }

    /// A field of the receiver, e.g. `this.count`.
    #[builder(finish_fn = new)]
    pub fn this_field(
        &mut self,
        #[builder(into)] name: String,
        #[builder(default)] value_type: bool,
    ) -> EntityId {
        let this = self.this_entity();
        let name = self.entities.field_name(name);
        self.entities.child_entity(this, Access::Field(name), value_type)
    }
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn this_entity(&mut self) -> EntityId {
        let symbol = match self.this {
            Some(symbol) => symbol,
            None => {
                let symbol = self.entities.add_symbol("this", SymbolKind::This);
                self.this = Some(symbol);
                symbol
            }
        };
        self.entities.root_entity(symbol, false)
    }

    /// Array element of `parent` at a statically known index.
    pub fn element(&mut self, parent: EntityId, index: i64, value_type: bool) -> EntityId {
        self.entities
            .child_entity(parent, Access::Index(index), value_type)
    }

    pub fn tuple_element(&mut self, parent: EntityId, position: u32, value_type: bool) -> EntityId {
        self.entities
            .child_entity(parent, Access::TupleElement(position), value_type)
    }

    /// Record that `a` and `b` name the same storage (a by-ref alias).
    pub fn share_address(&mut self, a: EntityId, b: EntityId) {
        self.entities.share_address(a, b);
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Allocate an empty block. The first block allocated is the entry
    /// unless [`set_entry`](Self::set_entry) says otherwise.
    pub fn block(&mut self) -> Block {
        let block = self.blocks.alloc(BlockInfo::default());
        if self.entry.is_none() {
            self.entry = Some(block);
        }
        block
    }

    pub fn set_entry(&mut self, block: Block) {
        self.entry = Some(block);
    }

    /// Append `operation` to `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` was not allocated by this builder.
    pub fn push(&mut self, block: Block, operation: Operation) -> &mut Self {
        self.block_mut(block).operations.push(operation);
        self
    }

    pub fn assign(&mut self, block: Block, target: EntityId, source: impl Into<Operand>) -> &mut Self {
        self.push(block, Operation::assign(target, source))
    }

    pub fn declare(&mut self, block: Block, target: EntityId) -> &mut Self {
        self.push(block, Operation::declare(target))
    }

    pub fn invalidate(&mut self, block: Block, entity: EntityId) -> &mut Self {
        self.push(block, Operation::invalidate(entity))
    }

    pub fn scope_exit(
        &mut self,
        block: Block,
        entities: impl IntoIterator<Item = EntityId>,
    ) -> &mut Self {
        self.push(block, Operation::scope_exit(entities))
    }

    pub fn edge(&mut self, from: Block, edge: Edge) -> &mut Self {
        self.block_mut(from).successors.push(edge);
        self
    }

    /// Unconditional edge.
    pub fn jump(&mut self, from: Block, to: Block) -> &mut Self {
        self.edge(from, Edge::to(to))
    }

    /// Two-way branch on a condition the analysis cannot see.
    pub fn branch(&mut self, from: Block, then_block: Block, else_block: Block) -> &mut Self {
        self.edge(from, Edge::to(then_block));
        self.edge(from, Edge::to(else_block))
    }

    /// Two-way branch on `lhs == rhs` (reference equality): `then_block` is
    /// taken when they are equal, `else_block` otherwise.
    pub fn branch_on(
        &mut self,
        from: Block,
        lhs: EntityId,
        rhs: EntityId,
        then_block: Block,
        else_block: Block,
    ) -> &mut Self {
        let equal = EdgeCondition {
            lhs,
            rhs,
            when: true,
        };
        let not_equal = EdgeCondition {
            when: false,
            ..equal
        };
        self.edge(from, Edge::guarded(then_block, equal));
        self.edge(from, Edge::guarded(else_block, not_equal))
    }

    /// Edge that is statically known to never be taken.
    pub fn unreachable_edge(&mut self, from: Block, to: Block) -> &mut Self {
        self.edge(from, Edge::unreachable(to))
    }

    fn block_mut(&mut self, block: Block) -> &mut BlockInfo {
        self.blocks
            .get_mut(block)
            .unwrap_or_else(|| panic!("block {block:?} was not allocated by this builder"))
    }

    pub fn finish(self) -> Result<ControlFlowGraph, CfgError> {
        let entry = self.entry.ok_or(CfgError::Empty)?;
        ControlFlowGraph::new(self.entities, self.blocks, entry)
    }
}
