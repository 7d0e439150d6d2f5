//! Boundary types of the copy analysis: storage locations, operations and
//! the control-flow graph they live in.

mod arena;
mod builder;
mod cfg;
mod entity;
mod error;
mod intern;
mod operation;

pub use arena::{Arena, Id, Identifier};
pub use builder::CfgBuilder;
pub use cfg::{Block, BlockInfo, ControlFlowGraph, Edge, EdgeCondition, EdgeRef};
pub use entity::{
    Access, AnalysisEntity, EntityDisplay, EntityId, EntityTable, FieldName, SymbolId, SymbolInfo,
    SymbolKind,
};
pub use error::CfgError;
pub use intern::{InternKey, InternTable};
pub use operation::{Operand, Operation};
