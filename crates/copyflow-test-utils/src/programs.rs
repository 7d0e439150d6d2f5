//! Small control-flow graphs with known answers.

use copyflow_analysis::CopyState;
use copyflow_ir::{Block, CfgBuilder, ControlFlowGraph, EntityId, EntityTable, Operand};

/// `b := new; a := b; c := a;` over reference-typed locals.
pub struct StraightLine {
    pub cfg: ControlFlowGraph,
    pub a: EntityId,
    pub b: EntityId,
    pub c: EntityId,
    pub entry: Block,
}

pub fn straight_line() -> StraightLine {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let c = builder.local().name("c").new();
    let entry = builder.block();
    builder
        .assign(entry, b, Operand::Fresh)
        .assign(entry, a, b)
        .assign(entry, c, a);
    StraightLine {
        cfg: builder.finish().expect("straight line program is well formed"),
        a,
        b,
        c,
        entry,
    }
}

/// ```text
/// b := new; c := new;      (or c := b when `b_equals_c`)
/// if (?) { a := b; } else { a := c; }
/// ```
pub struct Diamond {
    pub cfg: ControlFlowGraph,
    pub a: EntityId,
    pub b: EntityId,
    pub c: EntityId,
    pub entry: Block,
    pub then_block: Block,
    pub else_block: Block,
    pub join: Block,
}

pub fn diamond(b_equals_c: bool) -> Diamond {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let c = builder.local().name("c").new();
    let entry = builder.block();
    let then_block = builder.block();
    let else_block = builder.block();
    let join = builder.block();

    builder.assign(entry, b, Operand::Fresh);
    if b_equals_c {
        builder.assign(entry, c, b);
    } else {
        builder.assign(entry, c, Operand::Fresh);
    }
    builder.branch(entry, then_block, else_block);
    builder.assign(then_block, a, b).jump(then_block, join);
    builder.assign(else_block, a, c).jump(else_block, join);

    Diamond {
        cfg: builder.finish().expect("diamond program is well formed"),
        a,
        b,
        c,
        entry,
        then_block,
        else_block,
        join,
    }
}

/// ```text
/// b := new; a := b;
/// while (?) { a := opaque(); }
/// ```
pub struct OpaqueLoop {
    pub cfg: ControlFlowGraph,
    pub a: EntityId,
    pub b: EntityId,
    pub entry: Block,
    pub header: Block,
    pub body: Block,
    pub exit: Block,
}

pub fn opaque_loop() -> OpaqueLoop {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let entry = builder.block();
    let header = builder.block();
    let body = builder.block();
    let exit = builder.block();

    builder
        .assign(entry, b, Operand::Fresh)
        .assign(entry, a, b)
        .jump(entry, header);
    builder.branch(header, body, exit);
    builder.assign(body, a, Operand::Opaque).jump(body, header);

    OpaqueLoop {
        cfg: builder.finish().expect("loop program is well formed"),
        a,
        b,
        entry,
        header,
        body,
        exit,
    }
}

/// A spread of copy states over three reference locals `a`, `b`, `c` and a
/// value-type local `v`, for lattice-law checks.
pub fn sample_states() -> (EntityTable, Vec<CopyState>) {
    let mut builder = CfgBuilder::new();
    let a = builder.local().name("a").new();
    let b = builder.local().name("b").new();
    let c = builder.local().name("c").new();
    let v = builder.local().name("v").value_type(true).new();

    let states = vec![
        CopyState::new(),
        CopyState::new().record_equal(a, b),
        CopyState::new().record_equal(a, c),
        CopyState::new().record_equal(a, b).record_equal(b, c),
        CopyState::new()
            .record_equal(a, b)
            .record_assignment_unknown_source(c),
        CopyState::new().record_assignment_invalid_source(a),
        CopyState::new()
            .record_equal(b, v)
            .record_assignment(a, &copyflow_analysis::AbstractValue::unknown()),
        CopyState::new()
            .record_equal(a, b)
            .record_equal(c, v)
            .record_assignment_unknown_source(v),
    ];
    (builder.entities().clone(), states)
}
