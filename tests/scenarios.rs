use copyflow::prelude::*;
use copyflow_test_utils::dump_state;
use test_log::test;

struct FieldLoop {
    cfg: ControlFlowGraph,
    p: EntityId,
    pf: EntityId,
    q: EntityId,
    entry: Block,
    header: Block,
    exit: Block,
}

/// ```text
/// p := new; q := p.f;
/// while (?) { p := new; }
/// drop q;
/// ```
fn field_loop() -> FieldLoop {
    let mut builder = CfgBuilder::new();
    let p = builder.local().name("p").new();
    let pf = builder.field().parent(p).name("f").new();
    let q = builder.local().name("q").new();
    let entry = builder.block();
    let header = builder.block();
    let body = builder.block();
    let exit = builder.block();

    builder
        .assign(entry, p, Operand::Fresh)
        .assign(entry, q, pf)
        .jump(entry, header);
    builder.branch(header, body, exit);
    builder.declare(body, p).jump(body, header);
    builder.scope_exit(exit, [q]);

    FieldLoop {
        cfg: builder.finish().unwrap(),
        p,
        pf,
        q,
        entry,
        header,
        exit,
    }
}

#[test]
fn reading_a_field_copies_it() {
    let program = field_loop();
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    let after_entry = result.exit_state(program.entry);
    assert!(after_entry.are_copies(program.q, program.pf));
    insta::assert_snapshot!(dump_state(program.cfg.entities(), after_entry), @r"
    {p} ref
    {p.f, q} ref
    ");
}

#[test]
fn rewriting_the_owner_forgets_its_fields() {
    let program = field_loop();
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    let header = result.entry_state(program.header);
    assert!(!header.are_copies(program.q, program.pf));
    assert_eq!(
        header.class_of(program.pf).kind(),
        AbstractValueKind::Unknown
    );
    assert_eq!(
        header.class_of(program.p).kind(),
        AbstractValueKind::KnownReferenceCopy
    );
}

#[test]
fn without_cascade_fields_survive_owner_writes() {
    let program = field_loop();
    let result = CopyAnalysis::new(&program.cfg)
        .with_cascading_invalidation(false)
        .run(&NeverCancel)
        .unwrap();

    assert!(result.entry_state(program.header).are_copies(program.q, program.pf));
}

#[test]
fn scope_exit_stops_tracking() {
    let program = field_loop();
    let result = analyze(&program.cfg, &NeverCancel).unwrap();

    assert!(result.entry_state(program.exit).is_tracked(program.q));
    assert!(!result.exit_state(program.exit).is_tracked(program.q));
    assert_eq!(result.exit_state(program.exit).check_invariants(), Ok(()));
}

#[test]
fn config_can_be_supplied_whole() {
    let program = field_loop();
    let config = AnalysisConfig {
        max_iterations: Some(1),
        ..AnalysisConfig::default()
    };
    let analysis = CopyAnalysis::new(&program.cfg).with_config(config);
    assert_eq!(analysis.config().max_iterations, Some(1));
    assert_eq!(
        analysis.run(&NeverCancel).unwrap_err(),
        AnalysisError::FuelExhausted { limit: 1 }
    );
}
