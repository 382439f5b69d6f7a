use tessel_ir::KernelPredicate;
use tessel_schedule::{CodePosition, CodePositionConstraints};

use crate::generator::CodeGenerator;
use crate::test::helpers::{log, logging_kernel, nest_1d, nest_2d, trace, tracing_kernel};

#[test]
fn prologue_and_epilogue_bracket_inner_loop() {
    let (mut nest, i, j) = nest_2d(3, 4);
    let events = log();
    nest.add_kernel_with_constraints(
        logging_kernel("enter", [i.clone()], &events),
        CodePositionConstraints::prologue([i.clone()]),
    );
    nest.add_kernel(logging_kernel("body", [i.clone(), j], &events));
    nest.add_kernel_with_constraints(
        logging_kernel("leave", [i.clone()], &events),
        CodePositionConstraints::epilogue([i]),
    );

    let program = CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(program.invocation_count("enter"), 3);
    assert_eq!(program.invocation_count("body"), 12);
    assert_eq!(program.invocation_count("leave"), 3);
    let events = events.lock();
    assert_eq!(events[0], "enter");
    assert!(events[1..5].iter().all(|e| *e == "body"));
    assert_eq!(events[5], "leave");
    assert_eq!(events[6], "enter");
}

#[test]
fn root_prologue_and_epilogue_run_once() {
    let (mut nest, i, j) = nest_2d(3, 4);
    let events = log();
    nest.add_kernel_with_constraints(logging_kernel("setup", [], &events), CodePositionConstraints::prologue([]));
    nest.add_kernel(logging_kernel("body", [i, j], &events));
    nest.add_kernel_with_constraints(logging_kernel("teardown", [], &events), CodePositionConstraints::epilogue([]));

    let program = CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(program.invocation_count("setup"), 1);
    assert_eq!(program.invocation_count("teardown"), 1);
    let events = events.lock();
    assert_eq!(*events.first().unwrap(), "setup");
    assert_eq!(*events.last().unwrap(), "teardown");
}

#[test]
fn boundary_constraint_stays_outside_loop() {
    let (mut nest, i, j) = nest_2d(3, 4);
    let events = log();
    nest.add_kernel_with_constraints(
        logging_kernel("outer", [i.clone()], &events),
        CodePositionConstraints::new(CodePosition::Body, [], [j.clone()]),
    );
    nest.add_kernel(logging_kernel("body", [i, j], &events));

    let program = CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(program.invocation_count("outer"), 3);
    // Fires before the j loop of each i iteration, never inside it.
    let events = events.lock();
    assert_eq!(events[0], "outer");
    assert!(events[1..5].iter().all(|e| *e == "body"));
}

#[test]
fn first_predicate_restricts_to_first_outer_iteration() {
    let (mut nest, i, j) = nest_2d(3, 4);
    let seen = trace();
    nest.add_kernel_with_predicate(tracing_kernel("lead", [j], &seen), KernelPredicate::first(&i));

    let program = CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(program.invocation_count("lead"), 4);
    assert_eq!(seen.lock().as_slice(), &[vec![0], vec![1], vec![2], vec![3]]);
}

#[test]
fn after_placement_fires_in_post_phase() {
    let (mut nest, i, j) = nest_2d(3, 4);
    let events = log();
    nest.add_kernel(logging_kernel("body", [i.clone(), j.clone()], &events));
    nest.add_kernel_with_predicate(logging_kernel("post", [i], &events), KernelPredicate::after(&j));

    let program = CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(program.invocation_count("post"), 3);
    let events = events.lock();
    assert!(events[0..4].iter().all(|e| *e == "body"));
    assert_eq!(events[4], "post");
}

#[test]
fn slot_alternative_shadows_primary_on_boundary() {
    let (mut nest, i) = nest_1d(5);
    let split = nest.split(&i, 2).unwrap();
    let main_seen = trace();
    let edge_seen = trace();
    let main = tracing_kernel("main", [i.clone()], &main_seen);
    let edge = {
        let sink = std::sync::Arc::clone(&edge_seen);
        tessel_schedule::Kernel::new("edge").indices([i]).same_slot_as(&main).define(move |_, idx| {
            sink.lock().push(idx.to_vec());
            Ok(())
        })
    };
    nest.add_kernel(main);
    nest.add_kernel_with_predicate(edge, KernelPredicate::end_boundary(&split.inner));

    let program = CodeGenerator::new().generate(&nest).unwrap();

    // The guarded alternative takes the clipped remainder chunk; the
    // primary covers the rest.
    assert_eq!(program.invocation_count("main"), 4);
    assert_eq!(program.invocation_count("edge"), 1);
    assert_eq!(main_seen.lock().as_slice(), &[vec![0], vec![1], vec![2], vec![3]]);
    assert_eq!(edge_seen.lock().as_slice(), &[vec![4]]);
}

#[test]
fn end_boundary_on_outer_split_index() {
    let (mut nest, i) = nest_1d(5);
    let split = nest.split(&i, 2).unwrap();
    let seen = trace();
    nest.add_kernel_with_predicate(
        tracing_kernel("tail", [i], &seen),
        KernelPredicate::end_boundary(&split.outer),
    );

    let program = CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(program.invocation_count("tail"), 1);
    assert_eq!(seen.lock().as_slice(), &[vec![4]]);
}
