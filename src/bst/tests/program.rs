/// program.rs
///
/// Tests for compiled programs as artifacts: storing them, the order of their
/// functions and the Rust source they are emitted as.

use std::collections::HashSet;

use super::*;
use super::cross_mode::{mini_entries, mini_tester, MINI_OUTPUT};
use crate::bst::Program;
use crate::runtime::RunError;

#[test]
fn test_stored_programs_run_the_same() {
    let tester = mini_tester("stored program").parse().expect_ok().compile();
    let bytes = tester.program().encode().expect("program encodes");
    let decoded = Program::decode(&bytes).expect("program decodes");
    assert_eq!(&decoded, tester.program());

    let mut machine = decoded.new_machine(Config::default()).with_entries(mini_entries());
    let summary = decoded.run(&mut machine).expect("decoded program runs");
    assert_eq!(summary.output, MINI_OUTPUT);
    assert_eq!(summary.warnings, 1);

    // Truncated input is rejected rather than misread
    assert!(Program::decode(&bytes[..bytes.len() / 2]).is_err());
}

#[test]
fn test_callees_come_first() {
    let tester = mini_tester("function order").parse().expect_ok().compile();
    let program = tester.program();
    let mut defined: HashSet<&str> = HashSet::new();
    for function in program.functions.iter() {
        for callee in function.callees() {
            assert!(
                defined.contains(callee.as_ref()),
                "'{}' is listed before its caller '{}'", callee, function.name
            );
        }
        assert!(defined.insert(function.name.as_ref()), "'{}' is listed twice", function.name);
    }

    // Only functions reachable from the run commands are compiled
    assert!(program.function("format.names").is_some());
    assert!(program.function("call.type$").is_some());
    let unused = Tester::new_single_source_expect_ok("unreachable", "
    FUNCTION { used } { \"a\" write$ }
    FUNCTION { unused } { \"b\" write$ }
    EXECUTE { used }
    ").compile();
    assert!(unused.program().function("unused").is_none());
}

#[test]
fn test_emitted_source() {
    mini_tester("emitted source")
        .parse()
        .expect_ok()
        .compile()
        .assert_emits(&[
            "// Generated from test.bst. Do not edit.",
            "use bst_rs::runtime::{ArgKind, Machine, Primitive, RunError, Value};",
            "m.declare_global(\"output.state\", Value::Integer(0));",
            "fn f_format_names(m: &mut Machine, p0: Value) -> Result<Value, RunError> {",
            "fn f_article(m: &mut Machine) -> Result<(), RunError> {",
            "m.execute(|m| f_init_state_consts(m))?;",
            "m.iterate(|m| f_presort(m))?;",
            "m.sort();",
            "m.iterate(|m| f_call_type_(m))?;",
            "\"article\" => f_article(m)?,",
            "_ => f_default_type(m)?,",
            "m.loop_guard(&mut g0)?;",
        ]);
}

#[test]
fn test_emitting_is_deterministic() {
    let first = mini_tester("emit once").parse().expect_ok().compile().program().emit_rust();
    let second = mini_tester("emit twice").parse().expect_ok().compile().program().emit_rust();
    assert_eq!(first, second);
}

#[test]
fn test_leftover_result_of_a_run_target() {
    Tester::new_single_source_expect_ok("leftover target", "
    FUNCTION { main } { \"x\" }
    EXECUTE { main }
    ").compile()
        .assert_emits(&["m.report_leftover(1, \"main\");"])
        .run()
        .assert_warnings(1);
}

#[test]
fn test_calls_check_their_arguments() {
    let tester = Tester::new_single_source_expect_ok("arity", "
    FUNCTION { join } { \" \" swap$ * * }
    EXECUTE { join }
    ");
    tester.compile_err()
        .assert_msg_has("'join' takes 2 values from the empty stack of a run command");

    let program = Tester::new_single_source_expect_ok("arity call", "
    FUNCTION { join } { \" \" swap$ * * }
    FUNCTION { main } { \"a\" \"b\" join write$ }
    EXECUTE { main }
    ").compile();
    let mut machine = program.program().new_machine(Config::default());
    match program.program().call(&mut machine, "join", strings(&["a"])) {
        Err(RunError::InternalInvariantViolation(v)) => {
            assert!(v.to_string().contains("takes 2 parameters, 1 given"), "got '{}'", v);
        },
        other => panic!("expected an arity error, got {:?}", other),
    }
    match program.program().call(&mut machine, "nosuch", Vec::new()) {
        Err(RunError::UnknownFunction{ name }) => assert_eq!(name, "nosuch"),
        other => panic!("expected an unknown function, got {:?}", other),
    }
}

#[test]
fn test_unoptimized_programs_keep_every_statement() {
    let style = "
    INTEGERS { n }
    FUNCTION { main } { #1 #2 + 'n := n int.to.str$ write$ }
    EXECUTE { main }
    ";
    let optimized = Tester::new_single_source_expect_ok("optimized", style).compile();
    let plain = Tester::new_single_source_expect_ok("unoptimized", style)
        .compile_with(Config::default().with_optimize(false));
    optimized.run().assert_output("3");
    plain.run().assert_output("3");

    let folded = optimized.program().function("main").map(|f| f.body.len());
    let unfolded = plain.program().function("main").map(|f| f.body.len());
    assert!(folded <= unfolded);
    assert!(!optimized.program().emit_rust().contains("Primitive::Plus"));
}
