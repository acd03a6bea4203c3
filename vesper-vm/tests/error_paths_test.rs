// vesper-vm - Compile and runtime error path tests
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! Every user-visible error: exact runtime messages with stack traces, and
//! compile diagnostics in the `[line N] Error at '..': ..` format.

mod common;

use common::{expect_compile_error, expect_lines, expect_runtime_error, run};
use vesper_vm::InterpretError;

// =============================================================================
// Runtime errors: operand types
// =============================================================================

#[test]
fn adding_string_and_number_fails() {
    let report = expect_runtime_error(
        "print \"a\" + 1;",
        "Operands must be two numbers or two strings.",
    );
    // One frame: the script itself.
    assert_eq!(report.trace.len(), 1);
    assert_eq!(report.trace[0].to_string(), "[line 1] in script");
}

#[test]
fn arithmetic_requires_numbers() {
    expect_runtime_error("print 1 - \"a\";", "Operands must be numbers.");
    expect_runtime_error("print nil * 2;", "Operands must be numbers.");
    expect_runtime_error("print true / false;", "Operands must be numbers.");
    expect_runtime_error("print 1 < \"2\";", "Operands must be numbers.");
    expect_runtime_error("print \"a\" > \"b\";", "Operands must be numbers.");
}

#[test]
fn negation_requires_a_number() {
    expect_runtime_error("print -\"s\";", "Operand must be a number.");
    expect_runtime_error("print -nil;", "Operand must be a number.");
}

// =============================================================================
// Runtime errors: variables and properties
// =============================================================================

#[test]
fn reading_an_undefined_global_fails() {
    expect_runtime_error("print missing;", "Undefined variable 'missing'.");
}

#[test]
fn assigning_an_undefined_global_fails_and_rolls_back() {
    expect_runtime_error("missing = 1;", "Undefined variable 'missing'.");
}

#[test]
fn failed_assignment_leaves_the_name_undefined() {
    // The transient entry created by the failed set must be deleted, so a
    // later read still reports the variable as undefined.
    let mut vm = vesper_vm::Vm::new();
    assert!(vm.interpret("ghost = 1;").is_err());
    match vm.interpret("print ghost;") {
        Err(InterpretError::Runtime(report)) => {
            assert_eq!(report.error.to_string(), "Undefined variable 'ghost'.");
        }
        other => panic!("expected undefined variable, got {other:?}"),
    }
}

#[test]
fn unknown_property_fails() {
    expect_runtime_error(
        "class C {} var c = C(); print c.missing;",
        "Undefined property 'missing'.",
    );
    expect_runtime_error(
        "class C {} C().missing();",
        "Undefined property 'missing'.",
    );
}

#[test]
fn only_instances_have_properties() {
    expect_runtime_error("print true.x;", "Only instances have properties.");
    expect_runtime_error("print \"str\".length;", "Only instances have properties.");
    expect_runtime_error("var x = 1; x.y = 2;", "Only instances have fields.");
    expect_runtime_error("nil.method();", "Only instances have methods.");
    expect_runtime_error("class C {} C.method();", "Only instances have methods.");
}

// =============================================================================
// Runtime errors: calls
// =============================================================================

#[test]
fn arity_mismatch_reports_expected_and_got() {
    expect_runtime_error("fun f() { return 1; } f(1);", "Expected 0 arguments but got 1.");
    expect_runtime_error("fun f(a, b) {} f(1);", "Expected 2 arguments but got 1.");
    expect_runtime_error(
        "class C { init(a) {} } C();",
        "Expected 1 arguments but got 0.",
    );
    expect_runtime_error("class C {} C(1);", "Expected 0 arguments but got 1.");
}

#[test]
fn only_functions_and_classes_are_callable() {
    expect_runtime_error("var x = 1; x();", "Can only call functions and classes.");
    expect_runtime_error("\"str\"();", "Can only call functions and classes.");
    expect_runtime_error("nil();", "Can only call functions and classes.");
}

#[test]
fn unbounded_recursion_overflows_the_frame_stack() {
    let report = expect_runtime_error("fun f() { f(); } f();", "Stack overflow.");
    // The trace carries one line per live frame.
    assert!(report.trace.len() > 60);
}

#[test]
fn superclass_must_be_a_class() {
    expect_runtime_error("var NotAClass = 1; class Sub < NotAClass {}", "Superclass must be a class.");
    expect_runtime_error("fun f() {} class Sub < f {}", "Superclass must be a class.");
}

// =============================================================================
// Stack traces
// =============================================================================

#[test]
fn trace_lists_frames_top_first_with_lines() {
    let report = expect_runtime_error(
        "fun a() {\n\
           b();\n\
         }\n\
         fun b() {\n\
           print 1 + nil;\n\
         }\n\
         a();",
        "Operands must be numbers.",
    );
    let rendered: Vec<String> = report.trace.iter().map(|t| t.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "[line 5] in b()".to_string(),
            "[line 2] in a()".to_string(),
            "[line 7] in script".to_string(),
        ]
    );
}

#[test]
fn vm_recovers_after_a_runtime_error() {
    let mut vm = vesper_vm::Vm::new();
    assert!(vm.interpret("print 1 + nil;").is_err());
    // The stack was reset; the next program runs normally.
    assert!(vm.interpret("print 2;").is_ok());
}

// =============================================================================
// Compile errors
// =============================================================================

#[test]
fn error_format_quotes_the_offending_lexeme() {
    match run("var;") {
        Err(InterpretError::Compile(report)) => {
            assert_eq!(
                report.to_string(),
                "[line 1] Error at ';': Expect variable name."
            );
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn error_at_end_of_input() {
    match run("print 1") {
        Err(InterpretError::Compile(report)) => {
            assert_eq!(
                report.to_string(),
                "[line 1] Error at end: Expect ';' after value."
            );
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn missing_expression() {
    expect_compile_error("print;", "Expect expression.");
    expect_compile_error("1 + ;", "Expect expression.");
}

#[test]
fn invalid_assignment_target() {
    expect_compile_error("1 = 2;", "Invalid assignment target.");
    expect_compile_error("a + b = 3;", "Invalid assignment target.");
}

#[test]
fn scanner_errors_are_reported_through_the_compiler() {
    expect_compile_error("var a = @;", "Unexpected character.");
    expect_compile_error("print \"open;", "Unterminated string.");
}

#[test]
fn synchronization_reports_errors_in_later_statements() {
    match run("var; print 1 +; var x = 1;") {
        Err(InterpretError::Compile(report)) => {
            assert_eq!(report.errors.len(), 2, "one error per bad statement");
        }
        other => panic!("expected compile errors, got {other:?}"),
    }
}

#[test]
fn local_variable_rules() {
    expect_compile_error(
        "{ var a = 1; var a = 2; }",
        "Already a variable with this name in this scope.",
    );
    expect_compile_error(
        "{ var a = a; }",
        "Can't read local variable in its own initializer.",
    );
}

#[test]
fn return_rules() {
    expect_compile_error("return 1;", "Can't return from top-level code.");
    expect_compile_error(
        "class C { init() { return 1; } }",
        "Can't return a value from an initializer.",
    );
    // A bare return in an initializer is fine.
    expect_lines("class C { init() { return; } } print C();", &["C instance"]);
}

#[test]
fn this_and_super_placement_rules() {
    expect_compile_error("print this;", "Can't use 'this' outside of a class.");
    expect_compile_error(
        "fun f() { return this; }",
        "Can't use 'this' outside of a class.",
    );
    expect_compile_error("print super.x;", "Can't use 'super' outside of a class.");
    expect_compile_error(
        "class C { m() { return super.m(); } }",
        "Can't use 'super' in a class with no superclass.",
    );
}

#[test]
fn class_cannot_inherit_from_itself() {
    expect_compile_error("class C < C {}", "A class can't inherit from itself.");
}

#[test]
fn parameter_and_argument_limits() {
    let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
    let source = format!("fun f({}) {{}}", params.join(", "));
    expect_compile_error(&source, "Can't have more than 255 parameters.");

    let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
    let source = format!("fun f() {{}} f({});", args.join(", "));
    expect_compile_error(&source, "Can't have more than 255 arguments.");
}

#[test]
fn local_slot_limit() {
    // Slot 0 is reserved, so the 256th user local overflows.
    let mut body = String::new();
    for i in 0..256 {
        body.push_str(&format!("var v{i} = {i}; "));
    }
    let source = format!("fun f() {{ {body} }}");
    expect_compile_error(&source, "Too many local variables in function.");
}

#[test]
fn constant_pool_limit() {
    // Each distinct number needs its own constant slot.
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("print {i}.5;\n"));
    }
    expect_compile_error(&source, "Too many constants in one chunk.");
}
