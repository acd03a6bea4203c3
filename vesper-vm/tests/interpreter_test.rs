// vesper-vm - Expression and statement evaluation tests
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

mod common;

use common::expect_lines;

// =============================================================================
// Literals and arithmetic
// =============================================================================

#[test]
fn literals() {
    expect_lines("print nil;", &["nil"]);
    expect_lines("print true;", &["true"]);
    expect_lines("print false;", &["false"]);
    expect_lines("print 42;", &["42"]);
    expect_lines("print 2.5;", &["2.5"]);
    expect_lines("print \"hello\";", &["hello"]);
}

#[test]
fn arithmetic_precedence() {
    expect_lines("print 1 + 2 * 3;", &["7"]);
    expect_lines("print (1 + 2) * 3;", &["9"]);
    expect_lines("print 10 - 4 / 2;", &["8"]);
    expect_lines("print 1 - 2 - 3;", &["-4"]);
    expect_lines("print 12 / 4 / 3;", &["1"]);
}

#[test]
fn unary_operators() {
    expect_lines("print -3;", &["-3"]);
    expect_lines("print --3;", &["3"]);
    expect_lines("print !true;", &["false"]);
    expect_lines("print !!nil;", &["false"]);
    expect_lines("print !0;", &["false"]);
}

#[test]
fn division_follows_ieee754() {
    expect_lines("print 1 / 0;", &["inf"]);
    expect_lines("print 7 / 2;", &["3.5"]);
}

#[test]
fn string_concatenation() {
    expect_lines(
        "var a = \"hi\"; var b = \" there\"; print a + b;",
        &["hi there"],
    );
    expect_lines("print \"a\" + \"b\" + \"c\";", &["abc"]);
    expect_lines("print \"\" + \"\";", &[""]);
}

// =============================================================================
// Equality and comparison
// =============================================================================

#[test]
fn equality() {
    expect_lines("print 1 == 1;", &["true"]);
    expect_lines("print 1 == 2;", &["false"]);
    expect_lines("print 1 != 2;", &["true"]);
    expect_lines("print nil == nil;", &["true"]);
    expect_lines("print nil == false;", &["false"]);
    expect_lines("print true == true;", &["true"]);
    expect_lines("print \"a\" == \"a\";", &["true"]);
    expect_lines("print \"a\" == \"b\";", &["false"]);
    expect_lines("print 1 == \"1\";", &["false"]);
}

#[test]
fn interned_strings_compare_by_identity() {
    // Concatenation produces the same interned object as the literal.
    expect_lines("print \"ab\" == \"a\" + \"b\";", &["true"]);
}

#[test]
fn comparison() {
    expect_lines("print 1 < 2;", &["true"]);
    expect_lines("print 2 <= 2;", &["true"]);
    expect_lines("print 3 > 2;", &["true"]);
    expect_lines("print 2 >= 3;", &["false"]);
}

// =============================================================================
// Variables and scope
// =============================================================================

#[test]
fn global_variables() {
    expect_lines("var a = 1; print a;", &["1"]);
    expect_lines("var a; print a;", &["nil"]);
    expect_lines("var a = 1; a = 2; print a;", &["2"]);
    // Assignment is an expression and yields the assigned value.
    expect_lines("var a = 1; print a = 5;", &["5"]);
}

#[test]
fn global_redefinition_is_allowed() {
    expect_lines("var a = 1; var a = 2; print a;", &["2"]);
}

#[test]
fn local_variables_and_shadowing() {
    expect_lines("{ var a = 1; print a; }", &["1"]);
    expect_lines("var a = 1; { var a = 2; print a; } print a;", &["2", "1"]);
    expect_lines(
        "{ var a = 1; { var a = a; print a; a = 2; print a; } print a; }",
        &["1", "2", "1"],
    );
}

#[test]
fn local_assignment_is_an_expression() {
    expect_lines("{ var a = 1; var b = a = 3; print a; print b; }", &["3", "3"]);
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn if_statement() {
    expect_lines("if (true) print 1;", &["1"]);
    expect_lines("if (false) print 1;", &[]);
    expect_lines("if (false) print 1; else print 2;", &["2"]);
    expect_lines("if (nil) print 1; else print 2;", &["2"]);
    expect_lines("if (0) print 1; else print 2;", &["1"]);
}

#[test]
fn and_or_short_circuit() {
    expect_lines("print true and 2;", &["2"]);
    expect_lines("print false and 2;", &["false"]);
    expect_lines("print nil and 2;", &["nil"]);
    expect_lines("print 1 or 2;", &["1"]);
    expect_lines("print false or 2;", &["2"]);
    expect_lines("print nil or \"fallback\";", &["fallback"]);
    // The right operand must not be evaluated when short-circuited.
    expect_lines(
        "var a = 1; false and (a = 2); print a;",
        &["1"],
    );
    expect_lines(
        "var a = 1; true or (a = 2); print a;",
        &["1"],
    );
}

#[test]
fn while_loop() {
    expect_lines(
        "var i = 0; while (i < 3) { print i; i = i + 1; }",
        &["0", "1", "2"],
    );
    expect_lines("while (false) print 1;", &[]);
}

#[test]
fn for_loop() {
    expect_lines(
        "for (var i = 0; i < 3; i = i + 1) print i;",
        &["0", "1", "2"],
    );
    // All three clauses are optional.
    expect_lines(
        "var i = 0; for (; i < 2;) { print i; i = i + 1; }",
        &["0", "1"],
    );
}

#[test]
fn for_loop_computes_sums() {
    expect_lines(
        "var sum = 0; for (var i = 1; i <= 10; i = i + 1) sum = sum + i; print sum;",
        &["55"],
    );
}

#[test]
fn blocks_do_not_leak_locals() {
    expect_lines(
        "var x = \"outer\"; { var x = \"inner\"; } print x;",
        &["outer"],
    );
}

#[test]
fn comments_are_ignored() {
    expect_lines("print 1; // print 2;\nprint 3;", &["1", "3"]);
}
