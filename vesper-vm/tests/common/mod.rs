// vesper-vm - Shared test helpers
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use vesper_vm::{InterpretError, RuntimeErrorReport, Vm, VmOptions};

/// A cloneable sink for `print` output so tests can read back what a
/// program wrote.
#[derive(Clone, Default)]
pub struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("print output is UTF-8")
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run a program in a fresh VM and return everything it printed.
pub fn run_with_options(source: &str, options: VmOptions) -> Result<String, InterpretError> {
    let output = CapturedOutput::default();
    let mut vm = Vm::with_options(options);
    vm.set_output(Box::new(output.clone()));
    vm.interpret(source)?;
    Ok(output.contents())
}

pub fn run(source: &str) -> Result<String, InterpretError> {
    run_with_options(source, VmOptions::default())
}

/// Assert a program prints exactly these lines, in order.
pub fn expect_lines(source: &str, lines: &[&str]) {
    let expected: String = lines.iter().map(|line| format!("{line}\n")).collect();
    match run(source) {
        Ok(output) => assert_eq!(output, expected, "output mismatch for:\n{source}"),
        Err(error) => panic!("unexpected error for:\n{source}\n{error}"),
    }
}

/// Assert a program fails at runtime with exactly this message; returns the
/// report so callers can inspect the stack trace.
pub fn expect_runtime_error(source: &str, message: &str) -> RuntimeErrorReport {
    match run(source) {
        Err(InterpretError::Runtime(report)) => {
            assert_eq!(
                report.error.to_string(),
                message,
                "wrong runtime error for:\n{source}"
            );
            report
        }
        Err(InterpretError::Compile(report)) => {
            panic!("expected runtime error for:\n{source}\ngot compile error: {report}")
        }
        Ok(output) => {
            panic!("expected runtime error for:\n{source}\ngot output: {output:?}")
        }
    }
}

/// Assert a program is rejected at compile time with a message containing
/// `fragment`.
pub fn expect_compile_error(source: &str, fragment: &str) {
    match run(source) {
        Err(InterpretError::Compile(report)) => {
            let text = report.to_string();
            assert!(
                text.contains(fragment),
                "compile error for:\n{source}\nshould contain {fragment:?}, got:\n{text}"
            );
        }
        Err(InterpretError::Runtime(report)) => {
            panic!("expected compile error for:\n{source}\ngot runtime error: {report}")
        }
        Ok(output) => {
            panic!("expected compile error for:\n{source}\ngot output: {output:?}")
        }
    }
}
