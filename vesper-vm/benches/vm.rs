// vesper-vm - Interpreter benchmarks
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

use criterion::{Criterion, criterion_group, criterion_main};
use vesper_vm::Vm;

// Generalised harness: compile + run the program in a fresh VM, printing
// into a sink.
fn run_benchmark(c: &mut Criterion, name: &str, source: &str) {
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut vm = Vm::new();
            vm.set_output(Box::new(std::io::sink()));
            vm.interpret(source).expect("benchmark program runs");
        });
    });
}

// Recursive fibonacci: call-frame and arithmetic pressure.
pub fn fib_benchmark(c: &mut Criterion) {
    let source = r#"
fun fib(n) {
  if (n < 2) return n;
  return fib(n - 1) + fib(n - 2);
}
print fib(17);
"#;
    run_benchmark(c, "fib_recursive", source);
}

// Tight loop with locals: dispatch and stack traffic.
pub fn sum_benchmark(c: &mut Criterion) {
    let source = r#"
var sum = 0;
for (var i = 0; i < 10000; i = i + 1) {
  sum = sum + i;
}
print sum;
"#;
    run_benchmark(c, "sum_loop", source);
}

// Method dispatch and field access.
pub fn method_benchmark(c: &mut Criterion) {
    let source = r#"
class Counter {
  init() { this.n = 0; }
  bump() { this.n = this.n + 1; }
}
var c = Counter();
for (var i = 0; i < 5000; i = i + 1) {
  c.bump();
}
print c.n;
"#;
    run_benchmark(c, "method_dispatch", source);
}

// String building: allocation and interning pressure, exercises the GC.
pub fn string_benchmark(c: &mut Criterion) {
    let source = r#"
var s = "";
for (var i = 0; i < 300; i = i + 1) {
  s = s + "x";
}
print s == "" + s;
"#;
    run_benchmark(c, "string_churn", source);
}

criterion_group!(
    benches,
    fib_benchmark,
    sum_benchmark,
    method_benchmark,
    string_benchmark
);
criterion_main!(benches);
