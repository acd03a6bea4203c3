// vesper - A dynamically-typed scripting language with a bytecode VM
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use vesper_vm::{InterpretError, Vm, VmOptions};

const EXIT_USAGE: i32 = 64;
const EXIT_COMPILE_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut options = VmOptions::default();
    let mut script = None;
    for arg in &args {
        match arg.as_str() {
            "--version" | "-v" => {
                println!("Vesper v0.1.0");
                return;
            }
            "--trace" => options.trace_execution = true,
            "--print-code" => options.print_code = true,
            "--stress-gc" => options.stress_gc = true,
            "--log-gc" => options.log_gc = true,
            flag if flag.starts_with('-') => {
                eprintln!("Unknown option '{}'", flag);
                eprintln!("Usage: vesper [options] [script.vsp]");
                process::exit(EXIT_USAGE);
            }
            path => {
                if script.replace(path).is_some() {
                    eprintln!("Usage: vesper [options] [script.vsp]");
                    process::exit(EXIT_USAGE);
                }
            }
        }
    }

    let mut vm = Vm::with_options(options);
    match script {
        Some(path) => run_file(&mut vm, path),
        None => run_repl(&mut vm),
    }
}

/// Run a single source file. Exits with 65 for compile errors and 70 for
/// runtime errors.
fn run_file(vm: &mut Vm, file_path: &str) {
    let path = Path::new(file_path);

    match path.extension().and_then(|e| e.to_str()) {
        Some("vsp") => {}
        Some(ext) => {
            eprintln!(
                "Error: unsupported file extension '.{}' for '{}' (expected .vsp)",
                ext, file_path
            );
            process::exit(EXIT_USAGE);
        }
        None => {
            eprintln!(
                "Error: file '{}' has no extension (expected .vsp)",
                file_path
            );
            process::exit(EXIT_USAGE);
        }
    }

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading '{}': {}", file_path, e);
            process::exit(EXIT_USAGE);
        }
    };

    match vm.interpret(&source) {
        Ok(()) => {}
        Err(InterpretError::Compile(report)) => {
            eprintln!("{}", report);
            process::exit(EXIT_COMPILE_ERROR);
        }
        Err(InterpretError::Runtime(report)) => {
            eprintln!("{}", report);
            process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

/// The interactive prompt. One VM lives for the whole session, so globals
/// and interned strings persist across lines; errors are printed and the
/// loop continues.
fn run_repl(vm: &mut Vm) {
    println!("Vesper v0.1.0");

    loop {
        print!("> ");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if let Err(error) = vm.interpret(input) {
                    eprintln!("{}", error);
                }
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}
