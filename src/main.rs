// kestrel - A small scripting language with a bytecode VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process;
use std::rc::Rc;

use kestrel_compiler::compile;
use kestrel_vm::{debug, Function, Value, Vm};

/// Exit code for compile errors.
const EX_DATAERR: i32 = 65;
/// Exit code for runtime errors.
const EX_SOFTWARE: i32 = 70;
/// Exit code for unreadable source files.
const EX_IOERR: i32 = 74;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Kestrel v0.1.0");
        return;
    }

    match args.len() {
        1 => run_repl(),
        2 => run_file(&args[1]),
        3 if args[1] == "--dump" => dump_file(&args[2]),
        _ => {
            eprintln!("Usage: kestrel [--dump] [path]");
            process::exit(64);
        }
    }
}

/// Compile and run a single source file.
fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading '{}': {}", path, e);
            process::exit(EX_IOERR);
        }
    };

    let function = match compile(&source) {
        Ok(function) => function,
        Err(errors) => {
            for error in errors {
                eprintln!("{}", error);
            }
            process::exit(EX_DATAERR);
        }
    };

    let mut vm = Vm::new();
    let stdout = io::stdout();
    if let Err(error) = vm.run(function, &mut stdout.lock()) {
        eprintln!("{}", error);
        process::exit(EX_SOFTWARE);
    }
}

/// Compile a file and print its disassembly instead of running it.
fn dump_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading '{}': {}", path, e);
            process::exit(EX_IOERR);
        }
    };

    match compile(&source) {
        Ok(function) => dump_function(&function),
        Err(errors) => {
            for error in errors {
                eprintln!("{}", error);
            }
            process::exit(EX_DATAERR);
        }
    }
}

/// Disassemble a function and every function nested in its constants.
fn dump_function(function: &Rc<Function>) {
    let name = function
        .name
        .as_ref()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "script".to_string());
    print!("{}", debug::disassemble(&function.chunk, &name));

    for constant in &function.chunk.constants {
        if let Value::Function(inner) = constant {
            println!();
            dump_function(inner);
        }
    }
}

/// Run the interactive REPL. The VM persists across lines, so definitions
/// survive; errors are printed and the loop continues.
fn run_repl() {
    println!("Kestrel v0.1.0");
    let mut vm = Vm::new();
    let stdin = io::stdin();

    loop {
        print!("kestrel=> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match compile(line) {
                    Ok(function) => {
                        let stdout = io::stdout();
                        if let Err(error) = vm.run(function, &mut stdout.lock()) {
                            eprintln!("{}", error);
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            eprintln!("{}", error);
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}
