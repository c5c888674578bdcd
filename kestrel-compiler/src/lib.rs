// kestrel-compiler - Scanner and single-pass compiler for Kestrel
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Front end of the Kestrel programming language: the scanner and the
//! single-pass Pratt compiler.
//!
//! [`compile`] turns source text directly into a `kestrel_vm::Function`
//! ready for `Vm::run`; no syntax tree is built in between.

pub mod compiler;
pub mod scanner;

pub use compiler::{compile, CompileError};
