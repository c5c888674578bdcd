// kestrel-vm - Bytecode and virtual machine for the Kestrel programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime core of the Kestrel programming language: the value model,
//! interned strings, heap objects, bytecode chunks, and the stack-based
//! virtual machine that executes them.
//!
//! Source text is turned into a [`Function`] by the `kestrel-compiler`
//! crate; [`Vm::run`] wraps it in a closure, pushes it as frame 0, and
//! dispatches until it returns or a runtime error resets the machine.

pub mod chunk;
pub mod debug;
pub mod intern;
mod natives;
pub mod object;
pub mod opcode;
pub mod value;
pub mod vm;

pub use chunk::Chunk;
pub use intern::IStr;
pub use object::{Closure, Function, List, NativeFn, NativeResult, Upvalue};
pub use opcode::OpCode;
pub use value::Value;
pub use vm::{ErrorKind, RuntimeError, TraceFrame, Vm, FRAMES_MAX, STACK_MAX};
