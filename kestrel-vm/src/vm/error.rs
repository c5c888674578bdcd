// kestrel-vm - Runtime errors
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime errors and stack traces.

use std::fmt;

use crate::intern::IStr;

/// What went wrong during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Wrong number of arguments to a call.
    ArityMismatch { expected: usize, got: usize },
    /// Call-frame or value-stack exhaustion.
    StackOverflow,
    /// Stack underflow; only reachable through malformed bytecode.
    StackUnderflow,
    /// Callee is not a closure or native.
    NotCallable,
    /// Binary arithmetic or comparison on non-numbers.
    OperandsMustBeNumbers,
    /// Negation of a non-number.
    OperandMustBeNumber,
    /// Addition operands were neither two numbers nor two strings.
    AddOperands,
    /// Read or write of a global that was never defined.
    UndefinedVariable(IStr),
    /// Subscript read of a non-list.
    IndexTargetNotList,
    /// Subscript index is not an integer-valued number.
    IndexNotNumber,
    /// Subscript read index outside the list.
    IndexOutOfRange,
    /// Subscript write to a non-list.
    StoreTargetNotList,
    /// Subscript write index outside the list.
    StoreIndexInvalid,
    /// A native function reported an error.
    NativeError(String),
    /// Invariant violation; malformed bytecode.
    Internal(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ArityMismatch { expected, got } => {
                write!(f, "Expected {} arguments but got {}.", expected, got)
            }
            ErrorKind::StackOverflow => write!(f, "Stack overflow."),
            ErrorKind::StackUnderflow => write!(f, "Stack underflow."),
            ErrorKind::NotCallable => write!(f, "Can only call functions."),
            ErrorKind::OperandsMustBeNumbers => write!(f, "Operands must be numbers."),
            ErrorKind::OperandMustBeNumber => write!(f, "Operand must be a number"),
            ErrorKind::AddOperands => {
                write!(f, "Operands must be two numbers or two strings")
            }
            ErrorKind::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{}'", name)
            }
            ErrorKind::IndexTargetNotList => write!(f, "Invalid type to index into."),
            ErrorKind::IndexNotNumber => write!(f, "List index is not a number."),
            ErrorKind::IndexOutOfRange => write!(f, "List index out of range."),
            ErrorKind::StoreTargetNotList => write!(f, "Cannot store value in a non-list."),
            ErrorKind::StoreIndexInvalid => write!(f, "Invalid list index."),
            ErrorKind::NativeError(message) => write!(f, "Native error: {}", message),
            ErrorKind::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

/// One entry of a captured stack trace: the source line being executed and
/// the function it belongs to (`None` for the top-level script).
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub line: u32,
    pub function: Option<IStr>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// A runtime error with the call stack at the point of failure,
/// innermost frame first.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub trace: Vec<TraceFrame>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in &self.trace {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

// ============================================================================
// Tests
// ============================================================================
