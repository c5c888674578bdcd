// kestrel-vm - Heap object types
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Heap object types: functions, closures, upvalues, lists, and natives.
//!
//! Objects are shared with `Rc`; interior mutability is confined to the
//! types that the language can actually mutate (upvalue cells and list
//! storage). Functions are built by the compiler and then frozen.

use std::cell::{Ref, RefCell};
use std::io::Write;
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::intern::IStr;
use crate::value::Value;

/// A compiled function: its code plus the metadata the VM needs to call it.
///
/// The compiler fills this in; after that it is read-only behind an `Rc`.
#[derive(Debug)]
pub struct Function {
    /// Number of declared parameters.
    pub arity: u8,
    /// Number of upvalue descriptors following this function's `Closure` op.
    pub upvalue_count: usize,
    /// The compiled body.
    pub chunk: Chunk,
    /// Function name; `None` for the top-level script.
    pub name: Option<IStr>,
}

impl Function {
    /// Create an empty function shell for the compiler to fill.
    pub fn new(name: Option<IStr>) -> Self {
        Self {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

/// A captured variable.
///
/// While the variable still lives on the value stack the upvalue is *open*
/// and records the stack slot. When the variable's scope ends the VM moves
/// the value into the cell and the upvalue becomes *closed*. The transition
/// is one-way.
#[derive(Debug)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

/// A function paired with the upvalues captured at its creation.
///
/// Sibling closures capturing the same variable share the same cells, so
/// writes through one closure are visible to the others.
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<Function>,
    pub upvalues: Vec<Rc<RefCell<Upvalue>>>,
}

impl Closure {
    /// Wrap a function that captures nothing (the top-level script).
    pub fn new(function: Rc<Function>) -> Self {
        Self {
            function,
            upvalues: Vec::new(),
        }
    }

    /// Pair a function with its captured upvalue cells.
    pub fn with_upvalues(function: Rc<Function>, upvalues: Vec<Rc<RefCell<Upvalue>>>) -> Self {
        Self { function, upvalues }
    }
}

/// A mutable list of values.
#[derive(Debug)]
pub struct List {
    items: RefCell<Vec<Value>>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RefCell::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Borrow the items for iteration (display, debugging).
    pub fn items(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Replace the item at `index`. The index must be in range.
    pub fn set(&self, index: usize, value: Value) {
        self.items.borrow_mut()[index] = value;
    }

    pub fn append(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    /// Remove the item at `index`, shifting the rest down.
    /// The index must be in range.
    pub fn remove(&self, index: usize) {
        self.items.borrow_mut().remove(index);
    }
}

/// Outcome of a native call: a value, or an error message the VM reports
/// as a runtime error.
pub type NativeResult = Result<Value, String>;

/// A native implementation receives the VM's output stream and the argument
/// slice; it cannot touch the value stack, so stack balance holds by
/// construction.
pub type NativeImpl = fn(&mut dyn Write, &[Value]) -> NativeResult;

/// A built-in function.
#[derive(Debug)]
pub struct NativeFn {
    pub name: &'static str,
    /// Declared arity; `-1` accepts any number of arguments.
    pub arity: i8,
    pub function: NativeImpl,
}

// ============================================================================
// Tests
// ============================================================================
