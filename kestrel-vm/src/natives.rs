// kestrel-vm - Built-in native functions
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Built-in native functions, registered into the globals table when a VM
//! is created.
//!
//! Natives report failure in-band by returning `Err(message)`; the VM
//! surfaces that as a runtime error prefixed with `Native error: `. Fixed
//! arities are enforced by the VM before the call, so the implementations
//! here only validate argument types.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::intern::IStr;
use crate::object::{NativeFn, NativeImpl, NativeResult};
use crate::value::Value;

/// `readFile` refuses files larger than this.
const MAX_READ_FILE_BYTES: u64 = 16 * 1024 * 1024;

pub(crate) fn register_natives(globals: &mut HashMap<IStr, Value>) {
    define(globals, "clock", 0, native_clock);
    define(globals, "readFile", 1, native_read_file);
    define(globals, "println", -1, native_println);
    define(globals, "append", 2, native_append);
    define(globals, "delete", 2, native_delete);
}

fn define(
    globals: &mut HashMap<IStr, Value>,
    name: &'static str,
    arity: i8,
    function: NativeImpl,
) {
    globals.insert(
        IStr::intern(name),
        Value::Native(Rc::new(NativeFn {
            name,
            arity,
            function,
        })),
    );
}

/// (clock) - seconds since the Unix epoch, as a number
fn native_clock(_out: &mut dyn Write, _args: &[Value]) -> NativeResult {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Ok(Value::Number(elapsed.as_secs_f64()))
}

/// (readFile path) - whole file contents as a string
fn native_read_file(_out: &mut dyn Write, args: &[Value]) -> NativeResult {
    let path = match &args[0] {
        Value::Str(s) => s.as_str(),
        _ => return Err("Argument to readFile() must be a string.".to_string()),
    };

    let metadata = fs::metadata(path).map_err(|_| "Failed to open file.".to_string())?;
    if metadata.len() > MAX_READ_FILE_BYTES {
        return Err("File is too large to read.".to_string());
    }

    let contents = fs::read_to_string(path).map_err(|_| "Failed to open file.".to_string())?;
    Ok(Value::Str(IStr::intern_owned(contents)))
}

/// (println & args) - print args space-separated, then a newline
fn native_println(out: &mut dyn Write, args: &[Value]) -> NativeResult {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(out, " ").map_err(|_| "Failed to write output.".to_string())?;
        }
        write!(out, "{}", arg).map_err(|_| "Failed to write output.".to_string())?;
    }
    writeln!(out).map_err(|_| "Failed to write output.".to_string())?;
    Ok(Value::Nil)
}

/// (append list value) - push a value onto the end of a list
fn native_append(_out: &mut dyn Write, args: &[Value]) -> NativeResult {
    let list = match &args[0] {
        Value::List(list) => list,
        _ => return Err("append() takes exactly 2 arguments.".to_string()),
    };
    list.append(args[1].clone());
    Ok(Value::Nil)
}

/// (delete list index) - remove the item at an index, shifting the rest down
fn native_delete(_out: &mut dyn Write, args: &[Value]) -> NativeResult {
    let list = match &args[0] {
        Value::List(list) => list,
        _ => return Err("delete() takes a list and an index as arguments".to_string()),
    };
    let index = match &args[1] {
        Value::Number(n) if n.fract() == 0.0 => *n,
        _ => return Err("delete() takes a list and an index as arguments".to_string()),
    };

    if index < 0.0 || index >= list.len() as f64 {
        return Err("Index out of bounds".to_string());
    }

    list.remove(index as usize);
    Ok(Value::Nil)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::List;

    fn sink() -> Vec<u8> {
        Vec::new()
    }

    #[test]
    fn test_clock_is_positive() {
        let mut out = sink();
        match native_clock(&mut out, &[]) {
            Ok(Value::Number(n)) => assert!(n > 0.0),
            other => panic!("unexpected clock result: {:?}", other),
        }
    }

    #[test]
    fn test_println_spaces_and_newline() {
        let mut out = sink();
        let args = [
            Value::Number(1.0),
            Value::Str(IStr::intern("two")),
            Value::Nil,
        ];
        assert_eq!(native_println(&mut out, &args), Ok(Value::Nil));
        assert_eq!(String::from_utf8(out).unwrap(), "1 two nil\n");
    }

    #[test]
    fn test_println_no_args() {
        let mut out = sink();
        assert_eq!(native_println(&mut out, &[]), Ok(Value::Nil));
        assert_eq!(String::from_utf8(out).unwrap(), "\n");
    }

    #[test]
    fn test_append_and_delete() {
        let list = Rc::new(List::new(vec![Value::Number(10.0)]));
        let mut out = sink();
        native_append(&mut out, &[Value::List(Rc::clone(&list)), Value::Number(20.0)]).unwrap();
        assert_eq!(list.len(), 2);

        native_delete(&mut out, &[Value::List(Rc::clone(&list)), Value::Number(0.0)]).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0), Some(Value::Number(20.0)));
    }

    #[test]
    fn test_delete_bounds() {
        let list = Rc::new(List::new(vec![Value::Number(1.0)]));
        let mut out = sink();
        let err = native_delete(&mut out, &[Value::List(list), Value::Number(3.0)]).unwrap_err();
        assert_eq!(err, "Index out of bounds");
    }

    #[test]
    fn test_append_requires_list() {
        let mut out = sink();
        assert!(native_append(&mut out, &[Value::Nil, Value::Nil]).is_err());
    }

    #[test]
    fn test_read_file_missing() {
        let mut out = sink();
        let args = [Value::Str(IStr::intern("/nonexistent/kestrel-test-file"))];
        let err = native_read_file(&mut out, &args).unwrap_err();
        assert_eq!(err, "Failed to open file.");
    }

    #[test]
    fn test_read_file_requires_string() {
        let mut out = sink();
        let err = native_read_file(&mut out, &[Value::Number(1.0)]).unwrap_err();
        assert_eq!(err, "Argument to readFile() must be a string.");
    }
}
