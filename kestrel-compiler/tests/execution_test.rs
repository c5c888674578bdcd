// kestrel-compiler - End-to-end execution tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compile-and-run tests covering the language surface: expressions,
//! control flow, functions, closures, lists, and natives.

use kestrel_compiler::compile;
use kestrel_vm::Vm;

fn run(source: &str) -> String {
    let function = compile(source).expect("compile error");
    let mut vm = Vm::new();
    let mut out = Vec::new();
    vm.run(function, &mut out).expect("runtime error");
    // Every completed program must leave the machine quiescent.
    assert_eq!(vm.stack_depth(), 0, "stack not balanced after: {}", source);
    assert_eq!(vm.frame_depth(), 0, "frames left after: {}", source);
    String::from_utf8(out).expect("invalid utf-8 in program output")
}

// =============================================================================
// Expressions
// =============================================================================

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(run("print 1 + 2 * 3;"), "7\n");
    assert_eq!(run("print (1 + 2) * 3;"), "9\n");
    assert_eq!(run("print 10 / 4;"), "2.5\n");
    assert_eq!(run("print -3 + 5;"), "2\n");
    assert_eq!(run("print 2 - -3;"), "5\n");
}

#[test]
fn test_comparison_and_equality() {
    assert_eq!(run("print 1 < 2;"), "true\n");
    assert_eq!(run("print 2 <= 1;"), "false\n");
    assert_eq!(run("print 3 >= 3;"), "true\n");
    assert_eq!(run("print 1 != 2;"), "true\n");
    assert_eq!(run("print nil == nil;"), "true\n");
    assert_eq!(run("print nil == false;"), "false\n");
    assert_eq!(run("print \"a\" == \"a\";"), "true\n");
}

#[test]
fn test_string_concatenation_equality() {
    assert_eq!(run("println(\"foo\"+\"bar\"==\"foobar\");"), "true\n");
}

#[test]
fn test_falsiness() {
    assert_eq!(run("println(!0);"), "false\n");
    assert_eq!(run("println(!\"\");"), "false\n");
    assert_eq!(run("println(![]);"), "false\n");
    assert_eq!(run("println(!nil);"), "true\n");
    assert_eq!(run("println(!false);"), "true\n");
}

#[test]
fn test_and_or_short_circuit() {
    assert_eq!(run("println(1 and 2);"), "2\n");
    assert_eq!(run("println(nil and 2);"), "nil\n");
    assert_eq!(run("println(nil or \"x\");"), "x\n");
    assert_eq!(run("println(false or nil);"), "nil\n");
    assert_eq!(run("println(1 or 2);"), "1\n");
}

// =============================================================================
// Statements and control flow
// =============================================================================

#[test]
fn test_if_else() {
    assert_eq!(run("if (true) print 1; else print 2;"), "1\n");
    assert_eq!(run("if (false) print 1; else print 2;"), "2\n");
    assert_eq!(run("if (0) print 1; else print 2;"), "1\n");
    assert_eq!(run("if (nil) print 1;"), "");
}

#[test]
fn test_while_loop() {
    let source = "let i = 0; let total = 0;
                  while (i < 5) { total = total + i; i = i + 1; }
                  println(total);";
    assert_eq!(run(source), "10\n");
}

#[test]
fn test_for_loop() {
    assert_eq!(run("for (let i = 0; i < 3; i = i + 1) print i;"), "0\n1\n2\n");
}

#[test]
fn test_block_scope_shadowing() {
    let source = "{ let a = \"outer\"; { let a = \"inner\"; print a; } print a; }";
    assert_eq!(run(source), "inner\nouter\n");
}

#[test]
fn test_global_reassignment() {
    assert_eq!(run("let a = 1; a = a + 1; println(a);"), "2\n");
}

// =============================================================================
// Functions and closures
// =============================================================================

#[test]
fn test_fib() {
    let source =
        "func fib(n){ if (n<2) return n; return fib(n-2)+fib(n-1); } println(fib(10));";
    assert_eq!(run(source), "55\n");
}

#[test]
fn test_counter_closure() {
    let source = "func makeCounter(){ let c=0; return fun(){ c=c+1; return c; }; }
                  let k=makeCounter();
                  println(k()); println(k()); println(k());";
    assert_eq!(run(source), "1\n2\n3\n");
}

#[test]
fn test_independent_counters() {
    let source = "func makeCounter(){ let c=0; return fun(){ c=c+1; return c; }; }
                  let a=makeCounter(); let b=makeCounter();
                  println(a()); println(a()); println(b());";
    assert_eq!(run(source), "1\n2\n1\n");
}

#[test]
fn test_sibling_closures_share_one_cell() {
    let source = "func make() {
                    let v = 0;
                    let set = fun(n) { v = n; };
                    let get = fun() { return v; };
                    return [set, get];
                  }
                  let fns = make();
                  fns[0](7);
                  println(fns[1]());";
    assert_eq!(run(source), "7\n");
}

#[test]
fn test_block_scoped_capture_closes_once() {
    let source = "let g = nil;
                  {
                    let a = 1;
                    g = fun() { a = a + 1; return a; };
                  }
                  println(g()); println(g());";
    assert_eq!(run(source), "2\n3\n");
}

#[test]
fn test_transitive_upvalue() {
    let source = "func outer() {
                    let x = 1;
                    func middle() {
                      func inner() { return x; }
                      return inner;
                    }
                    return middle;
                  }
                  println(outer()()());";
    assert_eq!(run(source), "1\n");
}

#[test]
fn test_anonymous_function_call() {
    assert_eq!(run("println(fun(x){ return x * 2; }(21));"), "42\n");
}

#[test]
fn test_function_display() {
    assert_eq!(run("func f() {} print f;"), "<fn f>\n");
    assert_eq!(run("print clock;"), "<native fn>\n");
}

#[test]
fn test_implicit_return_is_nil() {
    assert_eq!(run("func f() {} println(f());"), "nil\n");
    assert_eq!(run("func f() { return; } println(f());"), "nil\n");
}

#[test]
fn test_deep_recursion_within_limit() {
    let source = "func down(n) { if (n == 0) return 0; return down(n - 1); }
                  println(down(30));";
    assert_eq!(run(source), "0\n");
}

// =============================================================================
// Lists
// =============================================================================

#[test]
fn test_list_append_delete() {
    let source =
        "let xs=[10,20,30]; append(xs,40); delete(xs,0); println(xs[0]); println(xs[2]);";
    assert_eq!(run(source), "20\n40\n");
}

#[test]
fn test_subscript_assignment_roundtrip() {
    assert_eq!(run("let xs=[1,2,3]; xs[1] = 42; println(xs[1]);"), "42\n");
    // Subscript assignment is an expression yielding the stored value.
    assert_eq!(run("let xs=[1,2,3]; println(xs[0] = 9);"), "9\n");
}

#[test]
fn test_list_display_and_nesting() {
    assert_eq!(run("println([1, \"two\", nil]);"), "[1, two, nil]\n");
    assert_eq!(run("let xs = [[1, 2], [3]]; println(xs[1][0]);"), "3\n");
}

#[test]
fn test_empty_list() {
    let source = "let xs = []; append(xs, 5); println(xs[0]);";
    assert_eq!(run(source), "5\n");
}

// =============================================================================
// Natives
// =============================================================================

#[test]
fn test_clock_returns_positive_number() {
    assert_eq!(run("println(clock() > 0);"), "true\n");
}

#[test]
fn test_println_variadic() {
    assert_eq!(run("println(1, \"two\", nil);"), "1 two nil\n");
    assert_eq!(run("println();"), "\n");
    assert_eq!(run("println(append([], 1));"), "nil\n");
}

#[test]
fn test_read_file() {
    let path = std::env::temp_dir().join("kestrel_exec_test.txt");
    std::fs::write(&path, "file-contents").expect("write temp file");
    let source = format!("print readFile(\"{}\");", path.display());
    assert_eq!(run(&source), "file-contents\n");
    let _ = std::fs::remove_file(&path);
}

// =============================================================================
// VM reuse (REPL behaviour)
// =============================================================================

#[test]
fn test_globals_persist_across_runs() {
    let mut vm = Vm::new();
    let mut out = Vec::new();

    let first = compile("let a = 1;").expect("compile error");
    vm.run(first, &mut out).expect("runtime error");

    let second = compile("println(a);").expect("compile error");
    vm.run(second, &mut out).expect("runtime error");

    assert_eq!(String::from_utf8(out).unwrap(), "1\n");
}
