// kestrel-compiler - Single-pass bytecode compiler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass compiler for Kestrel.
//!
//! Parses source text with a Pratt precedence climber and emits bytecode
//! directly into the function being built; no syntax tree is retained.
//! Nested function literals push a fresh per-function compiler onto a
//! stack, which is what upvalue resolution walks.

use std::fmt;
use std::rc::Rc;

use kestrel_vm::{Chunk, Function, IStr, OpCode, Value};

use crate::scanner::{Scanner, Token, TokenKind};

/// Local slots are indexed by a single byte.
const MAX_LOCALS: usize = 256;

/// Upvalue slots are indexed by a single byte.
const MAX_UPVALUES: usize = 256;

/// Error during compilation.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
    /// Rendered location: `" at 'lexeme'"`, `" at end"`, or empty for
    /// scanner errors (the message already names the problem).
    at: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error{}: {}", self.line, self.at, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Compile a source string into a top-level function.
///
/// The returned function has arity 0 and no name; the VM wraps it in a
/// closure and runs it as frame 0. All collected errors are returned when
/// compilation fails.
pub fn compile(source: &str) -> Result<Rc<Function>, Vec<CompileError>> {
    let mut parser = Parser::new(source);
    parser.advance();
    while !parser.matches(TokenKind::Eof) {
        parser.declaration();
    }
    parser.emit_return();

    let compiler = parser.compilers.pop().expect("no active compiler");
    if parser.errors.is_empty() {
        Ok(Rc::new(compiler.function))
    } else {
        Err(parser.errors)
    }
}

/// Expression precedence, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // () []
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// A local variable during compilation.
#[derive(Debug)]
struct Local<'src> {
    name: &'src str,
    /// Scope depth, or -1 while the initializer is still being compiled.
    depth: i32,
    /// Whether an inner function captures this local; decides between
    /// `Pop` and `CloseUpvalue` when the scope ends.
    is_captured: bool,
}

/// An upvalue descriptor: where the enclosing function finds the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpvalueDesc {
    index: u8,
    /// True when capturing the enclosing function's local, false when
    /// re-capturing one of its upvalues.
    is_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

/// Per-function compilation state.
struct FnCompiler<'src> {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

impl<'src> FnCompiler<'src> {
    fn new(kind: FunctionKind, name: Option<IStr>) -> Self {
        Self {
            function: Function::new(name),
            kind,
            // Slot 0 belongs to the callee.
            locals: vec![Local {
                name: "",
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

struct Parser<'src> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    /// Function compilers, innermost last; index 0 is the script.
    compilers: Vec<FnCompiler<'src>>,
    errors: Vec<CompileError>,
    panic_mode: bool,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            text: "",
            line: 1,
        };
        Self {
            scanner: Scanner::new(source),
            current: placeholder,
            previous: placeholder,
            compilers: vec![FnCompiler::new(FunctionKind::Script, None)],
            errors: Vec::new(),
            panic_mode: false,
        }
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.text;
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let at = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.text),
        };
        self.errors.push(CompileError {
            line: token.line,
            message: message.to_string(),
            at,
        });
    }

    /// Skip forward to a likely statement boundary after a parse error.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Func
                | TokenKind::Let
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn compiler(&self) -> &FnCompiler<'src> {
        self.compilers.last().expect("no active compiler")
    }

    fn compiler_mut(&mut self) -> &mut FnCompiler<'src> {
        self.compilers.last_mut().expect("no active compiler")
    }

    fn scope_depth(&self) -> i32 {
        self.compiler().scope_depth
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.compiler_mut().function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_op_byte(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.chunk().add_constant(value) {
            Some(idx) => idx,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, idx);
    }

    /// Emit a jump with a placeholder operand; returns the operand offset.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().len() - 2
    }

    /// Point a previously emitted jump at the current position.
    fn patch_jump(&mut self, offset: usize) {
        let distance = self.chunk().len() - offset - 2;
        if distance > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let clamped = distance.min(u16::MAX as usize) as u16;
        self.chunk().patch_u16(offset, clamped);
    }

    /// Emit a backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let distance = self.chunk().len() - loop_start + 2;
        if distance > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let [hi, lo] = (distance.min(u16::MAX as usize) as u16).to_be_bytes();
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn declaration(&mut self) {
        if self.matches(TokenKind::Func) {
            self.func_declaration();
        } else if self.matches(TokenKind::Let) {
            self.let_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn func_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Functions may refer to themselves; the binding is usable before
        // the body finishes compiling.
        self.mark_initialized();
        let name = IStr::intern(self.previous.text);
        self.function(FunctionKind::Function, Some(name));
        self.define_variable(global);
    }

    fn let_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect variable name.");
        let name = self.previous;
        self.declare_variable();

        let has_initializer = self.matches(TokenKind::Equal);
        if has_initializer {
            self.expression();
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        if self.scope_depth() > 0 {
            // Locals occupy a stack slot either way.
            if !has_initializer {
                self.emit_op(OpCode::Nil);
            }
            self.mark_initialized();
            return;
        }

        if has_initializer {
            let idx = self.identifier_constant(name);
            self.emit_op_byte(OpCode::DefineGlobal, idx);
        }
        // A global `let` with no initializer defines nothing: the name
        // stays undefined until a `let` with an initializer runs.
    }

    /// Consume an identifier, declare it, and return its name-constant
    /// index (0 for locals, which are addressed by slot instead).
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.scope_depth() > 0 {
            return 0;
        }
        self.identifier_constant(self.previous)
    }

    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        self.make_constant(Value::Str(IStr::intern(name.text)))
    }

    fn declare_variable(&mut self) {
        if self.scope_depth() == 0 {
            return;
        }
        let name = self.previous;

        let mut duplicate = false;
        {
            let compiler = self.compiler();
            for local in compiler.locals.iter().rev() {
                if local.depth != -1 && local.depth < compiler.scope_depth {
                    break;
                }
                if local.name == name.text {
                    duplicate = true;
                    break;
                }
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.compiler().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.compiler_mut().locals.push(Local {
            name: name.text,
            depth: -1,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let compiler = self.compiler_mut();
        if compiler.scope_depth == 0 {
            return;
        }
        if let Some(local) = compiler.locals.last_mut() {
            local.depth = compiler.scope_depth;
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth() > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.matches(TokenKind::Semicolon) {
            // No initializer.
        } else if self.matches(TokenKind::Let) {
            self.let_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().len();
        let mut exit_jump = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.compiler().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn begin_scope(&mut self) {
        self.compiler_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.compiler_mut().scope_depth -= 1;
        loop {
            let op = {
                let compiler = self.compiler();
                match compiler.locals.last() {
                    Some(local) if local.depth > compiler.scope_depth => {
                        if local.is_captured {
                            OpCode::CloseUpvalue
                        } else {
                            OpCode::Pop
                        }
                    }
                    _ => break,
                }
            };
            self.emit_op(op);
            self.compiler_mut().locals.pop();
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= Self::infix_precedence(self.current.kind) {
            self.advance();
            self.infix_rule(self.previous.kind, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn infix_precedence(kind: TokenKind) -> Precedence {
        match kind {
            TokenKind::Or => Precedence::Or,
            TokenKind::And => Precedence::And,
            TokenKind::BangEqual | TokenKind::EqualEqual => Precedence::Equality,
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => Precedence::Comparison,
            TokenKind::Plus | TokenKind::Minus => Precedence::Term,
            TokenKind::Star | TokenKind::Slash => Precedence::Factor,
            TokenKind::LeftParen | TokenKind::LeftBracket => Precedence::Call,
            _ => Precedence::None,
        }
    }

    /// Dispatch on the prefix position; false when the token cannot start
    /// an expression.
    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::LeftBracket => self.list_literal(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::Nil | TokenKind::True | TokenKind::False => self.literal(),
            TokenKind::Fun => self.lambda(),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.call(),
            TokenKind::LeftBracket => self.subscript(can_assign),
            TokenKind::And => self.and_expr(),
            TokenKind::Or => self.or_expr(),
            _ => self.binary(),
        }
    }

    fn number(&mut self) {
        let value: f64 = self.previous.text.parse().unwrap_or_default();
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self) {
        let text = self.previous.text;
        let contents = &text[1..text.len() - 1];
        self.emit_constant(Value::Str(IStr::intern(contents)));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::False => self.emit_op(OpCode::False),
            _ => {}
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let op = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match op {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => {}
        }
    }

    fn binary(&mut self) {
        let op = self.previous.kind;
        self.parse_precedence(Self::infix_precedence(op).next());
        match op {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => {}
        }
    }

    fn and_expr(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_expr(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let argc = self.argument_list();
        self.emit_op_byte(OpCode::Call, argc);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(255) as u8
    }

    fn list_literal(&mut self) {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightBracket) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 items in a list literal.");
                }
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "Expect ']' after list items.");
        self.emit_op_byte(OpCode::BuildList, count.min(255) as u8);
    }

    fn subscript(&mut self, can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightBracket, "Expect ']' after index.");

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::StoreSubscr);
        } else {
            self.emit_op(OpCode::IndexSubscr);
        }
    }

    fn lambda(&mut self) {
        self.function(FunctionKind::Function, None);
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous;
        self.named_variable(name, can_assign);
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let top = self.compilers.len() - 1;
        let (get_op, set_op, operand) = if let Some(slot) = self.resolve_local(top, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(top, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let idx = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, idx)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, operand);
        } else {
            self.emit_op_byte(get_op, operand);
        }
    }

    // =========================================================================
    // Variable resolution
    // =========================================================================

    fn resolve_local(&mut self, compiler: usize, name: Token<'src>) -> Option<u8> {
        let mut in_own_initializer = false;
        let mut found = None;
        for (i, local) in self.compilers[compiler].locals.iter().enumerate().rev() {
            if local.name == name.text {
                if local.depth == -1 {
                    in_own_initializer = true;
                }
                found = Some(i as u8);
                break;
            }
        }
        if in_own_initializer {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    /// Resolve a name in an enclosing function, threading the capture
    /// through every function in between.
    fn resolve_upvalue(&mut self, compiler: usize, name: Token<'src>) -> Option<u8> {
        if compiler == 0 {
            return None;
        }

        if let Some(local) = self.resolve_local(compiler - 1, name) {
            self.compilers[compiler - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(compiler, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(compiler - 1, name) {
            return Some(self.add_upvalue(compiler, upvalue, false));
        }

        None
    }

    fn add_upvalue(&mut self, compiler: usize, index: u8, is_local: bool) -> u8 {
        let desc = UpvalueDesc { index, is_local };
        if let Some(existing) = self.compilers[compiler]
            .upvalues
            .iter()
            .position(|u| *u == desc)
        {
            return existing as u8;
        }

        if self.compilers[compiler].upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }

        let upvalues = &mut self.compilers[compiler].upvalues;
        upvalues.push(desc);
        (upvalues.len() - 1) as u8
    }

    // =========================================================================
    // Function compilation
    // =========================================================================

    fn function(&mut self, kind: FunctionKind, name: Option<IStr>) {
        let paren_message = if name.is_some() {
            "Expect '(' after function name."
        } else {
            "Expect '(' after 'fun'."
        };
        self.compilers.push(FnCompiler::new(kind, name));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, paren_message);
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.compiler().function.arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.compiler_mut().function.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        // No end_scope: the frame's locals die with the frame at runtime.
        self.emit_return();
        let compiler = self.compilers.pop().expect("no active compiler");
        let mut function = compiler.function;
        function.upvalue_count = compiler.upvalues.len();

        let idx = self.make_constant(Value::Function(Rc::new(function)));
        self.emit_op_byte(OpCode::Closure, idx);
        for upvalue in &compiler.upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
