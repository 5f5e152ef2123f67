//! Single-pass compiler. Tokens are parsed with a Pratt table and bytecode is
//! emitted straight into the chunk of the function being built; there is no
//! syntax tree.

mod rules;

use std::fmt;
use std::mem;
use std::rc::Rc;

use log::debug;

use crate::chunk::{Chunk, OpCode};
use crate::config::{MAX_ARITY, MAX_LOCALS};
use crate::diagnostic::Span;
use crate::lexer::{Scanner, Token, TokenKind};
use crate::value::{Interner, ObjFunction, Value};

use rules::{rule, Precedence};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    At(String),
    End,
    /// Raised by the scanner; the message already describes the text.
    Lexical,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLocation::At(lexeme) => write!(f, " at '{lexeme}'"),
            ErrorLocation::End => f.write_str(" at end"),
            ErrorLocation::Lexical => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub location: ErrorLocation,
    pub message: String,
    pub span: Span,
}

/// Every error reported by one compile, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl<'a> IntoIterator for &'a CompileErrors {
    type Item = &'a CompileError;
    type IntoIter = std::slice::Iter<'a, CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Compiles a whole program into its top-level script function.
///
/// String constants are interned through `strings`, which must be the table
/// the executing VM uses.
pub fn compile(source: &str, strings: &mut Interner) -> Result<Rc<ObjFunction>, CompileErrors> {
    let mut parser = Parser::new(source, strings);
    parser.advance();
    while !parser.matches(TokenKind::Eof) {
        parser.declaration();
    }
    let script = parser.end_function();

    if parser.errors.is_empty() {
        Ok(script)
    } else {
        debug!("compile failed with {} error(s)", parser.errors.len());
        Err(CompileErrors(parser.errors))
    }
}

// ── Build state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

#[derive(Debug)]
struct Local {
    name: String,
    /// `None` while the initializer is being compiled.
    depth: Option<usize>,
}

#[derive(Debug)]
struct LoopRecord {
    /// Target of `continue`: the condition, or the increment of a `for`.
    start: usize,
    scope_depth: usize,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

#[derive(Debug)]
struct FunctionState {
    function: ObjFunction,
    kind: FunctionKind,
    locals: Vec<Local>,
    scope_depth: usize,
    loops: Vec<LoopRecord>,
    last_op: Option<OpCode>,
    /// Offset most recently targeted by a patched forward jump.
    jump_landing: Option<usize>,
}

impl FunctionState {
    fn new(function: ObjFunction, kind: FunctionKind) -> Self {
        FunctionState {
            function,
            kind,
            // Slot 0 holds the callee and can never be named.
            locals: vec![Local { name: String::new(), depth: Some(0) }],
            scope_depth: 0,
            loops: Vec::new(),
            last_op: None,
            jump_landing: None,
        }
    }
}

enum Target {
    Local(u8),
    Global(usize),
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'src, 'ctx> {
    scanner: Scanner<'src>,
    strings: &'ctx mut Interner,
    current: Token,
    previous: Token,
    panic_mode: bool,
    errors: Vec<CompileError>,
    /// Innermost function being compiled.
    state: FunctionState,
    /// Lexically enclosing functions, outermost first.
    enclosing: Vec<FunctionState>,
}

impl<'src, 'ctx> Parser<'src, 'ctx> {
    fn new(source: &'src str, strings: &'ctx mut Interner) -> Self {
        let start = Token { kind: TokenKind::Eof, lexeme: String::new(), line: 1, span: Span::UNKNOWN };
        Parser {
            scanner: Scanner::new(source),
            strings,
            current: start.clone(),
            previous: start,
            panic_mode: false,
            errors: Vec::new(),
            state: FunctionState::new(ObjFunction::new(None), FunctionKind::Script),
            enclosing: Vec::new(),
        }
    }

    // ── Token handling ───────────────────────────────────────────────

    fn next_token(&mut self) -> Token {
        match self.scanner.next() {
            Some(token) => token,
            // The scanner is exhausted only after it has yielded Eof.
            None => self.current.clone(),
        }
    }

    fn advance(&mut self) {
        let next = self.next_token();
        self.previous = mem::replace(&mut self.current, next);

        while self.current.kind == TokenKind::Error {
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
            self.current = self.next_token();
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // ── Errors ───────────────────────────────────────────────────────

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::End,
            TokenKind::Error => ErrorLocation::Lexical,
            _ => ErrorLocation::At(token.lexeme.clone()),
        };
        self.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
            span: token.span,
        });
    }

    /// Skips tokens until a likely statement boundary.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fn
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ── Emission ─────────────────────────────────────────────────────

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.state.function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
        self.state.last_op = Some(op);
    }

    fn emit_op_operand(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_u16(&mut self, value: u16) {
        let line = self.previous.line;
        self.chunk().write_u16(value, line);
    }

    /// Emits a constant-indexed instruction, switching to the 4-byte form
    /// once the index no longer fits in one byte.
    fn emit_indexed(&mut self, op: OpCode, index: usize) {
        match u8::try_from(index) {
            Ok(short) => self.emit_op_operand(op, short),
            Err(_) => {
                self.emit_op(op.long_form());
                let line = self.previous.line;
                // make_constant caps indices at u32::MAX.
                self.chunk().write_u32(index as u32, line);
            }
        }
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Null);
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> usize {
        let index = self.chunk().add_constant(value);
        if u32::try_from(index).is_err() {
            self.error("too many constants in one chunk");
            return 0;
        }
        index
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_indexed(OpCode::Constant, index);
    }

    fn identifier_constant(&mut self, name: &str) -> usize {
        let name = self.strings.intern(name);
        self.make_constant(Value::from(name))
    }

    /// Emits a forward jump with a placeholder offset and returns the offset
    /// of its operand for `patch_jump`.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_u16(u16::MAX);
        self.chunk().len() - 2
    }

    fn patch_jump(&mut self, site: usize) {
        let target = self.chunk().len();
        match u16::try_from(target - site - 2) {
            Ok(offset) => self.chunk().patch_u16(site, offset),
            Err(_) => self.error("too much code to jump over"),
        }
        self.state.jump_landing = Some(target);
    }

    fn emit_loop(&mut self, start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk().len() + 2 - start;
        match u16::try_from(offset) {
            Ok(offset) => self.emit_u16(offset),
            Err(_) => {
                self.error("loop body too large");
                self.emit_u16(0);
            }
        }
    }

    fn patch_loop(&mut self, site: usize, start: usize) {
        match u16::try_from(site + 2 - start) {
            Ok(offset) => self.chunk().patch_u16(site, offset),
            Err(_) => self.error("loop body too large"),
        }
    }

    // ── Functions and scopes ─────────────────────────────────────────

    fn begin_function(&mut self, function: ObjFunction, kind: FunctionKind) {
        let outer = mem::replace(&mut self.state, FunctionState::new(function, kind));
        self.enclosing.push(outer);
    }

    /// Finishes the innermost function and restores its enclosing state.
    fn end_function(&mut self) -> Rc<ObjFunction> {
        let len = self.state.function.chunk.len();
        let returns = self.state.last_op == Some(OpCode::Return) && self.state.jump_landing != Some(len);
        if !returns {
            self.emit_return();
        }

        let finished = match self.enclosing.pop() {
            Some(outer) => mem::replace(&mut self.state, outer),
            None => mem::replace(&mut self.state, FunctionState::new(ObjFunction::new(None), FunctionKind::Script)),
        };
        let function = finished.function;
        debug!(
            "compiled {:?} '{}': {} bytes, {} constants, arity {}",
            finished.kind,
            function.display_name(),
            function.chunk.len(),
            function.chunk.constants.len(),
            function.arity
        );
        Rc::new(function)
    }

    fn begin_scope(&mut self) {
        self.state.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state.scope_depth -= 1;
        let depth = self.state.scope_depth;
        while self.state.locals.last().is_some_and(|l| l.depth.is_none_or(|d| d > depth)) {
            self.emit_op(OpCode::Pop);
            self.state.locals.pop();
        }
    }

    fn add_local(&mut self, name: String) {
        if self.state.locals.len() >= MAX_LOCALS {
            self.error("too many local variables in function");
            return;
        }
        self.state.locals.push(Local { name, depth: None });
    }

    fn declare_variable(&mut self) {
        if self.state.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme.clone();
        let depth = self.state.scope_depth;
        let duplicate = self
            .state
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth.is_none_or(|d| d >= depth))
            .any(|l| l.name == name);
        if duplicate {
            self.error(&format!("variable '{name}' already declared in this scope"));
        }
        self.add_local(name);
    }

    /// Consumes a variable name. Returns its constant index for globals, 0
    /// for locals.
    fn parse_variable(&mut self, message: &str) -> usize {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state.scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme.clone();
        self.identifier_constant(&name)
    }

    fn mark_initialized(&mut self) {
        let depth = self.state.scope_depth;
        if depth == 0 {
            return;
        }
        // A declaration rejected by add_local left no pending local behind.
        if let Some(local) = self.state.locals.last_mut().filter(|l| l.depth.is_none()) {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: usize, assignable: bool) {
        if !assignable {
            self.emit_op(OpCode::MakeConst);
        }
        if self.state.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_indexed(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let (slot, initialized) = self
            .state
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| l.name == name)
            .map(|(slot, l)| (slot, l.depth.is_some()))?;
        if !initialized {
            self.error("self-reference in initializer");
        }
        u8::try_from(slot).ok()
    }

    fn resolve(&mut self, name: &str) -> Target {
        if let Some(slot) = self.resolve_local(name) {
            return Target::Local(slot);
        }
        let captured = self.enclosing.iter().any(|s| s.locals.iter().any(|l| l.name == name));
        if captured {
            self.error("closures are not supported");
        }
        Target::Global(self.identifier_constant(name))
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let target = self.resolve(name);
        let assign = can_assign && self.matches(TokenKind::Equal);
        if assign {
            self.expression();
        }
        match (target, assign) {
            (Target::Local(slot), false) => self.emit_op_operand(OpCode::GetLocal, slot),
            (Target::Local(slot), true) => self.emit_op_operand(OpCode::SetLocal, slot),
            (Target::Global(index), false) => self.emit_indexed(OpCode::GetGlobal, index),
            (Target::Global(index), true) => self.emit_indexed(OpCode::SetGlobal, index),
        }
    }

    // ── Loops ────────────────────────────────────────────────────────

    fn begin_loop(&mut self, start: usize) {
        let scope_depth = self.state.scope_depth;
        self.state.loops.push(LoopRecord { start, scope_depth, breaks: Vec::new(), continues: Vec::new() });
    }

    /// Patches every pending `break` to the current end and every pending
    /// `continue` back to the loop start.
    fn end_loop(&mut self) {
        let Some(record) = self.state.loops.pop() else {
            return;
        };
        for site in record.continues {
            self.patch_loop(site, record.start);
        }
        for site in record.breaks {
            self.patch_jump(site);
        }
    }

    /// Pops the locals declared inside the innermost loop without forgetting
    /// them; the code after the jump still sees them in scope.
    fn pop_loop_locals(&mut self, loop_depth: usize) {
        let count = self
            .state
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth.is_none_or(|d| d > loop_depth))
            .count();
        for _ in 0..count {
            self.emit_op(OpCode::Pop);
        }
    }

    // ── Declarations ─────────────────────────────────────────────────

    fn declaration(&mut self) {
        if self.matches(TokenKind::Fn) {
            self.fn_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration(true);
        } else if self.matches(TokenKind::Const) {
            self.var_declaration(false);
        } else if self.matches(TokenKind::Class) {
            self.error("classes are not supported");
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fn_declaration(&mut self) {
        let global = self.parse_variable("expected function name");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global, true);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.strings.intern(&self.previous.lexeme);
        self.begin_function(ObjFunction::new(Some(name)), kind);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "expected '(' after function name");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.state.function.arity += 1;
                if self.state.function.arity > MAX_ARITY {
                    self.error_at_current("can't have more than 255 parameters");
                }
                let param = self.parse_variable("expected parameter name");
                self.define_variable(param, true);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameters");
        self.consume(TokenKind::LeftBrace, "expected '{' before function body");
        self.block();

        let function = self.end_function();
        self.emit_constant(Value::from(function));
    }

    fn var_declaration(&mut self, assignable: bool) {
        let global = self.parse_variable("expected variable name");

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Null);
        }
        self.consume(TokenKind::Semicolon, "expected ';' after variable declaration");
        self.define_variable(global, assignable);
    }

    // ── Statements ───────────────────────────────────────────────────

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
        } else if self.matches(TokenKind::Break) {
            self.break_statement();
        } else if self.matches(TokenKind::Continue) {
            self.continue_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "expected '}' after block");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "expected ';' after value");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "expected ';' after expression");
        self.emit_op(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "expected ';' after return value");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "expected '(' after 'if'");
        self.expression();
        self.consume(TokenKind::RightParen, "expected ')' after condition");

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
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'");
        self.expression();
        self.consume(TokenKind::RightParen, "expected ')' after condition");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.begin_loop(loop_start);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
        self.end_loop();
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "expected '(' after 'for'");
        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::Var) {
            self.var_declaration(true);
        } else if self.matches(TokenKind::Const) {
            self.var_declaration(false);
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().len();
        let mut exit_jump = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "expected ';' after loop condition");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        // The increment runs after the body: jump over it on entry, and loop
        // back into it at the end of every iteration.
        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "expected ')' after for clauses");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.begin_loop(loop_start);
        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_loop();
        self.end_scope();
    }

    fn break_statement(&mut self) {
        let Some(loop_depth) = self.state.loops.last().map(|l| l.scope_depth) else {
            self.error("'break' outside of a loop");
            return;
        };
        self.consume(TokenKind::Semicolon, "expected ';' after 'break'");

        self.pop_loop_locals(loop_depth);
        let site = self.emit_jump(OpCode::Jump);
        if let Some(record) = self.state.loops.last_mut() {
            record.breaks.push(site);
        }
    }

    fn continue_statement(&mut self) {
        let Some(loop_depth) = self.state.loops.last().map(|l| l.scope_depth) else {
            self.error("'continue' outside of a loop");
            return;
        };
        self.consume(TokenKind::Semicolon, "expected ';' after 'continue'");

        self.pop_loop_locals(loop_depth);
        self.emit_op(OpCode::Loop);
        let site = self.chunk().len();
        self.emit_u16(u16::MAX);
        if let Some(record) = self.state.loops.last_mut() {
            record.continues.push(site);
        }
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("expected expression");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("invalid assignment target");
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "expected ')' after expression");
    }

    fn number(&mut self, _can_assign: bool) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::number(n)),
            Err(_) => self.error("invalid number literal"),
        }
    }

    fn string(&mut self, _can_assign: bool) {
        let text = self.strings.intern(self.previous.lexeme.trim_matches('"'));
        self.emit_constant(Value::from(text));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Null => self.emit_op(OpCode::Null),
            _ => {}
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme.clone();
        self.named_variable(&name, can_assign);
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => {}
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(rule(operator).precedence.next());

        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
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
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => {}
        }
    }

    fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_op_operand(OpCode::Call, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count = 0usize;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == MAX_ARITY {
                    self.error("can't have more than 255 arguments");
                }
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after arguments");
        u8::try_from(count).unwrap_or(u8::MAX)
    }

    /// Prefix/infix handler for tokens the language reserves but does not
    /// compile.
    fn unsupported(&mut self, _can_assign: bool) {
        let what = self.previous.lexeme.clone();
        self.error(&format!("'{what}' is not supported"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> Rc<ObjFunction> {
        let mut strings = Interner::new();
        match compile(source, &mut strings) {
            Ok(f) => f,
            Err(e) => panic!("unexpected compile error:\n{e}"),
        }
    }

    fn compile_err(source: &str) -> CompileErrors {
        let mut strings = Interner::new();
        match compile(source, &mut strings) {
            Ok(_) => panic!("expected compile error for: {source}"),
            Err(e) => e,
        }
    }

    fn first_function(script: &ObjFunction) -> Rc<ObjFunction> {
        script
            .chunk
            .constants
            .iter()
            .find_map(|c| c.as_function().cloned())
            .expect("no function constant")
    }

    const NULL: u8 = OpCode::Null as u8;
    const RETURN: u8 = OpCode::Return as u8;

    #[test]
    fn empty_program_returns_null() {
        let script = compile_ok("");
        assert_eq!(script.chunk.code, vec![NULL, RETURN]);
        assert_eq!(script.arity, 0);
        assert!(script.name.is_none());
    }

    #[test]
    fn equal_literals_share_one_constant() {
        let script = compile_ok("print 3.5; print 3.5;");
        assert_eq!(script.chunk.constants.len(), 1);

        let script = compile_ok(r#"print "hi"; print "hi";"#);
        assert_eq!(script.chunk.constants.len(), 1);
    }

    #[test]
    fn block_local_is_global_after_block() {
        let script = compile_ok("{ var x = 1; } print x;");
        assert_eq!(
            script.chunk.code,
            vec![
                OpCode::Constant as u8,
                0,
                OpCode::Pop as u8,
                OpCode::GetGlobal as u8,
                1,
                OpCode::Print as u8,
                NULL,
                RETURN,
            ]
        );
    }

    #[test]
    fn shadowed_local_resolves_to_outer_after_block() {
        let script = compile_ok("{ var a = 1; { var a = 2; print a; } print a; }");
        let code = &script.chunk.code;
        // inner print reads slot 2, outer print reads slot 1
        let reads: Vec<u8> = code
            .windows(2)
            .filter(|w| w[0] == OpCode::GetLocal as u8)
            .map(|w| w[1])
            .collect();
        assert_eq!(reads, vec![2, 1]);
    }

    #[test]
    fn self_reference_in_local_initializer() {
        let errors = compile_err("{ var a = a; }");
        assert_eq!(errors.len(), 1);
        let err = &errors.0[0];
        assert_eq!(err.message, "self-reference in initializer");
        assert_eq!(err.location, ErrorLocation::At("a".to_string()));
        assert_eq!(err.to_string(), "[line 1] Error at 'a': self-reference in initializer");
    }

    #[test]
    fn global_initializer_may_name_itself() {
        compile_ok("var a = a;");
    }

    #[test]
    fn redeclaration_in_same_scope() {
        let errors = compile_err("{ var a = 1; var a = 2; }");
        assert!(errors.0[0].message.contains("already declared"), "{errors}");
        compile_ok("{ var a = 1; { var a = 2; } }");
    }

    #[test]
    fn invalid_assignment_target() {
        let errors = compile_err("var a; var b; a + b = 3;");
        assert_eq!(errors.0[0].message, "invalid assignment target");
    }

    #[test]
    fn if_jumps_are_backpatched() {
        let script = compile_ok("if (true) print 1;");
        let code = &script.chunk.code;
        assert_eq!(code[0], OpCode::True as u8);
        assert_eq!(code[1], OpCode::JumpIfFalse as u8);
        // then-jump lands on the Pop at 11
        assert_eq!(script.chunk.read_u16(2), Some(7));
        assert_eq!(code[8], OpCode::Jump as u8);
        // else-jump lands just past that Pop
        assert_eq!(script.chunk.read_u16(9), Some(1));
        assert_eq!(code[11], OpCode::Pop as u8);
    }

    #[test]
    fn while_loops_back_to_condition() {
        let script = compile_ok("while (false) print 1;");
        let code = &script.chunk.code;
        let loop_at = code.iter().position(|&b| b == OpCode::Loop as u8).unwrap();
        let offset = script.chunk.read_u16(loop_at + 1).unwrap() as usize;
        assert_eq!(loop_at + 3 - offset, 0);
    }

    #[test]
    fn long_constant_operand_is_little_endian() {
        let source: String = (0..300).map(|i| format!("print {i};")).collect();
        let script = compile_ok(&source);
        assert_eq!(script.chunk.constants.len(), 300);
        let code = &script.chunk.code;
        let tail = &code[code.len() - 8..];
        assert_eq!(tail, &[OpCode::ConstantLong as u8, 0x2B, 0x01, 0, 0, OpCode::Print as u8, NULL, RETURN]);
    }

    #[test]
    fn params_occupy_slots_one_and_two() {
        let script = compile_ok("fn add(a, b) { return a + b; }");
        let add = first_function(&script);
        assert_eq!(add.arity, 2);
        assert_eq!(add.name.as_ref().map(|n| n.as_str()), Some("add"));
        assert_eq!(
            add.chunk.code,
            vec![OpCode::GetLocal as u8, 1, OpCode::GetLocal as u8, 2, OpCode::Add as u8, RETURN]
        );
    }

    #[test]
    fn implicit_return_when_jump_lands_at_end() {
        let script = compile_ok("fn f(x) { if (x) { return 1; } else { return 2; } }");
        let f = first_function(&script);
        let code = &f.chunk.code;
        assert_eq!(&code[code.len() - 2..], &[NULL, RETURN]);
    }

    #[test]
    fn break_outside_loop() {
        let errors = compile_err("break;");
        assert_eq!(errors.0[0].message, "'break' outside of a loop");
        let errors = compile_err("continue;");
        assert_eq!(errors.0[0].message, "'continue' outside of a loop");
    }

    #[test]
    fn enclosing_local_is_rejected() {
        let errors = compile_err("fn outer() { var x = 1; fn inner() { return x; } }");
        assert_eq!(errors.0[0].message, "closures are not supported");
    }

    #[test]
    fn reports_several_errors() {
        let errors = compile_err("var = 1;\nprint ;\nprint 2;");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.0[0].line, 1);
        assert_eq!(errors.0[1].line, 2);
    }

    #[test]
    fn error_at_end_of_input() {
        let errors = compile_err("print 1");
        let err = &errors.0[0];
        assert_eq!(err.location, ErrorLocation::End);
        assert_eq!(err.to_string(), "[line 1] Error at end: expected ';' after value");
    }

    #[test]
    fn scanner_errors_surface_as_compile_errors() {
        let errors = compile_err("print \"open;");
        let err = &errors.0[0];
        assert_eq!(err.location, ErrorLocation::Lexical);
        assert_eq!(err.to_string(), "[line 1] Error: unterminated string");
    }

    #[test]
    fn reserved_tokens_are_rejected() {
        assert!(compile_err("class Foo {}").0[0].message.contains("classes"));
        assert!(compile_err("print this;").0[0].message.contains("'this'"));
        assert!(compile_err("var a; print a.b;").0[0].message.contains("'.'"));
    }

    #[test]
    fn too_many_parameters() {
        let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
        let source = format!("fn f({}) {{}}", params.join(", "));
        let errors = compile_err(&source);
        assert_eq!(errors.0[0].message, "can't have more than 255 parameters");
    }

    #[test]
    fn forward_jump_over_too_much_code() {
        let source = format!("if (true) {{ {} }}", "print 1;".repeat(30_000));
        let errors = compile_err(&source);
        assert_eq!(errors.0[0].message, "too much code to jump over");
        assert_eq!(errors.0[0].location, ErrorLocation::At("}".to_string()));
    }

    #[test]
    fn loop_body_too_large() {
        let source = format!("while (true) {{ {} }}", "print 1;".repeat(30_000));
        let errors = compile_err(&source);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.0[0].message, "loop body too large");
    }

    #[test]
    fn local_slots_run_out() {
        let block = |n: usize| {
            let vars: String = (0..n).map(|i| format!("var l{i} = {i}; ")).collect();
            format!("{{ {vars}}}")
        };
        // slot 0 is reserved, so 255 named locals fit
        compile_ok(&block(MAX_LOCALS - 1));

        let errors = compile_err(&block(MAX_LOCALS));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.0[0].message, "too many local variables in function");
        assert_eq!(errors.0[0].location, ErrorLocation::At("l255".to_string()));
    }

    #[test]
    fn const_declaration_emits_make_const() {
        let script = compile_ok("const x = 1;");
        assert_eq!(
            script.chunk.code,
            vec![OpCode::Constant as u8, 1, OpCode::MakeConst as u8, OpCode::DefineGlobal as u8, 0, NULL, RETURN]
        );
    }
}
