// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! Single-pass compiler: a Pratt parser that emits bytecode directly.
//!
//! There is no AST. Each token's prefix/infix behaviour compiles its
//! subexpression straight into the current function's chunk, and statement
//! forms emit their control flow with forward jumps patched once the target
//! is known. Nested function declarations stack a fresh
//! [`FunctionState`](types::FunctionState); that stack is also the
//! enclosing-function chain used for upvalue resolution and traced as GC
//! roots when a compile-time allocation triggers a collection.

pub mod error;
pub mod types;

use vesper_lexer::{Scanner, Token, TokenKind};

use crate::debug;
use crate::object::{FunctionObject, Handle, Obj};
use crate::opcode::Op;
use crate::value::Value;
use crate::vm::Vm;

use error::{CompileError, CompileReport, ErrorLocation};
use types::{
    ClassState, FunctionKind, FunctionState, Local, MAX_LOCALS, MAX_UPVALUES, Precedence,
    UpvalueDesc,
};

/// Compile a source text into a top-level script function on the VM's heap.
///
/// On failure every recorded error is returned; the partial function is
/// discarded by the next collection.
pub fn compile(source: &str, vm: &mut Vm) -> Result<Handle, CompileReport> {
    let mut compiler = Compiler::new(source, vm);
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    let (function, _) = compiler.end_function();

    if compiler.parser.errors.is_empty() {
        Ok(function)
    } else {
        Err(CompileReport {
            errors: compiler.parser.errors,
        })
    }
}

struct Parser<'src> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    /// Suppresses error reporting until the next synchronisation point.
    panic_mode: bool,
    errors: Vec<CompileError>,
}

struct Compiler<'src, 'vm> {
    parser: Parser<'src>,
    /// Function compilation states, innermost last. Never empty.
    states: Vec<FunctionState<'src>>,
    /// Enclosing class declarations, innermost last.
    classes: Vec<ClassState>,
    vm: &'vm mut Vm,
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    fn new(source: &'src str, vm: &'vm mut Vm) -> Self {
        Compiler {
            parser: Parser {
                scanner: Scanner::new(source),
                current: Token::empty(),
                previous: Token::empty(),
                panic_mode: false,
                errors: Vec::new(),
            },
            states: vec![FunctionState::new(FunctionKind::Script, None)],
            classes: Vec::new(),
            vm,
        }
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn advance(&mut self) {
        self.parser.previous = self.parser.current;
        loop {
            self.parser.current = self.parser.scanner.next_token();
            if self.parser.current.kind != TokenKind::Error {
                break;
            }
            let message = self.parser.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.parser.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.parser.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn synthetic_token(&self, text: &'static str) -> Token<'src> {
        Token {
            kind: TokenKind::Identifier,
            lexeme: text,
            line: self.parser.previous.line,
        }
    }

    // =========================================================================
    // Error reporting
    // =========================================================================

    fn error(&mut self, message: &str) {
        self.error_at(self.parser.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.parser.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.parser.panic_mode {
            return;
        }
        self.parser.panic_mode = true;
        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::End,
            TokenKind::Error => ErrorLocation::None,
            _ => ErrorLocation::Lexeme(token.lexeme.to_string()),
        };
        self.parser.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    /// Leave panic mode by skipping to the next statement boundary: just
    /// past a semicolon, or just before a token that begins a declaration
    /// or statement.
    fn synchronize(&mut self) {
        self.parser.panic_mode = false;
        while self.parser.current.kind != TokenKind::Eof {
            if self.parser.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.parser.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
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
    // State access and emission
    // =========================================================================

    fn state(&self) -> &FunctionState<'src> {
        self.states.last().expect("no active function state")
    }

    fn state_mut(&mut self) -> &mut FunctionState<'src> {
        self.states.last_mut().expect("no active function state")
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.parser.previous.line;
        self.state_mut().chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: Op) {
        self.emit_byte(op as u8);
    }

    fn emit_ops(&mut self, first: Op, second: Op) {
        self.emit_op(first);
        self.emit_op(second);
    }

    fn emit_op_byte(&mut self, op: Op, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    /// The implicit return: initializers return `this` (slot 0), everything
    /// else returns nil.
    fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Initializer {
            self.emit_op_byte(Op::GetLocal, 0);
        } else {
            self.emit_op(Op::Nil);
        }
        self.emit_op(Op::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.state_mut().chunk.add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let constant = self.make_constant(value);
        self.emit_op_byte(Op::Constant, constant);
    }

    /// Emit a forward jump with a placeholder offset; returns the offset of
    /// the placeholder for [`Compiler::patch_jump`].
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.state().chunk.current_offset() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // -2 skips the operand bytes themselves.
        let jump = self.state().chunk.current_offset() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        let chunk = &mut self.state_mut().chunk;
        chunk.code[offset] = bytes[0];
        chunk.code[offset + 1] = bytes[1];
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(Op::Loop);
        // +2 accounts for the operand of the Loop instruction itself.
        let offset = self.state().chunk.current_offset() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    // =========================================================================
    // Heap interaction
    // =========================================================================

    /// Intern a string, collecting first if the heap wants it. Collection
    /// at this point is safe: the compiler chain below is marked as roots.
    fn intern(&mut self, chars: &str) -> Handle {
        self.maybe_collect();
        self.vm.heap.intern(chars)
    }

    /// Compile-time GC gate. Marks every in-progress function's constants
    /// and name, then runs the VM's shared collection (which adds the
    /// runtime roots: globals, interned `init`, and for a live REPL the
    /// stack contents).
    fn maybe_collect(&mut self) {
        if !self.vm.heap.should_collect() {
            return;
        }
        for state in &self.states {
            if let Some(name) = state.name {
                self.vm.heap.mark_object(name);
            }
            for &constant in &state.chunk.constants {
                self.vm.heap.mark_value(constant);
            }
        }
        self.vm.collect_garbage();
    }

    /// Finish the innermost function: emit the implicit return, move the
    /// chunk into a heap function object, and hand back the upvalue
    /// descriptors the enclosing function must emit after `Op::Closure`.
    fn end_function(&mut self) -> (Handle, Vec<UpvalueDesc>) {
        self.emit_return();
        self.maybe_collect();
        let state = self.states.pop().expect("no active function state");
        let upvalue_count = state.upvalues.len();
        let function = self.vm.heap.allocate(Obj::Function(FunctionObject {
            name: state.name,
            arity: state.arity.min(255) as u8,
            upvalue_count,
            chunk: state.chunk,
        }));

        if self.vm.options.print_code && self.parser.errors.is_empty() {
            let store = self.vm.heap.store();
            let func = store.function(function);
            let label = match func.name {
                Some(name) => store.string(name).chars.clone(),
                None => "<script>".to_string(),
            };
            let _ = debug::disassemble_chunk(&mut std::io::stderr(), &func.chunk, store, &label);
        }

        (function, state.upvalues)
    }

    // =========================================================================
    // Declarations and statements
    // =========================================================================

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.parser.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.parser.previous;
        let name_constant = self.identifier_constant(class_name);
        self.declare_variable();

        self.emit_op_byte(Op::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassState {
            has_superclass: false,
        });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            self.variable(false);

            if class_name.lexeme == self.parser.previous.lexeme {
                self.error("A class can't inherit from itself.");
            }

            // `super` becomes an ordinary scoped local holding the
            // superclass, so closures inside methods can capture it.
            self.begin_scope();
            self.add_local(self.synthetic_token("super"));
            self.define_variable(0);

            self.named_variable(class_name, false);
            self.emit_op(Op::Inherit);
            self.classes
                .last_mut()
                .expect("class state just pushed")
                .has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(Op::Pop);

        if self.classes.last().expect("class state").has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.parser.previous);
        let kind = if self.parser.previous.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);
        self.emit_op_byte(Op::Method, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Initialised immediately so the body may refer to itself.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.intern(self.parser.previous.lexeme);
        self.states.push(FunctionState::new(kind, Some(name)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.state_mut().arity += 1;
                if self.state().arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        // No end_scope: the whole state is discarded, and the frame's
        // slots are reclaimed wholesale by Op::Return at runtime.
        let (function, upvalues) = self.end_function();
        let constant = self.make_constant(Value::Obj(function));
        self.emit_op_byte(Op::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(Op::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
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
        self.emit_op(Op::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(Op::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(Op::JumpIfFalse);
        self.emit_op(Op::Pop);
        self.statement();
        let else_jump = self.emit_jump(Op::Jump);

        self.patch_jump(then_jump);
        self.emit_op(Op::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.state().chunk.current_offset();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(Op::JumpIfFalse);
        self.emit_op(Op::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(Op::Pop);
    }

    fn for_statement(&mut self) {
        // The whole clause is one scope so a `var` initialiser is local to
        // the loop.
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // No initialiser.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.state().chunk.current_offset();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(Op::JumpIfFalse));
            self.emit_op(Op::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            // The increment runs after the body, so jump over it now and
            // loop back to it from the body's end.
            let body_jump = self.emit_jump(Op::Jump);
            let increment_start = self.state().chunk.current_offset();
            self.expression();
            self.emit_op(Op::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(Op::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.state().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.state().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(Op::Return);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    // =========================================================================
    // Scopes and variables
    // =========================================================================

    fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    /// Discard this scope's locals in reverse declaration order. Captured
    /// slots are closed into their upvalues instead of popped.
    fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        loop {
            let state = self.state();
            let captured = match state.locals.last() {
                Some(local) if local.depth > state.scope_depth => local.is_captured,
                _ => break,
            };
            if captured {
                self.emit_op(Op::CloseUpvalue);
            } else {
                self.emit_op(Op::Pop);
            }
            self.state_mut().locals.pop();
        }
    }

    /// Consume an identifier and prepare its variable: declared as a local
    /// in block scope, or returned as a name constant for globals.
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.parser.previous)
    }

    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        let handle = self.intern(name.lexeme);
        self.make_constant(Value::Obj(handle))
    }

    /// Record a local as declared but uninitialised (depth -1). Globals are
    /// late-bound and never declared.
    fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.parser.previous;

        let state = self.state();
        let mut duplicate = false;
        for local in state.locals.iter().rev() {
            if local.depth != -1 && local.depth < state.scope_depth {
                break;
            }
            if local.name == name.lexeme {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.state().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state_mut().locals.push(Local {
            name: name.lexeme,
            depth: -1,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let state = self.state_mut();
        if state.scope_depth == 0 {
            return;
        }
        state
            .locals
            .last_mut()
            .expect("mark_initialized with no local declared")
            .depth = state.scope_depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(Op::DefineGlobal, global);
    }

    /// Find `name` among a function state's locals, newest first so inner
    /// shadowing wins.
    fn resolve_local(&mut self, state_index: usize, name: &str) -> Option<u8> {
        let mut resolved = None;
        let mut uninitialized = false;
        for (slot, local) in self.states[state_index].locals.iter().enumerate().rev() {
            if local.name == name {
                resolved = Some(slot as u8);
                uninitialized = local.depth == -1;
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        resolved
    }

    /// Resolve `name` as a captured variable of the function at
    /// `state_index`, walking outward through the enclosing chain. Each
    /// level records the capture so the runtime closure chain matches the
    /// lexical one.
    fn resolve_upvalue(&mut self, state_index: usize, name: &str) -> Option<u8> {
        if state_index == 0 {
            return None;
        }
        let enclosing = state_index - 1;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(state_index, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(state_index, upvalue, false));
        }

        None
    }

    fn add_upvalue(&mut self, state_index: usize, index: u8, is_local: bool) -> u8 {
        let desc = UpvalueDesc { index, is_local };
        let upvalues = &self.states[state_index].upvalues;

        if let Some(existing) = upvalues.iter().position(|u| *u == desc) {
            return existing as u8;
        }
        if upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }

        self.states[state_index].upvalues.push(desc);
        (self.states[state_index].upvalues.len() - 1) as u8
    }

    /// Compile a read of `name`, or a write when followed by `=` in an
    /// assignable position. Locals, then upvalues, then globals.
    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let current = self.states.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(current, name.lexeme) {
            (Op::GetLocal, Op::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(current, name.lexeme) {
            (Op::GetUpvalue, Op::SetUpvalue, slot)
        } else {
            let constant = self.identifier_constant(name);
            (Op::GetGlobal, Op::SetGlobal, constant)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }

    // =========================================================================
    // Expressions (Pratt parsing)
    // =========================================================================

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Core Pratt loop: dispatch the prefix rule for the token just
    /// consumed, then fold infix operators while their precedence holds.
    /// Only the lowest levels may consume a following `=`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.parser.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= infix_precedence(self.parser.current.kind) {
            self.advance();
            self.infix_rule(self.parser.previous.kind, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Returns false when the token has no prefix rule.
    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::Nil | TokenKind::True | TokenKind::False => self.literal(),
            TokenKind::This => self.this_(),
            TokenKind::Super => self.super_(),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::And => self.and_(),
            TokenKind::Or => self.or_(),
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::BangEqual
            | TokenKind::EqualEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(),
            _ => unreachable!("token without infix rule dispatched as infix"),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self) {
        match self.parser.previous.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        let lexeme = self.parser.previous.lexeme;
        // Trim the surrounding quotes; there are no escape sequences.
        let contents = &lexeme[1..lexeme.len() - 1];
        let handle = self.intern(contents);
        self.emit_constant(Value::Obj(handle));
    }

    fn literal(&mut self) {
        match self.parser.previous.kind {
            TokenKind::False => self.emit_op(Op::False),
            TokenKind::True => self.emit_op(Op::True),
            TokenKind::Nil => self.emit_op(Op::Nil),
            _ => unreachable!("literal rule on non-literal token"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.parser.previous, can_assign);
    }

    fn this_(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        // `this` resolves like any local: methods declare it in slot 0.
        self.variable(false);
    }

    fn super_(&mut self) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.parser.previous);

        self.named_variable(self.synthetic_token("this"), false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(self.synthetic_token("super"), false);
            self.emit_op_byte(Op::SuperInvoke, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable(self.synthetic_token("super"), false);
            self.emit_op_byte(Op::GetSuper, name);
        }
    }

    fn unary(&mut self) {
        let operator = self.parser.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(Op::Not),
            TokenKind::Minus => self.emit_op(Op::Negate),
            _ => unreachable!("unary rule on non-unary token"),
        }
    }

    /// Left-associative: the right operand parses one level higher. The
    /// negated comparisons compile as their complement plus `Not`.
    fn binary(&mut self) {
        let operator = self.parser.previous.kind;
        self.parse_precedence(infix_precedence(operator).next());

        match operator {
            TokenKind::BangEqual => self.emit_ops(Op::Equal, Op::Not),
            TokenKind::EqualEqual => self.emit_op(Op::Equal),
            TokenKind::Greater => self.emit_op(Op::Greater),
            TokenKind::GreaterEqual => self.emit_ops(Op::Less, Op::Not),
            TokenKind::Less => self.emit_op(Op::Less),
            TokenKind::LessEqual => self.emit_ops(Op::Greater, Op::Not),
            TokenKind::Plus => self.emit_op(Op::Add),
            TokenKind::Minus => self.emit_op(Op::Subtract),
            TokenKind::Star => self.emit_op(Op::Multiply),
            TokenKind::Slash => self.emit_op(Op::Divide),
            _ => unreachable!("binary rule on non-binary token"),
        }
    }

    /// Short-circuit `and`: on a falsey left operand, skip the right and
    /// leave the left as the result.
    fn and_(&mut self) {
        let end_jump = self.emit_jump(Op::JumpIfFalse);
        self.emit_op(Op::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    /// Short-circuit `or`: a truthy left operand is the result.
    fn or_(&mut self) {
        let else_jump = self.emit_jump(Op::JumpIfFalse);
        let end_jump = self.emit_jump(Op::Jump);

        self.patch_jump(else_jump);
        self.emit_op(Op::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op_byte(Op::Call, arg_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.parser.previous);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(Op::SetProperty, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_op_byte(Op::Invoke, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_op_byte(Op::GetProperty, name);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(255) as u8
    }
}

fn infix_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::LeftParen | TokenKind::Dot => Precedence::Call,
        TokenKind::Star | TokenKind::Slash => Precedence::Factor,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less | TokenKind::LessEqual => {
            Precedence::Comparison
        }
        TokenKind::BangEqual | TokenKind::EqualEqual => Precedence::Equality,
        TokenKind::And => Precedence::And,
        TokenKind::Or => Precedence::Or,
        _ => Precedence::None,
    }
}
