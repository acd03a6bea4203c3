// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! Shared types for the bytecode compiler.

use crate::chunk::Chunk;
use crate::object::Handle;

/// Local-variable slots are addressed by one byte, so a function holds at
/// most this many locals (slot 0 included).
pub const MAX_LOCALS: usize = 256;

/// Upvalue indices are one byte as well.
pub const MAX_UPVALUES: usize = 256;

/// Operator precedence, lowest to highest. Parsing at precedence P consumes
/// every infix operator whose precedence is at least P.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    /// =
    Assignment,
    /// or
    Or,
    /// and
    And,
    /// == !=
    Equality,
    /// < > <= >=
    Comparison,
    /// + -
    Term,
    /// * /
    Factor,
    /// ! -
    Unary,
    /// . ()
    Call,
    Primary,
}

impl Precedence {
    /// The next-higher level; used to make binary operators
    /// left-associative.
    pub fn next(self) -> Precedence {
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
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

/// What kind of function body is being compiled. Determines slot 0
/// (`this` for methods and initializers) and the return rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// A local variable during compilation.
#[derive(Debug, Clone, Copy)]
pub struct Local<'src> {
    pub name: &'src str,
    /// Scope depth, or -1 while the initializer is still being compiled,
    /// which is what rejects `var a = a;`.
    pub depth: i32,
    /// Set when some nested function captures this local, so the slot is
    /// closed into an upvalue instead of popped at scope end.
    pub is_captured: bool,
}

/// A captured variable recorded on the capturing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Local slot in the enclosing function (is_local) or index into the
    /// enclosing function's own upvalues.
    pub index: u8,
    pub is_local: bool,
}

/// Per-function compiler state. Nested function declarations push one of
/// these; the vector of live states is the enclosing-compiler chain the GC
/// traces during compilation.
#[derive(Debug)]
pub struct FunctionState<'src> {
    /// Interned function name; `None` for the top-level script.
    pub name: Option<Handle>,
    pub kind: FunctionKind,
    /// Declared parameter count. Counted past 255 only to keep parsing
    /// after the too-many-parameters error.
    pub arity: usize,
    pub chunk: Chunk,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<UpvalueDesc>,
    pub scope_depth: i32,
}

impl<'src> FunctionState<'src> {
    pub fn new(kind: FunctionKind, name: Option<Handle>) -> Self {
        // Slot 0 belongs to the callee: `this` inside methods and
        // initializers, unnameable otherwise.
        let slot_zero = Local {
            name: match kind {
                FunctionKind::Method | FunctionKind::Initializer => "this",
                _ => "",
            },
            depth: 0,
            is_captured: false,
        };
        FunctionState {
            name,
            kind,
            arity: 0,
            chunk: Chunk::new(),
            locals: vec![slot_zero],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

/// Per-class compiler state, stacked for nested class declarations.
#[derive(Debug, Clone, Copy)]
pub struct ClassState {
    pub has_superclass: bool,
}
