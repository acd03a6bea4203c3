// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! The stack-based virtual machine.
//!
//! One [`Vm`] value owns everything: the value stack, the call-frame stack,
//! the globals table, and the heap (which owns the string intern pool).
//! There is no global state, so independent interpreters coexist freely.
//!
//! The dispatch loop reads one opcode at a time through the current frame's
//! instruction pointer. Opcode bodies that can fail return a
//! [`RuntimeError`]; the loop turns the first failure into a
//! [`RuntimeErrorReport`] carrying a stack trace, resets the stack, and
//! stops.

pub mod error;
pub mod frame;

use std::io::{self, Write};
use std::time::Instant;

use crate::compiler;
use crate::debug;
use crate::heap::Heap;
use crate::object::{
    BoundMethodObject, ClassObject, ClosureObject, Handle, InstanceObject, NativeFn, NativeObject,
    Obj, UpvalueObject, UpvalueState,
};
use crate::opcode::Op;
use crate::table::Table;
use crate::value::{Value, format_value};

pub use error::{InterpretError, RuntimeError, RuntimeErrorReport, TraceLine};
pub use frame::CallFrame;

/// Maximum call depth.
pub const FRAMES_MAX: usize = 64;

/// Value-stack capacity reserved up front: one full window of 256 slots
/// per frame.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// Diagnostic switches, all off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmOptions {
    /// Dump each instruction and the stack to stderr while executing.
    pub trace_execution: bool,
    /// Disassemble each function to stderr as it finishes compiling.
    pub print_code: bool,
    /// Collect on every allocation instead of waiting for the threshold.
    pub stress_gc: bool,
    /// Log collection begin/end and byte counts to stderr.
    pub log_gc: bool,
}

enum Flow {
    Continue,
    Done,
}

/// A Vesper interpreter instance.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) options: VmOptions,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Head of the open-upvalue list, sorted strictly descending by the
    /// stack slot each upvalue observes.
    open_upvalues: Option<Handle>,
    /// Interned "init", looked up on every class construction.
    init_string: Handle,
    started_at: Instant,
    out: Box<dyn Write>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> Self {
        let mut heap = Heap::new(options.stress_gc);
        let init_string = heap.intern("init");
        let mut vm = Vm {
            heap,
            options,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: None,
            init_string,
            started_at: Instant::now(),
            out: Box::new(io::stdout()),
        };
        vm.define_native("clock", clock_native);
        vm
    }

    /// Redirect `print` output, e.g. into a buffer for tests.
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Compile and execute one source text. Globals and interned strings
    /// persist across calls, which is what keeps a REPL session stateful.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = compiler::compile(source, self)?;

        // Root the function across the closure allocation.
        self.push(Value::Obj(function));
        let closure = self.alloc(Obj::Closure(ClosureObject {
            function,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure));
        self.call_closure(closure, 0)
            .map_err(|error| InterpretError::Runtime(self.runtime_error(error)))?;

        self.run().map_err(InterpretError::Runtime)
    }

    /// Bytes currently charged against the collection threshold.
    pub fn bytes_allocated(&self) -> usize {
        self.heap.bytes_allocated()
    }

    /// Heap objects currently alive (reachable or not yet collected).
    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    fn run(&mut self) -> Result<(), RuntimeErrorReport> {
        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => return Ok(()),
                Err(error) => return Err(self.runtime_error(error)),
            }
        }
    }

    fn step(&mut self) -> error::Result<Flow> {
        if self.options.trace_execution {
            self.trace_instruction();
        }

        let op = Op::try_from(self.read_byte()).expect("invalid opcode in chunk");
        match op {
            Op::Constant => {
                let value = self.read_constant();
                self.push(value);
            }
            Op::Nil => self.push(Value::Nil),
            Op::True => self.push(Value::Bool(true)),
            Op::False => self.push(Value::Bool(false)),
            Op::Pop => {
                self.pop();
            }

            Op::GetLocal => {
                let slot = self.read_byte() as usize;
                let value = self.stack[self.frame().slots + slot];
                self.push(value);
            }
            Op::SetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.frame().slots;
                // Assignment is an expression: the value stays on top.
                self.stack[base + slot] = self.peek(0);
            }

            Op::GetGlobal => {
                let name = self.read_string();
                let hash = self.heap.store.string(name).hash;
                match self.globals.get(name, hash) {
                    Some(value) => self.push(value),
                    None => return Err(self.undefined_variable(name)),
                }
            }
            Op::DefineGlobal => {
                let name = self.read_string();
                let hash = self.heap.store.string(name).hash;
                let value = self.peek(0);
                self.globals.set(name, hash, value);
                self.pop();
            }
            Op::SetGlobal => {
                let name = self.read_string();
                let hash = self.heap.store.string(name).hash;
                let value = self.peek(0);
                if self.globals.set(name, hash, value) {
                    // The set created the entry; roll it back before
                    // erroring so the name stays undefined.
                    self.globals.delete(name, hash);
                    return Err(self.undefined_variable(name));
                }
            }

            Op::GetUpvalue => {
                let slot = self.read_byte() as usize;
                let upvalue = self.heap.store.closure(self.frame().closure).upvalues[slot];
                let value = match self.heap.store.upvalue(upvalue).state {
                    UpvalueState::Open(stack_slot) => self.stack[stack_slot],
                    UpvalueState::Closed(value) => value,
                };
                self.push(value);
            }
            Op::SetUpvalue => {
                let slot = self.read_byte() as usize;
                let upvalue = self.heap.store.closure(self.frame().closure).upvalues[slot];
                let value = self.peek(0);
                match self.heap.store.upvalue(upvalue).state {
                    UpvalueState::Open(stack_slot) => self.stack[stack_slot] = value,
                    UpvalueState::Closed(_) => {
                        self.heap.store.upvalue_mut(upvalue).state = UpvalueState::Closed(value);
                    }
                }
            }

            Op::GetProperty => {
                let name = self.read_string();
                let instance = match self.instance_at(0) {
                    Some(handle) => handle,
                    None => return Err(RuntimeError::OnlyInstancesHaveProperties),
                };
                let hash = self.heap.store.string(name).hash;
                if let Some(value) = self.heap.store.instance(instance).fields.get(name, hash) {
                    self.pop();
                    self.push(value);
                } else {
                    let class = self.heap.store.instance(instance).class;
                    self.bind_method(class, name)?;
                }
            }
            Op::SetProperty => {
                let name = self.read_string();
                let instance = match self.instance_at(1) {
                    Some(handle) => handle,
                    None => return Err(RuntimeError::OnlyInstancesHaveFields),
                };
                let hash = self.heap.store.string(name).hash;
                let value = self.peek(0);
                self.heap
                    .store
                    .instance_mut(instance)
                    .fields
                    .set(name, hash, value);
                let value = self.pop();
                self.pop();
                self.push(value);
            }
            Op::GetSuper => {
                let name = self.read_string();
                let superclass = match self.pop() {
                    Value::Obj(handle) => handle,
                    _ => unreachable!("super slot holds a class"),
                };
                self.bind_method(superclass, name)?;
            }

            Op::Equal => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a == b));
            }
            Op::Greater => self.numeric_binary(|a, b| Value::Bool(a > b))?,
            Op::Less => self.numeric_binary(|a, b| Value::Bool(a < b))?,
            Op::Add => self.add()?,
            Op::Subtract => self.numeric_binary(|a, b| Value::Number(a - b))?,
            Op::Multiply => self.numeric_binary(|a, b| Value::Number(a * b))?,
            Op::Divide => self.numeric_binary(|a, b| Value::Number(a / b))?,
            Op::Not => {
                let value = self.pop();
                self.push(Value::Bool(value.is_falsey()));
            }
            Op::Negate => match self.peek(0) {
                Value::Number(n) => {
                    self.pop();
                    self.push(Value::Number(-n));
                }
                _ => return Err(RuntimeError::OperandMustBeNumber),
            },

            Op::Print => {
                let value = self.pop();
                let text = format_value(value, self.heap.store());
                let _ = writeln!(self.out, "{}", text);
            }

            Op::Jump => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip += offset;
            }
            Op::JumpIfFalse => {
                let offset = self.read_short() as usize;
                if self.peek(0).is_falsey() {
                    self.frame_mut().ip += offset;
                }
            }
            Op::Loop => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip -= offset;
            }

            Op::Call => {
                let arg_count = self.read_byte() as usize;
                self.call_value(self.peek(arg_count), arg_count)?;
            }
            Op::Invoke => {
                let name = self.read_string();
                let arg_count = self.read_byte() as usize;
                self.invoke(name, arg_count)?;
            }
            Op::SuperInvoke => {
                let name = self.read_string();
                let arg_count = self.read_byte() as usize;
                let superclass = match self.pop() {
                    Value::Obj(handle) => handle,
                    _ => unreachable!("super slot holds a class"),
                };
                self.invoke_from_class(superclass, name, arg_count)?;
            }

            Op::Closure => {
                let function = match self.read_constant() {
                    Value::Obj(handle) => handle,
                    _ => unreachable!("closure operand is a function constant"),
                };
                let upvalue_count = self.heap.store.function(function).upvalue_count;
                let closure = self.alloc(Obj::Closure(ClosureObject {
                    function,
                    upvalues: Vec::with_capacity(upvalue_count),
                }));
                // On the stack before the captures below allocate.
                self.push(Value::Obj(closure));
                for _ in 0..upvalue_count {
                    let is_local = self.read_byte() == 1;
                    let index = self.read_byte() as usize;
                    let upvalue = if is_local {
                        let base = self.frame().slots;
                        self.capture_upvalue(base + index)
                    } else {
                        self.heap.store.closure(self.frame().closure).upvalues[index]
                    };
                    self.heap.store.closure_mut(closure).upvalues.push(upvalue);
                }
            }
            Op::CloseUpvalue => {
                self.close_upvalues(self.stack.len() - 1);
                self.pop();
            }

            Op::Return => {
                let result = self.pop();
                let frame = self.frames.pop().expect("no active call frame");
                self.close_upvalues(frame.slots);
                if self.frames.is_empty() {
                    // The script closure itself.
                    self.pop();
                    return Ok(Flow::Done);
                }
                self.stack.truncate(frame.slots);
                self.push(result);
            }

            Op::Class => {
                let name = self.read_string();
                let class = self.alloc(Obj::Class(ClassObject {
                    name,
                    methods: Table::new(),
                }));
                self.push(Value::Obj(class));
            }
            Op::Inherit => {
                let superclass = match self.peek(1) {
                    Value::Obj(handle) if matches!(self.heap.store.get(handle), Obj::Class(_)) => {
                        handle
                    }
                    _ => return Err(RuntimeError::SuperclassMustBeClass),
                };
                let subclass = match self.peek(0) {
                    Value::Obj(handle) => handle,
                    _ => unreachable!("inherit target is a class"),
                };
                let methods = self.heap.store.class(superclass).methods.clone();
                self.heap
                    .store
                    .class_mut(subclass)
                    .methods
                    .extend_from(&methods);
                self.pop();
            }
            Op::Method => {
                let name = self.read_string();
                let hash = self.heap.store.string(name).hash;
                let method = self.peek(0);
                let class = match self.peek(1) {
                    Value::Obj(handle) => handle,
                    _ => unreachable!("method target is a class"),
                };
                self.heap
                    .store
                    .class_mut(class)
                    .methods
                    .set(name, hash, method);
                self.pop();
            }
        }

        Ok(Flow::Continue)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_value(&mut self, callee: Value, arg_count: usize) -> error::Result<()> {
        if let Value::Obj(handle) = callee {
            match self.heap.store.get(handle) {
                Obj::Closure(_) => return self.call_closure(handle, arg_count),

                Obj::BoundMethod(bound) => {
                    let receiver = bound.receiver;
                    let method = bound.method;
                    let slot = self.stack.len() - arg_count - 1;
                    self.stack[slot] = receiver;
                    return self.call_closure(method, arg_count);
                }

                Obj::Class(_) => {
                    let slot = self.stack.len() - arg_count - 1;
                    let instance = self.alloc(Obj::Instance(InstanceObject {
                        class: handle,
                        fields: Table::new(),
                    }));
                    self.stack[slot] = Value::Obj(instance);

                    let init_hash = self.heap.store.string(self.init_string).hash;
                    let initializer = self
                        .heap
                        .store
                        .class(handle)
                        .methods
                        .get(self.init_string, init_hash);
                    return match initializer {
                        Some(Value::Obj(init)) => self.call_closure(init, arg_count),
                        Some(_) => unreachable!("initializer is a closure"),
                        None if arg_count != 0 => Err(RuntimeError::Arity {
                            expected: 0,
                            got: arg_count,
                        }),
                        None => Ok(()),
                    };
                }

                Obj::Native(native) => {
                    let function = native.function;
                    let start = self.stack.len() - arg_count;
                    let result = function(&*self, &self.stack[start..]);
                    self.stack.truncate(start - 1);
                    self.push(result);
                    return Ok(());
                }

                _ => {}
            }
        }
        Err(RuntimeError::NotCallable)
    }

    fn call_closure(&mut self, closure: Handle, arg_count: usize) -> error::Result<()> {
        let function = self.heap.store.closure(closure).function;
        let arity = self.heap.store.function(function).arity as usize;
        if arg_count != arity {
            return Err(RuntimeError::Arity {
                expected: arity,
                got: arg_count,
            });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.frames
            .push(CallFrame::new(closure, self.stack.len() - arg_count - 1));
        Ok(())
    }

    /// `receiver.name(args)` without materialising a bound method. A field
    /// shadowing a method falls back to a plain call of the field value.
    fn invoke(&mut self, name: Handle, arg_count: usize) -> error::Result<()> {
        let instance = match self.instance_at(arg_count) {
            Some(handle) => handle,
            None => return Err(RuntimeError::OnlyInstancesHaveMethods),
        };

        let hash = self.heap.store.string(name).hash;
        if let Some(field) = self.heap.store.instance(instance).fields.get(name, hash) {
            let slot = self.stack.len() - arg_count - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }

        let class = self.heap.store.instance(instance).class;
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: Handle,
        name: Handle,
        arg_count: usize,
    ) -> error::Result<()> {
        let hash = self.heap.store.string(name).hash;
        match self.heap.store.class(class).methods.get(name, hash) {
            Some(Value::Obj(method)) => self.call_closure(method, arg_count),
            Some(_) => unreachable!("method table holds closures"),
            None => Err(self.undefined_property(name)),
        }
    }

    /// Replace the instance on top of the stack with `name`'s method bound
    /// to it.
    fn bind_method(&mut self, class: Handle, name: Handle) -> error::Result<()> {
        let hash = self.heap.store.string(name).hash;
        let method = match self.heap.store.class(class).methods.get(name, hash) {
            Some(Value::Obj(method)) => method,
            Some(_) => unreachable!("method table holds closures"),
            None => return Err(self.undefined_property(name)),
        };

        let receiver = self.peek(0);
        let bound = self.alloc(Obj::BoundMethod(BoundMethodObject { receiver, method }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    // =========================================================================
    // Upvalues
    // =========================================================================

    /// Find or create the open upvalue observing `slot`. The list is kept
    /// sorted descending by slot, and at most one upvalue exists per slot,
    /// so closures sharing a variable share its upvalue.
    fn capture_upvalue(&mut self, slot: usize) -> Handle {
        let mut prev = None;
        let mut current = self.open_upvalues;
        while let Some(handle) = current {
            let upvalue = self.heap.store.upvalue(handle);
            match upvalue.state {
                UpvalueState::Open(s) if s > slot => {
                    prev = Some(handle);
                    current = upvalue.next;
                }
                _ => break,
            }
        }

        if let Some(handle) = current
            && let UpvalueState::Open(s) = self.heap.store.upvalue(handle).state
            && s == slot
        {
            return handle;
        }

        let created = self.alloc(Obj::Upvalue(UpvalueObject {
            state: UpvalueState::Open(slot),
            next: current,
        }));
        match prev {
            None => self.open_upvalues = Some(created),
            Some(prev) => self.heap.store.upvalue_mut(prev).next = Some(created),
        }
        created
    }

    /// Close every open upvalue observing a slot at or above `last`: copy
    /// the stack value into the upvalue and unlink it from the open list.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(handle) = self.open_upvalues {
            let (slot, next) = match self.heap.store.upvalue(handle).state {
                UpvalueState::Open(slot) => (slot, self.heap.store.upvalue(handle).next),
                UpvalueState::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if slot < last {
                break;
            }
            let value = self.stack[slot];
            let upvalue = self.heap.store.upvalue_mut(handle);
            upvalue.state = UpvalueState::Closed(value);
            upvalue.next = None;
            self.open_upvalues = next;
        }
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    fn numeric_binary(&mut self, f: impl FnOnce(f64, f64) -> Value) -> error::Result<()> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(f(a, b));
                Ok(())
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers),
        }
    }

    /// `+` is overloaded: numbers add, strings concatenate into a new
    /// interned string. The operands stay on the stack until the result is
    /// allocated so a collection cannot free them mid-concatenation.
    fn add(&mut self) -> error::Result<()> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
                Ok(())
            }
            (Value::Obj(a), Value::Obj(b))
                if matches!(self.heap.store.get(a), Obj::String(_))
                    && matches!(self.heap.store.get(b), Obj::String(_)) =>
            {
                let mut result = self.heap.store.string(a).chars.clone();
                result.push_str(&self.heap.store.string(b).chars);
                self.gc_gate();
                let handle = self.heap.intern(&result);
                self.pop();
                self.pop();
                self.push(Value::Obj(handle));
                Ok(())
            }
            _ => Err(RuntimeError::OperandsMustBeNumbersOrStrings),
        }
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// Run a collection if the heap wants one. Every allocation in the VM
    /// goes through here (or through [`Vm::alloc`]), so collection only
    /// ever happens at points where the roots below cover all live values.
    fn gc_gate(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    fn alloc(&mut self, obj: Obj) -> Handle {
        self.gc_gate();
        self.heap.allocate(obj)
    }

    /// Mark the VM roots, trace, and sweep. The compiler pre-marks its
    /// in-progress functions before calling this for compile-time
    /// collections; marking is idempotent so the shared path just adds the
    /// runtime roots.
    pub(crate) fn collect_garbage(&mut self) {
        let before = self.heap.bytes_allocated();
        if self.options.log_gc {
            eprintln!("-- gc begin");
        }

        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        let mut open = self.open_upvalues;
        while let Some(handle) = open {
            self.heap.mark_object(handle);
            open = self.heap.store.upvalue(handle).next;
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark_object(self.init_string);

        self.heap.trace_references();
        self.heap.sweep();

        if self.options.log_gc {
            eprintln!(
                "-- gc end: {} -> {} bytes, next at {}",
                before,
                self.heap.bytes_allocated(),
                self.heap.next_gc()
            );
        }
    }

    // =========================================================================
    // Frame and stack plumbing
    // =========================================================================

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active call frame");
        let closure = self.heap.store.closure(frame.closure);
        let function = self.heap.store.function(closure.function);
        let byte = function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    /// Big-endian 16-bit operand.
    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frames.last().expect("no active call frame");
        let closure = self.heap.store.closure(frame.closure);
        self.heap.store.function(closure.function).chunk.constants[index]
    }

    fn read_string(&mut self) -> Handle {
        match self.read_constant() {
            Value::Obj(handle) => handle,
            _ => unreachable!("name operand is a string constant"),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// The handle at `distance` from the top, if it is an instance.
    fn instance_at(&self, distance: usize) -> Option<Handle> {
        match self.peek(distance) {
            Value::Obj(handle) if matches!(self.heap.store.get(handle), Obj::Instance(_)) => {
                Some(handle)
            }
            _ => None,
        }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
    }

    // =========================================================================
    // Error reporting
    // =========================================================================

    /// Wrap a runtime error with the stack trace (top frame first), then
    /// reset the stack for the next interpret call.
    fn runtime_error(&mut self, error: RuntimeError) -> RuntimeErrorReport {
        let store = self.heap.store();
        let mut trace = Vec::new();
        for frame in self.frames.iter().rev() {
            let closure = store.closure(frame.closure);
            let function = store.function(closure.function);
            let offset = frame.ip.saturating_sub(1);
            let line = function.chunk.lines.get(offset).copied().unwrap_or(0);
            let name = function.name.map(|h| store.string(h).chars.clone());
            trace.push(TraceLine {
                line,
                function: name,
            });
        }
        self.reset_stack();
        RuntimeErrorReport { error, trace }
    }

    fn undefined_variable(&self, name: Handle) -> RuntimeError {
        RuntimeError::UndefinedVariable(self.heap.store.string(name).chars.clone())
    }

    fn undefined_property(&self, name: Handle) -> RuntimeError {
        RuntimeError::UndefinedProperty(self.heap.store.string(name).chars.clone())
    }

    // =========================================================================
    // Natives and diagnostics
    // =========================================================================

    /// Install a native under `name`. Name and native are kept on the
    /// stack across the allocations so a collection cannot free them.
    fn define_native(&mut self, name: &str, function: NativeFn) {
        self.gc_gate();
        let name_handle = self.heap.intern(name);
        self.push(Value::Obj(name_handle));
        let native = self.alloc(Obj::Native(NativeObject {
            name: name_handle,
            function,
        }));
        self.push(Value::Obj(native));

        let hash = self.heap.store.string(name_handle).hash;
        let value = self.peek(0);
        self.globals.set(name_handle, hash, value);
        self.pop();
        self.pop();
    }

    fn trace_instruction(&self) {
        let store = self.heap.store();
        let mut line = String::from("          ");
        for &value in &self.stack {
            line.push_str(&format!("[ {} ]", format_value(value, store)));
        }
        eprintln!("{}", line);

        let frame = self.frame();
        let closure = store.closure(frame.closure);
        let function = store.function(closure.function);
        let _ = debug::disassemble_instruction(&mut io::stderr(), &function.chunk, store, frame.ip);
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// The single built-in: seconds since this interpreter was created.
fn clock_native(vm: &Vm, _args: &[Value]) -> Value {
    Value::Number(vm.started_at.elapsed().as_secs_f64())
}
