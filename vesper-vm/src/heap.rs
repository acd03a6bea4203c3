// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! The object heap and its mark-sweep collector.
//!
//! Objects live in a slot vector indexed by [`Handle`]; freed slots go on a
//! free list for reuse. Collection is tri-color: marking turns an object
//! gray and pushes it on the worklist, tracing pops gray objects and marks
//! their referents (blackening them), and the sweep frees everything still
//! white. The gray worklist is a plain `Vec` outside the byte accounting,
//! so growing it can never re-enter collection.
//!
//! The heap never starts a collection on its own: owners (the VM at
//! runtime, the compiler during compilation) check [`Heap::should_collect`]
//! before each allocating call and run the collect phases with their roots
//! marked first. That keeps every allocation point at a place where all
//! live values are reachable from roots.

use crate::object::{Handle, Obj, StringObject, hash_string};
use crate::table::Table;
use crate::value::Value;

use crate::object::{
    BoundMethodObject, ClassObject, ClosureObject, FunctionObject, InstanceObject, NativeObject,
    UpvalueObject,
};

/// First collection threshold; doubles from live bytes after each cycle.
const FIRST_GC_THRESHOLD: usize = 1024 * 1024;
const HEAP_GROW_FACTOR: usize = 2;

/// The slot vector all handles point into, with mark bits and byte
/// accounting.
#[derive(Debug, Default)]
pub struct ObjStore {
    slots: Vec<Option<Obj>>,
    marks: Vec<bool>,
    /// Bytes charged when the slot was filled; credited back on free.
    sizes: Vec<usize>,
    free: Vec<u32>,
    bytes_allocated: usize,
}

impl ObjStore {
    fn insert(&mut self, obj: Obj) -> Handle {
        let size = size_of_obj(&obj);
        self.bytes_allocated += size;
        if let Some(index) = self.free.pop() {
            let index = index as usize;
            self.slots[index] = Some(obj);
            self.marks[index] = false;
            self.sizes[index] = size;
            Handle::new(index)
        } else {
            self.slots.push(Some(obj));
            self.marks.push(false);
            self.sizes.push(size);
            Handle::new(self.slots.len() - 1)
        }
    }

    fn free_slot(&mut self, index: usize) {
        debug_assert!(self.slots[index].is_some(), "double free of heap slot");
        self.slots[index] = None;
        self.bytes_allocated -= self.sizes[index];
        self.sizes[index] = 0;
        self.free.push(index as u32);
    }

    pub fn get(&self, handle: Handle) -> &Obj {
        self.slots[handle.index()]
            .as_ref()
            .expect("handle to freed heap slot")
    }

    pub fn is_marked(&self, handle: Handle) -> bool {
        self.marks[handle.index()]
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn string(&self, handle: Handle) -> &StringObject {
        match self.get(handle) {
            Obj::String(s) => s,
            other => panic!("expected string object, found {:?}", other),
        }
    }

    pub fn function(&self, handle: Handle) -> &FunctionObject {
        match self.get(handle) {
            Obj::Function(f) => f,
            other => panic!("expected function object, found {:?}", other),
        }
    }

    pub fn native(&self, handle: Handle) -> &NativeObject {
        match self.get(handle) {
            Obj::Native(n) => n,
            other => panic!("expected native object, found {:?}", other),
        }
    }

    pub fn closure(&self, handle: Handle) -> &ClosureObject {
        match self.get(handle) {
            Obj::Closure(c) => c,
            other => panic!("expected closure object, found {:?}", other),
        }
    }

    pub fn closure_mut(&mut self, handle: Handle) -> &mut ClosureObject {
        match self.slots[handle.index()].as_mut() {
            Some(Obj::Closure(c)) => c,
            other => panic!("expected closure object, found {:?}", other),
        }
    }

    pub fn upvalue(&self, handle: Handle) -> &UpvalueObject {
        match self.get(handle) {
            Obj::Upvalue(u) => u,
            other => panic!("expected upvalue object, found {:?}", other),
        }
    }

    pub fn upvalue_mut(&mut self, handle: Handle) -> &mut UpvalueObject {
        match self.slots[handle.index()].as_mut() {
            Some(Obj::Upvalue(u)) => u,
            other => panic!("expected upvalue object, found {:?}", other),
        }
    }

    pub fn class(&self, handle: Handle) -> &ClassObject {
        match self.get(handle) {
            Obj::Class(c) => c,
            other => panic!("expected class object, found {:?}", other),
        }
    }

    pub fn class_mut(&mut self, handle: Handle) -> &mut ClassObject {
        match self.slots[handle.index()].as_mut() {
            Some(Obj::Class(c)) => c,
            other => panic!("expected class object, found {:?}", other),
        }
    }

    pub fn instance(&self, handle: Handle) -> &InstanceObject {
        match self.get(handle) {
            Obj::Instance(i) => i,
            other => panic!("expected instance object, found {:?}", other),
        }
    }

    pub fn instance_mut(&mut self, handle: Handle) -> &mut InstanceObject {
        match self.slots[handle.index()].as_mut() {
            Some(Obj::Instance(i)) => i,
            other => panic!("expected instance object, found {:?}", other),
        }
    }

    pub fn bound_method(&self, handle: Handle) -> &BoundMethodObject {
        match self.get(handle) {
            Obj::BoundMethod(b) => b,
            other => panic!("expected bound method object, found {:?}", other),
        }
    }
}

/// The heap: object storage, the string intern pool, and collector state.
#[derive(Debug)]
pub struct Heap {
    pub(crate) store: ObjStore,
    /// Intern pool: keys are every live string, values unused. Weak — the
    /// sweep prunes unmarked keys instead of treating them as roots.
    strings: Table,
    gray: Vec<Handle>,
    next_gc: usize,
    stress: bool,
}

impl Heap {
    pub fn new(stress: bool) -> Self {
        Heap {
            store: ObjStore::default(),
            strings: Table::new(),
            gray: Vec::new(),
            next_gc: FIRST_GC_THRESHOLD,
            stress,
        }
    }

    pub fn store(&self) -> &ObjStore {
        &self.store
    }

    /// Whether the next allocation should run a collection first.
    pub fn should_collect(&self) -> bool {
        self.stress || self.store.bytes_allocated > self.next_gc
    }

    /// Allocate an object. Never collects; the caller is responsible for
    /// checking [`Heap::should_collect`] beforehand with its roots marked.
    pub fn allocate(&mut self, obj: Obj) -> Handle {
        self.store.insert(obj)
    }

    /// Return the interned string with these characters, allocating it on
    /// first sight. Equal content always returns the same handle.
    pub fn intern(&mut self, chars: &str) -> Handle {
        let hash = hash_string(chars);
        if let Some(existing) = self.strings.find_string(&self.store, chars, hash) {
            return existing;
        }
        let handle = self.allocate(Obj::String(StringObject {
            chars: chars.to_owned(),
            hash,
        }));
        self.strings.set(handle, hash, Value::Nil);
        handle
    }

    // =========================================================================
    // Marking
    // =========================================================================

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(handle) = value {
            self.mark_object(handle);
        }
    }

    /// Gray an object. Idempotent: re-marking is a no-op.
    pub fn mark_object(&mut self, handle: Handle) {
        let index = handle.index();
        if self.store.marks[index] {
            return;
        }
        self.store.marks[index] = true;
        self.gray.push(handle);
    }

    /// Mark every key and value of an externally owned table (globals).
    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Drain the gray worklist, blackening each object by marking its
    /// referents.
    pub fn trace_references(&mut self) {
        while let Some(handle) = self.gray.pop() {
            self.blacken(handle);
        }
    }

    fn blacken(&mut self, handle: Handle) {
        let Heap { store, gray, .. } = self;
        let ObjStore { slots, marks, .. } = store;
        let slots = &*slots;

        let mut mark = |value: Value| {
            if let Value::Obj(h) = value {
                let index = h.index();
                if !marks[index] {
                    marks[index] = true;
                    gray.push(h);
                }
            }
        };

        match slots[handle.index()]
            .as_ref()
            .expect("gray handle to freed slot")
        {
            Obj::String(_) => {}
            Obj::Native(n) => mark(Value::Obj(n.name)),
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    mark(Value::Obj(name));
                }
                for &constant in &f.chunk.constants {
                    mark(constant);
                }
            }
            Obj::Closure(c) => {
                mark(Value::Obj(c.function));
                for &upvalue in &c.upvalues {
                    mark(Value::Obj(upvalue));
                }
            }
            Obj::Upvalue(u) => {
                // An open upvalue's variable is a stack slot, already a root.
                if let crate::object::UpvalueState::Closed(value) = u.state {
                    mark(value);
                }
            }
            Obj::Class(c) => {
                mark(Value::Obj(c.name));
                for (key, value) in c.methods.iter() {
                    mark(Value::Obj(key));
                    mark(value);
                }
            }
            Obj::Instance(i) => {
                mark(Value::Obj(i.class));
                for (key, value) in i.fields.iter() {
                    mark(Value::Obj(key));
                    mark(value);
                }
            }
            Obj::BoundMethod(b) => {
                mark(b.receiver);
                mark(Value::Obj(b.method));
            }
        }
    }

    // =========================================================================
    // Sweeping
    // =========================================================================

    /// Free every unmarked object, unmark the survivors, and set the next
    /// collection threshold. The intern pool is pruned first so dead
    /// strings do not leave dangling keys.
    pub fn sweep(&mut self) {
        self.strings.remove_unmarked(&self.store);

        for index in 0..self.store.slots.len() {
            if self.store.slots[index].is_none() {
                continue;
            }
            if self.store.marks[index] {
                self.store.marks[index] = false;
            } else {
                self.store.free_slot(index);
            }
        }

        self.next_gc = self.store.bytes_allocated * HEAP_GROW_FACTOR;
    }

    pub fn bytes_allocated(&self) -> usize {
        self.store.bytes_allocated
    }

    pub fn live_objects(&self) -> usize {
        self.store.live_objects()
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }
}

/// Bytes charged against the collection threshold for one object: the
/// enum's inline size plus owned payload buffers at allocation time.
fn size_of_obj(obj: &Obj) -> usize {
    let payload = match obj {
        Obj::String(s) => s.chars.capacity(),
        Obj::Function(f) => {
            f.chunk.code.capacity()
                + f.chunk.lines.capacity() * std::mem::size_of::<u32>()
                + f.chunk.constants.capacity() * std::mem::size_of::<Value>()
        }
        Obj::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<Handle>(),
        Obj::Class(c) => c.methods.footprint(),
        Obj::Instance(i) => i.fields.footprint(),
        Obj::Native(_) | Obj::Upvalue(_) | Obj::BoundMethod(_) => 0,
    };
    std::mem::size_of::<Obj>() + payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_identity_for_equal_content() {
        let mut heap = Heap::new(false);
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        let c = heap.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.store().string(a).chars, "hello");
    }

    #[test]
    fn unreachable_objects_are_swept() {
        let mut heap = Heap::new(false);
        let keep = heap.intern("keep");
        let _drop = heap.intern("drop");
        assert_eq!(heap.live_objects(), 2);

        heap.mark_object(keep);
        heap.trace_references();
        heap.sweep();

        assert_eq!(heap.live_objects(), 1);
        assert_eq!(heap.store().string(keep).chars, "keep");
    }

    #[test]
    fn swept_strings_leave_the_intern_pool() {
        let mut heap = Heap::new(false);
        let first = heap.intern("transient");
        heap.trace_references();
        heap.sweep();

        // A fresh slot may be reused; the point is that the stale intern
        // entry is gone and re-interning builds a valid string.
        let second = heap.intern("transient");
        assert_eq!(heap.store().string(second).chars, "transient");
        assert_eq!(heap.live_objects(), 1);
        let _ = first;
    }

    #[test]
    fn tracing_keeps_referents_alive() {
        let mut heap = Heap::new(false);
        let name = heap.intern("f");
        let function = heap.allocate(Obj::Function(FunctionObject {
            name: Some(name),
            arity: 0,
            upvalue_count: 0,
            chunk: crate::chunk::Chunk::new(),
        }));
        let closure = heap.allocate(Obj::Closure(ClosureObject {
            function,
            upvalues: Vec::new(),
        }));

        heap.mark_object(closure);
        heap.trace_references();
        heap.sweep();

        assert_eq!(heap.live_objects(), 3);
        assert_eq!(heap.store().closure(closure).function, function);
        assert_eq!(heap.store().function(function).name, Some(name));
    }

    #[test]
    fn marking_is_idempotent() {
        let mut heap = Heap::new(false);
        let s = heap.intern("s");
        heap.mark_object(s);
        heap.mark_object(s);
        assert_eq!(heap.gray.len(), 1);
    }

    #[test]
    fn bytes_allocated_balances_after_free() {
        let mut heap = Heap::new(false);
        let before = heap.bytes_allocated();
        heap.intern("some transient garbage string");
        assert!(heap.bytes_allocated() > before);

        heap.trace_references();
        heap.sweep();
        assert_eq!(heap.bytes_allocated(), before);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new(false);
        let first = heap.intern("gone");
        heap.trace_references();
        heap.sweep();
        let second = heap.intern("next");
        assert_eq!(first.index(), second.index());
    }

    #[test]
    fn stress_mode_always_wants_collection() {
        let heap = Heap::new(true);
        assert!(heap.should_collect());
        let calm = Heap::new(false);
        assert!(!calm.should_collect());
    }
}
