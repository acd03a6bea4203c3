// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! Chunk disassembler, used by the `--print-code` and `--trace` options.

use std::io::{self, Write};

use crate::chunk::Chunk;
use crate::heap::ObjStore;
use crate::opcode::Op;
use crate::value::format_value;

/// Print an entire chunk, one instruction per line.
pub fn disassemble_chunk(
    w: &mut dyn Write,
    chunk: &Chunk,
    store: &ObjStore,
    name: &str,
) -> io::Result<()> {
    writeln!(w, "== {} ==", name)?;
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(w, chunk, store, offset)?;
    }
    Ok(())
}

/// Print the instruction at `offset` and return the offset of the next one.
pub fn disassemble_instruction(
    w: &mut dyn Write,
    chunk: &Chunk,
    store: &ObjStore,
    offset: usize,
) -> io::Result<usize> {
    write!(w, "{:04} ", offset)?;
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        write!(w, "   | ")?;
    } else {
        write!(w, "{:4} ", chunk.lines[offset])?;
    }

    let op = match Op::try_from(chunk.code[offset]) {
        Ok(op) => op,
        Err(invalid) => {
            writeln!(w, "{}", invalid)?;
            return Ok(offset + 1);
        }
    };

    match op {
        Op::Constant
        | Op::GetGlobal
        | Op::DefineGlobal
        | Op::SetGlobal
        | Op::GetProperty
        | Op::SetProperty
        | Op::GetSuper
        | Op::Class
        | Op::Method => constant_instruction(w, chunk, store, op, offset),

        Op::GetLocal | Op::SetLocal | Op::GetUpvalue | Op::SetUpvalue | Op::Call => {
            byte_instruction(w, chunk, op, offset)
        }

        Op::Jump | Op::JumpIfFalse => jump_instruction(w, chunk, op, 1, offset),
        Op::Loop => jump_instruction(w, chunk, op, -1, offset),

        Op::Invoke | Op::SuperInvoke => invoke_instruction(w, chunk, store, op, offset),

        Op::Closure => closure_instruction(w, chunk, store, offset),

        _ => {
            writeln!(w, "{:?}", op)?;
            Ok(offset + 1)
        }
    }
}

fn constant_instruction(
    w: &mut dyn Write,
    chunk: &Chunk,
    store: &ObjStore,
    op: Op,
    offset: usize,
) -> io::Result<usize> {
    let constant = chunk.code[offset + 1];
    writeln!(
        w,
        "{:<16} {:4} '{}'",
        format!("{:?}", op),
        constant,
        format_value(chunk.constants[constant as usize], store)
    )?;
    Ok(offset + 2)
}

fn byte_instruction(w: &mut dyn Write, chunk: &Chunk, op: Op, offset: usize) -> io::Result<usize> {
    let slot = chunk.code[offset + 1];
    writeln!(w, "{:<16} {:4}", format!("{:?}", op), slot)?;
    Ok(offset + 2)
}

fn jump_instruction(
    w: &mut dyn Write,
    chunk: &Chunk,
    op: Op,
    sign: i64,
    offset: usize,
) -> io::Result<usize> {
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
    let target = offset as i64 + 3 + sign * jump as i64;
    writeln!(w, "{:<16} {:4} -> {}", format!("{:?}", op), offset, target)?;
    Ok(offset + 3)
}

fn invoke_instruction(
    w: &mut dyn Write,
    chunk: &Chunk,
    store: &ObjStore,
    op: Op,
    offset: usize,
) -> io::Result<usize> {
    let constant = chunk.code[offset + 1];
    let arg_count = chunk.code[offset + 2];
    writeln!(
        w,
        "{:<16} ({} args) {:4} '{}'",
        format!("{:?}", op),
        arg_count,
        constant,
        format_value(chunk.constants[constant as usize], store)
    )?;
    Ok(offset + 3)
}

fn closure_instruction(
    w: &mut dyn Write,
    chunk: &Chunk,
    store: &ObjStore,
    offset: usize,
) -> io::Result<usize> {
    let mut offset = offset + 1;
    let constant = chunk.code[offset];
    offset += 1;
    writeln!(
        w,
        "{:<16} {:4} {}",
        "Closure",
        constant,
        format_value(chunk.constants[constant as usize], store)
    )?;

    let function = match chunk.constants[constant as usize] {
        crate::value::Value::Obj(handle) => store.function(handle),
        _ => panic!("closure operand is not a function constant"),
    };
    for _ in 0..function.upvalue_count {
        let is_local = chunk.code[offset];
        let index = chunk.code[offset + 1];
        writeln!(
            w,
            "{:04}      |                     {} {}",
            offset,
            if is_local == 1 { "local" } else { "upvalue" },
            index
        )?;
        offset += 2;
    }
    Ok(offset)
}
