// kestrel-vm - Bytecode disassembler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Human-readable chunk disassembly for debugging and tooling.

use std::fmt::Write;

use crate::chunk::Chunk;
use crate::opcode::OpCode;
use crate::value::Value;

/// Render a whole chunk under a header.
pub fn disassemble(chunk: &Chunk, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, &mut out);
    }
    out
}

/// Render one instruction, returning the offset of the next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let _ = write!(out, "{:04} ", offset);
    if offset > 0 && chunk.get_line(offset) == chunk.get_line(offset - 1) {
        let _ = write!(out, "   | ");
    } else {
        let _ = write!(out, "{:4} ", chunk.get_line(offset));
    }

    let byte = chunk.code[offset];
    let Some(op) = OpCode::from_byte(byte) else {
        let _ = writeln!(out, "Unknown opcode {}", byte);
        return offset + 1;
    };

    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal => constant_instruction(chunk, op, offset, out),
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call
        | OpCode::BuildList => byte_instruction(chunk, op, offset, out),
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(chunk, op, offset, 1, out),
        OpCode::Loop => jump_instruction(chunk, op, offset, -1, out),
        OpCode::Closure => closure_instruction(chunk, offset, out),
        _ => {
            let _ = writeln!(out, "{}", op.mnemonic());
            offset + 1
        }
    }
}

fn constant_instruction(chunk: &Chunk, op: OpCode, offset: usize, out: &mut String) -> usize {
    let idx = chunk.code[offset + 1] as usize;
    let _ = write!(out, "{:<16} {:4}", op.mnemonic(), idx);
    match chunk.constants.get(idx) {
        Some(value) => {
            let _ = writeln!(out, " '{}'", value);
        }
        None => {
            let _ = writeln!(out, " <bad constant>");
        }
    }
    offset + 2
}

fn byte_instruction(chunk: &Chunk, op: OpCode, offset: usize, out: &mut String) -> usize {
    let operand = chunk.code[offset + 1];
    let _ = writeln!(out, "{:<16} {:4}", op.mnemonic(), operand);
    offset + 2
}

fn jump_instruction(chunk: &Chunk, op: OpCode, offset: usize, sign: i64, out: &mut String) -> usize {
    let distance = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
    let target = offset as i64 + 3 + sign * distance as i64;
    let _ = writeln!(out, "{:<16} {:4} -> {}", op.mnemonic(), offset, target);
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let idx = chunk.code[offset + 1] as usize;
    let mut next = offset + 2;
    let Some(constant) = chunk.constants.get(idx) else {
        let _ = writeln!(out, "{:<16} {:4} <bad constant>", OpCode::Closure.mnemonic(), idx);
        return next;
    };
    let _ = writeln!(out, "{:<16} {:4} {}", OpCode::Closure.mnemonic(), idx, constant);

    if let Value::Function(function) = constant {
        for _ in 0..function.upvalue_count {
            let is_local = chunk.code[next] != 0;
            let index = chunk.code[next + 1];
            let _ = writeln!(
                out,
                "{:04}    |                     {} {}",
                next,
                if is_local { "local" } else { "upvalue" },
                index
            );
            next += 2;
        }
    }
    next
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_simple_chunk() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(1.5)).unwrap();
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(idx, 1);
        chunk.write_op(OpCode::Negate, 1);
        chunk.write_op(OpCode::Return, 2);

        let text = disassemble(&chunk, "test");
        assert!(text.contains("== test =="));
        assert!(text.contains("CONSTANT"));
        assert!(text.contains("'1.5'"));
        assert!(text.contains("NEGATE"));
        assert!(text.contains("RETURN"));
    }

    #[test]
    fn test_jump_targets() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write(0, 1);
        chunk.write(2, 1);
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.write_op(OpCode::Return, 1);

        let text = disassemble(&chunk, "jumps");
        // Jump at offset 0 with distance 2 lands at 5.
        assert!(text.contains("JUMP"));
        assert!(text.contains("-> 5"));
    }
}
