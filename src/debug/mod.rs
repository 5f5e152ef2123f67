//! Bytecode disassembler used by `--dump` and the execution trace.

use std::fmt::Write;

use crate::chunk::{Chunk, OpCode};
use crate::value::ObjFunction;

/// Renders one instruction. Returns the text and the offset of the next
/// instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut out = format!("{offset:04}: ");
    let line = chunk.line_at(offset);
    if offset > 0 && line == chunk.line_at(offset - 1) {
        out.push_str("   | ");
    } else {
        let _ = write!(out, "{line:4} ");
    }

    let Some(&byte) = chunk.code.get(offset) else {
        out.push_str("<truncated>");
        return (out, offset + 1);
    };
    let Ok(op) = OpCode::try_from(byte) else {
        let _ = write!(out, "Unknown opcode: {byte}");
        return (out, offset + 1);
    };

    let name = op.name();
    let next = offset + 1 + op.operand_width();
    let operand_at = offset + 1;
    match op {
        OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal => {
            let index = chunk.code.get(operand_at).map(|&b| b as usize);
            constant(&mut out, name, chunk, index);
        }
        OpCode::ConstantLong | OpCode::DefineGlobalLong | OpCode::GetGlobalLong | OpCode::SetGlobalLong => {
            let index = chunk.read_u32(operand_at).map(|i| i as usize);
            constant(&mut out, name, chunk, index);
        }
        OpCode::GetLocal | OpCode::SetLocal | OpCode::Call => match chunk.code.get(operand_at) {
            Some(slot) => {
                let _ = write!(out, "{name:<16} {slot:4}");
            }
            None => truncated(&mut out, name),
        },
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => match chunk.read_u16(operand_at) {
            Some(jump) => {
                let after = offset + 3;
                let target = if op == OpCode::Loop {
                    after as i64 - jump as i64
                } else {
                    (after + jump as usize) as i64
                };
                let _ = write!(out, "{name:<16} {offset:4} -> {target}");
            }
            None => truncated(&mut out, name),
        },
        _ => out.push_str(name),
    }
    (out, next)
}

fn constant(out: &mut String, name: &str, chunk: &Chunk, index: Option<usize>) {
    match index {
        Some(index) => {
            let value = chunk.constants.get(index).map_or_else(|| "<invalid>".to_string(), |v| v.to_string());
            let _ = write!(out, "{name:<16} {index:4} '{value}'");
        }
        None => truncated(out, name),
    }
}

fn truncated(out: &mut String, name: &str) {
    let _ = write!(out, "{name:<16} <truncated>");
}

pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("=== {name} ===\n");
    let mut offset = 0;
    while offset < chunk.len() {
        let (text, next) = disassemble_instruction(chunk, offset);
        out.push_str(&text);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassembles a function and, depth first, every function in its
/// constant pool.
pub fn disassemble_function(function: &ObjFunction) -> String {
    let mut out = disassemble_chunk(&function.chunk, function.display_name());
    for nested in function.chunk.constants.iter().filter_map(|c| c.as_function()) {
        out.push('\n');
        out.push_str(&disassemble_function(nested));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::value::{Interner, Value};

    #[test]
    fn simple_and_constant_instructions() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::number(1.5));
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(idx as u8, 1);
        chunk.write_op(OpCode::Return, 2);

        let (first, next) = disassemble_instruction(&chunk, 0);
        assert_eq!(first, "0000:    1 OP_CONSTANT         0 '1.5'");
        assert_eq!(next, 2);
        let (second, next) = disassemble_instruction(&chunk, 2);
        assert_eq!(second, "0002:    2 OP_RETURN");
        assert_eq!(next, 3);
    }

    #[test]
    fn same_line_uses_bar() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Null, 7);
        chunk.write_op(OpCode::Pop, 7);
        let (text, _) = disassemble_instruction(&chunk, 1);
        assert_eq!(text, "0001:    | OP_POP");
    }

    #[test]
    fn jump_targets_are_resolved() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write_u16(4, 1);
        chunk.write_op(OpCode::Loop, 1);
        chunk.write_u16(6, 1);
        let (forward, _) = disassemble_instruction(&chunk, 0);
        assert!(forward.ends_with("OP_JUMP             0 -> 7"), "{forward}");
        let (backward, _) = disassemble_instruction(&chunk, 3);
        assert!(backward.ends_with("OP_LOOP             3 -> 0"), "{backward}");
    }

    #[test]
    fn unknown_opcode() {
        let mut chunk = Chunk::new();
        chunk.write(250, 1);
        let (text, next) = disassemble_instruction(&chunk, 0);
        assert!(text.ends_with("Unknown opcode: 250"));
        assert_eq!(next, 1);
    }

    #[test]
    fn truncated_operand_does_not_panic() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::ConstantLong, 1);
        chunk.write(0, 1);
        let (text, _) = disassemble_instruction(&chunk, 0);
        assert!(text.contains("<truncated>"));
    }

    #[test]
    fn offset_past_end_does_not_panic() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Return, 1);
        let (text, next) = disassemble_instruction(&chunk, 1);
        assert!(text.ends_with("<truncated>"), "got: {text}");
        assert_eq!(next, 2);
        let (text, _) = disassemble_instruction(&Chunk::new(), 0);
        assert!(text.ends_with("<truncated>"), "got: {text}");
    }

    #[test]
    fn function_dump_includes_nested_functions() {
        let mut strings = Interner::new();
        let script = compile("fn twice(x) { return x * 2; } print twice(2);", &mut strings).unwrap();
        let dump = disassemble_function(&script);
        assert!(dump.contains("=== script ==="), "{dump}");
        assert!(dump.contains("=== twice ==="), "{dump}");
        assert!(dump.contains("OP_CALL"), "{dump}");
        assert!(dump.contains("OP_MULTIPLY"), "{dump}");
    }
}
