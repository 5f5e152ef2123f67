use crate::value::Value;

/// One-byte opcodes. Operand widths are fixed per opcode, see `operand_width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Constant,
    ConstantLong,
    Null,
    True,
    False,
    Pop,
    DefineGlobal,
    DefineGlobalLong,
    GetGlobal,
    GetGlobalLong,
    SetGlobal,
    SetGlobalLong,
    GetLocal,
    SetLocal,
    MakeConst,
    Not,
    Negate,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Print,
    Return,
}

impl OpCode {
    const ALL: [OpCode; 30] = [
        OpCode::Constant,
        OpCode::ConstantLong,
        OpCode::Null,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::DefineGlobal,
        OpCode::DefineGlobalLong,
        OpCode::GetGlobal,
        OpCode::GetGlobalLong,
        OpCode::SetGlobal,
        OpCode::SetGlobalLong,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::MakeConst,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Print,
        OpCode::Return,
    ];

    /// Bytes following the opcode byte.
    pub fn operand_width(self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::DefineGlobal
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::Call => 1,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => 2,
            OpCode::ConstantLong
            | OpCode::DefineGlobalLong
            | OpCode::GetGlobalLong
            | OpCode::SetGlobalLong => 4,
            _ => 0,
        }
    }

    /// The 4-byte-operand twin of a constant-indexed opcode.
    pub fn long_form(self) -> OpCode {
        match self {
            OpCode::Constant => OpCode::ConstantLong,
            OpCode::DefineGlobal => OpCode::DefineGlobalLong,
            OpCode::GetGlobal => OpCode::GetGlobalLong,
            OpCode::SetGlobal => OpCode::SetGlobalLong,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::ConstantLong => "OP_CONSTANT_LONG",
            OpCode::Null => "OP_NULL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::DefineGlobalLong => "OP_DEFINE_GLOBAL_LONG",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::GetGlobalLong => "OP_GET_GLOBAL_LONG",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::SetGlobalLong => "OP_SET_GLOBAL_LONG",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::MakeConst => "OP_MAKECONST",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Print => "OP_PRINT",
            OpCode::Return => "OP_RETURN",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

/// Compiled body of one function.
///
/// Multi-byte operands are little-endian: `u16` for jump offsets, `u32` for
/// long constant-pool indices.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    /// `(offset, line)` recorded only where the source line changes.
    lines: Vec<(usize, usize)>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: usize) {
        if self.lines.last().is_none_or(|&(_, last)| last != line) {
            self.lines.push((self.code.len(), line));
        }
        self.code.push(byte);
    }

    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.write(op as u8, line);
    }

    pub fn write_u16(&mut self, value: u16, line: usize) {
        for b in value.to_le_bytes() {
            self.write(b, line);
        }
    }

    pub fn write_u32(&mut self, value: u32, line: usize) {
        for b in value.to_le_bytes() {
            self.write(b, line);
        }
    }

    /// Adds a constant, reusing the index of an equal one already present.
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Some(idx) = self.constants.iter().position(|c| *c == value) {
            return idx;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.code.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.code.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Overwrites a previously emitted 2-byte operand.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.code[offset] = lo;
        self.code[offset + 1] = hi;
    }

    /// Source line of the instruction byte at `offset`; 0 when unknown.
    pub fn line_at(&self, offset: usize) -> usize {
        let idx = self.lines.partition_point(|&(start, _)| start <= offset);
        if idx == 0 { 0 } else { self.lines[idx - 1].1 }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
