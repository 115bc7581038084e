//! Opcode set for the Vetch stack machine, plus the little-endian
//! immediate encode/decode helpers shared by the compiler and the VM.
//!
//! Every opcode is one byte followed by zero or more fixed-width
//! little-endian immediates. Pointer-width immediates are 8 bytes.

use crate::compiler::compiler_errors::CompileError;

// Declares the opcode enum and its byte decoder from one variant list, so
// the two can never drift apart.
macro_rules! define_ops {
    ($($name:ident),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum Op {
            $($name),*
        }

        impl TryFrom<u8> for Op {
            type Error = CompileError;

            fn try_from(byte: u8) -> Result<Self, CompileError> {
                match byte {
                    $(b if b == Op::$name as u8 => Ok(Op::$name),)*
                    _ => Err(CompileError::runtime_error(format!(
                        "unknown op code ({})",
                        byte
                    ))),
                }
            }
        }
    };
}

define_ops! {
    EndProgram,

    // Data movement. Immediates noted in brackets.
    PushBool,          // [u8]
    PushChar,          // [u8]
    PushI32,           // [i32]
    PushI64,           // [i64]
    PushU64,           // [u64]
    PushF64,           // [f64]
    PushNull,          //
    PushNullptr,       //
    PushStringLiteral, // [rom offset: u64][length: u64] pushes a char span
    PushPtrLocal,      // [frame offset: u64]
    PushPtrGlobal,     // [stack offset: u64]
    PushFunctionPtr,   // [function id: u64]
    Load,              // [size: u64] pops ptr, pushes size bytes from it
    Save,              // [size: u64] pops ptr, pops size bytes, writes through
    Push,              // [size: u64] reserve zeroed bytes
    Pop,               // [size: u64] discard bytes

    // Control flow
    Jump,        // [target: u64]
    JumpIfFalse, // [target: u64] consumes a bool
    Call,        // [args size: u64] pops the callee function id
    Ret,         // [return size: u64]

    // Memory / arenas
    ArenaNew,        // pushes an arena handle
    ArenaDelete,     // pops an arena handle, releases the arena
    ArenaAlloc,      // [elem size: u64] pops handle, moves elem into arena, pushes ptr
    ArenaAllocArray, // [elem size: u64] pops handle + count, pushes span
    ArenaSize,       // pops handle, pushes bytes allocated

    // Diagnostics
    Assert,      // [rom offset: u64][length: u64] pops a bool, aborts when false
    BoundsCheck, // [rom offset: u64][length: u64] pops length, peeks index below
    BuiltinCall, // [builtin id: u64]

    // Comparisons and arithmetic, one opcode per (type, operation)
    CharEq,
    CharNe,

    I32Add,
    I32Sub,
    I32Mul,
    I32Div,
    I32Mod,
    I32Eq,
    I32Ne,
    I32Lt,
    I32Le,
    I32Gt,
    I32Ge,
    I32Neg,

    I64Add,
    I64Sub,
    I64Mul,
    I64Div,
    I64Mod,
    I64Eq,
    I64Ne,
    I64Lt,
    I64Le,
    I64Gt,
    I64Ge,
    I64Neg,

    U64Add,
    U64Sub,
    U64Mul,
    U64Div,
    U64Mod,
    U64Eq,
    U64Ne,
    U64Lt,
    U64Le,
    U64Gt,
    U64Ge,

    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Le,
    F64Gt,
    F64Ge,
    F64Neg,

    BoolAnd,
    BoolOr,
    BoolEq,
    BoolNe,
    BoolNot,

    // Printing
    PrintNull,
    PrintBool,
    PrintChar,
    PrintI32,
    PrintI64,
    PrintU64,
    PrintF64,
    PrintCharSpan,
    PrintPtr,
}

// --- encoding ---------------------------------------------------------------

pub fn emit_op(code: &mut Vec<u8>, op: Op) {
    code.push(op as u8);
}

pub fn emit_u8(code: &mut Vec<u8>, value: u8) {
    code.push(value);
}

pub fn emit_u64(code: &mut Vec<u8>, value: u64) {
    code.extend_from_slice(&value.to_le_bytes());
}

pub fn emit_i64(code: &mut Vec<u8>, value: i64) {
    code.extend_from_slice(&value.to_le_bytes());
}

pub fn emit_i32(code: &mut Vec<u8>, value: i32) {
    code.extend_from_slice(&value.to_le_bytes());
}

pub fn emit_f64(code: &mut Vec<u8>, value: f64) {
    code.extend_from_slice(&value.to_le_bytes());
}

/// Reserve a u64 immediate slot to be patched later; returns its position.
pub fn emit_u64_placeholder(code: &mut Vec<u8>) -> usize {
    let pos = code.len();
    emit_u64(code, 0);
    pos
}

pub fn patch_u64(code: &mut [u8], pos: usize, value: u64) {
    code[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
}

// --- decoding ---------------------------------------------------------------

pub fn read_u8(code: &[u8], ip: &mut usize) -> u8 {
    let value = code[*ip];
    *ip += 1;
    value
}

pub fn read_u64(code: &[u8], ip: &mut usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&code[*ip..*ip + 8]);
    *ip += 8;
    u64::from_le_bytes(bytes)
}

pub fn read_i64(code: &[u8], ip: &mut usize) -> i64 {
    read_u64(code, ip) as i64
}

pub fn read_i32(code: &[u8], ip: &mut usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&code[*ip..*ip + 4]);
    *ip += 4;
    i32::from_le_bytes(bytes)
}

pub fn read_f64(code: &[u8], ip: &mut usize) -> f64 {
    f64::from_bits(read_u64(code, ip))
}
