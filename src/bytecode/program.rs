//! The compiled program image: an ordered list of functions (function 0 is
//! the module entry point `$main`) plus the read-only byte segment holding
//! interned string literals and assert messages.

use crate::bytecode::opcodes::{read_f64, read_i32, read_i64, read_u64, read_u8, Op};
use std::fmt::Write as _;

#[derive(Debug, Clone)]
pub struct BytecodeFunction {
    pub name: String,
    pub id: u64,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct BytecodeProgram {
    pub functions: Vec<BytecodeFunction>,
    pub rom: Vec<u8>,
}

impl BytecodeProgram {
    /// Human-readable listing of every function's decoded instructions.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for function in &self.functions {
            let _ = writeln!(out, "{} (id {}):", function.name, function.id);
            let mut ip = 0;
            while ip < function.code.len() {
                let pos = ip;
                match disassemble_one(&function.code, &mut ip) {
                    Some(text) => {
                        let _ = writeln!(out, "  {:>6}  {}", pos, text);
                    }
                    None => {
                        let _ = writeln!(out, "  {:>6}  <bad opcode {}>", pos, function.code[pos]);
                        break;
                    }
                }
            }
        }
        out
    }
}

fn disassemble_one(code: &[u8], ip: &mut usize) -> Option<String> {
    let op = Op::try_from(read_u8(code, ip)).ok()?;
    let text = match op {
        Op::PushBool | Op::PushChar => format!("{:?} {}", op, read_u8(code, ip)),
        Op::PushI32 => format!("{:?} {}", op, read_i32(code, ip)),
        Op::PushI64 => format!("{:?} {}", op, read_i64(code, ip)),
        Op::PushF64 => format!("{:?} {}", op, read_f64(code, ip)),
        Op::PushU64
        | Op::PushPtrLocal
        | Op::PushPtrGlobal
        | Op::PushFunctionPtr
        | Op::Load
        | Op::Save
        | Op::Push
        | Op::Pop
        | Op::Jump
        | Op::JumpIfFalse
        | Op::Call
        | Op::Ret
        | Op::ArenaAlloc
        | Op::ArenaAllocArray
        | Op::BuiltinCall => format!("{:?} {}", op, read_u64(code, ip)),
        Op::PushStringLiteral | Op::Assert | Op::BoundsCheck => {
            let offset = read_u64(code, ip);
            let length = read_u64(code, ip);
            format!("{:?} rom[{}..{}]", op, offset, offset + length)
        }
        _ => format!("{:?}", op),
    };
    Some(text)
}
