//! The bytecode interpreter.
//!
//! A flat dispatch loop over the opcode byte, decoding in-stream immediates
//! with a local cursor. State is one aggregate: the byte stack, the call
//! frames, the arenas and the open-file table for the file builtins. Program
//! output goes through the caller-supplied writer so tests can capture it.

use crate::bytecode::opcodes::{read_f64, read_i32, read_i64, read_u64, read_u8, Op};
use crate::bytecode::program::BytecodeProgram;
use crate::compiler::compiler_errors::CompileError;
use crate::runtime::memory::{
    heap_arena_index, heap_offset, is_heap_ptr, is_rom_ptr, make_heap_ptr, make_rom_ptr,
    rom_offset, MemoryArena, VmStack,
};
use crate::vm_log;
use std::fs::{File, OpenOptions};
use std::io::Write;

const STACK_LIMIT: usize = 1 << 23;
const FRAME_LIMIT: usize = 10_000;

// Unused bytes at the base of the stack so that no valid stack pointer is
// ever zero, keeping nullptr comparisons unambiguous.
const NULL_GUARD: usize = 8;

#[derive(Debug, Clone, Copy)]
struct CallFrame {
    function: usize,
    ip: usize,
    base_ptr: usize,
}

pub struct Vm<'a, W: Write> {
    program: &'a BytecodeProgram,
    stack: VmStack,
    frames: Vec<CallFrame>,
    arenas: Vec<MemoryArena>,
    arena_free_list: Vec<usize>,
    open_files: Vec<Option<File>>,
    out: &'a mut W,
}

/// Execute a compiled program, writing its output to `out`. Returns an error
/// for assert failures and fatal VM errors; the stack must be empty when the
/// program ends.
pub fn run_program<W: Write>(
    program: &BytecodeProgram,
    out: &mut W,
) -> Result<(), CompileError> {
    if program.functions.is_empty() {
        return Err(CompileError::runtime_error("program has no entry point"));
    }
    let mut stack = VmStack::new(STACK_LIMIT);
    stack.reserve_zeroed(NULL_GUARD)?;
    let mut vm = Vm {
        program,
        stack,
        frames: vec![CallFrame {
            function: 0,
            ip: 0,
            base_ptr: NULL_GUARD,
        }],
        arenas: Vec::new(),
        arena_free_list: Vec::new(),
        open_files: Vec::new(),
        out,
    };
    vm.run()
}

macro_rules! arith {
    ($vm:ident, $pop:ident, $push:ident, $method:ident) => {{
        let rhs = $vm.stack.$pop()?;
        let lhs = $vm.stack.$pop()?;
        $vm.stack.$push(lhs.$method(rhs))?;
    }};
}

macro_rules! divide {
    ($vm:ident, $pop:ident, $push:ident, $method:ident) => {{
        let rhs = $vm.stack.$pop()?;
        let lhs = $vm.stack.$pop()?;
        if rhs == 0 {
            return Err(CompileError::runtime_error("division by zero"));
        }
        $vm.stack.$push(lhs.$method(rhs))?;
    }};
}

macro_rules! compare {
    ($vm:ident, $pop:ident, $op:tt) => {{
        let rhs = $vm.stack.$pop()?;
        let lhs = $vm.stack.$pop()?;
        $vm.stack.push_bool(lhs $op rhs)?;
    }};
}

impl<'a, W: Write> Vm<'a, W> {
    fn run(&mut self) -> Result<(), CompileError> {
        let program = self.program;

        loop {
            let frame_index = self.frames.len() - 1;
            let frame = self.frames[frame_index];
            let code: &[u8] = &program.functions[frame.function].code;

            if frame.ip >= code.len() {
                return Err(CompileError::runtime_error(format!(
                    "program counter ran off the end of '{}'",
                    program.functions[frame.function].name
                )));
            }

            let mut ip = frame.ip;
            let op = Op::try_from(read_u8(code, &mut ip))?;
            vm_log!("{}:{} {:?}", frame.function, frame.ip, op);

            match op {
                Op::EndProgram => {
                    self.out
                        .flush()
                        .map_err(|e| CompileError::runtime_error(e.to_string()))?;
                    if self.stack.size() > NULL_GUARD {
                        return Err(CompileError::compiler_error(format!(
                            "stack size is {} at end of program, bug in the compiler",
                            self.stack.size() - NULL_GUARD
                        )));
                    }
                    return Ok(());
                }

                Op::PushBool | Op::PushChar => {
                    let value = read_u8(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u8(value)?;
                }
                Op::PushI32 => {
                    let value = read_i32(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_i32(value)?;
                }
                Op::PushI64 => {
                    let value = read_i64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_i64(value)?;
                }
                Op::PushU64 => {
                    let value = read_u64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u64(value)?;
                }
                Op::PushF64 => {
                    let value = read_f64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_f64(value)?;
                }
                Op::PushNull => {
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u8(0)?;
                }
                Op::PushNullptr => {
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u64(0)?;
                }
                Op::PushStringLiteral => {
                    let offset = read_u64(code, &mut ip);
                    let length = read_u64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u64(make_rom_ptr(offset))?;
                    self.stack.push_u64(length)?;
                }
                Op::PushPtrLocal => {
                    let offset = read_u64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u64(frame.base_ptr as u64 + offset)?;
                }
                Op::PushPtrGlobal => {
                    let offset = read_u64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u64(NULL_GUARD as u64 + offset)?;
                }
                Op::PushFunctionPtr => {
                    let id = read_u64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.stack.push_u64(id)?;
                }

                Op::Load => {
                    let size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    let ptr = self.stack.pop_u64()?;
                    let bytes = self.read_region(ptr, size)?;
                    self.stack.push_bytes(&bytes)?;
                }
                Op::Save => {
                    let size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    let ptr = self.stack.pop_u64()?;
                    let bytes = self.stack.pop_bytes(size)?;
                    self.write_region(ptr, &bytes)?;
                }
                Op::Push => {
                    let size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    self.stack.reserve_zeroed(size)?;
                }
                Op::Pop => {
                    let size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    self.stack.discard(size)?;
                }

                Op::Jump => {
                    let target = read_u64(code, &mut ip) as usize;
                    self.check_jump_target(frame.function, target)?;
                    self.frames[frame_index].ip = target;
                }
                Op::JumpIfFalse => {
                    let target = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    if !self.stack.pop_bool()? {
                        self.check_jump_target(frame.function, target)?;
                        self.frames[frame_index].ip = target;
                    }
                }
                Op::Call => {
                    let args_size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    let function_id = self.stack.pop_u64()? as usize;
                    if function_id >= program.functions.len() {
                        return Err(CompileError::runtime_error(format!(
                            "call to unknown function id {}",
                            function_id
                        )));
                    }
                    if args_size > self.stack.size() {
                        return Err(CompileError::runtime_error("stack underflow in call"));
                    }
                    if self.frames.len() >= FRAME_LIMIT {
                        return Err(CompileError::runtime_error("call depth limit exceeded"));
                    }
                    self.frames.push(CallFrame {
                        function: function_id,
                        ip: 0,
                        base_ptr: self.stack.size() - args_size,
                    });
                }
                Op::Ret => {
                    let size = read_u64(code, &mut ip) as usize;
                    let frame = self.frames.pop().expect("at least one frame");
                    if self.frames.is_empty() {
                        return Err(CompileError::runtime_error("return with no caller"));
                    }
                    self.stack.collapse_to(frame.base_ptr, size)?;
                }

                Op::ArenaNew => {
                    self.frames[frame_index].ip = ip;
                    let index = match self.arena_free_list.pop() {
                        Some(index) => {
                            self.arenas[index].reset();
                            index
                        }
                        None => {
                            self.arenas.push(MemoryArena::new());
                            self.arenas.len() - 1
                        }
                    };
                    self.stack.push_u64(make_heap_ptr(index, 0))?;
                }
                Op::ArenaDelete => {
                    self.frames[frame_index].ip = ip;
                    let handle = self.stack.pop_u64()?;
                    let index = self.arena_index(handle)?;
                    // releasing twice is fine; the slot is recycled once
                    if self.arenas[index].active {
                        self.arenas[index].active = false;
                        self.arena_free_list.push(index);
                    }
                }
                Op::ArenaAlloc => {
                    let size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    let handle = self.stack.pop_u64()?;
                    let index = self.active_arena_index(handle)?;
                    let offset = self.arena_bump(index, size)?;
                    let bytes = self.stack.pop_bytes(size)?;
                    self.arenas[index].data[offset..offset + size].copy_from_slice(&bytes);
                    self.stack.push_u64(make_heap_ptr(index, offset))?;
                }
                Op::ArenaAllocArray => {
                    let elem_size = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    let handle = self.stack.pop_u64()?;
                    let count = self.stack.pop_u64()? as usize;
                    let index = self.active_arena_index(handle)?;
                    let offset = self.arena_bump(index, elem_size * count)?;
                    let elem = self.stack.pop_bytes(elem_size)?;
                    for i in 0..count {
                        let at = offset + i * elem_size;
                        self.arenas[index].data[at..at + elem_size].copy_from_slice(&elem);
                    }
                    self.stack.push_u64(make_heap_ptr(index, offset))?;
                    self.stack.push_u64(count as u64)?;
                }
                Op::ArenaSize => {
                    self.frames[frame_index].ip = ip;
                    let handle = self.stack.pop_u64()?;
                    let index = self.arena_index(handle)?;
                    self.stack.push_u64(self.arenas[index].next as u64)?;
                }

                Op::Assert => {
                    let offset = read_u64(code, &mut ip) as usize;
                    let length = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    if !self.stack.pop_bool()? {
                        return Err(CompileError::runtime_error(self.rom_message(offset, length)?));
                    }
                }
                Op::BoundsCheck => {
                    let offset = read_u64(code, &mut ip) as usize;
                    let length = read_u64(code, &mut ip) as usize;
                    self.frames[frame_index].ip = ip;
                    let bound = self.stack.pop_u64()?;
                    let index = self.stack.peek_u64()?;
                    if index >= bound {
                        return Err(CompileError::runtime_error(self.rom_message(offset, length)?));
                    }
                }
                Op::BuiltinCall => {
                    let id = read_u64(code, &mut ip);
                    self.frames[frame_index].ip = ip;
                    self.builtin_call(id)?;
                }

                Op::CharEq => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u8, ==);
                }
                Op::CharNe => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u8, !=);
                }

                Op::I32Add => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_i32, push_i32, wrapping_add);
                }
                Op::I32Sub => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_i32, push_i32, wrapping_sub);
                }
                Op::I32Mul => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_i32, push_i32, wrapping_mul);
                }
                Op::I32Div => {
                    self.frames[frame_index].ip = ip;
                    divide!(self, pop_i32, push_i32, wrapping_div);
                }
                Op::I32Mod => {
                    self.frames[frame_index].ip = ip;
                    divide!(self, pop_i32, push_i32, wrapping_rem);
                }
                Op::I32Eq => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i32, ==);
                }
                Op::I32Ne => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i32, !=);
                }
                Op::I32Lt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i32, <);
                }
                Op::I32Le => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i32, <=);
                }
                Op::I32Gt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i32, >);
                }
                Op::I32Ge => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i32, >=);
                }
                Op::I32Neg => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_i32()?;
                    self.stack.push_i32(value.wrapping_neg())?;
                }

                Op::I64Add => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_i64, push_i64, wrapping_add);
                }
                Op::I64Sub => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_i64, push_i64, wrapping_sub);
                }
                Op::I64Mul => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_i64, push_i64, wrapping_mul);
                }
                Op::I64Div => {
                    self.frames[frame_index].ip = ip;
                    divide!(self, pop_i64, push_i64, wrapping_div);
                }
                Op::I64Mod => {
                    self.frames[frame_index].ip = ip;
                    divide!(self, pop_i64, push_i64, wrapping_rem);
                }
                Op::I64Eq => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i64, ==);
                }
                Op::I64Ne => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i64, !=);
                }
                Op::I64Lt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i64, <);
                }
                Op::I64Le => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i64, <=);
                }
                Op::I64Gt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i64, >);
                }
                Op::I64Ge => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_i64, >=);
                }
                Op::I64Neg => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_i64()?;
                    self.stack.push_i64(value.wrapping_neg())?;
                }

                Op::U64Add => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_u64, push_u64, wrapping_add);
                }
                Op::U64Sub => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_u64, push_u64, wrapping_sub);
                }
                Op::U64Mul => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_u64, push_u64, wrapping_mul);
                }
                Op::U64Div => {
                    self.frames[frame_index].ip = ip;
                    divide!(self, pop_u64, push_u64, wrapping_div);
                }
                Op::U64Mod => {
                    self.frames[frame_index].ip = ip;
                    divide!(self, pop_u64, push_u64, wrapping_rem);
                }
                Op::U64Eq => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u64, ==);
                }
                Op::U64Ne => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u64, !=);
                }
                Op::U64Lt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u64, <);
                }
                Op::U64Le => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u64, <=);
                }
                Op::U64Gt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u64, >);
                }
                Op::U64Ge => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_u64, >=);
                }

                Op::F64Add => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_f64, push_f64, add_f64);
                }
                Op::F64Sub => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_f64, push_f64, sub_f64);
                }
                Op::F64Mul => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_f64, push_f64, mul_f64);
                }
                Op::F64Div => {
                    self.frames[frame_index].ip = ip;
                    arith!(self, pop_f64, push_f64, div_f64);
                }
                Op::F64Eq => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_f64, ==);
                }
                Op::F64Ne => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_f64, !=);
                }
                Op::F64Lt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_f64, <);
                }
                Op::F64Le => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_f64, <=);
                }
                Op::F64Gt => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_f64, >);
                }
                Op::F64Ge => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_f64, >=);
                }
                Op::F64Neg => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_f64()?;
                    self.stack.push_f64(-value)?;
                }

                Op::BoolAnd => {
                    self.frames[frame_index].ip = ip;
                    let rhs = self.stack.pop_bool()?;
                    let lhs = self.stack.pop_bool()?;
                    self.stack.push_bool(lhs && rhs)?;
                }
                Op::BoolOr => {
                    self.frames[frame_index].ip = ip;
                    let rhs = self.stack.pop_bool()?;
                    let lhs = self.stack.pop_bool()?;
                    self.stack.push_bool(lhs || rhs)?;
                }
                Op::BoolEq => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_bool, ==);
                }
                Op::BoolNe => {
                    self.frames[frame_index].ip = ip;
                    compare!(self, pop_bool, !=);
                }
                Op::BoolNot => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_bool()?;
                    self.stack.push_bool(!value)?;
                }

                Op::PrintNull => {
                    self.frames[frame_index].ip = ip;
                    self.stack.pop_u8()?;
                    self.print("null")?;
                }
                Op::PrintBool => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_bool()?;
                    self.print(if value { "true" } else { "false" })?;
                }
                Op::PrintChar => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_u8()?;
                    self.print(&(value as char).to_string())?;
                }
                Op::PrintI32 => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_i32()?;
                    self.print(&value.to_string())?;
                }
                Op::PrintI64 => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_i64()?;
                    self.print(&value.to_string())?;
                }
                Op::PrintU64 => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_u64()?;
                    self.print(&value.to_string())?;
                }
                Op::PrintF64 => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_f64()?;
                    self.print(&value.to_string())?;
                }
                Op::PrintCharSpan => {
                    self.frames[frame_index].ip = ip;
                    let length = self.stack.pop_u64()? as usize;
                    let ptr = self.stack.pop_u64()?;
                    let bytes = self.read_region(ptr, length)?;
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    self.print(&text)?;
                }
                Op::PrintPtr => {
                    self.frames[frame_index].ip = ip;
                    let value = self.stack.pop_u64()?;
                    self.print(&format!("{:#018x}", value))?;
                }
            }
        }
    }

    fn print(&mut self, text: &str) -> Result<(), CompileError> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| CompileError::runtime_error(e.to_string()))
    }

    fn rom_message(&self, offset: usize, length: usize) -> Result<String, CompileError> {
        if offset + length > self.program.rom.len() {
            return Err(CompileError::runtime_error(
                "message outside read-only memory",
            ));
        }
        Ok(String::from_utf8_lossy(&self.program.rom[offset..offset + length]).into_owned())
    }

    fn check_jump_target(&self, function: usize, target: usize) -> Result<(), CompileError> {
        if target >= self.program.functions[function].code.len() {
            return Err(CompileError::runtime_error(format!(
                "jump target {} out of range in '{}'",
                target, self.program.functions[function].name
            )));
        }
        Ok(())
    }

    // --- tagged pointer access -----------------------------------------------

    fn read_region(&self, ptr: u64, size: usize) -> Result<Vec<u8>, CompileError> {
        if is_heap_ptr(ptr) {
            let index = heap_arena_index(ptr);
            let offset = heap_offset(ptr);
            let Some(arena) = self.arenas.get(index) else {
                return Err(CompileError::runtime_error("load through a bad arena pointer"));
            };
            if offset + size > arena.data.len() {
                return Err(CompileError::runtime_error("load past the end of an arena"));
            }
            return Ok(arena.data[offset..offset + size].to_vec());
        }
        if is_rom_ptr(ptr) {
            let offset = rom_offset(ptr);
            if offset + size > self.program.rom.len() {
                return Err(CompileError::runtime_error(
                    "load past the end of read-only memory",
                ));
            }
            return Ok(self.program.rom[offset..offset + size].to_vec());
        }
        Ok(self.stack.read_at(ptr as usize, size)?.to_vec())
    }

    fn write_region(&mut self, ptr: u64, bytes: &[u8]) -> Result<(), CompileError> {
        if is_heap_ptr(ptr) {
            let index = heap_arena_index(ptr);
            let offset = heap_offset(ptr);
            let Some(arena) = self.arenas.get_mut(index) else {
                return Err(CompileError::runtime_error("save through a bad arena pointer"));
            };
            if offset + bytes.len() > arena.data.len() {
                return Err(CompileError::runtime_error("save past the end of an arena"));
            }
            arena.data[offset..offset + bytes.len()].copy_from_slice(bytes);
            return Ok(());
        }
        if is_rom_ptr(ptr) {
            return Err(CompileError::runtime_error("cannot save to read-only memory"));
        }
        self.stack.write_at(ptr as usize, bytes)
    }

    // --- arenas --------------------------------------------------------------

    fn arena_index(&self, handle: u64) -> Result<usize, CompileError> {
        if !is_heap_ptr(handle) {
            return Err(CompileError::runtime_error("value is not an arena handle"));
        }
        let index = heap_arena_index(handle);
        if index >= self.arenas.len() {
            return Err(CompileError::runtime_error("bad arena handle"));
        }
        Ok(index)
    }

    fn active_arena_index(&self, handle: u64) -> Result<usize, CompileError> {
        let index = self.arena_index(handle)?;
        if !self.arenas[index].active {
            return Err(CompileError::runtime_error("use of a deleted arena"));
        }
        Ok(index)
    }

    fn arena_bump(&mut self, index: usize, size: usize) -> Result<usize, CompileError> {
        let arena = &mut self.arenas[index];
        if arena.next + size > arena.data.len() {
            return Err(CompileError::runtime_error("arena overflow"));
        }
        let offset = arena.next;
        arena.next += size;
        Ok(offset)
    }

    // --- builtins ------------------------------------------------------------

    fn pop_char_span(&mut self) -> Result<String, CompileError> {
        let length = self.stack.pop_u64()? as usize;
        let ptr = self.stack.pop_u64()?;
        let bytes = self.read_region(ptr, length)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn builtin_call(&mut self, id: u64) -> Result<(), CompileError> {
        match id {
            // sqrt(f64) -> f64
            0 => {
                let value = self.stack.pop_f64()?;
                self.stack.push_f64(value.sqrt())
            }
            // fopen(path, mode) -> u64
            1 => {
                let mode = self.pop_char_span()?;
                let path = self.pop_char_span()?;
                let file = match mode.chars().next() {
                    Some('r') => File::open(&path),
                    Some('w') => File::create(&path),
                    Some('a') => OpenOptions::new().create(true).append(true).open(&path),
                    _ => {
                        return Err(CompileError::runtime_error(format!(
                            "fopen: unknown mode '{}'",
                            mode
                        )))
                    }
                };
                match file {
                    Ok(file) => {
                        self.open_files.push(Some(file));
                        self.stack.push_u64(self.open_files.len() as u64)
                    }
                    Err(_) => self.stack.push_u64(0),
                }
            }
            // fclose(handle) -> null
            2 => {
                let handle = self.stack.pop_u64()? as usize;
                match self.open_files.get_mut(handle.wrapping_sub(1)) {
                    Some(slot) => *slot = None, // dropping the File closes it
                    None => {
                        return Err(CompileError::runtime_error("fclose: bad file handle"))
                    }
                }
                self.stack.push_u8(0)
            }
            // fputs(handle, text) -> null
            3 => {
                let text = self.pop_char_span()?;
                let handle = self.stack.pop_u64()? as usize;
                match self
                    .open_files
                    .get_mut(handle.wrapping_sub(1))
                    .and_then(|slot| slot.as_mut())
                {
                    Some(file) => file
                        .write_all(text.as_bytes())
                        .map_err(|e| CompileError::runtime_error(e.to_string()))?,
                    None => {
                        return Err(CompileError::runtime_error("fputs: bad file handle"))
                    }
                }
                self.stack.push_u8(0)
            }
            // read_file(arena&, path) -> char[]
            4 => {
                let path = self.pop_char_span()?;
                let arena_ptr = self.stack.pop_u64()?;
                let handle_bytes = self.read_region(arena_ptr, 8)?;
                let handle = u64::from_le_bytes(handle_bytes.try_into().expect("8 bytes"));
                let index = self.active_arena_index(handle)?;
                let data = std::fs::read(&path).map_err(|e| {
                    CompileError::runtime_error(format!("read_file: '{}': {}", path, e))
                })?;
                let offset = self.arena_bump(index, data.len())?;
                self.arenas[index].data[offset..offset + data.len()].copy_from_slice(&data);
                self.stack.push_u64(make_heap_ptr(index, offset))?;
                self.stack.push_u64(data.len() as u64)
            }
            _ => Err(CompileError::runtime_error(format!(
                "unknown builtin id {}",
                id
            ))),
        }
    }
}

// f64 arithmetic helpers so the arith! macro has a method to call
trait F64Ops {
    fn add_f64(self, rhs: f64) -> f64;
    fn sub_f64(self, rhs: f64) -> f64;
    fn mul_f64(self, rhs: f64) -> f64;
    fn div_f64(self, rhs: f64) -> f64;
}

impl F64Ops for f64 {
    fn add_f64(self, rhs: f64) -> f64 {
        self + rhs
    }
    fn sub_f64(self, rhs: f64) -> f64 {
        self - rhs
    }
    fn mul_f64(self, rhs: f64) -> f64 {
        self * rhs
    }
    fn div_f64(self, rhs: f64) -> f64 {
        self / rhs
    }
}
