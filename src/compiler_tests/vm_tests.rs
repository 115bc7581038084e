//! Unit tests for the VM, driving hand-assembled programs.

use crate::bytecode::opcodes::{emit_op, emit_u64, emit_u8, Op};
use crate::bytecode::program::{BytecodeFunction, BytecodeProgram};
use crate::compiler::compiler_errors::{CompileError, ErrorType};
use crate::runtime::vm::run_program;

fn function(name: &str, id: u64, build: impl FnOnce(&mut Vec<u8>)) -> BytecodeFunction {
    let mut code = Vec::new();
    build(&mut code);
    BytecodeFunction {
        name: name.to_string(),
        id,
        code,
    }
}

fn run(program: &BytecodeProgram) -> Result<String, CompileError> {
    let mut out = Vec::new();
    run_program(program, &mut out)?;
    Ok(String::from_utf8(out).expect("program output was not utf-8"))
}

fn emit_i64_push(code: &mut Vec<u8>, value: i64) {
    emit_op(code, Op::PushI64);
    crate::bytecode::opcodes::emit_i64(code, value);
}

#[test]
fn test_empty_program_leaves_empty_stack() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "");
}

#[test]
fn test_save_then_load_roundtrip() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            // reserve a slot, write 42 through a pointer, read it back
            emit_op(code, Op::Push);
            emit_u64(code, 8);
            emit_i64_push(code, 42);
            emit_op(code, Op::PushPtrGlobal);
            emit_u64(code, 0);
            emit_op(code, Op::Save);
            emit_u64(code, 8);
            emit_op(code, Op::PushPtrGlobal);
            emit_u64(code, 0);
            emit_op(code, Op::Load);
            emit_u64(code, 8);
            emit_op(code, Op::PrintI64);
            emit_op(code, Op::Pop);
            emit_u64(code, 8);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "42");
}

#[test]
fn test_call_and_ret() {
    let program = BytecodeProgram {
        functions: vec![
            function("$main", 0, |code| {
                emit_i64_push(code, 2);
                emit_i64_push(code, 3);
                emit_op(code, Op::PushFunctionPtr);
                emit_u64(code, 1);
                emit_op(code, Op::Call);
                emit_u64(code, 16);
                emit_op(code, Op::PrintI64);
                emit_op(code, Op::EndProgram);
            }),
            function("add", 1, |code| {
                emit_op(code, Op::PushPtrLocal);
                emit_u64(code, 0);
                emit_op(code, Op::Load);
                emit_u64(code, 8);
                emit_op(code, Op::PushPtrLocal);
                emit_u64(code, 8);
                emit_op(code, Op::Load);
                emit_u64(code, 8);
                emit_op(code, Op::I64Add);
                emit_op(code, Op::Ret);
                emit_u64(code, 8);
            }),
        ],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "5");
}

#[test]
fn test_string_literal_prints_from_rom() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_op(code, Op::PushStringLiteral);
            emit_u64(code, 0);
            emit_u64(code, 5);
            emit_op(code, Op::PrintCharSpan);
            emit_op(code, Op::EndProgram);
        })],
        rom: b"hello".to_vec(),
    };
    assert_eq!(run(&program).unwrap(), "hello");
}

#[test]
fn test_arena_alloc_and_load() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            // a := arena; p := alloc(7); print(p~); delete a
            emit_op(code, Op::ArenaNew);
            emit_i64_push(code, 7);
            emit_op(code, Op::PushPtrGlobal);
            emit_u64(code, 0);
            emit_op(code, Op::Load);
            emit_u64(code, 8);
            emit_op(code, Op::ArenaAlloc);
            emit_u64(code, 8);
            emit_op(code, Op::Load);
            emit_u64(code, 8);
            emit_op(code, Op::PrintI64);
            emit_op(code, Op::PushPtrGlobal);
            emit_u64(code, 0);
            emit_op(code, Op::Load);
            emit_u64(code, 8);
            emit_op(code, Op::ArenaDelete);
            emit_op(code, Op::Pop);
            emit_u64(code, 8);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "7");
}

#[test]
fn test_jump_if_false_branches() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_op(code, Op::PushBool);
            emit_u8(code, 0);
            emit_op(code, Op::JumpIfFalse);
            let jump_pos = code.len();
            emit_u64(code, 0);
            emit_op(code, Op::PrintI64); // skipped
            let target = code.len() as u64;
            crate::bytecode::opcodes::patch_u64(code, jump_pos, target);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "");
}

#[test]
fn test_assert_failure_reports_rom_message() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_op(code, Op::PushBool);
            emit_u8(code, 0);
            emit_op(code, Op::Assert);
            emit_u64(code, 0);
            emit_u64(code, 6);
            emit_op(code, Op::EndProgram);
        })],
        rom: b"line 9".to_vec(),
    };
    let error = run(&program).expect_err("assert should fail");
    assert_eq!(error.error_type, ErrorType::Runtime);
    assert!(error.msg.contains("line 9"));
}

#[test]
fn test_bounds_check_aborts_when_out_of_range() {
    let build = |index: u64| BytecodeProgram {
        functions: vec![function("$main", 0, move |code| {
            emit_op(code, Op::PushU64);
            emit_u64(code, index);
            emit_op(code, Op::PushU64);
            emit_u64(code, 3); // length
            emit_op(code, Op::BoundsCheck);
            emit_u64(code, 0);
            emit_u64(code, 3);
            emit_op(code, Op::Pop);
            emit_u64(code, 8);
            emit_op(code, Op::EndProgram);
        })],
        rom: b"oob".to_vec(),
    };
    assert!(run(&build(1)).is_ok());
    let error = run(&build(3)).expect_err("index == length is out of range");
    assert!(error.msg.contains("oob"));
}

#[test]
fn test_leftover_stack_is_a_compiler_bug() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_i64_push(code, 1);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    let error = run(&program).expect_err("stack must be empty at end");
    assert_eq!(error.error_type, ErrorType::Compiler);
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            code.push(0xEE);
        })],
        rom: Vec::new(),
    };
    let error = run(&program).expect_err("bad opcode");
    assert_eq!(error.error_type, ErrorType::Runtime);
}

#[test]
fn test_division_by_zero_aborts() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_i64_push(code, 1);
            emit_i64_push(code, 0);
            emit_op(code, Op::I64Div);
            emit_op(code, Op::Pop);
            emit_u64(code, 8);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    let error = run(&program).expect_err("division by zero");
    assert!(error.msg.contains("division by zero"));
}

#[test]
fn test_jump_target_out_of_range_is_fatal() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_op(code, Op::Jump);
            emit_u64(code, 9999);
        })],
        rom: Vec::new(),
    };
    assert!(run(&program).is_err());
}

#[test]
fn test_arena_reuse_through_free_list() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            // new arena -> delete it -> new again reuses the slot
            emit_op(code, Op::ArenaNew);
            emit_op(code, Op::ArenaDelete);
            emit_op(code, Op::ArenaNew);
            emit_op(code, Op::ArenaSize);
            emit_op(code, Op::PrintU64);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "0");
}

#[test]
fn test_print_ops_format_values() {
    let program = BytecodeProgram {
        functions: vec![function("$main", 0, |code| {
            emit_op(code, Op::PushBool);
            emit_u8(code, 1);
            emit_op(code, Op::PrintBool);
            emit_op(code, Op::PushChar);
            emit_u8(code, b'x');
            emit_op(code, Op::PrintChar);
            emit_op(code, Op::PushNull);
            emit_op(code, Op::PrintNull);
            emit_op(code, Op::PushF64);
            crate::bytecode::opcodes::emit_f64(code, 1.5);
            emit_op(code, Op::PrintF64);
            emit_op(code, Op::EndProgram);
        })],
        rom: Vec::new(),
    };
    assert_eq!(run(&program).unwrap(), "truexnull1.5");
}
