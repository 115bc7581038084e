//! Unit tests for code generation: error reporting and emitted shapes.

use crate::bytecode::opcodes::Op;
use crate::bytecode::program::BytecodeProgram;
use crate::compiler::codegen::compile;
use crate::compiler::compiler_errors::{CompileError, ErrorType};
use crate::compiler::parsers::ast_nodes::Ast;
use crate::compiler::parsers::tokenizer::tokenizer::tokenize;
use crate::settings::Config;

fn compile_with(source: &str, config: &Config) -> Result<BytecodeProgram, CompileError> {
    let mut tokens = tokenize(source)?;
    let ast = Ast::new(&mut tokens)?;
    compile(&ast, config)
}

fn compile_source(source: &str) -> Result<BytecodeProgram, CompileError> {
    compile_with(source, &Config::default())
}

fn expect_error(source: &str, error_type: ErrorType) -> CompileError {
    let error = compile_source(source).expect_err("expected a compile error");
    assert_eq!(
        error.error_type, error_type,
        "wrong error category for: {}",
        error.msg
    );
    error
}

#[test]
fn test_trivial_program_shape() {
    let program = compile_source("").unwrap();
    assert_eq!(program.functions.len(), 1);
    assert_eq!(program.functions[0].name, "$main");
    assert_eq!(program.functions[0].id, 0);
    assert_eq!(program.functions[0].code, vec![Op::EndProgram as u8]);
    assert!(program.rom.is_empty());
}

#[test]
fn test_functions_are_registered_in_order() {
    let program = compile_source(
        "fn one() -> i64 { return 1i64; }\n\
         fn two() -> i64 { return 2i64; }",
    )
    .unwrap();
    let names: Vec<&str> = program.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["$main", "one", "two"]);
}

#[test]
fn test_template_function_compiled_per_instantiation() {
    let program = compile_source(
        "fn id!(T)(x: T) -> T { return x; }\n\
         var a := id!(i64)(1i64);\n\
         var b := id!(bool)(true);\n\
         var c := id!(i64)(2i64);",
    )
    .unwrap();
    let names: Vec<&str> = program.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["$main", "id!(i64)", "id!(bool)"]);
}

#[test]
fn test_member_function_gets_qualified_name() {
    let program = compile_source(
        "struct Point { x: i64; fn get(self: Point const&) -> i64 { return self.x; } }\n\
         var p := Point(1i64);\n\
         var x := p.get();",
    )
    .unwrap();
    assert!(program
        .functions
        .iter()
        .any(|f| f.name == "Point::get"));
}

#[test]
fn test_string_literals_are_deduplicated_in_rom() {
    let program = compile_source(
        "print(\"hello\");\nprint(\"hello\");\nprint(\"hel\");",
    )
    .unwrap();
    // "hel" is a prefix of the interned "hello"
    assert_eq!(program.rom, b"hello".to_vec());
}

#[test]
fn test_assert_message_records_line_number() {
    let program = compile_source("\n\nassert true;").unwrap();
    assert_eq!(program.rom, b"line 3".to_vec());
}

#[test]
fn test_debug_config_adds_array_bounds_checks() {
    let source = "var xs := [1i64, 2i64];\nvar x := xs[0u64];";
    let release = compile_with(source, &Config::default()).unwrap();
    let debug = compile_with(source, &Config::debug()).unwrap();
    assert!(debug.functions[0].code.len() > release.functions[0].code.len());
    assert!(!debug.rom.is_empty());
    assert!(release.rom.is_empty());
}

#[test]
fn test_disassembler_lists_functions() {
    let program = compile_source("fn f() { return; }\nvar x := 1i64;").unwrap();
    let listing = program.disassemble();
    assert!(listing.contains("$main"));
    assert!(listing.contains("f (id 1)"));
    assert!(listing.contains("EndProgram"));
}

// --- diagnostics -------------------------------------------------------------

#[test]
fn test_break_outside_loop() {
    expect_error("break;", ErrorType::Rule);
}

#[test]
fn test_continue_outside_loop() {
    expect_error("continue;", ErrorType::Rule);
}

#[test]
fn test_return_outside_function() {
    expect_error("return 1i64;", ErrorType::Rule);
}

#[test]
fn test_unknown_variable() {
    let error = expect_error("var x := missing;", ErrorType::Rule);
    assert!(error.msg.contains("missing"));
}

#[test]
fn test_unknown_variable_reports_location() {
    let error = expect_error("\nvar x := missing;", ErrorType::Rule);
    assert_eq!(error.location.start_pos.line_number, 2);
}

#[test]
fn test_duplicate_declaration() {
    expect_error("var x := 1i64;\nvar x := 2i64;", ErrorType::Rule);
}

#[test]
fn test_assignment_type_mismatch() {
    let error = expect_error("var x := 1i64;\nx = true;", ErrorType::Type);
    assert!(error.msg.contains("bool"));
    assert!(error.msg.contains("i64"));
}

#[test]
fn test_assignment_to_const() {
    expect_error("const x := 1i64;\nx = 2i64;", ErrorType::Rule);
}

#[test]
fn test_binary_op_operand_mismatch() {
    expect_error("var x := 1i64 + 1u64;", ErrorType::Type);
}

#[test]
fn test_constructor_arity_mismatch() {
    expect_error(
        "struct Point { x: i64; y: i64; }\nvar p := Point(1i64);",
        ErrorType::Type,
    );
}

#[test]
fn test_missing_field() {
    expect_error(
        "struct Point { x: i64; }\nvar p := Point(1i64);\nvar y := p.y;",
        ErrorType::Type,
    );
}

#[test]
fn test_address_of_rvalue() {
    expect_error("var p := (1i64 + 2i64)&;", ErrorType::Rule);
}

#[test]
fn test_non_exhaustive_return() {
    expect_error(
        "fn f(x: bool) -> i64 { if x { return 1i64; } }",
        ErrorType::Type,
    );
}

#[test]
fn test_if_else_chains_count_as_returning() {
    assert!(compile_source(
        "fn f(x: bool) -> i64 { if x { return 1i64; } else { return 2i64; } }"
    )
    .is_ok());
}

#[test]
fn test_wrong_template_arity() {
    expect_error(
        "fn id!(T)(x: T) -> T { return x; }\nvar a := id!(i64, bool)(1i64);",
        ErrorType::Type,
    );
}

#[test]
fn test_arenas_cannot_be_copied() {
    expect_error("arena a;\nvar b := a;", ErrorType::Type);
}

#[test]
fn test_delete_requires_an_arena() {
    expect_error("var x := 1i64;\ndelete x;", ErrorType::Type);
}

#[test]
fn test_empty_array_literal_rejected() {
    expect_error("var xs := [];", ErrorType::Syntax);
}

#[test]
fn test_condition_must_be_bool() {
    expect_error("if 1i64 { }", ErrorType::Type);
    expect_error("while 1i64 { }", ErrorType::Type);
}

#[test]
fn test_print_placeholder_count_checked() {
    expect_error("print(\"{} {}\", 1i64);", ErrorType::Type);
}

#[test]
fn test_subscript_requires_u64() {
    expect_error("var xs := [1i64, 2i64];\nvar x := xs[0i64];", ErrorType::Type);
}

#[test]
fn test_const_member_binding_enforced() {
    expect_error(
        "struct Counter { n: i64; fn bump(self: Counter&) { self.n = self.n + 1i64; } }\n\
         const c := Counter(0i64);\n\
         c.bump();",
        ErrorType::Type,
    );
}

#[test]
fn test_span_requires_sequence() {
    expect_error("var x := 1i64;\nvar s := x[:];", ErrorType::Type);
}

#[test]
fn test_const_array_elements_are_const() {
    expect_error(
        "const xs := [1i64, 2i64];\nxs[0u64] = 3i64;",
        ErrorType::Rule,
    );
}

#[test]
fn test_const_propagates_through_spans() {
    // spanning a const array yields a span of const elements
    expect_error(
        "const xs := [1i64, 2i64];\nvar s := xs[:];\ns[0u64] = 3i64;",
        ErrorType::Rule,
    );
}
