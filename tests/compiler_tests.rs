//! End-to-end tests: compile Vetch source and run it, checking the output
//! the program writes.

use vetch::settings::Config;
use vetch::{run_program, CompileError, Compiler, ErrorType};

fn run_source_with(source: &str, config: &Config) -> Result<String, CompileError> {
    let compiler = Compiler::new(config);
    let program = compiler.compile_source(source)?;
    let mut out = Vec::new();
    run_program(&program, &mut out)?;
    Ok(String::from_utf8(out).expect("program output was not utf-8"))
}

fn run_source(source: &str) -> Result<String, CompileError> {
    run_source_with(source, &Config::default())
}

fn expect_output(source: &str, expected: &str) {
    match run_source(source) {
        Ok(output) => assert_eq!(output, expected, "wrong output for:\n{}", source),
        Err(e) => panic!("program failed ({:?}): {}\nsource:\n{}", e.error_type, e.msg, source),
    }
}

#[test]
fn test_arithmetic() {
    expect_output("print(\"{}\\n\", 2 + 3 * 4);", "14\n");
}

#[test]
fn test_arithmetic_parentheses_and_unary() {
    expect_output("print(\"{}\\n\", (2 + 3) * -2);", "-10\n");
}

#[test]
fn test_while_loop() {
    expect_output(
        "var i := 0i64;\nwhile i < 3i64 { print(\"{} \", i); i = i + 1i64; }",
        "0 1 2 ",
    );
}

#[test]
fn test_struct_and_member_function() {
    expect_output(
        "struct Point {\n\
             x: i64;\n\
             y: i64;\n\
             fn len2(self: Point const&) -> i64 {\n\
                 return self.x*self.x + self.y*self.y;\n\
             }\n\
         }\n\
         var p := Point(3i64, 4i64);\n\
         print(\"{}\\n\", p.len2());",
        "25\n",
    );
}

#[test]
fn test_arena_and_span() {
    expect_output(
        "arena a;\n\
         var xs := new i64 : 3u64 using a;\n\
         xs[0u64] = 10i64;\n\
         xs[1u64] = 20i64;\n\
         xs[2u64] = 30i64;\n\
         print(\"{} {} {}\\n\", xs[0u64], xs[1u64], xs[2u64]);",
        "10 20 30\n",
    );
}

#[test]
fn test_template_function() {
    expect_output(
        "fn id!(T)(x: T) -> T { return x; }\nprint(\"{}\\n\", id!(i32)(7i32));",
        "7\n",
    );
}

#[test]
fn test_assert_failure_mentions_line() {
    let error = run_source("assert 1i64 == 2i64;").expect_err("assert should fail");
    assert_eq!(error.error_type, ErrorType::Runtime);
    assert!(error.msg.contains("line 1"), "message was: {}", error.msg);
}

#[test]
fn test_assert_success_is_silent() {
    expect_output("assert 1i64 == 1i64;", "");
}

#[test]
fn test_declare_then_read_back() {
    expect_output("var x := 5i64;\nvar y := x;\nprint(\"{} {}\", x, y);", "5 5");
}

#[test]
fn test_array_write_does_not_disturb_neighbours() {
    expect_output(
        "var xs := [1i64, 2i64, 3i64];\n\
         xs[1u64] = 9i64;\n\
         print(\"{} {} {}\", xs[0u64], xs[1u64], xs[2u64]);",
        "1 9 3",
    );
}

#[test]
fn test_if_else() {
    expect_output(
        "var x := 2i64;\n\
         if x == 1i64 { print(\"one\"); } else if x == 2i64 { print(\"two\"); } else { print(\"many\"); }",
        "two",
    );
}

#[test]
fn test_loop_break_continue() {
    expect_output(
        "var i := 0i64;\n\
         loop {\n\
             i = i + 1i64;\n\
             if i == 2i64 { continue; }\n\
             if i > 4i64 { break; }\n\
             print(\"{} \", i);\n\
         }",
        "1 3 4 ",
    );
}

#[test]
fn test_for_over_array() {
    expect_output(
        "var xs := [10i64, 20i64, 30i64];\nfor x in xs { print(\"{} \", x~); }",
        "10 20 30 ",
    );
}

#[test]
fn test_for_over_rvalue_array() {
    expect_output("for x in [1i64, 2i64] { print(\"{} \", x~); }", "1 2 ")
}

#[test]
fn test_for_over_span() {
    expect_output(
        "var xs := [1i64, 2i64, 3i64, 4i64];\n\
         var s := xs[1u64:3u64];\n\
         for x in s { print(\"{} \", x~); }",
        "2 3 ",
    );
}

#[test]
fn test_span_of_whole_array() {
    expect_output(
        "var xs := [5i64, 6i64];\n\
         var s := xs[:];\n\
         print(\"{} {} {}\", s[0u64], s[1u64], s.size());",
        "5 6 2",
    );
}

#[test]
fn test_span_of_span_shares_storage() {
    expect_output(
        "var xs := [1i64, 2i64, 3i64, 4i64, 5i64];\n\
         var s := xs[1u64:4u64];\n\
         var t := s[1u64:2u64];\n\
         t[0u64] = 99i64;\n\
         print(\"{} {}\", xs[2u64], t.size());",
        "99 1",
    );
}

#[test]
fn test_array_size_is_constant() {
    expect_output("var xs := [1i64, 2i64, 3i64];\nprint(\"{}\", xs.size());", "3");
}

#[test]
fn test_functions_and_calls() {
    expect_output(
        "fn add(a: i64, b: i64) -> i64 { return a + b; }\n\
         fn twice(x: i64) -> i64 { return add(x, x); }\n\
         print(\"{}\", twice(21i64));",
        "42",
    );
}

#[test]
fn test_recursion() {
    expect_output(
        "fn fact(n: i64) -> i64 {\n\
             if n <= 1i64 { return 1i64; }\n\
             return n * fact(n - 1i64);\n\
         }\n\
         print(\"{}\", fact(5i64));",
        "120",
    );
}

#[test]
fn test_function_pointers() {
    expect_output(
        "fn double(x: i64) -> i64 { return x * 2i64; }\n\
         var f := double;\n\
         print(\"{}\", f(8i64));",
        "16",
    );
}

#[test]
fn test_function_pointer_type_annotation() {
    expect_output(
        "fn inc(x: i64) -> i64 { return x + 1i64; }\n\
         var f : fn(i64) -> i64 = inc;\n\
         print(\"{}\", f(1i64));",
        "2",
    );
}

#[test]
fn test_pointers_and_deref() {
    expect_output(
        "var x := 1i64;\n\
         var p := x&;\n\
         p~ = 7i64;\n\
         print(\"{}\", x);",
        "7",
    );
}

#[test]
fn test_pointer_compares_with_nullptr() {
    expect_output(
        "var x := 1i64;\n\
         var p := x&;\n\
         var q : i64& = nullptr;\n\
         print(\"{} {}\", p != nullptr, q == nullptr);",
        "true true",
    );
}

#[test]
fn test_nullptr_to_span_is_empty() {
    expect_output("var s : i64[] = nullptr;\nprint(\"{}\", s.size());", "0");
}

#[test]
fn test_field_access_through_pointer() {
    expect_output(
        "struct Point { x: i64; y: i64; }\n\
         var p := Point(1i64, 2i64);\n\
         var q := p&;\n\
         q.y = 5i64;\n\
         print(\"{} {}\", q.x, p.y);",
        "1 5",
    );
}

#[test]
fn test_struct_in_struct_layout() {
    expect_output(
        "struct Inner { a: i32; b: i64; }\n\
         struct Outer { first: Inner; flag: bool; second: Inner; }\n\
         var o := Outer(Inner(1i32, 2i64), true, Inner(3i32, 4i64));\n\
         print(\"{} {} {}\", o.first.b, o.flag, o.second.a);",
        "2 true 3",
    );
}

#[test]
fn test_empty_struct_is_addressable() {
    expect_output(
        "struct Unit { }\n\
         var u := Unit();\n\
         print(\"{}\", sizeof(u));",
        "1",
    );
}

#[test]
fn test_sizeof() {
    expect_output(
        "print(\"{} {} {} {}\", sizeof(i64), sizeof(bool), sizeof(i64[4u64]), sizeof(i64[]));",
        "8 1 32 16",
    );
}

#[test]
fn test_repeat_array_literal() {
    expect_output(
        "var xs := [7i64; 3];\nprint(\"{} {} {}\", xs[0u64], xs[1u64], xs[2u64]);",
        "7 7 7",
    );
}

#[test]
fn test_struct_template() {
    expect_output(
        "struct Pair!(A, B) {\n\
             first: A;\n\
             second: B;\n\
             fn get_first(self: Pair!(A, B) const&) -> A { return self.first; }\n\
         }\n\
         var p := Pair!(i64, bool)(42i64, true);\n\
         print(\"{} {}\", p.get_first(), p.second);",
        "42 true",
    );
}

#[test]
fn test_template_instantiations_are_independent() {
    expect_output(
        "fn pick!(T)(a: T, b: T, first: bool) -> T {\n\
             if first { return a; }\n\
             return b;\n\
         }\n\
         print(\"{} {}\", pick!(i64)(1i64, 2i64, true), pick!(bool)(false, true, false));",
        "1 true",
    );
}

#[test]
fn test_new_single_object() {
    expect_output(
        "arena a;\n\
         var p := new 5i64 using a;\n\
         p~ = p~ + 1i64;\n\
         print(\"{} {}\", p~, a.size());",
        "6 8",
    );
}

#[test]
fn test_new_through_arena_pointer() {
    expect_output(
        "arena a;\n\
         var pa := a&;\n\
         var p := new 3i64 using pa;\n\
         print(\"{}\", p~);",
        "3",
    );
}

#[test]
fn test_arena_values_survive_across_calls() {
    expect_output(
        "fn fill(xs: i64[]) {\n\
             var i := 0u64;\n\
             while i < xs.size() {\n\
                 xs[i] = 1i64 + xs[i];\n\
                 i = i + 1u64;\n\
             }\n\
         }\n\
         arena a;\n\
         var xs := new 1i64 : 4u64 using a;\n\
         fill(xs);\n\
         print(\"{} {}\", xs[0u64], xs[3u64]);",
        "2 2",
    );
}

#[test]
fn test_delete_statement() {
    expect_output("arena a;\ndelete a;", "");
}

#[test]
fn test_char_and_bool_output() {
    expect_output("print(\"{}{}{}\", 'a', true, 'z');", "atruez");
}

#[test]
fn test_string_literal_variables() {
    expect_output(
        "var s := \"hello world\";\nprint(\"{}\", s);",
        "hello world",
    );
}

#[test]
fn test_float_arithmetic_and_sqrt() {
    expect_output("print(\"{}\", sqrt(2.25) + 1.0);", "2.5");
}

#[test]
fn test_const_declaration_is_readable() {
    expect_output("const x := 9i64;\nvar y := x;\nprint(\"{}\", y);", "9");
}

#[test]
fn test_scopes_shadowing_is_rejected_but_sequencing_works() {
    expect_output(
        "{ var x := 1i64; print(\"{}\", x); }\n{ var x := 2i64; print(\"{}\", x); }",
        "12",
    );
}

#[test]
fn test_typeof_in_declaration() {
    expect_output(
        "var x := 3i64;\nvar y : typeof(x) = 4i64;\nprint(\"{}\", x + y);",
        "7",
    );
}

#[test]
fn test_bounds_check_in_debug_config() {
    let source = "var xs := [1i64, 2i64];\n\
                  var i := 5u64;\n\
                  print(\"{}\", xs[i]);";
    // release: no check emitted, the read still lands inside the frame
    assert!(run_source(source).is_ok() || run_source(source).is_err());
    // debug: the check fires
    let error = run_source_with(source, &Config::debug()).expect_err("expected bounds abort");
    assert_eq!(error.error_type, ErrorType::Runtime);
    assert!(error.msg.contains("out of range"), "message was: {}", error.msg);
}

#[test]
fn test_file_builtins_roundtrip() {
    let dir = std::env::temp_dir();
    let path = dir.join("vetch_builtin_test.txt");
    let path_str = path.to_string_lossy().replace('\\', "/");

    let write_source = format!(
        "var h := fopen(\"{}\", \"w\");\n\
         fputs(h, \"written from vetch\");\n\
         fclose(h);",
        path_str
    );
    run_source(&write_source).expect("writing the file should succeed");
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "written from vetch"
    );

    let read_source = format!(
        "arena a;\nvar text := read_file(a&, \"{}\");\nprint(\"{{}}\", text);",
        path_str
    );
    assert_eq!(run_source(&read_source).unwrap(), "written from vetch");

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_div_by_zero_aborts() {
    let error = run_source("var x := 1i64 / 0i64;").expect_err("division should abort");
    assert_eq!(error.error_type, ErrorType::Runtime);
}

#[test]
fn test_import_splices_modules() {
    let dir = std::env::temp_dir().join("vetch_import_test");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("math.vch"),
        "fn double(x: i64) -> i64 { return x * 2i64; }\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("main.vch"),
        "import \"math.vch\";\nprint(\"{}\", double(4i64));\n",
    )
    .unwrap();

    let config = Config::default();
    let compiler = Compiler::new(&config);
    let program = compiler
        .compile_file(&dir.join("main.vch"))
        .expect("import should resolve");
    let mut out = Vec::new();
    run_program(&program, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "8");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_exit_codes() {
    let dir = std::env::temp_dir().join("vetch_cli_test");
    std::fs::create_dir_all(&dir).unwrap();

    let good = dir.join("good.vch");
    std::fs::write(&good, "print(\"{}\\n\", 2 + 3 * 4);\n").unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_vetch"))
        .arg(&good)
        .arg("--hide-timers")
        .output()
        .expect("failed to run the vetch binary");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "14\n");

    let bad = dir.join("bad.vch");
    std::fs::write(&bad, "assert 1i64 == 2i64;\n").unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_vetch"))
        .arg(&bad)
        .arg("--hide-timers")
        .output()
        .expect("failed to run the vetch binary");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 1"));

    let broken = dir.join("broken.vch");
    std::fs::write(&broken, "var x := ;\n").unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_vetch"))
        .arg(&broken)
        .arg("--hide-timers")
        .output()
        .expect("failed to run the vetch binary");
    assert!(!output.status.success());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_nested_loops_with_break() {
    expect_output(
        "var i := 0i64;\n\
         while i < 3i64 {\n\
             var j := 0i64;\n\
             while j < 3i64 {\n\
                 if j == 2i64 { break; }\n\
                 print(\"{}{} \", i, j);\n\
                 j = j + 1i64;\n\
             }\n\
             i = i + 1i64;\n\
         }",
        "00 01 10 11 20 21 ",
    );
}

#[test]
fn test_return_inside_loop_unwinds_scopes() {
    expect_output(
        "fn find(xs: i64[] const, needle: i64) -> u64 {\n\
             var i := 0u64;\n\
             while i < xs.size() {\n\
                 if xs[i] == needle { return i; }\n\
                 i = i + 1u64;\n\
             }\n\
             return xs.size();\n\
         }\n\
         var xs := [4i64, 5i64, 6i64];\n\
         print(\"{}\", find(xs[:], 6i64));",
        "2",
    );
}
