//! Unit tests for the variable manager.

use crate::bytecode::opcodes::Op;
use crate::compiler::datatypes::TypeName;
use crate::compiler::variable_manager::VariableManager;

#[test]
fn test_declare_assigns_sequential_offsets() {
    let mut manager = VariableManager::new(true);
    manager.new_scope();

    assert!(manager.declare("a", TypeName::i64(), 8));
    assert!(manager.declare("b", TypeName::bool(), 1));
    assert!(manager.declare("c", TypeName::i32(), 4));

    assert_eq!(manager.find("a").unwrap().location, 0);
    assert_eq!(manager.find("b").unwrap().location, 8);
    assert_eq!(manager.find("c").unwrap().location, 9);
    assert_eq!(manager.find("c").unwrap().size, 4);
}

#[test]
fn test_duplicate_declaration_fails() {
    let mut manager = VariableManager::new(true);
    manager.new_scope();
    assert!(manager.declare("a", TypeName::i64(), 8));
    assert!(!manager.declare("a", TypeName::i64(), 8));

    // also fails from a nested scope while the outer one is open
    manager.new_scope();
    assert!(!manager.declare("a", TypeName::bool(), 1));
}

#[test]
fn test_nested_scope_offsets_continue() {
    let mut manager = VariableManager::new(true);
    manager.new_scope();
    manager.declare("a", TypeName::i64(), 8);

    manager.new_scope();
    manager.declare("b", TypeName::i64(), 8);
    assert_eq!(manager.find("b").unwrap().location, 8);

    let popped = manager.pop_scope();
    assert_eq!(popped.scope_size(), 8);

    // after the pop the name is gone and its bytes are reusable
    assert!(manager.find("b").is_none());
    manager.new_scope();
    manager.declare("c", TypeName::i64(), 8);
    assert_eq!(manager.find("c").unwrap().location, 8);
}

#[test]
fn test_find_returns_stable_result_until_pop() {
    let mut manager = VariableManager::new(true);
    manager.new_scope();
    manager.declare("a", TypeName::u64(), 8);

    let first = manager.find("a").unwrap();
    let second = manager.find("a").unwrap();
    assert_eq!(first.location, second.location);
    assert_eq!(first.type_name, second.type_name);
}

#[test]
fn test_loop_and_function_scope_queries() {
    let mut manager = VariableManager::new(true);
    assert!(!manager.in_function());
    assert!(!manager.in_loop());

    manager.new_function_scope(TypeName::i64());
    assert!(manager.in_function());
    assert!(!manager.in_loop());
    assert_eq!(*manager.get_function_info().unwrap(), TypeName::i64());

    manager.new_loop_scope();
    assert!(manager.in_loop());
    assert!(manager.get_loop_info().is_some());

    manager.pop_scope();
    assert!(!manager.in_loop());
}

#[test]
fn test_function_scope_restarts_offsets() {
    let mut manager = VariableManager::new(true);
    manager.new_function_scope(TypeName::null());
    manager.declare("arg", TypeName::i64(), 8);
    assert_eq!(manager.find("arg").unwrap().location, 0);
}

#[test]
fn test_handle_loop_exit_pops_inner_scopes_only() {
    let mut manager = VariableManager::new(true);
    manager.new_scope();
    manager.declare("outer", TypeName::i64(), 8);
    manager.new_loop_scope();
    manager.new_scope();
    manager.declare("inner", TypeName::i64(), 8);
    manager.declare("inner2", TypeName::i64(), 8);

    let mut code = Vec::new();
    manager.handle_loop_exit(&mut code);

    // one pop of the 16 bytes above the loop scope
    assert_eq!(code[0], Op::Pop as u8);
    assert_eq!(u64::from_le_bytes(code[1..9].try_into().unwrap()), 16);

    // the scopes themselves are untouched
    assert!(manager.find("inner").is_some());
    assert!(manager.in_loop());
}

#[test]
fn test_handle_loop_exit_releases_arenas() {
    let mut manager = VariableManager::new(true);
    manager.new_loop_scope();
    manager.new_scope();
    manager.declare("a", TypeName::arena(), 8);

    let mut code = Vec::new();
    manager.handle_loop_exit(&mut code);

    // push the handle address, load it, release, then pop the scope bytes
    assert_eq!(code[0], Op::PushPtrLocal as u8);
    assert_eq!(code[9], Op::Load as u8);
    assert_eq!(code[18], Op::ArenaDelete as u8);
    assert_eq!(code[19], Op::Pop as u8);
}

#[test]
fn test_globals_are_not_local() {
    let mut manager = VariableManager::new(false);
    manager.new_scope();
    manager.declare("g", TypeName::i64(), 8);
    assert!(!manager.find("g").unwrap().is_local);

    let mut locals = VariableManager::new(true);
    locals.new_scope();
    locals.declare("l", TypeName::i64(), 8);
    assert!(locals.find("l").unwrap().is_local);
}
