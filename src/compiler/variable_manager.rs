//! Variable Manager
//!
//! The compile-time view of the runtime stack for one function (or for the
//! globals of the module entry point). Scopes form a LIFO stack owning a
//! contiguous prefix of the frame; declaring a variable advances the offset
//! cursor and popping a scope rewinds it, which the code generator turns
//! into an explicit stack-adjust opcode.
//!
//! Loop scopes carry the break/continue positions waiting to be patched and
//! function scopes carry the declared return type, so `break`, `continue`
//! and `return` lowering can find their targets by walking the scope stack.

use crate::bytecode::opcodes::{emit_op, emit_u64, Op};
use crate::compiler::datatypes::{TypeName, PTR_SIZE};

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub type_name: TypeName,
    pub location: u64,
    pub size: u64,
    pub is_local: bool,
}

#[derive(Debug, Default)]
pub struct LoopScopeInfo {
    /// Byte positions of jump targets to patch to the loop end
    pub breaks: Vec<usize>,
    /// Byte positions of jump targets to patch to the loop start
    pub continues: Vec<usize>,
}

#[derive(Debug)]
pub enum ScopeKind {
    Block,
    Loop(LoopScopeInfo),
    Function { return_type: TypeName },
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub variables: Vec<Variable>,
    start: u64,
    next: u64,
}

impl Scope {
    fn new(kind: ScopeKind, start: u64) -> Self {
        Self {
            kind,
            variables: Vec::new(),
            start,
            next: start,
        }
    }

    /// Total bytes owned by this scope's declarations
    pub fn scope_size(&self) -> u64 {
        self.next - self.start
    }

    fn find(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|var| var.name == name)
    }
}

#[derive(Debug)]
pub struct VariableManager {
    scopes: Vec<Scope>,
    is_local: bool,
}

impl VariableManager {
    /// `is_local` is true for real functions (offsets are frame-relative)
    /// and false for the module entry point (offsets address globals).
    pub fn new(is_local: bool) -> Self {
        Self {
            scopes: Vec::new(),
            is_local,
        }
    }

    pub fn new_scope(&mut self) {
        let start = self.scopes.last().map(|s| s.next).unwrap_or(0);
        self.scopes.push(Scope::new(ScopeKind::Block, start));
    }

    pub fn new_loop_scope(&mut self) {
        let start = self.scopes.last().map(|s| s.next).unwrap_or(0);
        self.scopes
            .push(Scope::new(ScopeKind::Loop(LoopScopeInfo::default()), start));
    }

    pub fn new_function_scope(&mut self, return_type: TypeName) {
        self.scopes
            .push(Scope::new(ScopeKind::Function { return_type }, 0));
    }

    /// Pop the innermost scope and return it so the code generator can emit
    /// the arena releases and the stack-adjust for the bytes it owned.
    pub fn pop_scope(&mut self) -> Scope {
        self.scopes
            .pop()
            .expect("tried to pop a scope, but there are none")
    }

    /// Declare a variable in the innermost scope. Fails if the name already
    /// exists in any currently open scope of this function.
    pub fn declare(&mut self, name: &str, type_name: TypeName, size: u64) -> bool {
        if self.find(name).is_some() {
            return false;
        }
        let is_local = self.is_local;
        let scope = self
            .scopes
            .last_mut()
            .expect("declared a variable with no open scope");
        scope.variables.push(Variable {
            name: name.to_string(),
            type_name,
            location: scope.next,
            size,
            is_local,
        });
        scope.next += size;
        true
    }

    /// Innermost match for the name across all open scopes
    pub fn find(&self, name: &str) -> Option<Variable> {
        for scope in self.scopes.iter().rev() {
            if let Some(var) = scope.find(name) {
                return Some(var.clone());
            }
        }
        None
    }

    pub fn in_loop(&self) -> bool {
        self.scopes
            .iter()
            .rev()
            .any(|s| matches!(s.kind, ScopeKind::Loop(_)))
    }

    pub fn in_function(&self) -> bool {
        self.scopes
            .iter()
            .rev()
            .any(|s| matches!(s.kind, ScopeKind::Function { .. }))
    }

    pub fn get_loop_info(&mut self) -> Option<&mut LoopScopeInfo> {
        for scope in self.scopes.iter_mut().rev() {
            if let ScopeKind::Loop(info) = &mut scope.kind {
                return Some(info);
            }
        }
        None
    }

    pub fn get_function_info(&self) -> Option<&TypeName> {
        for scope in self.scopes.iter().rev() {
            if let ScopeKind::Function { return_type } = &scope.kind {
                return Some(return_type);
            }
        }
        None
    }

    /// Emit the cleanup for jumping out of every scope between the current
    /// point and the enclosing loop scope, without popping the scopes
    /// themselves (code after the break still sees them). Arenas declared in
    /// the skipped scopes are released and their bytes popped.
    pub fn handle_loop_exit(&self, code: &mut Vec<u8>) {
        let mut released = 0;
        for scope in self.scopes.iter().rev() {
            if matches!(scope.kind, ScopeKind::Loop(_)) {
                break;
            }
            emit_arena_releases(scope, code);
            released += scope.scope_size();
        }
        if released > 0 {
            emit_op(code, Op::Pop);
            emit_u64(code, released);
        }
    }

    /// Emit the cleanup for returning out of every open scope down to the
    /// function boundary. The stack bytes themselves are reclaimed by `ret`
    /// truncating to the frame base, so only arena releases are emitted.
    pub fn handle_function_exit(&self, code: &mut Vec<u8>) {
        for scope in self.scopes.iter().rev() {
            emit_arena_releases(scope, code);
            if matches!(scope.kind, ScopeKind::Function { .. }) {
                break;
            }
        }
    }
}

/// Release every arena declared in the scope, most recent first
pub fn emit_arena_releases(scope: &Scope, code: &mut Vec<u8>) {
    for var in scope.variables.iter().rev() {
        if var.type_name.is_arena() {
            emit_op(
                code,
                if var.is_local {
                    Op::PushPtrLocal
                } else {
                    Op::PushPtrGlobal
                },
            );
            emit_u64(code, var.location);
            emit_op(code, Op::Load);
            emit_u64(code, PTR_SIZE);
            emit_op(code, Op::ArenaDelete);
        }
    }
}
