//! The builtin function table.
//!
//! A numbered list of native functions callable from Vetch code. Ids are
//! stable: new entries are appended, never reordered. The compiler uses the
//! signatures for call checking and emits `builtin_call <id>`; the VM
//! dispatches on the id.

use crate::compiler::datatypes::TypeName;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub id: u64,
    pub param_types: Vec<TypeName>,
    pub return_type: TypeName,
}

fn construct_builtin_table() -> Vec<Builtin> {
    let char_span = TypeName::char().add_const().add_span().add_const();

    let mut builtins = Vec::new();
    let mut add = |name: &'static str, param_types: Vec<TypeName>, return_type: TypeName| {
        let id = builtins.len() as u64;
        builtins.push(Builtin {
            name,
            id,
            param_types,
            return_type,
        });
    };

    add("sqrt", vec![TypeName::f64()], TypeName::f64());
    add(
        "fopen",
        vec![char_span.clone(), char_span.clone()],
        TypeName::u64(),
    );
    add("fclose", vec![TypeName::u64()], TypeName::null());
    add(
        "fputs",
        vec![TypeName::u64(), char_span.clone()],
        TypeName::null(),
    );
    // reads a whole file into the arena, yielding a char span
    add(
        "read_file",
        vec![TypeName::arena().add_ptr(), char_span],
        TypeName::char().add_span(),
    );

    builtins
}

static BUILTINS: OnceLock<Vec<Builtin>> = OnceLock::new();

pub fn get_builtins() -> &'static [Builtin] {
    BUILTINS.get_or_init(construct_builtin_table)
}

pub fn get_builtin(name: &str) -> Option<&'static Builtin> {
    get_builtins().iter().find(|builtin| builtin.name == name)
}
