//! Registry of struct definitions and their layouts.
//!
//! Structs are keyed by canonical name (template instantiations include
//! their `!(...)` suffix, so `Pair!(i64, bool)` is its own entry). Fields
//! are laid out tightly in declaration order with no padding. The template
//! bindings used to instantiate a struct are stashed alongside its fields
//! so that member functions compiled later can still resolve the template
//! parameter names.

use crate::compiler::compiler_errors::CompileError;
use crate::compiler::datatypes::{TypeKind, TypeName, PTR_SIZE};
use crate::return_compiler_error;
use rustc_hash::FxHashMap;

/// Template parameter name -> bound concrete type
pub type TemplateMap = FxHashMap<String, TypeName>;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub type_name: TypeName,
}

#[derive(Debug, Clone)]
struct StructInfo {
    fields: Vec<Field>,
    templates: TemplateMap,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    structs: FxHashMap<String, StructInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            structs: FxHashMap::default(),
        }
    }

    /// Register a struct under its canonical name. Returns false if the name
    /// is already taken.
    pub fn add(&mut self, name: &str, fields: Vec<Field>, templates: TemplateMap) -> bool {
        if self.structs.contains_key(name) {
            return false;
        }
        self.structs
            .insert(name.to_string(), StructInfo { fields, templates });
        true
    }

    /// Whether every struct named anywhere inside the type is registered.
    pub fn contains(&self, type_name: &TypeName) -> bool {
        match &type_name.kind {
            TypeKind::Fundamental(_)
            | TypeKind::FunctionPtr { .. }
            | TypeKind::Arena
            | TypeKind::TypeValue(_)
            | TypeKind::Builtin { .. }
            | TypeKind::BoundMethod { .. }
            | TypeKind::BoundBuiltinMethod { .. } => true,
            TypeKind::Struct(name) => self.structs.contains_key(name),
            TypeKind::Array(inner, _) | TypeKind::Span(inner) | TypeKind::Ptr(inner) => {
                self.contains(inner)
            }
        }
    }

    /// Size in bytes of a value of this type on the runtime stack.
    pub fn size_of(&self, type_name: &TypeName) -> Result<u64, CompileError> {
        match &type_name.kind {
            TypeKind::Fundamental(fundamental) => Ok(fundamental.size()),
            TypeKind::Struct(name) => {
                let Some(info) = self.structs.get(name) else {
                    return_compiler_error!("queried size of unknown type '{}'", name);
                };
                let mut size = 0;
                for field in &info.fields {
                    size += self.size_of(&field.type_name)?;
                }
                // An empty struct still occupies one byte so it is addressable
                Ok(size.max(1))
            }
            TypeKind::Array(inner, count) => Ok(self.size_of(inner)? * count),
            TypeKind::Span(_) => Ok(PTR_SIZE + 8),
            TypeKind::Ptr(_) | TypeKind::FunctionPtr { .. } | TypeKind::Arena => Ok(PTR_SIZE),
            TypeKind::TypeValue(_)
            | TypeKind::Builtin { .. }
            | TypeKind::BoundMethod { .. }
            | TypeKind::BoundBuiltinMethod { .. } => {
                return_compiler_error!("type '{}' has no runtime size", type_name)
            }
        }
    }

    /// Fields of a struct in declaration order. Empty for non-structs.
    pub fn fields_of(&self, type_name: &TypeName) -> Vec<Field> {
        if let TypeKind::Struct(name) = &type_name.kind {
            if let Some(info) = self.structs.get(name) {
                return info.fields.clone();
            }
        }
        Vec::new()
    }

    /// Template bindings that were active when the struct was registered.
    pub fn templates_of(&self, type_name: &TypeName) -> TemplateMap {
        if let TypeKind::Struct(name) = &type_name.kind {
            if let Some(info) = self.structs.get(name) {
                return info.templates.clone();
            }
        }
        TemplateMap::default()
    }

    /// Byte offset of a field and its type, scanning declared fields in
    /// order and summing sizes. None if the struct has no such field.
    pub fn field_offset(
        &self,
        type_name: &TypeName,
        field_name: &str,
    ) -> Result<Option<(u64, TypeName)>, CompileError> {
        let mut offset = 0;
        for field in self.fields_of(type_name) {
            if field.name == field_name {
                return Ok(Some((offset, field.type_name)));
            }
            offset += self.size_of(&field.type_name)?;
        }
        Ok(None)
    }
}
