//! The Vetch type model.
//!
//! A [`TypeName`] is a tree: fundamentals and struct names at the leaves,
//! arrays / spans / pointers / function pointers as the structural layers.
//! Every node carries an orthogonal `is_const` flag. Struct equality is
//! nominal by canonical name (template instantiations include their
//! `!(...)` suffix in the name); everything else is structural.
//!
//! Compile-time-only variants (`TypeValue`, `Builtin`, `BoundMethod`,
//! `BoundBuiltinMethod`) never correspond to runtime bytes; they exist so
//! that the expression compiler can dispatch calls on the callee's type.

use std::fmt;
use std::fmt::Display;

/// Width of a runtime pointer in bytes. Spans are a pointer plus a u64
/// length; function pointers are a function id stored in pointer width.
pub const PTR_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fundamental {
    Null,
    Bool,
    Char,
    I32,
    I64,
    U64,
    F64,
    NullPtr,
}

impl Fundamental {
    pub fn size(self) -> u64 {
        match self {
            Fundamental::Null | Fundamental::Bool | Fundamental::Char => 1,
            Fundamental::I32 => 4,
            Fundamental::I64 | Fundamental::U64 | Fundamental::F64 | Fundamental::NullPtr => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Fundamental::Null => "null",
            Fundamental::Bool => "bool",
            Fundamental::Char => "char",
            Fundamental::I32 => "i32",
            Fundamental::I64 => "i64",
            Fundamental::U64 => "u64",
            Fundamental::F64 => "f64",
            Fundamental::NullPtr => "nullptr",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Fundamental(Fundamental),

    /// Canonical struct name, including any `!(...)` template suffix
    Struct(String),

    Array(Box<TypeName>, u64),
    Span(Box<TypeName>),
    Ptr(Box<TypeName>),

    FunctionPtr {
        param_types: Vec<TypeName>,
        return_type: Box<TypeName>,
    },

    /// Owns a heap region; non-copyable
    Arena,

    /// Compile-time only: a type used as a value, e.g. `i64` in `sizeof(i64)`
    TypeValue(Box<TypeName>),

    /// Compile-time only: a named builtin resolved as a call target
    Builtin {
        name: String,
        id: u64,
        param_types: Vec<TypeName>,
        return_type: Box<TypeName>,
    },

    /// Compile-time only: a member function with the self pointer already
    /// pushed beneath the call's arguments
    BoundMethod {
        function_id: u64,
        param_types: Vec<TypeName>,
        return_type: Box<TypeName>,
    },

    /// Compile-time only: `.size` on arrays, spans and arenas
    BoundBuiltinMethod {
        name: String,
        receiver: Box<TypeName>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub kind: TypeKind,
    pub is_const: bool,
}

impl TypeName {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            is_const: false,
        }
    }

    pub fn null() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::Null))
    }
    pub fn bool() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::Bool))
    }
    pub fn char() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::Char))
    }
    pub fn i32() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::I32))
    }
    pub fn i64() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::I64))
    }
    pub fn u64() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::U64))
    }
    pub fn f64() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::F64))
    }
    pub fn nullptr() -> Self {
        TypeName::new(TypeKind::Fundamental(Fundamental::NullPtr))
    }
    pub fn arena() -> Self {
        TypeName::new(TypeKind::Arena)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        TypeName::new(TypeKind::Struct(name.into()))
    }

    pub fn type_value(inner: TypeName) -> Self {
        TypeName::new(TypeKind::TypeValue(Box::new(inner)))
    }

    /// The type of a string literal: a span of const chars
    pub fn string_literal() -> Self {
        TypeName::char().add_const().add_span()
    }

    // --- structural builders -------------------------------------------------

    pub fn add_ptr(self) -> Self {
        TypeName::new(TypeKind::Ptr(Box::new(self)))
    }

    pub fn add_span(self) -> Self {
        TypeName::new(TypeKind::Span(Box::new(self)))
    }

    pub fn add_array(self, count: u64) -> Self {
        TypeName::new(TypeKind::Array(Box::new(self), count))
    }

    pub fn add_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn remove_const(mut self) -> Self {
        self.is_const = false;
        self
    }

    pub fn remove_ptr(&self) -> TypeName {
        match &self.kind {
            TypeKind::Ptr(inner) => (**inner).clone(),
            _ => self.clone(),
        }
    }

    // --- queries -------------------------------------------------------------

    pub fn is_fundamental(&self) -> bool {
        matches!(self.kind, TypeKind::Fundamental(_))
    }
    pub fn is_ptr(&self) -> bool {
        matches!(self.kind, TypeKind::Ptr(_))
    }
    pub fn is_span(&self) -> bool {
        matches!(self.kind, TypeKind::Span(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(..))
    }
    pub fn is_arena(&self) -> bool {
        matches!(self.kind, TypeKind::Arena)
    }
    pub fn is_type_value(&self) -> bool {
        matches!(self.kind, TypeKind::TypeValue(_))
    }

    /// The single inner type of an array, span, ptr or type value.
    /// Returns the type itself for anything else.
    pub fn inner_type(&self) -> TypeName {
        match &self.kind {
            TypeKind::Array(inner, _)
            | TypeKind::Span(inner)
            | TypeKind::Ptr(inner)
            | TypeKind::TypeValue(inner) => (**inner).clone(),
            _ => self.clone(),
        }
    }

    /// Element count of an array type. Zero for anything else.
    pub fn array_length(&self) -> u64 {
        match &self.kind {
            TypeKind::Array(_, count) => *count,
            _ => 0,
        }
    }
}

/// Whether a value of type `src` may be copied into a position expecting
/// `dst`. Walking the structural spine, const may be added but never dropped
/// through references, pointers and spans. Top-level const is the caller's
/// concern (it is stripped on copy before calling this).
pub fn const_convertible_to(src: &TypeName, dst: &TypeName) -> bool {
    if src.is_const && !dst.is_const {
        return false;
    }

    match (&src.kind, &dst.kind) {
        (TypeKind::Fundamental(l), TypeKind::Fundamental(r)) => l == r,
        (TypeKind::Struct(l), TypeKind::Struct(r)) => l == r,
        (TypeKind::Array(l, lc), TypeKind::Array(r, rc)) => {
            lc == rc && const_convertible_to(l, r)
        }
        (TypeKind::Ptr(l), TypeKind::Ptr(r)) => const_convertible_to(l, r),
        (TypeKind::Span(l), TypeKind::Span(r)) => const_convertible_to(l, r),
        (
            TypeKind::FunctionPtr {
                param_types: lp,
                return_type: lr,
            },
            TypeKind::FunctionPtr {
                param_types: rp,
                return_type: rr,
            },
        ) => lp == rp && lr == rr,
        (TypeKind::Arena, TypeKind::Arena) => true,
        (l, r) => l == r,
    }
}

impl Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Fundamental(fund) => write!(f, "{}", fund.as_str())?,
            TypeKind::Struct(name) => write!(f, "{}", name)?,
            TypeKind::Array(inner, count) => write!(f, "{}[{}]", inner, count)?,
            TypeKind::Span(inner) => write!(f, "{}[]", inner)?,
            TypeKind::Ptr(inner) => write!(f, "{}&", inner)?,
            TypeKind::FunctionPtr {
                param_types,
                return_type,
            } => {
                write!(f, "fn(")?;
                for (i, param) in param_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", return_type)?;
            }
            TypeKind::Arena => write!(f, "arena")?,
            TypeKind::TypeValue(inner) => write!(f, "<type {}>", inner)?,
            TypeKind::Builtin { name, .. } => write!(f, "<builtin {}>", name)?,
            TypeKind::BoundMethod { function_id, .. } => {
                write!(f, "<bound method #{}>", function_id)?
            }
            TypeKind::BoundBuiltinMethod { name, receiver } => {
                write!(f, "<bound builtin {}.{}>", receiver, name)?
            }
        }
        if self.is_const {
            write!(f, " const")?;
        }
        Ok(())
    }
}
