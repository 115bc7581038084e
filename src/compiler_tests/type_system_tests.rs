//! Unit tests for the type model and the registry.

use crate::compiler::datatypes::{const_convertible_to, TypeName, PTR_SIZE};
use crate::compiler::type_registry::{Field, TemplateMap, TypeRegistry};

fn registry_with_point() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    let fields = vec![
        Field {
            name: "x".to_string(),
            type_name: TypeName::i64(),
        },
        Field {
            name: "y".to_string(),
            type_name: TypeName::i32(),
        },
        Field {
            name: "flag".to_string(),
            type_name: TypeName::bool(),
        },
    ];
    assert!(types.add("Point", fields, TemplateMap::default()));
    types
}

#[test]
fn test_fundamental_sizes() {
    let types = TypeRegistry::new();
    assert_eq!(types.size_of(&TypeName::null()).unwrap(), 1);
    assert_eq!(types.size_of(&TypeName::bool()).unwrap(), 1);
    assert_eq!(types.size_of(&TypeName::char()).unwrap(), 1);
    assert_eq!(types.size_of(&TypeName::i32()).unwrap(), 4);
    assert_eq!(types.size_of(&TypeName::i64()).unwrap(), 8);
    assert_eq!(types.size_of(&TypeName::u64()).unwrap(), 8);
    assert_eq!(types.size_of(&TypeName::f64()).unwrap(), 8);
    assert_eq!(types.size_of(&TypeName::nullptr()).unwrap(), 8);
}

#[test]
fn test_compound_sizes() {
    let types = registry_with_point();
    let point = TypeName::structure("Point");

    // tight layout, declaration order
    assert_eq!(types.size_of(&point).unwrap(), 8 + 4 + 1);
    assert_eq!(types.size_of(&point.clone().add_ptr()).unwrap(), PTR_SIZE);
    assert_eq!(types.size_of(&point.clone().add_span()).unwrap(), PTR_SIZE + 8);
    assert_eq!(types.size_of(&point.clone().add_array(4)).unwrap(), 4 * 13);
    assert_eq!(types.size_of(&TypeName::arena()).unwrap(), PTR_SIZE);
}

#[test]
fn test_empty_struct_occupies_one_byte() {
    let mut types = TypeRegistry::new();
    types.add("Empty", Vec::new(), TemplateMap::default());
    assert_eq!(types.size_of(&TypeName::structure("Empty")).unwrap(), 1);
}

#[test]
fn test_field_offsets_follow_declaration_order() {
    let types = registry_with_point();
    let point = TypeName::structure("Point");

    let (x_offset, x_type) = types.field_offset(&point, "x").unwrap().unwrap();
    let (y_offset, y_type) = types.field_offset(&point, "y").unwrap().unwrap();
    let (flag_offset, _) = types.field_offset(&point, "flag").unwrap().unwrap();

    assert_eq!(x_offset, 0);
    assert_eq!(x_type, TypeName::i64());
    assert_eq!(y_offset, 8);
    assert_eq!(y_type, TypeName::i32());
    assert_eq!(flag_offset, 12);
    assert!(types.field_offset(&point, "missing").unwrap().is_none());
}

#[test]
fn test_add_rejects_duplicates() {
    let mut types = registry_with_point();
    assert!(!types.add("Point", Vec::new(), TemplateMap::default()));
}

#[test]
fn test_contains_recurses_into_compounds() {
    let types = registry_with_point();
    let point = TypeName::structure("Point");
    assert!(types.contains(&point));
    assert!(types.contains(&point.clone().add_array(3).add_ptr()));
    assert!(!types.contains(&TypeName::structure("Missing")));
    assert!(!types.contains(&TypeName::structure("Missing").add_span()));
}

#[test]
fn test_template_instantiations_are_distinct_nominal_types() {
    let mut types = TypeRegistry::new();
    types.add(
        "Pair!(i64, bool)",
        Vec::new(),
        TemplateMap::default(),
    );
    assert!(types.contains(&TypeName::structure("Pair!(i64, bool)")));
    assert!(!types.contains(&TypeName::structure("Pair!(bool, i64)")));
    assert_ne!(
        TypeName::structure("Pair!(i64, bool)"),
        TypeName::structure("Pair!(bool, i64)")
    );
}

#[test]
fn test_const_convertible_reflexive() {
    let candidates = [
        TypeName::i64(),
        TypeName::bool(),
        TypeName::i64().add_ptr(),
        TypeName::char().add_span(),
        TypeName::f64().add_array(3),
    ];
    for type_name in &candidates {
        assert!(const_convertible_to(type_name, type_name));
    }
}

#[test]
fn test_const_may_be_added_but_not_dropped() {
    let t = TypeName::i64();
    let const_t = TypeName::i64().add_const();
    assert!(const_convertible_to(&t, &const_t));
    assert!(!const_convertible_to(&const_t, &t));
}

#[test]
fn test_const_propagates_through_pointers() {
    // i64& -> i64 const& : adding const behind a pointer is fine
    let ptr = TypeName::i64().add_ptr();
    let ptr_to_const = TypeName::i64().add_const().add_ptr();
    assert!(const_convertible_to(&ptr, &ptr_to_const));
    // i64 const& -> i64& : dropping const behind a pointer is not
    assert!(!const_convertible_to(&ptr_to_const, &ptr));
}

#[test]
fn test_span_element_const() {
    let span = TypeName::i64().add_span();
    let const_elem_span = TypeName::i64().add_const().add_span();
    assert!(const_convertible_to(&span, &const_elem_span));
    assert!(!const_convertible_to(&const_elem_span, &span));
}

#[test]
fn test_mismatched_types_do_not_convert() {
    assert!(!const_convertible_to(&TypeName::i64(), &TypeName::u64()));
    assert!(!const_convertible_to(
        &TypeName::i64().add_array(2),
        &TypeName::i64().add_array(3)
    ));
    assert!(!const_convertible_to(
        &TypeName::i64().add_ptr(),
        &TypeName::i64().add_span()
    ));
}

#[test]
fn test_display_forms() {
    assert_eq!(TypeName::i64().to_string(), "i64");
    assert_eq!(TypeName::i64().add_ptr().to_string(), "i64&");
    assert_eq!(TypeName::i64().add_span().to_string(), "i64[]");
    assert_eq!(TypeName::i64().add_array(3).to_string(), "i64[3]");
    assert_eq!(
        TypeName::i64().add_const().add_ptr().to_string(),
        "i64 const&"
    );
    assert_eq!(TypeName::arena().to_string(), "arena");
}

#[test]
fn test_inner_type_and_array_length() {
    let array = TypeName::i32().add_array(7);
    assert_eq!(array.inner_type(), TypeName::i32());
    assert_eq!(array.array_length(), 7);
    assert_eq!(TypeName::bool().add_span().inner_type(), TypeName::bool());
}
