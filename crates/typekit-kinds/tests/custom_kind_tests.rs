//! Custom kind behavior: the default identifier formula over recursive
//! property values, deduplication, and the relationship hooks.

mod common;

use std::rc::Rc;

use common::expr_lang_typekit;
use indexmap::IndexMap;
use typekit_core::{CustomProperties, TypeDescriptor};
use typekit_kinds::{
    CustomKindOptions, CustomPropertyInput, CustomTypeDetails, serialize_custom_properties,
};

#[test]
fn object_keys_are_serialized_in_sorted_order() {
    let (typekit, prims) = expr_lang_typekit();
    let matrices = typekit.custom_kind(CustomKindOptions::named("matrix"));

    let first = matrices
        .create(
            CustomTypeDetails::new()
                .with_property("width", 3i64)
                .with_property("height", 2i64)
                .with_property("element", TypeDescriptor::from(&prims.integer)),
        )
        .finish()
        .get_type_final()
        .unwrap();
    // Same properties, different declaration order.
    let second = matrices
        .create(
            CustomTypeDetails::new()
                .with_property("element", TypeDescriptor::from(&prims.integer))
                .with_property("height", 2i64)
                .with_property("width", 3i64),
        )
        .finish()
        .get_type_final()
        .unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    let identifier = first.identifier().unwrap();
    assert_eq!(identifier, "custom-matrix-{element:integer,height:2,width:3}");
}

#[test]
fn lists_are_order_sensitive_and_sets_are_not() {
    let (typekit, _prims) = expr_lang_typekit();
    let kinds = typekit.custom_kind(CustomKindOptions::named("tuple"));

    let list_ab = kinds
        .create(CustomTypeDetails::new().with_property(
            "items",
            CustomPropertyInput::List(vec!["a".into(), "b".into()]),
        ))
        .finish()
        .get_type_final()
        .unwrap();
    let list_ba = kinds
        .create(CustomTypeDetails::new().with_property(
            "items",
            CustomPropertyInput::List(vec!["b".into(), "a".into()]),
        ))
        .finish()
        .get_type_final()
        .unwrap();
    assert!(!Rc::ptr_eq(&list_ab, &list_ba), "list order matters");

    let set_ab = kinds
        .create(CustomTypeDetails::new().with_property(
            "members",
            CustomPropertyInput::Set(vec!["a".into(), "b".into()]),
        ))
        .finish()
        .get_type_final()
        .unwrap();
    let set_ba = kinds
        .create(CustomTypeDetails::new().with_property(
            "members",
            CustomPropertyInput::Set(vec!["b".into(), "a".into()]),
        ))
        .finish()
        .get_type_final()
        .unwrap();
    assert!(Rc::ptr_eq(&set_ab, &set_ba), "set order is normalized");
}

#[test]
fn absent_values_serialize_as_undefined() {
    let (typekit, _prims) = expr_lang_typekit();
    let kinds = typekit.custom_kind(CustomKindOptions::named("optional"));

    let ty = kinds
        .create(CustomTypeDetails::new().with_property("value", CustomPropertyInput::Absent))
        .finish()
        .get_type_final()
        .unwrap();
    assert_eq!(ty.identifier().unwrap(), "custom-optional-{value:undefined}");
}

#[test]
fn nested_mappings_serialize_sorted_by_key() {
    let mut inner: IndexMap<String, CustomPropertyInput> = IndexMap::new();
    inner.insert("zeta".to_string(), CustomPropertyInput::Int(1));
    inner.insert("alpha".to_string(), CustomPropertyInput::Int(2));

    let (typekit, _prims) = expr_lang_typekit();
    let kinds = typekit.custom_kind(CustomKindOptions::named("record"));
    let ty = kinds
        .create(CustomTypeDetails::new().with_property("entries", CustomPropertyInput::Map(inner)))
        .finish()
        .get_type_final()
        .unwrap();
    assert_eq!(
        ty.identifier().unwrap(),
        "custom-record-{entries:{alpha=2,zeta=1}}"
    );
}

#[test]
fn a_custom_identifier_override_takes_effect() {
    let (typekit, _prims) = expr_lang_typekit();
    let kinds = typekit.custom_kind(CustomKindOptions {
        calculate_identifier: Some(Rc::new(|_services, properties: &CustomProperties| {
            format!("handle-{}", serialize_custom_properties(properties))
        })),
        ..CustomKindOptions::named("handle")
    });

    let ty = kinds
        .create(CustomTypeDetails::new().with_property("slot", 7i64))
        .finish()
        .get_type_final()
        .unwrap();
    assert_eq!(ty.identifier().unwrap(), "handle-{slot:7}");
}

#[test]
fn relationship_hooks_wire_conversions_and_sub_typing() {
    let (typekit, prims) = expr_lang_typekit();
    let integer = prims.integer.clone();
    let double = prims.double.clone();
    let kinds = typekit.custom_kind(CustomKindOptions {
        get_super_types_of_new_custom_type: Some(Rc::new({
            let double = double.clone();
            move |_properties| vec![TypeDescriptor::from(&double)]
        })),
        get_new_custom_type_implicitly_convertible_to_types: Some(Rc::new({
            let integer = integer.clone();
            move |_properties| vec![TypeDescriptor::from(&integer)]
        })),
        ..CustomKindOptions::named("fraction")
    });

    let fraction = kinds
        .create(CustomTypeDetails::new().with_property("precision", 64i64))
        .finish()
        .get_type_final()
        .unwrap();

    assert!(typekit.services.is_sub_type(&fraction, &double));
    assert!(typekit.services.is_implicitly_convertible(&fraction, &integer));
    assert!(typekit.services.is_assignable(&fraction, &integer));
}

#[test]
fn predicate_hooks_decide_sub_typing() {
    let (typekit, prims) = expr_lang_typekit();
    let integer = prims.integer.clone();
    let kinds = typekit.custom_kind(CustomKindOptions {
        is_new_custom_type_sub_type_of: Some(Box::new(move |_services, _custom, superior| {
            // Every value type is a sub-type of the integer primitive.
            Some(superior.name() == "integer")
        })),
        ..CustomKindOptions::named("value")
    });

    let value = kinds
        .create(CustomTypeDetails::new().with_property("tag", "v1"))
        .finish()
        .get_type_final()
        .unwrap();

    assert!(typekit.services.is_sub_type(&value, &integer));
    assert!(!typekit.services.is_sub_type(&value, &prims.string));
}

#[test]
fn custom_types_of_different_kinds_never_collapse() {
    let (typekit, _prims) = expr_lang_typekit();
    let first_kind = typekit.custom_kind(CustomKindOptions::named("first"));
    let second_kind = typekit.custom_kind(CustomKindOptions::named("second"));

    let first = first_kind
        .create(CustomTypeDetails::new().with_property("x", 1i64))
        .finish()
        .get_type_final()
        .unwrap();
    let second = second_kind
        .create(CustomTypeDetails::new().with_property("x", 1i64))
        .finish()
        .get_type_final()
        .unwrap();

    assert!(!Rc::ptr_eq(&first, &second));
    assert!(!typekit.services.are_types_equal(&first, &second));
}
