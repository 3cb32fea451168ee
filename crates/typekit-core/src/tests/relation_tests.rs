use super::{primitive, test_services};
use crate::assignability::assignability_path_cost;
use crate::graph::{ConversionMode, EdgeKind, GraphError};

#[test]
fn every_type_is_equal_and_assignable_to_itself() {
    let services = test_services();
    let integer = primitive(&services, "integer");

    assert!(services.are_types_equal(&integer, &integer));
    assert!(services.is_sub_type(&integer, &integer));
    let success = services
        .get_assignability_result(&integer, &integer)
        .unwrap();
    assert!(success.path.is_empty());
    assert_eq!(success.cost(), 0);
}

#[test]
fn distinct_primitives_are_not_equal() {
    let services = test_services();
    let integer = primitive(&services, "integer");
    let string = primitive(&services, "string");

    assert!(!services.are_types_equal(&integer, &string));
    let problem = services
        .get_type_equality_problem(&integer, &string)
        .expect("a problem is reported");
    assert!(problem.to_string().contains("integer"));
    assert!(problem.to_string().contains("string"));
}

#[test]
fn marked_equality_is_symmetric_and_revocable() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");

    assert!(!services.are_types_equal(&a, &b));
    services.mark_as_equal(&a, &b);
    assert!(services.are_types_equal(&a, &b));
    assert!(services.are_types_equal(&b, &a));

    services.unmark_as_equal(&b, &a);
    assert!(!services.are_types_equal(&a, &b));
}

#[test]
fn implicit_conversion_edges_must_stay_acyclic() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");
    let c = primitive(&services, "c");

    services
        .mark_as_convertible(&a, &b, ConversionMode::ImplicitExplicit)
        .unwrap();
    services
        .mark_as_convertible(&b, &c, ConversionMode::ImplicitExplicit)
        .unwrap();

    let edges_before = services.graph().get_edges(None, None, None).len();
    match services.mark_as_convertible(&c, &a, ConversionMode::ImplicitExplicit) {
        Err(GraphError::CycleIntroduced { from, to, label }) => {
            assert_eq!(from, "c");
            assert_eq!(to, "a");
            assert!(label.contains("IMPLICIT_EXPLICIT"));
        }
        other => panic!("expected CycleIntroduced, got {other:?}"),
    }
    // The rejected edge left the graph unchanged.
    assert_eq!(services.graph().get_edges(None, None, None).len(), edges_before);
    assert!(!services.is_implicitly_convertible(&c, &a));
}

#[test]
fn explicit_conversion_edges_may_form_cycles() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");

    services
        .mark_as_convertible(&a, &b, ConversionMode::Explicit)
        .unwrap();
    services
        .mark_as_convertible(&b, &a, ConversionMode::Explicit)
        .unwrap();

    assert!(services.is_explicitly_convertible(&a, &b));
    assert!(services.is_explicitly_convertible(&b, &a));
    assert!(!services.is_implicitly_convertible(&a, &b));
}

#[test]
fn implicit_convertibility_is_transitive() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");
    let c = primitive(&services, "c");

    services
        .mark_as_convertible(&a, &b, ConversionMode::ImplicitExplicit)
        .unwrap();
    services
        .mark_as_convertible(&b, &c, ConversionMode::ImplicitExplicit)
        .unwrap();

    assert!(services.is_implicitly_convertible(&a, &c));
    assert!(!services.is_implicitly_convertible(&c, &a));
    // Implicit edges also serve explicit requests.
    assert!(services.is_explicitly_convertible(&a, &c));
}

#[test]
fn marked_sub_type_edges_compose_transitively() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");
    let c = primitive(&services, "c");

    services.mark_as_sub_type(&a, &b, true).unwrap();
    services.mark_as_sub_type(&b, &c, true).unwrap();

    assert!(services.is_sub_type(&a, &c));
    assert!(!services.is_sub_type(&c, &a));

    match services.mark_as_sub_type(&c, &a, true) {
        Err(GraphError::CycleIntroduced { .. }) => {}
        other => panic!("expected CycleIntroduced, got {other:?}"),
    }
}

#[test]
fn assignability_composes_equality_sub_type_and_conversion() {
    let services = test_services();
    let boolean = primitive(&services, "boolean");
    let integer = primitive(&services, "integer");
    let double = primitive(&services, "double");
    let string = primitive(&services, "string");

    services
        .mark_as_convertible(&boolean, &integer, ConversionMode::ImplicitExplicit)
        .unwrap();
    services.mark_as_sub_type(&integer, &double, false).unwrap();
    services
        .mark_as_convertible(&double, &string, ConversionMode::ImplicitExplicit)
        .unwrap();

    let success = services
        .get_assignability_result(&boolean, &string)
        .expect("a path exists");
    assert_eq!(success.path.len(), 3);
    assert_eq!(success.path[0].kind, EdgeKind::Conversion(ConversionMode::ImplicitExplicit));
    assert_eq!(success.path[1].kind, EdgeKind::SubType);
    assert_eq!(success.path[2].kind, EdgeKind::Conversion(ConversionMode::ImplicitExplicit));
    assert_eq!(assignability_path_cost(&success.path), 5);

    assert!(!services.is_assignable(&string, &boolean));
    let problem = services
        .get_assignability_result(&string, &boolean)
        .unwrap_err();
    assert_eq!(
        problem.to_string(),
        "The type 'string' is not assignable to the type 'boolean'."
    );
}

#[test]
fn equality_edges_shorten_assignability_paths() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");
    let c = primitive(&services, "c");

    services.mark_as_equal(&a, &b);
    services
        .mark_as_convertible(&b, &c, ConversionMode::ImplicitExplicit)
        .unwrap();

    let success = services.get_assignability_result(&a, &c).unwrap();
    assert_eq!(assignability_path_cost(&success.path), 2);
    // Equality is traversed in both directions.
    let success_rev = services.get_assignability_result(&b, &a).unwrap();
    assert_eq!(assignability_path_cost(&success_rev.path), 0);
}

#[test]
fn explicit_conversions_do_not_grant_assignability() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");

    services
        .mark_as_convertible(&a, &b, ConversionMode::Explicit)
        .unwrap();
    assert!(!services.is_assignable(&a, &b));
}
