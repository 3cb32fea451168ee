//! End-to-end scenarios over the fixture language: relational marks,
//! overloaded operators, class hierarchies, deduplication, validation
//! messages and equality propagation.

mod common;

use std::rc::Rc;

use common::{
    AssignmentValidation, VariableTypeRule, assignment, binary, binary_operator_calls,
    bool_literal, expr_lang_typekit, int_literal, string_literal, variable,
};
use typekit_core::{
    ConversionMode, EdgeKind, RuleOptions, Severity, TypeDescriptor, assignability_path_cost,
};
use typekit_kinds::{
    ClassKindOptions, ClassTypeDetails, FunctionTypeDetails, OperatorDetails, Typekit,
    TypekitOptions,
};

#[test]
fn primitives_compose_into_an_assignability_path() {
    let (typekit, prims) = expr_lang_typekit();
    let services = &typekit.services;

    services
        .mark_as_convertible(&prims.boolean, &prims.integer, ConversionMode::ImplicitExplicit)
        .unwrap();
    services
        .mark_as_sub_type(&prims.integer, &prims.double, false)
        .unwrap();
    services
        .mark_as_convertible(&prims.double, &prims.string, ConversionMode::ImplicitExplicit)
        .unwrap();

    assert!(services.is_assignable(&prims.boolean, &prims.string));
    let success = services
        .get_assignability_result(&prims.boolean, &prims.string)
        .unwrap();
    assert_eq!(success.path.len(), 3);
    assert_eq!(assignability_path_cost(&success.path), 5);
    assert_eq!(
        success.path[0].kind,
        EdgeKind::Conversion(ConversionMode::ImplicitExplicit)
    );
    assert_eq!(success.path[1].kind, EdgeKind::SubType);
    assert_eq!(
        success.path[2].kind,
        EdgeKind::Conversion(ConversionMode::ImplicitExplicit)
    );

    assert!(!services.is_assignable(&prims.string, &prims.boolean));
}

/// Declare the overloaded `+` of the fixture: integer, double, string and
/// boolean addition.
fn declare_plus(typekit: &Typekit, prims: &common::Primitives) {
    let signatures = [
        &prims.integer,
        &prims.double,
        &prims.string,
        &prims.boolean,
    ];
    for operand in signatures {
        typekit
            .operators
            .create(OperatorDetails::binary("+", operand, operand, operand))
            .inference_rule_for_calls(binary_operator_calls())
            .finish();
    }
}

#[test]
fn string_concatenation_lifts_the_integer_operand() {
    let (typekit, prims) = expr_lang_typekit();
    let services = &typekit.services;
    services
        .mark_as_convertible(&prims.boolean, &prims.integer, ConversionMode::ImplicitExplicit)
        .unwrap();
    services
        .mark_as_sub_type(&prims.integer, &prims.double, false)
        .unwrap();
    services
        .mark_as_convertible(&prims.double, &prims.string, ConversionMode::ImplicitExplicit)
        .unwrap();
    declare_plus(&typekit, &prims);

    // "2" + 3: only the string overload accepts both operands.
    let call = binary("+", string_literal("2"), int_literal(3));
    let inferred = services.infer_type(&call).unwrap();
    assert!(Rc::ptr_eq(&inferred, &prims.string));

    // The call matches an overload, so arguments validation stays silent.
    assert_eq!(services.validate(&call).len(), 0);
}

#[test]
fn overload_resolution_picks_the_cheapest_signature() {
    let (typekit, prims) = expr_lang_typekit();
    let services = &typekit.services;
    services
        .mark_as_convertible(&prims.boolean, &prims.integer, ConversionMode::ImplicitExplicit)
        .unwrap();
    services
        .mark_as_sub_type(&prims.integer, &prims.double, false)
        .unwrap();
    services
        .mark_as_convertible(&prims.double, &prims.string, ConversionMode::ImplicitExplicit)
        .unwrap();
    declare_plus(&typekit, &prims);

    // 2 + true: lifting the boolean into an integer costs one conversion
    // edge, cheaper than lifting both operands to double or string.
    let call = binary("+", int_literal(2), bool_literal(true));
    let inferred = services.infer_type(&call).unwrap();
    assert!(Rc::ptr_eq(&inferred, &prims.integer));
}

#[test]
fn nominal_sub_classes_are_one_directional() {
    let (typekit, prims) = expr_lang_typekit();
    let services = &typekit.services;

    let person = typekit
        .classes
        .create(
            ClassTypeDetails::named("Person")
                .with_field("name", TypeDescriptor::from(&prims.string))
                .with_field("age", TypeDescriptor::from(&prims.integer)),
        )
        .finish()
        .get_type_final()
        .unwrap();
    let student = typekit
        .classes
        .create(
            ClassTypeDetails::named("Student")
                .with_super_class("Person")
                .with_field("id", TypeDescriptor::from(&prims.integer)),
        )
        .finish()
        .get_type_final()
        .unwrap();

    assert!(services.is_sub_type(&student, &person));
    assert!(!services.is_sub_type(&person, &student));
}

#[test]
fn inheritance_cycles_are_reported_at_completion() {
    let (typekit, _prims) = expr_lang_typekit();

    // Employee extends Student extends Person extends Employee.
    typekit
        .classes
        .create(ClassTypeDetails::named("Employee").with_super_class("Student"))
        .finish();
    typekit
        .classes
        .create(ClassTypeDetails::named("Student").with_super_class("Person"))
        .finish();
    typekit
        .classes
        .create(ClassTypeDetails::named("Person").with_super_class("Employee"))
        .finish();

    let errors = typekit.classes.inheritance_cycle_errors();
    assert!(!errors.is_empty(), "the cycle is detected at completion");
    assert!(errors.iter().all(|e| e.contains("Cyclic inheritance")));

    // The recorded findings surface as validation errors on the root.
    let root = int_literal(0);
    let problems = typekit.services.validate_after(&root);
    assert!(!problems.is_empty());
    assert!(problems.iter().all(|p| p.severity == Severity::Error));
}

#[test]
fn structural_classes_with_equal_shape_collapse() {
    let language: Rc<dyn typekit_core::LanguageService> = Rc::new(common::ExprLang);
    let typekit = Typekit::with_options(
        language,
        TypekitOptions {
            classes: ClassKindOptions {
                typing: typekit_core::ClassTyping::Structural,
                ..ClassKindOptions::default()
            },
            ..TypekitOptions::default()
        },
    );
    let prims = common::declare_primitives(&typekit);

    let first = typekit
        .classes
        .create(
            ClassTypeDetails::named("Point")
                .with_field("x", TypeDescriptor::from(&prims.integer))
                .with_field("y", TypeDescriptor::from(&prims.integer)),
        )
        .finish();
    let second = typekit
        .classes
        .create(
            ClassTypeDetails::named("Point")
                .with_field("x", TypeDescriptor::from(&prims.integer))
                .with_field("y", TypeDescriptor::from(&prims.integer)),
        )
        .finish();

    let survivor = first.get_type_final().unwrap();
    assert!(Rc::ptr_eq(&survivor, &second.get_type_final().unwrap()));
    assert!(second.is_collapsed());

    let registered = typekit.services.graph().get_all_registered_types();
    let points = registered
        .iter()
        .filter(|t| t.name() == "Point")
        .count();
    assert_eq!(points, 1);
    // The class-name index resolves to the surviving node.
    let by_name = typekit.services.graph().get_type("Point").unwrap();
    assert!(Rc::ptr_eq(&by_name, &survivor));
}

#[test]
fn assignment_validation_reports_the_exact_message() {
    let (typekit, _prims) = expr_lang_typekit();
    let services = &typekit.services;
    services.add_inference_rule(Rc::new(VariableTypeRule), &RuleOptions::for_key("Variable"));
    services.add_validation_rule(
        Rc::new(AssignmentValidation),
        &RuleOptions::for_key("AssignmentStatement"),
    );

    let statement = assignment(variable("x", "integer"), string_literal("oops"));
    let problems = services.validate(&statement);
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, Severity::Error);
    assert_eq!(
        problems[0].message,
        "The type 'string' is not assignable to the type 'integer'."
    );

    // A well-typed assignment stays silent.
    let fine = assignment(variable("y", "integer"), int_literal(1));
    assert_eq!(services.validate(&fine).len(), 0);
}

#[test]
fn marked_equality_propagates_into_function_types() {
    let (typekit, _prims) = expr_lang_typekit();
    let services = &typekit.services;
    let a = typekit
        .primitives
        .create(typekit_kinds::PrimitiveTypeDetails::named("A"))
        .finish()
        .get_type_final()
        .unwrap();
    let b = typekit
        .primitives
        .create(typekit_kinds::PrimitiveTypeDetails::named("B"))
        .finish()
        .get_type_final()
        .unwrap();

    // f is declared before the equality mark, g after it.
    let f = typekit
        .functions
        .create(FunctionTypeDetails::named("f").with_input("a", TypeDescriptor::from(&a)))
        .finish()
        .get_type_final()
        .unwrap();

    services.mark_as_equal(&a, &b);

    let g = typekit
        .functions
        .create(FunctionTypeDetails::named("g").with_input("b", TypeDescriptor::from(&b)))
        .finish()
        .get_type_final()
        .unwrap();

    assert!(services.are_types_equal(&f, &g));

    services.unmark_as_equal(&a, &b);
    assert!(!services.are_types_equal(&f, &g));
}
