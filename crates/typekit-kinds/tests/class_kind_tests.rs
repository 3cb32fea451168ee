//! Class kind behavior: hierarchy queries, field inheritance and
//! shadowing, structural sub-typing, recursive class definitions and the
//! inheritance-cycle policies.

mod common;

use std::rc::Rc;

use common::{declare_primitives, expr_lang_typekit};
use typekit_core::{
    ClassTyping, FieldCheckingStrategy, TypeDescriptor, TypeState, all_sub_classes,
    all_super_classes, fields_including_inherited,
};
use typekit_kinds::{
    ClassKindOptions, ClassTypeDetails, InheritanceCyclePolicy, Typekit, TypekitOptions,
};

fn structural_typekit() -> (Typekit, common::Primitives) {
    let typekit = Typekit::with_options(
        Rc::new(common::ExprLang),
        TypekitOptions {
            classes: ClassKindOptions {
                typing: ClassTyping::Structural,
                ..ClassKindOptions::default()
            },
            ..TypekitOptions::default()
        },
    );
    let prims = declare_primitives(&typekit);
    (typekit, prims)
}

#[test]
fn super_and_sub_class_queries_are_transitive() {
    let (typekit, prims) = expr_lang_typekit();

    let person = typekit
        .classes
        .create(
            ClassTypeDetails::named("Person")
                .with_field("name", TypeDescriptor::from(&prims.string)),
        )
        .finish()
        .get_type_final()
        .unwrap();
    let student = typekit
        .classes
        .create(ClassTypeDetails::named("Student").with_super_class("Person"))
        .finish()
        .get_type_final()
        .unwrap();
    let tutor = typekit
        .classes
        .create(ClassTypeDetails::named("Tutor").with_super_class("Student"))
        .finish()
        .get_type_final()
        .unwrap();

    let supers: Vec<String> = all_super_classes(&tutor, true)
        .iter()
        .map(|t| t.name())
        .collect();
    assert_eq!(supers, ["Student", "Person"]);

    let subs: Vec<String> = all_sub_classes(&person, true)
        .iter()
        .map(|t| t.name())
        .collect();
    assert_eq!(subs, ["Student", "Tutor"]);

    assert!(typekit.services.is_sub_type(&tutor, &person));
    let _ = student;
}

#[test]
fn sub_class_fields_shadow_super_class_fields() {
    let (typekit, prims) = expr_lang_typekit();

    typekit
        .classes
        .create(
            ClassTypeDetails::named("Base")
                .with_field("id", TypeDescriptor::from(&prims.string))
                .with_field("size", TypeDescriptor::from(&prims.integer)),
        )
        .finish();
    let derived = typekit
        .classes
        .create(
            ClassTypeDetails::named("Derived")
                .with_super_class("Base")
                .with_field("id", TypeDescriptor::from(&prims.integer)),
        )
        .finish()
        .get_type_final()
        .unwrap();

    let fields = fields_including_inherited(&derived);
    assert_eq!(fields.len(), 2);
    let id_type = fields.get("id").unwrap().get().unwrap();
    assert!(Rc::ptr_eq(&id_type, &prims.integer), "the sub-class wins");
    assert!(fields.contains_key("size"));
}

#[test]
fn duplicate_field_names_are_host_misuse() {
    let (typekit, prims) = expr_lang_typekit();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        typekit
            .classes
            .create(
                ClassTypeDetails::named("Broken")
                    .with_field("x", TypeDescriptor::from(&prims.integer))
                    .with_field("x", TypeDescriptor::from(&prims.string)),
            )
            .finish();
    }));
    assert!(result.is_err());
}

#[test]
fn the_super_class_limit_is_enforced() {
    let typekit = Typekit::with_options(
        Rc::new(common::ExprLang),
        TypekitOptions {
            classes: ClassKindOptions {
                maximum_number_of_super_classes: 1,
                ..ClassKindOptions::default()
            },
            ..TypekitOptions::default()
        },
    );
    typekit
        .classes
        .create(ClassTypeDetails::named("A"))
        .finish();
    typekit
        .classes
        .create(ClassTypeDetails::named("B"))
        .finish();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        typekit
            .classes
            .create(
                ClassTypeDetails::named("C")
                    .with_super_class("A")
                    .with_super_class("B"),
            )
            .finish();
    }));
    assert!(result.is_err());
}

#[test]
fn structural_sub_typing_checks_the_expected_fields() {
    let (typekit, prims) = structural_typekit();
    let services = &typekit.services;

    let named = typekit
        .classes
        .create(
            ClassTypeDetails::named("Named")
                .with_field("name", TypeDescriptor::from(&prims.string)),
        )
        .finish()
        .get_type_final()
        .unwrap();
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

    // Person provides every field Named expects; not the other way round.
    assert!(services.is_sub_type(&person, &named));
    assert!(!services.is_sub_type(&named, &person));

    let problem = services.get_sub_type_problem(&named, &person).unwrap();
    assert!(!problem.sub_problems.is_empty());
}

#[test]
fn structural_field_checking_strategy_equal_rejects_sub_typed_fields() {
    let typekit = Typekit::with_options(
        Rc::new(common::ExprLang),
        TypekitOptions {
            classes: ClassKindOptions {
                typing: ClassTyping::Structural,
                subtype_field_checking: FieldCheckingStrategy::EqualType,
                ..ClassKindOptions::default()
            },
            ..TypekitOptions::default()
        },
    );
    let prims = declare_primitives(&typekit);
    typekit
        .services
        .mark_as_sub_type(&prims.integer, &prims.double, false)
        .unwrap();

    let wide = typekit
        .classes
        .create(
            ClassTypeDetails::named("Wide")
                .with_field("value", TypeDescriptor::from(&prims.double)),
        )
        .finish()
        .get_type_final()
        .unwrap();
    let narrow = typekit
        .classes
        .create(
            ClassTypeDetails::named("Narrow")
                .with_field("value", TypeDescriptor::from(&prims.integer)),
        )
        .finish()
        .get_type_final()
        .unwrap();

    // Under EqualType the integer field does not satisfy the double field.
    assert!(!typekit.services.is_sub_type(&narrow, &wide));
}

#[test]
fn mutually_recursive_classes_initialize_without_deadlock() {
    let (typekit, _prims) = expr_lang_typekit();

    // Class A has a field of type B, class B has a field of type A.
    let init_a = typekit
        .classes
        .create(ClassTypeDetails::named("A").with_field("b", "B"))
        .finish();
    let a = init_a.get_type_final().unwrap();
    assert_eq!(a.state(), TypeState::Identifiable, "B does not exist yet");

    let init_b = typekit
        .classes
        .create(ClassTypeDetails::named("B").with_field("a", "A"))
        .finish();
    let b = init_b.get_type_final().unwrap();

    assert_eq!(a.state(), TypeState::Completed);
    assert_eq!(b.state(), TypeState::Completed);

    // Identifiers and user representations are stable afterwards.
    assert_eq!(a.identifier().as_deref(), Some("A"));
    assert_eq!(b.identifier().as_deref(), Some("B"));
    assert_eq!(a.user_representation(), "A");
    let fields = fields_including_inherited(&a);
    assert!(Rc::ptr_eq(&fields.get("b").unwrap().get().unwrap(), &b));
}

#[test]
fn inheritance_cycle_policy_panic_fails_fast() {
    let typekit = Typekit::with_options(
        Rc::new(common::ExprLang),
        TypekitOptions {
            classes: ClassKindOptions {
                inheritance_cycle_policy: InheritanceCyclePolicy::Panic,
                ..ClassKindOptions::default()
            },
            ..TypekitOptions::default()
        },
    );

    typekit
        .classes
        .create(ClassTypeDetails::named("A").with_super_class("B"))
        .finish();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        typekit
            .classes
            .create(ClassTypeDetails::named("B").with_super_class("A"))
            .finish();
    }));
    assert!(result.is_err());
}
