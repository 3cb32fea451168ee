use std::rc::Rc;

use super::test_services;
use crate::body::{PrimitiveData, TypeBody};
use crate::descriptor::TypeDescriptor;
use crate::initializer::TypeInitializer;
use crate::node::{InitializationPlan, Type, TypeState};
use crate::waiter::DisposalWaiter;

fn node(name: &str) -> Rc<Type> {
    Type::new(TypeBody::Primitive(PrimitiveData {
        primitive_name: name.to_string(),
    }))
}

#[test]
fn mutual_completion_dependencies_are_broken_by_the_ignore_set() {
    let services = test_services();

    // Two nodes, each waiting for the other to be completed before
    // completing itself. Without cycle breaking neither would ever finish.
    let a = node("a");
    let b = node("b");

    let ref_to_b = services.create_reference(TypeDescriptor::Type(b.clone()));
    let ref_to_a = services.create_reference(TypeDescriptor::Type(a.clone()));

    a.define_initialization(
        InitializationPlan::new(|t: &Rc<Type>| t.set_identifier("a"))
            .completed_after(vec![ref_to_b.clone()]),
    );
    b.define_initialization(
        InitializationPlan::new(|t: &Rc<Type>| t.set_identifier("b"))
            .completed_after(vec![ref_to_a.clone()]),
    );

    let init_a = TypeInitializer::new(&services, a.clone());
    init_a.start();
    // Alone, "a" reaches `Identifiable` and stalls before `Completed`.
    assert_eq!(a.state(), TypeState::Identifiable);

    let init_b = TypeInitializer::new(&services, b.clone());
    init_b.start();

    assert_eq!(a.state(), TypeState::Completed);
    assert_eq!(b.state(), TypeState::Completed);
    assert_eq!(a.identifier().as_deref(), Some("a"));
    assert_eq!(b.identifier().as_deref(), Some("b"));
    assert!(services.graph().get_type("a").is_some());
    assert!(services.graph().get_type("b").is_some());
}

#[test]
fn a_type_waiting_on_itself_completes() {
    let services = test_services();
    let a = node("self");
    let ref_to_self = services.create_reference(TypeDescriptor::Type(a.clone()));
    a.define_initialization(
        InitializationPlan::new(|t: &Rc<Type>| t.set_identifier("self"))
            .completed_after(vec![ref_to_self]),
    );
    let initializer = TypeInitializer::new(&services, a.clone());
    initializer.start();
    assert_eq!(a.state(), TypeState::Completed);
}

#[test]
fn three_party_cycles_are_broken_as_well() {
    let services = test_services();
    let a = node("a");
    let b = node("b");
    let c = node("c");

    let ref_to_b = services.create_reference(TypeDescriptor::Type(b.clone()));
    let ref_to_c = services.create_reference(TypeDescriptor::Type(c.clone()));
    let ref_to_a = services.create_reference(TypeDescriptor::Type(a.clone()));

    a.define_initialization(
        InitializationPlan::new(|t: &Rc<Type>| t.set_identifier("a"))
            .completed_after(vec![ref_to_b]),
    );
    b.define_initialization(
        InitializationPlan::new(|t: &Rc<Type>| t.set_identifier("b"))
            .completed_after(vec![ref_to_c]),
    );
    c.define_initialization(
        InitializationPlan::new(|t: &Rc<Type>| t.set_identifier("c"))
            .completed_after(vec![ref_to_a]),
    );

    for ty in [&a, &b, &c] {
        let initializer = TypeInitializer::new(&services, ty.clone());
        initializer.start();
    }

    assert_eq!(a.state(), TypeState::Completed);
    assert_eq!(b.state(), TypeState::Completed);
    assert_eq!(c.state(), TypeState::Completed);
}

#[test]
fn disposal_waiter_fires_once_all_references_are_invalid() {
    let services = test_services();
    let a = super::primitive(&services, "a");
    let b = super::primitive(&services, "b");

    let ref_a = services.create_reference(TypeDescriptor::Identifier("a".to_string()));
    let ref_b = services.create_reference(TypeDescriptor::Identifier("b".to_string()));

    let fired = Rc::new(std::cell::Cell::new(0usize));
    let waiter = DisposalWaiter::new(vec![ref_a, ref_b]);
    let fired_clone = fired.clone();
    waiter.on_all_invalid(move || fired_clone.set(fired_clone.get() + 1));
    assert_eq!(fired.get(), 0);

    services.graph().remove_node(&a, None);
    assert_eq!(fired.get(), 0, "one reference is still valid");
    services.graph().remove_node(&b, None);
    assert_eq!(fired.get(), 1);
}
