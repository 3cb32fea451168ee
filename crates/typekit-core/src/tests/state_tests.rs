use std::cell::RefCell;
use std::rc::Rc;

use super::{primitive, test_services};
use crate::body::{PrimitiveData, TypeBody};
use crate::descriptor::TypeDescriptor;
use crate::initializer::TypeInitializer;
use crate::node::{InitializationPlan, Type, TypeState, TypeStateListener};

fn fresh_primitive_node(name: &str) -> Rc<Type> {
    let ty = Type::new(TypeBody::Primitive(PrimitiveData {
        primitive_name: name.to_string(),
    }));
    let identifier = name.to_string();
    ty.define_initialization(InitializationPlan::new(move |t: &Rc<Type>| {
        t.set_identifier(identifier.clone());
    }));
    ty
}

#[derive(Default)]
struct TransitionLog {
    events: RefCell<Vec<String>>,
}

impl TypeStateListener for TransitionLog {
    fn on_switched_to_invalid(&self, _ty: &Rc<Type>) {
        self.events.borrow_mut().push("invalid".to_string());
    }

    fn on_switched_to_identifiable(&self, _ty: &Rc<Type>) {
        self.events.borrow_mut().push("identifiable".to_string());
    }

    fn on_switched_to_completed(&self, _ty: &Rc<Type>) {
        self.events.borrow_mut().push("completed".to_string());
    }
}

#[test]
fn empty_preconditions_complete_in_the_same_call_frame() {
    let services = test_services();
    let ty = fresh_primitive_node("integer");
    assert_eq!(ty.state(), TypeState::Invalid);

    let log = Rc::new(TransitionLog::default());
    ty.add_listener(log.clone(), false);

    let initializer = TypeInitializer::new(&services, ty.clone());
    initializer.start();

    assert_eq!(ty.state(), TypeState::Completed);
    assert_eq!(ty.identifier().as_deref(), Some("integer"));
    assert_eq!(
        log.events.borrow().as_slice(),
        ["identifiable", "completed"]
    );
    assert!(services.graph().get_type("integer").is_some());
}

#[test]
fn inform_now_reports_the_current_state_on_attach() {
    let services = test_services();
    let ty = primitive(&services, "integer");

    let log = Rc::new(TransitionLog::default());
    ty.add_listener(log.clone(), true);
    assert_eq!(log.events.borrow().as_slice(), ["completed"]);
}

#[test]
fn identifier_must_not_change_once_identifiable() {
    let services = test_services();
    let ty = primitive(&services, "integer");
    // Setting the same identifier again is fine.
    ty.set_identifier("integer");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        ty.set_identifier("renamed");
    }));
    assert!(result.is_err());
    let _ = services;
}

#[test]
fn equal_identifiers_collapse_into_the_existing_node() {
    let services = test_services();
    let first = primitive(&services, "integer");

    let second_node = fresh_primitive_node("integer");
    let initializer = TypeInitializer::new(&services, second_node.clone());
    initializer.start();

    let survivor = initializer.get_type_final().unwrap();
    assert!(Rc::ptr_eq(&survivor, &first));
    assert!(initializer.is_collapsed());
    assert_eq!(services.graph().node_count(), 1);
    // The provisional node was abandoned terminally.
    assert_eq!(second_node.state(), TypeState::Invalid);
}

#[test]
fn dependent_type_waits_for_its_precondition() {
    let services = test_services();

    // A node whose completion requires "base" to be completed, while
    // "base" does not exist yet.
    let dependent = fresh_primitive_node("dependent");
    let base_ref = services.create_reference(TypeDescriptor::Identifier("base".to_string()));
    let identifier = "dependent".to_string();
    dependent.define_initialization(
        InitializationPlan::new(move |t: &Rc<Type>| {
            t.set_identifier(identifier.clone());
        })
        .completed_after(vec![base_ref.clone()])
        .invalidated_by(vec![base_ref.clone()]),
    );

    let initializer = TypeInitializer::new(&services, dependent.clone());
    initializer.start();

    // Identifiable (and installed) immediately, but not completed.
    assert_eq!(dependent.state(), TypeState::Identifiable);
    assert!(services.graph().get_type("dependent").is_some());

    let base = primitive(&services, "base");
    assert_eq!(dependent.state(), TypeState::Completed);

    // Removing the base invalidates the reference, which resets the
    // dependent node.
    services.graph().remove_node(&base, None);
    assert_eq!(dependent.state(), TypeState::Invalid);

    // Re-creating the base lets the machine climb again.
    primitive(&services, "base");
    assert_eq!(dependent.state(), TypeState::Completed);
}

#[test]
fn define_initialization_without_start_stays_invalid() {
    let ty = fresh_primitive_node("pending");
    assert_eq!(ty.state(), TypeState::Invalid);
    assert_eq!(ty.identifier(), None);
}
