use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{primitive, test_services};
use crate::graph::{ConversionMode, EdgeKind, GraphError, TypeEdge, TypeGraphListener};
use crate::node::Type;

#[test]
fn duplicate_identifiers_are_rejected() {
    let services = test_services();
    let a = primitive(&services, "integer");

    // A second node with the same identifier must not be installed
    // directly; only deduplication may resolve the collision.
    let clone = Type::new(crate::body::TypeBody::Primitive(crate::body::PrimitiveData {
        primitive_name: "integer".to_string(),
    }));
    clone.set_identifier("integer");
    match services.graph().add_node(clone) {
        Err(GraphError::DuplicateType { identifier }) => assert_eq!(identifier, "integer"),
        other => panic!("expected DuplicateType, got {other:?}"),
    }
    assert_eq!(services.graph().node_count(), 1);
    assert!(Rc::ptr_eq(&services.graph().get_type("integer").unwrap(), &a));
}

#[test]
fn registered_types_are_listed_in_insertion_order() {
    let services = test_services();
    primitive(&services, "integer");
    primitive(&services, "string");
    primitive(&services, "boolean");

    let names: Vec<String> = services
        .graph()
        .get_all_registered_types()
        .iter()
        .map(|t| t.name())
        .collect();
    assert_eq!(names, ["integer", "string", "boolean"]);
}

#[test]
fn auxiliary_keys_resolve_to_the_same_node() {
    let services = test_services();
    let a = primitive(&services, "integer");
    services.graph().add_auxiliary_key("int", a.clone());

    assert!(Rc::ptr_eq(&services.graph().get_type("int").unwrap(), &a));
    assert_eq!(services.graph().node_count(), 1);
}

#[test]
fn edge_queries_filter_by_endpoint_and_label() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");
    let c = primitive(&services, "c");

    services
        .graph()
        .add_edge(TypeEdge::new_explicit(a.clone(), b.clone(), EdgeKind::SubType));
    services.graph().add_edge(TypeEdge::new_explicit(
        a.clone(),
        c.clone(),
        EdgeKind::Conversion(ConversionMode::Explicit),
    ));

    assert_eq!(services.graph().get_edges(Some(&a), None, None).len(), 2);
    assert_eq!(
        services
            .graph()
            .get_edges(Some(&a), Some(&b), Some(EdgeKind::SubType))
            .len(),
        1
    );
    assert_eq!(
        services
            .graph()
            .get_edges(None, None, Some(EdgeKind::SubType))
            .len(),
        1
    );
    assert!(services.graph().get_edge(&b, &a, EdgeKind::SubType).is_none());
}

struct RemovalProbe {
    removed: Cell<usize>,
    edges_at_removal: RefCell<Vec<usize>>,
    services: std::rc::Weak<crate::services::TypeSystem>,
}

impl TypeGraphListener for RemovalProbe {
    fn on_removed_type(&self, ty: &Rc<Type>, _key: &str) {
        self.removed.set(self.removed.get() + 1);
        if let Some(services) = self.services.upgrade() {
            let incident = services.graph().get_edges(Some(ty), None, None).len()
                + services.graph().get_edges(None, Some(ty), None).len();
            self.edges_at_removal.borrow_mut().push(incident);
        }
    }
}

#[test]
fn removing_a_node_strips_incident_edges_before_notifying() {
    let services = test_services();
    let a = primitive(&services, "a");
    let b = primitive(&services, "b");
    services
        .graph()
        .add_edge(TypeEdge::new_explicit(a.clone(), b.clone(), EdgeKind::SubType));
    services
        .graph()
        .add_edge(TypeEdge::new_explicit(b.clone(), a.clone(), EdgeKind::Equality));

    let probe = Rc::new(RemovalProbe {
        removed: Cell::new(0),
        edges_at_removal: RefCell::new(Vec::new()),
        services: Rc::downgrade(&services),
    });
    services.graph().add_listener(probe.clone(), false);

    assert!(services.graph().remove_node(&a, None));
    assert_eq!(probe.removed.get(), 1);
    // The listener already observed a node without edges.
    assert_eq!(probe.edges_at_removal.borrow().as_slice(), &[0]);
    assert!(services.graph().get_type("a").is_none());
    assert_eq!(services.graph().get_edges(None, None, None).len(), 0);

    // Removing again is a no-op.
    assert!(!services.graph().remove_node(&a, None));
    assert_eq!(probe.removed.get(), 1);
}

struct CountingListener {
    added: Cell<usize>,
}

impl TypeGraphListener for CountingListener {
    fn on_added_type(&self, _ty: &Rc<Type>, _key: &str) {
        self.added.set(self.added.get() + 1);
    }
}

#[test]
fn listeners_can_be_informed_about_existing_types() {
    let services = test_services();
    primitive(&services, "a");
    primitive(&services, "b");

    let listener = Rc::new(CountingListener { added: Cell::new(0) });
    services.graph().add_listener(listener.clone(), true);
    assert_eq!(listener.added.get(), 2);

    primitive(&services, "c");
    assert_eq!(listener.added.get(), 3);

    // Registering the same listener twice is idempotent; no duplicate
    // notifications, no replayed additions.
    services.graph().add_listener(listener.clone(), true);
    primitive(&services, "d");
    assert_eq!(listener.added.get(), 4);
}
