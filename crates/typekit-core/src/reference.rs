//! Resolvable handles to future type nodes.
//!
//! A [`TypeReference`] wraps a [`TypeDescriptor`] and resolves it as soon as
//! possible: eagerly on creation, then again on every graph addition until
//! it succeeds. Listeners are told when the reference resolves and when the
//! resolution is invalidated, e.g. because the resolved type switched back
//! to `Invalid` or was removed from the graph.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::descriptor::TypeDescriptor;
use crate::graph::{TypeGraphListener, thin_ptr};
use crate::node::{Type, TypeStateListener};
use crate::services::TypeSystem;

/// Observer of a reference's resolution lifecycle.
pub trait TypeReferenceListener {
    fn on_type_reference_resolved(&self, _reference: &Rc<TypeReference>, _resolved: &Rc<Type>) {}
    fn on_type_reference_invalidated(&self, _reference: &Rc<TypeReference>, _previous: &Rc<Type>) {}
}

/// A resolvable handle to a (future) type node.
pub struct TypeReference {
    me: Weak<TypeReference>,
    descriptor: TypeDescriptor,
    services: Weak<TypeSystem>,
    resolved: RefCell<Option<Rc<Type>>>,
    listeners: RefCell<Vec<Rc<dyn TypeReferenceListener>>>,
}

impl TypeReference {
    /// Create a reference and try to resolve it eagerly. If unresolved, the
    /// reference keeps listening to graph additions and replays the
    /// resolution attempt until it succeeds.
    pub fn create(services: &Rc<TypeSystem>, descriptor: TypeDescriptor) -> Rc<Self> {
        let reference = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            descriptor,
            services: Rc::downgrade(services),
            resolved: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        });
        services.graph().add_listener(reference.clone(), false);
        if let TypeDescriptor::Reference(inner) = &reference.descriptor {
            inner.add_listener(reference.clone(), false);
        }
        reference.try_resolve_now();
        reference
    }

    fn me(&self) -> Rc<TypeReference> {
        self.me.upgrade().expect("reference is alive while handled")
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The currently resolved type, if any.
    pub fn get(&self) -> Option<Rc<Type>> {
        self.resolved.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.borrow().is_some()
    }

    /// Register a listener. With `inform_now`, an already-resolved reference
    /// reports its resolution synchronously before this call returns.
    pub fn add_listener(
        self: &Rc<Self>,
        listener: Rc<dyn TypeReferenceListener>,
        inform_now: bool,
    ) {
        {
            let mut listeners = self.listeners.borrow_mut();
            if listeners.iter().any(|l| thin_ptr(l) == thin_ptr(&listener)) {
                return;
            }
            listeners.push(listener.clone());
        }
        if inform_now {
            if let Some(resolved) = self.get() {
                listener.on_type_reference_resolved(self, &resolved);
            }
        }
    }

    pub fn remove_listener(&self, listener: &Rc<dyn TypeReferenceListener>) {
        self.listeners
            .borrow_mut()
            .retain(|l| thin_ptr(l) != thin_ptr(listener));
    }

    /// Attempt resolution. Returns whether the reference is resolved after
    /// the attempt.
    pub fn try_resolve_now(&self) -> bool {
        if self.is_resolved() {
            return true;
        }
        let Some(services) = self.services.upgrade() else {
            return false;
        };
        match services.try_to_resolve(&self.descriptor) {
            Some(ty) if !ty.is_abandoned() => {
                *self.resolved.borrow_mut() = Some(ty.clone());
                trace!(name = %ty.name(), "type reference resolved");
                ty.add_listener(self.me(), false);
                self.notify(|l, r| l.on_type_reference_resolved(r, &ty));
                true
            }
            _ => false,
        }
    }

    /// Drop the current resolution, notify listeners, and immediately try to
    /// resolve again; the descriptor may already denote a replacement, e.g.
    /// after a deduplication collapse.
    fn invalidate_resolution(&self) {
        let Some(previous) = self.resolved.borrow_mut().take() else {
            return;
        };
        trace!(name = %previous.name(), "type reference invalidated");
        previous.remove_listener(&(self.me() as Rc<dyn TypeStateListener>));
        self.notify(|l, r| l.on_type_reference_invalidated(r, &previous));
        self.try_resolve_now();
    }

    fn notify(&self, f: impl Fn(&Rc<dyn TypeReferenceListener>, &Rc<TypeReference>)) {
        let myself = self.me();
        let snapshot: Vec<Rc<dyn TypeReferenceListener>> = self.listeners.borrow().clone();
        for listener in &snapshot {
            f(listener, &myself);
        }
    }

    fn is_resolved_to(&self, ty: &Rc<Type>) -> bool {
        self.resolved
            .borrow()
            .as_ref()
            .is_some_and(|resolved| Rc::ptr_eq(resolved, ty))
    }
}

impl TypeGraphListener for TypeReference {
    fn on_added_type(&self, _ty: &Rc<Type>, _key: &str) {
        self.try_resolve_now();
    }

    fn on_removed_type(&self, ty: &Rc<Type>, _key: &str) {
        if self.is_resolved_to(ty) {
            self.invalidate_resolution();
        }
    }
}

impl TypeStateListener for TypeReference {
    fn on_switched_to_invalid(&self, ty: &Rc<Type>) {
        if self.is_resolved_to(ty) {
            self.invalidate_resolution();
        }
    }
}

impl TypeReferenceListener for TypeReference {
    fn on_type_reference_resolved(&self, _inner: &Rc<TypeReference>, _resolved: &Rc<Type>) {
        self.try_resolve_now();
    }
}

impl fmt::Debug for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(ty) => write!(f, "TypeReference(resolved: '{}')", ty.name()),
            None => f.write_str("TypeReference(unresolved)"),
        }
    }
}
