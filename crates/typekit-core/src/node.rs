//! Type nodes and their staged initialization.
//!
//! Every type starts `Invalid`, becomes `Identifiable` once the references
//! it needs for computing its stable identifier are available, and becomes
//! `Completed` once every dependency it needs for its full definition is
//! completed as well. A type whose relevant references are invalidated falls
//! back to `Invalid` and may climb the states again later.
//!
//! Transitions fire synchronously and in dependency order; listeners are
//! snapshotted before invocation so they may re-enter the engine freely.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::body::TypeBody;
use crate::graph::thin_ptr;
use crate::reference::{TypeReference, TypeReferenceListener};
use crate::waiter::{DependencyWaiter, WaiterListener};

/// The initialization state of a type node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeState {
    Invalid,
    Identifiable,
    Completed,
}

/// Observer of a type's state transitions.
pub trait TypeStateListener {
    fn on_switched_to_invalid(&self, _ty: &Rc<Type>) {}
    fn on_switched_to_identifiable(&self, _ty: &Rc<Type>) {}
    fn on_switched_to_completed(&self, _ty: &Rc<Type>) {}
}

/// What a fresh type needs before it can reach its states, and what to do
/// when it gets there.
pub struct InitializationPlan {
    /// References that must reach `Identifiable` before this type does.
    pub preconditions_for_identifiable: Vec<Rc<TypeReference>>,
    /// References that must reach `Completed` before this type does.
    pub preconditions_for_completed: Vec<Rc<TypeReference>>,
    /// References whose invalidation resets this type to `Invalid`.
    pub references_relevant_for_invalidation: Vec<Rc<TypeReference>>,
    /// Finalizes the identifier; runs immediately before the switch.
    pub on_identifiable: Rc<dyn Fn(&Rc<Type>)>,
    pub on_completed: Rc<dyn Fn(&Rc<Type>)>,
    pub on_invalidated: Rc<dyn Fn(&Rc<Type>)>,
}

impl InitializationPlan {
    pub fn new(on_identifiable: impl Fn(&Rc<Type>) + 'static) -> Self {
        Self {
            preconditions_for_identifiable: Vec::new(),
            preconditions_for_completed: Vec::new(),
            references_relevant_for_invalidation: Vec::new(),
            on_identifiable: Rc::new(on_identifiable),
            on_completed: Rc::new(|_| {}),
            on_invalidated: Rc::new(|_| {}),
        }
    }

    pub fn identifiable_after(mut self, references: Vec<Rc<TypeReference>>) -> Self {
        self.preconditions_for_identifiable = references;
        self
    }

    pub fn completed_after(mut self, references: Vec<Rc<TypeReference>>) -> Self {
        self.preconditions_for_completed = references;
        self
    }

    pub fn invalidated_by(mut self, references: Vec<Rc<TypeReference>>) -> Self {
        self.references_relevant_for_invalidation = references;
        self
    }

    pub fn on_completed(mut self, f: impl Fn(&Rc<Type>) + 'static) -> Self {
        self.on_completed = Rc::new(f);
        self
    }

    pub fn on_invalidated(mut self, f: impl Fn(&Rc<Type>) + 'static) -> Self {
        self.on_invalidated = Rc::new(f);
        self
    }
}

struct InitializationRuntime {
    waiter_identifiable: Rc<DependencyWaiter>,
    waiter_completed: Rc<DependencyWaiter>,
    // Kept alive for the lifetime of the node; the references only hold the
    // watchers weakly through their listener lists.
    #[allow(dead_code)]
    invalidation_watchers: Vec<Rc<InvalidationWatch>>,
    on_identifiable: Rc<dyn Fn(&Rc<Type>)>,
    on_completed: Rc<dyn Fn(&Rc<Type>)>,
    on_invalidated: Rc<dyn Fn(&Rc<Type>)>,
}

/// A node of the type graph.
pub struct Type {
    body: TypeBody,
    state: Cell<TypeState>,
    identifier: RefCell<Option<String>>,
    listeners: RefCell<Vec<Rc<dyn TypeStateListener>>>,
    /// Types treated as trivially satisfied by this node's waiters, used to
    /// break mutual-dependency cycles during initialization.
    ignored_for_cycles: RefCell<FxHashMap<usize, Rc<Type>>>,
    plan: RefCell<Option<InitializationPlan>>,
    runtime: RefCell<Option<Rc<InitializationRuntime>>>,
    /// Set when the node lost a deduplication race and must never transition
    /// again.
    abandoned: Cell<bool>,
}

impl Type {
    pub fn new(body: TypeBody) -> Rc<Self> {
        Rc::new(Self {
            body,
            state: Cell::new(TypeState::Invalid),
            identifier: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            ignored_for_cycles: RefCell::new(FxHashMap::default()),
            plan: RefCell::new(None),
            runtime: RefCell::new(None),
            abandoned: Cell::new(false),
        })
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn body(&self) -> &TypeBody {
        &self.body
    }

    pub fn kind_name(&self) -> &str {
        self.body.kind_name()
    }

    /// The short name of the type, e.g. its primitive, class or function
    /// name. Available in every state.
    pub fn name(&self) -> String {
        self.body.type_name()
    }

    /// A representation suitable for showing the type to an end user.
    pub fn user_representation(&self) -> String {
        self.body.user_representation()
    }

    /// The stable identifier. `None` until the node reaches `Identifiable`.
    pub fn identifier(&self) -> Option<String> {
        self.identifier.borrow().clone()
    }

    /// Finalize the identifier. Once the node has been identifiable the
    /// identifier may never change.
    pub fn set_identifier(&self, identifier: impl Into<String>) {
        let identifier = identifier.into();
        let mut slot = self.identifier.borrow_mut();
        if let Some(existing) = slot.as_ref() {
            if existing != &identifier {
                panic!(
                    "the identifier of '{}' must not change from '{existing}' to '{identifier}'",
                    self.name()
                );
            }
            return;
        }
        *slot = Some(identifier);
    }

    pub fn state(&self) -> TypeState {
        self.state.get()
    }

    pub fn is_in_state_or_later(&self, state: TypeState) -> bool {
        self.state.get() >= state
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.get()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a state listener. With `inform_now`, the listener receives
    /// the current state synchronously before this call returns.
    pub fn add_listener(self: &Rc<Self>, listener: Rc<dyn TypeStateListener>, inform_now: bool) {
        {
            let mut listeners = self.listeners.borrow_mut();
            if listeners.iter().any(|l| thin_ptr(l) == thin_ptr(&listener)) {
                return;
            }
            listeners.push(listener.clone());
        }
        if inform_now {
            match self.state.get() {
                TypeState::Invalid => listener.on_switched_to_invalid(self),
                TypeState::Identifiable => listener.on_switched_to_identifiable(self),
                TypeState::Completed => listener.on_switched_to_completed(self),
            }
        }
    }

    pub fn remove_listener(&self, listener: &Rc<dyn TypeStateListener>) {
        self.listeners
            .borrow_mut()
            .retain(|l| thin_ptr(l) != thin_ptr(listener));
    }

    fn notify_listeners(self: &Rc<Self>, f: impl Fn(&Rc<dyn TypeStateListener>, &Rc<Type>)) {
        let snapshot: Vec<Rc<dyn TypeStateListener>> = self.listeners.borrow().clone();
        for listener in &snapshot {
            f(listener, self);
        }
    }

    // =========================================================================
    // Staged initialization
    // =========================================================================

    /// Store the initialization plan. The plan only takes effect once
    /// [`Type::start_initialization`] runs, which the type initializer does
    /// after it has registered itself as a listener.
    pub fn define_initialization(&self, plan: InitializationPlan) {
        *self.plan.borrow_mut() = Some(plan);
    }

    pub(crate) fn start_initialization(self: &Rc<Self>) {
        let Some(plan) = self.plan.borrow_mut().take() else {
            return;
        };
        let owner = Rc::downgrade(self);
        let waiter_identifiable = DependencyWaiter::new(
            owner.clone(),
            plan.preconditions_for_identifiable,
            Vec::new(),
        );
        let waiter_completed =
            DependencyWaiter::new(owner.clone(), Vec::new(), plan.preconditions_for_completed);
        waiter_identifiable.add_listener(Rc::new(IdentifiableGate { ty: owner.clone() }), false);
        waiter_completed.add_listener(Rc::new(CompletedGate { ty: owner.clone() }), false);

        let mut invalidation_watchers = Vec::new();
        for reference in &plan.references_relevant_for_invalidation {
            let watch = Rc::new(InvalidationWatch { ty: owner.clone() });
            reference.add_listener(watch.clone(), false);
            invalidation_watchers.push(watch);
        }

        let runtime = Rc::new(InitializationRuntime {
            waiter_identifiable: waiter_identifiable.clone(),
            waiter_completed: waiter_completed.clone(),
            invalidation_watchers,
            on_identifiable: plan.on_identifiable,
            on_completed: plan.on_completed,
            on_invalidated: plan.on_invalidated,
        });
        *self.runtime.borrow_mut() = Some(runtime);

        // May walk the node to Identifiable and Completed in this call frame
        // when the preconditions are already met, including the empty set.
        waiter_identifiable.refresh();
        waiter_completed.refresh();
    }

    fn runtime_rc(&self) -> Option<Rc<InitializationRuntime>> {
        self.runtime.borrow().clone()
    }

    pub(crate) fn try_switch_identifiable(self: &Rc<Self>) {
        if self.abandoned.get() || self.state.get() != TypeState::Invalid {
            return;
        }
        let Some(runtime) = self.runtime_rc() else {
            return;
        };
        if !runtime.waiter_identifiable.is_fulfilled() {
            return;
        }
        (runtime.on_identifiable)(self);
        self.state.set(TypeState::Identifiable);
        trace!(name = %self.name(), identifier = ?self.identifier(), "type switched to identifiable");
        self.notify_listeners(|l, t| l.on_switched_to_identifiable(t));
        self.try_switch_completed();
    }

    pub(crate) fn try_switch_completed(self: &Rc<Self>) {
        if self.abandoned.get() || self.state.get() != TypeState::Identifiable {
            return;
        }
        let Some(runtime) = self.runtime_rc() else {
            return;
        };
        if !runtime.waiter_completed.is_fulfilled() {
            return;
        }
        (runtime.on_completed)(self);
        self.state.set(TypeState::Completed);
        trace!(name = %self.name(), "type switched to completed");
        self.notify_listeners(|l, t| l.on_switched_to_completed(t));
    }

    /// Reset the node to `Invalid`. The state machine may revisit
    /// `Identifiable` and `Completed` when the relevant references resolve
    /// again.
    pub fn invalidate(self: &Rc<Self>) {
        if self.state.get() == TypeState::Invalid {
            return;
        }
        if let Some(runtime) = self.runtime_rc() {
            (runtime.on_invalidated)(self);
        }
        self.state.set(TypeState::Invalid);
        trace!(name = %self.name(), "type switched back to invalid");
        self.notify_listeners(|l, t| l.on_switched_to_invalid(t));
    }

    /// Give up on this node after it lost a deduplication race. The node
    /// becomes `Invalid` terminally and never transitions again.
    pub(crate) fn abandon(self: &Rc<Self>) {
        if self.abandoned.replace(true) {
            return;
        }
        self.invalidate();
    }

    // =========================================================================
    // Cycle breaking
    // =========================================================================

    /// Treat the given types as satisfied dependencies while this node
    /// initializes. Propagates once to every pending dependency; repeated
    /// propagation terminates because the set only grows.
    ///
    /// Returns whether any type was newly added.
    pub fn ignore_types_for_cycles(self: &Rc<Self>, types: &[Rc<Type>]) -> bool {
        let mut newly_added = false;
        {
            let mut ignored = self.ignored_for_cycles.borrow_mut();
            for ty in types {
                if ignored.insert(thin_ptr(ty), ty.clone()).is_none() {
                    newly_added = true;
                }
            }
        }
        if !newly_added {
            return false;
        }
        trace!(name = %self.name(), count = types.len(), "ignoring types for cycle breaking");
        let full_set: Vec<Rc<Type>> = self.ignored_for_cycles.borrow().values().cloned().collect();
        for child in self.pending_dependencies() {
            child.ignore_types_for_cycles(&full_set);
        }
        if let Some(runtime) = self.runtime_rc() {
            runtime.waiter_identifiable.refresh();
            runtime.waiter_completed.refresh();
        }
        true
    }

    pub(crate) fn is_ignored_for_cycles(&self, ty: &Rc<Type>) -> bool {
        self.ignored_for_cycles.borrow().contains_key(&thin_ptr(ty))
    }

    /// The resolved-but-not-yet-ready types this node is currently waiting
    /// for, ignored ones excluded.
    pub(crate) fn pending_dependencies(&self) -> Vec<Rc<Type>> {
        let Some(runtime) = self.runtime_rc() else {
            return Vec::new();
        };
        let mut pending = runtime.waiter_identifiable.pending_types();
        for ty in runtime.waiter_completed.pending_types() {
            if !pending.iter().any(|p| Rc::ptr_eq(p, &ty)) {
                pending.push(ty);
            }
        }
        pending
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type('{}', {:?}, {:?})",
            self.name(),
            self.state.get(),
            self.identifier.borrow()
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// Adapters wiring the waiters and references back into the state machine.

struct IdentifiableGate {
    ty: std::rc::Weak<Type>,
}

impl WaiterListener for IdentifiableGate {
    fn on_fulfilled(&self, _waiter: &Rc<DependencyWaiter>) {
        if let Some(ty) = self.ty.upgrade() {
            ty.try_switch_identifiable();
        }
    }
}

struct CompletedGate {
    ty: std::rc::Weak<Type>,
}

impl WaiterListener for CompletedGate {
    fn on_fulfilled(&self, _waiter: &Rc<DependencyWaiter>) {
        if let Some(ty) = self.ty.upgrade() {
            // After an invalidation round the node may still sit at
            // `Invalid` although its identifiable waiter never flipped;
            // re-climb from there.
            ty.try_switch_identifiable();
            ty.try_switch_completed();
        }
    }
}

struct InvalidationWatch {
    ty: std::rc::Weak<Type>,
}

impl TypeReferenceListener for InvalidationWatch {
    fn on_type_reference_resolved(&self, _reference: &Rc<TypeReference>, _resolved: &Rc<Type>) {
        if let Some(ty) = self.ty.upgrade() {
            ty.try_switch_identifiable();
            ty.try_switch_completed();
        }
    }

    fn on_type_reference_invalidated(&self, _reference: &Rc<TypeReference>, _previous: &Rc<Type>) {
        if let Some(ty) = self.ty.upgrade() {
            ty.invalidate();
        }
    }
}
