//! Waiters over sets of type references.
//!
//! A [`DependencyWaiter`] flips to fulfilled when every watched reference
//! has resolved to a type that reached the required state, treating types
//! in the owner's ignore set as trivially satisfied. Waiting is purely
//! event-driven: the waiter subscribes to reference and type-state events
//! and returns immediately; nothing ever blocks.
//!
//! When a dependency chain loops back onto the waiter's owner, the cycle is
//! broken by adding every member of the cycle to the ignore sets of all
//! members, which lets the whole group initialize together.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::graph::thin_ptr;
use crate::node::{Type, TypeState, TypeStateListener};
use crate::reference::{TypeReference, TypeReferenceListener};

/// Observer of a waiter's fulfillment state.
pub trait WaiterListener {
    fn on_fulfilled(&self, _waiter: &Rc<DependencyWaiter>) {}
    fn on_invalidated(&self, _waiter: &Rc<DependencyWaiter>) {}
}

struct WaitEntry {
    reference: Rc<TypeReference>,
    required: TypeState,
}

/// Waits until every "identifiable" reference reached `Identifiable` or
/// later and every "completed" reference reached `Completed`, unless the
/// owner ignores the referenced type for cycle breaking.
pub struct DependencyWaiter {
    me: Weak<DependencyWaiter>,
    owner: Weak<Type>,
    entries: Vec<WaitEntry>,
    fulfilled: Cell<bool>,
    /// Re-entry guard: don't fire twice while a refresh is in progress.
    checking: Cell<bool>,
    listeners: RefCell<Vec<Rc<dyn WaiterListener>>>,
}

impl DependencyWaiter {
    pub fn new(
        owner: Weak<Type>,
        references_identifiable: Vec<Rc<TypeReference>>,
        references_completed: Vec<Rc<TypeReference>>,
    ) -> Rc<Self> {
        let mut entries = Vec::with_capacity(
            references_identifiable.len() + references_completed.len(),
        );
        for reference in references_identifiable {
            entries.push(WaitEntry {
                reference,
                required: TypeState::Identifiable,
            });
        }
        for reference in references_completed {
            entries.push(WaitEntry {
                reference,
                required: TypeState::Completed,
            });
        }
        let waiter = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            owner,
            entries,
            fulfilled: Cell::new(false),
            checking: Cell::new(false),
            listeners: RefCell::new(Vec::new()),
        });
        for entry in &waiter.entries {
            entry
                .reference
                .add_listener(waiter.clone() as Rc<dyn TypeReferenceListener>, false);
            if let Some(ty) = entry.reference.get() {
                ty.add_listener(waiter.clone() as Rc<dyn TypeStateListener>, false);
            }
        }
        waiter
    }

    fn me(&self) -> Rc<DependencyWaiter> {
        self.me.upgrade().expect("waiter is alive while handled")
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled.get()
    }

    /// Register a listener. With `inform_now`, a fulfilled waiter reports
    /// fulfillment synchronously before this call returns.
    pub fn add_listener(self: &Rc<Self>, listener: Rc<dyn WaiterListener>, inform_now: bool) {
        self.listeners.borrow_mut().push(listener.clone());
        if inform_now && self.fulfilled.get() {
            listener.on_fulfilled(self);
        }
    }

    /// Re-evaluate fulfillment, attempting cycle breaking while the waiter
    /// stays unsatisfied and progress can still be made.
    pub fn refresh(&self) {
        if self.checking.replace(true) {
            return;
        }
        // Unresolved references may be resolvable by now, e.g. a thunk
        // descriptor whose target was created after this waiter.
        for entry in &self.entries {
            entry.reference.try_resolve_now();
        }
        let mut satisfied = self.compute_satisfied();
        if !satisfied {
            if let Some(owner) = self.owner.upgrade() {
                let mut progressed = true;
                while !satisfied && progressed {
                    progressed = false;
                    if let Some(cycle) = find_initialization_cycle(&owner) {
                        trace!(owner = %owner.name(), len = cycle.len(), "breaking initialization cycle");
                        for member in &cycle {
                            if member.ignore_types_for_cycles(&cycle) {
                                progressed = true;
                            }
                        }
                    }
                    satisfied = self.compute_satisfied();
                }
            }
        }
        self.checking.set(false);
        self.apply(satisfied);
    }

    fn apply(&self, satisfied: bool) {
        if satisfied == self.fulfilled.get() {
            return;
        }
        self.fulfilled.set(satisfied);
        let myself = self.me();
        let snapshot: Vec<Rc<dyn WaiterListener>> = self.listeners.borrow().clone();
        for listener in &snapshot {
            if satisfied {
                listener.on_fulfilled(&myself);
            } else {
                listener.on_invalidated(&myself);
            }
        }
    }

    fn entry_satisfied(&self, entry: &WaitEntry) -> bool {
        let Some(ty) = entry.reference.get() else {
            return false;
        };
        if ty.is_in_state_or_later(entry.required) {
            return true;
        }
        match self.owner.upgrade() {
            Some(owner) => owner.is_ignored_for_cycles(&ty),
            None => false,
        }
    }

    fn compute_satisfied(&self) -> bool {
        self.entries.iter().all(|e| self.entry_satisfied(e))
    }

    /// The types this waiter is still waiting for: resolved, below their
    /// required state, and not ignored. Unresolved references get one more
    /// resolution attempt so cycle detection sees late-bound dependencies.
    pub fn pending_types(&self) -> Vec<Rc<Type>> {
        let owner = self.owner.upgrade();
        let mut pending: Vec<Rc<Type>> = Vec::new();
        for entry in &self.entries {
            if !entry.reference.is_resolved() {
                entry.reference.try_resolve_now();
            }
            let Some(ty) = entry.reference.get() else {
                continue;
            };
            if ty.is_in_state_or_later(entry.required) {
                continue;
            }
            if let Some(owner) = &owner {
                if owner.is_ignored_for_cycles(&ty) {
                    continue;
                }
            }
            if !pending.iter().any(|p| Rc::ptr_eq(p, &ty)) {
                pending.push(ty);
            }
        }
        pending
    }
}

impl TypeReferenceListener for DependencyWaiter {
    fn on_type_reference_resolved(&self, _reference: &Rc<TypeReference>, resolved: &Rc<Type>) {
        resolved.add_listener(self.me() as Rc<dyn TypeStateListener>, false);
        self.refresh();
    }

    fn on_type_reference_invalidated(&self, _reference: &Rc<TypeReference>, _previous: &Rc<Type>) {
        self.refresh();
    }
}

impl TypeStateListener for DependencyWaiter {
    fn on_switched_to_invalid(&self, _ty: &Rc<Type>) {
        self.refresh();
    }

    fn on_switched_to_identifiable(&self, _ty: &Rc<Type>) {
        self.refresh();
    }

    fn on_switched_to_completed(&self, _ty: &Rc<Type>) {
        self.refresh();
    }
}

/// Find a dependency cycle through the pending dependencies of `origin`:
/// a path origin -> ... -> origin where every hop waits on the next. The
/// returned set contains every type on the path, origin included.
pub(crate) fn find_initialization_cycle(origin: &Rc<Type>) -> Option<Vec<Rc<Type>>> {
    fn dfs(
        origin: &Rc<Type>,
        current: &Rc<Type>,
        visited: &mut Vec<usize>,
        path: &mut Vec<Rc<Type>>,
    ) -> bool {
        for dependency in current.pending_dependencies() {
            if Rc::ptr_eq(&dependency, origin) {
                return true;
            }
            let ptr = thin_ptr(&dependency);
            if visited.contains(&ptr) {
                continue;
            }
            visited.push(ptr);
            path.push(dependency.clone());
            if dfs(origin, &dependency, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    let mut visited = vec![thin_ptr(origin)];
    let mut path = vec![origin.clone()];
    if dfs(origin, origin, &mut visited, &mut path) {
        Some(path)
    } else {
        None
    }
}

/// Fires whenever all watched references are invalid, i.e. unresolved or
/// resolved to a type that fell back to `Invalid`. Used to dispose a node
/// once everything it was built from is gone.
pub struct DisposalWaiter {
    me: Weak<DisposalWaiter>,
    references: Vec<Rc<TypeReference>>,
    fulfilled: Cell<bool>,
    callbacks: RefCell<Vec<Rc<dyn Fn()>>>,
}

impl DisposalWaiter {
    pub fn new(references: Vec<Rc<TypeReference>>) -> Rc<Self> {
        let waiter = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            references,
            fulfilled: Cell::new(false),
            callbacks: RefCell::new(Vec::new()),
        });
        for reference in &waiter.references {
            reference.add_listener(waiter.clone() as Rc<dyn TypeReferenceListener>, false);
            if let Some(ty) = reference.get() {
                ty.add_listener(waiter.clone() as Rc<dyn TypeStateListener>, false);
            }
        }
        waiter
    }

    pub fn on_all_invalid(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().push(Rc::new(callback));
        self.refresh();
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled.get()
    }

    fn refresh(&self) {
        let all_invalid = self.references.iter().all(|r| match r.get() {
            None => true,
            Some(ty) => ty.state() == TypeState::Invalid,
        });
        let was = self.fulfilled.replace(all_invalid);
        if all_invalid && !was {
            let snapshot: Vec<Rc<dyn Fn()>> = self.callbacks.borrow().clone();
            for callback in &snapshot {
                callback();
            }
        }
    }

    fn me(&self) -> Rc<DisposalWaiter> {
        self.me.upgrade().expect("waiter is alive while handled")
    }
}

impl TypeReferenceListener for DisposalWaiter {
    fn on_type_reference_resolved(&self, _reference: &Rc<TypeReference>, resolved: &Rc<Type>) {
        resolved.add_listener(self.me() as Rc<dyn TypeStateListener>, false);
        self.refresh();
    }

    fn on_type_reference_invalidated(&self, _reference: &Rc<TypeReference>, _previous: &Rc<Type>) {
        self.refresh();
    }
}

impl TypeStateListener for DisposalWaiter {
    fn on_switched_to_invalid(&self, _ty: &Rc<Type>) {
        self.refresh();
    }

    fn on_switched_to_identifiable(&self, _ty: &Rc<Type>) {
        self.refresh();
    }

    fn on_switched_to_completed(&self, _ty: &Rc<Type>) {
        self.refresh();
    }
}
