//! The rule registry.
//!
//! Rules are indexed by language key and by the types they are bound to.
//! Querying for a key returns, in order, the rules registered for that key,
//! the rules registered for the host-provided super-keys, and the rules
//! registered without a key, each unique rule at most once. When a bound
//! type disappears from the graph, its bindings are dropped; a rule with no
//! remaining binding is deregistered entirely.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::graph::thin_ptr;
use crate::node::Type;
use crate::services::TypeSystem;

/// Options attached to a rule registration.
#[derive(Clone, Default)]
pub struct RuleOptions {
    /// `None` applies the rule to nodes of any key.
    pub language_key: Option<Vec<String>>,
    /// Types this registration is tied to; empty means the rule lives
    /// independently of any type.
    pub bound_to_type: Vec<Rc<Type>>,
}

impl RuleOptions {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            language_key: Some(vec![key.into()]),
            bound_to_type: Vec::new(),
        }
    }

    pub fn for_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            language_key: Some(keys.into_iter().collect()),
            bound_to_type: Vec::new(),
        }
    }

    pub fn bound_to(mut self, ty: &Rc<Type>) -> Self {
        self.bound_to_type.push(ty.clone());
        self
    }

    fn keys(&self) -> Vec<Option<String>> {
        match &self.language_key {
            None => vec![None],
            Some(keys) => keys.iter().cloned().map(Some).collect(),
        }
    }
}

struct RegisteredRule<R: ?Sized> {
    rule: Rc<R>,
    /// Registered without any bound type.
    global: Cell<bool>,
    /// Identities of the types this registration is bound to.
    bound: RefCell<FxHashSet<usize>>,
}

impl<R: ?Sized> RegisteredRule<R> {
    fn is_alive(&self) -> bool {
        self.global.get() || !self.bound.borrow().is_empty()
    }
}

pub struct RuleRegistry<R: ?Sized> {
    services: Weak<TypeSystem>,
    entries: RefCell<FxHashMap<Option<String>, Vec<Rc<RegisteredRule<R>>>>>,
}

impl<R: ?Sized> RuleRegistry<R> {
    pub fn new(services: Weak<TypeSystem>) -> Self {
        Self {
            services,
            entries: RefCell::new(FxHashMap::default()),
        }
    }

    /// Register a rule. Registering the same rule twice for the same
    /// language key and bound type is idempotent.
    pub fn add_rule(&self, rule: Rc<R>, options: &RuleOptions) {
        let rule_ptr = thin_ptr(&rule);
        let mut entries = self.entries.borrow_mut();
        for key in options.keys() {
            let list = entries.entry(key).or_default();
            let entry = match list.iter().find(|e| thin_ptr(&e.rule) == rule_ptr) {
                Some(entry) => entry.clone(),
                None => {
                    let entry = Rc::new(RegisteredRule {
                        rule: rule.clone(),
                        global: Cell::new(false),
                        bound: RefCell::new(FxHashSet::default()),
                    });
                    list.push(entry.clone());
                    entry
                }
            };
            if options.bound_to_type.is_empty() {
                entry.global.set(true);
            } else {
                let mut bound = entry.bound.borrow_mut();
                for ty in &options.bound_to_type {
                    bound.insert(thin_ptr(ty));
                }
            }
        }
    }

    /// Remove a registration. When the options carry a subset of the keys
    /// or bound types the rule was registered with, only that subset is
    /// removed.
    pub fn remove_rule(&self, rule: &Rc<R>, options: &RuleOptions) {
        let rule_ptr = thin_ptr(rule);
        let mut entries = self.entries.borrow_mut();
        for key in options.keys() {
            let Some(list) = entries.get_mut(&key) else {
                continue;
            };
            if let Some(entry) = list.iter().find(|e| thin_ptr(&e.rule) == rule_ptr) {
                if options.bound_to_type.is_empty() {
                    entry.global.set(false);
                } else {
                    let mut bound = entry.bound.borrow_mut();
                    for ty in &options.bound_to_type {
                        bound.remove(&thin_ptr(ty));
                    }
                }
            }
            list.retain(|e| thin_ptr(&e.rule) != rule_ptr || e.is_alive());
            if list.is_empty() {
                entries.remove(&key);
            }
        }
    }

    /// The rules applicable to a node with the given key, in dispatch
    /// order: exact key, super-keys, then key-less rules.
    pub fn rules_for_key(&self, key: Option<&str>) -> Vec<Rc<R>> {
        let entries = self.entries.borrow();
        let mut result: Vec<Rc<R>> = Vec::new();
        let mut seen: FxHashSet<usize> = FxHashSet::default();

        let mut lookup_keys: Vec<Option<String>> = Vec::new();
        if let Some(key) = key {
            lookup_keys.push(Some(key.to_string()));
            if let Some(services) = self.services.upgrade() {
                for super_key in services.language().all_super_keys(key) {
                    lookup_keys.push(Some(super_key));
                }
            }
        }
        lookup_keys.push(None);

        for lookup in &lookup_keys {
            if let Some(list) = entries.get(lookup) {
                for entry in list {
                    if seen.insert(thin_ptr(&entry.rule)) {
                        result.push(entry.rule.clone());
                    }
                }
            }
        }
        result
    }

    /// Count of distinct registered rules across all indexes.
    pub fn get_number_unique_rules(&self) -> usize {
        let entries = self.entries.borrow();
        let mut seen: FxHashSet<usize> = FxHashSet::default();
        for list in entries.values() {
            for entry in list {
                seen.insert(thin_ptr(&entry.rule));
            }
        }
        seen.len()
    }

    /// Drop every binding onto the removed type; registrations with no
    /// remaining binding disappear with it.
    pub(crate) fn on_removed_type(&self, ty: &Rc<Type>) {
        let ty_ptr = thin_ptr(ty);
        let mut entries = self.entries.borrow_mut();
        let mut dropped = 0usize;
        for list in entries.values_mut() {
            list.retain(|entry| {
                entry.bound.borrow_mut().remove(&ty_ptr);
                let alive = entry.is_alive();
                if !alive {
                    dropped += 1;
                }
                alive
            });
        }
        entries.retain(|_, list| !list.is_empty());
        if dropped > 0 {
            trace!(name = %ty.name(), dropped, "deregistered rules bound to removed type");
        }
    }
}
