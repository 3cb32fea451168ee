//! The services container.
//!
//! One [`TypeSystem`] value bundles the graph, the host language adapter,
//! the rule registries and the service caches. There is no process-wide
//! state; everything lives in this container and is passed by reference.
//! The relational and inference services are implemented as `impl` blocks
//! on [`TypeSystem`] spread over their modules.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::descriptor::TypeDescriptor;
use crate::graph::{TypeGraph, TypeGraphListener};
use crate::infer::{InferenceRule, InferenceState};
use crate::language::LanguageService;
use crate::node::{Type, TypeStateListener};
use crate::reference::TypeReference;
use crate::registry::{RuleOptions, RuleRegistry};
use crate::validation::ValidationRule;

/// A factory for a family of types with shared identity and comparison
/// rules, registered on the services container under its unique name.
pub trait Kind: std::any::Any {
    fn kind_name(&self) -> &str;
}

pub struct TypeSystem {
    me: Weak<TypeSystem>,
    graph: TypeGraph,
    language: Rc<dyn LanguageService>,
    inference_rules: RuleRegistry<dyn InferenceRule>,
    validation_rules: RuleRegistry<dyn ValidationRule>,
    lifecycle_rules: RefCell<Vec<Rc<dyn ValidationRule>>>,
    inference_state: RefCell<InferenceState>,
    kinds: RefCell<FxHashMap<String, Rc<dyn Kind>>>,
}

impl TypeSystem {
    pub fn new(language: Rc<dyn LanguageService>) -> Rc<Self> {
        let services = Rc::new_cyclic(|me: &Weak<TypeSystem>| TypeSystem {
            me: me.clone(),
            graph: TypeGraph::new(),
            language,
            inference_rules: RuleRegistry::new(me.clone()),
            validation_rules: RuleRegistry::new(me.clone()),
            lifecycle_rules: RefCell::new(Vec::new()),
            inference_state: RefCell::new(InferenceState::default()),
            kinds: RefCell::new(FxHashMap::default()),
        });
        let hook = LifecycleHook::create(Rc::downgrade(&services));
        services.graph.add_listener(hook, false);
        services
    }

    /// The owning handle of this container. Panics if called while the
    /// container is being dropped.
    pub fn handle(&self) -> Rc<TypeSystem> {
        self.me.upgrade().expect("the services container is alive")
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    pub fn language(&self) -> &Rc<dyn LanguageService> {
        &self.language
    }

    /// Create a reference resolving the descriptor against this container.
    pub fn create_reference(&self, descriptor: TypeDescriptor) -> Rc<TypeReference> {
        TypeReference::create(&self.handle(), descriptor)
    }

    // =========================================================================
    // Inference rules
    // =========================================================================

    pub fn add_inference_rule(&self, rule: Rc<dyn InferenceRule>, options: &RuleOptions) {
        self.inference_rules.add_rule(rule, options);
    }

    pub fn remove_inference_rule(&self, rule: &Rc<dyn InferenceRule>, options: &RuleOptions) {
        self.inference_rules.remove_rule(rule, options);
    }

    pub fn get_number_unique_inference_rules(&self) -> usize {
        self.inference_rules.get_number_unique_rules()
    }

    pub fn get_number_unique_validation_rules(&self) -> usize {
        self.validation_rules.get_number_unique_rules()
    }

    // =========================================================================
    // Kinds
    // =========================================================================

    /// Register a kind under its unique name. Registering a second kind
    /// with the same name is a host configuration error.
    pub fn register_kind(&self, kind: Rc<dyn Kind>) {
        let name = kind.kind_name().to_string();
        let previous = self.kinds.borrow_mut().insert(name.clone(), kind);
        if previous.is_some() {
            panic!("a kind named '{name}' is already registered");
        }
    }

    pub fn get_kind(&self, name: &str) -> Option<Rc<dyn Kind>> {
        self.kinds.borrow().get(name).cloned()
    }

    pub fn has_kind(&self, name: &str) -> bool {
        self.kinds.borrow().contains_key(name)
    }

    // Internal accessors for the service impl blocks.

    pub(crate) fn inference_rules(&self) -> &RuleRegistry<dyn InferenceRule> {
        &self.inference_rules
    }

    pub(crate) fn validation_rules(&self) -> &RuleRegistry<dyn ValidationRule> {
        &self.validation_rules
    }

    pub(crate) fn lifecycle_rules(&self) -> &RefCell<Vec<Rc<dyn ValidationRule>>> {
        &self.lifecycle_rules
    }

    pub(crate) fn inference_state(&self) -> &RefCell<InferenceState> {
        &self.inference_state
    }
}

/// Graph listener owned by the container: keeps the registries and the
/// inference cache consistent with the node population.
struct LifecycleHook {
    me: RefCell<Weak<LifecycleHook>>,
    services: Weak<TypeSystem>,
}

impl LifecycleHook {
    fn create(services: Weak<TypeSystem>) -> Rc<Self> {
        let hook = Rc::new(Self {
            me: RefCell::new(Weak::new()),
            services,
        });
        *hook.me.borrow_mut() = Rc::downgrade(&hook);
        hook
    }
}

impl TypeGraphListener for LifecycleHook {
    fn on_added_type(&self, ty: &Rc<Type>, _key: &str) {
        // Watch installed types for invalidation; a reset type makes the
        // memoized inference results unreliable.
        if let Some(me) = self.me.borrow().upgrade() {
            ty.add_listener(me as Rc<dyn TypeStateListener>, false);
        }
    }

    fn on_removed_type(&self, ty: &Rc<Type>, _key: &str) {
        if let Some(services) = self.services.upgrade() {
            services.inference_rules.on_removed_type(ty);
            services.validation_rules.on_removed_type(ty);
            services.flush_inference_cache();
        }
    }
}

impl TypeStateListener for LifecycleHook {
    fn on_switched_to_invalid(&self, _ty: &Rc<Type>) {
        if let Some(services) = self.services.upgrade() {
            services.flush_inference_cache();
        }
    }
}
