//! Driving a fresh type node through its states.
//!
//! The initializer watches the provisional node it was given; the moment
//! the node becomes identifiable, `produced_type` consults the graph: if a
//! node with the same identifier already exists, the provisional node is
//! abandoned and the existing node survives, otherwise the provisional node
//! is installed. Afterwards exactly one live node per identifier exists.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::node::{Type, TypeStateListener};
use crate::services::TypeSystem;

/// Computes an optional auxiliary graph key for the installed node, e.g.
/// the class-name index entry of a structural class.
pub type AuxiliaryKeyFn = Box<dyn Fn(&Rc<Type>) -> Option<String>>;

/// Ready callbacks receive the surviving node and whether the provisional
/// node was collapsed into a pre-existing equivalent.
pub type ReadyCallback = Rc<dyn Fn(&Rc<Type>, bool)>;

pub struct TypeInitializer {
    services: Weak<TypeSystem>,
    initial: Rc<Type>,
    final_type: RefCell<Option<Rc<Type>>>,
    collapsed: Cell<bool>,
    auxiliary_key: RefCell<Option<AuxiliaryKeyFn>>,
    on_ready: RefCell<Vec<ReadyCallback>>,
    ready_fired: Cell<bool>,
}

impl TypeInitializer {
    /// Create an initializer for a provisional node whose initialization
    /// plan has been defined but not started. Call [`TypeInitializer::start`]
    /// once all ready callbacks are attached.
    pub fn new(services: &Rc<TypeSystem>, initial: Rc<Type>) -> Rc<Self> {
        Rc::new(Self {
            services: Rc::downgrade(services),
            initial,
            final_type: RefCell::new(None),
            collapsed: Cell::new(false),
            auxiliary_key: RefCell::new(None),
            on_ready: RefCell::new(Vec::new()),
            ready_fired: Cell::new(false),
        })
    }

    pub fn set_auxiliary_key(&self, f: AuxiliaryKeyFn) {
        *self.auxiliary_key.borrow_mut() = Some(f);
    }

    /// Attach a callback fired once the surviving node is decided. A
    /// callback attached after that point fires immediately.
    pub fn on_ready(&self, callback: impl Fn(&Rc<Type>, bool) + 'static) {
        if self.ready_fired.get() {
            let final_type = self
                .final_type
                .borrow()
                .clone()
                .expect("ready implies a decided type");
            callback(&final_type, self.collapsed.get());
            return;
        }
        self.on_ready.borrow_mut().push(Rc::new(callback));
    }

    /// Begin initialization. May synchronously walk the node to
    /// `Identifiable` and `Completed` when its preconditions are already
    /// met.
    pub fn start(self: &Rc<Self>) {
        self.initial
            .add_listener(self.clone() as Rc<dyn TypeStateListener>, true);
        self.initial.start_initialization();
    }

    /// The initial node, even if it is not yet identifiable and even if it
    /// later loses the deduplication race.
    pub fn get_type_initial(&self) -> Rc<Type> {
        self.initial.clone()
    }

    /// The surviving node, available once the initial node became
    /// identifiable and deduplication was decided.
    pub fn get_type_final(&self) -> Option<Rc<Type>> {
        self.final_type.borrow().clone()
    }

    /// The best node to resolve to right now: the surviving node if
    /// decided, otherwise the initial node.
    pub fn current_type(&self) -> Rc<Type> {
        self.final_type
            .borrow()
            .clone()
            .unwrap_or_else(|| self.initial.clone())
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed.get()
    }

    fn produced_type(&self, ty: &Rc<Type>) {
        if self.final_type.borrow().is_some() {
            // Re-promotion after an invalidation round; the surviving node
            // was decided long ago.
            return;
        }
        let Some(services) = self.services.upgrade() else {
            return;
        };
        let identifier = ty
            .identifier()
            .expect("an identifiable type must have an identifier");

        let existing = services.graph().get_type(&identifier);
        let (final_type, collapsed) = match existing {
            Some(existing) if !Rc::ptr_eq(&existing, ty) => {
                debug!(identifier, "collapsing fresh type into existing equivalent");
                (existing, true)
            }
            Some(existing) => (existing, false),
            None => {
                services
                    .graph()
                    .add_node(ty.clone())
                    .expect("identifier availability was checked before installation");
                if let Some(key_fn) = &*self.auxiliary_key.borrow() {
                    if let Some(key) = key_fn(ty) {
                        services.graph().add_auxiliary_key(key, ty.clone());
                    }
                }
                (ty.clone(), false)
            }
        };

        *self.final_type.borrow_mut() = Some(final_type.clone());
        self.collapsed.set(collapsed);
        if collapsed {
            ty.abandon();
        }
        trace!(identifier, collapsed, "type initialization produced its node");
        self.fire_ready(&final_type, collapsed);
    }

    fn fire_ready(&self, final_type: &Rc<Type>, collapsed: bool) {
        self.ready_fired.set(true);
        let callbacks: Vec<ReadyCallback> = std::mem::take(&mut *self.on_ready.borrow_mut());
        for callback in &callbacks {
            callback(final_type, collapsed);
        }
    }
}

impl TypeStateListener for TypeInitializer {
    fn on_switched_to_identifiable(&self, ty: &Rc<Type>) {
        self.produced_type(ty);
    }
}
