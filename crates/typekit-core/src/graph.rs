//! The type graph.
//!
//! A labeled directed multigraph: nodes are type nodes keyed by their stable
//! identifier (plus optional auxiliary keys), edges carry the relational
//! labels maintained by the equality, sub-type and conversion services.
//! Listeners observe additions and removals; notifications fire after the
//! mutation commits, so a listener always operates on a consistent graph.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::node::Type;

/// Identity of a reference-counted value, usable as a hash key.
pub(crate) fn thin_ptr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// How a conversion edge may be applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConversionMode {
    /// Only applied on an explicit request, e.g. a cast written by the user.
    Explicit,
    /// Applied implicitly by the engine, and also on explicit requests.
    ImplicitExplicit,
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionMode::Explicit => f.write_str("EXPLICIT"),
            ConversionMode::ImplicitExplicit => f.write_str("IMPLICIT_EXPLICIT"),
        }
    }
}

/// Label of a graph edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Oriented from sub-type to super-type.
    SubType,
    /// Oriented from source to target of the conversion.
    Conversion(ConversionMode),
    /// Symmetric; stored once, traversable in both directions.
    Equality,
}

/// Cached verdict of a relational edge.
///
/// Relational services memoize both positive and negative analysis results,
/// so an edge may record that a relation does *not* hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeVerdict {
    LinkExists,
    NoLink,
}

/// An edge of the type graph.
pub struct TypeEdge {
    pub from: Rc<Type>,
    pub to: Rc<Type>,
    pub kind: EdgeKind,
    verdict: Cell<EdgeVerdict>,
    /// Whether the edge was explicitly marked by the host, as opposed to
    /// memoized from a relational analysis.
    explicit: bool,
}

impl TypeEdge {
    pub fn new(from: Rc<Type>, to: Rc<Type>, kind: EdgeKind, verdict: EdgeVerdict) -> Rc<Self> {
        Rc::new(Self {
            from,
            to,
            kind,
            verdict: Cell::new(verdict),
            explicit: false,
        })
    }

    pub fn new_explicit(from: Rc<Type>, to: Rc<Type>, kind: EdgeKind) -> Rc<Self> {
        Rc::new(Self {
            from,
            to,
            kind,
            verdict: Cell::new(EdgeVerdict::LinkExists),
            explicit: true,
        })
    }

    pub fn verdict(&self) -> EdgeVerdict {
        self.verdict.get()
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whether the relation this edge stands for actually holds.
    pub fn links(&self) -> bool {
        self.verdict.get() == EdgeVerdict::LinkExists
    }
}

impl fmt::Debug for TypeEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} edge '{}' -> '{}' ({:?})",
            self.kind,
            self.from.name(),
            self.to.name(),
            self.verdict.get()
        )
    }
}

/// Observer of graph mutations. All methods default to no-ops so listeners
/// implement only what they care about.
pub trait TypeGraphListener {
    fn on_added_type(&self, _ty: &Rc<Type>, _key: &str) {}
    fn on_removed_type(&self, _ty: &Rc<Type>, _key: &str) {}
    fn on_added_edge(&self, _edge: &Rc<TypeEdge>) {}
    fn on_removed_edge(&self, _edge: &Rc<TypeEdge>) {}
}

/// Failure of a graph-level operation.
#[derive(Clone, Debug)]
pub enum GraphError {
    /// A second node with an existing identifier was installed without going
    /// through deduplication.
    DuplicateType { identifier: String },
    /// Adding the edge would close a forbidden cycle.
    CycleIntroduced {
        from: String,
        to: String,
        label: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateType { identifier } => {
                write!(f, "A type with the identifier '{identifier}' is already registered.")
            }
            GraphError::CycleIntroduced { from, to, label } => {
                write!(
                    f,
                    "Relating '{from}' to '{to}' as {label} would introduce a cycle."
                )
            }
        }
    }
}

impl std::error::Error for GraphError {}

type EdgeList = SmallVec<[Rc<TypeEdge>; 4]>;

/// The shared type graph. Owned by the services container; all interior
/// mutability is single-threaded.
#[derive(Default)]
pub struct TypeGraph {
    /// Primary node table, keyed by identifier, in registration order.
    nodes: RefCell<IndexMap<String, Rc<Type>>>,
    /// Auxiliary keys, e.g. the class-name index for structural classes.
    auxiliary: RefCell<FxHashMap<String, Rc<Type>>>,
    outgoing: RefCell<FxHashMap<usize, EdgeList>>,
    incoming: RefCell<FxHashMap<usize, EdgeList>>,
    listeners: RefCell<Vec<Rc<dyn TypeGraphListener>>>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Install a node under its identifier. The node must be identifiable.
    pub fn add_node(&self, ty: Rc<Type>) -> Result<(), GraphError> {
        let Some(identifier) = ty.identifier() else {
            panic!("a type must have an identifier before it is added to the graph");
        };
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes.contains_key(&identifier) {
                return Err(GraphError::DuplicateType { identifier });
            }
            nodes.insert(identifier.clone(), ty.clone());
        }
        trace!(identifier, "added type to graph");
        self.notify(|l| l.on_added_type(&ty, &identifier));
        Ok(())
    }

    /// Register an additional lookup key for an already-installed node.
    pub fn add_auxiliary_key(&self, key: impl Into<String>, ty: Rc<Type>) {
        self.auxiliary.borrow_mut().insert(key.into(), ty);
    }

    /// Remove a node and every incident edge. Edges go first, so listeners
    /// observing the removal already see a node without edges.
    ///
    /// Returns false when the node was not registered.
    pub fn remove_node(&self, ty: &Rc<Type>, auxiliary_key: Option<&str>) -> bool {
        let Some(identifier) = ty.identifier() else {
            return false;
        };
        let registered = {
            let nodes = self.nodes.borrow();
            nodes
                .get(&identifier)
                .is_some_and(|registered| Rc::ptr_eq(registered, ty))
        };
        if !registered {
            return false;
        }

        for edge in self.incident_edges(ty) {
            self.remove_edge(&edge);
        }
        self.nodes.borrow_mut().shift_remove(&identifier);
        if let Some(key) = auxiliary_key {
            self.auxiliary.borrow_mut().remove(key);
        }
        trace!(identifier, "removed type from graph");
        self.notify(|l| l.on_removed_type(ty, &identifier));
        true
    }

    /// Look up a node by identifier or auxiliary key.
    pub fn get_type(&self, key: &str) -> Option<Rc<Type>> {
        if let Some(ty) = self.nodes.borrow().get(key) {
            return Some(ty.clone());
        }
        self.auxiliary.borrow().get(key).cloned()
    }

    pub fn get_all_registered_types(&self) -> Vec<Rc<Type>> {
        self.nodes.borrow().values().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    // =========================================================================
    // Edges
    // =========================================================================

    pub fn add_edge(&self, edge: Rc<TypeEdge>) {
        self.outgoing
            .borrow_mut()
            .entry(thin_ptr(&edge.from))
            .or_default()
            .push(edge.clone());
        self.incoming
            .borrow_mut()
            .entry(thin_ptr(&edge.to))
            .or_default()
            .push(edge.clone());
        self.notify(|l| l.on_added_edge(&edge));
    }

    pub fn remove_edge(&self, edge: &Rc<TypeEdge>) {
        let removed = {
            let mut outgoing = self.outgoing.borrow_mut();
            match outgoing.get_mut(&thin_ptr(&edge.from)) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|e| !Rc::ptr_eq(e, edge));
                    before != list.len()
                }
                None => false,
            }
        };
        if !removed {
            return;
        }
        if let Some(list) = self.incoming.borrow_mut().get_mut(&thin_ptr(&edge.to)) {
            list.retain(|e| !Rc::ptr_eq(e, edge));
        }
        self.notify(|l| l.on_removed_edge(edge));
    }

    /// The first edge matching the given endpoints and label, if any.
    pub fn get_edge(&self, from: &Rc<Type>, to: &Rc<Type>, kind: EdgeKind) -> Option<Rc<TypeEdge>> {
        let outgoing = self.outgoing.borrow();
        let list = outgoing.get(&thin_ptr(from))?;
        list.iter()
            .find(|e| e.kind == kind && Rc::ptr_eq(&e.to, to))
            .cloned()
    }

    /// All edges, optionally filtered by endpoint and label.
    pub fn get_edges(
        &self,
        from: Option<&Rc<Type>>,
        to: Option<&Rc<Type>>,
        kind: Option<EdgeKind>,
    ) -> Vec<Rc<TypeEdge>> {
        let matches = |e: &Rc<TypeEdge>| {
            from.is_none_or(|f| Rc::ptr_eq(&e.from, f))
                && to.is_none_or(|t| Rc::ptr_eq(&e.to, t))
                && kind.is_none_or(|k| e.kind == k)
        };
        match from {
            Some(f) => self
                .outgoing
                .borrow()
                .get(&thin_ptr(f))
                .map(|list| list.iter().filter(|e| matches(e)).cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut result = Vec::new();
                for list in self.outgoing.borrow().values() {
                    result.extend(list.iter().filter(|e| matches(e)).cloned());
                }
                result
            }
        }
    }

    pub fn edges_from(&self, from: &Rc<Type>) -> Vec<Rc<TypeEdge>> {
        self.outgoing
            .borrow()
            .get(&thin_ptr(from))
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    pub fn edges_to(&self, to: &Rc<Type>) -> Vec<Rc<TypeEdge>> {
        self.incoming
            .borrow()
            .get(&thin_ptr(to))
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    fn incident_edges(&self, ty: &Rc<Type>) -> Vec<Rc<TypeEdge>> {
        let mut edges = self.edges_from(ty);
        for edge in self.edges_to(ty) {
            if !edges.iter().any(|e| Rc::ptr_eq(e, &edge)) {
                edges.push(edge);
            }
        }
        edges
    }

    /// Whether a path from `from` to `to` exists over edges accepted by the
    /// filter. The empty path connects every type to itself.
    pub(crate) fn path_exists(
        &self,
        from: &Rc<Type>,
        to: &Rc<Type>,
        filter: impl Fn(&Rc<TypeEdge>) -> bool,
    ) -> bool {
        if Rc::ptr_eq(from, to) {
            return true;
        }
        let mut visited: Vec<usize> = vec![thin_ptr(from)];
        let mut queue: Vec<Rc<Type>> = vec![from.clone()];
        while let Some(current) = queue.pop() {
            for edge in self.edges_from(&current) {
                if !filter(&edge) {
                    continue;
                }
                if Rc::ptr_eq(&edge.to, to) {
                    return true;
                }
                let ptr = thin_ptr(&edge.to);
                if !visited.contains(&ptr) {
                    visited.push(ptr);
                    queue.push(edge.to.clone());
                }
            }
        }
        false
    }

    /// Remove every edge matching the predicate. Used by the equality service
    /// to flush memoized verdicts when explicit marks change.
    pub(crate) fn remove_edges_where(&self, predicate: impl Fn(&Rc<TypeEdge>) -> bool) {
        let doomed: Vec<Rc<TypeEdge>> = {
            let outgoing = self.outgoing.borrow();
            outgoing
                .values()
                .flat_map(|list| list.iter())
                .filter(|e| predicate(e))
                .cloned()
                .collect()
        };
        for edge in doomed {
            self.remove_edge(&edge);
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_listener(&self, listener: Rc<dyn TypeGraphListener>, inform_about_existing: bool) {
        {
            let mut listeners = self.listeners.borrow_mut();
            if listeners.iter().any(|l| thin_ptr(l) == thin_ptr(&listener)) {
                return;
            }
            listeners.push(listener.clone());
        }
        if inform_about_existing {
            for ty in self.get_all_registered_types() {
                let key = ty.identifier().unwrap_or_default();
                listener.on_added_type(&ty, &key);
            }
        }
    }

    pub fn remove_listener(&self, listener: &Rc<dyn TypeGraphListener>) {
        self.listeners
            .borrow_mut()
            .retain(|l| thin_ptr(l) != thin_ptr(listener));
    }

    /// Snapshot the listener list before invoking, so listeners may mutate
    /// the graph (and the listener list) re-entrantly.
    fn notify(&self, f: impl Fn(&Rc<dyn TypeGraphListener>)) {
        let snapshot: Vec<Rc<dyn TypeGraphListener>> = self.listeners.borrow().clone();
        for listener in &snapshot {
            f(listener);
        }
    }
}
