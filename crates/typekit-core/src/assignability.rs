//! The assignability service.
//!
//! Assignability composes equality, sub-typing and implicit conversion
//! into an ordered search: a shortest path from source to target over
//! equality edges (cost 0), sub-type edges (cost 1, sub to super) and
//! implicit conversion edges (cost 2). The returned path witnesses the
//! relation; overload resolution ranks candidate signatures by its cost.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::graph::{ConversionMode, EdgeKind, TypeEdge, thin_ptr};
use crate::node::Type;
use crate::problems::{AssignabilityProblem, Problem};
use crate::services::TypeSystem;

/// A successful assignability query: the edges whose from/to chain covers
/// source to target. Empty for identical or equal-by-identifier types.
pub struct AssignabilitySuccess {
    pub source: Rc<Type>,
    pub target: Rc<Type>,
    pub path: Vec<Rc<TypeEdge>>,
}

impl AssignabilitySuccess {
    pub fn cost(&self) -> u32 {
        assignability_path_cost(&self.path)
    }
}

impl std::fmt::Debug for AssignabilitySuccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' assignable to '{}' via {} edge(s), cost {}",
            self.source.name(),
            self.target.name(),
            self.path.len(),
            self.cost()
        )
    }
}

/// Cost of a witnessing path: sub-type edges count 1, conversion edges 2,
/// equality edges are free.
pub fn assignability_path_cost(path: &[Rc<TypeEdge>]) -> u32 {
    path.iter().map(|edge| edge_cost(edge)).sum()
}

fn edge_cost(edge: &Rc<TypeEdge>) -> u32 {
    match edge.kind {
        EdgeKind::Equality => 0,
        EdgeKind::SubType => 1,
        EdgeKind::Conversion(_) => 2,
    }
}

impl TypeSystem {
    pub fn is_assignable(&self, source: &Rc<Type>, target: &Rc<Type>) -> bool {
        self.get_assignability_result(source, target).is_ok()
    }

    pub fn get_assignability_result(
        &self,
        source: &Rc<Type>,
        target: &Rc<Type>,
    ) -> Result<AssignabilitySuccess, AssignabilityProblem> {
        // Reflexive short-circuit.
        if Rc::ptr_eq(source, target) {
            return Ok(self.success(source, target, Vec::new()));
        }
        if let (Some(id_source), Some(id_target)) = (source.identifier(), target.identifier()) {
            if id_source == id_target {
                return Ok(self.success(source, target, Vec::new()));
            }
        }

        // Materialize the direct relations for this pair; the analyses
        // memoize their verdicts as edges the path search can walk.
        if self.are_types_equal(source, target) {
            let path = self.equality_edge_between(source, target).into_iter().collect();
            return Ok(self.success(source, target, path));
        }
        let sub_type_problem = self.get_sub_type_problem(source, target);
        if sub_type_problem.is_none() {
            // A direct (possibly memoized) edge witnesses the relation; a
            // multi-hop chain of explicit sub-type edges falls through to
            // the path search, which prices every hop.
            if let Some(edge) = self
                .graph()
                .get_edge(source, target, EdgeKind::SubType)
                .filter(|e| e.links())
            {
                return Ok(self.success(source, target, vec![edge]));
            }
        }
        // A custom-kind hook may grant a conversion no edge records yet;
        // materialize it once so the path search can reuse it.
        if self.direct_implicit_hook_conversion(source, target) {
            let kind = EdgeKind::Conversion(ConversionMode::ImplicitExplicit);
            let edge = match self.graph().get_edge(source, target, kind) {
                Some(existing) => existing,
                None => {
                    let edge = TypeEdge::new(
                        source.clone(),
                        target.clone(),
                        kind,
                        crate::graph::EdgeVerdict::LinkExists,
                    );
                    self.graph().add_edge(edge.clone());
                    edge
                }
            };
            return Ok(self.success(source, target, vec![edge]));
        }

        // Shortest path over the relational edges.
        if let Some(path) = self.shortest_assignability_path(source, target) {
            return Ok(self.success(source, target, path));
        }

        let mut sub_problems: Vec<Problem> = Vec::new();
        if let Some(problem) = sub_type_problem {
            sub_problems.push(problem.into());
        }
        Err(AssignabilityProblem {
            source: source.clone(),
            target: target.clone(),
            sub_problems,
        })
    }

    fn success(
        &self,
        source: &Rc<Type>,
        target: &Rc<Type>,
        path: Vec<Rc<TypeEdge>>,
    ) -> AssignabilitySuccess {
        AssignabilitySuccess {
            source: source.clone(),
            target: target.clone(),
            path,
        }
    }

    fn equality_edge_between(&self, a: &Rc<Type>, b: &Rc<Type>) -> Option<Rc<TypeEdge>> {
        self.graph()
            .get_edge(a, b, EdgeKind::Equality)
            .or_else(|| self.graph().get_edge(b, a, EdgeKind::Equality))
            .filter(|edge| edge.links())
    }

    fn direct_implicit_hook_conversion(&self, source: &Rc<Type>, target: &Rc<Type>) -> bool {
        self.conversion_hook_verdict(source, target, ConversionMode::ImplicitExplicit)
            .unwrap_or(false)
    }

    /// Dijkstra over equality (0), sub-type (1) and implicit conversion (2)
    /// edges. Equality edges are symmetric and traversed in both
    /// directions.
    fn shortest_assignability_path(
        &self,
        source: &Rc<Type>,
        target: &Rc<Type>,
    ) -> Option<Vec<Rc<TypeEdge>>> {
        let target_ptr = thin_ptr(target);
        let mut best_cost: FxHashMap<usize, u32> = FxHashMap::default();
        let mut predecessor: FxHashMap<usize, (Rc<TypeEdge>, usize)> = FxHashMap::default();
        let mut nodes: FxHashMap<usize, Rc<Type>> = FxHashMap::default();
        let mut queue: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::new();

        let source_ptr = thin_ptr(source);
        best_cost.insert(source_ptr, 0);
        nodes.insert(source_ptr, source.clone());
        queue.push(Reverse((0, source_ptr)));

        while let Some(Reverse((cost, current_ptr))) = queue.pop() {
            if best_cost.get(&current_ptr).copied() != Some(cost) {
                continue;
            }
            if current_ptr == target_ptr {
                // Reconstruct the edge chain back to the source.
                let mut path: Vec<Rc<TypeEdge>> = Vec::new();
                let mut at = current_ptr;
                while at != source_ptr {
                    let (edge, previous) = predecessor
                        .get(&at)
                        .expect("every reached node has a predecessor")
                        .clone();
                    path.push(edge);
                    at = previous;
                }
                path.reverse();
                return Some(path);
            }
            let current = nodes
                .get(&current_ptr)
                .expect("every queued node is registered")
                .clone();

            let mut neighbors: Vec<(Rc<Type>, Rc<TypeEdge>, u32)> = Vec::new();
            for edge in self.graph().edges_from(&current) {
                if !edge.links() {
                    continue;
                }
                match edge.kind {
                    EdgeKind::Equality => neighbors.push((edge.to.clone(), edge.clone(), 0)),
                    EdgeKind::SubType => neighbors.push((edge.to.clone(), edge.clone(), 1)),
                    EdgeKind::Conversion(ConversionMode::ImplicitExplicit) => {
                        neighbors.push((edge.to.clone(), edge.clone(), 2));
                    }
                    EdgeKind::Conversion(ConversionMode::Explicit) => {}
                }
            }
            for edge in self.graph().edges_to(&current) {
                if edge.kind == EdgeKind::Equality && edge.links() {
                    neighbors.push((edge.from.clone(), edge.clone(), 0));
                }
            }

            for (next, edge, weight) in neighbors {
                let next_ptr = thin_ptr(&next);
                let next_cost = cost + weight;
                if best_cost
                    .get(&next_ptr)
                    .is_none_or(|&known| next_cost < known)
                {
                    best_cost.insert(next_ptr, next_cost);
                    predecessor.insert(next_ptr, (edge, current_ptr));
                    nodes.insert(next_ptr, next);
                    queue.push(Reverse((next_cost, next_ptr)));
                }
            }
        }
        None
    }
}
