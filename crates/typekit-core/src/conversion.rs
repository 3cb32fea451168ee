//! The conversion service.
//!
//! Conversion edges are always explicitly marked. Edges in mode
//! `IMPLICIT_EXPLICIT` must form a DAG: marking an implicit conversion
//! that would close a cycle among implicit edges fails and leaves the
//! graph unchanged. Explicit-only edges may form cycles. Queries search
//! paths: implicit convertibility uses only the implicit sub-graph,
//! explicit convertibility any mix of conversion edges.

use std::rc::Rc;

use tracing::debug;

use crate::body::TypeBody;
use crate::graph::{ConversionMode, EdgeKind, GraphError, TypeEdge};
use crate::node::Type;
use crate::services::TypeSystem;

fn is_conversion(edge: &Rc<TypeEdge>, mode: Option<ConversionMode>) -> bool {
    match edge.kind {
        EdgeKind::Conversion(edge_mode) => mode.is_none_or(|m| edge_mode == m) && edge.links(),
        _ => false,
    }
}

impl TypeSystem {
    /// Record that `from` converts to `to` in the given mode. Re-marking an
    /// existing pair replaces its mode.
    pub fn mark_as_convertible(
        &self,
        from: &Rc<Type>,
        to: &Rc<Type>,
        mode: ConversionMode,
    ) -> Result<(), GraphError> {
        if Rc::ptr_eq(from, to) {
            return Ok(());
        }
        let existing = self.direct_conversion_edge(from, to);
        if let Some(edge) = &existing {
            if edge.kind == EdgeKind::Conversion(mode) {
                return Ok(());
            }
        }
        if mode == ConversionMode::ImplicitExplicit
            && self.graph().path_exists(to, from, |edge| {
                is_conversion(edge, Some(ConversionMode::ImplicitExplicit))
            })
        {
            return Err(GraphError::CycleIntroduced {
                from: from.name(),
                to: to.name(),
                label: format!("convertible ({mode})"),
            });
        }
        if let Some(edge) = existing {
            self.graph().remove_edge(&edge);
        }
        // Conversions can change what counts as an assignable field type.
        self.graph()
            .remove_edges_where(|edge| !edge.is_explicit() && edge.kind == EdgeKind::SubType);
        debug!(from = %from.name(), to = %to.name(), %mode, "marked conversion");
        self.graph().add_edge(TypeEdge::new_explicit(
            from.clone(),
            to.clone(),
            EdgeKind::Conversion(mode),
        ));
        Ok(())
    }

    pub fn unmark_as_convertible(&self, from: &Rc<Type>, to: &Rc<Type>) {
        if let Some(edge) = self.direct_conversion_edge(from, to) {
            self.graph().remove_edge(&edge);
        }
    }

    /// The mode of the direct conversion edge between two types, if one
    /// was marked.
    pub fn get_conversion_mode(&self, from: &Rc<Type>, to: &Rc<Type>) -> Option<ConversionMode> {
        self.direct_conversion_edge(from, to)
            .map(|edge| match edge.kind {
                EdgeKind::Conversion(mode) => mode,
                _ => unreachable!("conversion edges carry a conversion label"),
            })
    }

    /// Whether the engine may apply conversions from `from` to `to` without
    /// an explicit request: a path in the implicit sub-graph exists.
    pub fn is_implicitly_convertible(&self, from: &Rc<Type>, to: &Rc<Type>) -> bool {
        if let Some(verdict) = self.conversion_hook_verdict(from, to, ConversionMode::ImplicitExplicit)
        {
            return verdict;
        }
        self.graph().path_exists(from, to, |edge| {
            is_conversion(edge, Some(ConversionMode::ImplicitExplicit))
        })
    }

    /// Whether an explicitly requested conversion from `from` to `to` is
    /// possible: a path over any mix of conversion edges exists.
    pub fn is_explicitly_convertible(&self, from: &Rc<Type>, to: &Rc<Type>) -> bool {
        if let Some(verdict) = self.conversion_hook_verdict(from, to, ConversionMode::Explicit) {
            return verdict;
        }
        self.graph()
            .path_exists(from, to, |edge| is_conversion(edge, None))
    }

    pub fn is_convertible(&self, from: &Rc<Type>, to: &Rc<Type>, mode: ConversionMode) -> bool {
        match mode {
            ConversionMode::ImplicitExplicit => self.is_implicitly_convertible(from, to),
            ConversionMode::Explicit => self.is_explicitly_convertible(from, to),
        }
    }

    fn direct_conversion_edge(&self, from: &Rc<Type>, to: &Rc<Type>) -> Option<Rc<TypeEdge>> {
        self.graph()
            .edges_from(from)
            .into_iter()
            .find(|edge| {
                matches!(edge.kind, EdgeKind::Conversion(_)) && Rc::ptr_eq(&edge.to, to)
            })
    }

    /// Consult the custom-kind conversion hooks of either endpoint. `None`
    /// defers to the edge search.
    pub(crate) fn conversion_hook_verdict(
        &self,
        from: &Rc<Type>,
        to: &Rc<Type>,
        mode: ConversionMode,
    ) -> Option<bool> {
        if let TypeBody::Custom(data) = from.body() {
            if let Some(hook) = &data.hooks.is_convertible_to {
                if let Some(verdict) = hook(self, from, to, mode) {
                    return Some(verdict);
                }
            }
        }
        if let TypeBody::Custom(data) = to.body() {
            if let Some(hook) = &data.hooks.is_convertible_from {
                if let Some(verdict) = hook(self, to, from, mode) {
                    return Some(verdict);
                }
            }
        }
        None
    }
}
