//! The sub-type service.
//!
//! Every type is a sub-type of itself and of every type it is equal to.
//! Beyond that, verdicts are kind-dispatched: structural classes compare
//! field by field under the configured strategy, nominal classes walk
//! their declared super-classes, functions are contravariant in their
//! inputs and covariant in their output, custom types consult their kind's
//! hooks. Explicitly marked sub-type edges are transitive; analysis
//! verdicts are memoized as derived edges, positive and negative.

use std::rc::Rc;

use tracing::debug;

use crate::body::{ClassTyping, FieldCheckingStrategy, FunctionData, TypeBody};
use crate::equality::RelationSession;
use crate::graph::{EdgeKind, EdgeVerdict, GraphError, TypeEdge};
use crate::node::Type;
use crate::problems::{ConflictLocation, IndexedTypeConflict, Problem, SubTypeProblem};
use crate::services::TypeSystem;

impl TypeSystem {
    pub fn is_sub_type(&self, sub: &Rc<Type>, superior: &Rc<Type>) -> bool {
        self.subtype_internal(sub, superior, true).is_ok()
    }

    /// `None` when `sub` is a sub-type of `superior`, a problem otherwise.
    pub fn get_sub_type_problem(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
    ) -> Option<SubTypeProblem> {
        self.subtype_internal(sub, superior, false).err()
    }

    /// Record an explicit sub-type edge. With `check_for_cycles`, an edge
    /// that would close a cycle of explicit sub-type edges is refused and
    /// the graph stays unchanged.
    pub fn mark_as_sub_type(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
        check_for_cycles: bool,
    ) -> Result<(), GraphError> {
        if Rc::ptr_eq(sub, superior) {
            return Ok(());
        }
        if check_for_cycles
            && self.graph().path_exists(superior, sub, |edge| {
                edge.kind == EdgeKind::SubType && edge.is_explicit()
            })
        {
            return Err(GraphError::CycleIntroduced {
                from: sub.name(),
                to: superior.name(),
                label: "sub-type".to_string(),
            });
        }
        // Memoized negatives for affected pairs are stale now.
        self.graph()
            .remove_edges_where(|edge| !edge.is_explicit() && edge.kind == EdgeKind::SubType);
        if self
            .graph()
            .get_edge(sub, superior, EdgeKind::SubType)
            .is_none_or(|edge| !edge.is_explicit())
        {
            debug!(sub = %sub.name(), superior = %superior.name(), "marked sub-type relation");
            self.graph().add_edge(TypeEdge::new_explicit(
                sub.clone(),
                superior.clone(),
                EdgeKind::SubType,
            ));
        }
        Ok(())
    }

    pub fn unmark_as_sub_type(&self, sub: &Rc<Type>, superior: &Rc<Type>) {
        if let Some(edge) = self
            .graph()
            .get_edge(sub, superior, EdgeKind::SubType)
            .filter(|edge| edge.is_explicit())
        {
            self.graph().remove_edge(&edge);
        }
        self.graph()
            .remove_edges_where(|edge| !edge.is_explicit() && edge.kind == EdgeKind::SubType);
    }

    fn subtype_internal(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
        fail_fast: bool,
    ) -> Result<(), SubTypeProblem> {
        let mut session = RelationSession::default();
        self.subtype_with_session(sub, superior, fail_fast, &mut session)
    }

    pub(crate) fn subtype_with_session(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), SubTypeProblem> {
        // Reflexivity.
        if Rc::ptr_eq(sub, superior) {
            return Ok(());
        }
        if let (Some(id_sub), Some(id_sup)) = (sub.identifier(), superior.identifier()) {
            if id_sub == id_sup {
                return Ok(());
            }
        }
        let direct = self.graph().get_edge(sub, superior, EdgeKind::SubType);
        if direct.as_ref().is_some_and(|edge| edge.links()) {
            return Ok(());
        }
        // Equal types are mutual sub-types.
        if self
            .equality_with_session(sub, superior, true, session)
            .is_ok()
        {
            return Ok(());
        }
        // Explicit sub-type edges compose transitively.
        if self.graph().path_exists(sub, superior, |edge| {
            edge.kind == EdgeKind::SubType && edge.is_explicit() && edge.links()
        }) {
            return Ok(());
        }
        if direct.is_some() && fail_fast {
            // Memoized negative verdict; re-analysis happens only when the
            // caller asked for the detailed conflict report.
            return Err(self.basic_sub_type_problem(sub, superior));
        }
        if !session.enter(sub, superior) {
            // Recursive shape; assume the relation holds so the outer
            // comparison converges.
            return Ok(());
        }
        let result = self.analyze_sub_type(sub, superior, fail_fast, session);
        if self
            .graph()
            .get_edge(sub, superior, EdgeKind::SubType)
            .is_none()
        {
            let verdict = if result.is_ok() {
                EdgeVerdict::LinkExists
            } else {
                EdgeVerdict::NoLink
            };
            self.graph().add_edge(TypeEdge::new(
                sub.clone(),
                superior.clone(),
                EdgeKind::SubType,
                verdict,
            ));
        }
        result
    }

    fn basic_sub_type_problem(&self, sub: &Rc<Type>, superior: &Rc<Type>) -> SubTypeProblem {
        SubTypeProblem {
            sub_type: sub.clone(),
            super_type: superior.clone(),
            sub_problems: Vec::new(),
        }
    }

    fn analyze_sub_type(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), SubTypeProblem> {
        // Custom kinds may decide the relation themselves.
        if let TypeBody::Custom(data) = sub.body() {
            if let Some(hook) = &data.hooks.is_sub_type_of {
                if let Some(verdict) = hook(self, sub, superior) {
                    return if verdict {
                        Ok(())
                    } else {
                        Err(self.basic_sub_type_problem(sub, superior))
                    };
                }
            }
        }
        if let TypeBody::Custom(data) = superior.body() {
            if let Some(hook) = &data.hooks.is_super_type_of {
                if let Some(verdict) = hook(self, superior, sub) {
                    return if verdict {
                        Ok(())
                    } else {
                        Err(self.basic_sub_type_problem(sub, superior))
                    };
                }
            }
        }

        match (sub.body(), superior.body()) {
            // The top class is the super-type of every class.
            (TypeBody::Class(_), TypeBody::TopClass(_)) => Ok(()),
            (TypeBody::Class(sub_data), TypeBody::Class(sup_data)) => {
                if sub_data.typing != sup_data.typing {
                    return Err(self.basic_sub_type_problem(sub, superior));
                }
                match sup_data.typing {
                    ClassTyping::Nominal => self.nominal_class_sub_type(sub, superior),
                    ClassTyping::Structural => self.structural_class_sub_type(
                        sub,
                        superior,
                        sup_data.field_checking,
                        fail_fast,
                        session,
                    ),
                }
            }
            (TypeBody::Function(sub_data), TypeBody::Function(sup_data)) => {
                self.function_sub_type(sub, superior, sub_data, sup_data, session)
            }
            // Primitives, top classes and mixed kinds relate only through
            // equality or explicit marks, which were checked already.
            _ => Err(self.basic_sub_type_problem(sub, superior)),
        }
    }

    /// Nominal analysis: some transitively declared super-class of `sub`
    /// must be equal to `superior`.
    fn nominal_class_sub_type(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
    ) -> Result<(), SubTypeProblem> {
        let supers = crate::body::all_super_classes(sub, true);
        if supers.iter().any(|s| self.are_types_equal(s, superior)) {
            Ok(())
        } else {
            Err(self.basic_sub_type_problem(sub, superior))
        }
    }

    /// Structural analysis: every field expected by the super-class must be
    /// present in the sub-class with a type compatible under the configured
    /// strategy.
    fn structural_class_sub_type(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
        strategy: FieldCheckingStrategy,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), SubTypeProblem> {
        let expected_fields = crate::body::fields_including_inherited(superior);
        let actual_fields = crate::body::fields_including_inherited(sub);
        let mut conflicts: Vec<Problem> = Vec::new();
        for (name, expected_ref) in &expected_fields {
            match actual_fields.get(name) {
                None => conflicts.push(
                    IndexedTypeConflict {
                        expected: expected_ref.get(),
                        actual: None,
                        location: ConflictLocation::Property(name.clone()),
                        sub_problems: Vec::new(),
                    }
                    .into(),
                ),
                Some(actual_ref) => match (actual_ref.get(), expected_ref.get()) {
                    (Some(actual_ty), Some(expected_ty)) => {
                        let compatible = match strategy {
                            FieldCheckingStrategy::EqualType => self
                                .equality_with_session(&actual_ty, &expected_ty, true, session)
                                .is_ok(),
                            FieldCheckingStrategy::SubType => self
                                .subtype_with_session(&actual_ty, &expected_ty, true, session)
                                .is_ok(),
                            FieldCheckingStrategy::AssignableType => {
                                self.is_assignable(&actual_ty, &expected_ty)
                            }
                        };
                        if !compatible {
                            conflicts.push(
                                IndexedTypeConflict {
                                    expected: Some(expected_ty),
                                    actual: Some(actual_ty),
                                    location: ConflictLocation::Property(name.clone()),
                                    sub_problems: Vec::new(),
                                }
                                .into(),
                            );
                        }
                    }
                    (actual_ty, expected_ty) => conflicts.push(
                        IndexedTypeConflict {
                            expected: expected_ty,
                            actual: actual_ty,
                            location: ConflictLocation::Property(name.clone()),
                            sub_problems: Vec::new(),
                        }
                        .into(),
                    ),
                },
            }
            if fail_fast && !conflicts.is_empty() {
                break;
            }
        }
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(SubTypeProblem {
                sub_type: sub.clone(),
                super_type: superior.clone(),
                sub_problems: conflicts,
            })
        }
    }

    /// Functions: inputs are contravariant, the output is covariant. A
    /// function with an output is a sub-type of one without.
    fn function_sub_type(
        &self,
        sub: &Rc<Type>,
        superior: &Rc<Type>,
        sub_data: &FunctionData,
        sup_data: &FunctionData,
        session: &mut RelationSession,
    ) -> Result<(), SubTypeProblem> {
        if sub_data.input_parameters.len() != sup_data.input_parameters.len() {
            return Err(self.basic_sub_type_problem(sub, superior));
        }
        let strategy = sup_data.parameter_checking;
        for (sub_param, sup_param) in sub_data
            .input_parameters
            .iter()
            .zip(sup_data.input_parameters.iter())
        {
            match (sub_param.ty.get(), sup_param.ty.get()) {
                (Some(sub_ty), Some(sup_ty)) => {
                    // Contravariance: the super-type's parameter feeds the
                    // sub-type's parameter.
                    let compatible = match strategy {
                        FieldCheckingStrategy::EqualType => self
                            .equality_with_session(&sup_ty, &sub_ty, true, session)
                            .is_ok(),
                        FieldCheckingStrategy::SubType => self
                            .subtype_with_session(&sup_ty, &sub_ty, true, session)
                            .is_ok(),
                        FieldCheckingStrategy::AssignableType => {
                            self.is_assignable(&sup_ty, &sub_ty)
                        }
                    };
                    if !compatible {
                        return Err(self.basic_sub_type_problem(sub, superior));
                    }
                }
                _ => return Err(self.basic_sub_type_problem(sub, superior)),
            }
        }
        match (&sub_data.output_parameter, &sup_data.output_parameter) {
            (_, None) => Ok(()),
            (None, Some(_)) => Err(self.basic_sub_type_problem(sub, superior)),
            (Some(sub_out), Some(sup_out)) => match (sub_out.ty.get(), sup_out.ty.get()) {
                (Some(sub_ty), Some(sup_ty)) => {
                    if self
                        .subtype_with_session(&sub_ty, &sup_ty, true, session)
                        .is_ok()
                    {
                        Ok(())
                    } else {
                        Err(self.basic_sub_type_problem(sub, superior))
                    }
                }
                _ => Err(self.basic_sub_type_problem(sub, superior)),
            },
        }
    }
}
