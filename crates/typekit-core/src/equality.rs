//! The type equality service.
//!
//! Equality is reflexive, symmetric, and kind-dispatched: classes compare
//! structurally by field name, functions by their input sequence and
//! output, custom types by their property values. Verdicts, positive and
//! negative, are memoized as equality edges; explicitly marked equalities
//! are edges of their own and survive every flush.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::body::{ClassData, ClassTyping, CustomPropertyValue, FunctionData, TypeBody};
use crate::graph::{EdgeKind, EdgeVerdict, TypeEdge, thin_ptr};
use crate::node::Type;
use crate::problems::{
    ConflictLocation, EqualityProblem, IndexedTypeConflict, KindConflict, Problem, ValueConflict,
};
use crate::services::TypeSystem;

/// Tracks the pairs currently being compared, so recursive type shapes are
/// assumed equal when revisited instead of recursing forever.
#[derive(Default)]
pub(crate) struct RelationSession {
    pairs: FxHashSet<(usize, usize)>,
}

impl RelationSession {
    /// Returns false when the pair is already being compared.
    pub(crate) fn enter(&mut self, a: &Rc<Type>, b: &Rc<Type>) -> bool {
        let mut key = (thin_ptr(a), thin_ptr(b));
        if key.0 > key.1 {
            key = (key.1, key.0);
        }
        self.pairs.insert(key)
    }
}

impl TypeSystem {
    pub fn are_types_equal(&self, a: &Rc<Type>, b: &Rc<Type>) -> bool {
        self.equality_internal(a, b, true).is_ok()
    }

    /// `None` when the types are equal, a problem otherwise.
    pub fn get_type_equality_problem(&self, a: &Rc<Type>, b: &Rc<Type>) -> Option<EqualityProblem> {
        self.equality_internal(a, b, false).err()
    }

    /// Record that two types are to be treated as equal, independent of
    /// their structure. Every memoized equality or sub-type verdict is
    /// flushed so that types built from `a` or `b` re-evaluate.
    pub fn mark_as_equal(&self, a: &Rc<Type>, b: &Rc<Type>) {
        if Rc::ptr_eq(a, b) {
            return;
        }
        self.flush_derived_relation_edges();
        if self.explicit_equality_edge(a, b).is_none() {
            debug!(a = %a.name(), b = %b.name(), "marked types as equal");
            self.graph()
                .add_edge(TypeEdge::new_explicit(a.clone(), b.clone(), EdgeKind::Equality));
        }
    }

    /// Withdraw an explicit equality mark and flush the memoized verdicts
    /// that may have depended on it.
    pub fn unmark_as_equal(&self, a: &Rc<Type>, b: &Rc<Type>) {
        if let Some(edge) = self.explicit_equality_edge(a, b) {
            debug!(a = %a.name(), b = %b.name(), "unmarked type equality");
            self.graph().remove_edge(&edge);
        }
        self.flush_derived_relation_edges();
    }

    fn explicit_equality_edge(&self, a: &Rc<Type>, b: &Rc<Type>) -> Option<Rc<TypeEdge>> {
        self.graph()
            .get_edge(a, b, EdgeKind::Equality)
            .or_else(|| self.graph().get_edge(b, a, EdgeKind::Equality))
            .filter(|edge| edge.is_explicit())
    }

    /// Memoized equality and sub-type verdicts become stale whenever an
    /// explicit equality mark changes, because structural comparisons of
    /// dependent types consulted the previous marks.
    fn flush_derived_relation_edges(&self) {
        self.graph().remove_edges_where(|edge| {
            !edge.is_explicit()
                && matches!(edge.kind, EdgeKind::Equality | EdgeKind::SubType)
        });
    }

    fn equality_internal(
        &self,
        a: &Rc<Type>,
        b: &Rc<Type>,
        fail_fast: bool,
    ) -> Result<(), EqualityProblem> {
        if let Some(result) = self.equality_fast_path(a, b) {
            match result {
                Ok(()) => return Ok(()),
                // Re-analyze a memoized negative when the caller wants the
                // detailed conflict report.
                Err(()) if fail_fast => return Err(self.basic_equality_problem(a, b)),
                Err(()) => {}
            }
        }
        let mut session = RelationSession::default();
        session.enter(a, b);
        let result = self.analyze_equality(a, b, fail_fast, &mut session);
        if self
            .graph()
            .get_edge(a, b, EdgeKind::Equality)
            .or_else(|| self.graph().get_edge(b, a, EdgeKind::Equality))
            .is_none()
        {
            let verdict = if result.is_ok() {
                EdgeVerdict::LinkExists
            } else {
                EdgeVerdict::NoLink
            };
            self.graph()
                .add_edge(TypeEdge::new(a.clone(), b.clone(), EdgeKind::Equality, verdict));
        }
        result
    }

    /// Identity, identifier equality, and the memoized edges. `None` means
    /// a full analysis is required.
    fn equality_fast_path(&self, a: &Rc<Type>, b: &Rc<Type>) -> Option<Result<(), ()>> {
        if Rc::ptr_eq(a, b) {
            return Some(Ok(()));
        }
        if let (Some(id_a), Some(id_b)) = (a.identifier(), b.identifier()) {
            if id_a == id_b {
                return Some(Ok(()));
            }
        }
        let edge = self
            .graph()
            .get_edge(a, b, EdgeKind::Equality)
            .or_else(|| self.graph().get_edge(b, a, EdgeKind::Equality))?;
        Some(if edge.links() { Ok(()) } else { Err(()) })
    }

    pub(crate) fn equality_with_session(
        &self,
        a: &Rc<Type>,
        b: &Rc<Type>,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), EqualityProblem> {
        if let Some(result) = self.equality_fast_path(a, b) {
            return result.map_err(|()| self.basic_equality_problem(a, b));
        }
        if !session.enter(a, b) {
            // Already comparing this pair further up the stack; assume
            // equality so recursive shapes converge.
            return Ok(());
        }
        self.analyze_equality(a, b, fail_fast, session)
    }

    fn basic_equality_problem(&self, a: &Rc<Type>, b: &Rc<Type>) -> EqualityProblem {
        EqualityProblem {
            type_a: a.clone(),
            type_b: b.clone(),
            sub_problems: Vec::new(),
        }
    }

    fn analyze_equality(
        &self,
        a: &Rc<Type>,
        b: &Rc<Type>,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), EqualityProblem> {
        match (a.body(), b.body()) {
            (TypeBody::Primitive(pa), TypeBody::Primitive(pb)) => {
                if pa.primitive_name == pb.primitive_name {
                    Ok(())
                } else {
                    Err(EqualityProblem {
                        type_a: a.clone(),
                        type_b: b.clone(),
                        sub_problems: vec![
                            ValueConflict {
                                first: Some(pa.primitive_name.clone()),
                                second: Some(pb.primitive_name.clone()),
                                location: "primitive name".to_string(),
                            }
                            .into(),
                        ],
                    })
                }
            }
            (TypeBody::Class(ca), TypeBody::Class(cb)) => {
                self.class_equality(a, b, ca, cb, fail_fast, session)
            }
            // Each top class is equal only to itself; identity was already
            // ruled out by the fast path.
            (TypeBody::TopClass(_), TypeBody::TopClass(_)) => {
                Err(self.basic_equality_problem(a, b))
            }
            (TypeBody::Function(fa), TypeBody::Function(fb)) => {
                self.function_equality(a, b, fa, fb, fail_fast, session)
            }
            (TypeBody::Custom(ca), TypeBody::Custom(cb)) => {
                if ca.kind_name == cb.kind_name
                    && self.custom_properties_equal(&ca.properties, &cb.properties, session)
                {
                    Ok(())
                } else {
                    Err(self.basic_equality_problem(a, b))
                }
            }
            _ => Err(EqualityProblem {
                type_a: a.clone(),
                type_b: b.clone(),
                sub_problems: vec![
                    KindConflict {
                        first: a.kind_name().to_string(),
                        second: b.kind_name().to_string(),
                    }
                    .into(),
                ],
            }),
        }
    }

    fn class_equality(
        &self,
        a: &Rc<Type>,
        b: &Rc<Type>,
        ca: &ClassData,
        cb: &ClassData,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), EqualityProblem> {
        if ca.typing != cb.typing {
            return Err(self.basic_equality_problem(a, b));
        }
        if ca.typing == ClassTyping::Nominal {
            // Nominal classes are compared by identity, which the fast path
            // already ruled out.
            return Err(self.basic_equality_problem(a, b));
        }

        let mut conflicts: Vec<Problem> = Vec::new();
        let fields_a = crate::body::fields_including_inherited(a);
        let fields_b = crate::body::fields_including_inherited(b);
        if fields_a.len() != fields_b.len() {
            conflicts.push(
                ValueConflict {
                    first: Some(fields_a.len().to_string()),
                    second: Some(fields_b.len().to_string()),
                    location: "number of fields".to_string(),
                }
                .into(),
            );
            if fail_fast {
                return Err(EqualityProblem {
                    type_a: a.clone(),
                    type_b: b.clone(),
                    sub_problems: conflicts,
                });
            }
        }
        for (name, ref_a) in &fields_a {
            match fields_b.get(name) {
                Some(ref_b) => match (ref_a.get(), ref_b.get()) {
                    (Some(ty_a), Some(ty_b)) => {
                        if let Err(p) =
                            self.equality_with_session(&ty_a, &ty_b, fail_fast, session)
                        {
                            conflicts.push(
                                IndexedTypeConflict {
                                    expected: Some(ty_a),
                                    actual: Some(ty_b),
                                    location: ConflictLocation::Property(name.clone()),
                                    sub_problems: vec![p.into()],
                                }
                                .into(),
                            );
                        }
                    }
                    // A side not resolved yet counts as a conflict.
                    (ty_a, ty_b) => conflicts.push(
                        IndexedTypeConflict {
                            expected: ty_a,
                            actual: ty_b,
                            location: ConflictLocation::Property(name.clone()),
                            sub_problems: Vec::new(),
                        }
                        .into(),
                    ),
                },
                // Field missing on the other side.
                None => conflicts.push(
                    IndexedTypeConflict {
                        expected: ref_a.get(),
                        actual: None,
                        location: ConflictLocation::Property(name.clone()),
                        sub_problems: Vec::new(),
                    }
                    .into(),
                ),
            }
            if fail_fast && !conflicts.is_empty() {
                break;
            }
        }

        if conflicts.is_empty() || !fail_fast {
            let methods_a = &ca.methods;
            let methods_b = &cb.methods;
            if methods_a.len() != methods_b.len() {
                conflicts.push(
                    ValueConflict {
                        first: Some(methods_a.len().to_string()),
                        second: Some(methods_b.len().to_string()),
                        location: "number of methods".to_string(),
                    }
                    .into(),
                );
            } else {
                for (index, (ref_a, ref_b)) in methods_a.iter().zip(methods_b.iter()).enumerate() {
                    match (ref_a.get(), ref_b.get()) {
                        (Some(ty_a), Some(ty_b)) => {
                            if let Err(p) =
                                self.equality_with_session(&ty_a, &ty_b, fail_fast, session)
                            {
                                conflicts.push(
                                    IndexedTypeConflict {
                                        expected: Some(ty_a),
                                        actual: Some(ty_b),
                                        location: ConflictLocation::Index(index),
                                        sub_problems: vec![p.into()],
                                    }
                                    .into(),
                                );
                            }
                        }
                        (ty_a, ty_b) => conflicts.push(
                            IndexedTypeConflict {
                                expected: ty_a,
                                actual: ty_b,
                                location: ConflictLocation::Index(index),
                                sub_problems: Vec::new(),
                            }
                            .into(),
                        ),
                    }
                    if fail_fast && !conflicts.is_empty() {
                        break;
                    }
                }
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(EqualityProblem {
                type_a: a.clone(),
                type_b: b.clone(),
                sub_problems: conflicts,
            })
        }
    }

    /// Structural function equality: equal input sequence, element by
    /// element, and equal output. Function and parameter names are not
    /// part of the comparison.
    fn function_equality(
        &self,
        a: &Rc<Type>,
        b: &Rc<Type>,
        fa: &FunctionData,
        fb: &FunctionData,
        fail_fast: bool,
        session: &mut RelationSession,
    ) -> Result<(), EqualityProblem> {
        let mut conflicts: Vec<Problem> = Vec::new();
        if fa.input_parameters.len() != fb.input_parameters.len() {
            return Err(EqualityProblem {
                type_a: a.clone(),
                type_b: b.clone(),
                sub_problems: vec![
                    ValueConflict {
                        first: Some(fa.input_parameters.len().to_string()),
                        second: Some(fb.input_parameters.len().to_string()),
                        location: "number of input parameters".to_string(),
                    }
                    .into(),
                ],
            });
        }
        for (index, (pa, pb)) in fa
            .input_parameters
            .iter()
            .zip(fb.input_parameters.iter())
            .enumerate()
        {
            match (pa.ty.get(), pb.ty.get()) {
                (Some(ty_a), Some(ty_b)) => {
                    if let Err(p) = self.equality_with_session(&ty_a, &ty_b, fail_fast, session) {
                        conflicts.push(
                            IndexedTypeConflict {
                                expected: Some(ty_a),
                                actual: Some(ty_b),
                                location: ConflictLocation::Index(index),
                                sub_problems: vec![p.into()],
                            }
                            .into(),
                        );
                    }
                }
                (ty_a, ty_b) => conflicts.push(
                    IndexedTypeConflict {
                        expected: ty_a,
                        actual: ty_b,
                        location: ConflictLocation::Index(index),
                        sub_problems: Vec::new(),
                    }
                    .into(),
                ),
            }
            if fail_fast && !conflicts.is_empty() {
                break;
            }
        }

        if conflicts.is_empty() || !fail_fast {
            match (&fa.output_parameter, &fb.output_parameter) {
                (None, None) => {}
                (Some(oa), Some(ob)) => match (oa.ty.get(), ob.ty.get()) {
                    (Some(ty_a), Some(ty_b)) => {
                        if let Err(p) = self.equality_with_session(&ty_a, &ty_b, fail_fast, session)
                        {
                            conflicts.push(
                                IndexedTypeConflict {
                                    expected: Some(ty_a),
                                    actual: Some(ty_b),
                                    location: ConflictLocation::Property("output".to_string()),
                                    sub_problems: vec![p.into()],
                                }
                                .into(),
                            );
                        }
                    }
                    (ty_a, ty_b) => conflicts.push(
                        IndexedTypeConflict {
                            expected: ty_a,
                            actual: ty_b,
                            location: ConflictLocation::Property("output".to_string()),
                            sub_problems: Vec::new(),
                        }
                        .into(),
                    ),
                },
                (oa, ob) => conflicts.push(
                    IndexedTypeConflict {
                        expected: oa.as_ref().and_then(|p| p.ty.get()),
                        actual: ob.as_ref().and_then(|p| p.ty.get()),
                        location: ConflictLocation::Property("output".to_string()),
                        sub_problems: Vec::new(),
                    }
                    .into(),
                ),
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(EqualityProblem {
                type_a: a.clone(),
                type_b: b.clone(),
                sub_problems: conflicts,
            })
        }
    }

    fn custom_properties_equal(
        &self,
        a: &indexmap::IndexMap<String, CustomPropertyValue>,
        b: &indexmap::IndexMap<String, CustomPropertyValue>,
        session: &mut RelationSession,
    ) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter().all(|(key, value_a)| {
            b.get(key)
                .is_some_and(|value_b| self.custom_values_equal(value_a, value_b, session))
        })
    }

    fn custom_values_equal(
        &self,
        a: &CustomPropertyValue,
        b: &CustomPropertyValue,
        session: &mut RelationSession,
    ) -> bool {
        use CustomPropertyValue as V;
        match (a, b) {
            (V::Str(x), V::Str(y)) => x == y,
            (V::Int(x), V::Int(y)) => x == y,
            (V::Float(x), V::Float(y)) => x == y,
            (V::Bool(x), V::Bool(y)) => x == y,
            (V::Absent, V::Absent) => true,
            (V::Type(ra), V::Type(rb)) => match (ra.get(), rb.get()) {
                (Some(ta), Some(tb)) => self.equality_with_session(&ta, &tb, true, session).is_ok(),
                _ => false,
            },
            (V::List(xs), V::List(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys.iter())
                        .all(|(x, y)| self.custom_values_equal(x, y, session))
            }
            (V::Set(xs), V::Set(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().all(|x| {
                        ys.iter().any(|y| self.custom_values_equal(x, y, session))
                    })
            }
            (V::Map(xs), V::Map(ys)) | (V::Object(xs), V::Object(ys)) => {
                self.custom_properties_equal(xs, ys, session)
            }
            _ => false,
        }
    }
}
