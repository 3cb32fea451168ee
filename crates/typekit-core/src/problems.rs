//! Structured problems reported at the engine's query boundaries.
//!
//! Problems are returned, never thrown: `infer_type`, the relational
//! queries and `validate` all surface their findings as values built from
//! the types in this module. Problems nest through `sub_problems`, which
//! lets a top-level diagnostic carry the chain of lower-level conflicts
//! that produced it.

use std::fmt;
use std::rc::Rc;

use crate::language::LanguageNode;
use crate::node::Type;

/// Severity of a user-facing validation problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        };
        f.write_str(text)
    }
}

/// Any problem that can appear in a `sub_problems` chain.
#[derive(Clone)]
pub enum Problem {
    Inference(Box<InferenceProblem>),
    Equality(Box<EqualityProblem>),
    SubType(Box<SubTypeProblem>),
    Assignability(Box<AssignabilityProblem>),
    Validation(Box<ValidationProblem>),
    IndexedTypeConflict(Box<IndexedTypeConflict>),
    ValueConflict(Box<ValueConflict>),
    KindConflict(Box<KindConflict>),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Inference(p) => p.fmt(f),
            Problem::Equality(p) => p.fmt(f),
            Problem::SubType(p) => p.fmt(f),
            Problem::Assignability(p) => p.fmt(f),
            Problem::Validation(p) => p.fmt(f),
            Problem::IndexedTypeConflict(p) => p.fmt(f),
            Problem::ValueConflict(p) => p.fmt(f),
            Problem::KindConflict(p) => p.fmt(f),
        }
    }
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Produced by inference rules and propagated up through `infer_type`.
#[derive(Clone)]
pub struct InferenceProblem {
    /// The node whose type was being inferred.
    pub language_node: LanguageNode,
    /// A candidate type the failing rule was working towards, if any.
    pub inference_candidate: Option<Rc<Type>>,
    /// Where within the rule the failure occurred.
    pub location: String,
    /// Display name of the failing rule.
    pub rule: Option<String>,
    pub sub_problems: Vec<Problem>,
}

impl InferenceProblem {
    pub fn new(language_node: LanguageNode, location: impl Into<String>) -> Self {
        Self {
            language_node,
            inference_candidate: None,
            location: location.into(),
            rule: None,
            sub_problems: Vec::new(),
        }
    }

    pub fn with_candidate(mut self, candidate: Rc<Type>) -> Self {
        self.inference_candidate = Some(candidate);
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_sub_problems(mut self, sub_problems: Vec<Problem>) -> Self {
        self.sub_problems = sub_problems;
        self
    }
}

impl fmt::Display for InferenceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type inference failed: {}", self.location)?;
        if let Some(candidate) = &self.inference_candidate {
            write!(f, " (candidate '{}')", candidate.name())?;
        }
        Ok(())
    }
}

impl fmt::Debug for InferenceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Two types that were expected to be equal are not.
#[derive(Clone)]
pub struct EqualityProblem {
    pub type_a: Rc<Type>,
    pub type_b: Rc<Type>,
    pub sub_problems: Vec<Problem>,
}

impl fmt::Display for EqualityProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The types '{}' and '{}' are not equal.",
            self.type_a.name(),
            self.type_b.name()
        )
    }
}

impl fmt::Debug for EqualityProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A type is not a sub-type of the expected super-type.
#[derive(Clone)]
pub struct SubTypeProblem {
    pub sub_type: Rc<Type>,
    pub super_type: Rc<Type>,
    pub sub_problems: Vec<Problem>,
}

impl fmt::Display for SubTypeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The type '{}' is not a sub-type of '{}'.",
            self.sub_type.name(),
            self.super_type.name()
        )
    }
}

impl fmt::Debug for SubTypeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// No path of equality, sub-type and implicit conversion edges connects the
/// source type to the target type.
#[derive(Clone)]
pub struct AssignabilityProblem {
    pub source: Rc<Type>,
    pub target: Rc<Type>,
    pub sub_problems: Vec<Problem>,
}

impl fmt::Display for AssignabilityProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The type '{}' is not assignable to the type '{}'.",
            self.source.name(),
            self.target.name()
        )
    }
}

impl fmt::Debug for AssignabilityProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A user-facing structured diagnostic.
#[derive(Clone)]
pub struct ValidationProblem {
    pub language_node: LanguageNode,
    /// Property of the language node the problem is attached to, if any.
    pub property: Option<String>,
    /// Index within that property, for list-valued properties.
    pub index: Option<usize>,
    pub severity: Severity,
    pub message: String,
    pub sub_problems: Vec<Problem>,
}

impl ValidationProblem {
    pub fn new(
        language_node: LanguageNode,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            language_node,
            property: None,
            index: None,
            severity,
            message: message.into(),
            sub_problems: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_sub_problems(mut self, sub_problems: Vec<Problem>) -> Self {
        self.sub_problems = sub_problems;
        self
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

impl fmt::Debug for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Conflict between an expected and an actual type at a named property or a
/// positional index, e.g. a field of a class or a parameter of a function.
#[derive(Clone)]
pub struct IndexedTypeConflict {
    pub expected: Option<Rc<Type>>,
    pub actual: Option<Rc<Type>>,
    pub location: ConflictLocation,
    pub sub_problems: Vec<Problem>,
}

/// Where an [`IndexedTypeConflict`] is anchored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictLocation {
    Index(usize),
    Property(String),
}

impl fmt::Display for ConflictLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictLocation::Index(i) => write!(f, "index {i}"),
            ConflictLocation::Property(name) => write!(f, "'{name}'"),
        }
    }
}

impl fmt::Display for IndexedTypeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |t: &Option<Rc<Type>>| match t {
            Some(t) => t.name(),
            None => "<missing>".to_string(),
        };
        write!(
            f,
            "At {}: expected '{}' but found '{}'.",
            self.location,
            name(&self.expected),
            name(&self.actual)
        )
    }
}

/// Conflict between two plain values, e.g. differing primitive names.
#[derive(Clone)]
pub struct ValueConflict {
    pub first: Option<String>,
    pub second: Option<String>,
    pub location: String,
}

impl fmt::Display for ValueConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = |v: &Option<String>| v.clone().unwrap_or_else(|| "<none>".to_string());
        write!(
            f,
            "At {}: '{}' conflicts with '{}'.",
            self.location,
            text(&self.first),
            text(&self.second)
        )
    }
}

/// Two types belong to different kinds and can never be related.
#[derive(Clone)]
pub struct KindConflict {
    pub first: String,
    pub second: String,
}

impl fmt::Display for KindConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The kinds '{}' and '{}' are not comparable.",
            self.first, self.second
        )
    }
}

// Conversions into the sub-problem chain.

impl From<InferenceProblem> for Problem {
    fn from(p: InferenceProblem) -> Self {
        Problem::Inference(Box::new(p))
    }
}

impl From<EqualityProblem> for Problem {
    fn from(p: EqualityProblem) -> Self {
        Problem::Equality(Box::new(p))
    }
}

impl From<SubTypeProblem> for Problem {
    fn from(p: SubTypeProblem) -> Self {
        Problem::SubType(Box::new(p))
    }
}

impl From<AssignabilityProblem> for Problem {
    fn from(p: AssignabilityProblem) -> Self {
        Problem::Assignability(Box::new(p))
    }
}

impl From<ValidationProblem> for Problem {
    fn from(p: ValidationProblem) -> Self {
        Problem::Validation(Box::new(p))
    }
}

impl From<IndexedTypeConflict> for Problem {
    fn from(p: IndexedTypeConflict) -> Self {
        Problem::IndexedTypeConflict(Box::new(p))
    }
}

impl From<ValueConflict> for Problem {
    fn from(p: ValueConflict) -> Self {
        Problem::ValueConflict(Box::new(p))
    }
}

impl From<KindConflict> for Problem {
    fn from(p: KindConflict) -> Self {
        Problem::KindConflict(Box::new(p))
    }
}
