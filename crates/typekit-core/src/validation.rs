//! Validation of host language nodes.
//!
//! Stateless rules map a node to problems. Lifecycle rules additionally
//! hook the start and end of a validation run over a root node. The host
//! drives traversal: it calls `validate` per node it wants checked, framed
//! by `validate_before` and `validate_after` on the root.
//!
//! The constraints helpers express the common checks, e.g. that the
//! inferred type of a node is assignable to an expected type, as one-line
//! calls producing ready-made problems.

use std::rc::Rc;

use crate::descriptor::TypeDescriptor;
use crate::language::LanguageNode;
use crate::node::Type;
use crate::problems::{Problem, Severity, ValidationProblem};
use crate::registry::RuleOptions;
use crate::services::TypeSystem;

pub trait ValidationRule {
    fn validate(&self, node: &LanguageNode, services: &TypeSystem) -> Vec<ValidationProblem>;

    /// Called once per validation run, before any node is validated. Only
    /// invoked for rules registered with lifecycle support.
    fn before_validation(
        &self,
        _root: &LanguageNode,
        _services: &TypeSystem,
    ) -> Vec<ValidationProblem> {
        Vec::new()
    }

    /// Called once per validation run, after all nodes were validated.
    fn after_validation(
        &self,
        _root: &LanguageNode,
        _services: &TypeSystem,
    ) -> Vec<ValidationProblem> {
        Vec::new()
    }
}

/// Relation to enforce between an inferred and an expected type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeComparison {
    Equal,
    Assignable,
    SubType,
}

impl TypeSystem {
    // =========================================================================
    // Rule management
    // =========================================================================

    pub fn add_validation_rule(&self, rule: Rc<dyn ValidationRule>, options: &RuleOptions) {
        self.validation_rules().add_rule(rule, options);
    }

    pub fn remove_validation_rule(&self, rule: &Rc<dyn ValidationRule>, options: &RuleOptions) {
        self.validation_rules().remove_rule(rule, options);
        self.lifecycle_rules()
            .borrow_mut()
            .retain(|r| !Rc::ptr_eq(r, rule));
    }

    /// Register a rule whose `before_validation`/`after_validation` hooks
    /// participate in validation runs, in registration order.
    pub fn add_validation_rule_with_lifecycle(
        &self,
        rule: Rc<dyn ValidationRule>,
        options: &RuleOptions,
    ) {
        self.validation_rules().add_rule(rule.clone(), options);
        let mut lifecycle = self.lifecycle_rules().borrow_mut();
        if !lifecycle.iter().any(|r| Rc::ptr_eq(r, &rule)) {
            lifecycle.push(rule);
        }
    }

    // =========================================================================
    // Validation runs
    // =========================================================================

    pub fn validate_before(&self, root: &LanguageNode) -> Vec<ValidationProblem> {
        let rules: Vec<Rc<dyn ValidationRule>> = self.lifecycle_rules().borrow().clone();
        let mut problems = Vec::new();
        for rule in &rules {
            problems.extend(rule.before_validation(root, self));
        }
        problems
    }

    /// Validate a single node with every rule applicable to its language
    /// key, in registry dispatch order.
    pub fn validate(&self, node: &LanguageNode) -> Vec<ValidationProblem> {
        let key = self.language().language_node_key(node);
        let rules = self.validation_rules().rules_for_key(key.as_deref());
        let mut problems = Vec::new();
        for rule in &rules {
            problems.extend(rule.validate(node, self));
        }
        problems
    }

    pub fn validate_after(&self, root: &LanguageNode) -> Vec<ValidationProblem> {
        let rules: Vec<Rc<dyn ValidationRule>> = self.lifecycle_rules().borrow().clone();
        let mut problems = Vec::new();
        for rule in &rules {
            problems.extend(rule.after_validation(root, self));
        }
        problems
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Enforce that the inferred type of `node` is assignable to the
    /// expected type. The produced message reads
    /// `The type 'S' is not assignable to the type 'T'.`
    pub fn ensure_node_is_assignable(
        &self,
        node: &LanguageNode,
        expected: &TypeDescriptor,
        severity: Severity,
    ) -> Vec<ValidationProblem> {
        self.ensure_node_related_with_type(node, expected, TypeComparison::Assignable, severity)
    }

    pub fn ensure_node_is_equal(
        &self,
        node: &LanguageNode,
        expected: &TypeDescriptor,
        severity: Severity,
    ) -> Vec<ValidationProblem> {
        self.ensure_node_related_with_type(node, expected, TypeComparison::Equal, severity)
    }

    /// Enforce that the inferred type of `node` is *not* the given type.
    pub fn ensure_node_has_not_type(
        &self,
        node: &LanguageNode,
        forbidden: &TypeDescriptor,
        severity: Severity,
    ) -> Vec<ValidationProblem> {
        let (actual, mut problems) = match self.infer_node_for_constraint(node, severity) {
            Ok(actual) => (actual, Vec::new()),
            Err(problems) => return problems,
        };
        let Some(forbidden_ty) = self.try_to_resolve(forbidden) else {
            return problems;
        };
        if self.are_types_equal(&actual, &forbidden_ty) {
            problems.push(ValidationProblem::new(
                node.clone(),
                severity,
                format!("The type '{}' is not allowed here.", actual.name()),
            ));
        }
        problems
    }

    pub fn ensure_node_related_with_type(
        &self,
        node: &LanguageNode,
        expected: &TypeDescriptor,
        comparison: TypeComparison,
        severity: Severity,
    ) -> Vec<ValidationProblem> {
        self.ensure_node_related_with_type_message(node, expected, comparison, severity, None)
    }

    /// Like [`TypeSystem::ensure_node_related_with_type`] with a custom
    /// message built from the actual and expected types.
    pub fn ensure_node_related_with_type_message(
        &self,
        node: &LanguageNode,
        expected: &TypeDescriptor,
        comparison: TypeComparison,
        severity: Severity,
        message: Option<&dyn Fn(&Rc<Type>, &Rc<Type>) -> String>,
    ) -> Vec<ValidationProblem> {
        let actual = match self.infer_node_for_constraint(node, severity) {
            Ok(actual) => actual,
            Err(problems) => return problems,
        };
        let expected_ty = match self.resolve(expected) {
            Ok(ty) => ty,
            Err(error) => {
                return vec![ValidationProblem::new(
                    node.clone(),
                    Severity::Error,
                    format!("The expected type could not be resolved: {error}"),
                )];
            }
        };

        let conflict: Option<Problem> = match comparison {
            TypeComparison::Equal => self
                .get_type_equality_problem(&actual, &expected_ty)
                .map(Problem::from),
            TypeComparison::Assignable => self
                .get_assignability_result(&actual, &expected_ty)
                .err()
                .map(Problem::from),
            TypeComparison::SubType => self
                .get_sub_type_problem(&actual, &expected_ty)
                .map(Problem::from),
        };
        match conflict {
            None => Vec::new(),
            Some(problem) => {
                let text = match message {
                    Some(build) => build(&actual, &expected_ty),
                    None => problem.to_string(),
                };
                vec![
                    ValidationProblem::new(node.clone(), severity, text)
                        .with_sub_problems(vec![problem]),
                ]
            }
        }
    }

    fn infer_node_for_constraint(
        &self,
        node: &LanguageNode,
        _severity: Severity,
    ) -> Result<Rc<Type>, Vec<ValidationProblem>> {
        self.infer_type(node).map_err(|problems| {
            vec![
                ValidationProblem::new(
                    node.clone(),
                    Severity::Error,
                    "No type could be inferred for this node.",
                )
                .with_sub_problems(problems.into_iter().map(Problem::from).collect()),
            ]
        })
    }
}
