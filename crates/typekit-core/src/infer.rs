//! Type inference over host language nodes.
//!
//! Rules come in two shapes. A stateless rule maps a node directly to a
//! type, a problem, or another node to recurse into. A two-phase rule first
//! names the child nodes whose types it needs; once those are inferred, its
//! second phase combines them into a final type. Rules fire in the dispatch
//! order of the registry; the first rule producing a type wins.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::language::{LanguageNode, language_node_id};
use crate::node::Type;
use crate::problems::{InferenceProblem, Problem};
use crate::services::TypeSystem;

/// Upper bound for rule-driven recursion. Host type grammars bound the
/// recursion in practice; this guard turns a runaway rule into a problem
/// report instead of a stack overflow.
pub const MAX_INFERENCE_DEPTH: usize = 128;

/// Message of the synthetic problem reported when no rule was applicable.
pub const NO_APPLICABLE_RULES: &str = "found no applicable inference rules";

/// What a rule phase produced.
pub enum InferenceRuleOutcome {
    /// The final type; inference for this node succeeds.
    Type(Rc<Type>),
    /// This rule does not apply to the node.
    NotApplicable,
    /// The rule applies but found the node ill-typed.
    Problem(InferenceProblem),
    /// Recurse: the node's type is the type of another node.
    Delegate(LanguageNode),
    /// Two-phase: infer these child nodes first, then call
    /// [`InferenceRule::infer_with_children`].
    InferChildren(Vec<LanguageNode>),
}

pub trait InferenceRule {
    fn infer(&self, node: &LanguageNode, services: &TypeSystem) -> InferenceRuleOutcome;

    /// Second phase of a rule that returned
    /// [`InferenceRuleOutcome::InferChildren`]: `children` holds the
    /// inferred child types in request order.
    fn infer_with_children(
        &self,
        _node: &LanguageNode,
        _children: &[Rc<Type>],
        _services: &TypeSystem,
    ) -> InferenceRuleOutcome {
        InferenceRuleOutcome::NotApplicable
    }

    /// Display name used in problem reports.
    fn rule_name(&self) -> &str {
        "inference rule"
    }
}

pub(crate) enum RuleApplication {
    Applied(Rc<Type>),
    Skipped,
    Failed(InferenceProblem),
}

/// Caches and guards of the inference service, owned by the services
/// container.
#[derive(Default)]
pub(crate) struct InferenceState {
    cache: FxHashMap<usize, Rc<Type>>,
    in_progress: FxHashSet<usize>,
}

impl TypeSystem {
    /// Infer the type of a language node. Problems are returned, never
    /// thrown; an empty rule set yields a synthetic
    /// "found no applicable inference rules" problem.
    pub fn infer_type(&self, node: &LanguageNode) -> Result<Rc<Type>, Vec<InferenceProblem>> {
        self.infer_type_at_depth(node, 0)
    }

    /// The cached result of an earlier successful inference, if any.
    pub(crate) fn cached_inferred_type(&self, node: &LanguageNode) -> Option<Rc<Type>> {
        self.inference_state()
            .borrow()
            .cache
            .get(&language_node_id(node))
            .cloned()
    }

    /// Drop all memoized inference results. Invoked whenever a type leaves
    /// the graph or falls back to `Invalid`; re-inference reproduces the
    /// same results for the types that are still intact.
    pub(crate) fn flush_inference_cache(&self) {
        let mut state = self.inference_state().borrow_mut();
        if !state.cache.is_empty() {
            trace!(entries = state.cache.len(), "flushed inference cache");
            state.cache.clear();
        }
    }

    fn infer_type_at_depth(
        &self,
        node: &LanguageNode,
        depth: usize,
    ) -> Result<Rc<Type>, Vec<InferenceProblem>> {
        let node_id = language_node_id(node);
        if depth > MAX_INFERENCE_DEPTH {
            return Err(vec![InferenceProblem::new(
                node.clone(),
                "inference recursion exceeded the supported depth",
            )]);
        }
        if let Some(cached) = self.cached_inferred_type(node) {
            return Ok(cached);
        }
        if !self.inference_state().borrow_mut().in_progress.insert(node_id) {
            return Err(vec![InferenceProblem::new(
                node.clone(),
                "cyclic inference detected for this node",
            )]);
        }
        let result = self.run_inference_rules(node, depth);
        self.inference_state().borrow_mut().in_progress.remove(&node_id);
        if let Ok(ty) = &result {
            self.inference_state()
                .borrow_mut()
                .cache
                .insert(node_id, ty.clone());
        }
        result
    }

    fn run_inference_rules(
        &self,
        node: &LanguageNode,
        depth: usize,
    ) -> Result<Rc<Type>, Vec<InferenceProblem>> {
        let key = self.language().language_node_key(node);
        let rules = self.inference_rules().rules_for_key(key.as_deref());
        let mut problems: Vec<InferenceProblem> = Vec::new();
        for rule in rules {
            match self.apply_inference_rule(&rule, node, depth) {
                RuleApplication::Applied(ty) => return Ok(ty),
                RuleApplication::Skipped => {}
                RuleApplication::Failed(problem) => problems.push(problem),
            }
        }
        if problems.is_empty() {
            problems.push(InferenceProblem::new(node.clone(), NO_APPLICABLE_RULES));
        }
        Err(problems)
    }

    /// Execute a single rule against a node, handling delegation and the
    /// two-phase child protocol.
    pub(crate) fn apply_inference_rule(
        &self,
        rule: &Rc<dyn InferenceRule>,
        node: &LanguageNode,
        depth: usize,
    ) -> RuleApplication {
        match rule.infer(node, self) {
            InferenceRuleOutcome::Type(ty) => RuleApplication::Applied(ty),
            InferenceRuleOutcome::NotApplicable => RuleApplication::Skipped,
            InferenceRuleOutcome::Problem(problem) => RuleApplication::Failed(problem),
            InferenceRuleOutcome::Delegate(other) => self.delegate_inference(rule, node, &other, depth),
            InferenceRuleOutcome::InferChildren(children) => {
                let mut child_types: Vec<Rc<Type>> = Vec::with_capacity(children.len());
                let mut child_problems: Vec<Problem> = Vec::new();
                for child in &children {
                    match self.infer_type_at_depth(child, depth + 1) {
                        Ok(ty) => child_types.push(ty),
                        Err(problems) => {
                            child_problems.extend(problems.into_iter().map(Problem::from));
                        }
                    }
                }
                if !child_problems.is_empty() {
                    return RuleApplication::Failed(
                        InferenceProblem::new(node.clone(), "inferring child types failed")
                            .with_rule(rule.rule_name())
                            .with_sub_problems(child_problems),
                    );
                }
                match rule.infer_with_children(node, &child_types, self) {
                    InferenceRuleOutcome::Type(ty) => RuleApplication::Applied(ty),
                    InferenceRuleOutcome::NotApplicable => RuleApplication::Skipped,
                    InferenceRuleOutcome::Problem(problem) => RuleApplication::Failed(problem),
                    InferenceRuleOutcome::Delegate(other) => {
                        self.delegate_inference(rule, node, &other, depth)
                    }
                    InferenceRuleOutcome::InferChildren(_) => RuleApplication::Failed(
                        InferenceProblem::new(
                            node.clone(),
                            "a rule must not request children twice",
                        )
                        .with_rule(rule.rule_name()),
                    ),
                }
            }
        }
    }

    fn delegate_inference(
        &self,
        rule: &Rc<dyn InferenceRule>,
        node: &LanguageNode,
        other: &LanguageNode,
        depth: usize,
    ) -> RuleApplication {
        match self.infer_type_at_depth(other, depth + 1) {
            Ok(ty) => RuleApplication::Applied(ty),
            Err(problems) => RuleApplication::Failed(
                InferenceProblem::new(node.clone(), "inference of the delegated node failed")
                    .with_rule(rule.rule_name())
                    .with_sub_problems(problems.into_iter().map(Problem::from).collect()),
            ),
        }
    }
}

/// Executes every sub-rule and reconciles their successes: none succeeds
/// yields the aggregated problems, exactly one wins directly, several call
/// the tie-breaker, which defaults to the first match.
pub struct CompositeInferenceRule {
    name: String,
    rules: std::cell::RefCell<Vec<Rc<dyn InferenceRule>>>,
    handle_multiple_best_matches: Box<dyn Fn(&[Rc<Type>]) -> Option<usize>>,
}

impl CompositeInferenceRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: std::cell::RefCell::new(Vec::new()),
            handle_multiple_best_matches: Box::new(|_| Some(0)),
        }
    }

    pub fn with_tie_breaker(
        mut self,
        handler: impl Fn(&[Rc<Type>]) -> Option<usize> + 'static,
    ) -> Self {
        self.handle_multiple_best_matches = Box::new(handler);
        self
    }

    pub fn add_rule(&self, rule: Rc<dyn InferenceRule>) {
        self.rules.borrow_mut().push(rule);
    }

    pub fn sub_rule_count(&self) -> usize {
        self.rules.borrow().len()
    }
}

impl InferenceRule for CompositeInferenceRule {
    fn infer(&self, node: &LanguageNode, services: &TypeSystem) -> InferenceRuleOutcome {
        let rules: Vec<Rc<dyn InferenceRule>> = self.rules.borrow().clone();
        let mut successes: Vec<Rc<Type>> = Vec::new();
        let mut problems: Vec<Problem> = Vec::new();
        let mut any_applicable = false;
        for rule in &rules {
            match services.apply_inference_rule(rule, node, 0) {
                RuleApplication::Applied(ty) => {
                    any_applicable = true;
                    successes.push(ty);
                }
                RuleApplication::Skipped => {}
                RuleApplication::Failed(problem) => {
                    any_applicable = true;
                    problems.push(problem.into());
                }
            }
        }
        match successes.len() {
            0 if !any_applicable => InferenceRuleOutcome::NotApplicable,
            0 => InferenceRuleOutcome::Problem(
                InferenceProblem::new(node.clone(), "no sub-rule produced a type")
                    .with_rule(&self.name)
                    .with_sub_problems(problems),
            ),
            1 => InferenceRuleOutcome::Type(successes.into_iter().next().expect("one success")),
            n => match (self.handle_multiple_best_matches)(&successes) {
                Some(index) if index < n => InferenceRuleOutcome::Type(successes[index].clone()),
                _ => InferenceRuleOutcome::Problem(
                    InferenceProblem::new(
                        node.clone(),
                        format!("Found {n} best matching overloads"),
                    )
                    .with_rule(&self.name),
                ),
            },
        }
    }

    fn rule_name(&self) -> &str {
        &self.name
    }
}
