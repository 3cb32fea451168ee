//! Overloaded-call resolution.
//!
//! One rule per overload group: phase one extracts the argument nodes of a
//! recognized call site, phase two receives the inferred argument types,
//! matches them against every overload through the assignability service,
//! and picks the cheapest signature. Sub-type edges on a witnessing path
//! cost 1, conversion edges 2; an exact match costs 0. Ties go to the
//! kind's `handle_multiple_best_matches`, which defaults to the first
//! match.

use std::rc::{Rc, Weak};

use tracing::trace;

use typekit_core::{
    InferenceProblem, InferenceRule, InferenceRuleOutcome, LanguageNode, Problem, Type,
    TypeSystem, assignability_path_cost,
};

use crate::function::{CallMatch, FunctionKind, OutputTypePolicy, OverloadGroup};

pub struct FunctionCallInferenceRule {
    kind: Weak<FunctionKind>,
    group: Rc<OverloadGroup>,
}

impl FunctionCallInferenceRule {
    pub(crate) fn new(kind: Weak<FunctionKind>, group: Rc<OverloadGroup>) -> Self {
        Self { kind, group }
    }

    /// Match the inferred argument types against one signature.
    fn match_signature(
        &self,
        services: &TypeSystem,
        node: &LanguageNode,
        function_type: &Rc<Type>,
        argument_types: &[Rc<Type>],
    ) -> Result<CallMatch, InferenceProblem> {
        let data = function_type
            .body()
            .as_function()
            .expect("overload groups contain function types");
        if data.input_parameters.len() != argument_types.len() {
            return Err(InferenceProblem::new(
                node.clone(),
                format!(
                    "'{}' expects {} argument(s), but {} were given",
                    function_type.user_representation(),
                    data.input_parameters.len(),
                    argument_types.len()
                ),
            )
            .with_candidate(function_type.clone()));
        }
        let mut cost = 0u32;
        let mut paths: Vec<Option<Vec<_>>> = Vec::with_capacity(argument_types.len());
        for (index, (argument, parameter)) in argument_types
            .iter()
            .zip(data.input_parameters.iter())
            .enumerate()
        {
            let Some(parameter_type) = parameter.ty.get() else {
                return Err(InferenceProblem::new(
                    node.clone(),
                    format!("the type of parameter '{}' is not resolved", parameter.name),
                )
                .with_candidate(function_type.clone()));
            };
            match services.get_assignability_result(argument, &parameter_type) {
                Ok(success) => {
                    cost += success.cost();
                    paths.push(if success.path.is_empty() {
                        None
                    } else {
                        Some(success.path)
                    });
                }
                Err(problem) => {
                    return Err(InferenceProblem::new(
                        node.clone(),
                        format!("argument {index} does not fit"),
                    )
                    .with_candidate(function_type.clone())
                    .with_sub_problems(vec![problem.into()]));
                }
            }
        }
        Ok(CallMatch {
            function_type: function_type.clone(),
            cost,
            assignability_success: paths,
        })
    }

    fn output_outcome(
        &self,
        services: &TypeSystem,
        node: &LanguageNode,
        kind: &Rc<FunctionKind>,
        chosen: &CallMatch,
    ) -> InferenceRuleOutcome {
        let data = chosen
            .function_type
            .body()
            .as_function()
            .expect("overload groups contain function types");
        match &data.output_parameter {
            Some(output) => match output.ty.get() {
                Some(output_type) => InferenceRuleOutcome::Type(output_type),
                None => InferenceRuleOutcome::Problem(
                    InferenceProblem::new(node.clone(), "the output type is not resolved")
                        .with_candidate(chosen.function_type.clone()),
                ),
            },
            None => match &kind.options.type_to_infer_for_calls_of_functions_without_output {
                OutputTypePolicy::Use(descriptor) => match services.try_to_resolve(descriptor) {
                    Some(ty) => InferenceRuleOutcome::Type(ty),
                    None => InferenceRuleOutcome::Problem(InferenceProblem::new(
                        node.clone(),
                        "the configured type for calls of output-less functions is unknown",
                    )),
                },
                OutputTypePolicy::ReportError => InferenceRuleOutcome::Problem(
                    InferenceProblem::new(
                        node.clone(),
                        format!(
                            "'{}' has no output type to infer for its calls",
                            chosen.function_type.user_representation()
                        ),
                    )
                    .with_candidate(chosen.function_type.clone()),
                ),
            },
        }
    }
}

impl InferenceRule for FunctionCallInferenceRule {
    fn infer(&self, node: &LanguageNode, _services: &TypeSystem) -> InferenceRuleOutcome {
        let entries = self.group.matching_entries(node);
        let Some((_, call)) = entries.first() else {
            return InferenceRuleOutcome::NotApplicable;
        };
        InferenceRuleOutcome::InferChildren((call.input_arguments)(node))
    }

    fn infer_with_children(
        &self,
        node: &LanguageNode,
        children: &[Rc<Type>],
        services: &TypeSystem,
    ) -> InferenceRuleOutcome {
        let Some(kind) = self.kind.upgrade() else {
            return InferenceRuleOutcome::NotApplicable;
        };
        let entries = self.group.matching_entries(node);
        let mut matches: Vec<CallMatch> = Vec::new();
        let mut problems: Vec<Problem> = Vec::new();
        for (function_type, _) in &entries {
            match self.match_signature(services, node, function_type, children) {
                Ok(call_match) => matches.push(call_match),
                Err(problem) => problems.push(problem.into()),
            }
        }
        if matches.is_empty() {
            return InferenceRuleOutcome::Problem(
                InferenceProblem::new(
                    node.clone(),
                    format!(
                        "no overload of '{}' accepts these arguments",
                        self.group.function_name()
                    ),
                )
                .with_sub_problems(problems),
            );
        }

        let best_cost = matches
            .iter()
            .map(|m| m.cost)
            .min()
            .expect("at least one match exists");
        let best: Vec<CallMatch> = matches
            .into_iter()
            .filter(|m| m.cost == best_cost)
            .collect();
        trace!(
            function = %self.group.function_name(),
            candidates = best.len(),
            cost = best_cost,
            "resolved call site"
        );

        let chosen = if best.len() == 1 {
            &best[0]
        } else {
            match (kind.options.handle_multiple_best_matches)(&best) {
                Some(index) if index < best.len() => &best[index],
                _ => {
                    return InferenceRuleOutcome::Problem(InferenceProblem::new(
                        node.clone(),
                        format!(
                            "Found {} best matching overloads: {}",
                            best.len(),
                            best.iter()
                                .map(|m| m.function_type.user_representation())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    ));
                }
            }
        };
        self.output_outcome(services, node, &kind, chosen)
    }

    fn rule_name(&self) -> &str {
        self.group.function_name()
    }
}

/// Cost of the witnessing paths of one match; exposed for hosts that
/// implement their own tie-breaking.
pub fn call_match_cost(call_match: &CallMatch) -> u32 {
    call_match
        .assignability_success
        .iter()
        .flatten()
        .map(|path| assignability_path_cost(path))
        .sum()
}
