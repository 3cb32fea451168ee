//! Validation of call-site arguments against an overload group.
//!
//! Runs only when inference found no usable overload for the call site:
//! reports one issue per failing signature, naming the argument-count
//! conflict or the first conflicting argument index. Overloads opted out
//! of arguments validation stay silent.

use std::rc::Rc;

use typekit_core::{
    ConflictLocation, IndexedTypeConflict, LanguageNode, Problem, Severity, Type, TypeSystem,
    ValidationProblem, ValidationRule,
};

use crate::function::OverloadGroup;

pub struct FunctionCallArgumentsValidation {
    group: Rc<OverloadGroup>,
}

impl FunctionCallArgumentsValidation {
    pub(crate) fn new(group: Rc<OverloadGroup>) -> Self {
        Self { group }
    }
}

impl ValidationRule for FunctionCallArgumentsValidation {
    fn validate(&self, node: &LanguageNode, services: &TypeSystem) -> Vec<ValidationProblem> {
        let entries: Vec<_> = self
            .group
            .matching_entries(node)
            .into_iter()
            .filter(|(_, call)| call.validate_arguments.applies_to(node))
            .collect();
        if entries.is_empty() {
            return Vec::new();
        }
        // A call some overload accepts needs no report.
        if services.infer_type(node).is_ok() {
            return Vec::new();
        }

        let arguments = (entries[0].1.input_arguments)(node);
        let argument_types: Vec<Option<Rc<Type>>> = arguments
            .iter()
            .map(|argument| services.infer_type(argument).ok())
            .collect();

        let mut problems = Vec::new();
        for (function_type, _) in &entries {
            let Some(data) = function_type.body().as_function() else {
                continue;
            };
            if data.input_parameters.len() != argument_types.len() {
                problems.push(ValidationProblem::new(
                    node.clone(),
                    Severity::Error,
                    format!(
                        "'{}' expects {} argument(s), but {} were given.",
                        function_type.user_representation(),
                        data.input_parameters.len(),
                        argument_types.len()
                    ),
                ));
                continue;
            }
            let mut conflicts: Vec<Problem> = Vec::new();
            for (index, (argument_type, parameter)) in argument_types
                .iter()
                .zip(data.input_parameters.iter())
                .enumerate()
            {
                let (Some(argument_type), Some(parameter_type)) =
                    (argument_type.as_ref(), parameter.ty.get())
                else {
                    continue;
                };
                if let Err(problem) =
                    services.get_assignability_result(argument_type, &parameter_type)
                {
                    conflicts.push(
                        IndexedTypeConflict {
                            expected: Some(parameter_type),
                            actual: Some(argument_type.clone()),
                            location: ConflictLocation::Index(index),
                            sub_problems: vec![problem.into()],
                        }
                        .into(),
                    );
                }
            }
            if !conflicts.is_empty() {
                problems.push(
                    ValidationProblem::new(
                        node.clone(),
                        Severity::Error,
                        format!(
                            "The call does not match the signature '{}'.",
                            function_type.user_representation()
                        ),
                    )
                    .with_sub_problems(conflicts),
                );
            }
        }
        problems
    }
}
