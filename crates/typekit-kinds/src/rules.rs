//! Shared rule shapes used by the kind factories.

use std::rc::Rc;

use typekit_core::{InferenceRule, InferenceRuleOutcome, LanguageNode, Type, TypeSystem};

/// Predicate deciding whether a declaration rule applies to a node.
pub type NodeMatcher = Rc<dyn Fn(&LanguageNode) -> bool>;

/// Maps every matching node to one fixed type. The workhorse behind the
/// `inference_rule` builder hooks of primitives, classes and custom types:
/// once the (deduplicated) node is known, one of these is registered per
/// declared rule, bound to that node.
pub struct StaticTypeInferenceRule {
    name: String,
    matches: NodeMatcher,
    ty: Rc<Type>,
}

impl StaticTypeInferenceRule {
    pub fn new(name: impl Into<String>, matches: NodeMatcher, ty: Rc<Type>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            matches,
            ty,
        })
    }
}

impl InferenceRule for StaticTypeInferenceRule {
    fn infer(&self, node: &LanguageNode, _services: &TypeSystem) -> InferenceRuleOutcome {
        if (self.matches)(node) {
            InferenceRuleOutcome::Type(self.ty.clone())
        } else {
            InferenceRuleOutcome::NotApplicable
        }
    }

    fn rule_name(&self) -> &str {
        &self.name
    }
}

/// A declared inference rule waiting for its type: registered once the
/// initializer reports the surviving node.
pub(crate) struct DeclaredRule {
    pub options: typekit_core::RuleOptions,
    pub matches: NodeMatcher,
}

pub(crate) fn register_declared_rules(
    services: &TypeSystem,
    label: &str,
    rules: &[DeclaredRule],
    ty: &Rc<Type>,
) {
    for declared in rules {
        let rule = StaticTypeInferenceRule::new(
            format!("{label} inference"),
            declared.matches.clone(),
            ty.clone(),
        );
        let mut options = declared.options.clone();
        options.bound_to_type.push(ty.clone());
        services.add_inference_rule(rule, &options);
    }
}
