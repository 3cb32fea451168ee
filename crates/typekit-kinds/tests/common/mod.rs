//! A miniature expression language used as the host fixture: literals,
//! binary operations, typed variables and assignments. Just enough AST to
//! drive inference, overload resolution and validation end to end.

#![allow(dead_code)]

use std::rc::Rc;

use typekit_core::{
    InferenceProblem, InferenceRule, InferenceRuleOutcome, LanguageNode, LanguageService,
    RuleOptions, Severity, TypeDescriptor, TypeSystem, ValidationProblem, ValidationRule,
};
use typekit_kinds::{
    ArgumentsValidationPolicy, CallRuleDetails, PrimitiveTypeDetails, Typekit,
};

pub struct IntLiteral(pub i64);
pub struct DoubleLiteral(pub f64);
pub struct StringLiteral(pub String);
pub struct BoolLiteral(pub bool);

pub struct BinaryOperation {
    pub operator: String,
    pub left: LanguageNode,
    pub right: LanguageNode,
}

/// A variable with a declared type, referenced by assignments.
pub struct Variable {
    pub name: String,
    pub type_name: String,
}

pub struct AssignmentStatement {
    pub variable: LanguageNode,
    pub value: LanguageNode,
}

pub fn int_literal(value: i64) -> LanguageNode {
    Rc::new(IntLiteral(value))
}

pub fn double_literal(value: f64) -> LanguageNode {
    Rc::new(DoubleLiteral(value))
}

pub fn string_literal(value: &str) -> LanguageNode {
    Rc::new(StringLiteral(value.to_string()))
}

pub fn bool_literal(value: bool) -> LanguageNode {
    Rc::new(BoolLiteral(value))
}

pub fn binary(operator: &str, left: LanguageNode, right: LanguageNode) -> LanguageNode {
    Rc::new(BinaryOperation {
        operator: operator.to_string(),
        left,
        right,
    })
}

pub fn variable(name: &str, type_name: &str) -> LanguageNode {
    Rc::new(Variable {
        name: name.to_string(),
        type_name: type_name.to_string(),
    })
}

pub fn assignment(variable: LanguageNode, value: LanguageNode) -> LanguageNode {
    Rc::new(AssignmentStatement { variable, value })
}

/// The host adapter of the fixture language.
pub struct ExprLang;

impl LanguageService for ExprLang {
    fn is_language_node(&self, value: &LanguageNode) -> bool {
        self.language_node_key(value).is_some()
    }

    fn language_node_key(&self, node: &LanguageNode) -> Option<String> {
        let key = if node.downcast_ref::<IntLiteral>().is_some() {
            "IntLiteral"
        } else if node.downcast_ref::<DoubleLiteral>().is_some() {
            "DoubleLiteral"
        } else if node.downcast_ref::<StringLiteral>().is_some() {
            "StringLiteral"
        } else if node.downcast_ref::<BoolLiteral>().is_some() {
            "BoolLiteral"
        } else if node.downcast_ref::<BinaryOperation>().is_some() {
            "BinaryOperation"
        } else if node.downcast_ref::<Variable>().is_some() {
            "Variable"
        } else if node.downcast_ref::<AssignmentStatement>().is_some() {
            "AssignmentStatement"
        } else {
            return None;
        };
        Some(key.to_string())
    }
}

/// The primitive types of the fixture language.
pub struct Primitives {
    pub integer: Rc<typekit_core::Type>,
    pub double: Rc<typekit_core::Type>,
    pub string: Rc<typekit_core::Type>,
    pub boolean: Rc<typekit_core::Type>,
}

/// Create the typekit bundle for the fixture language with its four
/// primitives and literal inference rules.
pub fn expr_lang_typekit() -> (Typekit, Primitives) {
    let typekit = Typekit::new(Rc::new(ExprLang));
    let primitives = declare_primitives(&typekit);
    (typekit, primitives)
}

pub fn declare_primitives(typekit: &Typekit) -> Primitives {
    let integer = typekit
        .primitives
        .create(PrimitiveTypeDetails::named("integer"))
        .inference_rule(RuleOptions::for_key("IntLiteral"), |_| true)
        .finish()
        .get_type_final()
        .expect("primitives initialize immediately");
    let double = typekit
        .primitives
        .create(PrimitiveTypeDetails::named("double"))
        .inference_rule(RuleOptions::for_key("DoubleLiteral"), |_| true)
        .finish()
        .get_type_final()
        .expect("primitives initialize immediately");
    let string = typekit
        .primitives
        .create(PrimitiveTypeDetails::named("string"))
        .inference_rule(RuleOptions::for_key("StringLiteral"), |_| true)
        .finish()
        .get_type_final()
        .expect("primitives initialize immediately");
    let boolean = typekit
        .primitives
        .create(PrimitiveTypeDetails::named("boolean"))
        .inference_rule(RuleOptions::for_key("BoolLiteral"), |_| true)
        .finish()
        .get_type_final()
        .expect("primitives initialize immediately");
    Primitives {
        integer,
        double,
        string,
        boolean,
    }
}

/// The call-rule details shared by every binary operator of the fixture:
/// a `BinaryOperation` node with the operator's name applies, its operands
/// are the arguments.
pub fn binary_operator_calls() -> CallRuleDetails {
    CallRuleDetails {
        language_key: Some(vec!["BinaryOperation".to_string()]),
        matching: Rc::new(|node: &LanguageNode, operator: &str| {
            node.downcast_ref::<BinaryOperation>()
                .is_some_and(|op| op.operator == operator)
        }),
        input_arguments: Rc::new(|node: &LanguageNode| {
            let op = node
                .downcast_ref::<BinaryOperation>()
                .expect("matching accepted only binary operations");
            vec![op.left.clone(), op.right.clone()]
        }),
        validate_arguments: ArgumentsValidationPolicy::Enabled,
    }
}

/// Infers the declared type of a variable by its type name.
pub struct VariableTypeRule;

impl InferenceRule for VariableTypeRule {
    fn infer(&self, node: &LanguageNode, services: &TypeSystem) -> InferenceRuleOutcome {
        let Some(variable) = node.downcast_ref::<Variable>() else {
            return InferenceRuleOutcome::NotApplicable;
        };
        match services.try_to_resolve(&TypeDescriptor::Identifier(variable.type_name.clone())) {
            Some(ty) => InferenceRuleOutcome::Type(ty),
            None => InferenceRuleOutcome::Problem(InferenceProblem::new(
                node.clone(),
                format!("the declared type '{}' is unknown", variable.type_name),
            )),
        }
    }

    fn rule_name(&self) -> &str {
        "variable declared type"
    }
}

/// Checks that the assigned value fits the variable's declared type.
pub struct AssignmentValidation;

impl ValidationRule for AssignmentValidation {
    fn validate(&self, node: &LanguageNode, services: &TypeSystem) -> Vec<ValidationProblem> {
        let Some(statement) = node.downcast_ref::<AssignmentStatement>() else {
            return Vec::new();
        };
        let Ok(expected) = services.infer_type(&statement.variable) else {
            return Vec::new();
        };
        services.ensure_node_is_assignable(
            &statement.value,
            &TypeDescriptor::Type(expected),
            Severity::Error,
        )
    }
}
