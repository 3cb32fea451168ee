//! The operator factory.
//!
//! Operators are functions in disguise: every operator signature becomes a
//! function type named after the operator, created through a dedicated
//! function kind whose identifiers carry an `op` prefix so they never
//! collide with host functions. Overload resolution and call validation
//! come along for free.

use std::rc::Rc;

use typekit_core::{TypeDescriptor, TypeInitializer, TypeSystem};

use crate::function::{CallRuleDetails, FunctionKind, FunctionKindOptions, FunctionTypeDetails};

pub struct OperatorSignature {
    pub parameters: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
}

pub struct OperatorDetails {
    pub name: String,
    pub signatures: Vec<OperatorSignature>,
}

impl OperatorDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signatures: Vec::new(),
        }
    }

    pub fn with_signature(
        mut self,
        parameters: Vec<TypeDescriptor>,
        return_type: impl Into<TypeDescriptor>,
    ) -> Self {
        self.signatures.push(OperatorSignature {
            parameters,
            return_type: return_type.into(),
        });
        self
    }

    /// Shorthand for a unary signature.
    pub fn unary(
        name: impl Into<String>,
        operand: impl Into<TypeDescriptor>,
        return_type: impl Into<TypeDescriptor>,
    ) -> Self {
        Self::named(name).with_signature(vec![operand.into()], return_type)
    }

    /// Shorthand for a binary signature.
    pub fn binary(
        name: impl Into<String>,
        left: impl Into<TypeDescriptor>,
        right: impl Into<TypeDescriptor>,
        return_type: impl Into<TypeDescriptor>,
    ) -> Self {
        Self::named(name).with_signature(vec![left.into(), right.into()], return_type)
    }
}

pub struct OperatorFactory {
    functions: Rc<FunctionKind>,
}

impl OperatorFactory {
    pub fn new(services: &Rc<TypeSystem>) -> Rc<Self> {
        let functions = FunctionKind::new(
            services,
            FunctionKindOptions {
                identifier_prefix: "op".to_string(),
                kind_registration_name: "operator".to_string(),
                ..FunctionKindOptions::default()
            },
        );
        Rc::new(Self { functions })
    }

    /// The function kind backing the operator types.
    pub fn functions(&self) -> &Rc<FunctionKind> {
        &self.functions
    }

    pub fn create(self: &Rc<Self>, details: OperatorDetails) -> OperatorBuilder {
        OperatorBuilder {
            factory: self.clone(),
            details,
            call_rule: None,
        }
    }
}

pub struct OperatorBuilder {
    factory: Rc<OperatorFactory>,
    details: OperatorDetails,
    call_rule: Option<CallRuleDetails>,
}

impl OperatorBuilder {
    /// Let applications of this operator participate in overload
    /// resolution; the matcher receives the operator name.
    pub fn inference_rule_for_calls(mut self, details: CallRuleDetails) -> Self {
        self.call_rule = Some(details);
        self
    }

    /// Create one function type per declared signature.
    pub fn finish(self) -> Vec<Rc<TypeInitializer>> {
        let OperatorBuilder {
            factory,
            details,
            call_rule,
        } = self;
        details
            .signatures
            .into_iter()
            .map(|signature| {
                let arity = signature.parameters.len();
                let mut function_details = FunctionTypeDetails::named(&details.name);
                for (index, parameter) in signature.parameters.into_iter().enumerate() {
                    function_details =
                        function_details.with_input(operand_name(index, arity), parameter);
                }
                function_details = function_details.with_output("result", signature.return_type);

                let mut builder = factory.functions.create(function_details);
                if let Some(call) = &call_rule {
                    builder = builder.inference_rule_for_calls(call.clone());
                }
                builder.finish()
            })
            .collect()
    }
}

fn operand_name(index: usize, arity: usize) -> String {
    match (arity, index) {
        (1, 0) => "operand".to_string(),
        (2, 0) => "left".to_string(),
        (2, 1) => "right".to_string(),
        (3, 0) => "first".to_string(),
        (3, 1) => "second".to_string(),
        (3, 2) => "third".to_string(),
        _ => format!("p{index}"),
    }
}
