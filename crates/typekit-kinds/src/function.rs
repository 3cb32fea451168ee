//! The function kind.
//!
//! A function type is identified by its name and signature, so equal
//! declarations collapse. All function types sharing a name form an
//! overload group; the group owns a single call-inference rule that ranks
//! the overloads by the assignability cost of the arguments, and an
//! optional arguments validation reporting per-signature conflicts for
//! calls that fit no overload.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use tracing::trace;

use typekit_core::{
    FUNCTION_KIND_NAME, FieldCheckingStrategy, FunctionData, InitializationPlan, Kind,
    LanguageNode, NO_FUNCTION_NAME, ParameterData, RuleOptions, Type, TypeBody, TypeDescriptor,
    TypeEdge, TypeGraphListener, TypeInitializer, TypeReference, TypeSystem,
};

use crate::function_calls::FunctionCallInferenceRule;
use crate::function_validation::FunctionCallArgumentsValidation;
use crate::rules::{DeclaredRule, NodeMatcher, register_declared_rules};

/// What calls of a function without an output parameter infer to.
#[derive(Clone)]
pub enum OutputTypePolicy {
    /// Such a call has no type; inferring one reports a problem.
    ReportError,
    /// Infer the given type, e.g. a `void` primitive.
    Use(TypeDescriptor),
}

/// Whether a call site that matches no signature of the group is reported
/// by the arguments validation.
#[derive(Clone)]
pub enum ArgumentsValidationPolicy {
    Disabled,
    Enabled,
    /// Validate only call sites accepted by the filter.
    Filtered(Rc<dyn Fn(&LanguageNode) -> bool>),
}

impl ArgumentsValidationPolicy {
    pub(crate) fn applies_to(&self, node: &LanguageNode) -> bool {
        match self {
            ArgumentsValidationPolicy::Disabled => false,
            ArgumentsValidationPolicy::Enabled => true,
            ArgumentsValidationPolicy::Filtered(filter) => filter(node),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        !matches!(self, ArgumentsValidationPolicy::Disabled)
    }
}

/// How a call site is recognized and decomposed for one overload.
#[derive(Clone)]
pub struct CallRuleDetails {
    pub language_key: Option<Vec<String>>,
    /// Whether the node is a call of the named function.
    pub matching: Rc<dyn Fn(&LanguageNode, &str) -> bool>,
    /// The argument nodes of the call, in order.
    pub input_arguments: Rc<dyn Fn(&LanguageNode) -> Vec<LanguageNode>>,
    pub validate_arguments: ArgumentsValidationPolicy,
}

/// A signature that accepted the arguments of a call site.
pub struct CallMatch {
    pub function_type: Rc<Type>,
    /// Sum of the edge costs over all parameter paths.
    pub cost: u32,
    /// One entry per parameter: the witnessing assignability path, `None`
    /// for an exact match.
    pub assignability_success: Vec<Option<Vec<Rc<TypeEdge>>>>,
}

pub struct FunctionKindOptions {
    pub enforce_function_name: bool,
    pub enforce_input_parameter_names: bool,
    pub enforce_output_parameter_name: bool,
    pub identifier_prefix: String,
    pub type_to_infer_for_calls_of_functions_without_output: OutputTypePolicy,
    pub subtype_parameter_checking: FieldCheckingStrategy,
    /// Tie-breaker among equally cheap overloads; the default picks the
    /// first, which is deterministic but arbitrary.
    pub handle_multiple_best_matches: Rc<dyn Fn(&[CallMatch]) -> Option<usize>>,
    /// Name this kind instance registers under; lets a second, differently
    /// configured instance (e.g. for operators) coexist.
    pub kind_registration_name: String,
}

impl Default for FunctionKindOptions {
    fn default() -> Self {
        Self {
            enforce_function_name: false,
            enforce_input_parameter_names: false,
            enforce_output_parameter_name: false,
            identifier_prefix: "fn".to_string(),
            type_to_infer_for_calls_of_functions_without_output: OutputTypePolicy::ReportError,
            subtype_parameter_checking: FieldCheckingStrategy::SubType,
            handle_multiple_best_matches: Rc::new(|_| Some(0)),
            kind_registration_name: FUNCTION_KIND_NAME.to_string(),
        }
    }
}

pub struct ParameterDetails {
    pub name: String,
    pub ty: TypeDescriptor,
}

pub struct FunctionTypeDetails {
    /// [`NO_FUNCTION_NAME`] for anonymous function types.
    pub function_name: String,
    pub input_parameters: Vec<ParameterDetails>,
    pub output_parameter: Option<ParameterDetails>,
}

impl FunctionTypeDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            function_name: name.into(),
            input_parameters: Vec::new(),
            output_parameter: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::named(NO_FUNCTION_NAME)
    }

    pub fn with_input(mut self, name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        self.input_parameters.push(ParameterDetails {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        self.output_parameter = Some(ParameterDetails {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }
}

pub(crate) struct OverloadEntry {
    pub ty: Rc<Type>,
    pub call: Option<Rc<CallRuleDetails>>,
}

/// All function types sharing one name, with the group-wide caches.
pub struct OverloadGroup {
    function_name: String,
    overloads: RefCell<Vec<OverloadEntry>>,
    call_rule: RefCell<Option<Rc<FunctionCallInferenceRule>>>,
    validation_rule: RefCell<Option<Rc<FunctionCallArgumentsValidation>>>,
    /// `Some(cached)` once computed; reset when the group changes.
    same_output: RefCell<Option<Option<Rc<Type>>>>,
}

impl OverloadGroup {
    fn new(function_name: String) -> Rc<Self> {
        Rc::new(Self {
            function_name,
            overloads: RefCell::new(Vec::new()),
            call_rule: RefCell::new(None),
            validation_rule: RefCell::new(None),
            same_output: RefCell::new(None),
        })
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn overload_count(&self) -> usize {
        self.overloads.borrow().len()
    }

    pub(crate) fn entries(&self) -> Vec<(Rc<Type>, Option<Rc<CallRuleDetails>>)> {
        self.overloads
            .borrow()
            .iter()
            .map(|e| (e.ty.clone(), e.call.clone()))
            .collect()
    }

    /// The entries whose call rule recognizes the node as a call of this
    /// group's function.
    pub(crate) fn matching_entries(
        &self,
        node: &LanguageNode,
    ) -> Vec<(Rc<Type>, Rc<CallRuleDetails>)> {
        self.entries()
            .into_iter()
            .filter_map(|(ty, call)| call.map(|call| (ty, call)))
            .filter(|(_, call)| (call.matching)(node, &self.function_name))
            .collect()
    }

    /// The output type shared by every overload, when they all agree.
    pub fn same_output_type(&self, services: &TypeSystem) -> Option<Rc<Type>> {
        if let Some(cached) = self.same_output.borrow().as_ref() {
            return cached.clone();
        }
        let outputs: Vec<Option<Rc<Type>>> = self
            .overloads
            .borrow()
            .iter()
            .map(|e| {
                e.ty.body()
                    .as_function()
                    .and_then(|data| data.output_parameter.as_ref())
                    .and_then(|p| p.ty.get())
            })
            .collect();
        let shared = match outputs.split_first() {
            Some((Some(first), rest))
                if rest
                    .iter()
                    .all(|o| o.as_ref().is_some_and(|o| services.are_types_equal(first, o))) =>
            {
                Some(first.clone())
            }
            _ => None,
        };
        *self.same_output.borrow_mut() = Some(shared.clone());
        shared
    }

    fn invalidate_cache(&self) {
        *self.same_output.borrow_mut() = None;
    }
}

pub struct FunctionKind {
    services: Rc<TypeSystem>,
    pub(crate) options: FunctionKindOptions,
    groups: RefCell<FxHashMap<String, Rc<OverloadGroup>>>,
}

impl FunctionKind {
    pub fn new(services: &Rc<TypeSystem>, options: FunctionKindOptions) -> Rc<Self> {
        let kind = Rc::new(Self {
            services: services.clone(),
            options,
            groups: RefCell::new(FxHashMap::default()),
        });
        services.register_kind(kind.clone());
        // Keep the overload groups in sync with the node population.
        services.graph().add_listener(
            Rc::new(OverloadPruner {
                kind: Rc::downgrade(&kind),
            }),
            false,
        );
        kind
    }

    pub fn create(self: &Rc<Self>, details: FunctionTypeDetails) -> FunctionTypeBuilder {
        FunctionTypeBuilder {
            kind: self.clone(),
            details,
            declaration_rules: Vec::new(),
            call_rule: None,
        }
    }

    pub fn get_overload_group(&self, function_name: &str) -> Option<Rc<OverloadGroup>> {
        self.groups.borrow().get(function_name).cloned()
    }

    /// Signature-derived identifier; parameter names are not part of it,
    /// so renaming a parameter does not produce a new type.
    pub fn calculate_identifier(&self, data: &FunctionData) -> String {
        let part = |r: &Rc<TypeReference>| match r.get() {
            Some(t) => t.identifier().unwrap_or_else(|| t.name()),
            None => "?".to_string(),
        };
        let params: Vec<String> = data.input_parameters.iter().map(|p| part(&p.ty)).collect();
        let base = format!(
            "{}-{}({})",
            self.options.identifier_prefix,
            data.function_name,
            params.join(",")
        );
        match &data.output_parameter {
            Some(output) => format!("{base}=>{}", part(&output.ty)),
            None => base,
        }
    }

    fn register_overload(
        self: &Rc<Self>,
        ty: &Rc<Type>,
        call: Option<Rc<CallRuleDetails>>,
    ) {
        let Some(data) = ty.body().as_function() else {
            return;
        };
        if data.function_name == NO_FUNCTION_NAME {
            return;
        }
        let group = self
            .groups
            .borrow_mut()
            .entry(data.function_name.clone())
            .or_insert_with(|| OverloadGroup::new(data.function_name.clone()))
            .clone();

        {
            let mut overloads = group.overloads.borrow_mut();
            match overloads.iter_mut().find(|e| Rc::ptr_eq(&e.ty, ty)) {
                Some(entry) => {
                    // The same surviving node was declared twice; keep the
                    // first call rule.
                    if entry.call.is_none() {
                        entry.call = call.clone();
                    }
                }
                None => overloads.push(OverloadEntry {
                    ty: ty.clone(),
                    call: call.clone(),
                }),
            }
        }
        group.invalidate_cache();
        trace!(function = %group.function_name, overloads = group.overload_count(), "registered overload");

        let Some(call) = call else {
            return;
        };
        let key_options = |bound: &Rc<Type>| RuleOptions {
            language_key: call.language_key.clone(),
            bound_to_type: vec![bound.clone()],
        };
        // One call-inference rule per group, bound to every overload so it
        // disappears with the last of them.
        let rule = {
            let mut slot = group.call_rule.borrow_mut();
            slot.get_or_insert_with(|| {
                Rc::new(FunctionCallInferenceRule::new(
                    Rc::downgrade(self),
                    group.clone(),
                ))
            })
            .clone()
        };
        self.services
            .add_inference_rule(rule, &key_options(ty));

        if call.validate_arguments.is_enabled() {
            let validation = {
                let mut slot = group.validation_rule.borrow_mut();
                slot.get_or_insert_with(|| {
                    Rc::new(FunctionCallArgumentsValidation::new(group.clone()))
                })
                .clone()
            };
            self.services
                .add_validation_rule(validation, &key_options(ty));
        }
    }

    fn prune(&self, ty: &Rc<Type>) {
        let mut groups = self.groups.borrow_mut();
        for group in groups.values() {
            let mut overloads = group.overloads.borrow_mut();
            let before = overloads.len();
            overloads.retain(|e| !Rc::ptr_eq(&e.ty, ty));
            if overloads.len() != before {
                group.invalidate_cache();
            }
        }
        groups.retain(|_, group| group.overload_count() > 0);
    }
}

impl Kind for FunctionKind {
    fn kind_name(&self) -> &str {
        &self.options.kind_registration_name
    }
}

struct OverloadPruner {
    kind: Weak<FunctionKind>,
}

impl TypeGraphListener for OverloadPruner {
    fn on_removed_type(&self, ty: &Rc<Type>, _key: &str) {
        if let Some(kind) = self.kind.upgrade() {
            kind.prune(ty);
        }
    }
}

pub struct FunctionTypeBuilder {
    kind: Rc<FunctionKind>,
    details: FunctionTypeDetails,
    declaration_rules: Vec<DeclaredRule>,
    call_rule: Option<Rc<CallRuleDetails>>,
}

impl FunctionTypeBuilder {
    /// Infer this function type for nodes accepted by the matcher, e.g.
    /// the declaration node of the host language.
    pub fn inference_rule_for_declaration(
        mut self,
        options: RuleOptions,
        matches: impl Fn(&LanguageNode) -> bool + 'static,
    ) -> Self {
        self.declaration_rules.push(DeclaredRule {
            options,
            matches: Rc::new(matches) as NodeMatcher,
        });
        self
    }

    /// Let call sites of this function participate in overload resolution.
    pub fn inference_rule_for_calls(mut self, details: CallRuleDetails) -> Self {
        self.call_rule = Some(Rc::new(details));
        self
    }

    pub fn finish(self) -> Rc<TypeInitializer> {
        let FunctionTypeBuilder {
            kind,
            details,
            declaration_rules,
            call_rule,
        } = self;
        let services = kind.services.clone();
        let options = &kind.options;

        if options.enforce_function_name && details.function_name == NO_FUNCTION_NAME {
            panic!("a function name is required by this function kind");
        }
        if options.enforce_input_parameter_names {
            for (index, parameter) in details.input_parameters.iter().enumerate() {
                if parameter.name.is_empty() {
                    panic!(
                        "the function '{}' requires a name for its input parameter {index}",
                        details.function_name
                    );
                }
            }
        }
        if options.enforce_output_parameter_name {
            if let Some(output) = &details.output_parameter {
                if output.name.is_empty() {
                    panic!(
                        "the function '{}' requires a name for its output parameter",
                        details.function_name
                    );
                }
            }
        }

        let input_parameters: Vec<ParameterData> = details
            .input_parameters
            .into_iter()
            .map(|p| ParameterData {
                name: p.name,
                ty: services.create_reference(p.ty),
            })
            .collect();
        let output_parameter = details.output_parameter.map(|p| ParameterData {
            name: p.name,
            ty: services.create_reference(p.ty),
        });

        let mut all_refs: Vec<Rc<TypeReference>> =
            input_parameters.iter().map(|p| p.ty.clone()).collect();
        if let Some(output) = &output_parameter {
            all_refs.push(output.ty.clone());
        }

        let ty = Type::new(TypeBody::Function(FunctionData {
            function_name: details.function_name,
            input_parameters,
            output_parameter,
            parameter_checking: options.subtype_parameter_checking,
        }));

        let identifier_kind = kind.clone();
        ty.define_initialization(
            InitializationPlan::new(move |t: &Rc<Type>| {
                let data = t
                    .body()
                    .as_function()
                    .expect("function identifiers are computed for functions");
                t.set_identifier(identifier_kind.calculate_identifier(data));
            })
            .identifiable_after(all_refs.clone())
            .completed_after(all_refs.clone())
            .invalidated_by(all_refs),
        );

        let initializer = TypeInitializer::new(&services, ty);
        let ready_kind = kind.clone();
        let ready_services = services.clone();
        initializer.on_ready(move |final_ty, _collapsed| {
            register_declared_rules(
                &ready_services,
                "function declaration",
                &declaration_rules,
                final_ty,
            );
            ready_kind.register_overload(final_ty, call_rule.clone());
        });
        initializer.start();
        initializer
    }
}
