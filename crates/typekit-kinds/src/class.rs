//! The class kind.
//!
//! A class kind is configured once for structural or nominal typing. The
//! identifier of a nominal class is its name; a structural class derives
//! its identifier from its shape, so two classes with equal fields,
//! methods and super-classes collapse into one node, which is additionally
//! indexed under its class name. Inheritance cycles are detected when a
//! class completes; depending on the configured policy the kind panics or
//! records the finding for the next validation run.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

use typekit_core::{
    CLASS_KIND_NAME, ClassData, ClassTyping, DisposalWaiter, FieldCheckingStrategy,
    InitializationPlan, Kind, LanguageNode, RuleOptions, Severity, Type, TypeBody, TypeDescriptor,
    TypeInitializer, TypeReference, TypeReferenceListener, TypeSystem, ValidationProblem,
    ValidationRule, has_super_class_cycle,
};

use crate::rules::{DeclaredRule, NodeMatcher, register_declared_rules};

/// What to do when a super-class chain turns out to be cyclic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InheritanceCyclePolicy {
    /// Treat the cycle as host misuse and panic.
    Panic,
    /// Record the cycle; the kind reports it as a validation error after
    /// the next validation run.
    Report,
}

pub struct ClassKindOptions {
    pub typing: ClassTyping,
    /// Negative for unbounded.
    pub maximum_number_of_super_classes: i32,
    pub subtype_field_checking: FieldCheckingStrategy,
    pub inheritance_cycle_policy: InheritanceCyclePolicy,
}

impl Default for ClassKindOptions {
    fn default() -> Self {
        Self {
            typing: ClassTyping::Nominal,
            maximum_number_of_super_classes: -1,
            subtype_field_checking: FieldCheckingStrategy::SubType,
            inheritance_cycle_policy: InheritanceCyclePolicy::Report,
        }
    }
}

pub struct FieldDetails {
    pub name: String,
    pub ty: TypeDescriptor,
}

pub struct ClassTypeDetails {
    pub class_name: String,
    pub super_classes: Vec<TypeDescriptor>,
    pub fields: Vec<FieldDetails>,
    pub methods: Vec<TypeDescriptor>,
}

impl ClassTypeDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            class_name: name.into(),
            super_classes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_super_class(mut self, super_class: impl Into<TypeDescriptor>) -> Self {
        self.super_classes.push(super_class.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        self.fields.push(FieldDetails {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn with_method(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.methods.push(ty.into());
        self
    }
}

pub struct ClassKind {
    services: Rc<TypeSystem>,
    options: ClassKindOptions,
    cycle_errors: RefCell<Vec<String>>,
}

impl ClassKind {
    pub fn new(services: &Rc<TypeSystem>, options: ClassKindOptions) -> Rc<Self> {
        let kind = Rc::new(Self {
            services: services.clone(),
            options,
            cycle_errors: RefCell::new(Vec::new()),
        });
        services.register_kind(kind.clone());
        if kind.options.inheritance_cycle_policy == InheritanceCyclePolicy::Report {
            services.add_validation_rule_with_lifecycle(
                Rc::new(InheritanceCycleValidation {
                    kind: Rc::downgrade(&kind),
                }),
                &RuleOptions::any(),
            );
        }
        kind
    }

    pub fn create(self: &Rc<Self>, details: ClassTypeDetails) -> ClassTypeBuilder {
        ClassTypeBuilder {
            kind: self.clone(),
            details,
            declaration_rules: Vec::new(),
        }
    }

    pub fn typing(&self) -> ClassTyping {
        self.options.typing
    }

    /// Look up a class by its name. Nominal classes use the name as their
    /// identifier; structural classes are additionally indexed by name.
    pub fn get_class(&self, name: &str) -> Option<Rc<Type>> {
        self.services.graph().get_type(name)
    }

    /// Inheritance cycles recorded under the `Report` policy and not yet
    /// drained by a validation run.
    pub fn inheritance_cycle_errors(&self) -> Vec<String> {
        self.cycle_errors.borrow().clone()
    }

    fn record_cycle(&self, class_name: &str) {
        let message = format!("Cyclic inheritance involving the class '{class_name}'.");
        debug!(class_name, "detected inheritance cycle");
        match self.options.inheritance_cycle_policy {
            InheritanceCyclePolicy::Panic => panic!("{message}"),
            InheritanceCyclePolicy::Report => {
                let mut errors = self.cycle_errors.borrow_mut();
                if !errors.contains(&message) {
                    errors.push(message);
                }
            }
        }
    }
}

impl Kind for ClassKind {
    fn kind_name(&self) -> &str {
        CLASS_KIND_NAME
    }
}

pub struct ClassTypeBuilder {
    kind: Rc<ClassKind>,
    details: ClassTypeDetails,
    declaration_rules: Vec<DeclaredRule>,
}

impl ClassTypeBuilder {
    /// Infer this class for nodes accepted by the matcher, e.g. the class
    /// declaration node of the host language.
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

    pub fn finish(self) -> Rc<TypeInitializer> {
        let ClassTypeBuilder {
            kind,
            details,
            declaration_rules,
        } = self;
        let services = kind.services.clone();

        // Field names are unique within a class.
        let mut seen_fields: FxHashSet<&str> = FxHashSet::default();
        for field in &details.fields {
            if !seen_fields.insert(field.name.as_str()) {
                panic!(
                    "the class '{}' declares the field '{}' twice",
                    details.class_name, field.name
                );
            }
        }
        let maximum = kind.options.maximum_number_of_super_classes;
        if maximum >= 0 && details.super_classes.len() > maximum as usize {
            panic!(
                "the class '{}' declares {} super-classes, at most {maximum} are allowed",
                details.class_name,
                details.super_classes.len()
            );
        }

        let super_refs: Vec<Rc<TypeReference>> = details
            .super_classes
            .into_iter()
            .map(|d| services.create_reference(d))
            .collect();
        let mut fields: IndexMap<String, Rc<TypeReference>> = IndexMap::new();
        for field in details.fields {
            fields.insert(field.name, services.create_reference(field.ty));
        }
        let methods: Vec<Rc<TypeReference>> = details
            .methods
            .into_iter()
            .map(|d| services.create_reference(d))
            .collect();

        let mut all_refs: Vec<Rc<TypeReference>> = super_refs.clone();
        all_refs.extend(fields.values().cloned());
        all_refs.extend(methods.iter().cloned());

        let class_name = details.class_name;
        let typing = kind.options.typing;
        let ty = Type::new(TypeBody::Class(ClassData {
            class_name: class_name.clone(),
            typing,
            field_checking: kind.options.subtype_field_checking,
            super_classes: super_refs.clone(),
            sub_classes: RefCell::new(Vec::new()),
            fields,
            methods,
        }));

        // Maintain the reverse sub-class index on every resolved super.
        for super_ref in &super_refs {
            super_ref.add_listener(
                Rc::new(SubClassRegistrar {
                    class: Rc::downgrade(&ty),
                }),
                true,
            );
        }

        let identifier_name = class_name.clone();
        let on_identifiable = move |t: &Rc<Type>| {
            let identifier = match typing {
                ClassTyping::Nominal => identifier_name.clone(),
                ClassTyping::Structural => calculate_structural_identifier(t),
            };
            t.set_identifier(identifier);
        };

        let kind_weak = Rc::downgrade(&kind);
        let cycle_class = class_name.clone();
        let disposal_refs = all_refs.clone();
        let disposal_attached = Cell::new(false);
        let disposal_key = match typing {
            ClassTyping::Structural => Some(class_name.clone()),
            ClassTyping::Nominal => None,
        };
        let disposal_services = Rc::downgrade(&services);
        let on_completed = move |t: &Rc<Type>| {
            if has_super_class_cycle(t) {
                if let Some(kind) = kind_weak.upgrade() {
                    kind.record_cycle(&cycle_class);
                }
            }
            // Once complete, dispose the class when everything it was
            // built from has become invalid. A class without references
            // has nothing to watch and stays alive.
            if !disposal_refs.is_empty() && !disposal_attached.replace(true) {
                let waiter = DisposalWaiter::new(disposal_refs.clone());
                let doomed = Rc::downgrade(t);
                let graph_services = disposal_services.clone();
                let auxiliary = disposal_key.clone();
                waiter.on_all_invalid(move || {
                    if let (Some(services), Some(class)) =
                        (graph_services.upgrade(), doomed.upgrade())
                    {
                        services.graph().remove_node(&class, auxiliary.as_deref());
                    }
                });
            }
        };

        let identifiable_preconditions = match typing {
            ClassTyping::Nominal => Vec::new(),
            ClassTyping::Structural => all_refs.clone(),
        };
        ty.define_initialization(
            InitializationPlan::new(on_identifiable)
                .identifiable_after(identifiable_preconditions)
                .completed_after(all_refs.clone())
                .invalidated_by(all_refs)
                .on_completed(on_completed),
        );

        let initializer = TypeInitializer::new(&services, ty);
        if typing == ClassTyping::Structural {
            let auxiliary = class_name.clone();
            initializer.set_auxiliary_key(Box::new(move |_| Some(auxiliary.clone())));
        }
        let rule_services = services.clone();
        initializer.on_ready(move |final_ty, _collapsed| {
            register_declared_rules(&rule_services, "class declaration", &declaration_rules, final_ty);
        });
        initializer.start();
        initializer
    }
}

/// Compute the shape-derived identifier of a structural class. References
/// without a finalized identifier, e.g. members of an initialization
/// cycle, contribute their name instead; equal shapes still produce equal
/// identifiers.
fn calculate_structural_identifier(ty: &Rc<Type>) -> String {
    let data = ty
        .body()
        .as_class()
        .expect("structural identifiers are computed for classes");
    let part = |r: &Rc<TypeReference>| match r.get() {
        Some(t) => t.identifier().unwrap_or_else(|| t.name()),
        None => "?".to_string(),
    };
    let supers: Vec<String> = data.super_classes.iter().map(&part).collect();
    let fields: Vec<String> = data
        .fields
        .iter()
        .map(|(name, r)| format!("{name}:{}", part(r)))
        .collect();
    let methods: Vec<String> = data.methods.iter().map(&part).collect();
    format!(
        "class-{}<{}>{{{}}}[{}]",
        data.class_name,
        supers.join(","),
        fields.join(","),
        methods.join(",")
    )
}

/// Registers the owning class in the sub-class index of every super-class
/// its reference resolves to.
struct SubClassRegistrar {
    class: Weak<Type>,
}

impl TypeReferenceListener for SubClassRegistrar {
    fn on_type_reference_resolved(&self, _reference: &Rc<TypeReference>, resolved: &Rc<Type>) {
        let Some(class) = self.class.upgrade() else {
            return;
        };
        if let TypeBody::Class(super_data) = resolved.body() {
            let mut sub_classes = super_data.sub_classes.borrow_mut();
            let already = sub_classes
                .iter()
                .any(|w| w.upgrade().is_some_and(|t| Rc::ptr_eq(&t, &class)));
            if !already {
                sub_classes.push(Rc::downgrade(&class));
            }
        }
    }
}

/// Reports inheritance cycles recorded by the kind at the end of a
/// validation run, attached to the run's root node.
struct InheritanceCycleValidation {
    kind: Weak<ClassKind>,
}

impl ValidationRule for InheritanceCycleValidation {
    fn validate(&self, _node: &LanguageNode, _services: &TypeSystem) -> Vec<ValidationProblem> {
        Vec::new()
    }

    fn after_validation(
        &self,
        root: &LanguageNode,
        _services: &TypeSystem,
    ) -> Vec<ValidationProblem> {
        let Some(kind) = self.kind.upgrade() else {
            return Vec::new();
        };
        let drained: Vec<String> = std::mem::take(&mut *kind.cycle_errors.borrow_mut());
        drained
            .into_iter()
            .map(|message| ValidationProblem::new(root.clone(), Severity::Error, message))
            .collect()
    }
}
