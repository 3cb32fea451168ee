//! The primitive kind.
//!
//! Primitives are atomic named types; their identifier is their name, so
//! creating the same primitive twice collapses into one node. Inference
//! rules declared on the builder are registered once the node survives
//! deduplication, bound to it.

use std::rc::Rc;

use typekit_core::{
    InitializationPlan, Kind, LanguageNode, PRIMITIVE_KIND_NAME, PrimitiveData, RuleOptions, Type,
    TypeBody, TypeInitializer, TypeSystem,
};

use crate::rules::{DeclaredRule, NodeMatcher, register_declared_rules};

pub struct PrimitiveTypeDetails {
    pub primitive_name: String,
}

impl PrimitiveTypeDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            primitive_name: name.into(),
        }
    }
}

pub struct PrimitiveKind {
    services: Rc<TypeSystem>,
}

impl PrimitiveKind {
    pub fn new(services: &Rc<TypeSystem>) -> Rc<Self> {
        let kind = Rc::new(Self {
            services: services.clone(),
        });
        services.register_kind(kind.clone());
        kind
    }

    pub fn create(self: &Rc<Self>, details: PrimitiveTypeDetails) -> PrimitiveTypeBuilder {
        PrimitiveTypeBuilder {
            kind: self.clone(),
            details,
            inference_rules: Vec::new(),
        }
    }

    /// Stable under repeated calls with equal details; the deduplication
    /// key of the kind.
    pub fn calculate_identifier(&self, details: &PrimitiveTypeDetails) -> String {
        details.primitive_name.clone()
    }

    /// Shorthand for looking up an already-created primitive.
    pub fn get(&self, name: &str) -> Option<Rc<Type>> {
        self.services.graph().get_type(name)
    }
}

impl Kind for PrimitiveKind {
    fn kind_name(&self) -> &str {
        PRIMITIVE_KIND_NAME
    }
}

pub struct PrimitiveTypeBuilder {
    kind: Rc<PrimitiveKind>,
    details: PrimitiveTypeDetails,
    inference_rules: Vec<DeclaredRule>,
}

impl PrimitiveTypeBuilder {
    /// Infer this primitive for every node accepted by the matcher,
    /// dispatched under the given rule options.
    pub fn inference_rule(
        mut self,
        options: RuleOptions,
        matches: impl Fn(&LanguageNode) -> bool + 'static,
    ) -> Self {
        self.inference_rules.push(DeclaredRule {
            options,
            matches: Rc::new(matches) as NodeMatcher,
        });
        self
    }

    pub fn finish(self) -> Rc<TypeInitializer> {
        let PrimitiveTypeBuilder {
            kind,
            details,
            inference_rules,
        } = self;
        let identifier = kind.calculate_identifier(&details);
        let ty = Type::new(TypeBody::Primitive(PrimitiveData {
            primitive_name: details.primitive_name,
        }));
        ty.define_initialization(InitializationPlan::new(move |t: &Rc<Type>| {
            t.set_identifier(identifier.clone());
        }));

        let initializer = TypeInitializer::new(&kind.services, ty);
        let services = kind.services.clone();
        initializer.on_ready(move |final_ty, _collapsed| {
            register_declared_rules(&services, "primitive", &inference_rules, final_ty);
        });
        initializer.start();
        initializer
    }
}
