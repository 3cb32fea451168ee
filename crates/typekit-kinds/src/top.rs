//! The top-class kind: the singleton super-type of every class.

use std::rc::Rc;

use typekit_core::{
    InitializationPlan, Kind, LanguageNode, RuleOptions, TOP_CLASS_KIND_NAME, TopClassData, Type,
    TypeBody, TypeInitializer, TypeSystem,
};

use crate::rules::{DeclaredRule, NodeMatcher, register_declared_rules};

pub struct TopClassKindOptions {
    /// The user-facing name of the top class.
    pub name: String,
}

impl Default for TopClassKindOptions {
    fn default() -> Self {
        Self {
            name: "any".to_string(),
        }
    }
}

pub struct TopClassKind {
    services: Rc<TypeSystem>,
    options: TopClassKindOptions,
}

impl TopClassKind {
    pub fn new(services: &Rc<TypeSystem>, options: TopClassKindOptions) -> Rc<Self> {
        let kind = Rc::new(Self {
            services: services.clone(),
            options,
        });
        services.register_kind(kind.clone());
        kind
    }

    pub fn create(self: &Rc<Self>) -> TopClassTypeBuilder {
        TopClassTypeBuilder {
            kind: self.clone(),
            inference_rules: Vec::new(),
        }
    }

    pub fn calculate_identifier(&self) -> String {
        format!("top-class-{}", self.options.name)
    }
}

impl Kind for TopClassKind {
    fn kind_name(&self) -> &str {
        TOP_CLASS_KIND_NAME
    }
}

pub struct TopClassTypeBuilder {
    kind: Rc<TopClassKind>,
    inference_rules: Vec<DeclaredRule>,
}

impl TopClassTypeBuilder {
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
        let TopClassTypeBuilder {
            kind,
            inference_rules,
        } = self;
        let identifier = kind.calculate_identifier();
        let ty = Type::new(TypeBody::TopClass(TopClassData {
            name: kind.options.name.clone(),
        }));
        ty.define_initialization(InitializationPlan::new(move |t: &Rc<Type>| {
            t.set_identifier(identifier.clone());
        }));

        let initializer = TypeInitializer::new(&kind.services, ty);
        let services = kind.services.clone();
        initializer.on_ready(move |final_ty, _collapsed| {
            register_declared_rules(&services, "top-class", &inference_rules, final_ty);
        });
        initializer.start();
        initializer
    }
}
