//! Bundled services handle.
//!
//! Wires a [`TypeSystem`] together with one instance of every built-in
//! kind factory. Hosts that need differently configured kinds can assemble
//! their own bundle from the same pieces.

use std::rc::Rc;

use typekit_core::{LanguageService, TypeSystem};

use crate::class::{ClassKind, ClassKindOptions};
use crate::custom::{CustomKind, CustomKindOptions};
use crate::function::{FunctionKind, FunctionKindOptions};
use crate::operators::OperatorFactory;
use crate::primitive::PrimitiveKind;
use crate::top::{TopClassKind, TopClassKindOptions};

#[derive(Default)]
pub struct TypekitOptions {
    pub classes: ClassKindOptions,
    pub functions: FunctionKindOptions,
    pub top_class: TopClassKindOptions,
}

/// The ready-to-use engine: the services container plus the factories for
/// primitives, classes, the top class, functions and operators.
pub struct Typekit {
    pub services: Rc<TypeSystem>,
    pub primitives: Rc<PrimitiveKind>,
    pub classes: Rc<ClassKind>,
    pub top_classes: Rc<TopClassKind>,
    pub functions: Rc<FunctionKind>,
    pub operators: Rc<OperatorFactory>,
}

impl Typekit {
    pub fn new(language: Rc<dyn LanguageService>) -> Self {
        Self::with_options(language, TypekitOptions::default())
    }

    pub fn with_options(language: Rc<dyn LanguageService>, options: TypekitOptions) -> Self {
        let services = TypeSystem::new(language);
        let primitives = PrimitiveKind::new(&services);
        let classes = ClassKind::new(&services, options.classes);
        let top_classes = TopClassKind::new(&services, options.top_class);
        let functions = FunctionKind::new(&services, options.functions);
        let operators = OperatorFactory::new(&services);
        Self {
            services,
            primitives,
            classes,
            top_classes,
            functions,
            operators,
        }
    }

    /// Register an additional custom kind on this bundle's services.
    pub fn custom_kind(&self, options: CustomKindOptions) -> Rc<CustomKind> {
        CustomKind::new(&self.services, options)
    }
}
