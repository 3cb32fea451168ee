//! Unit tests for the engine. The concrete kinds live in `typekit-kinds`;
//! these tests build minimal primitive-shaped nodes by hand to exercise
//! the graph, the state machine, the registries and the relational
//! services in isolation.

mod graph_tests;
mod relation_tests;
mod state_tests;
mod waiter_tests;

use std::rc::Rc;

use crate::body::{PrimitiveData, TypeBody};
use crate::initializer::TypeInitializer;
use crate::language::{LanguageNode, LanguageService, UnclassifiedLanguage};
use crate::node::{InitializationPlan, Type};
use crate::services::TypeSystem;

pub(crate) fn test_services() -> Rc<TypeSystem> {
    TypeSystem::new(Rc::new(UnclassifiedLanguage))
}

/// Build and install a primitive-shaped node; initializes in one frame.
pub(crate) fn primitive(services: &Rc<TypeSystem>, name: &str) -> Rc<Type> {
    let ty = Type::new(TypeBody::Primitive(PrimitiveData {
        primitive_name: name.to_string(),
    }));
    let identifier = name.to_string();
    ty.define_initialization(InitializationPlan::new(move |t: &Rc<Type>| {
        t.set_identifier(identifier.clone());
    }));
    let initializer = TypeInitializer::new(services, ty);
    initializer.start();
    initializer
        .get_type_final()
        .expect("a primitive node initializes in the same call frame")
}

/// A host node with a classification key, for rule dispatch tests.
pub(crate) struct TestNode {
    pub key: String,
    pub text: String,
}

pub(crate) fn test_node(key: &str, text: &str) -> LanguageNode {
    Rc::new(TestNode {
        key: key.to_string(),
        text: text.to_string(),
    })
}

/// Adapter classifying [`TestNode`]s by their key, with a fixed super-key
/// table.
pub(crate) struct KeyedLanguage {
    pub super_keys: Vec<(String, Vec<String>)>,
}

impl KeyedLanguage {
    pub(crate) fn new() -> Self {
        Self {
            super_keys: Vec::new(),
        }
    }

    pub(crate) fn with_super_key(mut self, key: &str, super_key: &str) -> Self {
        self.super_keys
            .push((key.to_string(), vec![super_key.to_string()]));
        self
    }
}

impl LanguageService for KeyedLanguage {
    fn is_language_node(&self, value: &LanguageNode) -> bool {
        value.downcast_ref::<TestNode>().is_some()
    }

    fn language_node_key(&self, node: &LanguageNode) -> Option<String> {
        node.downcast_ref::<TestNode>().map(|n| n.key.clone())
    }

    fn all_super_keys(&self, key: &str) -> Vec<String> {
        self.super_keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, supers)| supers.clone())
            .unwrap_or_default()
    }
}
