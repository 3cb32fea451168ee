//! Host language adapter.
//!
//! The engine has no notion of the host's AST shape. Hosts hand in opaque
//! reference-counted values and implement [`LanguageService`] so the engine
//! can classify nodes by a string key and walk the host's key hierarchy for
//! rule dispatch.

use std::any::Any;
use std::rc::Rc;

/// An opaque host-owned language node.
///
/// The engine never looks inside; it only classifies nodes through the
/// [`LanguageService`] adapter and uses pointer identity for caching.
pub type LanguageNode = Rc<dyn Any>;

/// Stable identity of a language node, used as a cache key.
pub(crate) fn language_node_id(node: &LanguageNode) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

/// The adapter a host integrator implements to connect its language model.
pub trait LanguageService {
    /// Whether the given value is a node of the host language.
    fn is_language_node(&self, value: &LanguageNode) -> bool;

    /// The classification key of the given node, if the host assigns one.
    fn language_node_key(&self, node: &LanguageNode) -> Option<String>;

    /// All super-keys of `key`, most specific first. Rules registered for a
    /// super-key also apply to nodes classified under `key`.
    fn all_super_keys(&self, _key: &str) -> Vec<String> {
        Vec::new()
    }
}

/// A minimal adapter for hosts that do not classify their nodes.
///
/// Every value counts as a language node and no node carries a key, so only
/// rules registered without a language key ever apply.
#[derive(Default)]
pub struct UnclassifiedLanguage;

impl LanguageService for UnclassifiedLanguage {
    fn is_language_node(&self, _value: &LanguageNode) -> bool {
        true
    }

    fn language_node_key(&self, _node: &LanguageNode) -> Option<String> {
        None
    }
}
