//! Turning type descriptors into type nodes.

use std::fmt;
use std::rc::Rc;

use crate::descriptor::TypeDescriptor;
use crate::node::Type;
use crate::services::TypeSystem;

/// Failure of the strict [`TypeSystem::resolve`].
#[derive(Clone, Debug)]
pub enum ResolveError {
    /// The descriptor does not denote any locatable type.
    UnresolvedReference { description: String },
    /// The descriptor denotes a type that has not reached the state the
    /// operation requires.
    InvalidState { description: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnresolvedReference { description } => {
                write!(f, "Unresolved type reference: {description}")
            }
            ResolveError::InvalidState { description } => {
                write!(f, "Invalid type state: {description}")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

impl TypeSystem {
    /// Resolve a descriptor to a node if one is available right now. Never
    /// triggers inference; for language nodes only an inference-cache hit
    /// counts, because a failed inference is not a stable outcome.
    pub fn try_to_resolve(&self, descriptor: &TypeDescriptor) -> Option<Rc<Type>> {
        match descriptor {
            TypeDescriptor::Type(ty) => Some(ty.clone()),
            TypeDescriptor::Identifier(identifier) => self.graph().get_type(identifier),
            TypeDescriptor::Initializer(initializer) => Some(initializer.current_type()),
            TypeDescriptor::Reference(reference) => reference.get(),
            TypeDescriptor::LanguageNode(node) => self.cached_inferred_type(node),
            TypeDescriptor::Thunk(thunk) => self.try_to_resolve(&thunk()),
        }
    }

    /// Resolve a descriptor to its final node or fail with a descriptive
    /// error. Language nodes are fully inferred here.
    pub fn resolve(&self, descriptor: &TypeDescriptor) -> Result<Rc<Type>, ResolveError> {
        match descriptor {
            TypeDescriptor::Type(ty) => Ok(ty.clone()),
            TypeDescriptor::Identifier(identifier) => {
                self.graph()
                    .get_type(identifier)
                    .ok_or_else(|| ResolveError::UnresolvedReference {
                        description: format!(
                            "no type is registered under the identifier '{identifier}'"
                        ),
                    })
            }
            TypeDescriptor::Initializer(initializer) => {
                initializer
                    .get_type_final()
                    .ok_or_else(|| ResolveError::InvalidState {
                        description: format!(
                            "the type '{}' has not become identifiable yet",
                            initializer.get_type_initial().name()
                        ),
                    })
            }
            TypeDescriptor::Reference(reference) => {
                reference
                    .get()
                    .ok_or_else(|| ResolveError::UnresolvedReference {
                        description: format!("the reference {reference:?} is not resolved"),
                    })
            }
            TypeDescriptor::LanguageNode(node) => {
                self.infer_type(node)
                    .map_err(|problems| ResolveError::UnresolvedReference {
                        description: format!(
                            "type inference for the language node failed with {} problem(s)",
                            problems.len()
                        ),
                    })
            }
            TypeDescriptor::Thunk(thunk) => self.resolve(&thunk()),
        }
    }
}
