//! Type descriptors.
//!
//! A descriptor is a value from which the engine can obtain a type node,
//! lazily if necessary. Descriptors do not own the type they denote.

use std::fmt;
use std::rc::Rc;

use crate::initializer::TypeInitializer;
use crate::language::LanguageNode;
use crate::node::Type;
use crate::reference::TypeReference;

#[derive(Clone)]
pub enum TypeDescriptor {
    /// An already-built type node.
    Type(Rc<Type>),
    /// A stable identifier, looked up in the graph.
    Identifier(String),
    /// A type initializer; resolves to the initialized (or deduplicated)
    /// node.
    Initializer(Rc<TypeInitializer>),
    /// Another reference; resolves to whatever that reference resolves to.
    Reference(Rc<TypeReference>),
    /// A host language node whose type is to be inferred.
    LanguageNode(LanguageNode),
    /// A zero-argument thunk producing any of the other variants.
    Thunk(Rc<dyn Fn() -> TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn thunk(f: impl Fn() -> TypeDescriptor + 'static) -> Self {
        TypeDescriptor::Thunk(Rc::new(f))
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Type(ty) => write!(f, "Descriptor::Type('{}')", ty.name()),
            TypeDescriptor::Identifier(id) => write!(f, "Descriptor::Identifier('{id}')"),
            TypeDescriptor::Initializer(_) => f.write_str("Descriptor::Initializer"),
            TypeDescriptor::Reference(r) => write!(f, "Descriptor::Reference({r:?})"),
            TypeDescriptor::LanguageNode(_) => f.write_str("Descriptor::LanguageNode"),
            TypeDescriptor::Thunk(_) => f.write_str("Descriptor::Thunk"),
        }
    }
}

impl From<Rc<Type>> for TypeDescriptor {
    fn from(ty: Rc<Type>) -> Self {
        TypeDescriptor::Type(ty)
    }
}

impl From<&Rc<Type>> for TypeDescriptor {
    fn from(ty: &Rc<Type>) -> Self {
        TypeDescriptor::Type(ty.clone())
    }
}

impl From<&str> for TypeDescriptor {
    fn from(identifier: &str) -> Self {
        TypeDescriptor::Identifier(identifier.to_string())
    }
}

impl From<String> for TypeDescriptor {
    fn from(identifier: String) -> Self {
        TypeDescriptor::Identifier(identifier)
    }
}

impl From<Rc<TypeInitializer>> for TypeDescriptor {
    fn from(initializer: Rc<TypeInitializer>) -> Self {
        TypeDescriptor::Initializer(initializer)
    }
}

impl From<&Rc<TypeInitializer>> for TypeDescriptor {
    fn from(initializer: &Rc<TypeInitializer>) -> Self {
        TypeDescriptor::Initializer(initializer.clone())
    }
}

impl From<Rc<TypeReference>> for TypeDescriptor {
    fn from(reference: Rc<TypeReference>) -> Self {
        TypeDescriptor::Reference(reference)
    }
}

impl From<&Rc<TypeReference>> for TypeDescriptor {
    fn from(reference: &Rc<TypeReference>) -> Self {
        TypeDescriptor::Reference(reference.clone())
    }
}
