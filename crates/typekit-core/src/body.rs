//! Per-kind payloads of type nodes.
//!
//! The engine ships a closed set of kind payloads: primitives, classes, the
//! top class, functions, and custom types. Host extensibility flows through
//! the custom kind, whose behavior is driven by its property values and the
//! hooks configured on its kind.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::graph::ConversionMode;
use crate::node::Type;
use crate::reference::TypeReference;
use crate::services::TypeSystem;

pub const PRIMITIVE_KIND_NAME: &str = "primitive";
pub const CLASS_KIND_NAME: &str = "class";
pub const TOP_CLASS_KIND_NAME: &str = "top-class";
pub const FUNCTION_KIND_NAME: &str = "function";

/// Sentinel for functions declared without a name, e.g. lambdas.
pub const NO_FUNCTION_NAME: &str = "";

/// Whether classes are compared by shape or by identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassTyping {
    Structural,
    Nominal,
}

/// How the types of corresponding fields or parameters are compared when
/// checking a structural sub-type relation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldCheckingStrategy {
    EqualType,
    SubType,
    AssignableType,
}

pub enum TypeBody {
    Primitive(PrimitiveData),
    Class(ClassData),
    TopClass(TopClassData),
    Function(FunctionData),
    Custom(CustomData),
}

pub struct PrimitiveData {
    pub primitive_name: String,
}

pub struct ClassData {
    pub class_name: String,
    pub typing: ClassTyping,
    pub field_checking: FieldCheckingStrategy,
    /// Declared super-classes, in declaration order, resolved lazily.
    pub super_classes: Vec<Rc<TypeReference>>,
    /// Reverse index of classes that declared this class as a super-class.
    pub sub_classes: RefCell<Vec<Weak<Type>>>,
    /// Own fields in declaration order; names are unique within a class.
    pub fields: IndexMap<String, Rc<TypeReference>>,
    /// Function-typed members.
    pub methods: Vec<Rc<TypeReference>>,
}

pub struct TopClassData {
    pub name: String,
}

pub struct ParameterData {
    pub name: String,
    pub ty: Rc<TypeReference>,
}

pub struct FunctionData {
    /// May be [`NO_FUNCTION_NAME`].
    pub function_name: String,
    pub input_parameters: Vec<ParameterData>,
    pub output_parameter: Option<ParameterData>,
    /// How parameter types are compared in sub-type checks.
    pub parameter_checking: FieldCheckingStrategy,
}

/// Property values of a custom type. Identifier computation and structural
/// comparison recurse over this shape.
pub enum CustomPropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Resolved to the referenced type's identifier.
    Type(Rc<TypeReference>),
    /// Order-preserving sequence.
    List(Vec<CustomPropertyValue>),
    /// Order-insensitive collection.
    Set(Vec<CustomPropertyValue>),
    /// Key-value mapping, compared and serialized sorted by key.
    Map(IndexMap<String, CustomPropertyValue>),
    /// Nested object, keys sorted lexicographically for identity.
    Object(IndexMap<String, CustomPropertyValue>),
    Absent,
}

pub type CustomProperties = IndexMap<String, CustomPropertyValue>;

/// Relationship hooks of a custom kind, consulted by the relational
/// services for every type of that kind. A hook returning `None` defers to
/// the default analysis.
#[derive(Default)]
pub struct CustomTypeHooks {
    pub is_sub_type_of: Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>) -> Option<bool>>>,
    pub is_super_type_of: Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>) -> Option<bool>>>,
    pub is_convertible_to:
        Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>, ConversionMode) -> Option<bool>>>,
    pub is_convertible_from:
        Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>, ConversionMode) -> Option<bool>>>,
}

pub struct CustomData {
    /// The name of the custom kind this type belongs to.
    pub kind_name: String,
    pub hooks: Rc<CustomTypeHooks>,
    pub properties: CustomProperties,
    pub type_name: String,
    pub user_representation: Option<String>,
}

impl TypeBody {
    pub fn kind_name(&self) -> &str {
        match self {
            TypeBody::Primitive(_) => PRIMITIVE_KIND_NAME,
            TypeBody::Class(_) => CLASS_KIND_NAME,
            TypeBody::TopClass(_) => TOP_CLASS_KIND_NAME,
            TypeBody::Function(_) => FUNCTION_KIND_NAME,
            TypeBody::Custom(data) => &data.kind_name,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            TypeBody::Primitive(data) => data.primitive_name.clone(),
            TypeBody::Class(data) => data.class_name.clone(),
            TypeBody::TopClass(data) => data.name.clone(),
            TypeBody::Function(data) => data.function_name.clone(),
            TypeBody::Custom(data) => data.type_name.clone(),
        }
    }

    pub fn user_representation(&self) -> String {
        match self {
            TypeBody::Primitive(data) => data.primitive_name.clone(),
            TypeBody::TopClass(data) => data.name.clone(),
            TypeBody::Class(data) => data.user_representation(),
            TypeBody::Function(data) => data.user_representation(),
            TypeBody::Custom(data) => data
                .user_representation
                .clone()
                .unwrap_or_else(|| data.type_name.clone()),
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match self {
            TypeBody::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match self {
            TypeBody::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomData> {
        match self {
            TypeBody::Custom(data) => Some(data),
            _ => None,
        }
    }
}

fn reference_name(reference: &Rc<TypeReference>) -> String {
    match reference.get() {
        Some(ty) => ty.name(),
        None => "?".to_string(),
    }
}

impl ClassData {
    pub fn user_representation(&self) -> String {
        match self.typing {
            ClassTyping::Nominal => self.class_name.clone(),
            ClassTyping::Structural => {
                let fields: Vec<String> = self
                    .fields
                    .iter()
                    .map(|(name, ty)| format!("{name}: {}", reference_name(ty)))
                    .collect();
                format!("{} {{ {} }}", self.class_name, fields.join(", "))
            }
        }
    }

    /// Directly declared super-classes that are resolved by now.
    pub fn resolved_super_classes(&self) -> Vec<Rc<Type>> {
        self.super_classes
            .iter()
            .filter_map(|r| r.get())
            .collect()
    }

    pub fn resolved_sub_classes(&self) -> Vec<Rc<Type>> {
        self.sub_classes
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }
}

impl FunctionData {
    pub fn user_representation(&self) -> String {
        let params: Vec<String> = self
            .input_parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, reference_name(&p.ty)))
            .collect();
        let signature = format!("{}({})", self.function_name, params.join(", "));
        match &self.output_parameter {
            Some(output) => format!("{signature} => {}", reference_name(&output.ty)),
            None => signature,
        }
    }
}

// =============================================================================
// Class hierarchy helpers
// =============================================================================

/// All super-classes of `class_ty`, directly declared or transitive. Cycles
/// in the hierarchy are tolerated; every class is visited once.
pub fn all_super_classes(class_ty: &Rc<Type>, transitive: bool) -> Vec<Rc<Type>> {
    let mut result: Vec<Rc<Type>> = Vec::new();
    let mut queue: Vec<Rc<Type>> = vec![class_ty.clone()];
    let mut visited = vec![crate::graph::thin_ptr(class_ty)];
    while let Some(current) = queue.pop() {
        let Some(data) = current.body().as_class() else {
            continue;
        };
        for super_ty in data.resolved_super_classes() {
            let ptr = crate::graph::thin_ptr(&super_ty);
            if visited.contains(&ptr) {
                continue;
            }
            visited.push(ptr);
            result.push(super_ty.clone());
            if transitive {
                queue.push(super_ty);
            }
        }
    }
    result
}

/// All sub-classes of `class_ty`, from the reverse index maintained while
/// sub-classes resolve their super-class references.
pub fn all_sub_classes(class_ty: &Rc<Type>, transitive: bool) -> Vec<Rc<Type>> {
    let mut result: Vec<Rc<Type>> = Vec::new();
    let mut queue: Vec<Rc<Type>> = vec![class_ty.clone()];
    let mut visited = vec![crate::graph::thin_ptr(class_ty)];
    while let Some(current) = queue.pop() {
        let Some(data) = current.body().as_class() else {
            continue;
        };
        for sub_ty in data.resolved_sub_classes() {
            let ptr = crate::graph::thin_ptr(&sub_ty);
            if visited.contains(&ptr) {
                continue;
            }
            visited.push(ptr);
            result.push(sub_ty.clone());
            if transitive {
                queue.push(sub_ty);
            }
        }
    }
    result
}

/// The fields of a class including inherited ones. A field declared in a
/// sub-class shadows a super-class field with the same name.
pub fn fields_including_inherited(class_ty: &Rc<Type>) -> IndexMap<String, Rc<TypeReference>> {
    let mut result: IndexMap<String, Rc<TypeReference>> = IndexMap::new();
    if let Some(data) = class_ty.body().as_class() {
        for (name, reference) in &data.fields {
            result.insert(name.clone(), reference.clone());
        }
        for super_ty in all_super_classes(class_ty, true) {
            if let Some(super_data) = super_ty.body().as_class() {
                for (name, reference) in &super_data.fields {
                    result.entry(name.clone()).or_insert_with(|| reference.clone());
                }
            }
        }
    }
    result
}

/// Whether the super-class hierarchy starting at `class_ty` contains a
/// cycle, i.e. the class transitively names itself as a super-class.
pub fn has_super_class_cycle(class_ty: &Rc<Type>) -> bool {
    let mut queue: Vec<Rc<Type>> = match class_ty.body().as_class() {
        Some(data) => data.resolved_super_classes(),
        None => return false,
    };
    let mut visited: Vec<usize> = Vec::new();
    while let Some(current) = queue.pop() {
        if Rc::ptr_eq(&current, class_ty) {
            return true;
        }
        let ptr = crate::graph::thin_ptr(&current);
        if visited.contains(&ptr) {
            continue;
        }
        visited.push(ptr);
        if let Some(data) = current.body().as_class() {
            queue.extend(data.resolved_super_classes());
        }
    }
    false
}

/// Collect every type reference occurring in a custom property tree.
pub fn collect_custom_property_references(
    value: &CustomPropertyValue,
    into: &mut Vec<Rc<TypeReference>>,
) {
    match value {
        CustomPropertyValue::Type(reference) => into.push(reference.clone()),
        CustomPropertyValue::List(items) | CustomPropertyValue::Set(items) => {
            for item in items {
                collect_custom_property_references(item, into);
            }
        }
        CustomPropertyValue::Map(entries) | CustomPropertyValue::Object(entries) => {
            for item in entries.values() {
                collect_custom_property_references(item, into);
            }
        }
        CustomPropertyValue::Str(_)
        | CustomPropertyValue::Int(_)
        | CustomPropertyValue::Float(_)
        | CustomPropertyValue::Bool(_)
        | CustomPropertyValue::Absent => {}
    }
}
