//! Custom kinds.
//!
//! A custom kind lets a host define its own family of types through a
//! properties schema: primitives, type descriptors, sequences, sets,
//! mappings and nested objects. The default identifier serializes the
//! property tree deterministically, so equal property graphs collapse
//! into one node; hosts may override the formula as long as equal inputs
//! keep producing equal, stable identifiers. Relationship hooks wire a
//! fresh custom type into the sub-type and conversion services.

use std::rc::Rc;

use indexmap::IndexMap;

use typekit_core::{
    ConversionMode, CustomData, CustomProperties, CustomPropertyValue, CustomTypeHooks,
    InitializationPlan, Kind, LanguageNode, RuleOptions, Type, TypeBody, TypeDescriptor,
    TypeInitializer, TypeReference, TypeSystem, collect_custom_property_references,
};

use crate::rules::{DeclaredRule, NodeMatcher, register_declared_rules};

/// Host-facing property values; type descriptors are turned into
/// references when the type is created.
pub enum CustomPropertyInput {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Type(TypeDescriptor),
    List(Vec<CustomPropertyInput>),
    Set(Vec<CustomPropertyInput>),
    Map(IndexMap<String, CustomPropertyInput>),
    Object(IndexMap<String, CustomPropertyInput>),
    Absent,
}

impl From<&str> for CustomPropertyInput {
    fn from(value: &str) -> Self {
        CustomPropertyInput::Str(value.to_string())
    }
}

impl From<i64> for CustomPropertyInput {
    fn from(value: i64) -> Self {
        CustomPropertyInput::Int(value)
    }
}

impl From<bool> for CustomPropertyInput {
    fn from(value: bool) -> Self {
        CustomPropertyInput::Bool(value)
    }
}

impl From<TypeDescriptor> for CustomPropertyInput {
    fn from(value: TypeDescriptor) -> Self {
        CustomPropertyInput::Type(value)
    }
}

pub struct CustomKindOptions {
    /// Unique name of this kind, also the default type name.
    pub name: String,
    /// Override for the identifier formula. Must map equal property graphs
    /// to equal identifiers that stay stable for the kind's lifetime.
    pub calculate_identifier: Option<Rc<dyn Fn(&TypeSystem, &CustomProperties) -> String>>,
    pub calculate_name: Option<Rc<dyn Fn(&CustomProperties) -> String>>,
    pub calculate_user_representation: Option<Rc<dyn Fn(&CustomProperties) -> String>>,
    /// Existing types that become sub-types of each new custom type.
    pub get_sub_types_of_new_custom_type: Option<Rc<dyn Fn(&CustomProperties) -> Vec<TypeDescriptor>>>,
    /// Existing types that become super-types of each new custom type.
    pub get_super_types_of_new_custom_type:
        Option<Rc<dyn Fn(&CustomProperties) -> Vec<TypeDescriptor>>>,
    pub get_new_custom_type_implicitly_convertible_to_types:
        Option<Rc<dyn Fn(&CustomProperties) -> Vec<TypeDescriptor>>>,
    pub get_types_implicitly_convertible_to_new_custom_type:
        Option<Rc<dyn Fn(&CustomProperties) -> Vec<TypeDescriptor>>>,
    /// Predicate hooks consulted by the relational services.
    pub is_new_custom_type_sub_type_of:
        Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>) -> Option<bool>>>,
    pub is_new_custom_type_super_type_of:
        Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>) -> Option<bool>>>,
    pub is_new_custom_type_convertible_to_type:
        Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>, ConversionMode) -> Option<bool>>>,
    pub is_type_convertible_to_new_custom_type:
        Option<Box<dyn Fn(&TypeSystem, &Rc<Type>, &Rc<Type>, ConversionMode) -> Option<bool>>>,
}

impl CustomKindOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calculate_identifier: None,
            calculate_name: None,
            calculate_user_representation: None,
            get_sub_types_of_new_custom_type: None,
            get_super_types_of_new_custom_type: None,
            get_new_custom_type_implicitly_convertible_to_types: None,
            get_types_implicitly_convertible_to_new_custom_type: None,
            is_new_custom_type_sub_type_of: None,
            is_new_custom_type_super_type_of: None,
            is_new_custom_type_convertible_to_type: None,
            is_type_convertible_to_new_custom_type: None,
        }
    }
}

pub struct CustomTypeDetails {
    pub properties: IndexMap<String, CustomPropertyInput>,
    /// Override for the name of this one type.
    pub type_name: Option<String>,
}

impl CustomTypeDetails {
    pub fn new() -> Self {
        Self {
            properties: IndexMap::new(),
            type_name: None,
        }
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<CustomPropertyInput>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }
}

impl Default for CustomTypeDetails {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CustomKind {
    services: Rc<TypeSystem>,
    options: CustomKindOptions,
    hooks: Rc<CustomTypeHooks>,
}

impl CustomKind {
    pub fn new(services: &Rc<TypeSystem>, mut options: CustomKindOptions) -> Rc<Self> {
        let hooks = Rc::new(CustomTypeHooks {
            is_sub_type_of: options.is_new_custom_type_sub_type_of.take(),
            is_super_type_of: options.is_new_custom_type_super_type_of.take(),
            is_convertible_to: options.is_new_custom_type_convertible_to_type.take(),
            is_convertible_from: options.is_type_convertible_to_new_custom_type.take(),
        });
        let kind = Rc::new(Self {
            services: services.clone(),
            options,
            hooks,
        });
        services.register_kind(kind.clone());
        kind
    }

    pub fn create(self: &Rc<Self>, details: CustomTypeDetails) -> CustomTypeBuilder {
        CustomTypeBuilder {
            kind: self.clone(),
            details,
            inference_rules: Vec::new(),
        }
    }

    /// The default formula over the resolved property tree; see
    /// [`serialize_custom_properties`].
    pub fn calculate_identifier(&self, services: &TypeSystem, properties: &CustomProperties) -> String {
        match &self.options.calculate_identifier {
            Some(custom) => custom(services, properties),
            None => format!(
                "custom-{}-{}",
                self.options.name,
                serialize_custom_properties(properties)
            ),
        }
    }
}

impl Kind for CustomKind {
    fn kind_name(&self) -> &str {
        &self.options.name
    }
}

pub struct CustomTypeBuilder {
    kind: Rc<CustomKind>,
    details: CustomTypeDetails,
    inference_rules: Vec<DeclaredRule>,
}

impl CustomTypeBuilder {
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
        let CustomTypeBuilder {
            kind,
            details,
            inference_rules,
        } = self;
        let services = kind.services.clone();

        let properties = lower_properties(&services, details.properties);
        let mut references: Vec<Rc<TypeReference>> = Vec::new();
        for value in properties.values() {
            collect_custom_property_references(value, &mut references);
        }

        let type_name = details
            .type_name
            .or_else(|| {
                kind.options
                    .calculate_name
                    .as_ref()
                    .map(|calculate| calculate(&properties))
            })
            .unwrap_or_else(|| kind.options.name.clone());
        let user_representation = kind
            .options
            .calculate_user_representation
            .as_ref()
            .map(|calculate| calculate(&properties));

        let ty = Type::new(TypeBody::Custom(CustomData {
            kind_name: kind.options.name.clone(),
            hooks: kind.hooks.clone(),
            properties,
            type_name,
            user_representation,
        }));

        let identifier_kind = kind.clone();
        let identifier_services = services.clone();
        ty.define_initialization(
            InitializationPlan::new(move |t: &Rc<Type>| {
                let data = t
                    .body()
                    .as_custom()
                    .expect("custom identifiers are computed for custom types");
                let identifier =
                    identifier_kind.calculate_identifier(&identifier_services, &data.properties);
                t.set_identifier(identifier);
            })
            .identifiable_after(references.clone())
            .completed_after(references.clone())
            .invalidated_by(references),
        );

        let initializer = TypeInitializer::new(&services, ty);
        let ready_kind = kind.clone();
        let ready_services = services.clone();
        initializer.on_ready(move |final_ty, collapsed| {
            register_declared_rules(&ready_services, "custom type", &inference_rules, final_ty);
            if !collapsed {
                ready_kind.wire_relationships(final_ty);
            }
        });
        initializer.start();
        initializer
    }
}

impl CustomKind {
    /// Apply the relationship list hooks to a freshly installed type.
    fn wire_relationships(&self, ty: &Rc<Type>) {
        let Some(data) = ty.body().as_custom() else {
            return;
        };
        let resolve_all = |descriptors: Vec<TypeDescriptor>| -> Vec<Rc<Type>> {
            descriptors
                .into_iter()
                .filter_map(|d| self.services.try_to_resolve(&d))
                .collect()
        };
        if let Some(get) = &self.options.get_sub_types_of_new_custom_type {
            for sub in resolve_all(get(&data.properties)) {
                let _ = self.services.mark_as_sub_type(&sub, ty, false);
            }
        }
        if let Some(get) = &self.options.get_super_types_of_new_custom_type {
            for superior in resolve_all(get(&data.properties)) {
                let _ = self.services.mark_as_sub_type(ty, &superior, false);
            }
        }
        if let Some(get) = &self.options.get_new_custom_type_implicitly_convertible_to_types {
            for target in resolve_all(get(&data.properties)) {
                let _ = self
                    .services
                    .mark_as_convertible(ty, &target, ConversionMode::ImplicitExplicit);
            }
        }
        if let Some(get) = &self.options.get_types_implicitly_convertible_to_new_custom_type {
            for source in resolve_all(get(&data.properties)) {
                let _ = self
                    .services
                    .mark_as_convertible(&source, ty, ConversionMode::ImplicitExplicit);
            }
        }
    }
}

fn lower_properties(
    services: &Rc<TypeSystem>,
    inputs: IndexMap<String, CustomPropertyInput>,
) -> CustomProperties {
    inputs
        .into_iter()
        .map(|(key, value)| (key, lower_value(services, value)))
        .collect()
}

fn lower_value(services: &Rc<TypeSystem>, input: CustomPropertyInput) -> CustomPropertyValue {
    match input {
        CustomPropertyInput::Str(v) => CustomPropertyValue::Str(v),
        CustomPropertyInput::Int(v) => CustomPropertyValue::Int(v),
        CustomPropertyInput::Float(v) => CustomPropertyValue::Float(v),
        CustomPropertyInput::Bool(v) => CustomPropertyValue::Bool(v),
        CustomPropertyInput::Absent => CustomPropertyValue::Absent,
        CustomPropertyInput::Type(descriptor) => {
            CustomPropertyValue::Type(services.create_reference(descriptor))
        }
        CustomPropertyInput::List(items) => CustomPropertyValue::List(
            items.into_iter().map(|i| lower_value(services, i)).collect(),
        ),
        CustomPropertyInput::Set(items) => CustomPropertyValue::Set(
            items.into_iter().map(|i| lower_value(services, i)).collect(),
        ),
        CustomPropertyInput::Map(entries) => CustomPropertyValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, lower_value(services, v)))
                .collect(),
        ),
        CustomPropertyInput::Object(entries) => CustomPropertyValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, lower_value(services, v)))
                .collect(),
        ),
    }
}

/// The default serialization of a property tree:
/// - objects as `{key:value,…}` with keys sorted lexicographically
/// - lists as `[v0,v1,…]` preserving order
/// - sets as `(v0,v1,…)` sorted lexicographically after serialization
/// - mappings as `{k0=v0,k1=v1,…}` sorted by key
/// - type references as the referenced type's identifier
/// - primitives in their string form, absent values as `undefined`
pub fn serialize_custom_properties(properties: &CustomProperties) -> String {
    serialize_entries(properties, ':')
}

fn serialize_entries(entries: &CustomProperties, separator: char) -> String {
    let mut parts: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{key}{separator}{}", serialize_value(value)))
        .collect();
    parts.sort();
    format!("{{{}}}", parts.join(","))
}

fn serialize_value(value: &CustomPropertyValue) -> String {
    match value {
        CustomPropertyValue::Str(v) => v.clone(),
        CustomPropertyValue::Int(v) => v.to_string(),
        CustomPropertyValue::Float(v) => v.to_string(),
        CustomPropertyValue::Bool(v) => v.to_string(),
        CustomPropertyValue::Absent => "undefined".to_string(),
        CustomPropertyValue::Type(reference) => match reference.get() {
            Some(ty) => ty.identifier().unwrap_or_else(|| ty.name()),
            None => "?".to_string(),
        },
        CustomPropertyValue::List(items) => {
            let parts: Vec<String> = items.iter().map(serialize_value).collect();
            format!("[{}]", parts.join(","))
        }
        CustomPropertyValue::Set(items) => {
            let mut parts: Vec<String> = items.iter().map(serialize_value).collect();
            parts.sort();
            format!("({})", parts.join(","))
        }
        CustomPropertyValue::Map(entries) => serialize_entries(entries, '='),
        CustomPropertyValue::Object(entries) => serialize_entries(entries, ':'),
    }
}
