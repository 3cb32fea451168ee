//! Type kinds for the typekit engine.
//!
//! Factories for the built-in type families on top of `typekit-core`:
//! - `primitive` - Atomic named types
//! - `class` - Structural or nominal classes with fields, methods and
//!   super-classes
//! - `top` - The singleton super-type of every class
//! - `function` - Function types, overload groups and call resolution
//! - `operators` - Operators as name-prefixed function types
//! - `custom` - Host-defined kinds driven by a properties schema
//!
//! Every factory offers a fluent `create(details)…finish()` builder that
//! returns a `TypeInitializer`; the initializer drives the fresh node
//! through its states and collapses it into an already-present equivalent
//! type when the identifiers match.

pub mod class;
pub mod custom;
pub mod factory;
pub mod function;
pub mod function_calls;
pub mod function_validation;
pub mod operators;
pub mod primitive;
pub mod rules;
pub mod top;

// Re-export key types
pub use class::{
    ClassKind, ClassKindOptions, ClassTypeBuilder, ClassTypeDetails, FieldDetails,
    InheritanceCyclePolicy,
};
pub use custom::{
    CustomKind, CustomKindOptions, CustomPropertyInput, CustomTypeBuilder, CustomTypeDetails,
    serialize_custom_properties,
};
pub use factory::{Typekit, TypekitOptions};
pub use function::{
    ArgumentsValidationPolicy, CallMatch, CallRuleDetails, FunctionKind, FunctionKindOptions,
    FunctionTypeBuilder, FunctionTypeDetails, OutputTypePolicy, OverloadGroup, ParameterDetails,
};
pub use function_calls::{FunctionCallInferenceRule, call_match_cost};
pub use function_validation::FunctionCallArgumentsValidation;
pub use operators::{OperatorBuilder, OperatorDetails, OperatorFactory, OperatorSignature};
pub use primitive::{PrimitiveKind, PrimitiveTypeBuilder, PrimitiveTypeDetails};
pub use rules::StaticTypeInferenceRule;
pub use top::{TopClassKind, TopClassKindOptions, TopClassTypeBuilder};
