use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::info::{TypeInfo, TypeKey};
use crate::registry::TypeRegistry;
use crate::value::{Reflect, Value};

/// Returns `true` to exclude a type from serialization wherever it appears
/// as a member type.
pub type TypeVeto = Arc<dyn Fn(&TypeInfo) -> bool + Send + Sync>;

/// Last-resort constructor, tried after every registered strategy.
pub type CreateTypeHook = Arc<dyn Fn(&TypeInfo) -> Option<Box<dyn Reflect>> + Send + Sync>;

/// Maps a type path found in a stream but missing from the registry.
pub type TypeMappingHook = Arc<dyn Fn(&str, &TypeRegistry) -> Option<TypeKey> + Send + Sync>;

/// Notified with the root of every completed deserialize call.
pub type DeserializedListener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Hooks {
    pub vetoes: Vec<TypeVeto>,
    pub create_type: Vec<CreateTypeHook>,
    pub type_mapping: Vec<TypeMappingHook>,
    pub deserialized: Vec<DeserializedListener>,
}
