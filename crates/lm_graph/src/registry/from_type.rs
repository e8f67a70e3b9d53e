use crate::info::TypeKey;
use crate::value::Reflect;

/// Builds a [`TypeTrait`](crate::registry::TypeTrait) value for the host type `T`.
///
/// Used with [`TypeRegistry::register_type_trait`](crate::registry::TypeRegistry::register_type_trait).
pub trait FromType<T> {
    fn from_type() -> Self;
}

/// A host type that can be created knowing only its registered key.
///
/// Host types carry their [`TypeKey`] so that
/// [`Reflect::type_key`] can report it; this is the host equivalent of a
/// parameterless constructor.
pub trait ReflectDefault: Reflect {
    fn default_for(key: TypeKey) -> Self;
}
