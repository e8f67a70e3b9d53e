//! Type registry and serialization capabilities.
//!
//! ## Menu
//!
//! - [`TypeRegistry`]: type descriptors, handler resolution, member layouts.
//! - [`TypeMeta`]: a [`TypeInfo`](crate::info::TypeInfo) with its [`TypeTrait`] table.
//! - [`SerializeObject`]: a custom handler replacing member-wise reflection.
//! - [`Specialist`]: a per-member value transform.
//! - [`Factory`], [`ObjectFactory`]: construction strategies.
//! - [`MemberPolicy`]: member name filters inherited by subtypes.
//! - TypeTraits:
//!     - [`TypeTraitHandler`]: the exact-type handler.
//!     - [`TypeTraitFactory`]: a registered factory.
//!     - [`TypeTraitDefault`]: a parameterless host constructor.
//!     - [`TypeTraitMemberPolicy`]: a member policy.
//!     - [`TypeTraitOnDeserialized`]: a post-link callback.
//!
//! ## auto_register
//!
//! With the `auto_register` feature, handlers can be declared next to the
//! types they serve with [`inventory::submit!`] and collected by
//! [`TypeRegistry::auto_register`].

// -----------------------------------------------------------------------------
// Modules

mod auto_register;
mod from_type;
mod handler;
mod hooks;
mod traits;
mod type_meta;
mod type_registry;
mod type_trait;

// -----------------------------------------------------------------------------
// Exports

pub use auto_register::{HandlerRegistration, RegistrationKind};
pub use from_type::{FromType, ReflectDefault};
pub use handler::{DeserializeCx, FinalAction, LateValue, Materialized, SerializeCx};
pub use handler::{Factory, MemberPolicy, ObjectFactory, SerializeObject, Specialist};
pub use hooks::{CreateTypeHook, DeserializedListener, TypeMappingHook, TypeVeto};
pub use traits::{TypeTraitDefault, TypeTraitFactory, TypeTraitHandler};
pub use traits::{TypeTraitMemberPolicy, TypeTraitOnDeserialized};
pub use type_meta::TypeMeta;
pub use type_registry::TypeRegistry;
pub use type_trait::TypeTrait;
