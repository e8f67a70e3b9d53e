//! Runtime type descriptors.
//!
//! Types are described at runtime rather than derived from Rust types: a
//! [`TypeInfo`] carries a path, flags, inheritance edges and a member
//! layout. Descriptors are owned by the
//! [`TypeRegistry`](crate::registry::TypeRegistry), which hands out dense
//! [`TypeKey`] handles.

// -----------------------------------------------------------------------------
// Modules

mod collection_path;
mod member;
mod primitive;
mod type_info;

// -----------------------------------------------------------------------------
// Exports

pub(crate) use collection_path::CollectionPath;

pub use member::{MemberFlags, MemberInfo, MemberKind};
pub use primitive::PrimitiveKind;
pub use type_info::{ArrayInfo, EnumInfo, InterfaceInfo, ListInfo, MapInfo};
pub use type_info::{ObjectInfo, OpaqueInfo, PrimitiveInfo, StructInfo};
pub use type_info::{Type, TypeFlags, TypeInfo, TypeKey, TypeKind, TypeKindError};
