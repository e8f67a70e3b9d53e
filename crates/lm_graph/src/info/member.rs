use alloc::borrow::Cow;
use core::fmt;

use bitflags::bitflags;

use crate::info::TypeKey;

bitflags! {
    /// Serialization attributes of a single member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u16 {
        /// Stored once per type, not per instance.
        const STATIC = 1 << 0;
        /// Not publicly visible; skipped unless marked [`SERIALIZE`](Self::SERIALIZE)
        /// or a member policy scans private members.
        const PRIVATE = 1 << 1;
        const DO_NOT_SERIALIZE = 1 << 2;
        /// Explicit opt-in, required on every member of an opt-in type.
        const SERIALIZE = 1 << 3;
        /// Left out of checksum passes.
        const NO_CHECKSUM = 1 << 4;
        const OBSOLETE = 1 << 5;
        const NO_GETTER = 1 << 6;
        const NO_SETTER = 1 << 7;
        /// Indexed properties are never serialized.
        const INDEXER = 1 << 8;
    }
}

/// Whether a member is a plain field or an accessor-backed property.
///
/// Fields and properties are written as separate lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field => f.pad("field"),
            Self::Property => f.pad("property"),
        }
    }
}

// -----------------------------------------------------------------------------
// MemberInfo

/// A named member of a struct layout.
///
/// # Examples
///
/// ```
/// use lm_graph::info::{MemberFlags, MemberInfo, MemberKind};
///
/// let info = MemberInfo::property("score", "i32")
///     .with_priority(5)
///     .with_flags(MemberFlags::NO_CHECKSUM);
///
/// assert_eq!(info.kind(), MemberKind::Property);
/// assert_eq!(info.type_path(), "i32");
/// assert_eq!(info.priority(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct MemberInfo {
    name: Cow<'static, str>,
    type_path: Cow<'static, str>,
    kind: MemberKind,
    flags: MemberFlags,
    priority: i32,
    specialist: Option<Cow<'static, str>>,
    // Filled in when the owning layout is registered.
    declaring: TypeKey,
}

impl MemberInfo {
    /// Members without an explicit priority sort after prioritized ones.
    pub const DEFAULT_PRIORITY: i32 = 100;

    fn new(
        name: impl Into<Cow<'static, str>>,
        type_path: impl Into<Cow<'static, str>>,
        kind: MemberKind,
    ) -> Self {
        Self {
            name: name.into(),
            type_path: type_path.into(),
            kind,
            flags: MemberFlags::empty(),
            priority: Self::DEFAULT_PRIORITY,
            specialist: None,
            declaring: TypeKey::OBJECT,
        }
    }

    #[inline]
    pub fn field(name: impl Into<Cow<'static, str>>, type_path: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, type_path, MemberKind::Field)
    }

    #[inline]
    pub fn property(
        name: impl Into<Cow<'static, str>>,
        type_path: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(name, type_path, MemberKind::Property)
    }

    #[inline]
    pub fn with_flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Lower priorities are written first.
    #[inline]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Routes the member value through the named
    /// [`Specialist`](crate::registry::Specialist).
    #[inline]
    pub fn with_specialist(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.specialist = Some(name.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn name_cow(&self) -> &Cow<'static, str> {
        &self.name
    }

    /// Path of the declared member type.
    #[inline]
    pub fn type_path(&self) -> &str {
        &self.type_path
    }

    #[inline]
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    #[inline]
    pub fn flags(&self) -> MemberFlags {
        self.flags
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    #[inline]
    pub fn specialist(&self) -> Option<&str> {
        self.specialist.as_deref()
    }

    /// The type whose declaration introduced this member.
    #[inline]
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    #[inline]
    pub(crate) fn set_declaring_type(&mut self, key: TypeKey) {
        self.declaring = key;
    }
}
