use alloc::borrow::Cow;
use alloc::sync::Arc;
use core::fmt;

use crate::info::{MemberFlags, MemberKind, TypeKey};
use crate::registry::Specialist;
use crate::statics::Statics;
use crate::value::{Struct, Value};

/// Which member filter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    #[default]
    Normal,
    /// Drops members marked [`NO_CHECKSUM`](MemberFlags::NO_CHECKSUM).
    Checksum,
}

/// A resolved, serializable member of a struct layout.
#[derive(Clone)]
pub struct Accessor {
    pub(super) index: usize,
    pub(super) name: Cow<'static, str>,
    pub(super) declared: TypeKey,
    pub(super) declaring: TypeKey,
    pub(super) kind: MemberKind,
    pub(super) flags: MemberFlags,
    pub(super) priority: i32,
    pub(super) specialist: Option<Arc<dyn Specialist>>,
}

impl Accessor {
    /// Layout index of the member.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared member type.
    #[inline]
    pub fn declared(&self) -> TypeKey {
        self.declared
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
    pub fn specialist(&self) -> Option<&Arc<dyn Specialist>> {
        self.specialist.as_ref()
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    /// Reads the member. Static members come from `statics`, and are
    /// `None` until first assigned.
    pub fn get(&self, target: &dyn Struct, statics: &Statics) -> Option<Value> {
        if self.is_static() {
            statics.get(self.declaring, self.index)
        } else {
            target.member(self.index)
        }
    }

    /// Writes the member, handing the value back if the target refuses it.
    pub fn set(&self, target: &mut dyn Struct, statics: &Statics, value: Value) -> Result<(), Value> {
        if self.is_static() {
            self.set_static(statics, value)
        } else {
            target.set_member(self.index, value)
        }
    }

    /// Writes a static member. Instance members refuse the value.
    pub fn set_static(&self, statics: &Statics, value: Value) -> Result<(), Value> {
        if self.is_static() {
            statics.set(self.declaring, self.index, value);
            Ok(())
        } else {
            Err(value)
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("specialist", &self.specialist.is_some())
            .finish()
    }
}
