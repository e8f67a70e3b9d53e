use alloc::boxed::Box;
use core::any::TypeId;
use core::ops::Deref;

use lm_utils::TypeIdMap;

use crate::info::{Type, TypeInfo, TypeKey};
use crate::registry::TypeTrait;

// -----------------------------------------------------------------------------
// TypeMeta

/// A registered [`TypeInfo`] together with its [`TypeTrait`] table.
pub struct TypeMeta {
    info: TypeInfo,
    trait_table: TypeIdMap<Box<dyn TypeTrait>>,
}

impl TypeMeta {
    #[inline]
    pub(crate) fn new(info: TypeInfo) -> Self {
        Self {
            info,
            trait_table: TypeIdMap::new(),
        }
    }

    #[inline(always)]
    pub fn type_info(&self) -> &TypeInfo {
        &self.info
    }

    #[inline(always)]
    pub fn ty(&self) -> &Type {
        self.info.ty()
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.info.key()
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.info.path()
    }

    /// Inserts a trait value, replacing any previous value of the same type.
    #[inline(always)]
    pub fn insert_trait<T: TypeTrait>(&mut self, data: T) {
        self.insert_trait_by_id(TypeId::of::<T>(), Box::new(data));
    }

    #[inline(never)]
    fn insert_trait_by_id(&mut self, id: TypeId, val: Box<dyn TypeTrait>) {
        self.trait_table.insert(id, val);
    }

    /// Removes a trait value, returning whether one was present.
    pub fn remove_trait<T: TypeTrait>(&mut self) -> bool {
        self.trait_table.remove(&TypeId::of::<T>()).is_some()
    }

    #[inline]
    pub fn get_trait<T: TypeTrait>(&self) -> Option<&T> {
        self.trait_table
            .get(&TypeId::of::<T>())
            .map(Deref::deref)
            .and_then(<dyn TypeTrait>::downcast_ref)
    }

    #[inline]
    pub fn has_trait<T: TypeTrait>(&self) -> bool {
        self.trait_table.contains_type::<T>()
    }

    #[inline]
    pub fn trait_len(&self) -> usize {
        self.trait_table.len()
    }
}

impl core::fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeMeta")
            .field("info", &self.info)
            .field("traits", &self.trait_table.len())
            .finish()
    }
}
