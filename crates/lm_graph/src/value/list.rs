use alloc::vec::Vec;
use core::any::Any;

use crate::info::TypeKey;
use crate::value::{Reflect, ReflectMut, ReflectRef, Value};

/// A growable sequence of values.
#[derive(Debug, Clone)]
pub struct List {
    ty: TypeKey,
    items: Vec<Value>,
}

impl List {
    /// Creates an empty list of the registered list type `ty`.
    #[inline]
    pub const fn new(ty: TypeKey) -> Self {
        Self {
            ty,
            items: Vec::new(),
        }
    }

    #[inline]
    pub fn from_items(ty: TypeKey, items: Vec<Value>) -> Self {
        Self { ty, items }
    }

    #[inline]
    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Replaces an item, returning `false` if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, Value> {
        self.items.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }
}

impl Reflect for List {
    #[inline]
    fn type_key(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::List(self)
    }

    #[inline]
    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::List(self)
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
