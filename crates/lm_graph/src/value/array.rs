use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;

use crate::info::TypeKey;
use crate::value::{Reflect, ReflectMut, ReflectRef, Value};

/// A fixed-shape array of any rank, stored in row-major order.
///
/// # Examples
///
/// ```
/// use lm_graph::info::TypeKey;
/// use lm_graph::value::{Array, Value};
///
/// let mut grid = Array::new(TypeKey::OBJECT, vec![2, 3], Value::I32(0));
/// assert!(grid.set(&[1, 2], Value::I32(7)));
///
/// assert_eq!(grid.len(), 6);
/// assert_eq!(grid.get(&[1, 2]), Some(&Value::I32(7)));
/// assert_eq!(grid.as_slice()[5], Value::I32(7));
/// ```
#[derive(Debug, Clone)]
pub struct Array {
    ty: TypeKey,
    lengths: Vec<usize>,
    items: Vec<Value>,
}

impl Array {
    /// Creates an array with every element set to `fill`.
    pub fn new(ty: TypeKey, lengths: Vec<usize>, fill: Value) -> Self {
        let len = lengths.iter().product();
        Self {
            ty,
            lengths,
            items: vec![fill; len],
        }
    }

    /// Wraps row-major items. Returns `None` if the count does not match the shape.
    pub fn from_items(ty: TypeKey, lengths: Vec<usize>, items: Vec<Value>) -> Option<Self> {
        let len: usize = lengths.iter().product();
        (len == items.len()).then_some(Self { ty, lengths, items })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    #[inline]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Total element count.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn flat_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.lengths.len() {
            return None;
        }
        let mut flat = 0;
        for (&index, &len) in indices.iter().zip(&self.lengths) {
            if index >= len {
                return None;
            }
            flat = flat * len + index;
        }
        Some(flat)
    }

    pub fn get(&self, indices: &[usize]) -> Option<&Value> {
        self.flat_index(indices).map(|flat| &self.items[flat])
    }

    /// Replaces an element, returning `false` if the indices are out of bounds.
    pub fn set(&mut self, indices: &[usize], value: Value) -> bool {
        match self.flat_index(indices) {
            Some(flat) => {
                self.items[flat] = value;
                true
            }
            None => false,
        }
    }

    /// Elements in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    #[inline]
    pub(crate) fn set_flat(&mut self, flat: usize, value: Value) -> bool {
        match self.items.get_mut(flat) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl Reflect for Array {
    #[inline]
    fn type_key(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Array(self)
    }

    #[inline]
    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Array(self)
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
