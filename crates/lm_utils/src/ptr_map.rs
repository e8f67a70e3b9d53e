use core::fmt::Debug;

use crate::hash::HashMap;

// -----------------------------------------------------------------------------
// PtrMap

/// An identity map keyed by allocation address.
///
/// Two keys are equal only when they are the same allocation, never by
/// value. Addresses are aligned, so keys go through
/// [`FixedHashState`](crate::hash::FixedHashState) rather than a
/// pass-through hasher.
///
/// The map does not keep its keys alive. Callers must hold the referenced
/// allocations for as long as the map is in use, otherwise an address can
/// be reused by an unrelated value.
///
/// # Examples
///
/// ```
/// use lm_utils::PtrMap;
///
/// let a = Box::new(1);
/// let b = Box::new(1);
///
/// let mut ids = PtrMap::new();
/// ids.insert(&*a, 0_u32);
///
/// assert_eq!(ids.get(&*a), Some(&0));
/// assert_eq!(ids.get(&*b), None);
/// ```
pub struct PtrMap<V>(HashMap<usize, V>);

impl<V> PtrMap<V> {
    #[inline]
    pub const fn new() -> Self {
        Self(HashMap::with_hasher(crate::hash::FixedHashState))
    }

    #[inline(always)]
    fn addr<T: ?Sized>(ptr: *const T) -> usize {
        ptr.cast::<()>() as usize
    }

    /// Returns the value recorded for the allocation behind `ptr`.
    #[inline]
    pub fn get<T: ?Sized>(&self, ptr: *const T) -> Option<&V> {
        self.0.get(&Self::addr(ptr))
    }

    /// Records a value for the allocation behind `ptr`, returning the previous one.
    #[inline]
    pub fn insert<T: ?Sized>(&mut self, ptr: *const T, value: V) -> Option<V> {
        self.0.insert(Self::addr(ptr), value)
    }

    #[inline]
    pub fn contains<T: ?Sized>(&self, ptr: *const T) -> bool {
        self.0.contains_key(&Self::addr(ptr))
    }

    #[inline]
    pub fn remove<T: ?Sized>(&mut self, ptr: *const T) -> Option<V> {
        self.0.remove(&Self::addr(ptr))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<V> Default for PtrMap<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Debug> Debug for PtrMap<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}
