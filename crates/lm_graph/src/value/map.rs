use alloc::vec::Vec;
use core::any::Any;
use core::hash::BuildHasher;

use lm_utils::hash::{FixedHashState, HashTable};

use crate::info::TypeKey;
use crate::value::{Reflect, ReflectMut, ReflectRef, Value};

/// A dictionary that preserves insertion order.
///
/// Keys follow [`Value`] equality: objects by identity, floats by bit
/// pattern. Null keys are rejected.
///
/// # Examples
///
/// ```
/// use lm_graph::info::TypeKey;
/// use lm_graph::value::{Map, Value};
///
/// let mut map = Map::new(TypeKey::OBJECT);
/// map.insert("a".into(), Value::I32(1)).unwrap();
/// map.insert("b".into(), Value::I32(2)).unwrap();
///
/// assert_eq!(map.get(&"b".into()), Some(&Value::I32(2)));
/// assert!(map.insert(Value::Null, Value::I32(3)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Map {
    ty: TypeKey,
    entries: Vec<(Value, Value)>,
    // Positions in `entries`, hashed by key.
    indices: HashTable<usize>,
}

#[inline]
fn hash_key(key: &Value) -> u64 {
    FixedHashState.hash_one(key)
}

impl Map {
    #[inline]
    pub const fn new(ty: TypeKey) -> Self {
        Self {
            ty,
            entries: Vec::new(),
            indices: HashTable::new(),
        }
    }

    fn find(&self, key: &Value) -> Option<usize> {
        let entries = &self.entries;
        self.indices
            .find(hash_key(key), |&index| entries[index].0 == *key)
            .copied()
    }

    /// Inserts an entry, returning the replaced value.
    ///
    /// A null key is handed back as `Err`.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<Option<Value>, Value> {
        if key.is_null() {
            return Err(key);
        }
        if let Some(index) = self.find(&key) {
            return Ok(Some(core::mem::replace(&mut self.entries[index].1, value)));
        }
        let index = self.entries.len();
        let entries = &self.entries;
        self.indices
            .insert_unique(hash_key(&key), index, |&i| hash_key(&entries[i].0));
        self.entries.push((key, value));
        Ok(None)
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.find(key).map(|index| &self.entries[index].1)
    }

    #[inline]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.find(key).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl Reflect for Map {
    #[inline]
    fn type_key(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Map(self)
    }

    #[inline]
    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Map(self)
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
