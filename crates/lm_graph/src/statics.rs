use core::cell::RefCell;

use lm_utils::hash::HashMap;

use crate::info::TypeKey;
use crate::value::Value;

/// Storage for static members, keyed by declaring type and layout index.
///
/// Owned by one [`Serializer`](crate::Serializer). Static values are
/// written with the first instance of their type in each stream.
///
/// # Examples
///
/// ```
/// use lm_graph::Statics;
/// use lm_graph::info::TypeKey;
/// use lm_graph::value::Value;
///
/// let statics = Statics::new();
/// assert_eq!(statics.get(TypeKey::OBJECT, 0), None);
///
/// statics.set(TypeKey::OBJECT, 0, Value::I32(3));
/// assert_eq!(statics.get(TypeKey::OBJECT, 0), Some(Value::I32(3)));
/// ```
#[derive(Debug, Default)]
pub struct Statics {
    values: RefCell<HashMap<(TypeKey, usize), Value>>,
}

impl Statics {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, declaring: TypeKey, index: usize) -> Option<Value> {
        self.values.borrow().get(&(declaring, index)).cloned()
    }

    pub fn set(&self, declaring: TypeKey, index: usize, value: Value) {
        self.values.borrow_mut().insert((declaring, index), value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}
