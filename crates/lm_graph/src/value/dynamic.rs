use alloc::vec::Vec;
use core::any::Any;

use crate::info::TypeKey;
use crate::value::{Reflect, ReflectMut, ReflectRef, Struct, Value};

/// A struct instance backed by one slot per layout member.
///
/// This is the default representation for registered struct types that
/// have no factory of their own. Slots of static members are unused; static
/// values live in the engine's [`Statics`](crate::Statics) store.
///
/// # Examples
///
/// ```
/// use lm_graph::info::{MemberInfo, StructInfo};
/// use lm_graph::registry::TypeRegistry;
/// use lm_graph::value::{DynamicObject, Struct, Value};
///
/// let mut registry = TypeRegistry::new();
/// let point = registry.register(
///     StructInfo::new("demo::Point")
///         .with_member(MemberInfo::field("x", "i32"))
///         .with_member(MemberInfo::field("label", "string")),
/// );
///
/// let mut obj = DynamicObject::from_layout(&registry, point).unwrap();
/// assert_eq!(obj.member(0), Some(Value::I32(0)));
/// assert_eq!(obj.member(1), Some(Value::Null));
///
/// obj.set_member(0, Value::I32(4)).unwrap();
/// assert_eq!(obj.member(0), Some(Value::I32(4)));
/// ```
#[derive(Debug, Clone)]
pub struct DynamicObject {
    ty: TypeKey,
    slots: Vec<Value>,
}

impl DynamicObject {
    #[inline]
    pub fn new(ty: TypeKey, slots: Vec<Value>) -> Self {
        Self { ty, slots }
    }

    /// Creates an instance with every member at its default value.
    ///
    /// Returns `None` if `ty` is not a registered struct.
    pub fn from_layout(registry: &crate::registry::TypeRegistry, ty: TypeKey) -> Option<Self> {
        let info = registry.get_type_info(ty)?.as_struct().ok()?;
        let slots = info
            .members()
            .iter()
            .map(|member| registry.default_value(member.type_path()))
            .collect();
        Some(Self { ty, slots })
    }

    #[inline]
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }
}

impl Struct for DynamicObject {
    #[inline]
    fn member(&self, index: usize) -> Option<Value> {
        self.slots.get(index).cloned()
    }

    fn set_member(&mut self, index: usize, value: Value) -> Result<(), Value> {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(value),
        }
    }

    #[inline]
    fn member_len(&self) -> usize {
        self.slots.len()
    }
}

impl Reflect for DynamicObject {
    #[inline]
    fn type_key(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Struct(self)
    }

    #[inline]
    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Struct(self)
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
