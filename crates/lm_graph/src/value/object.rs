use alloc::boxed::Box;
use alloc::rc::Rc;
use core::any::Any;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;

use crate::info::TypeKey;
use crate::value::{Array, List, Map, Value};

// -----------------------------------------------------------------------------
// Reflect

/// A graph node that the engine can inspect and rebuild.
///
/// Implemented by [`DynamicObject`](crate::value::DynamicObject), the
/// collection types, and host types that want to take part in a graph.
pub trait Reflect: Any {
    /// The registered type of this instance.
    fn type_key(&self) -> TypeKey;

    fn reflect_ref(&self) -> ReflectRef<'_>;

    fn reflect_mut(&mut self) -> ReflectMut<'_>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Host handles whose underlying resource is gone report `false` and
    /// are written as null.
    #[inline]
    fn is_alive(&self) -> bool {
        true
    }

    /// Value equality for opaque instances, used by [`deep_eq`](crate::value::deep_eq).
    #[inline]
    fn opaque_eq(&self, _other: &dyn Reflect) -> bool {
        false
    }
}

/// Member access by layout index.
///
/// Indices follow the flattened layout of the registered
/// [`StructInfo`](crate::info::StructInfo).
pub trait Struct: Reflect {
    /// Returns a copy of the member value. Objects are shared, not cloned.
    fn member(&self, index: usize) -> Option<Value>;

    /// Replaces a member value, handing the value back if it cannot be stored.
    fn set_member(&mut self, index: usize, value: Value) -> Result<(), Value>;

    fn member_len(&self) -> usize;
}

/// An immutable view of a reflected object's shape.
pub enum ReflectRef<'a> {
    Struct(&'a dyn Struct),
    List(&'a List),
    Map(&'a Map),
    Array(&'a Array),
    /// No reflected layout; needs a handler.
    Opaque,
}

/// A mutable view of a reflected object's shape.
pub enum ReflectMut<'a> {
    Struct(&'a mut dyn Struct),
    List(&'a mut List),
    Map(&'a mut Map),
    Array(&'a mut Array),
    Opaque,
}

impl dyn Reflect {
    #[inline]
    pub fn is<T: Reflect>(&self) -> bool {
        self.as_any().is::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    #[inline]
    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

// -----------------------------------------------------------------------------
// ObjRef

/// A shared, mutable handle to a graph node.
///
/// Identity is the allocation: clones of one `ObjRef` are the same object,
/// two separately created objects never are, whatever their contents.
///
/// # Examples
///
/// ```
/// use lm_graph::info::TypeKey;
/// use lm_graph::value::{List, ObjRef};
///
/// let a = ObjRef::new(List::new(TypeKey::OBJECT_LIST));
/// let b = a.clone();
/// let c = ObjRef::new(List::new(TypeKey::OBJECT_LIST));
///
/// assert!(a.ptr_eq(&b));
/// assert!(!a.ptr_eq(&c));
/// ```
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<Box<dyn Reflect>>>);

impl ObjRef {
    #[inline]
    pub fn new(value: impl Reflect) -> Self {
        Self::from_boxed(Box::new(value))
    }

    #[inline]
    pub fn from_boxed(value: Box<dyn Reflect>) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// # Panics
    ///
    /// Panics if the object is currently mutably borrowed.
    #[inline]
    pub fn borrow(&self) -> Ref<'_, dyn Reflect> {
        Ref::map(self.0.borrow(), |boxed| &**boxed)
    }

    /// # Panics
    ///
    /// Panics if the object is currently borrowed.
    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Reflect> {
        RefMut::map(self.0.borrow_mut(), |boxed| &mut **boxed)
    }

    pub fn downcast_ref<T: Reflect>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.0.borrow(), |boxed| boxed.as_any().downcast_ref::<T>()).ok()
    }

    pub fn downcast_mut<T: Reflect>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.0.borrow_mut(), |boxed| {
            boxed.as_any_mut().downcast_mut::<T>()
        })
        .ok()
    }

    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.borrow().type_key()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.borrow().is_alive()
    }

    /// Identity comparison.
    #[inline]
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The allocation address, usable as an identity key.
    #[inline]
    pub fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0).cast()
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("ObjRef");
        match self.0.try_borrow() {
            Ok(inner) => tuple.field(&inner.type_key()),
            Err(_) => tuple.field(&"<borrowed>"),
        };
        tuple.field(&self.addr()).finish()
    }
}
