//! Built-in [`TypeTrait`](crate::registry::TypeTrait)s.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::error::HandlerError;
use crate::info::{TypeInfo, TypeKey};
use crate::registry::{Factory, FromType, MemberPolicy, ReflectDefault, SerializeObject, TypeRegistry};
use crate::value::{ObjRef, Reflect};

// -----------------------------------------------------------------------------
// TypeTraitHandler

/// The exact-type [`SerializeObject`] handler of a type.
#[derive(Clone)]
pub struct TypeTraitHandler {
    handler: Arc<dyn SerializeObject>,
}

impl TypeTraitHandler {
    #[inline]
    pub fn new(handler: Arc<dyn SerializeObject>) -> Self {
        Self { handler }
    }

    #[inline]
    pub fn handler(&self) -> &Arc<dyn SerializeObject> {
        &self.handler
    }
}

// -----------------------------------------------------------------------------
// TypeTraitFactory

/// A registered [`Factory`]: the first construction strategy tried.
#[derive(Clone)]
pub struct TypeTraitFactory {
    factory: Arc<dyn Factory>,
}

impl TypeTraitFactory {
    #[inline]
    pub fn new(factory: Arc<dyn Factory>) -> Self {
        Self { factory }
    }

    #[inline]
    pub fn create(&self, info: &TypeInfo, registry: &TypeRegistry) -> Result<Box<dyn Reflect>, HandlerError> {
        self.factory.create(info, registry)
    }
}

// -----------------------------------------------------------------------------
// TypeTraitDefault

/// A parameterless constructor for a host type.
///
/// Created through [`FromType`] for any [`ReflectDefault`] type.
#[derive(Clone)]
pub struct TypeTraitDefault {
    func: fn(TypeKey) -> Box<dyn Reflect>,
}

impl TypeTraitDefault {
    #[inline]
    pub fn new(func: fn(TypeKey) -> Box<dyn Reflect>) -> Self {
        Self { func }
    }

    #[inline(always)]
    pub fn default(&self, key: TypeKey) -> Box<dyn Reflect> {
        (self.func)(key)
    }
}

impl<T: ReflectDefault> FromType<T> for TypeTraitDefault {
    fn from_type() -> Self {
        Self {
            func: |key| Box::new(T::default_for(key)),
        }
    }
}

// -----------------------------------------------------------------------------
// TypeTraitMemberPolicy

/// A [`MemberPolicy`] attached to a type.
#[derive(Clone)]
pub struct TypeTraitMemberPolicy {
    policy: MemberPolicy,
}

impl TypeTraitMemberPolicy {
    #[inline]
    pub fn new(policy: MemberPolicy) -> Self {
        Self { policy }
    }

    #[inline]
    pub fn policy(&self) -> &MemberPolicy {
        &self.policy
    }
}

// -----------------------------------------------------------------------------
// TypeTraitOnDeserialized

/// A callback run on each rebuilt instance of a type once its graph is
/// fully linked.
#[derive(Clone)]
pub struct TypeTraitOnDeserialized {
    func: fn(&ObjRef),
}

impl TypeTraitOnDeserialized {
    #[inline]
    pub fn new(func: fn(&ObjRef)) -> Self {
        Self { func }
    }

    #[inline]
    pub fn call(&self, obj: &ObjRef) {
        (self.func)(obj);
    }
}
