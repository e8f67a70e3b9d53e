use core::cell::RefCell;

use lm_utils::hash::{HashMap, NoOpHashState};
use log::debug;

use crate::construct::construct;
use crate::info::TypeKey;
use crate::registry::{ObjectFactory, TypeRegistry};
use crate::value::{ObjRef, ReflectRef, Value};

/// Default-constructed instances used to detect unchanged properties.
#[derive(Debug, Default)]
pub(crate) struct VanillaCache {
    instances: RefCell<HashMap<TypeKey, Option<ObjRef>, NoOpHashState>>,
}

impl VanillaCache {
    /// The value of member `index` on a fresh instance of `ty`, or `None`
    /// if no instance can be built.
    pub fn member(
        &self,
        registry: &TypeRegistry,
        factory: Option<&dyn ObjectFactory>,
        ty: TypeKey,
        index: usize,
    ) -> Option<Value> {
        let cached = self.instances.borrow().get(&ty).cloned();
        let instance = match cached {
            Some(instance) => instance,
            None => {
                let built = construct(registry, factory, ty)
                    .inspect_err(|err| debug!("no default instance of {ty}: {err}"))
                    .ok();
                self.instances.borrow_mut().insert(ty, built.clone());
                built
            }
        }?;
        match instance.borrow().reflect_ref() {
            ReflectRef::Struct(target) => target.member(index),
            _ => None,
        }
    }
}
