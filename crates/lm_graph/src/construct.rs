use alloc::borrow::ToOwned;
use alloc::boxed::Box;

use log::{trace, warn};

use crate::error::GraphError;
use crate::info::{TypeInfo, TypeKey};
use crate::registry::{ObjectFactory, TypeRegistry, TypeTraitDefault, TypeTraitFactory};
use crate::value::{DynamicObject, ObjRef, Reflect};

/// Creates an empty instance of a struct or opaque type.
///
/// Strategies, first success wins: the type's registered factory, the
/// engine's [`ObjectFactory`], the type's default constructor, a
/// [`DynamicObject`] for concrete struct layouts, then the registry's
/// create-type hooks. An instance whose type is not assignable to `ty`
/// is discarded.
pub(crate) fn construct(
    registry: &TypeRegistry,
    factory: Option<&dyn ObjectFactory>,
    ty: TypeKey,
) -> Result<ObjRef, GraphError> {
    let info = registry
        .get_type_info(ty)
        .ok_or_else(|| GraphError::MissingType(alloc::format!("{ty}")))?;

    let accept = |strategy: &str, instance: Box<dyn Reflect>| -> Option<ObjRef> {
        let produced = instance.type_key();
        if registry.is_assignable(produced, ty) {
            trace!("`{}` constructed by {strategy}", info.path());
            Some(ObjRef::from_boxed(instance))
        } else {
            warn!(
                "{strategy} for `{}` produced an instance of unrelated type {produced}; ignored",
                info.path()
            );
            None
        }
    };

    if let Some(registered) = registry.get_type_trait::<TypeTraitFactory>(ty) {
        let instance = registered
            .create(info, registry)
            .map_err(|err| err.in_type(info.path()))?;
        if let Some(obj) = accept("registered factory", instance) {
            return Ok(obj);
        }
    }

    if let Some(obj) = factory
        .and_then(|factory| factory.create(info, registry))
        .and_then(|instance| accept("object factory", instance))
    {
        return Ok(obj);
    }

    if let Some(default) = registry.get_type_trait::<TypeTraitDefault>(ty)
        && let Some(obj) = accept("default constructor", default.default(ty))
    {
        return Ok(obj);
    }

    if let TypeInfo::Struct(_) = info
        && !info.is_abstract()
        && let Some(dynamic) = DynamicObject::from_layout(registry, ty)
    {
        trace!("`{}` constructed as a dynamic object", info.path());
        return Ok(ObjRef::new(dynamic));
    }

    registry
        .create_type_hooks()
        .iter()
        .find_map(|hook| hook(info).and_then(|instance| accept("create-type hook", instance)))
        .ok_or_else(|| GraphError::MissingConstructor(info.path().to_owned()))
}
