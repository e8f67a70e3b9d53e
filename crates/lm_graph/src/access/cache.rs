use alloc::borrow::Cow;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::{PoisonError, RwLock};

use lm_utils::hash::HashMap;
use log::trace;

use crate::access::{AccessMode, Accessor};
use crate::error::GraphError;
use crate::info::{MemberFlags, MemberKind, TypeFlags, TypeInfo, TypeKey};
use crate::registry::TypeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AccessKey {
    ty: TypeKey,
    kind: MemberKind,
    mode: AccessMode,
    seen_before: bool,
}

impl AccessKey {
    #[inline]
    pub fn new(ty: TypeKey, kind: MemberKind, mode: AccessMode, seen_before: bool) -> Self {
        Self {
            ty,
            kind,
            mode,
            seen_before,
        }
    }
}

/// Memoized accessor lists, one per [`AccessKey`].
pub(crate) struct AccessorCache {
    lists: RwLock<HashMap<AccessKey, Arc<[Accessor]>>>,
}

impl AccessorCache {
    pub fn new() -> Self {
        Self {
            lists: RwLock::new(HashMap::default()),
        }
    }

    pub fn clear(&mut self) {
        self.lists
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn get_or_build(
        &self,
        registry: &TypeRegistry,
        key: AccessKey,
    ) -> Result<Arc<[Accessor]>, GraphError> {
        if let Some(hit) = self
            .lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let built: Arc<[Accessor]> = build(registry, key)?.into();
        trace!(
            "built {} {} accessors for {}",
            built.len(),
            key.kind,
            key.ty
        );
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&built));
        Ok(built)
    }
}

fn build(registry: &TypeRegistry, key: AccessKey) -> Result<Vec<Accessor>, GraphError> {
    let Some(info) = registry.get_type_info(key.ty) else {
        return Err(GraphError::MissingType(format!("{}", key.ty)));
    };
    let TypeInfo::Struct(layout) = info else {
        return Ok(Vec::new());
    };

    let policies = registry.member_policies(key.ty);
    let scan_private = policies.iter().any(|p| p.scans_private());
    let type_opt_in = info.flags().contains(TypeFlags::OPT_IN);

    let mut accessors = Vec::new();
    for (index, member) in layout.members().iter().enumerate() {
        let flags = member.flags();
        if member.kind() != key.kind || flags.contains(MemberFlags::DO_NOT_SERIALIZE) {
            continue;
        }
        if key.seen_before && flags.contains(MemberFlags::STATIC) {
            continue;
        }
        if key.mode == AccessMode::Checksum && flags.contains(MemberFlags::NO_CHECKSUM) {
            continue;
        }
        if key.kind == MemberKind::Property
            && flags.intersects(
                MemberFlags::NO_GETTER
                    | MemberFlags::NO_SETTER
                    | MemberFlags::INDEXER
                    | MemberFlags::OBSOLETE,
            )
        {
            continue;
        }

        let declaring_flags = registry
            .get_type_info(member.declaring_type())
            .map(TypeInfo::flags)
            .unwrap_or_default();
        if declaring_flags.contains(TypeFlags::DO_NOT_SERIALIZE) {
            continue;
        }
        let opted_in = flags.contains(MemberFlags::SERIALIZE);
        if (type_opt_in || declaring_flags.contains(TypeFlags::OPT_IN)) && !opted_in {
            continue;
        }
        if flags.contains(MemberFlags::PRIVATE) && !opted_in && !scan_private {
            continue;
        }
        if !policies.iter().all(|p| p.permits(member.name())) {
            continue;
        }

        let Some(declared) = registry.resolve_path(member.type_path()) else {
            return Err(GraphError::MissingType(format!(
                "{} (member `{}` of `{}`)",
                member.type_path(),
                member.name(),
                info.path()
            )));
        };
        let declared_flags = registry
            .get_type_info(declared)
            .map(TypeInfo::flags)
            .unwrap_or_default();
        if declared_flags.contains(TypeFlags::DO_NOT_SERIALIZE) || registry.is_vetoed(declared) {
            continue;
        }

        let specialist = match member.specialist() {
            Some(name) => match registry.specialist(name) {
                Some(specialist) => Some(specialist),
                None => {
                    return Err(GraphError::Unsupported(Cow::Owned(format!(
                        "specialist `{name}` of member `{}` is not registered",
                        member.name()
                    ))));
                }
            },
            None => None,
        };

        accessors.push(Accessor {
            index,
            name: member.name_cow().clone(),
            declared,
            declaring: member.declaring_type(),
            kind: member.kind(),
            flags,
            priority: member.priority(),
            specialist,
        });
    }

    // Stable: equal priorities keep declaration order.
    accessors.sort_by_key(Accessor::priority);
    Ok(accessors)
}

#[cfg(test)]
mod tests {
    use crate::access::AccessMode;
    use crate::info::{MemberFlags, MemberInfo, StructInfo, TypeFlags};
    use crate::registry::{MemberPolicy, TypeRegistry};

    fn names(list: &[crate::access::Accessor]) -> Vec<&str> {
        list.iter().map(|a| a.name()).collect()
    }

    #[test]
    fn filters_and_orders_members() {
        let mut registry = TypeRegistry::new();
        let key = registry.register(
            StructInfo::new("demo::Stats")
                .with_member(MemberInfo::field("b", "i32"))
                .with_member(MemberInfo::field("a", "i32").with_priority(1))
                .with_member(MemberInfo::field("hidden", "i32").with_flags(MemberFlags::PRIVATE))
                .with_member(
                    MemberInfo::field("shown", "i32")
                        .with_flags(MemberFlags::PRIVATE | MemberFlags::SERIALIZE),
                )
                .with_member(MemberInfo::field("count", "i32").with_flags(MemberFlags::STATIC))
                .with_member(MemberInfo::field("cache", "i32").with_flags(MemberFlags::NO_CHECKSUM))
                .with_member(MemberInfo::property("p", "i32").with_flags(MemberFlags::NO_SETTER))
                .with_member(MemberInfo::property("q", "i32")),
        );

        let fields = registry.fields(key, AccessMode::Normal, false).unwrap();
        assert_eq!(names(&fields), ["a", "b", "shown", "count", "cache"]);

        let fields = registry.fields(key, AccessMode::Checksum, true).unwrap();
        assert_eq!(names(&fields), ["a", "b", "shown"]);

        let props = registry.properties(key, AccessMode::Normal, false).unwrap();
        assert_eq!(names(&props), ["q"]);
    }

    #[test]
    fn opt_in_and_policies() {
        let mut registry = TypeRegistry::new();
        let base = registry.register(
            StructInfo::new("demo::Base")
                .with_flags(TypeFlags::OPT_IN)
                .with_member(MemberInfo::field("x", "i32"))
                .with_member(MemberInfo::field("y", "i32").with_flags(MemberFlags::SERIALIZE)),
        );
        let derived = registry.register(
            StructInfo::new("demo::Derived")
                .with_base("demo::Base")
                .with_member(MemberInfo::field("z", "i32"))
                .with_member(MemberInfo::field("w", "i32")),
        );
        registry.set_member_policy(base, MemberPolicy::new().deny(["w"]));

        let fields = registry.fields(derived, AccessMode::Normal, false).unwrap();
        assert_eq!(names(&fields), ["y", "z"]);
    }

    #[test]
    fn vetoed_member_types_are_skipped() {
        let mut registry = TypeRegistry::new();
        registry.register(StructInfo::new("demo::Handle"));
        let key = registry.register(
            StructInfo::new("demo::Owner")
                .with_member(MemberInfo::field("handle", "demo::Handle"))
                .with_member(MemberInfo::field("id", "i32")),
        );
        registry.add_type_veto(|info| info.path() == "demo::Handle");

        let fields = registry.fields(key, AccessMode::Normal, false).unwrap();
        assert_eq!(names(&fields), ["id"]);
    }
}
