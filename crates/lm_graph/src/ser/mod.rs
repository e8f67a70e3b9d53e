//! The write path.

mod vanilla;

pub(crate) use vanilla::VanillaCache;

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, trace};

use crate::access::{AccessMode, Accessor};
use crate::error::GraphError;
use crate::info::{ArrayInfo, PrimitiveKind, TypeInfo, TypeKey};
use crate::registry::{ObjectFactory, SerializeCx, SerializeObject, TypeRegistry};
use crate::scope::{ScopeKind, ScopeStack, WriteScope};
use crate::settings::Codec;
use crate::statics::Statics;
use crate::storage::binary::BinaryWriter;
use crate::storage::text::TextWriter;
use crate::storage::{STREAM_VERSION, StorageWriter, StreamHeader, TypeToken, pack};
use crate::tables::{PrewarmIndex, WriteTables};
use crate::value::{Array, ObjRef, ReflectRef, Struct, Value};

/// Walks a graph and drives a [`StorageWriter`].
///
/// Each object is written once per scope. Later encounters become
/// back-references to the id assigned on first encounter, in pre-order.
pub(crate) struct Walker<'a> {
    pub registry: &'a TypeRegistry,
    pub statics: &'a Statics,
    pub prewarm: &'a PrewarmIndex,
    pub factory: Option<&'a dyn ObjectFactory>,
    pub vanilla: &'a VanillaCache,
    pub codec: Codec,
    pub verbose: bool,
    pub skip_default_properties: bool,
    pub mode: AccessMode,
}

impl Walker<'_> {
    /// Writes `root` as a complete top-level stream.
    pub fn write_root(&self, root: &Value, declared: TypeKey) -> Result<Vec<u8>, GraphError> {
        let stack = ScopeStack::default().push(ScopeKind::Top);
        self.write_stream(stack, false, |scope, out| {
            self.write_entry(scope, out, root, declared)
        })
    }

    /// Writes a handler payload as a nested stream with its own tables
    /// and identities.
    fn write_split(&self, parent: &ScopeStack, ty: TypeKey, payload: &[Value]) -> Result<Vec<u8>, GraphError> {
        let stack = parent.push(ScopeKind::Split(ty));
        self.write_stream(stack, true, |scope, out| {
            // The wrapper list takes no id, so payload ids start at zero.
            let list = scope.tables.type_id(self.path(TypeKey::OBJECT_LIST))?;
            out.write_type(TypeToken::Id(list));
            out.begin_object();
            self.write_items(scope, out, payload, TypeKey::OBJECT)?;
            out.end_object();
            Ok(())
        })
    }

    fn write_stream(
        &self,
        stack: ScopeStack,
        split: bool,
        body: impl FnOnce(&mut WriteScope<'_>, &mut dyn StorageWriter) -> Result<(), GraphError>,
    ) -> Result<Vec<u8>, GraphError> {
        let mut out: Box<dyn StorageWriter> = match self.codec {
            Codec::Binary => Box::new(BinaryWriter::new()),
            Codec::Text => Box::new(TextWriter::new()),
        };
        debug!("write scope opened: {}", stack.describe(self.registry));
        let mut scope = WriteScope::new(stack, WriteTables::new(self.prewarm));
        body(&mut scope, out.as_mut())?;

        debug!(
            "write scope closed: {} with {} objects",
            scope.stack.describe(self.registry),
            scope.object_count()
        );
        let (types, names) = scope.tables.into_entries();
        Ok(out.finish(&StreamHeader {
            version: STREAM_VERSION,
            verbose: self.verbose,
            split,
            types,
            names,
        }))
    }

    #[inline]
    fn path(&self, ty: TypeKey) -> &str {
        self.registry.get(ty).map_or("?", |meta| meta.path())
    }

    /// Writes one value: its type token, then an inline primitive, a
    /// back-reference, or an object.
    pub fn write_entry(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        value: &Value,
        declared: TypeKey,
    ) -> Result<(), GraphError> {
        let runtime = match value {
            Value::Object(obj) if !obj.is_alive() => None,
            other => other.runtime_type(),
        };
        let Some(runtime) = runtime else {
            out.write_type(TypeToken::Null);
            return Ok(());
        };
        let info = self
            .registry
            .get_type_info(runtime)
            .ok_or_else(|| GraphError::unsupported(format!("value of unregistered type {runtime}")))?;

        let token = if self.verbose || runtime != declared {
            TypeToken::Id(scope.tables.type_id(info.path())?)
        } else {
            TypeToken::Declared
        };
        out.write_type(token);

        let obj = match value {
            Value::Object(obj) => obj,
            Value::Enum(e) => {
                let raw = info
                    .primitive_kind()
                    .and_then(|repr| Value::from_i128(repr, e.discriminant as i128))
                    .ok_or_else(|| {
                        GraphError::unsupported(format!(
                            "discriminant {} does not fit the representation of `{}`",
                            e.discriminant,
                            info.path()
                        ))
                    })?;
                return out.write_primitive(&raw);
            }
            primitive => return out.write_primitive(primitive),
        };

        let value_type = info.ty().is_value_type();
        if !value_type && let Some(id) = scope.identity(obj) {
            trace!("`{}` written as reference to {id}", info.path());
            out.write_reference(id);
            return Ok(());
        }

        if let Some(handler) = self.registry.lookup_handler(runtime, Some(obj)) {
            trace!("`{}` written by its handler", info.path());
            return self.write_custom(scope, out, obj, info, handler, value_type);
        }

        if !value_type {
            scope.record(obj);
        }
        out.begin_object();
        self.write_body(scope, out, obj, info)?;
        out.end_object();
        Ok(())
    }

    fn write_custom(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        obj: &ObjRef,
        info: &TypeInfo,
        handler: Arc<dyn SerializeObject>,
        value_type: bool,
    ) -> Result<(), GraphError> {
        if !value_type {
            scope.record(obj);
        }
        let payload = handler
            .serialize(obj, &mut SerializeCx::new(self.registry, scope.stack.depth()))
            .map_err(|err| err.in_type(info.path()))?;
        for item in &payload {
            if let Value::Object(item) = item {
                scope.retain(item.clone());
            }
        }

        out.begin_custom();
        if handler.isolated() {
            let nested = self.write_split(&scope.stack, info.key(), &payload)?;
            out.write_blob(&nested);
        } else {
            self.write_items(scope, out, &payload, TypeKey::OBJECT)?;
        }
        out.end_object();
        Ok(())
    }

    fn write_body(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        obj: &ObjRef,
        info: &TypeInfo,
    ) -> Result<(), GraphError> {
        let node = obj.borrow();
        match (info, node.reflect_ref()) {
            (TypeInfo::Struct(_), ReflectRef::Struct(target)) => {
                self.write_members(scope, out, target, info.key())
            }
            (TypeInfo::List(list_info), ReflectRef::List(list)) => {
                self.write_items(scope, out, list.as_slice(), list_info.item())
            }
            (TypeInfo::Map(map_info), ReflectRef::Map(map)) => {
                out.begin_map(map.len());
                out.begin_map_keys();
                for key in map.keys() {
                    self.write_entry(scope, out, key, map_info.key())?;
                }
                out.end_map_keys();
                out.begin_map_values(map.len());
                for value in map.values() {
                    self.write_entry(scope, out, value, map_info.value())?;
                }
                out.end_map_values();
                out.end_map();
                Ok(())
            }
            (TypeInfo::Array(array_info), ReflectRef::Array(array)) => {
                self.write_array(scope, out, array, array_info)
            }
            _ => Err(GraphError::unsupported(format!(
                "`{}` has no handler and no serializable shape",
                info.path()
            ))),
        }
    }

    fn write_items(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        items: &[Value],
        item: TypeKey,
    ) -> Result<(), GraphError> {
        out.begin_list(items.len());
        for value in items {
            self.write_entry(scope, out, value, item)?;
        }
        out.end_list();
        Ok(())
    }

    fn write_array(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        array: &Array,
        info: &ArrayInfo,
    ) -> Result<(), GraphError> {
        out.begin_array(array.lengths());
        match packed_kind(self.registry, info.item()) {
            Some(kind) => {
                let bytes = pack(kind, array.as_slice()).ok_or_else(|| {
                    GraphError::unsupported(format!("`{}` holds an element that is not {kind}", info.ty().path()))
                })?;
                out.write_blob(&bytes);
            }
            None => {
                for value in array.as_slice() {
                    self.write_entry(scope, out, value, info.item())?;
                }
            }
        }
        out.end_array();
        Ok(())
    }

    fn write_members(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        target: &dyn Struct,
        ty: TypeKey,
    ) -> Result<(), GraphError> {
        let seen_before = scope.mark_seen(ty);
        let fields = self.registry.fields(ty, self.mode, seen_before)?;
        let properties = self.registry.properties(ty, self.mode, seen_before)?;

        out.begin_fields(fields.len());
        for accessor in fields.iter() {
            let value = self.member_value(target, accessor);
            self.write_member(scope, out, accessor, value)?;
        }
        out.end_fields();

        // Property lists are counted, so unchanged ones can be left out.
        let properties: Vec<(&Accessor, Value)> = properties
            .iter()
            .map(|accessor| (accessor, self.member_value(target, accessor)))
            .filter(|(accessor, value)| !self.is_vanilla(ty, accessor, value))
            .collect();
        out.begin_properties(properties.len());
        for (accessor, value) in properties {
            self.write_member(scope, out, accessor, value)?;
        }
        out.end_properties();
        Ok(())
    }

    fn member_value(&self, target: &dyn Struct, accessor: &Accessor) -> Value {
        accessor
            .get(target, self.statics)
            .unwrap_or_else(|| self.registry.default_value_of(accessor.declared()))
    }

    fn is_vanilla(&self, ty: TypeKey, accessor: &Accessor, value: &Value) -> bool {
        self.skip_default_properties
            && !accessor.is_static()
            && self
                .vanilla
                .member(self.registry, self.factory, ty, accessor.index())
                .is_some_and(|vanilla| vanilla == *value)
    }

    fn write_member(
        &self,
        scope: &mut WriteScope<'_>,
        out: &mut dyn StorageWriter,
        accessor: &Accessor,
        value: Value,
    ) -> Result<(), GraphError> {
        out.write_name(scope.tables.name_id(accessor.name())?);
        match accessor.specialist() {
            Some(specialist) => {
                let value = specialist
                    .to_stream(value)
                    .map_err(|err| err.in_type(accessor.name()))?;
                self.write_entry(scope, out, &value, TypeKey::OBJECT)
            }
            None => self.write_entry(scope, out, &value, accessor.declared()),
        }
    }
}

/// The element kind of arrays written as a single blob.
pub(crate) fn packed_kind(registry: &TypeRegistry, item: TypeKey) -> Option<PrimitiveKind> {
    let kind = registry.get_type_info(item)?.as_primitive().ok()?.kind();
    kind.packed_width().map(|_| kind)
}
