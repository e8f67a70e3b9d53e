use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, trace};

use crate::access::{AccessMode, Accessor};
use crate::construct::construct;
use crate::de::fixup::{
    ApplyCx, DrainReport, Fixup, LateCell, Producer, Slot, Target, assign_member, insert_entry,
};
use crate::error::GraphError;
use crate::info::{TypeInfo, TypeKey};
use crate::registry::{
    DeserializeCx, Materialized, ObjectFactory, SerializeObject, TypeRegistry, TypeTraitOnDeserialized,
};
use crate::scope::{ReadScope, ScopeKind, ScopeStack};
use crate::ser::packed_kind;
use crate::statics::Statics;
use crate::storage::{ObjectMarker, StorageReader, TypeToken, open_reader, unpack};
use crate::tables::{PrewarmIndex, ReadTables};
use crate::value::{Array, EnumValue, List, Map, ObjRef, ReflectMut, ReflectRef, Value};

/// Rebuilds graphs from a [`StorageReader`].
///
/// Reading is a single structural pass. Values that are not available
/// yet, such as back-references to objects still being produced by a
/// handler, become [`Fixup`]s that are drained afterwards.
pub(crate) struct Rehydrator<'a> {
    pub registry: &'a TypeRegistry,
    pub statics: &'a Statics,
    pub prewarm: &'a PrewarmIndex,
    pub factory: Option<&'a dyn ObjectFactory>,
    /// Pass limit for the fixups of split scopes.
    pub fixup_passes: usize,
}

impl<'a> Rehydrator<'a> {
    /// Runs the structural pass over a top-level stream.
    ///
    /// Fixups are left queued in the returned scope.
    pub fn read_root(
        &self,
        bytes: &[u8],
        declared: TypeKey,
        into: Option<&ObjRef>,
    ) -> Result<(ReadScope<'a>, Slot), GraphError> {
        let stack = ScopeStack::default().push(ScopeKind::Top);
        let mut reader = open_reader(bytes)?;
        let mut scope = self.open_scope(stack, reader.as_ref());

        let root = if reader.header().split {
            // A handler payload read on its own.
            self.read_payload(&mut scope, reader.as_mut())
                .map(|list| Slot::Ready(Value::Object(list)))
        } else {
            self.read_entry_into(&mut scope, reader.as_mut(), declared, into)
        };
        let root = root
            .and_then(|root| reader.finish().map(|()| root))
            .map_err(|err| scope.stack.annotate(err, self.registry))?;
        debug!(
            "structural pass done: {} objects, {} fixups queued",
            scope.ids.len(),
            scope.fixups.len()
        );
        Ok((scope, root))
    }

    fn open_scope(&self, stack: ScopeStack, reader: &dyn StorageReader) -> ReadScope<'a> {
        let header = reader.header();
        debug!(
            "read scope opened: {} (stream version {}, {} types, {} names, verbose: {})",
            stack.describe(self.registry),
            header.version,
            header.types.len(),
            header.names.len(),
            header.verbose
        );
        let tables = ReadTables::new(self.prewarm, header.types.clone(), header.names.clone());
        ReadScope::new(stack, tables, header.verbose)
    }

    /// Drains fixups, then runs the actions handlers deferred.
    pub fn settle(&self, scope: &mut ReadScope<'_>, passes: usize) -> Result<DrainReport, GraphError> {
        let report = self.drain(scope, passes)?;
        for action in core::mem::take(&mut scope.finals) {
            action()?;
        }
        for obj in core::mem::take(&mut scope.created) {
            if let Some(callback) = self.registry.get_type_trait::<TypeTraitOnDeserialized>(obj.type_key()) {
                callback.call(&obj);
            }
        }
        Ok(report)
    }

    pub fn drain(&self, scope: &mut ReadScope<'_>, passes: usize) -> Result<DrainReport, GraphError> {
        let mut cx = ApplyCx {
            registry: self.registry,
            statics: self.statics,
            ids: &mut scope.ids,
            finals: &mut scope.finals,
        };
        scope.fixups.drain(passes, &mut cx)
    }

    // -------------------------------------------------------------------------
    // Split scopes

    /// Reads a handler payload written as a nested stream, fully resolving
    /// it before returning.
    fn read_split(
        &self,
        parent: &ReadScope<'_>,
        ty: TypeKey,
        bytes: &[u8],
    ) -> Result<Vec<Value>, GraphError> {
        let stack = parent.stack.push(ScopeKind::Split(ty));
        let annotate = |err: GraphError| stack.annotate(err, self.registry);

        let mut reader = open_reader(bytes).map_err(annotate)?;
        if !reader.header().split {
            return Err(annotate(GraphError::corrupt("nested payload is not a split stream")));
        }
        let mut scope = self.open_scope(stack.clone(), reader.as_ref());
        let list = self
            .read_payload(&mut scope, reader.as_mut())
            .and_then(|list| reader.finish().map(|()| list))
            .map_err(annotate)?;
        self.settle(&mut scope, self.fixup_passes).map_err(annotate)?;
        debug!("read scope closed: {}", stack.describe(self.registry));

        let node = list.borrow();
        let values = match node.reflect_ref() {
            ReflectRef::List(items) => items.as_slice().to_vec(),
            _ => Vec::new(),
        };
        Ok(values)
    }

    /// The `List<object>` wrapper of a split stream. It takes no id.
    fn read_payload(&self, scope: &mut ReadScope<'_>, reader: &mut dyn StorageReader) -> Result<ObjRef, GraphError> {
        let ty = match reader.read_type()? {
            TypeToken::Id(id) => scope.tables.resolve_type(id, self.registry)?,
            _ => return Err(GraphError::corrupt("split payload does not start with its list type")),
        };
        if ty != TypeKey::OBJECT_LIST || reader.read_marker()? != ObjectMarker::Fresh {
            return Err(GraphError::corrupt("split payload does not start with its list type"));
        }
        let list = ObjRef::new(List::new(TypeKey::OBJECT_LIST));
        self.read_list_items(scope, reader, &list, TypeKey::OBJECT)?;
        reader.end_object()?;
        Ok(list)
    }

    // -------------------------------------------------------------------------
    // Entries

    #[inline]
    fn path(&self, ty: TypeKey) -> &str {
        self.registry.get(ty).map_or("?", |meta| meta.path())
    }

    fn read_entry(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        declared: TypeKey,
    ) -> Result<Slot, GraphError> {
        self.read_entry_into(scope, reader, declared, None)
    }

    fn read_entry_into(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        declared: TypeKey,
        into: Option<&ObjRef>,
    ) -> Result<Slot, GraphError> {
        let token = reader.read_type()?;
        self.read_tagged(scope, reader, token, declared, into)
    }

    fn read_tagged(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        token: TypeToken,
        declared: TypeKey,
        into: Option<&ObjRef>,
    ) -> Result<Slot, GraphError> {
        let ty = match token {
            TypeToken::Null => return Ok(Slot::Ready(Value::Null)),
            TypeToken::Declared => declared,
            TypeToken::Id(id) => scope.tables.resolve_type(id, self.registry)?,
        };
        let info = self
            .registry
            .get_type_info(ty)
            .ok_or_else(|| GraphError::MissingType(format!("{ty}")))?;

        match info {
            TypeInfo::Primitive(primitive) => {
                return Ok(Slot::Ready(reader.read_primitive(primitive.kind())?));
            }
            TypeInfo::Enum(enum_info) => {
                let raw = reader.read_primitive(enum_info.repr())?;
                let discriminant = raw
                    .as_i128()
                    .and_then(|v| i64::try_from(v).ok())
                    .ok_or_else(|| GraphError::corrupt(format!("`{}` value is not an integer", info.path())))?;
                return Ok(Slot::Ready(Value::Enum(EnumValue { ty, discriminant })));
            }
            _ => {}
        }

        match reader.read_marker()? {
            ObjectMarker::Reference(id) => {
                trace!("reference to object {id}");
                scope.ids.lookup(id)
            }
            ObjectMarker::Custom => self.read_custom(scope, reader, info, into),
            ObjectMarker::Fresh => self.read_object(scope, reader, info, into),
        }
    }

    // -------------------------------------------------------------------------
    // Handler payloads

    fn read_custom(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        info: &TypeInfo,
        into: Option<&ObjRef>,
    ) -> Result<Slot, GraphError> {
        let ty = info.key();
        let handler = self.registry.handler_for(ty).ok_or_else(|| {
            GraphError::corrupt(format!("`{}` was written by a handler that is not registered", info.path()))
        })?;
        let id = info.is_reference_type().then(|| scope.ids.reserve());

        let data: Vec<Slot> = if handler.isolated() {
            let nested = reader.read_blob()?;
            self.read_split(scope, ty, &nested)?
                .into_iter()
                .map(Slot::Ready)
                .collect()
        } else {
            let count = reader.begin_list()?;
            let mut data = Vec::with_capacity(count);
            for _ in 0..count {
                data.push(self.read_entry(scope, reader, TypeKey::OBJECT)?);
            }
            reader.end_list()?;
            data
        };
        reader.end_object()?;

        let target = match id {
            Some(id) => Target::Identity(id),
            None => Target::Cell(LateCell::default()),
        };
        let pending = producer_of(&target);
        if data.iter().all(Slot::is_ready) {
            let values = data
                .into_iter()
                .map(|slot| match slot {
                    Slot::Ready(value) => value,
                    Slot::Pending(_) => Value::Null,
                })
                .collect();
            self.call_handler(scope, handler, ty, target, values, into.cloned())
        } else {
            trace!("handler for `{}` deferred until its payload resolves", info.path());
            scope.fixups.push(Fixup::HandlerCall {
                target,
                ty,
                handler,
                data,
                instance: into.cloned(),
            });
            Ok(Slot::Pending(pending))
        }
    }

    fn call_handler(
        &self,
        scope: &mut ReadScope<'_>,
        handler: Arc<dyn SerializeObject>,
        ty: TypeKey,
        target: Target,
        values: Vec<Value>,
        instance: Option<ObjRef>,
    ) -> Result<Slot, GraphError> {
        let result = handler
            .deserialize(values, instance, &mut DeserializeCx::new(self.registry, &mut scope.finals))
            .map_err(|err| err.in_type(self.path(ty)))?;
        match (result, target) {
            (Materialized::Ready(value), Target::Identity(id)) => {
                scope.ids.fill(id, value.clone());
                Ok(Slot::Ready(value))
            }
            (Materialized::Ready(value), Target::Cell(_)) => Ok(Slot::Ready(value)),
            (Materialized::Later(late), Target::Identity(id)) => {
                scope.fixups.push(Fixup::Fill {
                    target: Target::Identity(id),
                    producer: Producer::Late(late),
                });
                Ok(Slot::Pending(Producer::Identity(id)))
            }
            (Materialized::Later(late), Target::Cell(_)) => Ok(Slot::Pending(Producer::Late(late))),
        }
    }

    // -------------------------------------------------------------------------
    // Objects

    fn read_object(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        info: &TypeInfo,
        into: Option<&ObjRef>,
    ) -> Result<Slot, GraphError> {
        let ty = info.key();
        if into.is_some() && !matches!(info, TypeInfo::Struct(_)) {
            return Err(GraphError::unsupported(format!(
                "cannot deserialize `{}` into an existing instance",
                info.path()
            )));
        }

        let obj = match info {
            TypeInfo::Struct(_) => {
                let obj = match into {
                    Some(existing) if self.registry.is_assignable(existing.type_key(), ty) => existing.clone(),
                    Some(existing) => {
                        return Err(GraphError::unsupported(format!(
                            "an instance of `{}` cannot receive `{}`",
                            self.path(existing.type_key()),
                            info.path()
                        )));
                    }
                    None => construct(self.registry, self.factory, ty)?,
                };
                self.register(scope, info, &obj);
                if self.registry.get_type_trait::<TypeTraitOnDeserialized>(obj.type_key()).is_some() {
                    scope.created.push(obj.clone());
                }
                self.read_members(scope, reader, &obj, ty)?;
                obj
            }
            TypeInfo::List(list_info) => {
                let list = ObjRef::new(List::new(ty));
                self.register(scope, info, &list);
                self.read_list_items(scope, reader, &list, list_info.item())?;
                list
            }
            TypeInfo::Map(map_info) => {
                let map = ObjRef::new(Map::new(ty));
                self.register(scope, info, &map);
                self.read_map_entries(scope, reader, &map, map_info.key(), map_info.value())?;
                map
            }
            TypeInfo::Array(array_info) => {
                // Children may refer back to the array before it exists.
                let id = info.is_reference_type().then(|| scope.ids.reserve());
                let array = self.read_array(scope, reader, ty, array_info.item())?;
                if let Some(id) = id {
                    scope.ids.fill(id, Value::Object(array.clone()));
                }
                array
            }
            _ => {
                return Err(GraphError::corrupt(format!(
                    "`{}` cannot be read member-wise",
                    info.path()
                )));
            }
        };
        reader.end_object()?;
        Ok(Slot::Ready(Value::Object(obj)))
    }

    #[inline]
    fn register(&self, scope: &mut ReadScope<'_>, info: &TypeInfo, obj: &ObjRef) {
        if info.is_reference_type() {
            let id = scope.ids.reserve();
            scope.ids.fill(id, Value::Object(obj.clone()));
        }
    }

    fn read_members(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        obj: &ObjRef,
        ty: TypeKey,
    ) -> Result<(), GraphError> {
        let seen_before = scope.mark_seen(ty);

        let fields = self.registry.fields(ty, AccessMode::Normal, seen_before)?;
        let count = reader.begin_fields()?;
        self.read_member_list(scope, reader, obj, &fields, count)?;
        reader.end_fields()?;

        let properties = self.registry.properties(ty, AccessMode::Normal, seen_before)?;
        let count = reader.begin_properties()?;
        self.read_member_list(scope, reader, obj, &properties, count)?;
        reader.end_properties()
    }

    /// Matches members by name. The accessor after the last match is tried
    /// first, so streams in write order resolve without searching.
    fn read_member_list(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        obj: &ObjRef,
        accessors: &[Accessor],
        count: usize,
    ) -> Result<(), GraphError> {
        let mut cursor = 0;
        for _ in 0..count {
            let name_id = reader.read_name()?;
            let found = {
                let name = scope.tables.name(name_id)?;
                match accessors.get(cursor) {
                    Some(expected) if expected.name() == name => Some(cursor),
                    _ => accessors.iter().position(|accessor| accessor.name() == name),
                }
            };
            let token = reader.read_type()?;

            let Some(index) = found else {
                let name = scope.tables.name(name_id)?;
                if token == TypeToken::Declared {
                    let hint = match scope.verbose {
                        true => "",
                        false => "; streams written in verbose mode tolerate removed members",
                    };
                    return Err(GraphError::corrupt(format!(
                        "member `{name}` is unknown and carries no type tag{hint}"
                    )));
                }
                debug!("skipping unknown member `{name}`");
                self.read_tagged(scope, reader, token, TypeKey::OBJECT, None)?;
                continue;
            };
            cursor = index + 1;

            let accessor = &accessors[index];
            let declared = match accessor.specialist() {
                Some(_) => TypeKey::OBJECT,
                None => accessor.declared(),
            };
            match self.read_tagged(scope, reader, token, declared, None)? {
                Slot::Ready(value) => {
                    let owner = (!accessor.is_static()).then_some(obj);
                    let cx = ApplyCx {
                        registry: self.registry,
                        statics: self.statics,
                        ids: &mut scope.ids,
                        finals: &mut scope.finals,
                    };
                    assign_member(&cx, owner, accessor, value)?;
                }
                Slot::Pending(producer) if accessor.is_static() => scope.fixups.push(Fixup::Static {
                    accessor: accessor.clone(),
                    producer,
                }),
                Slot::Pending(producer) => scope.fixups.push(Fixup::Member {
                    owner: obj.clone(),
                    accessor: accessor.clone(),
                    producer,
                }),
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Collections

    fn read_list_items(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        list: &ObjRef,
        item: TypeKey,
    ) -> Result<(), GraphError> {
        let count = reader.begin_list()?;
        let mut items = Vec::with_capacity(count);
        for index in 0..count {
            match self.read_entry(scope, reader, item)? {
                Slot::Ready(value) => items.push(value),
                Slot::Pending(producer) => {
                    items.push(Value::Null);
                    scope.fixups.push(Fixup::ListItem {
                        list: list.clone(),
                        index,
                        producer,
                    });
                }
            }
        }
        reader.end_list()?;

        if let ReflectMut::List(target) = list.borrow_mut().reflect_mut() {
            for value in items {
                target.push(value);
            }
        }
        Ok(())
    }

    fn read_map_entries(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        map: &ObjRef,
        key_ty: TypeKey,
        value_ty: TypeKey,
    ) -> Result<(), GraphError> {
        let count = reader.begin_map()?;
        reader.begin_map_keys()?;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.read_entry(scope, reader, key_ty)?);
        }
        reader.end_map_keys()?;

        let value_count = reader.begin_map_values()?;
        if value_count != count {
            return Err(GraphError::corrupt(format!(
                "map has {count} keys but {value_count} values"
            )));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_entry(scope, reader, value_ty)?);
        }
        reader.end_map_values()?;
        reader.end_map()?;

        for (key, value) in keys.into_iter().zip(values) {
            match (key, value) {
                (Slot::Ready(key), Slot::Ready(value)) => insert_entry(map, key, value),
                (key, value) => scope.fixups.push(Fixup::MapEntry {
                    map: map.clone(),
                    key,
                    value,
                }),
            }
        }
        Ok(())
    }

    fn read_array(
        &self,
        scope: &mut ReadScope<'_>,
        reader: &mut dyn StorageReader,
        ty: TypeKey,
        item: TypeKey,
    ) -> Result<ObjRef, GraphError> {
        let lengths = reader.begin_array()?;
        let count = lengths
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| GraphError::corrupt("array dimensions overflow"))?;

        let mut pending = Vec::new();
        let items = match packed_kind(self.registry, item) {
            Some(kind) => {
                let bytes = reader.read_blob()?;
                unpack(kind, &bytes, count)?
            }
            None => {
                let mut items = Vec::new();
                for index in 0..count {
                    match self.read_entry(scope, reader, item)? {
                        Slot::Ready(value) => items.push(value),
                        Slot::Pending(producer) => {
                            items.push(Value::Null);
                            pending.push((index, producer));
                        }
                    }
                }
                items
            }
        };
        reader.end_array()?;

        let array = Array::from_items(ty, lengths, items)
            .ok_or_else(|| GraphError::corrupt("array length does not match its dimensions"))?;
        let array = ObjRef::new(array);
        for (index, producer) in pending {
            scope.fixups.push(Fixup::ArrayItem {
                array: array.clone(),
                index,
                producer,
            });
        }
        Ok(array)
    }
}

fn producer_of(target: &Target) -> Producer {
    match target {
        Target::Identity(id) => Producer::Identity(*id),
        Target::Cell(cell) => Producer::Late(Box::new(cell.clone())),
    }
}
