//! Deferred work for values that are not available when they are read.
//!
//! Reading a value yields a [`Slot`]. A pending slot names what will
//! eventually produce the value: an object id whose object has not been
//! built yet, or a [`LateValue`] returned by a handler. Destinations that
//! receive a pending slot queue a [`Fixup`], and [`FixupQueue::drain`]
//! retries the queue in bounded passes until nothing resolves.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use log::{debug, warn};

use crate::access::Accessor;
use crate::de::coerce::coerce;
use crate::error::{FieldAssignmentError, GraphError};
use crate::info::TypeKey;
use crate::registry::{DeserializeCx, FinalAction, LateValue, Materialized, SerializeObject};
use crate::registry::TypeRegistry;
use crate::statics::Statics;
use crate::value::{ObjRef, ReflectMut, Value};

// -----------------------------------------------------------------------------
// Identities

/// Objects of the current scope by id. `None` marks an id that is
/// reserved but whose object is still being produced.
#[derive(Debug, Default)]
pub(crate) struct Identities(Vec<Option<Value>>);

impl Identities {
    #[inline]
    pub fn reserve(&mut self) -> u32 {
        self.0.push(None);
        (self.0.len() - 1) as u32
    }

    #[inline]
    pub fn fill(&mut self, id: u32, value: Value) {
        if let Some(slot) = self.0.get_mut(id as usize) {
            *slot = Some(value);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Resolves a back-reference read from the stream.
    pub fn lookup(&self, id: u32) -> Result<Slot, GraphError> {
        match self.0.get(id as usize) {
            Some(Some(value)) => Ok(Slot::Ready(value.clone())),
            Some(None) => Ok(Slot::Pending(Producer::Identity(id))),
            None => Err(GraphError::corrupt(format!(
                "reference to object {id}, but only {} objects were read",
                self.0.len()
            ))),
        }
    }

    #[inline]
    fn get(&self, id: u32) -> Option<Value> {
        self.0.get(id as usize).cloned().flatten()
    }
}

// -----------------------------------------------------------------------------
// Slot

/// A shared cell filled by a deferred handler call.
#[derive(Debug, Clone, Default)]
pub(crate) struct LateCell(Rc<RefCell<Option<Value>>>);

impl LateValue for LateCell {
    fn resolve(&mut self) -> Option<Value> {
        self.0.borrow().clone()
    }
}

/// What eventually produces a pending value.
pub(crate) enum Producer {
    Identity(u32),
    Late(Box<dyn LateValue>),
}

impl Producer {
    fn poll(&mut self, ids: &Identities) -> Option<Value> {
        match self {
            Self::Identity(id) => ids.get(*id),
            Self::Late(late) => late.resolve(),
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(id) => write!(f, "object {id}"),
            Self::Late(_) => f.write_str("late handler value"),
        }
    }
}

/// The result of reading one value.
#[derive(Debug)]
pub(crate) enum Slot {
    Ready(Value),
    Pending(Producer),
}

impl Slot {
    /// Resolves the slot in place, returning the value once available.
    pub fn poll(&mut self, ids: &Identities) -> Option<Value> {
        match self {
            Self::Ready(value) => Some(value.clone()),
            Self::Pending(producer) => {
                let value = producer.poll(ids)?;
                *self = Self::Ready(value.clone());
                Some(value)
            }
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

// -----------------------------------------------------------------------------
// Fixup

/// Where a handler result is stored.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Identity(u32),
    Cell(LateCell),
}

impl Target {
    fn fill(&self, ids: &mut Identities, value: Value) {
        match self {
            Self::Identity(id) => ids.fill(*id, value),
            Self::Cell(cell) => *cell.0.borrow_mut() = Some(value),
        }
    }
}

/// A queued assignment waiting on a [`Producer`].
pub(crate) enum Fixup {
    Member {
        owner: ObjRef,
        accessor: Accessor,
        producer: Producer,
    },
    Static {
        accessor: Accessor,
        producer: Producer,
    },
    ListItem {
        list: ObjRef,
        index: usize,
        producer: Producer,
    },
    ArrayItem {
        array: ObjRef,
        index: usize,
        producer: Producer,
    },
    /// Map entries wait for both halves; a map cannot hold a placeholder key.
    MapEntry {
        map: ObjRef,
        key: Slot,
        value: Slot,
    },
    /// Stores a late handler value once it resolves.
    Fill {
        target: Target,
        producer: Producer,
    },
    /// A handler whose payload still has pending values.
    HandlerCall {
        target: Target,
        ty: TypeKey,
        handler: Arc<dyn SerializeObject>,
        data: Vec<Slot>,
        instance: Option<ObjRef>,
    },
}

impl fmt::Debug for Fixup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member { accessor, producer, .. } => {
                write!(f, "member `{}` waiting on {producer:?}", accessor.name())
            }
            Self::Static { accessor, producer } => {
                write!(f, "static `{}` waiting on {producer:?}", accessor.name())
            }
            Self::ListItem { index, producer, .. } => {
                write!(f, "list item {index} waiting on {producer:?}")
            }
            Self::ArrayItem { index, producer, .. } => {
                write!(f, "array item {index} waiting on {producer:?}")
            }
            Self::MapEntry { key, value, .. } => write!(f, "map entry {key:?} => {value:?}"),
            Self::Fill { target, producer } => write!(f, "{target:?} waiting on {producer:?}"),
            Self::HandlerCall { ty, data, .. } => {
                let pending = data.iter().filter(|slot| !slot.is_ready()).count();
                write!(f, "handler for type {ty} waiting on {pending} values")
            }
        }
    }
}

/// State a fixup may touch while it is applied.
pub(crate) struct ApplyCx<'a> {
    pub registry: &'a TypeRegistry,
    pub statics: &'a Statics,
    pub ids: &'a mut Identities,
    pub finals: &'a mut Vec<FinalAction>,
}

/// Applies a value to a member, logging and skipping values that cannot
/// be converted or stored.
pub(crate) fn assign_member(
    cx: &ApplyCx<'_>,
    owner: Option<&ObjRef>,
    accessor: &Accessor,
    value: Value,
) -> Result<(), GraphError> {
    let value = match accessor.specialist() {
        Some(specialist) => specialist
            .from_stream(value)
            .map_err(|err| err.in_type(accessor.name()))?,
        None => value,
    };
    let result = coerce(value, accessor.declared(), cx.registry).and_then(|value| match owner {
        Some(owner) => match owner.borrow_mut().reflect_mut() {
            ReflectMut::Struct(target) => accessor.set(target, cx.statics, value),
            _ => Err(value),
        },
        None => accessor.set_static(cx.statics, value),
    });
    if let Err(found) = result {
        let err = FieldAssignmentError {
            member: accessor.name().to_owned().into(),
            expected: cx
                .registry
                .get(accessor.declared())
                .map(|meta| String::from(meta.path()))
                .unwrap_or_default()
                .into(),
            found: describe(&found, cx.registry).into(),
        };
        warn!("{err}; member skipped");
    }
    Ok(())
}

fn describe(value: &Value, registry: &TypeRegistry) -> String {
    match value.runtime_type().and_then(|key| registry.get(key)) {
        Some(meta) => String::from(meta.path()),
        None => String::from("null"),
    }
}

impl Fixup {
    /// Returns `Ok(None)` once applied, or the fixup itself if still pending.
    /// New fixups created while applying are pushed to `spawned`.
    fn apply(self, cx: &mut ApplyCx<'_>, spawned: &mut Vec<Fixup>) -> Result<Option<Self>, GraphError> {
        match self {
            Self::Member {
                owner,
                accessor,
                mut producer,
            } => match producer.poll(cx.ids) {
                Some(value) => assign_member(cx, Some(&owner), &accessor, value).map(|()| None),
                None => Ok(Some(Self::Member {
                    owner,
                    accessor,
                    producer,
                })),
            },
            Self::Static {
                accessor,
                mut producer,
            } => match producer.poll(cx.ids) {
                Some(value) => assign_member(cx, None, &accessor, value).map(|()| None),
                None => Ok(Some(Self::Static { accessor, producer })),
            },
            Self::ListItem {
                list,
                index,
                mut producer,
            } => match producer.poll(cx.ids) {
                Some(value) => {
                    if let ReflectMut::List(items) = list.borrow_mut().reflect_mut() {
                        items.set(index, value);
                    }
                    Ok(None)
                }
                None => Ok(Some(Self::ListItem {
                    list,
                    index,
                    producer,
                })),
            },
            Self::ArrayItem {
                array,
                index,
                mut producer,
            } => match producer.poll(cx.ids) {
                Some(value) => {
                    if let ReflectMut::Array(items) = array.borrow_mut().reflect_mut() {
                        items.set_flat(index, value);
                    }
                    Ok(None)
                }
                None => Ok(Some(Self::ArrayItem {
                    array,
                    index,
                    producer,
                })),
            },
            Self::MapEntry {
                map,
                mut key,
                mut value,
            } => {
                let k = key.poll(cx.ids);
                let v = value.poll(cx.ids);
                match (k, v) {
                    (Some(k), Some(v)) => {
                        insert_entry(&map, k, v);
                        Ok(None)
                    }
                    _ => Ok(Some(Self::MapEntry { map, key, value })),
                }
            }
            Self::Fill {
                target,
                mut producer,
            } => match producer.poll(cx.ids) {
                Some(value) => {
                    target.fill(cx.ids, value);
                    Ok(None)
                }
                None => Ok(Some(Self::Fill { target, producer })),
            },
            Self::HandlerCall {
                target,
                ty,
                handler,
                mut data,
                instance,
            } => {
                let mut values = Vec::with_capacity(data.len());
                for slot in &mut data {
                    match slot.poll(cx.ids) {
                        Some(value) => values.push(value),
                        None => {
                            return Ok(Some(Self::HandlerCall {
                                target,
                                ty,
                                handler,
                                data,
                                instance,
                            }));
                        }
                    }
                }
                let result = handler
                    .deserialize(values, instance, &mut DeserializeCx::new(cx.registry, cx.finals))
                    .map_err(|err| err.in_type(type_path(cx.registry, ty)))?;
                match result {
                    Materialized::Ready(value) => target.fill(cx.ids, value),
                    Materialized::Later(late) => spawned.push(Self::Fill {
                        target,
                        producer: Producer::Late(late),
                    }),
                }
                Ok(None)
            }
        }
    }
}

fn type_path(registry: &TypeRegistry, ty: TypeKey) -> &str {
    registry.get(ty).map_or("?", |meta| meta.path())
}

/// Inserts a map entry read from a stream. Null keys are dropped.
pub(crate) fn insert_entry(map: &ObjRef, key: Value, value: Value) {
    if let ReflectMut::Map(entries) = map.borrow_mut().reflect_mut()
        && entries.insert(key, value).is_err()
    {
        warn!("map entry with a null key dropped");
    }
}

// -----------------------------------------------------------------------------
// FixupQueue

/// Statistics of a [`FixupQueue::drain`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub passes_run: usize,
    pub resolved: usize,
    pub remaining: usize,
    /// A pass resolved nothing while fixups remained.
    pub stuck: bool,
    /// One line per unresolved fixup, filled when the drain stops short.
    pub diagnostics: Vec<String>,
}

/// Pending assignments of one scope.
#[derive(Debug, Default)]
pub(crate) struct FixupQueue {
    items: Vec<Fixup>,
}

impl FixupQueue {
    #[inline]
    pub fn push(&mut self, fixup: Fixup) {
        self.items.push(fixup);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Runs at most `passes` passes over the queue.
    ///
    /// Stops early once the queue is empty or a pass resolves nothing.
    pub fn drain(&mut self, passes: usize, cx: &mut ApplyCx<'_>) -> Result<DrainReport, GraphError> {
        let mut report = DrainReport::default();
        while !self.items.is_empty() && report.passes_run < passes {
            report.passes_run += 1;
            let before = self.items.len();
            let mut spawned = Vec::new();
            let mut kept = Vec::with_capacity(before);
            for fixup in core::mem::take(&mut self.items) {
                if let Some(pending) = fixup.apply(cx, &mut spawned)? {
                    kept.push(pending);
                }
            }
            let resolved = before - kept.len();
            report.resolved += resolved;
            kept.append(&mut spawned);
            self.items = kept;
            if resolved == 0 {
                report.stuck = true;
                break;
            }
        }

        report.remaining = self.items.len();
        if report.remaining > 0 {
            report.diagnostics = self.items.iter().map(|fixup| format!("{fixup:?}")).collect();
            if report.stuck {
                warn!(
                    "{} fixups are stuck after {} passes: {}",
                    report.remaining,
                    report.passes_run,
                    report.diagnostics.join("; ")
                );
            }
        }
        debug!(
            "fixup drain: {} resolved in {} passes, {} remaining",
            report.resolved, report.passes_run, report.remaining
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::{ApplyCx, Fixup, FixupQueue, Identities, Producer, Slot};
    use crate::info::TypeKey;
    use crate::registry::TypeRegistry;
    use crate::statics::Statics;
    use crate::value::{List, Map, ObjRef, ReflectRef, Value};

    #[test]
    fn drains_in_dependency_order_and_detects_stuck_items() {
        let registry = TypeRegistry::new();
        let statics = Statics::new();
        let mut ids = Identities::default();
        let mut finals = Vec::new();

        let list = ObjRef::new(List::from_items(TypeKey::OBJECT_LIST, Vec::from([Value::Null])));
        let map = ObjRef::new(Map::new(TypeKey::OBJECT));
        let target = ids.reserve();
        let never = ids.reserve();

        let mut queue = FixupQueue::default();
        queue.push(Fixup::ListItem {
            list: list.clone(),
            index: 0,
            producer: Producer::Identity(target),
        });
        queue.push(Fixup::MapEntry {
            map: map.clone(),
            key: Slot::Pending(Producer::Identity(target)),
            value: Slot::Ready(Value::I32(5)),
        });
        queue.push(Fixup::ListItem {
            list: list.clone(),
            index: 0,
            producer: Producer::Identity(never),
        });

        let mut cx = ApplyCx {
            registry: &registry,
            statics: &statics,
            ids: &mut ids,
            finals: &mut finals,
        };
        let report = queue.drain(4, &mut cx).unwrap();
        assert_eq!(report.passes_run, 1);
        assert!(report.stuck);
        assert_eq!(report.remaining, 3);
        assert_eq!(report.diagnostics.len(), 3);

        let obj = ObjRef::new(List::new(TypeKey::OBJECT_LIST));
        cx.ids.fill(target, Value::Object(obj.clone()));
        let report = queue.drain(4, &mut cx).unwrap();
        assert_eq!(report.resolved, 2);
        assert_eq!(report.remaining, 1);

        let list = list.borrow();
        let ReflectRef::List(items) = list.reflect_ref() else {
            panic!("expected a list");
        };
        assert_eq!(items.get(0), Some(&Value::Object(obj.clone())));
        let map = map.borrow();
        let ReflectRef::Map(entries) = map.reflect_ref() else {
            panic!("expected a map");
        };
        assert_eq!(entries.get(&Value::Object(obj)), Some(&Value::I32(5)));
    }
}
