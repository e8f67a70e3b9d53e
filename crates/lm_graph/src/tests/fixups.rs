use alloc::boxed::Box;
use alloc::vec::Vec;

use super::{
    Boxed, boxed, boxed_registry, demo_registry, items, key, new_struct, node, object, serializer, set,
    unbox,
};
use crate::info::{MemberFlags, MemberInfo, OpaqueInfo, StructInfo, TypeKey};
use crate::registry::{DeserializeCx, Materialized, SerializeCx, SerializeObject};
use crate::value::{Array, List, ObjRef, ReflectRef, Value};
use crate::{GraphError, HandlerError};

/// A handler whose value never becomes available.
struct Never;

impl SerializeObject for Never {
    fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
        Ok(Vec::new())
    }

    fn deserialize(
        &self,
        _: Vec<Value>,
        _: Option<ObjRef>,
        _: &mut DeserializeCx<'_>,
    ) -> Result<Materialized, HandlerError> {
        Ok(Materialized::Later(Box::new(|| -> Option<Value> { None })))
    }
}

#[test]
fn unresolved_values_leave_their_destination_untouched() {
    let mut registry = boxed_registry(false);
    let never = registry.register(OpaqueInfo::new("demo.Never"));
    registry.register_handler(never, Never);
    let serializer = serializer(registry);

    let pending = ObjRef::new(Boxed {
        ty: never,
        inner: Value::Null,
    });
    let list = List::from_items(TypeKey::OBJECT_LIST, Vec::from([Value::Object(pending), Value::I32(4)]));
    let bytes = serializer.serialize(&Value::Object(ObjRef::new(list))).unwrap();

    let mut staged = serializer.begin_deserialize(&bytes).unwrap();
    assert_eq!(staged.pending(), 2);
    let report = staged.process_fixups(10).unwrap();
    assert!(report.stuck);
    assert_eq!(report.remaining, 2);
    assert!(report.diagnostics.iter().any(|line| line.contains("list item 0")));

    let copy = staged.complete().unwrap();
    assert_eq!(items(&copy), [Value::Null, Value::I32(4)]);

    let copy = serializer.deserialize(&bytes).unwrap();
    assert_eq!(items(&copy)[0], Value::Null);
}

#[test]
fn list_and_array_items_referring_forward_are_linked() {
    let mut registry = boxed_registry(false);
    let objects = registry.array_of(TypeKey::OBJECT, 1);
    let serializer = serializer(registry);
    let r = &**serializer.registry();

    let outer = boxed(r, Value::Null);
    let list = List::from_items(TypeKey::OBJECT_LIST, Vec::from([Value::Object(outer.clone())]));
    let array = Array::from_items(
        objects,
        Vec::from([2]),
        Vec::from([Value::Null, Value::Object(outer.clone())]),
    )
    .unwrap();
    let payload = List::from_items(
        TypeKey::OBJECT_LIST,
        Vec::from([Value::Object(ObjRef::new(list)), Value::Object(ObjRef::new(array))]),
    );
    if let Some(mut b) = outer.downcast_mut::<Boxed>() {
        b.inner = Value::Object(ObjRef::new(payload));
    }

    let bytes = serializer.serialize(&Value::Object(outer)).unwrap();
    let mut staged = serializer.begin_deserialize(&bytes).unwrap();
    assert_eq!(staged.pending(), 2);
    let copy = staged.complete().unwrap();

    let parts = items(&unbox(&copy));
    assert!(object(&items(&parts[0])[0]).ptr_eq(object(&copy)));
    match object(&parts[1]).borrow().reflect_ref() {
        ReflectRef::Array(array) => {
            assert_eq!(array.get(&[0]), Some(&Value::Null));
            assert!(object(&array.as_slice()[1]).ptr_eq(object(&copy)));
        }
        _ => panic!("not an array"),
    }
}

#[test]
fn static_members_referring_forward_are_linked() {
    let mut registry = boxed_registry(false);
    let holder = registry.register(
        StructInfo::new("demo.Holder")
            .with_member(MemberInfo::field("owner", "object").with_flags(MemberFlags::STATIC))
            .with_member(MemberInfo::field("label", "string")),
    );
    let writer = serializer(registry);
    let r = &**writer.registry();

    let held = new_struct(r, "demo.Holder");
    set(r, &held, "label", Value::from("held"));
    let outer = boxed(r, Value::Object(held));
    writer.statics().set(holder, 0, Value::Object(outer.clone()));
    let bytes = writer.serialize(&Value::Object(outer)).unwrap();

    writer.statics().clear();
    let copy = writer.deserialize(&bytes).unwrap();
    let owner = writer.statics().get(holder, 0).unwrap();
    assert!(object(&owner).ptr_eq(object(&copy)));
}

#[test]
fn failing_deferred_actions_fail_the_call() {
    struct Refusing;

    impl SerializeObject for Refusing {
        fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
            Ok(Vec::new())
        }

        fn deserialize(
            &self,
            _: Vec<Value>,
            _: Option<ObjRef>,
            cx: &mut DeserializeCx<'_>,
        ) -> Result<Materialized, HandlerError> {
            cx.defer(|| Err(HandlerError::new("validation failed")));
            Ok(Materialized::Ready(Value::Null))
        }
    }

    let mut registry = demo_registry();
    let ty = key(&registry, "demo.Boxed");
    registry.register_handler(ty, Refusing);
    let serializer = serializer(registry);
    let r = &**serializer.registry();

    let root = node(r, "root");
    set(r, &root, "tag", Value::Object(boxed(r, Value::Null)));
    let bytes = serializer.serialize(&Value::Object(root)).unwrap();
    match serializer.deserialize(&bytes) {
        Err(GraphError::Handler(err)) => assert_eq!(err.message(), "validation failed"),
        other => panic!("unexpected {other:?}"),
    }
}
