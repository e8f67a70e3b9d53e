//! End-to-end tests over a small demo schema.

mod corrupt;
mod fixups;
mod handlers;
mod round_trip;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use crate::Serializer;
use crate::info::{EnumInfo, InterfaceInfo, MemberInfo, OpaqueInfo, PrimitiveKind, StructInfo, TypeFlags, TypeKey};
use crate::registry::{DeserializeCx, Materialized, SerializeCx, SerializeObject, TypeRegistry};
use crate::value::{DynamicObject, ObjRef, Reflect, ReflectMut, ReflectRef, Struct, Value};
use crate::HandlerError;

// -----------------------------------------------------------------------------
// Schema

pub(crate) fn demo_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register(
        EnumInfo::new("demo.Color")
            .with_variant("Red", 0)
            .with_variant("Green", 1)
            .with_variant("Blue", 2)
            .with_repr(PrimitiveKind::U8),
    );
    registry.register(InterfaceInfo::new("demo.Shape"));
    registry.register(
        StructInfo::new("demo.Node")
            .with_member(MemberInfo::field("label", "string"))
            .with_member(MemberInfo::field("next", "demo.Node"))
            .with_member(MemberInfo::field("tag", "object"))
            .with_member(MemberInfo::field("children", "List<demo.Node>"))
            .with_member(MemberInfo::property("weight", "i32")),
    );
    registry.register(
        StructInfo::new("demo.Point")
            .with_flags(TypeFlags::VALUE_TYPE)
            .with_member(MemberInfo::field("x", "f64"))
            .with_member(MemberInfo::field("y", "f64")),
    );
    registry.register(
        StructInfo::new("demo.Segment")
            .with_member(MemberInfo::field("from", "demo.Point"))
            .with_member(MemberInfo::field("to", "demo.Point")),
    );
    registry.register(
        StructInfo::new("demo.Circle")
            .with_interface("demo.Shape")
            .with_member(MemberInfo::field("radius", "f64")),
    );
    registry.register(OpaqueInfo::new("demo.Boxed"));
    registry.register(
        StructInfo::new("demo.Bag")
            .with_member(MemberInfo::field("when", "datetime"))
            .with_member(MemberInfo::field("span", "timespan"))
            .with_member(MemberInfo::field("id", "guid"))
            .with_member(MemberInfo::field("price", "decimal"))
            .with_member(MemberInfo::field("ratio", "f32"))
            .with_member(MemberInfo::field("letter", "char"))
            .with_member(MemberInfo::field("color", "demo.Color"))
            .with_member(MemberInfo::field("table", "Map<string,demo.Node>"))
            .with_member(MemberInfo::field("grid", "Array<i32;2>"))
            .with_member(MemberInfo::field("words", "Array<string;1>"))
            .with_member(MemberInfo::field("keyed", "Map<object,i32>")),
    );
    registry
}

pub(crate) fn key(registry: &TypeRegistry, path: &str) -> TypeKey {
    registry.resolve_path(path).unwrap()
}

pub(crate) fn serializer(registry: TypeRegistry) -> Serializer {
    Serializer::new(Arc::new(registry))
}

// -----------------------------------------------------------------------------
// Graph helpers

/// A fresh instance of a registered struct with default members.
pub(crate) fn new_struct(registry: &TypeRegistry, path: &str) -> ObjRef {
    ObjRef::new(DynamicObject::from_layout(registry, key(registry, path)).unwrap())
}

pub(crate) fn node(registry: &TypeRegistry, label: &str) -> ObjRef {
    let obj = new_struct(registry, "demo.Node");
    set(registry, &obj, "label", Value::from(label));
    obj
}

pub(crate) fn set(registry: &TypeRegistry, obj: &ObjRef, name: &str, value: Value) {
    let index = registry.member_index(obj.type_key(), name).unwrap();
    match obj.borrow_mut().reflect_mut() {
        ReflectMut::Struct(target) => target.set_member(index, value).unwrap(),
        _ => panic!("not a struct"),
    }
}

pub(crate) fn get(registry: &TypeRegistry, obj: &ObjRef, name: &str) -> Value {
    let index = registry.member_index(obj.type_key(), name).unwrap();
    match obj.borrow().reflect_ref() {
        ReflectRef::Struct(target) => target.member(index).unwrap(),
        _ => panic!("not a struct"),
    }
}

pub(crate) fn object(value: &Value) -> &ObjRef {
    value.as_object().expect("an object")
}

pub(crate) fn items(list: &Value) -> Vec<Value> {
    match object(list).borrow().reflect_ref() {
        ReflectRef::List(list) => list.as_slice().to_vec(),
        _ => panic!("not a list"),
    }
}

/// The payload section of a text stream.
pub(crate) fn text_payload(bytes: &[u8]) -> String {
    let text = core::str::from_utf8(bytes).unwrap();
    let at = text.find("\npayload\n").unwrap();
    String::from(&text[at + "\npayload\n".len()..])
}

// -----------------------------------------------------------------------------
// Boxed: an opaque host type with a handler

/// Holds one value; serialized through [`BoxedHandler`].
#[derive(Debug)]
pub(crate) struct Boxed {
    pub ty: TypeKey,
    pub inner: Value,
}

impl Reflect for Boxed {
    fn type_key(&self) -> TypeKey {
        self.ty
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Opaque
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Opaque
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn boxed(registry: &TypeRegistry, inner: Value) -> ObjRef {
    ObjRef::new(Boxed {
        ty: key(registry, "demo.Boxed"),
        inner,
    })
}

pub(crate) fn unbox(value: &Value) -> Value {
    object(value).downcast_ref::<Boxed>().unwrap().inner.clone()
}

pub(crate) struct BoxedHandler {
    pub isolated: bool,
}

impl SerializeObject for BoxedHandler {
    fn serialize(&self, obj: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
        let boxed = obj
            .downcast_ref::<Boxed>()
            .ok_or_else(|| HandlerError::new("not a Boxed"))?;
        Ok(Vec::from([boxed.inner.clone()]))
    }

    fn deserialize(
        &self,
        mut data: Vec<Value>,
        _: Option<ObjRef>,
        cx: &mut DeserializeCx<'_>,
    ) -> Result<Materialized, HandlerError> {
        let inner = data.pop().ok_or_else(|| HandlerError::new("empty payload"))?;
        let ty = cx
            .registry()
            .resolve_path("demo.Boxed")
            .ok_or_else(|| HandlerError::new("demo.Boxed is not registered"))?;
        Ok(Materialized::Ready(Value::Object(ObjRef::new(Boxed { ty, inner }))))
    }

    fn isolated(&self) -> bool {
        self.isolated
    }
}

/// The demo schema with [`BoxedHandler`] registered.
pub(crate) fn boxed_registry(isolated: bool) -> TypeRegistry {
    let mut registry = demo_registry();
    let ty = key(&registry, "demo.Boxed");
    registry.register_handler(ty, BoxedHandler { isolated });
    registry
}
