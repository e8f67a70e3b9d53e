use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use super::{boxed, boxed_registry, demo_registry, get, node, object, serializer, set};
use crate::info::{MemberInfo, StructInfo, TypeFlags};
use crate::settings::{Codec, Settings};
use crate::value::{DynamicObject, ObjRef, Reflect, Value};
use crate::{GraphError, Serializer};

fn text_serializer(serializer: Serializer) -> Serializer {
    serializer
        .with_settings(Settings {
            codec: Codec::Text,
            ..Settings::default()
        })
        .unwrap()
}

fn pair(serializer: &Serializer) -> Value {
    let r = &**serializer.registry();
    let a = node(r, "a");
    let b = node(r, "b");
    set(r, &a, "next", Value::Object(b.clone()));
    set(r, &b, "next", Value::Object(a.clone()));
    Value::Object(a)
}

#[test]
fn dangling_references_are_corrupt() {
    let serializer = text_serializer(serializer(demo_registry()));
    let bytes = serializer.serialize(&pair(&serializer)).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("&0"), "{text}");

    let broken = text.replace("&0", "&99");
    let err = serializer.deserialize(broken.as_bytes()).unwrap_err();
    assert!(err.is_corrupt(), "{err}");
}

#[test]
fn truncated_and_padded_streams_are_corrupt() {
    let serializer = serializer(demo_registry());
    let bytes = serializer.serialize(&pair(&serializer)).unwrap();
    for len in 0..bytes.len() {
        match serializer.deserialize(&bytes[..len]) {
            Err(err) => assert!(err.is_corrupt(), "prefix {len}: {err}"),
            Ok(value) => panic!("prefix {len} produced {value:?}"),
        }
    }

    let mut padded = bytes.clone();
    padded.push(0);
    assert!(serializer.deserialize(&padded).unwrap_err().is_corrupt());
}

#[test]
fn unterminated_text_is_corrupt() {
    let serializer = text_serializer(serializer(demo_registry()));
    let bytes = serializer.serialize(&pair(&serializer)).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let cut = text.trim_end().strip_suffix('}').unwrap();
    assert!(serializer.deserialize(cut.as_bytes()).unwrap_err().is_corrupt());
}

#[test]
fn foreign_headers_are_rejected() {
    let serializer = serializer(demo_registry());
    for bytes in [&b"nope"[..], &b""[..], &b"SerV 12 0\ntypes 0\nnames 0\npayload\n@n\n"[..]] {
        assert!(serializer.deserialize(bytes).unwrap_err().is_corrupt());
    }
    let null = b"SerV 11 0\ntypes 0\nnames 0\npayload\n@n\n";
    assert_eq!(serializer.deserialize(null).unwrap(), Value::Null);
}

#[test]
fn handler_objects_need_their_handler() {
    let writer = serializer(boxed_registry(false));
    let value = Value::Object(boxed(writer.registry(), Value::from("sealed")));
    let bytes = writer.serialize(&value).unwrap();

    let reader = serializer(demo_registry());
    assert!(reader.deserialize(&bytes).unwrap_err().is_corrupt());
}

#[test]
fn abstract_types_need_a_create_hook() {
    let schema = || {
        let mut registry = demo_registry();
        let ty = registry.register(
            StructInfo::new("demo.Abstract")
                .with_flags(TypeFlags::ABSTRACT)
                .with_member(MemberInfo::field("id", "i32")),
        );
        (registry, ty)
    };

    let (registry, ty) = schema();
    let plain = serializer(registry);
    let value = Value::Object(ObjRef::new(DynamicObject::new(ty, Vec::from([Value::I32(3)]))));
    let bytes = plain.serialize(&value).unwrap();
    match plain.deserialize(&bytes) {
        Err(GraphError::MissingConstructor(path)) => assert_eq!(path, "demo.Abstract"),
        other => panic!("unexpected {other:?}"),
    }

    let (mut registry, _) = schema();
    registry.on_create_type(|info| {
        (info.path() == "demo.Abstract").then(|| {
            Box::new(DynamicObject::new(info.key(), Vec::from([Value::I32(0)]))) as Box<dyn Reflect>
        })
    });
    let hooked = serializer(registry);
    let copy = hooked.deserialize(&bytes).unwrap();
    assert_eq!(get(hooked.registry(), object(&copy), "id"), Value::I32(3));
}
