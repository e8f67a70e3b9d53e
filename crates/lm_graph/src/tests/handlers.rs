use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    BoxedHandler, boxed, boxed_registry, demo_registry, get, items, key, new_struct, node, object,
    serializer, set, text_payload, unbox,
};
use crate::info::{MemberInfo, OpaqueInfo, StructInfo, TypeInfo, TypeKey};
use crate::registry::{
    DeserializeCx, Materialized, MemberPolicy, SerializeCx, SerializeObject, Specialist, TypeRegistry,
};
use crate::settings::{Codec, Settings};
use crate::value::{List, Map, ObjRef, ReflectRef, Value};
use crate::{GraphError, HandlerError, Serializer};

/// Writes its name and reads back as that name.
struct Named(&'static str);

impl SerializeObject for Named {
    fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
        Ok(Vec::from([Value::from(self.0)]))
    }

    fn deserialize(
        &self,
        data: Vec<Value>,
        _: Option<ObjRef>,
        _: &mut DeserializeCx<'_>,
    ) -> Result<Materialized, HandlerError> {
        Ok(Materialized::Ready(data.into_iter().next().unwrap_or_default()))
    }
}

fn round_trip(serializer: &Serializer, value: ObjRef) -> Value {
    let bytes = serializer.serialize(&Value::Object(value)).unwrap();
    serializer.deserialize(&bytes).unwrap()
}

// -----------------------------------------------------------------------------
// Dispatch

#[test]
fn exact_handlers_win_over_subtype_handlers() {
    let mut registry = demo_registry();
    let shape = key(&registry, "demo.Shape");
    let circle = key(&registry, "demo.Circle");
    registry.register_subtype_handler(shape, true, Named("shape"));
    registry.register_subtype_handler(shape, false, Named("second"));
    let subtype_only = serializer(registry);
    let c = new_struct(subtype_only.registry(), "demo.Circle");
    assert_eq!(round_trip(&subtype_only, c), Value::from("shape"));

    let mut registry = demo_registry();
    registry.register_subtype_handler(shape, false, Named("shape"));
    registry.register_handler(circle, Named("exact"));
    let exact = serializer(registry);
    let c = new_struct(exact.registry(), "demo.Circle");
    assert_eq!(round_trip(&exact, c), Value::from("exact"));
}

#[test]
fn interfaces_only_handlers_ignore_class_bases() {
    let mut registry = demo_registry();
    let base = registry.register(StructInfo::new("demo.Base").with_member(MemberInfo::field("id", "i32")));
    registry.register(StructInfo::new("demo.Derived").with_base("demo.Base"));
    registry.register_subtype_handler(base, true, Named("base"));
    let serializer = serializer(registry);

    let derived = new_struct(serializer.registry(), "demo.Derived");
    set(serializer.registry(), &derived, "id", Value::I32(7));
    let copy = round_trip(&serializer, derived);
    assert_eq!(get(serializer.registry(), object(&copy), "id"), Value::I32(7));
}

/// Handles circles with a positive radius only.
struct Picky;

impl SerializeObject for Picky {
    fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
        Ok(Vec::new())
    }

    fn deserialize(
        &self,
        _: Vec<Value>,
        _: Option<ObjRef>,
        _: &mut DeserializeCx<'_>,
    ) -> Result<Materialized, HandlerError> {
        Ok(Materialized::Ready(Value::from("picked")))
    }

    fn can_serialize(&self, _: &TypeInfo, instance: Option<&ObjRef>) -> bool {
        instance.is_some_and(|obj| match obj.borrow().reflect_ref() {
            ReflectRef::Struct(circle) => circle.member(0).is_some_and(|r| r != Value::F64(0.0)),
            _ => false,
        })
    }
}

#[test]
fn declined_instances_fall_back_to_members() {
    let mut registry = demo_registry();
    let circle = key(&registry, "demo.Circle");
    registry.register_handler(circle, Picky);
    let serializer = serializer(registry);
    let r = &**serializer.registry();

    let flat = new_struct(r, "demo.Circle");
    let copy = round_trip(&serializer, flat);
    assert_eq!(get(r, object(&copy), "radius"), Value::F64(0.0));

    let round = new_struct(r, "demo.Circle");
    set(r, &round, "radius", Value::F64(2.0));
    assert_eq!(round_trip(&serializer, round), Value::from("picked"));
}

#[test]
fn per_instance_handlers_read_what_they_wrote() {
    for codec in [Codec::Binary, Codec::Text] {
        let mut registry = demo_registry();
        let circle = key(&registry, "demo.Circle");
        registry.register_handler(circle, Picky);
        let serializer = Serializer::new(Arc::new(registry))
            .with_settings(Settings { codec, ..Settings::default() })
            .unwrap();
        let r = &**serializer.registry();

        let round = new_struct(r, "demo.Circle");
        set(r, &round, "radius", Value::F64(1.5));
        let list = ObjRef::new(List::from_items(
            TypeKey::OBJECT_LIST,
            Vec::from([Value::Object(round.clone()), Value::Object(round)]),
        ));
        let copy = round_trip(&serializer, list);
        assert_eq!(items(&copy), [Value::from("picked"), Value::from("picked")]);
    }
}

#[test]
fn handler_failures_name_the_type() {
    struct Failing;

    impl SerializeObject for Failing {
        fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
            Err(HandlerError::new("disk on fire"))
        }

        fn deserialize(
            &self,
            _: Vec<Value>,
            _: Option<ObjRef>,
            _: &mut DeserializeCx<'_>,
        ) -> Result<Materialized, HandlerError> {
            Err(HandlerError::new("unreachable"))
        }
    }

    let mut registry = demo_registry();
    let ty = key(&registry, "demo.Boxed");
    registry.register_handler(ty, Failing);
    let serializer = serializer(registry);
    let value = Value::Object(boxed(serializer.registry(), Value::Null));
    match serializer.serialize(&value) {
        Err(GraphError::Handler(err)) => assert_eq!(err.message(), "`demo.Boxed`: disk on fire"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn opaque_types_without_handlers_are_unsupported() {
    let serializer = serializer(demo_registry());
    let value = Value::Object(boxed(serializer.registry(), Value::Null));
    assert!(matches!(serializer.serialize(&value), Err(GraphError::Unsupported(_))));
}

// -----------------------------------------------------------------------------
// Forward references

#[test]
fn members_referring_to_a_handler_object_are_linked_later() {
    let serializer = serializer(boxed_registry(false));
    let r = &**serializer.registry();
    let inner = node(r, "inner");
    let outer = boxed(r, Value::Object(inner.clone()));
    set(r, &inner, "tag", Value::Object(outer.clone()));

    let bytes = serializer.serialize(&Value::Object(outer)).unwrap();
    let mut staged = serializer.begin_deserialize(&bytes).unwrap();
    assert_eq!(staged.pending(), 1);
    let report = staged.process_fixups(1).unwrap();
    assert_eq!((report.resolved, report.remaining, report.stuck), (1, 0, false));

    let copy = staged.complete().unwrap();
    let inner = unbox(&copy);
    assert_eq!(get(r, object(&inner), "label"), Value::from("inner"));
    assert!(object(&get(r, object(&inner), "tag")).ptr_eq(object(&copy)));
}

#[test]
fn map_keys_referring_forward_are_inserted_later() {
    let serializer = serializer(boxed_registry(false));
    let r = &**serializer.registry();
    let map = ObjRef::new(Map::new(key(r, "Map<object,i32>")));
    let outer = boxed(r, Value::Object(map.clone()));
    if let Some(mut entries) = map.downcast_mut::<Map>() {
        entries.insert(Value::Object(outer.clone()), Value::I32(1)).unwrap();
    }

    let copy = round_trip(&serializer, outer);
    let map = unbox(&copy);
    match object(&map).borrow().reflect_ref() {
        ReflectRef::Map(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries.get(&copy), Some(&Value::I32(1)));
        }
        _ => panic!("not a map"),
    }
}

/// Produces its value only while fixups drain.
struct Lazy;

impl SerializeObject for Lazy {
    fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
        Ok(Vec::new())
    }

    fn deserialize(
        &self,
        _: Vec<Value>,
        _: Option<ObjRef>,
        _: &mut DeserializeCx<'_>,
    ) -> Result<Materialized, HandlerError> {
        let mut polls = 0;
        Ok(Materialized::Later(Box::new(move || {
            polls += 1;
            (polls > 1).then(|| Value::from("late"))
        })))
    }
}

#[test]
fn handler_calls_wait_for_late_payload_values() {
    let mut registry = boxed_registry(false);
    let lazy = registry.register(OpaqueInfo::new("demo.Lazy"));
    registry.register_handler(lazy, Lazy);
    let serializer = serializer(registry);
    let r = &**serializer.registry();

    let late = ObjRef::new(super::Boxed {
        ty: lazy,
        inner: Value::Null,
    });
    let outer = boxed(r, Value::Object(late));
    let bytes = serializer.serialize(&Value::Object(outer)).unwrap();

    let mut staged = serializer.begin_deserialize(&bytes).unwrap();
    assert_eq!(staged.pending(), 2);
    // The late value is not ready on its first poll.
    let report = staged.process_fixups(4).unwrap();
    assert_eq!((report.resolved, report.remaining, report.stuck), (0, 2, true));
    let report = staged.process_fixups(4).unwrap();
    assert_eq!((report.resolved, report.remaining, report.passes_run), (2, 0, 1));

    let copy = staged.complete().unwrap();
    assert_eq!(unbox(&copy), Value::from("late"));
}

#[test]
fn mutually_dependent_handler_payloads_are_stuck() {
    let serializer = serializer(boxed_registry(false));
    let r = &**serializer.registry();
    let second = boxed(r, Value::Null);
    let first = boxed(r, Value::Object(second.clone()));
    if let Some(mut b) = second.downcast_mut::<super::Boxed>() {
        b.inner = Value::Object(first.clone());
    }

    let bytes = serializer.serialize(&Value::Object(first)).unwrap();
    let mut staged = serializer.begin_deserialize(&bytes).unwrap();
    let report = staged.process_fixups(8).unwrap();
    assert!(report.stuck);
    assert_eq!(report.passes_run, 1);
    assert_eq!(report.remaining, 2);
    assert_eq!(report.diagnostics.len(), 2);

    assert!(staged.complete().unwrap_err().is_corrupt());
}

// -----------------------------------------------------------------------------
// Split scopes

#[test]
fn isolated_payloads_have_their_own_identities() {
    for codec in [Codec::Binary, Codec::Text] {
        let serializer = serializer(boxed_registry(true))
            .with_settings(Settings {
                codec,
                ..Settings::default()
            })
            .unwrap();
        let r = &**serializer.registry();

        let shared = node(r, "shared");
        let inside = List::from_items(
            key(r, "List<demo.Node>"),
            Vec::from([Value::Object(shared.clone()), Value::Object(shared.clone())]),
        );
        let sealed = boxed(r, Value::Object(ObjRef::new(inside)));
        let root = List::from_items(
            TypeKey::OBJECT_LIST,
            Vec::from([Value::Object(shared), Value::Object(sealed.clone()), Value::Object(sealed)]),
        );

        let bytes = serializer.serialize(&Value::Object(ObjRef::new(root))).unwrap();
        if codec == Codec::Text {
            let blobs = text_payload(&bytes)
                .split_whitespace()
                .filter(|token| token.starts_with('x'))
                .count();
            assert_eq!(blobs, 1);
        }
        let copy = items(&serializer.deserialize(&bytes).unwrap());

        assert!(object(&copy[1]).ptr_eq(object(&copy[2])));
        let inside = items(&unbox(&copy[1]));
        assert!(object(&inside[0]).ptr_eq(object(&inside[1])));
        assert!(!object(&inside[0]).ptr_eq(object(&copy[0])));
        assert_eq!(get(r, object(&inside[0]), "label"), Value::from("shared"));
    }
}

#[test]
fn isolated_payloads_read_on_their_own() {
    let serializer = serializer(boxed_registry(true))
        .with_settings(Settings {
            codec: Codec::Text,
            ..Settings::default()
        })
        .unwrap();
    let r = &**serializer.registry();

    let shared = node(r, "shared");
    let inside = List::from_items(
        key(r, "List<demo.Node>"),
        Vec::from([Value::Object(shared.clone()), Value::Object(shared.clone())]),
    );
    let sealed = boxed(r, Value::Object(ObjRef::new(inside)));
    let root = List::from_items(
        TypeKey::OBJECT_LIST,
        Vec::from([Value::Object(shared), Value::Object(sealed)]),
    );
    let bytes = serializer.serialize(&Value::Object(ObjRef::new(root))).unwrap();

    let payload = text_payload(&bytes);
    let hex = payload
        .split_whitespace()
        .find_map(|token| token.strip_prefix('x'))
        .unwrap();
    let nested: Vec<u8> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect();

    // The inner list is object 0 of the nested stream and the node object 1,
    // even though the outer stream already numbered the node.
    let references: Vec<String> = text_payload(&nested)
        .split_whitespace()
        .filter(|token| token.starts_with('&'))
        .map(String::from)
        .collect();
    assert_eq!(references, ["&1"]);

    let wrapper = serializer.deserialize(&nested).unwrap();
    let payload = items(&wrapper);
    assert_eq!(payload.len(), 1);
    let inside = items(&payload[0]);
    assert!(object(&inside[0]).ptr_eq(object(&inside[1])));
    assert_eq!(get(r, object(&inside[0]), "label"), Value::from("shared"));
}

#[test]
fn scope_depth_is_visible_to_handlers() {
    static DEEPEST: AtomicUsize = AtomicUsize::new(0);

    struct Probe;

    impl SerializeObject for Probe {
        fn serialize(&self, obj: &ObjRef, cx: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
            DEEPEST.fetch_max(cx.scope_depth(), Ordering::Relaxed);
            let inner = obj.downcast_ref::<super::Boxed>().map(|b| b.inner.clone());
            Ok(Vec::from([inner.unwrap_or_default()]))
        }

        fn deserialize(
            &self,
            data: Vec<Value>,
            _: Option<ObjRef>,
            cx: &mut DeserializeCx<'_>,
        ) -> Result<Materialized, HandlerError> {
            BoxedHandler { isolated: true }.deserialize(data, None, cx)
        }

        fn isolated(&self) -> bool {
            true
        }
    }

    let mut registry = demo_registry();
    let ty = key(&registry, "demo.Boxed");
    registry.register_handler(ty, Probe);
    let serializer = serializer(registry);
    let r = &**serializer.registry();
    let nested = boxed(r, Value::Object(boxed(r, Value::from("core"))));

    let copy = round_trip(&serializer, nested);
    assert_eq!(unbox(&unbox(&copy)), Value::from("core"));
    assert_eq!(DEEPEST.load(Ordering::Relaxed), 2);
}

// -----------------------------------------------------------------------------
// Member hooks

struct Upper;

impl Specialist for Upper {
    fn to_stream(&self, value: Value) -> Result<Value, HandlerError> {
        match value {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            other => Ok(other),
        }
    }

    fn from_stream(&self, value: Value) -> Result<Value, HandlerError> {
        match value {
            Value::String(s) => Ok(Value::String(s.to_lowercase())),
            other => Ok(other),
        }
    }
}

#[test]
fn specialists_transform_members_around_the_codec() {
    let mut registry = TypeRegistry::new();
    registry.register_specialist("upper", Upper);
    registry.register(
        StructInfo::new("demo.Code").with_member(MemberInfo::field("code", "string").with_specialist("upper")),
    );
    let serializer = serializer(registry)
        .with_settings(Settings {
            codec: Codec::Text,
            ..Settings::default()
        })
        .unwrap();
    let r = &**serializer.registry();

    let code = new_struct(r, "demo.Code");
    set(r, &code, "code", Value::from("abc"));
    let bytes = serializer.serialize(&Value::Object(code)).unwrap();
    assert!(text_payload(&bytes).contains("\"ABC\""));

    let copy = serializer.deserialize(&bytes).unwrap();
    assert_eq!(get(r, object(&copy), "code"), Value::from("abc"));
}

#[test]
fn member_policies_hide_members() {
    let mut registry = demo_registry();
    let ty = key(&registry, "demo.Node");
    registry.set_member_policy(ty, MemberPolicy::new().deny(["label"]));
    let serializer = serializer(registry)
        .with_settings(Settings {
            codec: Codec::Text,
            ..Settings::default()
        })
        .unwrap();
    let r = &**serializer.registry();

    let bytes = serializer.serialize(&Value::Object(node(r, "secret"))).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(!text.contains("label"));
    assert!(!text.contains("secret"));

    let copy = serializer.deserialize(&bytes).unwrap();
    assert_eq!(get(r, object(&copy), "label"), Value::Null);
}

#[test]
fn callbacks_run_after_linking() {
    static CALLBACKS: AtomicUsize = AtomicUsize::new(0);
    static DEFERRED: AtomicBool = AtomicBool::new(false);

    struct Deferring;

    impl SerializeObject for Deferring {
        fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
            Ok(Vec::new())
        }

        fn deserialize(
            &self,
            _: Vec<Value>,
            _: Option<ObjRef>,
            cx: &mut DeserializeCx<'_>,
        ) -> Result<Materialized, HandlerError> {
            cx.defer(|| {
                DEFERRED.store(true, Ordering::Relaxed);
                Ok(())
            });
            Ok(Materialized::Ready(Value::Null))
        }
    }

    let mut registry = demo_registry();
    let node_ty = key(&registry, "demo.Node");
    let boxed_ty = key(&registry, "demo.Boxed");
    registry.register_on_deserialized(node_ty, |_| {
        CALLBACKS.fetch_add(1, Ordering::Relaxed);
    });
    registry.register_handler(boxed_ty, Deferring);
    let roots = Arc::new(AtomicUsize::new(0));
    let seen = roots.clone();
    registry.on_deserialized(move |root| {
        assert!(root.as_object().is_some());
        seen.fetch_add(1, Ordering::Relaxed);
    });
    let serializer = serializer(registry);
    let r = &**serializer.registry();

    let a = node(r, "a");
    set(r, &a, "next", Value::Object(node(r, "b")));
    set(r, &a, "tag", Value::Object(boxed(r, Value::Null)));
    round_trip(&serializer, a);

    assert_eq!(CALLBACKS.load(Ordering::Relaxed), 2);
    assert!(DEFERRED.load(Ordering::Relaxed));
    assert_eq!(roots.load(Ordering::Relaxed), 1);
}

#[cfg(feature = "auto_register")]
mod auto_register {
    use alloc::sync::Arc;

    use super::super::{BoxedHandler, boxed, demo_registry, key, node, serializer, unbox};
    use crate::registry::{HandlerRegistration, RegistrationKind, SerializeObject};
    use crate::value::Value;

    fn make_boxed() -> Arc<dyn SerializeObject> {
        Arc::new(BoxedHandler { isolated: false })
    }

    inventory::submit! {
        HandlerRegistration {
            target: "demo.Boxed",
            kind: RegistrationKind::Handler(make_boxed),
        }
    }

    #[test]
    fn submitted_handlers_are_collected() {
        let mut registry = demo_registry();
        let ty = key(&registry, "demo.Boxed");
        assert!(registry.lookup_handler(ty, None).is_none());
        assert!(registry.auto_register() >= 1);
        assert!(registry.lookup_handler(ty, None).is_some());

        let serializer = serializer(registry);
        let r = &**serializer.registry();
        let value = Value::Object(boxed(r, Value::Object(node(r, "auto"))));
        let copy = serializer.deserialize(&serializer.serialize(&value).unwrap()).unwrap();
        assert!(unbox(&copy).as_object().is_some());
    }
}
