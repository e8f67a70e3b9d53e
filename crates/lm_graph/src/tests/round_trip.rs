use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;

use super::{demo_registry, get, items, key, new_struct, node, object, serializer, set, text_payload};
use crate::info::{MemberFlags, MemberInfo, StructInfo, TypeInfo, TypeKey};
use crate::registry::{ObjectFactory, TypeRegistry};
use crate::settings::{Codec, Prewarm, Settings};
use crate::value::{
    Array, DateTime, Decimal, DynamicObject, EnumValue, List, Map, ObjRef, Reflect, ReflectRef, TimeDelta,
    Uuid, Value, deep_eq,
};
use crate::Serializer;

fn with_settings(registry: TypeRegistry, settings: Settings) -> Serializer {
    serializer(registry).with_settings(settings).unwrap()
}

fn with_codec(registry: TypeRegistry, codec: Codec) -> Serializer {
    with_settings(registry, Settings {
        codec,
        ..Settings::default()
    })
}

/// `a -> b -> a`, with `a.children == [b, b]`.
fn cycle(registry: &TypeRegistry) -> ObjRef {
    let a = node(registry, "a");
    let b = node(registry, "b");
    set(registry, &a, "next", Value::Object(b.clone()));
    set(registry, &b, "next", Value::Object(a.clone()));
    let children = List::from_items(
        key(registry, "List<demo.Node>"),
        vec![Value::Object(b.clone()), Value::Object(b)],
    );
    set(registry, &a, "children", Value::Object(ObjRef::new(children)));
    a
}

#[test]
fn cycles_and_shared_nodes_survive_both_codecs() {
    for codec in [Codec::Binary, Codec::Text] {
        let serializer = with_codec(demo_registry(), codec);
        let r = &**serializer.registry();
        let a = cycle(r);

        let bytes = serializer.serialize(&Value::Object(a.clone())).unwrap();
        let copy = serializer.deserialize(&bytes).unwrap();

        let a2 = object(&copy);
        assert!(!a2.ptr_eq(&a));
        assert_eq!(get(r, a2, "label"), Value::from("a"));

        let b2 = get(r, a2, "next");
        assert_eq!(get(r, object(&b2), "label"), Value::from("b"));
        assert!(object(&get(r, object(&b2), "next")).ptr_eq(a2));

        let children = items(&get(r, a2, "children"));
        assert_eq!(children.len(), 2);
        assert!(object(&children[0]).ptr_eq(object(&b2)));
        assert!(object(&children[1]).ptr_eq(object(&b2)));

        assert!(deep_eq(&copy, &Value::Object(a)));
    }
}

#[test]
fn value_types_are_copied_not_shared() {
    let serializer = with_codec(demo_registry(), Codec::Text);
    let r = &**serializer.registry();

    let point = new_struct(r, "demo.Point");
    set(r, &point, "x", Value::F64(1.5));
    set(r, &point, "y", Value::F64(-2.0));
    let segment = new_struct(r, "demo.Segment");
    set(r, &segment, "from", Value::Object(point.clone()));
    set(r, &segment, "to", Value::Object(point));

    let bytes = serializer.serialize(&Value::Object(segment)).unwrap();
    assert!(!text_payload(&bytes).contains('&'));

    let copy = serializer.deserialize(&bytes).unwrap();
    let from = get(r, object(&copy), "from");
    let to = get(r, object(&copy), "to");
    assert!(!object(&from).ptr_eq(object(&to)));
    assert_eq!(get(r, object(&from), "x"), Value::F64(1.5));
    assert_eq!(get(r, object(&to), "y"), Value::F64(-2.0));
}

#[test]
fn primitives_and_collections_survive_both_codecs() {
    for codec in [Codec::Binary, Codec::Text] {
        let serializer = with_codec(demo_registry(), codec);
        let r = &**serializer.registry();
        let bag = new_struct(r, "demo.Bag");
        let shared = node(r, "shared");

        set(r, &bag, "when", Value::DateTime(DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap()));
        set(r, &bag, "span", Value::TimeSpan(TimeDelta::milliseconds(-1500)));
        set(r, &bag, "id", Value::Guid(Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef)));
        set(r, &bag, "price", Value::Decimal(Decimal::new(-12345, 2)));
        set(r, &bag, "ratio", Value::F32(0.25));
        set(r, &bag, "letter", Value::Char('λ'));
        set(r, &bag, "color", Value::Enum(EnumValue {
            ty: key(r, "demo.Color"),
            discriminant: 2,
        }));

        let mut table = Map::new(key(r, "Map<string,demo.Node>"));
        table.insert(Value::from("x"), Value::Object(shared.clone())).unwrap();
        table.insert(Value::from("y \"quoted\"\n"), Value::Object(shared.clone())).unwrap();
        set(r, &bag, "table", Value::Object(ObjRef::new(table)));

        let grid = (0..6).map(Value::I32).collect();
        let grid = Array::from_items(key(r, "Array<i32;2>"), vec![2, 3], grid).unwrap();
        set(r, &bag, "grid", Value::Object(ObjRef::new(grid)));

        let words = vec![Value::from("a"), Value::Null, Value::from("c")];
        let words = Array::from_items(key(r, "Array<string;1>"), vec![3], words).unwrap();
        set(r, &bag, "words", Value::Object(ObjRef::new(words)));

        let mut keyed = Map::new(key(r, "Map<object,i32>"));
        keyed.insert(Value::Object(shared), Value::I32(7)).unwrap();
        set(r, &bag, "keyed", Value::Object(ObjRef::new(keyed)));

        let bytes = serializer.serialize(&Value::Object(bag.clone())).unwrap();
        let copy = serializer.deserialize(&bytes).unwrap();
        assert!(deep_eq(&copy, &Value::Object(bag)), "{codec:?}");

        let copy = object(&copy);
        let table = get(r, copy, "table");
        let keyed = get(r, copy, "keyed");
        let (x, y) = match object(&table).borrow().reflect_ref() {
            ReflectRef::Map(map) => (
                map.get(&Value::from("x")).cloned().unwrap(),
                map.get(&Value::from("y \"quoted\"\n")).cloned().unwrap(),
            ),
            _ => panic!("not a map"),
        };
        assert!(object(&x).ptr_eq(object(&y)));
        match object(&keyed).borrow().reflect_ref() {
            ReflectRef::Map(map) => assert_eq!(map.get(&x), Some(&Value::I32(7))),
            _ => panic!("not a map"),
        }
    }
}

#[test]
fn type_tags_are_written_only_where_types_differ() {
    let count_tags = |payload: &str| {
        payload
            .split_whitespace()
            .filter(|token| token.starts_with('@') && token[1..].starts_with(|c: char| c.is_ascii_digit()))
            .count()
    };

    let serializer = with_codec(demo_registry(), Codec::Text);
    let r = &**serializer.registry();
    let a = node(r, "a");
    set(r, &a, "next", Value::Object(node(r, "b")));
    let payload = text_payload(&serializer.serialize(&Value::Object(a.clone())).unwrap());
    // Only the root, declared as `object`, carries a tag.
    assert_eq!(count_tags(&payload), 1);
    assert!(payload.contains("@d"));

    let verbose = with_settings(demo_registry(), Settings {
        codec: Codec::Text,
        verbose: true,
        ..Settings::default()
    });
    let payload = text_payload(&verbose.serialize(&Value::Object(a)).unwrap());
    assert!(!payload.contains("@d"));
    assert!(count_tags(&payload) > 1);
}

#[test]
fn list_items_are_tagged_only_when_they_are_subtypes() {
    let count_tags = |payload: &str| {
        payload
            .split_whitespace()
            .filter(|token| token.starts_with('@') && token[1..].starts_with(|c: char| c.is_ascii_digit()))
            .count()
    };

    let mut registry = demo_registry();
    let base = registry.register(StructInfo::new("demo.Base").with_member(MemberInfo::field("id", "i32")));
    let derived = registry.register(StructInfo::new("demo.Derived").with_base("demo.Base"));
    let list_ty = registry.list_of(base);
    let serializer = with_codec(registry, Codec::Text);
    let r = &**serializer.registry();

    let make = |path: &str, id: i32| {
        let obj = new_struct(r, path);
        set(r, &obj, "id", Value::I32(id));
        Value::Object(obj)
    };
    let write = |values: Vec<Value>| {
        let list = Value::Object(ObjRef::new(List::from_items(list_ty, values)));
        let bytes = serializer.serialize(&list).unwrap();
        (text_payload(&bytes), serializer.deserialize(&bytes).unwrap())
    };

    // Only the root list, declared as `object`, carries a tag.
    let (payload, _) = write(Vec::from([make("demo.Base", 1), make("demo.Base", 2)]));
    assert_eq!(count_tags(&payload), 1);

    let shared = make("demo.Base", 1);
    let (payload, copy) = write(Vec::from([shared.clone(), make("demo.Derived", 2), shared]));
    assert_eq!(count_tags(&payload), 2);

    let copy = items(&copy);
    assert_eq!(object(&copy[0]).type_key(), base);
    assert_eq!(object(&copy[1]).type_key(), derived);
    assert!(object(&copy[0]).ptr_eq(object(&copy[2])));
    assert_eq!(get(r, object(&copy[1]), "id"), Value::I32(2));
}

#[test]
fn declared_roots_round_trip_without_a_tag() {
    let serializer = with_codec(demo_registry(), Codec::Text);
    let r = &**serializer.registry();
    let ty = key(r, "demo.Node");
    let a = node(r, "a");

    let bytes = serializer.serialize_with(&Value::Object(a), ty).unwrap();
    assert!(text_payload(&bytes).starts_with("@d {"));

    let copy = serializer.deserialize_as(&bytes, ty).unwrap();
    assert_eq!(get(r, object(&copy), "label"), Value::from("a"));
    assert!(serializer.deserialize(&bytes).is_err());
}

#[test]
fn deserialize_into_keeps_members_missing_from_the_stream() {
    let serializer = serializer(demo_registry());
    let r = &**serializer.registry();

    // A zero weight equals the default and is left out of the stream.
    let source = node(r, "new");
    let bytes = serializer.serialize(&Value::Object(source)).unwrap();

    let target = node(r, "old");
    set(r, &target, "weight", Value::I32(9));
    serializer.deserialize_into(&bytes, &target).unwrap();
    assert_eq!(get(r, &target, "label"), Value::from("new"));
    assert_eq!(get(r, &target, "weight"), Value::I32(9));

    let circle = new_struct(r, "demo.Circle");
    assert!(serializer.deserialize_into(&bytes, &circle).is_err());
}

#[test]
fn deserialize_into_overwrites_every_member_when_defaults_are_written() {
    let serializer = with_settings(demo_registry(), Settings {
        skip_default_properties: false,
        ..Settings::default()
    });
    let r = &**serializer.registry();

    let source = node(r, "new");
    let bytes = serializer.serialize(&Value::Object(source.clone())).unwrap();

    let target = node(r, "old");
    set(r, &target, "weight", Value::I32(9));
    serializer.deserialize_into(&bytes, &target).unwrap();
    assert_eq!(get(r, &target, "weight"), Value::I32(0));
    assert!(deep_eq(&Value::Object(target), &Value::Object(source)));
}

#[test]
fn deep_clone_is_equal_and_disjoint() {
    let serializer = serializer(demo_registry());
    let r = &**serializer.registry();
    let a = cycle(r);

    let copy = serializer.deep_clone(&Value::Object(a.clone())).unwrap();
    assert!(deep_eq(&copy, &Value::Object(a.clone())));
    assert!(!object(&copy).ptr_eq(&a));

    set(r, object(&copy), "label", Value::from("changed"));
    assert_eq!(get(r, &a, "label"), Value::from("a"));
}

/// Builds nodes from their layout and counts them.
struct CountingFactory(Rc<Cell<usize>>);

impl ObjectFactory for CountingFactory {
    fn create(&self, info: &TypeInfo, registry: &TypeRegistry) -> Option<Box<dyn Reflect>> {
        if info.path() != "demo.Node" {
            return None;
        }
        self.0.set(self.0.get() + 1);
        let node = DynamicObject::from_layout(registry, info.key())?;
        Some(Box::new(node))
    }
}

#[test]
fn object_factories_build_rehydrated_instances() {
    let writer = serializer(demo_registry());
    let bytes = writer.serialize(&Value::Object(cycle(writer.registry()))).unwrap();

    let built = Rc::new(Cell::new(0));
    let reader = serializer(demo_registry()).with_factory(CountingFactory(built.clone()));
    let copy = reader.deserialize(&bytes).unwrap();
    assert_eq!(built.get(), 2);
    assert_eq!(get(reader.registry(), object(&copy), "label"), Value::from("a"));
}

#[test]
fn statics_are_written_with_the_first_instance() {
    let mut registry = demo_registry();
    let counter = registry.register(
        StructInfo::new("demo.Counter")
            .with_member(MemberInfo::field("count", "i32").with_flags(MemberFlags::STATIC))
            .with_member(MemberInfo::field("label", "string")),
    );
    let registry = alloc::sync::Arc::new(registry);
    let writer = Serializer::new(registry.clone())
        .with_settings(Settings {
            codec: Codec::Text,
            ..Settings::default()
        })
        .unwrap();
    writer.statics().set(counter, 0, Value::I32(5));

    let list = List::from_items(
        TypeKey::OBJECT_LIST,
        vec![
            Value::Object(new_struct(&registry, "demo.Counter")),
            Value::Object(new_struct(&registry, "demo.Counter")),
        ],
    );
    let bytes = writer.serialize(&Value::Object(ObjRef::new(list))).unwrap();
    let payload = text_payload(&bytes);
    assert_eq!(payload.matches("F2").count(), 1);
    assert_eq!(payload.matches("F1").count(), 1);

    let reader = Serializer::new(registry);
    assert!(reader.statics().is_empty());
    let copy = reader.deserialize(&bytes).unwrap();
    assert_eq!(items(&copy).len(), 2);
    assert_eq!(reader.statics().get(counter, 0), Some(Value::I32(5)));
}

#[test]
fn prewarmed_entries_stay_out_of_the_header() {
    let prewarm = Prewarm {
        types: vec![String::from("demo.Node")],
        names: vec![String::from("label")],
    };
    let serializer = with_settings(demo_registry(), Settings {
        codec: Codec::Text,
        prewarm: prewarm.clone(),
        ..Settings::default()
    });
    let r = &**serializer.registry();

    let bytes = serializer.serialize(&Value::Object(node(r, "a"))).unwrap();
    let text = core::str::from_utf8(&bytes).unwrap();
    assert!(text.contains("\ntypes 0\n"));
    assert!(!text.contains("\"label\""));
    assert!(text_payload(&bytes).starts_with("@50000 {"));

    let copy = serializer.deserialize(&bytes).unwrap();
    assert_eq!(get(r, object(&copy), "label"), Value::from("a"));

    let cold = super::serializer(demo_registry());
    assert!(cold.deserialize(&bytes).unwrap_err().is_corrupt());
}

#[test]
fn renamed_types_resolve_through_mapping_hooks() {
    let mut old = demo_registry();
    old.register(StructInfo::new("demo.Legacy").with_member(MemberInfo::field("label", "string")));
    let old = serializer(old);
    let legacy = new_struct(old.registry(), "demo.Legacy");
    set(old.registry(), &legacy, "label", Value::from("kept"));
    let bytes = old.serialize(&Value::Object(legacy)).unwrap();

    let missing = serializer(demo_registry());
    assert!(matches!(
        missing.deserialize(&bytes),
        Err(crate::GraphError::MissingType(path)) if path == "demo.Legacy"
    ));

    let mut mapped = demo_registry();
    mapped.on_type_mapping(|path, registry| match path {
        "demo.Legacy" => registry.resolve_path("demo.Node"),
        _ => None,
    });
    let mapped = serializer(mapped);
    let copy = mapped.deserialize(&bytes).unwrap();
    let copy = object(&copy);
    assert_eq!(copy.type_key(), key(mapped.registry(), "demo.Node"));
    assert_eq!(get(mapped.registry(), copy, "label"), Value::from("kept"));
}

fn item_registry(count: &str, kind: &str, extra: bool) -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register(StructInfo::new("demo.Other"));
    let mut item = StructInfo::new("demo.Item").with_member(MemberInfo::field("count", String::from(count)));
    if extra {
        item = item.with_member(MemberInfo::field("extra", "string"));
    }
    registry.register(item.with_member(MemberInfo::field("kind", String::from(kind))));
    registry
}

#[test]
fn schema_drift_is_tolerated_in_verbose_streams() {
    let write = |settings: Settings| {
        let writer = with_settings(item_registry("i32", "i32", true), settings);
        let r = &**writer.registry();
        let item = new_struct(r, "demo.Item");
        set(r, &item, "count", Value::I32(3));
        set(r, &item, "extra", Value::from("dropped"));
        set(r, &item, "kind", Value::I32(4));
        writer.serialize(&Value::Object(item)).unwrap()
    };

    // Untagged values of unknown members cannot be skipped.
    let plain = write(Settings::default());
    let reader = serializer(item_registry("i32", "i32", false));
    assert!(reader.deserialize(&plain).unwrap_err().is_corrupt());

    let verbose = write(Settings {
        verbose: true,
        ..Settings::default()
    });
    let copy = reader.deserialize(&verbose).unwrap();
    assert_eq!(get(reader.registry(), object(&copy), "kind"), Value::I32(4));

    let reader = serializer(item_registry("i64", "demo.Other", false));
    let copy = reader.deserialize(&verbose).unwrap();
    let copy = object(&copy);
    assert_eq!(get(reader.registry(), copy, "count"), Value::I64(3));
    // An `i32` cannot become a `demo.Other`; the member keeps its default.
    assert_eq!(get(reader.registry(), copy, "kind"), Value::Null);
}

#[test]
fn empty_containers_and_null_roots() {
    let serializer = serializer(demo_registry());
    let bytes = serializer.serialize(&Value::Null).unwrap();
    assert_eq!(serializer.deserialize(&bytes).unwrap(), Value::Null);

    let empty = Value::Object(ObjRef::new(List::new(TypeKey::OBJECT_LIST)));
    let copy = serializer.deserialize(&serializer.serialize(&empty).unwrap()).unwrap();
    assert!(items(&copy).is_empty());
}
