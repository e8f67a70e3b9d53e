use lm_utils::PtrMap;

use crate::value::{ReflectRef, Value};

/// Structural graph equality.
///
/// Two graphs are equal when they have the same shape and the same
/// primitive contents, and when sharing matches: an object reachable twice
/// in `a` must correspond to a single object in `b`. Cycles are handled.
/// Opaque objects defer to [`Reflect::opaque_eq`](crate::value::Reflect::opaque_eq).
///
/// # Examples
///
/// ```
/// use lm_graph::info::TypeKey;
/// use lm_graph::value::{List, ObjRef, Value, deep_eq};
///
/// let make = || {
///     let mut list = List::new(TypeKey::OBJECT_LIST);
///     list.push(1_i32);
///     Value::Object(ObjRef::new(list))
/// };
///
/// assert!(deep_eq(&make(), &make()));
/// assert_ne!(make(), make());
/// ```
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    let mut pairs = PtrMap::new();
    eq_inner(a, b, &mut pairs)
}

fn eq_inner(a: &Value, b: &Value, pairs: &mut PtrMap<*const ()>) -> bool {
    let (Value::Object(x), Value::Object(y)) = (a, b) else {
        return a == b;
    };

    if let Some(&mapped) = pairs.get(x.addr()) {
        return mapped == y.addr();
    }
    pairs.insert(x.addr(), y.addr());

    let (xr, yr) = (x.borrow(), y.borrow());
    if xr.type_key() != yr.type_key() {
        return false;
    }

    match (xr.reflect_ref(), yr.reflect_ref()) {
        (ReflectRef::Struct(s), ReflectRef::Struct(t)) => {
            s.member_len() == t.member_len()
                && (0..s.member_len()).all(|i| match (s.member(i), t.member(i)) {
                    (Some(p), Some(q)) => eq_inner(&p, &q, pairs),
                    (None, None) => true,
                    _ => false,
                })
        }
        (ReflectRef::List(l), ReflectRef::List(m)) => {
            l.len() == m.len() && l.iter().zip(m.iter()).all(|(p, q)| eq_inner(p, q, pairs))
        }
        (ReflectRef::Array(l), ReflectRef::Array(m)) => {
            l.lengths() == m.lengths()
                && l.as_slice()
                    .iter()
                    .zip(m.as_slice())
                    .all(|(p, q)| eq_inner(p, q, pairs))
        }
        (ReflectRef::Map(l), ReflectRef::Map(m)) => {
            if l.len() != m.len() {
                return false;
            }
            if l.keys().any(|k| k.as_object().is_some()) {
                // Object keys have no identity across graphs; compare in order.
                l.iter()
                    .zip(m.iter())
                    .all(|((k1, v1), (k2, v2))| eq_inner(k1, k2, pairs) && eq_inner(v1, v2, pairs))
            } else {
                l.iter().all(|(k, v1)| match m.get(k) {
                    Some(v2) => eq_inner(v1, v2, pairs),
                    None => false,
                })
            }
        }
        (ReflectRef::Opaque, ReflectRef::Opaque) => xr.opaque_eq(&*yr),
        _ => false,
    }
}
