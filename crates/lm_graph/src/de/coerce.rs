use alloc::string::String;

use crate::info::{PrimitiveKind, TypeInfo, TypeKey};
use crate::registry::TypeRegistry;
use crate::value::{Decimal, EnumValue, Value};

/// Converts a read value to the declared type of its destination.
///
/// Values already assignable pass through. Otherwise integers widen or
/// narrow when they fit, integers and `f32` widen to floats, integers and
/// variant names become enum values, and a `char` becomes a string. The
/// value is handed back unchanged when no conversion applies.
pub(crate) fn coerce(value: Value, target: TypeKey, registry: &TypeRegistry) -> Result<Value, Value> {
    let Some(info) = registry.get_type_info(target) else {
        return Err(value);
    };

    let runtime = match value.runtime_type() {
        Some(runtime) => runtime,
        None if info.is_primitive_like() && target != PrimitiveKind::String.type_key() => {
            return Err(value);
        }
        None => return Ok(value),
    };
    if registry.is_assignable(runtime, target) {
        return Ok(value);
    }

    match info {
        TypeInfo::Primitive(primitive) => convert(value, primitive.kind()),
        TypeInfo::Enum(enum_info) => {
            let discriminant = match &value {
                Value::String(name) => enum_info.discriminant_of(name),
                Value::Enum(_) => None,
                other => other.as_i128().and_then(|v| i64::try_from(v).ok()),
            };
            match discriminant {
                Some(discriminant) => Ok(Value::Enum(EnumValue {
                    ty: target,
                    discriminant,
                })),
                None => Err(value),
            }
        }
        _ => Err(value),
    }
}

fn convert(value: Value, kind: PrimitiveKind) -> Result<Value, Value> {
    if kind.is_integer() {
        return match value.as_i128().and_then(|v| Value::from_i128(kind, v)) {
            Some(converted) => Ok(converted),
            None => Err(value),
        };
    }
    let converted = match (kind, &value) {
        (PrimitiveKind::F64, Value::F32(v)) => Some(Value::F64(*v as f64)),
        (PrimitiveKind::F64, other) => other.as_i128().map(|v| Value::F64(v as f64)),
        (PrimitiveKind::F32, other) => other.as_i128().map(|v| Value::F32(v as f32)),
        (PrimitiveKind::Decimal, other) => other.as_i128().map(|v| Value::Decimal(Decimal::new(v, 0))),
        (PrimitiveKind::String, Value::Char(c)) => Some(Value::String(String::from(*c))),
        _ => None,
    };
    converted.ok_or(value)
}

#[cfg(test)]
mod tests {
    use super::coerce;
    use crate::info::{EnumInfo, PrimitiveKind};
    use crate::registry::TypeRegistry;
    use crate::value::{EnumValue, Value};

    #[test]
    fn numeric_and_enum_coercion() {
        let mut registry = TypeRegistry::new();
        let color = registry.register(EnumInfo::new("demo.Color").with_variant("Red", 1).with_variant("Blue", 2));
        let key = |k: PrimitiveKind| k.type_key();

        assert_eq!(coerce(Value::I16(7), key(PrimitiveKind::I64), &registry), Ok(Value::I64(7)));
        assert_eq!(coerce(Value::I32(-1), key(PrimitiveKind::U8), &registry), Err(Value::I32(-1)));
        assert_eq!(coerce(Value::F32(0.5), key(PrimitiveKind::F64), &registry), Ok(Value::F64(0.5)));
        assert_eq!(coerce(Value::Null, key(PrimitiveKind::I32), &registry), Err(Value::Null));
        assert_eq!(coerce(Value::Null, key(PrimitiveKind::String), &registry), Ok(Value::Null));

        let blue = Value::Enum(EnumValue {
            ty: color,
            discriminant: 2,
        });
        assert_eq!(coerce(Value::I32(2), color, &registry), Ok(blue.clone()));
        assert_eq!(coerce(Value::from("Blue"), color, &registry), Ok(blue));
        assert!(coerce(Value::from("Green"), color, &registry).is_err());
    }
}
