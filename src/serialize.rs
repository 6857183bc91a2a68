//! The reverse direction: typed values back to JSON.
//!
//! Walks the same descriptors as the fitter. Injected fields are never
//! emitted, renamed fields are written under their source key, and a
//! descriptor's own serializer (see [`TypeDescriptor::with_serializer`])
//! takes precedence over its kind.
use std::any::Any;

use serde_json::{Map, Value};

use crate::classify::{classify, Fit};
use crate::descriptor::{FieldBinding, Kind, PrimitiveKind, TypeDescriptor, Widened};
use crate::error::SerializeError;

pub fn serialize<T: Fit>(value: &T) -> Result<Value, SerializeError> {
    let ty = classify::<T>()?;
    serialize_any(&ty, value)
}

pub fn to_json_string<T: Fit>(value: &T) -> Result<String, SerializeError> {
    Ok(serde_json::to_string(&serialize(value)?)?)
}

fn serialize_any(ty: &TypeDescriptor, value: &dyn Any) -> Result<Value, SerializeError> {
    if let Some(custom) = ty.serialize_hook() {
        return custom(value).ok_or_else(|| erasure(ty));
    }
    match ty.kind() {
        Kind::Any => value.downcast_ref::<Value>().cloned().ok_or_else(|| erasure(ty)),
        Kind::Primitive(kind) => primitive(ty, *kind, value),
        Kind::Optional(shape) => {
            let peek = shape.peek.as_ref().ok_or_else(|| unsupported(ty))?;
            match peek(value).ok_or_else(|| erasure(ty))? {
                Some(inner) => serialize_any(&*shape.inner.resolve()?, inner),
                None => Ok(Value::Null),
            }
        }
        Kind::Union(shape) => {
            for alternative in &shape.alternatives {
                let peek = alternative.peek.as_ref().ok_or_else(|| unsupported(ty))?;
                if let Some(inner) = peek(value) {
                    return serialize_any(&*alternative.ty.resolve()?, inner);
                }
            }
            Err(SerializeError::NoAlternative {
                type_name: ty.name().to_string(),
            })
        }
        Kind::Sequence(shape) => {
            let items = shape.items.as_ref().ok_or_else(|| unsupported(ty))?;
            let item_ty = shape.item.resolve()?;
            items(value)
                .ok_or_else(|| erasure(ty))?
                .into_iter()
                .map(|item| serialize_any(&item_ty, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Kind::Mapping(shape) => {
            let entries = shape.entries.as_ref().ok_or_else(|| unsupported(ty))?;
            let value_ty = shape.value.resolve()?;
            let mut out = Map::new();
            for (key, entry) in entries(value).ok_or_else(|| erasure(ty))? {
                out.insert(key.to_string(), serialize_any(&value_ty, entry)?);
            }
            Ok(Value::Object(out))
        }
        Kind::Enumeration(shape) => {
            let index_of = shape.index_of.as_ref().ok_or_else(|| unsupported(ty))?;
            index_of(value)
                .and_then(|index| shape.members.get(index))
                .map(|member| member.raw.clone())
                .ok_or_else(|| SerializeError::UnknownMember {
                    type_name: ty.name().to_string(),
                })
        }
        Kind::Record(shape) => {
            let mut out = Map::new();
            for field in &shape.fields {
                let FieldBinding::Input { ty: field_ty, .. } = &field.binding else {
                    continue;
                };
                let Some(key) = field.input_key() else {
                    continue;
                };
                let get = field.get.as_ref().ok_or_else(|| unsupported(ty))?;
                let field_value = get(value).ok_or_else(|| erasure(ty))?;
                let field_ty = field_ty.resolve()?;
                out.insert(key.to_string(), serialize_any(&field_ty, field_value)?);
            }
            Ok(Value::Object(out))
        }
        Kind::Narrow(shape) => {
            let widen = shape.widen.as_ref().ok_or_else(|| unsupported(ty))?;
            let source_ty = shape.source.resolve()?;
            match widen(value).ok_or_else(|| erasure(ty))? {
                Widened::Borrowed(source) => serialize_any(&source_ty, source),
                Widened::Owned(source) => {
                    let source: &dyn Any = &*source;
                    serialize_any(&source_ty, source)
                }
            }
        }
    }
}

fn primitive(ty: &TypeDescriptor, kind: PrimitiveKind, value: &dyn Any) -> Result<Value, SerializeError> {
    let serialized = match kind {
        PrimitiveKind::Int => value.downcast_ref::<i64>().map(|n| Value::from(*n)),
        PrimitiveKind::Float => value.downcast_ref::<f64>().map(|n| Value::from(*n)),
        PrimitiveKind::Bool => value.downcast_ref::<bool>().map(|b| Value::Bool(*b)),
        PrimitiveKind::String => value.downcast_ref::<String>().map(|s| Value::String(s.clone())),
        PrimitiveKind::None => value.downcast_ref::<()>().map(|_| Value::Null),
    };
    serialized.ok_or_else(|| erasure(ty))
}

fn erasure(ty: &TypeDescriptor) -> SerializeError {
    SerializeError::Erasure {
        type_name: ty.name().to_string(),
    }
}

fn unsupported(ty: &TypeDescriptor) -> SerializeError {
    SerializeError::Unsupported {
        type_name: ty.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Describer;
    use crate::error::ClassifyError;
    use serde_json::json;
    use std::collections::HashMap;

    struct Tagged {
        id: i64,
        label: String,
        tenant: String,
    }

    impl Fit for Tagged {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Tagged>("Tagged")
                .field("id", |t: &Tagged| &t.id)
                .field_from("label", "display_name", |t: &Tagged| &t.label)
                .context::<String>("tenant", "tenant")
                .build(|v| {
                    Ok(Tagged {
                        id: v.take("id")?,
                        label: v.take("label")?,
                        tenant: v.take("tenant")?,
                    })
                })
        }
    }

    struct Celsius(f64);

    impl crate::classify::Narrow for Celsius {
        type Source = f64;

        fn narrow(source: f64) -> Result<Self, crate::descriptor::Rejection> {
            Ok(Celsius(source))
        }

        fn widen(&self) -> f64 {
            self.0
        }
    }

    impl Fit for Celsius {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            Ok(cx
                .narrow::<Self>()?
                .with_serializer(|c: &Celsius| json!(format!("{}°C", c.0))))
        }
    }

    #[test]
    fn injected_fields_are_skipped_and_renames_restored() {
        let value = Tagged {
            id: 7,
            label: "seven".into(),
            tenant: "acme".into(),
        };
        assert_eq!(value.tenant, "acme");
        assert_eq!(
            serialize(&value).unwrap(),
            json!({"id": 7, "display_name": "seven"})
        );
    }

    #[test]
    fn containers_serialize_recursively() {
        let value: Vec<Option<HashMap<String, u8>>> =
            vec![None, Some(HashMap::from([("b".to_string(), 2), ("a".to_string(), 1)]))];
        assert_eq!(
            to_json_string(&value).unwrap(),
            r#"[null,{"a":1,"b":2}]"#
        );
    }

    enum Reading {
        Number(f64),
        Note(String),
    }

    impl Fit for Reading {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.union::<Reading>("Reading")
                .alternative(Reading::Number, |r: &Reading| match r {
                    Reading::Number(n) => Some(n),
                    Reading::Note(_) => None,
                })
                .alternative(Reading::Note, |r: &Reading| match r {
                    Reading::Note(s) => Some(s),
                    Reading::Number(_) => None,
                })
                .build()
        }
    }

    struct Sample {
        reading: Option<Reading>,
    }

    impl Fit for Sample {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Sample>("Sample")
                .field("reading", |s: &Sample| &s.reading)
                .build(|v| Ok(Sample { reading: v.take("reading")? }))
        }
    }

    #[test]
    fn optional_unions_serialize_through_the_held_alternative() {
        let samples = vec![
            Sample { reading: Some(Reading::Number(1.5)) },
            Sample { reading: Some(Reading::Note("dry".into())) },
            Sample { reading: None },
        ];
        assert_eq!(
            serialize(&samples).unwrap(),
            json!([{"reading": 1.5}, {"reading": "dry"}, {"reading": null}])
        );
    }

    #[test]
    fn custom_serializers_win() {
        assert_eq!(serialize(&Celsius(21.5)).unwrap(), json!("21.5°C"));
    }
}
