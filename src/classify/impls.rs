//! `Fit` for primitives, containers and the standard integer widths.
use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use serde_json::Value;

use super::{Describer, Fit, Narrow};
use crate::descriptor::{
    entries_hook, erase, hook, items_hook, option_peek_hook, short_type_name, unerase, widen_hook,
    Erased, HookError, Kind, MappingShape, NarrowShape, OptionalShape, PrimitiveKind, Rejection,
    SequenceShape, TypeDescriptor, Widened,
};
use crate::error::ClassifyError;

// ------------------------------- Primitives ------------------------------ //

macro_rules! primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Fit for $ty {
            fn describe(_: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
                Ok(TypeDescriptor::primitive(PrimitiveKind::$kind))
            }
        }
    )*};
}

primitive! {
    i64 => Int,
    f64 => Float,
    bool => Bool,
    String => String,
    () => None,
}

impl Fit for Value {
    fn describe(_: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        Ok(TypeDescriptor::new("any", Kind::Any))
    }
}

// ----------------------------- Narrow numbers ---------------------------- //

macro_rules! narrow_int {
    ($($ty:ty),* $(,)?) => {$(
        impl Narrow for $ty {
            type Source = i64;

            fn narrow(source: i64) -> Result<Self, Rejection> {
                <$ty>::try_from(source).map_err(|_| {
                    Rejection::new(format!("{source} is out of range for {}", stringify!($ty)))
                })
            }

            fn widen(&self) -> i64 {
                i64::try_from(*self).unwrap_or(i64::MAX)
            }
        }

        impl Fit for $ty {
            fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
                cx.narrow::<Self>()
            }
        }
    )*};
}

narrow_int!(i8, i16, i32, u8, u16, u32, u64, isize, usize);

/// Lossy: values are rounded to the nearest `f32`.
impl Narrow for f32 {
    type Source = f64;

    fn narrow(source: f64) -> Result<Self, Rejection> {
        Ok(source as f32)
    }

    fn widen(&self) -> f64 {
        f64::from(*self)
    }
}

impl Fit for f32 {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.narrow::<Self>()
    }
}

// ------------------------------- Containers ------------------------------ //

impl<T: Fit> Fit for Option<T> {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        let shape = OptionalShape {
            inner: cx.type_of::<T>()?,
            wrap: hook(|fitted: Option<Erased>| match fitted {
                None => Ok(erase(None::<T>)),
                Some(inner) => Ok(erase(Some(unerase::<T>(inner)?))),
            }),
            peek: Some(option_peek_hook(|any| {
                any.downcast_ref::<Option<T>>()
                    .map(|value| value.as_ref().map(|inner| inner as &dyn Any))
            })),
        };
        Ok(TypeDescriptor::new(
            short_type_name(type_name::<Self>()),
            Kind::Optional(shape),
        ))
    }
}

/// A box is transparent: it fits whatever its content fits.
impl<T: Fit> Fit for Box<T> {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        let shape = NarrowShape {
            source: cx.type_of::<T>()?,
            wrap: hook(|fitted: Erased| Ok(erase(Box::new(unerase::<T>(fitted)?)))),
            widen: Some(widen_hook(|any| {
                any.downcast_ref::<Box<T>>()
                    .map(|boxed| Widened::Borrowed(&**boxed as &dyn Any))
            })),
        };
        Ok(TypeDescriptor::new(
            short_type_name(type_name::<Self>()),
            Kind::Narrow(shape),
        ))
    }
}

impl<T: Fit> Fit for Vec<T> {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        let shape = SequenceShape {
            item: cx.type_of::<T>()?,
            collect: hook(|items: Vec<Erased>| {
                let items = items
                    .into_iter()
                    .map(unerase::<T>)
                    .collect::<Result<Vec<T>, HookError>>()?;
                Ok(erase(items))
            }),
            items: Some(items_hook(|any| {
                any.downcast_ref::<Vec<T>>()
                    .map(|items| items.iter().map(|item| item as &dyn Any).collect())
            })),
        };
        Ok(TypeDescriptor::new(
            short_type_name(type_name::<Self>()),
            Kind::Sequence(shape),
        ))
    }
}

/// String-keyed maps differ only in how they collect entries and in the
/// order they expose them for serialization.
macro_rules! mapping {
    ($map:ident, |$m:ident| $entries:expr) => {
        impl<T: Fit> Fit for $map<String, T> {
            fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
                let shape = MappingShape {
                    value: cx.type_of::<T>()?,
                    collect: hook(|entries: IndexMap<String, Erased>| {
                        let entries = entries
                            .into_iter()
                            .map(|(key, value)| unerase::<T>(value).map(|value| (key, value)))
                            .collect::<Result<$map<String, T>, HookError>>()?;
                        Ok(erase(entries))
                    }),
                    entries: Some(entries_hook(|any| {
                        any.downcast_ref::<$map<String, T>>().map(|$m| {
                            let entries: Vec<(&str, &dyn Any)> = $entries
                                .map(|(key, value)| (key.as_str(), value as &dyn Any))
                                .collect();
                            entries
                        })
                    })),
                };
                Ok(TypeDescriptor::new(
                    short_type_name(type_name::<Self>()),
                    Kind::Mapping(shape),
                ))
            }
        }
    };
}

mapping!(IndexMap, |m| m.iter());
mapping!(BTreeMap, |m| m.iter());
mapping!(HashMap, |m| {
    let mut sorted: Vec<_> = m.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted.into_iter()
});
