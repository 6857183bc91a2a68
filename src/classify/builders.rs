//! Builders for the declared (non-container) type categories.
use std::any::{type_name, Any};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Describer, Fit};
use crate::descriptor::{
    erase, hook, peek_hook, short_type_name, unerase, widen_hook, Alternative, EnumMember,
    EnumShape, Erased, FieldBinding, FieldDefault, FieldDescriptor, FieldValues, HookError, Kind,
    NarrowShape, PeekHook, RecordShape, Rejection, SelectHook, TypeDescriptor, UnionShape,
    Widened,
};
use crate::error::ClassifyError;
use crate::fitter::json_eq;

// ----------------------------- Narrow types ------------------------------ //

/// A type fitted from the value of another type and validated on the way.
///
/// `narrow` may reject the fitted source value; the rejection is reported
/// like any other mismatch, so a narrow type can also discriminate union
/// alternatives.
pub trait Narrow: Sized {
    type Source: Fit;

    fn narrow(source: Self::Source) -> Result<Self, Rejection>;

    /// Inverse of `narrow`, used when serializing.
    fn widen(&self) -> Self::Source;
}

pub(super) fn narrow<T: Narrow + Fit>(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
    let source = cx.type_of::<T::Source>()?;
    let shape = NarrowShape {
        source,
        wrap: hook(|fitted: Erased| {
            let source = unerase::<T::Source>(fitted)?;
            Ok(erase(T::narrow(source)?))
        }),
        widen: Some(widen_hook(|any| {
            any.downcast_ref::<T>()
                .map(|value| Widened::Owned(erase(value.widen())))
        })),
    };
    Ok(TypeDescriptor::new(
        short_type_name(type_name::<T>()),
        Kind::Narrow(shape),
    ))
}

// -------------------------------- Records -------------------------------- //

/// Declares the fields of a record type, in input order.
///
/// Errors are kept until [`RecordBuilder::build`] so declarations chain.
pub struct RecordBuilder<'a, T> {
    cx: &'a mut Describer,
    name: String,
    fields: Vec<FieldDescriptor>,
    error: Option<ClassifyError>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Fit> RecordBuilder<'a, T> {
    pub(super) fn new(cx: &'a mut Describer, name: String) -> Self {
        Self {
            cx,
            name,
            fields: Vec::new(),
            error: None,
            _marker: PhantomData,
        }
    }

    /// Field read from the input key of the same name.
    pub fn field<F, G>(self, name: &str, get: G) -> Self
    where
        F: Fit,
        G: for<'r> Fn(&'r T) -> &'r F + Send + Sync + 'static,
    {
        self.input::<F>(name, None, None, getter(get))
    }

    /// Field read from the input key `source`.
    pub fn field_from<F, G>(self, name: &str, source: &str, get: G) -> Self
    where
        F: Fit,
        G: for<'r> Fn(&'r T) -> &'r F + Send + Sync + 'static,
    {
        self.input::<F>(name, Some(source.to_string()), None, getter(get))
    }

    /// Field fitted from whatever `select` picks out of the input mapping,
    /// e.g. a nested key. An absent selection is handled like an absent key.
    /// Selected fields are read-only: [`crate::serialize`] skips them.
    pub fn field_with<F, S>(mut self, name: &str, select: S) -> Self
    where
        F: Fit,
        S: for<'m> Fn(&'m Map<String, Value>) -> Option<&'m Value> + Send + Sync + 'static,
    {
        match self.cx.type_of::<F>() {
            Ok(ty) => {
                let select: SelectHook = Arc::new(select);
                self.push(name, FieldBinding::Selected { ty, select }, None);
            }
            Err(error) => self.fail(error),
        }
        self
    }

    /// Field that falls back to `default()` when its key is absent.
    pub fn field_or<F, G, D>(self, name: &str, get: G, default: D) -> Self
    where
        F: Fit,
        G: for<'r> Fn(&'r T) -> &'r F + Send + Sync + 'static,
        D: Fn() -> F + Send + Sync + 'static,
    {
        let default = FieldDefault::Make(Arc::new(move || erase(default())));
        self.input::<F>(name, None, Some(default), getter(get))
    }

    /// Field injected from the fit context under `key`.
    pub fn context<F: Fit>(mut self, name: &str, key: &str) -> Self {
        match self.cx.type_of::<F>() {
            Ok(ty) => {
                let binding = FieldBinding::Context {
                    key: key.to_string(),
                    ty,
                };
                self.push(name, binding, None);
            }
            Err(error) => self.fail(error),
        }
        self
    }

    /// Field bound to the top-level value; take it with [`FieldValues::root`].
    pub fn root(mut self, name: &str) -> Self {
        self.push(name, FieldBinding::Root, None);
        self
    }

    pub fn build<C>(self, construct: C) -> Result<TypeDescriptor, ClassifyError>
    where
        C: Fn(&mut FieldValues) -> Result<T, HookError> + Send + Sync + 'static,
    {
        if let Some(error) = self.error {
            return Err(error);
        }
        let shape = RecordShape {
            fields: self.fields,
            construct: hook(move |mut values: FieldValues| construct(&mut values).map(erase)),
        };
        Ok(TypeDescriptor::new(self.name, Kind::Record(shape)))
    }

    fn input<F: Fit>(
        mut self,
        name: &str,
        source: Option<String>,
        default: Option<FieldDefault>,
        get: PeekHook,
    ) -> Self {
        match self.cx.type_of::<F>() {
            Ok(ty) => {
                let binding = FieldBinding::Input {
                    ty,
                    source,
                    default,
                };
                self.push(name, binding, Some(get));
            }
            Err(error) => self.fail(error),
        }
        self
    }

    fn push(&mut self, name: &str, binding: FieldBinding, get: Option<PeekHook>) {
        let field = FieldDescriptor {
            name: name.to_string(),
            binding,
            get,
        };
        if self.fields.iter().any(|f| f.name == field.name) {
            let reason = format!("field `{name}` is declared twice");
            let error = ClassifyError::unsupported(&self.name, reason);
            self.fail(error);
            return;
        }
        if let Some(key) = field.input_key() {
            if self.fields.iter().any(|f| f.input_key() == Some(key)) {
                let reason = format!("input key `{key}` is read by two fields");
                let error = ClassifyError::unsupported(&self.name, reason);
                self.fail(error);
                return;
            }
        }
        self.fields.push(field);
    }

    fn fail(&mut self, error: ClassifyError) {
        self.error.get_or_insert(error);
    }
}

fn getter<T, F, G>(get: G) -> PeekHook
where
    T: Any,
    F: Any,
    G: for<'r> Fn(&'r T) -> &'r F + Send + Sync + 'static,
{
    peek_hook(move |any| {
        any.downcast_ref::<T>()
            .map(|record| get(record) as &dyn Any)
    })
}

// --------------------------------- Unions -------------------------------- //

/// Declares the alternatives of a sum type in preference order.
pub struct UnionBuilder<'a, T> {
    cx: &'a mut Describer,
    name: String,
    alternatives: Vec<Alternative>,
    error: Option<ClassifyError>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Fit> UnionBuilder<'a, T> {
    pub(super) fn new(cx: &'a mut Describer, name: String) -> Self {
        Self {
            cx,
            name,
            alternatives: Vec::new(),
            error: None,
            _marker: PhantomData,
        }
    }

    /// `wrap` builds the union from a fitted alternative, `peek` is its inverse.
    pub fn alternative<A, W, P>(mut self, wrap: W, peek: P) -> Self
    where
        A: Fit,
        W: Fn(A) -> T + Send + Sync + 'static,
        P: for<'r> Fn(&'r T) -> Option<&'r A> + Send + Sync + 'static,
    {
        match self.cx.type_of::<A>() {
            Ok(ty) => self.alternatives.push(Alternative {
                ty,
                wrap: hook(move |fitted: Erased| Ok(erase(wrap(unerase::<A>(fitted)?)))),
                peek: Some(peek_hook(move |any| {
                    any.downcast_ref::<T>()
                        .and_then(|value| peek(value))
                        .map(|inner| inner as &dyn Any)
                })),
            }),
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }

    pub fn build(self) -> Result<TypeDescriptor, ClassifyError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.alternatives.is_empty() {
            return Err(ClassifyError::unsupported(self.name, "union has no alternatives"));
        }
        let shape = UnionShape {
            alternatives: self.alternatives,
        };
        Ok(TypeDescriptor::new(self.name, Kind::Union(shape)))
    }
}

// ------------------------------ Enumerations ----------------------------- //

/// Declares the members of an enumeration and their raw input values.
pub struct EnumBuilder<T> {
    name: String,
    members: Vec<EnumMember>,
    values: Vec<T>,
}

impl<T> EnumBuilder<T>
where
    T: Fit + Clone + PartialEq,
{
    pub(super) fn new(name: String) -> Self {
        Self {
            name,
            members: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn member(mut self, value: T, name: &str, raw: impl Into<Value>) -> Self {
        self.members.push(EnumMember {
            name: name.to_string(),
            raw: raw.into(),
        });
        self.values.push(value);
        self
    }

    pub fn build(self) -> Result<TypeDescriptor, ClassifyError> {
        check_members(&self.name, &self.members)?;
        let values: Arc<[T]> = self.values.into();
        let picked = values.clone();
        let shape = EnumShape {
            members: self.members,
            pick: hook(move |index: usize| {
                picked
                    .get(index)
                    .cloned()
                    .map(erase)
                    .ok_or(HookError::Erasure {
                        expected: type_name::<T>(),
                    })
            }),
            index_of: Some(Arc::new(move |any: &dyn Any| {
                let value = any.downcast_ref::<T>()?;
                values.iter().position(|member| member == value)
            })),
        };
        Ok(TypeDescriptor::new(self.name, Kind::Enumeration(shape)))
    }
}

/// Members need distinct names and raw values, and at least one must exist.
pub(crate) fn check_members(name: &str, members: &[EnumMember]) -> Result<(), ClassifyError> {
    if members.is_empty() {
        return Err(ClassifyError::unsupported(name, "enumeration has no members"));
    }
    let mut names = HashSet::new();
    for (index, member) in members.iter().enumerate() {
        if !names.insert(member.name.as_str()) {
            let reason = format!("member `{}` is declared twice", member.name);
            return Err(ClassifyError::unsupported(name, reason));
        }
        if members[..index].iter().any(|m| json_eq(&m.raw, &member.raw)) {
            let reason = format!("raw value {} is used by two members", member.raw);
            return Err(ClassifyError::unsupported(name, reason));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Shade {
        Light,
        Dark,
    }

    impl Fit for Shade {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.enumeration::<Shade>("Shade")
                .member(Shade::Light, "LIGHT", 1)
                .member(Shade::Dark, "DARK", 1.0)
                .build()
        }
    }

    struct Twice {
        a: i64,
    }

    impl Fit for Twice {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Twice>("Twice")
                .field("a", |t: &Twice| &t.a)
                .field_from("b", "a", |t: &Twice| &t.a)
                .build(|v| Ok(Twice { a: v.take("a")? }))
        }
    }

    struct Nothing;

    impl Fit for Nothing {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.union::<Nothing>("Nothing").build()
        }
    }

    #[test]
    fn duplicate_raw_values_compare_numerically() {
        let err = crate::classify::<Shade>().unwrap_err();
        assert_eq!(
            err,
            ClassifyError::unsupported("Shade", "raw value 1.0 is used by two members")
        );
    }

    #[test]
    fn one_input_key_per_field() {
        let err = crate::classify::<Twice>().unwrap_err();
        assert_eq!(
            err,
            ClassifyError::unsupported("Twice", "input key `a` is read by two fields")
        );
    }

    #[test]
    fn unions_need_alternatives() {
        assert!(crate::classify::<Nothing>().is_err());
    }

    #[test]
    fn members_need_names() {
        let members = vec![
            EnumMember {
                name: "A".into(),
                raw: json!("a"),
            },
            EnumMember {
                name: "A".into(),
                raw: json!("b"),
            },
        ];
        assert!(check_members("E", &members).is_err());
        assert!(check_members("E", &members[..1]).is_ok());
    }
}
