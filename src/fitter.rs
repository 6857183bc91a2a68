//! The recursive fitting engine.
//!
//! [`Fitter`] walks a `(descriptor, value)` pair, producing the fitted value
//! and a [`Node`] tree mirroring the input. Failures below the top level are
//! data on the tree; only the top-level call turns them into a [`FitError`].
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::classify::{classify, Fit};
use crate::context::{bind_roots, Context, RootSlot};
use crate::descriptor::{
    erase, into_json, unerase, EnumShape, Erased, FieldBinding, FieldDefault, FieldDescriptor,
    FieldValues, HookError, Kind, MappingShape, NarrowShape, OptionalShape, PrimitiveKind,
    RecordShape, SequenceShape, TypeDescriptor, TypeRef, UnionShape,
};
use crate::error::{ClassifyError, FitError};
use crate::node::{kind_of, Attempt, Children, FitIssue, LocatedIssue, Node, Path};
use crate::report::{LogReporter, Reporter};

/// Raw enum values listed in an invalid-member message.
const MAX_LISTED_MEMBERS: usize = 10;

/// Engine options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input keys that no record field reads become `UnwantedKey` issues.
    pub no_unwanted_keys: bool,
}

/// Outcome of a fit, kept together with its diagnostic tree.
pub struct Trace<'v, T> {
    value: Option<T>,
    node: Node<'v>,
    roots: Vec<RootSlot>,
}

impl<'v, T> Trace<'v, T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn node(&self) -> &Node<'v> {
        &self.node
    }

    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    /// The fitted value, or the failed root node.
    ///
    /// Root references inside the value stay unbound; see
    /// [`Trace::into_shared`].
    pub fn into_result(self) -> Result<T, Node<'v>> {
        self.value.ok_or(self.node)
    }
}

impl<'v, T: Send + Sync + 'static> Trace<'v, T> {
    /// Like [`Trace::into_result`], binding every root reference to the
    /// returned value.
    pub fn into_shared(self) -> Result<Arc<T>, Node<'v>> {
        let value = self.value.ok_or(self.node)?;
        let shared = Arc::new(value);
        bind_roots(&shared, self.roots);
        Ok(shared)
    }
}

/// Entry point of the engine.
///
/// A fitter holds options and an optional [`Reporter`] invoked whenever a
/// top-level fit fails. It keeps no state between calls and can be shared
/// across threads.
#[derive(Clone, Default)]
pub struct Fitter {
    config: Config,
    reporter: Option<Arc<dyn Reporter>>,
}

impl Fitter {
    /// A fitter that never reports.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fitter that logs a rendered report for every failed fit.
    pub fn reporting() -> Self {
        Self::new().with_reporter(Arc::new(LogReporter::default()))
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fit<T: Fit>(&self, value: &Value) -> Result<T, FitError> {
        self.fit_with(value, &Context::default())
    }

    pub fn fit_with<T: Fit>(&self, value: &Value, context: &Context) -> Result<T, FitError> {
        let ty = classify::<T>()?;
        let trace = self.trace_descriptor(&ty, value, context);
        if trace.succeeded() && !trace.roots.is_empty() {
            tracing::warn!(
                type_name = ty.name(),
                count = trace.roots.len(),
                "root references left unbound, fit with `fit_shared` to bind them"
            );
        }
        match trace.into_result() {
            Ok(fitted) => unerase::<T>(fitted).map_err(|error| internal(&ty, error)),
            Err(node) => Err(self.failed(&ty, &node)),
        }
    }

    /// Fits `value` and binds every root reference inside it to the result.
    pub fn fit_shared<T: Fit>(&self, value: &Value, context: &Context) -> Result<Arc<T>, FitError> {
        let ty = classify::<T>()?;
        let trace = self.trace_descriptor(&ty, value, context);
        let Trace { value: fitted, node, roots } = trace;
        let Some(fitted) = fitted else {
            return Err(self.failed(&ty, &node));
        };
        let shared = Arc::new(unerase::<T>(fitted).map_err(|error| internal(&ty, error))?);
        bind_roots(&shared, roots);
        Ok(shared)
    }

    /// Fits without reporting, keeping the full diagnostic tree.
    pub fn trace<'v, T: Fit>(
        &self,
        value: &'v Value,
        context: &Context,
    ) -> Result<Trace<'v, T>, ClassifyError> {
        let ty = classify::<T>()?;
        let Trace {
            value: fitted,
            mut node,
            roots,
        } = self.trace_descriptor(&ty, value, context);
        let value = match fitted.map(unerase::<T>) {
            Some(Ok(value)) => Some(value),
            Some(Err(error)) => {
                node.fail(FitIssue::Internal(error.to_string()));
                node.set_success(false);
                None
            }
            None => None,
        };
        Ok(Trace { value, node, roots })
    }

    /// Fits against a descriptor that produces JSON, such as the types of a
    /// [`crate::Schema`]. The result is the normalized value.
    pub fn fit_descriptor(
        &self,
        ty: &TypeDescriptor,
        value: &Value,
        context: &Context,
    ) -> Result<Value, FitError> {
        match self.trace_json(ty, value, context).into_result() {
            Ok(fitted) => Ok(fitted),
            Err(node) => Err(self.failed(ty, &node)),
        }
    }

    /// [`Fitter::trace`] for descriptors that produce JSON.
    pub fn trace_json<'v>(
        &self,
        ty: &TypeDescriptor,
        value: &'v Value,
        context: &Context,
    ) -> Trace<'v, Value> {
        let Trace {
            value: fitted,
            mut node,
            roots,
        } = self.trace_descriptor(ty, value, context);
        let value = match fitted.map(into_json) {
            Some(Ok(value)) => Some(value),
            Some(Err(error)) => {
                node.fail(FitIssue::Internal(error.to_string()));
                node.set_success(false);
                None
            }
            None => None,
        };
        Trace { value, node, roots }
    }

    fn trace_descriptor<'v>(
        &self,
        ty: &TypeDescriptor,
        value: &'v Value,
        context: &Context,
    ) -> Trace<'v, Erased> {
        let mut engine = Engine {
            config: &self.config,
            context,
            roots: Vec::new(),
        };
        let mut node = Node::new(value);
        let fitted = engine.fit(ty, value, &mut node);
        Trace {
            value: fitted,
            node,
            roots: engine.roots,
        }
    }

    fn failed(&self, ty: &TypeDescriptor, node: &Node<'_>) -> FitError {
        if let Some(reporter) = &self.reporter {
            reporter.report(node);
        }
        FitError::Mismatch {
            type_name: ty.name().to_string(),
            issues: node.issues(),
        }
    }
}

fn internal(ty: &TypeDescriptor, error: HookError) -> FitError {
    FitError::Mismatch {
        type_name: ty.name().to_string(),
        issues: vec![LocatedIssue {
            path: Path::default(),
            issue: FitIssue::Internal(error.to_string()),
        }],
    }
}

/// JSON equality where numbers compare by value, so `2 == 2.0`.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

// --------------------------------- Engine -------------------------------- //

/// State of one top-level fit.
struct Engine<'a> {
    config: &'a Config,
    context: &'a Context,
    /// Root-injection slots handed out so far, bound once the root exists.
    roots: Vec<RootSlot>,
}

impl Engine<'_> {
    /// Fits `value` against `ty`, recording the attempt on `node`.
    ///
    /// Optional and narrow types delegate to their inner type on the same
    /// node; the outermost call decides the final success flag.
    fn fit<'v>(&mut self, ty: &TypeDescriptor, value: &'v Value, node: &mut Node<'v>) -> Option<Erased> {
        let fitted = match ty.kind() {
            Kind::Any => Some(erase(value.clone())),
            Kind::Primitive(kind) => fit_primitive(*kind, value, node),
            Kind::Optional(shape) => self.fit_optional(ty, shape, value, node),
            Kind::Union(shape) => self.fit_union(ty, shape, value, node),
            Kind::Sequence(shape) => self.fit_sequence(ty, shape, value, node),
            Kind::Mapping(shape) => self.fit_mapping(ty, shape, value, node),
            Kind::Enumeration(shape) => fit_enumeration(ty, shape, value, node),
            Kind::Record(shape) => self.fit_record(ty, shape, value, node),
            Kind::Narrow(shape) => self.fit_narrow(ty, shape, value, node),
        };
        node.set_success(fitted.is_some());
        fitted
    }

    fn fit_ref<'v>(&mut self, ty: &TypeRef, value: &'v Value, node: &mut Node<'v>) -> Option<Erased> {
        let resolved = resolve(ty, node)?;
        self.fit(&resolved, value, node)
    }

    fn fit_optional<'v>(
        &mut self,
        ty: &TypeDescriptor,
        shape: &OptionalShape,
        value: &'v Value,
        node: &mut Node<'v>,
    ) -> Option<Erased> {
        if value.is_null() {
            return finish(ty, (shape.wrap)(None), node);
        }
        let inner = self.fit_ref(&shape.inner, value, node)?;
        finish(ty, (shape.wrap)(Some(inner)), node)
    }

    fn fit_union<'v>(
        &mut self,
        ty: &TypeDescriptor,
        shape: &UnionShape,
        value: &'v Value,
        node: &mut Node<'v>,
    ) -> Option<Erased> {
        let mut attempts = Vec::with_capacity(shape.alternatives.len());
        let mut matched = None;
        for alternative in &shape.alternatives {
            let mark = self.roots.len();
            let mut attempt = Node::new(value);
            let fitted = self.fit_ref(&alternative.ty, value, &mut attempt);
            attempts.push(Attempt {
                label: alternative.ty.name().to_string(),
                node: attempt,
            });
            match fitted {
                Some(fitted) => {
                    matched = Some((alternative.wrap)(fitted));
                    break;
                }
                None => self.roots.truncate(mark),
            }
        }
        node.set_children(Children::Alternatives(attempts));
        match matched {
            Some(wrapped) => finish(ty, wrapped, node),
            None => {
                node.fail(FitIssue::NoUnionAlternativeMatched {
                    union: ty.name().to_string(),
                });
                None
            }
        }
    }

    fn fit_sequence<'v>(
        &mut self,
        ty: &TypeDescriptor,
        shape: &SequenceShape,
        value: &'v Value,
        node: &mut Node<'v>,
    ) -> Option<Erased> {
        let Value::Array(items) = value else {
            mismatch("list", value, node);
            return None;
        };
        let item_ty = resolve(&shape.item, node)?;
        let mut children = Vec::with_capacity(items.len());
        let mut fitted = Vec::with_capacity(items.len());
        let mut complete = true;
        for item in items {
            let mut child = Node::new(item);
            match self.fit(&item_ty, item, &mut child) {
                Some(value) if complete => fitted.push(value),
                Some(_) => {}
                None => complete = false,
            }
            children.push(child);
        }
        node.set_children(Children::Items(children));
        if !complete {
            return None;
        }
        finish(ty, (shape.collect)(fitted), node)
    }

    fn fit_mapping<'v>(
        &mut self,
        ty: &TypeDescriptor,
        shape: &MappingShape,
        value: &'v Value,
        node: &mut Node<'v>,
    ) -> Option<Erased> {
        let Value::Object(entries) = value else {
            mismatch("mapping", value, node);
            return None;
        };
        let value_ty = resolve(&shape.value, node)?;
        let mut children = IndexMap::with_capacity(entries.len());
        let mut fitted = IndexMap::with_capacity(entries.len());
        let mut complete = true;
        for (key, entry) in entries {
            let mut child = Node::new(entry);
            match self.fit(&value_ty, entry, &mut child) {
                Some(value) if complete => {
                    fitted.insert(key.clone(), value);
                }
                Some(_) => {}
                None => complete = false,
            }
            children.insert(key.clone(), child);
        }
        node.set_children(Children::Entries(children));
        if !complete {
            return None;
        }
        finish(ty, (shape.collect)(fitted), node)
    }

    fn fit_record<'v>(
        &mut self,
        ty: &TypeDescriptor,
        shape: &RecordShape,
        value: &'v Value,
        node: &mut Node<'v>,
    ) -> Option<Erased> {
        let Value::Object(input) = value else {
            mismatch("mapping", value, node);
            return None;
        };
        let mut children = IndexMap::new();
        let mut values = FieldValues::default();
        let mut complete = true;

        for field in &shape.fields {
            let fitted = match &field.binding {
                FieldBinding::Input {
                    ty: field_ty,
                    source,
                    default,
                } => {
                    let key = source.as_deref().unwrap_or(field.name.as_str());
                    match input.get(key) {
                        Some(raw) => {
                            let mut child = Node::new(raw);
                            let fitted = self.fit_ref(field_ty, raw, &mut child);
                            children.insert(key.to_string(), child);
                            fitted
                        }
                        None => match default {
                            Some(default) => self.fit_default(field, field_ty, default, node),
                            None => self.fit_missing(key, field_ty, node, &mut children),
                        },
                    }
                }
                FieldBinding::Selected { ty: field_ty, select } => match select(input) {
                    Some(raw) => {
                        let mut child = Node::new(raw);
                        let fitted = self.fit_ref(field_ty, raw, &mut child);
                        children.insert(field.name.clone(), child);
                        fitted
                    }
                    None => self.fit_missing(&field.name, field_ty, node, &mut children),
                },
                FieldBinding::Context { key, ty: field_ty } => {
                    self.fit_context(key, field_ty, node)
                }
                FieldBinding::Root => {
                    let slot = RootSlot::default();
                    self.roots.push(slot.clone());
                    Some(erase(slot))
                }
            };
            match fitted {
                Some(fitted) => values.insert(&field.name, fitted),
                None => complete = false,
            }
        }

        if self.config.no_unwanted_keys {
            for (key, raw) in input {
                if children.contains_key(key)
                    || shape.fields.iter().any(|f| f.input_key() == Some(key.as_str()))
                {
                    continue;
                }
                let mut child = Node::new(raw);
                child.fail(FitIssue::UnwantedKey {
                    owner: ty.name().to_string(),
                });
                children.insert(key.clone(), child);
                complete = false;
            }
        }

        node.set_children(Children::Entries(children));
        if !complete {
            return None;
        }
        finish(ty, (shape.construct)(values), node)
    }

    fn fit_default(
        &mut self,
        field: &FieldDescriptor,
        field_ty: &TypeRef,
        default: &FieldDefault,
        node: &mut Node<'_>,
    ) -> Option<Erased> {
        match default {
            FieldDefault::Make(make) => Some(make()),
            FieldDefault::Json(raw) => {
                let mut scratch = Node::new(raw);
                let fitted = self.fit_ref(field_ty, raw, &mut scratch);
                if fitted.is_none() {
                    node.fail(FitIssue::InvalidDefault {
                        field: field.name.clone(),
                        detail: summarize(&scratch),
                    });
                }
                fitted
            }
        }
    }

    /// Value of a field with nothing to read and no default: whatever the
    /// field type makes of `null`, so any type accepting `null` (an optional,
    /// an alias of one, a union with a `none` alternative) yields its empty
    /// value. Otherwise the field is missing.
    fn fit_missing<'v>(
        &mut self,
        key: &str,
        field_ty: &TypeRef,
        node: &mut Node<'v>,
        children: &mut IndexMap<String, Node<'v>>,
    ) -> Option<Erased> {
        static NULL: Value = Value::Null;

        let resolved = resolve(field_ty, node)?;
        let mark = self.roots.len();
        let mut scratch = Node::new(&NULL);
        if let Some(fitted) = self.fit(&resolved, &NULL, &mut scratch) {
            return Some(fitted);
        }
        self.roots.truncate(mark);
        let mut missing = Node::absent();
        missing.fail(FitIssue::MissingField {
            field: key.to_string(),
        });
        children.insert(key.to_string(), missing);
        None
    }

    fn fit_context(&mut self, key: &str, field_ty: &TypeRef, node: &mut Node<'_>) -> Option<Erased> {
        let context = self.context;
        let Some(raw) = context.get(key) else {
            node.fail(FitIssue::MissingContextKey {
                key: key.to_string(),
            });
            return None;
        };
        let mut scratch = Node::new(raw);
        let fitted = self.fit_ref(field_ty, raw, &mut scratch);
        if fitted.is_none() {
            node.fail(FitIssue::InvalidContextValue {
                key: key.to_string(),
                detail: summarize(&scratch),
            });
        }
        fitted
    }

    fn fit_narrow<'v>(
        &mut self,
        ty: &TypeDescriptor,
        shape: &NarrowShape,
        value: &'v Value,
        node: &mut Node<'v>,
    ) -> Option<Erased> {
        let source = self.fit_ref(&shape.source, value, node)?;
        finish(ty, (shape.wrap)(source), node)
    }
}

fn resolve(ty: &TypeRef, node: &mut Node<'_>) -> Option<Arc<TypeDescriptor>> {
    match ty.resolve() {
        Ok(resolved) => Some(resolved),
        Err(_) => {
            node.fail(FitIssue::Unresolved {
                name: ty.name().to_string(),
            });
            None
        }
    }
}

fn fit_primitive(kind: PrimitiveKind, value: &Value, node: &mut Node<'_>) -> Option<Erased> {
    let fitted = match (kind, value) {
        (PrimitiveKind::Int, Value::Number(n)) => n.as_i64().map(erase),
        (PrimitiveKind::Float, Value::Number(n)) => n.as_f64().map(erase),
        (PrimitiveKind::Bool, Value::Bool(b)) => Some(erase(*b)),
        (PrimitiveKind::String, Value::String(s)) => Some(erase(s.clone())),
        (PrimitiveKind::None, Value::Null) => Some(erase(())),
        _ => None,
    };
    if fitted.is_none() {
        let actual = match value {
            Value::Number(n) if kind == PrimitiveKind::Int && !n.is_f64() => {
                "int outside the 64-bit range".to_string()
            }
            _ => kind_of(value).to_string(),
        };
        node.fail(FitIssue::TypeMismatch {
            expected: kind.to_string(),
            actual,
        });
    }
    fitted
}

fn fit_enumeration(
    ty: &TypeDescriptor,
    shape: &EnumShape,
    value: &Value,
    node: &mut Node<'_>,
) -> Option<Erased> {
    match shape.members.iter().position(|m| json_eq(&m.raw, value)) {
        Some(index) => finish(ty, (shape.pick)(index), node),
        None => {
            let valid = shape
                .members
                .iter()
                .take(MAX_LISTED_MEMBERS)
                .map(|m| m.raw.to_string())
                .collect();
            node.fail(FitIssue::InvalidEnumMember {
                enumeration: ty.name().to_string(),
                value: value.to_string(),
                valid,
                omitted: shape.members.len().saturating_sub(MAX_LISTED_MEMBERS),
            });
            None
        }
    }
}

fn mismatch(expected: &str, value: &Value, node: &mut Node<'_>) {
    node.fail(FitIssue::TypeMismatch {
        expected: expected.to_string(),
        actual: kind_of(value).to_string(),
    });
}

/// Turns a hook result into the fitted value or an issue on `node`.
fn finish(ty: &TypeDescriptor, result: Result<Erased, HookError>, node: &mut Node<'_>) -> Option<Erased> {
    match result {
        Ok(fitted) => Some(fitted),
        Err(HookError::Rejected(rejection)) => {
            node.fail(FitIssue::ConstructionRejected {
                type_name: ty.name().to_string(),
                rejection,
            });
            None
        }
        Err(error) => {
            node.fail(FitIssue::Internal(error.to_string()));
            None
        }
    }
}

/// One-line description of why a side fit (default or context value) failed.
fn summarize(node: &Node<'_>) -> String {
    node.issues()
        .iter()
        .map(|located| {
            if located.path.is_root() {
                located.issue.to_string()
            } else {
                located.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Describer;
    use crate::descriptor::Rejection;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
        y: f64,
        label: Option<String>,
    }

    impl Fit for Point {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Point>("Point")
                .field("x", |p: &Point| &p.x)
                .field("y", |p: &Point| &p.y)
                .field("label", |p: &Point| &p.label)
                .build(|v| {
                    Ok(Point {
                        x: v.take("x")?,
                        y: v.take("y")?,
                        label: v.take("label")?,
                    })
                })
        }
    }

    #[derive(Debug, PartialEq)]
    struct Even(i64);

    impl crate::classify::Narrow for Even {
        type Source = i64;

        fn narrow(source: i64) -> Result<Self, Rejection> {
            match source % 2 {
                0 => Ok(Even(source)),
                _ => Err(Rejection::new(format!("{source} is odd"))),
            }
        }

        fn widen(&self) -> i64 {
            self.0
        }
    }

    impl Fit for Even {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.narrow::<Self>()
        }
    }

    #[derive(Debug)]
    struct Pin {
        lat: f64,
        note: Box<Option<i64>>,
    }

    impl Fit for Pin {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Pin>("Pin")
                .field_with::<f64, _>("lat", |m| m.get("location")?.get("lat"))
                .field("note", |p: &Pin| &p.note)
                .build(|v| {
                    Ok(Pin {
                        lat: v.take("lat")?,
                        note: v.take("note")?,
                    })
                })
        }
    }

    #[test]
    fn ints_widen_to_floats_but_not_back() {
        let fitter = Fitter::new();
        assert_eq!(fitter.fit::<f64>(&json!(3)).unwrap(), 3.0);
        let err = fitter.fit::<i64>(&json!(3.5)).unwrap_err();
        assert_eq!(
            err.issues()[0].issue,
            FitIssue::TypeMismatch {
                expected: "int".into(),
                actual: "float".into()
            }
        );
        assert!(fitter.fit::<i64>(&json!(true)).is_err());
        assert!(fitter.fit::<bool>(&json!(1)).is_err());
    }

    #[test]
    fn huge_integers_do_not_fit_int() {
        let err = Fitter::new().fit::<i64>(&json!(u64::MAX)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value does not fit `int`: at $: expected int, got int outside the 64-bit range"
        );
    }

    #[test]
    fn optional_fields_may_be_absent_or_null() {
        let fitter = Fitter::new();
        let a: Point = fitter.fit(&json!({"x": 1, "y": 2})).unwrap();
        let b: Point = fitter.fit(&json!({"x": 1, "y": 2, "label": null})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.label, None);
        assert_eq!(a.y, 2.0);
    }

    #[test]
    fn absent_keys_fit_through_wrapped_optionals() {
        let pin: Pin = Fitter::new().fit(&json!({"location": {"lat": 1}})).unwrap();
        assert_eq!(pin.lat, 1.0);
        assert_eq!(*pin.note, None);

        let pin: Pin = Fitter::new()
            .fit(&json!({"location": {"lat": 1}, "note": 4}))
            .unwrap();
        assert_eq!(*pin.note, Some(4));
    }

    #[test]
    fn selected_fields_read_nested_values() {
        let err = Fitter::new()
            .fit::<Pin>(&json!({"location": {"lng": 2}}))
            .unwrap_err();
        let issues: Vec<String> = err.issues().iter().map(ToString::to_string).collect();
        assert_eq!(issues, ["at $.lat: missing field `lat`"]);

        let err = Fitter::new()
            .fit::<Pin>(&json!({"location": {"lat": "north"}}))
            .unwrap_err();
        assert_eq!(err.issues()[0].path.to_string(), "$.lat");

        let pin: Pin = Fitter::new().fit(&json!({"location": {"lat": 1.5}})).unwrap();
        assert_eq!(crate::serialize::serialize(&pin).unwrap(), json!({"note": null}));
    }

    #[test]
    fn extra_keys_are_ignored_unless_strict() {
        let input = json!({"x": 1, "y": 2, "z": 3});
        assert!(Fitter::new().fit::<Point>(&input).is_ok());

        let strict = Fitter::new().with_config(Config {
            no_unwanted_keys: true,
        });
        let err = strict.fit::<Point>(&input).unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].path.to_string(), "$.z");
        assert_eq!(
            err.issues()[0].issue,
            FitIssue::UnwantedKey {
                owner: "Point".into()
            }
        );
    }

    #[test]
    fn failing_parents_carry_no_errors_of_their_own() {
        let input = json!({"x": "1", "y": 2});
        let trace = Fitter::new().trace::<Point>(&input, &Context::default()).unwrap();
        assert!(!trace.succeeded());
        assert!(trace.node().errors().is_empty());
        assert!(trace.node().has_failing_child());
        let issues = trace.node().issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path.to_string(), "$.x");
    }

    #[test]
    fn narrow_rejections_become_issues() {
        let fitter = Fitter::new();
        assert_eq!(fitter.fit::<Even>(&json!(4)).unwrap(), Even(4));
        let err = fitter.fit::<Even>(&json!(5)).unwrap_err();
        assert_eq!(
            err.issues()[0].issue,
            FitIssue::ConstructionRejected {
                type_name: "Even".into(),
                rejection: Rejection::new("5 is odd"),
            }
        );
        assert!(matches!(
            fitter.fit::<Even>(&json!("4")).unwrap_err().issues()[0].issue,
            FitIssue::TypeMismatch { .. }
        ));
    }

    #[test]
    fn sequences_keep_every_child() {
        let input = json!([1, "two", 3]);
        let trace = Fitter::new().trace::<Vec<i64>>(&input, &Context::default()).unwrap();
        let Children::Items(items) = trace.node().children() else {
            panic!("expected items");
        };
        assert_eq!(items.len(), 3);
        assert!(items[0].succeeded() && !items[1].succeeded() && items[2].succeeded());
    }

    #[test]
    fn mapping_keys_pass_through() {
        let fitted: IndexMap<String, Option<i64>> = Fitter::new()
            .fit(&json!({"b": 1, "a": null}))
            .unwrap();
        assert_eq!(fitted.keys().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(fitted["a"], None);
    }

    #[test]
    fn json_equality_is_numeric() {
        assert!(json_eq(&json!(2), &json!(2.0)));
        assert!(json_eq(&json!({"a": [1]}), &json!({"a": [1.0]})));
        assert!(!json_eq(&json!(2), &json!("2")));
        assert!(!json_eq(&json!(true), &json!(1)));
    }
}
