//! Runtime type descriptors.
//!
//! A [`TypeDescriptor`] classifies a target type into exactly one [`Kind`].
//! Descriptors are immutable once built and carry type-erased hooks that turn
//! fitted children into the target value (forward direction) and expose the
//! children of an existing value (reverse direction, used by
//! [`crate::serialize`]).
//!
//! Fitted values travel through the engine as [`Erased`] boxes; every hook
//! downcasts what it receives and reports a [`HookError::Erasure`] instead of
//! panicking when a descriptor is wired to the wrong Rust type.
use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::RootSlot;
use crate::error::ClassifyError;

/// A fitted value whose concrete type is only known to the descriptor that built it.
pub type Erased = Box<dyn Any + Send>;

pub(crate) fn erase<T: Any + Send>(value: T) -> Erased {
    Box::new(value)
}

pub(crate) fn unerase<T: Any>(value: Erased) -> Result<T, HookError> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| HookError::Erasure {
            expected: type_name::<T>(),
        })
}

/// Converts a value produced by a JSON-shaped descriptor back into JSON.
///
/// Primitive kinds produce native scalars; every other descriptor built
/// from a schema document produces a [`Value`] directly.
pub(crate) fn into_json(value: Erased) -> Result<Value, HookError> {
    let value = match value.downcast::<Value>() {
        Ok(v) => return Ok(*v),
        Err(v) => v,
    };
    let value = match value.downcast::<i64>() {
        Ok(v) => return Ok(Value::from(*v)),
        Err(v) => v,
    };
    let value = match value.downcast::<f64>() {
        Ok(v) => return Ok(Value::from(*v)),
        Err(v) => v,
    };
    let value = match value.downcast::<bool>() {
        Ok(v) => return Ok(Value::Bool(*v)),
        Err(v) => v,
    };
    let value = match value.downcast::<String>() {
        Ok(v) => return Ok(Value::String(*v)),
        Err(v) => v,
    };
    match value.downcast::<()>() {
        Ok(_) => Ok(Value::Null),
        Err(_) => Err(HookError::Erasure {
            expected: "JSON value",
        }),
    }
}

// ------------------------------- Failures -------------------------------- //

/// Intentional rejection of otherwise well-shaped data by a constructor or a
/// narrow type. This is what lets a record act as a union discriminator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct Rejection {
    reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Failure of a construction hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// A hook received a value of another type than the one it was built for.
    #[error("internal: expected a fitted `{expected}`")]
    Erasure { expected: &'static str },

    /// A record constructor asked for a field that was never fitted.
    #[error("internal: field `{field}` was not fitted")]
    MissingValue { field: String },
}

// --------------------------------- Hooks --------------------------------- //

pub(crate) type Hook<A> = Arc<dyn Fn(A) -> Result<Erased, HookError> + Send + Sync>;
pub(crate) type PeekHook = Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;
/// Outer `None`: not the expected type. Inner `None`: the value is empty.
pub(crate) type OptionPeekHook =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<Option<&'a dyn Any>> + Send + Sync>;
pub(crate) type ItemsHook =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<Vec<&'a dyn Any>> + Send + Sync>;
pub(crate) type EntriesHook =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<Vec<(&'a str, &'a dyn Any)>> + Send + Sync>;
pub(crate) type IndexHook = Arc<dyn Fn(&dyn Any) -> Option<usize> + Send + Sync>;
pub(crate) type WidenHook =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<Widened<'a>> + Send + Sync>;
pub(crate) type SerializeHook = Arc<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;
pub(crate) type DefaultHook = Arc<dyn Fn() -> Erased + Send + Sync>;
/// Picks a field's value out of the whole input mapping.
pub(crate) type SelectHook =
    Arc<dyn for<'a> Fn(&'a Map<String, Value>) -> Option<&'a Value> + Send + Sync>;

pub(crate) fn hook<A, F>(f: F) -> Hook<A>
where
    F: Fn(A) -> Result<Erased, HookError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn peek_hook<F>(f: F) -> PeekHook
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn option_peek_hook<F>(f: F) -> OptionPeekHook
where
    F: for<'a> Fn(&'a dyn Any) -> Option<Option<&'a dyn Any>> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn items_hook<F>(f: F) -> ItemsHook
where
    F: for<'a> Fn(&'a dyn Any) -> Option<Vec<&'a dyn Any>> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn entries_hook<F>(f: F) -> EntriesHook
where
    F: for<'a> Fn(&'a dyn Any) -> Option<Vec<(&'a str, &'a dyn Any)>> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn widen_hook<F>(f: F) -> WidenHook
where
    F: for<'a> Fn(&'a dyn Any) -> Option<Widened<'a>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Source value recovered from a narrow value, for serialization.
pub(crate) enum Widened<'a> {
    Borrowed(&'a dyn Any),
    Owned(Erased),
}

// ------------------------------ Descriptor ------------------------------- //

/// Scalar kinds of the decoded value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    Float,
    Bool,
    String,
    None,
}

impl PrimitiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::Int => "int",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::String => "string",
            PrimitiveKind::None => "none",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(PrimitiveKind::Int),
            "float" => Some(PrimitiveKind::Float),
            "bool" => Some(PrimitiveKind::Bool),
            "string" => Some(PrimitiveKind::String),
            "none" => Some(PrimitiveKind::None),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable classification of a target type.
pub struct TypeDescriptor {
    name: String,
    kind: Kind,
    serialize_with: Option<SerializeHook>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            serialize_with: None,
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(kind.as_str(), Kind::Primitive(kind))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Overrides reverse serialization for values of `T`.
    pub fn with_serializer<T, F>(mut self, serialize: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.serialize_with = Some(Arc::new(move |any: &dyn Any| {
            any.downcast_ref::<T>().map(&serialize)
        }));
        self
    }

    pub(crate) fn serialize_hook(&self) -> Option<&SerializeHook> {
        self.serialize_with.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .finish()
    }
}

/// One-line signature, children shown by name only.
impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Any => write!(f, "any"),
            Kind::Primitive(p) => write!(f, "{p}"),
            Kind::Optional(s) => write!(f, "optional<{}>", s.inner.name()),
            Kind::Union(s) => {
                let names: Vec<&str> = s.alternatives.iter().map(|a| a.ty.name()).collect();
                write!(f, "union {} = {}", self.name, names.join(" | "))
            }
            Kind::Sequence(s) => write!(f, "list<{}>", s.item.name()),
            Kind::Mapping(s) => write!(f, "map<string, {}>", s.value.name()),
            Kind::Enumeration(s) => {
                let members: Vec<String> = s
                    .members
                    .iter()
                    .map(|m| format!("{} = {}", m.name, m.raw))
                    .collect();
                write!(f, "enum {} {{ {} }}", self.name, members.join(", "))
            }
            Kind::Record(s) => {
                let fields: Vec<String> = s.fields.iter().map(FieldDescriptor::signature).collect();
                write!(f, "record {} {{ {} }}", self.name, fields.join(", "))
            }
            Kind::Narrow(s) => write!(f, "narrow {} <- {}", self.name, s.source.name()),
        }
    }
}

/// The category a descriptor falls into; the engine dispatches on this alone.
pub enum Kind {
    /// Any decoded value, kept as-is.
    Any,
    Primitive(PrimitiveKind),
    Optional(OptionalShape),
    Union(UnionShape),
    Sequence(SequenceShape),
    Mapping(MappingShape),
    Enumeration(EnumShape),
    Record(RecordShape),
    Narrow(NarrowShape),
}

impl Kind {
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::Primitive(_) => "primitive",
            Kind::Optional(_) => "optional",
            Kind::Union(_) => "union",
            Kind::Sequence(_) => "sequence",
            Kind::Mapping(_) => "mapping",
            Kind::Enumeration(_) => "enumeration",
            Kind::Record(_) => "record",
            Kind::Narrow(_) => "narrow",
        }
    }
}

pub struct OptionalShape {
    pub inner: TypeRef,
    pub(crate) wrap: Hook<Option<Erased>>,
    pub(crate) peek: Option<OptionPeekHook>,
}

pub struct Alternative {
    pub ty: TypeRef,
    pub(crate) wrap: Hook<Erased>,
    pub(crate) peek: Option<PeekHook>,
}

/// Alternatives in preference order; the first one that fits wins.
pub struct UnionShape {
    pub alternatives: Vec<Alternative>,
}

pub struct SequenceShape {
    pub item: TypeRef,
    pub(crate) collect: Hook<Vec<Erased>>,
    pub(crate) items: Option<ItemsHook>,
}

pub struct MappingShape {
    pub value: TypeRef,
    pub(crate) collect: Hook<IndexMap<String, Erased>>,
    pub(crate) entries: Option<EntriesHook>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub raw: Value,
}

pub struct EnumShape {
    pub members: Vec<EnumMember>,
    pub(crate) pick: Hook<usize>,
    pub(crate) index_of: Option<IndexHook>,
}

pub struct RecordShape {
    pub fields: Vec<FieldDescriptor>,
    pub(crate) construct: Hook<FieldValues>,
}

pub struct NarrowShape {
    pub source: TypeRef,
    pub(crate) wrap: Hook<Erased>,
    pub(crate) widen: Option<WidenHook>,
}

// -------------------------------- Fields --------------------------------- //

/// Where a record field gets its value from.
///
/// Injected fields never read input data and are never serialized, so a
/// source-key override only exists on [`FieldBinding::Input`].
pub enum FieldBinding {
    Input {
        ty: TypeRef,
        source: Option<String>,
        default: Option<FieldDefault>,
    },
    /// Read through a selector over the input mapping. Not serialized, since
    /// a selector has no inverse.
    Selected {
        ty: TypeRef,
        select: SelectHook,
    },
    Context {
        key: String,
        ty: TypeRef,
    },
    Root,
}

pub enum FieldDefault {
    /// Decoded value fitted through the field type when the key is absent.
    Json(Value),
    Make(DefaultHook),
}

pub struct FieldDescriptor {
    pub name: String,
    pub binding: FieldBinding,
    pub(crate) get: Option<PeekHook>,
}

impl FieldDescriptor {
    /// Key read from the input mapping, `None` for injected fields.
    pub fn input_key(&self) -> Option<&str> {
        match &self.binding {
            FieldBinding::Input { source, .. } => {
                Some(source.as_deref().unwrap_or(self.name.as_str()))
            }
            FieldBinding::Selected { .. } | FieldBinding::Context { .. } | FieldBinding::Root => {
                None
            }
        }
    }

    /// Declared type of the field, `None` for the root back-reference.
    pub fn ty(&self) -> Option<&TypeRef> {
        match &self.binding {
            FieldBinding::Input { ty, .. }
            | FieldBinding::Selected { ty, .. }
            | FieldBinding::Context { ty, .. } => Some(ty),
            FieldBinding::Root => None,
        }
    }

    fn signature(&self) -> String {
        match &self.binding {
            FieldBinding::Input {
                ty,
                source,
                default,
            } => {
                let mut out = format!("{}: {}", self.name, ty.name());
                if let Some(source) = source {
                    out.push_str(&format!(" from {source:?}"));
                }
                if default.is_some() {
                    out.push_str(" = default");
                }
                out
            }
            FieldBinding::Selected { ty, .. } => format!("{}: {} selected", self.name, ty.name()),
            FieldBinding::Context { key, ty } => {
                format!("{}: {} from context {key:?}", self.name, ty.name())
            }
            FieldBinding::Root => format!("{}: root", self.name),
        }
    }
}

/// Fitted field values handed to a record constructor, keyed by field name.
#[derive(Default)]
pub struct FieldValues {
    values: IndexMap<String, Erased>,
}

impl FieldValues {
    pub(crate) fn insert(&mut self, name: &str, value: Erased) {
        self.values.insert(name.to_string(), value);
    }

    /// Takes the fitted value of `name`.
    pub fn take<T: Any>(&mut self, name: &str) -> Result<T, HookError> {
        let value = self
            .values
            .shift_remove(name)
            .ok_or_else(|| HookError::MissingValue {
                field: name.to_string(),
            })?;
        unerase(value)
    }

    /// Takes a root-injected field.
    pub fn root<R: Any + Send + Sync>(
        &mut self,
        name: &str,
    ) -> Result<crate::context::RootRef<R>, HookError> {
        self.take::<RootSlot>(name)
            .map(crate::context::RootRef::from_slot)
    }

    pub(crate) fn into_values(self) -> IndexMap<String, Erased> {
        self.values
    }
}

// -------------------------------- TypeRef -------------------------------- //

pub(crate) type Slot = Arc<OnceLock<Weak<TypeDescriptor>>>;

/// Reference from a descriptor to a child type.
///
/// Back-edges of recursive types are deferred: they point at a slot filled
/// once the referenced description completes, and hold it weakly so a
/// recursive descriptor never owns itself.
#[derive(Clone)]
pub struct TypeRef(RefInner);

#[derive(Clone)]
enum RefInner {
    Ready(Arc<TypeDescriptor>),
    Deferred { name: String, slot: Slot },
}

impl TypeRef {
    pub fn ready(descriptor: Arc<TypeDescriptor>) -> Self {
        Self(RefInner::Ready(descriptor))
    }

    pub(crate) fn deferred(name: impl Into<String>, slot: Slot) -> Self {
        Self(RefInner::Deferred {
            name: name.into(),
            slot,
        })
    }

    pub fn name(&self) -> &str {
        match &self.0 {
            RefInner::Ready(d) => d.name(),
            RefInner::Deferred { name, .. } => name,
        }
    }

    pub fn resolve(&self) -> Result<Arc<TypeDescriptor>, ClassifyError> {
        match &self.0 {
            RefInner::Ready(d) => Ok(d.clone()),
            RefInner::Deferred { name, slot } => slot
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| ClassifyError::UnresolvableType { name: name.clone() }),
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.name())
    }
}

/// Shortens `alloc::vec::Vec<my_app::Story>` to `Vec<Story>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                out.truncate(segment_start);
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                out.push(c);
                segment_start = out.len();
            }
            _ => out.push(c),
        }
    }
    out
}
