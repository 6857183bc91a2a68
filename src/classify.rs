//! Classification of Rust types into [`TypeDescriptor`]s.
//!
//! Rust has no runtime reflection, so a type opts in by implementing [`Fit`]
//! and describing itself through a [`Describer`]. Descriptions are memoized
//! per [`TypeId`] in a process-wide cache; recursive types are described
//! once, their back-edges going through deferred [`TypeRef`] slots.
use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, RwLock};

use once_cell::sync::Lazy;

use crate::descriptor::{short_type_name, FieldBinding, Kind, Slot, TypeDescriptor, TypeRef};
use crate::error::ClassifyError;

mod builders;
mod impls;

pub use builders::{EnumBuilder, Narrow, RecordBuilder, UnionBuilder};
pub(crate) use builders::check_members;

/// A type the engine can fit.
///
/// ```ignore
/// impl Fit for Story {
///     fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
///         cx.record::<Story>("Story")
///             .field("id", |s: &Story| &s.id)
///             .field("title", |s: &Story| &s.title)
///             .build(|v| Ok(Story { id: v.take("id")?, title: v.take("title")? }))
///     }
/// }
/// ```
pub trait Fit: Any + Send + Sync + Sized {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError>;
}

// ------------------------------ Global cache ----------------------------- //

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, Arc<TypeDescriptor>>,
    /// Descriptors of a racing classification that lost publication. Their
    /// deferred slots may still point at each other, so they stay alive.
    retained: Vec<Arc<TypeDescriptor>>,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

fn cached(id: TypeId) -> Option<Arc<TypeDescriptor>> {
    let registry = REGISTRY.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    registry.by_type.get(&id).cloned()
}

/// Classifies `T`, memoized.
pub fn classify<T: Fit>() -> Result<Arc<TypeDescriptor>, ClassifyError> {
    let id = TypeId::of::<T>();
    if let Some(found) = cached(id) {
        return Ok(found);
    }

    let mut cx = Describer::default();
    cx.type_of::<T>()?;
    for described in cx.done.values() {
        check_productive(described)?;
    }

    let mut registry = REGISTRY.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    for (described_id, described) in cx.done {
        match registry.by_type.get(&described_id) {
            Some(_) => registry.retained.push(described),
            None => {
                tracing::debug!(type_name = described.name(), "classified");
                registry.by_type.insert(described_id, described);
            }
        }
    }
    registry
        .by_type
        .get(&id)
        .cloned()
        .ok_or_else(|| ClassifyError::UnresolvableType {
            name: short_type_name(type_name::<T>()),
        })
}

// ------------------------------- Describer ------------------------------- //

/// Classification session: tracks what is being described so recursive
/// references resolve to deferred slots instead of recursing forever.
#[derive(Default)]
pub struct Describer {
    pending: HashMap<TypeId, (String, Slot)>,
    done: HashMap<TypeId, Arc<TypeDescriptor>>,
}

impl Describer {
    /// Reference to the descriptor of `T`, describing it first if needed.
    pub fn type_of<T: Fit>(&mut self) -> Result<TypeRef, ClassifyError> {
        let id = TypeId::of::<T>();
        if let Some(found) = cached(id) {
            return Ok(TypeRef::ready(found));
        }
        if let Some(found) = self.done.get(&id) {
            return Ok(TypeRef::ready(found.clone()));
        }
        if let Some((name, slot)) = self.pending.get(&id) {
            return Ok(TypeRef::deferred(name.clone(), slot.clone()));
        }

        let slot: Slot = Arc::new(OnceLock::new());
        self.pending
            .insert(id, (short_type_name(type_name::<T>()), slot.clone()));
        let described = T::describe(self);
        self.pending.remove(&id);

        let described = Arc::new(described?);
        let _ = slot.set(Arc::downgrade(&described));
        self.done.insert(id, described.clone());
        Ok(TypeRef::ready(described))
    }

    pub fn record<T: Fit>(&mut self, name: impl Into<String>) -> RecordBuilder<'_, T> {
        RecordBuilder::new(self, name.into())
    }

    pub fn union<T: Fit>(&mut self, name: impl Into<String>) -> UnionBuilder<'_, T> {
        UnionBuilder::new(self, name.into())
    }

    pub fn enumeration<T>(&mut self, name: impl Into<String>) -> EnumBuilder<T>
    where
        T: Fit + Clone + PartialEq,
    {
        EnumBuilder::new(name.into())
    }

    /// Describes `T` as a narrow type over its [`Narrow::Source`].
    pub fn narrow<T: Narrow + Fit>(&mut self) -> Result<TypeDescriptor, ClassifyError> {
        builders::narrow::<T>(self)
    }
}

// ------------------------------ Productivity ----------------------------- //

/// Edges that fit the very same input value again.
fn same_value_edges(ty: &TypeDescriptor) -> Result<Vec<Arc<TypeDescriptor>>, ClassifyError> {
    match ty.kind() {
        Kind::Optional(shape) => Ok(vec![shape.inner.resolve()?]),
        Kind::Union(shape) => shape.alternatives.iter().map(|a| a.ty.resolve()).collect(),
        Kind::Narrow(shape) => Ok(vec![shape.source.resolve()?]),
        _ => Ok(Vec::new()),
    }
}

/// Edges to every type fitted below `ty`, whatever value it is fitted against.
fn all_edges(ty: &TypeDescriptor) -> Result<Vec<Arc<TypeDescriptor>>, ClassifyError> {
    match ty.kind() {
        Kind::Any | Kind::Primitive(_) | Kind::Enumeration(_) => Ok(Vec::new()),
        Kind::Optional(shape) => Ok(vec![shape.inner.resolve()?]),
        Kind::Union(shape) => shape.alternatives.iter().map(|a| a.ty.resolve()).collect(),
        Kind::Sequence(shape) => Ok(vec![shape.item.resolve()?]),
        Kind::Mapping(shape) => Ok(vec![shape.value.resolve()?]),
        Kind::Record(shape) => shape
            .fields
            .iter()
            .filter_map(|field| field.ty())
            .map(TypeRef::resolve)
            .collect(),
        Kind::Narrow(shape) => Ok(vec![shape.source.resolve()?]),
    }
}

/// Every type reachable from `from` through `edges`, `from` included.
fn reachable(
    from: &Arc<TypeDescriptor>,
    edges: fn(&TypeDescriptor) -> Result<Vec<Arc<TypeDescriptor>>, ClassifyError>,
) -> Result<Vec<Arc<TypeDescriptor>>, ClassifyError> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut stack = vec![from.clone()];
    while let Some(next) = stack.pop() {
        if seen.insert(Arc::as_ptr(&next) as usize) {
            stack.extend(edges(&next)?);
            found.push(next);
        }
    }
    Ok(found)
}

/// Rejects a type that can reach itself without descending into the value.
///
/// Such a type would make the engine recurse forever on the first input that
/// is not `null`, so it is refused before any data is consulted. A context
/// field restarts from the same context value each time, so a record whose
/// context field leads back to it loops the same way.
pub(crate) fn check_productive(start: &Arc<TypeDescriptor>) -> Result<(), ClassifyError> {
    let mut seen = HashSet::new();
    let mut stack = same_value_edges(start)?;
    while let Some(next) = stack.pop() {
        if Arc::ptr_eq(&next, start) {
            return Err(ClassifyError::unsupported(
                start.name(),
                "refers to itself without going through a list, map or record",
            ));
        }
        if seen.insert(Arc::as_ptr(&next) as usize) {
            stack.extend(same_value_edges(&next)?);
        }
    }

    for record in reachable(start, all_edges)? {
        let Kind::Record(shape) = record.kind() else {
            continue;
        };
        for field in &shape.fields {
            let FieldBinding::Context { ty, .. } = &field.binding else {
                continue;
            };
            let below = reachable(&ty.resolve()?, all_edges)?;
            if below.iter().any(|other| Arc::ptr_eq(other, &record)) {
                return Err(ClassifyError::unsupported(
                    record.name(),
                    format!("context field `{}` leads back to `{}`", field.name, record.name()),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{PrimitiveKind, Rejection};

    struct Looping(Box<Looping>);

    impl Narrow for Looping {
        type Source = Box<Looping>;

        fn narrow(_: Box<Looping>) -> Result<Self, Rejection> {
            Err(Rejection::new("never"))
        }

        fn widen(&self) -> Box<Looping> {
            unreachable!()
        }
    }

    impl Fit for Looping {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.narrow::<Self>()
        }
    }

    struct Tree {
        children: Vec<Tree>,
    }

    impl Fit for Tree {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Tree>("Tree")
                .field("children", |t: &Tree| &t.children)
                .build(|v| {
                    Ok(Tree {
                        children: v.take("children")?,
                    })
                })
        }
    }

    struct Scoped {
        outer: Vec<Scoped>,
    }

    impl Fit for Scoped {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Scoped>("Scoped")
                .context::<Vec<Scoped>>("outer", "scopes")
                .build(|v| Ok(Scoped { outer: v.take("outer")? }))
        }
    }

    #[test]
    fn primitives_are_cached() {
        let a = classify::<i64>().unwrap();
        let b = classify::<i64>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(a.kind(), Kind::Primitive(PrimitiveKind::Int)));
    }

    #[test]
    fn recursive_records_resolve_through_deferred_refs() {
        let tree = classify::<Tree>().unwrap();
        let Kind::Record(shape) = tree.kind() else {
            panic!("expected a record");
        };
        let crate::descriptor::FieldBinding::Input { ty, .. } = &shape.fields[0].binding else {
            panic!("expected an input field");
        };
        let list = ty.resolve().unwrap();
        let Kind::Sequence(items) = list.kind() else {
            panic!("expected a sequence");
        };
        assert!(Arc::ptr_eq(&items.item.resolve().unwrap(), &tree));
    }

    #[test]
    fn unproductive_cycles_are_rejected() {
        let err = classify::<Looping>().unwrap_err();
        assert!(matches!(err, ClassifyError::UnsupportedType { .. }), "{err}");
    }

    #[test]
    fn context_fields_leading_back_to_their_record_are_rejected() {
        let err = classify::<Scoped>().unwrap_err();
        let ClassifyError::UnsupportedType { name, reason } = &err else {
            panic!("expected an unsupported type, got {err}");
        };
        assert_eq!(name, "Scoped");
        assert!(reason.contains("context field `outer`"), "{reason}");
    }
}
