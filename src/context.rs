//! Values injected into records instead of being read from input data.
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Immutable key → value mapping supplied once per top-level fit.
///
/// Values are decoded JSON and go through the usual fitting of the field
/// they are injected into.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: IndexMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ----------------------------- Root binding ------------------------------ //

type SharedRoot = Weak<dyn Any + Send + Sync>;

/// Deferred back-reference to the top-level value, bound after the root has
/// been constructed.
#[derive(Clone, Default)]
pub(crate) struct RootSlot(Arc<OnceLock<SharedRoot>>);

impl RootSlot {
    pub(crate) fn bind(&self, root: SharedRoot) {
        // A slot belongs to exactly one fit call, so it is bound at most once.
        let _ = self.0.set(root);
    }

    fn target(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.get().and_then(Weak::upgrade)
    }
}

/// Binds every slot to `root`.
pub(crate) fn bind_roots<T: Any + Send + Sync>(root: &Arc<T>, slots: Vec<RootSlot>) {
    let erased: Arc<dyn Any + Send + Sync> = root.clone();
    let weak = Arc::downgrade(&erased);
    for slot in slots {
        slot.bind(weak.clone());
    }
}

/// Reference from a nested value to the root it was fitted from.
///
/// The reference is weak: it never keeps the root alive. It stays unbound
/// when the root was fitted with [`crate::Fitter::fit_with`] instead of
/// [`crate::Fitter::fit_shared`].
pub struct RootRef<R> {
    slot: RootSlot,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Any + Send + Sync> RootRef<R> {
    pub(crate) fn from_slot(slot: RootSlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// A reference that is never bound, for values built by hand.
    pub fn unbound() -> Self {
        Self::from_slot(RootSlot::default())
    }

    pub fn get(&self) -> Option<Arc<R>> {
        self.slot.target()?.downcast::<R>().ok()
    }

    pub fn is_bound(&self) -> bool {
        self.slot.target().is_some()
    }
}

impl<R> Clone for RootRef<R> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for RootRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.target() {
            Some(_) => f.write_str("RootRef(bound)"),
            None => f.write_str("RootRef(unbound)"),
        }
    }
}

/// Two references are equal when they point at the same root, or both at none.
impl<R> PartialEq for RootRef<R> {
    fn eq(&self, other: &Self) -> bool {
        match (self.slot.target(), other.slot.target()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_builds_and_deserializes() {
        let built = Context::new().with("foo", 42).with("bar", "x");
        let parsed: Context = serde_json::from_value(json!({"foo": 42, "bar": "x"})).unwrap();
        assert_eq!(built, parsed);
        assert_eq!(parsed.get("foo"), Some(&json!(42)));
        assert!(parsed.get("baz").is_none());
    }

    #[test]
    fn root_refs_bind_weakly() {
        let slot = RootSlot::default();
        let reference: RootRef<String> = RootRef::from_slot(slot.clone());
        assert!(!reference.is_bound());

        let root = Arc::new("root".to_string());
        bind_roots(&root, vec![slot]);
        assert!(Arc::ptr_eq(&reference.get().unwrap(), &root));

        drop(root);
        assert!(reference.get().is_none());
    }

    #[test]
    fn wrong_root_type_reads_as_unbound() {
        let slot = RootSlot::default();
        let reference: RootRef<i64> = RootRef::from_slot(slot.clone());
        let root = Arc::new("root".to_string());
        bind_roots(&root, vec![slot]);
        assert!(reference.get().is_none());
    }
}
