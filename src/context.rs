//! Ambient call-scoped context propagated across asynchronous hops.
//!
//! The pool snapshots the submitting thread's ambient context with every
//! work item, and continuation registration snapshots the registering
//! thread's context; the snapshot is reinstalled for the duration of the
//! call when the item later runs on a worker. Rust has no implicit
//! execution-context channel, so the snapshot is an explicit value holding
//! caller-supplied typed entries: narrower than a locale/security capture,
//! but with the same propagation shape.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Entries = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// An immutable snapshot of ambient values, keyed by type.
#[derive(Clone, Default)]
pub struct AmbientContext {
    entries: Arc<Entries>,
}

thread_local! {
    static CURRENT: RefCell<AmbientContext> = RefCell::new(AmbientContext::default());
}

impl AmbientContext {
    /// Snapshot the calling thread's current ambient context.
    pub fn capture() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// A copy of this snapshot with one value added (or replaced).
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        let mut entries = (*self.entries).clone();
        entries.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Look up a value of type `T` in this snapshot.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install this snapshot as the calling thread's current context for
    /// the duration of `f`. The previous context is restored afterwards,
    /// including on unwind.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous =
            CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), self.clone()));
        let _restore = Restore(Some(previous));
        f()
    }
}

impl fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientContext")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Look up a value of type `T` in the calling thread's current context.
pub fn get<T>() -> Option<Arc<T>>
where
    T: Any + Send + Sync,
{
    CURRENT.with(|current| current.borrow().get::<T>())
}

struct Restore(Option<AmbientContext>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take().unwrap_or_default();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}
