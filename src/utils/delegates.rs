//! Registry of weakly referenced observers.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    ptr,
    sync::{Arc, Mutex, Weak},
};

use log::error;

use super::lock;

/// Registry of observers (delegates) of some entity.
///
/// Delegates are stored as [`Weak`] references, so registering an observer
/// never keeps it alive. Dropped delegates are pruned on each notification.
pub struct Delegates<T: ?Sized>(Mutex<Vec<Weak<T>>>);

impl<T: ?Sized> Delegates<T> {
    /// Creates a new empty [`Delegates`] registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    /// Registers the provided `delegate`.
    #[inline]
    pub fn add(&self, delegate: &Arc<T>) {
        self.add_weak(Arc::downgrade(delegate));
    }

    /// Registers the provided [`Weak`] `delegate`, unless it's registered
    /// already.
    pub fn add_weak(&self, delegate: Weak<T>) {
        let mut delegates = lock(&self.0);
        if !delegates.iter().any(|d| same(d, &delegate)) {
            delegates.push(delegate);
        }
    }

    /// Unregisters the provided `delegate`.
    ///
    /// Returns `false` if it wasn't registered.
    #[inline]
    pub fn remove(&self, delegate: &Arc<T>) -> bool {
        self.remove_weak(&Arc::downgrade(delegate))
    }

    /// Unregisters the provided [`Weak`] `delegate`.
    ///
    /// Returns `false` if it wasn't registered.
    pub fn remove_weak(&self, delegate: &Weak<T>) -> bool {
        let mut delegates = lock(&self.0);
        let len = delegates.len();
        delegates.retain(|d| !same(d, delegate));
        delegates.len() != len
    }

    /// Indicates whether the provided [`Weak`] `delegate` is registered.
    pub fn contains(&self, delegate: &Weak<T>) -> bool {
        lock(&self.0).iter().any(|d| same(d, delegate))
    }

    /// Returns count of the alive registered delegates.
    pub fn len(&self) -> usize {
        lock(&self.0).iter().filter(|d| d.strong_count() > 0).count()
    }

    /// Indicates whether there are no alive registered delegates.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls the provided `f` for every alive delegate.
    ///
    /// The registry is not locked while `f` runs, so delegates may
    /// (un)register themselves from inside it. A panicking delegate is logged
    /// and doesn't prevent the others from being notified.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&T),
    {
        let alive: Vec<Arc<T>> = {
            let mut delegates = lock(&self.0);
            delegates.retain(|d| d.strong_count() > 0);
            delegates.iter().filter_map(Weak::upgrade).collect()
        };
        for delegate in alive {
            let res = panic::catch_unwind(AssertUnwindSafe(|| f(&delegate)));
            if res.is_err() {
                error!("Delegate panicked while being notified");
            }
        }
    }
}

impl<T: ?Sized> Default for Delegates<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Delegates<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Delegates").field(&self.len()).finish()
    }
}

/// Compares two [`Weak`]s by the address of their allocation.
fn same<T: ?Sized>(a: &Weak<T>, b: &Weak<T>) -> bool {
    ptr::eq(a.as_ptr().cast::<()>(), b.as_ptr().cast::<()>())
}
