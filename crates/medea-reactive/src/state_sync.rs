//! Lock-guarded state snapshot with a post-mutation hook.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

/// Hook invoked after every [`StateSync::mutate`] call with the committed
/// `(new, old)` snapshots.
pub type OnDidMutate<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;

/// Single-writer container of an immutable state snapshot.
///
/// Readers always observe a fully committed snapshot. Every
/// [`StateSync::mutate`] call replaces the snapshot atomically and then fires
/// the registered [`OnDidMutate`] hook exactly once, __after__ the lock is
/// released, so the hook may freely read or mutate the same container.
///
/// Hooks are fired strictly in commit order. Only one thread delivers them
/// at a time: a [`StateSync::mutate`] committed while another thread is
/// delivering hands its `(new, old)` pair over to that thread and returns
/// right away. A [`StateSync::mutate`] called from inside the hook is
/// delivered once the current hook returns.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use medea_reactive::StateSync;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let state = StateSync::new(0u32);
/// state.set_on_did_mutate({
///     let seen = Arc::clone(&seen);
///     move |new: &u32, old: &u32| seen.lock().unwrap().push((*new, *old))
/// });
///
/// state.mutate(|s| *s += 5);
/// assert_eq!(state.read(), 5);
/// assert_eq!(*seen.lock().unwrap(), vec![(5, 0)]);
/// ```
pub struct StateSync<S> {
    /// Currently committed snapshot and its undelivered mutations.
    inner: Mutex<Inner<S>>,

    /// Hook fired after each mutation.
    on_did_mutate: Mutex<Option<OnDidMutate<S>>>,
}

/// Lock-guarded part of a [`StateSync`].
struct Inner<S> {
    /// Currently committed snapshot.
    state: S,

    /// Committed `(new, old)` pairs not yet passed to the hook, in commit
    /// order.
    pending: VecDeque<(S, S)>,

    /// Indicator whether some thread is draining [`Inner::pending`] now.
    delivering: bool,
}

impl<S> Inner<S> {
    #[inline]
    fn new(state: S) -> Self {
        Self {
            state,
            pending: VecDeque::new(),
            delivering: false,
        }
    }
}

impl<S: Clone> StateSync<S> {
    /// Creates a new [`StateSync`] without a mutation hook.
    #[inline]
    pub fn new(state: S) -> Self {
        Self {
            inner: Mutex::new(Inner::new(state)),
            on_did_mutate: Mutex::new(None),
        }
    }

    /// Creates a new [`StateSync`] with the provided mutation hook.
    #[inline]
    pub fn with_on_did_mutate<F>(state: S, hook: F) -> Self
    where
        F: Fn(&S, &S) + Send + Sync + 'static,
    {
        Self {
            inner: Mutex::new(Inner::new(state)),
            on_did_mutate: Mutex::new(Some(Arc::new(hook))),
        }
    }

    /// Replaces the mutation hook of this [`StateSync`].
    pub fn set_on_did_mutate<F>(&self, hook: F)
    where
        F: Fn(&S, &S) + Send + Sync + 'static,
    {
        *lock(&self.on_did_mutate) = Some(Arc::new(hook));
    }

    /// Returns a copy of the current snapshot.
    #[inline]
    pub fn read(&self) -> S {
        lock(&self.inner).state.clone()
    }

    /// Applies `f` to the current snapshot without copying it.
    ///
    /// `f` must not call back into this [`StateSync`].
    #[inline]
    pub fn read_with<R, F: FnOnce(&S) -> R>(&self, f: F) -> R {
        f(&lock(&self.inner).state)
    }

    /// Atomically replaces the snapshot with the one produced by `transform`
    /// and returns whatever `transform` returned.
    ///
    /// The [`OnDidMutate`] hook is called once with `(new, old)` after the
    /// lock is released, after the hooks of all the mutations committed
    /// earlier.
    pub fn mutate<R, F>(&self, transform: F) -> R
    where
        F: FnOnce(&mut S) -> R,
    {
        let (result, deliver) = {
            let mut inner = lock(&self.inner);
            let old = inner.state.clone();
            let mut new = old.clone();
            let result = transform(&mut new);
            inner.state = new.clone();
            inner.pending.push_back((new, old));
            let deliver = !inner.delivering;
            inner.delivering = true;
            (result, deliver)
        };

        if deliver {
            self.deliver();
        }

        result
    }

    /// Passes all the pending mutations to the hook until none is left.
    ///
    /// Must be called only by the thread that has set
    /// [`Inner::delivering`].
    fn deliver(&self) {
        let _guard = DeliveryGuard(self);
        loop {
            let (new, old) = {
                let mut inner = lock(&self.inner);
                match inner.pending.pop_front() {
                    Some(pair) => pair,
                    None => {
                        inner.delivering = false;
                        return;
                    }
                }
            };
            let hook = lock(&self.on_did_mutate).clone();
            if let Some(hook) = hook {
                (hook)(&new, &old);
            }
        }
    }
}

/// Releases the delivery role of a [`StateSync`] if its hook panics, so the
/// next [`StateSync::mutate`] picks the remaining mutations up.
struct DeliveryGuard<'a, S>(&'a StateSync<S>);

impl<S> Drop for DeliveryGuard<'_, S> {
    fn drop(&mut self) {
        if thread::panicking() {
            lock(&self.0.inner).delivering = false;
        }
    }
}

impl<S: Clone + Default> Default for StateSync<S> {
    #[inline]
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: fmt::Debug> fmt::Debug for StateSync<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSync")
            .field("state", &lock(&self.inner).state)
            .finish()
    }
}

/// Locks the provided [`Mutex`] ignoring poisoning.
///
/// Poisoning can only happen inside a user transform, before the new snapshot
/// is committed, so the stored value is always consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
