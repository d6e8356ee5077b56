//! Thread-safe observable analogue of the [`Cell`].
//!
//! [`Cell`]: std::cell::Cell

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::{
    channel::{mpsc, oneshot},
    future::{self, BoxFuture},
    stream::{self, BoxStream, StreamExt as _},
};

/// Error that is sent to all subscribers when an [`ObservableCell`] is
/// dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DroppedError;

impl fmt::Display for DroppedError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observable value has been dropped")
    }
}

impl From<oneshot::Canceled> for DroppedError {
    #[inline]
    fn from(_: oneshot::Canceled) -> Self {
        Self
    }
}

/// Subscriber of an [`ObservableCell`].
enum Subscriber<D> {
    /// Resolves once `assert_fn` returns `true` on a new value.
    When {
        sender: oneshot::Sender<()>,
        assert_fn: Box<dyn Fn(&D) -> bool + Send>,
    },

    /// Receives every new value.
    Subscribe(mpsc::UnboundedSender<D>),
}

/// Data and subscribers of an [`ObservableCell`].
struct Inner<D> {
    data: D,
    subs: Vec<Subscriber<D>>,
}

/// Observable value which can be shared between threads.
///
/// Subscribers are notified only when the value __really__ changes, which is
/// checked with its [`PartialEq`] implementation.
///
/// ```
/// use medea_reactive::ObservableCell;
///
/// let foo = ObservableCell::new(0i32);
///
/// foo.set(100);
/// assert_eq!(foo.get(), 100);
///
/// let old_value = foo.replace(200);
/// assert_eq!(old_value, 100);
///
/// foo.mutate(|data| *data = 300);
/// assert_eq!(foo.get(), 300);
/// ```
pub struct ObservableCell<D>(Mutex<Inner<D>>);

impl<D> ObservableCell<D>
where
    D: Clone + PartialEq + Send + 'static,
{
    /// Returns new [`ObservableCell`] with subscribable mutations.
    #[inline]
    pub fn new(data: D) -> Self {
        Self(Mutex::new(Inner {
            data,
            subs: Vec::new(),
        }))
    }

    /// Returns copy of an underlying data.
    #[inline]
    pub fn get(&self) -> D {
        self.lock().data.clone()
    }

    /// Returns [`Stream`] which emits the current value followed by every
    /// change of it.
    ///
    /// [`Stream`]: futures::Stream
    pub fn subscribe(&self) -> BoxStream<'static, D> {
        let mut inner = self.lock();
        let (tx, rx) = mpsc::unbounded();
        inner.subs.push(Subscriber::Subscribe(tx));
        let current = inner.data.clone();
        Box::pin(stream::once(future::ready(current)).chain(rx))
    }

    /// Returns [`Future`] which resolves once `assert_fn` returns `true` on
    /// the current or some future value.
    ///
    /// [`Future`]: std::future::Future
    pub fn when<F>(
        &self,
        assert_fn: F,
    ) -> BoxFuture<'static, Result<(), DroppedError>>
    where
        F: Fn(&D) -> bool + Send + 'static,
    {
        let mut inner = self.lock();
        if (assert_fn)(&inner.data) {
            return Box::pin(future::ok(()));
        }
        let (sender, rx) = oneshot::channel();
        inner.subs.push(Subscriber::When {
            sender,
            assert_fn: Box::new(assert_fn),
        });
        Box::pin(async move { Ok(rx.await?) })
    }

    /// Returns [`Future`] which resolves once the value becomes equal to
    /// `should_be`.
    ///
    /// [`Future`]: std::future::Future
    #[inline]
    pub fn when_eq(
        &self,
        should_be: D,
    ) -> BoxFuture<'static, Result<(), DroppedError>> {
        self.when(move |data| data == &should_be)
    }

    /// Sets the `new_data` value as an underlying data.
    #[inline]
    pub fn set(&self, new_data: D) {
        drop(self.replace(new_data));
    }

    /// Replaces the underlying data with `new_data` returning the old one.
    pub fn replace(&self, new_data: D) -> D {
        let mut inner = self.lock();
        let old = std::mem::replace(&mut inner.data, new_data);
        if inner.data != old {
            inner.notify();
        }
        old
    }

    /// Updates an underlying data with the provided function.
    pub fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut D),
    {
        let mut inner = self.lock();
        let before = inner.data.clone();
        f(&mut inner.data);
        if inner.data != before {
            inner.notify();
        }
    }

    /// Locks the [`Inner`] data.
    fn lock(&self) -> MutexGuard<'_, Inner<D>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: Clone> Inner<D> {
    /// Sends the current data to all the subscribers, dropping the finished
    /// ones.
    fn notify(&mut self) {
        let data = &self.data;
        let subs = std::mem::take(&mut self.subs);
        self.subs = subs
            .into_iter()
            .filter_map(|sub| match sub {
                Subscriber::When { sender, assert_fn } => {
                    if (assert_fn)(data) {
                        let _ = sender.send(());
                        None
                    } else {
                        Some(Subscriber::When { sender, assert_fn })
                    }
                }
                Subscriber::Subscribe(tx) => tx
                    .unbounded_send(data.clone())
                    .ok()
                    .map(|_| Subscriber::Subscribe(tx)),
            })
            .collect();
    }
}

impl<D: fmt::Debug> fmt::Debug for ObservableCell<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ObservableCell")
            .field("data", &inner.data)
            .field("subs", &inner.subs.len())
            .finish()
    }
}

#[cfg(test)]
mod observable_cell {
    use std::{sync::Arc, time::Duration};

    use futures::StreamExt as _;
    use tokio::time::timeout;

    use super::ObservableCell;

    #[tokio::test]
    async fn subscription() {
        let field = ObservableCell::new(0);
        let subscription = field.subscribe();

        field.set(100);
        assert_eq!(subscription.skip(1).next().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn only_initial_update_emitted() {
        let field = ObservableCell::new(0);
        let mut subscription = field.subscribe();
        assert_eq!(subscription.next().await.unwrap(), 0);

        field.set(0);
        let _ = timeout(Duration::from_millis(10), subscription.next())
            .await
            .unwrap_err();
    }

    #[tokio::test]
    async fn when_resolves_from_other_thread() {
        let field = Arc::new(ObservableCell::new(0));
        let when_greater_than_5 = field.when(|upd| upd > &5);

        let setter = Arc::clone(&field);
        std::thread::spawn(move || setter.set(6)).join().unwrap();

        timeout(Duration::from_millis(50), when_greater_than_5)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn when_eq_resolves_if_value_eq_already() {
        let field = ObservableCell::new(9);
        field.when_eq(9).await.unwrap();
    }

    #[tokio::test]
    async fn when_returns_dropped_error_on_drop() {
        let field = ObservableCell::new(0);
        let subscription = field.when_eq(100);
        drop(field);
        let _ = subscription.await.unwrap_err();
    }

    #[tokio::test]
    async fn emits_changes_on_mutate_and_replace() {
        let field = ObservableCell::new(vec![1]);
        let mut subscription = field.subscribe().skip(1);

        field.mutate(|data| data.push(2));
        assert_eq!(field.replace(vec![3]), vec![1, 2]);

        assert_eq!(subscription.next().await.unwrap(), vec![1, 2]);
        assert_eq!(subscription.next().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn stream_ends_when_cell_is_dropped() {
        let field = ObservableCell::new(0);
        let subscription = field.subscribe();
        drop(field);
        assert!(subscription.skip(1).next().await.is_none());
    }
}
