//! Generic "object changed" notifications.

use futures::stream::{BoxStream, StreamExt as _};
use medea_reactive::ObservableCell;

/// Source of generic change notifications of some entity, carrying no
/// details about what exactly has changed.
///
/// Each [`ObjectChanged::notify`] call yields exactly one item in every
/// stream returned by [`ObjectChanged::subscribe`] before it.
#[derive(Debug)]
pub struct ObjectChanged(ObservableCell<u64>);

impl ObjectChanged {
    /// Creates a new [`ObjectChanged`] without subscribers.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(ObservableCell::new(0))
    }

    /// Notifies all the subscribers.
    #[inline]
    pub fn notify(&self) {
        self.0.mutate(|gen| *gen = gen.wrapping_add(1));
    }

    /// Returns a [`Stream`] of notifications fired after this call.
    ///
    /// [`Stream`]: futures::Stream
    pub fn subscribe(&self) -> BoxStream<'static, ()> {
        Box::pin(self.0.subscribe().skip(1).map(drop))
    }

    /// Returns count of notifications fired so far.
    #[inline]
    pub fn count(&self) -> u64 {
        self.0.get()
    }
}

impl Default for ObjectChanged {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
