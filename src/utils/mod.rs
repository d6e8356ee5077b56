//! Helper utils used in project.

mod delegates;
mod main_queue;
mod object_changed;

use std::sync::{Mutex, MutexGuard, PoisonError};

#[doc(inline)]
pub use self::{
    delegates::Delegates, main_queue::MainQueue,
    object_changed::ObjectChanged,
};

/// Upgrades provided [`Weak`] reference, returning the given error (wrapped
/// into [`tracerr::Traced`]) from the calling function if it's detached.
///
/// [`Weak`]: std::sync::Weak
macro_rules! upgrade_or_err {
    ($weak:expr, $err:expr) => {
        match $weak.upgrade() {
            Some(strong) => strong,
            None => return Err(tracerr::new!($err)),
        }
    };
}

/// Locks the provided [`Mutex`] ignoring its poisoning.
///
/// Entities of this crate never leave their data half-updated while holding
/// a lock, so the data is consistent even after a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
