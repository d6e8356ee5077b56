//! Single-slot value which many tasks can await concurrently.

use std::{
    fmt,
    mem,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use derive_more::Display;
use futures::channel::oneshot;

/// Default time a single [`Completer::wait`] call is allowed to suspend.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error of a [`Completer::wait`] call.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum WaitError<E> {
    /// No value was provided before the deadline passed.
    #[display(fmt = "Completer wasn't resumed in {:?}", _0)]
    Timeout(Duration),

    /// [`Completer`] was resumed with an error.
    #[display(fmt = "Completer failed: {}", _0)]
    Failed(E),
}

/// Sender half of a pending [`Completer::wait`] call.
type Waiter<T, E> = oneshot::Sender<Result<T, E>>;

/// Current stage of a [`Completer`].
enum Stage<T, E> {
    /// No value yet, tasks are waiting for it.
    Pending(Vec<Waiter<T, E>>),

    /// Value is cached until [`Completer::reset`].
    Resolved(T),

    /// Producer has failed, error is cached until [`Completer::reset`].
    Failed(E),
}

/// Many-readers future which is produced once by some background process.
///
/// Every [`Completer::wait`] call registers an independent waiter with its own
/// deadline: one of them timing out doesn't affect the others, which are
/// still released by a later [`Completer::resume`].
pub struct Completer<T, E> {
    /// Current [`Stage`] of this [`Completer`].
    stage: Mutex<Stage<T, E>>,

    /// Timeout used by [`Completer::wait`].
    default_timeout: Duration,
}

impl<T, E> Completer<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Creates a new pending [`Completer`] with the provided
    /// [`Completer::wait`] timeout.
    #[inline]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            stage: Mutex::new(Stage::Pending(Vec::new())),
            default_timeout,
        }
    }

    /// Returns the timeout used by [`Completer::wait`].
    #[inline]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Waits for the value using the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Completer::wait_for`].
    #[inline]
    pub async fn wait(&self) -> Result<T, WaitError<E>> {
        self.wait_for(self.default_timeout).await
    }

    /// Waits for the value at most `timeout`.
    ///
    /// Returns the cached value immediately if this [`Completer`] is already
    /// resolved.
    ///
    /// # Errors
    ///
    /// - [`WaitError::Timeout`] if the deadline passes first (a zero
    ///   `timeout` fails immediately on a pending [`Completer`]);
    /// - [`WaitError::Failed`] if the producer has failed.
    pub async fn wait_for(&self, timeout: Duration) -> Result<T, WaitError<E>> {
        let rx = {
            let mut stage = self.lock();
            match &mut *stage {
                Stage::Resolved(value) => return Ok(value.clone()),
                Stage::Failed(err) => {
                    return Err(WaitError::Failed(err.clone()))
                }
                Stage::Pending(waiters) => {
                    if timeout == Duration::from_secs(0) {
                        return Err(WaitError::Timeout(timeout));
                    }
                    waiters.retain(|tx| !tx.is_canceled());
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result.map_err(WaitError::Failed),
            // Pending waiters are only dropped after being sent to, and
            // `self` outlives this call.
            Ok(Err(oneshot::Canceled)) | Err(_) => {
                Err(WaitError::Timeout(timeout))
            }
        }
    }

    /// Resolves this [`Completer`] with the provided `value`, releasing all
    /// the pending waiters.
    ///
    /// Returns `false` (and drops the `value`) if this [`Completer`] is
    /// already resolved or failed.
    #[inline]
    pub fn resume(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Fails this [`Completer`] with the provided `err`, releasing all the
    /// pending waiters with [`WaitError::Failed`].
    ///
    /// Returns `false` if this [`Completer`] is already resolved or failed.
    #[inline]
    pub fn resume_with_error(&self, err: E) -> bool {
        self.complete(Err(err))
    }

    /// Returns this [`Completer`] to the pending stage, discarding any cached
    /// value or error.
    ///
    /// Already pending waiters stay pending.
    pub fn reset(&self) {
        let mut stage = self.lock();
        if !matches!(&*stage, Stage::Pending(_)) {
            *stage = Stage::Pending(Vec::new());
        }
    }

    /// Returns the cached value, if any, without suspending.
    pub fn value(&self) -> Option<T> {
        match &*self.lock() {
            Stage::Resolved(value) => Some(value.clone()),
            Stage::Pending(_) | Stage::Failed(_) => None,
        }
    }

    /// Indicates whether this [`Completer`] holds a value.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.lock(), Stage::Resolved(_))
    }

    /// Moves this [`Completer`] out of the pending stage with the provided
    /// `result`.
    fn complete(&self, result: Result<T, E>) -> bool {
        let waiters = {
            let mut stage = self.lock();
            let waiters = match &mut *stage {
                Stage::Pending(waiters) => mem::take(waiters),
                Stage::Resolved(_) | Stage::Failed(_) => return false,
            };
            *stage = match &result {
                Ok(value) => Stage::Resolved(value.clone()),
                Err(err) => Stage::Failed(err.clone()),
            };
            waiters
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        true
    }

    /// Locks the [`Stage`] of this [`Completer`].
    fn lock(&self) -> MutexGuard<'_, Stage<T, E>> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone, E: Clone> Default for Completer<T, E> {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT)
    }
}

impl<T, E> fmt::Debug for Completer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        let stage = match &*stage {
            Stage::Pending(w) => format!("Pending({} waiters)", w.len()),
            Stage::Resolved(_) => "Resolved".to_owned(),
            Stage::Failed(_) => "Failed".to_owned(),
        };
        f.debug_struct("Completer")
            .field("stage", &stage)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
