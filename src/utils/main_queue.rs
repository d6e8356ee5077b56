//! Single-threaded executor for UI-facing notifications.

use std::{fmt, io, thread};

use futures::{
    channel::{mpsc, oneshot},
    executor, StreamExt as _,
};
use log::{debug, warn};

/// Job executed on a [`MainQueue`].
type Job = Box<dyn FnOnce() + Send>;

/// Handle to a dedicated thread executing posted jobs one by one, in the
/// posting order.
///
/// Models the UI-affine execution context: observers notified from a
/// [`MainQueue`] never run concurrently with each other.
///
/// The thread stops once all the handles are dropped and the posted jobs are
/// drained.
#[derive(Clone)]
pub struct MainQueue(mpsc::UnboundedSender<Job>);

impl MainQueue {
    /// Spawns a new [`MainQueue`] thread.
    ///
    /// # Errors
    ///
    /// If the OS fails to spawn a thread.
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded::<Job>();
        drop(
            thread::Builder::new()
                .name("medea-sync-main".to_owned())
                .spawn(move || {
                    executor::block_on(rx.for_each(|job| async move { job() }));
                    debug!("MainQueue is stopped");
                })?,
        );
        Ok(Self(tx))
    }

    /// Posts the provided `job` to be executed after all the previously posted
    /// ones.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.0.unbounded_send(Box::new(job)).is_err() {
            warn!("MainQueue is stopped, posted job is dropped");
        }
    }

    /// Resolves once all the jobs posted before this call are executed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}

impl fmt::Debug for MainQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainQueue")
            .field("closed", &self.0.is_closed())
            .finish()
    }
}
