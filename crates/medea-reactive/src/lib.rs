//! Thread-safe containers used to synchronize state between concurrent tasks.
//!
//! - [`StateSync`] holds an immutable snapshot guarded by a single lock and
//!   fires a post-mutation hook outside of that lock;
//! - [`Completer`] lets many tasks await a value produced once by some
//!   background process, each with its own timeout;
//! - [`ObservableCell`] emits every real change of its value to subscribers.
//!
//! # Awaiting a lazily produced value
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//!
//! use medea_reactive::Completer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let devices = Arc::new(Completer::<Vec<&str>, ()>::new(
//!     Duration::from_secs(10),
//! ));
//!
//! let producer = Arc::clone(&devices);
//! tokio::spawn(async move { producer.resume(vec!["camera"]) });
//!
//! assert_eq!(devices.wait().await, Ok(vec!["camera"]));
//! # }
//! ```

#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

mod cell;
mod completer;
mod state_sync;

#[doc(inline)]
pub use self::{
    cell::{DroppedError, ObservableCell},
    completer::{Completer, WaitError, DEFAULT_WAIT_TIMEOUT},
    state_sync::{OnDidMutate, StateSync},
};
