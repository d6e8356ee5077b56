//! Cache of discovered media devices.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use derive_more::Display;
use futures::stream::{BoxStream, StreamExt as _};
use log::{debug, warn};
use medea_reactive::{Completer, ObservableCell, WaitError};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracerr::Traced;

use crate::conf;

/// Kind of a media device.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDeviceKind {
    /// Microphone.
    AudioInput,

    /// Camera.
    VideoInput,

    /// Speakers or headphones.
    AudioOutput,
}

/// Information about a media device.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct InputDeviceInfo {
    /// Unique identifier of the device.
    pub device_id: String,

    /// Kind of the device.
    pub kind: MediaDeviceKind,

    /// Human readable label of the device.
    pub label: String,
}

/// Error of discovering media devices.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum DevicesError {
    /// [`DevicesProvider`] has failed.
    #[display(fmt = "Failed to enumerate devices: {}", _0)]
    EnumerateFailed(String),

    /// No devices list was discovered in time.
    #[display(fmt = "Devices weren't discovered in {:?}", _0)]
    Timeout(Duration),
}

impl From<WaitError<DevicesError>> for DevicesError {
    fn from(err: WaitError<DevicesError>) -> Self {
        match err {
            WaitError::Timeout(timeout) => Self::Timeout(timeout),
            WaitError::Failed(err) => err,
        }
    }
}

/// OS-level enumerator of media devices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DevicesProvider: Send + Sync {
    /// Enumerates all the available media devices.
    async fn enumerate_devices(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, DevicesError>;
}

/// Cache of the media devices list.
///
/// Discovery is started once in background by [`MediaDevices::start`], while
/// any number of callers await its first result with
/// [`MediaDevices::devices`]. Further changes are pushed into the cache with
/// [`MediaDevices::on_devices_changed`].
pub struct MediaDevices {
    /// Enumerator of the devices.
    provider: Arc<dyn DevicesProvider>,

    /// The latest discovered devices list.
    cache: Completer<Vec<InputDeviceInfo>, DevicesError>,

    /// Rebroadcast of the discovered devices lists.
    changes: ObservableCell<Vec<InputDeviceInfo>>,

    /// Indicator whether the discovery has been started.
    started: AtomicBool,
}

impl MediaDevices {
    /// Creates a new [`MediaDevices`] cache, without starting the discovery.
    pub fn new(
        provider: Arc<dyn DevicesProvider>,
        conf: &conf::Devices,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            cache: Completer::new(conf.wait_timeout),
            changes: ObservableCell::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Starts the background discovery of devices on the current [Tokio]
    /// runtime.
    ///
    /// Returns [`None`] if the discovery has been started already.
    ///
    /// # Panics
    ///
    /// If called outside of a [Tokio] runtime.
    ///
    /// [Tokio]: https://docs.rs/tokio
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return None;
        }
        let this = Arc::downgrade(self);
        let provider = Arc::clone(&self.provider);
        Some(tokio::spawn(async move {
            let result = provider.enumerate_devices().await;
            let this = match this.upgrade() {
                Some(this) => this,
                None => return,
            };
            match result {
                Ok(devices) => {
                    debug!("Discovered {} media devices", devices.len());
                    if this.cache.resume(devices.clone()) {
                        this.changes.set(devices);
                    }
                }
                Err(e) => {
                    warn!("Media devices discovery failed: {}", e);
                    let _ = this.cache.resume_with_error(e);
                }
            }
        }))
    }

    /// Returns the discovered devices of the provided `kinds` (all the
    /// devices if `kinds` is empty), waiting for the discovery to complete.
    ///
    /// # Errors
    ///
    /// - [`DevicesError::Timeout`] if no devices list was discovered in the
    ///   configured time;
    /// - [`DevicesError::EnumerateFailed`] if the discovery has failed.
    pub async fn devices(
        &self,
        kinds: &[MediaDeviceKind],
    ) -> Result<Vec<InputDeviceInfo>, Traced<DevicesError>> {
        let devices = self
            .cache
            .wait()
            .await
            .map_err(|e| tracerr::new!(DevicesError::from(e)))?;
        Ok(filter(devices, kinds))
    }

    /// Returns the cached devices of the provided `kinds` (all the devices if
    /// `kinds` is empty) without waiting. Empty if nothing is discovered yet.
    pub fn devices_cached(
        &self,
        kinds: &[MediaDeviceKind],
    ) -> Vec<InputDeviceInfo> {
        filter(self.cache.value().unwrap_or_default(), kinds)
    }

    /// Folds the pushed `devices` list into the cache, releasing all the
    /// callers of [`MediaDevices::devices`] and notifying subscribers of
    /// [`MediaDevices::on_device_change`].
    pub fn on_devices_changed(&self, devices: Vec<InputDeviceInfo>) {
        debug!("Media devices list changed: {} devices", devices.len());
        self.cache.reset();
        let _ = self.cache.resume(devices.clone());
        self.changes.set(devices);
    }

    /// Returns a [`Stream`] of the devices lists discovered after this call.
    ///
    /// [`Stream`]: futures::Stream
    pub fn on_device_change(
        &self,
    ) -> BoxStream<'static, Vec<InputDeviceInfo>> {
        Box::pin(self.changes.subscribe().skip(1))
    }
}

impl fmt::Debug for MediaDevices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaDevices")
            .field("cache", &self.cache)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

/// Retains only the `devices` of the provided `kinds`.
fn filter(
    devices: Vec<InputDeviceInfo>,
    kinds: &[MediaDeviceKind],
) -> Vec<InputDeviceInfo> {
    if kinds.is_empty() {
        return devices;
    }
    devices
        .into_iter()
        .filter(|d| kinds.contains(&d.kind))
        .collect()
}
