use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::BroadcastChannel;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::protocol::{BridgeMessage, ReadyEvent};
use crate::readiness::{ReadinessCell, spawn_ready_listener};
use crate::shim::PageShim;

/// Decides whether the host can take the bridge right now. For a browser page
/// this is "head or body exist"; other hosts may always be ready.
pub trait MountPoint: Send + Sync {
    fn mount(&self) -> Result<(), BridgeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysMounted;

impl MountPoint for AlwaysMounted {
    fn mount(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

/// The page's global scope: the shared channel, the readiness marker and the
/// installed shim, if any.
pub struct Host {
    channel: BroadcastChannel,
    readiness: ReadinessCell,
    config: BridgeConfig,
    mount: Box<dyn MountPoint>,
    installed: Mutex<Installed>,
}

#[derive(Default)]
struct Installed {
    shim: Option<Arc<PageShim>>,
    ready_listener: Option<JoinHandle<()>>,
}

impl Host {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_mount_point(config, AlwaysMounted)
    }

    pub fn with_mount_point(config: BridgeConfig, mount: impl MountPoint + 'static) -> Self {
        Self {
            channel: BroadcastChannel::new(),
            readiness: ReadinessCell::new(),
            config,
            mount: Box::new(mount),
            installed: Mutex::new(Installed::default()),
        }
    }

    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    pub fn readiness(&self) -> &ReadinessCell {
        &self.readiness
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The synchronous installed flag page code can check.
    pub fn is_installed(&self) -> bool {
        self.installed().shim.is_some()
    }

    pub fn shim(&self) -> Option<Arc<PageShim>> {
        self.installed().shim.clone()
    }

    /// The page-facing capability: fails fast if the bridge is not installed.
    pub async fn sign_structured_data(&self, payload: Value) -> Result<String, BridgeError> {
        let shim = self
            .shim()
            .ok_or_else(|| BridgeError::Injection("bridge is not installed".to_string()))?;
        shim.sign_structured_data(payload).await
    }

    /// One injection attempt. Safe to repeat: the marker, the shim and the
    /// ready listener are each created at most once, so a repeated attempt
    /// only re-announces readiness.
    ///
    /// Must be called inside a tokio runtime.
    pub fn inject(&self) -> Result<(), BridgeError> {
        self.mount.mount()?;

        if self.readiness.mark_pending(&self.config.version) {
            debug!(version = %self.config.version, "Readiness marker created");
        }

        {
            let mut installed = self.installed();
            if installed.shim.is_none() {
                installed.shim = Some(Arc::new(PageShim::install(
                    self.channel.clone(),
                    self.config.clone(),
                )));
                debug!("Page shim installed");
            }
            if installed.ready_listener.is_none() {
                installed.ready_listener =
                    Some(spawn_ready_listener(&self.channel, self.readiness.clone()));
            }
        }

        self.channel.post_message(&BridgeMessage::Ready(ReadyEvent {
            version: self.config.version.clone(),
        }))?;
        Ok(())
    }

    fn installed(&self) -> MutexGuard<'_, Installed> {
        self.installed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Some(listener) = self.installed().ready_listener.take() {
            listener.abort();
        }
    }
}

/// Inject eagerly, then once more when `load_complete` resolves.
///
/// A failed attempt is logged and never stops the next one. Returns whether
/// the bridge ended up installed.
pub async fn inject_on_load<F>(host: &Host, load_complete: F) -> bool
where
    F: Future<Output = ()>,
{
    if let Err(e) = host.inject() {
        warn!(attempt = "eager", error = %e, "Bridge injection failed");
    }

    load_complete.await;

    if let Err(e) = host.inject() {
        warn!(attempt = "load", error = %e, "Bridge injection failed");
    }

    host.is_installed()
}
