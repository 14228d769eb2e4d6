//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{PropagationConfig, ShedConfig};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ShedConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ShedConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload config. Keeping current configuration."
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded configurations to the live propagation settings.
///
/// Only the propagation section is hot-reloadable; listener, upstream and
/// database changes need a restart and are logged as ignored. Each update is
/// compared against the previous one. Returns the last configuration seen
/// once the channel closes.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<ShedConfig>,
    mut current: ShedConfig,
    propagation: Arc<ArcSwap<PropagationConfig>>,
) -> ShedConfig {
    while let Some(next) = updates.recv().await {
        if needs_restart(&current, &next) {
            tracing::warn!("Only [propagation] is reloaded at runtime; other changes need a restart");
        }
        tracing::info!(
            default_timeout_ms = ?next.propagation.default_timeout_ms,
            queue_delta = ?next.propagation.queue_delta,
            shed_status = next.propagation.shed_status,
            "Propagation settings reloaded"
        );
        propagation.store(Arc::new(next.propagation.clone()));
        current = next;
    }
    current
}

fn needs_restart(current: &ShedConfig, next: &ShedConfig) -> bool {
    next.listener != current.listener
        || next.upstream != current.upstream
        || next.database != current.database
}
