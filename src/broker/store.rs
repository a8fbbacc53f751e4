//! Stream broker implementation
//!
//! The central registry that maps source ids to live sources and arbitrates
//! concurrent attach/detach against source teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{BrokerError, Result};
use crate::pipeline::{ReaderFactory, ReaderRemover, WriterFactory, WriterRemover};
use crate::stats::{BrokerStats, SinkStats, SourceStats};

use super::config::BrokerConfig;
use super::source::Source;

/// Source registry shared between the broker and the sources' teardown
/// epilogues
pub(crate) struct Registry {
    sources: RwLock<HashMap<String, Arc<Source>>>,
}

impl Registry {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sources: RwLock::new(HashMap::new()),
        })
    }

    async fn get(&self, source_id: &str) -> Option<Arc<Source>> {
        self.sources.read().await.get(source_id).cloned()
    }

    /// Identity-checked removal: delete the entry only if it still holds
    /// the given source instance. A stale teardown must never evict a
    /// replacement source registered under the same id.
    pub(crate) async fn remove_if_same(&self, source_id: &str, instance: u64) -> bool {
        let mut map = self.sources.write().await;
        match map.get(source_id) {
            Some(current) if current.instance() == instance => {
                map.remove(source_id);
                tracing::debug!(source = %source_id, instance, "source left registry");
                true
            }
            _ => false,
        }
    }
}

/// Fan-out broker: one lazily opened reader per source id, multiplexed to
/// any number of attached writers
///
/// The broker runs no task of its own; each source runs one read task and
/// each sink one write task. All public methods are safe to call from any
/// task.
pub struct StreamBroker {
    registry: Arc<Registry>,
    reader_factory: ReaderFactory,
    reader_remover: Option<ReaderRemover>,
    config: BrokerConfig,
    cancel: CancellationToken,
    closing: AtomicBool,
    next_instance: AtomicU64,
}

impl StreamBroker {
    /// Create a broker with default configuration
    pub fn new(reader_factory: ReaderFactory, reader_remover: Option<ReaderRemover>) -> Self {
        Self::with_config(reader_factory, reader_remover, BrokerConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(
        reader_factory: ReaderFactory,
        reader_remover: Option<ReaderRemover>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            registry: Registry::new(),
            reader_factory,
            reader_remover,
            config,
            cancel: CancellationToken::new(),
            closing: AtomicBool::new(false),
            next_instance: AtomicU64::new(0),
        }
    }

    /// Get the broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Attach a sink to a source, creating the source (and opening its
    /// reader) if this is the first sink for `source_id`.
    ///
    /// Terminal sink errors and upstream read errors are published on
    /// `error_tx` (non-blocking; the caller is responsible for consuming).
    /// An attach that races a source teardown is retried internally against
    /// a freshly created source.
    pub async fn attach(
        &self,
        source_id: &str,
        sink_id: &str,
        writer_factory: WriterFactory,
        writer_remover: Option<WriterRemover>,
        error_tx: Option<mpsc::Sender<BrokerError>>,
    ) -> Result<()> {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                return Err(BrokerError::Shutdown);
            }

            let (source, existed) = {
                let mut map = self.registry.sources.write().await;
                // Re-check under the registry guard so no source is created
                // after shutdown snapshots the registry.
                if self.closing.load(Ordering::SeqCst) {
                    return Err(BrokerError::Shutdown);
                }
                match map.get(source_id) {
                    Some(source) => (Arc::clone(source), true),
                    None => {
                        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
                        let source = Source::new(
                            source_id,
                            instance,
                            Arc::clone(&self.reader_factory),
                            self.reader_remover.clone(),
                            self.config.clone(),
                            Arc::downgrade(&self.registry),
                            &self.cancel,
                        );
                        map.insert(source_id.to_string(), Arc::clone(&source));
                        (source, false)
                    }
                }
            };

            match source
                .attach(
                    sink_id,
                    Arc::clone(&writer_factory),
                    writer_remover.clone(),
                    error_tx.clone(),
                )
                .await
            {
                Ok(()) => return Ok(()),
                Err(BrokerError::SourceClosing(_)) => {
                    // Raced a teardown; evict the stale entry (identity
                    // checked) and retry with a fresh source.
                    self.registry.remove_if_same(source_id, source.instance()).await;
                    continue;
                }
                Err(err) => {
                    if !existed {
                        self.registry.remove_if_same(source_id, source.instance()).await;
                        source.close().await;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Detach a sink; the source is torn down when its last sink leaves.
    ///
    /// Waits until packets already queued for the sink have been delivered
    /// and its writer is released.
    pub async fn detach(&self, source_id: &str, sink_id: &str) -> Result<()> {
        let source = self
            .registry
            .get(source_id)
            .await
            .ok_or_else(|| BrokerError::SourceNotFound(source_id.to_string()))?;
        source.detach(sink_id).await
    }

    /// Pause a source's reader; no-op if the reader lacks the capability
    pub async fn pause_source(&self, source_id: &str) -> Result<()> {
        let source = self.lookup(source_id).await?;
        source.pause().await.map_err(|err| self.control_err(source_id, err))
    }

    /// Resume a source's reader; no-op if the reader lacks the capability
    pub async fn resume_source(&self, source_id: &str) -> Result<()> {
        let source = self.lookup(source_id).await?;
        source.resume().await.map_err(|err| self.control_err(source_id, err))
    }

    /// Seek a source's shared reader; every attached sink is affected.
    ///
    /// Returns the position actually landed on, or `None` when the reader
    /// cannot seek.
    pub async fn seek_source(&self, source_id: &str, pos: Duration) -> Result<Option<Duration>> {
        let source = self.lookup(source_id).await?;
        source.seek(pos).await.map_err(|err| self.control_err(source_id, err))
    }

    /// Number of sources currently in the registry
    pub async fn active_source_count(&self) -> usize {
        self.registry.sources.read().await.len()
    }

    /// Broker-wide statistics snapshot
    pub async fn stats(&self) -> BrokerStats {
        let sources: Vec<Arc<Source>> =
            self.registry.sources.read().await.values().cloned().collect();
        let mut attached_sinks = 0;
        for source in &sources {
            attached_sinks += source.sink_count().await;
        }
        BrokerStats {
            active_sources: sources.len(),
            attached_sinks,
        }
    }

    /// Statistics for one source, if present
    pub async fn source_stats(&self, source_id: &str) -> Option<SourceStats> {
        let source = self.registry.get(source_id).await?;
        Some(source.stats().await)
    }

    /// Statistics for one sink, if present
    pub async fn sink_stats(&self, source_id: &str, sink_id: &str) -> Option<SinkStats> {
        let source = self.registry.get(source_id).await?;
        source.sink_stats(sink_id).await
    }

    /// Begin shutdown: reject new attaches and cancel every source.
    ///
    /// Returns whether this call initiated the shutdown.
    pub fn signal_shutdown(&self) -> bool {
        if self.closing.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!("broker shutting down");
        self.cancel.cancel();
        true
    }

    /// Wait until every source has fully torn down
    pub async fn wait_shutdown(&self) {
        let sources: Vec<Arc<Source>> =
            self.registry.sources.read().await.values().cloned().collect();
        for source in sources {
            source.close().await;
        }
    }

    /// Signal shutdown and wait for it to complete. Calling again after the
    /// first completion is a no-op.
    pub async fn shutdown(&self) {
        self.signal_shutdown();
        self.wait_shutdown().await;
    }

    async fn lookup(&self, source_id: &str) -> Result<Arc<Source>> {
        self.registry
            .get(source_id)
            .await
            .ok_or_else(|| BrokerError::SourceNotFound(source_id.to_string()))
    }

    /// A control call that raced a teardown sees the source as already gone
    fn control_err(&self, source_id: &str, err: BrokerError) -> BrokerError {
        match err {
            BrokerError::SourceClosing(_) => BrokerError::SourceNotFound(source_id.to_string()),
            other => other,
        }
    }
}
