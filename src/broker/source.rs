//! Source: one attached reader and its fan-out
//!
//! A source is created lazily by the broker when the first sink for its id
//! attaches, and torn down eagerly when the last sink detaches. The read
//! task owns the whole teardown epilogue (stop sinks, close reader, leave
//! the registry, run the remover), so every exit path (last detach, EOF,
//! reader fault, broker shutdown) converges on one sequence.
//!
//! Once `closing` is set the source accepts no new sinks; an attach that
//! races the teardown gets [`BrokerError::SourceClosing`] and the broker
//! retries against a freshly created source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{BrokerError, Result};
use crate::media::{apply_codec_change, Stream};
use crate::pipeline::{ReaderFactory, ReaderRemover, SharedReader, WriterFactory, WriterRemover};
use crate::stats::{SinkStats, SourceStats};

use super::config::BrokerConfig;
use super::sink::{OfferOutcome, Sink};
use super::store::Registry;

/// Source lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePhase {
    /// No reader, no sinks
    Idle,
    /// First sink attaching; reader factory running
    Opening,
    /// Reader draining into sinks
    Running,
    /// Last sink left; read task winding down
    Draining,
    /// Gone from the registry; reader closed
    Removed,
}

struct SourceState {
    phase: SourcePhase,
    /// Set on the way out; gates new attaches
    closing: bool,
    /// Latest codec layout; replaced before a codec-change packet fans out
    streams: Vec<Stream>,
    sinks: HashMap<String, Arc<Sink>>,
    reader: Option<SharedReader>,
}

pub(crate) struct Source {
    id: String,
    /// Registry identity: a stale teardown must never evict a replacement
    /// source registered under the same id
    instance: u64,
    reader_factory: ReaderFactory,
    reader_remover: Option<ReaderRemover>,
    config: BrokerConfig,
    registry: Weak<Registry>,
    state: RwLock<SourceState>,
    cancel: CancellationToken,
    /// Latch cancelled once teardown has fully completed
    done: CancellationToken,
    read_task: Mutex<Option<JoinHandle<()>>>,
    already_closing: AtomicBool,
    packets_read: AtomicU64,
}

impl Source {
    pub(crate) fn new(
        id: impl Into<String>,
        instance: u64,
        reader_factory: ReaderFactory,
        reader_remover: Option<ReaderRemover>,
        config: BrokerConfig,
        registry: Weak<Registry>,
        parent_cancel: &CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            instance,
            reader_factory,
            reader_remover,
            config,
            registry,
            state: RwLock::new(SourceState {
                phase: SourcePhase::Idle,
                closing: false,
                streams: Vec::new(),
                sinks: HashMap::new(),
                reader: None,
            }),
            cancel: parent_cancel.child_token(),
            done: CancellationToken::new(),
            read_task: Mutex::new(None),
            already_closing: AtomicBool::new(false),
            packets_read: AtomicU64::new(0),
        })
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    pub(crate) async fn sink_count(&self) -> usize {
        self.state.read().await.sinks.len()
    }

    pub(crate) async fn stats(&self) -> SourceStats {
        let st = self.state.read().await;
        SourceStats {
            phase: st.phase,
            sink_count: st.sinks.len(),
            packets_read: self.packets_read.load(Ordering::Relaxed),
        }
    }

    pub(crate) async fn sink_stats(&self, sink_id: &str) -> Option<SinkStats> {
        let st = self.state.read().await;
        st.sinks.get(sink_id).map(|s| s.stats())
    }

    /// Attach a sink, lazily opening the reader on the first one.
    ///
    /// Returns [`BrokerError::SourceClosing`] if this source is tearing
    /// down; the broker retries with a fresh source.
    ///
    /// The reader and writer factories run under this source's write guard
    /// (the broker holds no lock of its own here); concurrent attaches for
    /// the same id queue on the guard and find the reader already open.
    pub(crate) async fn attach(
        self: &Arc<Self>,
        sink_id: &str,
        writer_factory: WriterFactory,
        writer_remover: Option<WriterRemover>,
        error_tx: Option<mpsc::Sender<BrokerError>>,
    ) -> Result<()> {
        let sink;
        let streams;
        {
            let mut st = self.state.write().await;
            if st.closing {
                return Err(BrokerError::SourceClosing(self.id.clone()));
            }
            if st.sinks.contains_key(sink_id) {
                return Err(BrokerError::SinkAlreadyExists(sink_id.to_string()));
            }

            let opened = st.reader.is_none();
            if opened {
                st.phase = SourcePhase::Opening;
                tracing::debug!(source = %self.id, "opening reader");
                let reader = match (self.reader_factory)(self.id.clone()).await {
                    Ok(reader) => reader,
                    Err(err) => {
                        st.closing = true;
                        return Err(BrokerError::ReaderFactory {
                            source_id: self.id.clone(),
                            detail: err.to_string(),
                        });
                    }
                };
                match reader.streams().await {
                    Ok(initial) => st.streams = initial,
                    Err(err) => {
                        st.closing = true;
                        reader.close().await;
                        self.run_reader_remover().await;
                        return Err(err);
                    }
                }
                st.reader = Some(reader);
            }

            let writer = match (writer_factory)(self.id.clone(), sink_id.to_string()).await {
                Ok(writer) => writer,
                Err(err) => {
                    if opened {
                        st.closing = true;
                        if let Some(reader) = st.reader.take() {
                            reader.close().await;
                        }
                        self.run_reader_remover().await;
                    }
                    return Err(BrokerError::WriterFactory {
                        sink_id: sink_id.to_string(),
                        detail: err.to_string(),
                    });
                }
            };

            let on_dead = {
                let source = Arc::downgrade(self);
                let sink_id = sink_id.to_string();
                Box::new(move || {
                    if let Some(source) = source.upgrade() {
                        tokio::spawn(async move {
                            let _ = source.detach(&sink_id).await;
                        });
                    }
                }) as super::sink::OnDead
            };
            sink = Sink::new(
                sink_id,
                self.id.clone(),
                writer,
                writer_remover,
                error_tx,
                Some(on_dead),
                &self.config,
            );
            st.sinks.insert(sink_id.to_string(), Arc::clone(&sink));

            if opened {
                st.phase = SourcePhase::Running;
                let reader = st.reader.clone().expect("reader just stored");
                let source = Arc::clone(self);
                let handle = tokio::spawn(async move { source.read_loop(reader).await });
                *self.read_task.lock().unwrap() = Some(handle);
            }
            streams = st.streams.clone();
        }

        if let Err(err) = sink.start(&streams).await {
            // The failed sink released its writer already; evict it, which
            // also tears the source down if it was the only one.
            let _ = self.detach(sink_id).await;
            return Err(err);
        }
        tracing::info!(source = %self.id, sink = %sink_id, "sink attached");
        Ok(())
    }

    /// Detach a sink; tears the source down when it was the last one
    pub(crate) async fn detach(self: &Arc<Self>, sink_id: &str) -> Result<()> {
        let (sink, last) = {
            let mut st = self.state.write().await;
            let Some(sink) = st.sinks.remove(sink_id) else {
                return Err(BrokerError::SinkNotFound(sink_id.to_string()));
            };
            let last = st.sinks.is_empty();
            if last {
                st.closing = true;
                st.phase = SourcePhase::Draining;
            }
            (sink, last)
        };

        sink.stop().await;
        tracing::info!(source = %self.id, sink = %sink_id, last, "sink detached");

        if last {
            self.close().await;
        }
        Ok(())
    }

    /// Cancel the read task and wait until teardown has fully completed.
    /// Every caller waits, however many times this is invoked.
    pub(crate) async fn close(self: &Arc<Self>) {
        if !self.already_closing.swap(true, Ordering::SeqCst) {
            {
                let mut st = self.state.write().await;
                st.closing = true;
            }
            self.cancel.cancel();

            let task = self.read_task.lock().unwrap().take();
            match task {
                Some(handle) => {
                    // The read task runs the teardown epilogue and trips
                    // `done` when finished.
                    let _ = handle.await;
                }
                None => {
                    // Reader never opened; nothing to drain.
                    self.state.write().await.phase = SourcePhase::Removed;
                    self.done.cancel();
                }
            }
        }
        self.done.cancelled().await;
    }

    /// Forward pause to the reader's capability; no-op without one
    pub(crate) async fn pause(&self) -> Result<()> {
        let reader = self.reader_for_control().await?;
        match reader.as_pausable() {
            Some(pausable) => pausable.pause().await,
            None => Ok(()),
        }
    }

    /// Forward resume to the reader's capability; no-op without one
    pub(crate) async fn resume(&self) -> Result<()> {
        let reader = self.reader_for_control().await?;
        match reader.as_pausable() {
            Some(pausable) => pausable.resume().await,
            None => Ok(()),
        }
    }

    /// Forward a seek to the reader's capability.
    ///
    /// Returns `Ok(None)` when the reader cannot seek. The reader is shared
    /// by every attached sink, so a seek moves all of them.
    pub(crate) async fn seek(&self, pos: Duration) -> Result<Option<Duration>> {
        let reader = self.reader_for_control().await?;
        match reader.as_seekable() {
            Some(seekable) => seekable.seek_to(pos).await.map(Some),
            None => Ok(None),
        }
    }

    async fn reader_for_control(&self) -> Result<SharedReader> {
        let st = self.state.read().await;
        if st.closing {
            return Err(BrokerError::SourceClosing(self.id.clone()));
        }
        st.reader
            .clone()
            .ok_or_else(|| BrokerError::SourceClosing(self.id.clone()))
    }

    /// Drain the reader into every registered sink, then run the teardown
    /// epilogue
    async fn read_loop(self: Arc<Self>, reader: SharedReader) {
        let upstream_err = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break None,
                res = reader.read_packet() => match res {
                    Ok(pkt) => {
                        self.packets_read.fetch_add(1, Ordering::Relaxed);

                        // Replace the cached layout before fan-out so a sink
                        // attaching concurrently already sees the new list.
                        if let Some(changed) = &pkt.new_codecs {
                            let mut st = self.state.write().await;
                            apply_codec_change(&mut st.streams, changed);
                            tracing::info!(source = %self.id, streams = changed.len(), "codec change");
                        }

                        let sinks: Vec<Arc<Sink>> = {
                            let st = self.state.read().await;
                            st.sinks.values().cloned().collect()
                        };
                        for sink in sinks {
                            if sink.offer(pkt.clone()) == OfferOutcome::Dropped {
                                tracing::debug!(
                                    source = %self.id,
                                    sink = %sink.id(),
                                    packet = %pkt,
                                    "queue full, packet dropped"
                                );
                            }
                        }
                    }
                    Err(err) => break Some(err),
                },
            }
        };

        if let Some(err) = &upstream_err {
            tracing::info!(source = %self.id, error = %err, "upstream ended");
            let sinks: Vec<Arc<Sink>> = {
                let st = self.state.read().await;
                st.sinks.values().cloned().collect()
            };
            for sink in sinks {
                sink.publish_error(err.clone());
            }
        }

        self.teardown(reader).await;
    }

    /// The single teardown sequence: stop sinks (draining their queues),
    /// close the reader, leave the registry, run the remover detached from
    /// any caller's cancellation.
    async fn teardown(&self, reader: SharedReader) {
        let sinks: Vec<Arc<Sink>> = {
            let mut st = self.state.write().await;
            st.closing = true;
            st.phase = SourcePhase::Draining;
            st.reader = None;
            st.sinks.drain().map(|(_, sink)| sink).collect()
        };

        for sink in sinks {
            sink.stop().await;
        }

        reader.close().await;

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_same(&self.id, self.instance).await;
        }

        self.run_reader_remover().await;

        self.state.write().await.phase = SourcePhase::Removed;
        tracing::info!(source = %self.id, "source removed");
        self.done.cancel();
    }

    /// Invoke the external reader remover on a detached timeout
    async fn run_reader_remover(&self) {
        if let Some(remover) = &self.reader_remover {
            let fut = (remover)(self.id.clone());
            match tokio::time::timeout(self.config.remover_timeout, fut).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(source = %self.id, error = %err, "reader remover failed");
                }
                Err(_) => {
                    tracing::warn!(source = %self.id, "reader remover timed out");
                }
            }
        }
    }
}
