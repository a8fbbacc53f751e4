//! Sink: one attached writer
//!
//! A sink owns a bounded inbound queue and a dedicated write task draining
//! it into the writer. The read loop publishes with a non-blocking
//! [`Sink::offer`]; a full queue drops the packet so a slow sink can never
//! stall the reader or its siblings.
//!
//! Stopping closes the queue and then lets the write task drain it to
//! exhaustion, so packets already accepted are delivered to the writer
//! before the trailer. A select-on-cancel loop would race the queue and
//! lose them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::{BrokerError, Result};
use crate::media::{Packet, Stream};
use crate::pipeline::{SharedWriter, WriterRemover};
use crate::stats::SinkStats;

use super::config::BrokerConfig;

/// Outcome of a non-blocking packet offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OfferOutcome {
    /// Queued for delivery
    Accepted,
    /// Queue full; the packet was discarded
    Dropped,
    /// Queue closed; the sink is stopping or dead
    Closed,
}

/// Sink lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkState {
    /// Created; header not yet accepted
    Opening,
    /// Write task draining the queue
    Running,
    /// Terminal: writer released
    Dead,
}

/// Invoked at most once, when the sink dies on a terminal writer error, so
/// the owning source can evict it
pub(crate) type OnDead = Box<dyn FnOnce() + Send>;

pub(crate) struct Sink {
    id: String,
    source_id: String,
    writer: SharedWriter,
    writer_remover: Option<WriterRemover>,
    remover_timeout: Duration,
    error_tx: Option<mpsc::Sender<BrokerError>>,
    queue_tx: Mutex<Option<mpsc::Sender<Packet>>>,
    queue_rx: Mutex<Option<mpsc::Receiver<Packet>>>,
    write_task: Mutex<Option<JoinHandle<()>>>,
    on_dead: Mutex<Option<OnDead>>,
    last_error: Mutex<Option<BrokerError>>,
    header_written: AtomicBool,
    finalized: AtomicBool,
    closing: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Sink {
    pub(crate) fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        writer: SharedWriter,
        writer_remover: Option<WriterRemover>,
        error_tx: Option<mpsc::Sender<BrokerError>>,
        on_dead: Option<OnDead>,
        config: &BrokerConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        Arc::new(Self {
            id: id.into(),
            source_id: source_id.into(),
            writer,
            writer_remover,
            remover_timeout: config.remover_timeout,
            error_tx,
            queue_tx: Mutex::new(Some(tx)),
            queue_rx: Mutex::new(Some(rx)),
            write_task: Mutex::new(None),
            on_dead: Mutex::new(on_dead),
            last_error: Mutex::new(None),
            header_written: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Write the header and launch the write task.
    ///
    /// Fails if the writer rejects the header; the writer is released
    /// before returning.
    pub(crate) async fn start(self: &Arc<Self>, streams: &[Stream]) -> Result<()> {
        if self.closing.load(Ordering::SeqCst) {
            self.finalize().await;
            return Err(BrokerError::SourceClosing(self.source_id.clone()));
        }
        if let Err(err) = self.writer.write_header(streams).await {
            self.set_last_error(err.clone());
            self.finalize().await;
            return Err(err);
        }
        self.header_written.store(true, Ordering::SeqCst);

        let rx = self.queue_rx.lock().unwrap().take();
        debug_assert!(rx.is_some(), "sink started twice");
        let Some(rx) = rx else {
            return Ok(());
        };

        let sink = Arc::clone(self);
        let handle = tokio::spawn(async move { sink.write_loop(rx).await });
        *self.write_task.lock().unwrap() = Some(handle);
        tracing::debug!(source = %self.source_id, sink = %self.id, "sink started");
        Ok(())
    }

    /// Non-blocking publish into the sink's queue
    pub(crate) fn offer(&self, packet: Packet) -> OfferOutcome {
        if self.finalized.load(Ordering::SeqCst) {
            return OfferOutcome::Closed;
        }
        let guard = self.queue_tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return OfferOutcome::Closed;
        };
        match tx.try_send(packet) {
            Ok(()) => OfferOutcome::Accepted,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                OfferOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => OfferOutcome::Closed,
        }
    }

    /// Close the queue, wait for the write task to drain it and release the
    /// writer. Safe to call more than once; later calls return immediately.
    pub(crate) async fn stop(&self) {
        self.closing.store(true, Ordering::SeqCst);
        *self.queue_tx.lock().unwrap() = None;

        let task = self.write_task.lock().unwrap().take();
        match task {
            Some(handle) => {
                let _ = handle.await;
            }
            None => {
                // Never started: release the writer here.
                self.finalize().await;
            }
        }
    }

    /// Publish an error on the caller's error channel, if one was supplied.
    /// Non-blocking; dropped when the channel is full.
    pub(crate) fn publish_error(&self, err: BrokerError) {
        if let Some(tx) = &self.error_tx {
            let _ = tx.try_send(err);
        }
    }

    pub(crate) fn last_error(&self) -> Option<BrokerError> {
        self.last_error.lock().unwrap().clone()
    }

    pub(crate) fn state(&self) -> SinkState {
        if self.finalized.load(Ordering::SeqCst) {
            SinkState::Dead
        } else if self.header_written.load(Ordering::SeqCst) {
            SinkState::Running
        } else {
            SinkState::Opening
        }
    }

    pub(crate) fn stats(&self) -> SinkStats {
        SinkStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dead: self.state() == SinkState::Dead,
            last_error: self.last_error(),
        }
    }

    async fn write_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Packet>) {
        let mut terminal: Option<BrokerError> = None;

        while let Some(pkt) = rx.recv().await {
            if let Some(changed) = &pkt.new_codecs {
                if let Some(cc) = self.writer.as_codec_change() {
                    if let Err(err) = cc.write_codec_change(changed).await {
                        terminal = Some(err);
                        break;
                    }
                }
            }
            if pkt.is_codec_change_only() {
                continue;
            }
            match self.writer.write_packet(&pkt).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    terminal = Some(err);
                    break;
                }
            }
        }

        match terminal {
            Some(err) => {
                tracing::warn!(
                    source = %self.source_id,
                    sink = %self.id,
                    error = %err,
                    "sink writer failed"
                );
                self.set_last_error(err.clone());
                self.publish_error(err);
                self.finalize().await;
                let on_dead = self.on_dead.lock().unwrap().take();
                if let Some(on_dead) = on_dead {
                    on_dead();
                }
            }
            None => {
                self.finalize().await;
            }
        }
    }

    /// Trailer (if the header was accepted), close, remover. Runs at most
    /// once across the write task, a failed start and an unstarted stop.
    async fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.header_written.load(Ordering::SeqCst) {
            let _ = self.writer.write_trailer().await;
        }
        self.writer.close().await;
        if let Some(remover) = &self.writer_remover {
            let fut = (remover)(self.source_id.clone(), self.id.clone());
            match tokio::time::timeout(self.remover_timeout, fut).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(sink = %self.id, error = %err, "writer remover failed");
                }
                Err(_) => {
                    tracing::warn!(sink = %self.id, "writer remover timed out");
                }
            }
        }
        tracing::debug!(source = %self.source_id, sink = %self.id, "sink finalized");
    }

    fn set_last_error(&self, err: BrokerError) {
        let mut slot = self.last_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::media::CodecKind;
    use crate::pipeline::testing::{wait_until, RecordingWriter};
    use crate::pipeline::SharedWriter;

    use super::*;

    fn packet(frame_id: i64) -> Packet {
        let mut pkt = Packet::new(
            0,
            CodecKind::H264,
            Duration::from_millis(frame_id as u64 * 33),
            Bytes::from_static(b"x"),
        );
        pkt.frame_id = frame_id;
        pkt
    }

    fn streams() -> Vec<Stream> {
        vec![Stream::new(0, CodecKind::H264)]
    }

    fn sink_with(writer: Arc<RecordingWriter>, config: &BrokerConfig) -> Arc<Sink> {
        Sink::new("k1", "s1", writer as SharedWriter, None, None, None, config)
    }

    #[tokio::test]
    async fn test_drain_then_trailer_then_close() {
        let writer = RecordingWriter::new();
        let sink = sink_with(writer.clone(), &BrokerConfig::default());

        sink.start(&streams()).await.unwrap();
        assert_eq!(sink.state(), SinkState::Running);

        assert_eq!(sink.offer(packet(1)), OfferOutcome::Accepted);
        assert_eq!(sink.offer(packet(2)), OfferOutcome::Accepted);
        sink.stop().await;

        assert_eq!(writer.frame_ids(), vec![1, 2]);
        assert_eq!(writer.header_calls(), 1);
        assert_eq!(writer.trailer_calls(), 1);
        assert_eq!(writer.close_calls(), 1);
        assert_eq!(sink.state(), SinkState::Dead);
        assert_eq!(sink.stats().delivered, 2);
    }

    #[tokio::test]
    async fn test_offer_drops_when_full() {
        let writer = RecordingWriter::new();
        let config = BrokerConfig::default().queue_capacity(1);
        let sink = sink_with(writer.clone(), &config);

        // Not started: nothing drains the queue.
        assert_eq!(sink.offer(packet(1)), OfferOutcome::Accepted);
        assert_eq!(sink.offer(packet(2)), OfferOutcome::Dropped);
        assert_eq!(sink.offer(packet(3)), OfferOutcome::Dropped);
        assert_eq!(sink.stats().dropped, 2);

        sink.stop().await;
        // Never wrote a header, so no trailer; writer still released once.
        assert_eq!(writer.trailer_calls(), 0);
        assert_eq!(writer.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_offer_after_stop_is_closed() {
        let writer = RecordingWriter::new();
        let sink = sink_with(writer, &BrokerConfig::default());

        sink.start(&streams()).await.unwrap();
        sink.stop().await;

        assert_eq!(sink.offer(packet(1)), OfferOutcome::Closed);
    }

    #[tokio::test]
    async fn test_terminal_error_publishes_and_calls_on_dead() {
        let writer = RecordingWriter::failing_at(1);
        let (err_tx, mut err_rx) = mpsc::channel(4);
        let dead = Arc::new(AtomicBool::new(false));
        let dead_flag = dead.clone();
        let sink = Sink::new(
            "k1",
            "s1",
            writer.clone() as SharedWriter,
            None,
            Some(err_tx),
            Some(Box::new(move || dead_flag.store(true, Ordering::SeqCst))),
            &BrokerConfig::default(),
        );

        sink.start(&streams()).await.unwrap();
        sink.offer(packet(1));
        sink.offer(packet(2));

        let err = err_rx.recv().await.unwrap();
        assert!(matches!(err, BrokerError::Writer(_)));

        wait_until("on_dead callback", || {
            let dead = dead.clone();
            async move { dead.load(Ordering::SeqCst) }
        })
        .await;

        assert_eq!(sink.last_error(), Some(err));
        assert_eq!(sink.state(), SinkState::Dead);
        // First packet was delivered before the fault.
        assert_eq!(writer.frame_ids(), vec![1]);
        // Trailer and close still happen exactly once.
        wait_until("writer released", || {
            let writer = writer.clone();
            async move { writer.close_calls() == 1 }
        })
        .await;
        assert_eq!(writer.trailer_calls(), 1);
    }

    #[tokio::test]
    async fn test_header_failure_releases_writer_without_trailer() {
        let writer = RecordingWriter::failing_header();
        let removed = Arc::new(AtomicBool::new(false));
        let removed_flag = removed.clone();
        let remover = crate::pipeline::writer_remover(move |_, _| {
            let removed = removed_flag.clone();
            async move {
                removed.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        let sink = Sink::new(
            "k1",
            "s1",
            writer.clone() as SharedWriter,
            Some(remover),
            None,
            None,
            &BrokerConfig::default(),
        );

        let err = sink.start(&streams()).await.unwrap_err();
        assert!(matches!(err, BrokerError::Writer(_)));
        assert_eq!(writer.trailer_calls(), 0);
        assert_eq!(writer.close_calls(), 1);
        assert!(removed.load(Ordering::SeqCst));
        assert_eq!(sink.state(), SinkState::Dead);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let writer = RecordingWriter::new();
        let sink = sink_with(writer.clone(), &BrokerConfig::default());

        sink.start(&streams()).await.unwrap();
        sink.stop().await;
        sink.stop().await;

        assert_eq!(writer.trailer_calls(), 1);
        assert_eq!(writer.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_codec_change_only_packet_skips_write_packet() {
        let writer = RecordingWriter::codec_change_aware();
        let sink = sink_with(writer.clone(), &BrokerConfig::default());

        sink.start(&streams()).await.unwrap();
        sink.offer(Packet::codec_change(vec![Stream::new(0, CodecKind::H265)]));
        sink.stop().await;

        assert_eq!(writer.codec_changes().len(), 1);
        assert_eq!(writer.codec_changes()[0][0].codec, CodecKind::H265);
        assert!(writer.packets().is_empty());
    }

    #[tokio::test]
    async fn test_codec_change_ignored_without_capability() {
        let writer = RecordingWriter::new();
        let sink = sink_with(writer.clone(), &BrokerConfig::default());

        sink.start(&streams()).await.unwrap();
        sink.offer(Packet::codec_change(vec![Stream::new(0, CodecKind::H265)]));
        sink.offer(packet(1));
        sink.stop().await;

        assert!(writer.codec_changes().is_empty());
        assert_eq!(writer.frame_ids(), vec![1]);
    }
}
