//! Test doubles for the reader and writer contracts
//!
//! `ScriptedReader` is fed packets/errors through a handle so tests control
//! pacing exactly; with the handle alive and the script drained, reads block
//! (an endless live stream). `RecordingWriter` records every call and can be
//! configured to fail, sleep, or accept codec changes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{BrokerError, Result};
use crate::media::{Packet, Stream};

use super::factory::{self, ReaderFactory, SharedReader, SharedWriter, WriterFactory};
use super::reader::{PacketReader, Pausable, Seekable};
use super::writer::{CodecChangeWriter, PacketWriter};

/// Feeds a [`ScriptedReader`]. Dropping the handle ends the stream: the
/// next read past the scripted items returns `EndOfStream`.
pub struct ScriptHandle {
    tx: mpsc::UnboundedSender<Result<Packet>>,
}

impl ScriptHandle {
    pub fn push(&self, pkt: Packet) {
        let _ = self.tx.send(Ok(pkt));
    }

    pub fn push_all(&self, pkts: impl IntoIterator<Item = Packet>) {
        for pkt in pkts {
            self.push(pkt);
        }
    }

    pub fn fail(&self, err: BrokerError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Reader driven by a [`ScriptHandle`]
pub struct ScriptedReader {
    streams: Vec<Stream>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Packet>>>,
    closed: AtomicBool,
    paused: AtomicBool,
    pausable: bool,
    seekable: bool,
}

impl ScriptedReader {
    pub fn new(streams: Vec<Stream>) -> (Arc<Self>, ScriptHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = Arc::new(Self {
            streams,
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            pausable: false,
            seekable: false,
        });
        (reader, ScriptHandle { tx })
    }

    /// Reader advertising the pause and seek capabilities
    pub fn with_capabilities(streams: Vec<Stream>) -> (Arc<Self>, ScriptHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = Arc::new(Self {
            streams,
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            pausable: true,
            seekable: true,
        });
        (reader, ScriptHandle { tx })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacketReader for ScriptedReader {
    async fn streams(&self) -> Result<Vec<Stream>> {
        Ok(self.streams.clone())
    }

    async fn read_packet(&self) -> Result<Packet> {
        match self.rx.lock().await.recv().await {
            Some(res) => res,
            None => Err(BrokerError::EndOfStream),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn as_pausable(&self) -> Option<&dyn Pausable> {
        self.pausable.then_some(self as &dyn Pausable)
    }

    fn as_seekable(&self) -> Option<&dyn Seekable> {
        self.seekable.then_some(self as &dyn Seekable)
    }
}

#[async_trait]
impl Pausable for ScriptedReader {
    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Seekable for ScriptedReader {
    async fn seek_to(&self, pos: Duration) -> Result<Duration> {
        Ok(pos)
    }
}

/// Writer that records every call
#[derive(Default)]
pub struct RecordingWriter {
    header: Mutex<Option<Vec<Stream>>>,
    header_calls: AtomicUsize,
    packets: Mutex<Vec<Packet>>,
    codec_changes: Mutex<Vec<Vec<Stream>>>,
    trailer_calls: AtomicUsize,
    close_calls: AtomicUsize,
    fail_header: bool,
    fail_at_packet: Option<usize>,
    write_delay: Option<Duration>,
    handles_codec_change: bool,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writer implementing the codec-change capability
    pub fn codec_change_aware() -> Arc<Self> {
        Arc::new(Self {
            handles_codec_change: true,
            ..Self::default()
        })
    }

    /// Writer whose `write_header` fails
    pub fn failing_header() -> Arc<Self> {
        Arc::new(Self {
            fail_header: true,
            ..Self::default()
        })
    }

    /// Writer whose n-th `write_packet` (0-based) fails
    pub fn failing_at(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_at_packet: Some(n),
            ..Self::default()
        })
    }

    /// Writer that sleeps before accepting each packet
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn header(&self) -> Option<Vec<Stream>> {
        self.header.lock().unwrap().clone()
    }

    pub fn header_calls(&self) -> usize {
        self.header_calls.load(Ordering::SeqCst)
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    pub fn frame_ids(&self) -> Vec<i64> {
        self.packets.lock().unwrap().iter().map(|p| p.frame_id).collect()
    }

    pub fn codec_changes(&self) -> Vec<Vec<Stream>> {
        self.codec_changes.lock().unwrap().clone()
    }

    pub fn trailer_calls(&self) -> usize {
        self.trailer_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacketWriter for RecordingWriter {
    async fn write_header(&self, streams: &[Stream]) -> Result<()> {
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_header {
            return Err(BrokerError::writer("header rejected"));
        }
        *self.header.lock().unwrap() = Some(streams.to_vec());
        Ok(())
    }

    async fn write_packet(&self, packet: &Packet) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut packets = self.packets.lock().unwrap();
        if self.fail_at_packet == Some(packets.len()) {
            return Err(BrokerError::writer("write failed"));
        }
        packets.push(packet.clone());
        Ok(())
    }

    async fn write_trailer(&self) -> Result<()> {
        self.trailer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn as_codec_change(&self) -> Option<&dyn CodecChangeWriter> {
        self.handles_codec_change.then_some(self as &dyn CodecChangeWriter)
    }
}

#[async_trait]
impl CodecChangeWriter for RecordingWriter {
    async fn write_codec_change(&self, changed: &[Stream]) -> Result<()> {
        self.codec_changes.lock().unwrap().push(changed.to_vec());
        Ok(())
    }
}

/// Factory that always hands out the given reader
pub fn reader_factory_of(reader: Arc<ScriptedReader>) -> ReaderFactory {
    factory::reader_factory(move |_| {
        let reader = reader.clone() as SharedReader;
        async move { Ok(reader) }
    })
}

/// Factory that hands out the given readers in order and fails once they
/// run out; used for reopen tests
pub fn reader_factory_seq(readers: Vec<Arc<ScriptedReader>>) -> ReaderFactory {
    let remaining = Mutex::new(readers.into_iter().collect::<std::collections::VecDeque<_>>());
    factory::reader_factory(move |source_id| {
        let next = remaining.lock().unwrap().pop_front();
        async move {
            match next {
                Some(reader) => Ok(reader as SharedReader),
                None => Err(BrokerError::reader(format!("no more readers for {source_id}"))),
            }
        }
    })
}

/// Factory that always hands out the given writer
pub fn writer_factory_of(writer: Arc<RecordingWriter>) -> WriterFactory {
    factory::writer_factory(move |_, _| {
        let writer = writer.clone() as SharedWriter;
        async move { Ok(writer) }
    })
}

/// Poll `cond` until it holds or the deadline passes
pub async fn wait_until<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
