//! Factory and remover callbacks
//!
//! The broker opens readers and writers exclusively through caller-supplied
//! factories, and deregisters them through optional removers. Callbacks are
//! `Arc`'d boxed-future closures so the broker can retry an attach with the
//! same factory and share it across tasks.
//!
//! Removers run on a detached timeout (see `BrokerConfig::remover_timeout`)
//! so cleanup completes even when the triggering caller has already gone
//! away.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

use super::reader::PacketReader;
use super::writer::PacketWriter;

/// Boxed future returned by factory and remover callbacks
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A reader shared between the read task and caller-side control calls
pub type SharedReader = Arc<dyn PacketReader>;

/// A writer shared between the write task and sink teardown
pub type SharedWriter = Arc<dyn PacketWriter>;

/// Opens a reader for a source id (an RTSP URL, a camera id, a file path)
pub type ReaderFactory = Arc<dyn Fn(String) -> BoxFuture<Result<SharedReader>> + Send + Sync>;

/// Deregisters a reader after it has been closed
pub type ReaderRemover = Arc<dyn Fn(String) -> BoxFuture<Result<()>> + Send + Sync>;

/// Opens a writer for a (source id, sink id) pair
pub type WriterFactory =
    Arc<dyn Fn(String, String) -> BoxFuture<Result<SharedWriter>> + Send + Sync>;

/// Deregisters a writer after it has been closed
pub type WriterRemover = Arc<dyn Fn(String, String) -> BoxFuture<Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`ReaderFactory`]
pub fn reader_factory<F, Fut>(f: F) -> ReaderFactory
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SharedReader>> + Send + 'static,
{
    Arc::new(move |source_id| Box::pin(f(source_id)))
}

/// Wrap an async closure as a [`ReaderRemover`]
pub fn reader_remover<F, Fut>(f: F) -> ReaderRemover
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |source_id| Box::pin(f(source_id)))
}

/// Wrap an async closure as a [`WriterFactory`]
pub fn writer_factory<F, Fut>(f: F) -> WriterFactory
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SharedWriter>> + Send + 'static,
{
    Arc::new(move |source_id, sink_id| Box::pin(f(source_id, sink_id)))
}

/// Wrap an async closure as a [`WriterRemover`]
pub fn writer_remover<F, Fut>(f: F) -> WriterRemover
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |source_id, sink_id| Box::pin(f(source_id, sink_id)))
}
