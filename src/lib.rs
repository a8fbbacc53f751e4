//! # stream-broker
//!
//! A concurrent fan-out core for compressed audio/video: one upstream
//! reader per source id, multiplexed to any number of downstream writers.
//!
//! For each source id the broker lazily opens one reader through a
//! caller-supplied factory, drains it in a dedicated task and distributes
//! every packet to all currently attached sinks. When the last sink for a
//! source detaches, the reader is torn down; when a new sink arrives for an
//! idle id, it is opened again.
//!
//! - Slow sinks never stall the reader: each sink has a bounded queue and a
//!   full queue drops the offered packet.
//! - Mid-stream codec changes are observed by every current sink (via the
//!   writer's codec-change capability) and every future sink (via its
//!   header).
//! - Sinks whose writer fails are evicted automatically; the failure is
//!   published on a caller-supplied error channel.
//!
//! The broker neither parses nor understands payload bytes. Container and
//! bitstream handling belong to the [`PacketReader`] / [`PacketWriter`]
//! implementations behind the factories.
//!
//! # Example
//!
//! ```no_run
//! use stream_broker::{pipeline, StreamBroker};
//!
//! # async fn run(open_rtsp: pipeline::ReaderFactory, open_flv: pipeline::WriterFactory) {
//! let broker = StreamBroker::new(open_rtsp, None);
//! let (err_tx, mut err_rx) = tokio::sync::mpsc::channel(8);
//!
//! broker
//!     .attach("camera-42", "viewer-1", open_flv, None, Some(err_tx))
//!     .await
//!     .unwrap();
//!
//! // ... the viewer's writer now receives the live packet stream ...
//!
//! if let Some(err) = err_rx.recv().await {
//!     eprintln!("stream ended: {err}");
//! }
//! broker.detach("camera-42", "viewer-1").await.unwrap();
//! # }
//! ```

pub mod broker;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod stats;

pub use broker::{BrokerConfig, SourcePhase, StreamBroker};
pub use error::{BrokerError, Result};
pub use media::{CodecKind, Packet, Stream};
pub use pipeline::{
    CodecChangeWriter, PacketReader, PacketWriter, Pausable, ReaderFactory, ReaderRemover,
    Seekable, WriterFactory, WriterRemover,
};
pub use stats::{BrokerStats, SinkStats, SourceStats};
