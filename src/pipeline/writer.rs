//! Downstream writer contract
//!
//! A [`PacketWriter`] accepts a header (the stream list), a sequence of
//! packets, and a trailer, in that order. Methods take `&self` so a writer
//! can be shared between the sink's write task and its teardown path;
//! implementors synchronise internally.

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{Packet, Stream};

/// Writes compressed packets into a container or transport
///
/// Lifecycle, enforced by the broker:
/// 1. `write_header`: exactly once, before any packet
/// 2. `write_packet`: repeatedly, in read order
/// 3. `write_trailer`: exactly once
/// 4. `close`: exactly once, last
#[async_trait]
pub trait PacketWriter: Send + Sync {
    /// Declare the stream list. Called exactly once, before any packet.
    async fn write_header(&self, streams: &[Stream]) -> Result<()>;

    /// Write one compressed packet
    async fn write_packet(&self, packet: &Packet) -> Result<()>;

    /// Finalise the container. Called exactly once.
    async fn write_trailer(&self) -> Result<()>;

    /// Release the underlying resource. Called exactly once, last.
    async fn close(&self);

    /// Codec-change capability, if this writer supports it.
    ///
    /// Writers without the capability silently ignore mid-stream codec
    /// changes.
    fn as_codec_change(&self) -> Option<&dyn CodecChangeWriter> {
        None
    }
}

/// Optional capability: handle mid-stream codec changes
#[async_trait]
pub trait CodecChangeWriter: Send + Sync {
    /// Observe a codec change. Only the streams whose codec actually
    /// changed are listed; unchanged streams are unaffected.
    async fn write_codec_change(&self, changed: &[Stream]) -> Result<()>;
}
