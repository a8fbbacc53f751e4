//! Upstream reader contract
//!
//! A [`PacketReader`] produces an ordered stream of packets plus an initial
//! stream list. All methods take `&self`: the broker shares one reader
//! between its read task and caller-side pause/seek calls, so implementors
//! synchronise internally (the usual shape is a lock or channel around the
//! transport).
//!
//! Pause and seek are optional capabilities, probed through the `as_*`
//! methods. The default probes return `None`; readers that support a
//! capability override the probe to return themselves.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{Packet, Stream};

/// Reads compressed packets from a container or transport
#[async_trait]
pub trait PacketReader: Send + Sync {
    /// Read the container header and return the initial stream list.
    ///
    /// Called once, before the first `read_packet`. Stream identity is
    /// `Stream::idx`; indices may be non-contiguous.
    async fn streams(&self) -> Result<Vec<Stream>>;

    /// Read the next packet.
    ///
    /// Returns [`BrokerError::EndOfStream`] when the upstream is exhausted
    /// and [`BrokerError::Reader`] for any other failure. A packet with
    /// `new_codecs` set signals a mid-stream codec change for the listed
    /// streams.
    ///
    /// [`BrokerError::EndOfStream`]: crate::error::BrokerError::EndOfStream
    /// [`BrokerError::Reader`]: crate::error::BrokerError::Reader
    async fn read_packet(&self) -> Result<Packet>;

    /// Release the underlying source. Called exactly once, after the last
    /// `read_packet`.
    async fn close(&self);

    /// Pause capability, if this reader supports it
    fn as_pausable(&self) -> Option<&dyn Pausable> {
        None
    }

    /// Seek capability, if this reader supports it
    fn as_seekable(&self) -> Option<&dyn Seekable> {
        None
    }
}

/// Optional capability: suspend and resume packet delivery
#[async_trait]
pub trait Pausable: Send + Sync {
    /// Stop `read_packet` from returning new packets until resumed
    async fn pause(&self) -> Result<()>;

    /// Resume packet delivery
    async fn resume(&self) -> Result<()>;

    /// Whether delivery is currently paused
    fn is_paused(&self) -> bool;
}

/// Optional capability: reposition within the stream
#[async_trait]
pub trait Seekable: Send + Sync {
    /// Seek to `pos` (a duration from the stream start, matching
    /// `Packet::dts`) and return the position actually landed on, which may
    /// differ due to keyframe alignment. The first packet after a
    /// successful seek has `is_discontinuity` set.
    async fn seek_to(&self, pos: Duration) -> Result<Duration>;
}
