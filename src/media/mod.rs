//! Media value types
//!
//! This module provides:
//! - `CodecKind` tags for audio/video compression formats
//! - `Stream` per-track descriptors with decoder-init data
//! - `Packet` compressed access units, cheap to clone for fan-out
//!
//! The broker treats payload bytes as opaque; bitstream parsing lives in
//! external collaborators.

pub mod codec;
pub mod packet;
pub mod stream;

pub use codec::CodecKind;
pub use packet::Packet;
pub use stream::{apply_codec_change, Stream};
