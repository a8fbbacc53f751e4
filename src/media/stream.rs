//! Per-track stream descriptors
//!
//! A [`Stream`] describes one audio or video track within a source. Stream
//! identity is the `idx` field, which matches `Packet::idx` for every packet
//! of that track; indices may be non-contiguous, so slice position is never
//! meaningful.

use bytes::Bytes;

use super::codec::CodecKind;

/// One track (audio or video) within a source
///
/// `codec_data` is the decoder-init blob (AVCDecoderConfigurationRecord,
/// MPEG4AudioConfig, ...) and is opaque to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    /// Stream index; matches `Packet::idx` for this track
    pub idx: u16,
    /// Codec of this track
    pub codec: CodecKind,
    /// Decoder initialisation bytes, opaque to the broker
    pub codec_data: Bytes,
}

impl Stream {
    /// Create a stream descriptor without decoder-init data
    pub fn new(idx: u16, codec: CodecKind) -> Self {
        Self {
            idx,
            codec,
            codec_data: Bytes::new(),
        }
    }

    /// Create a stream descriptor with decoder-init data
    pub fn with_codec_data(idx: u16, codec: CodecKind, codec_data: Bytes) -> Self {
        Self {
            idx,
            codec,
            codec_data,
        }
    }
}

/// Merge a mid-stream codec change into a cached stream list.
///
/// Entries in `changed` replace the cached entry with the same `idx`;
/// unlisted streams keep their previous declaration. A changed entry whose
/// `idx` was not previously declared is appended.
pub fn apply_codec_change(current: &mut Vec<Stream>, changed: &[Stream]) {
    for change in changed {
        match current.iter_mut().find(|s| s.idx == change.idx) {
            Some(slot) => *slot = change.clone(),
            None => current.push(change.clone()),
        }
    }
}
