//! Compressed media packets
//!
//! A [`Packet`] carries exactly one compressed access unit belonging to one
//! stream. Packets are plain values with no interior mutability; cloning is
//! cheap because the payload is a reference-counted [`Bytes`].

use std::fmt;
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use super::codec::CodecKind;
use super::stream::Stream;

/// One compressed access unit
#[derive(Debug, Clone)]
pub struct Packet {
    /// Stream index; matches `Stream::idx` of the owning track
    pub idx: u16,
    /// Decode timestamp from the stream epoch
    pub dts: Duration,
    /// Presentation offset so that `pts = dts + pts_offset`; non-zero only
    /// for B-frames
    pub pts_offset: Duration,
    /// Packet duration
    pub duration: Duration,
    /// Capture wall-clock time, when the reader knows it
    pub wall_clock: Option<SystemTime>,
    /// Payload bytes; empty is permitted only when `new_codecs` is set
    pub data: Bytes,
    /// Video packet is a key frame
    pub key_frame: bool,
    /// First packet after a seek or other timeline break
    pub is_discontinuity: bool,
    /// Packet carries an in-band parameter set
    pub is_parameter_set: bool,
    /// Monotonic identifier assigned by the reader
    pub frame_id: i64,
    /// Codec of the owning stream, duplicated for fast dispatch
    pub codec: CodecKind,
    /// Mid-stream codec change for the listed streams only; all unlisted
    /// streams remain as previously declared
    pub new_codecs: Option<Vec<Stream>>,
}

impl Packet {
    /// Create a packet with the given payload; remaining fields default to
    /// zero / unset
    pub fn new(idx: u16, codec: CodecKind, dts: Duration, data: Bytes) -> Self {
        Self {
            idx,
            dts,
            pts_offset: Duration::ZERO,
            duration: Duration::ZERO,
            wall_clock: None,
            data,
            key_frame: false,
            is_discontinuity: false,
            is_parameter_set: false,
            frame_id: 0,
            codec,
            new_codecs: None,
        }
    }

    /// Create a payload-less codec-change packet for the given streams.
    ///
    /// `idx` and `codec` are taken from the first changed stream.
    pub fn codec_change(changed: Vec<Stream>) -> Self {
        debug_assert!(!changed.is_empty(), "codec change must list at least one stream");
        let first = &changed[0];
        let mut pkt = Self::new(first.idx, first.codec, Duration::ZERO, Bytes::new());
        pkt.new_codecs = Some(changed);
        pkt
    }

    /// Presentation timestamp (`dts + pts_offset`)
    pub fn pts(&self) -> Duration {
        self.dts + self.pts_offset
    }

    /// Whether this packet only announces a codec change and carries no
    /// payload to write
    pub fn is_codec_change_only(&self) -> bool {
        self.new_codecs.is_some() && self.data.is_empty()
    }
}

/// Humanise a byte count as `B`/`KB`/`MB`
fn format_size(len: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    if len >= MB {
        format!("{:.1}MB", len as f64 / MB as f64)
    } else if len >= KB {
        format!("{:.1}KB", len as f64 / KB as f64)
    } else {
        format!("{len}B")
    }
}

impl fmt::Display for Packet {
    /// Debug wire format, for logging only:
    /// `#<frame_id> <codec>:<idx> dts=<ms>ms [pts=<ms>ms] dur=<ms>ms <size> [K] [DISC] [PS]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}:{} dts={}ms",
            self.frame_id,
            self.codec,
            self.idx,
            self.dts.as_millis()
        )?;
        if !self.pts_offset.is_zero() {
            write!(f, " pts={}ms", self.pts().as_millis())?;
        }
        write!(f, " dur={}ms {}", self.duration.as_millis(), format_size(self.data.len()))?;
        if self.key_frame {
            f.write_str(" K")?;
        }
        if self.is_discontinuity {
            f.write_str(" DISC")?;
        }
        if self.is_parameter_set {
            f.write_str(" PS")?;
        }
        Ok(())
    }
}
