//! Codec identifiers
//!
//! A [`CodecKind`] tags every stream and packet with its compression format.
//! The broker never parses payload bytes; the tag exists so sinks can
//! dispatch without inspecting `codec_data`.

use std::fmt;

/// Audio/video codec tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// Single JPEG images
    Jpeg,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// Motion JPEG
    Mjpeg,
    /// AAC (LC)
    Aac,
    /// AAC-ELD
    AacEld,
    /// Linear PCM
    Pcm,
    /// PCM mu-law
    PcmMulaw,
    /// PCM A-law
    PcmAlaw,
    /// Opus
    Opus,
    /// Speex
    Speex,
    /// Nellymoser
    Nellymoser,
    /// MP3
    Mp3,
    /// FLAC
    Flac,
}

impl CodecKind {
    /// Whether this is a video codec
    pub fn is_video(self) -> bool {
        matches!(
            self,
            CodecKind::H264
                | CodecKind::H265
                | CodecKind::Jpeg
                | CodecKind::Vp8
                | CodecKind::Vp9
                | CodecKind::Av1
                | CodecKind::Mjpeg
        )
    }

    /// Whether this is an audio codec
    pub fn is_audio(self) -> bool {
        !self.is_video()
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecKind::H264 => "H264",
            CodecKind::H265 => "H265",
            CodecKind::Jpeg => "JPEG",
            CodecKind::Vp8 => "VP8",
            CodecKind::Vp9 => "VP9",
            CodecKind::Av1 => "AV1",
            CodecKind::Mjpeg => "MJPEG",
            CodecKind::Aac => "AAC",
            CodecKind::AacEld => "AAC_ELD",
            CodecKind::Pcm => "PCM",
            CodecKind::PcmMulaw => "PCM_MULAW",
            CodecKind::PcmAlaw => "PCM_ALAW",
            CodecKind::Opus => "OPUS",
            CodecKind::Speex => "SPEEX",
            CodecKind::Nellymoser => "NELLYMOSER",
            CodecKind::Mp3 => "MP3",
            CodecKind::Flac => "FLAC",
        };
        f.write_str(name)
    }
}
