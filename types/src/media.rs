/// Sample rate the inference endpoint expects for input audio.
pub const LIVE_API_PCM16_SAMPLE_RATE: f64 = 16000.0;

/// Mime tag for still-image chunks.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Mime tag for audio chunks: little-endian 16-bit PCM at a fixed
/// 16 kHz rate.
pub const AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// A transient unit of captured media. Produced by the capture
/// scheduler, consumed immediately by the session, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaFrame {
    /// JPEG-encoded still image.
    Jpeg(Vec<u8>),
    /// Fixed-size block of 16 kHz mono PCM16 samples.
    Pcm16(Vec<i16>),
}

impl MediaFrame {
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaFrame::Jpeg(_) => IMAGE_MIME_TYPE,
            MediaFrame::Pcm16(_) => AUDIO_MIME_TYPE,
        }
    }
}
