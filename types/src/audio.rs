/// Audio data encoded as base64 (little-endian PCM16, mono)
pub type Base64EncodedAudioBytes = String;

/// Sample rate the realtime gateway streams PCM16 at, in both directions.
pub const PCM16_SAMPLE_RATE: u32 = 24_000;

/// Number of samples per outbound realtime audio frame.
pub const FRAME_SIZE: usize = 4096;
