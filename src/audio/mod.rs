//! Audio capture module
//!
//! Provides microphone capture using cpal, which works with PipeWire,
//! PulseAudio, and ALSA backends, plus the WAV file sink for session
//! recordings.
//!
//! Capture delivers audio at the device's native format: the format is
//! reported by the hardware when the stream opens, not chosen by the caller.

pub mod cpal_capture;
pub mod writer;

use crate::error::CaptureError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Format descriptor for captured audio and the on-disk recording.
///
/// Sample rate and channel count come from the hardware; the container bit
/// depth is fixed at 16-bit linear PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Container bit depth
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Format used by the recognition engine (whisper expects 16kHz mono)
    pub fn mono_16khz() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    /// Native hardware format with the standard 16-bit container depth
    pub fn native(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }
}

/// An immutable chunk of captured audio.
///
/// Samples are interleaved f32 in the captured format. Buffers carry a
/// monotonically increasing sequence number assigned by the capture engine
/// and are cheap to clone for fan-out to multiple sinks.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    format: AudioFormat,
    seq: u64,
}

impl AudioBuffer {
    /// Create a buffer from captured samples
    pub fn new(samples: Vec<f32>, format: AudioFormat, seq: u64) -> Self {
        Self {
            samples: samples.into(),
            format,
            seq,
        }
    }

    /// Interleaved samples in capture order
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Format the buffer was captured under
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Sequence number assigned at capture time
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Number of frames (samples per channel) in this buffer
    pub fn frames(&self) -> u64 {
        self.samples.len() as u64 / self.format.channels.max(1) as u64
    }

    /// Whether the buffer carries no audio
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A running capture stream: the hardware-reported format plus the buffer
/// channel. The channel closes when the engine stops.
pub struct CaptureStream {
    /// Format reported by the hardware when the stream opened
    pub format: AudioFormat,
    /// Fixed-size buffers in capture order
    pub buffers: mpsc::UnboundedReceiver<AudioBuffer>,
}

/// Trait for audio capture implementations
///
/// `start` opens the input stream and begins delivering fixed-size buffers
/// until `stop` is called. `stop` is idempotent: calling it on an engine
/// that never started, or twice, is a no-op.
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    /// Start capturing; fails with `CaptureError::EngineFailure` if the
    /// device cannot be opened, leaving nothing running.
    async fn start(&mut self) -> Result<CaptureStream, CaptureError>;

    /// Halt the stream and deregister the callback.
    async fn stop(&mut self) -> Result<(), CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frames_mono() {
        let buf = AudioBuffer::new(vec![0.0; 1024], AudioFormat::mono_16khz(), 0);
        assert_eq!(buf.frames(), 1024);
    }

    #[test]
    fn test_buffer_frames_stereo() {
        let buf = AudioBuffer::new(vec![0.0; 2048], AudioFormat::native(48_000, 2), 3);
        assert_eq!(buf.frames(), 1024);
        assert_eq!(buf.seq(), 3);
    }

    #[test]
    fn test_buffer_clone_shares_samples() {
        let buf = AudioBuffer::new(vec![0.5; 16], AudioFormat::mono_16khz(), 7);
        let clone = buf.clone();
        assert!(std::ptr::eq(buf.samples(), clone.samples()));
        assert_eq!(clone.seq(), 7);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = AudioBuffer::new(vec![], AudioFormat::mono_16khz(), 0);
        assert!(buf.is_empty());
        assert_eq!(buf.frames(), 0);
    }
}
