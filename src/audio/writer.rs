//! WAV file sink for session recordings
//!
//! Appends captured buffers to a single 16-bit linear PCM file in arrival
//! order. `finalize` consumes the writer, so appending after the file is
//! closed is impossible by construction. The first append failure is
//! latched: later appends return the same error instead of writing a file
//! with a gap in the middle.

use super::{AudioBuffer, AudioFormat};
use crate::error::WriteError;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Path and frame count of a closed recording
#[derive(Debug, Clone)]
pub struct FinalizedAudio {
    pub path: PathBuf,
    pub frames: u64,
}

/// hound-based WAV sink
pub struct WavFileWriter {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
    frames_written: u64,
    io_error: Option<WriteError>,
}

impl WavFileWriter {
    /// Create a new WAV file for linear PCM frames matching `format`
    pub fn open(path: &Path, format: AudioFormat) -> Result<Self, WriteError> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(path, spec).map_err(|e| {
            WriteError::CreateFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        tracing::debug!("Opened recording file: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            frames_written: 0,
            io_error: None,
        })
    }

    /// Append a buffer's frames in call order.
    ///
    /// Samples are converted from f32 to i16 PCM. Disk errors are returned
    /// and latched; the caller surfaces them through the session rather
    /// than panicking on the write path.
    pub fn append(&mut self, buffer: &AudioBuffer) -> Result<(), WriteError> {
        if let Some(e) = &self.io_error {
            return Err(e.clone());
        }

        for &sample in buffer.samples() {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            if let Err(e) = self.writer.write_sample(value) {
                let err = WriteError::Io(e.to_string());
                self.io_error = Some(err.clone());
                return Err(err);
            }
        }

        self.frames_written += buffer.frames();
        Ok(())
    }

    /// Total frames successfully written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Path the recording is being written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file, returning its path and frame count.
    ///
    /// A latched append error is surfaced here too, after the file is
    /// closed: the frames written before the error remain playable.
    pub fn finalize(self) -> Result<FinalizedAudio, WriteError> {
        let path = self.path;
        let frames = self.frames_written;

        let closed = self
            .writer
            .finalize()
            .map_err(|e| WriteError::Io(e.to_string()));
        if let Some(e) = self.io_error {
            return Err(e);
        }
        closed?;

        tracing::debug!(
            "Finalized recording: {} ({} frames)",
            path.display(),
            frames
        );

        Ok(FinalizedAudio { path, frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;

    fn buffer(samples: Vec<f32>, seq: u64) -> AudioBuffer {
        AudioBuffer::new(samples, AudioFormat::mono_16khz(), seq)
    }

    fn read_samples(path: &Path) -> Vec<i16> {
        let mut reader = hound::WavReader::open(path).unwrap();
        reader.samples::<i16>().map(|s| s.unwrap()).collect()
    }

    #[test]
    fn test_open_append_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut writer = WavFileWriter::open(&path, AudioFormat::mono_16khz()).unwrap();
        writer.append(&buffer(vec![0.0, 0.5, -0.5], 0)).unwrap();
        writer.append(&buffer(vec![1.0, -1.0], 1)).unwrap();
        assert_eq!(writer.frames_written(), 5);

        let finalized = writer.finalize().unwrap();
        assert_eq!(finalized.frames, 5);
        assert_eq!(finalized.path, path);

        let samples = read_samples(&path);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[3], i16::MAX);
    }

    #[test]
    fn test_appends_preserve_delivery_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordered.wav");

        let mut writer = WavFileWriter::open(&path, AudioFormat::mono_16khz()).unwrap();
        let chunks: Vec<Vec<f32>> = (0..4)
            .map(|c| (0..8).map(|i| (c * 8 + i) as f32 / 100.0).collect())
            .collect();
        for (seq, chunk) in chunks.iter().enumerate() {
            writer.append(&buffer(chunk.clone(), seq as u64)).unwrap();
        }
        writer.finalize().unwrap();

        let expected: Vec<i16> = chunks
            .iter()
            .flatten()
            .map(|&s| (s * i16::MAX as f32) as i16)
            .collect();
        assert_eq!(read_samples(&path), expected);
    }

    #[test]
    fn test_empty_recording_has_zero_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");

        let writer = WavFileWriter::open(&path, AudioFormat::mono_16khz()).unwrap();
        let finalized = writer.finalize().unwrap();
        assert_eq!(finalized.frames, 0);
        assert!(read_samples(&path).is_empty());
    }

    #[test]
    fn test_create_failed_on_unwritable_path() {
        let result = WavFileWriter::open(
            Path::new("/nonexistent-dir/out.wav"),
            AudioFormat::mono_16khz(),
        );
        assert!(matches!(result, Err(WriteError::CreateFailed { .. })));
    }

    #[test]
    fn test_samples_clamped_to_pcm_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamped.wav");

        let mut writer = WavFileWriter::open(&path, AudioFormat::mono_16khz()).unwrap();
        writer.append(&buffer(vec![2.0, -2.0], 0)).unwrap();
        writer.finalize().unwrap();

        let samples = read_samples(&path);
        assert_eq!(samples[0], i16::MAX);
        assert_eq!(samples[1], -i16::MAX);
    }

    #[test]
    fn test_stereo_frame_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let format = AudioFormat::native(48_000, 2);

        let mut writer = WavFileWriter::open(&path, format).unwrap();
        writer
            .append(&AudioBuffer::new(vec![0.1; 8], format, 0))
            .unwrap();
        assert_eq!(writer.frames_written(), 4);

        let finalized = writer.finalize().unwrap();
        assert_eq!(finalized.frames, 4);
        assert_eq!(read_samples(&path).len(), 8);
    }
}
