//! Whisper-based streaming recognition
//!
//! Uses whisper.cpp via the whisper-rs crate for fast, local recognition.
//! whisper.cpp has no native streaming decoder, so partial hypotheses are
//! produced by periodically re-decoding the audio accumulated so far; the
//! final hypothesis is one last decode over everything fed before cancel.
//!
//! Incoming buffers keep the capture hardware's native format; this
//! wrapper downmixes to mono and resamples to 16kHz before inference.

use super::{
    RecognitionHandle, StreamingRecognizer, TranscriptHypothesis,
};
use crate::audio::{AudioBuffer, AudioFormat};
use crate::config::WhisperConfig;
use crate::error::RecognitionError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Sample rate whisper models are trained on
const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Shortest stretch of audio worth decoding (one second)
const MIN_DECODE_SAMPLES: usize = WHISPER_SAMPLE_RATE as usize;

/// Whisper-backed streaming recognizer
pub struct WhisperRecognizer {
    /// Whisper context (holds the model)
    ctx: Arc<WhisperContext>,
    /// Language for recognition ("auto" enables detection)
    language: String,
    /// Whether to translate to English
    translate: bool,
    /// Number of threads to use
    threads: usize,
    /// How often partial hypotheses are re-decoded
    partial_interval: Duration,
}

impl WhisperRecognizer {
    /// Load the model; fails with `RecognitionError::Unavailable` if it
    /// cannot be found or initialized.
    pub fn new(config: &WhisperConfig) -> Result<Self, RecognitionError> {
        let model_path = resolve_model_path(&config.model)?;

        tracing::info!("Loading whisper model from {:?}", model_path);
        let start = Instant::now();

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| RecognitionError::Unavailable("Invalid model path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Self {
            ctx: Arc::new(ctx),
            language: config.language.clone(),
            translate: config.translate,
            threads,
            partial_interval: Duration::from_millis(config.partial_interval_ms),
        })
    }

    /// Transcribe an existing audio file in one pass (offline mode)
    pub fn transcribe_file(&self, path: &Path) -> Result<String, RecognitionError> {
        let samples = read_wav_for_recognition(path)?;
        decode(
            &self.ctx,
            &self.language,
            self.translate,
            self.threads,
            &samples,
        )
    }
}

#[async_trait::async_trait]
impl StreamingRecognizer for WhisperRecognizer {
    async fn begin_session(
        &self,
        format: AudioFormat,
    ) -> Result<RecognitionHandle, RecognitionError> {
        let (handle, mut io) = RecognitionHandle::channel();

        let ctx = Arc::clone(&self.ctx);
        let language = self.language.clone();
        let translate = self.translate;
        let threads = self.threads;
        let interval = self.partial_interval;

        tracing::debug!(
            "Beginning recognition session: {} Hz, {} channel(s)",
            format.sample_rate,
            format.channels
        );

        tokio::spawn(async move {
            // Audio accumulated so far, already adapted to 16kHz mono
            let mut audio: Vec<f32> = Vec::new();
            let mut seq: u64 = 0;
            let mut last_text = String::new();
            let mut last_decode = Instant::now();

            while let Some(buffer) = io.next_audio().await {
                audio.extend(adapt_for_recognition(&buffer));

                if last_decode.elapsed() < interval || audio.len() < MIN_DECODE_SAMPLES {
                    continue;
                }
                last_decode = Instant::now();

                match decode_blocking(&ctx, &language, translate, threads, audio.clone()).await {
                    Ok(text) => {
                        seq += 1;
                        last_text = text.clone();
                        if !io.emit(TranscriptHypothesis::partial(text, seq)) {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Recognition failed mid-session: {}", e);
                        io.fail(e);
                        return;
                    }
                }
            }

            // Cancelled: one conclusive decode over everything that arrived
            let final_text = if audio.len() >= MIN_DECODE_SAMPLES {
                match decode_blocking(&ctx, &language, translate, threads, audio).await {
                    Ok(text) => text,
                    Err(e) => {
                        // Keep the last partial rather than discarding results
                        tracing::warn!("Final decode failed, keeping last partial: {}", e);
                        last_text
                    }
                }
            } else {
                last_text
            };

            seq += 1;
            io.emit(TranscriptHypothesis::final_result(final_text, seq));
        });

        Ok(handle)
    }
}

/// Run one whisper decode on the blocking pool
async fn decode_blocking(
    ctx: &Arc<WhisperContext>,
    language: &str,
    translate: bool,
    threads: usize,
    samples: Vec<f32>,
) -> Result<String, RecognitionError> {
    let ctx = Arc::clone(ctx);
    let language = language.to_string();

    tokio::task::spawn_blocking(move || decode(&ctx, &language, translate, threads, &samples))
        .await
        .map_err(|e| RecognitionError::Failed(e.to_string()))?
}

/// Decode 16kHz mono samples to text
fn decode(
    ctx: &WhisperContext,
    language: &str,
    translate: bool,
    threads: usize,
    samples: &[f32],
) -> Result<String, RecognitionError> {
    if samples.is_empty() {
        return Err(RecognitionError::Failed("Empty audio buffer".to_string()));
    }

    let duration_secs = samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;
    tracing::debug!(
        "Decoding {:.2}s of audio ({} samples)",
        duration_secs,
        samples.len()
    );

    let start = Instant::now();

    let mut state = ctx
        .create_state()
        .map_err(|e| RecognitionError::Failed(e.to_string()))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

    if language == "auto" {
        params.set_language(None);
    } else {
        params.set_language(Some(language));
    }

    params.set_translate(translate);
    params.set_n_threads(threads as i32);

    // Disable output we don't need
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    params.set_suppress_blank(true);
    params.set_suppress_nst(true);

    // For short stretches, use single segment mode
    if duration_secs < 30.0 {
        params.set_single_segment(true);
    }

    state
        .full(params, samples)
        .map_err(|e| RecognitionError::Failed(e.to_string()))?;

    let mut text = String::new();
    for segment in state.as_iter() {
        text.push_str(
            segment
                .to_str()
                .map_err(|e| RecognitionError::Failed(e.to_string()))?,
        );
    }

    let result = text.trim().to_string();
    tracing::debug!(
        "Decode completed in {:.2}s ({} chars)",
        start.elapsed().as_secs_f32(),
        result.len()
    );

    Ok(result)
}

/// Adapt one captured buffer to the 16kHz mono stream whisper expects
fn adapt_for_recognition(buffer: &AudioBuffer) -> Vec<f32> {
    let format = buffer.format();
    let mono = downmix_mono(buffer.samples(), format.channels as usize);
    resample(&mono, format.sample_rate, WHISPER_SAMPLE_RATE)
}

/// Mix interleaved channels down to mono by averaging each frame
fn downmix_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear interpolation resampling
/// For better quality, consider using the `rubato` crate
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

/// Read a WAV file and adapt it to 16kHz mono for recognition
fn read_wav_for_recognition(path: &Path) -> Result<Vec<f32>, RecognitionError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| RecognitionError::Failed(format!("Cannot open {}: {}", path.display(), e)))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| RecognitionError::Failed(e.to_string()))?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| RecognitionError::Failed(e.to_string()))?,
    };

    let mono = downmix_mono(&samples, spec.channels as usize);
    Ok(resample(&mono, spec.sample_rate, WHISPER_SAMPLE_RATE))
}

/// Resolve a model name or path to an on-disk ggml model file.
///
/// Accepts an absolute/relative path to a .bin file, or a short model name
/// ("base.en", "small", ...) looked up under the user data directory.
fn resolve_model_path(model: &str) -> Result<PathBuf, RecognitionError> {
    let direct = PathBuf::from(model);
    if direct.extension().is_some_and(|ext| ext == "bin") {
        if direct.exists() {
            return Ok(direct);
        }
        return Err(RecognitionError::Unavailable(format!(
            "Model not found: {}",
            direct.display()
        )));
    }

    let models_dir = directories::ProjectDirs::from("", "", "vocalog")
        .map(|dirs| dirs.data_dir().join("models"))
        .ok_or_else(|| {
            RecognitionError::Unavailable("Cannot determine model directory".to_string())
        })?;

    let candidate = models_dir.join(format!("ggml-{}.bin", model));
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(RecognitionError::Unavailable(format!(
        "Model not found: {}. Download a ggml whisper model to {}",
        model,
        candidate.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 48000 -> 16000 is 3:1 ratio, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        // 8000 -> 16000 is 1:2 ratio, so 2 samples -> 4 samples
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_mono(&samples, 1), samples);
    }

    #[test]
    fn test_downmix_stereo_averages_frames() {
        let samples = vec![1.0, 0.0, 0.5, 0.5];
        let mono = downmix_mono(&samples, 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn test_adapt_native_stereo_buffer() {
        let format = AudioFormat::native(32_000, 2);
        let buffer = AudioBuffer::new(vec![0.5; 64], format, 0);
        let adapted = adapt_for_recognition(&buffer);
        // 32 stereo frames at 32kHz -> 16 mono samples at 16kHz
        assert_eq!(adapted.len(), 16);
        assert!((adapted[0] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_resolve_missing_model_is_unavailable() {
        let result = resolve_model_path("/nonexistent/model.bin");
        assert!(matches!(result, Err(RecognitionError::Unavailable(_))));
    }

    #[test]
    fn test_read_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(i16::MAX / 2).unwrap();
        }
        writer.finalize().unwrap();

        let samples = read_wav_for_recognition(&path).unwrap();
        assert_eq!(samples.len(), 100);
        assert!((samples[0] - 0.5).abs() < 0.01);
    }
}
