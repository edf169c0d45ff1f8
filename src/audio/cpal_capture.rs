//! cpal-based audio capture
//!
//! Uses the cpal crate for cross-platform audio input.
//! Works with PipeWire, PulseAudio, and ALSA backends.
//!
//! Note: cpal::Stream is not Send, so the stream lives on a dedicated
//! thread and communicates via channels. The hardware callback never
//! blocks: each arrived chunk is sliced into fixed-size buffers and
//! enqueued on an unbounded channel, and the callback's job ends there.

use super::{AudioBuffer, AudioCapture, AudioFormat, CaptureStream};
use crate::config::AudioConfig;
use crate::error::CaptureError;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};

/// Commands sent to the audio capture thread
enum CaptureCommand {
    Stop(oneshot::Sender<()>),
}

/// Accumulates raw callback data and cuts it into fixed-size buffers
/// with monotonically increasing sequence numbers.
struct Chunker {
    pending: Vec<f32>,
    next_seq: u64,
    chunk_samples: usize,
    format: AudioFormat,
}

impl Chunker {
    fn new(format: AudioFormat, chunk_frames: usize) -> Self {
        let chunk_samples = chunk_frames * format.channels as usize;
        Self {
            pending: Vec::with_capacity(chunk_samples * 2),
            next_seq: 0,
            chunk_samples,
            format,
        }
    }

    /// Append callback data and return any completed buffers
    fn push(&mut self, data: &[f32]) -> Vec<AudioBuffer> {
        self.pending.extend_from_slice(data);
        let mut out = Vec::new();
        while self.pending.len() >= self.chunk_samples {
            let rest = self.pending.split_off(self.chunk_samples);
            let chunk = std::mem::replace(&mut self.pending, rest);
            out.push(AudioBuffer::new(chunk, self.format, self.next_seq));
            self.next_seq += 1;
        }
        out
    }

    /// Drain the partial tail buffer at stream stop, so no captured
    /// frame is lost
    fn flush(&mut self) -> Option<AudioBuffer> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        let buf = AudioBuffer::new(tail, self.format, self.next_seq);
        self.next_seq += 1;
        Some(buf)
    }
}

/// cpal-based audio capture implementation
pub struct CpalCapture {
    /// Audio configuration
    config: AudioConfig,
    /// Command sender to the capture thread
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    /// Handle to the capture thread
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    /// Create a new cpal audio capture instance
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            cmd_tx: None,
            thread_handle: None,
        }
    }
}

/// List the names of available audio input devices
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::EngineFailure(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Find an audio input device by name with flexible matching.
///
/// Matching strategy (in order):
/// 1. Exact match (case-sensitive)
/// 2. Exact match (case-insensitive)
/// 3. Substring match: device name contains the search term (case-insensitive)
///
/// This allows users to specify either full cpal device names
/// ("alsa_input.pci-0000_00_1f.3.analog-stereo"), PipeWire/PulseAudio short
/// names, or partial device names ("analog-stereo").
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, CaptureError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    // Skip devices whose name cannot be read; they cannot be matched anyway
    let mut named: Vec<(String, cpal::Device)> = Vec::new();
    for device in host
        .input_devices()
        .map_err(|e| CaptureError::EngineFailure(e.to_string()))?
    {
        if let Ok(name) = device.name() {
            named.push((name, device));
        }
    }

    let search_lower = device_name.to_lowercase();
    let matched = named
        .iter()
        .position(|(n, _)| n == device_name)
        .or_else(|| {
            named
                .iter()
                .position(|(n, _)| n.to_lowercase() == search_lower)
        })
        .or_else(|| {
            named
                .iter()
                .position(|(n, _)| n.to_lowercase().contains(&search_lower))
        });

    if let Some(idx) = matched {
        let (name, device) = named.swap_remove(idx);
        tracing::debug!("Found audio device: {} (searched for: {})", name, device_name);
        return Ok(device);
    }

    // No match found - provide helpful error with available devices
    let available = if named.is_empty() {
        "No audio input devices found.".to_string()
    } else {
        format!(
            "Available devices:\n{}",
            named
                .iter()
                .map(|(n, _)| format!("  - {}", n))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    Err(CaptureError::DeviceNotFoundWithList {
        requested: device_name.to_string(),
        available,
    })
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> Result<CaptureStream, CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        // Get the device info before spawning the thread
        let host = cpal::default_host();

        let device = if self.config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| CaptureError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &self.config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::EngineFailure(e.to_string()))?;

        // The hardware dictates the format; we report it, never choose it
        let format = AudioFormat::native(
            supported_config.sample_rate().0,
            supported_config.channels(),
        );
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            format.sample_rate,
            format.channels,
            sample_format
        );

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();

        let chunker = Arc::new(Mutex::new(Chunker::new(
            format,
            self.config.chunk_frames as usize,
        )));
        let chunker_cb = Arc::clone(&chunker);

        // Spawn audio capture thread; start() only returns Ok once the
        // stream is actually playing, so a failed open leaves nothing running
        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(
                    &device,
                    &stream_config,
                    chunker_cb,
                    chunk_tx.clone(),
                    err_fn,
                ),
                cpal::SampleFormat::I16 => build_stream::<i16>(
                    &device,
                    &stream_config,
                    chunker_cb,
                    chunk_tx.clone(),
                    err_fn,
                ),
                cpal::SampleFormat::U16 => build_stream::<u16>(
                    &device,
                    &stream_config,
                    chunker_cb,
                    chunk_tx.clone(),
                    err_fn,
                ),
                format => Err(CaptureError::UnsupportedFormat(format!("{:?}", format))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::EngineFailure(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            tracing::debug!("Audio capture thread started");

            // Wait for stop command
            if let Ok(CaptureCommand::Stop(ack_tx)) = cmd_rx.recv() {
                // Stop the stream (drop it), then flush the partial tail
                drop(stream);
                if let Ok(mut guard) = chunker.lock() {
                    if let Some(tail) = guard.flush() {
                        let _ = chunk_tx.send(tail);
                    }
                }
                let _ = ack_tx.send(());
            }

            tracing::debug!("Audio capture thread stopped");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(CaptureError::EngineFailure(
                    "capture thread exited before opening the stream".to_string(),
                ));
            }
        }

        self.cmd_tx = Some(cmd_tx);
        self.thread_handle = Some(thread_handle);

        Ok(CaptureStream {
            format,
            buffers: chunk_rx,
        })
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        // Idempotent: no-op if never started or already stopped
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if cmd_tx.send(CaptureCommand::Stop(ack_tx)).is_ok() {
                // The thread acks after flushing; channel closure counts too
                let _ = ack_rx.await;
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        tracing::debug!("Audio capture stopped");
        Ok(())
    }
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    chunker: Arc<Mutex<Chunker>>,
    tx: mpsc::UnboundedSender<AudioBuffer>,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> = data
                    .iter()
                    .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                    .collect();

                let ready = match chunker.lock() {
                    Ok(mut guard) => guard.push(&converted),
                    Err(_) => return,
                };

                // Enqueue and return; the consumers may be gone during teardown
                for buf in ready {
                    let _ = tx.send(buf);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    Ok(stream)
}
