//! Microphone capture using CPAL
//!
//! Push-to-talk records by keeping a capture stream alive between the press
//! and the release; chunks flow to the capture thread over a channel and the
//! partial chunk left at release is flushed when the recording stops.

use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Samples per chunk sent to the capture thread (default: 1024)
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_size: 1024,
        }
    }
}

/// Audio chunk sent from the capture callback
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Audio samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
}

/// Splits incoming callback buffers into fixed-size chunks, keeping the
/// remainder until the next push or a final [`Chunker::flush`].
#[derive(Debug)]
pub struct Chunker {
    buffer_size: usize,
    pending: Vec<f32>,
}

impl Chunker {
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            buffer_size,
            pending: Vec::with_capacity(buffer_size),
        }
    }

    /// Append `data` and return every chunk that is now full.
    pub fn push(&mut self, data: &[f32]) -> Vec<AudioChunk> {
        let mut full = Vec::new();
        for &sample in data {
            self.pending.push(sample);
            if self.pending.len() >= self.buffer_size {
                full.push(AudioChunk {
                    samples: std::mem::replace(&mut self.pending, Vec::with_capacity(self.buffer_size)),
                });
            }
        }
        full
    }

    /// The partial chunk left over, if any.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }
        Some(AudioChunk {
            samples: std::mem::take(&mut self.pending),
        })
    }
}

fn lock_chunker(chunker: &Mutex<Chunker>) -> MutexGuard<'_, Chunker> {
    chunker.lock().unwrap_or_else(PoisonError::into_inner)
}

fn send_chunk(tx: &mpsc::UnboundedSender<AudioChunk>, chunk: AudioChunk) {
    if let Err(e) = tx.send(chunk) {
        warn!("Failed to send audio chunk: {}", e);
    }
}

/// A running capture. Full chunks arrive on the channel while it runs;
/// [`Recording::stop`] ends the stream and sends the trailing partial chunk.
pub struct Recording {
    stream: Stream,
    chunker: Arc<Mutex<Chunker>>,
    chunk_tx: mpsc::UnboundedSender<AudioChunk>,
}

impl Recording {
    pub fn stop(self) {
        drop(self.stream);
        if let Some(rest) = lock_chunker(&self.chunker).flush() {
            send_chunk(&self.chunk_tx, rest);
        }
        info!("⏹️ Recording stopped");
    }
}

/// Audio capture system using CPAL
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    /// Open the default input device
    pub fn new(config: AudioConfig) -> VoiceResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;

        debug!(
            "🎤 Input device: {} ({}Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate,
            config.channels
        );

        // Fails early when the host has no usable input configuration at all
        let default_config = device.default_input_config()?;
        debug!("🔧 Default input config: {:?}", default_config);

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Start capturing and send fixed-size chunks to `chunk_tx` until the
    /// returned recording is stopped.
    pub fn start_capture(self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<Recording> {
        let chunker = Arc::new(Mutex::new(Chunker::new(self.config.buffer_size)));
        let callback_chunker = Arc::clone(&chunker);
        let callback_tx = chunk_tx.clone();

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for chunk in lock_chunker(&callback_chunker).push(data) {
                    send_chunk(&callback_tx, chunk);
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        info!("▶️ Recording");

        Ok(Recording {
            stream,
            chunker,
            chunk_tx,
        })
    }
}

/// Collect every chunk already buffered in `rx`, in arrival order.
pub fn drain_chunks(rx: &mut mpsc::UnboundedReceiver<AudioChunk>) -> Vec<f32> {
    let mut samples = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        samples.extend_from_slice(&chunk.samples);
    }
    samples
}
