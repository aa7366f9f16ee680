use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use parley_core::config::CaptureConfig;
use parley_core::{AudioCapture, AudioError};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::create_ring_buffer;
use crate::wav::encode_interleaved;

// ── RecorderStatus ────────────────────────────────────────────

/// Shared view of a running recording, safe to poll from another thread.
#[derive(Clone, Default)]
pub struct RecorderStatus {
    errored: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
}

impl RecorderStatus {
    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Relaxed)
    }

    /// Samples lost because the ring buffer was full.
    pub fn dropped_samples(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── Recorder ──────────────────────────────────────────────────

/// Records one microphone into memory and hands it over as an
/// [`AudioCapture`] (16-bit PCM WAV at the device rate).
pub struct Recorder {
    stream: Stream,
    consumer: HeapCons<f32>,
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    status: RecorderStatus,
}

impl Recorder {
    /// Open `device` and start recording immediately. The ring buffer holds
    /// `max_duration` of audio between [`drain`](Self::drain) calls.
    pub fn start(
        device: &Device,
        config: &CaptureConfig,
        max_duration: Duration,
    ) -> Result<Self, AudioError> {
        let channels = device
            .default_input_config()
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?
            .channels();
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let capacity = ring_capacity(config.sample_rate, channels, max_duration);
        let (producer, consumer) = create_ring_buffer(capacity);
        let status = RecorderStatus::default();
        let stream = build_stream(device, &stream_config, producer, status.clone())?;
        stream
            .play()
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        tracing::info!(
            sample_rate = config.sample_rate,
            channels,
            capacity,
            "recording started"
        );
        Ok(Self {
            stream,
            consumer,
            samples: Vec::with_capacity(capacity),
            sample_rate: config.sample_rate,
            channels,
            status,
        })
    }

    pub fn status(&self) -> RecorderStatus {
        self.status.clone()
    }

    /// Move everything buffered so far out of the ring buffer.
    pub fn drain(&mut self) -> usize {
        let pending = self.consumer.occupied_len();
        self.samples.extend(self.consumer.pop_iter());
        pending
    }

    pub fn recorded_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Stop the stream and serialize the recording.
    pub fn finish(mut self) -> Result<AudioCapture, AudioError> {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("failed to pause capture stream: {}", e);
        }
        self.drain();
        if self.status.is_errored() {
            return Err(AudioError::StreamError(
                "capture stream reported an error".to_string(),
            ));
        }
        let dropped = self.status.dropped_samples();
        if dropped > 0 {
            tracing::warn!(dropped, "ring buffer overflowed during recording");
        }
        let capture = samples_to_capture(self.samples, self.sample_rate, self.channels)?;
        tracing::info!(bytes = capture.len(), "recording finished");
        Ok(capture)
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    producer: HeapProd<f32>,
    status: RecorderStatus,
) -> Result<Stream, AudioError> {
    let producer = Arc::new(Mutex::new(producer));
    let errored = Arc::clone(&status.errored);
    let dropped = Arc::clone(&status.dropped);

    let err_callback = move |err: cpal::StreamError| {
        tracing::error!("capture stream error: {}", err);
        errored.store(true, Ordering::Relaxed);
    };

    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut prod) = producer.lock() {
                    let pushed = prod.push_slice(data);
                    if pushed < data.len() {
                        dropped.fetch_add(data.len() - pushed, Ordering::Relaxed);
                    }
                }
            },
            err_callback,
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))
}

fn ring_capacity(sample_rate: u32, channels: u16, max_duration: Duration) -> usize {
    let samples = sample_rate as f64 * channels as f64 * max_duration.as_secs_f64();
    (samples.ceil() as usize).max(1)
}

/// Wrap interleaved samples as a WAV capture, dropping any trailing partial
/// frame.
pub(crate) fn samples_to_capture(
    mut samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioCapture, AudioError> {
    let frame = channels.max(1) as usize;
    samples.truncate(samples.len() - samples.len() % frame);
    let bytes = encode_interleaved(&samples, sample_rate, channels)?;
    Ok(AudioCapture::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reencode::reencode_blocking;

    #[test]
    fn test_recorder_status_clone_shares_state() {
        let s1 = RecorderStatus::default();
        let s2 = s1.clone();
        s1.errored.store(true, Ordering::Relaxed);
        s1.dropped.fetch_add(7, Ordering::Relaxed);
        assert!(s2.is_errored());
        assert_eq!(s2.dropped_samples(), 7);
    }

    #[test]
    fn test_ring_capacity_covers_duration() {
        assert_eq!(ring_capacity(48_000, 2, Duration::from_secs(3)), 288_000);
        assert_eq!(ring_capacity(16_000, 1, Duration::ZERO), 1);
    }

    #[test]
    fn test_samples_to_capture_drops_partial_frame() {
        let capture = samples_to_capture(vec![0.1, 0.2, 0.3], 48_000, 2).unwrap();
        // header + one stereo frame
        assert_eq!(capture.len(), 44 + 4);
    }

    #[test]
    fn test_recorded_capture_feeds_reencoder() {
        let samples: Vec<f32> = (0..4_800)
            .map(|i| (i as f32 * 0.05).sin() * 0.3)
            .collect();
        let capture = samples_to_capture(samples, 48_000, 1).unwrap();
        let encoded = reencode_blocking(&capture).unwrap();
        // 4800 frames at 48 kHz become 1600 frames at 16 kHz
        assert_eq!(encoded.len(), 44 + 1_600 * 2);
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_record_default_microphone() {
        let manager = crate::DeviceManager::new();
        let device = manager.get_input_device("default").unwrap();
        let mut recorder =
            Recorder::start(&device, &CaptureConfig::default(), Duration::from_secs(2)).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        recorder.drain();
        let capture = recorder.finish().unwrap();
        assert!(capture.len() > 44);
    }
}
