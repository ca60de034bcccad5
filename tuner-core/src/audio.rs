//! # Audio Capture Module
//!
//! Real-time microphone capture using CPAL. The cpal input callback
//! accumulates samples and emits fixed-size frames through a bounded
//! crossbeam channel; the detection loop pulls frames from the channel on
//! its own schedule via the [`FrameSource`] trait, which also lets tests
//! substitute synthetic oscillators for the microphone.

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{info, warn};
use thiserror::Error;

/// Number of frames the capture channel buffers before dropping.
const CHANNEL_CAPACITY: usize = 4;

/// Preferred capture sample rate.
const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Errors raised while acquiring the capture device. All of these are
/// terminal for the session and must reach the caller; the detection loop
/// never retries device setup on its own.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoDevice,
    #[error("no suitable mono f32 input format found")]
    NoSupportedConfig,
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Pull-based supplier of fixed-size time-domain frames.
///
/// Decouples the detection algorithm from any particular audio I/O
/// binding: the caller invokes [`FrameSource::next_frame`] on its own
/// schedule and may block until the capture side delivers data.
pub trait FrameSource {
    /// Sample rate of the delivered frames, in Hz.
    fn sample_rate(&self) -> u32;

    /// The next frame of samples in [-1, 1], or `None` once the source is
    /// exhausted or closed.
    fn next_frame(&mut self) -> Option<Vec<f32>>;
}

/// Microphone-backed [`FrameSource`] holding the cpal stream alive.
pub struct MicSource {
    // Dropping the stream stops capture; wrapped in Option so cleanup can
    // release it early and stay idempotent.
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl MicSource {
    /// Opens the default input device and starts streaming `frame_size`
    /// sample frames.
    pub fn open(frame_size: usize) -> Result<Self, CaptureError> {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let (stream, sample_rate) = start_capture(sender, frame_size)?;
        Ok(MicSource {
            stream: Some(stream),
            receiver,
            sample_rate,
        })
    }

    /// Stops capture and releases the device. Safe to call more than once;
    /// any frames still in flight are dropped unread.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("audio capture stopped");
        }
    }
}

impl FrameSource for MicSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_frame(&mut self) -> Option<Vec<f32>> {
        // After close() any frames still queued are ignored, not processed.
        self.stream.as_ref()?;
        self.receiver.recv().ok()
    }
}

/// Builds and starts the cpal input stream.
///
/// Returns the stream handle (capture stops when it drops) and the actual
/// device sample rate.
fn start_capture(
    sender: Sender<Vec<f32>>,
    frame_size: usize,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    info!(
        "using audio input device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".into())
    );

    let configs = device
        .supported_input_configs()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
        .collect::<Vec<_>>();
    let supported_config =
        find_supported_config(configs, TARGET_SAMPLE_RATE).ok_or(CaptureError::NoSupportedConfig)?;

    let sample_rate = supported_config
        .min_sample_rate()
        .max(cpal::SampleRate(TARGET_SAMPLE_RATE))
        .min(supported_config.max_sample_rate());
    let config: cpal::StreamConfig = supported_config.with_sample_rate(sample_rate).into();
    let sample_rate_val = sample_rate.0;

    info!("capture sample rate: {} Hz", sample_rate_val);

    let err_fn = |err| warn!("audio stream error: {err}");

    // Accumulates callback data until a full frame is available.
    let mut audio_buffer: Vec<f32> = Vec::with_capacity(frame_size * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                audio_buffer.extend_from_slice(data);
                while audio_buffer.len() >= frame_size {
                    let frame = audio_buffer[..frame_size].to_vec();
                    // Drop the frame if the detection loop is behind.
                    let _ = sender.try_send(frame);
                    audio_buffer.drain(..frame_size);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    Ok((stream, sample_rate_val))
}

/// Picks the mono f32 configuration whose rate range lies closest to the
/// target rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}
