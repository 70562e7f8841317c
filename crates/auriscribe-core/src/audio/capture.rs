//! Real-time microphone capture, resampled to 16kHz mono.
//!
//! Grounded in the teacher's `audio::recorder::stream::build_stream` generic
//! cpal callback, generalized from "collect samples into a buffer" to
//! "deliver fixed-size 16kHz frames to a callback", matching the original
//! `audio.c`'s `AUDIO_FRAME_SAMPLES = 640` (40ms at 16kHz) framing.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler};

use super::devices::init_platform;
use super::error::AudioError;

/// Frame size delivered to the capture callback: 640 samples at 16kHz (40ms),
/// matching the original capture frame size.
pub const FRAME_SAMPLES: usize = 640;
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

type FrameCallback = Box<dyn FnMut(&[f32]) + Send>;

struct Resampling {
    resampler: Option<FftFixedIn<f32>>,
    /// Samples awaiting a full resampler input chunk, in device-native rate.
    pending_in: Vec<f32>,
    /// Resampled 16kHz samples awaiting a full FRAME_SAMPLES frame.
    pending_out: Vec<f32>,
    chunk_in: usize,
}

impl Resampling {
    fn new(device_rate: u32) -> Result<Self, AudioError> {
        if device_rate == TARGET_SAMPLE_RATE {
            return Ok(Self {
                resampler: None,
                pending_in: Vec::new(),
                pending_out: Vec::new(),
                chunk_in: 0,
            });
        }
        let chunk_in = (device_rate as usize / 10).max(1); // ~100ms input chunks
        let resampler = FftFixedIn::<f32>::new(
            device_rate as usize,
            TARGET_SAMPLE_RATE as usize,
            chunk_in,
            2,
            1,
        )
        .map_err(|e| AudioError::ResamplingError(e.to_string()))?;
        Ok(Self {
            resampler: Some(resampler),
            pending_in: Vec::new(),
            pending_out: Vec::new(),
            chunk_in,
        })
    }

    /// Feed device-native-rate mono samples, draining complete 16kHz frames
    /// into `out_frames` as they become available.
    fn push(&mut self, samples: &[f32], out_frames: &mut Vec<Vec<f32>>) {
        let Some(resampler) = self.resampler.as_mut() else {
            self.pending_out.extend_from_slice(samples);
            while self.pending_out.len() >= FRAME_SAMPLES {
                out_frames.push(self.pending_out.drain(..FRAME_SAMPLES).collect());
            }
            return;
        };

        self.pending_in.extend_from_slice(samples);
        while self.pending_in.len() >= self.chunk_in {
            let chunk: Vec<f32> = self.pending_in.drain(..self.chunk_in).collect();
            match resampler.process(&[chunk], None) {
                Ok(resampled) => self.pending_out.extend_from_slice(&resampled[0]),
                Err(_) => continue,
            }
            while self.pending_out.len() >= FRAME_SAMPLES {
                out_frames.push(self.pending_out.drain(..FRAME_SAMPLES).collect());
            }
        }
    }
}

/// Owns the cpal input stream for the lifetime of a recording session.
/// `start`/`stop` are idempotent: calling `stop` without a prior `start`, or
/// `start` twice, is a no-op on the second call rather than an error.
pub struct AudioCapture {
    stream: Option<Stream>,
}

impl AudioCapture {
    pub fn new() -> Self {
        init_platform();
        Self { stream: None }
    }

    /// Start capturing from `device_name` (or the default input device if
    /// `None`), invoking `on_frame` with successive 16kHz mono f32 frames of
    /// `FRAME_SAMPLES` samples each. Returns without side effects if a
    /// device can't be opened.
    pub fn start(
        &mut self,
        device_name: Option<&str>,
        mut on_frame: impl FnMut(&[f32]) + Send + 'static,
    ) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::device_not_found(name))?,
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::device_not_found("default"))?,
        };

        let config = device.default_input_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.clone().into();

        let resampling = Arc::new(Mutex::new(Resampling::new(sample_rate)?));
        let cb: Arc<Mutex<FrameCallback>> = Arc::new(Mutex::new(Box::new(move |frame: &[f32]| {
            on_frame(frame)
        })));

        let stream = build_stream(&device, &stream_config, config.sample_format(), channels, resampling, cb)?;
        stream.play().map_err(AudioError::from)?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop capturing. Idempotent.
    pub fn stop(&mut self) {
        self.stream = None;
    }

    pub fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: cpal::SampleFormat,
    channels: usize,
    resampling: Arc<Mutex<Resampling>>,
    cb: Arc<Mutex<FrameCallback>>,
) -> Result<Stream, AudioError> {
    let err_fn = |err| crate::error!("Error in audio stream: {err}");

    macro_rules! build {
        ($t:ty) => {
            device.build_input_stream(
                config,
                move |data: &[$t], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = if channels <= 1 {
                        data.iter().map(|&s| cpal::Sample::from_sample(s)).collect()
                    } else {
                        data.chunks(channels)
                            .map(|frame| {
                                let sum: f32 = frame
                                    .iter()
                                    .map(|&s| cpal::Sample::from_sample::<$t>(s))
                                    .sum();
                                sum / channels as f32
                            })
                            .collect()
                    };

                    let mut frames = Vec::new();
                    resampling.lock().unwrap().push(&mono, &mut frames);
                    let mut cb = cb.lock().unwrap();
                    for frame in &frames {
                        cb(frame);
                    }
                },
                err_fn,
                None,
            )
        };
    }

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build!(f32),
        cpal::SampleFormat::I16 => build!(i16),
        cpal::SampleFormat::U16 => build!(u16),
        other => return Err(AudioError::InvalidConfig(format!("unsupported sample format: {other:?}"))),
    }?;
    Ok(stream)
}
