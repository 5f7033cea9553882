//! Real-time audio output
//!
//! Opt-in behind the `playback` feature. [`OutputDevice`] opens the system's
//! default output through cpal and drives the engine's mixer from the
//! device's data callback: one pass per buffer, one lock acquisition per
//! pass. The callback mixes at whatever layout the device negotiated; clips
//! are not resampled, so a 44.1 kHz clip on a 48 kHz device plays slightly
//! fast (use the voice pitch to compensate if it matters).

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, StreamConfig};
use parking_lot::Mutex;

use crate::engine::{mixer, AudioEngine, EngineState};
use crate::{Error, Result};

/// Handle to a running output stream. Drop it to stop audio.
pub struct OutputDevice {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl OutputDevice {
    /// Open the default output device and start streaming from `engine`.
    ///
    /// Fatal errors (no device, stream build/start failure) are surfaced
    /// here once and not retried.
    pub fn open(engine: &AudioEngine) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(Error::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::StreamBuild(e.to_string()))?;
        let config: StreamConfig = supported.clone().into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        log::info!(
            "audio output: {} ({} ch @ {} Hz, {:?})",
            device_name,
            channels,
            sample_rate,
            supported.sample_format()
        );

        let state = engine.shared_state();
        let err_fn = |err: cpal::StreamError| log::error!("audio stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |out: &mut [i16], _| {
                    let mut state = state.lock();
                    mixer::mix_pass(&mut state, out, channels, sample_rate);
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => {
                let mut scratch: Vec<i16> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |out: &mut [u16], _| {
                        mix_to_scratch(&state, &mut scratch, out.len(), channels, sample_rate);
                        for (o, s) in out.iter_mut().zip(&scratch) {
                            *o = (i32::from(*s) + 32_768) as u16;
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::F32 => {
                let mut scratch: Vec<i16> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |out: &mut [f32], _| {
                        mix_to_scratch(&state, &mut scratch, out.len(), channels, sample_rate);
                        for (o, s) in out.iter_mut().zip(&scratch) {
                            *o = (*s).to_sample::<f32>();
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(Error::StreamBuild(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| Error::StreamBuild(e.to_string()))?;

        stream.play().map_err(|e| Error::StreamPlay(e.to_string()))?;

        Ok(OutputDevice {
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    /// Sample rate negotiated with the device.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count negotiated with the device.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Run one mixer pass into the reusable scratch buffer.
///
/// The scratch only reallocates when the device changes its buffer size, so
/// steady-state callbacks stay allocation-free.
fn mix_to_scratch(
    state: &Arc<Mutex<EngineState>>,
    scratch: &mut Vec<i16>,
    len: usize,
    channels: u16,
    sample_rate: u32,
) {
    if scratch.len() != len {
        scratch.resize(len, 0);
    }
    let mut state = state.lock();
    mixer::mix_pass(&mut state, scratch, channels, sample_rate);
}
