use crate::error::PlaybackError;
use crate::playback::{AudioContext, AudioContextFactory};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, StreamTrait};
use ringbuf::HeapProd;
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::{FastFixedIn, Resampler};
use std::sync::mpsc;
use std::thread::JoinHandle;
use voice_tutor_utils as utils;

const OUTPUT_LATENCY_MS: usize = 1000;
const RESAMPLE_CHUNK_SIZE: usize = 100;

/// Opens [`NativeAudioContext`]s on the named output device, or the default.
pub struct NativeOutput {
    device_name: Option<String>,
}

impl NativeOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl AudioContextFactory for NativeOutput {
    fn open(&mut self, sample_rate: u32) -> Result<Box<dyn AudioContext>, PlaybackError> {
        let context = NativeAudioContext::open(self.device_name.clone(), sample_rate)?;
        Ok(Box::new(context))
    }
}

type Ready = Result<(HeapProd<f32>, u32), String>;

pub struct NativeAudioContext {
    sample_rate: u32,
    producer: HeapProd<f32>,
    resampler: Option<FastFixedIn<f32>>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl NativeAudioContext {
    /// Starts an output stream and returns once it is playing.
    /// `sample_rate` is the rate of the buffers that will be started on it.
    pub fn open(device_name: Option<String>, sample_rate: u32) -> Result<Self, PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Ready>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("tutor-audio-out".to_string())
            .spawn(move || {
                let stream = match build_output_stream(device_name) {
                    Ok((stream, producer, rate)) => {
                        if ready_tx.send(Ok((producer, rate))).is_err() {
                            return;
                        }
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                // Returns once the context closes or is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("output stream released");
            })
            .map_err(|e| PlaybackError::Unavailable(e.to_string()))?;

        let (producer, device_rate) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(PlaybackError::Unavailable(e));
            }
            Err(_) => {
                return Err(PlaybackError::Unavailable("output thread exited".to_string()));
            }
        };

        let resampler = if device_rate == sample_rate {
            None
        } else {
            let resampler = utils::resample::create_resampler(
                f64::from(sample_rate),
                f64::from(device_rate),
                RESAMPLE_CHUNK_SIZE,
            )
            .map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
            Some(resampler)
        };
        tracing::info!("output open: {}hz -> {}hz", sample_rate, device_rate);

        Ok(Self {
            sample_rate,
            producer,
            resampler,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn resample(&mut self, samples: Vec<f32>) -> Result<Vec<f32>, PlaybackError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples);
        };
        let mut resampled = Vec::with_capacity(samples.len() * 2);
        for chunk in utils::audio::split_for_chunks(&samples, resampler.input_frames_next()) {
            let output = resampler
                .process(&[chunk.as_slice()], None)
                .map_err(|e| PlaybackError::Failed(e.to_string()))?;
            if let Some(channel) = output.into_iter().next() {
                resampled.extend(channel);
            }
        }
        Ok(resampled)
    }
}

fn build_output_stream(
    device_name: Option<String>,
) -> anyhow::Result<(cpal::Stream, HeapProd<f32>, u32)> {
    let device = utils::device::get_or_default_output(device_name)?;
    let config = device.default_output_config()?;
    let config = StreamConfig {
        channels: config.channels(),
        sample_rate: config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let channel_count = usize::from(config.channels);
    let rate = config.sample_rate.0;

    let buffer = utils::resample::shared_buffer(rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (producer, mut consumer) = buffer.split();

    // Same sample on every channel; silence when the buffer runs dry.
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        for frame in data.chunks_mut(channel_count) {
            frame.fill(consumer.try_pop().unwrap_or(0.0));
        }
    };
    let stream = device.build_output_stream(
        &config,
        output_data_fn,
        |err| tracing::error!("an error occurred on output stream: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((stream, producer, rate))
}

impl AudioContext for NativeAudioContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_buffer(&mut self, samples: Vec<f32>) -> Result<(), PlaybackError> {
        let samples = self.resample(samples)?;
        let pushed = self.producer.push_slice(&samples);
        if pushed < samples.len() {
            tracing::warn!("output buffer full, dropped {} samples", samples.len() - pushed);
        }
        Ok(())
    }

    fn close(&mut self) {
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("output thread panicked");
            }
        }
    }
}

impl Drop for NativeAudioContext {
    fn drop(&mut self) {
        self.close();
    }
}
