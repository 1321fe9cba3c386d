use crate::capture::{FrameSink, MicrophoneCapture};
use crate::error::CaptureError;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use rubato::Resampler;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread::JoinHandle;
use voice_tutor_utils as utils;

const INPUT_CHUNK_SIZE: usize = 1024;

/// Streams the named input device, or the default, as mono samples.
pub struct NativeMicrophone {
    device_name: Option<String>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl NativeMicrophone {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            shutdown: None,
            thread: None,
        }
    }
}

fn build_input_stream(
    device_name: Option<String>,
    target_rate: u32,
    frames: FrameSink,
) -> Result<cpal::Stream, CaptureError> {
    let device = utils::device::get_or_default_input(device_name)
        .map_err(|e| CaptureError::Failed(e.to_string()))?;
    let config = device
        .default_input_config()
        .map_err(|e| CaptureError::Failed(e.to_string()))?;
    let config = StreamConfig {
        channels: config.channels(),
        sample_rate: config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let channel_count = usize::from(config.channels);
    let device_rate = config.sample_rate.0;

    let mut resampler = if device_rate == target_rate {
        None
    } else {
        let resampler = utils::resample::create_resampler(
            f64::from(device_rate),
            f64::from(target_rate),
            INPUT_CHUNK_SIZE,
        )
        .map_err(|e| CaptureError::Failed(e.to_string()))?;
        Some(resampler)
    };
    let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        buffer.extend(
            data.chunks(channel_count)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
        while buffer.len() >= INPUT_CHUNK_SIZE {
            let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
            let samples = match resampler.as_mut() {
                None => chunk,
                Some(resampler) => match resampler.process(&[chunk.as_slice()], None) {
                    Ok(mut output) => output.pop().unwrap_or_default(),
                    Err(e) => {
                        tracing::error!("failed to resample input: {}", e);
                        continue;
                    }
                },
            };
            if let Err(e) = frames.try_send(samples) {
                tracing::warn!("dropping microphone samples: {}", e);
            }
        }
    };

    let stream = device
        .build_input_stream(
            &config,
            input_data_fn,
            |err| tracing::error!("an error occurred on input stream: {}", err),
            None,
        )
        .map_err(|e| CaptureError::Failed(e.to_string()))?;
    stream
        .play()
        .map_err(|e| CaptureError::Failed(e.to_string()))?;
    tracing::info!("input open: {}hz -> {}hz", device_rate, target_rate);
    Ok(stream)
}

impl MicrophoneCapture for NativeMicrophone {
    fn start(&mut self, sample_rate: u32, frames: FrameSink) -> Result<(), CaptureError> {
        self.stop();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("tutor-audio-in".to_string())
            .spawn(move || {
                let stream = match build_input_stream(device_name, sample_rate, frames) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("input stream released");
            })
            .map_err(|e| CaptureError::Failed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.shutdown = Some(shutdown_tx);
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Failed("input thread exited".to_string())),
        }
    }

    fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("input thread panicked");
            }
        }
    }
}

impl Drop for NativeMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}
