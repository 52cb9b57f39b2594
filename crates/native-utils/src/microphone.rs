//! cpal-backed microphone for the recording lifecycle.
//!
//! A cpal stream cannot move between threads on every platform, so each
//! acquisition gets its own thread that builds the stream, keeps it alive and
//! drops it when told to stop. The callback pushes mono chunks into a shared
//! buffer that `finalize` turns into one WAV segment.

use crate::{device, wav};
use anyhow::Context;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use pitch_core::recording::{AudioCapture, AudioSegment, RecordingError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use tokio::runtime::RuntimeFlavor;

/// Chunks captured so far plus the rate they were captured at.
#[derive(Debug, Default)]
struct CaptureBuffer {
    chunks: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl CaptureBuffer {
    fn take_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.chunks).concat()
    }
}

struct StreamWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamWorker {
    fn stop(self) {
        // the thread also exits if the sender is dropped
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            tracing::error!("Microphone thread panicked");
        }
    }
}

pub struct CpalMicrophone {
    device_name: Option<String>,
    buffer: Arc<Mutex<CaptureBuffer>>,
    paused: Arc<AtomicBool>,
    worker: Option<StreamWorker>,
}

impl CpalMicrophone {
    /// `device_name` of `None` uses the default input device.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            buffer: Arc::new(Mutex::new(CaptureBuffer::default())),
            paused: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            tracing::info!("Microphone released");
        }
    }
}

/// Builds and plays the input stream on the current thread. Returns the stream
/// so the caller controls how long it lives.
fn open_stream(
    device_name: Option<&str>,
    buffer: Arc<Mutex<CaptureBuffer>>,
    paused: Arc<AtomicBool>,
) -> anyhow::Result<cpal::Stream> {
    let input = device::get_or_default_input(device_name)?;
    tracing::info!("Using input device: {:?}", input.name()?);

    let input_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let input_config: cpal::StreamConfig = input_config.into();
    let input_channel_count = input_config.channels as usize;
    tracing::info!("Input stream config: {:?}", &input_config);

    if let Ok(mut guard) = buffer.lock() {
        guard.sample_rate = input_config.sample_rate.0;
    }

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if paused.load(Ordering::Relaxed) {
            return;
        }
        let audio = if input_channel_count > 1 {
            data.chunks(input_channel_count)
                .map(|c| c.iter().sum::<f32>() / input_channel_count as f32)
                .collect::<Vec<f32>>()
        } else {
            data.to_vec()
        };
        match buffer.lock() {
            Ok(mut guard) => guard.chunks.push(audio),
            Err(_) => tracing::warn!("Capture buffer poisoned, dropping audio chunk"),
        }
    };

    let input_stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;
    input_stream.play()?;
    Ok(input_stream)
}

/// Blocks until the stream thread reports whether the device opened. On a
/// multi-threaded runtime the wait goes through `block_in_place` so other
/// tasks on this worker keep running while the device opens.
fn wait_for_stream<T>(ready_rx: &mpsc::Receiver<T>) -> Result<T, mpsc::RecvError> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| ready_rx.recv())
        }
        _ => ready_rx.recv(),
    }
}

#[async_trait]
impl AudioCapture for CpalMicrophone {
    fn acquire(&mut self) -> Result<(), RecordingError> {
        if self.worker.is_some() {
            return Ok(());
        }
        if let Ok(mut guard) = self.buffer.lock() {
            guard.chunks.clear();
        }
        self.paused.store(false, Ordering::Relaxed);

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let buffer = self.buffer.clone();
        let paused = self.paused.clone();

        let handle = std::thread::Builder::new()
            .name("microphone".into())
            .spawn(move || {
                match open_stream(device_name.as_deref(), buffer, paused) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // blocks until stop is requested or the sender is dropped
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{e:#}")));
                    }
                }
            })
            .map_err(|e| RecordingError::Device(format!("Failed to spawn microphone thread: {e}")))?;

        match wait_for_stream(&ready_rx) {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker { stop_tx, handle });
                tracing::info!("Microphone acquired");
                Ok(())
            }
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(RecordingError::Device(reason))
            }
            Err(_) => {
                let _ = handle.join();
                Err(RecordingError::Device(
                    "Microphone thread exited before opening the stream".into(),
                ))
            }
        }
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    async fn finalize(&mut self) -> anyhow::Result<AudioSegment> {
        let worker = self.worker.take();
        let buffer = self.buffer.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(worker) = worker {
                worker.stop();
            }
            let mut guard = buffer
                .lock()
                .map_err(|_| anyhow::anyhow!("Capture buffer poisoned"))?;
            let sample_rate = guard.sample_rate;
            let samples = guard.take_samples();
            tracing::info!("Finalizing {} samples at {} Hz", samples.len(), sample_rate);
            let bytes = wav::encode_wav(&samples, sample_rate, 1)?;
            Ok(AudioSegment::wav(bytes))
        })
        .await
        .context("Finalize task failed")?
    }

    fn release(&mut self) {
        self.stop_worker();
        if let Ok(mut guard) = self.buffer.lock() {
            guard.chunks.clear();
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
