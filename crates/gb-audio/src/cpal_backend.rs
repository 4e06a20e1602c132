//! CPAL-based audio output backend.
//!
//! The render thread pushes frames into a `ringbuf` SPSC queue; the device
//! callback pops them and converts to `f32`. An underrun plays silence.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use gb_engine::Frame;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default device. The queue holds about `latency_ms` of audio.
    pub fn new(latency_ms: u32) -> Result<(Self, HeapCons<Frame>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // The callback assumes 2-channel interleaving
        config.channels = 2;

        let buffer_size = (config.sample_rate.0 as usize * latency_ms.max(1) as usize / 1000).max(256);
        let (producer, consumer) = HeapRb::<Frame>::new(buffer_size).split();
        log::info!(
            "audio device {:?} at {} Hz, {} frame queue",
            device.name().unwrap_or_default(),
            config.sample_rate.0,
            buffer_size
        );

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            running: Arc::new(AtomicBool::new(false)),
        };

        Ok((output, consumer))
    }

    /// Build the stream that drains `consumer`. Call `start` to hear it.
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let running = self.running.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(channels) {
                        let frame = consumer.try_pop().unwrap_or_default();
                        let left = frame.left as f32 / 32768.0;
                        let right = frame.right as f32 / 32768.0;
                        for (i, sample) in chunk.iter_mut().enumerate() {
                            *sample = match i {
                                0 => left,
                                1 => right,
                                _ => 0.0,
                            };
                        }
                    }
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    /// Free space in the queue, in frames.
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Write a single frame, spinning until the ring buffer has room.
    pub fn write_spin(&mut self, frame: Frame) {
        while self.producer.try_push(frame).is_err() {
            std::hint::spin_loop();
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        self.producer.push_slice(frames)
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
