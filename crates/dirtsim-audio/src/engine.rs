//! The audio engine: device management and the render callback.
//!
//! The callback thread owns the voice pool and the ring consumer; nothing
//! in the render path locks or allocates. Control values cross over via
//! atomics, and the active-note snapshot is published under a `try_lock`
//! so a contended reader can never stall rendering.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use dirtproto::api::audio::{ActiveNote, AudioStatus, NoteOn};
use thiserror::Error;
use tracing::{info, warn};

use crate::commands::{command_channel, AudioCommand, CommandSender};
use crate::pool::VoicePool;

#[derive(Debug, Clone)]
pub struct AudioEngineConfig {
    /// Open exactly this device when set; otherwise probe.
    pub device_name: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_frames: u32,
}

impl Default for AudioEngineConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            sample_rate: 48_000,
            channels: 2,
            buffer_frames: 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("Audio device '{device}' open failed: {message}")]
    OpenFailed { device: String, message: String },
    #[error("Unsupported audio sample format: {0}")]
    UnsupportedFormat(String),
}

/// State shared between the callback and the service edge.
#[derive(Debug)]
pub struct EngineShared {
    master_volume_percent: AtomicI32,
    next_note_id: AtomicU32,
    sample_rate: AtomicU32,
    device_name: Mutex<String>,
    status: Mutex<Vec<ActiveNote>>,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            master_volume_percent: AtomicI32::new(100),
            next_note_id: AtomicU32::new(1),
            sample_rate: AtomicU32::new(0),
            device_name: Mutex::new(String::new()),
            status: Mutex::new(Vec::new()),
        }
    }
}

/// Owns the voice pool; lives on the callback (or dummy) thread.
pub struct Renderer {
    pool: VoicePool,
    consumer: rtrb::Consumer<AudioCommand>,
    shared: Arc<EngineShared>,
    scratch: Vec<f32>,
}

impl Renderer {
    pub fn new(
        consumer: rtrb::Consumer<AudioCommand>,
        shared: Arc<EngineShared>,
        sample_rate: f64,
        max_samples: usize,
    ) -> Self {
        Self {
            pool: VoicePool::new(sample_rate),
            consumer,
            shared,
            scratch: vec![0.0; max_samples],
        }
    }

    fn drain_commands(&mut self) {
        // Bounded work: the ring holds at most its capacity.
        while let Ok(command) = self.consumer.pop() {
            match command {
                AudioCommand::NoteOn(params) => self.pool.note_on(&params),
                AudioCommand::NoteOff { note_id } => self.pool.note_off(note_id),
            }
        }
    }

    /// Fill an interleaved f32 buffer.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.drain_commands();
        let gain =
            self.shared.master_volume_percent.load(Ordering::Relaxed) as f32 / 100.0;
        let channels = channels.max(1);

        for frame in out.chunks_mut(channels) {
            let sample = (self.pool.render_sample() as f32).clamp(-1.0, 1.0) * gain;
            for channel in frame.iter_mut() {
                *channel = sample;
            }
        }

        self.publish_status();
    }

    /// Fill an interleaved s16 buffer through the internal scratch.
    pub fn render_i16(&mut self, out: &mut [i16], channels: usize) {
        if out.len() > self.scratch.len() {
            // Device asked for more than we sized for; emit silence rather
            // than allocate on the callback thread.
            out.fill(0);
            return;
        }
        let mut buffer = std::mem::take(&mut self.scratch);
        self.render(&mut buffer[..out.len()], channels);
        for (dst, src) in out.iter_mut().zip(buffer.iter()) {
            *dst = (src.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        }
        self.scratch = buffer;
    }

    fn publish_status(&self) {
        if let Ok(mut status) = self.shared.status.try_lock() {
            *status = self.pool.active_notes();
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.pool.set_sample_rate(sample_rate);
    }
}

enum Backend {
    Cpal(cpal::Stream),
    Dummy {
        stop: Arc<AtomicBool>,
        join: JoinHandle<()>,
    },
}

/// Cloneable service-edge handle: everything WebSocket handlers need.
#[derive(Clone)]
pub struct AudioHandle {
    sender: CommandSender,
    shared: Arc<EngineShared>,
}

impl AudioHandle {
    /// Enqueue a NoteOn, allocating a fresh id when the caller passed 0.
    /// Returns the effective note id.
    pub fn note_on(&self, mut params: NoteOn) -> u32 {
        if params.note_id == 0 {
            params.note_id = self.shared.next_note_id.fetch_add(1, Ordering::Relaxed);
        }
        let note_id = params.note_id;
        self.sender.send(AudioCommand::NoteOn(params));
        note_id
    }

    pub fn note_off(&self, note_id: u32) {
        self.sender.send(AudioCommand::NoteOff { note_id });
    }

    pub fn set_master_volume(&self, volume_percent: i32) {
        self.shared
            .master_volume_percent
            .store(volume_percent.clamp(0, 100), Ordering::Relaxed);
    }

    pub fn status(&self) -> AudioStatus {
        AudioStatus {
            active_notes: self.shared.status.lock().expect("status lock").clone(),
            sample_rate: self.shared.sample_rate.load(Ordering::Relaxed) as f64,
            device_name: self.shared.device_name.lock().expect("name lock").clone(),
            master_volume_percent: self.shared.master_volume_percent.load(Ordering::Relaxed),
        }
    }
}

/// The engine proper. Not `Send`: the cpal stream stays on the thread that
/// created it. Service edges work through [`AudioHandle`].
pub struct AudioEngine {
    handle: AudioHandle,
    backend: Backend,
    bridge: Option<JoinHandle<()>>,
    sender_keepalive: Option<CommandSender>,
}

impl AudioEngine {
    /// Open a device per the configured policy and start rendering.
    pub fn start(config: AudioEngineConfig) -> Result<Self, AudioEngineError> {
        let shared = Arc::new(EngineShared::new());
        let (sender, consumer, bridge) = command_channel();

        let max_samples = (config.buffer_frames as usize).max(128) * config.channels.max(1) as usize * 4;
        let mut renderer = Renderer::new(
            consumer,
            Arc::clone(&shared),
            config.sample_rate as f64,
            max_samples,
        );

        let backend = match open_backend(&config, &mut renderer, &shared) {
            Ok(backend) => backend,
            Err(err) => {
                // Tear down: the bridge ends once the senders drop.
                drop(sender);
                let _ = bridge.join();
                return Err(err);
            }
        };

        let handle = AudioHandle {
            sender: sender.clone(),
            shared,
        };

        Ok(Self {
            handle,
            backend,
            bridge: Some(bridge),
            sender_keepalive: Some(sender),
        })
    }

    pub fn handle(&self) -> AudioHandle {
        self.handle.clone()
    }

    /// Stop rendering, close the device and join owned threads.
    pub fn stop(&mut self) {
        match std::mem::replace(
            &mut self.backend,
            Backend::Dummy {
                stop: Arc::new(AtomicBool::new(true)),
                join: std::thread::spawn(|| {}),
            },
        ) {
            Backend::Cpal(stream) => drop(stream),
            Backend::Dummy { stop, join } => {
                stop.store(true, Ordering::Release);
                let _ = join.join();
            }
        }
        self.sender_keepalive = None;
        if let Some(bridge) = self.bridge.take() {
            let _ = bridge.join();
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Enumerate output device names in probe order (USB-named first).
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names: Vec<String> = host
        .output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default();
    // Stable partition: USB devices keep their relative order up front.
    names.sort_by_key(|name| !name.to_lowercase().contains("usb"));
    names
}

fn open_backend(
    config: &AudioEngineConfig,
    renderer: &mut Renderer,
    shared: &Arc<EngineShared>,
) -> Result<Backend, AudioEngineError> {
    let host = cpal::default_host();

    // Pick a candidate device first; the renderer is only committed to a
    // stream once.
    let picked: Option<(String, cpal::Device, cpal::SupportedStreamConfig)> =
        if let Some(requested) = &config.device_name {
            let device = host
                .output_devices()
                .ok()
                .and_then(|mut devices| {
                    devices.find(|d| d.name().map(|n| &n == requested).unwrap_or(false))
                })
                .ok_or_else(|| AudioEngineError::OpenFailed {
                    device: requested.clone(),
                    message: "device not found".into(),
                })?;
            let supported =
                device
                    .default_output_config()
                    .map_err(|e| AudioEngineError::OpenFailed {
                        device: requested.clone(),
                        message: e.to_string(),
                    })?;
            match supported.sample_format() {
                cpal::SampleFormat::F32 | cpal::SampleFormat::I16 => {}
                other => {
                    return Err(AudioEngineError::UnsupportedFormat(format!("{other:?}")))
                }
            }
            Some((requested.clone(), device, supported))
        } else {
            let devices: Vec<cpal::Device> = host
                .output_devices()
                .map(|devices| devices.collect())
                .unwrap_or_default();
            let mut ordered: Vec<(String, cpal::Device)> = devices
                .into_iter()
                .filter_map(|d| d.name().ok().map(|n| (n, d)))
                .collect();
            // Stable: USB devices keep their relative order up front.
            ordered.sort_by_key(|(name, _)| !name.to_lowercase().contains("usb"));

            if ordered.is_empty() {
                warn!(target: "audio", "No audio output devices reported");
            } else {
                info!(
                    target: "audio",
                    order = %ordered
                        .iter()
                        .map(|(n, _)| n.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    "Audio device probe order"
                );
            }

            let mut found = None;
            for (name, device) in ordered {
                match device.default_output_config() {
                    Ok(supported) => match supported.sample_format() {
                        cpal::SampleFormat::F32 | cpal::SampleFormat::I16 => {
                            found = Some((name, device, supported));
                            break;
                        }
                        other => warn!(
                            target: "audio",
                            device = %name,
                            "Skipping device with unsupported format {other:?}"
                        ),
                    },
                    Err(e) => {
                        warn!(target: "audio", device = %name, "Config query failed: {e}")
                    }
                }
            }
            found
        };

    let Some((name, device, supported)) = picked else {
        // Headless fallback: consume frames at the configured rate so the
        // engine still drains commands and reports status.
        warn!(target: "audio", "Audio device open failed. Falling back to dummy backend.");
        let taken = take_renderer(renderer, shared);
        return Ok(start_dummy(config, taken, shared));
    };

    let taken = take_renderer(renderer, shared);
    open_stream(&device, &name, config, taken, shared)
}

/// Swap the caller's renderer out, leaving an inert placeholder behind.
fn take_renderer(renderer: &mut Renderer, shared: &Arc<EngineShared>) -> Renderer {
    let (_, consumer) = rtrb::RingBuffer::new(1);
    std::mem::replace(
        renderer,
        Renderer::new(consumer, Arc::clone(shared), 48_000.0, 0),
    )
}

fn start_dummy(
    config: &AudioEngineConfig,
    mut renderer: Renderer,
    shared: &Arc<EngineShared>,
) -> Backend {
    let sample_rate = config.sample_rate.max(8_000);
    let channels = config.channels.max(1) as usize;
    let frames = config.buffer_frames.max(64) as usize;

    shared.sample_rate.store(sample_rate, Ordering::Relaxed);
    *shared.device_name.lock().expect("name lock") = "dummy".into();
    renderer.set_sample_rate(sample_rate as f64);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let period = Duration::from_secs_f64(frames as f64 / sample_rate as f64);

    let join = std::thread::Builder::new()
        .name("audio-dummy".into())
        .spawn(move || {
            let mut buffer = vec![0.0f32; frames * channels];
            while !stop_flag.load(Ordering::Acquire) {
                renderer.render(&mut buffer, channels);
                std::thread::sleep(period);
            }
        })
        .expect("spawn dummy audio backend");

    info!(target: "audio", "Audio engine started on dummy backend");
    Backend::Dummy { stop, join }
}

fn open_stream(
    device: &cpal::Device,
    name: &str,
    config: &AudioEngineConfig,
    mut renderer: Renderer,
    shared: &Arc<EngineShared>,
) -> Result<Backend, AudioEngineError> {
    let supported = device
        .default_output_config()
        .map_err(|e| AudioEngineError::OpenFailed {
            device: name.to_string(),
            message: e.to_string(),
        })?;

    let sample_format = supported.sample_format();
    let stream_config = cpal::StreamConfig {
        channels: supported.channels().max(1).min(config.channels.max(1)),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = stream_config.channels as usize;
    let actual_rate = stream_config.sample_rate.0;

    shared.sample_rate.store(actual_rate, Ordering::Relaxed);
    *shared.device_name.lock().expect("name lock") = name.to_string();
    renderer.set_sample_rate(actual_rate as f64);

    let err_fn = |e| warn!(target: "audio", "Stream error: {e}");

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| renderer.render(data, channels),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| renderer.render_i16(data, channels),
            err_fn,
            None,
        ),
        other => return Err(AudioEngineError::UnsupportedFormat(format!("{other:?}"))),
    };

    let stream = stream.map_err(|e| AudioEngineError::OpenFailed {
        device: name.to_string(),
        message: e.to_string(),
    })?;

    stream.play().map_err(|e| AudioEngineError::OpenFailed {
        device: name.to_string(),
        message: e.to_string(),
    })?;

    info!(
        target: "audio",
        device = name,
        sample_rate = actual_rate,
        channels,
        format = ?sample_format,
        "Audio engine started"
    );
    Ok(Backend::Cpal(stream))
}
