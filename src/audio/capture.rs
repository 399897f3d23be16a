//! Real microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::source::AudioSource;
use crate::error::{ConnectFlowError, Result};
use crate::media::CaptureDevice;
use cpal::SampleRate;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Map a backend failure onto the capture taxonomy.
///
/// Backends report refused access only through their message text.
pub(crate) fn classify_device_error(message: String) -> ConnectFlowError {
    if message.contains("Permission denied") || message.contains("permission denied") {
        ConnectFlowError::PermissionDenied {
            device: CaptureDevice::Microphone,
            message,
        }
    } else {
        ConnectFlowError::DeviceUnavailable {
            device: CaptureDevice::Microphone,
            message,
        }
    }
}

/// List usable input devices, marking preferred ones with "\[recommended\]".
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _host = host;
    let devices = devices
        .map_err(|e| classify_device_error(format!("Failed to enumerate input devices: {}", e)))?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

fn find_input_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host.input_devices().map_err(|e| {
                classify_device_error(format!("Failed to enumerate devices: {}", e))
            })?;
            for device in devices {
                if let Ok(found) = device.name()
                    && found == name
                {
                    return Ok(device);
                }
            }
            return Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Microphone,
                message: format!("no input device named '{}'", name),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Microphone,
                message: "no default input device".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in the owning
/// source, from one thread at a time.
pub(crate) struct SendableStream(pub(crate) cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture through CPAL.
///
/// Uses the preferred rate when the device supports it natively, otherwise
/// the device's default configuration. Channels are mixed to mono and the
/// chosen rate is reported through [`AudioSource::sample_rate`]; nothing is
/// resampled.
pub struct CpalAudioSource {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl CpalAudioSource {
    /// Open the named input device, or the preferred default when `None`.
    pub fn new(device_name: Option<&str>, preferred_rate: u32) -> Result<Self> {
        let device = find_input_device(device_name)?;
        let config = match native_config_at(&device, preferred_rate) {
            Some(config) => config,
            None => device.default_input_config().map_err(|e| {
                classify_device_error(format!("Failed to query input config: {}", e))
            })?,
        };
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            "Microphone configured"
        );

        Ok(Self {
            device,
            config,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let channels = usize::from(self.config.channels().max(1));
        let stream_config: cpal::StreamConfig = self.config.clone().into();

        let failure = Arc::clone(&self.failure);
        let err_callback = move |err: cpal::StreamError| {
            tracing::warn!(error = %err, "Microphone stream error");
            if let Ok(mut slot) = failure.lock() {
                *slot = Some(err.to_string());
            }
        };

        let buffer = Arc::clone(&self.buffer);
        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_mono(&buffer, data.chunks_exact(channels), |s| s);
                },
                err_callback,
                None,
            ),
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push_mono(&buffer, data.chunks_exact(channels), |s| {
                        f32::from(s) / 32768.0
                    });
                },
                err_callback,
                None,
            ),
            fmt => {
                return Err(ConnectFlowError::DeviceUnavailable {
                    device: CaptureDevice::Microphone,
                    message: format!(
                        "Unsupported native sample format: {:?}. \
                         Try selecting another device in [audio] device.",
                        fmt
                    ),
                });
            }
        };

        stream.map_err(|e| classify_device_error(format!("Failed to build input stream: {}", e)))
    }
}

/// A supported f32 or i16 configuration running at `rate`, if any.
fn native_config_at(device: &cpal::Device, rate: u32) -> Option<cpal::SupportedStreamConfig> {
    use cpal::SampleFormat;

    let rate = SampleRate(rate);
    device
        .supported_input_configs()
        .ok()?
        .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .map(|c| c.with_sample_rate(rate))
}

fn push_mono<'a, T, I, F>(buffer: &Mutex<Vec<f32>>, frames: I, to_f32: F)
where
    T: Copy + 'a,
    I: Iterator<Item = &'a [T]>,
    F: Fn(T) -> f32,
{
    if let Ok(mut buf) = buffer.lock() {
        for frame in frames {
            let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
            buf.push(sum / frame.len() as f32);
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let mut guard = self.stream.lock().map_err(|e| ConnectFlowError::DeviceUnavailable {
            device: CaptureDevice::Microphone,
            message: format!("Failed to lock stream: {}", e),
        })?;
        if guard.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| classify_device_error(format!("Failed to start input stream: {}", e)))?;
        tracing::debug!(
            channels = self.config.channels(),
            sample_rate = self.config.sample_rate().0,
            "Microphone stream started"
        );
        *guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut guard = self.stream.lock().map_err(|e| ConnectFlowError::DeviceUnavailable {
            device: CaptureDevice::Microphone,
            message: format!("Failed to lock stream: {}", e),
        })?;
        if let Some(stream) = guard.take() {
            stream
                .0
                .pause()
                .map_err(|e| classify_device_error(format!("Failed to stop input stream: {}", e)))?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if let Ok(mut failure) = self.failure.lock()
            && let Some(message) = failure.take()
        {
            return Err(classify_device_error(message));
        }

        let mut buffer = self.buffer.lock().map_err(|e| ConnectFlowError::DeviceUnavailable {
            device: CaptureDevice::Microphone,
            message: format!("Failed to lock audio buffer: {}", e),
        })?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }
}
