use crate::defaults;
use crate::error::{ConnectFlowError, Result};
use crate::transcript::MarkerPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub agent: AgentConfig,
    pub transcript: TranscriptConfig,
}

/// Microphone capture and agent playback
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub window_size: usize,
    pub poll_interval_ms: u64,
}

/// Still-image sampling in video mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoConfig {
    pub frame_rate: u32,
    pub jpeg_quality: f32,
    /// Image served as the camera track.
    pub still_image: Option<PathBuf>,
}

/// Remote agent endpoint and session setup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub address: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub sign_instruction: String,
    pub connect_timeout_ms: u64,
}

/// Speaker attribution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptConfig {
    pub sign_marker: String,
    pub marker_policy: MarkerPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            input_sample_rate: defaults::INPUT_SAMPLE_RATE,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            window_size: defaults::CAPTURE_WINDOW_SAMPLES,
            poll_interval_ms: defaults::CAPTURE_POLL_INTERVAL_MS,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_rate: defaults::VIDEO_FRAME_RATE,
            jpeg_quality: defaults::JPEG_QUALITY,
            still_image: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: defaults::AGENT_ADDRESS.to_string(),
            model: defaults::MODEL.to_string(),
            voice: defaults::VOICE.to_string(),
            system_instruction: defaults::SYSTEM_INSTRUCTION.to_string(),
            sign_instruction: defaults::SIGN_INSTRUCTION.to_string(),
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            sign_marker: defaults::SIGN_MARKER.to_string(),
            marker_policy: MarkerPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConnectFlowError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConnectFlowError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ConnectFlowError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CONNECTFLOW_AGENT_ADDRESS → agent.address
    /// - CONNECTFLOW_AUDIO_DEVICE → audio.device
    /// - CONNECTFLOW_VOICE → agent.voice
    /// - CONNECTFLOW_MODEL → agent.model
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(address) = std::env::var("CONNECTFLOW_AGENT_ADDRESS")
            && !address.is_empty()
        {
            self.agent.address = address;
        }

        if let Ok(device) = std::env::var("CONNECTFLOW_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(voice) = std::env::var("CONNECTFLOW_VOICE")
            && !voice.is_empty()
        {
            self.agent.voice = voice;
        }

        if let Ok(model) = std::env::var("CONNECTFLOW_MODEL")
            && !model.is_empty()
        {
            self.agent.model = model;
        }

        self
    }

    /// Reject values the session engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> Result<()> {
            Err(ConnectFlowError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        }

        if self.audio.input_sample_rate == 0 {
            return invalid("audio.input_sample_rate", "must be positive");
        }
        if self.audio.output_sample_rate == 0 {
            return invalid("audio.output_sample_rate", "must be positive");
        }
        if self.audio.window_size == 0 {
            return invalid("audio.window_size", "must be positive");
        }
        if self.video.frame_rate == 0 {
            return invalid("video.frame_rate", "must be positive");
        }
        if !(self.video.jpeg_quality > 0.0 && self.video.jpeg_quality <= 1.0) {
            return invalid("video.jpeg_quality", "must be in (0.0, 1.0]");
        }
        if self.agent.address.trim().is_empty() {
            return invalid("agent.address", "must not be empty");
        }
        if self.agent.connect_timeout_ms == 0 {
            return invalid("agent.connect_timeout_ms", "must be positive");
        }
        if self.transcript.sign_marker.is_empty() {
            return invalid("transcript.sign_marker", "must not be empty");
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/connectflow/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            ConnectFlowError::Other("Could not determine config directory".to_string())
        })?;
        Ok(dir.join("connectflow").join("config.toml"))
    }

    /// Serialize to TOML for `config show`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConnectFlowError::ConfigParse {
            message: e.to_string(),
        })
    }
}
