//! Sign-language attribution marker.
//!
//! The agent prefixes input transcriptions it derived from signing with a
//! fixed marker (`"[ASL]: "` by default). The marker is a contract with the
//! agent's instructions, not something the user says.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// When input starting with the marker is attributed to signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPolicy {
    /// Whenever the marker is present.
    #[default]
    Always,
    /// Only while video mode is on; otherwise the text stays verbatim.
    VideoModeOnly,
    /// Never; input is always attributed to speech.
    Never,
}

impl MarkerPolicy {
    pub fn applies(self, video_mode: bool) -> bool {
        match self {
            MarkerPolicy::Always => true,
            MarkerPolicy::VideoModeOnly => video_mode,
            MarkerPolicy::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignMarker {
    prefix: String,
}

impl SignMarker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Text after the marker, if `text` starts with it.
    pub fn strip<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return None;
        }
        text.strip_prefix(self.prefix.as_str())
    }
}

impl Default for SignMarker {
    fn default() -> Self {
        Self::new(defaults::SIGN_MARKER)
    }
}
