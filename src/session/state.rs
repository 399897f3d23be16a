use crate::error::ConnectFlowError;
use crate::media::CaptureDevice;
use serde::Serialize;
use std::fmt;

/// Why a session ended in the error state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The user refused access; remediation is a permission change.
    PermissionDenied { device: CaptureDevice },
    DeviceUnavailable {
        device: CaptureDevice,
        message: String,
    },
    /// The channel failed or closed unexpectedly.
    Transport { message: String },
    /// Anything else, such as the speaker failing to open.
    Other { message: String },
}

impl FailureCause {
    pub fn from_error(error: &ConnectFlowError) -> Self {
        match error {
            ConnectFlowError::PermissionDenied { device, .. } => {
                FailureCause::PermissionDenied { device: *device }
            }
            ConnectFlowError::DeviceUnavailable { device, message } => {
                FailureCause::DeviceUnavailable {
                    device: *device,
                    message: message.clone(),
                }
            }
            ConnectFlowError::Transport { message } | ConnectFlowError::Protocol { message } => {
                FailureCause::Transport {
                    message: message.clone(),
                }
            }
            other => FailureCause::Other {
                message: other.to_string(),
            },
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, FailureCause::PermissionDenied { .. })
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::PermissionDenied { device } => {
                write!(f, "permission denied for {}", device)
            }
            FailureCause::DeviceUnavailable { device, message } => {
                write!(f, "{} unavailable: {}", device, message)
            }
            FailureCause::Transport { message } => write!(f, "transport error: {}", message),
            FailureCause::Other { message } => f.write_str(message),
        }
    }
}

/// Lifecycle of one session.
///
/// `Idle → Connecting → Open → Closed`; `Error` is terminal and reachable
/// from `Connecting` and `Open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error { cause: FailureCause },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
            SessionState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error { cause } => write!(f, "error ({})", cause),
            other => f.write_str(other.name()),
        }
    }
}
