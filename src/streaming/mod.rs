//! Outbound media path.
//!
//! ```text
//! ┌────────────┐    ┌────────┐    ┌────────┐
//! │ Microphone │───▶│ Window │───▶│ Framer │───┐
//! └────────────┘    └────────┘    └────────┘   │    ┌─────────┐
//!                                              ├───▶│ Channel │
//! ┌────────────┐    ┌─────────┐                │    └─────────┘
//! │   Camera   │───▶│ Sampler │────────────────┘
//! └────────────┘    └─────────┘
//! ```

pub mod capture;
pub mod frame;
pub mod window;

pub use capture::{CaptureConfig, CaptureHandle, CapturePipeline};
pub use frame::OutboundFrame;
pub use window::WindowBuffer;
