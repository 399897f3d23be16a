//! Camera tracks and the periodic still-image sampler used in video mode.

pub mod sampler;
pub mod source;

pub use sampler::{FrameSampler, SamplerHandle, SharedCamera, Surface};
pub use source::{MockVideoSource, RawImage, StillImageSource, VideoProbe, VideoSource};

use crate::defaults;

/// One outbound JPEG still.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    pub sequence: u64,
    pub data: Vec<u8>,
    /// JPEG quality the frame was encoded with, 1 to 100.
    pub quality: u8,
    pub width: u32,
    pub height: u32,
}

impl ImageFrame {
    pub fn mime_type(&self) -> &'static str {
        defaults::IMAGE_MIME_TYPE
    }
}
