/// Cuts an arbitrary sample stream into fixed-size windows.
///
/// Samples that do not fill a window are kept for the next push.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    size: usize,
    pending: Vec<f32>,
}

impl WindowBuffer {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            pending: Vec::with_capacity(size),
        }
    }

    /// Append samples and return every window that became complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut windows = Vec::new();
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.size {
                windows.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.size),
                ));
            }
        }
        windows
    }

    /// Samples waiting for the next window.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
