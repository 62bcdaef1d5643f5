//! Binary video frame payloads

use std::sync::Arc;

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// A single binary image payload received from the camera endpoint.
///
/// The payload boundary is the transport message boundary; there is no
/// framing or length prefix. Data is shared via `Arc` so handles and
/// renderers can hold the frame without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw JPEG bytes (zero-copy via Arc)
    pub data: Arc<[u8]>,

    /// Monotonic arrival counter, starting at 1 for the first frame
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame from raw bytes
    pub fn new(data: impl Into<Arc<[u8]>>, sequence: u64) -> Self {
        Self { data: data.into(), sequence }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the payload starts with a JPEG SOI marker.
    pub fn is_jpeg(&self) -> bool {
        self.data.starts_with(&JPEG_SOI)
    }
}
