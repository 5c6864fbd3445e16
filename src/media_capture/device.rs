//! Capture device seam and the scoped device lease

use crate::error::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Encoded still frame taken from a live stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// A video capture device (platform camera, test double, ...)
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request exclusive access and start streaming
    ///
    /// Fails with `Error::DeviceUnavailable` when permission is denied or no
    /// device exists.
    async fn open(&self) -> Result<Box<dyn VideoStream>>;

    /// Label used in logs
    fn label(&self) -> &str {
        "camera"
    }
}

/// A live stream returned by [`CaptureDevice::open`]
pub trait VideoStream: Send {
    /// Latest frame; `None` until the stream has produced its first frame
    fn current_frame(&mut self) -> Option<Frame>;

    /// Stop all tracks and release the hardware. Called exactly once.
    fn stop(&mut self);
}

/// Open device handle - released on Drop
pub struct DeviceLease {
    device: String,
    stream: Box<dyn VideoStream>,
    opened_at: Instant,
}

impl DeviceLease {
    pub(crate) fn new(device: impl Into<String>, stream: Box<dyn VideoStream>) -> Self {
        let device = device.into();
        tracing::info!(device = %device, "Camera device acquired");
        Self {
            device,
            stream,
            opened_at: Instant::now(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn held_for(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub(crate) fn frame(&mut self) -> Option<Frame> {
        self.stream.current_frame()
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.stream.stop();
        tracing::info!(
            device = %self.device,
            held_ms = self.held_for().as_millis() as u64,
            "Camera device released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStream {
        stops: Arc<AtomicUsize>,
    }

    impl VideoStream for CountingStream {
        fn current_frame(&mut self) -> Option<Frame> {
            None
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_stops_stream() {
        let stops = Arc::new(AtomicUsize::new(0));
        let lease = DeviceLease::new(
            "front",
            Box::new(CountingStream {
                stops: stops.clone(),
            }),
        );
        assert_eq!(lease.device(), "front");
        assert_eq!(stops.load(Ordering::SeqCst), 0);

        drop(lease);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
