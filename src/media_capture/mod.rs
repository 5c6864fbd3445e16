//! MediaCapture - Image Acquisition
//!
//! ## Responsibilities
//!
//! - Camera lifecycle (open, live stream, close)
//! - Still frame capture from the live stream
//! - File selection with image type validation
//! - Exclusive ownership of the device handle (released on every exit path)
//!
//! Camera support is optional: a controller built without a device reports
//! `camera: false` in its capabilities and only accepts uploads.

pub mod controller;
pub mod device;

pub use controller::{CaptureCapabilities, CaptureState, MediaCaptureController};
pub use device::{CaptureDevice, DeviceLease, Frame, VideoStream};
