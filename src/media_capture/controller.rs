//! MediaCaptureController - camera/file state machine

use super::device::{CaptureDevice, DeviceLease};
use crate::error::{Error, Result};
use crate::models::{is_image_mime, ImagePayload, ImageSource};
use serde::Serialize;
use std::sync::Arc;

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// No device open
    Idle,
    /// Device stream live
    CameraOpen,
}

/// What the consumer may offer the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureCapabilities {
    pub camera: bool,
    pub upload: bool,
}

/// Owns the device handle and the current image payload
pub struct MediaCaptureController {
    device: Option<Arc<dyn CaptureDevice>>,
    lease: Option<DeviceLease>,
    payload: Option<ImagePayload>,
}

impl MediaCaptureController {
    /// Upload-only controller
    pub fn new() -> Self {
        Self {
            device: None,
            lease: None,
            payload: None,
        }
    }

    /// Controller with camera support
    pub fn with_camera(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device: Some(device),
            lease: None,
            payload: None,
        }
    }

    pub fn capabilities(&self) -> CaptureCapabilities {
        CaptureCapabilities {
            camera: self.device.is_some(),
            upload: true,
        }
    }

    pub fn state(&self) -> CaptureState {
        if self.lease.is_some() {
            CaptureState::CameraOpen
        } else {
            CaptureState::Idle
        }
    }

    pub fn has_image(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload(&self) -> Option<&ImagePayload> {
        self.payload.as_ref()
    }

    /// Hand the payload over (e.g. to the analysis coordinator)
    pub fn take_payload(&mut self) -> Option<ImagePayload> {
        self.payload.take()
    }

    /// Open the camera and start streaming
    ///
    /// Any previously open handle is released first and the current payload
    /// is discarded.
    pub async fn open_camera(&mut self) -> Result<()> {
        let device = self.device.clone().ok_or_else(|| {
            Error::DeviceUnavailable("no camera device on this client".to_string())
        })?;

        self.close_camera();
        self.payload = None;

        let stream = device.open().await.map_err(|e| match e {
            Error::DeviceUnavailable(_) => e,
            other => Error::DeviceUnavailable(other.to_string()),
        });

        match stream {
            Ok(stream) => {
                self.lease = Some(DeviceLease::new(device.label(), stream));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(device = %device.label(), error = %e, "Camera open failed");
                Err(e)
            }
        }
    }

    /// Release the device handle. No-op when nothing is held.
    pub fn close_camera(&mut self) {
        if let Some(lease) = self.lease.take() {
            drop(lease);
        }
    }

    /// Snapshot the current frame and close the camera
    ///
    /// The device is released whether or not a frame was available.
    pub fn capture_photo(&mut self) -> Result<&ImagePayload> {
        let mut lease = self
            .lease
            .take()
            .ok_or_else(|| Error::CaptureFailed("camera is not open".to_string()))?;

        let frame = lease.frame();
        drop(lease);

        let frame = match frame {
            Some(frame) if !frame.data.is_empty() => frame,
            Some(_) => return Err(Error::CaptureFailed("empty frame".to_string())),
            None => {
                return Err(Error::CaptureFailed(
                    "no video frame available yet".to_string(),
                ))
            }
        };

        tracing::debug!(
            width = frame.width,
            height = frame.height,
            size = frame.data.len(),
            "Photo captured"
        );

        let payload = ImagePayload::new(frame.data, frame.mime_type, ImageSource::Camera);
        Ok(&*self.payload.insert(payload))
    }

    /// Accept a picked file
    pub fn select_file(&mut self, data: Vec<u8>, mime_type: &str) -> Result<&ImagePayload> {
        if !is_image_mime(mime_type) {
            return Err(Error::InvalidFileType(mime_type.to_string()));
        }

        let payload = ImagePayload::new(data, mime_type, ImageSource::Upload);
        tracing::debug!(
            file_name = %payload.file_name(),
            size = payload.len(),
            "Image selected"
        );
        Ok(&*self.payload.insert(payload))
    }

    /// Accept a picked file, keeping its original name
    pub fn select_named_file(
        &mut self,
        file_name: &str,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<&ImagePayload> {
        self.select_file(data, mime_type)?;
        let payload = self
            .payload
            .take()
            .map(|p| p.with_file_name(file_name))
            .ok_or_else(|| Error::CaptureFailed("selection was discarded".to_string()))?;
        Ok(&*self.payload.insert(payload))
    }

    /// Discard the payload and return to Idle
    pub fn reset(&mut self) {
        self.payload = None;
        self.close_camera();
    }
}

impl Default for MediaCaptureController {
    fn default() -> Self {
        Self::new()
    }
}
