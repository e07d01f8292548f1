//! Native camera capture via nokhwa.
//!
//! Backends per platform: V4L2 on Linux, AVFoundation on macOS, Media
//! Foundation on Windows. Frames are decoded to RGB before they reach the
//! scanner.

use super::{Camera, CameraOpener};
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use tracing::{debug, info, warn};

/// Opens the system camera at a fixed index (0 is the default device).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebcamOpener {
    pub index: u32,
}

impl CameraOpener for WebcamOpener {
    type Camera = Webcam;

    fn open(&self) -> Result<Webcam> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut inner = nokhwa::Camera::new(CameraIndex::Index(self.index), format)
            .with_context(|| format!("Failed to open camera {}", self.index))?;
        inner
            .open_stream()
            .context("Failed to start camera stream")?;

        info!(
            "Camera {} opened: {}",
            self.index,
            inner.info().human_name()
        );
        Ok(Webcam { inner })
    }
}

/// An open camera stream. Drop to release the device.
pub struct Webcam {
    inner: nokhwa::Camera,
}

impl Camera for Webcam {
    fn read_frame(&mut self) -> Option<RgbImage> {
        let buffer = match self.inner.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                debug!("Camera frame not available: {e}");
                return None;
            }
        };
        match buffer.decode_image::<RgbFormat>() {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Camera frame not decodable: {e}");
                None
            }
        }
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        if let Err(e) = self.inner.stop_stream() {
            warn!("Failed to stop camera stream: {e}");
        }
        debug!("Camera released");
    }
}
