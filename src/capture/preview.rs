//! Preview frames for the UI.

use anyhow::{Context, Result};
use data_encoding::BASE64;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

/// Preview frames are scaled to this height, keeping the aspect ratio.
pub const PREVIEW_HEIGHT: u32 = 300;

/// Scale a frame to [`PREVIEW_HEIGHT`]. The width is truncated, never below 1.
pub fn scale(frame: &RgbImage) -> RgbImage {
    let (width, height) = frame.dimensions();
    if height == 0 || width == 0 {
        return frame.clone();
    }
    let target_width = (u64::from(width) * u64::from(PREVIEW_HEIGHT) / u64::from(height)).max(1);
    imageops::resize(frame, target_width as u32, PREVIEW_HEIGHT, FilterType::Triangle)
}

/// Encode as a JPEG `data:` URL the webview can show directly.
pub fn to_data_url(image: &RgbImage) -> Result<String> {
    let mut jpeg = Cursor::new(Vec::new());
    image
        .write_to(&mut jpeg, ImageFormat::Jpeg)
        .context("Failed to encode preview frame")?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64.encode(jpeg.get_ref())
    ))
}

/// Scale and encode a camera frame for the preview surface.
pub fn render(frame: &RgbImage) -> Result<String> {
    to_data_url(&scale(frame))
}
