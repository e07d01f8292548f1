//! QR decoding backed by rqrr.

use super::QrDecoder;
use image::RgbImage;
use tracing::debug;

/// Decodes the first readable QR code in a frame.
#[derive(Debug, Default)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&mut self, frame: &RgbImage) -> Option<String> {
        let gray = image::imageops::grayscale(frame);
        let (width, height) = gray.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                gray.get_pixel(x as u32, y as u32).0[0]
            });

        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| match grid.decode() {
                Ok((_, content)) => Some(content),
                Err(e) => {
                    debug!("QR grid found but not decodable: {e}");
                    None
                }
            })
    }
}
