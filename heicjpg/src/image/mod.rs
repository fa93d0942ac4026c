//! Imaging capability behind the conversion pipeline: decode, adjust, encode

mod decode;
mod encode;
mod transform;

pub use encode::{compress_to_jpeg, encode_within_budget, Encoded};
pub use transform::{enhance, fit_within, fitted_dimensions};

use anyhow::Result;
use imageproc::image::RgbImage;

/// Narrow decode/encode interface the pipeline talks to, so the concrete
/// backend can be swapped without touching pipeline logic.
///
/// Implementations are shared by every worker, hence `Sync`.
pub trait Codec: Sync {
    /// Decode a complete source file into an upright 8-bit RGB image
    fn decode(&self, data: &[u8]) -> Result<RgbImage>;

    /// Encode `img` as JPEG at `quality` (1-100)
    fn encode(&self, img: &RgbImage, quality: u8) -> Result<Vec<u8>>;
}

/// libheif for HEIF payloads, the `image` crate for everything else and for
/// JPEG output
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodec;

impl Codec for DefaultCodec {
    fn decode(&self, data: &[u8]) -> Result<RgbImage> {
        decode::decode(data)
    }

    fn encode(&self, img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = img.dimensions();
        let mut buffer = Vec::with_capacity(jpeg_size_hint(width, height));
        compress_to_jpeg(img, &mut buffer, quality)?;
        Ok(buffer)
    }
}

/// Rough JPEG output size, a quarter byte per pixel
fn jpeg_size_hint(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize) / 4
}
