//! Image decoding

use std::io::Cursor;

use anyhow::{Context, Result};
use imageproc::image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};

/// Decode a source file into upright RGB
///
/// HEIF first. Files named `.heic` that carry some other payload (exported
/// JPEGs, screenshots) go through the `image` crate decoders.
#[cfg(feature = "heif")]
pub(super) fn decode(data: &[u8]) -> Result<RgbImage> {
    decode_heif(data).or_else(|heif_err| {
        log::debug!("HEIF decoding failed, trying other decoders: {heif_err:#}");
        decode_other(data).map_err(|other_err| {
            anyhow::anyhow!("not a readable HEIF image ({heif_err:#}), {other_err:#}")
        })
    })
}

#[cfg(not(feature = "heif"))]
pub(super) fn decode(data: &[u8]) -> Result<RgbImage> {
    decode_other(data)
}

/// libheif applies the container's rotation and mirror properties during
/// decode, so the result is already upright.
#[cfg(feature = "heif")]
fn decode_heif(data: &[u8]) -> Result<RgbImage> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(data)?;
    let handle = ctx.primary_image_handle()?;
    let image = lib_heif.decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;

    let planes = image.planes();
    let plane = planes
        .interleaved
        .context("decoded HEIF image has no interleaved RGB plane")?;

    let (width, height) = (plane.width, plane.height);
    let row_len = width as usize * 3;

    // rows are padded out to `stride`
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }

    RgbImage::from_raw(width, height, pixels).context("HEIF plane is smaller than its dimensions")
}

fn decode_other(data: &[u8]) -> Result<RgbImage> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_decoder()
        .context("unrecognized image format")?;

    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    Ok(img.into_rgb8())
}
