//! Image transformations: downscaling and tone enhancement

use anyhow::{Context, Result};
use fast_image_resize as fr;
use fr::images::Image as FrImage;
use imageproc::image::{Rgb, Rgb32FImage, RgbImage};

// Tone policy. 1.0 leaves the image untouched for each of these.
const SHARPNESS_FACTOR: f32 = 1.1;
const CONTRAST_FACTOR: f32 = 1.1;
const SATURATION_FACTOR: f32 = 1.15;

/// Target size with the longer side at exactly `max_side`, or `None` when the
/// image already fits.
pub fn fitted_dimensions(width: u32, height: u32, max_side: u32) -> Option<(u32, u32)> {
    let longer = width.max(height);
    if longer <= max_side {
        return None;
    }

    let scale = |side: u32| {
        let scaled = (side as u64 * max_side as u64 + longer as u64 / 2) / longer as u64;
        (scaled as u32).max(1)
    };

    if width >= height {
        Some((max_side, scale(height)))
    } else {
        Some((scale(width), max_side))
    }
}

/// Downscale so neither side exceeds `max_side`, keeping the aspect ratio.
/// Images that already fit are returned as-is.
pub fn fit_within(img: RgbImage, max_side: u32) -> Result<RgbImage> {
    let (width, height) = img.dimensions();
    let Some((new_width, new_height)) = fitted_dimensions(width, height, max_side) else {
        return Ok(img);
    };

    log::trace!("Resizing {width}x{height} -> {new_width}x{new_height}");

    // Downscaling only, Lanczos3 preserves detail
    let algorithm = fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3);

    let src_image = FrImage::from_vec_u8(width, height, img.into_raw(), fr::PixelType::U8x3)?;

    let mut dst_buffer = vec![0u8; new_width as usize * new_height as usize * 3];
    let mut dst_image =
        FrImage::from_slice_u8(new_width, new_height, &mut dst_buffer, fr::PixelType::U8x3)?;

    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src_image,
        &mut dst_image,
        Some(&fr::ResizeOptions::new().resize_alg(algorithm)),
    )?;

    RgbImage::from_raw(new_width, new_height, dst_buffer)
        .context("resized buffer does not match target dimensions")
}

/// Fixed enhancement pass: sharpen, stretch contrast, boost colour.
///
/// Works on a copy, `img` is left untouched.
pub fn enhance(img: &RgbImage) -> RgbImage {
    let sharpened = sharpen(img, SHARPNESS_FACTOR);
    let contrasted = adjust_contrast(sharpened, CONTRAST_FACTOR);
    saturate(contrasted, SATURATION_FACTOR)
}

/// Move each value away from (factor > 1) or toward (factor < 1) `base`
#[inline]
fn blend(base: u8, value: u8, factor: f32) -> u8 {
    let base = base as f32;
    (base + factor * (value as f32 - base))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// ITU-R 601-2 luma, integer arithmetic
#[inline]
fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// Extrapolate away from a smoothed copy
fn sharpen(img: &RgbImage, factor: f32) -> RgbImage {
    let smoothed = smooth(img);
    imageproc::map::map_colors2(&smoothed, img, |soft: Rgb<u8>, sharp: Rgb<u8>| {
        Rgb([
            blend(soft[0], sharp[0], factor),
            blend(soft[1], sharp[1], factor),
            blend(soft[2], sharp[2], factor),
        ])
    })
}

/// 3x3 smoothing kernel, centre weighted 5 against 1 for each neighbour
fn smooth(img: &RgbImage) -> RgbImage {
    const KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
    const TOTAL_WEIGHT: f32 = 13.0;

    let (width, height) = img.dimensions();
    let sums: Rgb32FImage = imageproc::filter::filter3x3::<_, f32, f32>(img, &KERNEL);

    // the kernel only applies where all nine taps are inside, border pixels
    // keep their original value
    RgbImage::from_fn(width, height, |x, y| {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            *img.get_pixel(x, y)
        } else {
            let sum = sums.get_pixel(x, y);
            Rgb(sum.0.map(|channel| (channel / TOTAL_WEIGHT).round() as u8))
        }
    })
}

/// Stretch every channel away from the image's mean luma
fn adjust_contrast(mut img: RgbImage, factor: f32) -> RgbImage {
    let pixel_count = img.width() as u64 * img.height() as u64;
    if pixel_count == 0 {
        return img;
    }

    let total: u64 = img.pixels().map(|p| luma(p) as u64).sum();
    let mean = ((total + pixel_count / 2) / pixel_count) as u8;

    imageproc::map::map_colors_mut(&mut img, |pixel| {
        Rgb(pixel.0.map(|channel| blend(mean, channel, factor)))
    });
    img
}

/// Push each pixel away from its own grey value
fn saturate(mut img: RgbImage, factor: f32) -> RgbImage {
    imageproc::map::map_colors_mut(&mut img, |pixel| {
        let grey = luma(&pixel);
        Rgb(pixel.0.map(|channel| blend(grey, channel, factor)))
    });
    img
}
