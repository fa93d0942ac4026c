//! JPEG encoding under a size budget

use anyhow::{Context, Result};
use imageproc::image::{codecs::jpeg::JpegEncoder, RgbImage};

use crate::config::QualityPolicy;

use super::Codec;

/// Compress an image to JPEG format with the specified quality
pub fn compress_to_jpeg<W>(img: &RgbImage, writer: &mut W, quality: u8) -> Result<()>
where
    W: std::io::Write,
{
    let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));

    encoder
        .encode_image(img)
        .with_context(|| "Failed to compress image to JPEG")?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct Encoded {
    pub data: Vec<u8>,
    pub quality: u8,
    /// Number of encodes it took to get here
    pub attempts: usize,
    /// Still above budget after the floor quality
    pub oversized: bool,
}

/// Encode at descending qualities until the result fits in `max_bytes`.
///
/// The first attempt that fits wins. If none does, the floor-quality
/// encoding is returned with `oversized` set; the caller decides whether to
/// keep it.
pub fn encode_within_budget<C>(
    codec: &C,
    img: &RgbImage,
    max_bytes: u64,
    policy: &QualityPolicy,
) -> Result<Encoded>
where
    C: Codec + ?Sized,
{
    let mut last = None;

    for (attempt, quality) in policy.attempts().enumerate() {
        let data = codec
            .encode(img, quality)
            .with_context(|| format!("JPEG encoding at quality {quality} failed"))?;

        let size = data.len() as u64;
        log::trace!("Quality {quality}: {size} bytes (budget {max_bytes})");

        let fits = size <= max_bytes;
        last = Some(Encoded {
            data,
            quality,
            attempts: attempt + 1,
            oversized: !fits,
        });

        if fits {
            break;
        }
    }

    last.context("quality policy produced no attempts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::tests::SizedCodec;
    use imageproc::image::Rgb;

    fn img() -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
    }

    #[test]
    fn first_attempt_wins_when_it_fits() {
        let codec = SizedCodec::new(10);

        let encoded =
            encode_within_budget(&codec, &img(), 10_000, &QualityPolicy::default()).unwrap();

        assert_eq!(encoded.quality, 95);
        assert_eq!(encoded.attempts, 1);
        assert!(!encoded.oversized);
        assert_eq!(codec.calls(), vec![95]);
    }

    #[test]
    fn descends_until_within_budget() {
        // 100 bytes per quality point, budget allows quality 70 and below
        let codec = SizedCodec::new(100);

        let encoded =
            encode_within_budget(&codec, &img(), 7_000, &QualityPolicy::default()).unwrap();

        assert_eq!(encoded.quality, 70);
        assert_eq!(encoded.data.len(), 7_000);
        assert!(!encoded.oversized);
        assert_eq!(codec.calls(), vec![95, 90, 85, 80, 75, 70]);
    }

    #[test]
    fn floor_result_is_kept_when_nothing_fits() {
        let codec = SizedCodec::new(1_000);
        let policy = QualityPolicy::default();

        let encoded = encode_within_budget(&codec, &img(), 100, &policy).unwrap();

        assert_eq!(encoded.quality, policy.floor);
        assert!(encoded.oversized);
        assert_eq!(encoded.attempts, policy.attempts().count());
        assert_eq!(codec.calls().last(), Some(&policy.floor));
    }

    #[test]
    fn real_jpeg_shrinks_with_quality() {
        let mut noisy = RgbImage::new(256, 256);
        let mut seed = 17u32;
        for pixel in noisy.pixels_mut() {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let [a, b, c, _] = seed.to_le_bytes();
            *pixel = Rgb([a, b, c]);
        }

        let mut best = Vec::new();
        compress_to_jpeg(&noisy, &mut best, 95).unwrap();

        let budget = best.len() as u64 * 2 / 3;
        let encoded = encode_within_budget(
            &crate::image::DefaultCodec,
            &noisy,
            budget,
            &QualityPolicy::default(),
        )
        .unwrap();

        assert!(encoded.quality < 95);
        assert!(encoded.data.len() as u64 <= budget || encoded.oversized);
    }
}
