use crate::domain::jobs::FrameFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbImage};

/// Map a 0..=1 quality factor onto the JPEG encoder's 1..=100 scale.
pub fn jpeg_quality(quality: f64) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
}

/// Map a 0..=1 quality factor onto ffmpeg's `-q:v` scale (2 best, 31 worst).
pub fn ffmpeg_qscale(quality: f64) -> u8 {
    (31.0 - quality.clamp(0.0, 1.0) * 29.0).round() as u8
}

pub fn encode_rgb(image: &RgbImage, format: FrameFormat, quality: f64) -> image::ImageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        FrameFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality)).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )?;
        }
        FrameFormat::Png => {
            PngEncoder::new(&mut buffer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
        })
    }

    #[test]
    fn test_quality_scales() {
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.85), 85);
        assert_eq!(ffmpeg_qscale(1.0), 2);
        assert_eq!(ffmpeg_qscale(0.0), 31);
        assert!(ffmpeg_qscale(0.5) > 2 && ffmpeg_qscale(0.5) < 31);
    }

    #[test]
    fn test_encode_jpeg_has_magic() {
        let bytes = encode_rgb(&gradient(32, 16), FrameFormat::Jpeg, 0.8).unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_encode_png_round_trips_dimensions() {
        let bytes = encode_rgb(&gradient(20, 10), FrameFormat::Png, 0.1).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let image = gradient(64, 64);
        let high = encode_rgb(&image, FrameFormat::Jpeg, 1.0).unwrap();
        let low = encode_rgb(&image, FrameFormat::Jpeg, 0.1).unwrap();
        assert!(low.len() < high.len());
    }
}
