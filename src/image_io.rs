use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::imageops::{self, FilterType as ResizeFilter};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::Result;

/// Decode any supported file into 8-bit RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

/// Downscale so the longer edge is at most `max_dimension`, keeping the
/// aspect ratio. Never upscales.
pub fn resize_preserve_aspect(img: &RgbaImage, max_dimension: u32) -> RgbaImage {
    let max_dimension = max_dimension.max(1);
    let longest = img.width().max(img.height());
    if longest <= max_dimension {
        return img.clone();
    }
    let scale = max_dimension as f64 / longest as f64;
    let fit = |edge: u32| ((edge as f64 * scale).round() as u32).clamp(1, max_dimension);
    imageops::resize(img, fit(img.width()), fit(img.height()), ResizeFilter::CatmullRom)
}

/// Unfiltered, fast-compression PNG; favours speed over size.
fn write_png<W: Write>(img: &RgbaImage, writer: W) -> Result<()> {
    PngEncoder::new_with_quality(writer, CompressionType::Fast, FilterType::NoFilter).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(())
}

pub fn encode_png_fast(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(img.as_raw().len() / 2);
    write_png(img, &mut bytes)?;
    Ok(bytes)
}

/// Write `img` as PNG, creating parent directories as needed.
pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    write_png(img, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn downscale_keeps_aspect() {
        let wide = RgbaImage::new(400, 200);
        assert_eq!(resize_preserve_aspect(&wide, 100).dimensions(), (100, 50));
        let tall = RgbaImage::new(200, 400);
        assert_eq!(resize_preserve_aspect(&tall, 100).dimensions(), (50, 100));
        let sliver = RgbaImage::new(1000, 2);
        assert_eq!(resize_preserve_aspect(&sliver, 10).dimensions(), (10, 1));
    }

    #[test]
    fn encoded_png_decodes_back() {
        let img = RgbaImage::from_fn(5, 4, |x, y| Rgba([x as u8 * 50, y as u8 * 60, 9, 200]));
        let bytes = encode_png_fast(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let img = RgbaImage::from_pixel(10, 5, Rgba([1, 2, 3, 4]));
        assert_eq!(resize_preserve_aspect(&img, 100), img);
        let down = resize_preserve_aspect(&img, 4);
        assert_eq!(down.dimensions(), (4, 2));
    }

    #[test]
    fn png_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/frame.png");
        let img = RgbaImage::from_fn(6, 3, |x, y| Rgba([x as u8 * 40, y as u8 * 80, 7, 255]));
        save_png(&img, &path).unwrap();
        assert_eq!(load_image(&path).unwrap(), img);
    }
}
