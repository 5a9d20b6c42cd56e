//! Image discovery and normalization before analysis.

use crate::error::{Result, UrbanVizError};
use crate::store::{has_image_extension, write_bytes_atomic};
use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How images are resized before being sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: u32,
    /// Letterbox onto a white canvas instead of stretching.
    pub preserve_aspect_ratio: bool,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            preserve_aspect_ratio: true,
        }
    }
}

/// Finds image files under `dir`, sorted by path.
pub fn find_images(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(UrbanVizError::InvalidRequest(format!(
            "input directory {} does not exist",
            dir.display()
        )));
    }

    let walker = WalkDir::new(dir).max_depth(if recursive { usize::MAX } else { 1 });
    let mut images = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| UrbanVizError::Io(e.into()))?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            images.push(entry.into_path());
        }
    }
    images.sort();
    Ok(images)
}

/// Flattens transparency onto white and converts to 8-bit RGB.
pub fn to_rgb_on_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Normalizes an image for analysis.
///
/// Images that already fit inside the target box are left at their size.
pub fn prepare_image(img: &DynamicImage, opts: ResizeOptions) -> RgbImage {
    let rgb = to_rgb_on_white(img);
    let (w, h) = rgb.dimensions();
    if w <= opts.width && h <= opts.height {
        return rgb;
    }

    if !opts.preserve_aspect_ratio {
        return image::imageops::resize(&rgb, opts.width, opts.height, FilterType::Lanczos3);
    }

    let ratio = f64::min(opts.width as f64 / w as f64, opts.height as f64 / h as f64);
    let new_w = ((w as f64 * ratio) as u32).max(1);
    let new_h = ((h as f64 * ratio) as u32).max(1);
    let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Lanczos3);

    let mut canvas = RgbImage::from_pixel(opts.width, opts.height, Rgb([255, 255, 255]));
    let x = ((opts.width - new_w) / 2) as i64;
    let y = ((opts.height - new_h) / 2) as i64;
    image::imageops::overlay(&mut canvas, &resized, x, y);
    canvas
}

/// Encodes an RGB image as JPEG.
pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}

/// Writes the processed JPEG under `output_dir`, mirroring `relative`.
pub fn save_processed(output_dir: &Path, relative: &Path, jpeg: &[u8]) -> Result<PathBuf> {
    let path = output_dir.join(relative);
    write_bytes_atomic(&path, jpeg)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::fs;

    #[test]
    fn test_small_image_untouched() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let out = prepare_image(&img, ResizeOptions::default());
        assert_eq!(out.dimensions(), (200, 100));
    }

    #[test]
    fn test_letterbox_preserves_aspect() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 200, Rgb([0, 0, 0])));
        let opts = ResizeOptions {
            width: 100,
            height: 100,
            preserve_aspect_ratio: true,
        };
        let out = prepare_image(&img, opts);
        assert_eq!(out.dimensions(), (100, 100));
        // Top band is padding, middle row is image content.
        assert_eq!(out.get_pixel(50, 5), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(50, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_stretch_without_aspect() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(400, 200));
        let opts = ResizeOptions {
            width: 64,
            height: 32,
            preserve_aspect_ratio: false,
        };
        assert_eq!(prepare_image(&img, opts).dimensions(), (64, 32));
    }

    #[test]
    fn test_transparent_becomes_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let out = to_rgb_on_white(&img);
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let jpeg = encode_jpeg(&RgbImage::new(8, 8)).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8, 0xFF]));
    }

    #[test]
    fn test_find_images() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blade_runner")).unwrap();
        fs::write(dir.path().join("b.PNG"), b"x").unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("blade_runner").join("c.webp"), b"x").unwrap();

        let flat = find_images(dir.path(), false).unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat[0].ends_with("a.jpg"));

        let deep = find_images(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_find_images_missing_dir() {
        let err = find_images(Path::new("/definitely/not/here"), true).unwrap_err();
        assert!(matches!(err, UrbanVizError::InvalidRequest(_)));
    }
}
