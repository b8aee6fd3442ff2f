//! Image preprocessing shared by the recipes.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

/// Longest side fed to the captioner and the control-image extractor.
pub const WORKING_SIZE: u32 = 1400;

/// Luma above which a mask pixel counts as "repaint".
pub const MASK_THRESHOLD: u8 = 127;

/// Downscale so the longest side is at most `target`, keeping aspect ratio.
/// Images already within bounds are returned unchanged.
pub fn resize_image(img: &DynamicImage, target: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w <= target && h <= target {
        return img.clone();
    }
    let ratio = target as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * ratio).floor() as u32).max(1);
    let new_h = ((h as f64 * ratio).floor() as u32).max(1);
    img.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

/// Resize a mask to `width`x`height` and binarize it to 0/255.
pub fn binarize_mask(mask: &DynamicImage, width: u32, height: u32) -> GrayImage {
    let gray = if mask.width() == width && mask.height() == height {
        mask.to_luma8()
    } else {
        mask.resize_exact(width, height, FilterType::Nearest).to_luma8()
    };
    GrayImage::from_fn(width, height, |x, y| {
        if gray.get_pixel(x, y)[0] > MASK_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Format of an upload, if it is one the service accepts.
pub fn accepted_format(bytes: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(bytes) {
        Ok(fmt @ (ImageFormat::Jpeg | ImageFormat::Png)) => Some(fmt),
        _ => None,
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}
