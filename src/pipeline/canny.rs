//! Canny edge control images.
//!
//! The diffusion model is conditioned on a white-on-black edge map, which
//! pins walls, windows and furniture outlines in place while the style
//! changes.

use std::collections::VecDeque;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbImage};

pub const LOW_THRESHOLD: f32 = 50.0;
pub const HIGH_THRESHOLD: f32 = 100.0;
pub const DETECT_RESOLUTION: u32 = 1024;

/// Control-image parameters.
#[derive(Debug, Clone, Copy)]
pub struct CannyParams {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Target length of the image's short side.
    pub resolution: u32,
}

impl Default for CannyParams {
    fn default() -> Self {
        Self {
            low_threshold: LOW_THRESHOLD,
            high_threshold: HIGH_THRESHOLD,
            resolution: DETECT_RESOLUTION,
        }
    }
}

/// Scale so the short side equals `resolution`, both sides snapped to
/// multiples of 64.
pub fn control_dimensions(width: u32, height: u32, resolution: u32) -> (u32, u32) {
    let k = resolution as f64 / width.min(height) as f64;
    let snap = |v: u32| (((v as f64 * k) / 64.0).round() as u32 * 64).max(64);
    (snap(width), snap(height))
}

/// Build the RGB edge map for `img`.
pub fn control_image(img: &DynamicImage, params: &CannyParams) -> RgbImage {
    let (w, h) = control_dimensions(img.width(), img.height(), params.resolution);
    let gray = if (w, h) == (img.width(), img.height()) {
        img.to_luma8()
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3).to_luma8()
    };
    let edges = detect_edges(&gray, params.low_threshold, params.high_threshold);
    DynamicImage::ImageLuma8(edges).to_rgb8()
}

/// Sobel gradients, non-maximum suppression and hysteresis.
pub fn detect_edges(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let mut out = GrayImage::new(w as u32, h as u32);
    if w < 3 || h < 3 {
        return out;
    }

    let px = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32)[0] as f32;
    let mut gx = vec![0f32; w * h];
    let mut gy = vec![0f32; w * h];
    let mut mag = vec![0f32; w * h];

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let dx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let dy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            let i = y * w + x;
            gx[i] = dx;
            gy[i] = dy;
            mag[i] = dx.abs() + dy.abs();
        }
    }

    // tan(22.5deg) and tan(67.5deg)
    const TAN_22: f32 = 0.414_213_56;
    const TAN_67: f32 = 2.414_213_6;

    let mut candidate = vec![0u8; w * h]; // 0 none, 1 weak, 2 strong
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs(), gy[i].abs());
            let (a, b) = if ay <= ax * TAN_22 {
                (mag[i - 1], mag[i + 1])
            } else if ay >= ax * TAN_67 {
                (mag[i - w], mag[i + w])
            } else if (gx[i] > 0.0) == (gy[i] > 0.0) {
                (mag[i - w - 1], mag[i + w + 1])
            } else {
                (mag[i - w + 1], mag[i + w - 1])
            };
            if m > a && m >= b {
                candidate[i] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut queue: VecDeque<usize> = VecDeque::new();
    for (i, c) in candidate.iter().enumerate() {
        if *c == 2 {
            queue.push_back(i);
        }
    }
    let mut edge = vec![false; w * h];
    while let Some(i) = queue.pop_front() {
        if edge[i] {
            continue;
        }
        edge[i] = true;
        let (x, y) = (i % w, i / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if !edge[n] && candidate[n] > 0 {
                    queue.push_back(n);
                }
            }
        }
    }

    for (i, on) in edge.iter().enumerate() {
        if *on {
            out.put_pixel((i % w) as u32, (i / w) as u32, Luma([255]));
        }
    }
    out
}
