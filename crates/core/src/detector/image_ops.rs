use image::{GrayImage, Luma};

use crate::region::PixelRect;

/// Gaussian kernel size used to suppress sensor noise before differencing.
pub const BLUR_KERNEL_SIZE: usize = 21;

/// Binary threshold applied to the frame delta (strictly greater-than).
pub const DELTA_THRESHOLD: u8 = 25;

/// Dilation passes applied to the binary mask to bridge small gaps.
pub const DILATE_ITERATIONS: usize = 2;

/// Normalized 1-D Gaussian taps for an odd kernel size.
/// Sigma follows the usual derivation when left unspecified:
/// 0.3 * ((size - 1) * 0.5 - 1) + 0.8
fn gaussian_kernel(size: usize) -> Vec<f32> {
    debug_assert!(size % 2 == 1, "kernel size must be odd");

    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;

    let mut taps = Vec::with_capacity(size);
    let mut sum = 0.0f32;
    for i in -half..=half {
        let x = i as f32;
        let tap = (-(x * x) / (2.0 * sigma * sigma)).exp();
        taps.push(tap);
        sum += tap;
    }
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}

/// Separable Gaussian blur over a grayscale frame. Borders clamp to the
/// nearest edge pixel.
pub fn gaussian_blur(src: &GrayImage, kernel_size: usize) -> GrayImage {
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return src.clone();
    }

    let taps = gaussian_kernel(kernel_size);
    let half = (kernel_size / 2) as i64;

    // Horizontal pass into an f32 plane, then vertical pass back to u8.
    let mut plane = vec![0.0f32; (width as usize) * (height as usize)];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0f32;
            for (k, tap) in taps.iter().enumerate() {
                let sx = (x as i64 + k as i64 - half).clamp(0, width as i64 - 1) as u32;
                acc += tap * src.get_pixel(sx, y)[0] as f32;
            }
            plane[(y * width + x) as usize] = acc;
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0f32;
            for (k, tap) in taps.iter().enumerate() {
                let sy = (y as i64 + k as i64 - half).clamp(0, height as i64 - 1) as u32;
                acc += tap * plane[(sy * width + x) as usize];
            }
            out.put_pixel(x, y, Luma([acc.round() as u8]));
        }
    }
    out
}

/// Absolute per-pixel difference of two equally sized frames, thresholded
/// into a binary mask: delta strictly greater than `threshold` becomes 255,
/// everything else 0.
pub fn diff_mask(previous: &GrayImage, current: &GrayImage, threshold: u8) -> GrayImage {
    debug_assert_eq!(previous.dimensions(), current.dimensions());

    let mut mask = GrayImage::new(current.width(), current.height());
    for (dst, (prev, curr)) in mask
        .iter_mut()
        .zip(previous.iter().zip(current.iter()))
    {
        *dst = if prev.abs_diff(*curr) > threshold { 255 } else { 0 };
    }
    mask
}

/// Binary dilation with a 3x3 rectangular structuring element.
pub fn dilate(mask: &GrayImage, iterations: usize) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut current = mask.clone();

    for _ in 0..iterations {
        let mut next = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let mut on = false;
                'scan: for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let sx = x as i64 + dx;
                        let sy = y as i64 + dy;
                        if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                            continue;
                        }
                        if current.get_pixel(sx as u32, sy as u32)[0] != 0 {
                            on = true;
                            break 'scan;
                        }
                    }
                }
                if on {
                    next.put_pixel(x, y, Luma([255]));
                }
            }
        }
        current = next;
    }
    current
}

/// Count non-zero mask pixels inside a rect. The rect is expected to be
/// clamped to the mask already (see `BoundsPercent::to_pixel_rect`).
pub fn count_nonzero_rect(mask: &GrayImage, rect: PixelRect) -> u32 {
    let mut count = 0u32;
    for y in rect.y1..rect.y2 {
        for x in rect.x1..rect.x2 {
            if mask.get_pixel(x, y)[0] != 0 {
                count += 1;
            }
        }
    }
    count
}

/// Count non-zero pixels over the whole mask.
pub fn count_nonzero(mask: &GrayImage) -> u32 {
    mask.iter().filter(|&&px| px != 0).count() as u32
}
