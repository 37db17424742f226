//! Gaussian smoothing for the `smoothing` filter.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which only accepts
//! single-channel images, by splitting the colour channels, blurring
//! each independently, and reassembling. Gaussian blur is linear and
//! per-channel, so the result equals a colour-space blur.
//!
//! Alpha is carried through untouched so that smoothing never changes
//! which pixels are transparent.

use image::GrayImage;

use crate::types::PixelBuffer;

/// Apply Gaussian blur to the colour channels of a buffer.
///
/// Higher `sigma` values produce more smoothing. Non-positive sigma
/// values (zero or negative) return an unchanged copy, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred buffer"]
pub fn gaussian_blur(buffer: &PixelBuffer, sigma: f32) -> PixelBuffer {
    if sigma <= 0.0 || !sigma.is_finite() {
        return buffer.clone();
    }

    let image = buffer.image();
    let (w, h) = (image.width(), image.height());

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    PixelBuffer::from_fn(w, h, |x, y| {
        [
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
            image.get_pixel(x, y).0[3],
        ]
    })
}
