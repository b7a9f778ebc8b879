//! Image preprocessing for the enhanced Tesseract pass.

use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

/// Grayscale, contrast stretch, unsharp mask and adaptive threshold.
///
/// Scanned DANFEs are often low-contrast faxes or phone photos; binarizing
/// with a local mean recovers the thin box-drawing grid and small print.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Unsharp mask blur radius.
    sharpen_sigma: f32,
    /// Unsharp mask threshold.
    sharpen_threshold: i32,
    /// Side of the square window used for the local mean.
    block_size: u32,
    /// Offset subtracted from the local mean.
    offset: i32,
    /// Images narrower than this are upscaled first.
    min_width: u32,
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self {
            sharpen_sigma: 1.0,
            sharpen_threshold: 2,
            block_size: 15,
            offset: 5,
            min_width: 1200,
        }
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size.max(3) | 1;
        self
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    /// Run the full enhancement chain.
    pub fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        let image = self.upscale(image);
        let gray = image.to_luma8();
        let stretched = stretch_contrast(&gray);
        let sharpened =
            image::imageops::unsharpen(&stretched, self.sharpen_sigma, self.sharpen_threshold);
        let binary = self.adaptive_threshold(&sharpened);

        debug!(
            "Enhanced image {}x{} (block {}, offset {})",
            binary.width(),
            binary.height(),
            self.block_size,
            self.offset
        );

        DynamicImage::ImageLuma8(binary)
    }

    fn upscale(&self, image: &DynamicImage) -> DynamicImage {
        let width = image.width();
        if width == 0 || width >= self.min_width {
            return image.clone();
        }
        let scale = self.min_width as f32 / width as f32;
        let height = ((image.height() as f32 * scale) as u32).max(1);
        image.resize_exact(self.min_width, height, image::imageops::FilterType::CatmullRom)
    }

    /// Local-mean threshold over a summed-area table.
    fn adaptive_threshold(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let mut result = GrayImage::new(width, height);
        if width == 0 || height == 0 {
            return result;
        }

        let stride = width as usize + 1;
        let mut integral = vec![0u64; stride * (height as usize + 1)];
        for y in 0..height as usize {
            let mut row_sum = 0u64;
            for x in 0..width as usize {
                row_sum += image.get_pixel(x as u32, y as u32)[0] as u64;
                integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
            }
        }

        let half = self.block_size / 2;
        for y in 0..height {
            let y0 = y.saturating_sub(half) as usize;
            let y1 = (y + half + 1).min(height) as usize;
            for x in 0..width {
                let x0 = x.saturating_sub(half) as usize;
                let x1 = (x + half + 1).min(width) as usize;

                let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                    - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0];
                let count = ((y1 - y0) * (x1 - x0)) as u64;
                let threshold = (sum / count) as i32 - self.offset;

                let value = image.get_pixel(x, y)[0] as i32;
                let output = if value > threshold { 255 } else { 0 };
                result.put_pixel(x, y, Luma([output]));
            }
        }

        result
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Linearly map the darkest pixel to 0 and the brightest to 255.
fn stretch_contrast(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max <= min {
        return image.clone();
    }

    let range = (max - min) as u32;
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = (((pixel[0] - min) as u32 * 255) / range) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stretch_contrast_expands_range() {
        let mut image = GrayImage::new(2, 1);
        image.put_pixel(0, 0, Luma([100]));
        image.put_pixel(1, 0, Luma([150]));

        let stretched = stretch_contrast(&image);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_stretch_contrast_flat_image_unchanged() {
        let image = GrayImage::from_pixel(3, 3, Luma([42]));
        assert_eq!(stretch_contrast(&image), image);
    }

    #[test]
    fn test_enhance_produces_binary_image() {
        let mut image = GrayImage::from_pixel(40, 20, Luma([220]));
        for x in 10..30 {
            image.put_pixel(x, 10, Luma([20]));
        }

        let enhanced = ImagePreprocessor::new()
            .enhance(&DynamicImage::ImageLuma8(image))
            .to_luma8();
        assert_eq!(enhanced.width(), 1200);
        assert!(enhanced.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(enhanced.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn test_block_size_forced_odd() {
        let preprocessor = ImagePreprocessor::new().with_block_size(10);
        assert_eq!(preprocessor.block_size, 11);
    }
}
