/// Image preprocessing for text recognition
///
/// Table regions are small and often colored (chip counts on felt, names on
/// seat plates). Crops are upscaled, converted to an enhanced grayscale,
/// thresholded (Otsu or manual) and inverted so text ends up dark on light.
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use rayon::prelude::*;

/// Crops shorter than this are upscaled before recognition
const MIN_TEXT_HEIGHT: u32 = 32;

pub struct ImagePreprocessor {
    manual_threshold: Option<u8>,
    enable_morph_open: bool,
}

impl ImagePreprocessor {
    /// `threshold` 0 selects automatic Otsu thresholding
    pub fn new(threshold: u8, enable_morph_open: bool) -> Self {
        Self {
            manual_threshold: (threshold != 0).then_some(threshold),
            enable_morph_open,
        }
    }

    /// Binary image with dark text on a light background
    pub fn preprocess(&self, region: &RgbaImage) -> GrayImage {
        let region = upscale(region);
        let gray = enhanced_grayscale(&region);

        let threshold = self
            .manual_threshold
            .unwrap_or_else(|| otsu_threshold(&gray));
        let mut binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([if gray.get_pixel(x, y)[0] >= threshold { 255 } else { 0 }])
        });

        if self.enable_morph_open && binary.width() > 2 && binary.height() > 2 {
            binary = dilate(&erode(&binary));
        }

        // Mostly black means light text on a dark plate
        let white = binary.pixels().filter(|p| p[0] > 127).count();
        let total = (binary.width() * binary.height()) as usize;
        if white * 2 < total {
            imageops::invert(&mut binary);
        }

        binary
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(0, false)
    }
}

fn upscale(region: &RgbaImage) -> RgbaImage {
    let (width, height) = region.dimensions();
    if height == 0 || height >= MIN_TEXT_HEIGHT {
        return region.clone();
    }
    let factor = MIN_TEXT_HEIGHT.div_ceil(height);
    imageops::resize(region, width * factor, height * factor, FilterType::Triangle)
}

/// Grayscale that keeps saturated (colored) text bright, with a contrast boost
fn enhanced_grayscale(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let (r, g, b) = (pixel[0] as u32, pixel[1] as u32, pixel[2] as u32);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);

        // (max - min) / max > 0.3 without the division
        let saturated = max > 0 && (max - min) * 10 > max * 3;
        let value = if saturated {
            max
        } else {
            (77 * r + 150 * g + 29 * b) >> 8
        };

        let centered = value as i32 - 128;
        Luma([(value as i32 + centered / 2).clamp(0, 255) as u8])
    })
}

/// Otsu's method over the 256-bin histogram
fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as u64 * count)
        .sum();

    let mut sum_background = 0u64;
    let mut weight_background = 0u64;
    let mut best = (0.0f64, 0u8);

    for (level, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += level as u64 * count;
        let mean_background = sum_background as f64 / weight_background as f64;
        let mean_foreground = (sum - sum_background) as f64 / weight_foreground as f64;
        let variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if variance > best.0 {
            best = (variance, level as u8);
        }
    }

    best.1
}

/// Apply a cross-shaped 3x3 kernel to every interior row in parallel
fn cross_filter(image: &GrayImage, keep: impl Fn([bool; 5]) -> bool + Sync) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut output = GrayImage::new(width, height);
    let white = |x: u32, y: u32| image.get_pixel(x, y)[0] > 127;

    output
        .as_flat_samples_mut()
        .samples
        .par_chunks_mut(width as usize)
        .enumerate()
        .skip(1)
        .take(height.saturating_sub(2) as usize)
        .for_each(|(y, row)| {
            let y = y as u32;
            for x in 1..width - 1 {
                let neighbours = [
                    white(x, y),
                    white(x, y - 1),
                    white(x, y + 1),
                    white(x - 1, y),
                    white(x + 1, y),
                ];
                row[x as usize] = if keep(neighbours) { 255 } else { 0 };
            }
        });

    output
}

fn erode(image: &GrayImage) -> GrayImage {
    cross_filter(image, |n| n.iter().all(|&w| w))
}

fn dilate(image: &GrayImage) -> GrayImage {
    cross_filter(image, |n| n.iter().any(|&w| w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_preprocessor_creation() {
        let preprocessor = ImagePreprocessor::new(0, false);
        assert!(preprocessor.manual_threshold.is_none());

        let preprocessor = ImagePreprocessor::new(150, true);
        assert_eq!(preprocessor.manual_threshold, Some(150));
        assert!(preprocessor.enable_morph_open);
    }

    #[test]
    fn test_enhanced_grayscale_extremes() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));

        let gray = enhanced_grayscale(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_otsu_threshold_bimodal() {
        let gray = GrayImage::from_fn(100, 100, |x, _| Luma([if x < 50 { 50 } else { 200 }]));
        let threshold = otsu_threshold(&gray);
        assert!((50..200).contains(&threshold));
    }

    #[test]
    fn test_small_region_upscaled_and_text_dark() {
        // White text stripe on a dark plate
        let img = RgbaImage::from_fn(40, 8, |_, y| {
            if y == 4 {
                Rgba([240, 240, 240, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        });
        let binary = ImagePreprocessor::default().preprocess(&img);

        assert_eq!(binary.height(), 32);
        let white = binary.pixels().filter(|p| p[0] > 127).count();
        assert!(white * 2 >= (binary.width() * binary.height()) as usize);
    }

    #[test]
    fn test_morph_open_removes_speckles() {
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        img.put_pixel(20, 20, Rgba([255, 255, 255, 255]));

        let binary = ImagePreprocessor::new(128, true).preprocess(&img);
        // The lone speckle is gone, so after inversion everything is light
        assert!(binary.pixels().all(|p| p[0] == 255));
    }
}
