use image::{imageops, GrayImage, RgbImage, RgbaImage};
use imageproc::filter::{bilateral_filter, gaussian_blur_f32, median_filter};
use serde::{Deserialize, Serialize};

use crate::Frame;

/// Which noise-reduction blur to run as the final preprocessing step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurMethod {
    Gaussian,
    Median,
    Bilateral,
}

pub struct PreprocessSettings {
    pub grayscale: bool,
    pub equalize_enable: bool,
    pub equalize_clip_limit: f32,
    pub equalize_tile_size: u32,
    pub blur_method: BlurMethod,
    pub blur_kernel_size: u32,
    pub blur_sigma: f32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_spatial: f32,
}

/// Stateless normalization stage: single-channel conversion, optional
/// adaptive equalization, one configurable blur.
pub struct FramePreprocessor {
    settings: PreprocessSettings,
}

impl FramePreprocessor {
    pub fn new(settings: PreprocessSettings) -> Self {
        FramePreprocessor { settings }
    }

    pub fn set_settings(&mut self, settings: PreprocessSettings) {
        self.settings = settings;
    }

    /// Returns None only for a buffer that does not match its advertised
    /// dimensions; the caller treats that as a degenerate "no motion" frame.
    pub fn preprocess(&self, frame: &Frame) -> Option<GrayImage> {
        let gray = self.to_single_channel(frame)?;

        let equalized = if self.settings.equalize_enable {
            equalize_adaptive(
                &gray,
                self.settings.equalize_tile_size,
                self.settings.equalize_clip_limit,
            )
        } else {
            gray
        };

        Some(match self.settings.blur_method {
            BlurMethod::Gaussian => gaussian_blur_f32(&equalized, self.settings.blur_sigma),
            BlurMethod::Median => {
                let radius = self.settings.blur_kernel_size / 2;
                median_filter(&equalized, radius, radius)
            }
            BlurMethod::Bilateral => bilateral_filter(
                &equalized,
                self.settings.blur_kernel_size,
                self.settings.bilateral_sigma_color,
                self.settings.bilateral_sigma_spatial,
            ),
        })
    }

    fn to_single_channel(&self, frame: &Frame) -> Option<GrayImage> {
        let Frame {
            data,
            width,
            height,
            channels,
        } = *frame;

        if channels == 1 {
            return GrayImage::from_raw(width, height, data.to_vec());
        }
        if !self.settings.grayscale {
            // Pass-through: take the first channel of the interleaved buffer
            let plane: Vec<u8> = data.chunks_exact(channels as usize).map(|px| px[0]).collect();
            return GrayImage::from_raw(width, height, plane);
        }
        match channels {
            3 => {
                let rgb = RgbImage::from_raw(width, height, data.to_vec())?;
                Some(imageops::grayscale(&rgb))
            }
            4 => {
                let rgba = RgbaImage::from_raw(width, height, data.to_vec())?;
                Some(imageops::grayscale(&rgba))
            }
            _ => None,
        }
    }
}

/// Contrast-limited adaptive histogram equalization. The image is split into
/// tiles, each tile's histogram is clipped and turned into a remap LUT, and
/// every pixel blends the LUTs of its four nearest tile centres (plain global
/// equalization would let one bright area wash out contrast everywhere else).
pub fn equalize_adaptive(image: &GrayImage, tile_size: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || tile_size == 0 {
        return image.clone();
    }

    let cols = width.div_ceil(tile_size) as usize;
    let rows = height.div_ceil(tile_size) as usize;

    let mut tile_luts = vec![[0u8; 256]; cols * rows];
    for tile_row in 0..rows {
        for tile_col in 0..cols {
            let x0 = tile_col as u32 * tile_size;
            let y0 = tile_row as u32 * tile_size;
            let x1 = (x0 + tile_size).min(width);
            let y1 = (y0 + tile_size).min(height);
            let tile_pixels = ((x1 - x0) * (y1 - y0)) as usize;

            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            clip_histogram(&mut histogram, tile_pixels, clip_limit);
            tile_luts[tile_row * cols + tile_col] = build_lut(&histogram, tile_pixels);
        }
    }

    let tile_centre = |index: usize| (index as f32 + 0.5) * tile_size as f32;

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            // Two nearest tile indices per axis, weights from centre offsets
            let fx = (x as f32 / tile_size as f32) - 0.5;
            let fy = (y as f32 / tile_size as f32) - 0.5;
            let col0 = (fx.floor().max(0.) as usize).min(cols - 1);
            let row0 = (fy.floor().max(0.) as usize).min(rows - 1);
            let col1 = (col0 + 1).min(cols - 1);
            let row1 = (row0 + 1).min(rows - 1);

            let tx = if col0 == col1 {
                0.
            } else {
                ((x as f32 - tile_centre(col0)) / (tile_centre(col1) - tile_centre(col0)))
                    .clamp(0., 1.)
            };
            let ty = if row0 == row1 {
                0.
            } else {
                ((y as f32 - tile_centre(row0)) / (tile_centre(row1) - tile_centre(row0)))
                    .clamp(0., 1.)
            };

            let value = image.get_pixel(x, y)[0] as usize;
            let v00 = tile_luts[row0 * cols + col0][value] as f32;
            let v10 = tile_luts[row0 * cols + col1][value] as f32;
            let v01 = tile_luts[row1 * cols + col0][value] as f32;
            let v11 = tile_luts[row1 * cols + col1][value] as f32;

            let blended = v00 * (1. - tx) * (1. - ty)
                + v10 * tx * (1. - ty)
                + v01 * (1. - tx) * ty
                + v11 * tx * ty;
            out.put_pixel(x, y, image::Luma([blended.round().clamp(0., 255.) as u8]));
        }
    }
    out
}

fn build_lut(histogram: &[u32; 256], total: usize) -> [u8; 256] {
    let mut cdf = [0u32; 256];
    cdf[0] = histogram[0];
    for i in 1..256 {
        cdf[i] = cdf[i - 1] + histogram[i];
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let mut lut = [0u8; 256];
    let denominator = total as f32 - cdf_min as f32;
    if denominator <= 0. {
        // Uniform tile; every pixel maps to 0
        return lut;
    }
    for i in 0..256 {
        let value = (cdf[i] as f32 - cdf_min as f32) / denominator * 255.;
        lut[i] = value.round().clamp(0., 255.) as u8;
    }
    lut
}

/// Clip histogram bins at `clip_limit` times the uniform bin count and spread
/// the excess evenly; this bounds the slope of the remap and so bounds noise
/// amplification in flat tiles.
fn clip_histogram(histogram: &mut [u32; 256], tile_pixels: usize, clip_limit: f32) {
    let clip_at = ((tile_pixels as f32 / 256.) * clip_limit).ceil() as u32;

    let mut excess = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > clip_at {
            excess += *bin - clip_at;
            *bin = clip_at;
        }
    }

    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in histogram.iter_mut().enumerate() {
        *bin += per_bin;
        if i < remainder {
            *bin += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PreprocessSettings {
        PreprocessSettings {
            grayscale: true,
            equalize_enable: false,
            equalize_clip_limit: 2.0,
            equalize_tile_size: 8,
            blur_method: BlurMethod::Median,
            blur_kernel_size: 3,
            blur_sigma: 1.5,
            bilateral_sigma_color: 25.,
            bilateral_sigma_spatial: 7.5,
        }
    }

    #[test]
    fn test_single_channel_pass_through() {
        let data = vec![7u8; 12];
        let frame = Frame {
            data: &data,
            width: 4,
            height: 3,
            channels: 1,
        };
        let out = FramePreprocessor::new(settings()).preprocess(&frame).unwrap();
        assert_eq!(out.dimensions(), (4, 3));
        assert!(out.pixels().all(|p| p[0] == 7));
    }

    #[test]
    fn test_rgb_conversion_and_first_channel_mode() {
        // 4x4 RGB: left half pure red, right half pure blue
        let mut data = Vec::new();
        for _y in 0..4 {
            for x in 0..4 {
                if x < 2 {
                    data.extend_from_slice(&[255, 0, 0]);
                } else {
                    data.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        let frame = Frame {
            data: &data,
            width: 4,
            height: 4,
            channels: 3,
        };

        let luma = FramePreprocessor::new(settings()).preprocess(&frame).unwrap();
        // Luma weights make red brighter than blue
        assert!(luma.get_pixel(0, 0)[0] > luma.get_pixel(3, 0)[0]);

        let mut raw = settings();
        raw.grayscale = false;
        let first = FramePreprocessor::new(raw).preprocess(&frame).unwrap();
        assert_eq!(first.get_pixel(0, 0)[0], 255);
        assert_eq!(first.get_pixel(3, 0)[0], 0);
    }

    #[test]
    fn test_mismatched_buffer_rejected() {
        let data = vec![0u8; 5];
        let frame = Frame {
            data: &data,
            width: 4,
            height: 3,
            channels: 1,
        };
        assert!(FramePreprocessor::new(settings()).preprocess(&frame).is_none());
    }

    #[test]
    fn test_equalize_adaptive_expands_low_contrast() {
        let mut image = GrayImage::new(32, 32);
        for (x, y, px) in image.enumerate_pixels_mut() {
            px[0] = 100 + ((x + y) % 10) as u8;
        }
        let out = equalize_adaptive(&image, 8, 2.0);
        assert_eq!(out.dimensions(), (32, 32));
        let min = out.pixels().map(|p| p[0]).min().unwrap();
        let max = out.pixels().map(|p| p[0]).max().unwrap();
        assert!(max - min > 50, "range {min}..{max} not expanded");
    }

    #[test]
    fn test_equalize_adaptive_uniform_image() {
        let image = GrayImage::from_raw(20, 15, vec![128; 300]).unwrap();
        let out = equalize_adaptive(&image, 8, 2.0);
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }
}
