use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use log::debug;

pub struct MotionSettings {
    pub background_enable: bool,
    pub learning_rate: f32,
    pub delta_threshold: u8,
}

/// Frame-differencing motion detector. Uninitialized until the first call
/// stores a baseline; from then on every call diffs against the stored
/// previous frame and overwrites it on the way out.
pub struct MotionDetector {
    settings: MotionSettings,
    previous: Option<GrayImage>,
    background: Option<Vec<f32>>,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Self {
        MotionDetector {
            settings,
            previous: None,
            background: None,
        }
    }

    /// Settings changes keep the baseline and background state
    pub fn set_settings(&mut self, settings: MotionSettings) {
        if !settings.background_enable {
            self.background = None;
        }
        self.settings = settings;
    }

    /// Produce a binary motion mask with the same dimensions as the input.
    /// The first call (and any call after a resolution change) only
    /// establishes the baseline and returns an empty mask.
    pub fn detect(&mut self, current: &GrayImage) -> GrayImage {
        let (width, height) = current.dimensions();

        let previous = match self.previous.take() {
            Some(previous) if previous.dimensions() == current.dimensions() => previous,
            Some(_) => {
                debug!("Frame dimensions changed; re-establishing baseline");
                self.reset_with(current);
                return GrayImage::new(width, height);
            }
            None => {
                self.reset_with(current);
                return GrayImage::new(width, height);
            }
        };

        let difference = absolute_difference(&previous, current);

        // Otsu picks the split between residual noise and real change, so the
        // mask follows lighting rather than a fixed cutoff
        let level = otsu_level(&difference);
        let mut mask = threshold(&difference, level, ThresholdType::Binary);

        if self.settings.background_enable {
            let foreground = self.background_foreground(current);
            merge_masks(&mut mask, &foreground);
        }

        self.previous = Some(current.clone());
        mask
    }

    pub fn is_initialized(&self) -> bool {
        self.previous.is_some()
    }

    fn reset_with(&mut self, current: &GrayImage) {
        self.previous = Some(current.clone());
        self.background = if self.settings.background_enable {
            Some(current.iter().map(|&p| p as f32).collect())
        } else {
            None
        };
    }

    /// Foreground = pixels far from the running average; the average then
    /// absorbs the current frame at the configured learning rate.
    fn background_foreground(&mut self, current: &GrayImage) -> GrayImage {
        let (width, height) = current.dimensions();
        let alpha = self.settings.learning_rate;
        let delta = self.settings.delta_threshold as f32;

        let model = self
            .background
            .get_or_insert_with(|| current.iter().map(|&p| p as f32).collect());
        if model.len() != current.len() {
            *model = current.iter().map(|&p| p as f32).collect();
            return GrayImage::new(width, height);
        }

        let mut foreground = GrayImage::new(width, height);
        for (accumulated, (&pixel, out)) in model
            .iter_mut()
            .zip(current.iter().zip(foreground.iter_mut()))
        {
            if (pixel as f32 - *accumulated).abs() > delta {
                *out = 255;
            }
            *accumulated = (1. - alpha) * *accumulated + alpha * pixel as f32;
        }
        foreground
    }
}

fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for ((&pa, &pb), po) in a.iter().zip(b.iter()).zip(out.iter_mut()) {
        *po = pa.abs_diff(pb);
    }
    out
}

/// Logical OR of two binary masks, in place on the first
fn merge_masks(mask: &mut GrayImage, other: &GrayImage) {
    for (po, &pf) in mask.iter_mut().zip(other.iter()) {
        if pf > 0 {
            *po = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(background_enable: bool) -> MotionSettings {
        MotionSettings {
            background_enable,
            learning_rate: 0.05,
            delta_threshold: 25,
        }
    }

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_raw(width, height, vec![value; (width * height) as usize]).unwrap()
    }

    fn with_square(mut image: GrayImage, x0: u32, y0: u32, size: u32, value: u8) -> GrayImage {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                image.put_pixel(x, y, image::Luma([value]));
            }
        }
        image
    }

    #[test]
    fn test_first_call_establishes_baseline_and_returns_empty() {
        let mut detector = MotionDetector::new(settings(true));
        assert!(!detector.is_initialized());

        let mask = detector.detect(&flat(64, 48, 10));
        assert!(detector.is_initialized());
        assert_eq!(mask.dimensions(), (64, 48));
        assert!(mask.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_bright_square_shows_in_mask() {
        let mut detector = MotionDetector::new(settings(false));
        detector.detect(&flat(64, 64, 10));

        let moved = with_square(flat(64, 64, 10), 20, 20, 16, 250);
        let mask = detector.detect(&moved);

        assert!(mask.get_pixel(28, 28)[0] > 0, "square interior not flagged");
        assert_eq!(mask.get_pixel(2, 2)[0], 0, "static background flagged");
    }

    #[test]
    fn test_previous_frame_is_overwritten() {
        let mut detector = MotionDetector::new(settings(false));
        detector.detect(&flat(32, 32, 10));
        let moved = with_square(flat(32, 32, 10), 4, 4, 8, 250);
        detector.detect(&moved);

        // Same frame again: difference collapses back to (near) nothing
        let mask = detector.detect(&moved);
        let lit = mask.iter().filter(|&&p| p > 0).count();
        assert_eq!(lit, 0, "identical consecutive frames produced motion");
    }

    #[test]
    fn test_background_model_keeps_slow_change_visible() {
        let mut detector = MotionDetector::new(settings(true));
        detector.detect(&flat(32, 32, 10));

        let object = with_square(flat(32, 32, 10), 8, 8, 8, 200);
        detector.detect(&object);
        // Object holds still: frame differencing alone would go dark, but the
        // background model still reports it until the average catches up
        let mask = detector.detect(&object);
        assert!(mask.get_pixel(10, 10)[0] > 0);
    }

    #[test]
    fn test_resolution_change_resets_baseline() {
        let mut detector = MotionDetector::new(settings(false));
        detector.detect(&flat(32, 32, 10));
        let mask = detector.detect(&flat(16, 16, 200));
        assert_eq!(mask.dimensions(), (16, 16));
        assert!(mask.iter().all(|&p| p == 0));
    }
}
