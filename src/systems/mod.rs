pub mod consolidation;
pub mod contour_extraction;
pub mod mask_cleanup;
pub mod motion_detection;
pub mod preprocessing;

use consolidation::{ConsolidationSettings, RegionConsolidator};
use contour_extraction::{ContourExtractor, ContourSettings};
use mask_cleanup::{CleanupSettings, MorphologicalCleaner};
use motion_detection::{MotionDetector, MotionSettings};
use preprocessing::{FramePreprocessor, PreprocessSettings};

use crate::pipeline_config::PipelineConfig;

pub struct Systems {
    pub preprocessor: FramePreprocessor,
    pub motion_detector: MotionDetector,
    pub mask_cleaner: MorphologicalCleaner,
    pub contour_extractor: ContourExtractor,
    pub region_consolidator: RegionConsolidator,
}

impl Systems {
    pub fn new(config: &PipelineConfig) -> Systems {
        Systems {
            preprocessor: FramePreprocessor::new(preprocess_settings(config)),
            motion_detector: MotionDetector::new(motion_settings(config)),
            mask_cleaner: MorphologicalCleaner::new(cleanup_settings(config)),
            contour_extractor: ContourExtractor::new(contour_settings(config)),
            region_consolidator: RegionConsolidator::new(consolidation_settings(config)),
        }
    }

    /// Re-derive every system's settings from `config` without disturbing
    /// accumulated state (previous frame, threshold cache, retained regions).
    pub fn apply_config(&mut self, config: &PipelineConfig) {
        self.preprocessor.set_settings(preprocess_settings(config));
        self.motion_detector.set_settings(motion_settings(config));
        self.mask_cleaner.set_settings(cleanup_settings(config));
        self.contour_extractor.set_settings(contour_settings(config));
        self.region_consolidator
            .set_settings(consolidation_settings(config));
    }
}

fn preprocess_settings(config: &PipelineConfig) -> PreprocessSettings {
    PreprocessSettings {
        grayscale: config.preprocess_grayscale,
        equalize_enable: config.equalize_enable,
        equalize_clip_limit: config.equalize_clip_limit,
        equalize_tile_size: config.equalize_tile_size,
        blur_method: config.blur_method,
        blur_kernel_size: config.blur_kernel_size,
        blur_sigma: config.blur_sigma,
        bilateral_sigma_color: config.bilateral_sigma_color,
        bilateral_sigma_spatial: config.bilateral_sigma_spatial,
    }
}

fn motion_settings(config: &PipelineConfig) -> MotionSettings {
    MotionSettings {
        background_enable: config.background_enable,
        learning_rate: config.background_learning_rate,
        delta_threshold: config.background_delta_threshold,
    }
}

fn cleanup_settings(config: &PipelineConfig) -> CleanupSettings {
    CleanupSettings {
        close_enable: config.morph_close_enable,
        open_enable: config.morph_open_enable,
        dilate_enable: config.morph_dilate_enable,
        erode_enable: config.morph_erode_enable,
        kernel_radius: config.morph_kernel_radius as u8,
    }
}

fn contour_settings(config: &PipelineConfig) -> ContourSettings {
    ContourSettings {
        mode: config.contour_filter_mode,
        refresh_interval: config.adaptive_refresh_interval,
    }
}

fn consolidation_settings(config: &PipelineConfig) -> ConsolidationSettings {
    ConsolidationSettings {
        overlap_weight: config.overlap_weight,
        edge_weight: config.edge_weight,
        max_edge_distance: config.max_edge_distance,
        eps: config.clustering_eps,
        min_neighbours: config.clustering_min_neighbours,
        min_objects_per_region: config.min_objects_per_region,
        expansion_factor: config.region_expansion_factor,
        min_region_area: config.min_region_area,
        max_region_area: config.max_region_area,
        frame_width: config.frame_width,
        frame_height: config.frame_height,
        max_frames_without_update: config.max_frames_without_update,
    }
}
