use std::fs;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::systems::{contour_extraction::ContourFilterMode, preprocessing::BlurMethod};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    // -------- FRAME SETTINGS
    /// Expected frame width in px; consolidated regions are clamped to this
    pub frame_width: u32,

    /// Expected frame height in px
    pub frame_height: u32,

    // -------- PREPROCESSING SETTINGS
    /// Convert colour input to luma; if disabled, the first channel of a
    /// multi-channel frame is taken as-is
    pub preprocess_grayscale: bool,

    /// Apply adaptive (tile-based, contrast-limited) histogram equalization
    pub equalize_enable: bool,

    /// Clip limit as a multiplier on the uniform histogram bin count
    pub equalize_clip_limit: f32,

    /// Equalization tile size in px
    pub equalize_tile_size: u32,

    /// Which noise-reduction blur to run after equalization
    pub blur_method: BlurMethod,

    /// Blur kernel size in px; must be positive and odd
    pub blur_kernel_size: u32,

    /// Gaussian blur standard deviation
    pub blur_sigma: f32,

    /// Bilateral blur: how much intensity difference suppresses smoothing
    pub bilateral_sigma_color: f32,

    /// Bilateral blur: spatial falloff within the kernel window
    pub bilateral_sigma_spatial: f32,

    // -------- MOTION DETECTION SETTINGS
    /// Fuse a running-average background model into the difference mask
    /// (catches slow movers that frame differencing misses)
    pub background_enable: bool,

    /// Per-frame blend factor of the background model, in (0, 1]
    pub background_learning_rate: f32,

    /// Min |pixel - background| for a pixel to count as foreground
    pub background_delta_threshold: u8,

    // -------- MASK CLEANUP SETTINGS
    /// Close: fill small holes inside blobs
    pub morph_close_enable: bool,

    /// Open: remove speckle noise
    pub morph_open_enable: bool,

    /// Dilate: connect and expand nearby blobs
    pub morph_dilate_enable: bool,

    /// Erode: counter over-expansion from dilation
    pub morph_erode_enable: bool,

    /// Shared structuring-element radius for all enabled operations
    pub morph_kernel_radius: u32,

    // -------- CONTOUR FILTERING SETTINGS
    /// Fixed permissive thresholds, or thresholds learned from the contour
    /// population of the current frame
    pub contour_filter_mode: ContourFilterMode,

    /// How many calls to reuse learned thresholds before recomputing them
    pub adaptive_refresh_interval: u32,

    // -------- CONSOLIDATION SETTINGS
    /// Weight of the overlap component in the object distance metric
    pub overlap_weight: f32,

    /// Weight of the boundary-gap component in the object distance metric
    pub edge_weight: f32,

    /// Cap (in px) on both metric components; also the distance assigned to
    /// fully disjoint boxes by the overlap component
    pub max_edge_distance: f32,

    /// Max metric distance between two objects in the same neighbourhood
    pub clustering_eps: f32,

    /// Min neighbours (self included) for an object to be a core point
    pub clustering_min_neighbours: usize,

    /// Clusters smaller than this never become regions
    pub min_objects_per_region: usize,

    /// Symmetric growth applied to a region's union box (0.2 = +10% per side)
    pub region_expansion_factor: f32,

    /// Regions below this area (px^2) are withheld from the detector handoff
    pub min_region_area: f32,

    /// Regions above this area (px^2) are withheld from the detector handoff
    pub max_region_area: f32,

    /// How many consecutive calls a region may go unmatched before removal
    pub max_frames_without_update: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            frame_width: 1920,
            frame_height: 1080,
            preprocess_grayscale: true,
            equalize_enable: true,
            equalize_clip_limit: 2.0,
            equalize_tile_size: 8,
            blur_method: BlurMethod::Gaussian,
            blur_kernel_size: 5,
            blur_sigma: 1.5,
            bilateral_sigma_color: 25.,
            bilateral_sigma_spatial: 7.5,
            background_enable: true,
            background_learning_rate: 0.05,
            background_delta_threshold: 25,
            morph_close_enable: true,
            morph_open_enable: true,
            morph_dilate_enable: true,
            morph_erode_enable: false,
            morph_kernel_radius: 2,
            contour_filter_mode: ContourFilterMode::Adaptive,
            adaptive_refresh_interval: 30,
            overlap_weight: 0.5,
            edge_weight: 0.5,
            max_edge_distance: 300.,
            clustering_eps: 150.,
            clustering_min_neighbours: 2,
            min_objects_per_region: 2,
            region_expansion_factor: 0.2,
            min_region_area: 400.,
            max_region_area: 262_144.,
            max_frames_without_update: 30,
        }
    }
}

impl PipelineConfig {
    /// Replace every out-of-range value with its documented default, logging
    /// each substitution. Invalid tunables are never fatal.
    pub fn sanitized(mut self) -> PipelineConfig {
        let defaults = PipelineConfig::default();

        if self.frame_width == 0 || self.frame_height == 0 {
            warn!(
                "Invalid frame size {}x{}; using {}x{}",
                self.frame_width, self.frame_height, defaults.frame_width, defaults.frame_height
            );
            self.frame_width = defaults.frame_width;
            self.frame_height = defaults.frame_height;
        }
        if self.equalize_clip_limit <= 0. {
            warn!("Equalization clip limit must be positive; using default");
            self.equalize_clip_limit = defaults.equalize_clip_limit;
        }
        if self.equalize_tile_size == 0 {
            warn!("Equalization tile size must be positive; using default");
            self.equalize_tile_size = defaults.equalize_tile_size;
        }
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            warn!(
                "Blur kernel size must be positive and odd, got {}; using {}",
                self.blur_kernel_size, defaults.blur_kernel_size
            );
            self.blur_kernel_size = defaults.blur_kernel_size;
        }
        if self.blur_sigma <= 0. {
            warn!("Blur sigma must be positive; using default");
            self.blur_sigma = defaults.blur_sigma;
        }
        if self.bilateral_sigma_color <= 0. || self.bilateral_sigma_spatial <= 0. {
            warn!("Bilateral sigmas must be positive; using defaults");
            self.bilateral_sigma_color = defaults.bilateral_sigma_color;
            self.bilateral_sigma_spatial = defaults.bilateral_sigma_spatial;
        }
        if self.background_learning_rate <= 0. || self.background_learning_rate > 1. {
            warn!(
                "Background learning rate must be in (0, 1], got {}; using {}",
                self.background_learning_rate, defaults.background_learning_rate
            );
            self.background_learning_rate = defaults.background_learning_rate;
        }
        if self.morph_kernel_radius == 0 || self.morph_kernel_radius > 15 {
            warn!(
                "Morphology kernel radius must be in 1..=15, got {}; using {}",
                self.morph_kernel_radius, defaults.morph_kernel_radius
            );
            self.morph_kernel_radius = defaults.morph_kernel_radius;
        }
        if self.adaptive_refresh_interval == 0 {
            warn!("Adaptive refresh interval must be positive; using default");
            self.adaptive_refresh_interval = defaults.adaptive_refresh_interval;
        }

        if self.overlap_weight < 0. || self.edge_weight < 0. {
            warn!("Distance weights must be non-negative; using defaults");
            self.overlap_weight = defaults.overlap_weight;
            self.edge_weight = defaults.edge_weight;
        }
        let weight_sum = self.overlap_weight + self.edge_weight;
        if weight_sum <= 0. {
            warn!("Distance weights sum to zero; using defaults");
            self.overlap_weight = defaults.overlap_weight;
            self.edge_weight = defaults.edge_weight;
        } else if (weight_sum - 1.).abs() > f32::EPSILON {
            // Normalized so the metric stays within [0, maxEdgeDistance]
            debug!("Normalizing distance weights (sum was {})", weight_sum);
            self.overlap_weight /= weight_sum;
            self.edge_weight /= weight_sum;
        }
        if self.max_edge_distance <= 0. {
            warn!("Max edge distance must be positive; using default");
            self.max_edge_distance = defaults.max_edge_distance;
        }
        if self.clustering_eps <= 0. {
            warn!("Clustering eps must be positive; using default");
            self.clustering_eps = defaults.clustering_eps;
        }
        if self.clustering_min_neighbours == 0 {
            warn!("Clustering min neighbours must be positive; using default");
            self.clustering_min_neighbours = defaults.clustering_min_neighbours;
        }
        if self.min_objects_per_region < 2 {
            warn!(
                "Min objects per region must be at least 2 (a single object never forms a region); using {}",
                defaults.min_objects_per_region
            );
            self.min_objects_per_region = defaults.min_objects_per_region;
        }
        if self.region_expansion_factor < 0. {
            warn!("Region expansion factor must be non-negative; using default");
            self.region_expansion_factor = defaults.region_expansion_factor;
        }
        if self.min_region_area < 0. || self.max_region_area <= self.min_region_area {
            warn!("Invalid region area band; using defaults");
            self.min_region_area = defaults.min_region_area;
            self.max_region_area = defaults.max_region_area;
        }

        self
    }

    /// Parse a complete replacement config from a JSON payload, e.g. one sent
    /// by a supervising process between frames.
    pub fn parse_update(&mut self, payload: &[u8]) -> Result<()> {
        match serde_json::from_slice::<PipelineConfig>(payload) {
            Ok(config) => {
                *self = config.sanitized();
                Ok(())
            }
            Err(e) => Err(anyhow!("Failed to parse config from payload: {}", e)),
        }
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        match fs::write(config_file_path, text) {
            Ok(()) => {
                info!("Wrote config to file: {:?}", config_file_path);
                Ok(())
            }
            Err(e) => {
                error!("Error writing config to file: {:?}", e);
                Err(anyhow!("failed to write config: {}", e))
            }
        }
    }
}

/// Load config from a JSON file. A missing or unparseable file is reported
/// and replaced by the built-in defaults; it never halts the pipeline.
pub fn load_config_from_file(config_file_path: &str) -> PipelineConfig {
    match std::fs::read_to_string(config_file_path) {
        Err(e) => {
            warn!(
                "Pipeline config not readable at \"{}\" ({}); using defaults",
                config_file_path, e
            );
            PipelineConfig::default()
        }
        Ok(s) => match serde_json::from_str::<PipelineConfig>(&s) {
            Ok(loaded_config) => {
                info!("Loaded pipeline config OK from \"{}\"", config_file_path);
                debug!("Config parsed from file: {:?}", &loaded_config);
                loaded_config.sanitized()
            }
            Err(e) => {
                warn!(
                    "Failed to parse config data from \"{}\" ({}); using defaults",
                    config_file_path, e
                );
                PipelineConfig::default()
            }
        },
    }
}
