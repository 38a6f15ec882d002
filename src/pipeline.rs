use log::{debug, warn};

use crate::pipeline_config::PipelineConfig;
use crate::systems::Systems;
use crate::tracking::{ConsolidatedRegion, MotionBox, TrackedObject};
use crate::Frame;

/// The full frame-to-regions pipeline for a single feed. One instance per
/// camera; instances share nothing, so independent feeds can run in separate
/// threads without locking. All processing is synchronous and in call order.
pub struct MotionPipeline {
    config: PipelineConfig,
    systems: Systems,
    latest_motion_boxes: Vec<MotionBox>,
}

impl MotionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.sanitized();
        let systems = Systems::new(&config);
        MotionPipeline {
            config,
            systems,
            latest_motion_boxes: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Live reconfiguration between calls: tunables change without dropping
    /// the previous-frame baseline, threshold cache or retained regions.
    pub fn apply_config(&mut self, config: PipelineConfig) {
        let config = config.sanitized();
        self.systems.apply_config(&config);
        self.config = config;
        debug!("Applied updated pipeline config");
    }

    /// Stages 1-4: raw frame in, filtered motion boxes out. A malformed frame
    /// short-circuits to an empty result and leaves all stage state exactly
    /// as it was.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<MotionBox> {
        if !frame.is_valid() {
            warn!(
                "Dropping malformed frame ({}x{}, {} channels, {} bytes)",
                frame.width,
                frame.height,
                frame.channels,
                frame.data.len()
            );
            self.latest_motion_boxes.clear();
            return Vec::new();
        }

        let Some(prepared) = self.systems.preprocessor.preprocess(frame) else {
            warn!("Preprocessing rejected frame; yielding no motion");
            self.latest_motion_boxes.clear();
            return Vec::new();
        };

        let mask = self.systems.motion_detector.detect(&prepared);
        let cleaned = self.systems.mask_cleaner.clean(&mask);
        let boxes = self.systems.contour_extractor.extract(&cleaned);

        self.latest_motion_boxes = boxes.clone();
        boxes
    }

    /// Stage 5: consolidate the external tracker's objects into the retained
    /// region set and return a snapshot of it. An empty input ages (and may
    /// prune) regions but never clears them outright.
    pub fn consolidate(&mut self, objects: &[TrackedObject]) -> Vec<ConsolidatedRegion> {
        self.systems.region_consolidator.consolidate(objects);
        self.systems
            .region_consolidator
            .regions()
            .cloned()
            .collect()
    }

    /// Motion boxes from the most recent completed frame
    pub fn latest_motion_boxes(&self) -> &[MotionBox] {
        &self.latest_motion_boxes
    }

    pub fn regions(&self) -> impl Iterator<Item = &ConsolidatedRegion> {
        self.systems.region_consolidator.regions()
    }

    /// Regions within the configured area band, for the downstream detector
    pub fn detector_ready_regions(&self) -> Vec<&ConsolidatedRegion> {
        self.systems.region_consolidator.detector_ready_regions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            frame_width: 64,
            frame_height: 64,
            equalize_enable: false,
            background_enable: false,
            ..Default::default()
        }
    }

    fn flat_frame_data(value: u8) -> Vec<u8> {
        vec![value; 64 * 64]
    }

    #[test]
    fn test_first_frame_always_empty() {
        let mut pipeline = MotionPipeline::new(test_config());
        let data = flat_frame_data(40);
        let boxes = pipeline.process_frame(&Frame {
            data: &data,
            width: 64,
            height: 64,
            channels: 1,
        });
        assert!(boxes.is_empty());
        assert!(pipeline.latest_motion_boxes().is_empty());
    }

    #[test]
    fn test_malformed_frame_leaves_state_untouched() {
        let mut pipeline = MotionPipeline::new(test_config());
        let data = flat_frame_data(40);
        pipeline.process_frame(&Frame {
            data: &data,
            width: 64,
            height: 64,
            channels: 1,
        });

        // Zero-dimension and wrong-size buffers both short-circuit
        let boxes = pipeline.process_frame(&Frame {
            data: &data,
            width: 0,
            height: 64,
            channels: 1,
        });
        assert!(boxes.is_empty());
        let boxes = pipeline.process_frame(&Frame {
            data: &data[..100],
            width: 64,
            height: 64,
            channels: 1,
        });
        assert!(boxes.is_empty());

        // The baseline survived: a frame with a bright square diffs against
        // the original flat frame, not against a reset detector
        let mut square = flat_frame_data(40);
        for y in 20..40 {
            for x in 20..40 {
                square[y * 64 + x] = 250;
            }
        }
        let boxes = pipeline.process_frame(&Frame {
            data: &square,
            width: 64,
            height: 64,
            channels: 1,
        });
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn test_apply_config_keeps_regions() {
        let mut pipeline = MotionPipeline::new(test_config());
        pipeline.consolidate(&[
            TrackedObject::new(1, MotionBox::new(10, 10, 20, 20)),
            TrackedObject::new(2, MotionBox::new(12, 12, 20, 20)),
        ]);
        assert_eq!(pipeline.regions().count(), 1);

        let mut updated = test_config();
        updated.clustering_eps = 42.;
        pipeline.apply_config(updated);

        assert_eq!(pipeline.regions().count(), 1);
        assert_eq!(pipeline.config().clustering_eps, 42.);
    }
}
