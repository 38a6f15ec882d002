use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use serde::Serialize;

use motion_region_consolidation::pipeline::MotionPipeline;
use motion_region_consolidation::pipeline_config::load_config_from_file;
use motion_region_consolidation::tracking::{ConsolidatedRegion, MotionBox, TrackedObject};
use motion_region_consolidation::Frame;

mod cli;
mod tracker;

use cli::Cli;
use tracker::StandInTracker;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff"];

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FrameResult {
    frame: String,
    motion_boxes: Vec<MotionBox>,
    tracked_objects: Vec<TrackedObject>,
    regions: Vec<ConsolidatedRegion>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    debug!("Started; args: {:?}", cli);

    let mut config = load_config_from_file(&cli.config_path);
    let mut pipeline = MotionPipeline::new(config.clone());
    let mut tracker = StandInTracker::new(
        cli.tracker_max_match_distance,
        cli.tracker_max_missed_frames,
    );

    let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(&cli.frames_dir)
        .with_context(|| format!("failed to read frames directory \"{}\"", cli.frames_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    frame_paths.sort();

    info!(
        "Processing {} frames from \"{}\"",
        frame_paths.len(),
        cli.frames_dir
    );

    let mut results: Vec<FrameResult> = Vec::new();

    for path in &frame_paths {
        let image = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                warn!("Skipping unreadable frame {:?}: {}", path, e);
                continue;
            }
        };
        let (width, height) = image.dimensions();

        if width != config.frame_width || height != config.frame_height {
            info!(
                "Frame size {}x{} differs from configured {}x{}; updating config",
                width, height, config.frame_width, config.frame_height
            );
            config.frame_width = width;
            config.frame_height = height;
            pipeline.apply_config(config.clone());
        }

        let frame = Frame {
            data: image.as_raw(),
            width,
            height,
            channels: 3,
        };
        let motion_boxes = pipeline.process_frame(&frame);
        let tracked_objects = tracker.assign(&motion_boxes);
        let regions = pipeline.consolidate(&tracked_objects);

        info!(
            "{}: {} motion boxes -> {} regions ({} detector-ready)",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            motion_boxes.len(),
            regions.len(),
            pipeline.detector_ready_regions().len()
        );

        if cli.output_path.is_some() {
            results.push(FrameResult {
                frame: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                motion_boxes,
                tracked_objects,
                regions,
            });
        }
    }

    if let Some(output_path) = &cli.output_path {
        let text = serde_json::to_string_pretty(&results)?;
        std::fs::write(output_path, text)
            .with_context(|| format!("failed to write results to \"{}\"", output_path))?;
        info!(
            "Wrote results for {} frames to \"{}\"",
            results.len(),
            output_path
        );
    }

    Ok(())
}
