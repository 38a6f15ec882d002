use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use imageproc::point::Point;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::geometry_utils::{percentile, polygon_area};
use crate::tracking::MotionBox;

/// Fixed permissive thresholds; real rejection is deferred to consolidation
const PERMISSIVE_MIN_AREA: f32 = 50.;
const PERMISSIVE_MIN_SOLIDITY: f32 = 0.1;
const PERMISSIVE_MAX_ASPECT_RATIO: f32 = 10.;

/// Clamp ranges that keep one noisy frame from dragging learned thresholds
/// into uselessness
const AREA_CLAMP: (f32, f32) = (50., 1000.);
const SOLIDITY_CLAMP: (f32, f32) = (0.2, 0.8);
const ASPECT_CLAMP: (f32, f32) = (2., 15.);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourFilterMode {
    Permissive,
    Adaptive,
}

pub struct ContourSettings {
    pub mode: ContourFilterMode,
    /// Calls between threshold refreshes in adaptive mode
    pub refresh_interval: u32,
}

/// The acceptance bounds currently in force. Starts at the most permissive
/// end of each clamp range so contours seen before the first refresh are
/// always measured against defined values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterThresholds {
    pub min_area: f32,
    pub min_solidity: f32,
    pub max_aspect_ratio: f32,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        FilterThresholds {
            min_area: AREA_CLAMP.0,
            min_solidity: SOLIDITY_CLAMP.0,
            max_aspect_ratio: ASPECT_CLAMP.1,
        }
    }
}

impl FilterThresholds {
    fn permissive() -> Self {
        FilterThresholds {
            min_area: PERMISSIVE_MIN_AREA,
            min_solidity: PERMISSIVE_MIN_SOLIDITY,
            max_aspect_ratio: PERMISSIVE_MAX_ASPECT_RATIO,
        }
    }

    fn accepts(&self, profile: &ContourProfile) -> bool {
        profile.area >= self.min_area
            && profile.solidity >= self.min_solidity
            && profile.aspect_ratio <= self.max_aspect_ratio
    }
}

/// Shape measurements for one outer contour
struct ContourProfile {
    bounds: MotionBox,
    area: f32,
    solidity: f32,
    aspect_ratio: f32,
}

/// Finds outer contours of a cleaned mask and keeps the plausibly-object-like
/// ones. Apparent object size varies with camera distance and clutter, so the
/// adaptive mode re-learns its thresholds from the frame's own contour
/// population at a fixed cadence; the cache between refreshes is instance
/// state, one per pipeline.
pub struct ContourExtractor {
    settings: ContourSettings,
    cached: FilterThresholds,
    calls_since_refresh: u32,
}

impl ContourExtractor {
    pub fn new(settings: ContourSettings) -> Self {
        ContourExtractor {
            settings,
            cached: FilterThresholds::default(),
            calls_since_refresh: 0,
        }
    }

    /// Settings changes keep the learned-threshold cache
    pub fn set_settings(&mut self, settings: ContourSettings) {
        self.settings = settings;
    }

    pub fn cached_thresholds(&self) -> &FilterThresholds {
        &self.cached
    }

    /// Empty or blank masks produce an empty list, never an error
    pub fn extract(&mut self, mask: &GrayImage) -> Vec<MotionBox> {
        if mask.width() == 0 || mask.height() == 0 {
            return Vec::new();
        }

        let profiles: Vec<ContourProfile> = find_contours::<i32>(mask)
            .iter()
            .filter(|contour| matches!(contour.border_type, BorderType::Outer))
            .map(|contour| profile_contour(&contour.points))
            .collect();

        let thresholds = match self.settings.mode {
            ContourFilterMode::Permissive => FilterThresholds::permissive(),
            ContourFilterMode::Adaptive => self.refreshed_thresholds(&profiles),
        };

        profiles
            .into_iter()
            .filter(|profile| thresholds.accepts(profile))
            .map(|profile| profile.bounds)
            .collect()
    }

    fn refreshed_thresholds(&mut self, profiles: &[ContourProfile]) -> FilterThresholds {
        if self.calls_since_refresh >= self.settings.refresh_interval && !profiles.is_empty() {
            self.cached = learn_thresholds(profiles);
            self.calls_since_refresh = 0;
            debug!("Refreshed adaptive contour thresholds: {:?}", self.cached);
        } else {
            self.calls_since_refresh += 1;
        }
        self.cached
    }
}

/// Percentile-learned thresholds, clamped so a single cluttered or barren
/// frame cannot cause runaway drift
fn learn_thresholds(profiles: &[ContourProfile]) -> FilterThresholds {
    let areas: Vec<f32> = profiles.iter().map(|p| p.area).collect();
    let solidities: Vec<f32> = profiles.iter().map(|p| p.solidity).collect();
    let aspect_ratios: Vec<f32> = profiles.iter().map(|p| p.aspect_ratio).collect();

    FilterThresholds {
        min_area: percentile(&areas, 10.)
            .unwrap_or(AREA_CLAMP.0)
            .clamp(AREA_CLAMP.0, AREA_CLAMP.1),
        min_solidity: percentile(&solidities, 25.)
            .unwrap_or(SOLIDITY_CLAMP.0)
            .clamp(SOLIDITY_CLAMP.0, SOLIDITY_CLAMP.1),
        max_aspect_ratio: percentile(&aspect_ratios, 90.)
            .unwrap_or(ASPECT_CLAMP.1)
            .clamp(ASPECT_CLAMP.0, ASPECT_CLAMP.1),
    }
}

fn as_pairs(points: &[Point<i32>]) -> Vec<(f32, f32)> {
    points.iter().map(|p| (p.x as f32, p.y as f32)).collect()
}

fn profile_contour(points: &[Point<i32>]) -> ContourProfile {
    if points.len() < 3 {
        // One- and two-pixel contours carry no usable shape; give them a
        // degenerate profile that no threshold set accepts
        return ContourProfile {
            bounds: bounding_box(points),
            area: 0.,
            solidity: 0.,
            aspect_ratio: f32::MAX,
        };
    }

    let area = polygon_area(&as_pairs(points));

    // Perimeter-proportional simplification; the box comes from the
    // simplified polygon
    let perimeter = arc_length(points, true);
    let simplified = approximate_polygon_dp(points, 0.02 * perimeter, true);
    let box_source: &[Point<i32>] = if simplified.is_empty() {
        points
    } else {
        &simplified
    };
    let bounds = bounding_box(box_source);

    let hull = convex_hull(points);
    let hull_area = polygon_area(&as_pairs(&hull));
    let solidity = if hull_area > 0. {
        (area / hull_area).min(1.)
    } else {
        0.
    };

    let long = bounds.width.max(bounds.height) as f32;
    let short = bounds.width.min(bounds.height) as f32;
    let aspect_ratio = if short > 0. { long / short } else { f32::MAX };

    ContourProfile {
        bounds,
        area,
        solidity,
        aspect_ratio,
    }
}

fn bounding_box(points: &[Point<i32>]) -> MotionBox {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if points.is_empty() {
        return MotionBox::new(0, 0, 0, 0);
    }
    MotionBox::new(
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}
