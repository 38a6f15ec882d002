use std::collections::{BTreeSet, HashMap, VecDeque};

use indexmap::IndexMap;
use log::debug;

use crate::geometry_utils::edge_distance;
use crate::tracking::{ConsolidatedRegion, MotionBox, TrackedObject};

pub struct ConsolidationSettings {
    /// Weights of the two metric components; sum to 1 after config sanitizing
    pub overlap_weight: f32,
    pub edge_weight: f32,
    /// Cap on both components, so distance stays in [0, max_edge_distance]
    pub max_edge_distance: f32,
    /// Neighbourhood radius in metric units
    pub eps: f32,
    /// Min neighbours (self included) for a core point
    pub min_neighbours: usize,
    /// Clusters below this member count never become regions
    pub min_objects_per_region: usize,
    pub expansion_factor: f32,
    pub min_region_area: f32,
    pub max_region_area: f32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub max_frames_without_update: u32,
}

/// Hybrid distance between two tracked objects' boxes. Centroid distance
/// fails when a small box sits inside a larger motion blob: its centre may be
/// far from the blob's while the boxes are effectively co-located. The
/// overlap component treats containment as distance 0; the edge component
/// gives genuinely disjoint boxes a real proximity signal.
pub fn object_distance(a: &MotionBox, b: &MotionBox, settings: &ConsolidationSettings) -> f32 {
    settings.overlap_weight * overlap_component(a, b, settings.max_edge_distance)
        + settings.edge_weight * edge_component(a, b, settings.max_edge_distance)
}

fn overlap_component(a: &MotionBox, b: &MotionBox, max_edge_distance: f32) -> f32 {
    let intersection = a.intersection_area(b);
    if intersection <= 0. {
        return max_edge_distance;
    }
    let smaller_area = a.area().min(b.area());
    if smaller_area <= 0. {
        // Zero-area box: no meaningful overlap ratio
        return max_edge_distance;
    }
    max_edge_distance * (1. - intersection / smaller_area)
}

fn edge_component(a: &MotionBox, b: &MotionBox, max_edge_distance: f32) -> f32 {
    if a.intersects(b) {
        return 0.;
    }
    edge_distance(a, b).min(max_edge_distance)
}

/// Cluster membership state during the density scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointLabel {
    Unvisited,
    Noise,
    Assigned(usize),
}

/// Density-based clustering over the tracked objects: a core point has at
/// least `min_neighbours` objects within `eps`, clusters grow breadth-first
/// through reachable core points, and everything else stays noise (so a lone
/// object never forms a singleton region). O(n^2) neighbour queries; fine for
/// tens of objects per frame.
fn cluster_objects(objects: &[TrackedObject], settings: &ConsolidationSettings) -> Vec<Vec<usize>> {
    let count = objects.len();
    let neighbours_of = |index: usize| -> Vec<usize> {
        (0..count)
            .filter(|&other| {
                object_distance(&objects[index].bounds, &objects[other].bounds, settings)
                    <= settings.eps
            })
            .collect()
    };

    let mut labels = vec![PointLabel::Unvisited; count];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for index in 0..count {
        if labels[index] != PointLabel::Unvisited {
            continue;
        }
        let seeds = neighbours_of(index);
        if seeds.len() < settings.min_neighbours {
            labels[index] = PointLabel::Noise;
            continue;
        }

        let cluster_id = clusters.len();
        labels[index] = PointLabel::Assigned(cluster_id);
        let mut members = vec![index];
        let mut frontier: VecDeque<usize> = seeds.into();

        while let Some(candidate) = frontier.pop_front() {
            match labels[candidate] {
                PointLabel::Assigned(_) => continue,
                PointLabel::Noise => {
                    // Border point: reachable, but not itself core
                    labels[candidate] = PointLabel::Assigned(cluster_id);
                    members.push(candidate);
                }
                PointLabel::Unvisited => {
                    labels[candidate] = PointLabel::Assigned(cluster_id);
                    members.push(candidate);
                    let reachable = neighbours_of(candidate);
                    if reachable.len() >= settings.min_neighbours {
                        frontier.extend(reachable);
                    }
                }
            }
        }
        clusters.push(members);
    }
    clusters
}

/// Maintains the persistent set of consolidated regions across frames:
/// clusters become regions, regions merge with the retained set, unmatched
/// regions age, surviving members refresh their region's box, stale regions
/// are pruned.
pub struct RegionConsolidator {
    settings: ConsolidationSettings,
    regions: IndexMap<u64, ConsolidatedRegion>,
    next_region_id: u64,
}

impl RegionConsolidator {
    pub fn new(settings: ConsolidationSettings) -> Self {
        RegionConsolidator {
            settings,
            regions: IndexMap::new(),
            next_region_id: 0,
        }
    }

    /// Settings changes keep the retained regions
    pub fn set_settings(&mut self, settings: ConsolidationSettings) {
        self.settings = settings;
    }

    /// One consolidation pass over the current frame's tracked objects.
    /// An empty input still ages (and may prune) retained regions.
    pub fn consolidate(&mut self, objects: &[TrackedObject]) {
        let mut touched: BTreeSet<u64> = BTreeSet::new();

        for cluster in cluster_objects(objects, &self.settings) {
            if cluster.len() < self.settings.min_objects_per_region {
                continue;
            }
            let Some(core_bounds) = union_bounds(cluster.iter().map(|&i| &objects[i].bounds))
            else {
                continue;
            };
            let member_ids: BTreeSet<u64> = cluster.iter().map(|&i| objects[i].id).collect();
            let id = self.insert_or_merge(core_bounds, member_ids);
            touched.insert(id);
        }

        for region in self.regions.values_mut() {
            if !touched.contains(&region.id) {
                region.frames_since_update += 1;
            }
        }

        self.refresh_from_members(objects);

        let staleness_limit = self.settings.max_frames_without_update;
        self.regions
            .retain(|_, region| region.frames_since_update <= staleness_limit);
    }

    /// Match a fresh cluster-region against the retained set by bounding-box
    /// intersection; merge on a match instead of duplicating. Linear scan,
    /// acceptable at tens of regions.
    fn insert_or_merge(&mut self, core_bounds: MotionBox, member_ids: BTreeSet<u64>) -> u64 {
        let expanded = self.expanded(&core_bounds);

        if let Some(existing) = self
            .regions
            .values_mut()
            .find(|region| region.bounds.intersects(&expanded))
        {
            existing.core_bounds = existing.core_bounds.union(&core_bounds);
            existing.bounds = existing
                .core_bounds
                .expanded(
                    self.settings.expansion_factor,
                    self.settings.frame_width,
                    self.settings.frame_height,
                );
            existing.tracked_object_ids.extend(member_ids);
            // A merge is an update: the fresher of the two staleness counters
            // is the new cluster's, which is 0 by construction
            existing.frames_since_update = 0;
            debug!("Merged cluster into region {}", existing.id);
            return existing.id;
        }

        let id = self.next_region_id;
        self.next_region_id += 1;
        self.regions.insert(
            id,
            ConsolidatedRegion {
                id,
                bounds: expanded,
                core_bounds,
                tracked_object_ids: member_ids,
                frames_since_update: 0,
            },
        );
        debug!("Created region {}", id);
        id
    }

    /// Recompute each region's box from the member objects present in the
    /// current input, so the pre-expansion box always equals the union of its
    /// current members' boxes at the end of the call.
    fn refresh_from_members(&mut self, objects: &[TrackedObject]) {
        let by_id: HashMap<u64, &MotionBox> =
            objects.iter().map(|o| (o.id, &o.bounds)).collect();

        for region in self.regions.values_mut() {
            let present = region
                .tracked_object_ids
                .iter()
                .filter_map(|id| by_id.get(id).copied());
            if let Some(core_bounds) = union_bounds(present) {
                region.core_bounds = core_bounds;
                region.bounds = core_bounds.expanded(
                    self.settings.expansion_factor,
                    self.settings.frame_width,
                    self.settings.frame_height,
                );
            }
        }
    }

    fn expanded(&self, bounds: &MotionBox) -> MotionBox {
        bounds.expanded(
            self.settings.expansion_factor,
            self.settings.frame_width,
            self.settings.frame_height,
        )
    }

    pub fn regions(&self) -> impl Iterator<Item = &ConsolidatedRegion> {
        self.regions.values()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Regions inside the configured area band, ready to hand to the
    /// downstream detector. Formation never rejects by size; this is purely
    /// an output-side filter.
    pub fn detector_ready_regions(&self) -> Vec<&ConsolidatedRegion> {
        self.regions
            .values()
            .filter(|region| {
                let area = region.bounds.area();
                area >= self.settings.min_region_area && area <= self.settings.max_region_area
            })
            .collect()
    }
}

fn union_bounds<'a>(mut bounds: impl Iterator<Item = &'a MotionBox>) -> Option<MotionBox> {
    let first = *bounds.next()?;
    Some(bounds.fold(first, |acc, b| acc.union(b)))
}
