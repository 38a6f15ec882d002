use motion_region_consolidation::geometry_utils::distance;
use motion_region_consolidation::tracking::{MotionBox, TrackedObject};

struct Track {
    id: u64,
    bounds: MotionBox,
    missed_frames: u32,
}

/// Greedy nearest-centroid ID assigner. This is a deliberately small
/// stand-in for the external tracker the pipeline normally consumes; it
/// exists so the backend can be run end to end without one.
pub struct StandInTracker {
    tracks: Vec<Track>,
    next_id: u64,
    max_match_distance: f32,
    max_missed_frames: u32,
}

impl StandInTracker {
    pub fn new(max_match_distance: f32, max_missed_frames: u32) -> Self {
        StandInTracker {
            tracks: Vec::new(),
            next_id: 0,
            max_match_distance,
            max_missed_frames,
        }
    }

    pub fn assign(&mut self, boxes: &[MotionBox]) -> Vec<TrackedObject> {
        let mut claimed = vec![false; self.tracks.len()];
        let mut assigned = Vec::with_capacity(boxes.len());

        for bounds in boxes {
            let (x, y) = bounds.centre();
            let nearest = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(index, _)| !claimed[*index])
                .map(|(index, track)| {
                    let (tx, ty) = track.bounds.centre();
                    (index, distance(x, y, tx, ty))
                })
                .filter(|(_, d)| *d <= self.max_match_distance)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            match nearest {
                Some((index, _)) => {
                    claimed[index] = true;
                    let track = &mut self.tracks[index];
                    track.bounds = *bounds;
                    track.missed_frames = 0;
                    assigned.push(TrackedObject::new(track.id, *bounds));
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        bounds: *bounds,
                        missed_frames: 0,
                    });
                    claimed.push(true);
                    assigned.push(TrackedObject::new(id, *bounds));
                }
            }
        }

        for (index, track) in self.tracks.iter_mut().enumerate() {
            if !claimed[index] {
                track.missed_frames += 1;
            }
        }
        let max_missed_frames = self.max_missed_frames;
        self.tracks
            .retain(|track| track.missed_frames <= max_missed_frames);

        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable_across_frames() {
        let mut tracker = StandInTracker::new(75., 2);
        let first = tracker.assign(&[MotionBox::new(10, 10, 20, 20)]);
        let second = tracker.assign(&[MotionBox::new(14, 12, 20, 20)]);
        assert_eq!(first[0].id, second[0].id);

        // A far-away box gets a fresh ID
        let third = tracker.assign(&[MotionBox::new(500, 500, 20, 20)]);
        assert_ne!(third[0].id, first[0].id);
    }

    #[test]
    fn test_track_expires_after_missed_frames() {
        let mut tracker = StandInTracker::new(75., 1);
        let first = tracker.assign(&[MotionBox::new(10, 10, 20, 20)]);
        tracker.assign(&[]);
        tracker.assign(&[]);
        let revived = tracker.assign(&[MotionBox::new(10, 10, 20, 20)]);
        assert_ne!(revived[0].id, first[0].id);
    }
}
