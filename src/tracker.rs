use std::cmp::Ordering;

use munkres::{solve_assignment, WeightMatrix, Weights};
use nalgebra as na;

use crate::config::{TrackerConfig, TrackersConfig};
use crate::detection::{Detection, EntityClass};
use crate::detector::non_maximum_suppression;
use crate::math;
use crate::track::Track;

const MAX_ASSIGNMENT_SIZE: usize = 256;
const UNMATCHABLE: f32 = 100000.0;
const MIN_SIGMA_PX: f32 = 8.0;

/// Identity tracker for a single entity class.
#[derive(Debug)]
pub struct ClassTracker {
    class: EntityClass,
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl ClassTracker {
    pub fn new(class: EntityClass, config: TrackerConfig) -> Self {
        Self {
            class,
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
        }
    }

    #[inline]
    pub fn class(&self) -> EntityClass {
        self.class
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    /// Returns this class's detections that were matched to a track or
    /// spawned one, carrying the track id.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Detection> {
        let mut candidates: Vec<Detection> = detections
            .iter()
            .filter(|d| d.class == self.class)
            .copied()
            .collect();

        if self.class == EntityClass::Ball {
            candidates = candidates
                .into_iter()
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(Ordering::Equal)
                })
                .into_iter()
                .collect();
        }

        let candidates = non_maximum_suppression(candidates, self.config.nms_iou);

        let mut ids: Vec<Option<u32>> = vec![None; candidates.len()];
        let mut matched = vec![false; self.tracks.len()];

        for (t, d, score) in self.assignment(&candidates) {
            tracing::trace!(
                "{} track {} matched with score {:.3}",
                self.class.name(),
                self.tracks[t].id,
                score
            );

            self.tracks[t].update(&candidates[d]);
            matched[t] = true;
            ids[d] = Some(self.tracks[t].id);
        }

        for (track, &hit) in self.tracks.iter_mut().zip(matched.iter()) {
            if !hit {
                track.mark_missed();
            }
        }

        let max_missing = self.config.max_missing;
        let class = self.class;
        self.tracks.retain(|t| {
            let keep = t.missing <= max_missing;
            if !keep {
                tracing::debug!("{} track {} lost", class.name(), t.id);
            }
            keep
        });

        for (det, id) in candidates.iter().zip(ids.iter_mut()) {
            if id.is_none() {
                let track = Track::new(self.next_id, det);
                self.next_id += 1;

                *id = Some(track.id);
                self.tracks.push(track);
            }
        }

        candidates
            .into_iter()
            .zip(ids)
            .filter_map(|(det, id)| Some(det.with_track_id(id?)))
            .collect()
    }

    fn score(&self, track: &Track, det: &Detection) -> f32 {
        let predicted = track.predicted_bbox();
        let iou = predicted.iou(&det.bbox);

        let diag = na::Vector2::new(predicted.width(), predicted.height()).norm();
        let sigma = (diag * self.config.proximity_sigma).max(MIN_SIGMA_PX);
        let dist = na::distance(&predicted.center(), &det.bbox.center());

        iou.max(math::gauss(dist, sigma))
    }

    /// (track index, candidate index, score) pairs above the match threshold.
    fn assignment(&self, candidates: &[Detection]) -> Vec<(usize, usize, f32)> {
        if self.tracks.is_empty() || candidates.is_empty() {
            return Vec::new();
        }

        let n = self.tracks.len().max(candidates.len());
        if n > MAX_ASSIGNMENT_SIZE {
            return self.greedy_assignment(candidates);
        }

        let mut mat = WeightMatrix::from_fn(n, |(r, c)| {
            if r < self.tracks.len() && c < candidates.len() {
                1.0 - self.score(&self.tracks[r], &candidates[c])
            } else {
                UNMATCHABLE
            }
        });

        let costs = mat.clone();
        match solve_assignment(&mut mat) {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| p.row < self.tracks.len() && p.column < candidates.len())
                .map(|p| (p.row, p.column, 1.0 - costs.element_at(p)))
                .filter(|&(_, _, score)| score > self.config.min_match_score)
                .collect(),

            Err(err) => {
                tracing::warn!("assignment could not be solved ({:?}), matching greedily", err);
                self.greedy_assignment(candidates)
            }
        }
    }

    fn greedy_assignment(&self, candidates: &[Detection]) -> Vec<(usize, usize, f32)> {
        let mut pairs = Vec::new();
        for (t, track) in self.tracks.iter().enumerate() {
            for (d, det) in candidates.iter().enumerate() {
                let score = self.score(track, det);
                if score > self.config.min_match_score {
                    pairs.push((t, d, score));
                }
            }
        }

        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        let mut used_tracks = vec![false; self.tracks.len()];
        let mut used_dets = vec![false; candidates.len()];

        pairs
            .into_iter()
            .filter(|&(t, d, _)| {
                if used_tracks[t] || used_dets[d] {
                    return false;
                }

                used_tracks[t] = true;
                used_dets[d] = true;
                true
            })
            .collect()
    }
}

/// Tracked detections of one frame, grouped by class.
#[derive(Debug, Clone, Default)]
pub struct TrackedFrame {
    pub players: Vec<Detection>,
    pub goalkeepers: Vec<Detection>,
    pub referees: Vec<Detection>,
    pub ball: Vec<Detection>,
}

impl TrackedFrame {
    pub fn get(&self, class: EntityClass) -> &[Detection] {
        match class {
            EntityClass::Player => &self.players,
            EntityClass::Goalkeeper => &self.goalkeepers,
            EntityClass::Referee => &self.referees,
            EntityClass::Ball => &self.ball,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.players
            .iter()
            .chain(self.goalkeepers.iter())
            .chain(self.referees.iter())
            .chain(self.ball.iter())
    }

    pub fn len(&self) -> usize {
        self.players.len() + self.goalkeepers.len() + self.referees.len() + self.ball.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One independent tracker per entity class.
#[derive(Debug)]
pub struct MultiClassTracker {
    players: ClassTracker,
    goalkeepers: ClassTracker,
    referees: ClassTracker,
    ball: ClassTracker,
}

impl Default for MultiClassTracker {
    fn default() -> Self {
        Self::new(&TrackersConfig::default())
    }
}

impl MultiClassTracker {
    pub fn new(config: &TrackersConfig) -> Self {
        Self {
            players: ClassTracker::new(EntityClass::Player, config.player),
            goalkeepers: ClassTracker::new(EntityClass::Goalkeeper, config.goalkeeper),
            referees: ClassTracker::new(EntityClass::Referee, config.referee),
            ball: ClassTracker::new(EntityClass::Ball, config.ball),
        }
    }

    pub fn update(&mut self, detections: &[Detection]) -> TrackedFrame {
        TrackedFrame {
            players: self.players.update(detections),
            goalkeepers: self.goalkeepers.update(detections),
            referees: self.referees.update(detections),
            ball: self.ball.update(detections),
        }
    }

    pub fn tracker(&self, class: EntityClass) -> &ClassTracker {
        match class {
            EntityClass::Player => &self.players,
            EntityClass::Goalkeeper => &self.goalkeepers,
            EntityClass::Referee => &self.referees,
            EntityClass::Ball => &self.ball,
        }
    }

    /// Whether `id` is still a live track of `class`.
    pub fn is_live(&self, class: EntityClass, id: u32) -> bool {
        self.tracker(class).tracks().iter().any(|t| t.id == id)
    }

    pub fn reset(&mut self) {
        self.players.reset();
        self.goalkeepers.reset();
        self.referees.reset();
        self.ball.reset();
    }
}
