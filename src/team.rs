//! Two-team jersey color classification.
//!
//! Each player's torso region is reduced to one dominant color by k-means in
//! HSV space; the per-player colors of a frame are then split in two groups
//! whose centroids become the team colors.

use std::collections::HashMap;

use opencv::{
    core::{self, Mat, Rect, TermCriteria, Vec3b},
    imgproc,
    prelude::*,
};
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::color::Color;
use crate::config::TeamConfig;
use crate::detection::Detection;
use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TeamId {
    Zero,
    One,
    #[default]
    Unknown,
}

impl TeamId {
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            TeamId::Zero => Some(0),
            TeamId::One => Some(1),
            TeamId::Unknown => None,
        }
    }

    #[inline]
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => TeamId::Zero,
            1 => TeamId::One,
            _ => TeamId::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TeamId::Zero => "T0",
            TeamId::One => "T1",
            TeamId::Unknown => "T?",
        }
    }
}

/// Team centroids and the track id -> team mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamState {
    assignments: HashMap<u32, TeamId>,
    centroids: Option<[Color; 2]>,
}

impl TeamState {
    #[inline]
    pub fn team_of(&self, track_id: u32) -> TeamId {
        self.assignments.get(&track_id).copied().unwrap_or_default()
    }

    #[inline]
    pub fn centroids(&self) -> Option<&[Color; 2]> {
        self.centroids.as_ref()
    }

    #[inline]
    pub fn assignments(&self) -> &HashMap<u32, TeamId> {
        &self.assignments
    }

    pub fn team_color(&self, team: TeamId) -> Option<Color> {
        Some(self.centroids?[team.index()?])
    }

    /// Frozen copy handed to readers running next to an update.
    #[inline]
    pub fn snapshot(&self) -> TeamState {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.assignments.clear();
        self.centroids = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JerseySample {
    pub track_id: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Default)]
pub struct TeamClassifier {
    config: TeamConfig,
}

impl TeamClassifier {
    pub fn new(config: TeamConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &TeamConfig {
        &self.config
    }

    /// Torso sub-box of `bbox`, unclipped.
    #[inline]
    pub fn jersey_box(&self, bbox: &BBox<Ltrb>) -> BBox<Ltrb> {
        bbox.fraction(self.config.jersey_x, self.config.jersey_y)
    }

    /// Torso region clipped to a `width` x `height` frame; `None` if empty.
    pub fn jersey_region(&self, bbox: &BBox<Ltrb>, width: i32, height: i32) -> Option<Rect> {
        let j = self.jersey_box(bbox);

        let x0 = (j.left() as i32).clamp(0, width);
        let y0 = (j.top() as i32).clamp(0, height);
        let x1 = (j.right() as i32).clamp(0, width);
        let y1 = (j.bottom() as i32).clamp(0, height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Dominant jersey color, `None` when the region has fewer pixels than
    /// clusters.
    pub fn dominant_color(&self, frame: &Mat, bbox: &BBox<Ltrb>) -> Result<Option<Color>, Error> {
        let Some(rect) = self.jersey_region(bbox, frame.cols(), frame.rows()) else {
            return Ok(None);
        };

        let k = self.config.color_clusters.max(1);
        if rect.area() < k {
            return Ok(None);
        }

        let crop = Mat::roi(frame, rect)?.try_clone()?;
        let mut blurred = Mat::default();
        imgproc::median_blur(&crop, &mut blurred, 3)?;

        let mut hsv = Mat::default();
        imgproc::cvt_color_def(&blurred, &mut hsv, imgproc::COLOR_BGR2HSV)?;

        let pixels: Vec<[f32; 3]> = hsv
            .data_typed::<Vec3b>()?
            .iter()
            .map(|px| [px[0] as f32, px[1] as f32, px[2] as f32])
            .collect();

        let Some(&first) = pixels.first() else {
            return Ok(None);
        };

        if pixels.iter().all(|px| *px == first) {
            return Ok(Some(Color::from_hsv(to_u8(first))?));
        }

        let (labels, centers) = self.kmeans(&pixels, k)?;

        let mut counts = vec![0usize; k as usize];
        for &l in &labels {
            if let Some(c) = counts.get_mut(l) {
                *c += 1;
            }
        }

        let largest = counts
            .iter()
            .enumerate()
            .max_by_key(|&(_, c)| *c)
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(Some(Color::from_hsv(to_u8(centers[largest]))?))
    }

    pub fn sample(&self, frame: &Mat, players: &[Detection]) -> Result<Vec<JerseySample>, Error> {
        let mut samples = Vec::with_capacity(players.len());

        for det in players {
            let Some(track_id) = det.track_id else {
                continue;
            };

            if let Some(color) = self.dominant_color(frame, &det.bbox)? {
                samples.push(JerseySample { track_id, color });
            }
        }

        Ok(samples)
    }

    /// Classifies this frame's players into `state`. Returns `false` when
    /// there were too few jersey colors and nothing changed.
    pub fn update(&self, state: &mut TeamState, frame: &Mat, players: &[Detection]) -> Result<bool, Error> {
        let samples = self.sample(frame, players)?;

        self.update_from_samples(state, &samples)
    }

    pub fn update_from_samples(&self, state: &mut TeamState, samples: &[JerseySample]) -> Result<bool, Error> {
        if samples.len() < 2 {
            tracing::trace!("{} jersey samples, team update skipped", samples.len());
            return Ok(false);
        }

        let points: Vec<[f32; 3]> = samples
            .iter()
            .map(|s| [s.color.r as f32, s.color.g as f32, s.color.b as f32])
            .collect();

        let (labels, centers) = self.kmeans(&points, 2)?;
        let mut centroids = [to_color(centers[0]), to_color(centers[1])];
        let mut swap = false;

        if let Some(prev) = state.centroids {
            let keep = centroids[0].distance(&prev[0]) + centroids[1].distance(&prev[1]);
            let cross = centroids[0].distance(&prev[1]) + centroids[1].distance(&prev[0]);

            if cross < keep {
                centroids.swap(0, 1);
                swap = true;
            }
        }

        state.assignments.extend(samples.iter().zip(labels).map(|(s, l)| {
            let l = if swap { 1 - l.min(1) } else { l };
            (s.track_id, TeamId::from_index(l))
        }));
        state.centroids = Some(centroids);

        tracing::debug!(
            "team colors {:?} / {:?} from {} samples",
            centroids[0],
            centroids[1],
            samples.len()
        );

        Ok(true)
    }

    fn kmeans(&self, points: &[[f32; 3]], k: i32) -> Result<(Vec<usize>, Vec<[f32; 3]>), Error> {
        let data = Mat::from_slice_2d(points)?;
        let mut labels = Mat::default();
        let mut centers = Mat::default();

        let criteria = TermCriteria::new(
            core::TermCriteria_EPS + core::TermCriteria_MAX_ITER,
            self.config.kmeans_iterations.max(1),
            1.0,
        )?;

        core::kmeans(
            &data,
            k,
            &mut labels,
            criteria,
            self.config.kmeans_attempts.max(1),
            core::KMEANS_PP_CENTERS,
            &mut centers,
        )?;

        let labels = labels
            .data_typed::<i32>()?
            .iter()
            .map(|&l| l.max(0) as usize)
            .collect();

        let mut out = Vec::with_capacity(k as usize);
        for row in 0..centers.rows() {
            out.push([
                *centers.at_2d::<f32>(row, 0)?,
                *centers.at_2d::<f32>(row, 1)?,
                *centers.at_2d::<f32>(row, 2)?,
            ]);
        }

        Ok((labels, out))
    }
}

#[inline]
fn to_u8(v: [f32; 3]) -> [u8; 3] {
    [
        v[0].round().clamp(0.0, 255.0) as u8,
        v[1].round().clamp(0.0, 255.0) as u8,
        v[2].round().clamp(0.0, 255.0) as u8,
    ]
}

#[inline]
fn to_color(v: [f32; 3]) -> Color {
    let [r, g, b] = to_u8(v);
    Color::rgb(r, g, b)
}
