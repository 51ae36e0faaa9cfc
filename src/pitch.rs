use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Pitch markings as 1-indexed vertex pairs.
pub const EDGES: [(usize, usize); 34] = [
    // left touchline segments
    (1, 2),
    (2, 3),
    (3, 4),
    (4, 5),
    (5, 6),
    (7, 8),
    (10, 11),
    (11, 12),
    (12, 13),
    // halfway line
    (14, 15),
    (15, 16),
    (16, 17),
    (18, 19),
    (19, 20),
    (20, 21),
    (23, 24),
    // right touchline segments
    (25, 26),
    (26, 27),
    (27, 28),
    (28, 29),
    (29, 30),
    // left half lengthwise
    (1, 14),
    (2, 10),
    (3, 7),
    (4, 8),
    (5, 13),
    (6, 17),
    // right half lengthwise
    (14, 25),
    (18, 26),
    (23, 27),
    (24, 28),
    (21, 29),
    (17, 30),
];

pub const LABELS: [&str; 32] = [
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "13", "15", "16",
    "17", "18", "20", "21", "22", "23", "24", "25", "26", "27", "28", "29", "30", "31", "32",
    "14", "19",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexGroup {
    LeftHalf,
    Centre,
    RightHalf,
}

/// Regulation pitch geometry, all values in centimeters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PitchConfiguration {
    pub width: f32,
    pub length: f32,
    pub penalty_box_width: f32,
    pub penalty_box_length: f32,
    pub goal_box_width: f32,
    pub goal_box_length: f32,
    pub centre_circle_radius: f32,
    pub penalty_spot_distance: f32,
    pub penalty_arc_radius: f32,
}

impl Default for PitchConfiguration {
    fn default() -> Self {
        Self {
            width: 6800.0,
            length: 10500.0,
            penalty_box_width: 4032.0,
            penalty_box_length: 1650.0,
            goal_box_width: 1832.0,
            goal_box_length: 550.0,
            centre_circle_radius: 915.0,
            penalty_spot_distance: 1100.0,
            penalty_arc_radius: 915.0,
        }
    }
}

impl PitchConfiguration {
    /// The 32 reference vertices in keypoint-model order.
    pub fn vertices(&self) -> [na::Point2<f32>; 32] {
        let w = self.width;
        let l = self.length;
        let half_w = w / 2.0;
        let half_l = l / 2.0;

        let pb_lo = (w - self.penalty_box_width) / 2.0;
        let pb_hi = (w + self.penalty_box_width) / 2.0;
        let gb_lo = (w - self.goal_box_width) / 2.0;
        let gb_hi = (w + self.goal_box_width) / 2.0;

        let p = na::Point2::new;

        [
            p(0.0, 0.0),
            p(0.0, pb_lo),
            p(0.0, gb_lo),
            p(0.0, gb_hi),
            p(0.0, pb_hi),
            p(0.0, w),
            p(self.goal_box_length, gb_lo),
            p(self.goal_box_length, gb_hi),
            p(self.penalty_spot_distance, half_w),
            p(self.penalty_box_length, pb_lo),
            p(self.penalty_box_length, gb_lo),
            p(self.penalty_box_length, gb_hi),
            p(self.penalty_box_length, pb_hi),
            p(half_l, 0.0),
            p(half_l, half_w - self.centre_circle_radius),
            p(half_l, half_w + self.centre_circle_radius),
            p(half_l, w),
            p(l - self.penalty_box_length, pb_lo),
            p(l - self.penalty_box_length, gb_lo),
            p(l - self.penalty_box_length, gb_hi),
            p(l - self.penalty_box_length, pb_hi),
            p(l - self.penalty_spot_distance, half_w),
            p(l - self.goal_box_length, gb_lo),
            p(l - self.goal_box_length, gb_hi),
            p(l, 0.0),
            p(l, pb_lo),
            p(l, gb_lo),
            p(l, gb_hi),
            p(l, pb_hi),
            p(l, w),
            p(half_l - self.centre_circle_radius, half_w),
            p(half_l + self.centre_circle_radius, half_w),
        ]
    }

    #[inline]
    pub fn edges(&self) -> &'static [(usize, usize)] {
        &EDGES
    }

    #[inline]
    pub fn labels(&self) -> &'static [&'static str] {
        &LABELS
    }

    /// Which part of the pitch a vertex (0-indexed) belongs to.
    pub fn vertex_group(&self, idx: usize) -> VertexGroup {
        match idx {
            0..=12 => VertexGroup::LeftHalf,
            13..=16 | 30 | 31 => VertexGroup::Centre,
            _ => VertexGroup::RightHalf,
        }
    }

    #[inline]
    pub fn contains(&self, p: &na::Point2<f32>) -> bool {
        (0.0..=self.length).contains(&p.x) && (0.0..=self.width).contains(&p.y)
    }
}
