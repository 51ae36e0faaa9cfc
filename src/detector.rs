use std::cmp::Ordering;

use opencv::core::Mat;

use crate::detection::{Detection, Keypoint};
use crate::error::Error;

/// Players, goalkeepers, referees and the ball in one frame.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Mat) -> Result<Vec<Detection>, Error>;
}

/// Pitch keypoints, index-aligned with the pitch vertex list.
pub trait KeypointDetector: Send + Sync {
    fn detect_keypoints(&self, frame: &Mat) -> Result<Vec<Keypoint>, Error>;
}

/// Greedy NMS: highest confidence first, drops boxes overlapping a kept one
/// by more than `iou_threshold`.
pub fn non_maximum_suppression(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if dets.len() < 2 {
        return dets;
    }

    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut retain = vec![true; dets.len()];
    for idx in 0..dets.len() - 1 {
        if !retain[idx] {
            continue;
        }

        for other in idx + 1..dets.len() {
            if retain[other] && dets[idx].iou(&dets[other]) > iou_threshold {
                retain[other] = false;
            }
        }
    }

    dets.into_iter()
        .zip(retain)
        .filter_map(|(det, keep)| keep.then_some(det))
        .collect()
}
