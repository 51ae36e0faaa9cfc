use std::sync::Arc;

use ndarray::Array2;

use crate::config::CalibrationConfig;
use crate::detection::Keypoint;
use crate::pitch::PitchConfiguration;
use crate::view::ViewTransformer;

/// Outcome of calibrating one frame.
#[derive(Debug, Clone)]
pub enum Calibration {
    /// Homography estimated from this frame's keypoints.
    Fresh(Arc<ViewTransformer>),
    /// This frame was unusable, the last good homography is handed back.
    Reused(Arc<ViewTransformer>),
    /// Nothing has ever succeeded.
    Unavailable,
}

impl Calibration {
    #[inline]
    pub fn transformer(&self) -> Option<&Arc<ViewTransformer>> {
        match self {
            Calibration::Fresh(vt) | Calibration::Reused(vt) => Some(vt),
            Calibration::Unavailable => None,
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        !matches!(self, Calibration::Unavailable)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Calibration::Fresh(_) => "fresh",
            Calibration::Reused(_) => "reused",
            Calibration::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Default)]
pub struct Calibrator {
    config: CalibrationConfig,
    last: Option<Arc<ViewTransformer>>,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config, last: None }
    }

    #[inline]
    pub fn last(&self) -> Option<&Arc<ViewTransformer>> {
        self.last.as_ref()
    }

    /// Keypoints are index-aligned with `pitch.vertices()`.
    pub fn calibrate(&mut self, keypoints: &[Keypoint], pitch: &PitchConfiguration) -> Calibration {
        let vertices = pitch.vertices();

        let pairs: Vec<_> = keypoints
            .iter()
            .zip(vertices.iter())
            .filter(|(kp, _)| kp.confidence > self.config.min_confidence)
            .collect();

        if pairs.len() >= self.config.min_points.max(4) {
            let source = Array2::from_shape_fn((pairs.len(), 2), |(r, c)| {
                let kp = pairs[r].0;
                if c == 0 {
                    kp.x
                } else {
                    kp.y
                }
            });

            let target = Array2::from_shape_fn((pairs.len(), 2), |(r, c)| pairs[r].1[c]);

            match ViewTransformer::from_points(source.view(), target.view()) {
                Ok(vt) => {
                    let vt = Arc::new(vt);
                    self.last = Some(vt.clone());

                    return Calibration::Fresh(vt);
                }
                Err(err) => tracing::debug!("homography rejected: {}", err),
            }
        } else {
            tracing::debug!("{} confident keypoints, calibration skipped", pairs.len());
        }

        match &self.last {
            Some(vt) => Calibration::Reused(vt.clone()),
            None => Calibration::Unavailable,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
