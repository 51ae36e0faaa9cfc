use nalgebra as na;

/// Constant-velocity model of a box centre, velocity smoothed exponentially
/// in pixels per frame.
#[derive(Debug, Clone)]
pub struct Predictor {
    pos: na::Point2<f32>,
    velocity: na::Vector2<f32>,
    smoothing: f32,
    initialized: bool,
}

impl Predictor {
    pub fn new(smoothing: f32) -> Self {
        Self {
            pos: na::Point2::origin(),
            velocity: na::Vector2::zeros(),
            smoothing: smoothing.clamp(0.0, 1.0),
            initialized: false,
        }
    }

    #[inline]
    pub fn velocity(&self) -> &na::Vector2<f32> {
        &self.velocity
    }

    /// Feeds an observation made `frames` frames after the previous one.
    pub fn update(&mut self, pos: na::Point2<f32>, frames: u32) {
        if self.initialized {
            let dt = frames.max(1) as f32;
            let observed = (pos - self.pos) / dt;

            self.velocity = self.velocity * (1.0 - self.smoothing) + observed * self.smoothing;
        } else {
            self.initialized = true;
        }

        self.pos = pos;
    }

    #[inline]
    pub fn predict(&self, frames: u32) -> na::Point2<f32> {
        self.pos + self.velocity * frames as f32
    }
}
