use opencv::core::Mat;

use crate::detection::Detection;
use crate::error::Error;
use crate::math::hue_distance;
use crate::team::{TeamClassifier, TeamState};

/// Drops referee candidates dressed like either team.
#[derive(Debug, Clone, Copy)]
pub struct RefereeFilter {
    hue_threshold: u8,
}

impl Default for RefereeFilter {
    fn default() -> Self {
        Self { hue_threshold: 20 }
    }
}

impl RefereeFilter {
    pub fn new(hue_threshold: u8) -> Self {
        Self { hue_threshold }
    }

    /// Accepted only if the hue differs from both teams by more than the
    /// threshold.
    #[inline]
    pub fn accepts_hue(&self, hue: u8, team_hues: &[u8; 2]) -> bool {
        team_hues
            .iter()
            .all(|&t| hue_distance(hue, t) > self.hue_threshold)
    }

    pub fn filter(
        &self,
        frame: &Mat,
        referees: Vec<Detection>,
        teams: &TeamState,
        classifier: &TeamClassifier,
    ) -> Result<Vec<Detection>, Error> {
        let Some(centroids) = teams.centroids() else {
            return Ok(referees);
        };

        let team_hues = [centroids[0].hue()?, centroids[1].hue()?];
        let mut accepted = Vec::with_capacity(referees.len());

        for det in referees {
            match classifier.dominant_color(frame, &det.bbox)? {
                Some(color) if self.accepts_hue(color.hue()?, &team_hues) => accepted.push(det),
                Some(_) => tracing::trace!("referee {:?} looks like a team player", det.track_id),
                None => {}
            }
        }

        Ok(accepted)
    }
}
