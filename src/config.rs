use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::color::Palette;
use crate::detection::EntityClass;
use crate::error::Error;
use crate::pitch::PitchConfiguration;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// IoU above which the lower-confidence box is suppressed.
    pub nms_iou: f32,
    /// Consecutive unmatched frames a track survives.
    pub max_missing: u32,
    pub min_match_score: f32,
    /// Gaussian proximity sigma as a fraction of the box diagonal.
    pub proximity_sigma: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            nms_iou: 0.3,
            max_missing: 20,
            min_match_score: 0.3,
            proximity_sigma: 0.5,
        }
    }
}

impl TrackerConfig {
    pub fn for_class(class: EntityClass) -> Self {
        match class {
            EntityClass::Ball => Self {
                nms_iou: 0.1,
                proximity_sigma: 2.0,
                ..Default::default()
            },
            _ => Self::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrackersConfig {
    pub player: TrackerConfig,
    pub goalkeeper: TrackerConfig,
    pub referee: TrackerConfig,
    pub ball: TrackerConfig,
}

impl Default for TrackersConfig {
    fn default() -> Self {
        Self {
            player: TrackerConfig::for_class(EntityClass::Player),
            goalkeeper: TrackerConfig::for_class(EntityClass::Goalkeeper),
            referee: TrackerConfig::for_class(EntityClass::Referee),
            ball: TrackerConfig::for_class(EntityClass::Ball),
        }
    }
}

impl TrackersConfig {
    pub fn get(&self, class: EntityClass) -> &TrackerConfig {
        match class {
            EntityClass::Player => &self.player,
            EntityClass::Goalkeeper => &self.goalkeeper,
            EntityClass::Referee => &self.referee,
            EntityClass::Ball => &self.ball,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_confidence: f32,
    pub min_points: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_points: 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TeamConfig {
    /// Horizontal jersey band as fractions of the box width.
    pub jersey_x: (f32, f32),
    /// Vertical jersey band as fractions of the box height.
    pub jersey_y: (f32, f32),
    pub color_clusters: i32,
    pub kmeans_attempts: i32,
    pub kmeans_iterations: i32,
    pub referee_hue_threshold: u8,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            jersey_x: (0.35, 0.65),
            jersey_y: (0.30, 0.55),
            color_clusters: 3,
            kmeans_attempts: 3,
            kmeans_iterations: 20,
            referee_hue_threshold: 20,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub radar_width: i32,
    pub radar_height: i32,
    pub padding: i32,
    /// Canvas pixels per centimeter.
    pub scale: f32,
    pub line_thickness: i32,
    pub marker_radius: i32,
    pub ball_radius: i32,
    pub draw_trails: bool,
    pub jersey_overlay: bool,
    /// Draw the confident pitch keypoints on the annotated frame.
    pub keypoint_overlay: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            radar_width: 1600,
            radar_height: 1000,
            padding: 50,
            scale: 0.1,
            line_thickness: 2,
            marker_radius: 8,
            ball_radius: 10,
            draw_trails: true,
            jersey_overlay: true,
            keypoint_overlay: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub pitch: PitchConfiguration,
    pub trackers: TrackersConfig,
    pub calibration: CalibrationConfig,
    pub team: TeamConfig,
    pub render: RenderConfig,
    pub palette: Palette,
    pub history_len: usize,
    pub preview_interval: usize,
    pub worker_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pitch: PitchConfiguration::default(),
            trackers: TrackersConfig::default(),
            calibration: CalibrationConfig::default(),
            team: TeamConfig::default(),
            render: RenderConfig::default(),
            palette: Palette::default(),
            history_len: crate::history::DEFAULT_HISTORY_LEN,
            preview_interval: 5,
            worker_threads: 3,
        }
    }
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;

        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
