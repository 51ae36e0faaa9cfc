pub mod annotate;
pub mod assemble;
pub mod bbox;
pub mod calibration;
pub mod circular_queue;
pub mod color;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod history;
pub mod math;
pub mod pipeline;
pub mod pitch;
pub mod radar;
pub mod recent;
pub mod referee;
pub mod replay;
pub mod team;
pub mod tracker;
pub mod video;
pub mod view;

mod predictor;
mod track;

pub use calibration::{Calibration, Calibrator};
pub use config::PipelineConfig;
pub use detection::{Detection, EntityClass, Keypoint};
pub use detector::{KeypointDetector, ObjectDetector};
pub use error::Error;
pub use history::MovementHistory;
pub use pipeline::{CancelToken, Pipeline, PipelineObserver, PipelineState, RunOutcome};
pub use pitch::PitchConfiguration;
pub use team::{TeamClassifier, TeamId, TeamState};
pub use track::Track;
pub use tracker::{MultiClassTracker, TrackedFrame};
pub use view::ViewTransformer;

pub type Result<T> = std::result::Result<T, Error>;
