use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ThreadPool Error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("point sets differ in shape: {0:?} vs {1:?}")]
    ShapeMismatch((usize, usize), (usize, usize)),

    #[error("points must be 2D coordinates, got {0} columns")]
    NotPlanar(usize),

    #[error("at least 4 correspondences are required, got {0}")]
    TooFewPoints(usize),

    #[error("degenerate point configuration")]
    DegenerateGeometry,

    #[error("homography is not computed")]
    NotCalibrated,

    #[error("detection models are not loaded")]
    ModelsNotLoaded,

    #[error("video source could not be opened: {0}")]
    SourceUnavailable(String),

    #[error("output could not be opened for writing: {0}")]
    OutputUnavailable(String),

    #[error("detector failed: {0}")]
    Detector(String),

    #[error("pipeline is {0}, expected {1}")]
    InvalidState(&'static str, &'static str),

    #[error("no frames selected")]
    NothingSelected,
}
