use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Vector},
    imgcodecs,
    prelude::*,
    videoio,
};
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_FPS: f64 = 25.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub total_frames: usize,
}

/// Sequential frame decoder.
pub trait VideoSource {
    fn open(&mut self) -> Result<VideoInfo, Error>;

    /// `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Mat>, Error>;
}

pub struct CaptureSource {
    path: PathBuf,
    capture: Option<videoio::VideoCapture>,
}

impl CaptureSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            capture: None,
        }
    }
}

impl VideoSource for CaptureSource {
    fn open(&mut self) -> Result<VideoInfo, Error> {
        let name = self.path.to_string_lossy().into_owned();
        let cap = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            return Err(Error::SourceUnavailable(name));
        }

        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        let info = VideoInfo {
            width: cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32,
            height: cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32,
            fps: if fps > 0.0 { fps } else { DEFAULT_FPS },
            total_frames: cap.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as usize,
        };

        tracing::info!(
            "opened {}: {}x{} @ {:.2} fps, {} frames",
            name,
            info.width,
            info.height,
            info.fps,
            info.total_frames
        );

        self.capture = Some(cap);

        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<Mat>, Error> {
        let Some(cap) = self.capture.as_mut() else {
            return Err(Error::SourceUnavailable(self.path.to_string_lossy().into_owned()));
        };

        let mut frame = Mat::default();
        if !cap.read(&mut frame)? || frame.cols() == 0 || frame.rows() == 0 {
            return Ok(None);
        }

        Ok(Some(frame))
    }
}

/// The two images written for one processed frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub index: usize,
    pub annotated_path: PathBuf,
    pub radar_path: PathBuf,
    /// Whether the frame goes into the assembled video.
    pub selected: bool,
}

pub trait FrameSink {
    fn persist(&mut self, index: usize, annotated: &Mat, radar: &Mat) -> Result<FrameRecord, Error>;
}

/// Writes `annotated_00000.jpg` / `radar_00000.jpg` pairs into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn annotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("annotated_{:05}.jpg", index))
    }

    pub fn radar_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("radar_{:05}.jpg", index))
    }
}

impl FrameSink for DirectorySink {
    fn persist(&mut self, index: usize, annotated: &Mat, radar: &Mat) -> Result<FrameRecord, Error> {
        let annotated_path = self.annotated_path(index);
        let radar_path = self.radar_path(index);

        write_image(&annotated_path, annotated)?;
        write_image(&radar_path, radar)?;

        Ok(FrameRecord {
            index,
            annotated_path,
            radar_path,
            selected: true,
        })
    }
}

pub fn write_image(path: &Path, img: &Mat) -> Result<(), Error> {
    let name = path.to_string_lossy();

    if !imgcodecs::imwrite(&name, img, &Vector::new())? {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("could not write {}", name),
        )
        .into());
    }

    Ok(())
}

/// `None` when the file is missing or not decodable.
pub fn read_image(path: &Path) -> Result<Option<Mat>, Error> {
    let img = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;

    Ok((!img.empty()).then_some(img))
}
