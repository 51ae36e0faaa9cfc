use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Rect, Size},
    imgproc,
    prelude::*,
    videoio,
};
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::video::{read_image, FrameRecord, DEFAULT_FPS};

const INSET_WIDTH_RATIO: f64 = 0.2;
const INSET_MARGIN: i32 = 10;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Annotated,
    Radar,
    /// Annotated frame with the radar inset at the bottom centre.
    Integrated,
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "annotated" => Ok(Layout::Annotated),
            "radar" => Ok(Layout::Radar),
            "integrated" => Ok(Layout::Integrated),
            other => Err(format!("unknown layout `{}`", other)),
        }
    }
}

/// mp4 writer sized by the first frame it receives. Later frames of a
/// different size are scaled to fit, the file is never reopened.
pub struct ClipWriter {
    writer: Option<videoio::VideoWriter>,
    size: Option<(i32, i32)>,
    out_file: PathBuf,
    fps: f64,
    frames: usize,
}

impl ClipWriter {
    pub fn new<P: Into<PathBuf>>(out_file: P, fps: f64) -> Self {
        Self {
            writer: None,
            size: None,
            out_file: out_file.into(),
            fps: if fps > 0.0 { fps } else { DEFAULT_FPS },
            frames: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> Option<(i32, i32)> {
        self.size
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn release(&mut self) -> Result<(), Error> {
        if let Some(mut w) = self.writer.take() {
            w.release()?;
        }

        Ok(())
    }

    fn open(&mut self, size: (i32, i32)) -> Result<(), Error> {
        let writer = videoio::VideoWriter::new(
            &self.out_file.to_string_lossy(),
            videoio::VideoWriter::fourcc('m', 'p', '4', 'v')?,
            self.fps,
            Size::new(size.0, size.1),
            true,
        )?;

        if !writer.is_opened()? {
            return Err(Error::OutputUnavailable(
                self.out_file.to_string_lossy().into_owned(),
            ));
        }

        self.size = Some(size);
        self.writer = Some(writer);

        Ok(())
    }

    pub fn feed(&mut self, m: &Mat) -> Result<(), Error> {
        let size = match self.size {
            Some(size) => size,
            None => {
                let size = (m.cols(), m.rows());
                self.open(size)?;
                size
            }
        };

        let frame = fit_frame(m, size)?;

        if let Some(w) = self.writer.as_mut() {
            w.write(frame.as_ref().unwrap_or(m))?;
            self.frames += 1;
        }

        Ok(())
    }
}

/// Scaled copy of `m` when its size differs from `size`, `None` when it
/// already fits.
pub fn fit_frame(m: &Mat, size: (i32, i32)) -> Result<Option<Mat>, Error> {
    if (m.cols(), m.rows()) == size {
        return Ok(None);
    }

    tracing::warn!(
        "frame is {}x{}, scaled to {}x{}",
        m.cols(),
        m.rows(),
        size.0,
        size.1
    );

    let mut out = Mat::default();
    imgproc::resize(m, &mut out, Size::new(size.0, size.1), 0.0, 0.0, imgproc::INTER_AREA)?;

    Ok(Some(out))
}

impl Drop for ClipWriter {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!("video writer release failed: {}", err);
        }
    }
}

/// Radar scaled to 20% of the frame width, pasted bottom centre.
pub fn compose_integrated(annotated: &Mat, radar: &Mat) -> Result<Mat, Error> {
    let mut out = annotated.try_clone()?;

    let (fw, fh) = (out.cols(), out.rows());
    let inset_w = ((fw as f64 * INSET_WIDTH_RATIO) as i32).max(1);
    let inset_h = ((radar.rows() as f64 * inset_w as f64 / radar.cols().max(1) as f64) as i32).max(1);

    let x = (fw - inset_w) / 2;
    let y = fh - inset_h - INSET_MARGIN;
    if x < 0 || y < 0 {
        return Ok(out);
    }

    let mut inset = Mat::default();
    imgproc::resize(radar, &mut inset, Size::new(inset_w, inset_h), 0.0, 0.0, imgproc::INTER_AREA)?;

    {
        let mut roi = Mat::roi_mut(&mut out, Rect::new(x, y, inset_w, inset_h))?;
        inset.copy_to(&mut roi)?;
    }

    Ok(out)
}

fn compose(record: &FrameRecord, layout: Layout) -> Result<Option<Mat>, Error> {
    Ok(match layout {
        Layout::Annotated => read_image(&record.annotated_path)?,
        Layout::Radar => read_image(&record.radar_path)?,
        Layout::Integrated => {
            match (read_image(&record.annotated_path)?, read_image(&record.radar_path)?) {
                (Some(a), Some(r)) => Some(compose_integrated(&a, &r)?),
                _ => None,
            }
        }
    })
}

/// Encodes the selected records into `output`, returns the number of frames
/// written.
pub fn assemble_video(records: &[FrameRecord], layout: Layout, output: &Path, fps: f64) -> Result<usize, Error> {
    let selected: Vec<_> = records.iter().filter(|r| r.selected).collect();
    if selected.is_empty() {
        return Err(Error::NothingSelected);
    }

    let mut writer = ClipWriter::new(output, fps);

    for record in selected {
        match compose(record, layout)? {
            Some(frame) => writer.feed(&frame)?,
            None => tracing::warn!("frame {} images unreadable, skipped", record.index),
        }
    }

    writer.release()?;
    tracing::info!("wrote {} frames to {}", writer.frames(), output.display());

    Ok(writer.frames())
}
