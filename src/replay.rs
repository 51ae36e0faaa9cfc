use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use opencv::core::Mat;
use serde_derive::{Deserialize, Serialize};

use crate::detection::{Detection, Keypoint};
use crate::detector::{KeypointDetector, ObjectDetector};
use crate::error::Error;

/// Precomputed model output for one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ReplayFrame {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
}

/// Detector pair that hands out recorded frames in order. Each trait keeps
/// its own cursor, so both may be queried once per frame in any order.
/// Frames past the end of the recording come back empty.
#[derive(Debug, Default)]
pub struct Replay {
    frames: Vec<ReplayFrame>,
    objects_cursor: AtomicUsize,
    keypoints_cursor: AtomicUsize,
}

impl Replay {
    pub fn new(frames: Vec<ReplayFrame>) -> Self {
        Self {
            frames,
            objects_cursor: AtomicUsize::new(0),
            keypoints_cursor: AtomicUsize::new(0),
        }
    }

    /// One JSON object per line; blank lines are frames with no output.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        let mut frames = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() {
                frames.push(ReplayFrame::default());
            } else {
                frames.push(serde_json::from_str(line)?);
            }
        }

        tracing::debug!("loaded {} replay frames", frames.len());

        Ok(Self::new(frames))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn rewind(&self) {
        self.objects_cursor.store(0, Ordering::SeqCst);
        self.keypoints_cursor.store(0, Ordering::SeqCst);
    }

    #[inline]
    fn next(&self, cursor: &AtomicUsize) -> Option<&ReplayFrame> {
        self.frames.get(cursor.fetch_add(1, Ordering::SeqCst))
    }
}

impl ObjectDetector for Replay {
    fn detect(&self, _frame: &Mat) -> Result<Vec<Detection>, Error> {
        Ok(self
            .next(&self.objects_cursor)
            .map(|f| f.detections.clone())
            .unwrap_or_default())
    }
}

impl KeypointDetector for Replay {
    fn detect_keypoints(&self, _frame: &Mat) -> Result<Vec<Keypoint>, Error> {
        Ok(self
            .next(&self.keypoints_cursor)
            .map(|f| f.keypoints.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::EntityClass;
    use std::io::Write;

    #[test]
    fn replays_lines_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"detections":[{{"b":[0,0,10,20],"c":"player","p":0.9}}],"keypoints":[{{"x":1,"y":2,"p":0.8}}]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"keypoints":[]}}"#).unwrap();

        let replay = Replay::from_file(file.path()).unwrap();
        let frame = Mat::default();
        assert_eq!(replay.len(), 3);

        let dets = replay.detect(&frame).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class, EntityClass::Player);
        assert_eq!(replay.detect_keypoints(&frame).unwrap()[0].confidence, 0.8);

        assert!(replay.detect(&frame).unwrap().is_empty());
        assert!(replay.detect(&frame).unwrap().is_empty());
        // past the end
        assert!(replay.detect(&frame).unwrap().is_empty());

        replay.rewind();
        assert_eq!(replay.detect(&frame).unwrap().len(), 1);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();

        assert!(matches!(Replay::from_file(file.path()), Err(Error::Json(_))));
    }
}
