use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use opencv::core::{self, Mat, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use pitchscope::bbox::BBox;
use pitchscope::pipeline::FrameResult;
use pitchscope::replay::{Replay, ReplayFrame};
use pitchscope::video::{DirectorySink, FrameRecord, VideoInfo, VideoSource};
use pitchscope::{
    CancelToken, Detection, EntityClass, Error, Keypoint, ObjectDetector, Pipeline, PipelineConfig, PipelineObserver,
    PipelineState, PitchConfiguration,
};

const FRAMES: usize = 20;
const WIDTH: i32 = 320;
const HEIGHT: i32 = 240;

// image = pitch * 0.02 + (50, 40)
const IMG_SCALE: f32 = 0.02;
const IMG_OFFSET: (f32, f32) = (50.0, 40.0);

const PLAYERS: [(f32, f32, bool); 4] = [
    (60.0, 80.0, true),
    (110.0, 90.0, true),
    (180.0, 85.0, false),
    (230.0, 95.0, false),
];

struct MemorySource {
    frames: VecDeque<Mat>,
    total: usize,
}

impl MemorySource {
    fn new(count: usize) -> Self {
        Self {
            frames: (0..count).map(|_| pitch_frame()).collect(),
            total: count,
        }
    }
}

impl VideoSource for MemorySource {
    fn open(&mut self) -> Result<VideoInfo, Error> {
        Ok(VideoInfo {
            width: WIDTH,
            height: HEIGHT,
            fps: 30.0,
            total_frames: self.total,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Mat>, Error> {
        Ok(self.frames.pop_front())
    }
}

struct BrokenSource;

impl VideoSource for BrokenSource {
    fn open(&mut self) -> Result<VideoInfo, Error> {
        Err(Error::SourceUnavailable("missing.mp4".into()))
    }

    fn next_frame(&mut self) -> Result<Option<Mat>, Error> {
        Ok(None)
    }
}

/// Decodes `n` frames, then errors.
struct FailingSource(usize);

impl VideoSource for FailingSource {
    fn open(&mut self) -> Result<VideoInfo, Error> {
        Ok(VideoInfo {
            width: WIDTH,
            height: HEIGHT,
            fps: 25.0,
            total_frames: 10,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Mat>, Error> {
        if self.0 == 0 {
            return Err(std::io::Error::other("decoder stalled").into());
        }

        self.0 -= 1;
        Ok(Some(pitch_frame()))
    }
}

/// Replays the recorded detections but fails on call `fail_at`.
struct FlakyDetector {
    inner: Arc<Replay>,
    calls: AtomicUsize,
    fail_at: usize,
}

impl ObjectDetector for FlakyDetector {
    fn detect(&self, frame: &Mat) -> Result<Vec<Detection>, Error> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(Error::Detector("inference timed out".into()));
        }

        self.inner.detect(frame)
    }
}

#[derive(Default)]
struct KeepFrames(Vec<(Vec<Keypoint>, Mat)>);

impl PipelineObserver for KeepFrames {
    fn frame_processed(&mut self, _index: usize, result: &FrameResult) {
        self.0
            .push((result.keypoints.clone(), result.annotated.try_clone().unwrap()));
    }
}

#[derive(Default)]
struct Recorder {
    cancel_at: Option<usize>,
    token: CancelToken,
    progress: Vec<usize>,
    calibrations: Vec<&'static str>,
    previews: usize,
    finished: usize,
    errors: Vec<String>,
}

impl PipelineObserver for Recorder {
    fn progress(&mut self, _percent: f32, current: usize, _total: usize) {
        self.progress.push(current);

        if self.cancel_at == Some(current) {
            self.token.cancel();
        }
    }

    fn frame_processed(&mut self, _index: usize, result: &FrameResult) {
        self.calibrations.push(result.calibration.name());
    }

    fn preview_ready(&mut self, _annotated: &Mat, _radar: &Mat) {
        self.previews += 1;
    }

    fn finished(&mut self, _records: &[FrameRecord]) {
        self.finished += 1;
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

fn player_box(x: f32, y: f32) -> BBox<pitchscope::bbox::Ltrb> {
    BBox::ltrb(x, y, x + 30.0, y + 60.0)
}

fn pitch_frame() -> Mat {
    let mut frame = Mat::new_rows_cols_with_default(HEIGHT, WIDTH, core::CV_8UC3, Scalar::new(40.0, 140.0, 40.0, 0.0))
        .unwrap();

    for &(x, y, red) in PLAYERS.iter() {
        let color = if red {
            Scalar::new(0.0, 0.0, 220.0, 0.0)
        } else {
            Scalar::new(220.0, 0.0, 0.0, 0.0)
        };

        imgproc::rectangle(
            &mut frame,
            Rect::new(x as i32, y as i32, 30, 60),
            color,
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
    }

    frame
}

fn keypoints(confidence: f32) -> Vec<Keypoint> {
    PitchConfiguration::default()
        .vertices()
        .iter()
        .map(|v| Keypoint::new(v.x * IMG_SCALE + IMG_OFFSET.0, v.y * IMG_SCALE + IMG_OFFSET.1, confidence))
        .collect()
}

fn detections() -> Vec<Detection> {
    let mut dets: Vec<_> = PLAYERS
        .iter()
        .map(|&(x, y, _)| Detection::new(player_box(x, y), EntityClass::Player, 0.9))
        .collect();

    dets.push(Detection::new(
        BBox::ltrb(150.0, 170.0, 158.0, 178.0),
        EntityClass::Ball,
        0.8,
    ));

    dets
}

/// Calibratable from frame index `first_confident` on, or only at that
/// index when `only_once` is set.
fn replay(first_confident: usize, only_once: bool) -> Arc<Replay> {
    let frames = (0..FRAMES)
        .map(|i| {
            let confident = if only_once {
                i == first_confident
            } else {
                i >= first_confident
            };

            ReplayFrame {
                detections: detections(),
                keypoints: keypoints(if confident { 0.9 } else { 0.1 }),
            }
        })
        .collect();

    Arc::new(Replay::new(frames))
}

fn configured(replay: Arc<Replay>) -> Pipeline {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.load_models(replay.clone(), replay).unwrap();
    pipeline
}

fn count_files(dir: &std::path::Path, prefix: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .count()
}

#[test]
fn full_run_writes_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = configured(replay(0, false));

    let mut source = MemorySource::new(FRAMES);
    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder::default();

    let outcome = pipeline
        .run(&mut source, &mut sink, &mut observer, &CancelToken::new())
        .unwrap();

    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.records().len(), FRAMES);
    assert_eq!(pipeline.state(), PipelineState::Completed);

    assert_eq!(count_files(dir.path(), "annotated_"), FRAMES);
    assert_eq!(count_files(dir.path(), "radar_"), FRAMES);

    assert_eq!(observer.finished, 1);
    assert_eq!(observer.progress, (1..=FRAMES).collect::<Vec<_>>());
    // frames 0, 5, 10, 15
    assert_eq!(observer.previews, 4);
    assert!(observer.calibrations.iter().all(|c| *c == "fresh"));
    assert_eq!(pipeline.source_info().map(|info| info.fps), Some(30.0));

    // four players with stable ids plus the ball
    assert_eq!(pipeline.history().len(), 5);
    let trail = pipeline.history().trail(EntityClass::Player, 1).unwrap();
    assert_eq!(trail.len(), FRAMES);

    let centroids = pipeline.teams().centroids().unwrap();
    assert!(centroids[0].distance(&centroids[1]) > 100.0);
    assert_ne!(pipeline.teams().team_of(1), pipeline.teams().team_of(3));
    assert_eq!(pipeline.teams().team_of(1), pipeline.teams().team_of(2));
}

#[test]
fn cancel_stops_after_current_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = configured(replay(0, false));

    let mut source = MemorySource::new(FRAMES);
    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder {
        cancel_at: Some(7),
        ..Default::default()
    };
    let token = observer.token.clone();

    let outcome = pipeline.run(&mut source, &mut sink, &mut observer, &token).unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.records().len(), 7);
    assert_eq!(pipeline.state(), PipelineState::Cancelled);

    assert_eq!(count_files(dir.path(), "annotated_"), 7);
    assert_eq!(count_files(dir.path(), "radar_"), 7);
    assert_eq!(observer.finished, 0);
    assert!(observer.errors.is_empty());
}

#[test]
fn calibration_falls_back_to_last_good_homography() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = configured(replay(3, true));

    let mut source = MemorySource::new(10);
    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder::default();

    pipeline
        .run(&mut source, &mut sink, &mut observer, &CancelToken::new())
        .unwrap();

    assert_eq!(
        observer.calibrations,
        vec![
            "unavailable",
            "unavailable",
            "unavailable",
            "fresh",
            "reused",
            "reused",
            "reused",
            "reused",
            "reused",
            "reused"
        ]
    );

    // positions recorded only once a homography exists
    let trail = pipeline.history().trail(EntityClass::Player, 1).unwrap();
    assert_eq!(trail.len(), 7);
    assert!(pipeline.last_calibration().is_some());
}

#[test]
fn run_without_models_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();

    let mut source = MemorySource::new(3);
    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder::default();

    let res = pipeline.run(&mut source, &mut sink, &mut observer, &CancelToken::new());

    assert!(matches!(res, Err(Error::ModelsNotLoaded)));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(observer.errors.len(), 1);
    assert_eq!(count_files(dir.path(), "annotated_"), 0);
}

#[test]
fn unopenable_source_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = configured(replay(0, false));

    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder::default();

    let res = pipeline.run(&mut BrokenSource, &mut sink, &mut observer, &CancelToken::new());
    assert!(matches!(res, Err(Error::SourceUnavailable(_))));
    assert_eq!(pipeline.state(), PipelineState::Configured);
    assert_eq!(observer.errors.len(), 1);
    assert_eq!(observer.finished, 0);

    let outcome = pipeline
        .run(&mut MemorySource::new(2), &mut sink, &mut observer, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.records().len(), 2);
}

#[test]
fn failed_read_requires_reset() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = configured(replay(0, false));

    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder::default();

    let res = pipeline.run(&mut FailingSource(3), &mut sink, &mut observer, &CancelToken::new());
    assert!(matches!(res, Err(Error::Io(_))));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(observer.errors.len(), 1);
    assert_eq!(count_files(dir.path(), "annotated_"), 3);

    let again = pipeline.run(&mut MemorySource::new(1), &mut sink, &mut observer, &CancelToken::new());
    assert!(matches!(again, Err(Error::InvalidState(..))));

    pipeline.reset();
    assert_eq!(pipeline.state(), PipelineState::Configured);
}

#[test]
fn reset_forgets_teams_and_trails() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = configured(replay(0, false));

    let mut sink = DirectorySink::new(dir.path()).unwrap();
    pipeline
        .run(&mut MemorySource::new(5), &mut sink, &mut Recorder::default(), &CancelToken::new())
        .unwrap();

    assert!(!pipeline.history().is_empty());
    assert!(pipeline.teams().centroids().is_some());
    assert!(!pipeline.recent_players().is_empty());

    pipeline.reset();

    assert!(pipeline.history().is_empty());
    assert!(pipeline.teams().centroids().is_none());
    assert!(pipeline.teams().assignments().is_empty());
    assert!(pipeline.recent_players().is_empty());
    assert!(pipeline.last_calibration().is_none());
    assert!(pipeline.source_info().is_none());
    assert!(pipeline.tracker().tracker(EntityClass::Player).tracks().is_empty());
    assert_eq!(pipeline.state(), PipelineState::Configured);
}

#[test]
fn failing_frame_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let replay = replay(0, false);

    let detector = Arc::new(FlakyDetector {
        inner: replay.clone(),
        calls: AtomicUsize::new(0),
        fail_at: 4,
    });

    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.load_models(detector, replay).unwrap();

    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut observer = Recorder::default();

    let outcome = pipeline
        .run(&mut MemorySource::new(10), &mut sink, &mut observer, &CancelToken::new())
        .unwrap();

    assert!(!outcome.is_cancelled());
    assert_eq!(pipeline.state(), PipelineState::Completed);

    let indices: Vec<_> = outcome.records().iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    assert_eq!(count_files(dir.path(), "annotated_"), 9);

    assert_eq!(observer.progress, (1..=10).collect::<Vec<_>>());
    assert_eq!(observer.finished, 1);
    assert!(observer.errors.is_empty());
}

#[test]
fn trails_of_expired_tracks_are_dropped() {
    let dir = tempfile::tempdir().unwrap();

    // players and ball seen in the first two frames only
    let frames = (0..25)
        .map(|i| ReplayFrame {
            detections: if i < 2 { detections() } else { Vec::new() },
            keypoints: keypoints(0.9),
        })
        .collect();
    let replay = Arc::new(Replay::new(frames));
    let mut pipeline = configured(replay);

    let mut sink = DirectorySink::new(dir.path()).unwrap();
    pipeline
        .run(&mut MemorySource::new(21), &mut sink, &mut Recorder::default(), &CancelToken::new())
        .unwrap();

    // missing for 19 frames, still within the track lifetime
    assert_eq!(pipeline.history().len(), 5);
    assert!(pipeline.tracker().is_live(EntityClass::Player, 1));

    pipeline
        .run(&mut MemorySource::new(4), &mut sink, &mut Recorder::default(), &CancelToken::new())
        .unwrap();

    assert!(!pipeline.tracker().is_live(EntityClass::Player, 1));
    assert!(pipeline.history().is_empty());
}

#[test]
fn keypoint_overlay_marks_confident_vertices() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = PipelineConfig::default();
    config.render.keypoint_overlay = true;
    config.render.jersey_overlay = false;

    let replay = replay(0, false);
    let mut pipeline = Pipeline::new(config).unwrap();
    pipeline.load_models(replay.clone(), replay).unwrap();

    let mut sink = DirectorySink::new(dir.path()).unwrap();
    let mut keep = KeepFrames::default();

    pipeline
        .run(&mut MemorySource::new(1), &mut sink, &mut keep, &CancelToken::new())
        .unwrap();

    let (kps, annotated) = &keep.0[0];
    assert_eq!(kps.len(), 32);

    // vertex 0 sits on the pitch corner, away from every player
    let corner = &kps[0];
    let px = annotated
        .at_2d::<opencv::core::Vec3b>(corner.y as i32, corner.x as i32)
        .unwrap();
    let background = pitch_frame();
    let bg = background
        .at_2d::<opencv::core::Vec3b>(corner.y as i32, corner.x as i32)
        .unwrap();
    assert_ne!(px, bg);
}
