//! Frame-by-frame orchestration.
//!
//! Frames are processed strictly one after another. Inside a frame the work
//! fans out on a small rayon pool: keypoints and calibration run next to
//! detection and tracking, then team classification runs next to frame
//! annotation (which reads a snapshot of the team state taken before the
//! update), and finally the radar is rendered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use opencv::core::Mat;
use opencv::prelude::*;

use crate::annotate::FrameAnnotator;
use crate::calibration::{Calibration, Calibrator};
use crate::color::Color;
use crate::config::PipelineConfig;
use crate::detection::{Detection, EntityClass, Keypoint};
use crate::detector::{KeypointDetector, ObjectDetector};
use crate::error::Error;
use crate::history::MovementHistory;
use crate::radar::{RadarEntity, RadarRenderer};
use crate::recent::RecentPlayers;
use crate::referee::RefereeFilter;
use crate::team::{TeamClassifier, TeamId, TeamState};
use crate::tracker::{MultiClassTracker, TrackedFrame};
use crate::video::{FrameRecord, FrameSink, VideoInfo, VideoSource};
use crate::view::ViewTransformer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Configured,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl PipelineState {
    pub fn name(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Configured => "configured",
            PipelineState::Running => "running",
            PipelineState::Completed => "completed",
            PipelineState::Cancelled => "cancelled",
            PipelineState::Failed => "failed",
        }
    }
}

/// Cooperative stop flag, checked once per frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Callbacks for whoever drives the pipeline. All are no-ops by default.
pub trait PipelineObserver {
    fn progress(&mut self, _percent: f32, _current: usize, _total: usize) {}

    fn frame_processed(&mut self, _index: usize, _result: &FrameResult) {}

    fn preview_ready(&mut self, _annotated: &Mat, _radar: &Mat) {}

    fn finished(&mut self, _records: &[FrameRecord]) {}

    fn error(&mut self, _message: &str) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug)]
pub struct FrameResult {
    pub annotated: Mat,
    pub radar: Mat,
    pub calibration: Calibration,
    pub keypoints: Vec<Keypoint>,
    pub tracked: TrackedFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Vec<FrameRecord>),
    Cancelled(Vec<FrameRecord>),
}

impl RunOutcome {
    pub fn records(&self) -> &[FrameRecord] {
        match self {
            RunOutcome::Completed(r) | RunOutcome::Cancelled(r) => r,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    state: PipelineState,
    pool: rayon::ThreadPool,
    objects: Option<Arc<dyn ObjectDetector>>,
    keypoints: Option<Arc<dyn KeypointDetector>>,
    tracker: MultiClassTracker,
    calibrator: Calibrator,
    classifier: TeamClassifier,
    referee_filter: RefereeFilter,
    teams: TeamState,
    history: MovementHistory,
    recent: RecentPlayers,
    annotator: FrameAnnotator,
    radar: RadarRenderer,
    last_radar: Option<Mat>,
    source_info: Option<VideoInfo>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|idx| format!("pitchscope-{}", idx))
            .build()?;

        let classifier = TeamClassifier::new(config.team);
        let max_missing = config.trackers.player.max_missing;

        Ok(Self {
            state: PipelineState::Idle,
            pool,
            objects: None,
            keypoints: None,
            tracker: MultiClassTracker::new(&config.trackers),
            calibrator: Calibrator::new(config.calibration),
            referee_filter: RefereeFilter::new(config.team.referee_hue_threshold),
            teams: TeamState::default(),
            history: MovementHistory::new(config.history_len),
            recent: RecentPlayers::new(max_missing),
            annotator: FrameAnnotator::new(config.palette, classifier.clone(), config.render.jersey_overlay),
            radar: RadarRenderer::new(config.pitch.clone(), config.render),
            classifier,
            last_radar: None,
            source_info: None,
            config,
        })
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn teams(&self) -> &TeamState {
        &self.teams
    }

    #[inline]
    pub fn history(&self) -> &MovementHistory {
        &self.history
    }

    #[inline]
    pub fn recent_players(&self) -> &RecentPlayers {
        &self.recent
    }

    #[inline]
    pub fn tracker(&self) -> &MultiClassTracker {
        &self.tracker
    }

    /// Properties of the source opened by the latest run.
    #[inline]
    pub fn source_info(&self) -> Option<&VideoInfo> {
        self.source_info.as_ref()
    }

    #[inline]
    pub fn last_calibration(&self) -> Option<&Arc<ViewTransformer>> {
        self.calibrator.last()
    }

    /// Installs the detectors and starts from a clean per-video state.
    pub fn load_models(
        &mut self,
        objects: Arc<dyn ObjectDetector>,
        keypoints: Arc<dyn KeypointDetector>,
    ) -> Result<(), Error> {
        if self.state == PipelineState::Running {
            return Err(Error::InvalidState(self.state.name(), "not running"));
        }

        self.objects = Some(objects);
        self.keypoints = Some(keypoints);
        self.reset();

        Ok(())
    }

    /// Forgets everything learned from previous frames.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.calibrator.reset();
        self.teams.reset();
        self.history.clear();
        self.recent.clear();
        self.last_radar = None;
        self.source_info = None;

        self.state = if self.objects.is_some() && self.keypoints.is_some() {
            PipelineState::Configured
        } else {
            PipelineState::Idle
        };

        tracing::debug!("pipeline reset, now {}", self.state.name());
    }

    pub fn process_frame(&mut self, frame: &Mat) -> Result<FrameResult, Error> {
        let objects = self.objects.clone().ok_or(Error::ModelsNotLoaded)?;
        let keypoints = self.keypoints.clone().ok_or(Error::ModelsNotLoaded)?;

        // keypoints + calibration || detection + tracking + referee filter
        let (calibration, tracked) = {
            let calibrator = &mut self.calibrator;
            let tracker = &mut self.tracker;
            let teams = &self.teams;
            let classifier = &self.classifier;
            let referee_filter = &self.referee_filter;
            let pitch = &self.config.pitch;

            let kp_frame = frame.try_clone()?;
            let det_frame = frame.try_clone()?;

            self.pool.join(
                move || -> Result<(Calibration, Vec<Keypoint>), Error> {
                    let kps = keypoints.detect_keypoints(&kp_frame)?;

                    Ok((calibrator.calibrate(&kps, pitch), kps))
                },
                move || -> Result<TrackedFrame, Error> {
                    let dets = objects.detect(&det_frame)?;
                    let mut tracked = tracker.update(&dets);

                    let referees = std::mem::take(&mut tracked.referees);
                    tracked.referees = referee_filter.filter(&det_frame, referees, teams, classifier)?;

                    Ok(tracked)
                },
            )
        };

        let (calibration, keypoints) = calibration?;
        let tracked = tracked?;

        // team update || annotation over the pre-update snapshot
        let mut annotated = {
            let snapshot = self.teams.snapshot();
            let teams = &mut self.teams;
            let classifier = &self.classifier;
            let annotator = &self.annotator;
            let tracked = &tracked;

            let team_frame = frame.try_clone()?;
            let draw_frame = frame.try_clone()?;

            let (updated, annotated) = self.pool.join(
                move || classifier.update(teams, &team_frame, &tracked.players),
                move || annotator.annotate(&draw_frame, tracked, &snapshot),
            );

            if !updated? {
                tracing::trace!("team classification skipped");
            }

            annotated?
        };

        if self.config.render.keypoint_overlay {
            self.annotator.draw_keypoints(
                &mut annotated,
                &keypoints,
                &self.config.pitch,
                self.config.calibration.min_confidence,
            )?;
        }

        self.recent.update(&tracked.players, &self.teams);

        let tracker = &self.tracker;
        self.history.retain(|&(class, id)| tracker.is_live(class, id));

        let radar = match calibration.transformer() {
            Some(vt) => {
                let entities = self.radar_entities(vt, &tracked)?;

                // referees are not trailed
                for e in entities.iter().filter(|e| e.class != EntityClass::Referee) {
                    let finite = e.position.x.is_finite() && e.position.y.is_finite();

                    if let (Some(id), true) = (e.track_id, finite) {
                        self.history.push(e.class, id, e.position);
                    }
                }

                let renderer = &self.radar;
                let history = &self.history;
                let img = self
                    .pool
                    .install(move || renderer.render(&entities, Some(history)))?;

                self.last_radar = Some(img.try_clone()?);
                img
            }

            None => self.radar.placeholder(self.last_radar.as_ref())?,
        };

        Ok(FrameResult {
            annotated,
            radar,
            calibration,
            keypoints,
            tracked,
        })
    }

    fn role_color(&self, det: &Detection) -> Color {
        let palette = &self.config.palette;

        match det.class {
            EntityClass::Player => {
                let team = det
                    .track_id
                    .map(|id| self.teams.team_of(id))
                    .unwrap_or(TeamId::Unknown);

                self.teams.team_color(team).unwrap_or(palette.unknown)
            }
            EntityClass::Goalkeeper => palette.goalkeeper,
            EntityClass::Referee => palette.referee,
            EntityClass::Ball => palette.ball,
        }
    }

    fn radar_entities(&self, vt: &ViewTransformer, tracked: &TrackedFrame) -> Result<Vec<RadarEntity>, Error> {
        let dets: Vec<&Detection> = tracked.iter().collect();

        let anchors = Array2::from_shape_fn((dets.len(), 2), |(r, c)| {
            let a = dets[r].anchor();
            if c == 0 {
                a.x
            } else {
                a.y
            }
        });

        let projected = vt.transform_points(anchors.view())?;

        Ok(dets
            .iter()
            .zip(projected.outer_iter())
            .map(|(det, p)| RadarEntity {
                class: det.class,
                track_id: det.track_id,
                position: nalgebra::Point2::new(p[0], p[1]),
                color: self.role_color(det),
            })
            .collect())
    }

    fn fail<O: PipelineObserver + ?Sized>(&mut self, observer: &mut O, err: Error) -> Error {
        tracing::error!("run failed: {}", err);

        self.state = PipelineState::Failed;
        observer.error(&err.to_string());

        err
    }

    /// Processes `source` to the end or until `cancel` is set. Frames that
    /// fail are logged and skipped. A source that cannot be opened leaves
    /// the pipeline as it was; read and sink failures mid-run end it in
    /// `Failed`, which only `reset` leaves.
    pub fn run<S, K, O>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        observer: &mut O,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, Error>
    where
        S: VideoSource + ?Sized,
        K: FrameSink + ?Sized,
        O: PipelineObserver + ?Sized,
    {
        match self.state {
            PipelineState::Idle => {
                let err = Error::ModelsNotLoaded;
                observer.error(&err.to_string());

                return Err(err);
            }
            PipelineState::Running | PipelineState::Failed => {
                return Err(Error::InvalidState(self.state.name(), "configured"));
            }
            _ => {}
        }

        let info = match source.open() {
            Ok(info) => info,
            Err(err) => {
                tracing::error!("source rejected: {}", err);
                observer.error(&err.to_string());

                return Err(err);
            }
        };

        self.source_info = Some(info);
        self.state = PipelineState::Running;
        tracing::info!("run started, {} frames expected", info.total_frames);

        let interval = self.config.preview_interval;
        let mut records = Vec::new();
        let mut index = 0;

        loop {
            if cancel.is_cancelled() {
                self.state = PipelineState::Cancelled;
                tracing::info!("run cancelled after {} frames", index);

                return Ok(RunOutcome::Cancelled(records));
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(self.fail(observer, err)),
            };

            match self.process_frame(&frame) {
                Ok(result) => {
                    let record = match sink.persist(index, &result.annotated, &result.radar) {
                        Ok(record) => record,
                        Err(err) => return Err(self.fail(observer, err)),
                    };
                    records.push(record);

                    observer.frame_processed(index, &result);
                    if interval > 0 && index % interval == 0 {
                        observer.preview_ready(&result.annotated, &result.radar);
                    }
                }

                Err(err) => tracing::warn!("frame {} skipped: {}", index, err),
            }

            index += 1;

            let total = info.total_frames.max(index);
            observer.progress(index as f32 * 100.0 / total as f32, index, total);
        }

        self.state = PipelineState::Completed;
        tracing::info!("run completed, {} frames written", records.len());
        observer.finished(&records);

        Ok(RunOutcome::Completed(records))
    }
}
