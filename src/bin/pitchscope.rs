use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pitchscope::assemble::{assemble_video, Layout};
use pitchscope::pipeline::FrameResult;
use pitchscope::radar::draw_pitch;
use pitchscope::replay::Replay;
use pitchscope::video::{write_image, CaptureSource, DirectorySink, FrameRecord, DEFAULT_FPS};
use pitchscope::{CancelToken, Pipeline, PipelineConfig, PipelineObserver, RunOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "Football match video analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Annotate a match video and render the tactical radar for every frame.
    Analyze {
        /// Input video file.
        video: PathBuf,

        /// Recorded detector output, one JSON object per frame.
        #[arg(short, long)]
        replay: PathBuf,

        /// Directory receiving the annotated and radar images.
        #[arg(short, long, default_value = "frames")]
        out: PathBuf,

        /// Pipeline configuration (JSON).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Encode the processed frames into this mp4 file.
        #[arg(long)]
        assemble: Option<PathBuf>,

        /// annotated, radar or integrated
        #[arg(long, default_value = "annotated")]
        layout: Layout,

        /// Frame rate of the assembled video, defaults to the source's.
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Draw the empty pitch diagram.
    Pitch {
        /// Output image path.
        out: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Logs progress roughly every 5%.
#[derive(Default)]
struct LogObserver {
    last_step: Option<u32>,
    calibrated: usize,
}

impl PipelineObserver for LogObserver {
    fn progress(&mut self, percent: f32, current: usize, total: usize) {
        let step = (percent / 5.0) as u32;

        if self.last_step != Some(step) {
            self.last_step = Some(step);
            tracing::info!("{:5.1}% ({}/{})", percent, current, total);
        }
    }

    fn frame_processed(&mut self, index: usize, result: &FrameResult) {
        if result.calibration.is_available() {
            self.calibrated += 1;
        }

        tracing::debug!(
            "frame {}: {} tracked, calibration {}",
            index,
            result.tracked.len(),
            result.calibration.name()
        );
    }

    fn finished(&mut self, records: &[FrameRecord]) {
        tracing::info!("{} frames written, {} calibrated", records.len(), self.calibrated);
    }

    fn error(&mut self, message: &str) {
        tracing::error!("{}", message);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn write_manifest(dir: &Path, records: &[FrameRecord]) -> anyhow::Result<()> {
    let path = dir.join("frames.json");
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), records)?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    video: &Path,
    replay: &Path,
    out: &Path,
    config: Option<&Path>,
    assemble: Option<&Path>,
    layout: Layout,
    fps: Option<f64>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let replay = Arc::new(Replay::from_file(replay).with_context(|| format!("reading {}", replay.display()))?);

    let mut pipeline = Pipeline::new(config)?;
    pipeline.load_models(replay.clone(), replay)?;

    let mut source = CaptureSource::new(video);
    let mut sink = DirectorySink::new(out)?;
    let mut observer = LogObserver::default();

    let outcome = pipeline.run(&mut source, &mut sink, &mut observer, &CancelToken::new())?;
    write_manifest(out, outcome.records())?;

    if let RunOutcome::Cancelled(records) = &outcome {
        tracing::warn!("run cancelled after {} frames", records.len());
    }

    if let Some(target) = assemble {
        let fps = fps
            .or_else(|| pipeline.source_info().map(|info| info.fps))
            .filter(|fps| *fps > 0.0)
            .unwrap_or(DEFAULT_FPS);

        let written = assemble_video(outcome.records(), layout, target, fps)?;
        tracing::info!("assembled {} frames into {}", written, target.display());
    }

    Ok(())
}

fn run_pitch(out: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let img = draw_pitch(&config.pitch, &config.render)?;

    write_image(out, &img)?;
    tracing::info!("pitch written to {}", out.display());

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            video,
            replay,
            out,
            config,
            assemble,
            layout,
            fps,
        } => run_analyze(
            &video,
            &replay,
            &out,
            config.as_deref(),
            assemble.as_deref(),
            layout,
            fps,
        ),

        Commands::Pitch { out, config } => run_pitch(&out, config.as_deref()),
    }
}
