// THEORY:
// `posture_tester` is the offline harness for the engine. It replays a JSON-lines
// recording through `PosturePipeline` exactly as the device would, one frame per
// cycle, but without the clock: frames are processed back to back and timestamps
// are synthesized from the cycle length. That makes a replay deterministic, so a
// recording plus a config is a reproducible test case.
//
// Output is either a readable per-frame log with advice, or (`--json`) one line per
// frame carrying the exact wire update, the accumulator temperature and any alert.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use posture_vision::core_modules::advice::Advice;
use posture_vision::core_modules::classifier::{OverallStatus, ThresholdSet};
use posture_vision::{EngineConfig, FrameSource, JsonlFrameSource, PostureReport, PosturePipeline, PostureUpdate};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "posture_tester", about = "Replays a recorded landmark stream through the posture pipeline")]
struct Args {
    /// JSON-lines recording to replay
    recording: PathBuf,

    /// Engine config (TOML); defaults are used when omitted
    #[arg(long, env = "POSTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Calibrate against the features of this frame (1-based) before continuing
    #[arg(long, value_name = "FRAME")]
    calibrate_at: Option<usize>,

    /// Emit one JSON object per frame instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    frame: usize,
    update: &'a PostureUpdate,
    temperature: f64,
    advice: &'a Advice,
    alert: bool,
}

/// Per-verdict frame counts for the closing summary.
#[derive(Debug, Default, PartialEq)]
struct Summary {
    frames: usize,
    good: usize,
    warning: usize,
    meh: usize,
    unknown: usize,
    alerts: usize,
    calibrated: bool,
}

impl Summary {
    fn record(&mut self, report: &PostureReport) {
        self.frames += 1;
        match report.classification.overall {
            OverallStatus::Good => self.good += 1,
            OverallStatus::Warning => self.warning += 1,
            OverallStatus::Meh => self.meh += 1,
            OverallStatus::Unknown => self.unknown += 1,
        }
        if report.alert.is_some() {
            self.alerts += 1;
        }
    }
}

struct Replay {
    pipeline: PosturePipeline,
    thresholds: ThresholdSet,
    device_id: Option<String>,
    cycle_micros: i64,
    start: DateTime<Utc>,
    calibrate_at: Option<usize>,
    json: bool,
}

impl Replay {
    fn new(config: &EngineConfig, calibrate_at: Option<usize>, json: bool) -> Self {
        Self {
            pipeline: PosturePipeline::new(config),
            thresholds: config.thresholds,
            device_id: config.device_id.clone(),
            cycle_micros: (config.cycle_secs * 1e6).round() as i64,
            start: Utc::now(),
            calibrate_at,
            json,
        }
    }

    fn run(&mut self, source: &mut impl FrameSource, out: &mut impl Write) -> anyhow::Result<Summary> {
        let mut summary = Summary::default();
        let mut index = 0usize;

        while let Some(frame) = source.next_frame()? {
            index += 1;

            // --- 1. Pipeline ---
            let report = self.pipeline.process(&frame, &self.thresholds);
            summary.record(&report);

            // --- 2. Wire Update & Advice ---
            let timestamp = self.timestamp(index);
            let update = PostureUpdate::new(
                self.device_id.clone(),
                timestamp,
                &report.features,
                &report.classification,
            );
            let advice = report.advice();

            // --- 3. Output ---
            if self.json {
                let record = FrameRecord {
                    frame: index,
                    update: &update,
                    temperature: report.temperature,
                    advice: &advice,
                    alert: report.alert.is_some(),
                };
                serde_json::to_writer(&mut *out, &record)?;
                writeln!(out)?;
            } else {
                write_text(out, index, &report, &advice)?;
            }

            // --- 4. Calibration ---
            if self.calibrate_at == Some(index) {
                summary.calibrated = self.calibrate(&report);
            }
        }
        Ok(summary)
    }

    /// Capture time of the 1-based frame `index`, saturating at the end of the calendar.
    fn timestamp(&self, index: usize) -> DateTime<Utc> {
        let steps = i64::try_from(index.saturating_sub(1)).unwrap_or(i64::MAX);
        let offset = TimeDelta::microseconds(self.cycle_micros.saturating_mul(steps));
        self.start.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn calibrate(&mut self, reference: &PostureReport) -> bool {
        let patch = self.pipeline.calibrate(&reference.features);
        if patch.is_empty() {
            warn!("calibration frame had no confident segment, thresholds unchanged");
            return false;
        }
        match self.thresholds.apply(&patch) {
            Ok(updated) => {
                info!(keys = patch.len(), "thresholds calibrated");
                self.thresholds = updated;
                true
            }
            Err(err) => {
                warn!("calibration rejected: {err}");
                false
            }
        }
    }
}

fn write_text(out: &mut impl Write, index: usize, report: &PostureReport, advice: &Advice) -> io::Result<()> {
    write!(
        out,
        "frame {index:>5}  {:<7}  curvature {:.3}  trust {:.2}  temp {:.3}  {}",
        report.classification.overall.to_string(),
        report.features.curvature,
        report.features.trust,
        report.temperature,
        advice.message,
    )?;
    for line in &advice.sub_messages {
        write!(out, " | {line}")?;
    }
    if report.alert.is_some() {
        write!(out, "  [ALERT]")?;
    }
    writeln!(out)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut source = JsonlFrameSource::open(&args.recording)
        .with_context(|| format!("opening {}", args.recording.display()))?;

    // --- 2. Replay ---
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut replay = Replay::new(&config, args.calibrate_at, args.json);
    let summary = replay.run(&mut source, &mut out)?;
    out.flush()?;

    info!(
        frames = summary.frames,
        good = summary.good,
        warning = summary.warning,
        meh = summary.meh,
        unknown = summary.unknown,
        alerts = summary.alerts,
        calibrated = summary.calibrated,
        "replay finished"
    );
    Ok(())
}
