// THEORY:
// The `runtime` module runs the `PosturePipeline` as a small set of concurrent tasks.
// It is the engine as deployed on the device:
//
//   frame reader (thread) -> pipeline worker -> publisher   -> UpdateSink
//                                            -> dispatcher  -> AlertSink
//   InboundSource -> inbound applier -> EngineContext (thresholds, device id)
//
// Key architectural principles:
// 1.  **Explicit Shared Context**: Everything more than one task touches lives in
//     `EngineContext`, behind one `Arc`. The snapshot and the thresholds each have
//     their own mutex; readers always take a full copy under the lock. The device id
//     is a `OnceLock`, so the first non-empty value wins and is never replaced.
// 2.  **Single Writer Per State**: Only the worker writes the snapshot and owns the
//     alert accumulator. Thresholds have two writers (calibration and inbound
//     updates), serialized by the same mutex; last writer wins.
// 3.  **Queues Between Tasks**: The worker never awaits a network call. Updates and
//     alerts go into unbounded FIFOs and are drained by their own tasks, so a slow
//     sink delays delivery but never the next cycle.
// 4.  **Structured Shutdown**: One `Shutdown` signal is observed at every suspension
//     point. The worker raises it when the frame source ends; the outbound tasks
//     drain what is already queued before they exit.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core_modules::classifier::{PostureClassification, ThresholdPatch, ThresholdSet};
use crate::core_modules::features::PostureFeatures;
use crate::core_modules::landmark::PoseFrame;
use crate::error::{ChannelError, ConfigError};
use crate::messages::{AlertPayload, InboundMessage, PostureUpdate};
use crate::pipeline::{PosturePipeline, PostureReport};

pub use crate::source::FrameSource;

/// How far the frame reader may run ahead of the worker.
const FRAME_BUFFER: usize = 1;

/// Receives every posture update, in order.
pub trait UpdateSink: Send + 'static {
    fn publish(&mut self, update: PostureUpdate) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// Receives alerts. Failures are logged and never retried.
pub trait AlertSink: Send + 'static {
    fn notify(&mut self, payload: AlertPayload) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// Inbound configuration and identity updates. `None` means the channel is gone.
pub trait InboundSource: Send + 'static {
    fn recv(&mut self) -> impl Future<Output = Option<InboundMessage>> + Send;
}

/// The most recent per-frame result, as seen by readers outside the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostureSnapshot {
    pub features: PostureFeatures,
    pub classification: PostureClassification,
    pub temperature: f64,
    pub captured_at: DateTime<Utc>,
}

/// State shared between the engine's tasks and its external handles.
#[derive(Debug)]
pub struct EngineContext {
    snapshot: Mutex<Option<PostureSnapshot>>,
    thresholds: Mutex<ThresholdSet>,
    device_id: OnceLock<String>,
}

impl EngineContext {
    pub fn new(thresholds: ThresholdSet, device_id: Option<String>) -> Self {
        let context = Self {
            snapshot: Mutex::new(None),
            thresholds: Mutex::new(thresholds),
            device_id: OnceLock::new(),
        };
        if let Some(id) = device_id {
            context.assign_device_id(&id);
        }
        context
    }

    pub fn snapshot(&self) -> Option<PostureSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store_snapshot(&self, snapshot: PostureSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    pub fn thresholds(&self) -> ThresholdSet {
        *self.thresholds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a partial update under the threshold lock. Nothing is committed if the
    /// result would be inconsistent.
    pub fn apply_thresholds(&self, patch: &ThresholdPatch) -> Result<ThresholdSet, ConfigError> {
        let mut current = self.thresholds.lock().unwrap_or_else(PoisonError::into_inner);
        let updated = current.apply(patch)?;
        *current = updated;
        Ok(updated)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.get().map(String::as_str)
    }

    /// Sets the device id if none is set yet. Returns whether this call assigned it.
    pub fn assign_device_id(&self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.device_id.set(id.to_string()).is_ok()
    }

    /// The latest snapshot rendered as an outbound update.
    pub fn latest_update(&self) -> Option<PostureUpdate> {
        self.snapshot().map(|s| {
            PostureUpdate::new(
                self.device_id().map(str::to_string),
                s.captured_at,
                &s.features,
                &s.classification,
            )
        })
    }

    pub fn apply_inbound(&self, message: &InboundMessage) {
        if let Some(id) = message.device_id() {
            if self.assign_device_id(id) {
                info!(device_id = id, "device id assigned");
            } else if self.device_id() != Some(id) {
                debug!(device_id = id, "ignoring device id, one is already assigned");
            }
        }
        if let Some(patch) = message.threshold_patch() {
            if patch.is_empty() {
                return;
            }
            match self.apply_thresholds(&patch) {
                Ok(_) => info!(keys = patch.len(), "thresholds updated from inbound message"),
                Err(err) => warn!("rejected inbound thresholds: {err}"),
            }
        }
    }
}

/// Cooperative cancellation shared by every task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Asks the worker to calibrate against the latest snapshot.
#[derive(Debug, Clone)]
pub struct CalibrationTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl CalibrationTrigger {
    pub fn trigger(&self) -> Result<(), ChannelError> {
        self.tx.send(()).map_err(|_| ChannelError::Closed)
    }
}

pub struct Engine {
    config: EngineConfig,
    context: Arc<EngineContext>,
    shutdown: Shutdown,
    calibration_tx: mpsc::UnboundedSender<()>,
    calibration_rx: mpsc::UnboundedReceiver<()>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let context = Arc::new(EngineContext::new(config.thresholds, config.device_id.clone()));
        let (calibration_tx, calibration_rx) = mpsc::unbounded_channel();
        Self {
            config,
            context,
            shutdown: Shutdown::new(),
            calibration_tx,
            calibration_rx,
        }
    }

    pub fn context(&self) -> Arc<EngineContext> {
        Arc::clone(&self.context)
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn calibration_trigger(&self) -> CalibrationTrigger {
        CalibrationTrigger {
            tx: self.calibration_tx.clone(),
        }
    }

    /// Runs every task until the frame source ends or shutdown is triggered.
    pub async fn run<F, U, A, I>(self, source: F, updates: U, alerts: A, inbound: I)
    where
        F: FrameSource + Send + 'static,
        U: UpdateSink,
        A: AlertSink,
        I: InboundSource,
    {
        let Engine {
            config,
            context,
            shutdown,
            calibration_tx,
            calibration_rx,
        } = self;
        drop(calibration_tx);

        info!(
            cycle_ms = config.cycle().as_millis() as u64,
            policy = ?config.alert.policy,
            "posture engine starting"
        );

        let (frame_tx, frame_rx) = mpsc::channel::<PoseFrame>(FRAME_BUFFER);
        let (update_tx, update_rx) = mpsc::unbounded_channel::<PostureUpdate>();
        let (alert_tx, alert_rx) = mpsc::unbounded_channel::<AlertPayload>();

        spawn_frame_reader(source, frame_tx, shutdown.clone());

        let worker = PipelineWorker {
            pipeline: PosturePipeline::new(&config),
            context: Arc::clone(&context),
            frames: frame_rx,
            calibrations: calibration_rx,
            updates: update_tx,
            alerts: alert_tx,
            shutdown: shutdown.clone(),
        };

        let handles = [
            ("pipeline worker", tokio::spawn(worker.run(config.cycle()))),
            ("publisher", tokio::spawn(publisher(updates, update_rx, shutdown.clone()))),
            ("alert dispatcher", tokio::spawn(alert_dispatcher(alerts, alert_rx, shutdown.clone()))),
            (
                "inbound applier",
                tokio::spawn(inbound_applier(inbound, Arc::clone(&context), shutdown.clone())),
            ),
        ];

        for (name, handle) in handles {
            if let Err(err) = handle.await {
                error!(task = name, "task failed: {err}");
                shutdown.trigger();
            }
        }
        info!("posture engine stopped");
    }
}

/// Pulls frames on a plain thread so a blocking producer (a pipe, a slow file)
/// never stalls the async tasks. A bad frame is skipped; only a fatal source
/// error ends the stream.
fn spawn_frame_reader<F>(mut source: F, frames: mpsc::Sender<PoseFrame>, shutdown: Shutdown)
where
    F: FrameSource + Send + 'static,
{
    std::thread::spawn(move || {
        while !shutdown.is_triggered() {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    if frames.blocking_send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("frame source exhausted");
                    break;
                }
                Err(err) if err.is_fatal() => {
                    error!("frame source failed: {err}");
                    break;
                }
                Err(err) => warn!("skipping frame: {err}"),
            }
        }
    });
}

struct PipelineWorker {
    pipeline: PosturePipeline,
    context: Arc<EngineContext>,
    frames: mpsc::Receiver<PoseFrame>,
    calibrations: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<PostureUpdate>,
    alerts: mpsc::UnboundedSender<AlertPayload>,
    shutdown: Shutdown,
}

impl PipelineWorker {
    async fn run(mut self, cycle: Duration) {
        let mut ticker = tokio::time::interval(cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                Some(()) = self.calibrations.recv() => self.calibrate(),
                _ = ticker.tick() => {
                    let frame = tokio::select! {
                        _ = self.shutdown.wait() => break,
                        frame = self.frames.recv() => frame,
                    };
                    let Some(frame) = frame else {
                        info!("no more frames, shutting down");
                        self.shutdown.trigger();
                        break;
                    };
                    self.cycle(&frame);
                }
            }
        }
        debug!("pipeline worker exited");
    }

    fn cycle(&mut self, frame: &PoseFrame) {
        let thresholds = self.context.thresholds();
        let report = self.pipeline.process(frame, &thresholds);
        let now = Utc::now();

        self.context.store_snapshot(PostureSnapshot {
            features: report.features,
            classification: report.classification,
            temperature: report.temperature,
            captured_at: now,
        });

        debug!(
            overall = %report.classification.overall,
            curvature = report.features.curvature,
            temperature = report.temperature,
            advice = %report.advice().message,
            "cycle complete"
        );

        let device_id = self.context.device_id().map(str::to_string);
        let update = PostureUpdate::new(device_id.clone(), now, &report.features, &report.classification);
        if self.updates.send(update).is_err() {
            warn!("publisher is gone, dropping update");
        }

        if let Some(event) = report.alert {
            self.raise_alert(&report, device_id, now, event.temperature);
        }
    }

    fn raise_alert(&self, report: &PostureReport, device_id: Option<String>, now: DateTime<Utc>, temperature: f64) {
        let advice = report.advice();
        info!(
            overall = %report.classification.overall,
            temperature,
            advice = %advice.message,
            "sustained bad posture"
        );
        let payload = AlertPayload {
            device_id,
            timestamp: now,
            posture: report.classification.overall,
            temperature,
        };
        if self.alerts.send(payload).is_err() {
            warn!("alert dispatcher is gone, dropping alert");
        }
    }

    fn calibrate(&self) {
        let Some(snapshot) = self.context.snapshot() else {
            warn!("calibration requested before the first frame, ignoring");
            return;
        };
        let patch = self.pipeline.calibrate(&snapshot.features);
        if patch.is_empty() {
            warn!("calibration skipped: no segment measured with enough confidence");
            return;
        }
        match self.context.apply_thresholds(&patch) {
            Ok(_) => info!(keys = patch.len(), "thresholds calibrated"),
            Err(err) => warn!("calibration rejected: {err}"),
        }
    }
}

async fn publisher<U: UpdateSink>(mut sink: U, mut queue: mpsc::UnboundedReceiver<PostureUpdate>, shutdown: Shutdown) {
    loop {
        tokio::select! {
            biased;
            update = queue.recv() => {
                let Some(update) = update else { break };
                if let Err(err) = sink.publish(update).await {
                    warn!("failed to publish update: {err}");
                }
            }
            _ = shutdown.wait() => break,
        }
    }
    debug!("publisher exited");
}

async fn alert_dispatcher<A: AlertSink>(mut sink: A, mut queue: mpsc::UnboundedReceiver<AlertPayload>, shutdown: Shutdown) {
    loop {
        tokio::select! {
            biased;
            payload = queue.recv() => {
                let Some(payload) = payload else { break };
                if let Err(err) = sink.notify(payload).await {
                    warn!("failed to deliver alert: {err}");
                }
            }
            _ = shutdown.wait() => break,
        }
    }
    debug!("alert dispatcher exited");
}

async fn inbound_applier<I: InboundSource>(mut inbound: I, context: Arc<EngineContext>, shutdown: Shutdown) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            message = inbound.recv() => match message {
                Some(message) => context.apply_inbound(&message),
                None => {
                    info!("inbound channel closed");
                    break;
                }
            },
        }
    }
    debug!("inbound applier exited");
}

/// Sinks and sources that do nothing, for running the engine without a given channel.
pub mod detached {
    use super::*;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct DiscardUpdates;

    impl UpdateSink for DiscardUpdates {
        async fn publish(&mut self, _update: PostureUpdate) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct LogAlerts;

    impl AlertSink for LogAlerts {
        async fn notify(&mut self, payload: AlertPayload) -> Result<(), ChannelError> {
            warn!(posture = %payload.posture, temperature = payload.temperature, "alert (no sink configured)");
            Ok(())
        }
    }

    /// Never yields a message; the applier simply waits for shutdown.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoInbound;

    impl InboundSource for NoInbound {
        async fn recv(&mut self) -> Option<InboundMessage> {
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::ThresholdKey;

    #[test]
    fn device_id_first_non_empty_wins() {
        let context = EngineContext::new(ThresholdSet::default(), None);
        assert!(!context.assign_device_id("   "));
        assert!(context.assign_device_id("desk-1"));
        assert!(!context.assign_device_id("desk-2"));
        assert_eq!(context.device_id(), Some("desk-1"));
    }

    #[test]
    fn configured_device_id_is_kept() {
        let context = EngineContext::new(ThresholdSet::default(), Some("fixed".into()));
        context.apply_inbound(&InboundMessage::parse(r#"{"device_id": "remote"}"#).unwrap());
        assert_eq!(context.device_id(), Some("fixed"));
    }

    #[test]
    fn inconsistent_inbound_thresholds_are_not_committed() {
        let context = EngineContext::new(ThresholdSet::default(), None);
        context.apply_inbound(&InboundMessage::parse(r#"{"thresholds": {"knee_acceptable_max": 200}}"#).unwrap());
        assert_eq!(context.thresholds(), ThresholdSet::default());

        context.apply_inbound(&InboundMessage::parse(r#"{"thresholds": {"knee_acceptable_max": 105}}"#).unwrap());
        assert_eq!(context.thresholds().get(ThresholdKey::KneeAcceptableMax), 105.0);
    }

    #[test]
    fn no_snapshot_before_first_frame() {
        let context = EngineContext::new(ThresholdSet::default(), None);
        assert!(context.snapshot().is_none());
        assert!(context.latest_update().is_none());
    }

    #[tokio::test]
    async fn shutdown_wakes_every_waiter() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        waiter.await.unwrap();
        assert!(shutdown.is_triggered());
        // Already triggered: resolves immediately.
        shutdown.wait().await;
    }
}
