// THEORY:
// `posture_link` connects the posture engine to the outside world on the device.
// The engine itself only knows the `UpdateSink`, `AlertSink` and `InboundSource`
// traits; this crate provides the concrete channels behind them:
//
// - `LinkBus` fans every `PostureUpdate` out to all connected WebSocket clients and
//   funnels whatever the clients send back into a single inbound queue.
// - `server` exposes the bus over HTTP/WebSocket and offers the calibration trigger.
// - `alert_sink` delivers alerts with an HTTP POST.

use std::sync::{Arc, Mutex, PoisonError};

use posture_vision::{
    CalibrationTrigger, ChannelError, EngineContext, InboundMessage, InboundSource, PostureUpdate, UpdateSink,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

pub mod alert_sink;
pub mod config;
pub mod error;
#[cfg(feature = "web")]
pub mod server;

pub use alert_sink::{AlertRoute, HttpAlertSink};
pub use config::{DaemonConfig, LinkSettings};
pub use error::LinkError;

/// Update fan-out and inbound funnel shared by the server and the engine.
#[derive(Clone)]
pub struct LinkBus {
    pub updates_tx: broadcast::Sender<Arc<str>>,
    pub inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>>,
}

impl LinkBus {
    pub fn new(capacity: usize) -> Self {
        let (updates_tx, _) = broadcast::channel::<Arc<str>>(capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            updates_tx,
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(Some(inbound_rx))),
        }
    }

    /// The engine-side update sink. Any number may exist; they all feed the same clients.
    pub fn update_sink(&self) -> BroadcastUpdates {
        BroadcastUpdates {
            tx: self.updates_tx.clone(),
        }
    }

    /// The engine-side inbound source. There is exactly one; later calls get `None`.
    pub fn take_inbound(&self) -> Option<InboundQueue> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| InboundQueue { rx })
    }

    /// Parses one client text frame and queues it for the engine.
    pub fn submit_inbound(&self, text: &str) -> Result<(), ChannelError> {
        let message = InboundMessage::parse(text)?;
        self.inbound_tx.send(message).map_err(|_| ChannelError::Closed)
    }
}

/// Serializes each update once and broadcasts it to every subscriber.
#[derive(Clone)]
pub struct BroadcastUpdates {
    tx: broadcast::Sender<Arc<str>>,
}

impl UpdateSink for BroadcastUpdates {
    async fn publish(&mut self, update: PostureUpdate) -> Result<(), ChannelError> {
        let json: Arc<str> = serde_json::to_string(&update)?.into();
        match self.tx.send(json) {
            Ok(clients) => trace!(clients, "update broadcast"),
            // Nobody is listening right now; the next client simply starts from the next update.
            Err(_) => trace!("update dropped, no clients connected"),
        }
        Ok(())
    }
}

pub struct InboundQueue {
    rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl InboundSource for InboundQueue {
    async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// What the HTTP side may read or poke on the running engine.
#[derive(Clone)]
pub struct ControlHandle {
    pub context: Arc<EngineContext>,
    pub calibration: CalibrationTrigger,
}

impl ControlHandle {
    pub fn request_calibration(&self) -> Result<(), ChannelError> {
        self.calibration.trigger().inspect_err(|err| warn!("calibration request dropped: {err}"))
    }
}

#[cfg(not(feature = "web"))]
pub async fn start_server(
    _bus: LinkBus,
    _cfg: ServerConfig,
    _control: ControlHandle,
    _shutdown: posture_vision::Shutdown,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for posture_link"))
}

#[cfg(feature = "web")]
pub use server::start_server;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update() -> PostureUpdate {
        serde_json::from_str(
            r#"{
                "deviceId": "desk-1", "action": "update", "trust": 0.8,
                "timestamp": "2024-05-01T12:00:00Z",
                "neckAngle": {"value": 175.0, "confidence": 0.9},
                "backCurvature": {"value": 0.1, "confidence": 0.8},
                "armAngleL": {"value": null, "confidence": null},
                "armAngleR": {"value": null, "confidence": null},
                "hipAngle": {"value": 92.0, "confidence": 0.9},
                "kneeAngleL": {"value": 90.0, "confidence": 0.9},
                "kneeAngleR": {"value": 91.0, "confidence": 0.9},
                "posture": {"overall": "GOOD", "trunk": "acceptable", "neck": "acceptable",
                            "arm_left": "unknown", "arm_right": "unknown",
                            "hip": "acceptable", "knee": "acceptable"}
            }"#,
        )
        .expect("sample update")
    }

    #[tokio::test]
    async fn every_subscriber_gets_each_update() {
        let bus = LinkBus::new(8);
        let mut first = bus.updates_tx.subscribe();
        let mut second = bus.updates_tx.subscribe();

        bus.update_sink().publish(sample_update()).await.unwrap();

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a, b);
        let value: serde_json::Value = serde_json::from_str(&a).unwrap();
        assert_eq!(value["deviceId"], "desk-1");
        assert_eq!(value["posture"]["overall"], "GOOD");
    }

    #[tokio::test]
    async fn publishing_without_clients_is_fine() {
        let bus = LinkBus::new(1);
        assert!(bus.update_sink().publish(sample_update()).await.is_ok());
    }

    #[tokio::test]
    async fn inbound_text_reaches_the_single_queue() {
        let bus = LinkBus::new(1);
        let mut queue = bus.take_inbound().unwrap();
        assert!(bus.take_inbound().is_none());

        bus.submit_inbound(r#"{"device_id": "cam-2"}"#).unwrap();
        assert!(bus.submit_inbound("not json").is_err());

        let message = queue.recv().await.unwrap();
        assert_eq!(message.device_id(), Some("cam-2"));
    }
}
