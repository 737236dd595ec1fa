#![cfg(feature = "web")]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use posture_link::server::router;
use posture_link::{ControlHandle, LinkBus};
use posture_vision::{Engine, EngineConfig, InboundSource, PostureUpdate, UpdateSink};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

async fn serve(bus: LinkBus, engine: &Engine) -> SocketAddr {
    let control = ControlHandle {
        context: engine.context(),
        calibration: engine.calibration_trigger(),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(bus, control)).await.unwrap();
    });
    addr
}

fn update() -> PostureUpdate {
    serde_json::from_str(
        r#"{
            "deviceId": "desk-1", "action": "update", "trust": 0.9,
            "timestamp": "2024-05-01T12:00:00Z",
            "neckAngle": {"value": 178.0, "confidence": 0.9},
            "backCurvature": {"value": 0.05, "confidence": 0.9},
            "armAngleL": {"value": 92.0, "confidence": 0.9},
            "armAngleR": {"value": 91.0, "confidence": 0.9},
            "hipAngle": {"value": 95.0, "confidence": 0.9},
            "kneeAngleL": {"value": 90.0, "confidence": 0.9},
            "kneeAngleR": {"value": 89.0, "confidence": 0.9},
            "posture": {"overall": "GOOD", "trunk": "acceptable", "neck": "acceptable",
                        "arm_left": "acceptable", "arm_right": "acceptable",
                        "hip": "acceptable", "knee": "acceptable"}
        }"#,
    )
    .unwrap()
}

/// Waits until the server side of a fresh connection has subscribed to updates.
async fn subscribed(bus: &LinkBus, clients: usize) {
    timeout(WAIT, async {
        while bus.updates_tx.receiver_count() < clients {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client subscribed");
}

#[tokio::test]
async fn client_receives_updates_and_its_messages_reach_the_engine() {
    let engine = Engine::new(EngineConfig::default());
    let bus = LinkBus::new(8);
    let mut inbound = bus.take_inbound().unwrap();
    let addr = serve(bus.clone(), &engine).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    subscribed(&bus, 1).await;

    bus.update_sink().publish(update()).await.unwrap();
    let received = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    let text = match received {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["deviceId"], "desk-1");
    assert_eq!(value["action"], "update");
    assert_eq!(value["posture"]["overall"], "GOOD");

    // A garbled message is dropped without closing the connection.
    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"device_id": "x"}"#.into())).await.unwrap();

    let message = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(message.device_id(), Some("x"));
}

#[tokio::test]
async fn every_client_gets_the_same_update() {
    let engine = Engine::new(EngineConfig::default());
    let bus = LinkBus::new(8);
    let addr = serve(bus.clone(), &engine).await;

    let (mut first, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let (mut second, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    subscribed(&bus, 2).await;

    bus.update_sink().publish(update()).await.unwrap();

    let a = timeout(WAIT, first.next()).await.unwrap().unwrap().unwrap();
    let b = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(a, b);
}
