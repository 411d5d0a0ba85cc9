//! End-to-end: config file -> engine -> MQTT phones -> HTTP API.

use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use phoned::api::create_router;
use phoned::integrations::mqtt::config::Qos;
use phoned::integrations::mqtt::MqttClient;
use phoned::integrations::mqtt::MqttIntegration;
use phoned::integrations::mqtt::MqttMessage;
use phoned::Config;
use phoned::Engine;
use phoned::Event;
use phoned::PhoneState;
use serde_json::json;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tower::ServiceExt;

type Published = Arc<Mutex<Vec<(String, String, Qos)>>>;

/// Broker stand-in: the test pushes state reports in, dial commands are recorded.
struct ChannelClient {
    incoming: mpsc::UnboundedReceiver<MqttMessage>,
    published: Published,
}

#[async_trait]
impl MqttClient for ChannelClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        Ok(())
    }

    async fn subscribe(&mut self, _topic: &str, _qos: Qos) -> Result<(), Box<dyn Error + Send>> {
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        _retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(payload).to_string(),
            qos,
        ));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        self.incoming.recv().await
    }

    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        Ok(())
    }
}

const CONFIG: &str = r#"
[logging]
level = "debug"

[integrations.mqtt]
broker = "localhost"

[integrations.mqtt.phones.hallway]
name = "Hallway Phone"
state_topic = "voip/line1/state"
command_topic = "voip/line1/dial"
qos = 1
value_template = "{{ value_json.state }}"
callerid_template = "{{ value_json.callerid }}"
callername_template = "{{ value_json.callername | default('') }}"
command_template = "{\"dial\": \"{{ value }}\"}"
"#;

async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn state_report(payload: Value) -> MqttMessage {
    MqttMessage {
        topic: "voip/line1/state".to_string(),
        payload: payload.to_string().into_bytes(),
    }
}

#[tokio::test]
async fn test_phone_bridge_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    let (config, diagnostics) = Config::from_file(file.path()).unwrap();
    assert!(diagnostics.is_empty());
    let mqtt_config = config.integrations.mqtt.as_ref().unwrap();

    let (broker_tx, incoming) = mpsc::unbounded_channel();
    let published: Published = Arc::default();
    let client = ChannelClient {
        incoming,
        published: published.clone(),
    };

    let engine = Arc::new(Engine::new());
    let mut events = engine.subscribe();
    let runner = engine.clone();
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    engine
        .register_integration(
            "mqtt".to_string(),
            Box::new(MqttIntegration::new(client, mqtt_config)),
        )
        .await;

    match next_event(&mut events).await {
        Event::PhoneAdded {
            entity_id,
            snapshot,
        } => {
            assert_eq!(entity_id, "phone.hallway");
            assert_eq!(snapshot.name, "Hallway Phone");
            assert_eq!(snapshot.state, PhoneState::Unknown);
        }
        other => panic!("expected PhoneAdded, got {:?}", other),
    }

    // Incoming call
    broker_tx
        .send(state_report(json!({
            "state": "ringing",
            "callerid": "5551234",
            "callername": "Alice",
        })))
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        Event::PhoneStateChanged { .. }
    ));
    assert!(engine.is_ringing(Some("phone.hallway")));
    assert!(engine.is_ringing(None));

    let router = create_router(engine.clone());
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/states/phone.hallway")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body["state"], "ringing");
    assert_eq!(
        body["attributes"],
        json!({"callerid": "5551234", "callername": "Alice"})
    );

    // Picked up: caller info is cleared
    broker_tx
        .send(state_report(json!({"state": "offhook", "callerid": "5551234"})))
        .unwrap();
    match next_event(&mut events).await {
        Event::PhoneStateChanged { snapshot, .. } => {
            assert_eq!(snapshot.state, PhoneState::Offhook);
            assert_eq!(snapshot.caller_id, None);
            assert_eq!(snapshot.caller_name, None);
        }
        other => panic!("expected PhoneStateChanged, got {:?}", other),
    }
    assert!(!engine.is_ringing(None));

    // Outgoing call through the service API
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/services/phone/call_number")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"entity_id": "phone.hallway", "destination_number": "5559876"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while published.lock().unwrap().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "dial command was not published"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        published.lock().unwrap().as_slice(),
        &[(
            "voip/line1/dial".to_string(),
            r#"{"dial": "5559876"}"#.to_string(),
            Qos::AtLeastOnce
        )]
    );

    engine.shutdown().await;
    assert_eq!(
        next_event(&mut events).await,
        Event::PhoneRemoved {
            entity_id: "phone.hallway".to_string()
        }
    );
    assert!(engine.state_snapshot().phones.is_empty());
}

#[tokio::test]
async fn test_no_integrations_configured() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[api]\nport = 0\n").unwrap();
    let (config, _) = Config::from_file(file.path()).unwrap();

    let engine = Arc::new(Engine::new());
    assert_eq!(engine.register_integrations_from_config(&config).await, 0);

    let response = create_router(engine)
        .oneshot(Request::builder().uri("/v1/states").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"[]");
}
