#[path = "../helpers/mod.rs"]
mod helpers;

use alertbridge::app::App;
use alertbridge::backend::fake::FakeBackend;
use alertbridge::core::ConfigStore;
use alertbridge::forked::Mode;
use alertbridge::store::MemoryConfigStore;
use helpers::{silence, test_config};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

struct TestApp {
    base: String,
    client: reqwest::Client,
    remote: Arc<FakeBackend>,
    store: Arc<MemoryConfigStore>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestApp {
    /// Starts the app in secondary mode with the real in-process backend and
    /// a fake remote.
    async fn start() -> Self {
        let mut config = test_config();
        config.forking.mode = Mode::Secondary;
        let remote = Arc::new(FakeBackend::new("remote"));
        let store = Arc::new(MemoryConfigStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = App::builder(config)
            .store_override(store.clone())
            .remote_override(remote.clone())
            .build(shutdown_rx)
            .await
            .unwrap();
        let base = format!("http://{}", app.api_addr().unwrap());
        let handle = tokio::spawn(app.run());

        Self {
            base,
            client: reqwest::Client::new(),
            remote,
            store,
            shutdown_tx,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn shutdown(self) -> Arc<FakeBackend> {
        self.shutdown_tx.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
        self.remote
    }
}

#[tokio::test]
async fn test_startup_applies_default_config() {
    let app = TestApp::start().await;

    let stored = app.store.get_latest_config(1).await.unwrap();
    assert!(stored.is_default);
    assert_eq!(
        app.remote.calls_to("apply_config"),
        vec![format!("apply_config:{}", stored.hash)]
    );

    let response = app.client.get(app.url("/-/ready")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let receivers: Value = app
        .client
        .get(app.url("/api/v1/receivers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(receivers[0]["name"], "grafana-default-email");
    assert_eq!(receivers[0]["active"], true);

    app.shutdown().await;
}

#[tokio::test]
async fn test_silence_lifecycle_over_http() {
    let app = TestApp::start().await;

    let created: Value = app
        .client
        .post(app.url("/api/v2/silences"))
        .json(&silence("env", "prod"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["silenceID"].as_str().unwrap().to_string();

    let fetched: Value = app
        .client
        .get(app.url(&format!("/api/v2/silence/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["status"]["state"], "active");

    let response = app
        .client
        .delete(app.url(&format!("/api/v2/silence/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let listed: Value = app
        .client
        .get(app.url("/api/v2/silences"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["status"]["state"], "expired");

    let missing = app
        .client
        .get(app.url("/api/v2/silence/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    // The remote never sees silences in secondary mode.
    let remote = app.shutdown().await;
    assert!(remote.calls_to("create_silence").is_empty());
}

#[tokio::test]
async fn test_alerts_are_stored_and_filtered() {
    let app = TestApp::start().await;

    let response = app
        .client
        .post(app.url("/api/v2/alerts"))
        .json(&json!([
            {"labels": {"alertname": "HighCPU", "env": "prod"}},
            {"labels": {"alertname": "DiskFull", "env": "dev"}},
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let alerts: Value = app
        .client
        .get(app.url("/api/v2/alerts?filter=env%3D%22prod%22"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["labels"]["alertname"], "HighCPU");
    assert_eq!(alerts[0]["status"]["state"], "active");
    assert_eq!(alerts[0]["receivers"][0]["name"], "grafana-default-email");

    let bad = app
        .client
        .get(app.url("/api/v2/alerts?active=maybe"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    app.shutdown().await;
}

#[tokio::test]
async fn test_config_upload_is_validated_and_saved() {
    let app = TestApp::start().await;

    let rejected = app
        .client
        .post(app.url("/api/v1/config"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);

    let document = json!({
        "alertmanager_config": {
            "route": {"receiver": "ops"},
            "receivers": [{
                "name": "ops",
                "grafana_managed_receiver_configs": [
                    {"uid": "u1", "name": "ops-slack", "type": "slack", "settings": {}}
                ]
            }]
        }
    });
    let accepted = app
        .client
        .post(app.url("/api/v1/config"))
        .body(document.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 202);

    let stored = app.store.get_latest_config(1).await.unwrap();
    assert!(!stored.is_default);
    assert!(stored.raw.contains("ops-slack"));

    app.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_hands_config_to_remote() {
    let app = TestApp::start().await;
    let stored = app.store.get_latest_config(1).await.unwrap();

    let remote = app.shutdown().await;

    let calls = remote.calls();
    let stop = calls.iter().position(|c| c == "stop_and_wait").unwrap();
    assert_eq!(calls[stop + 1], format!("apply_config:{}", stored.hash));
}
