#[path = "../helpers/mod.rs"]
mod helpers;

use alertbridge::backend::{RemoteBackend, RemoteBackendConfig};
use alertbridge::config::SenderConfig;
use alertbridge::core::Backend;
use alertbridge::internal_metrics::test_recorder::TestRecorder;
use helpers::alert;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn remote(server: &MockServer, sender: SenderConfig, recorder: &TestRecorder) -> RemoteBackend {
    let config = RemoteBackendConfig {
        org_id: 1,
        url: server.uri(),
        tenant_id: "1".to_string(),
        basic_auth_password: String::new(),
        timeout: Duration::from_secs(2),
        promote_config: false,
        external_url: String::new(),
        default_config: alertbridge::backend::DEFAULT_CONFIG.to_string(),
        sender,
    };
    metrics::with_local_recorder(recorder, || RemoteBackend::new(config).unwrap())
}

#[tokio::test]
async fn test_delivered_alerts_are_counted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alertmanager/api/v2/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let recorder = TestRecorder::new();
    let backend = remote(&server, SenderConfig::default(), &recorder);

    backend
        .put_alerts(&[alert(&[("alertname", "A")]), alert(&[("alertname", "B")])])
        .await
        .unwrap();

    recorder.wait_for_counter("notifications_sent_total", 2, WAIT).await;
    let destination = format!("{}/alertmanager/api/v2/alerts", server.uri());
    assert_eq!(
        recorder.counter_with("notifications_sent_total", &[("alertmanager", destination.as_str())]),
        2
    );
    assert_eq!(recorder.counter("notifications_accepted_total"), 2);
    assert_eq!(recorder.counter("notifications_errors_total"), 0);
    assert_eq!(recorder.gauge("notifications_queue_capacity"), 10_000.0);
    assert_eq!(recorder.histogram_samples("notifications_latency_seconds").len(), 1);
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_failed_batch_counts_every_alert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alertmanager/api/v2/alerts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let recorder = TestRecorder::new();
    let backend = remote(&server, SenderConfig::default(), &recorder);

    backend
        .put_alerts(&[
            alert(&[("alertname", "A")]),
            alert(&[("alertname", "B")]),
            alert(&[("alertname", "C")]),
        ])
        .await
        .unwrap();

    recorder.wait_for_counter("notifications_errors_total", 3, WAIT).await;
    assert_eq!(recorder.counter("notifications_dropped_total"), 3);
    assert_eq!(recorder.counter("notifications_sent_total"), 0);
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_overflow_and_rejections_are_dropped() {
    let server = MockServer::start().await;
    // Never answers within the test, so the queue is not drained.
    Mock::given(method("POST"))
        .and(path("/alertmanager/api/v2/alerts"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;
    let recorder = TestRecorder::new();
    let sender = SenderConfig {
        queue_capacity: 2,
        ..Default::default()
    };
    let backend = remote(&server, sender, &recorder);

    backend
        .put_alerts(&[
            alert(&[("alertname", "A")]),
            alert(&[("alertname", "B")]),
            alert(&[("alertname", "C")]),
            alert(&[("__alert_rule_namespace_uid__", "x")]),
        ])
        .await
        .unwrap();

    // One alert over capacity and one with no usable labels.
    assert_eq!(recorder.counter("notifications_dropped_total"), 2);
    assert_eq!(recorder.counter("notifications_errors_total"), 1);
    assert_eq!(recorder.counter("notifications_accepted_total"), 2);
    assert_eq!(backend.sender().capacity(), 2);
    assert!(backend.sender().queue_len() <= 2);
    backend.stop_and_wait().await;
}
