#[path = "../helpers/mod.rs"]
mod helpers;

use alertbridge::backend::{RemoteBackend, RemoteBackendConfig};
use alertbridge::config::SenderConfig;
use alertbridge::core::{AlertConfiguration, AlertQuery, Backend, PostableAlert};
use alertbridge::errors::BackendError;
use helpers::{labels, silence};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{basic_auth, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_config(url: &str, password: &str) -> RemoteBackendConfig {
    RemoteBackendConfig {
        org_id: 1,
        url: url.to_string(),
        tenant_id: "tenant-1".to_string(),
        basic_auth_password: password.to_string(),
        timeout: Duration::from_secs(2),
        promote_config: true,
        external_url: "https://grafana.example.com".to_string(),
        default_config: alertbridge::backend::DEFAULT_CONFIG.to_string(),
        sender: SenderConfig::default(),
    }
}

async fn mount_ready(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/-/ready"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Polls until `server` has received `count` requests on `route`.
async fn wait_for_requests(server: &MockServer, route: &str, count: usize) -> Vec<wiremock::Request> {
    for _ in 0..200 {
        let requests: Vec<_> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .collect();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} requests on {}", count, route);
}

#[tokio::test]
async fn test_apply_config_sends_once_per_hash() {
    let server = MockServer::start().await;
    mount_ready(&server).await;
    let config = AlertConfiguration::new(1, r#"{"alertmanager_config":{}}"#);

    Mock::given(method("POST"))
        .and(path("/api/v1/grafana/config"))
        .and(header("x-scope-orgid", "tenant-1"))
        .and(header("x-remote-alertmanager", "true"))
        .and(basic_auth("tenant-1", "s3cret"))
        .and(body_partial_json(json!({
            "grafana_alertmanager_config": {"alertmanager_config": {}},
            "hash": config.hash,
            "default": false,
            "promoted": true,
            "external_url": "https://grafana.example.com",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "s3cret")).unwrap();
    assert!(!backend.ready());

    backend.apply_config(&config).await.unwrap();
    backend.apply_config(&config).await.unwrap();

    assert!(backend.ready());
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_changed_config_is_sent_again() {
    let server = MockServer::start().await;
    mount_ready(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/grafana/config"))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "")).unwrap();
    backend.apply_config(&AlertConfiguration::new(1, r#"{"a":1}"#)).await.unwrap();
    backend.apply_config(&AlertConfiguration::new(1, r#"{"a":2}"#)).await.unwrap();
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_apply_config_fails_when_remote_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/-/ready"))
        .respond_with(ResponseTemplate::new(503).set_body_string("starting"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/grafana/config"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "")).unwrap();
    let err = backend
        .apply_config(&AlertConfiguration::new(1, "{}"))
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::UnexpectedStatus { status: 503, .. }));
    assert!(!backend.ready());
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_save_and_apply_always_sends() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/grafana/config"))
        .and(body_partial_json(json!({ "default": false })))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/grafana/config"))
        .and(body_partial_json(json!({ "default": true })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "")).unwrap();
    let config = AlertConfiguration::new(1, "{}");
    backend.save_and_apply_config(&config).await.unwrap();
    backend.save_and_apply_config(&config).await.unwrap();
    backend.save_and_apply_default_config().await.unwrap();
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_silence_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alertmanager/api/v2/silences"))
        .and(body_partial_json(json!({
            "matchers": [{"name": "env", "value": "prod", "isRegex": false, "isEqual": true}],
            "createdBy": "tests",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "silenceID": "abc-123" })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/alertmanager/api/v2/silence/abc-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alertmanager/api/v2/silence/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "")).unwrap();

    let id = backend.create_silence(&silence("env", "prod")).await.unwrap();
    assert_eq!(id, "abc-123");
    backend.delete_silence(&id).await.unwrap();

    let err = backend.get_silence("missing").await.unwrap_err();
    assert!(matches!(err, BackendError::SilenceNotFound(id) if id == "missing"));
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_alert_queries_forward_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alertmanager/api/v2/alerts"))
        .and(query_param("active", "true"))
        .and(query_param("silenced", "false"))
        .and(query_param("filter", "env=\"prod\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "")).unwrap();
    let query = AlertQuery {
        silenced: false,
        filter: vec!["env=\"prod\"".to_string()],
        ..Default::default()
    };

    assert!(backend.get_alerts(&query).await.unwrap().is_empty());
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_unreachable_remote_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alertmanager/api/v2/status"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = remote_config(&server.uri(), "");
    config.timeout = Duration::from_millis(100);
    let backend = RemoteBackend::new(config).unwrap();

    let err = backend.get_status().await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout(_)));
    backend.stop_and_wait().await;
}

#[tokio::test]
async fn test_put_alerts_sanitizes_and_delivers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alertmanager/api/v2/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = RemoteBackend::new(remote_config(&server.uri(), "s3cret")).unwrap();
    let alerts = vec![
        PostableAlert {
            labels: labels(&[
                ("alertname", "HighCPU"),
                ("team.name", "db"),
                ("__alert_rule_namespace_uid__", "folder-1"),
                ("empty", ""),
            ]),
            annotations: labels(&[("summary", "cpu high"), ("runbook", "")]),
            ..Default::default()
        },
        // Nothing usable remains after filtering.
        PostableAlert {
            labels: labels(&[("__alert_rule_namespace_uid__", "folder-1")]),
            ..Default::default()
        },
    ];

    backend.put_alerts(&alerts).await.unwrap();

    let requests = wait_for_requests(&server, "/alertmanager/api/v2/alerts", 1).await;
    let request = &requests[0];
    assert_eq!(
        request.headers.get("x-scope-orgid").and_then(|v| v.to_str().ok()),
        Some("tenant-1")
    );
    assert!(request.headers.get("authorization").is_some());
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body,
        json!([{
            "labels": {"alertname": "HighCPU", "team_name": "db"},
            "annotations": {"summary": "cpu high"},
        }])
    );
    // The delivered batch has left the queue.
    assert_eq!(backend.sender().queue_len(), 0);
    backend.stop_and_wait().await;
}
