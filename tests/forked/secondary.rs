#[path = "../helpers/mod.rs"]
mod helpers;

use alertbridge::core::{AlertConfiguration, AlertQuery, ConfigStore};
use alertbridge::forked::Mode;
use alertbridge::internal_metrics::test_recorder::TestRecorder;
use helpers::{alert, silence, ForkedFixture};
use std::time::Duration;

const SYNC_INTERVAL: Duration = Duration::from_secs(60);

fn fixture(recorder: &TestRecorder) -> ForkedFixture {
    ForkedFixture::new(Mode::Secondary, SYNC_INTERVAL, recorder)
}

#[tokio::test(start_paused = true)]
async fn test_remote_sync_is_rate_limited() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);
    let first = AlertConfiguration::new(1, r#"{"v":1}"#);
    let second = AlertConfiguration::new(1, r#"{"v":2}"#);
    let third = AlertConfiguration::new(1, r#"{"v":3}"#);

    f.notifier.apply_config(&first).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    f.notifier.apply_config(&second).await.unwrap();

    assert_eq!(f.internal.calls_to("apply_config").len(), 2);
    assert_eq!(
        f.remote.calls_to("apply_config"),
        vec![format!("apply_config:{}", first.hash)]
    );

    tokio::time::advance(Duration::from_secs(31)).await;
    f.notifier.apply_config(&third).await.unwrap();

    assert_eq!(
        f.remote.calls_to("apply_config"),
        vec![
            format!("apply_config:{}", first.hash),
            format!("apply_config:{}", third.hash)
        ]
    );
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "success")]), 2);
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "failure")]), 0);
}

#[tokio::test]
async fn test_internal_failure_is_returned_after_remote_sync() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);
    f.internal.fail("apply_config");
    let config = AlertConfiguration::new(1, "{}");

    let result = f.notifier.apply_config(&config).await;

    assert!(result.is_err());
    assert_eq!(
        f.remote.calls_to("apply_config"),
        vec![format!("apply_config:{}", config.hash)]
    );
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "success")]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_hidden_and_retried_on_next_apply() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);
    let config = AlertConfiguration::new(1, "{}");
    f.remote.fail("apply_config");

    f.notifier.apply_config(&config).await.unwrap();
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "failure")]), 1);
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "success")]), 0);

    // A failed push does not start the interval.
    f.remote.recover("apply_config");
    tokio::time::advance(Duration::from_secs(1)).await;
    f.notifier.apply_config(&config).await.unwrap();

    assert_eq!(f.remote.calls_to("apply_config").len(), 2);
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "failure")]), 1);
    assert_eq!(recorder.counter_with("forked_remote_syncs_total", &[("outcome", "success")]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_apply_skips_sync_in_progress() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);
    f.remote.delay_apply(Duration::from_secs(5));
    let config = AlertConfiguration::new(1, "{}");

    let (a, b) = tokio::join!(
        f.notifier.apply_config(&config),
        f.notifier.apply_config(&config)
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(f.internal.calls_to("apply_config").len(), 2);
    assert_eq!(f.remote.calls_to("apply_config").len(), 1);
}

#[tokio::test]
async fn test_everything_else_is_served_in_process() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);

    let id = f.notifier.create_silence(&silence("env", "prod")).await.unwrap();
    assert_eq!(id, "internal-silence-0");
    f.notifier.delete_silence(&id).await.unwrap();
    f.notifier.get_silence(&id).await.unwrap();
    f.notifier.list_silences(&[]).await.unwrap();
    f.notifier.put_alerts(&[alert(&[("alertname", "HighCPU")])]).await.unwrap();
    f.notifier.get_alerts(&AlertQuery::default()).await.unwrap();
    f.notifier.get_alert_groups(&AlertQuery::default()).await.unwrap();
    f.notifier.get_receivers().await.unwrap();
    let status = f.notifier.get_status().await.unwrap();
    assert_eq!(status.version, "internal");
    f.notifier.save_and_apply_default_config().await.unwrap();
    f.notifier.clean_up().await;

    assert!(f.remote.calls().is_empty());
    assert_eq!(f.internal.calls().len(), 11);
}

#[tokio::test]
async fn test_stop_hands_latest_config_to_remote() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);
    let stored = AlertConfiguration::new(1, r#"{"latest":true}"#);
    f.store.save_config(stored.clone()).await.unwrap();

    f.notifier.stop_and_wait().await;

    assert_eq!(f.internal.calls(), vec!["stop_and_wait".to_string()]);
    assert_eq!(
        f.remote.calls(),
        vec![
            "stop_and_wait".to_string(),
            format!("apply_config:{}", stored.hash)
        ]
    );
}

#[tokio::test]
async fn test_stop_without_stored_config_still_stops_both() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);

    f.notifier.stop_and_wait().await;

    assert_eq!(f.internal.calls(), vec!["stop_and_wait".to_string()]);
    assert_eq!(f.remote.calls(), vec!["stop_and_wait".to_string()]);
}

#[tokio::test]
async fn test_ready_requires_both_backends() {
    let recorder = TestRecorder::new();
    let f = fixture(&recorder);
    assert!(f.notifier.ready());

    f.remote.set_ready(false);
    assert!(!f.notifier.ready());

    f.remote.set_ready(true);
    f.internal.set_ready(false);
    assert!(!f.notifier.ready());
}
