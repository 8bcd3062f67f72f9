#![allow(dead_code)]

use alertbridge::backend::fake::FakeBackend;
use alertbridge::config::Config;
use alertbridge::core::{LabelSet, Matcher, PostableAlert, PostableSilence};
use alertbridge::forked::{new_forked_notifier, ForkedOptions, Mode};
use alertbridge::internal_metrics::test_recorder::TestRecorder;
use alertbridge::store::MemoryConfigStore;
use alertbridge::Backend;
use chrono::{Duration as ChronoDuration, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// A configuration with every listener on an ephemeral port and metrics off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.api.listen_address = SocketAddr::from(([127, 0, 0, 1], 0));
    config.metrics.enabled = false;
    config.metrics.system_metrics_enabled = false;
    config
}

/// A forked notifier over two fakes, with its metrics bound to `recorder`.
pub struct ForkedFixture {
    pub notifier: Arc<dyn Backend>,
    pub internal: Arc<FakeBackend>,
    pub remote: Arc<FakeBackend>,
    pub store: Arc<MemoryConfigStore>,
}

impl ForkedFixture {
    pub fn new(mode: Mode, sync_interval: Duration, recorder: &TestRecorder) -> Self {
        let internal = Arc::new(FakeBackend::new("internal"));
        let remote = Arc::new(FakeBackend::new("remote"));
        let store = Arc::new(MemoryConfigStore::new());
        let notifier = metrics::with_local_recorder(recorder, || {
            new_forked_notifier(
                mode,
                internal.clone(),
                remote.clone(),
                store.clone(),
                ForkedOptions {
                    org_id: 1,
                    sync_interval,
                },
            )
        });
        Self {
            notifier,
            internal,
            remote,
            store,
        }
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn alert(pairs: &[(&str, &str)]) -> PostableAlert {
    PostableAlert {
        labels: labels(pairs),
        ..Default::default()
    }
}

/// A silence on `name="value"` active for the next hour.
pub fn silence(name: &str, value: &str) -> PostableSilence {
    let now = Utc::now();
    PostableSilence {
        id: None,
        matchers: vec![Matcher {
            name: name.to_string(),
            value: value.to_string(),
            is_regex: false,
            is_equal: true,
        }],
        starts_at: now,
        ends_at: now + ChronoDuration::hours(1),
        created_by: "tests".to_string(),
        comment: "maintenance".to_string(),
    }
}
