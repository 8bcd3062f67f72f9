//! An in-memory metrics recorder for tests.
//!
//! Install it around component construction with
//! `metrics::with_local_recorder`; the handles registered there keep
//! reporting to this recorder for their whole lifetime. Series are kept per
//! key, so lookups can either sum every label set of a name or select one
//! with `*_with` and a list of label pairs.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct TestRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

fn matches(key: &Key, name: &str, labels: &[(&str, &str)]) -> bool {
    key.name() == name
        && labels
            .iter()
            .all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v))
}

impl TestRecorder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new(AtomicStorage)),
        }
    }

    /// Sum of every series named `name`, whatever its labels.
    pub fn counter(&self, name: &str) -> u64 {
        self.counter_with(name, &[])
    }

    /// Sum of the series named `name` carrying all of `labels`.
    pub fn counter_with(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.registry
            .get_counter_handles()
            .into_iter()
            .filter(|(key, _)| matches(key, name, labels))
            .map(|(_, value)| value.load(Ordering::Relaxed))
            .sum()
    }

    pub fn gauge(&self, name: &str) -> f64 {
        self.gauge_with(name, &[])
    }

    pub fn gauge_with(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.registry
            .get_gauge_handles()
            .into_iter()
            .filter(|(key, _)| matches(key, name, labels))
            .map(|(_, value)| f64::from_bits(value.load(Ordering::Relaxed)))
            .sum()
    }

    pub fn histogram_samples(&self, name: &str) -> Vec<f64> {
        self.registry
            .get_histogram_handles()
            .into_iter()
            .filter(|(key, _)| matches(key, name, &[]))
            .flat_map(|(_, bucket)| bucket.data())
            .collect()
    }

    /// Polls until counter `name` reaches `value`, panicking after `timeout`.
    pub async fn wait_for_counter(&self, name: &str, value: u64, timeout: Duration) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < timeout {
            if self.counter(name) >= value {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "Timeout waiting for counter '{}' to reach '{}' (is {})",
            name,
            value,
            self.counter(name)
        );
    }
}

impl Default for TestRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for TestRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry
            .get_or_create_counter(key, |c| Counter::from_arc(c.clone()))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry
            .get_or_create_gauge(key, |g| Gauge::from_arc(g.clone()))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry
            .get_or_create_histogram(key, |h| Histogram::from_arc(h.clone()))
    }
}
