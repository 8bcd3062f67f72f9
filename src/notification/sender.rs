//! The notification sender: a bounded, batching queue in front of the
//! remote Alertmanager.
//!
//! Producers call [`NotificationSender::send`], which never waits on the
//! network. A single background task pops batches off the head of the queue
//! and posts them. When the queue is full the oldest alerts are evicted; a
//! failed delivery drops the whole batch. Nothing is retried.

use crate::config::SenderConfig;
use crate::core::Label;
use crate::internal_metrics::SenderMetrics;
use crate::notification::client::AlertsClient;
use crate::notification::Alert;
use crate::relabel::{self, RelabelRule};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// State shared between producers and the dispatch task.
struct Shared {
    queue: Mutex<VecDeque<Alert>>,
    capacity: usize,
    max_batch_size: usize,
    send_timeout: Duration,
    external_labels: Vec<Label>,
    relabel_rules: Vec<RelabelRule>,
    wake_tx: mpsc::Sender<()>,
    client: Arc<dyn AlertsClient>,
    metrics: SenderMetrics,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Alert>> {
        // The queue holds plain data, so a poisoned lock is still usable.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Requests a dispatch cycle. A pending request absorbs this one.
    fn notify(&self) {
        let _ = self.wake_tx.try_send(());
    }

    fn pop_batch(&self) -> Vec<Alert> {
        let mut queue = self.queue();
        let n = queue.len().min(self.max_batch_size);
        let batch: Vec<Alert> = queue.drain(..n).collect();
        self.metrics.queue_length.set(queue.len() as f64);
        batch
    }

    async fn deliver(&self, batch: &[Alert]) {
        let count = batch.len() as u64;
        let start = Instant::now();
        let result = tokio::time::timeout(self.send_timeout, self.client.post_alerts(batch)).await;
        self.metrics
            .latency_seconds
            .record(start.elapsed().as_secs_f64());

        let err = match result {
            Ok(Ok(())) => {
                self.metrics.sent_total.increment(count);
                debug!(count, "Delivered alert batch.");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.send_timeout),
        };
        self.metrics.errors_total.increment(count);
        self.metrics.dropped_total.increment(count);
        error!(count, error = %err, "Failed to deliver alert batch, dropping it.");
    }
}

/// Queues alerts and delivers them asynchronously to an [`AlertsClient`].
pub struct NotificationSender {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationSender {
    /// Creates the sender and spawns its dispatch task.
    ///
    /// Fails if a relabel rule is invalid. Must be called from within a
    /// Tokio runtime.
    pub fn new(config: &SenderConfig, client: Arc<dyn AlertsClient>) -> anyhow::Result<Self> {
        let relabel_rules = relabel::compile(&config.relabel_configs)?;
        let external_labels = config
            .external_labels
            .iter()
            .map(|(name, value)| Label::new(name.clone(), value.clone()))
            .collect();

        let metrics = SenderMetrics::new(&client.destination());
        metrics.queue_capacity.set(config.queue_capacity as f64);
        metrics.queue_length.set(0.0);

        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(config.queue_capacity.min(1024))),
            capacity: config.queue_capacity,
            max_batch_size: config.max_batch_size.max(1),
            send_timeout: Duration::from_secs(config.send_timeout_seconds),
            external_labels,
            relabel_rules,
            wake_tx,
            client,
            metrics,
        });

        let handle = tokio::spawn(Self::run(shared.clone(), wake_rx, shutdown_rx));

        Ok(Self {
            shared,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Enqueues alerts for delivery.
    ///
    /// Default labels are added where missing, relabel rules are applied,
    /// and the queue is trimmed from the front to stay within capacity.
    /// Never blocks on delivery.
    pub fn send(&self, alerts: Vec<Alert>) {
        let shared = &self.shared;
        let mut batch = Vec::with_capacity(alerts.len());
        for mut alert in alerts {
            for default in &shared.external_labels {
                if alert.label(&default.name).is_none() {
                    alert.labels.push(default.clone());
                }
            }
            let labels = std::mem::take(&mut alert.labels);
            match relabel::process(labels, &shared.relabel_rules) {
                Some(labels) => {
                    alert.labels = labels;
                    batch.push(alert);
                }
                None => debug!("Alert dropped by relabel rules."),
            }
        }
        if batch.is_empty() {
            return;
        }

        let mut queue = shared.queue();
        if batch.len() > shared.capacity {
            let excess = batch.len() - shared.capacity;
            batch.drain(..excess);
            shared.metrics.dropped_total.increment(excess as u64);
            warn!(dropped = excess, "Alert batch larger than queue capacity, dropped oldest alerts in batch.");
        }

        let overflow = (queue.len() + batch.len()).saturating_sub(shared.capacity);
        if overflow > 0 {
            queue.drain(..overflow);
            shared.metrics.dropped_total.increment(overflow as u64);
            warn!(dropped = overflow, "Notification queue full, dropped oldest queued alerts.");
        }

        shared.metrics.accepted_total.increment(batch.len() as u64);
        queue.extend(batch);
        shared.metrics.queue_length.set(queue.len() as f64);
        drop(queue);

        shared.notify();
    }

    /// Counts alerts that were rejected before reaching the queue as failed
    /// deliveries.
    pub fn record_rejected(&self, count: usize) {
        if count == 0 {
            return;
        }
        let metrics = &self.shared.metrics;
        metrics.errors_total.increment(count as u64);
        metrics.dropped_total.increment(count as u64);
    }

    /// Number of alerts currently waiting for delivery.
    pub fn queue_len(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Snapshot of the queued alerts, oldest first.
    pub fn pending(&self) -> Vec<Alert> {
        self.shared.queue().iter().cloned().collect()
    }

    /// Stops the dispatch task and waits for it to exit. Queued alerts and
    /// any batch in flight are abandoned.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Notification dispatch task panicked.");
            }
        }
    }

    /// The dispatch loop: one batch per wake-up, re-arming itself while a
    /// backlog remains.
    async fn run(
        shared: Arc<Shared>,
        mut wake_rx: mpsc::Receiver<()>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(
            destination = %shared.client.destination(),
            capacity = shared.capacity,
            "Notification sender started."
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                woken = wake_rx.recv() => {
                    if woken.is_none() {
                        break;
                    }
                }
            }

            let batch = shared.pop_batch();
            if batch.is_empty() {
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    debug!(count = batch.len(), "Abandoning in-flight batch on shutdown.");
                    break;
                }
                _ = shared.deliver(&batch) => {}
            }

            if !shared.queue().is_empty() {
                shared.notify();
            }
        }
        info!("Notification sender stopped.");
    }
}
