//! Process CPU and memory gauges, sampled with `sysinfo`.

use metrics::Gauge;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tracing::{debug, warn};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// Samples this process's resource usage into two gauges.
pub struct SystemCollector {
    system: System,
    pid: Option<Pid>,
    cpu: Gauge,
    memory: Gauge,
}

impl SystemCollector {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!(error = %e, "Cannot determine own PID, process metrics disabled."))
            .ok();
        Self {
            system: System::new(),
            pid,
            cpu: metrics::gauge!("process_cpu_usage_percent"),
            memory: metrics::gauge!("process_memory_usage_bytes"),
        }
    }

    /// Takes one sample. Returns false once the process can no longer be
    /// observed.
    pub fn sample(&mut self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        if !self.system.refresh_process(pid) {
            return false;
        }
        match self.system.process(pid) {
            Some(process) => {
                self.cpu.set(process.cpu_usage() as f64);
                self.memory.set(process.memory() as f64);
                true
            }
            None => false,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = interval.tick() => {
                    if !self.sample() {
                        warn!("Process metrics unavailable, stopping collector.");
                        break;
                    }
                }
            }
        }
        debug!("SystemCollector stopped.");
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}
