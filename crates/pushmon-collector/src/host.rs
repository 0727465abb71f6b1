use crate::Sampler;
use anyhow::Result;
use pushmon_common::types::Metric;
use sysinfo::System;

/// Samples host-wide statistics: physical memory and the logical CPU count.
///
/// A stat the platform cannot report is omitted from the batch instead of
/// failing the whole tick.
pub struct HostSampler {
    system: System,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Sampler for HostSampler {
    fn name(&self) -> &str {
        "host"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let mut metrics = Vec::new();

        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total > 0 {
            metrics.push(Metric::gauge("TotalMemory", total as f64));
            metrics.push(Metric::gauge("FreeMemory", self.system.free_memory() as f64));
        }

        self.system.refresh_cpu_all();
        let cpus = self.system.cpus().len();
        if cpus > 0 {
            metrics.push(Metric::gauge("CPUCount", cpus as f64));
        }

        Ok(metrics)
    }
}
