use crate::Sampler;
use anyhow::{anyhow, Result};
use pushmon_common::types::Metric;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Samples the agent's own process: memory and CPU statistics, the monotonic
/// `PollCount` counter, and the `RandomValue` liveness gauge.
pub struct RuntimeSampler {
    system: System,
    pid: Pid,
    poll_count: i64,
}

impl RuntimeSampler {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("resolving own pid: {e}"))?;
        Ok(Self {
            system: System::new(),
            pid,
            poll_count: 0,
        })
    }
}

impl Sampler for RuntimeSampler {
    fn name(&self) -> &str {
        "runtime"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| anyhow!("process {} is not visible", self.pid))?;

        self.poll_count += 1;

        Ok(vec![
            Metric::gauge("ResidentMemory", process.memory() as f64),
            Metric::gauge("VirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCpuUsage", f64::from(process.cpu_usage())),
            Metric::gauge("ProcessUptime", process.run_time() as f64),
            Metric::gauge("RandomValue", rand::random::<f64>()),
            // Delta per tick; the server's merge rule accumulates the total.
            Metric::counter("PollCount", 1),
        ])
    }
}
