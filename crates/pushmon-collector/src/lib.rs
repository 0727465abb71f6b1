//! Metric sampling for the pushmon agent.
//!
//! Each [`Sampler`] implementation gathers one category of statistics and
//! returns it as a batch of [`Metric`]s ready for delivery. Samplers are
//! point-in-time: nothing is retained between ticks except the runtime
//! sampler's monotonic poll counter.

pub mod host;
pub mod runtime;

use anyhow::Result;
use pushmon_common::types::Metric;

/// A statistics source polled by the agent once per tick.
///
/// `Send` is required because each sampler runs on its own task in the
/// agent's collection pipeline.
pub trait Sampler: Send {
    /// Sampler name (e.g. `"runtime"`, `"host"`), used for logging.
    fn name(&self) -> &str;

    /// Collects the current batch of metric values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn sample(&mut self) -> Result<Vec<Metric>>;
}
