use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Receiver};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use pushmon_collector::Sampler;
use pushmon_common::types::Metric;

use crate::transport::{MetricSink, TransportError};

/// One tick's worth of metrics travelling the pipeline together.
pub type Batch = Vec<Metric>;

/// Runs a sampler on its own task, emitting one batch per tick until the
/// token fires. A failed tick is logged and skipped. The returned channel
/// closes when the task exits.
pub fn spawn_sampler<S>(
    mut sampler: S,
    poll_interval: Duration,
    token: CancellationToken,
    capacity: usize,
) -> Receiver<Batch>
where
    S: Sampler + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
            }
            let batch = match sampler.sample() {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(sampler = sampler.name(), error = %err, "sample failed");
                    continue;
                }
            };
            tokio::select! {
                _ = token.cancelled() => break,
                sent = tx.send(batch) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(sampler = sampler.name(), "sampler stopped");
    });
    rx
}

/// Merges any number of batch streams into one bounded channel.
///
/// Each input is drained by its own forwarding task, and every forward races
/// against cancellation. The output closes only after every input has closed
/// and every forwarder has exited: each task owns a clone of the sender, and
/// an mpsc channel closes when the last sender drops.
pub fn fan_in(
    inputs: Vec<Receiver<Batch>>,
    token: CancellationToken,
    capacity: usize,
) -> Receiver<Batch> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    for mut input in inputs {
        let tx = tx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            while let Some(batch) = input.recv().await {
                tokio::select! {
                    _ = token.cancelled() => return,
                    sent = tx.send(batch) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
    rx
}

/// Bounded worker pool draining the merged stream.
///
/// Exactly `workers` tasks pull batches until the channel closes or the
/// shared token fires. The first delivery failure cancels the token — every
/// other worker and both samplers stop — and becomes the error `run` reports.
pub struct Dispatcher {
    workers: usize,
    sink: Arc<dyn MetricSink>,
    token: CancellationToken,
}

impl Dispatcher {
    pub fn new(workers: usize, sink: Arc<dyn MetricSink>, token: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            sink,
            token,
        }
    }

    /// Blocks until every worker has exited. Returns the first delivery
    /// error, or `Ok(())` once the merged channel is drained and closed.
    pub async fn run(&self, merged: Receiver<Batch>) -> Result<(), TransportError> {
        let merged = Arc::new(tokio::sync::Mutex::new(merged));
        let mut pool = JoinSet::new();

        for worker in 0..self.workers {
            let merged = Arc::clone(&merged);
            let sink = Arc::clone(&self.sink);
            let token = self.token.clone();
            pool.spawn(async move {
                loop {
                    // The lock is held only while waiting for the next batch;
                    // deliveries run concurrently across workers.
                    let batch = {
                        let mut rx = merged.lock().await;
                        tokio::select! {
                            _ = token.cancelled() => None,
                            batch = rx.recv() => batch,
                        }
                    };
                    let Some(batch) = batch else { break };

                    tracing::debug!(worker, metrics = batch.len(), "delivering batch");
                    if let Err(err) = sink.send_batch(&batch).await {
                        tracing::error!(worker, error = %err, "delivery failed, stopping pipeline");
                        token.cancel();
                        return Err(err);
                    }
                }
                tracing::debug!(worker, "worker done");
                Ok(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(err) => tracing::error!(error = %err, "worker task failed"),
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
