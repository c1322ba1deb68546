//! Buffering emitter with size/interval flushing and bounded retry.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    nubi_common::{PipelineEvent, PipelineEventSink},
    nubi_policy::TelemetryPolicy,
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
        time::MissedTickBehavior,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use {
    metrics::{counter, histogram},
    nubi_common::metric::telemetry as telemetry_metrics,
};

use crate::sink::{AnalyticsSink, HttpSink, NoopSink};

/// How long `cleanup` waits for the worker's final flush.
const CLEANUP_GRACE: Duration = Duration::from_secs(5);

/// Buffers pipeline events and flushes them to the analytics sink in
/// batches, off the message-handling path.
pub struct TelemetryEmitter {
    tx: mpsc::Sender<PipelineEvent>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    cleaned: AtomicBool,
}

impl TelemetryEmitter {
    /// Spawn the flush worker around an explicit sink.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AnalyticsSink>, policy: TelemetryPolicy) -> Self {
        let capacity = policy.max_buffer_events.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();
        let worker = Worker {
            rx,
            sink,
            policy,
            buffer: VecDeque::new(),
            consecutive_failures: 0,
        };
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        Self {
            tx,
            shutdown,
            worker: Mutex::new(Some(handle)),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Spawn with the sink the policy describes: HTTP when an endpoint is
    /// configured, otherwise a noop sink.
    #[must_use]
    pub fn from_policy(policy: &TelemetryPolicy) -> Self {
        let sink: Arc<dyn AnalyticsSink> = match &policy.endpoint {
            Some(endpoint) if policy.enabled => {
                match HttpSink::new(
                    endpoint.clone(),
                    Duration::from_millis(policy.request_timeout_ms.max(1)),
                ) {
                    Ok(sink) => Arc::new(sink),
                    Err(e) => {
                        warn!(error = %e, "failed to build http sink, telemetry disabled");
                        Arc::new(NoopSink)
                    },
                }
            },
            _ => Arc::new(NoopSink),
        };
        Self::spawn(sink, policy.clone())
    }

    /// Enqueue one event. Synchronous, non-blocking, infallible: a full
    /// buffer drops the event with a warning rather than slowing the caller.
    pub fn record(&self, event: PipelineEvent) {
        if self.cleaned.load(Ordering::Acquire) {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(telemetry_metrics::EVENTS_RECORDED_TOTAL).increment(1);
            },
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("telemetry buffer full, dropping event");
                #[cfg(feature = "metrics")]
                counter!(telemetry_metrics::EVENTS_DROPPED_TOTAL).increment(1);
            },
            // Worker already stopped; nothing left to do with the event.
            Err(mpsc::error::TrySendError::Closed(_)) => {},
        }
    }

    /// Flush remaining events best-effort and stop the worker.
    ///
    /// Idempotent: the second and later calls return immediately without
    /// touching the network.
    pub async fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(CLEANUP_GRACE, handle).await.is_err() {
                warn!("telemetry worker did not stop within the cleanup grace period");
            }
        }
    }
}

impl PipelineEventSink for TelemetryEmitter {
    fn record(&self, event: PipelineEvent) {
        Self::record(self, event);
    }
}

struct Worker {
    rx: mpsc::Receiver<PipelineEvent>,
    sink: Arc<dyn AnalyticsSink>,
    policy: TelemetryPolicy,
    buffer: VecDeque<PipelineEvent>,
    /// Consecutive failed deliveries of the current head batch.
    consecutive_failures: u32,
}

impl Worker {
    async fn run(mut self, shutdown: CancellationToken) {
        let interval = Duration::from_secs(self.policy.flush_interval_secs.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so an empty emitter
        // doesn't flush at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(event) => {
                        self.buffer.push_back(event);
                        self.enforce_bound();
                        if self.buffer.len() >= self.policy.flush_max_events.max(1) {
                            self.flush().await;
                        }
                    },
                    // All senders dropped.
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush().await;
                    }
                },
            }
        }

        // Final best-effort drain and flush.
        while let Ok(event) = self.rx.try_recv() {
            self.buffer.push_back(event);
        }
        self.enforce_bound();
        while !self.buffer.is_empty() {
            if !self.flush().await {
                break;
            }
        }
        debug!("telemetry worker stopped");
    }

    /// Deliver the head batch. Returns whether the sink accepted it.
    ///
    /// On failure the batch is requeued at the front so intra-batch order
    /// survives the retry; after `max_retries` consecutive failures the
    /// batch is dropped — telemetry loss is an accepted degradation.
    async fn flush(&mut self) -> bool {
        let batch_len = self
            .buffer
            .len()
            .min(self.policy.flush_max_events.max(1));
        let batch: Vec<PipelineEvent> = self.buffer.drain(..batch_len).collect();

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        match self.sink.insert_batch(&batch).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                debug!(events = batch.len(), "flushed telemetry batch");
                #[cfg(feature = "metrics")]
                {
                    counter!(telemetry_metrics::BATCHES_FLUSHED_TOTAL).increment(1);
                    histogram!(telemetry_metrics::FLUSH_DURATION_SECONDS)
                        .record(started.elapsed().as_secs_f64());
                }
                true
            },
            Err(e) => {
                self.consecutive_failures += 1;
                #[cfg(feature = "metrics")]
                counter!(telemetry_metrics::FLUSH_FAILURES_TOTAL).increment(1);
                if self.consecutive_failures > self.policy.max_retries {
                    warn!(
                        dropped = batch.len(),
                        attempts = self.consecutive_failures,
                        error = %e,
                        "dropping telemetry batch after retries"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(telemetry_metrics::EVENTS_DROPPED_TOTAL)
                        .increment(batch.len() as u64);
                    self.consecutive_failures = 0;
                } else {
                    debug!(
                        attempt = self.consecutive_failures,
                        error = %e,
                        "telemetry flush failed, batch requeued"
                    );
                    for event in batch.into_iter().rev() {
                        self.buffer.push_front(event);
                    }
                }
                false
            },
        }
    }

    /// Drop oldest events beyond the configured buffer bound.
    fn enforce_bound(&mut self) {
        let bound = self.policy.max_buffer_events.max(1);
        while self.buffer.len() > bound {
            self.buffer.pop_front();
            warn!("telemetry buffer overflow, dropping oldest event");
            #[cfg(feature = "metrics")]
            counter!(telemetry_metrics::EVENTS_DROPPED_TOTAL).increment(1);
        }
    }
}
