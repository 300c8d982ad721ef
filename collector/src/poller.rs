//! The polling worker pool.
//!
//! A fixed pool of workers consumes one bounded job channel. Each poll tick
//! enqueues one job per endpoint × telemetry kind; a full channel blocks the
//! tick, which is the system's primary backpressure against slow brokers or
//! slow BMCs. Closing the channel drains the workers.

use chrono::Utc;
use riverwatch_client::HttpClientPair;
use riverwatch_core::{CollectorError, Endpoint, Inventory, TelemetryKind, parser};
use riverwatch_kafka::Publisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// One fetch to perform: an endpoint × telemetry kind pair.
#[derive(Debug, Clone)]
pub struct PollJob {
    /// Snapshot of the endpoint at enqueue time.
    pub endpoint: Endpoint,
    /// Which telemetry surface to fetch.
    pub kind: TelemetryKind,
}

/// Spawn the worker pool over the receiving end of the job channel.
///
/// Workers exit when the channel closes and every queued job has been
/// processed; the returned [`JoinSet`] joins them at shutdown. Concurrent
/// outbound fetches never exceed the pool size.
pub fn spawn_workers(
    worker_count: usize,
    jobs: mpsc::Receiver<PollJob>,
    http: Arc<HttpClientPair>,
    publisher: Arc<Publisher>,
    inventory: Arc<Inventory>,
) -> JoinSet<()> {
    let jobs = Arc::new(Mutex::new(jobs));
    let mut workers = JoinSet::new();

    for worker in 0..worker_count {
        let jobs = Arc::clone(&jobs);
        let http = Arc::clone(&http);
        let publisher = Arc::clone(&publisher);
        let inventory = Arc::clone(&inventory);

        workers.spawn(async move {
            loop {
                // Hold the receiver lock only while pulling one job; the
                // fetch itself runs with the lock released.
                let job = { jobs.lock().await.recv().await };
                let Some(job) = job else {
                    tracing::debug!(worker, "job channel closed, worker draining out");
                    return;
                };
                process_job(&job, &http, &publisher, &inventory).await;
            }
        });
    }

    workers
}

/// Execute one poll job end to end: fetch, parse, publish.
///
/// Failures never cross the job boundary. Transport and parse problems are
/// logged and the job abandoned for this tick; a 401 marks the endpoint's
/// credentials stale for the inventory loop to refresh.
pub async fn process_job(
    job: &PollJob,
    http: &HttpClientPair,
    publisher: &Publisher,
    inventory: &Inventory,
) {
    let url = job.endpoint.telemetry_url(job.kind);

    let response = match http.get(&url, Some(&job.endpoint.credentials)).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            tracing::warn!(
                endpoint = %job.endpoint.id,
                kind = %job.kind,
                status = response.status,
                "unexpected status from BMC, abandoning job"
            );
            metrics::counter!("riverwatch_poll_failures_total", "reason" => "status").increment(1);
            return;
        }
        Err(err) if err.is_auth() => {
            tracing::warn!(
                endpoint = %job.endpoint.id,
                kind = %job.kind,
                error = %err,
                "credentials rejected, marking stale for refresh"
            );
            inventory.mark_credentials_stale(&job.endpoint.id);
            metrics::counter!("riverwatch_poll_failures_total", "reason" => "auth").increment(1);
            return;
        }
        Err(err) => {
            tracing::warn!(
                endpoint = %job.endpoint.id,
                kind = %job.kind,
                error = %err,
                "fetch failed, abandoning job for this tick"
            );
            metrics::counter!("riverwatch_poll_failures_total", "reason" => "transport")
                .increment(1);
            return;
        }
    };

    let now = Utc::now();
    inventory.touch(&job.endpoint.id, now);

    let events = match parser::parse_and_tag(
        &response.body,
        job.endpoint.vendor,
        job.kind,
        &job.endpoint.id,
        now,
    ) {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(
                endpoint = %job.endpoint.id,
                kind = %job.kind,
                error = %err,
                "payload did not parse, abandoning job"
            );
            metrics::counter!("riverwatch_poll_failures_total", "reason" => "parse").increment(1);
            return;
        }
    };

    for event in &events {
        match publisher.publish(event) {
            Ok(()) => {}
            Err(CollectorError::Backpressure { topic }) => {
                tracing::warn!(
                    endpoint = %job.endpoint.id,
                    topic,
                    "publisher backpressure, dropping event"
                );
                metrics::counter!("riverwatch_events_dropped_total", "reason" => "backpressure")
                    .increment(1);
            }
            // The publisher stopped accepting work; the drain is underway.
            Err(CollectorError::Shutdown) => return,
            Err(err) => {
                tracing::warn!(endpoint = %job.endpoint.id, error = %err, "publish failed");
            }
        }
    }
}

/// Run the poll tick loop until shutdown.
///
/// Owns the sending end of the job channel; returning drops it, which closes
/// the channel and lets the workers drain.
pub async fn run_poll_loop(
    inventory: Arc<Inventory>,
    jobs: mpsc::Sender<PollJob>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("poll loop exiting");
                return;
            }
            _ = ticker.tick() => {
                for endpoint in inventory.snapshot() {
                    // Temporarily skipped until the inventory loop refreshes
                    // its credentials.
                    if endpoint.credentials_stale {
                        continue;
                    }
                    for kind in TelemetryKind::ALL {
                        let job = PollJob {
                            endpoint: endpoint.clone(),
                            kind,
                        };
                        tokio::select! {
                            _ = shutdown.changed() => {
                                tracing::debug!("poll loop exiting mid-tick");
                                return;
                            }
                            sent = jobs.send(job) => {
                                if sent.is_err() {
                                    tracing::debug!("job channel closed, poll loop exiting");
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
