//! # Search Host
//!
//! Drives a `SearchEngine` from a tokio task so searches never block the
//! caller. The engine does a bounded slice of work per tick and yields
//! between ticks.
//!
//! ## Algorithm
//! The host task loops over two event sources with `tokio::select!`,
//! requests first:
//! 1. **Requests** (mpsc): a search creates a new engine job. The previous
//!    caller's reply sender is dropped, so their `PendingSearch` resolves to
//!    `HostError::Cancelled`. A search the engine rejects is answered with
//!    the error and does not disturb the running one. Estimates are answered
//!    immediately.
//! 2. **Ticks** (interval): while a search is pending, each tick calls
//!    `engine.step(iterations)` and publishes progress on a watch channel.
//!    When the step reports completion the outcome is sent on the oneshot.
//!
//! Closing the request channel (`shutdown`) ends the loop and hands the
//! engine back, with its caches intact.

use std::time::Duration;

use pipeline::{Candidate, JobId, JobState, JobStats, RankedItem, SearchEngine, SelectivityReport};
use predicates::SearchConfig;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::error::{HostError, Result};

/// How the host paces the engine.
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    /// Time between engine steps
    pub tick: Duration,
    /// Work budget handed to each `engine.step`
    pub iterations: usize,
    /// Request queue depth
    pub queue: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(16),
            iterations: 256,
            queue: 16,
        }
    }
}

/// Snapshot of the in-flight search, published after every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub job: Option<JobId>,
    pub state: Option<JobState>,
    pub fraction: f32,
}

impl Progress {
    fn idle() -> Self {
        Self {
            job: None,
            state: None,
            fraction: 1.0,
        }
    }

    fn of(engine: &SearchEngine) -> Self {
        Self {
            job: engine.current_job_id(),
            state: engine.state(),
            fraction: engine.progress(),
        }
    }
}

/// Everything a finished search produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub job: JobId,
    pub results: Vec<RankedItem>,
    pub near_misses: Vec<Candidate>,
    pub stats: JobStats,
}

impl SearchOutcome {
    fn collect(engine: &SearchEngine, job: JobId) -> Self {
        Self {
            job,
            results: engine.results().map(<[RankedItem]>::to_vec).unwrap_or_default(),
            near_misses: engine.near_misses().to_vec(),
            stats: engine.stats().cloned().unwrap_or_default(),
        }
    }
}

enum Request {
    Search {
        config: SearchConfig,
        reply: oneshot::Sender<Result<SearchOutcome>>,
    },
    Estimate {
        config: SearchConfig,
        reply: oneshot::Sender<Result<SelectivityReport>>,
    },
}

/// A submitted search. Await `wait` for its outcome.
#[derive(Debug)]
pub struct PendingSearch {
    receiver: oneshot::Receiver<Result<SearchOutcome>>,
}

impl PendingSearch {
    /// Wait for the search to finish.
    ///
    /// # Returns
    /// * `Ok(SearchOutcome)` - The search completed, possibly with no results
    /// * `Err(HostError::Engine)` - The configuration was rejected
    /// * `Err(HostError::Cancelled)` - A newer search replaced this one
    pub async fn wait(self) -> Result<SearchOutcome> {
        self.receiver.await.map_err(|_| HostError::Cancelled)?
    }
}

/// Handle to a running host task.
pub struct SearchHost {
    requests: mpsc::Sender<Request>,
    progress: watch::Receiver<Progress>,
    task: JoinHandle<SearchEngine>,
}

impl SearchHost {
    /// Move the engine into a new host task. Must be called from within a
    /// tokio runtime.
    pub fn spawn(engine: SearchEngine, config: HostConfig) -> Self {
        let (requests, receiver) = mpsc::channel(config.queue.max(1));
        let (progress_tx, progress) = watch::channel(Progress::idle());
        let task = tokio::spawn(run(engine, receiver, progress_tx, config));
        info!(tick = ?config.tick, iterations = config.iterations, "Search host started");
        Self {
            requests,
            progress,
            task,
        }
    }

    /// Submit a search, superseding whichever one is in flight.
    pub async fn search(&self, config: SearchConfig) -> Result<PendingSearch> {
        let (reply, receiver) = oneshot::channel();
        self.requests
            .send(Request::Search { config, reply })
            .await
            .map_err(|_| HostError::Stopped)?;
        Ok(PendingSearch { receiver })
    }

    /// Selectivity estimate for a snapshot. Does not disturb the running job.
    pub async fn estimate(&self, config: SearchConfig) -> Result<SelectivityReport> {
        let (reply, receiver) = oneshot::channel();
        self.requests
            .send(Request::Estimate { config, reply })
            .await
            .map_err(|_| HostError::Stopped)?;
        receiver.await.map_err(|_| HostError::Stopped)?
    }

    /// Watch the in-flight search's progress.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Stop the host and take the engine back.
    pub async fn shutdown(self) -> Result<SearchEngine> {
        drop(self.requests);
        self.task.await.map_err(|_| HostError::Stopped)
    }
}

struct Pending {
    job: JobId,
    reply: oneshot::Sender<Result<SearchOutcome>>,
}

async fn run(
    mut engine: SearchEngine,
    mut requests: mpsc::Receiver<Request>,
    progress: watch::Sender<Progress>,
    config: HostConfig,
) -> SearchEngine {
    let mut ticker = interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Option<Pending> = None;

    loop {
        tokio::select! {
            biased;

            request = requests.recv() => match request {
                Some(Request::Search { config, reply }) => match engine.create_job(config) {
                    Ok(job) => {
                        if let Some(previous) = pending.replace(Pending { job, reply }) {
                            debug!(job = previous.job, "Dropping reply of superseded search");
                        }
                        progress.send_replace(Progress::of(&engine));
                    }
                    Err(err) => {
                        // A rejected search leaves the in-flight one running
                        debug!(error = %err, "Search rejected");
                        let _ = reply.send(Err(err.into()));
                    }
                },
                Some(Request::Estimate { config, reply }) => {
                    let _ = reply.send(engine.estimate(&config).map_err(HostError::from));
                }
                None => break,
            },
            _ = ticker.tick(), if pending.is_some() => {
                tick(&mut engine, &mut pending, &progress, config.iterations);
            }
        }
    }

    info!("Search host stopped");
    engine
}

#[instrument(skip_all, fields(job = pending.as_ref().map(|p| p.job)))]
fn tick(
    engine: &mut SearchEngine,
    pending: &mut Option<Pending>,
    progress: &watch::Sender<Progress>,
    iterations: usize,
) {
    let done = engine.step(iterations);
    progress.send_replace(Progress::of(engine));
    if !done {
        return;
    }
    if let Some(finished) = pending.take() {
        let outcome = SearchOutcome::collect(engine, finished.job);
        debug!(job = finished.job, results = outcome.results.len(), "Search finished");
        let _ = finished.reply.send(Ok(outcome));
    }
}
