//! # Run Scheduler
//!
//! Repeats discovery runs on a fixed interval. The scheduler only decides
//! what happens between cycles; each cycle is an opaque closure, normally a
//! [`crate::pipeline::Pipeline`] run.
//!
//! ## Error policy
//!
//! - Errors for which [`DiscoverError::skips_cycle`](crate::DiscoverError::skips_cycle) holds (too few liked
//!   tracks, nothing accepted, degenerate training data) are logged at `warn`
//!   and the loop waits for the next cycle.
//! - Fatal errors ([`DiscoverError::is_fatal`](crate::DiscoverError::is_fatal), e.g. an expired token) stop
//!   the loop and are returned.
//! - Rate limits and network failures that outlived the client's retries
//!   are logged at `warn`, anything else at `error`, and the loop carries on.
//!   The store is insert-only, so a failed cycle never leaves it inconsistent.

use crate::error::Result;
use crate::pipeline::RunReport;
use log::{error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Tally of a finished loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Failed cycles whose error may clear up by the next cycle.
    pub retryable: usize,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    max_cycles: Option<usize>,
    pid_file: Option<PathBuf>,
}

impl Scheduler {
    /// Runs forever, `interval` apart.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
            pid_file: None,
        }
    }

    /// Stop after `cycles` runs.
    #[must_use]
    pub fn max_cycles(mut self, cycles: Option<usize>) -> Self {
        self.max_cycles = cycles;
        self
    }

    /// Write the process id here while the loop runs.
    #[must_use]
    pub fn pid_file(mut self, path: PathBuf) -> Self {
        self.pid_file = Some(path);
        self
    }

    /// Runs `cycle` repeatedly, sleeping with `std::thread::sleep` in between.
    pub fn run<F>(&self, cycle: F) -> Result<LoopSummary>
    where
        F: FnMut(usize) -> Result<RunReport>,
    {
        self.run_with_sleep(cycle, std::thread::sleep)
    }

    /// Like [`Scheduler::run`] with a caller-supplied sleep.
    ///
    /// # Errors
    ///
    /// The first fatal cycle error, or failure to write the PID file.
    pub fn run_with_sleep<F, S>(&self, mut cycle: F, mut sleep: S) -> Result<LoopSummary>
    where
        F: FnMut(usize) -> Result<RunReport>,
        S: FnMut(Duration),
    {
        if let Some(path) = &self.pid_file {
            fs::write(path, std::process::id().to_string())?;
        }
        info!(
            "Starting discovery loop, one run every {} minutes",
            self.interval.as_secs() / 60
        );

        let mut summary = LoopSummary::default();
        let outcome = loop {
            summary.cycles += 1;
            let n = summary.cycles;

            match cycle(n) {
                Ok(report) => {
                    summary.completed += 1;
                    match &report.playlist {
                        Some(playlist) => info!("Cycle {n}: published {} ({} tracks)", playlist.title, report.track_ids.len()),
                        None => info!("Cycle {n}: selected {} tracks, nothing published", report.track_ids.len()),
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Cycle {n} failed fatally, stopping: {e}");
                    break Err(e);
                }
                Err(e) if e.skips_cycle() => {
                    summary.skipped += 1;
                    warn!("Cycle {n} skipped: {e}");
                }
                Err(e) if e.is_retryable() => {
                    summary.failed += 1;
                    summary.retryable += 1;
                    warn!("Cycle {n} failed, will try again next cycle: {e}");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Cycle {n} failed: {e}");
                }
            }

            if self.max_cycles.is_some_and(|max| n >= max) {
                break Ok(());
            }
            sleep(self.interval);
        };

        if let Some(path) = &self.pid_file {
            let _ = fs::remove_file(path);
        }

        outcome.map(|()| {
            info!(
                "Discovery loop finished: {} cycles, {} completed, {} skipped, {} failed",
                summary.cycles, summary.completed, summary.skipped, summary.failed
            );
            summary
        })
    }
}
