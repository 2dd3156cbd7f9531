//! Contention scenarios.
//!
//! Each scenario builds its own [`Mutex`], drives it from forked fibers and
//! checks the lock afterwards: no two workers may ever have been inside at
//! once, and the lock must end unlocked with nobody queued.

use std::fmt;
use std::time::Duration;

use fibrous::effect::AsyncIO;
use fibrous::fiber::{self, Fiber, FiberError, Interrupted};
use fibrous::sync::{Mutex, MutexSnapshot};
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{ContentionConfig, ScenarioKind};
use crate::timeline::{EventKind, Timeline};

/// Stress workers hold the lock for this fraction of the configured hold.
const STRESS_HOLD_DIVISOR: u32 = 20;

/// How long a hand-off round waits for its waiter to queue up.
const QUEUE_DEADLINE: Duration = Duration::from_secs(5);

// =============================================================================
// Errors and Reports
// =============================================================================

/// A scenario observed something the mutex must never do.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// More than one worker was inside the critical section.
    #[error("{max_inside} workers were inside the critical section at once")]
    Overlap {
        /// Highest observed occupancy.
        max_inside: usize,
    },

    /// The mutex did not end unlocked with an empty queue.
    #[error("{scenario} left the mutex in state {snapshot:?}")]
    Leaked {
        /// Scenario name.
        scenario: &'static str,
        /// State found afterwards.
        snapshot: MutexSnapshot,
    },

    /// A worker entered the critical section without leaving it.
    #[error("{entered} entries but {left} exits from the critical section")]
    Unbalanced {
        /// Recorded entries.
        entered: usize,
        /// Recorded exits.
        left: usize,
    },

    /// A worker nobody interrupted exited as interrupted.
    #[error("worker {worker} was interrupted without a request")]
    UnexpectedInterruption {
        /// Worker index.
        worker: usize,
    },

    /// A hand-off waiter did not reach the queue in time.
    #[error("waiter never queued in round {round}")]
    NeverQueued {
        /// Round index.
        round: usize,
    },

    /// The fresh acquire at the end of the hand-off race could not get the lock.
    #[error("lock was not free after the hand-off race")]
    Stuck,

    /// A worker fiber failed.
    #[error(transparent)]
    Fiber(#[from] FiberError),

    /// The driving task was interrupted.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: &'static str,
    /// Wall time of the whole scenario.
    pub elapsed: Duration,
    /// Workers (or rounds) that ran to completion.
    pub completed: usize,
    /// Workers (or rounds) that ended interrupted.
    pub interrupted: usize,
    /// Highest number of workers seen inside the critical section.
    pub max_inside: usize,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}: {} completed, {} interrupted, max inside {}, took {:?}",
            self.scenario, self.completed, self.interrupted, self.max_inside, self.elapsed
        )
    }
}

// =============================================================================
// Entry Point
// =============================================================================

/// Runs the scenario(s) selected by `config`, in order.
///
/// # Errors
///
/// Returns the first [`ScenarioError`] any scenario reports.
pub async fn run(config: &ContentionConfig) -> Result<Vec<ScenarioReport>, ScenarioError> {
    let all = config.scenario == ScenarioKind::All;
    let mut reports = Vec::new();

    if all || config.scenario == ScenarioKind::Serialized {
        reports.push(serialized(config).await?);
    }
    if all || config.scenario == ScenarioKind::Interruption {
        reports.push(interruption(config).await?);
    }
    if all || config.scenario == ScenarioKind::HandoffRace {
        reports.push(handoff_race(config).await?);
    }
    Ok(reports)
}

// =============================================================================
// Scenarios
// =============================================================================

/// `workers` fibers each hold the lock once for the configured time.
///
/// # Errors
///
/// Fails on overlap, a leaked lock or a failed worker.
pub async fn serialized(config: &ContentionConfig) -> Result<ScenarioReport, ScenarioError> {
    let span = tracing::info_span!("scenario", name = "serialized");
    async {
        let mutex = Mutex::make().await;
        let timeline = Timeline::new();
        let started = Instant::now();

        let mut fibers = Vec::with_capacity(config.workers);
        for worker in 0..config.workers {
            fibers.push(Fiber::fork(hold_once(&mutex, &timeline, worker, config.hold())).await);
        }
        for fiber in fibers {
            fiber.join().await?;
        }

        let report = ScenarioReport {
            scenario: "serialized",
            elapsed: started.elapsed(),
            completed: config.workers,
            interrupted: 0,
            max_inside: timeline.max_inside(),
        };
        verify(&report, &mutex, &timeline).await?;
        tracing::info!(%report, "scenario finished");
        Ok(report)
    }
    .instrument(span)
    .await
}

/// Stress workers loop over the lock while every `interrupt_every`-th one
/// is interrupted after a staggered delay.
///
/// # Errors
///
/// Fails on overlap, a leaked lock, an unrequested interruption or a
/// panicked worker.
pub async fn interruption(config: &ContentionConfig) -> Result<ScenarioReport, ScenarioError> {
    let span = tracing::info_span!("scenario", name = "interruption");
    async {
        let mutex = Mutex::make().await;
        let timeline = Timeline::new();
        let hold = config.hold() / STRESS_HOLD_DIVISOR;
        let started = Instant::now();

        let mut fibers = Vec::with_capacity(config.stress_workers);
        for worker in 0..config.stress_workers {
            let body = looping_worker(
                mutex.clone(),
                timeline.clone(),
                worker,
                config.stress_rounds,
                hold,
            );
            fibers.push(Fiber::fork(body).await);
        }

        for (worker, fiber) in fibers.iter().enumerate() {
            if is_target(worker, config.interrupt_every) {
                tokio::time::sleep(hold * 2).await;
                tracing::debug!(worker, fiber = %fiber.id(), "requesting interrupt");
                fiber.request_interrupt();
            }
        }

        let mut completed = 0;
        let mut interrupted = 0;
        for (worker, fiber) in fibers.into_iter().enumerate() {
            match fiber.join().await {
                Ok(_) => completed += 1,
                Err(FiberError::Interrupted(_)) if is_target(worker, config.interrupt_every) => {
                    interrupted += 1;
                }
                Err(FiberError::Interrupted(_)) => {
                    return Err(ScenarioError::UnexpectedInterruption { worker });
                }
                Err(error) => return Err(error.into()),
            }
        }

        let report = ScenarioReport {
            scenario: "interruption",
            elapsed: started.elapsed(),
            completed,
            interrupted,
            max_inside: timeline.max_inside(),
        };
        verify(&report, &mutex, &timeline).await?;
        tracing::info!(%report, "scenario finished");
        Ok(report)
    }
    .instrument(span)
    .await
}

/// Each round the driver holds the lock, lets one waiter queue behind it,
/// then releases and interrupts that waiter back to back.
///
/// Whichever side wins, the lock must be free after the waiter exits, and a
/// fresh acquire at the end must succeed immediately.
///
/// # Errors
///
/// Fails on a leaked lock, a waiter that never queues or a stuck lock.
pub async fn handoff_race(config: &ContentionConfig) -> Result<ScenarioReport, ScenarioError> {
    let span = tracing::info_span!("scenario", name = "handoff-race");
    async {
        let mutex = Mutex::make().await;
        let timeline = Timeline::new();
        let started = Instant::now();
        let mut completed = 0;
        let mut interrupted = 0;

        for round in 0..config.stress_rounds {
            mutex.acquire().await?;
            let waiter = Fiber::fork(hold_once(&mutex, &timeline, round, Duration::ZERO)).await;
            wait_until_queued(&mutex, round).await?;

            mutex.release().await;
            waiter.request_interrupt();

            match waiter.join().await {
                Ok(()) => completed += 1,
                Err(FiberError::Interrupted(_)) => interrupted += 1,
                Err(error) => return Err(error.into()),
            }
            let snapshot = mutex.snapshot().await;
            if snapshot != MutexSnapshot::default() {
                return Err(ScenarioError::Leaked {
                    scenario: "handoff-race",
                    snapshot,
                });
            }
            tracing::debug!(round, completed, interrupted, "round settled");
        }

        if !mutex.try_acquire().await {
            return Err(ScenarioError::Stuck);
        }
        mutex.release().await;

        let report = ScenarioReport {
            scenario: "handoff-race",
            elapsed: started.elapsed(),
            completed,
            interrupted,
            max_inside: timeline.max_inside(),
        };
        verify(&report, &mutex, &timeline).await?;
        tracing::info!(%report, "scenario finished");
        Ok(report)
    }
    .instrument(span)
    .await
}

// =============================================================================
// Workers
// =============================================================================

fn hold_once(
    mutex: &Mutex,
    timeline: &Timeline,
    worker: usize,
    hold: Duration,
) -> AsyncIO<Result<(), Interrupted>> {
    let timeline = timeline.clone();
    mutex.with_lock(AsyncIO::new(move || async move {
        timeline.enter(worker);
        let slept = fiber::sleep(hold).await;
        timeline.leave(worker);
        slept
    }))
}

fn looping_worker(
    mutex: Mutex,
    timeline: Timeline,
    worker: usize,
    rounds: usize,
    hold: Duration,
) -> AsyncIO<Result<usize, Interrupted>> {
    AsyncIO::new(move || async move {
        for _ in 0..rounds {
            if let Err(interrupted) = hold_once(&mutex, &timeline, worker, hold).await {
                timeline.interrupted(worker);
                return Err(interrupted);
            }
        }
        Ok(rounds)
    })
}

const fn is_target(worker: usize, every: usize) -> bool {
    (worker + 1) % every == 0
}

async fn wait_until_queued(mutex: &Mutex, round: usize) -> Result<(), ScenarioError> {
    let mutex = mutex.clone();
    let queued = AsyncIO::new(move || async move {
        while mutex.snapshot().await.waiting == 0 {
            tokio::task::yield_now().await;
        }
    });
    queued
        .timeout(QUEUE_DEADLINE)
        .await
        .ok_or(ScenarioError::NeverQueued { round })
}

async fn verify(
    report: &ScenarioReport,
    mutex: &Mutex,
    timeline: &Timeline,
) -> Result<(), ScenarioError> {
    if report.max_inside > 1 {
        return Err(ScenarioError::Overlap {
            max_inside: report.max_inside,
        });
    }
    let entered = timeline.count(EventKind::Entered);
    let left = timeline.count(EventKind::Left);
    if entered != left {
        return Err(ScenarioError::Unbalanced { entered, left });
    }
    let snapshot = mutex.snapshot().await;
    if snapshot != MutexSnapshot::default() {
        return Err(ScenarioError::Leaked {
            scenario: report.scenario,
            snapshot,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 3, false)]
    #[case(2, 3, true)]
    #[case(5, 3, true)]
    #[case(0, 1, true)]
    fn selects_every_nth_worker(#[case] worker: usize, #[case] every: usize, #[case] expected: bool) {
        assert_eq!(is_target(worker, every), expected);
    }

    #[rstest]
    fn report_display() {
        let report = ScenarioReport {
            scenario: "serialized",
            elapsed: Duration::from_millis(1000),
            completed: 10,
            interrupted: 0,
            max_inside: 1,
        };
        assert_eq!(
            report.to_string(),
            "serialized: 10 completed, 0 interrupted, max inside 1, took 1s"
        );
    }
}
