//! In-process priority job scheduler.
//!
//! Defers compaction and cleanup off the placement-handling path. The queue
//! is non-durable by design: jobs lost on restart are acceptable because the
//! next placement re-evaluates whether compaction is still needed.
//!
//! # State machine per job
//!
//! ```text
//! queued -> running -> done (removed)
//!                   -> failed (attempts += 1) -> queued   while attempts < max
//!                                             -> dead     (removed, logged)
//! ```
//!
//! # Scheduling model
//!
//! A single worker thread processes **one job per tick** (default 1s):
//! highest priority first, ties broken by earliest creation time, then by
//! insertion id. Priority is re-evaluated every tick, so a long job delays
//! others by at most its own duration. When the queue empties the worker
//! exits instead of polling forever; the next [`JobScheduler::add_job`]
//! respawns it. The scheduler is an owned component with controlled
//! start/stop, not ambient global state.
//!
//! Terminal failures are logged, never thrown — no caller waits on a job.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock;
use crate::error::ErrorCode;

/// Default pause between processed jobs.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default attempt budget per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Job kinds
// ---------------------------------------------------------------------------

/// The two kinds of deferred work.
///
/// String representation uses the dotted `snapshot.<verb>` format that
/// appears in logs and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Compact a frame's placement log into a new snapshot.
    CreateSnapshot,
    /// Delete a frame's old snapshots beyond the retain count.
    CleanupSnapshots,
}

impl JobKind {
    /// All known job kinds.
    pub const ALL: [Self; 2] = [Self::CreateSnapshot, Self::CleanupSnapshots];

    /// Return the canonical `snapshot.<verb>` string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateSnapshot => "snapshot.create",
            Self::CleanupSnapshots => "snapshot.cleanup",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized job kind string.
///
/// The in-process job set is a closed enum, so this is only reachable from
/// external input (CLI arguments, config) — kept as a defensive guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownJobKind {
    /// The unrecognized input string.
    pub raw: String,
}

impl UnknownJobKind {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::UnknownJobKind
    }
}

impl std::fmt::Display for UnknownJobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown job kind '{}': expected snapshot.create or snapshot.cleanup",
            self.raw
        )
    }
}

impl std::error::Error for UnknownJobKind {}

impl std::str::FromStr for JobKind {
    type Err = UnknownJobKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot.create" => Ok(Self::CreateSnapshot),
            "snapshot.cleanup" => Ok(Self::CleanupSnapshots),
            _ => Err(UnknownJobKind { raw: s.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A deferred unit of work. Lives entirely in-process.
#[derive(Debug, Clone)]
pub struct Job {
    /// Monotonic in-process identifier; doubles as the final ordering
    /// tie-break (insertion order).
    pub id: u64,
    pub kind: JobKind,
    pub frame_id: i64,
    /// Higher runs sooner.
    pub priority: i32,
    pub created_at_us: i64,
    /// Completed executions so far (successful or not).
    pub attempts: u32,
    pub max_attempts: u32,
    /// Retain count for `snapshot.cleanup`; `None` uses the executor's
    /// default.
    pub keep_count: Option<usize>,
}

/// Executes job bodies. The scheduler catches every error and applies the
/// bounded-retry state machine; implementations perform no retries of their
/// own.
pub trait JobExecutor: Send + Sync {
    /// Run one job to completion.
    ///
    /// # Errors
    ///
    /// Any error marks the attempt failed; the scheduler requeues the job
    /// until its attempt budget is exhausted.
    fn execute(&self, job: &Job) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Observability snapshot of the queue. Counts only; never used to drive
/// scheduling decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub create_snapshot: usize,
    pub cleanup_snapshots: usize,
    pub worker_active: bool,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Scheduler tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause between processed jobs.
    pub tick_interval: Duration,
    /// Attempt budget assigned to every new job.
    pub max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// The in-process priority queue plus its worker thread.
pub struct JobScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    executor: Arc<dyn JobExecutor>,
    tick_interval: Duration,
    max_attempts: u32,
    state: Mutex<QueueState>,
    wake: Condvar,
}

#[derive(Default)]
struct QueueState {
    queue: Vec<Job>,
    next_job_id: u64,
    worker_active: bool,
    in_flight: bool,
    shutdown: bool,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("scheduler state mutex poisoned")
    }
}

impl JobScheduler {
    #[must_use]
    pub fn new(executor: Arc<dyn JobExecutor>, config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                tick_interval: config.tick_interval,
                max_attempts: config.max_attempts,
                state: Mutex::new(QueueState::default()),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Enqueue a job and return its id. Spawns the worker thread if it is
    /// not running.
    pub fn add_job(
        &self,
        kind: JobKind,
        frame_id: i64,
        priority: i32,
        keep_count: Option<usize>,
    ) -> u64 {
        let mut state = self.shared.lock_state();
        state.next_job_id += 1;
        let id = state.next_job_id;
        state.queue.push(Job {
            id,
            kind,
            frame_id,
            priority,
            created_at_us: clock::now_us(),
            attempts: 0,
            max_attempts: self.shared.max_attempts,
            keep_count,
        });
        debug!(job_id = id, kind = %kind, frame_id, priority, "job queued");

        let needs_worker = !state.worker_active && !state.shutdown;
        if needs_worker {
            state.worker_active = true;
        }
        drop(state);

        if needs_worker {
            self.spawn_worker();
        }
        id
    }

    /// Current queue counts and worker liveness.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.lock_state();
        let create_snapshot = state
            .queue
            .iter()
            .filter(|job| job.kind == JobKind::CreateSnapshot)
            .count();
        QueueStatus {
            queued: state.queue.len(),
            create_snapshot,
            cleanup_snapshots: state.queue.len() - create_snapshot,
            worker_active: state.worker_active,
        }
    }

    /// Block until the queue is empty and no job is running.
    ///
    /// Returns immediately if the worker is not active (nothing will make
    /// progress). Used by the CLI before exit and by tests.
    pub fn drain(&self) {
        let state = self.shared.lock_state();
        let _state = self
            .shared
            .wake
            .wait_while(state, |s| {
                s.worker_active && (!s.queue.is_empty() || s.in_flight)
            })
            .expect("scheduler state mutex poisoned");
    }

    /// Signal shutdown and join the worker. Queued jobs are dropped; they
    /// are re-derivable from current log state.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock_state();
            state.shutdown = true;
        }
        self.shared.wake.notify_all();

        let handle = self
            .worker
            .lock()
            .expect("scheduler worker mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn spawn_worker(&self) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("mosaic-scheduler".to_string())
            .spawn(move || worker_loop(&shared));

        match spawned {
            Ok(handle) => {
                let mut slot = self
                    .worker
                    .lock()
                    .expect("scheduler worker mutex poisoned");
                // A previous handle here means the worker idled out; reap it.
                if let Some(old) = slot.replace(handle) {
                    let _ = old.join();
                }
            }
            Err(err) => {
                error!(error = %err, "failed to spawn scheduler worker");
                self.shared.lock_state().worker_active = false;
            }
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Index of the job to run next: highest priority, then earliest creation,
/// then lowest insertion id.
fn pick_next(queue: &[Job]) -> Option<usize> {
    queue
        .iter()
        .enumerate()
        .min_by_key(|(_, job)| (std::cmp::Reverse(job.priority), job.created_at_us, job.id))
        .map(|(index, _)| index)
}

fn worker_loop(shared: &Shared) {
    debug!("scheduler worker started");
    let mut state = shared.lock_state();
    loop {
        // One tick between jobs; shutdown wakes the wait early.
        let (next, _timeout) = shared
            .wake
            .wait_timeout_while(state, shared.tick_interval, |s| !s.shutdown)
            .expect("scheduler state mutex poisoned");
        state = next;

        if state.shutdown {
            break;
        }

        let Some(index) = pick_next(&state.queue) else {
            // Idle shutdown: stop polling; the next add_job respawns us.
            break;
        };
        let mut job = state.queue.swap_remove(index);
        state.in_flight = true;
        drop(state);

        let outcome = shared.executor.execute(&job);

        state = shared.lock_state();
        state.in_flight = false;
        match outcome {
            Ok(()) => {
                info!(
                    job_id = job.id,
                    kind = %job.kind,
                    frame_id = job.frame_id,
                    attempt = job.attempts + 1,
                    "job finished"
                );
            }
            Err(err) => {
                job.attempts += 1;
                if job.attempts < job.max_attempts {
                    warn!(
                        job_id = job.id,
                        kind = %job.kind,
                        frame_id = job.frame_id,
                        attempt = job.attempts,
                        max_attempts = job.max_attempts,
                        error = %err,
                        "job failed; will retry"
                    );
                    state.queue.push(job);
                } else {
                    error!(
                        job_id = job.id,
                        kind = %job.kind,
                        frame_id = job.frame_id,
                        attempts = job.attempts,
                        code = %ErrorCode::RetriesExhausted,
                        error = %err,
                        "job dead after exhausting attempts"
                    );
                }
            }
        }
        shared.wake.notify_all();
    }
    state.worker_active = false;
    shared.wake.notify_all();
    debug!("scheduler worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
