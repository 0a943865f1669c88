//! Placement trigger: the glue between the placement path and compaction.
//!
//! After each successful placement the trigger consults the compaction
//! policy and, when warranted, enqueues a high-priority `snapshot.create`
//! job. The check is fire-and-forget: a missed compaction opportunity is
//! not a user-visible failure, so errors are logged and swallowed — the
//! placement response never depends on compaction health.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use crate::clock;
use crate::compactor::Compactor;
use crate::scheduler::{Job, JobExecutor, JobKind, JobScheduler};
use crate::store::{FrameStore, PixelStore, SnapshotStore};

/// Priority for trigger-enqueued `snapshot.create` jobs. High, so reader
/// overlay cost is bounded promptly.
pub const CREATE_SNAPSHOT_PRIORITY: i32 = 10;

/// Priority for `snapshot.cleanup` jobs. Low; retention is housekeeping.
pub const CLEANUP_PRIORITY: i32 = 1;

// ---------------------------------------------------------------------------
// Job bodies
// ---------------------------------------------------------------------------

/// Dispatches scheduler jobs to the compactor.
pub struct CompactionExecutor<S> {
    compactor: Compactor<S>,
    default_keep: usize,
}

impl<S: FrameStore + PixelStore + SnapshotStore> CompactionExecutor<S> {
    #[must_use]
    pub fn new(compactor: Compactor<S>) -> Self {
        let default_keep = compactor.policy().keep_snapshots;
        Self {
            compactor,
            default_keep,
        }
    }
}

impl<S: FrameStore + PixelStore + SnapshotStore> JobExecutor for CompactionExecutor<S> {
    fn execute(&self, job: &Job) -> anyhow::Result<()> {
        match job.kind {
            JobKind::CreateSnapshot => {
                self.compactor
                    .create_snapshot(job.frame_id, clock::now_us())
                    .with_context(|| format!("create snapshot for frame {}", job.frame_id))?;
            }
            JobKind::CleanupSnapshots => {
                let keep = job.keep_count.unwrap_or(self.default_keep);
                self.compactor
                    .cleanup_old_snapshots(job.frame_id, keep)
                    .with_context(|| format!("clean up snapshots for frame {}", job.frame_id))?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Post-placement policy hook.
pub struct PlacementTrigger<S> {
    compactor: Compactor<S>,
    scheduler: Arc<JobScheduler>,
}

impl<S: FrameStore + PixelStore + SnapshotStore> PlacementTrigger<S> {
    #[must_use]
    pub fn new(compactor: Compactor<S>, scheduler: Arc<JobScheduler>) -> Self {
        Self {
            compactor,
            scheduler,
        }
    }

    /// Call after every successful placement. Never fails and never blocks
    /// on compaction: policy errors are logged and swallowed.
    pub fn pixel_placed(&self, frame_id: i64) {
        match self.compactor.should_create_snapshot(frame_id) {
            Ok(true) => {
                let job_id = self.scheduler.add_job(
                    JobKind::CreateSnapshot,
                    frame_id,
                    CREATE_SNAPSHOT_PRIORITY,
                    None,
                );
                debug!(frame_id, job_id, "compaction warranted; snapshot job queued");
            }
            Ok(false) => {}
            Err(err) => {
                warn!(
                    frame_id,
                    code = %err.code(),
                    error = %err,
                    "compaction check failed; placement unaffected"
                );
            }
        }
    }

    /// Enqueue a low-priority cleanup retaining `keep_count` snapshots.
    pub fn request_cleanup(&self, frame_id: i64, keep_count: usize) -> u64 {
        self.scheduler.add_job(
            JobKind::CleanupSnapshots,
            frame_id,
            CLEANUP_PRIORITY,
            Some(keep_count),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::CompactionPolicy;
    use crate::scheduler::SchedulerConfig;
    use crate::store::{MemoryStore, SnapshotStore};
    use std::time::Duration;

    fn setup(
        policy: CompactionPolicy,
    ) -> (Arc<MemoryStore>, Arc<JobScheduler>, PlacementTrigger<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let compactor = Compactor::new(Arc::clone(&store), policy);
        let executor = Arc::new(CompactionExecutor::new(compactor.clone()));
        let scheduler = Arc::new(JobScheduler::new(
            executor,
            SchedulerConfig {
                tick_interval: Duration::from_millis(10),
                max_attempts: 3,
            },
        ));
        let trigger = PlacementTrigger::new(compactor, Arc::clone(&scheduler));
        (store, scheduler, trigger)
    }

    fn small_policy() -> CompactionPolicy {
        CompactionPolicy {
            min_pixels_for_first_snapshot: 3,
            pixels_since_snapshot: 5,
            keep_snapshots: 2,
        }
    }

    #[test]
    fn below_threshold_enqueues_nothing() {
        let (store, scheduler, trigger) = setup(small_policy());
        let frame = store.create_frame("f", 8, 8, 0);

        store.place_pixel(frame.id, 0, 0, 0xFF00_0001, "alice", 1_000).unwrap();
        trigger.pixel_placed(frame.id);

        assert_eq!(scheduler.status().queued, 0);
    }

    #[test]
    fn threshold_reached_runs_snapshot_job() {
        let (store, scheduler, trigger) = setup(small_policy());
        let frame = store.create_frame("f", 8, 8, 0);

        for i in 0..3u16 {
            store
                .place_pixel(frame.id, i, 0, 0xFF00_0001, "alice", i64::from(i + 1) * 1_000)
                .unwrap();
            trigger.pixel_placed(frame.id);
        }
        scheduler.drain();

        let latest = store
            .latest_snapshot(frame.id)
            .unwrap()
            .expect("snapshot should exist");
        assert_eq!(latest.live_pixels, 3);
    }

    #[test]
    fn missing_frame_is_swallowed() {
        let (_store, scheduler, trigger) = setup(small_policy());

        // The frame does not exist; the check fails internally, the trigger
        // must neither panic nor enqueue.
        trigger.pixel_placed(999);
        assert_eq!(scheduler.status().queued, 0);
    }

    #[test]
    fn cleanup_job_honors_keep_count() {
        let (store, scheduler, trigger) = setup(small_policy());
        let frame = store.create_frame("f", 8, 8, 0);

        let compactor = Compactor::new(Arc::clone(&store), small_policy());
        for ts in [1_000, 2_000, 3_000, 4_000] {
            compactor.create_snapshot(frame.id, ts).unwrap();
        }

        trigger.request_cleanup(frame.id, 2);
        scheduler.drain();

        let remaining = store.list_snapshots(frame.id).unwrap();
        let times: Vec<i64> = remaining.iter().map(|s| s.created_at_us).collect();
        assert_eq!(times, vec![4_000, 3_000]);
    }
}
