//! Scheduler engine implementation.
//!
//! Every enabled job owns one timer. When it fires, the scheduler re-arms
//! the job's next timer first and only then invokes the runner, so a slow
//! or failing runner never stalls the schedule. There is no central loop:
//! jobs fire independently on the tokio runtime.

use chrono::{DateTime, Utc};
use rand::RngCore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use super::registry::{JobRegistry, JobSchedulingInfo, SchedulingSnapshot};
use super::timer::TimerHandle;
use super::types::SchedulerError;
use crate::core::clock::{Clock, SystemClock};
use crate::core::context::JobExecutionContext;
use crate::core::job::JobDefinition;
use crate::core::runner::JobRunner;
use crate::core::types::{JobId, JobVersion};
use crate::events::{Event, EventBus};
use crate::history::HistoryRecorder;
use crate::lock::LockService;

/// Random delay added before a fire to spread out jobs with equal periods.
///
/// Draws a non-negative offset below `interval` and scales it by the job's
/// jitter fraction clamped to `[0, jitter_limit]`. The result is always
/// below `interval * jitter`.
pub fn jitter_delay<R: RngCore + ?Sized>(
    rng: &mut R,
    interval: Duration,
    job_jitter: Option<f64>,
    jitter_limit: f64,
) -> Duration {
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if interval_ms == 0 {
        return Duration::ZERO;
    }
    let limit = if jitter_limit.is_finite() {
        jitter_limit.max(0.0)
    } else {
        0.0
    };
    let jitter = job_jitter
        .filter(|j| j.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, limit);
    if jitter == 0.0 {
        return Duration::ZERO;
    }
    let offset = rng.next_u64() % interval_ms;
    Duration::from_millis((offset as f64 * jitter) as u64)
}

/// Timer-driven job scheduler.
///
/// Cheap to clone; clones share the registry. Scheduling calls are
/// synchronous and do no I/O; timers run on the runtime captured at
/// construction.
#[derive(Clone)]
pub struct JobScheduler {
    registry: Arc<JobRegistry>,
    lock_service: LockService,
    history: Option<HistoryRecorder>,
    event_bus: Option<Arc<EventBus>>,
    clock: Arc<dyn Clock>,
    runtime: Handle,
}

impl JobScheduler {
    /// Create a scheduler on the current tokio runtime.
    pub fn new(lock_service: LockService) -> Result<Self, SchedulerError> {
        let runtime =
            Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(lock_service, runtime))
    }

    /// Create a scheduler whose timers run on `runtime`.
    pub fn with_runtime(lock_service: LockService, runtime: Handle) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            lock_service,
            history: None,
            event_bus: None,
            clock: Arc::new(SystemClock),
            runtime,
        }
    }

    /// Record runner outcomes with `recorder`.
    pub fn with_history(mut self, recorder: HistoryRecorder) -> Self {
        self.history = Some(recorder);
        self
    }

    /// Emit lifecycle events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Read the time from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The job registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Lock service handed to runners.
    pub fn lock_service(&self) -> &LockService {
        &self.lock_service
    }

    /// Start scheduling a job.
    ///
    /// Returns `false` for a disabled job, or one that cannot be armed
    /// because it has no enabled time. Calling again for a job that is
    /// already armed is a no-op returning `true`.
    pub fn schedule(
        &self,
        collection: &str,
        job_id: impl Into<JobId>,
        job: JobDefinition,
        runner: Arc<dyn JobRunner>,
        job_version: JobVersion,
        jitter_limit: f64,
    ) -> bool {
        let job_id = job_id.into();
        let jobs = self.registry.jobs_by_collection(collection);
        let _guard = jobs.lock();

        if !job.is_enabled() {
            if let Some(existing) = jobs.get_job(&job_id) {
                existing.mark_descheduled();
            }
            jobs.add_disabled_job(
                job_id.clone(),
                Arc::new(JobSchedulingInfo::new(collection, job_id.clone(), job)),
            );
            tracing::info!(collection, job_id = %job_id, "Job is disabled, not scheduling");
            return false;
        }

        let entry = match jobs.get_job(&job_id) {
            Some(entry) if !entry.is_descheduled() => entry,
            previous => {
                if let Some(previous) = previous {
                    previous.cancel_timer();
                }
                let entry = Arc::new(JobSchedulingInfo::new(
                    collection,
                    job_id.clone(),
                    job.clone(),
                ));
                jobs.add_job(job_id.clone(), entry.clone());
                entry
            }
        };

        if entry.is_armed() {
            tracing::debug!(collection, job_id = %job_id, "Job is already scheduled");
            return true;
        }

        let scheduled = self.reschedule(&job, &entry, runner, job_version, jitter_limit);
        if scheduled {
            let next = entry.next_expected_fire_time();
            tracing::info!(collection, job_id = %job_id, next_fire_time = ?next, "Scheduled job");
            self.emit_detached(Event::job_scheduled(collection, job_id, next));
        }
        scheduled
    }

    /// Stop scheduling a job.
    ///
    /// Returns `false` if the job's timer is firing at this moment; the
    /// caller should retry. A job that is not scheduled counts as
    /// descheduled.
    pub fn deschedule(&self, collection: &str, job_id: &JobId) -> bool {
        let Some(jobs) = self.registry.find_collection(collection) else {
            return true;
        };
        let _guard = jobs.lock();

        let Some(entry) = jobs.get_job(job_id) else {
            return true;
        };
        entry.mark_descheduled();
        if !entry.cancel_timer() {
            tracing::debug!(collection, job_id = %job_id, "Job timer is firing, cannot deschedule yet");
            return false;
        }
        jobs.remove_job(job_id);

        tracing::info!(collection, job_id = %job_id, "Descheduled job");
        self.emit_detached(Event::job_descheduled(collection, job_id.clone()));
        true
    }

    /// Deschedule several jobs; returns the ids that could not be descheduled.
    pub fn bulk_deschedule(&self, collection: &str, job_ids: &[JobId]) -> Vec<JobId> {
        job_ids
            .iter()
            .filter(|job_id| !self.deschedule(collection, job_id))
            .cloned()
            .collect()
    }

    /// Deschedule every job in every collection.
    ///
    /// Returns the `(collection, job_id)` pairs that were firing and could
    /// not be descheduled.
    pub fn deschedule_all(&self) -> Vec<(String, JobId)> {
        let mut failed = Vec::new();
        for collection in self.registry.collections() {
            let job_ids = self.scheduled_job_ids(&collection);
            for job_id in self.bulk_deschedule(&collection, &job_ids) {
                failed.push((collection.clone(), job_id));
            }
        }
        failed
    }

    /// Ids of the jobs currently scheduled in `collection`, sorted.
    pub fn scheduled_job_ids(&self, collection: &str) -> Vec<JobId> {
        self.registry
            .find_collection(collection)
            .map(|jobs| jobs.job_ids())
            .unwrap_or_default()
    }

    /// Whether a job has a live registry entry.
    pub fn is_scheduled(&self, collection: &str, job_id: &JobId) -> bool {
        self.registry
            .get_job(collection, job_id)
            .is_some_and(|entry| !entry.is_descheduled())
    }

    /// Scheduling state of a job.
    pub fn scheduling_info(&self, collection: &str, job_id: &JobId) -> Option<SchedulingSnapshot> {
        self.registry
            .get_job(collection, job_id)
            .map(|entry| entry.snapshot())
    }

    /// Compute the job's next fire time and arm its timer.
    ///
    /// Returns `false` if the job must not be scheduled (no enabled time, or
    /// already descheduled) and `true` otherwise, including when the
    /// schedule has no further occurrences and nothing is armed.
    pub fn reschedule(
        &self,
        job: &JobDefinition,
        entry: &Arc<JobSchedulingInfo>,
        runner: Arc<dyn JobRunner>,
        job_version: JobVersion,
        jitter_limit: f64,
    ) -> bool {
        let collection = entry.collection();
        let job_id = entry.job_id();

        if job.enabled_time().is_none() {
            tracing::info!(collection, job_id = %job_id, "Job has no enabled time, not scheduling");
            return false;
        }
        if entry.is_descheduled() {
            tracing::debug!(collection, job_id = %job_id, "Job was descheduled, not rearming");
            return false;
        }

        let now = self.clock.now();
        let schedule = job.schedule();
        let Some(mut next) = schedule.next_execution_time(entry.next_expected_fire_time(), now)
        else {
            tracing::info!(collection, job_id = %job_id, "Schedule has no further occurrences");
            return true;
        };
        if next <= now {
            next = now;
        }

        let mut delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        if let Some(second) = schedule.next_execution_time(Some(next), now)
            && let Ok(interval) = (second - next).to_std()
            && !interval.is_zero()
        {
            delay += jitter_delay(&mut rand::rng(), interval, job.jitter(), jitter_limit);
        }

        entry.set_next_expected_fire_time(next);

        let scheduler = self.clone();
        let job = job.clone();
        let fire_entry = entry.clone();
        entry.arm_timer(|| {
            TimerHandle::arm(&self.runtime, delay, move || {
                scheduler.on_fire(job, fire_entry, runner, job_version, jitter_limit)
            })
        });

        tracing::debug!(
            collection,
            job_id = %job_id,
            next_fire_time = %next,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Armed job timer"
        );
        true
    }

    /// Timer callback: record the fire, re-arm, and hand back the runner
    /// invocation.
    fn on_fire(
        &self,
        job: JobDefinition,
        entry: Arc<JobSchedulingInfo>,
        runner: Arc<dyn JobRunner>,
        job_version: JobVersion,
        jitter_limit: f64,
    ) -> Option<impl Future<Output = ()> + Send + use<>> {
        if entry.is_descheduled() {
            tracing::debug!(
                collection = entry.collection(),
                job_id = %entry.job_id(),
                "Timer fired for descheduled job, ignoring"
            );
            return None;
        }

        let now = self.clock.now();
        let expected = entry.record_fire(now).unwrap_or(now);

        if !self.reschedule(&job, &entry, runner.clone(), job_version, jitter_limit)
            && !entry.is_descheduled()
        {
            tracing::warn!(
                collection = entry.collection(),
                job_id = %entry.job_id(),
                "Failed to rearm job"
            );
        }

        Some(
            self.clone()
                .execute(job, entry, runner, job_version, expected, now),
        )
    }

    async fn execute(
        self,
        job: JobDefinition,
        entry: Arc<JobSchedulingInfo>,
        runner: Arc<dyn JobRunner>,
        job_version: JobVersion,
        expected: DateTime<Utc>,
        started: DateTime<Utc>,
    ) {
        let collection = entry.collection().to_string();
        let job_id = entry.job_id().clone();

        self.emit(Event::job_fired(
            collection.clone(),
            job_id.clone(),
            expected,
            started,
        ))
        .await;

        let ctx = JobExecutionContext::new(
            expected,
            job_version,
            self.lock_service.clone(),
            collection.clone(),
            job_id.clone(),
        );

        tracing::debug!(collection = %collection, job_id = %job_id, expected = %expected, "Running job");
        if let Err(e) = runner.run_job(&job, &ctx).await {
            tracing::warn!(collection = %collection, job_id = %job_id, error = %e, "Job runner failed");
            self.emit(Event::runner_failed(
                collection.clone(),
                job_id.clone(),
                e.to_string(),
            ))
            .await;
        }

        if let Some(history) = self.history.clone()
            && !ctx.is_suppressed()
        {
            let ended = self.clock.now();
            let status = ctx.job_status();
            self.runtime.spawn(async move {
                match history
                    .record_execution(&collection, job_id.as_str(), started, Some(ended), status)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(collection = %collection, job_id = %job_id, "Job history not recorded")
                    }
                    Err(e) => {
                        tracing::warn!(collection = %collection, job_id = %job_id, error = %e, "Failed to record job history")
                    }
                }
            });
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).await;
        }
    }

    fn emit_detached(&self, event: Event) {
        if let Some(bus) = self.event_bus.clone() {
            self.runtime.spawn(async move { bus.emit(event).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schedule::{IntervalUnit, Schedule};
    use crate::storage::InMemoryDocumentStore;
    use crate::testing::{FailingRunner, ManualClock, RecordingRunner, TokioClock};
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn scheduler(clock: Arc<TokioClock>) -> JobScheduler {
        let service = LockService::new(Arc::new(InMemoryDocumentStore::new())).with_clock(clock.clone());
        JobScheduler::new(service).unwrap().with_clock(clock)
    }

    fn every_second(clock: &TokioClock) -> JobDefinition {
        let now = clock.now();
        JobDefinition::new(
            "tick",
            Schedule::interval(now, 1, IntervalUnit::Seconds).unwrap(),
            now,
        )
    }

    #[test]
    fn test_jitter_is_bounded_by_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let interval = Duration::from_secs(600);
        for _ in 0..10_000 {
            let delay = jitter_delay(&mut rng, interval, Some(1.0), 0.6);
            assert!(delay < Duration::from_secs(360), "delay {:?} out of range", delay);
        }
    }

    #[test]
    fn test_no_jitter_without_job_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = jitter_delay(&mut rng, Duration::from_secs(60), None, 0.6);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_negative_and_nan_jitter_is_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let interval = Duration::from_secs(60);
        assert_eq!(jitter_delay(&mut rng, interval, Some(-0.5), 0.6), Duration::ZERO);
        assert_eq!(jitter_delay(&mut rng, interval, Some(f64::NAN), 0.6), Duration::ZERO);
        assert_eq!(jitter_delay(&mut rng, interval, Some(0.5), f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_zero_interval_has_no_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            jitter_delay(&mut rng, Duration::ZERO, Some(1.0), 1.0),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_repeatedly() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());

        assert!(scheduler.schedule(
            "jobs",
            "tick",
            every_second(&clock),
            runner.clone(),
            JobVersion::default(),
            0.0,
        ));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(runner.fire_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_is_idempotent_while_armed() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let job = every_second(&clock);

        assert!(scheduler.schedule("jobs", "tick", job.clone(), runner.clone(), JobVersion::default(), 0.0));
        let first = scheduler.scheduling_info("jobs", &JobId::new("tick")).unwrap();
        assert!(scheduler.schedule("jobs", "tick", job, runner.clone(), JobVersion::default(), 0.0));
        let second = scheduler.scheduling_info("jobs", &JobId::new("tick")).unwrap();

        assert_eq!(first.next_expected_fire_time, second.next_expected_fire_time);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runner.fire_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_job_is_not_scheduled() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let job = every_second(&clock).with_enabled(false);

        assert!(!scheduler.schedule("jobs", "tick", job.clone(), runner.clone(), JobVersion::default(), 0.0));
        assert!(!scheduler.schedule("jobs", "tick", job, runner.clone(), JobVersion::default(), 0.0));
        assert!(!scheduler.is_scheduled("jobs", &JobId::new("tick")));
        assert!(
            scheduler
                .registry()
                .get_disabled_job("jobs", &JobId::new("tick"))
                .is_some()
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runner.fire_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_a_scheduled_job_stops_fires() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let job = every_second(&clock);

        scheduler.schedule("jobs", "tick", job.clone(), runner.clone(), JobVersion::default(), 0.0);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runner.fire_count(), 1);

        assert!(!scheduler.schedule("jobs", "tick", job.with_enabled(false), runner.clone(), JobVersion::default(), 0.0));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runner.fire_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_without_enabled_time_is_not_armed() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let job = every_second(&clock).with_enabled_time(None);

        assert!(!scheduler.schedule("jobs", "tick", job, runner.clone(), JobVersion::default(), 0.0));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runner.fire_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_runner_keeps_schedule() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(FailingRunner::new());

        scheduler.schedule("jobs", "tick", every_second(&clock), runner.clone(), JobVersion::default(), 0.0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(runner.attempts() >= 4, "only {} attempts", runner.attempts());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deschedule_stops_fires() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let id = JobId::new("tick");

        scheduler.schedule("jobs", id.clone(), every_second(&clock), runner.clone(), JobVersion::default(), 0.0);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runner.fire_count(), 1);

        assert!(scheduler.deschedule("jobs", &id));
        assert!(!scheduler.is_scheduled("jobs", &id));
        assert!(scheduler.scheduling_info("jobs", &id).is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runner.fire_count(), 1);
    }

    /// Wall clock that, once gated, blocks the next reading until released.
    #[derive(Debug, Default)]
    struct GatedClock {
        gate: parking_lot::Mutex<Option<(tokio::sync::oneshot::Sender<()>, std::sync::mpsc::Receiver<()>)>>,
    }

    impl GatedClock {
        fn close(&self) -> (tokio::sync::oneshot::Receiver<()>, std::sync::mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
            let (release_tx, release_rx) = std::sync::mpsc::channel();
            *self.gate.lock() = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }
    }

    impl Clock for GatedClock {
        fn now(&self) -> DateTime<Utc> {
            let gate = self.gate.lock().take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.recv();
            }
            Utc::now()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deschedule_is_refused_while_timer_fires() {
        let clock = Arc::new(GatedClock::default());
        let service = LockService::new(Arc::new(InMemoryDocumentStore::new()));
        let scheduler = JobScheduler::new(service).unwrap().with_clock(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let id = JobId::new("tick");
        let now = Utc::now();
        let job = JobDefinition::new(
            "tick",
            Schedule::interval(now, 1, IntervalUnit::Seconds).unwrap(),
            now,
        );

        assert!(scheduler.schedule("jobs", id.clone(), job, runner.clone(), JobVersion::default(), 0.0));
        let (entered, release) = clock.close();
        tokio::time::timeout(Duration::from_secs(5), entered)
            .await
            .unwrap()
            .unwrap();

        // The timer is inside its fire callback.
        assert!(!scheduler.deschedule("jobs", &id));
        assert_eq!(
            scheduler.bulk_deschedule("jobs", std::slice::from_ref(&id)),
            vec![id.clone()]
        );
        let info = scheduler.scheduling_info("jobs", &id).unwrap();
        assert!(info.descheduled);
        assert!(!scheduler.is_scheduled("jobs", &id));

        release.send(()).unwrap();
        let mut attempts = 0;
        while !scheduler.deschedule("jobs", &id) {
            attempts += 1;
            assert!(attempts < 5000, "timer never left its fire callback");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(scheduler.scheduling_info("jobs", &id).is_none());

        // The interrupted fire does not re-arm.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(runner.fire_count() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_fire_is_clamped_to_now_then_rejoins_grid() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let service = LockService::new(Arc::new(InMemoryDocumentStore::new())).with_clock(clock.clone());
        let scheduler = JobScheduler::new(service).unwrap().with_clock(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let id = JobId::new("tick");
        let job = JobDefinition::new(
            "tick",
            Schedule::interval(start, 10, IntervalUnit::Seconds).unwrap(),
            start,
        );
        let at = |secs: i64| start + chrono::TimeDelta::seconds(secs);

        assert!(scheduler.schedule("jobs", id.clone(), job, runner.clone(), JobVersion::default(), 0.0));
        assert_eq!(
            scheduler.scheduling_info("jobs", &id).unwrap().next_expected_fire_time,
            Some(at(10))
        );

        // The wall clock jumps well past several missed occurrences.
        clock.set(at(45));
        tokio::time::sleep(Duration::from_millis(10_100)).await;

        // One catch-up fire at `now`, no burst for T+20, T+30 and T+40.
        let fires = runner.fires();
        assert_eq!(fires.len(), 2);
        assert_eq!(fires[0].1, at(10));
        assert_eq!(fires[1].1, at(45));
        assert_eq!(
            scheduler.scheduling_info("jobs", &id).unwrap().next_expected_fire_time,
            Some(at(50))
        );

        clock.set(at(50));
        tokio::time::sleep(Duration::from_secs(5)).await;
        let fires = runner.fires();
        assert_eq!(fires.len(), 3);
        assert_eq!(fires[2].1, at(50));
    }

    #[tokio::test]
    async fn test_deschedule_unknown_job_is_true() {
        let scheduler = scheduler(Arc::new(TokioClock::new()));
        assert!(scheduler.deschedule("jobs", &JobId::new("missing")));
        assert!(scheduler.bulk_deschedule("jobs", &[JobId::new("a"), JobId::new("b")]).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_after_deschedule_creates_fresh_entry() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let id = JobId::new("tick");
        let job = every_second(&clock);

        scheduler.schedule("jobs", id.clone(), job.clone(), runner.clone(), JobVersion::default(), 0.0);
        assert!(scheduler.deschedule("jobs", &id));
        assert!(scheduler.schedule("jobs", id.clone(), job, runner.clone(), JobVersion::default(), 0.0));

        let info = scheduler.scheduling_info("jobs", &id).unwrap();
        assert!(!info.descheduled);
        assert!(info.pending);
        assert!(info.last_actual_fire_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_records_expected_and_actual_times() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());
        let id = JobId::new("tick");
        let job = every_second(&clock);
        let start = clock.now();

        scheduler.schedule("jobs", id.clone(), job, runner.clone(), JobVersion::default(), 0.0);
        let first_expected = scheduler
            .scheduling_info("jobs", &id)
            .unwrap()
            .next_expected_fire_time
            .unwrap();
        assert_eq!(first_expected, start + chrono::TimeDelta::seconds(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let info = scheduler.scheduling_info("jobs", &id).unwrap();
        assert_eq!(info.last_expected_fire_time, Some(first_expected));
        assert!(info.last_actual_fire_time.unwrap() >= first_expected);
        assert_eq!(
            info.next_expected_fire_time,
            Some(first_expected + chrono::TimeDelta::seconds(1))
        );
        assert_eq!(runner.fires()[0].1, first_expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deschedule_all() {
        let clock = Arc::new(TokioClock::new());
        let scheduler = scheduler(clock.clone());
        let runner = Arc::new(RecordingRunner::new());

        for (collection, id) in [("a", "1"), ("a", "2"), ("b", "1")] {
            scheduler.schedule(collection, id, every_second(&clock), runner.clone(), JobVersion::default(), 0.0);
        }
        assert_eq!(scheduler.scheduled_job_ids("a").len(), 2);

        assert!(scheduler.deschedule_all().is_empty());
        assert!(scheduler.scheduled_job_ids("a").is_empty());
        assert!(scheduler.scheduled_job_ids("b").is_empty());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let service = LockService::new(Arc::new(InMemoryDocumentStore::new()));
        assert!(matches!(
            JobScheduler::new(service),
            Err(SchedulerError::NoRuntime(_))
        ));
    }
}
