//! Job orchestrator — runs the engine's jobs as independent units of work,
//! isolates failures per job, and returns a uniform result record.
//!
//! The daily expiry check composes the components in a fixed sequence:
//! evaluator → dedup guard (gate, then mark before any enqueue) → recipient
//! resolver → queue. The drain job dequeues a bounded batch and dispatches
//! with bounded concurrency and a hard per-send timeout. Cleanup reclaims
//! storage. Any job may also be triggered manually; the dedup guard and
//! idempotent status transitions make redundant triggers safe.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use skyroster_core::{Result, SkyError, SkyrosterConfig};

use crate::cache::{CacheStats, TtlCache};
use crate::dedup::DedupGuard;
use crate::dispatch::DeliveryChannel;
use crate::persistence::AlertDb;
use crate::queue::{NotificationQueue, QueueStats};
use crate::recipients;
use crate::source::RosterSource;
use crate::sweeper::CleanupSweeper;
use crate::thresholds::{self, AlertThresholds, TrackedExpiry};

/// Notification type (and dedup key) for the daily certification wave.
pub const CERTIFICATION_EXPIRY: &str = "certification_expiry";

/// The jobs the orchestrator knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Scan expiries, gate on the dedup guard, queue alert tasks.
    ExpiryCheck,
    /// Drain a batch of pending tasks through the delivery channel.
    QueueDrain,
    /// Purge retention-expired rows and sweep the cache.
    Cleanup,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::ExpiryCheck => "expiry-check",
            JobKind::QueueDrain => "queue-drain",
            JobKind::Cleanup => "cleanup",
        }
    }

    /// The standard tick sequence.
    pub fn all() -> [JobKind; 3] {
        [JobKind::ExpiryCheck, JobKind::QueueDrain, JobKind::Cleanup]
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "expiry-check" => Ok(JobKind::ExpiryCheck),
            "queue-drain" => Ok(JobKind::QueueDrain),
            "cleanup" => Ok(JobKind::Cleanup),
            other => Err(format!(
                "unknown job '{other}' (expected expiry-check, queue-drain, or cleanup)"
            )),
        }
    }
}

/// Uniform per-run result. Ephemeral; the durable output is the side effects
/// of the job itself (queue rows, send-log rows, cache mutations).
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job: String,
    pub success: bool,
    pub duration_ms: u64,
    pub details: serde_json::Value,
    pub error: Option<String>,
}

/// Aggregate outcome of one drain.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProcessStats {
    pub successful: usize,
    pub failed: usize,
}

/// Composes evaluator, guard, resolver, queue, processor, and sweeper.
pub struct JobRunner {
    source: Arc<dyn RosterSource>,
    channel: Arc<dyn DeliveryChannel>,
    queue: NotificationQueue,
    guard: DedupGuard,
    sweeper: CleanupSweeper,
    cache: TtlCache<Vec<TrackedExpiry>>,
    thresholds: AlertThresholds,
    cache_ttl: StdDuration,
    batch_size: usize,
    workers: usize,
    send_timeout: StdDuration,
    retention_days: u32,
}

impl JobRunner {
    pub fn new(
        source: Arc<dyn RosterSource>,
        channel: Arc<dyn DeliveryChannel>,
        db: Arc<AlertDb>,
        config: &SkyrosterConfig,
    ) -> Self {
        Self {
            source,
            channel,
            queue: NotificationQueue::new(db.clone(), config.queue.max_attempts),
            guard: DedupGuard::new(db.clone()),
            sweeper: CleanupSweeper::new(db),
            cache: TtlCache::new(config.cache.max_entries),
            thresholds: AlertThresholds::new(&config.alert_thresholds),
            cache_ttl: StdDuration::from_secs(config.cache.ttl_secs),
            batch_size: config.queue.batch_size,
            workers: config.queue.workers.max(1),
            send_timeout: StdDuration::from_secs(config.queue.send_timeout_secs),
            retention_days: config.cleanup.retention_days,
        }
    }

    /// Run a single job, timing it wall-clock and capturing any error into
    /// the result instead of propagating.
    pub async fn run(&self, kind: JobKind) -> JobResult {
        let start = Instant::now();
        tracing::info!("▶️ Job started: {}", kind.name());

        let outcome = match kind {
            JobKind::ExpiryCheck => self.expiry_check(),
            JobKind::QueueDrain => self.queue_drain().await,
            JobKind::Cleanup => self.cleanup(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(details) => {
                tracing::info!("✅ Job '{}' finished in {duration_ms}ms", kind.name());
                JobResult {
                    job: kind.name().to_string(),
                    success: true,
                    duration_ms,
                    details,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Job '{}' failed after {duration_ms}ms: {e}", kind.name());
                JobResult {
                    job: kind.name().to_string(),
                    success: false,
                    duration_ms,
                    details: serde_json::json!({}),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run jobs independently; one failure never prevents the others from
    /// running or being reported.
    pub async fn run_all(&self, kinds: &[JobKind]) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(kinds.len());
        for kind in kinds {
            results.push(self.run(*kind).await);
        }
        results
    }

    /// Daily expiry check: evaluate thresholds, gate on the dedup guard,
    /// resolve recipients, queue one task per (candidate, recipient).
    fn expiry_check(&self) -> Result<serde_json::Value> {
        let as_of = Utc::now().date_naive();

        if !self.guard.should_fire(CERTIFICATION_EXPIRY, as_of)? {
            tracing::info!("🔁 Expiry alerts already fired for {as_of}, skipping");
            return Ok(serde_json::json!({ "skipped": "already fired today", "queued": 0 }));
        }

        let source = self.source.clone();
        let cache_key = format!("active-expiries:{as_of}");
        let expiries = self.cache.get_or_load(&cache_key, self.cache_ttl, || {
            source.active_expiries(as_of)
        })?;

        let candidates = thresholds::evaluate(as_of, &self.thresholds, &expiries);
        if candidates.is_empty() {
            return Ok(serde_json::json!({ "candidates": 0, "queued": 0 }));
        }

        // Close the gate before any task hits the queue, so a concurrent
        // re-trigger of the same tick is a no-op.
        self.guard.mark_fired(CERTIFICATION_EXPIRY, as_of)?;

        let recipient_list = self.source.alert_recipients()?;
        let mut tasks = Vec::new();
        for candidate in &candidates {
            tasks.extend(recipients::resolve(candidate, &recipient_list));
        }
        let queued = self.queue.enqueue_batch(&tasks)?;

        Ok(serde_json::json!({
            "candidates": candidates.len(),
            "recipients": recipient_list.len(),
            "queued": queued,
        }))
    }

    async fn queue_drain(&self) -> Result<serde_json::Value> {
        let stats = self.process(self.batch_size).await?;
        Ok(serde_json::json!({
            "successful": stats.successful,
            "failed": stats.failed,
        }))
    }

    /// Drain up to `limit` pending tasks through the delivery channel with
    /// bounded concurrency. Each send is capped by the configured timeout;
    /// per-task failure is recorded and never aborts the rest of the batch.
    pub async fn process(&self, limit: usize) -> Result<ProcessStats> {
        let tasks = self.queue.dequeue_pending(limit)?;
        if tasks.is_empty() {
            return Ok(ProcessStats::default());
        }
        tracing::info!("📮 Draining {} pending tasks", tasks.len());

        let send_timeout = self.send_timeout;
        let results: Vec<(String, Result<()>)> = stream::iter(tasks.into_iter().map(|task| {
            let channel = self.channel.clone();
            async move {
                let outcome = match tokio::time::timeout(
                    send_timeout,
                    channel.send(
                        &task.recipient,
                        &task.subject,
                        &task.template_name,
                        &task.template_data,
                    ),
                )
                .await
                {
                    Ok(res) => res,
                    Err(_) => Err(SkyError::Delivery(format!(
                        "delivery timed out after {}s",
                        send_timeout.as_secs()
                    ))),
                };
                (task.id, outcome)
            }
        }))
        .buffer_unordered(self.workers)
        .collect()
        .await;

        let mut stats = ProcessStats::default();
        for (id, outcome) in results {
            match outcome {
                Ok(()) => {
                    self.queue.mark_sent(&id)?;
                    stats.successful += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Delivery failed for task {id} (attempt recorded): {e}");
                    self.queue.mark_failed(&id, &e.to_string())?;
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    fn cleanup(&self) -> Result<serde_json::Value> {
        let stats = self.sweeper.sweep(Duration::days(self.retention_days as i64))?;
        let cache_removed = self.cache.sweep();
        Ok(serde_json::json!({
            "log_removed": stats.log_removed,
            "tasks_removed": stats.tasks_removed,
            "cache_removed": cache_removed,
        }))
    }

    // ─── External surfaces ───────────────────────────────────

    /// Invalidation hook for collaborators that mutate roster records.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn queue_stats(&self) -> Result<QueueStats> {
        self.queue.stats()
    }
}

/// Spawn the periodic job loop as a background tokio task. Each tick runs
/// the standard sequence; the dedup guard keeps redundant ticks harmless.
pub async fn spawn_job_loop(runner: Arc<JobRunner>, check_interval_secs: u64) {
    tracing::info!("⏰ Job loop started (check every {check_interval_secs}s)");
    let mut interval = tokio::time::interval(StdDuration::from_secs(check_interval_secs));

    loop {
        interval.tick().await;
        for result in runner.run_all(&JobKind::all()).await {
            tracing::debug!(
                "📋 {}: success={} details={}",
                result.job,
                result.success,
                result.details
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{NotificationTask, TaskStatus};
    use crate::recipients::{NotificationPrefs, Recipient};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct StaticSource {
        expiries: Vec<TrackedExpiry>,
        recipients: Vec<Recipient>,
        fail: bool,
    }

    impl RosterSource for StaticSource {
        fn active_expiries(&self, _as_of: NaiveDate) -> Result<Vec<TrackedExpiry>> {
            if self.fail {
                return Err(SkyError::Source("roster db unreachable".into()));
            }
            Ok(self.expiries.clone())
        }

        fn alert_recipients(&self) -> Result<Vec<Recipient>> {
            Ok(self.recipients.clone())
        }
    }

    struct FakeChannel {
        fail_for: HashSet<String>,
        delay: StdDuration,
        sent: Mutex<Vec<String>>,
    }

    impl FakeChannel {
        fn new() -> Self {
            Self {
                fail_for: HashSet::new(),
                delay: StdDuration::ZERO,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing_for(recipients: &[&str]) -> Self {
            let mut channel = Self::new();
            channel.fail_for = recipients.iter().map(|r| r.to_string()).collect();
            channel
        }
    }

    #[async_trait]
    impl DeliveryChannel for FakeChannel {
        async fn send(
            &self,
            recipient: &str,
            _subject: &str,
            _template_name: &str,
            _template_data: &serde_json::Value,
        ) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_for.contains(recipient) {
                return Err(SkyError::Delivery("mailbox unavailable".into()));
            }
            self.sent.lock().unwrap().push(recipient.to_string());
            Ok(())
        }
    }

    fn expiry(pilot_id: &str, days_out: i64) -> TrackedExpiry {
        TrackedExpiry {
            pilot_id: pilot_id.to_string(),
            pilot_name: format!("Pilot {pilot_id}"),
            check_code: "PC".to_string(),
            category: "Flight Checks".to_string(),
            expiry_date: Utc::now().date_naive() + Duration::days(days_out),
        }
    }

    fn recipient(email: &str) -> Recipient {
        Recipient {
            email: email.to_string(),
            name: None,
            prefs: NotificationPrefs::default(),
        }
    }

    fn runner_with(
        expiries: Vec<TrackedExpiry>,
        recipients: Vec<Recipient>,
        channel: FakeChannel,
    ) -> (JobRunner, Arc<FakeChannel>) {
        let source = StaticSource {
            expiries,
            recipients,
            fail: false,
        };
        let channel = Arc::new(channel);
        let runner = JobRunner::new(
            Arc::new(source),
            channel.clone(),
            Arc::new(AlertDb::open_in_memory().unwrap()),
            &SkyrosterConfig::default(),
        );
        (runner, channel)
    }

    #[tokio::test]
    async fn test_daily_check_fires_once_per_day() {
        let (runner, _channel) = runner_with(
            vec![expiry("P1", 7)],
            vec![recipient("a@x"), recipient("b@x")],
            FakeChannel::new(),
        );

        let first = runner.run(JobKind::ExpiryCheck).await;
        assert!(first.success);
        assert_eq!(first.details["queued"], 2);

        let second = runner.run(JobKind::ExpiryCheck).await;
        assert!(second.success);
        assert_eq!(second.details["queued"], 0);

        assert_eq!(runner.queue_stats().unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_urgent_candidates_drain_before_routine() {
        // One 7-day expiry (two recipients, priority 1) and one 30-day
        // (priority 3). Both priority-1 tasks come back before the rest.
        let (runner, _channel) = runner_with(
            vec![expiry("P1", 7), expiry("P2", 30)],
            vec![recipient("a@x"), recipient("b@x")],
            FakeChannel::new(),
        );

        let result = runner.run(JobKind::ExpiryCheck).await;
        assert_eq!(result.details["candidates"], 2);
        assert_eq!(result.details["queued"], 4);

        let drained = runner.queue.dequeue_pending(10).unwrap();
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0].priority, 1);
        assert_eq!(drained[1].priority, 1);
        assert_eq!(drained[2].priority, 3);
        assert_eq!(drained[3].priority, 3);
    }

    #[tokio::test]
    async fn test_process_isolates_per_task_failure() {
        let (runner, channel) = runner_with(
            vec![expiry("P1", 7)],
            vec![recipient("ok@x"), recipient("broken@x")],
            FakeChannel::failing_for(&["broken@x"]),
        );
        runner.run(JobKind::ExpiryCheck).await;

        let stats = runner.process(10).await.unwrap();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(channel.sent.lock().unwrap().clone(), vec!["ok@x".to_string()]);

        // Failed task stays pending with one attempt recorded
        let remaining = runner.queue.dequeue_pending(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].recipient, "broken@x");
        assert_eq!(remaining[0].attempts, 1);
        assert_eq!(remaining[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_exhausted_task_goes_terminal() {
        let mut config = SkyrosterConfig::default();
        config.queue.max_attempts = 2;
        let runner = JobRunner::new(
            Arc::new(StaticSource {
                expiries: vec![],
                recipients: vec![],
                fail: false,
            }),
            Arc::new(FakeChannel::failing_for(&["dead@x"])),
            Arc::new(AlertDb::open_in_memory().unwrap()),
            &config,
        );
        let task = NotificationTask::new(
            "dead@x",
            CERTIFICATION_EXPIRY,
            "subject",
            "certification-expiry",
            serde_json::json!({}),
            1,
        );
        runner.queue.enqueue(&task).unwrap();

        assert_eq!(runner.process(10).await.unwrap().failed, 1);
        assert_eq!(runner.process(10).await.unwrap().failed, 1);
        // Attempts exhausted: terminal Failed, nothing left to drain
        let third = runner.process(10).await.unwrap();
        assert_eq!(third.failed, 0);
        assert_eq!(third.successful, 0);
        assert_eq!(runner.queue_stats().unwrap().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_timeout_counts_as_failure() {
        let mut channel = FakeChannel::new();
        channel.delay = StdDuration::from_secs(120); // longer than send timeout
        let (runner, _channel) = runner_with(vec![], vec![], channel);
        let task = NotificationTask::new(
            "slow@x",
            CERTIFICATION_EXPIRY,
            "subject",
            "certification-expiry",
            serde_json::json!({}),
            1,
        );
        runner.queue.enqueue(&task).unwrap();

        let stats = runner.process(10).await.unwrap();
        assert_eq!(stats.failed, 1);
        let remaining = runner.queue.dequeue_pending(10).unwrap();
        assert!(
            remaining[0]
                .last_error
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn test_job_failure_isolated_in_run_all() {
        let runner = JobRunner::new(
            Arc::new(StaticSource {
                expiries: vec![],
                recipients: vec![],
                fail: true,
            }),
            Arc::new(FakeChannel::new()),
            Arc::new(AlertDb::open_in_memory().unwrap()),
            &SkyrosterConfig::default(),
        );

        let results = runner.run_all(&JobKind::all()).await;
        assert_eq!(results.len(), 3);
        assert!(!results[0].success);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap()
                .contains("roster db unreachable")
        );
        // The drain and cleanup still ran and reported
        assert!(results[1].success);
        assert!(results[2].success);
    }

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("expiry-check".parse::<JobKind>(), Ok(JobKind::ExpiryCheck));
        assert_eq!("cleanup".parse::<JobKind>(), Ok(JobKind::Cleanup));
        assert!("nope".parse::<JobKind>().is_err());
    }
}
