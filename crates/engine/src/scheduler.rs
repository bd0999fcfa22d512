//! Scheduler — one worker per running campaign, each on its own tick
//! timer. A tick pulls eligible prospects from the store, gates them
//! through the rate limiter, fires the executor, and reschedules via the
//! delay policy.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadflow_core::config::AutomationConfig;
use leadflow_core::types::{ActionKind, ActionOutcome, ActionRecord, Prospect};
use leadflow_core::{EngineError, EngineResult};

use crate::channel::OutreachChannel;
use crate::delay::DelayPolicy;
use crate::executor::ActionExecutor;
use crate::lifecycle::ProspectLifecycle;
use crate::rate_limit::DailyRateLimiter;
use crate::stats::StatsAggregator;
use crate::store::ProspectStore;

/// What one tick did, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub sent: u32,
    pub skipped: u32,
    pub deferred: u32,
    pub failed: u32,
}

struct CampaignWorker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Owns the campaign-indexed worker registry and the tick logic. Clones
/// share all state, so a clone can be moved into each worker task.
#[derive(Clone)]
pub struct AutomationEngine {
    store: ProspectStore,
    limiter: Arc<DailyRateLimiter>,
    executor: ActionExecutor,
    policy: Arc<dyn DelayPolicy>,
    lifecycle: Arc<ProspectLifecycle>,
    config: AutomationConfig,
    workers: Arc<DashMap<Uuid, CampaignWorker>>,
}

impl std::fmt::Debug for AutomationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationEngine")
            .field("store", &self.store)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl AutomationEngine {
    pub fn new(
        store: ProspectStore,
        channel: Arc<dyn OutreachChannel>,
        policy: Arc<dyn DelayPolicy>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(store.clone(), channel),
            store,
            limiter: Arc::new(DailyRateLimiter::new()),
            policy,
            lifecycle: Arc::new(ProspectLifecycle::new()),
            config,
            workers: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &ProspectStore {
        &self.store
    }

    pub fn stats(&self) -> StatsAggregator {
        StatsAggregator::new(self.store.clone())
    }

    pub fn records_for(&self, prospect_id: &Uuid) -> Vec<ActionRecord> {
        self.executor.records_for(prospect_id)
    }

    /// Adds an imported prospect, staggering its first eligibility by a
    /// randomized connection delay so bulk imports don't fire as one burst.
    pub fn enroll_prospect(&self, mut prospect: Prospect) -> EngineResult<Uuid> {
        prospect.next_eligible_at = Utc::now() + self.policy.next_connection_delay();
        self.store.insert_prospect(prospect)
    }

    /// Runs one scheduling pass for a campaign. Rate-limit denial for one
    /// prospect never blocks the rest of the tick.
    pub fn run_tick(&self, campaign_id: &Uuid, now: DateTime<Utc>) -> EngineResult<TickSummary> {
        let campaign = self
            .store
            .campaign(campaign_id)
            .ok_or_else(|| EngineError::NotFound(format!("campaign {campaign_id}")))?;

        let mut summary = TickSummary::default();
        let day = now.date_naive();

        for prospect in self.store.eligible_prospects(campaign_id, now) {
            let Some(kind) = self.lifecycle.next_action(prospect.status) else {
                continue;
            };

            // A failed attempt already consumed quota; its one retry
            // bypasses the limiter instead of charging twice.
            let admitted = prospect.pending_retry
                || self.limiter.try_reserve(*campaign_id, day, campaign.daily_limit);

            if !admitted {
                let resume = next_day_start(now) + self.policy.deferral_jitter();
                self.store.set_next_eligible(&prospect.id, resume)?;
                debug!(
                    prospect_id = %prospect.id,
                    resume = %resume,
                    "Daily limit reached, deferring prospect"
                );
                metrics::counter!("scheduler.deferred").increment(1);
                summary.deferred += 1;
                continue;
            }
            if prospect.pending_retry {
                self.store.set_pending_retry(&prospect.id, false)?;
            }

            let record = self.executor.execute(&prospect.id, kind, now);
            match record.outcome {
                ActionOutcome::Sent => {
                    if kind == ActionKind::ConnectionRequest {
                        let next = now + self.policy.next_followup_delay();
                        self.store.set_next_eligible(&prospect.id, next)?;
                    }
                    summary.sent += 1;
                }
                ActionOutcome::Skipped => {
                    summary.skipped += 1;
                }
                ActionOutcome::Failed => {
                    // Keep status unchanged, retry shortly on a later tick.
                    self.store.set_pending_retry(&prospect.id, true)?;
                    let retry_at = now + self.policy.next_connection_delay();
                    self.store.set_next_eligible(&prospect.id, retry_at)?;
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Activates the campaign's worker. Idempotent: a second call while the
    /// worker is alive is a no-op, including calls racing each other. Fails
    /// fast on configuration problems.
    pub fn start_automation(&self, campaign_id: &Uuid) -> EngineResult<()> {
        let campaign = self
            .store
            .campaign(campaign_id)
            .ok_or_else(|| EngineError::NotFound(format!("campaign {campaign_id}")))?;
        if campaign.daily_limit == 0 {
            return Err(EngineError::Config(format!(
                "campaign {campaign_id} has a zero daily limit"
            )));
        }
        if self.config.tick_interval_ms == 0 {
            return Err(EngineError::Config("tick interval must be non-zero".to_string()));
        }

        // Check-and-spawn happens under the entry guard: two racing starts
        // cannot both spawn and strand one worker with a dropped shutdown
        // sender.
        match self.workers.entry(*campaign_id) {
            Entry::Occupied(entry) if !entry.get().handle.is_finished() => {
                info!(campaign_id = %campaign_id, "Automation already running");
                return Ok(());
            }
            entry => {
                let (shutdown, rx) = watch::channel(false);
                let engine = self.clone();
                let id = *campaign_id;
                let handle = tokio::spawn(async move {
                    engine.worker_loop(id, rx).await;
                });
                match entry {
                    Entry::Occupied(mut entry) => {
                        entry.insert(CampaignWorker { handle, shutdown });
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(CampaignWorker { handle, shutdown });
                    }
                }
            }
        }

        self.store.set_running(campaign_id, true)?;
        info!(campaign_id = %campaign_id, "Automation started");
        Ok(())
    }

    /// Deactivates the campaign's worker. Idempotent. An in-flight tick
    /// finishes its current prospect set; no new tick begins afterwards.
    pub fn stop_automation(&self, campaign_id: &Uuid) -> EngineResult<()> {
        if let Some((_, worker)) = self.workers.remove(campaign_id) {
            let _ = worker.shutdown.send(true);
            info!(campaign_id = %campaign_id, "Automation stop requested");
        }
        if self.store.campaign(campaign_id).is_some() {
            self.store.set_running(campaign_id, false)?;
        }
        Ok(())
    }

    pub fn is_running(&self, campaign_id: &Uuid) -> bool {
        self.workers
            .get(campaign_id)
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    async fn worker_loop(&self, campaign_id: Uuid, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(campaign_id = %campaign_id, "Automation worker started");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // A closed channel means the registry dropped this
                    // worker's sender; exit rather than spin on the
                    // always-ready branch.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    // Stop takes effect before the next tick begins.
                    if *shutdown.borrow() {
                        break;
                    }
                    let now = Utc::now();
                    match self.run_tick(&campaign_id, now) {
                        Ok(summary) => {
                            debug!(
                                campaign_id = %campaign_id,
                                sent = summary.sent,
                                skipped = summary.skipped,
                                deferred = summary.deferred,
                                failed = summary.failed,
                                "Tick complete"
                            );
                        }
                        Err(e) => {
                            warn!(campaign_id = %campaign_id, error = %e, "Tick failed");
                        }
                    }
                    self.limiter.prune_before(now.date_naive() - Duration::days(7));

                    if !self.store.has_schedulable_prospects(&campaign_id) {
                        info!(campaign_id = %campaign_id, "No schedulable prospects remain, worker exiting");
                        let _ = self.store.set_running(&campaign_id, false);
                        break;
                    }
                }
            }
        }
        info!(campaign_id = %campaign_id, "Automation worker stopped");
    }
}

/// Start of the next UTC day. Deferred prospects resume here plus a
/// jittered offset, never at the exact limit-reset instant.
fn next_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    DateTime::from_naive_utc_and_offset(tomorrow.and_time(NaiveTime::MIN), Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CaptureChannel;
    use crate::delay::FixedDelayPolicy;
    use leadflow_core::types::{Campaign, ProspectStatus};

    fn fixed_policy() -> Arc<dyn DelayPolicy> {
        Arc::new(FixedDelayPolicy::new(
            Duration::seconds(60),
            Duration::hours(72),
            Duration::seconds(300),
        ))
    }

    fn engine_with_channel(channel: Arc<CaptureChannel>) -> AutomationEngine {
        AutomationEngine::new(
            ProspectStore::new(),
            channel,
            fixed_policy(),
            AutomationConfig {
                tick_interval_ms: 10,
                ..AutomationConfig::default()
            },
        )
    }

    fn seed_prospects(engine: &AutomationEngine, campaign_id: Uuid, count: usize) -> Vec<Uuid> {
        (0..count)
            .map(|i| {
                engine
                    .store()
                    .insert_prospect(Prospect::new(
                        campaign_id,
                        format!("P{i}"),
                        None,
                        "Acme",
                        "VP Sales",
                    ))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_daily_limit_defers_overflow_to_next_day() {
        let channel = Arc::new(CaptureChannel::new());
        let engine = engine_with_channel(channel.clone());
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 2));
        seed_prospects(&engine, campaign_id, 3);

        let now = Utc::now();
        let summary = engine.run_tick(&campaign_id, now).unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.deferred, 1);
        assert_eq!(channel.count(), 2);
        assert_eq!(engine.stats().campaign_stats(&campaign_id).requests_sent, 2);

        // The deferred prospect resumes after the day boundary, jittered.
        let deferred: Vec<Prospect> = engine
            .store()
            .prospects_for(&campaign_id)
            .into_iter()
            .filter(|p| p.status == ProspectStatus::Pending)
            .collect();
        assert_eq!(deferred.len(), 1);
        assert!(deferred[0].next_eligible_at > next_day_start(now));

        // Ticking again the same day does nothing further.
        let summary = engine.run_tick(&campaign_id, now).unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.deferred, 0);
    }

    #[test]
    fn test_deferred_prospect_sends_next_day() {
        let channel = Arc::new(CaptureChannel::new());
        let engine = engine_with_channel(channel.clone());
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 1));
        seed_prospects(&engine, campaign_id, 2);

        let now = Utc::now();
        engine.run_tick(&campaign_id, now).unwrap();
        assert_eq!(channel.count(), 1);

        let summary = engine
            .run_tick(&campaign_id, now + Duration::days(1) + Duration::hours(1))
            .unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(channel.count(), 2);
    }

    #[test]
    fn test_reply_before_followup_is_skipped_not_sent() {
        let channel = Arc::new(CaptureChannel::new());
        let engine = engine_with_channel(channel.clone());
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 10));
        let ids = seed_prospects(&engine, campaign_id, 1);

        let now = Utc::now();
        engine.run_tick(&campaign_id, now).unwrap();
        assert_eq!(
            engine.store().prospect(&ids[0]).unwrap().status,
            ProspectStatus::Requested
        );

        // The reply lands before the follow-up becomes eligible.
        engine.store().mark_replied(&ids[0], now).unwrap();

        let later = now + Duration::days(4);
        let summary = engine.run_tick(&campaign_id, later).unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.skipped, 0); // replied prospects are not even selected
        assert_eq!(channel.count(), 1);

        let stats = engine.stats().campaign_stats(&campaign_id);
        assert_eq!(stats.replies_received, 1);
        assert_eq!(stats.followups_sent, 0);
    }

    #[test]
    fn test_followup_fires_after_delay() {
        let channel = Arc::new(CaptureChannel::new());
        let engine = engine_with_channel(channel.clone());
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 10));
        let ids = seed_prospects(&engine, campaign_id, 1);

        let now = Utc::now();
        engine.run_tick(&campaign_id, now).unwrap();

        // Not yet: the 72h follow-up delay hasn't elapsed.
        let early = engine.run_tick(&campaign_id, now + Duration::hours(1)).unwrap();
        assert_eq!(early.sent, 0);

        let later = engine.run_tick(&campaign_id, now + Duration::hours(73)).unwrap();
        assert_eq!(later.sent, 1);
        assert_eq!(
            engine.store().prospect(&ids[0]).unwrap().status,
            ProspectStatus::FollowupSent
        );
        let stats = engine.stats().campaign_stats(&campaign_id);
        assert_eq!(stats.followups_sent, 1);
    }

    #[test]
    fn test_failed_send_retries_without_recharging_quota() {
        let channel = Arc::new(CaptureChannel::new());
        let engine = engine_with_channel(channel.clone());
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 1));
        let ids = seed_prospects(&engine, campaign_id, 1);

        channel.set_failing(true);
        let now = Utc::now();
        let summary = engine.run_tick(&campaign_id, now).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(engine.limiter.count(campaign_id, now.date_naive()), 1);
        assert!(engine.store().prospect(&ids[0]).unwrap().pending_retry);

        // The retry succeeds on a later tick the same day, with the limit
        // already exhausted by the original attempt.
        channel.set_failing(false);
        let retry_now = now + Duration::minutes(5);
        let summary = engine.run_tick(&campaign_id, retry_now).unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(engine.limiter.count(campaign_id, now.date_naive()), 1);
        assert!(!engine.store().prospect(&ids[0]).unwrap().pending_retry);
    }

    #[test]
    fn test_start_rejects_zero_daily_limit() {
        let engine = engine_with_channel(Arc::new(CaptureChannel::new()));
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 0));
        assert!(matches!(
            engine.start_automation(&campaign_id),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_enroll_prospect_staggers_eligibility() {
        let engine = engine_with_channel(Arc::new(CaptureChannel::new()));
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 10));

        let before = Utc::now();
        let id = engine
            .enroll_prospect(Prospect::new(campaign_id, "Ada", None, "Acme", "CTO"))
            .unwrap();

        let p = engine.store().prospect(&id).unwrap();
        // FixedDelayPolicy staggers by 60s.
        assert!(p.next_eligible_at >= before + Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_start_automation_is_idempotent() {
        let engine = engine_with_channel(Arc::new(CaptureChannel::new()));
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 5));
        seed_prospects(&engine, campaign_id, 1);

        engine.start_automation(&campaign_id).unwrap();
        engine.start_automation(&campaign_id).unwrap();
        assert_eq!(engine.workers.len(), 1);
        assert!(engine.is_running(&campaign_id));
        assert!(engine.store().campaign(&campaign_id).unwrap().running);

        engine.stop_automation(&campaign_id).unwrap();
        engine.stop_automation(&campaign_id).unwrap();
        assert!(!engine.is_running(&campaign_id));
        assert!(!engine.store().campaign(&campaign_id).unwrap().running);
    }

    #[tokio::test]
    async fn test_stop_halts_processing_before_next_tick() {
        let channel = Arc::new(CaptureChannel::new());
        let engine = AutomationEngine::new(
            ProspectStore::new(),
            channel.clone(),
            fixed_policy(),
            AutomationConfig {
                tick_interval_ms: 10,
                ..AutomationConfig::default()
            },
        );
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 5));

        engine.start_automation(&campaign_id).unwrap();
        engine.stop_automation(&campaign_id).unwrap();

        // Prospects arriving after the stop are never touched.
        seed_prospects(&engine, campaign_id, 2);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(channel.count(), 0);
        for p in engine.store().prospects_for(&campaign_id) {
            assert_eq!(p.status, ProspectStatus::Pending);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_spawn_single_worker() {
        let engine = engine_with_channel(Arc::new(CaptureChannel::new()));
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 5));
        seed_prospects(&engine, campaign_id, 1);

        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    engine.start_automation(&campaign_id)
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.workers.len(), 1);
        assert!(engine.is_running(&campaign_id));

        // The surviving worker is the registered one, so stop reaches it.
        engine.stop_automation(&campaign_id).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!engine.is_running(&campaign_id));
    }

    #[tokio::test]
    async fn test_worker_exits_when_shutdown_sender_dropped() {
        let engine = engine_with_channel(Arc::new(CaptureChannel::new()));
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 5));
        seed_prospects(&engine, campaign_id, 1);
        engine.start_automation(&campaign_id).unwrap();

        // Dropping the sender without signalling must still end the worker
        // instead of leaving it spinning on a closed channel.
        let (_, worker) = engine.workers.remove(&campaign_id).unwrap();
        drop(worker.shutdown);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(worker.handle.is_finished());
    }

    /// Channel double that parks each delivery until released, so a test
    /// can stop the engine while a send is provably in flight.
    struct GatedChannel {
        entered: parking_lot::Mutex<std::sync::mpsc::Sender<()>>,
        release: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
        inner: CaptureChannel,
    }

    impl OutreachChannel for GatedChannel {
        fn deliver(&self, prospect: &Prospect, kind: ActionKind, message: &str) -> EngineResult<()> {
            let _ = self.entered.lock().send(());
            let _ = self
                .release
                .lock()
                .recv_timeout(std::time::Duration::from_secs(5));
            self.inner.deliver(prospect, kind, message)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_mid_tick_finishes_current_prospect_set() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let channel = Arc::new(GatedChannel {
            entered: parking_lot::Mutex::new(entered_tx),
            release: parking_lot::Mutex::new(release_rx),
            inner: CaptureChannel::new(),
        });
        let engine = AutomationEngine::new(
            ProspectStore::new(),
            channel.clone(),
            fixed_policy(),
            AutomationConfig {
                tick_interval_ms: 10,
                ..AutomationConfig::default()
            },
        );
        let campaign_id = engine.store().insert_campaign(Campaign::new("C", "", 5));
        let ids = seed_prospects(&engine, campaign_id, 2);

        engine.start_automation(&campaign_id).unwrap();

        // Wait until the first delivery is in flight, then stop mid-tick.
        tokio::task::spawn_blocking(move || {
            entered_rx.recv_timeout(std::time::Duration::from_secs(5))
        })
        .await
        .unwrap()
        .unwrap();
        engine.stop_automation(&campaign_id).unwrap();

        // Release the parked deliveries and let the tick run out.
        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        // The in-flight tick finished its whole prospect set consistently,
        // and no new tick began afterwards.
        assert_eq!(channel.inner.count(), 2);
        for id in &ids {
            assert_eq!(
                engine.store().prospect(id).unwrap().status,
                ProspectStatus::Requested
            );
        }
        assert!(!engine.is_running(&campaign_id));
    }
}
