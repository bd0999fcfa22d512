//! Action executor — fires (or simulates) one outbound action and records
//! the outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::types::{ActionKind, ActionOutcome, ActionRecord};
use leadflow_core::EngineError;

use crate::channel::OutreachChannel;
use crate::lifecycle::ProspectLifecycle;
use crate::store::ProspectStore;

/// Executes single outbound actions against prospects. Every attempt is
/// appended to the action log, whatever its outcome; quota was already
/// charged by the rate limiter before we get here.
#[derive(Clone)]
pub struct ActionExecutor {
    store: ProspectStore,
    channel: Arc<dyn OutreachChannel>,
    lifecycle: Arc<ProspectLifecycle>,
    records: Arc<DashMap<Uuid, Vec<ActionRecord>>>,
}

impl ActionExecutor {
    pub fn new(store: ProspectStore, channel: Arc<dyn OutreachChannel>) -> Self {
        Self {
            store,
            channel,
            lifecycle: Arc::new(ProspectLifecycle::new()),
            records: Arc::new(DashMap::new()),
        }
    }

    /// Attempts `kind` against the prospect. Re-checks the status
    /// precondition immediately before sending, so a reply that landed
    /// after scheduling turns the attempt into a `skipped` record instead
    /// of a send. Store or channel failures yield `failed` and leave the
    /// prospect untouched for a later retry.
    pub fn execute(&self, prospect_id: &Uuid, kind: ActionKind, now: DateTime<Utc>) -> ActionRecord {
        let prospect = match self.store.prospect(prospect_id) {
            Some(p) => p,
            None => {
                warn!(prospect_id = %prospect_id, "Prospect vanished before execution");
                return self.record(prospect_id, kind, now, now, ActionOutcome::Failed);
            }
        };
        let scheduled_at = prospect.next_eligible_at;

        // Precondition re-check: guards against stale schedules after an
        // external mark_replied (or any other transition) raced us.
        if !self.lifecycle.action_sources(kind).contains(&prospect.status) {
            info!(
                prospect_id = %prospect_id,
                status = ?prospect.status,
                kind = ?kind,
                "Stale schedule, skipping action"
            );
            metrics::counter!("executor.skipped").increment(1);
            return self.record(prospect_id, kind, scheduled_at, now, ActionOutcome::Skipped);
        }

        let campaign = match self.store.campaign(&prospect.campaign_id) {
            Some(c) => c,
            None => {
                warn!(campaign_id = %prospect.campaign_id, "Campaign missing for prospect");
                return self.record(prospect_id, kind, scheduled_at, now, ActionOutcome::Failed);
            }
        };
        let message = match kind {
            ActionKind::ConnectionRequest => &campaign.templates.connection,
            ActionKind::FollowUp => &campaign.templates.followup,
        };

        if let Err(e) = self.channel.deliver(&prospect, kind, message) {
            warn!(prospect_id = %prospect_id, error = %e, "Delivery failed");
            metrics::counter!("executor.failed").increment(1);
            return self.record(prospect_id, kind, scheduled_at, now, ActionOutcome::Failed);
        }

        let destination = self.lifecycle.action_destination(kind);
        match self
            .store
            .apply_transition(prospect_id, prospect.status, destination, now)
        {
            Ok(()) => {
                metrics::counter!("executor.sent").increment(1);
                self.record(prospect_id, kind, scheduled_at, now, ActionOutcome::Sent)
            }
            // The prospect moved between our read and the write (a reply
            // arriving mid-tick). Skip, never fail.
            Err(EngineError::StaleState { actual, .. }) => {
                info!(
                    prospect_id = %prospect_id,
                    actual = ?actual,
                    "Prospect changed underneath the send, skipping"
                );
                metrics::counter!("executor.skipped").increment(1);
                self.record(prospect_id, kind, scheduled_at, now, ActionOutcome::Skipped)
            }
            Err(e) => {
                warn!(prospect_id = %prospect_id, error = %e, "Transition failed after send");
                metrics::counter!("executor.failed").increment(1);
                self.record(prospect_id, kind, scheduled_at, now, ActionOutcome::Failed)
            }
        }
    }

    /// Action history for a prospect, oldest first.
    pub fn records_for(&self, prospect_id: &Uuid) -> Vec<ActionRecord> {
        self.records
            .get(prospect_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(
        &self,
        prospect_id: &Uuid,
        kind: ActionKind,
        scheduled_at: DateTime<Utc>,
        executed_at: DateTime<Utc>,
        outcome: ActionOutcome,
    ) -> ActionRecord {
        let record = ActionRecord {
            id: Uuid::new_v4(),
            prospect_id: *prospect_id,
            kind,
            scheduled_at,
            executed_at: Some(executed_at),
            outcome,
        };
        self.records
            .entry(*prospect_id)
            .or_default()
            .push(record.clone());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CaptureChannel;
    use leadflow_core::types::{Campaign, Prospect, ProspectStatus};

    fn setup() -> (ProspectStore, Arc<CaptureChannel>, ActionExecutor, Uuid) {
        let store = ProspectStore::new();
        let campaign_id = store.insert_campaign(Campaign::new("Test", "", 25));
        let channel = Arc::new(CaptureChannel::new());
        let executor = ActionExecutor::new(store.clone(), channel.clone());
        let prospect_id = store
            .insert_prospect(Prospect::new(campaign_id, "Ada", None, "Acme", "CTO"))
            .unwrap();
        (store, channel, executor, prospect_id)
    }

    #[test]
    fn test_connection_request_sends_and_transitions() {
        let (store, channel, executor, prospect_id) = setup();
        let now = Utc::now();

        let record = executor.execute(&prospect_id, ActionKind::ConnectionRequest, now);

        assert_eq!(record.outcome, ActionOutcome::Sent);
        assert_eq!(record.executed_at, Some(now));
        assert_eq!(channel.count(), 1);
        assert_eq!(
            store.prospect(&prospect_id).unwrap().status,
            ProspectStatus::Requested
        );
        assert_eq!(executor.records_for(&prospect_id).len(), 1);
    }

    #[test]
    fn test_reply_before_followup_yields_skipped() {
        let (store, channel, executor, prospect_id) = setup();
        let now = Utc::now();

        executor.execute(&prospect_id, ActionKind::ConnectionRequest, now);
        store.mark_replied(&prospect_id, now).unwrap();

        let record = executor.execute(&prospect_id, ActionKind::FollowUp, now);
        assert_eq!(record.outcome, ActionOutcome::Skipped);
        // No second delivery happened.
        assert_eq!(channel.count(), 1);
        assert_eq!(
            store.prospect(&prospect_id).unwrap().status,
            ProspectStatus::Replied
        );
    }

    #[test]
    fn test_followup_fires_from_accepted() {
        let (store, channel, executor, prospect_id) = setup();
        let now = Utc::now();

        executor.execute(&prospect_id, ActionKind::ConnectionRequest, now);
        store.mark_accepted(&prospect_id, now).unwrap();

        let record = executor.execute(&prospect_id, ActionKind::FollowUp, now);
        assert_eq!(record.outcome, ActionOutcome::Sent);
        assert_eq!(channel.count(), 2);
        assert_eq!(
            store.prospect(&prospect_id).unwrap().status,
            ProspectStatus::FollowupSent
        );
    }

    #[test]
    fn test_channel_failure_yields_failed_without_mutation() {
        let (store, channel, executor, prospect_id) = setup();
        channel.set_failing(true);

        let record = executor.execute(&prospect_id, ActionKind::ConnectionRequest, Utc::now());
        assert_eq!(record.outcome, ActionOutcome::Failed);
        assert_eq!(
            store.prospect(&prospect_id).unwrap().status,
            ProspectStatus::Pending
        );
        // The failed attempt is still on the record for retry accounting.
        assert_eq!(executor.records_for(&prospect_id).len(), 1);
    }
}
