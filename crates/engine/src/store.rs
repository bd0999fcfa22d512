use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use leadflow_core::types::{Campaign, Prospect, ProspectStatus};
use leadflow_core::{EngineError, EngineResult};

use crate::lifecycle::ProspectLifecycle;

/// Campaign-scoped store for prospects and their lifecycle state. All
/// status mutation goes through `apply_transition`, which carries an
/// optimistic from-status check so two workers (or a worker and an
/// external reply signal) racing the same prospect cannot corrupt it.
#[derive(Clone)]
pub struct ProspectStore {
    campaigns: Arc<DashMap<Uuid, Campaign>>,
    prospects: Arc<DashMap<Uuid, Prospect>>,
    lifecycle: Arc<ProspectLifecycle>,
}

impl std::fmt::Debug for ProspectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProspectStore")
            .field("campaigns", &self.campaigns.len())
            .field("prospects", &self.prospects.len())
            .finish()
    }
}

impl ProspectStore {
    pub fn new() -> Self {
        Self {
            campaigns: Arc::new(DashMap::new()),
            prospects: Arc::new(DashMap::new()),
            lifecycle: Arc::new(ProspectLifecycle::new()),
        }
    }

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    pub fn insert_campaign(&self, campaign: Campaign) -> Uuid {
        let id = campaign.id;
        info!(campaign_id = %id, name = %campaign.name, "Registering campaign");
        self.campaigns.insert(id, campaign);
        id
    }

    pub fn campaign(&self, id: &Uuid) -> Option<Campaign> {
        self.campaigns.get(id).map(|r| r.clone())
    }

    pub fn list_campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> =
            self.campaigns.iter().map(|r| r.value().clone()).collect();
        campaigns.sort_by_key(|c| c.id);
        campaigns
    }

    pub fn set_running(&self, id: &Uuid, running: bool) -> EngineResult<()> {
        let mut entry = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("campaign {id}")))?;
        entry.running = running;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Prospects
    // ------------------------------------------------------------------

    /// Adds a prospect produced by the import feed. The campaign must exist.
    pub fn insert_prospect(&self, prospect: Prospect) -> EngineResult<Uuid> {
        if !self.campaigns.contains_key(&prospect.campaign_id) {
            return Err(EngineError::NotFound(format!(
                "campaign {}",
                prospect.campaign_id
            )));
        }
        let id = prospect.id;
        self.prospects.insert(id, prospect);
        Ok(id)
    }

    pub fn prospect(&self, id: &Uuid) -> Option<Prospect> {
        self.prospects.get(id).map(|r| r.clone())
    }

    /// All prospects of a campaign, ordered by prospect id so ticks process
    /// them deterministically.
    pub fn prospects_for(&self, campaign_id: &Uuid) -> Vec<Prospect> {
        let mut prospects: Vec<Prospect> = self
            .prospects
            .iter()
            .filter(|r| r.value().campaign_id == *campaign_id)
            .map(|r| r.value().clone())
            .collect();
        prospects.sort_by_key(|p| p.id);
        prospects
    }

    /// Schedulable prospects whose next-eligible time has passed, ordered
    /// by id. This is a snapshot; the executor re-checks status at fire time.
    pub fn eligible_prospects(&self, campaign_id: &Uuid, now: DateTime<Utc>) -> Vec<Prospect> {
        let mut prospects: Vec<Prospect> = self
            .prospects
            .iter()
            .filter(|r| {
                let p = r.value();
                p.campaign_id == *campaign_id
                    && p.status.is_schedulable()
                    && p.next_eligible_at <= now
            })
            .map(|r| r.value().clone())
            .collect();
        prospects.sort_by_key(|p| p.id);
        prospects
    }

    /// Returns `true` if any prospect of the campaign can still be scheduled.
    pub fn has_schedulable_prospects(&self, campaign_id: &Uuid) -> bool {
        self.prospects
            .iter()
            .any(|r| r.value().campaign_id == *campaign_id && r.value().status.is_schedulable())
    }

    /// Replied prospects across all campaigns, newest reply first.
    pub fn replied_inbox(&self) -> Vec<Prospect> {
        let mut replied: Vec<Prospect> = self
            .prospects
            .iter()
            .filter(|r| r.value().status == ProspectStatus::Replied)
            .map(|r| r.value().clone())
            .collect();
        replied.sort_by(|a, b| b.replied_at.cmp(&a.replied_at));
        replied
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Moves a prospect from `from` to `to`, stamping the stage timestamp.
    /// Fails with `StaleState` if the prospect's current status no longer
    /// matches `from`, and with `InvalidTransition` if the lifecycle table
    /// forbids the edge. All-or-nothing per prospect.
    pub fn apply_transition(
        &self,
        prospect_id: &Uuid,
        from: ProspectStatus,
        to: ProspectStatus,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut entry = self
            .prospects
            .get_mut(prospect_id)
            .ok_or_else(|| EngineError::NotFound(format!("prospect {prospect_id}")))?;

        if entry.status != from {
            return Err(EngineError::StaleState {
                prospect_id: *prospect_id,
                expected: from,
                actual: entry.status,
            });
        }
        if !self.lifecycle.can_transition(from, to) {
            return Err(EngineError::InvalidTransition { from, to });
        }

        entry.status = to;
        match to {
            ProspectStatus::Requested => entry.requested_at = Some(at),
            ProspectStatus::Accepted => entry.accepted_at = Some(at),
            ProspectStatus::FollowupSent => entry.followup_at = Some(at),
            ProspectStatus::Replied => entry.replied_at = Some(at),
            ProspectStatus::Pending => {}
        }

        info!(
            prospect_id = %prospect_id,
            from = ?from,
            to = ?to,
            "Prospect transitioned"
        );
        Ok(())
    }

    /// External signal: the prospect accepted the connection request.
    pub fn mark_accepted(&self, prospect_id: &Uuid, at: DateTime<Utc>) -> EngineResult<()> {
        self.apply_transition(prospect_id, ProspectStatus::Requested, ProspectStatus::Accepted, at)
    }

    /// External signal: a reply arrived. Permanently excludes the prospect
    /// from scheduling. The engine never originates this transition itself.
    ///
    /// Absorbs the reply-vs-tick race: if the scheduler moves the prospect
    /// between the status read and the write, the signal retries against
    /// the fresh status instead of surfacing `StaleState` to the caller.
    /// Statuses only move forward, so the retry loop is bounded.
    pub fn mark_replied(&self, prospect_id: &Uuid, at: DateTime<Utc>) -> EngineResult<()> {
        loop {
            let current = self
                .prospect(prospect_id)
                .ok_or_else(|| EngineError::NotFound(format!("prospect {prospect_id}")))?
                .status;
            match self.apply_transition(prospect_id, current, ProspectStatus::Replied, at) {
                Err(EngineError::StaleState { .. }) => continue,
                result => return result,
            }
        }
    }

    /// Advances the next-eligible time. Never moves it backwards: the
    /// schedule is monotone non-decreasing for the prospect's lifetime.
    pub fn set_next_eligible(&self, prospect_id: &Uuid, at: DateTime<Utc>) -> EngineResult<()> {
        let mut entry = self
            .prospects
            .get_mut(prospect_id)
            .ok_or_else(|| EngineError::NotFound(format!("prospect {prospect_id}")))?;
        if at > entry.next_eligible_at {
            entry.next_eligible_at = at;
        }
        Ok(())
    }

    pub fn set_pending_retry(&self, prospect_id: &Uuid, pending: bool) -> EngineResult<()> {
        let mut entry = self
            .prospects
            .get_mut(prospect_id)
            .ok_or_else(|| EngineError::NotFound(format!("prospect {prospect_id}")))?;
        entry.pending_retry = pending;
        Ok(())
    }
}

impl Default for ProspectStore {
    fn default() -> Self {
        Self::new()
    }
}
