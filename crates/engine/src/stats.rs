//! Stats aggregation — dashboard counters derived from current prospect
//! states, recomputed on demand straight off the store.

use uuid::Uuid;

use leadflow_core::types::{CampaignStats, ProspectStatus};

use crate::store::ProspectStore;

#[derive(Clone, Debug)]
pub struct StatsAggregator {
    store: ProspectStore,
}

impl StatsAggregator {
    pub fn new(store: ProspectStore) -> Self {
        Self { store }
    }

    /// Counters use the stage timestamps rather than the current status, so
    /// a prospect that replied after a follow-up still counts toward both
    /// `requests_sent` and `followups_sent`.
    pub fn campaign_stats(&self, campaign_id: &Uuid) -> CampaignStats {
        let mut stats = CampaignStats {
            campaign_id: *campaign_id,
            total: 0,
            requests_sent: 0,
            followups_sent: 0,
            connections_accepted: 0,
            replies_received: 0,
            pending: 0,
        };

        for prospect in self.store.prospects_for(campaign_id) {
            stats.total += 1;
            if prospect.status == ProspectStatus::Pending {
                stats.pending += 1;
            }
            if prospect.requested_at.is_some() {
                stats.requests_sent += 1;
            }
            if prospect.followup_at.is_some() {
                stats.followups_sent += 1;
            }
            if prospect.accepted_at.is_some() {
                stats.connections_accepted += 1;
            }
            if prospect.replied_at.is_some() {
                stats.replies_received += 1;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadflow_core::types::{Campaign, Prospect};

    #[test]
    fn test_stats_reflect_stage_timestamps() {
        let store = ProspectStore::new();
        let campaign_id = store.insert_campaign(Campaign::new("Test", "", 25));
        let aggregator = StatsAggregator::new(store.clone());
        let now = Utc::now();

        // One untouched prospect.
        store
            .insert_prospect(Prospect::new(campaign_id, "A", None, "Acme", "VP"))
            .unwrap();

        // One requested, then accepted, then replied.
        let p = store
            .insert_prospect(Prospect::new(campaign_id, "B", None, "Globex", "VP"))
            .unwrap();
        store
            .apply_transition(&p, ProspectStatus::Pending, ProspectStatus::Requested, now)
            .unwrap();
        store.mark_accepted(&p, now).unwrap();
        store.mark_replied(&p, now).unwrap();

        // One that got the full follow-up.
        let q = store
            .insert_prospect(Prospect::new(campaign_id, "C", None, "Initech", "VP"))
            .unwrap();
        store
            .apply_transition(&q, ProspectStatus::Pending, ProspectStatus::Requested, now)
            .unwrap();
        store
            .apply_transition(&q, ProspectStatus::Requested, ProspectStatus::FollowupSent, now)
            .unwrap();

        let stats = aggregator.campaign_stats(&campaign_id);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.requests_sent, 2);
        assert_eq!(stats.followups_sent, 1);
        assert_eq!(stats.connections_accepted, 1);
        assert_eq!(stats.replies_received, 1);
    }

    #[test]
    fn test_empty_campaign_all_zero() {
        let store = ProspectStore::new();
        let campaign_id = store.insert_campaign(Campaign::new("Empty", "", 25));
        let stats = StatsAggregator::new(store).campaign_stats(&campaign_id);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.requests_sent, 0);
    }
}
