use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An outreach campaign owning a set of prospects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub templates: CampaignTemplates,
    /// Maximum outbound actions charged against this campaign per UTC day.
    pub daily_limit: u32,
    pub running: bool,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, description: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            templates: CampaignTemplates::default(),
            daily_limit,
            running: false,
            created_at: Utc::now(),
        }
    }
}

/// Message templates with `{{Tag}}` placeholders. Rendering happens
/// upstream; the engine treats these as opaque text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignTemplates {
    pub connection: String,
    pub followup: String,
}

impl Default for CampaignTemplates {
    fn default() -> Self {
        Self {
            connection: "Hi {{First Name}}, loved what {{Company Name}} is doing — would be great to connect!".to_string(),
            followup: "Hey {{First Name}}, circling back on my request. As {{Job Title}} at {{Company Name}}, would value your perspective.".to_string(),
        }
    }
}

/// Lifecycle status of a prospect within its campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStatus {
    Pending,
    Requested,
    Accepted,
    FollowupSent,
    Replied,
}

impl ProspectStatus {
    /// Whether the scheduler still has an action to originate for this
    /// status. `followup_sent` is not schedulable but can still accept a
    /// late `replied` override.
    pub fn is_schedulable(&self) -> bool {
        matches!(
            self,
            ProspectStatus::Pending | ProspectStatus::Requested | ProspectStatus::Accepted
        )
    }
}

/// A single person targeted by a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub company_name: String,
    pub job_title: String,
    pub status: ProspectStatus,
    pub requested_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub followup_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    /// Earliest instant the scheduler may fire the next action.
    /// Monotonically non-decreasing over the prospect's lifetime.
    pub next_eligible_at: DateTime<Utc>,
    /// Set when the last attempt failed after quota was already charged;
    /// the next attempt bypasses the rate limiter exactly once.
    pub pending_retry: bool,
    pub created_at: DateTime<Utc>,
}

impl Prospect {
    pub fn new(
        campaign_id: Uuid,
        first_name: impl Into<String>,
        last_name: Option<String>,
        company_name: impl Into<String>,
        job_title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            first_name: first_name.into(),
            last_name,
            company_name: company_name.into(),
            job_title: job_title.into(),
            status: ProspectStatus::Pending,
            requested_at: None,
            accepted_at: None,
            followup_at: None,
            replied_at: None,
            next_eligible_at: now,
            pending_retry: false,
            created_at: now,
        }
    }
}

/// The kind of outbound action the engine performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ConnectionRequest,
    FollowUp,
}

/// How an attempted action concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Sent,
    Skipped,
    Failed,
}

/// Audit record of one attempted action against a prospect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub kind: ActionKind,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub outcome: ActionOutcome,
}

/// Dashboard counters derived from a campaign's prospects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign_id: Uuid,
    pub total: u64,
    pub requests_sent: u64,
    pub followups_sent: u64,
    pub connections_accepted: u64,
    pub replies_received: u64,
    pub pending: u64,
}
