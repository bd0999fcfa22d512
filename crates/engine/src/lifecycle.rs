use leadflow_core::types::{ActionKind, ProspectStatus};

/// Describes a single valid status transition for a prospect.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub from: ProspectStatus,
    pub to: ProspectStatus,
    pub trigger: &'static str,
}

/// Guards the prospect lifecycle by enforcing a finite set of valid
/// transitions. Transitions are strictly forward, except `replied` which
/// overrides any non-terminal state once the external reply signal lands.
#[derive(Debug, Clone)]
pub struct ProspectLifecycle {
    transitions: Vec<StatusTransition>,
}

impl ProspectLifecycle {
    pub fn new() -> Self {
        let transitions = vec![
            StatusTransition {
                from: ProspectStatus::Pending,
                to: ProspectStatus::Requested,
                trigger: "send_connection",
            },
            StatusTransition {
                from: ProspectStatus::Requested,
                to: ProspectStatus::Accepted,
                trigger: "connection_accepted",
            },
            StatusTransition {
                from: ProspectStatus::Requested,
                to: ProspectStatus::FollowupSent,
                trigger: "send_followup",
            },
            StatusTransition {
                from: ProspectStatus::Accepted,
                to: ProspectStatus::FollowupSent,
                trigger: "send_followup",
            },
            // Reply override, reachable from every non-terminal post-send state.
            StatusTransition {
                from: ProspectStatus::Requested,
                to: ProspectStatus::Replied,
                trigger: "reply_received",
            },
            StatusTransition {
                from: ProspectStatus::Accepted,
                to: ProspectStatus::Replied,
                trigger: "reply_received",
            },
            StatusTransition {
                from: ProspectStatus::FollowupSent,
                to: ProspectStatus::Replied,
                trigger: "reply_received",
            },
        ];

        Self { transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: ProspectStatus, to: ProspectStatus) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// The next action the scheduler should fire for a prospect in `status`,
    /// or `None` if the prospect is done as far as the engine is concerned.
    pub fn next_action(&self, status: ProspectStatus) -> Option<ActionKind> {
        match status {
            ProspectStatus::Pending => Some(ActionKind::ConnectionRequest),
            ProspectStatus::Requested | ProspectStatus::Accepted => Some(ActionKind::FollowUp),
            ProspectStatus::FollowupSent | ProspectStatus::Replied => None,
        }
    }

    /// Statuses from which `kind` may legally fire. Used by the executor to
    /// re-check preconditions just before a send.
    pub fn action_sources(&self, kind: ActionKind) -> &'static [ProspectStatus] {
        match kind {
            ActionKind::ConnectionRequest => &[ProspectStatus::Pending],
            ActionKind::FollowUp => &[ProspectStatus::Requested, ProspectStatus::Accepted],
        }
    }

    /// The status a successful `kind` send moves the prospect into.
    pub fn action_destination(&self, kind: ActionKind) -> ProspectStatus {
        match kind {
            ActionKind::ConnectionRequest => ProspectStatus::Requested,
            ActionKind::FollowUp => ProspectStatus::FollowupSent,
        }
    }
}

impl Default for ProspectLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
