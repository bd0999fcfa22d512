//! Outreach channel — the seam where a production binding (real network
//! delivery) would plug in. The engine only needs "deliver or fail";
//! a real implementation is expected to enforce its own send timeout and
//! surface expiry as an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use leadflow_core::types::{ActionKind, Prospect};
use leadflow_core::{EngineError, EngineResult};

/// Delivers one outbound message for a prospect.
pub trait OutreachChannel: Send + Sync {
    fn deliver(&self, prospect: &Prospect, kind: ActionKind, message: &str) -> EngineResult<()>;
}

/// Simulation channel: records nothing, just logs the send.
pub struct SimulatedChannel;

impl OutreachChannel for SimulatedChannel {
    fn deliver(&self, prospect: &Prospect, kind: ActionKind, _message: &str) -> EngineResult<()> {
        info!(
            prospect_id = %prospect.id,
            campaign_id = %prospect.campaign_id,
            kind = ?kind,
            "Simulated outbound send"
        );
        Ok(())
    }
}

/// Convenience: the default simulation channel.
pub fn simulated_channel() -> Arc<dyn OutreachChannel> {
    Arc::new(SimulatedChannel)
}

/// In-memory channel that captures deliveries for tests and can be
/// switched into a failing mode to exercise the failed-outcome path.
#[derive(Default)]
pub struct CaptureChannel {
    deliveries: Mutex<Vec<(Uuid, ActionKind)>>,
    failing: AtomicBool,
}

impl CaptureChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(Uuid, ActionKind)> {
        self.deliveries.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl OutreachChannel for CaptureChannel {
    fn deliver(&self, prospect: &Prospect, kind: ActionKind, _message: &str) -> EngineResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Execution("simulated delivery failure".to_string()));
        }
        self.deliveries.lock().push((prospect.id, kind));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_channel_records_and_fails() {
        let channel = CaptureChannel::new();
        let prospect = Prospect::new(Uuid::new_v4(), "Ada", None, "Acme", "CTO");

        channel
            .deliver(&prospect, ActionKind::ConnectionRequest, "hi")
            .unwrap();
        assert_eq!(channel.count(), 1);
        assert_eq!(channel.deliveries()[0].1, ActionKind::ConnectionRequest);

        channel.set_failing(true);
        assert!(channel
            .deliver(&prospect, ActionKind::FollowUp, "hi again")
            .is_err());
        assert_eq!(channel.count(), 1);
    }
}
