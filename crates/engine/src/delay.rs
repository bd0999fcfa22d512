//! Delay policy — randomized, humanlike wait intervals between pipeline
//! stages. Injectable so tests can pin exact delays.

use chrono::Duration;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use leadflow_core::config::AutomationConfig;
use leadflow_core::{EngineError, EngineResult};

/// Computes wait intervals between pipeline stages.
pub trait DelayPolicy: Send + Sync {
    /// Delay before a connection request fires, staggering bursts.
    fn next_connection_delay(&self) -> Duration;
    /// Delay between a connection request and its follow-up.
    fn next_followup_delay(&self) -> Duration;
    /// Offset added past the day boundary when a rate-limited prospect is
    /// deferred, so deferred batches don't resume in lockstep.
    fn deferral_jitter(&self) -> Duration;
}

/// Production policy: connection delays uniform within a short window,
/// follow-ups around a multi-day baseline with bounded jitter. All
/// randomness comes from one seedable source so a fixed seed reproduces
/// the exact delay sequence.
pub struct HumanlikeDelayPolicy {
    connection_min_secs: u64,
    connection_max_secs: u64,
    followup_baseline: Duration,
    followup_jitter_secs: i64,
    rng: Mutex<StdRng>,
}

impl HumanlikeDelayPolicy {
    pub fn from_config(config: &AutomationConfig) -> EngineResult<Self> {
        if config.connection_delay_min_secs > config.connection_delay_max_secs {
            return Err(EngineError::Config(format!(
                "connection delay window is inverted: {}s > {}s",
                config.connection_delay_min_secs, config.connection_delay_max_secs
            )));
        }
        if config.connection_delay_max_secs == 0 {
            return Err(EngineError::Config(
                "connection delay window must be non-zero".to_string(),
            ));
        }
        if config.followup_jitter_hours >= config.followup_baseline_hours {
            return Err(EngineError::Config(format!(
                "follow-up jitter ({}h) must be smaller than the baseline ({}h)",
                config.followup_jitter_hours, config.followup_baseline_hours
            )));
        }

        let seed = config.rng_seed.unwrap_or_else(rand::random);
        Ok(Self {
            connection_min_secs: config.connection_delay_min_secs,
            connection_max_secs: config.connection_delay_max_secs,
            followup_baseline: Duration::hours(config.followup_baseline_hours as i64),
            followup_jitter_secs: (config.followup_jitter_hours * 3600) as i64,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }
}

impl DelayPolicy for HumanlikeDelayPolicy {
    fn next_connection_delay(&self) -> Duration {
        let secs = self
            .rng
            .lock()
            .gen_range(self.connection_min_secs..=self.connection_max_secs);
        Duration::seconds(secs as i64)
    }

    fn next_followup_delay(&self) -> Duration {
        let jitter = self
            .rng
            .lock()
            .gen_range(-self.followup_jitter_secs..=self.followup_jitter_secs);
        // Jitter is bounded below the baseline, so this never goes negative
        // and a follow-up can never precede its connection request.
        self.followup_baseline + Duration::seconds(jitter)
    }

    fn deferral_jitter(&self) -> Duration {
        self.next_connection_delay()
    }
}

/// Deterministic policy for tests.
pub struct FixedDelayPolicy {
    pub connection: Duration,
    pub followup: Duration,
    pub deferral: Duration,
}

impl FixedDelayPolicy {
    pub fn new(connection: Duration, followup: Duration, deferral: Duration) -> Self {
        Self {
            connection,
            followup,
            deferral,
        }
    }
}

impl DelayPolicy for FixedDelayPolicy {
    fn next_connection_delay(&self) -> Duration {
        self.connection
    }

    fn next_followup_delay(&self) -> Duration {
        self.followup
    }

    fn deferral_jitter(&self) -> Duration {
        self.deferral
    }
}
