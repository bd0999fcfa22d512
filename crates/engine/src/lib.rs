pub mod channel;
pub mod delay;
pub mod executor;
pub mod lifecycle;
pub mod rate_limit;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use channel::{simulated_channel, OutreachChannel, SimulatedChannel};
pub use delay::{DelayPolicy, FixedDelayPolicy, HumanlikeDelayPolicy};
pub use executor::ActionExecutor;
pub use lifecycle::ProspectLifecycle;
pub use rate_limit::DailyRateLimiter;
pub use scheduler::{AutomationEngine, TickSummary};
pub use stats::StatsAggregator;
pub use store::ProspectStore;
