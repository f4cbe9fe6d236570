/// Bus-level configuration for command dispatch and event redelivery.
///
/// Controls caller wait timeouts, concurrency limits, and the retry policy
/// for envelopes the transport rejected after a successful commit.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Default time a caller waits for a command before `CommandError::Timeout`.
    /// Per-registration overrides take precedence.
    pub default_command_timeout_ms: u64,
    /// Maximum number of concurrently executing commands before load shedding.
    pub max_concurrent_commands: u32,
    /// How many redelivery attempts a failed envelope gets before it is
    /// parked in the dead-letter buffer for manual replay.
    pub redelivery_max_attempts: u32,
    /// Base backoff between redelivery attempts; doubles per attempt.
    pub redelivery_base_backoff_ms: u64,
    /// Interval at which the redelivery worker checks for due envelopes.
    pub redelivery_tick_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_command_timeout_ms: 30_000,
            max_concurrent_commands: 1_000,
            redelivery_max_attempts: 5,
            redelivery_base_backoff_ms: 100,
            redelivery_tick_ms: 50,
        }
    }
}
