/// Server-level configuration for the operation pipeline and the task broker.
///
/// Controls handler timeouts, concurrency limits, and broker worker sizing.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upper bound on one synchronous handler call, in milliseconds.
    /// `None` lets slow handlers run to completion.
    ///
    /// The deadline is only observed when the handler yields at an `.await`;
    /// a handler that blocks its thread runs past it.
    pub handler_timeout_ms: Option<u64>,
    /// Maximum number of concurrent operations before load shedding.
    pub max_concurrent_operations: u32,
    /// Number of broker worker tasks executing queued notifications.
    pub broker_workers: usize,
    /// Bounded queue length per broker worker.
    pub broker_queue_capacity: usize,
    /// Interval between broker maintenance ticks in milliseconds.
    pub broker_tick_interval_ms: u64,
    /// Largest encoded task message the broker accepts, in bytes.
    pub broker_max_message_bytes: usize,
    /// How long a finished task keeps its result, in milliseconds. After
    /// that the task still reports its terminal state, without the result.
    /// `None` keeps results for the life of the process.
    pub result_ttl_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: Some(30_000),
            max_concurrent_operations: 1000,
            broker_workers: 4,
            broker_queue_capacity: 256,
            broker_tick_interval_ms: 60_000,
            broker_max_message_bytes: 1024 * 1024,
            result_ttl_ms: None,
        }
    }
}
