use std::time::Duration;

use ecprims_proto::backoff::DEFAULT_TIMEOUT;
use ecprims_proto::layout::{MEMMAP_BASE, MEMMAP_FALLBACK_BASE};
use ecprims_proto::BackoffConfig;

use crate::lock::LockTimeout;

/// Configuration for negotiating and driving a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Memory-map bases to probe for the `"EC"` signature, in order.
    pub memmap_bases: Vec<u16>,
    /// Busy-wait bound for one exchange.
    pub command_timeout: Duration,
    /// How long to wait for the exchange lock.
    pub lock_timeout: LockTimeout,
    /// Busy-flag polling schedule. Its `timeout` is replaced by
    /// `command_timeout`.
    pub backoff: BackoffConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            memmap_bases: vec![MEMMAP_BASE, MEMMAP_FALLBACK_BASE],
            command_timeout: DEFAULT_TIMEOUT,
            lock_timeout: LockTimeout::Forever,
            backoff: BackoffConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Polling schedule bounded by the exchange timeout.
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            timeout: self.command_timeout,
            ..self.backoff.clone()
        }
    }
}
