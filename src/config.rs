use std::time::Duration;

use serde::Deserialize;

/// Tuning for the catch-up of failing partitions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatchupConfig {
    /// Zero-delay retries of one event within a single pass before the
    /// partition is parked until an administrative skip
    pub max_immediate_retries: u32,
}

impl Default for CatchupConfig {
    fn default() -> Self {
        Self {
            max_immediate_retries: 5,
        }
    }
}

/// Tuning for a scoped stream processor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Events fetched from the stream per round trip
    #[serde(deserialize_with = "non_zero")]
    pub batch_size: usize,
    /// Sleep between polls when there is nothing to process
    #[serde(with = "duration_millis")]
    pub idle_poll_interval: Duration,
    pub catchup: CatchupConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_poll_interval: Duration::from_millis(500),
            catchup: CatchupConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    pub fn with_max_immediate_retries(mut self, retries: u32) -> Self {
        self.catchup.max_immediate_retries = retries;
        self
    }
}

/// Timeouts of a reverse-call connection to a remote processor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// How long a client has to register after connecting
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,
    /// Silence after which the client is considered gone
    #[serde(with = "duration_millis")]
    pub ping_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RemoteConfig {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_ping(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn non_zero<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match usize::deserialize(deserializer)? {
        0 => Err(serde::de::Error::custom("batch_size must be at least 1")),
        value => Ok(value),
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
