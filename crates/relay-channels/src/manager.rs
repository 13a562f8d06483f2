use std::collections::HashMap;

use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::{channel::Channel, error::ChannelError, types::ChannelStatus};

/// Reconnect schedule applied by [`ChannelManager::connect_all`].
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Attempts before the channel is skipped.
    pub max_attempts: u32,
    /// Jitter fraction applied to each delay (0.10 = up to +10 %).
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
            max_attempts: 10,
            jitter: 0.10,
        }
    }
}

/// Manages a collection of channel adapters.
///
/// Channels are stored by their [`Channel::name`] and can be connected,
/// disconnected, or queried as a group. The manager applies exponential
/// backoff with jitter when a channel connection fails.
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel + Send + Sync>>,
    backoff: Backoff,
}

impl ChannelManager {
    /// Create an empty manager with no registered channels.
    pub fn new() -> Self {
        Self::with_backoff(Backoff::default())
    }

    pub fn with_backoff(backoff: Backoff) -> Self {
        Self {
            channels: HashMap::new(),
            backoff,
        }
    }

    /// Register a channel adapter.
    ///
    /// If a channel with the same name is already registered it is replaced.
    pub fn register(&mut self, channel: Box<dyn Channel + Send + Sync>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Move every channel of `other` into this manager, replacing any with
    /// the same name.
    pub fn absorb(&mut self, other: ChannelManager) {
        for (_, channel) in other.channels {
            self.register(channel);
        }
    }

    /// Connect all registered channels.
    ///
    /// Each channel is connected sequentially. On failure, exponential backoff
    /// with jitter is applied up to `max_attempts` times before the error is
    /// logged and the channel is skipped.
    pub async fn connect_all(&mut self) {
        let backoff = self.backoff;
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "connecting channel");
            if let Err(e) = connect_with_backoff(name, channel.as_mut(), &backoff).await {
                error!(channel = %name, error = %e, "failed to connect channel after retries");
            }
        }
    }

    /// Disconnect all registered channels.
    ///
    /// Errors are logged but do not abort disconnection of remaining channels.
    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "disconnecting channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %name, error = %e, "error while disconnecting channel");
            }
        }
    }

    /// Return an immutable reference to the named channel, if it exists.
    pub fn get(&self, name: &str) -> Option<&(dyn Channel + Send + Sync)> {
        self.channels.get(name).map(|b| b.as_ref())
    }

    /// Return the current [`ChannelStatus`] for every registered channel.
    ///
    /// The returned `Vec` is sorted by channel name for deterministic output.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> = self
            .channels
            .iter()
            .map(|(name, ch)| (name.clone(), ch.status()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

async fn connect_with_backoff(
    name: &str,
    channel: &mut dyn Channel,
    backoff: &Backoff,
) -> Result<(), ChannelError> {
    let mut delay = backoff.base;
    let mut attempt = 1;

    loop {
        match channel.connect().await {
            Ok(()) => {
                info!(channel = %name, attempt, "channel connected successfully");
                return Ok(());
            }
            Err(e) if attempt >= backoff.max_attempts => return Err(e),
            Err(e) => {
                let total = delay + jitter(delay, backoff.jitter);
                warn!(
                    channel = %name,
                    attempt,
                    max = backoff.max_attempts,
                    error = %e,
                    retry_after_ms = total.as_millis() as u64,
                    "channel connect failed, retrying with backoff"
                );
                sleep(total).await;
                delay = (delay * 2).min(backoff.max);
                attempt += 1;
            }
        }
    }
}

/// Return a jitter offset in `0 .. fraction * base`.
///
/// Derived from the wall clock's sub-second nanos, avoiding a rand dependency.
fn jitter(base: Duration, fraction: f64) -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = (base.as_millis() as f64 * fraction) as u64;
    if max_jitter == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(nanos as u64 % max_jitter)
}
