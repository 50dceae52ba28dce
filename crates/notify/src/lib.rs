//! Notification system for faultline platform events.
//!
//! Fire-and-forget by design: the pipeline never waits on or fails with a
//! notification. Channels are trait objects behind [`NotifyChannel`]; the
//! built-in channel posts Google-Chat-style webhook cards.

pub mod channels;
pub mod error;
pub mod events;

pub use channels::gchat::GChatChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Central notification dispatcher.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Auto-detect configured channels from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let gchat = GChatChannel::from_env();
        if gchat.enabled() {
            info!("gchat notifications enabled");
            channels.push(Arc::new(gchat));
        }

        if channels.is_empty() {
            warn!("no notification channels configured");
        }

        Self { channels, disabled: false }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self { channels, disabled: false }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self { channels: vec![], disabled: true }
    }

    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Send to all enabled channels without waiting; errors are logged.
    pub fn notify(&self, event: NotifyEvent) {
        if self.disabled || self.channels.is_empty() {
            debug!("notifications disabled or unconfigured, skipping event");
            return;
        }

        let event = Arc::new(event);
        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                if !channel.enabled() {
                    return;
                }
                match channel.send(&event).await {
                    Ok(()) => debug!(channel = channel.name(), "notification sent"),
                    Err(e) => error!(
                        channel = channel.name(),
                        error = %e,
                        "failed to send notification"
                    ),
                }
            });
        }
    }

    /// Send and wait for every channel, collecting the per-channel result.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        let mut results = vec![];
        for channel in &self.channels {
            let name = channel.name().to_string();
            let result = channel.send(&event).await;
            results.push((name, result));
        }
        results
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}
