//! Long-poll message acknowledgement loop

use std::time::Duration;

use tracing::{debug, warn};

use crate::gateway::types::MessagesEnvelope;
use crate::gateway::GatewayClient;
use crate::{Error, Result};

/// Consecutive "not ready" responses tolerated before giving up on an ack
const MAX_POLL_RETRIES: u32 = 3;

/// Drives the gateway's long-poll acknowledgement loop.
///
/// The server holds each poll open until messages exist or a server-side
/// timeout elapses. A 200 carries a message envelope; any other 2xx
/// means "nothing yet, re-issue the same ack". Re-issues are bounded, so
/// one ack value costs at most `MAX_POLL_RETRIES` + 1 HTTP calls before
/// the poller gives up.
pub struct MessagePoller {
    /// Pause between "not ready" retries; zero re-polls immediately
    retry_delay: Duration,
}

impl MessagePoller {
    /// Create a poller with the given inter-retry delay
    pub fn new(retry_delay: Duration) -> Self {
        MessagePoller { retry_delay }
    }

    /// Acknowledge `ack` and wait for the next batch of messages.
    ///
    /// The returned envelope's `sequence` is the ack value for the next
    /// call. Pass -1 for the first poll of a session.
    pub async fn poll(&self, client: &mut GatewayClient, ack: i64) -> Result<MessagesEnvelope> {
        loop {
            let (status, body) = client.poll_once(ack).await?;

            if status.as_u16() >= 300 {
                warn!("poll for ack {} failed ({}): {}", ack, status, body);
                return Err(Error::GatewayRequestFailed {
                    operation: "Messages",
                    status: status.as_u16(),
                    body,
                });
            }

            if status.as_u16() == 200 {
                client.session_mut().reset_poll_retries();
                let envelope: MessagesEnvelope = serde_json::from_str(&body)?;
                debug!(
                    "poll for ack {} returned {} message(s), next ack {}",
                    ack,
                    envelope.messages.len(),
                    envelope.sequence
                );
                return Ok(envelope);
            }

            let retries = client.session().poll_retries();
            if retries >= MAX_POLL_RETRIES {
                return Err(Error::PollExhausted { ack });
            }
            client.session_mut().record_poll_retry();
            warn!("could not ack sequence {}, retrying (retry count: {})", ack, retries);

            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }
}
