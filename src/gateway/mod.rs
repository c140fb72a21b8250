//! Chat gateway protocol client
//!
//! One method per protocol operation, sharing a single HTTP transport
//! and one [`ProtocolSession`]. Operations must follow the session's
//! lifecycle:
//!
//! ```text
//! login ──► loginPresence ──► poll(-1) ──► acceptWork ──► poll(ack)
//!                                                             │
//!       deleteSession ◄── logout ◄── closeWork ◄── endConversation
//! ```
//!
//! Every authenticated call draws its sequence header from the session
//! immediately before dispatch, so issuing calls out of order (or from
//! two owners) desynchronizes the server's view. The client therefore
//! takes `&mut self` everywhere.

pub mod poller;
pub mod types;

use reqwest::header::HeaderValue;
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::RecordGateway;
use crate::config::GatewayConfig;
use crate::session::{ProtocolSession, HEADER_SEQUENCE};
use crate::{Error, Result};

pub use poller::MessagePoller;
pub use types::{
    AcceptWorkRequest, ChannelIdWithParam, CloseWorkRequest, ConversationEndRequest,
    MessagesEnvelope, PresenceLoginRequest, ProtocolMessage, SessionCredentials, WorkAssigned,
    WORK_ASSIGNED,
};

/// Channels the recovery agent registers for at presence login
const PRESENCE_CHANNEL_IDS: [&str; 3] = ["agent", "conversational", "lmagent"];

/// Nominal handling time in seconds reported when closing recovered work
const ACTIVE_TIME: u32 = 10;

/// Client for the chat gateway's long-poll HTTP protocol
pub struct GatewayClient {
    /// HTTP transport, shared across all operations
    http: reqwest::Client,
    /// Protocol state (affinity, session key, counters)
    session: ProtocolSession,
    /// Gateway settings
    config: GatewayConfig,
}

impl GatewayClient {
    /// Create a new gateway client for the configured host
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let session = ProtocolSession::new(&config.host, &config.api_version);
        Ok(GatewayClient {
            http,
            session,
            config,
        })
    }

    /// Protocol session state, read-only
    pub fn session(&self) -> &ProtocolSession {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut ProtocolSession {
        &mut self.session
    }

    /// Open a gateway session.
    ///
    /// Unauthenticated GET; the server requires the "null" affinity
    /// sentinel on this first call and answers with the affinity token
    /// and session key every later call must carry. No sequence header
    /// is sent.
    pub async fn login(&mut self) -> Result<()> {
        let url = format!(
            "{}/chat/rest/System/SessionId?SessionId.ClientType=lightning",
            self.session.base_url()
        );
        let headers = self.session.login_headers()?;

        debug!("logging in to chat gateway at {}", self.session.host());

        let response = self.http.get(&url).headers(headers).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthenticationFailed {
                status: status.as_u16(),
                body,
            });
        }

        let credentials: SessionCredentials = response.json().await?;
        self.session.establish(credentials);
        info!("chat gateway session established");
        Ok(())
    }

    /// Announce agent presence, making this session routable.
    ///
    /// The backend session id is fetched from the collaborator on every
    /// call because backend sessions can rotate underneath us.
    pub async fn login_presence(&mut self, backend: &impl RecordGateway) -> Result<()> {
        let session_id = backend.session_id().await?;
        let payload = PresenceLoginRequest {
            organization_id: self.config.organization_id.clone(),
            sfdc_session_id: session_id,
            status_id: self.config.status_id.clone(),
            channel_ids_with_param: presence_channels(),
        };
        self.post_sequenced("PresenceLogin", "/chat/rest/Presence/PresenceLogin", &payload)
            .await?;
        info!("agent presence established");
        Ok(())
    }

    /// Accept a routed work assignment
    pub async fn accept_work(&mut self, agent_work_id: &str, work_item_id: &str) -> Result<()> {
        let payload = AcceptWorkRequest {
            work_id: agent_work_id.to_string(),
            work_target_id: work_item_id.to_string(),
        };
        self.post_sequenced("AcceptWork", "/chat/rest/Presence/AcceptWork", &payload)
            .await
    }

    /// End the conversation behind an accepted work item
    pub async fn end_conversation(&mut self, channel_type: &str, work_item_id: &str) -> Result<()> {
        let payload = ConversationEndRequest {
            channel_type: channel_type.to_string(),
            work_id: work_item_id.to_string(),
        };
        self.post_sequenced(
            "ConversationEnd",
            "/chat/rest/Conversational/ConversationEnd",
            &payload,
        )
        .await
    }

    /// Close accepted work after its conversation has ended
    pub async fn close_work(&mut self, agent_work_id: &str, work_item_id: &str) -> Result<()> {
        let payload = CloseWorkRequest {
            work_id: agent_work_id.to_string(),
            work_target_id: work_item_id.to_string(),
            active_time: ACTIVE_TIME,
        };
        self.post_sequenced("CloseWork", "/chat/rest/Presence/CloseWork", &payload)
            .await
    }

    /// Withdraw agent presence
    pub async fn logout(&mut self) -> Result<()> {
        self.post_sequenced(
            "PresenceLogout",
            "/chat/rest/Presence/PresenceLogout",
            &serde_json::json!({}),
        )
        .await?;
        info!("agent presence withdrawn");
        Ok(())
    }

    /// Tear down the gateway session.
    ///
    /// Addressed by session key and carries no sequence header; the
    /// counter is left untouched since the session is being destroyed.
    pub async fn delete_session(&mut self) -> Result<()> {
        let url = format!(
            "{}/chat/rest/System/SessionId/{}",
            self.session.base_url(),
            self.session.session_key()?
        );
        let headers = self.session.auth_headers()?;

        debug!("deleting chat gateway session");

        let response = self.http.delete(&url).headers(headers).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GatewayRequestFailed {
                operation: "DeleteSession",
                status: status.as_u16(),
                body,
            });
        }

        info!("chat gateway session deleted");
        Ok(())
    }

    /// Issue one long-poll GET and return its raw status and body.
    ///
    /// Advances both the poll counter and the sequence counter whether
    /// or not the server had anything for us. Retry policy lives in
    /// [`MessagePoller`], not here.
    pub(crate) async fn poll_once(&mut self, ack: i64) -> Result<(reqwest::StatusCode, String)> {
        let poll_count = self.session.next_poll_count();
        let url = format!(
            "{}/chat/rest/System/Messages?ack={}&pc={}",
            self.session.base_url(),
            ack,
            poll_count
        );
        let mut headers = self.session.auth_headers()?;
        let sequence = self.session.next_sequence();
        headers.insert(HEADER_SEQUENCE, HeaderValue::from(sequence));

        debug!("polling for messages: ack={}, pc={}, sequence={}", ack, poll_count, sequence);

        let response = self.http.get(&url).headers(headers).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }

    /// Shared dispatch for the authenticated, sequence-bearing POSTs.
    ///
    /// The sequence counter advances here, immediately before the
    /// request goes out, and is not rolled back on failure: the server
    /// has potentially observed the value either way.
    async fn post_sequenced<T: Serialize>(
        &mut self,
        operation: &'static str,
        path: &str,
        payload: &T,
    ) -> Result<()> {
        let url = format!("{}{}", self.session.base_url(), path);
        let mut headers = self.session.auth_headers()?;
        let sequence = self.session.next_sequence();
        headers.insert(HEADER_SEQUENCE, HeaderValue::from(sequence));

        debug!("dispatching {} (sequence {})", operation, sequence);

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GatewayRequestFailed {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn presence_channels() -> Vec<ChannelIdWithParam> {
    PRESENCE_CHANNEL_IDS
        .iter()
        .map(|id| ChannelIdWithParam {
            channel_id: (*id).to_string(),
        })
        .collect()
}
