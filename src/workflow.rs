//! Stuck-conversation recovery workflow
//!
//! Drives the full lifecycle for each stuck conversation: take
//! ownership on the backend, clear any leftover routing, create the
//! work record, then walk the gateway through poll → accept → end →
//! close. Conversations are processed strictly one at a time; the
//! gateway session is single-tracked and cannot interleave work.

use serde_json::json;
use tracing::{debug, info};

use crate::backend::{Record, RecordGateway};
use crate::config::Config;
use crate::gateway::{GatewayClient, MessagePoller, WorkAssigned, WORK_ASSIGNED};
use crate::{Error, Result};

/// Query selecting conversations that never left routing, oldest first
pub const STUCK_CONVERSATIONS_QUERY: &str =
    "select id from messagingsession where status in ('New', 'Waiting', 'Active') \
     and starttime < yesterday order by starttime";

/// Conversation record type in the backend store
const CONVERSATION_RECORD_TYPE: &str = "MessagingSession";

/// Work record type created to route a conversation to the agent
const AGENT_WORK_RECORD_TYPE: &str = "AgentWork";

/// Routing record type that blocks new work while present
const PENDING_ROUTING_RECORD_TYPE: &str = "PendingServiceRouting";

/// Channel type of the conversations this workflow recovers
const CONVERSATION_CHANNEL_TYPE: &str = "lmagent";

/// Outcome of a recovery run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Conversations matched by the stuck query
    pub found: usize,
    /// Conversations driven through the full recovery lifecycle
    pub recovered: usize,
}

/// Recovers stuck conversations by impersonating an agent
pub struct RecoveryWorkflow<B: RecordGateway> {
    backend: B,
    client: GatewayClient,
    poller: MessagePoller,
    agent_user_id: String,
    service_channel_id: String,
}

impl<B: RecordGateway> RecoveryWorkflow<B> {
    /// Create a workflow over the given backend
    pub fn new(config: &Config, backend: B) -> Result<Self> {
        Ok(RecoveryWorkflow {
            backend,
            client: GatewayClient::new(config.gateway.clone())?,
            poller: MessagePoller::new(config.gateway.poll_retry_delay()),
            agent_user_id: config.workflow.agent_user_id.clone(),
            service_channel_id: config.workflow.service_channel_id.clone(),
        })
    }

    /// Fetch the stuck conversations without touching any of them
    pub async fn list_stuck(&self) -> Result<Vec<Record>> {
        self.backend.fetch_records(STUCK_CONVERSATIONS_QUERY).await
    }

    /// Recover stuck conversations, up to `limit` when given.
    ///
    /// One conversation's failure aborts the whole run; prior
    /// conversations stay recovered and nothing is rolled back.
    pub async fn run(&mut self, limit: Option<usize>) -> Result<RunSummary> {
        let stuck = self.backend.fetch_records(STUCK_CONVERSATIONS_QUERY).await?;
        let mut summary = RunSummary {
            found: stuck.len(),
            recovered: 0,
        };
        info!("found {} stuck conversation(s)", summary.found);

        self.client.login().await?;
        self.client.login_presence(&self.backend).await?;

        for conversation in stuck.into_iter().take(limit.unwrap_or(usize::MAX)) {
            let conversation_id = record_id(&conversation)?.to_string();
            self.recover(&conversation_id).await?;
            summary.recovered += 1;
        }

        self.client.logout().await?;
        self.client.delete_session().await?;

        info!(
            "recovery run complete: {}/{} conversation(s) recovered",
            summary.recovered, summary.found
        );
        Ok(summary)
    }

    /// Drive one conversation through reassign → route → accept → close
    async fn recover(&mut self, conversation_id: &str) -> Result<()> {
        info!("processing conversation {}", conversation_id);

        self.backend
            .update_record(
                CONVERSATION_RECORD_TYPE,
                conversation_id,
                json!({"OwnerId": self.agent_user_id}),
            )
            .await?;

        // A leftover routing record blocks new agent work for the item
        let pending = self
            .backend
            .fetch_records(&format!(
                "select id from pendingservicerouting where workitemid = '{}'",
                conversation_id
            ))
            .await?;
        if let Some(routing) = pending.first() {
            let routing_id = record_id(routing)?;
            self.backend
                .delete_record(PENDING_ROUTING_RECORD_TYPE, routing_id)
                .await?;
            info!(
                "deleted pending routing {} for conversation {}",
                routing_id, conversation_id
            );
        }

        let created = self
            .backend
            .create_record(
                AGENT_WORK_RECORD_TYPE,
                json!({
                    "WorkItemId": conversation_id,
                    "UserId": self.agent_user_id,
                    "OwnerId": self.agent_user_id,
                    "ServiceChannelId": self.service_channel_id,
                }),
            )
            .await?;
        if !created.success {
            return Err(Error::BackendOperationFailed(format!(
                "could not create {} for conversation {}",
                AGENT_WORK_RECORD_TYPE, conversation_id
            )));
        }
        debug!(
            "created {} {}",
            AGENT_WORK_RECORD_TYPE,
            created.id.as_deref().unwrap_or("<no id>")
        );

        let envelope = self.poller.poll(&mut self.client, -1).await?;
        let next_ack = envelope.sequence;
        let assignment: WorkAssigned = envelope
            .find(WORK_ASSIGNED)
            .ok_or_else(|| {
                Error::ProtocolInvariantViolation(format!(
                    "expected {} message not found",
                    WORK_ASSIGNED
                ))
            })?
            .decode()?;
        info!(
            "assigned work {} targeting {}",
            assignment.work_id, assignment.work_target_id
        );

        self.client
            .accept_work(&assignment.work_id, &assignment.work_target_id)
            .await?;

        // Drain the accept's notifications to advance the ack cursor;
        // their contents are not needed.
        self.poller.poll(&mut self.client, next_ack).await?;

        self.client
            .end_conversation(CONVERSATION_CHANNEL_TYPE, &assignment.work_target_id)
            .await?;
        self.client
            .close_work(&assignment.work_id, &assignment.work_target_id)
            .await?;

        info!("conversation {} recovered", conversation_id);
        Ok(())
    }
}

fn record_id(record: &Record) -> Result<&str> {
    record["Id"]
        .as_str()
        .ok_or_else(|| Error::BackendOperationFailed("record missing Id field".to_string()))
}
