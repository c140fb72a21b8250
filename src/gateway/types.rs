//! Chat gateway wire types
//!
//! Request and response bodies in the gateway's JSON vocabulary.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Message type announcing that routed work was assigned to this agent
pub const WORK_ASSIGNED: &str = "Presence/WorkAssigned";

// ============================================================================
// Session handshake
// ============================================================================

/// Credentials returned by the login handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    /// Affinity token binding the session to a gateway node
    pub affinity_token: String,
    /// Session key addressing the session itself
    pub key: String,
}

// ============================================================================
// Polled messages
// ============================================================================

/// One protocol message delivered by the long poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMessage {
    /// Message type, e.g. "Presence/WorkAssigned"
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload, kept opaque until a caller needs it
    #[serde(default)]
    pub message: serde_json::Value,
}

impl ProtocolMessage {
    /// Decode the payload into a typed message body
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.message.clone())?)
    }
}

/// Envelope returned by a successful poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesEnvelope {
    /// The next ack value to send
    pub sequence: i64,
    /// Messages in server delivery order
    #[serde(default)]
    pub messages: Vec<ProtocolMessage>,
}

impl MessagesEnvelope {
    /// First message of the given type, if any
    pub fn find(&self, kind: &str) -> Option<&ProtocolMessage> {
        self.messages.iter().find(|m| m.kind == kind)
    }
}

/// Payload of a work-assignment message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkAssigned {
    /// Gateway-assigned work id
    pub work_id: String,
    /// Backend record the work targets
    pub work_target_id: String,
}

// ============================================================================
// Request payloads
// ============================================================================

/// Presence login request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceLoginRequest {
    /// Organization the agent belongs to
    pub organization_id: String,
    /// Backend session id, fetched fresh at call time
    pub sfdc_session_id: String,
    /// Presence status that marks the agent online
    pub status_id: String,
    /// Channels the agent serves
    pub channel_ids_with_param: Vec<ChannelIdWithParam>,
}

/// Channel selector entry for the presence login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdWithParam {
    /// Channel identifier
    pub channel_id: String,
}

/// Work accept request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptWorkRequest {
    /// Gateway work id from the assignment message
    pub work_id: String,
    /// Backend record the work targets
    pub work_target_id: String,
}

/// Conversation end request. The gateway reuses the `workId` field name
/// here for the conversation record id, not the gateway work id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEndRequest {
    /// Conversation channel type
    pub channel_type: String,
    /// Backend record id of the conversation being ended
    pub work_id: String,
}

/// Work close request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseWorkRequest {
    /// Gateway work id
    pub work_id: String,
    /// Backend record the work targets
    pub work_target_id: String,
    /// Handling time in seconds reported to the gateway
    pub active_time: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_credentials_from_login_body() {
        let body = json!({
            "key": "K1",
            "id": "session-id",
            "affinityToken": "A1",
            "clientPollTimeout": 40
        });
        let credentials: SessionCredentials = serde_json::from_value(body).unwrap();
        assert_eq!(credentials.affinity_token, "A1");
        assert_eq!(credentials.key, "K1");
    }

    #[test]
    fn test_envelope_find_returns_first_of_kind() {
        let envelope: MessagesEnvelope = serde_json::from_value(json!({
            "sequence": 5,
            "messages": [
                {"type": "Presence/PresenceStatusChanged", "message": {}},
                {"type": "Presence/WorkAssigned", "message": {"workId": "W1", "workTargetId": "C1"}},
                {"type": "Presence/WorkAssigned", "message": {"workId": "W2", "workTargetId": "C2"}}
            ]
        }))
        .unwrap();

        assert_eq!(envelope.sequence, 5);
        let found = envelope.find(WORK_ASSIGNED).unwrap();
        let assigned: WorkAssigned = found.decode().unwrap();
        assert_eq!(assigned.work_id, "W1");
        assert_eq!(assigned.work_target_id, "C1");
        assert!(envelope.find("LmAgent/ChatRequest").is_none());
    }

    #[test]
    fn test_envelope_tolerates_missing_messages() {
        let envelope: MessagesEnvelope = serde_json::from_value(json!({"sequence": 2})).unwrap();
        assert!(envelope.messages.is_empty());
        assert!(envelope.find(WORK_ASSIGNED).is_none());
    }

    #[test]
    fn test_presence_login_request_field_names() {
        let request = PresenceLoginRequest {
            organization_id: "00D1".to_string(),
            sfdc_session_id: "sid".to_string(),
            status_id: "0N51".to_string(),
            channel_ids_with_param: vec![ChannelIdWithParam {
                channel_id: "agent".to_string(),
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "organizationId": "00D1",
                "sfdcSessionId": "sid",
                "statusId": "0N51",
                "channelIdsWithParam": [{"channelId": "agent"}]
            })
        );
    }

    #[test]
    fn test_work_request_field_names() {
        let accept = serde_json::to_value(AcceptWorkRequest {
            work_id: "W1".to_string(),
            work_target_id: "C1".to_string(),
        })
        .unwrap();
        assert_eq!(accept, json!({"workId": "W1", "workTargetId": "C1"}));

        let end = serde_json::to_value(ConversationEndRequest {
            channel_type: "lmagent".to_string(),
            work_id: "C1".to_string(),
        })
        .unwrap();
        assert_eq!(end, json!({"channelType": "lmagent", "workId": "C1"}));

        let close = serde_json::to_value(CloseWorkRequest {
            work_id: "W1".to_string(),
            work_target_id: "C1".to_string(),
            active_time: 10,
        })
        .unwrap();
        assert_eq!(
            close,
            json!({"workId": "W1", "workTargetId": "C1", "activeTime": 10})
        );
    }
}
