//! Protocol session state for the chat gateway
//!
//! Owns the affinity token, session key and the per-session counters
//! every gateway request depends on. One session per process; requests
//! must be issued one at a time or the sequence series gets gaps.

use reqwest::header::{HeaderMap, HeaderValue};

use crate::gateway::types::SessionCredentials;
use crate::{Error, Result};

/// Header carrying the gateway API version, on every request
pub const HEADER_API_VERSION: &str = "X-API-VERSION";

/// Header carrying the affinity token binding the session to a gateway node
pub const HEADER_AFFINITY: &str = "X-AFFINITY";

/// Header carrying the session key issued at login
pub const HEADER_SESSION_KEY: &str = "X-SESSION-KEY";

/// Header carrying the per-session request sequence number
pub const HEADER_SEQUENCE: &str = "X-SEQUENCE";

/// Affinity sentinel the server requires on the initial login call
pub const NULL_AFFINITY: &str = "null";

/// Mutable protocol state for one gateway session.
///
/// Created unauthenticated; `establish` stores the credentials returned
/// by the login handshake. Every sequence-bearing request must draw its
/// header value from `next_sequence` immediately before dispatch so the
/// server observes a gap-free, strictly increasing series.
#[derive(Debug)]
pub struct ProtocolSession {
    host: String,
    api_version: String,
    affinity_token: Option<String>,
    session_key: Option<String>,
    sequence: u64,
    poll_count: u64,
    poll_retries: u32,
}

impl ProtocolSession {
    /// Create a fresh, unauthenticated session for the given gateway host
    pub fn new(host: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_version: api_version.into(),
            affinity_token: None,
            session_key: None,
            sequence: 1,
            poll_count: 0,
            poll_retries: 0,
        }
    }

    /// Gateway host this session is bound to
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full base URL for the gateway. Hosts are usually bare names and
    /// get https; an explicit scheme is kept as given.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host)
        }
    }

    /// Whether the login handshake has completed
    pub fn is_established(&self) -> bool {
        self.affinity_token.is_some() && self.session_key.is_some()
    }

    /// Store the credentials returned by the login handshake
    pub fn establish(&mut self, credentials: SessionCredentials) {
        self.affinity_token = Some(credentials.affinity_token);
        self.session_key = Some(credentials.key);
    }

    /// Session key issued at login, used to address the session itself
    pub fn session_key(&self) -> Result<&str> {
        self.session_key
            .as_deref()
            .ok_or(Error::SessionNotEstablished)
    }

    /// Headers sent with every gateway request
    pub fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_API_VERSION, header_value(&self.api_version)?);
        Ok(headers)
    }

    /// Headers for the unauthenticated login call. The server rejects a
    /// first request without the literal "null" affinity sentinel.
    pub fn login_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.base_headers()?;
        headers.insert(HEADER_AFFINITY, HeaderValue::from_static(NULL_AFFINITY));
        Ok(headers)
    }

    /// Headers for authenticated calls: base plus affinity and session key
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let affinity = self
            .affinity_token
            .as_deref()
            .ok_or(Error::SessionNotEstablished)?;
        let key = self.session_key()?;
        let mut headers = self.base_headers()?;
        headers.insert(HEADER_AFFINITY, header_value(affinity)?);
        headers.insert(HEADER_SESSION_KEY, header_value(key)?);
        Ok(headers)
    }

    /// Take the sequence value for the next sequence-bearing request.
    ///
    /// Returns the current counter and advances it, exactly once per
    /// request and regardless of how that request turns out. Calling
    /// this anywhere but immediately before dispatch desynchronizes
    /// the session.
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    /// Take the poll counter for the next poll call.
    ///
    /// Returns the current counter and advances it, on every issued
    /// poll whether it succeeds or not.
    pub fn next_poll_count(&mut self) -> u64 {
        let count = self.poll_count;
        self.poll_count += 1;
        count
    }

    /// Consecutive "not ready" poll responses since the last success
    pub fn poll_retries(&self) -> u32 {
        self.poll_retries
    }

    /// Record one more "not ready" poll response
    pub fn record_poll_retry(&mut self) {
        self.poll_retries += 1;
    }

    /// Reset the retry counter after a successful poll
    pub fn reset_poll_retries(&mut self) {
        self.poll_retries = 0;
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Config(format!("header value not representable: {:?}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established() -> ProtocolSession {
        let mut session = ProtocolSession::new("gateway.example.test", "60");
        session.establish(SessionCredentials {
            affinity_token: "aff-1".to_string(),
            key: "key-1".to_string(),
        });
        session
    }

    #[test]
    fn test_new_session_is_unestablished() {
        let session = ProtocolSession::new("gateway.example.test", "60");
        assert!(!session.is_established());
        assert!(matches!(
            session.auth_headers(),
            Err(Error::SessionNotEstablished)
        ));
        assert!(matches!(
            session.session_key(),
            Err(Error::SessionNotEstablished)
        ));
    }

    #[test]
    fn test_login_headers_carry_null_affinity() {
        let session = ProtocolSession::new("gateway.example.test", "60");
        let headers = session.login_headers().unwrap();
        assert_eq!(headers.get(HEADER_API_VERSION).unwrap(), "60");
        assert_eq!(headers.get(HEADER_AFFINITY).unwrap(), "null");
        assert!(headers.get(HEADER_SESSION_KEY).is_none());
    }

    #[test]
    fn test_auth_headers_after_establish() {
        let session = established();
        assert!(session.is_established());
        let headers = session.auth_headers().unwrap();
        assert_eq!(headers.get(HEADER_AFFINITY).unwrap(), "aff-1");
        assert_eq!(headers.get(HEADER_SESSION_KEY).unwrap(), "key-1");
        assert_eq!(headers.get(HEADER_API_VERSION).unwrap(), "60");
        assert_eq!(session.session_key().unwrap(), "key-1");
    }

    #[test]
    fn test_sequence_starts_at_one_and_is_gap_free() {
        let mut session = established();
        assert_eq!(session.next_sequence(), 1);
        assert_eq!(session.next_sequence(), 2);
        assert_eq!(session.next_sequence(), 3);
    }

    #[test]
    fn test_poll_count_starts_at_zero() {
        let mut session = established();
        assert_eq!(session.next_poll_count(), 0);
        assert_eq!(session.next_poll_count(), 1);
    }

    #[test]
    fn test_poll_retries_record_and_reset() {
        let mut session = established();
        assert_eq!(session.poll_retries(), 0);
        session.record_poll_retry();
        session.record_poll_retry();
        assert_eq!(session.poll_retries(), 2);
        session.reset_poll_retries();
        assert_eq!(session.poll_retries(), 0);
    }

    #[test]
    fn test_invalid_api_version_is_rejected() {
        let session = ProtocolSession::new("gateway.example.test", "6\n0");
        assert!(matches!(session.base_headers(), Err(Error::Config(_))));
    }

    #[test]
    fn test_base_url_derives_scheme() {
        let bare = ProtocolSession::new("gateway.example.test", "60");
        assert_eq!(bare.base_url(), "https://gateway.example.test");

        let explicit = ProtocolSession::new("http://127.0.0.1:9999/", "60");
        assert_eq!(explicit.base_url(), "http://127.0.0.1:9999");
    }
}
