//! REST implementation of the record gateway
//!
//! Authenticates with an OAuth password grant and talks to the
//! instance URL the grant names, which is usually not the login host.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::{CreateResult, Record, RecordGateway};
use crate::config::BackendConfig;
use crate::{Error, Result};

/// Access token and instance binding returned by a token login
#[derive(Debug, Clone, Deserialize)]
struct TokenGrant {
    access_token: String,
    instance_url: String,
}

/// One page of query results
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    records: Vec<Record>,
    done: bool,
    next_records_url: Option<String>,
}

/// Record gateway backed by the store's REST API
pub struct RestBackend {
    /// HTTP transport
    http: reqwest::Client,
    /// Connection settings
    config: BackendConfig,
    /// Cached grant, filled on first use
    grant: RwLock<Option<TokenGrant>>,
}

impl RestBackend {
    /// Create a new REST backend for the configured store
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(RestBackend {
            http,
            config,
            grant: RwLock::new(None),
        })
    }

    /// Current grant, performing the password login on first use
    async fn ensure_grant(&self) -> Result<TokenGrant> {
        if let Some(grant) = self.grant.read().await.as_ref() {
            return Ok(grant.clone());
        }
        let grant = self.token_login().await?;
        *self.grant.write().await = Some(grant.clone());
        Ok(grant)
    }

    async fn token_login(&self) -> Result<TokenGrant> {
        let url = format!("{}/services/oauth2/token", base_url(&self.config.host));
        // The store expects the security token appended to the password
        let password = format!(
            "{}{}",
            self.config.password.expose_secret(),
            self.config.security_token.expose_secret()
        );
        let params = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("username", self.config.username.as_str()),
            ("password", password.as_str()),
        ];

        debug!("requesting backend access token for {}", self.config.username);

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendOperationFailed(format!(
                "token login failed ({}): {}",
                status, body
            )));
        }

        let grant: TokenGrant = response.json().await?;
        info!("backend session established at {}", grant.instance_url);
        Ok(grant)
    }

    fn data_url(&self, grant: &TokenGrant, suffix: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            grant.instance_url, self.config.api_version, suffix
        )
    }
}

#[async_trait]
impl RecordGateway for RestBackend {
    async fn session_id(&self) -> Result<String> {
        let grant = self.ensure_grant().await?;
        Ok(grant.access_token)
    }

    async fn fetch_records(&self, query: &str) -> Result<Vec<Record>> {
        let grant = self.ensure_grant().await?;
        let mut records = Vec::new();

        let mut response = self
            .http
            .get(self.data_url(&grant, "query"))
            .query(&[("q", query)])
            .bearer_auth(&grant.access_token)
            .send()
            .await?;

        loop {
            let response_ok = ensure_success("query", response).await?;
            let page: QueryPage = response_ok.json().await?;
            records.extend(page.records);

            match (page.done, page.next_records_url) {
                (false, Some(next)) => {
                    response = self
                        .http
                        .get(format!("{}{}", grant.instance_url, next))
                        .bearer_auth(&grant.access_token)
                        .send()
                        .await?;
                }
                _ => break,
            }
        }

        debug!("query returned {} record(s)", records.len());
        Ok(records)
    }

    async fn create_record(
        &self,
        record_type: &str,
        fields: serde_json::Value,
    ) -> Result<CreateResult> {
        let grant = self.ensure_grant().await?;
        let url = self.data_url(&grant, &format!("sobjects/{}", record_type));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&grant.access_token)
            .json(&fields)
            .send()
            .await?;
        let response = ensure_success(&format!("create {}", record_type), response).await?;
        Ok(response.json().await?)
    }

    async fn update_record(
        &self,
        record_type: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<()> {
        let grant = self.ensure_grant().await?;
        let url = self.data_url(&grant, &format!("sobjects/{}/{}", record_type, id));
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&grant.access_token)
            .json(&fields)
            .send()
            .await?;
        ensure_success(&format!("update {}", record_type), response).await?;
        Ok(())
    }

    async fn delete_record(&self, record_type: &str, id: &str) -> Result<()> {
        let grant = self.ensure_grant().await?;
        let url = self.data_url(&grant, &format!("sobjects/{}/{}", record_type, id));
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&grant.access_token)
            .send()
            .await?;
        ensure_success(&format!("delete {}", record_type), response).await?;
        Ok(())
    }
}

fn base_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn ensure_success(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::BackendOperationFailed(format!(
        "{} failed ({}): {}",
        operation, status, body
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_backend(host: &str) -> RestBackend {
        RestBackend::new(BackendConfig {
            host: host.to_string(),
            client_id: "client".to_string(),
            client_secret: SecretString::from("shh"),
            username: "agent@example.test".to_string(),
            password: SecretString::from("pw"),
            security_token: SecretString::from("tok"),
            api_version: "59.0".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    async fn mount_token_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=agent%40example.test"))
            .and(body_string_contains("password=pwtok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "TOK-1",
                "instance_url": server.uri(),
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_token_login_appends_security_token_and_caches() {
        let server = MockServer::start().await;
        mount_token_login(&server).await;

        let backend = test_backend(&server.uri());
        assert_eq!(backend.session_id().await.unwrap(), "TOK-1");
        // Second call must reuse the cached grant; the mock expects one hit
        assert_eq!(backend.session_id().await.unwrap(), "TOK-1");
    }

    #[tokio::test]
    async fn test_rejected_token_login_is_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let err = backend.session_id().await.unwrap_err();
        match err {
            Error::BackendOperationFailed(message) => {
                assert!(message.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_records_follows_pagination() {
        let server = MockServer::start().await;
        mount_token_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/services/data/v59.0/query"))
            .and(query_param("q", "select id from messagingsession"))
            .and(header("Authorization", "Bearer TOK-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 2,
                "done": false,
                "nextRecordsUrl": "/services/data/v59.0/query/01g-2000",
                "records": [{"Id": "A"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/data/v59.0/query/01g-2000"))
            .and(header("Authorization", "Bearer TOK-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 2,
                "done": true,
                "records": [{"Id": "B"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let records = backend
            .fetch_records("select id from messagingsession")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Id"], "A");
        assert_eq!(records[1]["Id"], "B");
    }

    #[tokio::test]
    async fn test_create_record_posts_fields() {
        let server = MockServer::start().await;
        mount_token_login(&server).await;

        Mock::given(method("POST"))
            .and(path("/services/data/v59.0/sobjects/AgentWork"))
            .and(header("Authorization", "Bearer TOK-1"))
            .and(body_json(json!({"WorkItemId": "C1", "UserId": "U1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "0Bz1",
                "success": true,
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let result = backend
            .create_record("AgentWork", json!({"WorkItemId": "C1", "UserId": "U1"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.id.as_deref(), Some("0Bz1"));
    }

    #[tokio::test]
    async fn test_update_and_delete_address_the_record() {
        let server = MockServer::start().await;
        mount_token_login(&server).await;

        Mock::given(method("PATCH"))
            .and(path("/services/data/v59.0/sobjects/MessagingSession/0Mw1"))
            .and(body_json(json!({"OwnerId": "U1"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/services/data/v59.0/sobjects/PendingServiceRouting/0Ps1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        backend
            .update_record("MessagingSession", "0Mw1", json!({"OwnerId": "U1"}))
            .await
            .unwrap();
        backend
            .delete_record("PendingServiceRouting", "0Ps1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_crud_carries_operation_and_body() {
        let server = MockServer::start().await;
        mount_token_login(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/services/data/v59.0/sobjects/PendingServiceRouting/0Ps1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("ENTITY_IS_DELETED"))
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let err = backend
            .delete_record("PendingServiceRouting", "0Ps1")
            .await
            .unwrap_err();
        match err {
            Error::BackendOperationFailed(message) => {
                assert!(message.contains("delete PendingServiceRouting"));
                assert!(message.contains("ENTITY_IS_DELETED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
