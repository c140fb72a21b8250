//! Backend record store access
//!
//! The recovery workflow reads and mutates conversation, routing and
//! work records held in a CRM-like record store. This module defines
//! the interface the workflow consumes plus its REST implementation.

pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use rest::RestBackend;

/// A record as returned by a query. Field sets vary by record type, so
/// records stay loose JSON and callers pick out what they need.
pub type Record = serde_json::Value;

/// Outcome of a record creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    /// Whether the record was created
    pub success: bool,
    /// Id of the created record
    pub id: Option<String>,
}

/// CRUD access to the backend record store
#[async_trait]
pub trait RecordGateway: Send + Sync {
    /// Current backend session id. Callers must not cache it; sessions
    /// can rotate between calls.
    async fn session_id(&self) -> Result<String>;

    /// Run a query and return every matching record
    async fn fetch_records(&self, query: &str) -> Result<Vec<Record>>;

    /// Create a record of the given type
    async fn create_record(
        &self,
        record_type: &str,
        fields: serde_json::Value,
    ) -> Result<CreateResult>;

    /// Update fields on an existing record
    async fn update_record(
        &self,
        record_type: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<()>;

    /// Delete a record
    async fn delete_record(&self, record_type: &str, id: &str) -> Result<()>;
}
