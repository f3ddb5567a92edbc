//! Immutable rows read from a client database (§3 SourceItem).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single row read from one client's source database.
///
/// Produced once by the worker's read stage and never mutated afterward;
/// it is owned by its worker for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceItem {
    /// Opaque identifier within the source database, not unique across databases.
    pub source_ref: String,
    /// Business key (article code, nomenclature code, etc).
    pub code: String,
    /// Raw, unnormalized name as stored by the client.
    pub raw_name: String,
    /// Free-form attributes carried through to the merged Group.
    pub attributes: HashMap<String, String>,
}

impl SourceItem {
    pub fn new(source_ref: impl Into<String>, code: impl Into<String>, raw_name: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            code: code.into(),
            raw_name: raw_name.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Which normalization pipeline a database's items should run through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProjectType {
    Nomenclature,
    Counterparty,
}

/// Minimal client-project descriptor, read from the external DAL (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProject {
    pub client_id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub project_type: ClientProjectType,
}

/// One source database belonging to a project (§6.1 `GetProjectDatabases`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub active: bool,
}
