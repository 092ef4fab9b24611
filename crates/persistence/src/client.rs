//! ScyllaDB connection wrapper shared by every store in this crate.

use std::sync::Arc;

use scylla::{Session, SessionBuilder};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::schema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            hosts: std::env::var("SCYLLA_HOSTS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()]),
            keyspace: std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "call_audit".to_string()),
            replication_factor: 1,
        }
    }
}

impl From<callaudit_config::PersistenceConfig> for ScyllaConfig {
    fn from(cfg: callaudit_config::PersistenceConfig) -> Self {
        Self {
            hosts: cfg.scylla_hosts,
            keyspace: cfg.keyspace,
            replication_factor: cfg.replication_factor,
        }
    }
}

#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;
        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(&self.session, &self.config.keyspace, self.config.replication_factor).await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }
}
