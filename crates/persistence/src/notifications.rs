//! Notification records (C7 output) and their lifecycle transitions.

use async_trait::async_trait;
use callaudit_core::readmodel::Notification;
use dashmap::DashMap;
use uuid::Uuid;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: Notification) -> Result<(), PersistenceError>;
    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, PersistenceError>;
    async fn list_for_call(&self, call_id: &str) -> Result<Vec<Notification>, PersistenceError>;
    /// Overwrite the row with its new lifecycle state (sent / failed /
    /// reset to pending for resend).
    async fn update(&self, notification: Notification) -> Result<(), PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    rows: DashMap<Uuid, Notification>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, notification: Notification) -> Result<(), PersistenceError> {
        self.rows.insert(notification.notification_id, notification);
        Ok(())
    }

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, PersistenceError> {
        Ok(self.rows.get(&notification_id).map(|r| r.clone()))
    }

    async fn list_for_call(&self, call_id: &str) -> Result<Vec<Notification>, PersistenceError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.call_id == call_id)
            .map(|r| r.clone())
            .collect())
    }

    async fn update(&self, notification: Notification) -> Result<(), PersistenceError> {
        self.rows.insert(notification.notification_id, notification);
        Ok(())
    }
}

pub struct ScyllaNotificationStore {
    client: ScyllaClient,
}

impl ScyllaNotificationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn upsert(&self, notification: &Notification) -> Result<(), PersistenceError> {
        let channel = serde_json::to_value(notification.channel)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();
        let priority = serde_json::to_value(notification.priority)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();
        let status = serde_json::to_value(notification.status)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        let query = format!(
            "INSERT INTO {}.notifications (call_id, notification_id, notification_type, recipient, channel, subject, body, priority, status, sent_at, error_message, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &notification.call_id,
                    notification.notification_id,
                    &notification.notification_type,
                    &notification.recipient,
                    channel,
                    &notification.subject,
                    &notification.body,
                    priority,
                    status,
                    notification.sent_at,
                    &notification.error_message,
                    notification.created_at,
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for ScyllaNotificationStore {
    async fn create(&self, notification: Notification) -> Result<(), PersistenceError> {
        self.upsert(&notification).await
    }

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, PersistenceError> {
        // Notifications are partitioned by call_id; operators looking up
        // by notification_id alone go through an allow-filtering query or
        // a secondary index in a real deployment. Kept minimal here.
        let query = format!(
            "SELECT call_id, notification_id, notification_type, recipient, channel, subject, body, priority, status, sent_at, error_message, created_at FROM {}.notifications WHERE notification_id = ? ALLOW FILTERING",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (notification_id,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let rows = result.into_rows_result().map_err(|e| PersistenceError::Query(e.to_string()))?;
        for row in rows.rows::<NotificationRow>().map_err(|e| PersistenceError::InvalidData(e.to_string()))? {
            let row = row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            return Ok(Some(row.into_notification()?));
        }
        Ok(None)
    }

    async fn list_for_call(&self, call_id: &str) -> Result<Vec<Notification>, PersistenceError> {
        let query = format!(
            "SELECT call_id, notification_id, notification_type, recipient, channel, subject, body, priority, status, sent_at, error_message, created_at FROM {}.notifications WHERE call_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (call_id,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let rows = result.into_rows_result().map_err(|e| PersistenceError::Query(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows.rows::<NotificationRow>().map_err(|e| PersistenceError::InvalidData(e.to_string()))? {
            out.push(row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?.into_notification()?);
        }
        Ok(out)
    }

    async fn update(&self, notification: Notification) -> Result<(), PersistenceError> {
        self.upsert(&notification).await
    }
}

type NotificationRow = (
    String,
    Uuid,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<chrono::DateTime<chrono::Utc>>,
    Option<String>,
    chrono::DateTime<chrono::Utc>,
);

trait IntoNotification {
    fn into_notification(self) -> Result<Notification, PersistenceError>;
}

impl IntoNotification for NotificationRow {
    fn into_notification(self) -> Result<Notification, PersistenceError> {
        let (call_id, notification_id, notification_type, recipient, channel, subject, body, priority, status, sent_at, error_message, created_at) = self;
        Ok(Notification {
            notification_id,
            call_id,
            notification_type,
            recipient,
            channel: serde_json::from_value(serde_json::Value::String(channel))
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
            subject,
            body,
            priority: serde_json::from_value(serde_json::Value::String(priority))
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
            status: serde_json::from_value(serde_json::Value::String(status))
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
            sent_at,
            error_message,
            created_at,
        })
    }
}
