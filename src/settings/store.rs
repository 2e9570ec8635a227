//! Where settings live.

use super::{Settings, SettingsUpdate};
use crate::error::{MindtrackError, Result};
use crate::supabase::{SupabaseClient, json_rows};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Settings gateway.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings. A store with nothing saved returns its defaults.
    async fn fetch(&self) -> Result<Settings>;

    /// Apply a partial update and return the resulting settings.
    async fn update(&self, update: &SettingsUpdate) -> Result<Settings>;
}

#[async_trait]
impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    async fn fetch(&self) -> Result<Settings> {
        (**self).fetch().await
    }

    async fn update(&self, update: &SettingsUpdate) -> Result<Settings> {
        (**self).update(update).await
    }
}

/// Settings kept in a single-row Supabase table.
pub struct SupabaseSettingsStore {
    client: SupabaseClient,
    table: String,
    fallback: Settings,
}

impl SupabaseSettingsStore {
    /// `fallback` is returned when the table holds no row yet and fills any
    /// column a stored row leaves empty.
    pub fn new(client: SupabaseClient, table: &str, fallback: Settings) -> Self {
        Self {
            client,
            table: table.to_string(),
            fallback,
        }
    }

    fn merge(&self, row: serde_json::Value) -> std::result::Result<Settings, String> {
        let stored: SettingsUpdate =
            serde_json::from_value(row).map_err(|e| format!("malformed settings row: {e}"))?;
        Ok(stored.apply(&self.fallback))
    }

    async fn existing_id(&self) -> std::result::Result<Option<String>, String> {
        let response = self
            .client
            .get(&self.client.rest_url(&self.table, "select=id&limit=1"))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let rows = json_rows(response).await?;
        Ok(rows.first().and_then(|row| match &row["id"] {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }
}

#[async_trait]
impl SettingsStore for SupabaseSettingsStore {
    async fn fetch(&self) -> Result<Settings> {
        let fetch_error = |message: String| MindtrackError::ConfigFetch { message };

        let response = self
            .client
            .get(&self.client.rest_url(&self.table, "select=*&limit=1"))
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let rows = json_rows(response).await.map_err(fetch_error)?;
        match rows.into_iter().next() {
            Some(row) => self.merge(row).map_err(fetch_error),
            None => {
                tracing::debug!(table = %self.table, "no stored settings, using defaults");
                Ok(self.fallback.clone())
            }
        }
    }

    async fn update(&self, update: &SettingsUpdate) -> Result<Settings> {
        let persistence_error = |message: String| MindtrackError::Persistence {
            message: format!("failed to update settings: {message}"),
        };

        let request = match self.existing_id().await.map_err(persistence_error)? {
            Some(id) => self
                .client
                .patch(&self.client.rest_url(&self.table, &format!("id=eq.{id}"))),
            None => self.client.post(&self.client.rest_url(&self.table, "")),
        };

        let response = request
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await
            .map_err(|e| persistence_error(e.to_string()))?;

        let rows = json_rows(response).await.map_err(persistence_error)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| persistence_error("no row returned".to_string()))?;

        self.merge(row).map_err(persistence_error)
    }
}

/// Settings held in process memory.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<Settings>,
    fail_fetch: bool,
}

impl InMemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            fail_fetch: false,
        }
    }

    /// Configure the store to fail every fetch.
    pub fn with_failure(mut self) -> Self {
        self.fail_fetch = true;
        self
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn fetch(&self) -> Result<Settings> {
        if self.fail_fetch {
            return Err(MindtrackError::ConfigFetch {
                message: "settings store unavailable".to_string(),
            });
        }
        Ok(self.settings.read().await.clone())
    }

    async fn update(&self, update: &SettingsUpdate) -> Result<Settings> {
        let mut settings = self.settings.write().await;
        *settings = update.apply(&settings);
        Ok(settings.clone())
    }
}
