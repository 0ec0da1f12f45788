//! Chat service
//!
//! Group chat messages stored in the `messages` table.

use serde_json::json;
use std::sync::Arc;

use crate::data::{
    Fetched, Fields, ListQuery, LocalStore, OrderBy, Record, RemoteBackend, Subscription,
    TableAccessor, tables,
};
use crate::error::AppError;

const MAX_MESSAGE_CHARS: usize = 2000;

/// Chat service
pub struct ChatService<R, S> {
    data: Arc<TableAccessor<R, S>>,
}

impl<R: RemoteBackend, S: LocalStore> ChatService<R, S> {
    pub fn new(data: Arc<TableAccessor<R, S>>) -> Self {
        Self { data }
    }

    /// Post a message to a group
    ///
    /// # Errors
    /// `Validation` when the body is blank or longer than 2000 characters
    pub async fn send(
        &self,
        group_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<Fetched<Record>, AppError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("message body must not be empty".to_string()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::Validation(format!(
                "message body exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let mut fields = Fields::new();
        fields.insert("group_id".to_string(), json!(group_id));
        fields.insert("author_id".to_string(), json!(author_id));
        fields.insert("body".to_string(), json!(body));
        self.data.create(tables::MESSAGES, fields).await
    }

    /// The latest `limit` messages of a group, oldest first
    pub async fn recent(&self, group_id: &str, limit: usize) -> Fetched<Vec<Record>> {
        let query = ListQuery::new()
            .eq("group_id", group_id)
            .order_by(OrderBy::desc("created_at"))
            .limit(limit);
        self.data.list(tables::MESSAGES, &query).await.map(|page| {
            let mut records = page.records;
            records.reverse();
            records
        })
    }

    /// Live messages for one group. Inert while running without a remote.
    pub async fn watch<F>(&self, group_id: &str, on_message: F) -> Subscription
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        let group_id = group_id.to_string();
        self.data
            .subscribe(tables::MESSAGES, move |event| {
                if let Some(record) = &event.record {
                    if record.get("group_id").and_then(|v| v.as_str()) == Some(group_id.as_str()) {
                        on_message(record);
                    }
                }
            })
            .await
    }
}
