use crate::client::RealtimeClient;
use crate::error::RealtimeError;
use crate::filters::{DatabaseFilter, FilterOperator};
use crate::message::{ChangeType, ChannelEvent, PostgresChangePayload, RealtimeMessage};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// データベース変更監視設定
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseChanges {
    schema: String,
    table: String,
    /// `None` listens to every change type (`*`)
    event: Option<ChangeType>,
    filter: Option<DatabaseFilter>,
}

impl DatabaseChanges {
    /// 新しいデータベース変更監視設定を作成
    pub fn new(table: &str) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.to_string(),
            event: None,
            filter: None,
        }
    }

    /// スキーマを設定
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    /// Listen to a single change type instead of all of them
    pub fn event(mut self, event: ChangeType) -> Self {
        self.event = Some(event);
        self
    }

    /// フィルター条件を設定 (Realtime accepts one filter per binding)
    pub fn filter(mut self, filter: DatabaseFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.filter(DatabaseFilter {
            column: column.to_string(),
            operator: FilterOperator::Eq,
            value: value.to_string(),
        })
    }

    /// The `postgres_changes` entry of a `phx_join` config
    pub(crate) fn to_join_config(&self) -> serde_json::Value {
        let event = self
            .event
            .map(|e| match e {
                ChangeType::Insert => "INSERT",
                ChangeType::Update => "UPDATE",
                ChangeType::Delete => "DELETE",
            })
            .unwrap_or("*");

        let mut config = json!({
            "event": event,
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            config["filter"] = json!(filter.to_string());
        }
        config
    }

    /// Whether a delivered change belongs to this binding.
    /// Row filters are applied by the server and not re-checked here.
    pub(crate) fn matches(&self, change: &PostgresChangePayload) -> bool {
        change.schema == self.schema
            && change.table == self.table
            && self.event.map_or(true, |e| e == change.change_type)
    }
}

type CallbackFn = Box<dyn Fn(PostgresChangePayload) + Send + Sync>;

/// 内部チャンネル表現
pub(crate) struct Channel {
    topic: String,
    bindings: Vec<(DatabaseChanges, CallbackFn)>,
}

impl Channel {
    pub(crate) async fn handle_message(&self, message: RealtimeMessage) {
        match message.event {
            ChannelEvent::PostgresChanges => {
                let change = match PostgresChangePayload::from_message_payload(&message.payload) {
                    Ok(change) => change,
                    Err(e) => {
                        error!(
                            "Failed to parse postgres_changes payload on '{}': {}. Payload: {}",
                            self.topic, e, message.payload
                        );
                        return;
                    }
                };

                let mut delivered = 0;
                for (changes, callback) in &self.bindings {
                    if changes.matches(&change) {
                        (callback)(change.clone());
                        delivered += 1;
                    }
                }
                trace!(
                    "{:?} on {}.{} delivered to {} callback(s) of '{}'",
                    change.change_type,
                    change.schema,
                    change.table,
                    delivered,
                    self.topic
                );
            }
            ChannelEvent::System => {
                let status = message.payload.get("status").and_then(|v| v.as_str());
                if status == Some("error") {
                    warn!("Channel '{}' system error: {}", self.topic, message.payload);
                } else {
                    debug!("Channel '{}' system message: {}", self.topic, message.payload);
                }
            }
            ChannelEvent::Error => {
                error!("Channel '{}' received phx_error: {}", self.topic, message.payload);
            }
            ChannelEvent::Close => {
                info!("Channel '{}' received phx_close", self.topic);
            }
            other => {
                trace!("Ignoring '{}' on channel '{}'", other, self.topic);
            }
        }
    }
}

/// A joined channel; pass its topic to [`RealtimeClient::remove_channel`] to leave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    topic: String,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// チャンネル作成と購読設定のためのビルダー
pub struct ChannelBuilder<'a> {
    client: &'a RealtimeClient,
    topic: String,
    bindings: Vec<(DatabaseChanges, CallbackFn)>,
}

impl<'a> ChannelBuilder<'a> {
    pub(crate) fn new(client: &'a RealtimeClient, topic: String) -> Self {
        Self {
            client,
            topic,
            bindings: Vec::new(),
        }
    }

    /// データベース変更イベントのコールバックを登録
    pub fn on<F>(mut self, changes: DatabaseChanges, callback: F) -> Self
    where
        F: Fn(PostgresChangePayload) + Send + Sync + 'static,
    {
        self.bindings.push((changes, Box::new(callback)));
        self
    }

    /// チャンネルへの接続と購読を開始
    ///
    /// Connects if needed, joins the topic and waits for the server to
    /// acknowledge the join. A topic can only be joined once per client.
    pub async fn subscribe(self) -> Result<Subscription, RealtimeError> {
        self.client.connect().await?;

        let postgres_changes: Vec<serde_json::Value> = self
            .bindings
            .iter()
            .map(|(changes, _)| changes.to_join_config())
            .collect();

        let channel = Arc::new(Channel {
            topic: self.topic.clone(),
            bindings: self.bindings,
        });

        {
            let mut channels = self.client.channels.write().await;
            if channels.contains_key(&self.topic) {
                return Err(RealtimeError::ChannelError(format!(
                    "Channel '{}' is already joined",
                    self.topic
                )));
            }
            channels.insert(self.topic.clone(), channel);
        }

        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": postgres_changes,
            }
        });
        if let Some(token) = self.client.access_token.read().await.as_ref() {
            payload["access_token"] = json!(token);
        }

        let reply = match self
            .client
            .request(&self.topic, ChannelEvent::Join, payload)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.client.channels.write().await.remove(&self.topic);
                return Err(e);
            }
        };

        if reply.reply_status() != Some("ok") {
            self.client.channels.write().await.remove(&self.topic);
            return Err(RealtimeError::SubscriptionError(format!(
                "Join of '{}' rejected: {}",
                self.topic, reply.payload
            )));
        }

        info!("Joined channel '{}'", self.topic);
        Ok(Subscription { topic: self.topic })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(table: &str, change_type: ChangeType) -> PostgresChangePayload {
        PostgresChangePayload {
            schema: "public".to_string(),
            table: table.to_string(),
            commit_timestamp: None,
            change_type,
            record: serde_json::Value::Null,
            old_record: serde_json::Value::Null,
            errors: None,
        }
    }

    #[test]
    fn test_join_config() {
        let config = DatabaseChanges::new("bookmarks").eq("user_id", "u-1").to_join_config();
        assert_eq!(
            config,
            json!({ "event": "*", "schema": "public", "table": "bookmarks", "filter": "user_id=eq.u-1" })
        );

        let config = DatabaseChanges::new("bookmarks")
            .schema("app")
            .event(ChangeType::Insert)
            .to_join_config();
        assert_eq!(config["event"], "INSERT");
        assert_eq!(config["schema"], "app");
        assert!(config.get("filter").is_none());
    }

    #[test]
    fn test_matches() {
        let all = DatabaseChanges::new("bookmarks");
        assert!(all.matches(&change("bookmarks", ChangeType::Insert)));
        assert!(all.matches(&change("bookmarks", ChangeType::Delete)));
        assert!(!all.matches(&change("notes", ChangeType::Insert)));

        let deletes = DatabaseChanges::new("bookmarks").event(ChangeType::Delete);
        assert!(deletes.matches(&change("bookmarks", ChangeType::Delete)));
        assert!(!deletes.matches(&change("bookmarks", ChangeType::Insert)));
    }
}
