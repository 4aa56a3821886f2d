use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a full message received or sent over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: ChannelEvent,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
}

impl RealtimeMessage {
    pub fn new(topic: &str, event: ChannelEvent, payload: serde_json::Value, message_ref: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event,
            payload,
            message_ref,
        }
    }

    /// `status` of a `phx_reply` payload, if this is one
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != ChannelEvent::Reply {
            return None;
        }
        self.payload.get("status").and_then(|v| v.as_str())
    }
}

/// チャンネルイベント (Phoenix protocol events plus Realtime's own)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelEvent {
    Join,
    Leave,
    Reply,
    Error,
    Close,
    Heartbeat,
    PostgresChanges,
    AccessToken,
    System,
    /// Anything the dashboard does not act on (presence, broadcast, ...)
    Other(String),
}

impl ChannelEvent {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => "phx_join",
            Self::Leave => "phx_leave",
            Self::Reply => "phx_reply",
            Self::Error => "phx_error",
            Self::Close => "phx_close",
            Self::Heartbeat => "heartbeat",
            Self::PostgresChanges => "postgres_changes",
            Self::AccessToken => "access_token",
            Self::System => "system",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ChannelEvent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "phx_join" => Self::Join,
            "phx_leave" => Self::Leave,
            "phx_reply" => Self::Reply,
            "phx_error" => Self::Error,
            "phx_close" => Self::Close,
            "heartbeat" => Self::Heartbeat,
            "postgres_changes" => Self::PostgresChanges,
            "access_token" => Self::AccessToken,
            "system" => Self::System,
            _ => Self::Other(name),
        }
    }
}

impl From<ChannelEvent> for String {
    fn from(event: ChannelEvent) -> Self {
        event.as_str().to_string()
    }
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-level change kind carried by a `postgres_changes` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// The `data` of a `postgres_changes` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresChangePayload {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// New row for INSERT/UPDATE
    #[serde(default)]
    pub record: serde_json::Value,
    /// Previous row for UPDATE/DELETE; only the primary key unless the
    /// table uses `REPLICA IDENTITY FULL`
    #[serde(default)]
    pub old_record: serde_json::Value,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

impl PostgresChangePayload {
    /// Pull the change out of the message payload (`{"data": {...}, "ids": [...]}`)
    pub fn from_message_payload(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let data = payload.get("data").cloned().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names_round_trip() {
        let msg: RealtimeMessage = serde_json::from_value(json!({
            "topic": "realtime:bookmarks",
            "event": "presence_state",
            "payload": {},
            "ref": null
        }))
        .unwrap();
        assert_eq!(msg.event, ChannelEvent::Other("presence_state".to_string()));
        assert!(msg.message_ref.is_none());

        let join = RealtimeMessage::new("realtime:bookmarks", ChannelEvent::Join, json!({}), Some("1".into()));
        let value = serde_json::to_value(&join).unwrap();
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
    }

    #[test]
    fn test_reply_status() {
        let reply: RealtimeMessage = serde_json::from_value(json!({
            "topic": "realtime:bookmarks",
            "event": "phx_reply",
            "payload": { "status": "error", "response": { "reason": "unauthorized" } },
            "ref": "4"
        }))
        .unwrap();
        assert_eq!(reply.reply_status(), Some("error"));

        let heartbeat = RealtimeMessage::new("phoenix", ChannelEvent::Heartbeat, json!({}), None);
        assert_eq!(heartbeat.reply_status(), None);
    }

    #[test]
    fn test_postgres_change_payload() {
        let payload = json!({
            "data": {
                "schema": "public",
                "table": "bookmarks",
                "commit_timestamp": "2024-05-01T10:00:00Z",
                "type": "DELETE",
                "old_record": { "id": 12 },
                "columns": [],
                "errors": null
            },
            "ids": [38606455]
        });

        let change = PostgresChangePayload::from_message_payload(&payload).unwrap();
        assert_eq!(change.change_type, ChangeType::Delete);
        assert_eq!(change.old_record["id"], 12);
        assert!(change.record.is_null());
    }
}
