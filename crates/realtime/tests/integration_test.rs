use bookmarks_realtime::{
    ChangeType, ChannelEvent, ConnectionState, DatabaseChanges, PostgresChangePayload, RealtimeClient,
    RealtimeClientOptions, RealtimeError, RealtimeMessage,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// What the mock server should answer to a `phx_join`
#[derive(Clone, Copy)]
enum JoinReply {
    Ok,
    Error,
    Silent,
}

/// Accepts one websocket connection, answers joins and forwards every frame
/// it receives to `seen`. Frames sent on `push` are written to the client.
async fn start_mock_server(
    join_reply: JoinReply,
) -> (String, mpsc::UnboundedReceiver<RealtimeMessage>, mpsc::UnboundedSender<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept failed");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake failed");

        loop {
            tokio::select! {
                frame = ws.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => continue,
                    };
                    let msg: RealtimeMessage = serde_json::from_str(&text).expect("client sent invalid JSON");
                    if msg.event == ChannelEvent::Join {
                        let status = match join_reply {
                            JoinReply::Ok => Some("ok"),
                            JoinReply::Error => Some("error"),
                            JoinReply::Silent => None,
                        };
                        if let Some(status) = status {
                            let reply = json!({
                                "topic": msg.topic,
                                "event": "phx_reply",
                                "payload": { "status": status, "response": {} },
                                "ref": msg.message_ref,
                            });
                            ws.send(Message::Text(reply.to_string())).await.expect("send failed");
                        }
                    }
                    let _ = seen_tx.send(msg);
                }
                Some(text) = push_rx.recv() => {
                    ws.send(Message::Text(text)).await.expect("push failed");
                }
            }
        }
    });

    (format!("http://{}", addr), seen_rx, push_tx)
}

fn change_frame(topic: &str, change_type: &str, record: serde_json::Value, old_record: serde_json::Value) -> String {
    json!({
        "topic": topic,
        "event": "postgres_changes",
        "payload": {
            "data": {
                "schema": "public",
                "table": "bookmarks",
                "commit_timestamp": "2024-05-01T10:00:00Z",
                "type": change_type,
                "record": record,
                "old_record": old_record,
                "columns": [],
                "errors": null
            },
            "ids": [1]
        },
        "ref": null
    })
    .to_string()
}

async fn next_seen(seen: &mut mpsc::UnboundedReceiver<RealtimeMessage>) -> RealtimeMessage {
    tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("server saw nothing")
        .expect("server closed")
}

#[tokio::test]
async fn test_join_receive_and_leave() {
    let (url, mut seen, push) = start_mock_server(JoinReply::Ok).await;
    let client = RealtimeClient::new(&url, "anon-key");
    let mut states = client.on_state_change();
    client.set_auth(Some("user-jwt".to_string())).await;

    let (changes_tx, mut changes_rx) = mpsc::unbounded_channel::<PostgresChangePayload>();
    let subscription = client
        .channel("bookmarks-u1")
        .on(DatabaseChanges::new("bookmarks").eq("user_id", "u1"), move |change| {
            let _ = changes_tx.send(change);
        })
        .subscribe()
        .await
        .expect("subscribe failed");

    assert_eq!(subscription.topic(), "realtime:bookmarks-u1");
    assert_eq!(client.get_connection_state().await, ConnectionState::Connected);

    let join = next_seen(&mut seen).await;
    assert_eq!(join.event, ChannelEvent::Join);
    assert_eq!(join.topic, "realtime:bookmarks-u1");
    assert_eq!(join.payload["access_token"], "user-jwt");
    assert_eq!(
        join.payload["config"]["postgres_changes"][0],
        json!({ "event": "*", "schema": "public", "table": "bookmarks", "filter": "user_id=eq.u1" })
    );

    // a refreshed token is pushed to the joined channel
    client.set_auth(Some("refreshed-jwt".to_string())).await;
    let token = next_seen(&mut seen).await;
    assert_eq!(token.event, ChannelEvent::AccessToken);
    assert_eq!(token.topic, "realtime:bookmarks-u1");
    assert_eq!(token.payload, json!({ "access_token": "refreshed-jwt" }));

    push.send(change_frame(
        "realtime:bookmarks-u1",
        "INSERT",
        json!({ "id": 4, "title": "Docs", "url": "https://docs.rs", "user_id": "u1" }),
        json!({}),
    ))
    .unwrap();
    push.send(change_frame("realtime:bookmarks-u1", "DELETE", json!({}), json!({ "id": 1 })))
        .unwrap();
    // not ours, must not reach the callback
    push.send(change_frame("realtime:other", "INSERT", json!({ "id": 9 }), json!({})))
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), changes_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.change_type, ChangeType::Insert);
    assert_eq!(first.record["id"], 4);

    let second = tokio::time::timeout(Duration::from_secs(5), changes_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.change_type, ChangeType::Delete);
    assert_eq!(second.old_record["id"], 1);

    client.remove_channel(subscription.topic()).await.expect("leave failed");
    let leave = next_seen(&mut seen).await;
    assert_eq!(leave.event, ChannelEvent::Leave);
    assert_eq!(leave.topic, "realtime:bookmarks-u1");
    assert!(client.channel_topics().await.is_empty());

    // leaving the last channel closes the socket
    assert_eq!(client.get_connection_state().await, ConnectionState::Disconnected);
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Connecting);
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Connected);
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(changes_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_socket_stays_open_while_channels_remain() {
    let (url, mut seen, _push) = start_mock_server(JoinReply::Ok).await;
    let client = RealtimeClient::new(&url, "anon-key");

    for name in ["bookmarks-u1", "bookmarks-u2"] {
        client
            .channel(name)
            .on(DatabaseChanges::new("bookmarks"), |_| {})
            .subscribe()
            .await
            .unwrap();
    }

    client.remove_channel("bookmarks-u1").await.unwrap();
    assert_eq!(client.get_connection_state().await, ConnectionState::Connected);

    client.remove_channel("bookmarks-u2").await.unwrap();
    assert_eq!(client.get_connection_state().await, ConnectionState::Disconnected);

    let events: Vec<_> = [
        next_seen(&mut seen).await,
        next_seen(&mut seen).await,
        next_seen(&mut seen).await,
        next_seen(&mut seen).await,
    ]
    .into_iter()
    .map(|m| m.event)
    .collect();
    assert_eq!(
        events,
        vec![ChannelEvent::Join, ChannelEvent::Join, ChannelEvent::Leave, ChannelEvent::Leave]
    );
}

#[tokio::test]
async fn test_rejected_join() {
    let (url, _seen, _push) = start_mock_server(JoinReply::Error).await;
    let client = RealtimeClient::new(&url, "anon-key");

    let result = client
        .channel("bookmarks-u1")
        .on(DatabaseChanges::new("bookmarks"), |_| {})
        .subscribe()
        .await;

    assert!(matches!(result, Err(RealtimeError::SubscriptionError(_))));
    assert!(client.channel_topics().await.is_empty());
}

#[tokio::test]
async fn test_join_timeout() {
    let (url, _seen, _push) = start_mock_server(JoinReply::Silent).await;
    let options = RealtimeClientOptions {
        reply_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let client = RealtimeClient::new_with_options(&url, "anon-key", options);

    let result = client
        .channel("bookmarks-u1")
        .on(DatabaseChanges::new("bookmarks"), |_| {})
        .subscribe()
        .await;

    assert!(matches!(result, Err(RealtimeError::Timeout(_))));
    assert!(client.channel_topics().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_join_is_rejected() {
    let (url, _seen, _push) = start_mock_server(JoinReply::Ok).await;
    let client = RealtimeClient::new(&url, "anon-key");

    client
        .channel("bookmarks-u1")
        .on(DatabaseChanges::new("bookmarks"), |_| {})
        .subscribe()
        .await
        .unwrap();

    let again = client
        .channel("bookmarks-u1")
        .on(DatabaseChanges::new("bookmarks"), |_| {})
        .subscribe()
        .await;
    assert!(matches!(again, Err(RealtimeError::ChannelError(_))));
    assert_eq!(client.channel_topics().await, vec!["realtime:bookmarks-u1".to_string()]);
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RealtimeClient::new(&format!("http://{}", addr), "anon-key");
    let result = client.connect().await;
    assert!(matches!(result, Err(RealtimeError::ConnectionError(_))));
    assert_eq!(client.get_connection_state().await, ConnectionState::Disconnected);
}
