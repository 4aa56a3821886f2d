use crate::channel::{Channel, ChannelBuilder};
use crate::error::RealtimeError;
use crate::message::{ChannelEvent, RealtimeMessage};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// RealtimeClient設定オプション
#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub heartbeat_interval: Duration,
    /// How long to wait for a `phx_reply` (join acknowledgement)
    pub reply_timeout: Duration,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(10),
        }
    }
}

type PendingReplies = HashMap<String, oneshot::Sender<RealtimeMessage>>;

/// Realtimeクライアント本体
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) url: String,
    pub(crate) key: String,
    pub(crate) options: RealtimeClientOptions,
    next_ref: Arc<AtomicU32>,
    // bumped per connect so a stale reader task cannot tear down a newer socket
    generation: Arc<AtomicU32>,
    // topic -> joined channel
    pub(crate) channels: Arc<RwLock<HashMap<String, Arc<Channel>>>>,
    socket: Arc<RwLock<Option<mpsc::Sender<Message>>>>,
    pending_replies: Arc<Mutex<PendingReplies>>,
    state: Arc<RwLock<ConnectionState>>,
    state_change: broadcast::Sender<ConnectionState>,
    connect_lock: Arc<Mutex<()>>,
    pub(crate) access_token: Arc<RwLock<Option<String>>>,
}

/// Full topic name for a channel (`realtime:<name>`)
pub fn channel_topic(name: &str) -> String {
    if name.starts_with("realtime:") {
        name.to_string()
    } else {
        format!("realtime:{}", name)
    }
}

impl RealtimeClient {
    /// デフォルトオプションで新しいクライアントを作成
    ///
    /// `url` is the project URL (`https://<ref>.supabase.co`); `ws`/`wss`
    /// URLs are accepted as well.
    pub fn new(url: &str, key: &str) -> Self {
        Self::new_with_options(url, key, RealtimeClientOptions::default())
    }

    /// カスタムオプションで新しいクライアントを作成
    pub fn new_with_options(url: &str, key: &str, options: RealtimeClientOptions) -> Self {
        let (state_change, _) = broadcast::channel(16);
        Self {
            url: url.to_string(),
            key: key.to_string(),
            options,
            next_ref: Arc::new(AtomicU32::new(1)),
            generation: Arc::new(AtomicU32::new(0)),
            channels: Arc::new(RwLock::new(HashMap::new())),
            socket: Arc::new(RwLock::new(None)),
            pending_replies: Arc::new(Mutex::new(HashMap::new())),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            state_change,
            connect_lock: Arc::new(Mutex::new(())),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the user's access token, pushing it to joined channels when connected
    pub async fn set_auth(&self, token: Option<String>) {
        debug!("Setting auth token (is_some: {})", token.is_some());
        *self.access_token.write().await = token.clone();

        let Some(token) = token else { return };
        if self.get_connection_state().await != ConnectionState::Connected {
            return;
        }

        let topics: Vec<String> = self.channels.read().await.keys().cloned().collect();
        for topic in topics {
            let message = RealtimeMessage::new(
                &topic,
                ChannelEvent::AccessToken,
                json!({ "access_token": token }),
                Some(self.next_ref()),
            );
            if let Err(e) = self.send(&message).await {
                warn!("Failed to push access token to '{}': {}", topic, e);
            }
        }
    }

    /// 接続状態変更の通知を受け取るためのレシーバーを取得
    pub fn on_state_change(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_change.subscribe()
    }

    /// 現在の接続状態を取得
    pub async fn get_connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// 特定のトピックに対するチャンネルビルダーを作成
    pub fn channel(&self, name: &str) -> ChannelBuilder<'_> {
        ChannelBuilder::new(self, channel_topic(name))
    }

    /// Topics of the currently joined channels
    pub async fn channel_topics(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// 次のメッセージ参照番号を生成
    pub(crate) fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        let mut current = self.state.write().await;
        if *current != state {
            info!("Realtime state changing from {:?} to {:?}", *current, state);
            *current = state;
            // Ignore send error if no receivers are listening
            let _ = self.state_change.send(state);
        }
    }

    /// WebSocket endpoint derived from the project URL
    pub fn websocket_url(&self) -> Result<Url, RealtimeError> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            s => {
                return Err(RealtimeError::ConnectionError(format!(
                    "Unsupported URL scheme: {}",
                    s
                )))
            }
        };
        url.set_scheme(scheme).map_err(|_| {
            RealtimeError::ConnectionError(format!("Cannot use scheme {} for {}", scheme, self.url))
        })?;

        let mut url = url.join("realtime/v1/websocket")?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    /// WebSocket接続を開始
    ///
    /// Returns once the socket is open; reading, writing and heartbeats run
    /// on background tasks until [`RealtimeClient::disconnect`] or until the
    /// server closes the connection. Calling it while connected is a no-op.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        let _guard = self.connect_lock.lock().await;
        if self.get_connection_state().await == ConnectionState::Connected {
            return Ok(());
        }

        let ws_url = self.websocket_url()?;
        debug!("Connecting to {}", ws_url.as_str().split('?').next().unwrap_or_default());
        self.set_connection_state(ConnectionState::Connecting).await;

        let ws_stream = match connect_async(ws_url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
                self.set_connection_state(ConnectionState::Disconnected).await;
                return Err(RealtimeError::ConnectionError(format!(
                    "WebSocket connection failed: {}",
                    e
                )));
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (mut write, mut read) = ws_stream.split();
        let (socket_tx, mut socket_rx) = mpsc::channel::<Message>(100);
        *self.socket.write().await = Some(socket_tx);
        self.set_connection_state(ConnectionState::Connected).await;

        // --- WebSocket Writer Task ---
        tokio::spawn(async move {
            while let Some(message) = socket_rx.recv().await {
                trace!("Writer task sending: {:?}", message);
                if let Err(e) = write.send(message).await {
                    error!("WebSocket send error: {}", e);
                    return;
                }
            }
            // Sender dropped by disconnect(): close politely so the reader ends too
            if let Err(e) = write.send(Message::Close(None)).await {
                debug!("Failed to send close frame: {}", e);
            }
            debug!("Writer task finished");
        });

        // --- WebSocket Reader Task (and heartbeat) ---
        let client = self.clone();
        tokio::spawn(async move {
            let period = client.options.heartbeat_interval;
            let mut heartbeat = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    msg_result = read.next() => {
                        match msg_result {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<RealtimeMessage>(&text) {
                                    Ok(message) => client.dispatch(message).await,
                                    Err(e) => error!("Failed to parse incoming message: {}. Raw: {}", e, text),
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!("Received close frame: {:?}", frame);
                                break;
                            }
                            Some(Ok(other)) => trace!("Ignoring non-text message: {:?}", other),
                            Some(Err(e)) => {
                                error!("WebSocket read error: {}", e);
                                break;
                            }
                            None => {
                                debug!("WebSocket stream closed by remote");
                                break;
                            }
                        }
                    }
                    _ = heartbeat.tick() => {
                        let message = RealtimeMessage::new(
                            "phoenix",
                            ChannelEvent::Heartbeat,
                            json!({}),
                            Some(client.next_ref()),
                        );
                        if let Err(e) = client.send(&message).await {
                            warn!("Failed to send heartbeat: {}. Assuming connection lost.", e);
                            break;
                        }
                    }
                }
            }

            client.on_socket_closed(generation).await;
        });

        Ok(())
    }

    async fn on_socket_closed(&self, generation: u32) {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Stale reader task finished");
            return;
        }
        *self.socket.write().await = None;
        // Dropping the senders fails every caller still waiting for a reply
        self.pending_replies.lock().await.clear();
        self.channels.write().await.clear();
        self.set_connection_state(ConnectionState::Disconnected).await;
        debug!("Reader task finished");
    }

    async fn dispatch(&self, message: RealtimeMessage) {
        if message.event == ChannelEvent::Reply {
            if let Some(message_ref) = &message.message_ref {
                if let Some(waiter) = self.pending_replies.lock().await.remove(message_ref) {
                    let _ = waiter.send(message);
                    return;
                }
            }
        }

        if message.topic == "phoenix" {
            trace!("Phoenix message: {:?}", message);
            return;
        }

        let channel = self.channels.read().await.get(&message.topic).cloned();
        match channel {
            // handled inline so changes reach callbacks in arrival order
            Some(channel) => channel.handle_message(message).await,
            None => debug!("Message for unknown topic '{}' ignored", message.topic),
        }
    }

    /// 切断処理
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        info!("disconnect() called");
        let sender = self.socket.write().await.take();
        if sender.is_none() {
            warn!("disconnect(): no active socket, already disconnected");
        }
        drop(sender);

        self.channels.write().await.clear();
        self.set_connection_state(ConnectionState::Disconnected).await;
        Ok(())
    }

    /// Leave a joined channel and stop delivering its events
    ///
    /// Leaving the last channel also disconnects the socket.
    pub async fn remove_channel(&self, name: &str) -> Result<(), RealtimeError> {
        let topic = channel_topic(name);
        if self.channels.write().await.remove(&topic).is_none() {
            return Err(RealtimeError::ChannelError(format!(
                "Channel '{}' is not joined",
                topic
            )));
        }

        if self.get_connection_state().await != ConnectionState::Connected {
            debug!("Channel '{}' removed while disconnected", topic);
            return Ok(());
        }

        let leave = RealtimeMessage::new(&topic, ChannelEvent::Leave, json!({}), Some(self.next_ref()));
        self.send(&leave).await?;
        info!("Left channel '{}'", topic);

        // no channel left, stop the socket and its heartbeat
        if self.channels.read().await.is_empty() {
            self.disconnect().await?;
        }
        Ok(())
    }

    /// Send a message and wait for the matching `phx_reply`
    pub(crate) async fn request(
        &self,
        topic: &str,
        event: ChannelEvent,
        payload: serde_json::Value,
    ) -> Result<RealtimeMessage, RealtimeError> {
        let message_ref = self.next_ref();
        let (tx, rx) = oneshot::channel();
        self.pending_replies
            .lock()
            .await
            .insert(message_ref.clone(), tx);

        let message = RealtimeMessage::new(topic, event.clone(), payload, Some(message_ref.clone()));
        if let Err(e) = self.send(&message).await {
            self.pending_replies.lock().await.remove(&message_ref);
            return Err(e);
        }

        match timeout(self.options.reply_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RealtimeError::ConnectionError(
                "Connection closed before reply".to_string(),
            )),
            Err(_) => {
                self.pending_replies.lock().await.remove(&message_ref);
                Err(RealtimeError::Timeout(format!("{} on {}", event, topic)))
            }
        }
    }

    /// Helper to send a message through the WebSocket connection
    pub(crate) async fn send(&self, message: &RealtimeMessage) -> Result<(), RealtimeError> {
        let text = serde_json::to_string(message)?;
        let socket_guard = self.socket.read().await;
        match socket_guard.as_ref() {
            Some(socket_tx) => socket_tx
                .send(Message::Text(text))
                .await
                .map_err(RealtimeError::from),
            None => Err(RealtimeError::ConnectionError(
                "Client socket unavailable".to_string(),
            )),
        }
    }
}

// WebSocketメッセージ送信エラーからの変換
impl From<mpsc::error::SendError<Message>> for RealtimeError {
    fn from(err: mpsc::error::SendError<Message>) -> Self {
        RealtimeError::ConnectionError(format!("Failed to send message to socket task: {}", err))
    }
}
