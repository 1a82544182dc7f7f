//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの送信キュー（`UnboundedSender`）を管理
//! - クライアントへのフレーム送信（push_to, broadcast）
//!
//! ## 設計ノート
//!
//! WebSocket の受付と送信キューの生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成された sender を受け取り、フレームの送信に使用します。
//! キューは接続ごとに 1 本なので、同じクライアントへのフレームは送信順に届きます。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ClientId, MessagePushError, MessagePusher, PusherChannel};

/// WebSocket を使った MessagePusher 実装
///
/// ```ignore
/// let pusher = WebSocketMessagePusher::new();
/// pusher.register_client(client_id.clone(), tx).await;
/// pusher.push_to(&client_id, r#"{"type":"keyRejected"}"#).await?;
/// ```
#[derive(Default)]
pub struct WebSocketMessagePusher {
    /// 接続中のクライアントの送信キュー
    clients: Mutex<HashMap<ClientId, PusherChannel>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, client_id: ClientId, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        tracing::debug!("Client '{}' registered to MessagePusher", client_id);
        clients.insert(client_id, sender);
    }

    async fn unregister_client(&self, client_id: &ClientId) -> bool {
        let mut clients = self.clients.lock().await;
        let removed = clients.remove(client_id).is_some();
        tracing::debug!("Client '{}' unregistered from MessagePusher", client_id);
        removed
    }

    async fn unregister_all(&self) -> usize {
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        // sender を drop すると各接続の pusher_loop が終了する
        clients.clear();
        count
    }

    async fn push_to(&self, client_id: &ClientId, content: &str) -> Result<(), MessagePushError> {
        let clients = self.clients.lock().await;

        if let Some(sender) = clients.get(client_id) {
            sender
                .send(content.to_string())
                .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
            tracing::trace!("Pushed frame to client '{}'", client_id);
            Ok(())
        } else {
            Err(MessagePushError::ClientNotFound(
                client_id.as_str().to_string(),
            ))
        }
    }

    async fn broadcast(&self, targets: &[ClientId], content: &str) -> usize {
        let clients = self.clients.lock().await;
        let mut delivered = 0;

        for target in targets {
            match clients.get(target) {
                Some(sender) => {
                    // ブロードキャストでは一部の送信失敗を許容
                    if let Err(e) = sender.send(content.to_string()) {
                        tracing::warn!("Failed to push frame to client '{}': {}", target, e);
                    } else {
                        delivered += 1;
                    }
                }
                None => {
                    tracing::debug!("Client '{}' not found during broadcast, skipping", target);
                }
            }
        }

        delivered
    }
}
