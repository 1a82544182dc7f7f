//! フレームの一斉送信
//!
//! 送信時点のレジストリのスナップショットを取り、対象のロールで絞り込んだ
//! クライアントに 1 度だけシリアライズしたフレームを送ります。
//! 配送は best-effort で、閉じた送信キューは読み飛ばされます。

use std::sync::Arc;

use crate::{
    domain::{ClientId, MessagePusher, Role},
    infrastructure::dto::websocket::{OutboundMessage, UserListEntry},
};

use super::registry::ConnectionRegistry;

/// 送信対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Role(Role),
}

impl Audience {
    fn includes(&self, role: Role) -> bool {
        match self {
            Audience::All => true,
            Audience::Role(target) => *target == role,
        }
    }
}

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            registry,
            message_pusher,
        }
    }

    /// `audience` に該当する全クライアントへ送信し、送信できた数を返す
    pub async fn send(&self, message: &OutboundMessage, audience: Audience) -> usize {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize outbound frame: {}", e);
                return 0;
            }
        };
        let targets: Vec<ClientId> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|c| audience.includes(c.role))
            .map(|c| c.id)
            .collect();
        let delivered = self.message_pusher.broadcast(&targets, &json).await;
        if delivered < targets.len() {
            tracing::warn!(
                "Frame delivered to {} of {} clients",
                delivered,
                targets.len()
            );
        }
        delivered
    }

    /// 1 クライアントだけに送信する
    pub async fn send_to(&self, id: &ClientId, message: &OutboundMessage) -> bool {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize outbound frame: {}", e);
                return false;
            }
        };
        match self.message_pusher.push_to(id, &json).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send frame to '{}': {}", id, e);
                false
            }
        }
    }

    /// 現在のユーザー一覧
    pub async fn user_list(&self) -> Vec<UserListEntry> {
        self.registry
            .snapshot()
            .await
            .iter()
            .map(UserListEntry::from)
            .collect()
    }

    /// ユーザー一覧を全員に送信する
    pub async fn send_user_list(&self) -> usize {
        let user_list = self.user_list().await;
        self.send(&OutboundMessage::UserList { user_list }, Audience::All)
            .await
    }
}
