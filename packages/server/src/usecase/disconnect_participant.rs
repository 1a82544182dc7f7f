//! UseCase: 参加者切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectParticipantUseCase::execute() メソッド
//! - レジストリからの削除と、残った参加者へのユーザー一覧の送信
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加者の切断とユーザー一覧の送信（1 回だけ）
//! - 異常系：既に削除済みの参加者の切断（何も送信しない）
//! - 異常系：同じ ID で再接続された後の古い接続の切断（新しい接続を残す）

use std::sync::Arc;

use crate::domain::ClientId;

use super::{
    broadcast::Broadcaster,
    registry::{ConnectionRegistry, ConnectionToken},
};

/// 参加者切断のユースケース
pub struct DisconnectParticipantUseCase {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl DisconnectParticipantUseCase {
    pub fn new(registry: Arc<ConnectionRegistry>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    /// 参加者切断を実行
    ///
    /// `token` の接続が実際に削除された場合のみユーザー一覧を送信し、true を返す。
    pub async fn execute(&self, client_id: &ClientId, token: ConnectionToken) -> bool {
        if !self.registry.remove(client_id, token).await {
            tracing::debug!("Connection of '{}' was already removed or replaced", client_id);
            return false;
        }
        tracing::info!("Client '{}' disconnected", client_id);
        self.broadcaster.send_user_list().await;
        true
    }
}
