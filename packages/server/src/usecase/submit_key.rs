//! UseCase: キー提出によるロール昇格
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SubmitKeyUseCase::execute() メソッド
//! - ホストキー・モデレーターキーの照合とロールの永続化
//!
//! ### どのような状況を想定しているか
//! - 正常系：ホストキーで host に、モデレーターキーで mod に昇格
//! - 異常系：一致しないキーは提出者にだけ keyRejected が返り、ロールは変わらない

use std::sync::Arc;

use crate::{
    domain::{AccessKeys, ChatRepository, ClientId, Role},
    infrastructure::dto::websocket::OutboundMessage,
};

use super::{broadcast::Broadcaster, error::DispatchError, registry::ConnectionRegistry};

/// キー照合の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Granted(Role),
    Rejected,
}

/// キー提出のユースケース
pub struct SubmitKeyUseCase {
    keys: AccessKeys,
    repository: Arc<dyn ChatRepository>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl SubmitKeyUseCase {
    pub fn new(
        keys: AccessKeys,
        repository: Arc<dyn ChatRepository>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            keys,
            repository,
            registry,
            broadcaster,
        }
    }

    /// 提出されたキーを照合する
    ///
    /// 結果は提出者にだけ返信され、ブロードキャストはされない。
    pub async fn execute(
        &self,
        client_id: &ClientId,
        key: &str,
    ) -> Result<KeyOutcome, DispatchError> {
        let Some(role) = self.keys.role_for(key) else {
            tracing::warn!("Client '{}' submitted an invalid key: {:?}", client_id, key);
            self.broadcaster
                .send_to(client_id, &OutboundMessage::KeyRejected)
                .await;
            return Ok(KeyOutcome::Rejected);
        };

        if let Err(e) = self.repository.upsert_user_role(client_id, role).await {
            tracing::error!("Failed to persist role for '{}': {}", client_id, e);
        }
        if !self.registry.set_role(client_id, role).await {
            return Err(DispatchError::UnknownClient(client_id.as_str().to_string()));
        }
        tracing::info!("Client '{}' upgraded to {}", client_id, role);

        self.broadcaster
            .send_to(client_id, &OutboundMessage::KeyAccepted { role })
            .await;
        Ok(KeyOutcome::Granted(role))
    }
}
