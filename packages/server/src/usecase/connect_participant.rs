//! UseCase: 参加者接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectParticipantUseCase::execute() メソッド
//! - 識別子の解決（新規発行・保存済みユーザーの復元）と connectionConfirmed の構築
//!
//! ### なぜこのテストが必要か
//! - 再接続したクライアントが名前・色・ロールを引き継ぐことを保証
//! - ホストにだけ制御用のメタデータが送られることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：ゲスト用エンドポイントへの新規接続、保存済みユーザーの再接続
//! - 正常系：接続中の ID での再接続（古い接続を置き換える）
//! - 異常系：未知の ID で名前が無い接続
//! - エッジケース：キャラクター未選択時はカタログ先頭が選ばれる

use std::sync::Arc;

use crate::{
    domain::{
        CatalogEntry, ChatRepository, Client, ClientId, Color, EndpointKind, FileRepository,
        PusherChannel, Role, SessionConfig, Username,
    },
    infrastructure::dto::websocket::{
        ConnectionConfirmed, HostBootstrap, OutboundMessage, UserChatHistoryEntry,
    },
};

use super::{
    broadcast::Broadcaster,
    error::ConnectError,
    registry::{ConnectionRegistry, ConnectionToken},
    session_state::SessionState,
};

/// 接続要求（クエリパラメータと受け付けたエンドポイント）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub endpoint: EndpointKind,
    /// 空なら新しい ID を発行する
    pub uuid: Option<String>,
    /// 未知の ID の場合は必須
    pub username: Option<String>,
}

/// 確立した接続
#[derive(Debug, Clone)]
pub struct Connection {
    pub client: Client,
    /// 切断時にこの接続だけを削除するためのトークン
    pub token: ConnectionToken,
}

/// 参加者接続のユースケース
pub struct ConnectParticipantUseCase {
    repository: Arc<dyn ChatRepository>,
    files: Arc<dyn FileRepository>,
    session: Arc<SessionState>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl ConnectParticipantUseCase {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        files: Arc<dyn FileRepository>,
        session: Arc<SessionState>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            repository,
            files,
            session,
            registry,
            broadcaster,
        }
    }

    /// 参加者接続を実行
    ///
    /// # Arguments
    ///
    /// * `request` - 接続要求
    /// * `channel` - クライアントへのフレーム送信用チャンネル
    ///
    /// # Returns
    ///
    /// * `Ok(Connection)` - 登録されたクライアントと接続トークン。connectionConfirmed は
    ///   送信キューに積まれ、更新されたユーザー一覧が全員に送信済み。同じ ID の接続が
    ///   既にあった場合、その接続は閉じられる
    /// * `Err(ConnectError)` - 接続拒否
    pub async fn execute(
        &self,
        request: ConnectRequest,
        channel: PusherChannel,
    ) -> Result<Connection, ConnectError> {
        // 1. 識別子と属性の解決
        let client = self.resolve_identity(&request).await?;

        // 2. レジストリへの登録（同じ ID の接続は置き換えられる）
        let token = self.registry.register(client.clone(), channel).await;
        tracing::info!(
            "Client '{}' ({}) connected on the {} endpoint as {}",
            client.id,
            client.username,
            request.endpoint.as_str(),
            client.role
        );

        // 3. 接続確認の送信
        match self.build_confirmation(&client).await {
            Ok(confirmed) => {
                self.broadcaster
                    .send_to(
                        &client.id,
                        &OutboundMessage::ConnectionConfirmed(Box::new(confirmed)),
                    )
                    .await;
            }
            Err(e) => {
                self.registry.remove(&client.id, token).await;
                return Err(e);
            }
        }

        // 4. 全員にユーザー一覧を送信
        self.broadcaster.send_user_list().await;
        Ok(Connection { client, token })
    }

    async fn resolve_identity(&self, request: &ConnectRequest) -> Result<Client, ConnectError> {
        let id = match request.uuid.as_deref().filter(|uuid| !uuid.is_empty()) {
            Some(uuid) => ClientId::new(uuid.to_string())?,
            None => ClientId::generate(),
        };
        let default_role = request.endpoint.default_role();

        if let Some(stored) = self.repository.get_user(&id).await? {
            let role = match stored.role {
                Some(role) => role,
                None => {
                    self.persist_role(&id, default_role).await;
                    default_role
                }
            };
            tracing::debug!("Rehydrated stored user '{}'", id);
            return Ok(Client::new(
                id,
                Username::new(stored.username)?,
                stored.color,
                role,
            ));
        }

        let username = request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConnectError::UsernameRequired(id.as_str().to_string()))?;
        let username = Username::new(username.to_string())?;
        let color = Color::random();
        if let Err(e) = self.repository.upsert_user(&id, &username, &color).await {
            tracing::error!("Failed to persist new user '{}': {}", id, e);
        }
        self.persist_role(&id, default_role).await;
        Ok(Client::new(id, username, color, default_role))
    }

    async fn persist_role(&self, id: &ClientId, role: Role) {
        if let Err(e) = self.repository.upsert_user_role(id, role).await {
            tracing::error!("Failed to persist role for '{}': {}", id, e);
        }
    }

    /// 接続確認フレームを構築する。ホストには制御用のメタデータを含める
    async fn build_confirmation(&self, client: &Client) -> Result<ConnectionConfirmed, ConnectError> {
        let is_host = client.role == Role::Host;
        let mut config = self.session.snapshot().await;

        let cards = if is_host || config.selected_character.is_empty() {
            self.catalog(self.files.character_list().await, "character")
        } else {
            Vec::new()
        };
        if config.selected_character.is_empty() {
            match self.session.ensure_character(&cards).await {
                Ok(updated) => config = updated,
                Err(e) => tracing::error!("Failed to persist default character: {}", e),
            }
        }

        let chat_history: Vec<UserChatHistoryEntry> = self
            .repository
            .read_user_chat()
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let ai_chat_history = self
            .repository
            .read_ai_chat()
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let host = if is_host {
            Some(self.host_bootstrap(&config, cards).await?)
        } else {
            None
        };

        Ok(ConnectionConfirmed {
            client_uuid: client.id.as_str().to_string(),
            chat_history,
            ai_chat_history,
            color: client.color.clone(),
            role: client.role,
            selected_character_display_name: config.selected_char_display_name.clone(),
            new_user_chat_delay: config.user_chat_delay,
            new_ai_chat_delay: config.ai_chat_delay,
            user_list: self.broadcaster.user_list().await,
            host,
        })
    }

    async fn host_bootstrap(
        &self,
        config: &SessionConfig,
        cards: Vec<CatalogEntry>,
    ) -> Result<HostBootstrap, ConnectError> {
        let instructs = self.catalog(self.files.instruct_list().await, "instruct format");
        let presets = self.catalog(self.files.sampler_preset_list().await, "sampler preset");
        let api_list = self
            .repository
            .get_apis()
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let api = self
            .repository
            .get_api(&config.selected_api)
            .await?
            .map(Into::into);

        Ok(HostBootstrap {
            card_list: cards.into_iter().map(Into::into).collect(),
            instruct_list: instructs.into_iter().map(Into::into).collect(),
            sampler_preset_list: presets.into_iter().map(Into::into).collect(),
            selected_character: config.selected_character.clone(),
            selected_sampler_preset: config.selected_preset.clone(),
            engine_mode: config.engine_mode,
            is_auto_response: config.is_auto_response,
            is_streaming: config.is_streaming,
            context_size: config.context_size,
            response_length: config.response_length,
            d1jb: config.d1jb.clone(),
            instruct_format: config.instruct_format.clone(),
            api_list,
            selected_api: config.selected_api.clone(),
            selected_model: config.selected_model.clone(),
            api,
        })
    }

    fn catalog<E: std::fmt::Display>(
        &self,
        result: Result<Vec<CatalogEntry>, E>,
        what: &str,
    ) -> Vec<CatalogEntry> {
        result.unwrap_or_else(|e| {
            tracing::warn!("Failed to list {} catalog: {}", what, e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ConfigRepository, MessagePusher, MockConfigRepository, MockFileRepository},
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryChatRepository,
        },
    };
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct Fixture {
        usecase: ConnectParticipantUseCase,
        repository: Arc<InMemoryChatRepository>,
        registry: Arc<ConnectionRegistry>,
    }

    async fn create_fixture(files: MockFileRepository, saved: SessionConfig) -> Fixture {
        let mut store = MockConfigRepository::new();
        store.expect_load().returning(move || Ok(Some(saved.clone())));
        store.expect_save().returning(|_| Ok(()));
        let store: Arc<dyn ConfigRepository> = Arc::new(store);
        let session = Arc::new(SessionState::load(store).await.unwrap());

        let pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
        let registry = Arc::new(ConnectionRegistry::new(pusher.clone()));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), pusher));
        let repository = Arc::new(InMemoryChatRepository::new());

        Fixture {
            usecase: ConnectParticipantUseCase::new(
                repository.clone(),
                Arc::new(files),
                session,
                registry.clone(),
                broadcaster,
            ),
            repository,
            registry,
        }
    }

    fn guest_request(uuid: Option<&str>, username: Option<&str>) -> ConnectRequest {
        ConnectRequest {
            endpoint: EndpointKind::Guest,
            uuid: uuid.map(str::to_string),
            username: username.map(str::to_string),
        }
    }

    fn catalog_files() -> MockFileRepository {
        let mut files = MockFileRepository::new();
        files.expect_character_list().returning(|| {
            Ok(vec![CatalogEntry {
                filename: "characters/alice.json".to_string(),
                name: "Alice".to_string(),
            }])
        });
        files.expect_instruct_list().returning(|| Ok(vec![]));
        files.expect_sampler_preset_list().returning(|| Ok(vec![]));
        files
    }

    fn frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_guest_without_uuid_gets_fresh_identity() {
        // テスト項目: ゲスト用エンドポイントに uuid 無しで接続すると新しい ID と guest ロールが割り当てられる
        // given (前提条件):
        let fixture = create_fixture(MockFileRepository::new(), SessionConfig::default()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when (操作):
        let client = fixture
            .usecase
            .execute(guest_request(None, Some("alice")), tx)
            .await
            .unwrap()
            .client;

        // then (期待する結果):
        assert_eq!(client.role, Role::Guest);
        assert!(client.color.is_palette_color());
        assert_eq!(client.id.as_str().len(), 36);
        let confirmed = frame(&mut rx);
        assert_eq!(confirmed["type"], "connectionConfirmed");
        assert_eq!(confirmed["clientUUID"], client.id.as_str());
        assert_eq!(confirmed["role"], "guest");
        assert_eq!(confirmed["selectedCharacterDisplayName"], "Coding Sensei");
        assert!(confirmed.get("cardList").is_none());
        assert!(confirmed.get("APIList").is_none());
        let user_list = frame(&mut rx);
        assert_eq!(user_list["type"], "userList");
        assert_eq!(user_list["userList"][0]["username"], "alice");

        let stored = fixture.repository.get_user(&client.id).await.unwrap().unwrap();
        assert_eq!(stored.role, Some(Role::Guest));
    }

    #[tokio::test]
    async fn test_known_user_keeps_stored_attributes() {
        // テスト項目: 保存済みの ID で接続すると名前・色・ロールが引き継がれる
        // given (前提条件):
        let fixture = create_fixture(MockFileRepository::new(), SessionConfig::default()).await;
        let id = ClientId::new("returning".to_string()).unwrap();
        let color = Color::from_stored("#4CFF69".to_string());
        fixture
            .repository
            .upsert_user(&id, &Username::new("bob".to_string()).unwrap(), &color)
            .await
            .unwrap();
        fixture
            .repository
            .upsert_user_role(&id, Role::Mod)
            .await
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let client = fixture
            .usecase
            .execute(guest_request(Some("returning"), None), tx)
            .await
            .unwrap()
            .client;

        // then (期待する結果):
        assert_eq!(client.username.as_str(), "bob");
        assert_eq!(client.color, color);
        assert_eq!(client.role, Role::Mod);
    }

    #[tokio::test]
    async fn test_unknown_id_without_username_is_rejected() {
        // テスト項目: 未知の ID で名前が無い接続は拒否され、登録されない
        // given (前提条件):
        let fixture = create_fixture(MockFileRepository::new(), SessionConfig::default()).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let result = fixture
            .usecase
            .execute(guest_request(Some("stranger"), Some("  ")), tx)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ConnectError::UsernameRequired(_))));
        assert!(fixture.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_reconnect_with_connected_id_replaces_connection() {
        // テスト項目: 接続中の ID で再接続すると古い接続が置き換えられ、古い送信キューが閉じられる
        // given (前提条件):
        let fixture = create_fixture(MockFileRepository::new(), SessionConfig::default()).await;
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let first = fixture
            .usecase
            .execute(guest_request(Some("same"), Some("amy")), tx1)
            .await
            .unwrap();

        // when (操作):
        let second = fixture
            .usecase
            .execute(guest_request(Some("same"), Some("amy")), tx2)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(second.client.id, first.client.id);
        assert_ne!(second.token, first.token);
        assert_eq!(fixture.registry.len().await, 1);
        assert_eq!(frame(&mut rx2)["type"], "connectionConfirmed");
        let user_list = frame(&mut rx2);
        assert_eq!(user_list["userList"].as_array().unwrap().len(), 1);
        while rx1.try_recv().is_ok() {}
        assert_eq!(rx1.recv().await, None);
    }

    #[tokio::test]
    async fn test_host_receives_bootstrap_and_default_character() {
        // テスト項目: ホストには制御用メタデータが送られ、未選択のキャラクターはカタログ先頭になる
        // given (前提条件):
        let saved = SessionConfig {
            selected_character: String::new(),
            ..SessionConfig::default()
        };
        let fixture = create_fixture(catalog_files(), saved).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            endpoint: EndpointKind::Host,
            uuid: None,
            username: Some("host".to_string()),
        };

        // when (操作):
        let client = fixture.usecase.execute(request, tx).await.unwrap().client;

        // then (期待する結果):
        assert_eq!(client.role, Role::Host);
        let confirmed = frame(&mut rx);
        assert_eq!(confirmed["role"], "host");
        assert_eq!(confirmed["selectedCharacter"], "characters/alice.json");
        assert_eq!(confirmed["selectedCharacterDisplayName"], "Alice");
        assert_eq!(confirmed["cardList"][0]["name"], "Alice");
        assert_eq!(confirmed["APIList"][0]["name"], "Default");
        assert_eq!(confirmed["API"]["endpoint"], "localhost:5000");
        assert_eq!(confirmed["engineMode"], "TC");
        assert_eq!(confirmed["isAutoResponse"], true);
    }
}
