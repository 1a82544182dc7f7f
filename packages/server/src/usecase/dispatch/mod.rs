//! UseCase: 受信フレームの振り分け
//!
//! 受信したフレームを種別ごとのハンドラーに振り分けます。送信者のロールは
//! フレームごとにレジストリから読み直され、ホスト専用の種別はホスト以外から
//! 受け取った場合に破棄されます。
//!
//! ハンドラーは関心ごとにサブモジュールへ分かれています。
//!
//! - `chat`: チャットの送信・消去・再生成、表示名の変更
//! - `settings`: セッション設定の変更
//! - `api`: 推論 API の登録・切り替え・疎通確認
//! - `past_chats`: 過去のチャットセッションの一覧・読込・削除

mod api;
mod chat;
mod past_chats;
mod settings;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    domain::{ChatRepository, ClientId, FileRepository, InferenceProvider, Role},
    infrastructure::dto::websocket::{FrameTag, InboundMessage, Permission},
};

use super::{
    ai_response::AiResponseUseCase, broadcast::Broadcaster, error::DispatchError,
    registry::ConnectionRegistry, session_state::SessionState, submit_key::SubmitKeyUseCase,
};

/// Router が依存する協調オブジェクト
pub struct RouterDeps {
    pub session: Arc<SessionState>,
    pub repository: Arc<dyn ChatRepository>,
    pub files: Arc<dyn FileRepository>,
    pub provider: Arc<dyn InferenceProvider>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub ai_response: Arc<AiResponseUseCase>,
    pub submit_key: Arc<SubmitKeyUseCase>,
}

/// フレーム処理の結果
#[derive(Debug)]
pub enum Dispatched {
    Done,
    /// AI 応答の生成タスクを起動した
    AiResponseSpawned(JoinHandle<()>),
}

pub struct Router {
    session: Arc<SessionState>,
    repository: Arc<dyn ChatRepository>,
    files: Arc<dyn FileRepository>,
    provider: Arc<dyn InferenceProvider>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    ai_response: Arc<AiResponseUseCase>,
    submit_key: Arc<SubmitKeyUseCase>,
}

impl Router {
    pub fn new(deps: RouterDeps) -> Self {
        Self {
            session: deps.session,
            repository: deps.repository,
            files: deps.files,
            provider: deps.provider,
            registry: deps.registry,
            broadcaster: deps.broadcaster,
            ai_response: deps.ai_response,
            submit_key: deps.submit_key,
        }
    }

    /// 1 フレームを処理する
    ///
    /// 権限の確認は `type` だけを読んで行い、ペイロードの検証はその後に行う。
    /// どのエラーも接続を切断しない。呼び出し側でログに記録して次のフレームへ進む。
    pub async fn dispatch(
        &self,
        sender: &ClientId,
        frame: &str,
    ) -> Result<Dispatched, DispatchError> {
        let tag: FrameTag = serde_json::from_str(frame)?;
        let client = self
            .registry
            .lookup(sender)
            .await
            .ok_or_else(|| DispatchError::UnknownClient(sender.as_str().to_string()))?;

        if Permission::for_kind(&tag.kind) == Permission::HostOnly && client.role != Role::Host {
            return Err(DispatchError::Unauthorized {
                kind: tag.kind,
                role: client.role,
            });
        }

        let message: InboundMessage = serde_json::from_str(frame)?;
        tracing::debug!("Dispatching '{}' from '{}'", message.kind(), sender);

        match message {
            // チャット
            InboundMessage::ClearChat => self.clear_chat().await,
            InboundMessage::ClearAiChat => self.clear_ai_chat(&client).await,
            InboundMessage::DeleteLast => self.delete_last().await,
            InboundMessage::AiRetry => self.ai_retry(client).await,
            InboundMessage::ChatMessage {
                chat_id,
                content,
                user_input,
            } => self.chat_message(client, chat_id, content, user_input).await,
            InboundMessage::UsernameChange { new_name, old_name } => {
                self.username_change(&client, new_name, old_name).await
            }
            InboundMessage::SubmitKey { key } => {
                self.submit_key.execute(&client.id, &key).await?;
                Ok(Dispatched::Done)
            }

            // 設定
            InboundMessage::ToggleAutoResponse { value } => self.toggle_auto_response(value).await,
            InboundMessage::ToggleStreaming { value } => self.toggle_streaming(value).await,
            InboundMessage::AdjustContextSize { value } => self.adjust_context_size(value).await,
            InboundMessage::AdjustResponseLength { value } => {
                self.adjust_response_length(value).await
            }
            InboundMessage::ModelSelect { value } => self.model_select(value).await,
            InboundMessage::AiChatDelayChange { value } => self.ai_chat_delay_change(value).await,
            InboundMessage::UserChatDelayChange { value } => {
                self.user_chat_delay_change(value).await
            }
            InboundMessage::ChangeCharacterRequest {
                new_char,
                new_char_display_name,
            } => self.change_character(new_char, new_char_display_name).await,
            InboundMessage::ChangeSamplerPreset { new_preset } => {
                self.change_sampler_preset(new_preset).await
            }
            InboundMessage::ChangeInstructFormat {
                new_instruct_format,
            } => self.change_instruct_format(new_instruct_format).await,
            InboundMessage::ChangeD1jb { new_d1jb } => self.change_d1jb(new_d1jb).await,
            InboundMessage::ModeChange { new_mode } => self.mode_change(new_mode).await,

            // API
            InboundMessage::AddNewApi(api) => self.add_new_api(api).await,
            InboundMessage::ApiChange { new_api } => self.api_change(new_api).await,
            InboundMessage::TestNewApi { api } => self.test_new_api(&client, api).await,
            InboundMessage::ModelListRequest { api } => {
                self.model_list_request(&client, api).await
            }

            // 過去のチャット
            InboundMessage::PastChatsRequest => self.past_chats_request().await,
            InboundMessage::LoadPastChat { session } => self.load_past_chat(session).await,
            InboundMessage::PastChatDelete { session_id } => {
                self.past_chat_delete(session_id).await
            }

            InboundMessage::Unknown => {
                tracing::warn!("Ignoring frame of unknown kind from '{}'", sender);
                Ok(Dispatched::Done)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! ハンドラーのテストで共有するフィクスチャ

    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        domain::{
            AccessKeys, Client, Color, ConfigRepository, MessagePusher, MockConfigRepository,
            MockFileRepository, MockInferenceProvider, SessionConfig, Username,
        },
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryChatRepository,
        },
        usecase::stream::StreamAggregator,
    };

    pub struct Fixture {
        pub router: Router,
        pub repository: Arc<InMemoryChatRepository>,
        pub session: Arc<SessionState>,
        pub registry: Arc<ConnectionRegistry>,
    }

    pub struct Member {
        pub id: ClientId,
        pub rx: mpsc::UnboundedReceiver<String>,
    }

    impl Member {
        /// 受信済みのフレームを全て取り出す
        pub fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&frame).unwrap());
            }
            frames
        }
    }

    pub async fn create_fixture(
        files: MockFileRepository,
        provider: MockInferenceProvider,
    ) -> Fixture {
        let mut store = MockConfigRepository::new();
        store
            .expect_load()
            .returning(|| Ok(Some(SessionConfig::default())));
        store.expect_save().returning(|_| Ok(()));
        let store: Arc<dyn ConfigRepository> = Arc::new(store);
        let session = Arc::new(SessionState::load(store).await.unwrap());

        let pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
        let registry = Arc::new(ConnectionRegistry::new(pusher.clone()));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), pusher));
        let repository = Arc::new(InMemoryChatRepository::new());
        let provider: Arc<dyn InferenceProvider> = Arc::new(provider);
        let aggregator = Arc::new(StreamAggregator::new(
            broadcaster.clone(),
            repository.clone(),
        ));
        let ai_response = Arc::new(AiResponseUseCase::new(
            session.clone(),
            repository.clone(),
            provider.clone(),
            broadcaster.clone(),
            aggregator,
        ));
        let submit_key = Arc::new(SubmitKeyUseCase::new(
            AccessKeys::new("host-key".to_string(), "mod-key".to_string()),
            repository.clone(),
            registry.clone(),
            broadcaster.clone(),
        ));

        let router = Router::new(RouterDeps {
            session: session.clone(),
            repository: repository.clone(),
            files: Arc::new(files),
            provider,
            registry: registry.clone(),
            broadcaster,
            ai_response,
            submit_key,
        });
        Fixture {
            router,
            repository,
            session,
            registry,
        }
    }

    pub async fn join(fixture: &Fixture, name: &str, role: Role) -> Member {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::new(format!("{name}-id")).unwrap();
        let client = Client::new(
            id.clone(),
            Username::new(name.to_string()).unwrap(),
            Color::from_stored("#4CCAFF".to_string()),
            role,
        );
        fixture
            .repository
            .upsert_user(&client.id, &client.username, &client.color)
            .await
            .unwrap();
        fixture.registry.register(client, tx).await;
        Member { id, rx }
    }

    pub fn kinds(frames: &[Value]) -> Vec<&str> {
        frames.iter().filter_map(|f| f["type"].as_str()).collect()
    }
}
