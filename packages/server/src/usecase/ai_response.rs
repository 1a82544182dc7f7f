//! UseCase: AI 応答の生成
//!
//! 設定のスナップショットとアクティブセッションの履歴から推論リクエストを組み立て、
//! ストリーミング設定に応じて StreamAggregator 経由、または 1 回の呼び出しで応答を
//! 配信・永続化します。生成は専用のタスクで実行され、要求者の受信ループを
//! ブロックしません。

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    domain::{
        ChatId, ChatRepository, Client, Color, InferenceError, InferenceProvider,
        InferenceRequest, NewAiChatMessage, RepositoryError, text::trim_incomplete_sentences,
    },
    infrastructure::dto::{
        conversion::ai_chat_user_list,
        websocket::{AiResponsePayload, OutboundMessage},
    },
};

use super::{
    broadcast::{Audience, Broadcaster},
    error::DispatchError,
    session_state::SessionState,
    stream::{StreamAggregator, StreamContext, StreamOutcome},
};

/// キャラクターの色を返す。未登録ならパレットから選んで永続化する
pub async fn character_color(
    repository: &dyn ChatRepository,
    character_name: &str,
) -> Result<Color, RepositoryError> {
    if let Some(color) = repository.get_character_color(character_name).await? {
        return Ok(color);
    }
    let color = Color::random();
    repository
        .upsert_character(character_name, character_name, &color)
        .await?;
    tracing::debug!("Assigned {} to character '{}'", color.as_str(), character_name);
    Ok(color)
}

/// AI 応答生成のユースケース
pub struct AiResponseUseCase {
    session: Arc<SessionState>,
    repository: Arc<dyn ChatRepository>,
    provider: Arc<dyn InferenceProvider>,
    broadcaster: Arc<Broadcaster>,
    aggregator: Arc<StreamAggregator>,
}

impl AiResponseUseCase {
    pub fn new(
        session: Arc<SessionState>,
        repository: Arc<dyn ChatRepository>,
        provider: Arc<dyn InferenceProvider>,
        broadcaster: Arc<Broadcaster>,
        aggregator: Arc<StreamAggregator>,
    ) -> Self {
        Self {
            session,
            repository,
            provider,
            broadcaster,
            aggregator,
        }
    }

    /// 応答生成を専用タスクで開始する
    ///
    /// 要求者の接続が閉じても生成と永続化は継続する。
    pub fn spawn(self: &Arc<Self>, requester: Client) -> JoinHandle<()> {
        let usecase = self.clone();
        tokio::spawn(async move {
            if let Err(e) = usecase.execute(&requester).await {
                tracing::error!(
                    "AI response requested by '{}' failed: {}",
                    requester.id,
                    e
                );
            }
        })
    }

    /// 応答を 1 件生成する
    pub async fn execute(&self, requester: &Client) -> Result<(), DispatchError> {
        let config = self.session.snapshot().await;
        let api = self
            .repository
            .get_api(&config.selected_api)
            .await?
            .ok_or(InferenceError::NoApi)?;
        let history = self.repository.read_ai_chat().await?;
        let character_name = config.selected_char_display_name.clone();
        character_color(self.repository.as_ref(), &character_name).await?;
        let user_list = ai_chat_user_list(&history);

        let request = InferenceRequest {
            api,
            engine_mode: config.engine_mode,
            model: config.selected_model.clone(),
            character_name: character_name.clone(),
            user_name: requester.username.as_str().to_string(),
            history,
            d1jb: config.d1jb.clone(),
            instruct_sequences: config.instruct_sequences.clone(),
            samplers: config.samplers.clone(),
            response_length: config.response_length,
            context_size: config.context_size,
        };
        tracing::info!(
            "Requesting AI response from '{}' ({} history entries, streaming: {})",
            request.api.name,
            request.history.len(),
            config.is_streaming
        );

        if config.is_streaming {
            let context = StreamContext {
                chat_id: ChatId::AiChat,
                character_name,
                user_color: Some(requester.color.clone()),
                ai_chat_user_list: user_list,
            };
            let (ticket, sink) = self.aggregator.begin(context).await;
            let outcome = match self.provider.stream(&request, sink).await {
                Ok(Some(text)) => StreamOutcome::Complete(text),
                Ok(None) => StreamOutcome::Truncated,
                Err(e) => StreamOutcome::Failed(e),
            };
            if !self.aggregator.finish(ticket, outcome).await {
                tracing::info!("Stream was superseded before it finished");
            }
            return Ok(());
        }

        let text = self.provider.complete(&request).await?;
        let content = trim_incomplete_sentences(&text);
        if content.is_empty() {
            tracing::warn!("AI response was empty, nothing to send");
            return Ok(());
        }
        if let Err(e) = self
            .repository
            .write_ai_chat_message(NewAiChatMessage::from_character(
                &character_name,
                content.clone(),
            ))
            .await
        {
            tracing::error!("Failed to persist AI response: {}", e);
        }
        let response = OutboundMessage::AiResponse(AiResponsePayload {
            chat_id: ChatId::AiChat,
            username: character_name,
            content,
            user_color: Some(requester.color.clone()),
            ai_chat_user_list: user_list,
        });
        self.broadcaster.send(&response, Audience::All).await;
        Ok(())
    }
}
