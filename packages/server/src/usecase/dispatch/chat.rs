//! チャットの送信・消去・再生成、表示名の変更

use crate::{
    domain::{ChatId, Client, NewAiChatMessage, Username, text::replace_macros},
    infrastructure::dto::{
        conversion::ai_chat_user_list,
        websocket::{AiChatUser, ChatMessagePayload, OutboundMessage},
    },
    usecase::{ai_response::character_color, broadcast::Audience, error::DispatchError},
};

use super::{Dispatched, Router};

impl Router {
    /// サイドチャットを非アクティブにして全員に通知する
    pub(super) async fn clear_chat(&self) -> Result<Dispatched, DispatchError> {
        if let Err(e) = self.repository.new_user_chat_session().await {
            tracing::error!("Failed to clear the user chat: {}", e);
        }
        self.broadcaster
            .send(&OutboundMessage::ClearChat, Audience::All)
            .await;
        Ok(Dispatched::Done)
    }

    /// 新しいセッションを開始し、キャラクターの最初のメッセージを投稿する
    pub(super) async fn clear_ai_chat(
        &self,
        requester: &Client,
    ) -> Result<Dispatched, DispatchError> {
        let session = self.repository.new_session().await?;
        tracing::info!("Started AI chat session {}", session);
        self.broadcaster
            .send(&OutboundMessage::ClearAiChat, Audience::All)
            .await;

        let config = self.session.snapshot().await;
        let card = self.files.read_character(&config.selected_character).await?;
        let first_message =
            replace_macros(&card.first_mes, requester.username.as_str(), &card.name);
        if first_message.is_empty() {
            return Ok(Dispatched::Done);
        }
        let character_name = if config.selected_char_display_name.is_empty() {
            card.name.clone()
        } else {
            config.selected_char_display_name.clone()
        };
        let color = character_color(self.repository.as_ref(), &character_name).await?;

        if let Err(e) = self
            .repository
            .write_ai_chat_message(NewAiChatMessage::from_character(
                &character_name,
                first_message.clone(),
            ))
            .await
        {
            tracing::error!("Failed to persist the first message: {}", e);
        }
        let message = OutboundMessage::ChatMessage(ChatMessagePayload {
            chat_id: ChatId::AiChat,
            username: character_name.clone(),
            content: first_message,
            user_color: Some(color.clone()),
            ai_chat_user_list: Some(vec![AiChatUser {
                username: character_name,
                color: Some(color),
            }]),
        });
        self.broadcaster.send(&message, Audience::All).await;
        Ok(Dispatched::Done)
    }

    /// アクティブセッションの最新のエントリを削除し、履歴を配信し直す
    pub(super) async fn delete_last(&self) -> Result<Dispatched, DispatchError> {
        if let Err(e) = self.repository.remove_last_ai_chat_message().await {
            tracing::error!("Failed to remove the last AI chat entry: {}", e);
        }
        let chat_history = self
            .repository
            .read_ai_chat()
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        self.broadcaster
            .send(&OutboundMessage::ChatUpdate { chat_history }, Audience::All)
            .await;
        Ok(Dispatched::Done)
    }

    /// 最新のエントリを削除して応答を生成し直す
    pub(super) async fn ai_retry(&self, requester: Client) -> Result<Dispatched, DispatchError> {
        self.delete_last().await?;
        Ok(Dispatched::AiResponseSpawned(
            self.ai_response.spawn(requester),
        ))
    }

    pub(super) async fn chat_message(
        &self,
        sender: Client,
        chat_id: ChatId,
        content: String,
        user_input: String,
    ) -> Result<Dispatched, DispatchError> {
        match chat_id {
            ChatId::UserChat => {
                if let Err(e) = self
                    .repository
                    .write_user_chat_message(&sender.id, &content)
                    .await
                {
                    tracing::error!("Failed to persist user chat message: {}", e);
                }
                let message = OutboundMessage::ChatMessage(ChatMessagePayload {
                    chat_id,
                    username: sender.username.as_str().to_string(),
                    content,
                    user_color: Some(sender.color.clone()),
                    ai_chat_user_list: None,
                });
                self.broadcaster.send(&message, Audience::All).await;
                Ok(Dispatched::Done)
            }
            ChatId::AiChat => {
                // 空の入力は AI 応答の強制トリガー
                let forced = user_input.is_empty();
                if !forced {
                    if let Err(e) = self
                        .repository
                        .write_ai_chat_message(NewAiChatMessage::from_user(
                            &sender,
                            user_input.clone(),
                        ))
                        .await
                    {
                        tracing::error!("Failed to persist AI chat message: {}", e);
                    }
                    let history = self.repository.read_ai_chat().await?;
                    let message = OutboundMessage::ChatMessage(ChatMessagePayload {
                        chat_id,
                        username: sender.username.as_str().to_string(),
                        content: user_input,
                        user_color: Some(sender.color.clone()),
                        ai_chat_user_list: Some(ai_chat_user_list(&history)),
                    });
                    self.broadcaster.send(&message, Audience::All).await;
                }

                if forced || self.session.snapshot().await.is_auto_response {
                    return Ok(Dispatched::AiResponseSpawned(
                        self.ai_response.spawn(sender),
                    ));
                }
                Ok(Dispatched::Done)
            }
        }
    }

    pub(super) async fn username_change(
        &self,
        sender: &Client,
        new_name: String,
        old_name: Option<String>,
    ) -> Result<Dispatched, DispatchError> {
        let username = Username::new(new_name)?;
        let previous = self
            .registry
            .rename(&sender.id, username.clone())
            .await
            .map(Username::into_string)
            .or(old_name)
            .unwrap_or_default();
        if let Err(e) = self
            .repository
            .upsert_user(&sender.id, &username, &sender.color)
            .await
        {
            tracing::error!("Failed to persist username of '{}': {}", sender.id, e);
        }
        tracing::info!("Client '{}' renamed '{}' -> '{}'", sender.id, previous, username);

        let notice = OutboundMessage::UserChangedName {
            content: format!("[System]: {} >>> {}", previous, username),
        };
        self.broadcaster.send(&notice, Audience::All).await;
        self.broadcaster.send_user_list().await;
        Ok(Dispatched::Done)
    }
}
