//! セッション設定の変更
//!
//! どの変更も永続化が成功してから通知されます。数値とフラグの設定はホストにだけ、
//! それ以外は全員に通知されます。

use crate::{
    domain::{ConfigUpdate, EngineMode, Role, SessionConfig},
    infrastructure::dto::websocket::OutboundMessage,
    usecase::{broadcast::Audience, error::DispatchError},
};

use super::{Dispatched, Router};

const HOSTS: Audience = Audience::Role(Role::Host);

impl Router {
    /// 変更を適用し、反映後の値から組み立てたフレームを送信する
    async fn apply_and_notify(
        &self,
        update: ConfigUpdate,
        audience: Audience,
        notify: impl FnOnce(&SessionConfig) -> OutboundMessage,
    ) -> Result<Dispatched, DispatchError> {
        let config = self.session.apply(update).await?;
        self.broadcaster.send(&notify(&config), audience).await;
        Ok(Dispatched::Done)
    }

    pub(super) async fn toggle_auto_response(
        &self,
        value: bool,
    ) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::AutoResponse(value), HOSTS, |c| {
            OutboundMessage::AutoAiToggleUpdate {
                value: c.is_auto_response,
            }
        })
        .await
    }

    pub(super) async fn toggle_streaming(&self, value: bool) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::Streaming(value), HOSTS, |c| {
            OutboundMessage::StreamingToggleUpdate {
                value: c.is_streaming,
            }
        })
        .await
    }

    pub(super) async fn adjust_context_size(
        &self,
        value: u32,
    ) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::ContextSize(value), HOSTS, |c| {
            OutboundMessage::ContextSizeChange {
                value: c.context_size,
            }
        })
        .await
    }

    pub(super) async fn adjust_response_length(
        &self,
        value: u32,
    ) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::ResponseLength(value), HOSTS, |c| {
            OutboundMessage::ResponseLengthChange {
                value: c.response_length,
            }
        })
        .await
    }

    pub(super) async fn model_select(&self, value: String) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::Model(value), HOSTS, |c| {
            OutboundMessage::ModelChange {
                value: c.selected_model.clone(),
            }
        })
        .await
    }

    pub(super) async fn ai_chat_delay_change(
        &self,
        value: u32,
    ) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::AiChatDelay(value), Audience::All, |c| {
            OutboundMessage::AiChatDelayChange {
                value: c.ai_chat_delay,
            }
        })
        .await
    }

    pub(super) async fn user_chat_delay_change(
        &self,
        value: u32,
    ) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::UserChatDelay(value), Audience::All, |c| {
            OutboundMessage::UserChatDelayChange {
                value: c.user_chat_delay,
            }
        })
        .await
    }

    pub(super) async fn change_character(
        &self,
        filename: String,
        display_name: String,
    ) -> Result<Dispatched, DispatchError> {
        let update = ConfigUpdate::Character {
            filename,
            display_name,
        };
        self.apply_and_notify(update, Audience::All, |c| OutboundMessage::ChangeCharacter {
            char: c.selected_character.clone(),
            char_display_name: c.selected_char_display_name.clone(),
        })
        .await
    }

    /// プリセットの中身をファイルから読み込んでから切り替える
    pub(super) async fn change_sampler_preset(
        &self,
        filename: String,
    ) -> Result<Dispatched, DispatchError> {
        let samplers = self.files.read_json(&filename).await?;
        let update = ConfigUpdate::SamplerPreset { filename, samplers };
        self.apply_and_notify(update, Audience::All, |c| {
            OutboundMessage::ChangeSamplerPreset {
                new_preset: c.selected_preset.clone(),
            }
        })
        .await
    }

    /// instruct 形式の中身をファイルから読み込んでから切り替える
    pub(super) async fn change_instruct_format(
        &self,
        filename: String,
    ) -> Result<Dispatched, DispatchError> {
        let sequences = self.files.read_json(&filename).await?;
        let update = ConfigUpdate::InstructFormat {
            filename,
            sequences,
        };
        self.apply_and_notify(update, Audience::All, |c| {
            OutboundMessage::ChangeInstructFormat {
                new_instruct_format: c.instruct_format.clone(),
            }
        })
        .await
    }

    pub(super) async fn change_d1jb(&self, value: String) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::D1jb(value), Audience::All, |c| {
            OutboundMessage::ChangeD1jb {
                new_d1jb: c.d1jb.clone(),
            }
        })
        .await
    }

    pub(super) async fn mode_change(&self, mode: EngineMode) -> Result<Dispatched, DispatchError> {
        self.apply_and_notify(ConfigUpdate::EngineMode(mode), Audience::All, |c| {
            OutboundMessage::ModeChange {
                engine_mode: c.engine_mode,
            }
        })
        .await
    }
}
