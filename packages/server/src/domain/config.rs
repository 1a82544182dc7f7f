//! Operator-adjustable session configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{entity::ApiRecord, value_object::EngineMode};

/// The live chat/inference settings, persisted as `config.json`.
///
/// Field names on disk follow the legacy configuration file so existing
/// files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub engine_mode: EngineMode,
    pub selected_character: String,
    pub selected_char_display_name: String,
    pub response_length: u32,
    pub context_size: u32,
    pub is_auto_response: bool,
    pub is_streaming: bool,
    pub selected_preset: String,
    pub samplers: Value,
    pub instruct_format: String,
    pub instruct_sequences: Value,
    #[serde(rename = "D1JB")]
    pub d1jb: String,
    #[serde(rename = "selectedAPI")]
    pub selected_api: String,
    pub selected_model: String,
    #[serde(rename = "AIChatDelay")]
    pub ai_chat_delay: u32,
    pub user_chat_delay: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine_mode: EngineMode::TextCompletion,
            selected_character: "characters/CodingSensei.json".to_string(),
            selected_char_display_name: "Coding Sensei".to_string(),
            response_length: 200,
            context_size: 2048,
            is_auto_response: true,
            is_streaming: true,
            selected_preset: "api-presets/TC-Temp-2_MinP-0.2.json".to_string(),
            samplers: Value::Null,
            instruct_format: "instructFormats/ChatML.json".to_string(),
            instruct_sequences: Value::Null,
            d1jb: String::new(),
            selected_api: ApiRecord::DEFAULT_NAME.to_string(),
            selected_model: String::new(),
            ai_chat_delay: 0,
            user_chat_delay: 0,
        }
    }
}

/// One mutation of [`SessionConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    AutoResponse(bool),
    Streaming(bool),
    ContextSize(u32),
    ResponseLength(u32),
    Model(String),
    AiChatDelay(u32),
    UserChatDelay(u32),
    Character {
        filename: String,
        display_name: String,
    },
    SamplerPreset {
        filename: String,
        samplers: Value,
    },
    InstructFormat {
        filename: String,
        sequences: Value,
    },
    D1jb(String),
    EngineMode(EngineMode),
    /// Selecting another API invalidates the selected model.
    Api(String),
}

impl ConfigUpdate {
    /// Apply this update to `config` in place.
    pub fn apply_to(self, config: &mut SessionConfig) {
        match self {
            ConfigUpdate::AutoResponse(value) => config.is_auto_response = value,
            ConfigUpdate::Streaming(value) => config.is_streaming = value,
            ConfigUpdate::ContextSize(value) => config.context_size = value,
            ConfigUpdate::ResponseLength(value) => config.response_length = value,
            ConfigUpdate::Model(value) => config.selected_model = value,
            ConfigUpdate::AiChatDelay(value) => config.ai_chat_delay = value,
            ConfigUpdate::UserChatDelay(value) => config.user_chat_delay = value,
            ConfigUpdate::Character {
                filename,
                display_name,
            } => {
                config.selected_character = filename;
                config.selected_char_display_name = display_name;
            }
            ConfigUpdate::SamplerPreset { filename, samplers } => {
                config.selected_preset = filename;
                config.samplers = samplers;
            }
            ConfigUpdate::InstructFormat {
                filename,
                sequences,
            } => {
                config.instruct_format = filename;
                config.instruct_sequences = sequences;
            }
            ConfigUpdate::D1jb(value) => config.d1jb = value,
            ConfigUpdate::EngineMode(mode) => config.engine_mode = mode,
            ConfigUpdate::Api(name) => {
                config.selected_api = name;
                config.selected_model.clear();
            }
        }
    }
}
