//! WebSocket frame DTOs.
//!
//! Every frame is a JSON object whose `type` field selects the variant.
//! Field names follow the wire protocol the browser client speaks, which
//! mixes camelCase with a few legacy spellings (`chatID`, `D1JB`, ...).

use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, Color, EngineMode, MessageEntity, Role, SessionId};

// ========================================
// Inbound (client → server)
// ========================================

/// Frames a client may send.
///
/// Unrecognized `type` values deserialize to [`InboundMessage::Unknown`]
/// so they can be logged and dropped without treating the frame as
/// malformed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "clearChat")]
    ClearChat,
    #[serde(rename = "clearAIChat")]
    ClearAiChat,
    #[serde(rename = "deleteLast")]
    DeleteLast,
    #[serde(rename = "AIRetry")]
    AiRetry,
    #[serde(rename = "toggleAutoResponse")]
    ToggleAutoResponse { value: bool },
    #[serde(rename = "toggleStreaming")]
    ToggleStreaming { value: bool },
    #[serde(rename = "adjustContextSize")]
    AdjustContextSize { value: u32 },
    #[serde(rename = "adjustResponseLength")]
    AdjustResponseLength { value: u32 },
    #[serde(rename = "modelSelect")]
    ModelSelect { value: String },
    #[serde(rename = "AIChatDelayChange")]
    AiChatDelayChange { value: u32 },
    #[serde(rename = "userChatDelayChange")]
    UserChatDelayChange { value: u32 },
    #[serde(rename = "addNewAPI")]
    AddNewApi(ApiRecordDto),
    #[serde(rename = "APIChange")]
    ApiChange {
        #[serde(rename = "newAPI")]
        new_api: String,
    },
    #[serde(rename = "testNewAPI")]
    TestNewApi { api: ApiRecordDto },
    #[serde(rename = "modelListRequest")]
    ModelListRequest { api: ApiRecordDto },
    #[serde(rename = "changeCharacterRequest")]
    ChangeCharacterRequest {
        #[serde(rename = "newChar")]
        new_char: String,
        #[serde(rename = "newCharDisplayName")]
        new_char_display_name: String,
    },
    #[serde(rename = "changeSamplerPreset")]
    ChangeSamplerPreset {
        #[serde(rename = "newPreset")]
        new_preset: String,
    },
    #[serde(rename = "changeInstructFormat")]
    ChangeInstructFormat {
        #[serde(rename = "newInstructFormat")]
        new_instruct_format: String,
    },
    #[serde(rename = "changeD1JB")]
    ChangeD1jb {
        #[serde(rename = "newD1JB")]
        new_d1jb: String,
    },
    #[serde(rename = "modeChange")]
    ModeChange {
        #[serde(rename = "newMode")]
        new_mode: EngineMode,
    },
    #[serde(rename = "pastChatsRequest")]
    PastChatsRequest,
    #[serde(rename = "loadPastChat")]
    LoadPastChat { session: SessionId },
    #[serde(rename = "pastChatDelete")]
    PastChatDelete {
        #[serde(rename = "sessionID")]
        session_id: SessionId,
    },
    #[serde(rename = "usernameChange")]
    UsernameChange {
        #[serde(rename = "newName")]
        new_name: String,
        #[serde(rename = "oldName", default)]
        old_name: Option<String>,
    },
    #[serde(rename = "submitKey")]
    SubmitKey { key: String },
    #[serde(rename = "chatMessage")]
    ChatMessage {
        #[serde(rename = "chatID")]
        chat_id: ChatId,
        /// Side-chat text
        #[serde(default)]
        content: String,
        /// AI-chat text; empty forces an AI turn
        #[serde(rename = "userInput", default)]
        user_input: String,
    },
    #[serde(other)]
    Unknown,
}

/// The `type` tag of a frame, read before its payload is validated
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameTag {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Wire names of the kinds only a host may send
const HOST_ONLY_KINDS: &[&str] = &[
    "clearChat",
    "clearAIChat",
    "deleteLast",
    "AIRetry",
    "toggleAutoResponse",
    "toggleStreaming",
    "adjustContextSize",
    "adjustResponseLength",
    "modelSelect",
    "AIChatDelayChange",
    "userChatDelayChange",
    "addNewAPI",
    "APIChange",
    "testNewAPI",
    "modelListRequest",
    "changeCharacterRequest",
    "changeSamplerPreset",
    "changeInstructFormat",
    "changeD1JB",
    "modeChange",
    "pastChatsRequest",
    "loadPastChat",
    "pastChatDelete",
];

/// Who may send a given frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    HostOnly,
    Anyone,
}

impl Permission {
    /// Authorization requirement of a frame kind by its wire name.
    /// Unrecognized kinds are open to anyone and dropped later.
    pub fn for_kind(kind: &str) -> Permission {
        if HOST_ONLY_KINDS.contains(&kind) {
            Permission::HostOnly
        } else {
            Permission::Anyone
        }
    }
}

impl InboundMessage {
    /// Wire name of the frame kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::ClearChat => "clearChat",
            InboundMessage::ClearAiChat => "clearAIChat",
            InboundMessage::DeleteLast => "deleteLast",
            InboundMessage::AiRetry => "AIRetry",
            InboundMessage::ToggleAutoResponse { .. } => "toggleAutoResponse",
            InboundMessage::ToggleStreaming { .. } => "toggleStreaming",
            InboundMessage::AdjustContextSize { .. } => "adjustContextSize",
            InboundMessage::AdjustResponseLength { .. } => "adjustResponseLength",
            InboundMessage::ModelSelect { .. } => "modelSelect",
            InboundMessage::AiChatDelayChange { .. } => "AIChatDelayChange",
            InboundMessage::UserChatDelayChange { .. } => "userChatDelayChange",
            InboundMessage::AddNewApi(_) => "addNewAPI",
            InboundMessage::ApiChange { .. } => "APIChange",
            InboundMessage::TestNewApi { .. } => "testNewAPI",
            InboundMessage::ModelListRequest { .. } => "modelListRequest",
            InboundMessage::ChangeCharacterRequest { .. } => "changeCharacterRequest",
            InboundMessage::ChangeSamplerPreset { .. } => "changeSamplerPreset",
            InboundMessage::ChangeInstructFormat { .. } => "changeInstructFormat",
            InboundMessage::ChangeD1jb { .. } => "changeD1JB",
            InboundMessage::ModeChange { .. } => "modeChange",
            InboundMessage::PastChatsRequest => "pastChatsRequest",
            InboundMessage::LoadPastChat { .. } => "loadPastChat",
            InboundMessage::PastChatDelete { .. } => "pastChatDelete",
            InboundMessage::UsernameChange { .. } => "usernameChange",
            InboundMessage::SubmitKey { .. } => "submitKey",
            InboundMessage::ChatMessage { .. } => "chatMessage",
            InboundMessage::Unknown => "unknown",
        }
    }

    /// Authorization requirement of this frame kind
    pub fn permission(&self) -> Permission {
        Permission::for_kind(self.kind())
    }
}

// ========================================
// Outbound (server → client)
// ========================================

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "connectionConfirmed")]
    ConnectionConfirmed(Box<ConnectionConfirmed>),
    #[serde(rename = "keyAccepted")]
    KeyAccepted { role: Role },
    #[serde(rename = "keyRejected")]
    KeyRejected,
    #[serde(rename = "userList")]
    UserList {
        #[serde(rename = "userList")]
        user_list: Vec<UserListEntry>,
    },
    #[serde(rename = "chatUpdate")]
    ChatUpdate {
        #[serde(rename = "chatHistory")]
        chat_history: Vec<AiChatHistoryEntry>,
    },
    #[serde(rename = "chatMessage")]
    ChatMessage(ChatMessagePayload),
    #[serde(rename = "streamedAIResponse")]
    StreamedAiResponse(StreamFragment),
    #[serde(rename = "streamedAIResponseEnd")]
    StreamedAiResponseEnd(StreamEnd),
    #[serde(rename = "trimmedStreamMessage")]
    TrimmedStreamMessage(StreamFragment),
    #[serde(rename = "AIResponse")]
    AiResponse(AiResponsePayload),
    #[serde(rename = "userChangedName")]
    UserChangedName { content: String },
    #[serde(rename = "apiChange")]
    ApiChange(ApiRecordDto),
    #[serde(rename = "APIList")]
    ApiList {
        #[serde(rename = "APIList")]
        api_list: Vec<ApiRecordDto>,
        #[serde(rename = "selectedAPI")]
        selected_api: String,
    },
    #[serde(rename = "modelListResult")]
    ModelListResult { value: ModelListValue },
    #[serde(rename = "testAPIResult")]
    TestApiResult { value: TestApiOutcome },
    #[serde(rename = "changeCharacter")]
    ChangeCharacter {
        char: String,
        #[serde(rename = "charDisplayName")]
        char_display_name: String,
    },
    #[serde(rename = "changeSamplerPreset")]
    ChangeSamplerPreset {
        #[serde(rename = "newPreset")]
        new_preset: String,
    },
    #[serde(rename = "changeInstructFormat")]
    ChangeInstructFormat {
        #[serde(rename = "newInstructFormat")]
        new_instruct_format: String,
    },
    #[serde(rename = "changeD1JB")]
    ChangeD1jb {
        #[serde(rename = "newD1JB")]
        new_d1jb: String,
    },
    #[serde(rename = "modeChange")]
    ModeChange {
        #[serde(rename = "engineMode")]
        engine_mode: EngineMode,
    },
    #[serde(rename = "pastChatsList")]
    PastChatsList {
        #[serde(rename = "pastChats")]
        past_chats: Vec<PastChatDto>,
    },
    #[serde(rename = "pastChatToLoad")]
    PastChatToLoad {
        #[serde(rename = "pastChatHistory")]
        past_chat_history: Vec<AiChatHistoryEntry>,
        #[serde(rename = "sessionID")]
        session_id: SessionId,
    },
    #[serde(rename = "pastChatDeleted")]
    PastChatDeleted {
        #[serde(rename = "wasActive")]
        was_active: bool,
    },
    #[serde(rename = "forceDisconnect")]
    ForceDisconnect,
    #[serde(rename = "clearChat")]
    ClearChat,
    #[serde(rename = "clearAIChat")]
    ClearAiChat,
    #[serde(rename = "autoAItoggleUpdate")]
    AutoAiToggleUpdate { value: bool },
    #[serde(rename = "streamingToggleUpdate")]
    StreamingToggleUpdate { value: bool },
    #[serde(rename = "contextSizeChange")]
    ContextSizeChange { value: u32 },
    #[serde(rename = "responseLengthChange")]
    ResponseLengthChange { value: u32 },
    #[serde(rename = "modelChange")]
    ModelChange { value: String },
    #[serde(rename = "AIChatDelayChange")]
    AiChatDelayChange { value: u32 },
    #[serde(rename = "userChatDelayChange")]
    UserChatDelayChange { value: u32 },
}

impl OutboundMessage {
    /// Serialize to the JSON text sent over the socket
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Bootstrap frame sent to a client right after it connects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionConfirmed {
    #[serde(rename = "clientUUID")]
    pub client_uuid: String,
    #[serde(rename = "chatHistory")]
    pub chat_history: Vec<UserChatHistoryEntry>,
    #[serde(rename = "AIChatHistory")]
    pub ai_chat_history: Vec<AiChatHistoryEntry>,
    pub color: Color,
    pub role: Role,
    #[serde(rename = "selectedCharacterDisplayName")]
    pub selected_character_display_name: String,
    #[serde(rename = "newUserChatDelay")]
    pub new_user_chat_delay: u32,
    #[serde(rename = "newAIChatDelay")]
    pub new_ai_chat_delay: u32,
    #[serde(rename = "userList")]
    pub user_list: Vec<UserListEntry>,
    /// Control metadata only hosts receive
    #[serde(flatten)]
    pub host: Option<HostBootstrap>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostBootstrap {
    #[serde(rename = "cardList")]
    pub card_list: Vec<CatalogEntryDto>,
    #[serde(rename = "instructList")]
    pub instruct_list: Vec<CatalogEntryDto>,
    #[serde(rename = "samplerPresetList")]
    pub sampler_preset_list: Vec<CatalogEntryDto>,
    #[serde(rename = "selectedCharacter")]
    pub selected_character: String,
    #[serde(rename = "selectedSamplerPreset")]
    pub selected_sampler_preset: String,
    #[serde(rename = "engineMode")]
    pub engine_mode: EngineMode,
    #[serde(rename = "isAutoResponse")]
    pub is_auto_response: bool,
    #[serde(rename = "isStreaming")]
    pub is_streaming: bool,
    #[serde(rename = "contextSize")]
    pub context_size: u32,
    #[serde(rename = "responseLength")]
    pub response_length: u32,
    #[serde(rename = "D1JB")]
    pub d1jb: String,
    #[serde(rename = "instructFormat")]
    pub instruct_format: String,
    #[serde(rename = "APIList")]
    pub api_list: Vec<ApiRecordDto>,
    #[serde(rename = "selectedAPI")]
    pub selected_api: String,
    #[serde(rename = "selectedModel")]
    pub selected_model: String,
    /// Full record of the selected API
    #[serde(rename = "API")]
    pub api: Option<ApiRecordDto>,
}

/// One row of the connected-user list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserListEntry {
    pub username: String,
    pub color: Color,
    pub role: Role,
}

/// AI-chat history row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiChatHistoryEntry {
    pub username: String,
    pub content: String,
    #[serde(rename = "userColor")]
    pub user_color: Option<Color>,
    #[serde(rename = "messageID")]
    pub message_id: i64,
    pub entity: MessageEntity,
}

/// Side-chat history row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserChatHistoryEntry {
    pub username: String,
    pub content: String,
    #[serde(rename = "userColor")]
    pub user_color: Option<Color>,
}

/// Author shown in the AI-chat participant strip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiChatUser {
    pub username: String,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessagePayload {
    #[serde(rename = "chatID")]
    pub chat_id: ChatId,
    pub username: String,
    pub content: String,
    #[serde(rename = "userColor")]
    pub user_color: Option<Color>,
    #[serde(rename = "AIChatUserList", skip_serializing_if = "Option::is_none")]
    pub ai_chat_user_list: Option<Vec<AiChatUser>>,
}

/// A streamed fragment, or the final trimmed text of a stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamFragment {
    #[serde(rename = "chatID")]
    pub chat_id: ChatId,
    pub username: String,
    pub content: String,
    #[serde(rename = "userColor")]
    pub user_color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEnd {
    #[serde(rename = "chatID")]
    pub chat_id: ChatId,
    pub username: String,
    #[serde(rename = "userColor")]
    pub user_color: Option<Color>,
    #[serde(rename = "AIChatUserList")]
    pub ai_chat_user_list: Vec<AiChatUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiResponsePayload {
    #[serde(rename = "chatID")]
    pub chat_id: ChatId,
    pub username: String,
    pub content: String,
    #[serde(rename = "userColor")]
    pub user_color: Option<Color>,
    #[serde(rename = "AIChatUserList")]
    pub ai_chat_user_list: Vec<AiChatUser>,
}

/// Inference API record as exchanged with hosts.
///
/// Stored records historically used `type` where frames use
/// `endpointType`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRecordDto {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub key: String,
    #[serde(rename = "endpointType", alias = "type", default)]
    pub endpoint_type: EngineMode,
    #[serde(default)]
    pub claude: bool,
}

/// Catalog listing row (card, preset or instruct format)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntryDto {
    pub filename: String,
    pub name: String,
}

/// Past-chat summary row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PastChatDto {
    pub session_id: SessionId,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub is_active: bool,
    #[serde(rename = "aiName")]
    pub ai_name: Option<String>,
    #[serde(rename = "messageCount")]
    pub message_count: usize,
    #[serde(rename = "latestTimestamp")]
    pub latest_timestamp: String,
}

/// Either the model ids, or the literal string `"ERROR"`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelListValue {
    Models(Vec<String>),
    Error(&'static str),
}

impl ModelListValue {
    pub const ERROR: ModelListValue = ModelListValue::Error("ERROR");
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestApiOutcome {
    pub success: bool,
    pub message: String,
}
