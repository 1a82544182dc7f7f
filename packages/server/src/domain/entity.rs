//! Domain entities.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value_object::{
    ClientId, Color, EngineMode, MessageEntity, Role, SessionId, Timestamp, Username,
};

/// A live client connection as seen by the registry.
///
/// The outbound channel is owned by the registry entry, not by this value,
/// so `Client` can be freely cloned into snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub username: Username,
    pub color: Color,
    pub role: Role,
}

impl Client {
    pub fn new(id: ClientId, username: Username, color: Color, role: Role) -> Self {
        Self {
            id,
            username,
            color,
            role,
        }
    }
}

/// A user record loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: ClientId,
    pub username: String,
    pub color: Color,
    /// `None` when the user exists but no role was ever recorded.
    pub role: Option<Role>,
}

/// One entry of an AI-chat session, with the author's color resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiChatEntry {
    pub message_id: i64,
    pub session_id: SessionId,
    pub username: String,
    pub content: String,
    pub color: Option<Color>,
    pub entity: MessageEntity,
    pub timestamp: Timestamp,
}

/// An AI-chat entry about to be written.
///
/// `author_id` is the client id for user turns and the character id for
/// AI turns; colors are resolved through it on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAiChatMessage {
    pub author_id: String,
    pub username: String,
    pub content: String,
    pub entity: MessageEntity,
}

impl NewAiChatMessage {
    pub fn from_user(client: &Client, content: String) -> Self {
        Self {
            author_id: client.id.as_str().to_string(),
            username: client.username.as_str().to_string(),
            content,
            entity: MessageEntity::User,
        }
    }

    pub fn from_character(character_name: &str, content: String) -> Self {
        Self {
            author_id: character_name.to_string(),
            username: character_name.to_string(),
            content,
            entity: MessageEntity::Ai,
        }
    }
}

/// One active side-chat entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChatEntry {
    pub username: String,
    pub content: String,
    pub color: Option<Color>,
    pub timestamp: Timestamp,
}

/// A bounded span of AI-chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub is_active: bool,
}

/// Summary row of the past-chats listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastChatSummary {
    pub session_id: SessionId,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub is_active: bool,
    /// Comma separated names of the AI authors in the session
    pub ai_name: Option<String>,
    pub message_count: usize,
    pub latest_timestamp: Timestamp,
}

/// A configured inference API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRecord {
    pub name: String,
    pub endpoint: String,
    pub key: String,
    pub endpoint_type: EngineMode,
    pub claude: bool,
}

impl ApiRecord {
    /// Name of the record that always exists in the store.
    pub const DEFAULT_NAME: &'static str = "Default";

    pub fn default_record() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            endpoint: "localhost:5000".to_string(),
            key: String::new(),
            endpoint_type: EngineMode::TextCompletion,
            claude: false,
        }
    }
}

/// Catalog listing entry (character card, preset or instruct format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Path relative to the catalog root
    pub filename: String,
    pub name: String,
}

/// The parts of a character card the hub needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterCard {
    pub name: String,
    pub first_mes: String,
}

/// The process's pre-shared host and mod keys.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeys {
    host: String,
    moderator: String,
}

impl AccessKeys {
    pub fn new(host: String, moderator: String) -> Self {
        Self { host, moderator }
    }

    /// Two fresh keys of 16 random bytes, hex encoded
    pub fn generate() -> Self {
        Self {
            host: random_hex_key(),
            moderator: random_hex_key(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn moderator(&self) -> &str {
        &self.moderator
    }

    /// Role granted by presenting `key`, if any
    pub fn role_for(&self, key: &str) -> Option<Role> {
        if key == self.host {
            Some(Role::Host)
        } else if key == self.moderator {
            Some(Role::Mod)
        } else {
            None
        }
    }
}

impl fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeys")
            .field("host", &"<redacted>")
            .field("moderator", &"<redacted>")
            .finish()
    }
}

fn random_hex_key() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
