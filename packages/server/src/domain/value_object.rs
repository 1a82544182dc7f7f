//! Value objects shared across the relay hub.

use std::fmt;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use super::error::ValueObjectError;

/// Maximum accepted length of a client identifier.
const CLIENT_ID_MAX_LEN: usize = 128;

/// Maximum accepted length of a display name.
const USERNAME_MAX_LEN: usize = 64;

/// Palette new clients draw their presentation color from.
pub const USERNAME_COLORS: [&str; 16] = [
    "#FF8A8A", // Light Red
    "#FFC17E", // Light Orange
    "#FFEC8A", // Light Yellow
    "#6AFF9E", // Light Green
    "#6ABEFF", // Light Blue
    "#C46AFF", // Light Purple
    "#FF6AE4", // Light Magenta
    "#FF6A9C", // Light Pink
    "#FF5C5C", // Red
    "#FFB54C", // Orange
    "#FFED4C", // Yellow
    "#4CFF69", // Green
    "#4CCAFF", // Blue
    "#AD4CFF", // Purple
    "#FF4CC3", // Magenta
    "#FF4C86", // Pink
];

/// Durable client identifier, stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.is_empty() {
            return Err(ValueObjectError::ClientIdEmpty);
        }
        if value.len() > CLIENT_ID_MAX_LEN {
            return Err(ValueObjectError::ClientIdTooLong(CLIENT_ID_MAX_LEN));
        }
        Ok(Self(value))
    }

    /// Generate a fresh random (UUIDv4) identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display name chosen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Surrounding whitespace is removed; the remainder must be non-empty.
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValueObjectError::UsernameEmpty);
        }
        if trimmed.chars().count() > USERNAME_MAX_LEN {
            return Err(ValueObjectError::UsernameTooLong(USERNAME_MAX_LEN));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Username {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presentation color (CSS hex string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Pick a random color from [`USERNAME_COLORS`].
    pub fn random() -> Self {
        let color = USERNAME_COLORS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USERNAME_COLORS[0]);
        Self(color.to_string())
    }

    /// Wrap a color loaded from storage. Stored colors are trusted as-is.
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_palette_color(&self) -> bool {
        USERNAME_COLORS.contains(&self.0.as_str())
    }
}

/// Authorization level of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "unauthenticated-guest")]
    UnauthenticatedGuest,
    #[serde(rename = "guest")]
    Guest,
    #[serde(rename = "mod")]
    Mod,
    #[serde(rename = "host")]
    Host,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::UnauthenticatedGuest => "unauthenticated-guest",
            Role::Guest => "guest",
            Role::Mod => "mod",
            Role::Host => "host",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which listening endpoint accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Host,
    Guest,
}

impl EndpointKind {
    /// Role assigned to clients seen for the first time on this endpoint.
    pub fn default_role(&self) -> Role {
        match self {
            EndpointKind::Host => Role::Host,
            EndpointKind::Guest => Role::Guest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Host => "host",
            EndpointKind::Guest => "guest",
        }
    }
}

/// The two chat timelines a message can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatId {
    #[serde(rename = "AIChat")]
    AiChat,
    #[serde(rename = "UserChat")]
    UserChat,
}

/// Who authored an AI-chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageEntity {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "AI")]
    Ai,
}

/// Inference engine mode (prompt format family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineMode {
    /// Text completion
    #[default]
    #[serde(rename = "TC")]
    TextCompletion,
    /// Chat completion
    #[serde(rename = "CC")]
    ChatCompletion,
    #[serde(rename = "horde")]
    Horde,
}

/// AI-chat session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_rejects_empty_value() {
        // テスト項目: 空文字列の ClientId は作成できない
        // given (前提条件):
        let value = String::new();

        // when (操作):
        let result = ClientId::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::ClientIdEmpty));
    }

    #[test]
    fn test_client_id_generate_is_uuid() {
        // テスト項目: 生成された ClientId は UUID 形式で毎回異なる
        // given (前提条件):

        // when (操作):
        let first = ClientId::generate();
        let second = ClientId::generate();

        // then (期待する結果):
        assert!(uuid::Uuid::parse_str(first.as_str()).is_ok());
        assert_ne!(first, second);
    }

    #[test]
    fn test_username_is_trimmed() {
        // テスト項目: Username の前後の空白が除去される
        // given (前提条件):
        let value = "  alice \n".to_string();

        // when (操作):
        let username = Username::new(value).unwrap();

        // then (期待する結果):
        assert_eq!(username.as_str(), "alice");
    }

    #[test]
    fn test_username_rejects_blank_value() {
        // テスト項目: 空白のみの Username はエラーになる
        // given (前提条件):
        let value = "   ".to_string();

        // when (操作):
        let result = Username::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::UsernameEmpty));
    }

    #[test]
    fn test_random_color_comes_from_palette() {
        // テスト項目: ランダムな色は必ずパレットから選ばれる
        for _ in 0..64 {
            assert!(Color::random().is_palette_color());
        }
    }

    #[test]
    fn test_role_wire_names() {
        // テスト項目: Role がワイヤ上の名前でシリアライズされる
        // given (前提条件):
        let roles = [
            Role::UnauthenticatedGuest,
            Role::Guest,
            Role::Mod,
            Role::Host,
        ];

        // when (操作):
        let names: Vec<String> = roles
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect();

        // then (期待する結果):
        assert_eq!(
            names,
            vec![
                "\"unauthenticated-guest\"",
                "\"guest\"",
                "\"mod\"",
                "\"host\""
            ]
        );
    }

    #[test]
    fn test_endpoint_default_role() {
        // テスト項目: エンドポイントごとの既定ロールが正しい
        assert_eq!(EndpointKind::Host.default_role(), Role::Host);
        assert_eq!(EndpointKind::Guest.default_role(), Role::Guest);
    }
}
