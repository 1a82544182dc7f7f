//! Repository traits
//!
//! Interfaces of the persistence collaborators the use cases depend on.
//! Concrete implementations are provided by the infrastructure layer.

use async_trait::async_trait;

use super::{
    AiChatEntry, ApiRecord, ClientId, Color, ConfigStoreError, NewAiChatMessage, PastChatSummary,
    RepositoryError, Role, SessionConfig, SessionId, StoredUser, UserChatEntry, Username,
};

/// Durable chat, user, role and API storage.
///
/// Exactly one AI-chat session is active at a time. Every operation that
/// switches the active session does so atomically with respect to readers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Look up a user together with its recorded role
    async fn get_user(&self, id: &ClientId) -> Result<Option<StoredUser>, RepositoryError>;

    /// Create or update a user's display name and color
    async fn upsert_user(
        &self,
        id: &ClientId,
        username: &Username,
        color: &Color,
    ) -> Result<(), RepositoryError>;

    /// Create or update a user's role
    async fn upsert_user_role(&self, id: &ClientId, role: Role) -> Result<(), RepositoryError>;

    /// Color of a character, looked up by id and then by display name
    async fn get_character_color(
        &self,
        character_id: &str,
    ) -> Result<Option<Color>, RepositoryError>;

    async fn upsert_character(
        &self,
        character_id: &str,
        display_name: &str,
        color: &Color,
    ) -> Result<(), RepositoryError>;

    /// Entries of the active AI-chat session, oldest first
    async fn read_ai_chat(&self) -> Result<Vec<AiChatEntry>, RepositoryError>;

    /// Make `session` the active session and return its entries, oldest first
    async fn load_session(&self, session: SessionId) -> Result<Vec<AiChatEntry>, RepositoryError>;

    /// Append to the active session, opening one if none is active
    async fn write_ai_chat_message(&self, message: NewAiChatMessage)
    -> Result<(), RepositoryError>;

    /// Remove the newest entry of the active session
    async fn remove_last_ai_chat_message(&self) -> Result<(), RepositoryError>;

    /// Close the active session and open a new one
    async fn new_session(&self) -> Result<SessionId, RepositoryError>;

    /// Active side-chat entries, oldest first
    async fn read_user_chat(&self) -> Result<Vec<UserChatEntry>, RepositoryError>;

    async fn write_user_chat_message(
        &self,
        author: &ClientId,
        content: &str,
    ) -> Result<(), RepositoryError>;

    /// Mark every active side-chat entry inactive
    async fn new_user_chat_session(&self) -> Result<(), RepositoryError>;

    /// Sessions that contain at least one entry, oldest first
    async fn past_chats(&self) -> Result<Vec<PastChatSummary>, RepositoryError>;

    /// Delete a session and its entries. Returns whether it was the active one.
    async fn delete_past_chat(&self, session: SessionId) -> Result<bool, RepositoryError>;

    async fn upsert_api(&self, api: ApiRecord) -> Result<(), RepositoryError>;

    async fn get_apis(&self) -> Result<Vec<ApiRecord>, RepositoryError>;

    async fn get_api(&self, name: &str) -> Result<Option<ApiRecord>, RepositoryError>;
}

/// Storage of the live [`SessionConfig`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet
    async fn load(&self) -> Result<Option<SessionConfig>, ConfigStoreError>;

    async fn save(&self, config: &SessionConfig) -> Result<(), ConfigStoreError>;
}
