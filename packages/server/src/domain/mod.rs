//! Domain layer: value objects, entities and the interfaces the use cases
//! depend on. Concrete implementations live in the infrastructure layer.

pub mod config;
pub mod entity;
pub mod error;
pub mod file_repository;
pub mod inference;
pub mod message_pusher;
pub mod repository;
pub mod text;
pub mod value_object;

pub use config::{ConfigUpdate, SessionConfig};
pub use entity::{
    AccessKeys, AiChatEntry, ApiRecord, CatalogEntry, CharacterCard, ChatSession, Client,
    NewAiChatMessage, PastChatSummary, StoredUser, UserChatEntry,
};
pub use error::{
    ConfigStoreError, FileRepositoryError, InferenceError, MessagePushError, RepositoryError,
    ValueObjectError,
};
pub use file_repository::FileRepository;
pub use inference::{InferenceProvider, InferenceRequest, TokenSink};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use repository::{ChatRepository, ConfigRepository};
#[cfg(test)]
pub use file_repository::MockFileRepository;
#[cfg(test)]
pub use inference::MockInferenceProvider;
#[cfg(test)]
pub use repository::{MockChatRepository, MockConfigRepository};
pub use value_object::{
    ChatId, ClientId, Color, EndpointKind, EngineMode, MessageEntity, Role, SessionId, Timestamp,
    USERNAME_COLORS, Username,
};
