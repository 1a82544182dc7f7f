//! Conversion logic between DTOs and domain entities.

use irori_shared::time::timestamp_to_display;

use crate::domain::entity::{
    AiChatEntry, ApiRecord, CatalogEntry, Client, PastChatSummary, UserChatEntry,
};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain Entity
// ========================================

impl From<dto::ApiRecordDto> for ApiRecord {
    fn from(dto: dto::ApiRecordDto) -> Self {
        Self {
            name: dto.name,
            endpoint: dto.endpoint,
            key: dto.key,
            endpoint_type: dto.endpoint_type,
            claude: dto.claude,
        }
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<ApiRecord> for dto::ApiRecordDto {
    fn from(model: ApiRecord) -> Self {
        Self {
            name: model.name,
            endpoint: model.endpoint,
            key: model.key,
            endpoint_type: model.endpoint_type,
            claude: model.claude,
        }
    }
}

impl From<AiChatEntry> for dto::AiChatHistoryEntry {
    fn from(model: AiChatEntry) -> Self {
        Self {
            username: model.username,
            content: model.content,
            user_color: model.color,
            message_id: model.message_id,
            entity: model.entity,
        }
    }
}

impl From<UserChatEntry> for dto::UserChatHistoryEntry {
    fn from(model: UserChatEntry) -> Self {
        Self {
            username: model.username,
            content: model.content,
            user_color: model.color,
        }
    }
}

impl From<&Client> for dto::UserListEntry {
    fn from(model: &Client) -> Self {
        Self {
            username: model.username.as_str().to_string(),
            color: model.color.clone(),
            role: model.role,
        }
    }
}

impl From<CatalogEntry> for dto::CatalogEntryDto {
    fn from(model: CatalogEntry) -> Self {
        Self {
            filename: model.filename,
            name: model.name,
        }
    }
}

impl From<PastChatSummary> for dto::PastChatDto {
    fn from(model: PastChatSummary) -> Self {
        Self {
            session_id: model.session_id,
            started_at: timestamp_to_display(model.started_at.value()),
            ended_at: model.ended_at.map(|t| timestamp_to_display(t.value())),
            is_active: model.is_active,
            ai_name: model.ai_name,
            message_count: model.message_count,
            latest_timestamp: timestamp_to_display(model.latest_timestamp.value()),
        }
    }
}

/// Distinct authors of `history` in order of first appearance
pub fn ai_chat_user_list(history: &[AiChatEntry]) -> Vec<dto::AiChatUser> {
    let mut users: Vec<dto::AiChatUser> = Vec::new();
    for entry in history {
        if users.iter().any(|u| u.username == entry.username) {
            continue;
        }
        users.push(dto::AiChatUser {
            username: entry.username.clone(),
            color: entry.color.clone(),
        });
    }
    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ClientId, Color, EngineMode, MessageEntity, Role, SessionId, Timestamp, Username,
    };

    fn entry(id: i64, username: &str, color: Option<&str>, entity: MessageEntity) -> AiChatEntry {
        AiChatEntry {
            message_id: id,
            session_id: SessionId::new(1),
            username: username.to_string(),
            content: format!("message {}", id),
            color: color.map(|c| Color::from_stored(c.to_string())),
            entity,
            timestamp: Timestamp::new(id * 1000),
        }
    }

    #[test]
    fn test_api_record_dto_to_domain() {
        // テスト項目: DTO の API レコードがドメインエンティティに変換される
        // given (前提条件):
        let dto_api = dto::ApiRecordDto {
            name: "Tabby".to_string(),
            endpoint: "127.0.0.1:5000".to_string(),
            key: "secret".to_string(),
            endpoint_type: EngineMode::ChatCompletion,
            claude: false,
        };

        // when (操作):
        let api: ApiRecord = dto_api.into();

        // then (期待する結果):
        assert_eq!(api.name, "Tabby");
        assert_eq!(api.endpoint_type, EngineMode::ChatCompletion);
        assert_eq!(api.key, "secret");
    }

    #[test]
    fn test_domain_ai_chat_entry_to_dto() {
        // テスト項目: AI チャット履歴のエントリが DTO に変換される
        // given (前提条件):
        let model = entry(7, "alice", Some("#FF8A8A"), MessageEntity::User);

        // when (操作):
        let dto_entry: dto::AiChatHistoryEntry = model.into();

        // then (期待する結果):
        assert_eq!(dto_entry.message_id, 7);
        assert_eq!(dto_entry.username, "alice");
        assert_eq!(dto_entry.user_color.unwrap().as_str(), "#FF8A8A");
        assert_eq!(dto_entry.entity, MessageEntity::User);
    }

    #[test]
    fn test_domain_client_to_user_list_entry() {
        // テスト項目: 接続中クライアントがユーザー一覧の行に変換される
        // given (前提条件):
        let client = Client::new(
            ClientId::new("c1".to_string()).unwrap(),
            Username::new("bob".to_string()).unwrap(),
            Color::from_stored("#8AFF8A".to_string()),
            Role::Host,
        );

        // when (操作):
        let row: dto::UserListEntry = (&client).into();

        // then (期待する結果):
        assert_eq!(row.username, "bob");
        assert_eq!(row.color.as_str(), "#8AFF8A");
        assert_eq!(row.role, Role::Host);
    }

    #[test]
    fn test_past_chat_summary_formats_timestamps() {
        // テスト項目: 過去チャットの要約の時刻が表示用文字列に変換される
        // given (前提条件):
        let summary = PastChatSummary {
            session_id: SessionId::new(3),
            started_at: Timestamp::new(0),
            ended_at: None,
            is_active: true,
            ai_name: Some("Sensei".to_string()),
            message_count: 2,
            latest_timestamp: Timestamp::new(61_000),
        };

        // when (操作):
        let dto_summary: dto::PastChatDto = summary.into();

        // then (期待する結果):
        assert_eq!(dto_summary.started_at, "1970-01-01 00:00:00");
        assert_eq!(dto_summary.latest_timestamp, "1970-01-01 00:01:01");
        assert!(dto_summary.ended_at.is_none());
        assert_eq!(dto_summary.message_count, 2);
    }

    #[test]
    fn test_ai_chat_user_list_is_distinct_in_first_seen_order() {
        // テスト項目: AI チャット参加者一覧が初出順で重複なく作られる
        // given (前提条件):
        let history = vec![
            entry(1, "alice", Some("#FF8A8A"), MessageEntity::User),
            entry(2, "Sensei", None, MessageEntity::Ai),
            entry(3, "alice", Some("#FF8A8A"), MessageEntity::User),
        ];

        // when (操作):
        let users = ai_chat_user_list(&history);

        // then (期待する結果):
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "Sensei"]);
        assert!(users[1].color.is_none());
    }
}
