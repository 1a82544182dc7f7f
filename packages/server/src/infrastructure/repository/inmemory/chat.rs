//! InMemory Chat Repository 実装
//!
//! ドメイン層が定義する ChatRepository trait の具体的な実装。
//! テーブルごとの行を 1 つの Mutex の内側に保持し、セッションの切り替えを
//! 読み手に対してアトミックに行います。
//!
//! スナップショットファイルを指定した場合は、変更のたびに全テーブルを JSON で
//! 書き出し、起動時に読み戻します。

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use irori_shared::time::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{
    AiChatEntry, ApiRecord, ChatRepository, ChatSession, ClientId, Color, MessageEntity,
    NewAiChatMessage, PastChatSummary, RepositoryError, Role, SessionId, StoredUser, Timestamp,
    UserChatEntry, Username,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRow {
    username: String,
    color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CharacterRow {
    display_name: String,
    color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AiMessageRow {
    message_id: i64,
    session_id: SessionId,
    author_id: String,
    username: String,
    content: String,
    entity: MessageEntity,
    timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserMessageRow {
    message_id: i64,
    author_id: ClientId,
    content: String,
    active: bool,
    timestamp: Timestamp,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    users: HashMap<ClientId, UserRow>,
    roles: HashMap<ClientId, Role>,
    characters: HashMap<String, CharacterRow>,
    sessions: Vec<ChatSession>,
    ai_messages: Vec<AiMessageRow>,
    user_messages: Vec<UserMessageRow>,
    apis: Vec<ApiRecord>,
    next_session_id: i64,
    next_message_id: i64,
}

impl Tables {
    fn seeded() -> Self {
        Self {
            apis: vec![ApiRecord::default_record()],
            ..Self::default()
        }
    }

    fn active_session(&self) -> Option<SessionId> {
        self.sessions.iter().find(|s| s.is_active).map(|s| s.id)
    }

    fn deactivate_all(&mut self, now: Timestamp) {
        for session in self.sessions.iter_mut().filter(|s| s.is_active) {
            session.is_active = false;
            session.ended_at = Some(now);
        }
    }

    fn open_session(&mut self, now: Timestamp) -> SessionId {
        self.next_session_id += 1;
        let id = SessionId::new(self.next_session_id);
        self.sessions.push(ChatSession {
            id,
            started_at: now,
            ended_at: None,
            is_active: true,
        });
        id
    }

    fn resolve_color(&self, row: &AiMessageRow) -> Option<Color> {
        match row.entity {
            MessageEntity::User => ClientId::new(row.author_id.clone())
                .ok()
                .and_then(|id| self.users.get(&id))
                .map(|u| u.color.clone()),
            MessageEntity::Ai => self.characters.get(&row.author_id).map(|c| c.color.clone()),
        }
    }

    fn session_entries(&self, session: SessionId) -> Vec<AiChatEntry> {
        let mut rows: Vec<&AiMessageRow> = self
            .ai_messages
            .iter()
            .filter(|m| m.session_id == session)
            .collect();
        rows.sort_by_key(|m| (m.timestamp, m.message_id));
        rows.into_iter()
            .map(|row| AiChatEntry {
                message_id: row.message_id,
                session_id: row.session_id,
                username: row.username.clone(),
                content: row.content.clone(),
                color: self.resolve_color(row),
                entity: row.entity,
                timestamp: row.timestamp,
            })
            .collect()
    }
}

/// インメモリ Chat Repository 実装
///
/// `new` で作成した場合、プロセスの終了とともに内容は失われます。
/// `open` で作成した場合は、スナップショットファイルに永続化されます。
pub struct InMemoryChatRepository {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
    snapshot: Option<PathBuf>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 時刻の供給元を差し替えて作成（テスト用）
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::seeded()),
            clock,
            snapshot: None,
        }
    }

    /// スナップショットファイルから復元して作成する。ファイルが無ければ空の状態から始める
    ///
    /// # Errors
    ///
    /// ファイルが読めない、または壊れている場合は `RepositoryError::Storage`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let tables = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                RepositoryError::Storage(format!("corrupt snapshot {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::seeded(),
            Err(e) => {
                return Err(RepositoryError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        tracing::info!("Chat store snapshot at {}", path.display());
        Ok(Self {
            tables: Mutex::new(tables),
            clock: Arc::new(SystemClock),
            snapshot: Some(path),
        })
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// 変更後のテーブルを書き出す。ロックを保持したまま呼び、書き込み順を変更順に揃える
    async fn persist(&self, tables: &Tables) -> Result<(), RepositoryError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json =
            serde_json::to_string(tables).map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let temp = temp_path(path);
        let written = match tokio::fs::write(&temp, json).await {
            Ok(()) => tokio::fs::rename(&temp, path).await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            RepositoryError::Storage(format!("failed to write {}: {}", path.display(), e))
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

impl Default for InMemoryChatRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn get_user(&self, id: &ClientId) -> Result<Option<StoredUser>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(id).map(|row| StoredUser {
            id: id.clone(),
            username: row.username.clone(),
            color: row.color.clone(),
            role: tables.roles.get(id).copied(),
        }))
    }

    async fn upsert_user(
        &self,
        id: &ClientId,
        username: &Username,
        color: &Color,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.users.insert(
            id.clone(),
            UserRow {
                username: username.as_str().to_string(),
                color: color.clone(),
            },
        );
        self.persist(&tables).await
    }

    async fn upsert_user_role(&self, id: &ClientId, role: Role) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.roles.insert(id.clone(), role);
        self.persist(&tables).await
    }

    async fn get_character_color(
        &self,
        character_id: &str,
    ) -> Result<Option<Color>, RepositoryError> {
        let tables = self.tables.lock().await;
        let row = tables.characters.get(character_id).or_else(|| {
            tables
                .characters
                .values()
                .find(|c| c.display_name == character_id)
        });
        Ok(row.map(|c| c.color.clone()))
    }

    async fn upsert_character(
        &self,
        character_id: &str,
        display_name: &str,
        color: &Color,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.characters.insert(
            character_id.to_string(),
            CharacterRow {
                display_name: display_name.to_string(),
                color: color.clone(),
            },
        );
        self.persist(&tables).await
    }

    async fn read_ai_chat(&self) -> Result<Vec<AiChatEntry>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(match tables.active_session() {
            Some(session) => tables.session_entries(session),
            None => Vec::new(),
        })
    }

    async fn load_session(&self, session: SessionId) -> Result<Vec<AiChatEntry>, RepositoryError> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        if !tables.sessions.iter().any(|s| s.id == session) {
            return Err(RepositoryError::SessionNotFound(session.value()));
        }
        tables.deactivate_all(now);
        if let Some(target) = tables.sessions.iter_mut().find(|s| s.id == session) {
            target.is_active = true;
            target.ended_at = None;
        }
        self.persist(&tables).await?;
        Ok(tables.session_entries(session))
    }

    async fn write_ai_chat_message(
        &self,
        message: NewAiChatMessage,
    ) -> Result<(), RepositoryError> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let session_id = match tables.active_session() {
            Some(id) => id,
            None => tables.open_session(now),
        };
        tables.next_message_id += 1;
        let message_id = tables.next_message_id;
        tables.ai_messages.push(AiMessageRow {
            message_id,
            session_id,
            author_id: message.author_id,
            username: message.username,
            content: message.content,
            entity: message.entity,
            timestamp: now,
        });
        self.persist(&tables).await
    }

    async fn remove_last_ai_chat_message(&self) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.active_session() else {
            return Ok(());
        };
        let newest = tables
            .ai_messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.session_id == session)
            .max_by_key(|(_, m)| (m.timestamp, m.message_id))
            .map(|(index, _)| index);
        if let Some(index) = newest {
            tables.ai_messages.remove(index);
        }
        self.persist(&tables).await
    }

    async fn new_session(&self) -> Result<SessionId, RepositoryError> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        tables.deactivate_all(now);
        let session = tables.open_session(now);
        self.persist(&tables).await?;
        Ok(session)
    }

    async fn read_user_chat(&self) -> Result<Vec<UserChatEntry>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<&UserMessageRow> =
            tables.user_messages.iter().filter(|m| m.active).collect();
        rows.sort_by_key(|m| (m.timestamp, m.message_id));
        Ok(rows
            .into_iter()
            .map(|row| {
                let user = tables.users.get(&row.author_id);
                UserChatEntry {
                    username: user
                        .map(|u| u.username.clone())
                        .unwrap_or_else(|| row.author_id.as_str().to_string()),
                    content: row.content.clone(),
                    color: user.map(|u| u.color.clone()),
                    timestamp: row.timestamp,
                }
            })
            .collect())
    }

    async fn write_user_chat_message(
        &self,
        author: &ClientId,
        content: &str,
    ) -> Result<(), RepositoryError> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        tables.next_message_id += 1;
        let message_id = tables.next_message_id;
        tables.user_messages.push(UserMessageRow {
            message_id,
            author_id: author.clone(),
            content: content.to_string(),
            active: true,
            timestamp: now,
        });
        self.persist(&tables).await
    }

    async fn new_user_chat_session(&self) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        for row in tables.user_messages.iter_mut() {
            row.active = false;
        }
        self.persist(&tables).await
    }

    async fn past_chats(&self) -> Result<Vec<PastChatSummary>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut summaries = Vec::new();
        for session in &tables.sessions {
            let messages: Vec<&AiMessageRow> = tables
                .ai_messages
                .iter()
                .filter(|m| m.session_id == session.id)
                .collect();
            let Some(latest) = messages.iter().map(|m| m.timestamp).max() else {
                continue;
            };

            let mut ai_names: Vec<&str> = Vec::new();
            for message in messages.iter().filter(|m| m.entity == MessageEntity::Ai) {
                if !ai_names.contains(&message.username.as_str()) {
                    ai_names.push(&message.username);
                }
            }

            summaries.push(PastChatSummary {
                session_id: session.id,
                started_at: session.started_at,
                ended_at: session.ended_at,
                is_active: session.is_active,
                ai_name: (!ai_names.is_empty()).then(|| ai_names.join(", ")),
                message_count: messages.len(),
                latest_timestamp: latest,
            });
        }
        summaries.sort_by_key(|s| (s.started_at, s.session_id));
        Ok(summaries)
    }

    async fn delete_past_chat(&self, session: SessionId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(index) = tables.sessions.iter().position(|s| s.id == session) else {
            return Ok(false);
        };
        let removed = tables.sessions.remove(index);
        tables.ai_messages.retain(|m| m.session_id != session);
        self.persist(&tables).await?;
        Ok(removed.is_active)
    }

    async fn upsert_api(&self, api: ApiRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        match tables.apis.iter_mut().find(|a| a.name == api.name) {
            Some(existing) => *existing = api,
            None => tables.apis.push(api),
        }
        self.persist(&tables).await
    }

    async fn get_apis(&self) -> Result<Vec<ApiRecord>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.apis.clone())
    }

    async fn get_api(&self, name: &str) -> Result<Option<ApiRecord>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.apis.iter().find(|a| a.name == name).cloned())
    }
}
