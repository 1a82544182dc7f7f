//! 過去のチャットセッションの一覧・読込・削除

use crate::{
    domain::SessionId,
    infrastructure::dto::websocket::OutboundMessage,
    usecase::{broadcast::Audience, error::DispatchError},
};

use super::{Dispatched, Router};

impl Router {
    pub(super) async fn past_chats_request(&self) -> Result<Dispatched, DispatchError> {
        let past_chats = self
            .repository
            .past_chats()
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        self.broadcaster
            .send(&OutboundMessage::PastChatsList { past_chats }, Audience::All)
            .await;
        Ok(Dispatched::Done)
    }

    /// 指定したセッションをアクティブにして、その履歴を配信する
    pub(super) async fn load_past_chat(
        &self,
        session: SessionId,
    ) -> Result<Dispatched, DispatchError> {
        let past_chat_history = self
            .repository
            .load_session(session)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        tracing::info!("Loaded past chat session {}", session);
        self.broadcaster
            .send(
                &OutboundMessage::PastChatToLoad {
                    past_chat_history,
                    session_id: session,
                },
                Audience::All,
            )
            .await;
        Ok(Dispatched::Done)
    }

    pub(super) async fn past_chat_delete(
        &self,
        session: SessionId,
    ) -> Result<Dispatched, DispatchError> {
        let was_active = self.repository.delete_past_chat(session).await?;
        tracing::info!("Deleted past chat session {} (active: {})", session, was_active);
        self.broadcaster
            .send(&OutboundMessage::PastChatDeleted { was_active }, Audience::All)
            .await;
        Ok(Dispatched::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{
        ChatRepository, MockFileRepository, MockInferenceProvider, NewAiChatMessage,
        RepositoryError, Role,
    };

    async fn seed_two_sessions(fixture: &Fixture) -> (SessionId, SessionId) {
        fixture
            .repository
            .write_ai_chat_message(NewAiChatMessage::from_character(
                "Sensei",
                "old session".to_string(),
            ))
            .await
            .unwrap();
        let first = fixture.repository.past_chats().await.unwrap()[0].session_id;
        let second = fixture.repository.new_session().await.unwrap();
        fixture
            .repository
            .write_ai_chat_message(NewAiChatMessage::from_character(
                "Sensei",
                "new session".to_string(),
            ))
            .await
            .unwrap();
        (first, second)
    }

    #[tokio::test]
    async fn test_past_chats_list() {
        // テスト項目: メッセージのあるセッションが一覧として配信される
        // given (前提条件):
        let fixture =
            create_fixture(MockFileRepository::new(), MockInferenceProvider::new()).await;
        let mut host = join(&fixture, "host", Role::Host).await;
        seed_two_sessions(&fixture).await;

        // when (操作):
        fixture
            .router
            .dispatch(&host.id, r#"{"type":"pastChatsRequest"}"#)
            .await
            .unwrap();

        // then (期待する結果):
        let frames = host.drain();
        let sessions = frames[0]["pastChats"].as_array().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0]["aiName"], "Sensei");
        assert_eq!(sessions[0]["messageCount"], 1);
        assert_eq!(sessions[1]["is_active"], true);
    }

    #[tokio::test]
    async fn test_load_past_chat_reactivates_session() {
        // テスト項目: 過去のセッションを読み込むとアクティブになり、履歴が配信される
        // given (前提条件):
        let fixture =
            create_fixture(MockFileRepository::new(), MockInferenceProvider::new()).await;
        let mut host = join(&fixture, "host", Role::Host).await;
        let (first, _) = seed_two_sessions(&fixture).await;
        let frame = format!(r#"{{"type":"loadPastChat","session":{}}}"#, first.value());

        // when (操作):
        fixture.router.dispatch(&host.id, &frame).await.unwrap();

        // then (期待する結果):
        let frames = host.drain();
        assert_eq!(frames[0]["type"], "pastChatToLoad");
        assert_eq!(frames[0]["sessionID"], first.value());
        assert_eq!(frames[0]["pastChatHistory"][0]["content"], "old session");
        let active = fixture.repository.read_ai_chat().await.unwrap();
        assert_eq!(active[0].content, "old session");
    }

    #[tokio::test]
    async fn test_load_missing_session_is_error() {
        // テスト項目: 存在しないセッションの読込はエラーになり、何も配信されない
        let fixture =
            create_fixture(MockFileRepository::new(), MockInferenceProvider::new()).await;
        let mut host = join(&fixture, "host", Role::Host).await;
        let result = fixture
            .router
            .dispatch(&host.id, r#"{"type":"loadPastChat","session":999}"#)
            .await;
        assert!(matches!(
            result,
            Err(DispatchError::Repository(RepositoryError::SessionNotFound(999)))
        ));
        assert!(host.drain().is_empty());
    }

    #[tokio::test]
    async fn test_delete_active_past_chat() {
        // テスト項目: アクティブなセッションを削除すると wasActive が true で通知される
        // given (前提条件):
        let fixture =
            create_fixture(MockFileRepository::new(), MockInferenceProvider::new()).await;
        let mut host = join(&fixture, "host", Role::Host).await;
        let (_, second) = seed_two_sessions(&fixture).await;
        let frame = format!(
            r#"{{"type":"pastChatDelete","sessionID":{}}}"#,
            second.value()
        );

        // when (操作):
        fixture.router.dispatch(&host.id, &frame).await.unwrap();

        // then (期待する結果):
        let frames = host.drain();
        assert_eq!(frames[0]["type"], "pastChatDeleted");
        assert_eq!(frames[0]["wasActive"], true);
        assert_eq!(fixture.repository.past_chats().await.unwrap().len(), 1);
    }
}
