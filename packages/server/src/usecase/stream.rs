//! AI 応答ストリームの集約
//!
//! プロセス全体で同時に開いているストリームは高々 1 つです。
//!
//! ```text
//! Idle --begin--> Streaming --finish--> Idle
//!                    |
//!                  begin (旧ストリームを退役させて開き直す)
//! ```
//!
//! `begin` は世代番号を進め、旧ストリームの転送タスクを中断します。転送タスクは
//! 世代が一致する間だけ断片を蓄積・配信するため、退役したストリームの断片が
//! クライアントに届くことはありません。退役したストリームの `finish` は何もしません。

use std::sync::Arc;

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::{
    domain::{
        ChatId, ChatRepository, Color, InferenceError, NewAiChatMessage, TokenSink,
        text::trim_incomplete_sentences,
    },
    infrastructure::dto::websocket::{AiChatUser, OutboundMessage, StreamEnd, StreamFragment},
};

use super::broadcast::{Audience, Broadcaster};

/// ストリームを要求したリクエストの文脈
#[derive(Debug, Clone, PartialEq)]
pub struct StreamContext {
    pub chat_id: ChatId,
    /// キャラクターの表示名（AI エントリの作者）
    pub character_name: String,
    /// 要求者の色
    pub user_color: Option<Color>,
    pub ai_chat_user_list: Vec<AiChatUser>,
}

/// `begin` で発行される、1 つのストリームの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTicket {
    generation: u64,
}

/// プロバイダー呼び出しの終わり方
#[derive(Debug)]
pub enum StreamOutcome {
    /// 最終的な応答本文を受け取った
    Complete(String),
    /// 応答オブジェクト無しでストリームが閉じた
    Truncated,
    /// エラーまたはタイムアウト
    Failed(InferenceError),
}

struct OpenStream {
    context: StreamContext,
    buffer: String,
    forwarder: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct StreamState {
    generation: u64,
    open: Option<OpenStream>,
}

pub struct StreamAggregator {
    state: Arc<Mutex<StreamState>>,
    broadcaster: Arc<Broadcaster>,
    repository: Arc<dyn ChatRepository>,
}

impl StreamAggregator {
    pub fn new(broadcaster: Arc<Broadcaster>, repository: Arc<dyn ChatRepository>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState::default())),
            broadcaster,
            repository,
        }
    }

    /// ストリームを開き、チケットと断片の送り先を返す
    ///
    /// 開いているストリームがあれば、その購読を退役させてから開く。
    pub async fn begin(&self, context: StreamContext) -> (StreamTicket, TokenSink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;

        if let Some(previous) = state.open.take() {
            tracing::warn!(
                "Retiring open stream (generation {}) with {} buffered chars",
                state.generation,
                previous.buffer.len()
            );
            if let Some(forwarder) = previous.forwarder {
                forwarder.abort();
            }
        }

        state.generation += 1;
        let generation = state.generation;
        let forwarder = self.spawn_forwarder(generation, rx);
        state.open = Some(OpenStream {
            context,
            buffer: String::new(),
            forwarder: Some(forwarder),
        });
        tracing::debug!("Stream generation {} opened", generation);

        (StreamTicket { generation }, tx)
    }

    /// 断片を蓄積して `streamedAIResponse` として配信する転送タスク
    ///
    /// 世代が一致しなくなった時点で終了する。配信はロックを保持したまま行うため、
    /// `begin` の後に旧世代の断片が配信されることはない。
    fn spawn_forwarder(
        &self,
        generation: u64,
        mut rx: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move {
            while let Some(token) = rx.recv().await {
                let mut state = state.lock().await;
                if state.generation != generation {
                    break;
                }
                let Some(open) = state.open.as_mut() else {
                    break;
                };
                open.buffer.push_str(&token);
                let fragment = OutboundMessage::StreamedAiResponse(StreamFragment {
                    chat_id: open.context.chat_id,
                    username: open.context.character_name.clone(),
                    content: token,
                    user_color: open.context.user_color.clone(),
                });
                broadcaster.send(&fragment, Audience::All).await;
            }
        })
    }

    /// ストリームを閉じて最終化する
    ///
    /// 転送タスクの残りを流し切ってから `streamedAIResponseEnd` を配信し、
    /// 結果に応じて最終テキストを配信・永続化する。退役済みのチケットなら何もせず
    /// false を返す。
    pub async fn finish(&self, ticket: StreamTicket, outcome: StreamOutcome) -> bool {
        let forwarder = {
            let mut state = self.state.lock().await;
            if state.generation != ticket.generation {
                return false;
            }
            state.open.as_mut().and_then(|open| open.forwarder.take())
        };
        if let Some(forwarder) = forwarder {
            // 送り先が drop されていれば、残りの断片を配信し終えて終了する
            if let Err(e) = forwarder.await {
                tracing::debug!("Stream forwarder ended early: {}", e);
            }
        }

        let open = {
            let mut state = self.state.lock().await;
            if state.generation != ticket.generation {
                return false;
            }
            match state.open.take() {
                Some(open) => open,
                None => return false,
            }
        };
        let OpenStream {
            context, buffer, ..
        } = open;

        let end = OutboundMessage::StreamedAiResponseEnd(StreamEnd {
            chat_id: context.chat_id,
            username: context.character_name.clone(),
            user_color: context.user_color.clone(),
            ai_chat_user_list: context.ai_chat_user_list.clone(),
        });
        self.broadcaster.send(&end, Audience::All).await;

        let final_text = match outcome {
            StreamOutcome::Complete(text) => text,
            StreamOutcome::Truncated => trim_incomplete_sentences(&buffer),
            StreamOutcome::Failed(e) => {
                tracing::error!("AI stream failed after {} chars: {}", buffer.len(), e);
                trim_incomplete_sentences(&buffer)
            }
        };
        if final_text.is_empty() {
            tracing::warn!("AI stream produced no text, nothing to persist");
            return true;
        }

        let trimmed = OutboundMessage::TrimmedStreamMessage(StreamFragment {
            chat_id: context.chat_id,
            username: context.character_name.clone(),
            content: final_text.clone(),
            user_color: context.user_color,
        });
        self.broadcaster.send(&trimmed, Audience::All).await;

        if let Err(e) = self
            .repository
            .write_ai_chat_message(NewAiChatMessage::from_character(
                &context.character_name,
                final_text,
            ))
            .await
        {
            tracing::error!("Failed to persist streamed AI response: {}", e);
        }
        true
    }

    /// ストリームが開いているか
    pub async fn is_streaming(&self) -> bool {
        self.state.lock().await.open.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Client, ClientId, MessagePusher, Role, Username},
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryChatRepository,
        },
        usecase::registry::ConnectionRegistry,
    };
    use serde_json::Value;

    struct Fixture {
        aggregator: StreamAggregator,
        repository: Arc<InMemoryChatRepository>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    async fn create_fixture() -> Fixture {
        let pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
        let registry = Arc::new(ConnectionRegistry::new(pusher.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .register(
                Client::new(
                    ClientId::new("viewer".to_string()).unwrap(),
                    Username::new("viewer".to_string()).unwrap(),
                    Color::random(),
                    Role::Guest,
                ),
                tx,
            )
            .await;
        let broadcaster = Arc::new(Broadcaster::new(registry, pusher));
        let repository = Arc::new(InMemoryChatRepository::new());
        Fixture {
            aggregator: StreamAggregator::new(broadcaster, repository.clone()),
            repository,
            rx,
        }
    }

    fn context() -> StreamContext {
        StreamContext {
            chat_id: ChatId::AiChat,
            character_name: "Sensei".to_string(),
            user_color: Some(Color::from_stored("#FF8A8A".to_string())),
            ai_chat_user_list: vec![],
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames.iter().filter_map(|f| f["type"].as_str()).collect()
    }

    #[tokio::test]
    async fn test_truncated_stream_is_trimmed_and_persisted() {
        // テスト項目: 応答オブジェクト無しで閉じたストリームは蓄積分が配信・永続化される
        // given (前提条件):
        let mut fixture = create_fixture().await;
        let (ticket, sink) = fixture.aggregator.begin(context()).await;

        // when (操作):
        sink.send("Hel".to_string()).unwrap();
        sink.send("lo".to_string()).unwrap();
        drop(sink);
        let finished = fixture
            .aggregator
            .finish(ticket, StreamOutcome::Truncated)
            .await;

        // then (期待する結果):
        assert!(finished);
        let frames = drain(&mut fixture.rx);
        assert_eq!(
            types(&frames),
            vec![
                "streamedAIResponse",
                "streamedAIResponse",
                "streamedAIResponseEnd",
                "trimmedStreamMessage"
            ]
        );
        assert_eq!(frames[0]["content"], "Hel");
        assert_eq!(frames[1]["content"], "lo");
        assert_eq!(frames[1]["username"], "Sensei");
        assert_eq!(frames[1]["userColor"], "#FF8A8A");
        assert_eq!(frames[3]["content"], "Hello");
        let history = fixture.repository.read_ai_chat().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Hello");
        assert!(!fixture.aggregator.is_streaming().await);
    }

    #[tokio::test]
    async fn test_failed_stream_keeps_complete_sentences() {
        // テスト項目: 失敗したストリームは最後の完結した文まで残される
        // given (前提条件):
        let mut fixture = create_fixture().await;
        let (ticket, sink) = fixture.aggregator.begin(context()).await;
        sink.send("Done here. And th".to_string()).unwrap();
        drop(sink);

        // when (操作):
        fixture
            .aggregator
            .finish(
                ticket,
                StreamOutcome::Failed(InferenceError::Request("timeout".to_string())),
            )
            .await;

        // then (期待する結果):
        let frames = drain(&mut fixture.rx);
        assert_eq!(frames.last().unwrap()["content"], "Done here.");
        let history = fixture.repository.read_ai_chat().await.unwrap();
        assert_eq!(history[0].content, "Done here.");
    }

    #[tokio::test]
    async fn test_complete_outcome_replaces_buffer() {
        // テスト項目: 最終応答を受け取った場合は蓄積分ではなくその本文が使われる
        // given (前提条件):
        let mut fixture = create_fixture().await;
        let (ticket, sink) = fixture.aggregator.begin(context()).await;
        sink.send("partial".to_string()).unwrap();
        drop(sink);

        // when (操作):
        fixture
            .aggregator
            .finish(ticket, StreamOutcome::Complete("The full answer".to_string()))
            .await;

        // then (期待する結果):
        let frames = drain(&mut fixture.rx);
        assert_eq!(frames.last().unwrap()["content"], "The full answer");
        let history = fixture.repository.read_ai_chat().await.unwrap();
        assert_eq!(history[0].content, "The full answer");
    }

    #[tokio::test]
    async fn test_empty_failed_stream_persists_nothing() {
        // テスト項目: 何も受け取らずに失敗したストリームは終了通知だけを送る
        // given (前提条件):
        let mut fixture = create_fixture().await;
        let (ticket, sink) = fixture.aggregator.begin(context()).await;
        drop(sink);

        // when (操作):
        fixture
            .aggregator
            .finish(ticket, StreamOutcome::Failed(InferenceError::NoApi))
            .await;

        // then (期待する結果):
        let frames = drain(&mut fixture.rx);
        assert_eq!(types(&frames), vec!["streamedAIResponseEnd"]);
        assert!(fixture.repository.read_ai_chat().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_begin_retires_previous_stream() {
        // テスト項目: ストリーム中の begin は旧ストリームを退役させ、旧断片は配信されない
        // given (前提条件):
        let mut fixture = create_fixture().await;
        let (old_ticket, old_sink) = fixture.aggregator.begin(context()).await;
        old_sink.send("old ".to_string()).unwrap();
        tokio::task::yield_now().await;

        // when (操作):
        let (new_ticket, new_sink) = fixture.aggregator.begin(context()).await;
        let _ = old_sink.send("stale".to_string());
        new_sink.send("fresh.".to_string()).unwrap();
        drop(old_sink);
        drop(new_sink);
        let old_finished = fixture
            .aggregator
            .finish(old_ticket, StreamOutcome::Truncated)
            .await;
        let new_finished = fixture
            .aggregator
            .finish(new_ticket, StreamOutcome::Truncated)
            .await;

        // then (期待する結果):
        assert!(!old_finished);
        assert!(new_finished);
        let frames = drain(&mut fixture.rx);
        let contents: Vec<&str> = frames
            .iter()
            .filter(|f| f["type"] == "streamedAIResponse")
            .filter_map(|f| f["content"].as_str())
            .collect();
        assert!(!contents.contains(&"stale"));
        assert_eq!(contents.last(), Some(&"fresh."));
        assert_eq!(
            types(&frames)
                .iter()
                .filter(|t| **t == "streamedAIResponseEnd")
                .count(),
            1
        );
        let history = fixture.repository.read_ai_chat().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "fresh.");
    }
}
