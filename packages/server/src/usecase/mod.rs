//! UseCase 層
//!
//! ドメイン層のインターフェースだけに依存し、接続管理・認可・フレームの振り分け・
//! AI 応答ストリームの管理を行います。

mod ai_response;
mod broadcast;
mod connect_participant;
mod disconnect_participant;
mod dispatch;
mod error;
mod registry;
mod session_state;
mod stream;
mod submit_key;

pub use ai_response::{AiResponseUseCase, character_color};
pub use broadcast::{Audience, Broadcaster};
pub use connect_participant::{ConnectParticipantUseCase, ConnectRequest, Connection};
pub use disconnect_participant::DisconnectParticipantUseCase;
pub use dispatch::{Dispatched, Router, RouterDeps};
pub use error::{ConnectError, DispatchError};
pub use registry::{ConnectionRegistry, ConnectionToken};
pub use session_state::SessionState;
pub use stream::{StreamAggregator, StreamContext, StreamOutcome, StreamTicket};
pub use submit_key::{KeyOutcome, SubmitKeyUseCase};
