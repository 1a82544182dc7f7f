//! Server state shared by the handlers of one listener.

use std::sync::Arc;

use crate::{
    domain::EndpointKind,
    usecase::{
        ConnectParticipantUseCase, ConnectionRegistry, DisconnectParticipantUseCase, Router,
    },
};

/// Shared application state
///
/// Each listener gets its own copy that differs only in `endpoint`.
pub struct AppState {
    /// Which listener accepted the connection
    pub endpoint: EndpointKind,
    /// ConnectParticipantUseCase（参加者接続のユースケース）
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    /// DisconnectParticipantUseCase（参加者切断のユースケース）
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    /// 受信フレームの振り分け
    pub router: Arc<Router>,
    pub registry: Arc<ConnectionRegistry>,
}
