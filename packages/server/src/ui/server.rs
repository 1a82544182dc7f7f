//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::routing::get;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;

use crate::{
    domain::EndpointKind,
    infrastructure::dto::websocket::OutboundMessage,
    usecase::{
        Audience, Broadcaster, ConnectParticipantUseCase, ConnectionRegistry,
        DisconnectParticipantUseCase, Router,
    },
};

use super::{
    handler::{health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Relay hub server
///
/// Serves two listeners that share every usecase. Connections accepted on
/// the host listener start with the host role, the guest listener with the
/// guest role.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(connect, disconnect, router, registry, broadcaster);
/// server.run("0.0.0.0", 8181, 8182).await?;
/// ```
pub struct Server {
    /// ConnectParticipantUseCase（参加者接続のユースケース）
    connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    /// DisconnectParticipantUseCase（参加者切断のユースケース）
    disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    router: Arc<Router>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl Server {
    pub fn new(
        connect_participant_usecase: Arc<ConnectParticipantUseCase>,
        disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
        router: Arc<Router>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            connect_participant_usecase,
            disconnect_participant_usecase,
            router,
            registry,
            broadcaster,
        }
    }

    /// Bind both listeners and serve until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if either listener fails to bind or if there's an
    /// error during server execution.
    pub async fn run(
        self,
        host: &str,
        host_port: u16,
        guest_port: u16,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let host_listener = TcpListener::bind((host, host_port)).await?;
        let guest_listener = TcpListener::bind((host, guest_port)).await?;

        tracing::info!("Host endpoint listening on {}", host_listener.local_addr()?);
        tracing::info!(
            "Guest endpoint listening on {}",
            guest_listener.local_addr()?
        );
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(host_listener, guest_listener, shutdown_signal())
            .await?;
        Ok(())
    }

    /// Serve on already bound listeners until `shutdown` resolves
    ///
    /// On shutdown every client is sent `forceDisconnect`, every outbound
    /// queue is closed and then both listeners stop.
    pub async fn serve(
        self,
        host_listener: TcpListener,
        guest_listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let host_app = self.app(EndpointKind::Host);
        let guest_app = self.app(EndpointKind::Guest);

        let host_server = axum::serve(host_listener, host_app)
            .with_graceful_shutdown(wait_for_stop(stop_rx.clone()));
        let guest_server = axum::serve(guest_listener, guest_app)
            .with_graceful_shutdown(wait_for_stop(stop_rx));

        let registry = self.registry;
        let broadcaster = self.broadcaster;
        let coordinator = async move {
            shutdown.await;
            let notified = broadcaster
                .send(&OutboundMessage::ForceDisconnect, Audience::All)
                .await;
            let closed = registry.close_all().await;
            tracing::info!(
                "Sent forceDisconnect to {} client(s), closed {} connection(s)",
                notified,
                closed
            );
            let _ = stop_tx.send(true);
            Ok::<(), std::io::Error>(())
        };

        tokio::try_join!(
            async move { host_server.await },
            async move { guest_server.await },
            coordinator
        )?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    fn app(&self, endpoint: EndpointKind) -> axum::Router {
        let app_state = Arc::new(AppState {
            endpoint,
            connect_participant_usecase: self.connect_participant_usecase.clone(),
            disconnect_participant_usecase: self.disconnect_participant_usecase.clone(),
            router: self.router.clone(),
            registry: self.registry.clone(),
        });

        axum::Router::new()
            // WebSocket エンドポイント
            .route("/", get(websocket_handler))
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
