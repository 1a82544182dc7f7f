//! Outbound frame delivery.
//!
//! Defines how frames reach connected clients. The channels themselves are
//! created by the UI layer when a socket is accepted; implementations only
//! hold the sending halves.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ClientId, MessagePushError};

/// Sending half of a client's outbound frame queue
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// Attach the outbound channel of a newly accepted client
    async fn register_client(&self, client_id: ClientId, sender: PusherChannel);

    /// Drop a client's channel. Returns whether a channel was attached.
    async fn unregister_client(&self, client_id: &ClientId) -> bool;

    /// Drop every channel, closing all outbound queues
    async fn unregister_all(&self) -> usize;

    /// Send one frame to one client
    async fn push_to(&self, client_id: &ClientId, content: &str) -> Result<(), MessagePushError>;

    /// Send one frame to every target whose channel is still open.
    ///
    /// Closed or missing channels are skipped. Returns the number of clients
    /// the frame was queued for.
    async fn broadcast(&self, targets: &[ClientId], content: &str) -> usize;
}
