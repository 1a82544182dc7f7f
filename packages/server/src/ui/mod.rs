//! UI layer: the Axum listeners and their handlers.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
