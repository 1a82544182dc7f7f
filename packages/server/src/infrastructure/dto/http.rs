//! HTTP API response DTOs.

use serde::Serialize;

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    /// Number of connected clients
    pub clients: usize,
}
