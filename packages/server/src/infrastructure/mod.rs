//! Infrastructure layer: concrete implementations of the domain interfaces
//! and the wire DTOs.

pub mod dto;
pub mod files;
pub mod inference;
pub mod message_pusher;
pub mod repository;
pub mod secrets;
