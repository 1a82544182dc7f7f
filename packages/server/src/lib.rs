//! Irori relay hub library.
//!
//! A host and any number of guests share one live chat room with an AI
//! participant. Clients connect over WebSocket to one of two endpoints and
//! exchange JSON frames; the hub authenticates role upgrades, routes
//! commands through a role-gated dispatcher, fans events out to the
//! connected clients and drives a single in-flight AI response stream.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
