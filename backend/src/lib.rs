//! Botchat Backend Library
//!
//! Persona-driven chat backend: expert registry, remote data/completion/
//! upload gateways, and the session/message reconciler.
//! The server binary is in `src/main.rs`.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod personas;
pub mod reconciler;
pub mod services;
/// Application state management
///
/// Holds the gateways shared by the HTTP handlers.
pub mod state;
