//! Application state
//!
//! Explicitly constructed gateways shared by the HTTP handlers and the
//! terminal driver.

pub mod app_state;

pub use app_state::AppState;
