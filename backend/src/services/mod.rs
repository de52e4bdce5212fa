//! Service layer for business logic
//!
//! This module contains service abstractions that separate business logic
//! from HTTP handlers, making the code more modular and testable.

pub mod experts;

pub use experts::{ExpertService, GenerateExpertRequest, GeneratedExpertFields};
