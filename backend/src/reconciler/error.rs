//! Reconciler error types

use crate::gateway::GatewayError;
use thiserror::Error;

/// Failures of a foreground reconciler action
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The action needs an active session and none is selected
    #[error("No active session")]
    NoActiveSession,

    /// The referenced session is not in the local list
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Attachments could not be uploaded; nothing was sent
    #[error("Failed to upload attachments: {0}")]
    Upload(#[source] GatewayError),

    /// The completion call failed
    #[error("Completion failed: {0}")]
    Completion(#[source] GatewayError),

    /// A data gateway call failed
    #[error(transparent)]
    Data(#[from] GatewayError),
}
