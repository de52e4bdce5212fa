//! Per-session message sync state machine
//!
//! ```text
//! Idle ──arm──▶ Pending ──dispatch──▶ InFlight ──settle──▶ Settled
//!                 │  ▲                   │
//!                 └──┴──── arm / abort ──┘
//! ```
//!
//! Every armed window carries a generation number; dispatch and settle must
//! quote the generation they belong to, so a superseded timer can never
//! advance the machine.

use serde::Serialize;
use thiserror::Error;

/// How a sync window ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Messages and session row were written
    Persisted,
    /// A remote call failed; nothing is retried
    Failed,
    /// Superseded by a newer window or cancelled by a session switch
    Aborted,
}

/// Sync status of the active session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Nothing scheduled yet
    #[default]
    Idle,
    /// Debounce timer armed
    Pending {
        /// Window generation
        generation: u64,
    },
    /// Upsert issued
    InFlight {
        /// Window generation
        generation: u64,
    },
    /// Window finished
    Settled {
        /// Window generation
        generation: u64,
        /// How it ended
        outcome: SyncOutcome,
    },
}

/// A transition that does not apply to the current status
#[derive(Error, Debug, PartialEq, Eq)]
#[error("cannot {action} generation {generation} from {from:?}")]
pub struct SyncTransitionError {
    /// Attempted transition
    pub action: &'static str,
    /// Generation quoted by the caller
    pub generation: u64,
    /// Status at the time
    pub from: SyncStatus,
}

impl SyncStatus {
    /// Generation of the current window, if any was ever armed
    pub fn generation(&self) -> Option<u64> {
        match self {
            SyncStatus::Idle => None,
            SyncStatus::Pending { generation }
            | SyncStatus::InFlight { generation }
            | SyncStatus::Settled { generation, .. } => Some(*generation),
        }
    }

    /// True while a timer is armed or a call is outstanding
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending { .. } | SyncStatus::InFlight { .. })
    }

    /// Arm a new debounce window, superseding whatever was running
    pub fn arm(self, generation: u64) -> Result<SyncStatus, SyncTransitionError> {
        match self.generation() {
            Some(current) if generation <= current => Err(SyncTransitionError {
                action: "arm",
                generation,
                from: self,
            }),
            _ => Ok(SyncStatus::Pending { generation }),
        }
    }

    /// The debounce timer fired and the upsert is about to be issued
    pub fn dispatch(self, generation: u64) -> Result<SyncStatus, SyncTransitionError> {
        match self {
            SyncStatus::Pending { generation: g } if g == generation => {
                Ok(SyncStatus::InFlight { generation })
            }
            from => Err(SyncTransitionError {
                action: "dispatch",
                generation,
                from,
            }),
        }
    }

    /// The remote calls of an in-flight window finished
    pub fn settle(
        self,
        generation: u64,
        outcome: SyncOutcome,
    ) -> Result<SyncStatus, SyncTransitionError> {
        match self {
            SyncStatus::InFlight { generation: g } if g == generation => {
                Ok(SyncStatus::Settled {
                    generation,
                    outcome,
                })
            }
            from => Err(SyncTransitionError {
                action: "settle",
                generation,
                from,
            }),
        }
    }

    /// Cancel a pending or in-flight window; other states are left alone
    pub fn abort(self) -> SyncStatus {
        match self {
            SyncStatus::Pending { generation } | SyncStatus::InFlight { generation } => {
                SyncStatus::Settled {
                    generation,
                    outcome: SyncOutcome::Aborted,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let status = SyncStatus::Idle.arm(1).unwrap();
        assert_eq!(status, SyncStatus::Pending { generation: 1 });
        let status = status.dispatch(1).unwrap();
        assert!(status.is_active());
        let status = status.settle(1, SyncOutcome::Persisted).unwrap();
        assert_eq!(
            status,
            SyncStatus::Settled {
                generation: 1,
                outcome: SyncOutcome::Persisted
            }
        );
        assert!(!status.is_active());
    }

    #[test]
    fn test_superseded_window_cannot_dispatch() {
        let first = SyncStatus::Idle.arm(1).unwrap();
        let second = first.arm(2).unwrap();
        let err = second.dispatch(1).unwrap_err();
        assert_eq!(err.action, "dispatch");
        assert!(second.dispatch(2).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(SyncStatus::Idle.dispatch(1).is_err());
        assert!(SyncStatus::Idle.settle(1, SyncOutcome::Failed).is_err());
        assert!(SyncStatus::Pending { generation: 1 }
            .settle(1, SyncOutcome::Persisted)
            .is_err());
        assert!(SyncStatus::Pending { generation: 3 }.arm(2).is_err());
    }

    #[test]
    fn test_abort() {
        assert_eq!(
            SyncStatus::InFlight { generation: 4 }.abort(),
            SyncStatus::Settled {
                generation: 4,
                outcome: SyncOutcome::Aborted
            }
        );
        assert_eq!(SyncStatus::Idle.abort(), SyncStatus::Idle);
    }
}
