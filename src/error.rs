//! Error types for session, transport, and exchange operations.

use crate::config::TagSpace;
use crate::message::{Rank, Tag, ThreadLevel};
use std::fmt;
use thiserror::Error;

/// Result type for every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Names the transport primitive that failed, for error reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init,
    Finalize,
    Barrier,
    Send,
    Recv,
    Probe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Finalize => "finalize",
            Self::Barrier => "barrier",
            Self::Send => "send",
            Self::Recv => "recv",
            Self::Probe => "probe",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// The transport granted a weaker threading guarantee than required.
    #[error("transport granted {granted:?} threading, {required:?} is required")]
    Initialization {
        required: ThreadLevel,
        granted: ThreadLevel,
    },

    /// `Session::open` was called on a session that is already open.
    #[error("session is already open")]
    AlreadyOpen,

    /// An operation was attempted before `open` or after `close`.
    #[error("session is not open")]
    SessionClosed,

    /// The underlying transport failed. Treated as fatal for the round.
    #[error("transport {op} failed: {reason}")]
    Transport { op: Operation, reason: String },

    /// A message arrived from a rank other than the one expected. The
    /// `expected` rank is `None` when the message came from a rank outside
    /// the pending set of an exchange round.
    #[error("unexpected message from rank {actual} on tag {tag} (expected {})", display_expected(.expected))]
    UnexpectedPeer {
        expected: Option<Rank>,
        actual: Rank,
        tag: Tag,
    },

    /// A tag outside the agreed application tag space.
    #[error("tag {tag} is outside the tag space {space}")]
    Protocol { tag: Tag, space: TagSpace },

    /// A rank outside the communicating group.
    #[error("rank {rank} is outside the group of size {size}")]
    InvalidRank { rank: Rank, size: usize },

    /// A job submitted to a worker was dropped without running.
    #[error("worker thread stopped before running the job")]
    WorkerStopped,

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

fn display_expected(expected: &Option<Rank>) -> String {
    match expected {
        Some(rank) => format!("rank {}", rank),
        None => "one of the pending peers".to_string(),
    }
}

impl Error {
    pub fn transport(op: Operation, reason: impl Into<String>) -> Self {
        Error::Transport {
            op,
            reason: reason.into(),
        }
    }

    /// Check an MPI return code, returning `Ok(())` for `MPI_SUCCESS`.
    pub fn check(op: Operation, code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self::transport(op, format!("MPI error code {}", code)))
        }
    }

    /// Whether this error came from the transport rather than from misuse
    /// of the API.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_accepts_success_code() {
        assert!(Error::check(Operation::Send, 0).is_ok());
    }

    #[test]
    fn check_maps_failure_code_to_transport_error() {
        let error = Error::check(Operation::Recv, 17).unwrap_err();
        assert!(error.is_transport());
        assert_eq!(error.to_string(), "transport recv failed: MPI error code 17");
    }

    #[test]
    fn unexpected_peer_message_names_both_ranks() {
        let error = Error::UnexpectedPeer {
            expected: Some(2),
            actual: 3,
            tag: 7,
        };
        assert_eq!(
            error.to_string(),
            "unexpected message from rank 3 on tag 7 (expected rank 2)"
        );
    }
}
