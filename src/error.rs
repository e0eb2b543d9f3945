//! Error taxonomy for the event-application path.
//!
//! Everything outside the hot path (composition root, migrations, one-shot
//! setup) propagates via `anyhow::Result`. Inside the orchestrator's per-event
//! handling, callers branch on these variants to decide retry vs. skip vs.
//! abort, so they get a dedicated enum instead.

use std::fmt;

#[derive(Debug)]
pub enum IndexError {
    /// Transient chain RPC failure; the caller should retry with backoff.
    ChainRpc(anyhow::Error),
    /// A log could not be ABI-decoded into one of the three known events.
    Decode(String),
    /// Swap/ModifyLiquidity referenced a pool with no prior Initialize.
    MissingPool(String),
    /// The persistence layer is unreachable; fatal, the process should exit.
    Database(anyhow::Error),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::ChainRpc(err) => write!(f, "chain rpc error: {err}"),
            IndexError::Decode(msg) => write!(f, "failed to decode log: {msg}"),
            IndexError::MissingPool(pool_id) => {
                write!(f, "pool {pool_id} has no Initialize record")
            },
            IndexError::Database(err) => write!(f, "database unavailable: {err}"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::ChainRpc(err) => Some(err.as_ref()),
            IndexError::Decode(_) => None,
            IndexError::MissingPool(_) => None,
            IndexError::Database(err) => Some(err.as_ref()),
        }
    }
}

impl IndexError {
    /// Whether this error should halt the orchestrator rather than skip
    /// the offending event and keep consuming the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Database(_))
    }
}
