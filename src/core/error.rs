use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::core::endpoint::Endpoint;
use crate::core::session::SessionState;

/// Failure of a single session. Every variant names the endpoint it
/// belongs to.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("writing request to {endpoint} failed: {source}")]
    Write {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// The connection broke before the peer closed it. `partial` holds
    /// every byte received up to that point.
    #[error("reading from {endpoint} failed after {} bytes: {source}", .partial.len())]
    Read {
        endpoint: Endpoint,
        partial: Bytes,
        #[source]
        source: io::Error,
    },

    #[error("request to {endpoint} did not complete within {after:?}")]
    Timeout { endpoint: Endpoint, after: Duration },

    #[error("cannot {op} session for {endpoint} in state {state}")]
    InvalidState {
        endpoint: Endpoint,
        state: SessionState,
        op: &'static str,
    },
}

impl RequestError {
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            RequestError::Connect { endpoint, .. }
            | RequestError::Write { endpoint, .. }
            | RequestError::Read { endpoint, .. }
            | RequestError::Timeout { endpoint, .. }
            | RequestError::InvalidState { endpoint, .. } => endpoint,
        }
    }

    /// Bytes received before a read error, if any were kept.
    pub fn partial_payload(&self) -> Option<&Bytes> {
        match self {
            RequestError::Read { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// One failed position of a batch.
#[derive(Debug)]
pub struct EndpointFailure {
    /// Position of the endpoint in the caller's input.
    pub index: usize,
    pub error: RequestError,
}

/// The endpoints of a batch that failed, in input order.
#[derive(Debug)]
pub struct BatchFailure {
    pub total: usize,
    pub failures: Vec<EndpointFailure>,
}

impl BatchFailure {
    pub fn first(&self) -> Option<&RequestError> {
        self.failures.first().map(|f| &f.error)
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} requests failed", self.failures.len(), self.total)?;
        for failure in &self.failures {
            write!(f, "; [{}] {}", failure.index, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchFailure {}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{0}")]
    Failed(BatchFailure),

    /// The coordinator task spawned on an explicit runtime never finished
    /// (panicked or its runtime shut down).
    #[error("coordinator task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

impl BatchError {
    pub fn failures(&self) -> &[EndpointFailure] {
        match self {
            BatchError::Failed(batch) => &batch.failures,
            BatchError::Aborted(_) => &[],
        }
    }
}
