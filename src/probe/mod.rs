//! Probe capability used by the round orchestrator
//!
//! A probe performs one liveness/occupancy check against one service. How the
//! check is carried out (wire protocol, HTTP API, ...) is up to the
//! implementation; the orchestrator only sees a [`ProbeResponse`] or a
//! [`ProbeError`].
//!
//! Implementations should honour the `timeout` they are handed, but the
//! orchestrator enforces it independently and reports [`ProbeError::Timeout`]
//! for probes that overrun.

pub mod http;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::service::ProtocolVariant;

pub use http::HttpProbe;

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Identity of the service being probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub name: String,
    pub address: String,
}

/// Successful probe answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Raw, unsanitized occupancy; `None` if the service answered without one
    pub value: Option<i64>,

    /// Icon reported by the service, if any
    pub favicon: Option<String>,
}

/// Errors that can occur while probing a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Probe did not settle within the configured timeout
    Timeout(Duration),

    /// Transport-level failure (connect, TLS, reset, ...)
    Request(String),

    /// Service answered with a non-success status
    Status(u16),

    /// Response body could not be decoded
    Decode(String),

    /// Response did not contain the occupancy field
    MissingField(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout(timeout) => {
                write!(f, "probe timed out after {}ms", timeout.as_millis())
            }
            ProbeError::Request(msg) => write!(f, "request failed: {}", msg),
            ProbeError::Status(code) => write!(f, "unexpected status code: {}", code),
            ProbeError::Decode(msg) => write!(f, "failed to decode response: {}", msg),
            ProbeError::MissingField(pointer) => {
                write!(f, "response has no occupancy at {}", pointer)
            }
        }
    }
}

impl std::error::Error for ProbeError {}

/// Liveness/occupancy check against a single service
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(
        &self,
        target: &ProbeTarget,
        variant: &ProtocolVariant,
        timeout: Duration,
    ) -> ProbeResult<ProbeResponse>;
}
