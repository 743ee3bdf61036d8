//! Push transport abstraction
//!
//! Implementations:
//! - `HttpPushTransport`: POSTs the text encoding to a pushgateway
//! - `InMemoryPushTransport`: records pushes, for tests and simulation
//!
//! A transport makes exactly one delivery attempt per call. There is no
//! retry and no timeout; a hung endpoint keeps its cycle open until it
//! answers.

mod http;
mod memory;

pub use http::HttpPushTransport;
pub use memory::{InMemoryPushTransport, PushRecord};

use crate::exposition::MetricFamily;
use std::future::Future;
use std::pin::Pin;

/// Error type for push attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Endpoint URL cannot be used to build a push URL
    InvalidEndpoint(String),
    /// Connection or protocol failure
    Transport(String),
    /// Gateway answered with a non-success status
    Status { status: u16, body: String },
    /// Gathered families could not be encoded
    Encode(String),
    /// Failure injected by a test transport
    Injected(String),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::InvalidEndpoint(msg) => write!(f, "invalid push endpoint: {}", msg),
            PushError::Transport(msg) => write!(f, "push transport error: {}", msg),
            PushError::Status { status, body } => {
                write!(f, "unexpected status code {} while pushing: {}", status, body)
            }
            PushError::Encode(msg) => write!(f, "could not encode series: {}", msg),
            PushError::Injected(msg) => write!(f, "injected push failure: {}", msg),
        }
    }
}

impl std::error::Error for PushError {}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        PushError::Transport(e.to_string())
    }
}

impl From<prometheus::Error> for PushError {
    fn from(e: prometheus::Error) -> Self {
        PushError::Encode(e.to_string())
    }
}

pub type PushFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>>;

/// Delivers one gathered series set to a remote endpoint
pub trait PushTransport: Send + Sync + 'static {
    fn push<'a>(
        &'a self,
        endpoint: &'a str,
        job: &'a str,
        families: &'a [MetricFamily],
    ) -> PushFuture<'a>;
}
