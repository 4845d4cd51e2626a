//! Transport seam for outbound HTTP calls.
//!
//! Client code is constructed against the [`Transport`] trait rather than a
//! concrete socket, so a mocking session can swap the transport held in a
//! [`TransportSlot`] for an [`InterceptingTransport`] decorator and restore
//! the original on deactivation. A [`Call`] is the per-connection context
//! threaded through every phase of one outbound call; it replaces any notion
//! of stashing side-channel state on a connection object.

pub mod intercept;
pub mod tcp;

pub use intercept::InterceptingTransport;
pub use tcp::TcpTransport;

use std::sync::{Arc, RwLock};

use crate::errors::Error;
use crate::response::HttpResponse;

/// Entry points of the transport call lifecycle that interception installs
/// itself into. `ResponseBodyRead` is only required when response bodies are
/// being persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookTarget {
    RequestBegin,
    HeaderAppend,
    RequestFinalize,
    ResponseFetch,
    ResponseBodyRead,
}

impl HookTarget {
    pub(crate) const REQUIRED: [HookTarget; 4] = [
        HookTarget::RequestBegin,
        HookTarget::HeaderAppend,
        HookTarget::RequestFinalize,
        HookTarget::ResponseFetch,
    ];
}

/// A single header value. Real transports accept both text and raw bytes,
/// so captures preserve the distinction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    /// Text form of the value. Byte values are decoded lossily.
    pub fn as_text(&self) -> String {
        match self {
            HeaderValue::Text(text) => text.clone(),
            HeaderValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> HeaderValue {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> HeaderValue {
        HeaderValue::Text(value)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(value: Vec<u8>) -> HeaderValue {
        HeaderValue::Bytes(value)
    }
}

/// Blocking HTTP transport. Opening a host/port yields a [`Call`] context;
/// all further phases of the outbound call are methods on that context.
pub trait Transport: Send + Sync {
    /// Opens a connection context to the given host and port.
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Call>, Error>;

    /// Reports whether the transport exposes the given lifecycle entry point.
    /// Activation fails loudly when a required entry point is missing.
    fn supports(&self, target: HookTarget) -> bool {
        let _ = target;
        true
    }
}

/// One outbound call in progress. Phases mirror how a blocking HTTP client
/// builds a request: request line, headers, body, send, response.
///
/// The context is created once per connection and reused until the connection
/// is closed; a repeated `begin` on a context that is mid-call must not
/// discard state already accumulated.
pub trait Call: Send {
    /// Starts the request line. `url` is the path with optional query string.
    fn begin(&mut self, method: &str, url: &str) -> Result<(), Error>;

    /// Appends a header. Multi-valued headers arrive as multiple values.
    fn add_header(&mut self, name: &str, values: &[HeaderValue]) -> Result<(), Error>;

    /// Appends a chunk of the request body. May be called repeatedly; chunks
    /// accumulate.
    fn add_body(&mut self, chunk: &[u8]) -> Result<(), Error>;

    /// Marks the request as sent. After this the request is immutable.
    fn finalize(&mut self) -> Result<(), Error>;

    /// Fetches the response for the finalized request.
    fn response(&mut self) -> Result<HttpResponse, Error>;
}

/// Shared handle through which client code obtains its transport.
///
/// Activation swaps the held transport for an interceptor and deactivation
/// restores the original, so calls issued through the slot are transparently
/// redirected for the lifetime of a session.
#[derive(Clone)]
pub struct TransportSlot {
    inner: Arc<RwLock<Arc<dyn Transport>>>,
}

impl TransportSlot {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(transport)),
        }
    }

    /// The transport currently installed in the slot.
    pub fn current(&self) -> Result<Arc<dyn Transport>, Error> {
        Ok(Arc::clone(&*self.inner.read()?))
    }

    /// Installs a new transport, returning the one it displaced.
    pub(crate) fn swap(&self, transport: Arc<dyn Transport>) -> Result<Arc<dyn Transport>, Error> {
        let mut slot = self.inner.write()?;
        Ok(std::mem::replace(&mut *slot, transport))
    }
}

impl std::fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TransportSlot").finish_non_exhaustive()
    }
}
