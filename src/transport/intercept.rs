//! Transport decorator that redirects outbound calls into the mocking
//! engine.
//!
//! Whitelisted hosts are handed the inner transport's own call context, so
//! their calls execute exactly as if interception were absent. Everything
//! else gets a capturing context that never touches the network: the request
//! is accumulated phase by phase and resolved by the engine at
//! response-fetch.

use std::sync::Arc;

use log::debug;

use crate::errors::Error;
use crate::request::CapturedRequest;
use crate::response::HttpResponse;
use crate::session::Engine;

use super::{Call, HeaderValue, Transport};

/// Decorates an inner transport with interception.
pub struct InterceptingTransport {
    inner: Arc<dyn Transport>,
    engine: Arc<Engine>,
}

impl InterceptingTransport {
    pub(crate) fn new(inner: Arc<dyn Transport>, engine: Arc<Engine>) -> Self {
        Self { inner, engine }
    }
}

impl Transport for InterceptingTransport {
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Call>, Error> {
        if self.engine.is_whitelisted(host) {
            debug!("{host} is whitelisted, passing through");
            return self.inner.open(host, port);
        }

        Ok(Box::new(InterceptedCall {
            engine: Arc::clone(&self.engine),
            host: host.to_string(),
            port,
            capture: None,
        }))
    }
}

// Capturing call context for a non-whitelisted host. The capture is keyed to
// this connection context: created on the first `begin`, reused by repeated
// `begin` calls, and discarded once response synthesis completes.
struct InterceptedCall {
    engine: Arc<Engine>,
    host: String,
    port: u16,
    capture: Option<CapturedRequest>,
}

impl InterceptedCall {
    fn capture_mut(&mut self) -> Result<&mut CapturedRequest, Error> {
        self.capture
            .as_mut()
            .ok_or_else(|| Error::Simple(format!("no call in progress to {}", self.host)))
    }
}

impl Call for InterceptedCall {
    fn begin(&mut self, method: &str, url: &str) -> Result<(), Error> {
        // A connection object may be reused; a begin while mid-capture must
        // not create a duplicate capture context.
        if self.capture.is_none() {
            debug!("capturing {} {}{}", method, self.host, url);
            self.capture = Some(CapturedRequest::begin(&self.host, self.port, method, url));
        }
        Ok(())
    }

    fn add_header(&mut self, name: &str, values: &[HeaderValue]) -> Result<(), Error> {
        self.capture_mut()?.add_header(name, values);
        Ok(())
    }

    fn add_body(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.capture_mut()?.add_body(chunk);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Error> {
        self.capture_mut()?.finalize();
        Ok(())
    }

    fn response(&mut self) -> Result<HttpResponse, Error> {
        let request = self
            .capture
            .take()
            .ok_or_else(|| Error::Simple(format!("no call in progress to {}", self.host)))?;
        if !request.is_finalized() {
            return Err(Error::Simple(format!("call to {} fetched a response before being sent", self.host)));
        }

        self.engine.resolve(&request)
    }
}
