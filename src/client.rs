//! Small blocking HTTP client driven through the [`TransportSlot`].
//!
//! This is the layer the code under test talks to: it breaks a URL into the
//! phased transport calls (`open`, `begin`, headers, body, `finalize`,
//! `response`) so whatever transport the slot currently holds — real or
//! intercepting — sees the same sequence.

use log::debug;
use url::Url;

use crate::errors::Error;
use crate::response::HttpResponse;
use crate::transport::{HeaderValue, TransportSlot};

pub struct HttpClient {
    slot: TransportSlot,
}

impl HttpClient {
    pub fn new(slot: TransportSlot) -> Self {
        Self { slot }
    }

    pub fn get(&self, url: &str) -> Result<HttpResponse, Error> {
        self.request("GET", url, &[], None)
    }

    pub fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<HttpResponse, Error> {
        self.request("POST", url, &[("Content-Type", content_type)], Some(body))
    }

    /// Issues a request through the slot's current transport.
    pub fn request(&self, method: &str, url: &str, headers: &[(&str, &str)], body: Option<&[u8]>) -> Result<HttpResponse, Error> {
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().ok_or_else(|| Error::Simple(format!("no host in url: {url}")))?;
        let port = parsed.port_or_known_default().unwrap_or(80);

        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            target.push('?');
            target.push_str(query);
        }

        debug!("{method} {url}");

        let transport = self.slot.current()?;
        let mut call = transport.open(host, port)?;
        call.begin(method, &target)?;
        call.add_header("Host", &[HeaderValue::from(host)])?;
        for (name, value) in headers {
            call.add_header(name, &[HeaderValue::from(*value)])?;
        }
        if let Some(body) = body {
            call.add_body(body)?;
        }
        call.finalize()?;
        call.response()
    }
}
