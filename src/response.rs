//! Response synthesis: turns a resolved reply descriptor into a response
//! object shaped like what a blocking HTTP client hands back, with a status
//! line, a header table, and a readable body that drains across chunked
//! reads.

use std::sync::Arc;

use crate::errors::Error;
use crate::persistence::Persistence;

/// Reply descriptor produced by a resolver: status, headers, content.
/// Unset fields fall back to 200 / empty headers / empty body during
/// synthesis.
#[derive(Clone, Debug, Default)]
pub struct Reply {
    status: Option<u16>,
    content: Option<Content>,
    headers: Vec<(String, Vec<String>)>,
}

/// Reply content: either literal text or a JSON value serialized at
/// synthesis time.
#[derive(Clone, Debug)]
pub enum Content {
    Text(String),
    Json(serde_json::Value),
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn text(mut self, content: impl Into<String>) -> Self {
        self.content = Some(Content::Text(content.into()));
        self
    }

    pub fn json(mut self, content: serde_json::Value) -> Self {
        self.content = Some(Content::Json(content));
        self
    }

    /// Appends a header value. Call repeatedly for multi-valued headers.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.headers.push((name, vec![value])),
        }
        self
    }
}

/// Header table with case-insensitive lookup and full iteration. Names keep
/// the casing they arrived with.
#[derive(Clone, Debug, Default)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub(crate) fn from_entries(entries: Vec<(String, Vec<String>)>) -> Self {
        let mut headers = Headers::default();
        for (name, values) in entries {
            for value in values {
                headers.append(&name, &value);
            }
        }
        headers
    }

    pub(crate) fn append(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, values)) => values.push(value.to_string()),
            None => self.entries.push((name.to_string(), vec![value.to_string()])),
        }
    }

    /// First value for the header, or `None` when absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// First value for the header, or the supplied default.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Body reads optionally tee into the persistence layer so saved mocks keep
// their bodies even though the underlying content is drained exactly once.
struct BodyTee {
    persistence: Arc<dyn Persistence>,
    hash: String,
    // Bytes of a multi-byte UTF-8 sequence cut off by a chunk boundary,
    // held until the rest of the sequence arrives.
    pending: Vec<u8>,
}

impl BodyTee {
    // Feeds raw chunk bytes, forwarding only complete UTF-8 sequences so a
    // character split across chunk reads survives reassembly intact.
    fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    if !text.is_empty() {
                        self.forward(text);
                    }
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        if !text.is_empty() {
                            self.forward(text);
                        }
                    }
                    match err.error_len() {
                        // Truncated sequence: the remainder arrives with the
                        // next chunk.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(broken) => {
                            self.forward("\u{FFFD}");
                            self.pending.drain(..valid + broken);
                        }
                    }
                }
            }
        }
    }

    fn forward(&self, text: &str) {
        if let Err(err) = self.persistence.save_body(&self.hash, text) {
            log::warn!("failed to persist body chunk for {}: {err}", self.hash);
        }
    }
}

/// Response handed back to the caller of an intercepted (or real) call.
pub struct HttpResponse {
    status: u16,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
    cursor: usize,
    tee: Option<BodyTee>,
}

impl HttpResponse {
    /// Synthesizes a response from a reply descriptor, filling defaults:
    /// status 200, empty body, no headers beyond those supplied.
    pub fn from_reply(reply: &Reply) -> Result<HttpResponse, Error> {
        let status = reply.status.unwrap_or(200);
        let reason = reason_phrase(status).ok_or(Error::InvalidStatus(status))?;

        let mut headers = Headers::from_entries(reply.headers.clone());
        let body = match &reply.content {
            None => Vec::new(),
            Some(Content::Text(text)) => text.clone().into_bytes(),
            Some(Content::Json(value)) => {
                let bytes = serde_json::to_vec(value)?;
                // A reply-supplied Content-Length is never overridden.
                if !headers.contains("Content-Length") {
                    headers.append("Content-Length", &bytes.len().to_string());
                }
                bytes
            }
        };

        Ok(HttpResponse {
            status,
            reason: reason.to_string(),
            headers,
            body,
            cursor: 0,
            tee: None,
        })
    }

    /// Builds a response from wire-level parts, passed through unmodified.
    pub(crate) fn from_parts(status: u16, reason: &str, headers: Headers, body: Vec<u8>) -> HttpResponse {
        HttpResponse {
            status,
            reason: reason.to_string(),
            headers,
            body,
            cursor: 0,
            tee: None,
        }
    }

    /// Arranges for every body chunk read by the caller to also be handed to
    /// the persistence layer under the given story hash.
    pub(crate) fn tee_body(&mut self, persistence: Arc<dyn Persistence>, hash: &str) {
        self.tee = Some(BodyTee {
            persistence,
            hash: hash.to_string(),
            pending: Vec::new(),
        });
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase from the status line.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Header lookup with a default, mirroring `getheader` on a real
    /// response object.
    pub fn header<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.headers.get_or(name, default)
    }

    /// Reads up to `amt` bytes of the body, or the whole remainder when
    /// `None`. The cursor advances; repeated reads drain the body so chunked
    /// readers see the full content exactly once.
    pub fn read(&mut self, amt: Option<usize>) -> Vec<u8> {
        let remaining = self.body.len() - self.cursor;
        let take = amt.map_or(remaining, |amt| amt.min(remaining));
        let chunk = self.body[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;

        if let Some(tee) = &mut self.tee {
            if !chunk.is_empty() {
                tee.feed(&chunk);
            }
        }

        chunk
    }

    /// Remainder of the body as UTF-8 text.
    pub fn text(&mut self) -> Result<String, Error> {
        Ok(String::from_utf8(self.read(None))?)
    }

    /// Remainder of the body parsed as JSON.
    pub fn json(&mut self) -> Result<serde_json::Value, Error> {
        Ok(serde_json::from_slice(&self.read(None))?)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Standard reason phrase for an HTTP status code.
pub fn reason_phrase(status: u16) -> Option<&'static str> {
    let reason = match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        422 => "Unprocessable Entity",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => return None,
    };
    Some(reason)
}
