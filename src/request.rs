//! Captured representation of one outbound call under interception.
//!
//! A [`CapturedRequest`] is created when the transport begins constructing a
//! call, mutated as headers and body chunks are appended, and frozen at
//! `finalize`. Exactly one exists per logical call; it is discarded once
//! response synthesis completes.

use url::form_urlencoded;

use crate::transport::HeaderValue;

/// One outbound call: destination, request line, headers, and accumulated
/// body. Multi-valued query parameters and headers preserve both order and
/// every value.
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    host: String,
    port: u16,
    method: String,
    path: String,
    query: Vec<(String, Vec<String>)>,
    headers: Vec<(String, Vec<HeaderValue>)>,
    body: Option<Vec<u8>>,
    finalized: bool,
}

impl CapturedRequest {
    /// Starts a capture. `url` is the path with an optional query string,
    /// exactly as handed to the transport.
    pub(crate) fn begin(host: &str, port: u16, method: &str, url: &str) -> Self {
        let mut request = CapturedRequest {
            host: host.to_string(),
            port,
            method: method.to_string(),
            path: url.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            finalized: false,
        };

        if let Some((_, query)) = url.split_once('?') {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                request.push_query(&key, &value);
            }
        }

        request
    }

    fn push_query(&mut self, key: &str, value: &str) {
        match self.query.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value.to_string()),
            None => self.query.push((key.to_string(), vec![value.to_string()])),
        }
    }

    /// Appends header values. Repeated names accumulate rather than replace.
    pub(crate) fn add_header(&mut self, name: &str, values: &[HeaderValue]) {
        debug_assert!(!self.finalized);
        match self.headers.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => existing.extend_from_slice(values),
            None => self.headers.push((name.to_string(), values.to_vec())),
        }
    }

    /// Appends a body chunk. The transport may write the body in several
    /// chunks; they accumulate.
    pub(crate) fn add_body(&mut self, chunk: &[u8]) {
        debug_assert!(!self.finalized);
        self.body.get_or_insert_with(Vec::new).extend_from_slice(chunk);
    }

    /// Freezes the request. Resolution begins at this point.
    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path with the original query string, as handed to the transport.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All values for the given query parameter, in arrival order.
    pub fn query(&self, name: &str) -> Option<&[String]> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_slice())
    }

    /// First value for the given query parameter.
    pub fn query_first(&self, name: &str) -> Option<&str> {
        self.query(name).and_then(|values| values.first()).map(String::as_str)
    }

    /// Captured headers in arrival order.
    pub fn headers(&self) -> &[(String, Vec<HeaderValue>)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}
