//! Stub implementations of the transport and decision-service seams, for
//! tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::errors::Error;
use crate::persistence::Persistence;
use crate::resolver::{DecisionCall, DecisionClient, DecisionReply, STORY_HASH_HEADER};
use crate::response::{Headers, HttpResponse};
use crate::transport::{Call, HeaderValue, HookTarget, Transport};

/// One call observed by a [`TransportStub`], with every phase recorded.
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordedCall {
    pub host: String,
    pub port: u16,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
    pub finalized: bool,
}

/// Transport that records every phase of every call and answers each
/// response-fetch with a canned 200.
pub(crate) struct TransportStub {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    unsupported: Vec<HookTarget>,
}

impl TransportStub {
    pub fn new() -> Self {
        TransportStub {
            calls: Arc::new(Mutex::new(Vec::new())),
            unsupported: Vec::new(),
        }
    }

    /// Declares a lifecycle entry point as missing, for activation tests.
    pub fn without_target(mut self, target: HookTarget) -> Self {
        self.unsupported.push(target);
        self
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for TransportStub {
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Call>, Error> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(RecordedCall {
            host: host.to_string(),
            port,
            ..RecordedCall::default()
        });
        let index = calls.len() - 1;

        Ok(Box::new(StubCall {
            calls: Arc::clone(&self.calls),
            index,
        }))
    }

    fn supports(&self, target: HookTarget) -> bool {
        !self.unsupported.contains(&target)
    }
}

struct StubCall {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    index: usize,
}

impl StubCall {
    fn with_record<R>(&self, f: impl FnOnce(&mut RecordedCall) -> R) -> R {
        let mut calls = self.calls.lock().unwrap();
        f(&mut calls[self.index])
    }
}

impl Call for StubCall {
    fn begin(&mut self, method: &str, url: &str) -> Result<(), Error> {
        self.with_record(|record| {
            record.method = method.to_string();
            record.url = url.to_string();
        });
        Ok(())
    }

    fn add_header(&mut self, name: &str, values: &[HeaderValue]) -> Result<(), Error> {
        self.with_record(|record| {
            let values: Vec<String> = values.iter().map(HeaderValue::as_text).collect();
            record.headers.push((name.to_string(), values));
        });
        Ok(())
    }

    fn add_body(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.with_record(|record| record.body.extend_from_slice(chunk));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Error> {
        self.with_record(|record| record.finalized = true);
        Ok(())
    }

    fn response(&mut self) -> Result<HttpResponse, Error> {
        Ok(HttpResponse::from_parts(200, "OK", Headers::default(), b"ok".to_vec()))
    }
}

/// How a [`DecisionClientStub`] answers token exchanges.
#[derive(Clone, Debug)]
pub(crate) enum TokenBehavior {
    Grant(String),
    Reject,
    Unreachable,
}

/// Decision client that records forwarded calls and answers with a canned
/// reply, optionally carrying a story hash.
pub(crate) struct DecisionClientStub {
    calls: Mutex<Vec<DecisionCall>>,
    hash: Option<String>,
    body: Vec<u8>,
    token: TokenBehavior,
}

impl DecisionClientStub {
    pub fn new() -> Self {
        DecisionClientStub {
            calls: Mutex::new(Vec::new()),
            hash: None,
            body: b"{}".to_vec(),
            token: TokenBehavior::Grant("stub-access".to_string()),
        }
    }

    pub fn with_hash(hash: &str) -> Self {
        let mut stub = Self::new();
        stub.hash = Some(hash.to_string());
        stub
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn token_behavior(mut self, behavior: TokenBehavior) -> Self {
        self.token = behavior;
        self
    }

    pub fn calls(&self) -> Vec<DecisionCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl DecisionClient for DecisionClientStub {
    fn fetch(&self, call: &DecisionCall) -> Result<DecisionReply, Error> {
        self.calls.lock().unwrap().push(call.clone());

        let mut headers = vec![("Content-Type".to_string(), vec!["application/json".to_string()])];
        if let Some(hash) = &self.hash {
            headers.push((STORY_HASH_HEADER.to_string(), vec![hash.clone()]));
        }

        Ok(DecisionReply {
            status: 200,
            reason: "OK".to_string(),
            headers,
            body: self.body.clone(),
        })
    }

    fn exchange_token(&self, _refresh_token: &str) -> Result<String, Error> {
        match &self.token {
            TokenBehavior::Grant(token) => Ok(token.clone()),
            TokenBehavior::Reject => Err(Error::Authorization("Internal authorization error, received '403 Forbidden'".to_string())),
            TokenBehavior::Unreachable => Err(Error::ServiceUnavailable("connection refused".to_string())),
        }
    }

    fn validate_token(&self, _access_token: &str) -> Result<(), Error> {
        match &self.token {
            TokenBehavior::Unreachable => Err(Error::ServiceUnavailable("connection refused".to_string())),
            _ => Ok(()),
        }
    }
}

/// In-memory persistence with the same chunk-buffering behavior as the
/// file-system layer, plus call counting for assertions.
pub(crate) struct MemoryPersistence {
    refresh_token: Option<String>,
    headers: Mutex<HashMap<String, Value>>,
    bodies: Mutex<HashMap<String, Value>>,
    metadata: Mutex<HashMap<String, Value>>,
    partials: Mutex<HashMap<String, String>>,
    auth: Mutex<Option<String>>,
    header_saves: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new(refresh_token: Option<String>) -> Self {
        MemoryPersistence {
            refresh_token,
            headers: Mutex::new(HashMap::new()),
            bodies: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
            partials: Mutex::new(HashMap::new()),
            auth: Mutex::new(None),
            header_saves: AtomicUsize::new(0),
        }
    }

    pub fn save_headers_count(&self) -> usize {
        self.header_saves.load(Ordering::SeqCst)
    }

    pub fn load_metadata(&self, hash: &str) -> Option<Value> {
        self.metadata.lock().unwrap().get(hash).cloned()
    }
}

impl Persistence for MemoryPersistence {
    fn save_headers(&self, hash: &str, headers: &Value) -> Result<(), Error> {
        self.header_saves.fetch_add(1, Ordering::SeqCst);
        self.headers.lock().unwrap().insert(hash.to_string(), headers.clone());
        Ok(())
    }

    fn save_body(&self, hash: &str, chunk: &str) -> Result<(), Error> {
        let mut partials = self.partials.lock().unwrap();
        let buffer = partials.entry(hash.to_string()).or_default();
        buffer.push_str(chunk);

        if let Ok(body) = serde_json::from_str::<Value>(buffer) {
            partials.remove(hash);
            self.bodies.lock().unwrap().insert(hash.to_string(), body);
        }
        Ok(())
    }

    fn save_metadata(&self, hash: &str, metadata: &Value) -> Result<(), Error> {
        self.metadata.lock().unwrap().insert(hash.to_string(), metadata.clone());
        Ok(())
    }

    fn load_headers(&self, hash: &str) -> Option<Value> {
        self.headers.lock().unwrap().get(hash).cloned()
    }

    fn load_body(&self, hash: &str) -> Option<Value> {
        self.bodies.lock().unwrap().get(hash).cloned()
    }

    fn save_auth(&self, token: &str) -> Result<(), Error> {
        *self.auth.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn load_auth(&self) -> Option<String> {
        self.auth.lock().unwrap().clone()
    }

    fn load_token(&self) -> Option<String> {
        self.refresh_token.clone()
    }
}
