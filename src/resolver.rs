//! Mock resolution: turns a finalized [`CapturedRequest`] into a reply.
//!
//! Two operating modes. Local mode invokes a user-supplied reply function
//! synchronously and fills defaults. Remote mode forwards the encoded
//! request context to the mock decision source through a [`DecisionClient`]
//! and passes the upstream reply through unmodified, extracting the story
//! hash header when present.

use serde_json::Value;

use crate::errors::Error;
use crate::query;
use crate::request::CapturedRequest;
use crate::response::Reply;

/// Response header carrying the story identifier assigned by the decision
/// source.
pub const STORY_HASH_HEADER: &str = "unmock-hash";

/// User-supplied local reply function. Errors propagate unchanged to the
/// caller of the intercepted call.
pub type ReplyFn = dyn Fn(&CapturedRequest) -> Result<Reply, Error> + Send + Sync;

/// Forwarded call against the mock decision source.
#[derive(Clone, Debug)]
pub(crate) struct DecisionCall {
    pub method: String,
    /// Path with prefix and encoded query, e.g. `/y/?story=...`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// Raw upstream reply from the decision source, passed through unmodified.
#[derive(Clone, Debug, Default)]
pub(crate) struct DecisionReply {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
}

impl DecisionReply {
    /// First value of the story hash header, if the decision source assigned
    /// one to this interaction.
    pub fn story_hash(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(STORY_HASH_HEADER))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Blocking client for the mock decision source. Timeouts are this client's
/// responsibility; the engine does not retry.
pub(crate) trait DecisionClient: Send + Sync {
    /// Sends the forwarded call and returns the upstream reply.
    fn fetch(&self, call: &DecisionCall) -> Result<DecisionReply, Error>;

    /// Exchanges a refresh token for an access token.
    fn exchange_token(&self, refresh_token: &str) -> Result<String, Error>;

    /// Verifies an access token against the decision source.
    fn validate_token(&self, access_token: &str) -> Result<(), Error>;
}

/// Remote-mode resolver: builds the forwarded call from accumulated story
/// state and sends it through the decision client.
pub(crate) struct RemoteResolver {
    client: std::sync::Arc<dyn DecisionClient>,
    access_token: Option<String>,
    ignore: Option<Value>,
    signature: Option<String>,
}

impl RemoteResolver {
    pub fn new(
        client: std::sync::Arc<dyn DecisionClient>,
        access_token: Option<String>,
        ignore: Option<Value>,
        signature: Option<String>,
    ) -> Self {
        RemoteResolver {
            client,
            access_token,
            ignore,
            signature,
        }
    }

    /// Path prefix distinguishing signed access from public access.
    fn prefix(&self) -> &'static str {
        if self.access_token.is_some() {
            "/x/"
        } else {
            "/y/"
        }
    }

    /// Forwards the request and returns the upstream reply together with the
    /// story hash, when the interaction is story-affecting.
    pub fn resolve(&self, request: &CapturedRequest, story: &[String]) -> Result<(DecisionReply, Option<String>), Error> {
        let encoded = query::encode(request, story, self.ignore.as_ref(), self.signature.as_deref())?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for (name, values) in request.headers() {
            for value in values {
                headers.push((name.clone(), value.as_text()));
            }
        }
        // In signed mode the engine's own credential takes the
        // Authorization slot; the caller's value still travels in the
        // encoded query context.
        if let Some(token) = &self.access_token {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        let call = DecisionCall {
            method: request.method().to_string(),
            path: format!("{}?{}", self.prefix(), encoded),
            headers,
            body: request.body().map(<[u8]>::to_vec),
        };

        let reply = self.client.fetch(&call)?;
        let hash = reply.story_hash().map(str::to_string);

        Ok((reply, hash))
    }
}

/// Local-mode resolution: invoke the reply function, propagating its error
/// unchanged. Defaults are filled during synthesis.
pub(crate) fn resolve_local(reply_fn: &ReplyFn, request: &CapturedRequest) -> Result<Reply, Error> {
    reply_fn(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::DecisionClientStub;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn finalized_request() -> CapturedRequest {
        let mut request = CapturedRequest::begin("www.behance.net", 443, "GET", "/v2/projects?api_key=demo");
        request.add_header("Accept", &["application/json".into()]);
        request.add_header("Authorization", &["Bearer caller".into()]);
        request.finalize();
        request
    }

    #[test]
    fn signed_mode_uses_x_prefix_and_bearer_header() {
        let client = Arc::new(DecisionClientStub::with_hash("h1"));
        let resolver = RemoteResolver::new(client.clone(), Some("access".to_string()), None, None);

        let (_, hash) = resolver.resolve(&finalized_request(), &[]).unwrap();

        assert_eq!(hash.as_deref(), Some("h1"));
        let calls = client.calls();
        assert!(calls[0].path.starts_with("/x/?story="));
        assert!(calls[0]
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "Bearer access"));
    }

    #[test]
    fn public_mode_uses_y_prefix_without_bearer() {
        let client = Arc::new(DecisionClientStub::with_hash("h1"));
        let resolver = RemoteResolver::new(client.clone(), None, None, None);

        resolver.resolve(&finalized_request(), &[]).unwrap();

        let calls = client.calls();
        assert!(calls[0].path.starts_with("/y/?story="));
        assert!(!calls[0].headers.iter().any(|(name, value)| name == "Authorization" && value.contains("Bearer access")));
    }

    #[test]
    fn caller_headers_travel_as_headers_and_query_context() {
        let client = Arc::new(DecisionClientStub::with_hash("h1"));
        let resolver = RemoteResolver::new(client.clone(), None, None, None);

        resolver.resolve(&finalized_request(), &[]).unwrap();

        let calls = client.calls();
        assert!(calls[0]
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "Bearer caller"));
        assert!(calls[0].path.contains("Authorization"));
        assert!(calls[0].path.contains("Accept"));
    }

    #[test]
    fn engine_bearer_displaces_caller_authorization_header() {
        let client = Arc::new(DecisionClientStub::with_hash("h1"));
        let resolver = RemoteResolver::new(client.clone(), Some("access".to_string()), None, None);

        resolver.resolve(&finalized_request(), &[]).unwrap();

        let calls = client.calls();
        let auth: Vec<&str> = calls[0]
            .headers
            .iter()
            .filter(|(name, _)| name == "Authorization")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(auth, vec!["Bearer access"]);
        // The caller's credential still reaches the query context.
        assert!(calls[0].path.contains("caller"));
    }

    #[test]
    fn missing_hash_header_yields_no_hash() {
        let client = Arc::new(DecisionClientStub::new());
        let resolver = RemoteResolver::new(client, None, None, None);

        let (_, hash) = resolver.resolve(&finalized_request(), &[]).unwrap();

        assert_eq!(hash, None);
    }

    #[test]
    fn story_hash_header_lookup_is_case_insensitive() {
        let reply = DecisionReply {
            status: 200,
            reason: "OK".to_string(),
            headers: vec![("Unmock-Hash".to_string(), vec!["abc".to_string()])],
            body: Vec::new(),
        };

        assert_eq!(reply.story_hash(), Some("abc"));
    }

    #[test]
    fn local_reply_error_propagates_unchanged() {
        let reply_fn = |_: &CapturedRequest| -> Result<Reply, Error> { Err(Error::Callback("boom".to_string())) };
        let request = finalized_request();

        let result = resolve_local(&reply_fn, &request);

        assert!(matches!(result, Err(Error::Callback(message)) if message == "boom"));
    }
}
