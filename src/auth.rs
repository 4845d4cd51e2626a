//! Credential exchange with the mock decision source, and the HTTP client
//! used to forward calls to it.
//!
//! A refresh token (given explicitly or found through the persistence layer)
//! is exchanged for an access token at activation. No refresh token means
//! unauthenticated access through the public path prefix, which is not an
//! error.

use std::time::Duration;

use log::{debug, info};
use serde_json::{json, Value};

use crate::errors::Error;
use crate::persistence::Persistence;
use crate::resolver::{DecisionCall, DecisionClient, DecisionReply};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP client for the decision source.
pub(crate) struct HttpDecisionClient {
    http: reqwest::blocking::Client,
    base: String,
}

impl HttpDecisionClient {
    pub fn new(host: &str, port: u16) -> Result<Self, Error> {
        let http = reqwest::blocking::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(HttpDecisionClient {
            http,
            base: format!("https://{host}:{port}"),
        })
    }
}

impl DecisionClient for HttpDecisionClient {
    fn fetch(&self, call: &DecisionCall) -> Result<DecisionReply, Error> {
        let method = reqwest::Method::from_bytes(call.method.as_bytes()).map_err(|_| Error::Simple(format!("invalid method {}", call.method)))?;
        let url = format!("{}{}", self.base, call.path);
        debug!("-> {} {url}", call.method);

        let mut request = self.http.request(method, &url);
        for (name, value) in &call.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .map_err(|err| Error::ServiceUnavailable(err.to_string()))?;

        let status = response.status();
        let mut headers: Vec<(String, Vec<String>)> = Vec::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            match headers.iter_mut().find(|(n, _)| n == name.as_str()) {
                Some((_, values)) => values.push(value),
                None => headers.push((name.as_str().to_string(), vec![value])),
            }
        }
        let body = response.bytes()?.to_vec();
        debug!("<- {} ({} bytes)", status, body.len());

        Ok(DecisionReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }

    fn exchange_token(&self, refresh_token: &str) -> Result<String, Error> {
        let response = self
            .http
            .post(format!("{}/token", self.base))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .map_err(|err| Error::ServiceUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Authorization(format!(
                "Internal authorization error, received '{}'",
                response.status()
            )));
        }

        let body: Value = response.json()?;
        match body.get("accessToken").and_then(Value::as_str) {
            Some(token) => Ok(token.to_string()),
            None => Err(Error::Authorization("Incorrect server response: did not get accessToken".to_string())),
        }
    }

    fn validate_token(&self, access_token: &str) -> Result<(), Error> {
        let response = self
            .http
            .get(format!("{}/ping", self.base))
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .map_err(|err| Error::ServiceUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Authorization("Internal authorization error".to_string()));
        }
        Ok(())
    }
}

/// Obtains a validated access token, or `None` for unauthenticated mode.
///
/// The refresh token comes from the persistence layer (explicit token or the
/// credentials file); the resulting access token is validated and cached
/// through the same layer.
pub(crate) fn obtain_token(client: &dyn DecisionClient, persistence: &dyn Persistence) -> Result<Option<String>, Error> {
    let Some(refresh_token) = persistence.load_token() else {
        debug!("no refresh token, running unauthenticated");
        return Ok(None);
    };

    let access_token = client.exchange_token(&refresh_token)?;
    client.validate_token(&access_token)?;
    persistence.save_auth(&access_token)?;
    info!("obtained access token from decision service");

    Ok(Some(access_token))
}
