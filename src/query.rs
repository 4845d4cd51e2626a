//! Encoding of captured request context into the query string sent to the
//! mock decision source.
//!
//! The decision source maps identical (path, hostname, method,
//! headers-modulo-ignore-rules, story, signature) tuples to identical story
//! hashes, so the encoding must be stable: fixed key order, sorted JSON
//! object keys, and optional keys omitted rather than sent empty.

use serde_json::Value;
use url::form_urlencoded;

use crate::errors::Error;
use crate::request::CapturedRequest;

/// Serializes request metadata, story state, ignore rules, and an optional
/// signature into a decision-source query string. Byte-identical output for
/// identical input.
pub(crate) fn encode(request: &CapturedRequest, story: &[String], ignore: Option<&Value>, signature: Option<&str>) -> Result<String, Error> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    serializer.append_pair("story", &serde_json::to_string(story)?);
    serializer.append_pair("path", request.path());
    serializer.append_pair("hostname", request.host());
    serializer.append_pair("method", request.method());
    serializer.append_pair("headers", &headers_json(request)?);

    if let Some(ignore) = ignore {
        serializer.append_pair("ignore", &serde_json::to_string(ignore)?);
    }
    if let Some(signature) = signature {
        serializer.append_pair("signature", signature);
    }

    Ok(serializer.finish())
}

// Captured headers as a JSON object. serde_json maps sort keys, which gives
// the stable ordering the determinism contract needs. Single values are
// encoded as strings, repeated values as arrays.
fn headers_json(request: &CapturedRequest) -> Result<String, Error> {
    let mut object = serde_json::Map::new();
    for (name, values) in request.headers() {
        let value = match values.len() {
            1 => Value::String(values[0].as_text()),
            _ => Value::Array(values.iter().map(|v| Value::String(v.as_text())).collect()),
        };
        object.insert(name.clone(), value);
    }
    Ok(serde_json::to_string(&Value::Object(object))?)
}
