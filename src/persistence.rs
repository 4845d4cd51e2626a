//! Persistence collaborator: saved mock artifacts keyed by story hash, plus
//! credential continuity. The engine never touches storage directly; all
//! access goes through the [`Persistence`] trait.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use serde_json::Value;

use crate::errors::Error;

/// Storage interface consumed by the engine. Bodies may arrive in chunks;
/// implementations buffer partial content until it parses as complete JSON.
pub trait Persistence: Send + Sync {
    fn save_headers(&self, hash: &str, headers: &Value) -> Result<(), Error>;
    fn save_body(&self, hash: &str, chunk: &str) -> Result<(), Error>;
    fn save_metadata(&self, hash: &str, metadata: &Value) -> Result<(), Error>;
    fn load_headers(&self, hash: &str) -> Option<Value>;
    fn load_body(&self, hash: &str) -> Option<Value>;

    /// Stores the access token obtained from a token exchange.
    fn save_auth(&self, token: &str) -> Result<(), Error>;
    /// Previously stored access token, if any.
    fn load_auth(&self) -> Option<String>;
    /// Refresh token for credential continuity, if one is available.
    fn load_token(&self) -> Option<String>;
}

const HEADERS_FILE: &str = "response-header.json";
const BODY_FILE: &str = "response.json";
const METADATA_FILE: &str = "metadata.json";

/// File-system persistence rooted at `<base>/.unmock`:
/// `.token` holds the cached access token, `credentials` is an INI file with
/// a `[unmock]` section carrying the refresh token, and saved mocks live
/// under `save/<hash>/`.
pub struct FsPersistence {
    root: PathBuf,
    refresh_token: Option<String>,
    // Story hash -> accumulated body text that does not yet parse as JSON.
    partial_bodies: Mutex<HashMap<String, String>>,
}

impl FsPersistence {
    /// Creates the layer under `base` (the user's home directory when
    /// `None`), creating directories as needed.
    pub fn new(refresh_token: Option<String>, base: Option<&Path>) -> Result<Self, Error> {
        let base = match base {
            Some(base) => base.to_path_buf(),
            None => std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        };
        let root = base.join(".unmock");
        fs::create_dir_all(&root)?;

        Ok(FsPersistence {
            root,
            refresh_token,
            partial_bodies: Mutex::new(HashMap::new()),
        })
    }

    fn token_path(&self) -> PathBuf {
        self.root.join(".token")
    }

    fn credentials_path(&self) -> PathBuf {
        self.root.join("credentials")
    }

    fn hash_dir(&self, hash: &str) -> Result<PathBuf, Error> {
        let dir = self.root.join("save").join(hash);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn write_hashed(&self, hash: &str, file: &str, content: &Value) -> Result<(), Error> {
        let path = self.hash_dir(hash)?.join(file);
        fs::write(&path, serde_json::to_string_pretty(content)?)?;
        debug!("saved {} for story {hash}", file);
        Ok(())
    }

    fn load_hashed(&self, hash: &str, file: &str) -> Option<Value> {
        let path = self.root.join("save").join(hash).join(file);
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Persistence for FsPersistence {
    fn save_headers(&self, hash: &str, headers: &Value) -> Result<(), Error> {
        self.write_hashed(hash, HEADERS_FILE, headers)
    }

    fn save_body(&self, hash: &str, chunk: &str) -> Result<(), Error> {
        // Bodies arrive in transport-sized chunks. Accumulate until the
        // buffer parses as complete JSON, then write it out; an unparseable
        // partial buffer is an expected intermediate state, not an error.
        let mut partials = self.partial_bodies.lock()?;
        let buffer = partials.entry(hash.to_string()).or_default();
        buffer.push_str(chunk);

        match serde_json::from_str::<Value>(buffer) {
            Ok(body) => {
                partials.remove(hash);
                drop(partials);
                self.write_hashed(hash, BODY_FILE, &body)
            }
            Err(_) => {
                debug!("buffering partial body for story {hash}");
                Ok(())
            }
        }
    }

    fn save_metadata(&self, hash: &str, metadata: &Value) -> Result<(), Error> {
        self.write_hashed(hash, METADATA_FILE, metadata)
    }

    fn load_headers(&self, hash: &str) -> Option<Value> {
        self.load_hashed(hash, HEADERS_FILE)
    }

    fn load_body(&self, hash: &str) -> Option<Value> {
        self.load_hashed(hash, BODY_FILE)
    }

    fn save_auth(&self, token: &str) -> Result<(), Error> {
        fs::write(self.token_path(), token)?;
        Ok(())
    }

    fn load_auth(&self) -> Option<String> {
        fs::read_to_string(self.token_path()).ok()
    }

    fn load_token(&self) -> Option<String> {
        if self.refresh_token.is_some() {
            return self.refresh_token.clone();
        }

        let credentials = fs::read_to_string(self.credentials_path()).ok()?;
        parse_credentials(&credentials)
    }
}

// Minimal INI scan of the credentials file: the `token` key inside the
// `[unmock]` section.
fn parse_credentials(content: &str) -> Option<String> {
    let mut in_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_section = line == "[unmock]";
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "token" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}
