//! Session configuration.
//!
//! Defaults mirror production use: decision service at `api.unmock.io:443`,
//! loopback whitelist, and a User-Agent ignore rule so client fingerprints do
//! not affect determinism.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::persistence::Persistence;
use crate::resolver::ReplyFn;

pub const DEFAULT_DECISION_HOST: &str = "api.unmock.io";
pub const DEFAULT_DECISION_PORT: u16 = 443;

/// Which resolved interactions get persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SaveMode {
    #[default]
    Off,
    All,
    /// Only the listed story hashes.
    Selected(Vec<String>),
}

impl SaveMode {
    pub(crate) fn covers(&self, hash: &str) -> bool {
        match self {
            SaveMode::Off => false,
            SaveMode::All => true,
            SaveMode::Selected(hashes) => hashes.iter().any(|h| h == hash),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        !matches!(self, SaveMode::Off)
    }
}

/// Options for one interception session. Construct with [`Options::new`] and
/// chain the builder methods; unset fields keep their defaults.
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) save: SaveMode,
    pub(crate) decision_host: Option<String>,
    pub(crate) decision_port: Option<u16>,
    pub(crate) ignore: Option<Value>,
    pub(crate) signature: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) whitelist: Option<Vec<String>>,
    pub(crate) stories: Vec<String>,
    pub(crate) storage_path: Option<PathBuf>,
    pub(crate) persistence: Option<Arc<dyn Persistence>>,
    pub(crate) reply_fn: Option<Arc<ReplyFn>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist every resolved interaction.
    pub fn save_all(mut self) -> Self {
        self.save = SaveMode::All;
        self
    }

    /// Persist only the listed story hashes.
    pub fn save_only<I>(mut self, hashes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.save = SaveMode::Selected(hashes.into_iter().map(Into::into).collect());
        self
    }

    /// Address of the mock decision service.
    pub fn decision_service(mut self, host: impl Into<String>, port: u16) -> Self {
        self.decision_host = Some(host.into());
        self.decision_port = Some(port);
        self
    }

    /// Ignore rules the decision source should disregard for determinism.
    /// Any JSON-serializable structure.
    pub fn ignore(mut self, rules: Value) -> Self {
        self.ignore = Some(rules);
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Refresh token for signed access. Overrides the credentials file.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Replaces the default whitelist. A single pattern or a list both work.
    pub fn whitelist<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.whitelist = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Seeds the session's story state with prior hashes.
    pub fn stories<I>(mut self, hashes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.stories = hashes.into_iter().map(Into::into).collect();
        self
    }

    /// Root directory for file-system persistence. Defaults to the home
    /// directory.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Replaces the persistence collaborator entirely.
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Local-mode reply function. When set, calls are resolved locally and
    /// the decision service is never contacted.
    pub fn reply_fn<F>(mut self, reply_fn: F) -> Self
    where
        F: Fn(&crate::request::CapturedRequest) -> Result<crate::response::Reply, crate::errors::Error> + Send + Sync + 'static,
    {
        self.reply_fn = Some(Arc::new(reply_fn));
        self
    }

    pub(crate) fn decision_host(&self) -> &str {
        self.decision_host.as_deref().unwrap_or(DEFAULT_DECISION_HOST)
    }

    pub(crate) fn decision_port(&self) -> u16 {
        self.decision_port.unwrap_or(DEFAULT_DECISION_PORT)
    }

    pub(crate) fn ignore_rules(&self) -> Option<Value> {
        self.ignore.clone().or_else(|| Some(default_ignore()))
    }
}

/// Default ignore rule: client User-Agent headers do not affect determinism.
pub fn default_ignore() -> Value {
    json!({ "headers": "\\w*User-Agent\\w*" })
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("save", &self.save)
            .field("decision_host", &self.decision_host())
            .field("decision_port", &self.decision_port())
            .field("signature", &self.signature)
            .field("whitelist", &self.whitelist)
            .field("stories", &self.stories)
            .field("mode", if self.reply_fn.is_some() { &"local" } else { &"remote" })
            .finish_non_exhaustive()
    }
}
