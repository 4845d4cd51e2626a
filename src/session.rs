//! Interception lifecycle management.
//!
//! A [`Session`] is created by activating interception on a
//! [`TransportSlot`]: the transport currently held by the slot is recorded
//! and replaced with an [`InterceptingTransport`] that redirects outbound
//! calls into the engine. Deactivation restores the recorded transport and
//! clears story state. Activation is idempotent per hook target and
//! deactivation is always safe, even mid-capture or when nothing is active.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::auth::{obtain_token, HttpDecisionClient};
use crate::errors::Error;
use crate::options::{Options, SaveMode};
use crate::persistence::{FsPersistence, Persistence};
use crate::request::CapturedRequest;
use crate::resolver::{resolve_local, DecisionClient, RemoteResolver, ReplyFn};
use crate::response::{Headers, HttpResponse};
use crate::story::StoryState;
use crate::transport::{HookTarget, InterceptingTransport, Transport, TransportSlot};
use crate::whitelist::Whitelist;

/// Tracks installed hook targets with the original transport handle retained
/// for restoration. A target is never installed twice.
#[derive(Default)]
struct Registry {
    installed: HashMap<HookTarget, Arc<dyn Transport>>,
}

impl Registry {
    fn is_installed(&self, target: HookTarget) -> bool {
        self.installed.contains_key(&target)
    }

    fn install(&mut self, target: HookTarget, original: Arc<dyn Transport>) {
        debug!("installing intercept for {target:?}");
        self.installed.entry(target).or_insert(original);
    }

    // Removes every entry, yielding the retained original handle.
    fn uninstall_all(&mut self) -> Option<Arc<dyn Transport>> {
        let original = self.installed.values().next().map(Arc::clone);
        self.installed.clear();
        original
    }

    fn original(&self) -> Option<Arc<dyn Transport>> {
        self.installed.values().next().map(Arc::clone)
    }

    fn len(&self) -> usize {
        self.installed.len()
    }
}

// Resolution mode, selected by configuration: a reply function means local.
enum Mode {
    Local(Arc<ReplyFn>),
    Remote(RemoteResolver),
}

/// Shared internals of an activation session: whitelist gate, story state,
/// resolver, and the persistence collaborator. The interceptor holds an
/// `Arc<Engine>` and calls into it at each lifecycle phase.
pub(crate) struct Engine {
    whitelist: Whitelist,
    mode: Mode,
    story: Mutex<StoryState>,
    persistence: Option<Arc<dyn Persistence>>,
    save: SaveMode,
}

impl Engine {
    pub(crate) fn is_whitelisted(&self, host: &str) -> bool {
        self.whitelist.is_whitelisted(host)
    }

    /// Resolves a finalized request into a response, updating story state
    /// and persisting artifacts for newly observed hashes.
    pub(crate) fn resolve(&self, request: &CapturedRequest) -> Result<HttpResponse, Error> {
        match &self.mode {
            Mode::Local(reply_fn) => {
                let reply = resolve_local(reply_fn.as_ref(), request)?;
                HttpResponse::from_reply(&reply)
            }
            Mode::Remote(resolver) => {
                let snapshot = self.story.lock()?.snapshot();
                let (upstream, hash) = resolver.resolve(request, &snapshot)?;

                let headers = Headers::from_entries(upstream.headers.clone());
                let mut response = HttpResponse::from_parts(upstream.status, &upstream.reason, headers, upstream.body);

                if let Some(hash) = hash {
                    self.record_story(request, &upstream.headers, &hash)?;
                    if self.save.covers(&hash) {
                        if let Some(persistence) = &self.persistence {
                            response.tee_body(Arc::clone(persistence), &hash);
                        }
                    }
                }

                Ok(response)
            }
        }
    }

    // Appends a newly observed hash and persists headers/metadata on first
    // occurrence only.
    fn record_story(&self, request: &CapturedRequest, upstream_headers: &[(String, Vec<String>)], hash: &str) -> Result<(), Error> {
        let newly_observed = self.story.lock()?.append(hash);
        if !newly_observed {
            return Ok(());
        }

        info!("new story {hash} for {} {}{}", request.method(), request.host(), request.path());

        if self.save.covers(hash) {
            if let Some(persistence) = &self.persistence {
                persistence.save_headers(hash, &headers_value(upstream_headers))?;
                persistence.save_metadata(hash, &metadata_value(request)?)?;
            }
        }
        Ok(())
    }

    fn clear_story(&self) {
        let mut story = self.story.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        story.clear();
    }

    fn story_snapshot(&self) -> Vec<String> {
        let story = self.story.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        story.snapshot()
    }
}

fn headers_value(headers: &[(String, Vec<String>)]) -> Value {
    let mut object = serde_json::Map::new();
    for (name, values) in headers {
        let value = match values.len() {
            1 => Value::String(values[0].clone()),
            _ => Value::Array(values.iter().cloned().map(Value::String).collect()),
        };
        object.insert(name.clone(), value);
    }
    Value::Object(object)
}

// Lightweight record of the call that produced a saved mock.
#[derive(Serialize)]
struct StoryMetadata<'a> {
    host: &'a str,
    method: &'a str,
    path: &'a str,
    saved_at: Option<String>,
}

fn metadata_value(request: &CapturedRequest) -> Result<Value, Error> {
    let metadata = StoryMetadata {
        host: request.host(),
        method: request.method(),
        path: request.path(),
        saved_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
    };
    Ok(serde_json::to_value(metadata)?)
}

/// One activation of interception on a transport slot.
///
/// Dropping the session deactivates it, so a test can rely on scoped
/// cleanup; calling [`Session::deactivate`] explicitly is equivalent.
pub struct Session {
    slot: TransportSlot,
    engine: Arc<Engine>,
    registry: Mutex<Registry>,
    save_bodies: bool,
}

impl Session {
    /// Activates interception on the slot. The currently held transport is
    /// recorded for restoration and replaced with an interceptor.
    ///
    /// Fails with [`Error::Activation`] when the transport does not expose a
    /// required entry point, without partially activating. In remote mode a
    /// refresh token (when available) is exchanged for an access token
    /// before any call is intercepted.
    pub fn activate(slot: &TransportSlot, options: Options) -> Result<Session, Error> {
        let client: Arc<dyn DecisionClient> = Arc::new(HttpDecisionClient::new(options.decision_host(), options.decision_port())?);
        Self::activate_with_client(slot, options, client)
    }

    pub(crate) fn activate_with_client(slot: &TransportSlot, options: Options, client: Arc<dyn DecisionClient>) -> Result<Session, Error> {
        let mut whitelist = match &options.whitelist {
            Some(patterns) => Whitelist::new(patterns.iter().cloned()),
            None => Whitelist::default(),
        };
        // The engine's own calls to the decision service must never be
        // recursively intercepted.
        whitelist.add(options.decision_host());

        let local = options.reply_fn.is_some();
        let persistence: Option<Arc<dyn Persistence>> = match (&options.persistence, local) {
            (Some(persistence), _) => Some(Arc::clone(persistence)),
            (None, true) => None,
            (None, false) => Some(Arc::new(FsPersistence::new(
                options.refresh_token.clone(),
                options.storage_path.as_deref(),
            )?)),
        };

        let mode = match &options.reply_fn {
            Some(reply_fn) => Mode::Local(Arc::clone(reply_fn)),
            None => {
                let access_token = match &persistence {
                    Some(persistence) => obtain_token(client.as_ref(), persistence.as_ref())?,
                    None => None,
                };
                Mode::Remote(RemoteResolver::new(client, access_token, options.ignore_rules(), options.signature.clone()))
            }
        };

        let engine = Arc::new(Engine {
            whitelist,
            mode,
            story: Mutex::new(StoryState::seeded(options.stories.clone())),
            persistence,
            save: options.save.clone(),
        });

        let session = Session {
            slot: slot.clone(),
            engine,
            registry: Mutex::new(Registry::default()),
            save_bodies: options.save.is_enabled(),
        };
        session.install()?;

        Ok(session)
    }

    // Hook targets this session needs installed.
    fn targets(&self) -> Vec<HookTarget> {
        let mut targets = HookTarget::REQUIRED.to_vec();
        if self.save_bodies {
            targets.push(HookTarget::ResponseBodyRead);
        }
        targets
    }

    fn install(&self) -> Result<(), Error> {
        let mut registry = self.registry.lock()?;

        let original = match registry.original() {
            Some(original) => original,
            None => self.slot.current()?,
        };

        // Verify every entry point before touching the slot, so a missing
        // one leaves interception fully inactive.
        for target in self.targets() {
            if !registry.is_installed(target) && !original.supports(target) {
                return Err(Error::Activation(format!("transport entry point {target:?} not found")));
            }
        }

        if registry.len() == 0 {
            let interceptor = Arc::new(InterceptingTransport::new(Arc::clone(&original), Arc::clone(&self.engine)));
            self.slot.swap(interceptor)?;
            info!("interception activated");
        }

        for target in self.targets() {
            registry.install(target, Arc::clone(&original));
        }

        Ok(())
    }

    /// Re-runs installation. A no-op for every target already installed.
    pub fn reactivate(&self) -> Result<(), Error> {
        self.install()
    }

    /// Removes all installed redirections, restores the original transport,
    /// and clears story state. Safe to call when nothing is active.
    pub fn deactivate(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(original) = registry.uninstall_all() {
            if let Err(err) = self.slot.swap(original) {
                warn!("failed to restore transport: {err}");
            }
            info!("interception deactivated");
        }

        self.engine.clear_story();
    }

    /// Whether this session currently has intercepts installed.
    pub fn is_mocking(&self) -> bool {
        let registry = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.len() > 0
    }

    /// Number of installed hook targets.
    pub fn installed_intercepts(&self) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.len()
    }

    /// Story hashes accumulated so far, in observation order.
    pub fn story(&self) -> Vec<String> {
        self.engine.story_snapshot()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;
    use crate::response::Reply;
    use crate::stubs::{DecisionClientStub, MemoryPersistence, TransportStub};
    use pretty_assertions::assert_eq;

    fn local_options() -> Options {
        Options::new().reply_fn(|request| {
            if request.host() == "www.example.com" {
                let name = request.query_first("name").unwrap_or("World");
                Ok(Reply::new().text(format!("Hello {name}!")).status(200))
            } else {
                Ok(Reply::new().status(400))
            }
        })
    }

    #[test]
    fn activation_and_deactivation_are_symmetric() {
        let original: Arc<dyn Transport> = Arc::new(TransportStub::new());
        let slot = TransportSlot::new(Arc::clone(&original));

        let session = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new())).unwrap();
        assert!(session.is_mocking());
        assert_eq!(session.installed_intercepts(), HookTarget::REQUIRED.len());

        session.deactivate();
        assert!(!session.is_mocking());
        assert_eq!(session.installed_intercepts(), 0);

        // The very transport that was displaced is back in the slot.
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &original));
    }

    #[test]
    fn reactivation_is_a_noop_per_installed_target() {
        let slot = TransportSlot::new(Arc::new(TransportStub::new()));
        let session = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new())).unwrap();

        let interceptor = slot.current().unwrap();
        session.reactivate().unwrap();

        assert_eq!(session.installed_intercepts(), HookTarget::REQUIRED.len());
        // Reactivation must not wrap the interceptor in another interceptor.
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &interceptor));
    }

    #[test]
    fn deactivate_when_inactive_is_a_noop() {
        let slot = TransportSlot::new(Arc::new(TransportStub::new()));
        let session = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new())).unwrap();

        session.deactivate();
        session.deactivate();

        assert_eq!(session.installed_intercepts(), 0);
    }

    #[test]
    fn missing_entry_point_fails_without_partial_activation() {
        let original: Arc<dyn Transport> = Arc::new(TransportStub::new().without_target(HookTarget::ResponseFetch));
        let slot = TransportSlot::new(Arc::clone(&original));

        let result = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new()));

        assert!(matches!(result, Err(Error::Activation(_))));
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &original));
    }

    #[test]
    fn save_mode_requires_body_read_entry_point() {
        let original: Arc<dyn Transport> = Arc::new(TransportStub::new().without_target(HookTarget::ResponseBodyRead));
        let slot = TransportSlot::new(Arc::clone(&original));

        // Without save the body-read hook is not required.
        let session = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new()));
        assert!(session.is_ok());
        drop(session);

        let options = local_options().save_all();
        let result = Session::activate_with_client(&slot, options, Arc::new(DecisionClientStub::new()));
        assert!(matches!(result, Err(Error::Activation(_))));
    }

    #[test]
    fn deactivation_clears_story_state() {
        let slot = TransportSlot::new(Arc::new(TransportStub::new()));
        let options = local_options().stories(["seed-1", "seed-2"]);
        let session = Session::activate_with_client(&slot, options, Arc::new(DecisionClientStub::new())).unwrap();

        assert_eq!(session.story(), vec!["seed-1".to_string(), "seed-2".to_string()]);

        session.deactivate();
        assert!(session.story().is_empty());
    }

    #[test]
    fn dropping_session_restores_transport() {
        let original: Arc<dyn Transport> = Arc::new(TransportStub::new());
        let slot = TransportSlot::new(Arc::clone(&original));

        {
            let _session = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new())).unwrap();
            assert!(!Arc::ptr_eq(&slot.current().unwrap(), &original));
        }

        assert!(Arc::ptr_eq(&slot.current().unwrap(), &original));
    }

    #[test]
    fn repeated_hash_is_tracked_once_and_saved_once() {
        let slot = TransportSlot::new(Arc::new(TransportStub::new()));
        let client = Arc::new(DecisionClientStub::with_hash("story-1"));
        let persistence = Arc::new(MemoryPersistence::new(None));
        let options = Options::new().save_all().persistence(persistence.clone());

        let session = Session::activate_with_client(&slot, options, client).unwrap();
        let http = HttpClient::new(slot.clone());

        for _ in 0..3 {
            let response = http.get("https://www.behance.net/v2/projects?api_key=demo").unwrap();
            assert_eq!(response.status(), 200);
        }

        assert_eq!(session.story(), vec!["story-1".to_string()]);
        assert_eq!(persistence.save_headers_count(), 1);

        let metadata = persistence.load_metadata("story-1").unwrap();
        assert_eq!(metadata["method"], "GET");
        assert_eq!(metadata["host"], "www.behance.net");
        assert_eq!(metadata["path"], "/v2/projects?api_key=demo");
        assert!(metadata["saved_at"].is_string());
    }

    #[test]
    fn pass_through_reply_does_not_touch_story() {
        let slot = TransportSlot::new(Arc::new(TransportStub::new()));
        let client = Arc::new(DecisionClientStub::new());
        let persistence = Arc::new(MemoryPersistence::new(None));
        let options = Options::new().persistence(persistence);

        let session = Session::activate_with_client(&slot, options, client).unwrap();
        let http = HttpClient::new(slot.clone());

        http.get("https://api.example.com/things").unwrap();

        assert!(session.story().is_empty());
    }

    #[test]
    fn saved_body_chunks_reach_persistence() {
        let slot = TransportSlot::new(Arc::new(TransportStub::new()));
        let client = Arc::new(DecisionClientStub::with_hash("story-1").body(b"{\"projects\": [1, 2]}"));
        let persistence = Arc::new(MemoryPersistence::new(None));
        let options = Options::new().save_all().persistence(persistence.clone());

        let _session = Session::activate_with_client(&slot, options, client).unwrap();
        let http = HttpClient::new(slot.clone());

        let mut response = http.get("https://www.behance.net/v2/projects").unwrap();
        // Drain in chunks; the tee reassembles them in the persistence layer.
        while !response.read(Some(7)).is_empty() {}

        let body = persistence.load_body("story-1").unwrap();
        assert_eq!(body["projects"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn whitelisted_host_bypasses_engine_entirely() {
        let original = Arc::new(TransportStub::new());
        let slot = TransportSlot::new(original.clone());
        let session = Session::activate_with_client(&slot, local_options(), Arc::new(DecisionClientStub::new())).unwrap();

        let http = HttpClient::new(slot.clone());
        http.get("http://localhost/health").unwrap();

        // The inner transport saw the call with its parameters intact and
        // story state was never touched.
        let calls = original.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].host, "localhost");
        assert_eq!(calls[0].method, "GET");
        assert_eq!(calls[0].url, "/health");
        assert!(session.story().is_empty());
    }
}
