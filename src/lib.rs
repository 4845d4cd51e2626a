//! An HTTP interception and stateful mocking engine for tests. Outbound
//! calls made through a [`TransportSlot`](crate::transport::TransportSlot)
//! are intercepted while a [`Session`] is active and answered from a local
//! reply function or a remote decision service, so test suites can run
//! against third-party APIs without touching the network.
//!
//! Activation swaps an intercepting decorator into the slot; deactivation
//! restores the original transport and clears the session's story, the
//! ordered record of distinct mock hashes served so far. Whitelisted hosts
//! always pass through to the real transport.
//!
//!```no_run
//!     use std::sync::Arc;
//!
//!     use unmock::client::HttpClient;
//!     use unmock::response::Reply;
//!     use unmock::transport::{tcp::TcpTransport, TransportSlot};
//!     use unmock::{Options, Session};
//!
//!     fn main() -> anyhow::Result<()> {
//!         let slot = TransportSlot::new(Arc::new(TcpTransport::default()));
//!
//!         let options = Options::new().reply_fn(|request| {
//!             let name = request.query_first("name").unwrap_or("world");
//!             Ok(Reply::new().text(format!("Hello {name}!")))
//!         });
//!         let session = Session::activate(&slot, options)?;
//!
//!         let client = HttpClient::new(slot);
//!         let mut response = client.get("http://example.com/?name=foo")?;
//!         println!("{}", response.text()?);
//!
//!         session.deactivate();
//!         Ok(())
//!     }
//!```

/// Minimal blocking HTTP client that issues requests through a transport slot.
pub mod client;

/// Activation options: save modes, decision service endpoint, whitelist,
/// seeded stories, credentials.
pub mod options;

/// Storage collaborators for saved mocks and credentials.
pub mod persistence;

/// A prelude module for convenient importing of commonly used types.
pub mod prelude;

/// Phased capture of an outbound request.
pub mod request;

/// Reply descriptors and synthesized responses.
pub mod response;

/// Interception lifecycle: activation, deactivation, story access.
pub mod session;

/// The ordered set of mock hashes served during a session.
pub mod story;

/// The transport seam: the [`Transport`](crate::transport::Transport) trait,
/// the swappable slot, the intercepting decorator, and a plain TCP transport.
pub mod transport;

/// Host patterns that bypass interception.
pub mod whitelist;

mod auth;
mod errors;
mod query;
mod resolver;

#[cfg(test)]
pub(crate) mod stubs;

pub use errors::Error;
pub use options::Options;
pub use resolver::STORY_HASH_HEADER;
pub use session::Session;
