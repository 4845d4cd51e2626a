//! A prelude module for convenient importing of commonly used types and traits.
//!
//! Instead of importing each type individually:
//!
//! ```rust
//! use unmock::{Options, Session};
//! use unmock::transport::{tcp::TcpTransport, TransportSlot};
//! use unmock::response::Reply;
//! ```
//!
//! You can simply use:
//!
//! ```rust
//! use unmock::prelude::*;
//! ```

// Lifecycle
pub use crate::{Error, Options, Session, STORY_HASH_HEADER};
pub use crate::options::SaveMode;

// Transport seam
pub use crate::transport::tcp::TcpTransport;
pub use crate::transport::{Call, HeaderValue, Transport, TransportSlot};

// Requests and responses
pub use crate::client::HttpClient;
pub use crate::request::CapturedRequest;
pub use crate::response::{Headers, HttpResponse, Reply};

// Collaborators
pub use crate::persistence::{FsPersistence, Persistence};
pub use crate::story::StoryState;
pub use crate::whitelist::Whitelist;
