//! # Sticky Router
//!
//! Cookie-based session affinity layered on top of round-robin upstream
//! selection.
//!
//! Once a client has been routed to a backend peer, later requests carrying
//! the affinity cookie are routed to the same peer whenever possible. A
//! missing, stale or malformed cookie is never an error: selection degrades
//! silently to the underlying rotation and a fresh cookie is issued for
//! whichever peer it picks.
//!
//! ## Features
//!
//! - **Digest affinity**: cookies carry an MD5/SHA-1 digest, or an
//!   HMAC-MD5/HMAC-SHA1 keyed digest, of the peer's address
//! - **Index affinity**: cookies carry the peer's position in the registry
//! - **Primary and backup pools**: backup peers register after all primary
//!   peers, with stable positions
//! - **One-shot cookie semantics**: retries within a request never loop on
//!   the same cookie
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │   SessionRouter    │
//! │                    │
//! │  ┌──────────────┐  │  cookie match   ┌──────────┐
//! │  │ SessionState │──┼────────────────▶│  Peer 1  │
//! │  │ (per request)│  │                 └──────────┘
//! │  └──────┬───────┘  │                 ┌──────────┐
//! │         │ miss     │        ┌───────▶│  Peer 2  │
//! │  ┌──────▼───────┐  │        │        └──────────┘
//! │  │  RoundRobin  │──┼────────┘  + Set-Cookie
//! │  └──────────────┘  │
//! └────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use sticky_router::{ServerConfig, SelectionSource, SessionRouter, StickyConfig};
//!
//! let servers = vec![
//!     ServerConfig::new("10.0.0.1".parse().unwrap(), 8080),
//!     ServerConfig::new("10.0.0.2".parse().unwrap(), 8080),
//!     ServerConfig::new("10.0.0.3".parse().unwrap(), 8080),
//! ];
//! let config = StickyConfig::from_args(["hash=index"]).unwrap();
//! let router = SessionRouter::with_default_round_robin(&servers, config);
//!
//! // First request carries no cookie: the rotation picks a peer and a
//! // cookie identifying it is issued.
//! let no_cookies: [&str; 0] = [];
//! let mut session = router.begin_request(no_cookies);
//! let selection = session.select().unwrap();
//! assert_eq!(selection.source, SelectionSource::RoundRobin);
//! let cookie = selection.set_cookie.unwrap();
//! assert_eq!(cookie.header_value(), "route=0");
//!
//! // The next request presents the cookie and is routed to the same peer,
//! // without consulting the rotation.
//! let mut session = router.begin_request(["route=0"]);
//! let selection = session.select().unwrap();
//! assert_eq!(selection.source, SelectionSource::Affinity);
//! assert_eq!(selection.address, "10.0.0.1:8080".parse().unwrap());
//! ```

pub mod config;
pub mod cookie;
pub mod digest;
pub mod error;
pub mod registry;
pub mod router;

pub use config::{
    HashAlgorithm, HmacAlgorithm, SelectionMode, ServerConfig, StickyConfig, StickyOptions,
    UpstreamConfig, DEFAULT_COOKIE_NAME,
};
pub use cookie::SetCookie;
pub use error::{ConfigError, ConfigResult, SelectError, SelectResult};
pub use registry::{BackendPeer, PeerRegistry};
pub use router::{
    RoundRobin, RoundRobinSelector, Selection, SelectionSource, SessionRouter, SessionState,
};
