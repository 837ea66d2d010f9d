//! Per-request sticky selection over a fallback rotation.

use crate::config::{ServerConfig, StickyConfig};
use crate::cookie::{self, SetCookie};
use crate::error::{SelectError, SelectResult};
use crate::registry::{BackendPeer, PeerRegistry};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Contract of the underlying rotation algorithm.
///
/// The sticky layer never inspects how the peer is chosen; it only locates
/// the returned address in its registry to issue a fresh affinity cookie.
/// Errors propagate to the caller unchanged.
pub trait RoundRobin: Send + Sync {
    /// Choose the next peer address.
    fn next_peer(&self) -> SelectResult<SocketAddr>;
}

/// Simple rotating selector over a fixed address list.
#[derive(Debug)]
pub struct RoundRobinSelector {
    addresses: Vec<SocketAddr>,
    current: AtomicUsize,
}

impl RoundRobinSelector {
    /// Create a selector rotating over `addresses`.
    #[must_use]
    pub fn new(addresses: Vec<SocketAddr>) -> Self {
        Self {
            addresses,
            current: AtomicUsize::new(0),
        }
    }
}

impl RoundRobin for RoundRobinSelector {
    fn next_peer(&self) -> SelectResult<SocketAddr> {
        if self.addresses.is_empty() {
            return Err(SelectError::NoPeersAvailable);
        }
        let index = self.current.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        Ok(self.addresses[index])
    }
}

/// Sticky routing for one upstream group.
///
/// Built once at group initialization; afterwards shared read-only by every
/// request, so no locking is needed.
#[derive(Debug)]
pub struct SessionRouter<R = RoundRobinSelector> {
    config: StickyConfig,
    registry: Option<PeerRegistry>,
    round_robin: R,
}

impl<R: RoundRobin> SessionRouter<R> {
    /// Build the sticky layer for an upstream group.
    ///
    /// With an empty server list the registry is skipped and every selection
    /// delegates directly to `round_robin`.
    #[must_use]
    pub fn new(servers: &[ServerConfig], config: StickyConfig, round_robin: R) -> Self {
        let registry = PeerRegistry::build(servers, config.mode());
        if registry.is_none() {
            debug!("no peers in group, sticky layer inert");
        }
        Self {
            config,
            registry,
            round_robin,
        }
    }

    /// Get the sticky configuration.
    #[must_use]
    pub fn config(&self) -> &StickyConfig {
        &self.config
    }

    /// Get the peer registry, if the group has peers.
    #[must_use]
    pub fn registry(&self) -> Option<&PeerRegistry> {
        self.registry.as_ref()
    }

    /// Get the fallback selector.
    #[must_use]
    pub fn round_robin(&self) -> &R {
        &self.round_robin
    }

    /// Start routing one request.
    ///
    /// `cookie_headers` are the request's `Cookie` header values; the named
    /// affinity cookie is read from them, first occurrence winning.
    pub fn begin_request<'h, I>(&self, cookie_headers: I) -> SessionState<'_, R>
    where
        I: IntoIterator<Item = &'h str>,
    {
        // Without a registry the cookie is never read and every selection
        // falls through to the rotation.
        if self.registry.is_some() {
            let route = cookie::read_named_cookie(cookie_headers, self.config.cookie_name());
            if let Some(route) = route.filter(|route| !route.is_empty()) {
                debug!(route, "got affinity cookie");
                return SessionState {
                    router: self,
                    route: Some(route.to_string()),
                    attempt: RouteAttempt::NotAttempted,
                };
            }
        }

        SessionState {
            router: self,
            route: None,
            attempt: RouteAttempt::Attempted,
        }
    }
}

impl SessionRouter<RoundRobinSelector> {
    /// Build a router whose fallback rotates over the group's own peers in
    /// registry order.
    #[must_use]
    pub fn with_default_round_robin(servers: &[ServerConfig], config: StickyConfig) -> Self {
        let registry = PeerRegistry::build(servers, config.mode());
        let addresses = registry
            .as_ref()
            .map(|registry| registry.peers().iter().map(BackendPeer::address).collect())
            .unwrap_or_default();

        Self {
            config,
            registry,
            round_robin: RoundRobinSelector::new(addresses),
        }
    }
}

/// Whether the cookie-driven attempt has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteAttempt {
    NotAttempted,
    Attempted,
}

/// How a peer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// The client's affinity cookie was honored.
    Affinity,
    /// The fallback rotation chose the peer.
    RoundRobin,
}

/// Outcome of one selection call.
#[derive(Debug)]
pub struct Selection<'a> {
    /// Address of the chosen peer.
    pub address: SocketAddr,
    /// The registry entry for the chosen peer, when one exists.
    pub peer: Option<&'a BackendPeer>,
    /// How the peer was obtained.
    pub source: SelectionSource,
    /// Cookie to attach to the response; set when the rotation chose the
    /// peer, absent when the client's own cookie was honored.
    pub set_cookie: Option<SetCookie>,
}

/// Transient routing state for a single request.
///
/// Exclusively owned by its request; created by
/// [`SessionRouter::begin_request`] and dropped with the request.
#[derive(Debug)]
pub struct SessionState<'a, R = RoundRobinSelector> {
    router: &'a SessionRouter<R>,
    route: Option<String>,
    attempt: RouteAttempt,
}

impl<'a, R: RoundRobin> SessionState<'a, R> {
    /// Choose a peer for this request.
    ///
    /// May be called repeatedly; the surrounding proxy layer retries peer
    /// acquisition on connection failure. The cookie route is honored at
    /// most on the first call, so retries never loop on a stale cookie.
    pub fn select(&mut self) -> SelectResult<Selection<'a>> {
        if self.attempt == RouteAttempt::NotAttempted {
            self.attempt = RouteAttempt::Attempted;
            if let Some(selection) = self.try_route() {
                return Ok(selection);
            }
        }

        self.fallback()
    }

    /// Honor the stored route value if it still identifies a peer.
    ///
    /// A stale or malformed route is not an error; it falls through to the
    /// rotation.
    fn try_route(&self) -> Option<Selection<'a>> {
        let registry = self.router.registry.as_ref()?;
        let route = self.route.as_deref()?;

        let position = if self.router.config.mode().uses_digest() {
            registry.find_by_fingerprint(route)
        } else {
            parse_index(route).filter(|&index| index < registry.len())
        };

        let Some(position) = position else {
            debug!(route, "affinity cookie matches no peer");
            return None;
        };

        let peer = registry.get(position)?;
        debug!(peer = peer.name(), position, "affinity cookie matched");

        Some(Selection {
            address: peer.address(),
            peer: Some(peer),
            source: SelectionSource::Affinity,
            set_cookie: None,
        })
    }

    /// Delegate to the rotation and stamp a fresh cookie for its choice.
    fn fallback(&self) -> SelectResult<Selection<'a>> {
        let address = self.router.round_robin.next_peer()?;

        let registry = self.router.registry.as_ref();
        let peer = registry.and_then(|registry| {
            registry
                .position_of(address)
                .and_then(|position| registry.get(position))
        });

        // A peer the registry does not know gets no cookie; that is not an
        // error.
        let set_cookie = registry.and_then(|registry| {
            let position = registry.position_of(address)?;
            let value = registry.route_value(position)?;
            debug!(%address, position, value, "issuing affinity cookie");
            Some(self.router.config.response_cookie(value))
        });

        Ok(Selection {
            address,
            peer,
            source: SelectionSource::RoundRobin,
            set_cookie,
        })
    }
}

/// Parse a route as a decimal registry position.
fn parse_index(route: &str) -> Option<usize> {
    if route.is_empty() || !route.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    route.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StickyConfig;
    use std::net::{IpAddr, Ipv4Addr};

    fn servers(count: u8) -> Vec<ServerConfig> {
        (1..=count)
            .map(|i| ServerConfig::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, i)), 8080))
            .collect()
    }

    fn index_config() -> StickyConfig {
        StickyConfig::from_args(["hash=index"]).unwrap()
    }

    #[test]
    fn test_round_robin_selector_rotates() {
        let addresses: Vec<SocketAddr> = servers(3)
            .iter()
            .map(ServerConfig::socket_addr)
            .collect();
        let selector = RoundRobinSelector::new(addresses.clone());

        assert_eq!(selector.next_peer().unwrap(), addresses[0]);
        assert_eq!(selector.next_peer().unwrap(), addresses[1]);
        assert_eq!(selector.next_peer().unwrap(), addresses[2]);
        assert_eq!(selector.next_peer().unwrap(), addresses[0]);
    }

    #[test]
    fn test_round_robin_selector_empty() {
        let selector = RoundRobinSelector::new(Vec::new());
        assert!(matches!(
            selector.next_peer(),
            Err(SelectError::NoPeersAvailable)
        ));
    }

    #[test]
    fn test_no_cookie_falls_back_and_issues_cookie() {
        let router = SessionRouter::with_default_round_robin(&servers(3), index_config());

        let no_cookies: [&str; 0] = [];
        let mut session = router.begin_request(no_cookies);
        let selection = session.select().unwrap();

        assert_eq!(selection.source, SelectionSource::RoundRobin);
        assert_eq!(selection.address, "10.0.0.1:8080".parse().unwrap());
        let cookie = selection.set_cookie.unwrap();
        assert_eq!(cookie.name(), "route");
        assert_eq!(cookie.value(), "0");
    }

    #[test]
    fn test_index_cookie_matches_without_rotation() {
        let router = SessionRouter::with_default_round_robin(&servers(3), index_config());

        let mut session = router.begin_request(["route=2"]);
        let selection = session.select().unwrap();

        assert_eq!(selection.source, SelectionSource::Affinity);
        assert_eq!(selection.address, "10.0.0.3:8080".parse().unwrap());
        assert!(selection.set_cookie.is_none());
    }

    #[test]
    fn test_out_of_range_index_falls_back() {
        let router = SessionRouter::with_default_round_robin(&servers(3), index_config());

        for route in ["route=3", "route=99", "route=-1", "route=abc", "route=1x"] {
            let mut session = router.begin_request([route]);
            let selection = session.select().unwrap();
            assert_eq!(selection.source, SelectionSource::RoundRobin, "{route}");
            assert!(selection.set_cookie.is_some(), "{route}");
        }
    }

    #[test]
    fn test_digest_cookie_matches_exact_peer() {
        let config = StickyConfig::from_args(["hash=md5"]).unwrap();
        let router = SessionRouter::with_default_round_robin(&servers(3), config);
        let registry = router.registry().unwrap();

        for position in 0..registry.len() {
            let fingerprint = registry.get(position).unwrap().fingerprint().unwrap();
            let header = format!("route={fingerprint}");
            let mut session = router.begin_request([header.as_str()]);
            let selection = session.select().unwrap();

            assert_eq!(selection.source, SelectionSource::Affinity);
            assert_eq!(selection.address, registry.get(position).unwrap().address());
        }
    }

    #[test]
    fn test_digest_prefix_falls_back() {
        let config = StickyConfig::from_args(["hash=sha1"]).unwrap();
        let router = SessionRouter::with_default_round_robin(&servers(2), config);
        let fingerprint = router
            .registry()
            .unwrap()
            .get(0)
            .unwrap()
            .fingerprint()
            .unwrap()
            .to_string();

        let header = format!("route={}", &fingerprint[..10]);
        let mut session = router.begin_request([header.as_str()]);
        let selection = session.select().unwrap();
        assert_eq!(selection.source, SelectionSource::RoundRobin);
    }

    #[test]
    fn test_route_tried_at_most_once() {
        let router = SessionRouter::with_default_round_robin(&servers(3), index_config());

        let mut session = router.begin_request(["route=2"]);
        let first = session.select().unwrap();
        assert_eq!(first.source, SelectionSource::Affinity);

        // Retries within the same request ignore the cookie.
        let second = session.select().unwrap();
        assert_eq!(second.source, SelectionSource::RoundRobin);
        let third = session.select().unwrap();
        assert_eq!(third.source, SelectionSource::RoundRobin);
    }

    #[test]
    fn test_empty_cookie_value_never_tried() {
        let router = SessionRouter::with_default_round_robin(&servers(2), index_config());

        let mut session = router.begin_request(["route="]);
        let selection = session.select().unwrap();
        assert_eq!(selection.source, SelectionSource::RoundRobin);
    }

    #[test]
    fn test_degenerate_group_delegates_to_rotation() {
        let router = SessionRouter::with_default_round_robin(&[], index_config());
        assert!(router.registry().is_none());

        let mut session = router.begin_request(["route=0"]);
        let result = session.select();
        assert!(matches!(result, Err(SelectError::NoPeersAvailable)));
    }

    #[test]
    fn test_custom_cookie_name() {
        let config = StickyConfig::from_args(["name=sid", "hash=index"]).unwrap();
        let router = SessionRouter::with_default_round_robin(&servers(2), config);

        let mut session = router.begin_request(["sid=1"]);
        let selection = session.select().unwrap();
        assert_eq!(selection.source, SelectionSource::Affinity);
        assert_eq!(selection.address, "10.0.0.2:8080".parse().unwrap());

        // The default name is not read when a custom one is configured.
        let mut session = router.begin_request(["route=1"]);
        let selection = session.select().unwrap();
        assert_eq!(selection.source, SelectionSource::RoundRobin);
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index("42"), Some(42));
        assert_eq!(parse_index("007"), Some(7));
        assert_eq!(parse_index(""), None);
        assert_eq!(parse_index("+3"), None);
        assert_eq!(parse_index("-3"), None);
        assert_eq!(parse_index("3.0"), None);
        assert_eq!(parse_index("99999999999999999999999999"), None);
    }
}
