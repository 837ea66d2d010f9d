//! Sticky session configuration and directive parsing.

use crate::cookie::SetCookie;
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Cookie name used when `name=` is not configured.
pub const DEFAULT_COOKIE_NAME: &str = "route";

/// Hash function used to fingerprint a peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// MD5 digest.
    Md5,
    /// SHA-1 digest.
    Sha1,
}

/// MAC function used to fingerprint a peer address with a secret key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    /// HMAC-MD5.
    Md5,
    /// HMAC-SHA1.
    Sha1,
}

/// How the affinity cookie value identifies a peer.
///
/// Resolved once at configuration time and carried as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// The cookie carries the peer's decimal position in the registry.
    Index,
    /// The cookie carries a digest of the peer's address.
    Digest(HashAlgorithm),
    /// The cookie carries a keyed digest of the peer's address.
    DigestHmac(HmacAlgorithm, String),
}

impl SelectionMode {
    /// Whether peers carry an address fingerprint under this mode.
    #[must_use]
    pub fn uses_digest(&self) -> bool {
        !matches!(self, Self::Index)
    }
}

/// Validated sticky session configuration.
///
/// Built through [`StickyConfig::from_args`] or [`StickyOptions::validate`];
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickyConfig {
    cookie_name: String,
    cookie_domain: String,
    cookie_path: String,
    cookie_expires: Option<Duration>,
    mode: SelectionMode,
}

impl StickyConfig {
    /// Parse a `sticky` directive argument list.
    ///
    /// Arguments are `key=value` tokens:
    /// `name= domain= path= expires= hash= hmac= hmac_key=`.
    pub fn from_args<I, S>(args: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = StickyOptions::default();

        for arg in args {
            let arg = arg.as_ref();
            let Some((key, value)) = arg.split_once('=') else {
                return Err(ConfigError::InvalidArgument(arg.to_string()));
            };

            match key {
                "name" => options.name = Some(require_value("name", value)?.to_string()),
                "domain" => options.domain = Some(require_value("domain", value)?.to_string()),
                "path" => options.path = Some(require_value("path", value)?.to_string()),
                "expires" => {
                    let value = require_value("expires", value)?;
                    let expires = humantime::parse_duration(value)
                        .map_err(|e| ConfigError::BadExpires(e.to_string()))?;
                    options.expires = Some(expires);
                },
                "hash" => options.hash = Some(require_value("hash", value)?.to_string()),
                "hmac" => options.hmac = Some(require_value("hmac", value)?.to_string()),
                "hmac_key" => {
                    options.hmac_key = Some(require_value("hmac_key", value)?.to_string());
                },
                _ => return Err(ConfigError::InvalidArgument(arg.to_string())),
            }
        }

        options.validate()
    }

    /// Get the affinity cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Get the cookie domain (empty when not configured).
    #[must_use]
    pub fn cookie_domain(&self) -> &str {
        &self.cookie_domain
    }

    /// Get the cookie path (empty when not configured).
    #[must_use]
    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }

    /// Get the cookie lifetime, if one is configured.
    #[must_use]
    pub fn cookie_expires(&self) -> Option<Duration> {
        self.cookie_expires
    }

    /// Get the selection mode.
    #[must_use]
    pub fn mode(&self) -> &SelectionMode {
        &self.mode
    }

    /// Build the response cookie carrying `value` for this configuration.
    #[must_use]
    pub fn response_cookie(&self, value: String) -> SetCookie {
        SetCookie::new(
            self.cookie_name.clone(),
            value,
            self.cookie_domain.clone(),
            self.cookie_path.clone(),
            self.cookie_expires,
        )
    }
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: String::new(),
            cookie_path: String::new(),
            cookie_expires: None,
            mode: SelectionMode::Digest(HashAlgorithm::Md5),
        }
    }
}

fn require_value<'a>(key: &'static str, value: &'a str) -> ConfigResult<&'a str> {
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key));
    }
    Ok(value)
}

/// Raw `sticky` options as they appear in configuration, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StickyOptions {
    /// Affinity cookie name.
    pub name: Option<String>,

    /// Cookie `Domain` attribute.
    pub domain: Option<String>,

    /// Cookie `Path` attribute.
    pub path: Option<String>,

    /// Cookie lifetime; the `Expires` attribute is computed from it.
    #[serde(default, with = "humantime_serde")]
    pub expires: Option<Duration>,

    /// Digest selection: `index`, `md5` or `sha1`.
    pub hash: Option<String>,

    /// Keyed digest selection: `md5` or `sha1`.
    pub hmac: Option<String>,

    /// Secret key for `hmac`.
    pub hmac_key: Option<String>,
}

impl StickyOptions {
    /// Validate the raw options into an immutable [`StickyConfig`].
    pub fn validate(&self) -> ConfigResult<StickyConfig> {
        if self.hash.is_some() && self.hmac.is_some() {
            return Err(ConfigError::HashAndHmac);
        }

        let mode = if let Some(hmac) = self.hmac.as_deref() {
            let algorithm = match hmac {
                "md5" => HmacAlgorithm::Md5,
                "sha1" => HmacAlgorithm::Sha1,
                other => return Err(ConfigError::BadHmac(other.to_string())),
            };
            let key = match self.hmac_key.as_deref() {
                Some(key) if !key.is_empty() => key.to_string(),
                _ => return Err(ConfigError::MissingHmacKey),
            };
            SelectionMode::DigestHmac(algorithm, key)
        } else {
            if self.hmac_key.as_deref().is_some_and(|key| !key.is_empty()) {
                return Err(ConfigError::KeyWithoutHmac);
            }
            match self.hash.as_deref() {
                None | Some("md5") => SelectionMode::Digest(HashAlgorithm::Md5),
                Some("sha1") => SelectionMode::Digest(HashAlgorithm::Sha1),
                Some("index") => SelectionMode::Index,
                Some(other) => return Err(ConfigError::BadHash(other.to_string())),
            }
        };

        if let Some(expires) = self.expires {
            if expires.is_zero() {
                return Err(ConfigError::BadExpires(
                    "must be a positive duration".to_string(),
                ));
            }
        }

        Ok(StickyConfig {
            cookie_name: self
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            cookie_domain: self.domain.clone().unwrap_or_default(),
            cookie_path: self.path.clone().unwrap_or_default(),
            cookie_expires: self.expires,
            mode,
        })
    }
}

/// Configuration for a single upstream server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server address.
    pub address: IpAddr,

    /// Server port.
    pub port: u16,

    /// Human-readable name; defaults to `address:port`.
    pub name: Option<String>,

    /// Backup servers are registered after all primary servers.
    #[serde(default)]
    pub backup: bool,
}

impl ServerConfig {
    /// Create a primary server entry.
    #[must_use]
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            name: None,
            backup: false,
        }
    }

    /// Set a human-readable name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark this server as a backup.
    #[must_use]
    pub fn as_backup(mut self) -> Self {
        self.backup = true;
        self
    }

    /// Get the socket address for this server.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Get the display name, falling back to the socket address.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.socket_addr().to_string())
    }
}

/// Configuration for an upstream group with sticky sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Group name (unique identifier).
    pub name: String,

    /// Servers in this group.
    pub servers: Vec<ServerConfig>,

    /// Sticky session options.
    pub sticky: StickyOptions,
}

impl UpstreamConfig {
    /// Parse an upstream group from TOML content.
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(input)?)
    }
}
