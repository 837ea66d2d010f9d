//! Sticky router error types.

use thiserror::Error;

/// Errors raised while parsing or validating a `sticky` directive.
///
/// All of these are fatal at configuration load; each one names the
/// offending option.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An option was given without a value.
    #[error("a value must be provided to \"{0}=\"")]
    EmptyValue(&'static str),

    /// Both `hash=` and `hmac=` were given.
    #[error("\"hash=\" and \"hmac=\" are mutually exclusive")]
    HashAndHmac,

    /// Unsupported `hash=` value.
    #[error("wrong value for \"hash=\": expected index, md5 or sha1, got \"{0}\"")]
    BadHash(String),

    /// Unsupported `hmac=` value.
    #[error("wrong value for \"hmac=\": expected md5 or sha1, got \"{0}\"")]
    BadHmac(String),

    /// `hmac=` was given without a key.
    #[error("\"hmac=\" requires a non-empty \"hmac_key=\"")]
    MissingHmacKey,

    /// `hmac_key=` was given but `hmac=` was not.
    #[error("\"hmac_key=\" is meaningless without \"hmac=\"")]
    KeyWithoutHmac,

    /// Unparseable or non-positive `expires=` value.
    #[error("invalid value for \"expires=\": {0}")]
    BadExpires(String),

    /// Unrecognized directive argument.
    #[error("invalid argument \"{0}\"")]
    InvalidArgument(String),

    /// Failed to parse TOML content.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors surfaced while selecting a peer.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The fallback selector has no peers to choose from.
    #[error("no peers available")]
    NoPeersAvailable,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for selection operations.
pub type SelectResult<T> = Result<T, SelectError>;
