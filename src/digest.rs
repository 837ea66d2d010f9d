//! Peer address fingerprinting.

use crate::config::{HashAlgorithm, HmacAlgorithm, SelectionMode};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::{Digest, Sha1};
use std::fmt::Write;
use std::net::SocketAddr;

type HmacMd5 = Hmac<Md5>;
type HmacSha1 = Hmac<Sha1>;

/// Compute the affinity fingerprint for a peer address.
///
/// Returns `None` in index mode, where peers are identified by position
/// instead of a digest. The fingerprint covers the peer's own address,
/// formatted as `ip:port`.
#[must_use]
pub fn fingerprint(mode: &SelectionMode, address: &SocketAddr) -> Option<String> {
    match mode {
        SelectionMode::Index => None,
        SelectionMode::Digest(algorithm) => Some(hash_fingerprint(*algorithm, address)),
        SelectionMode::DigestHmac(algorithm, key) => {
            Some(hmac_fingerprint(*algorithm, key, address))
        },
    }
}

fn hash_fingerprint(algorithm: HashAlgorithm, address: &SocketAddr) -> String {
    let text = address.to_string();
    match algorithm {
        HashAlgorithm::Md5 => hex(&Md5::digest(text.as_bytes())),
        HashAlgorithm::Sha1 => hex(&Sha1::digest(text.as_bytes())),
    }
}

fn hmac_fingerprint(algorithm: HmacAlgorithm, key: &str, address: &SocketAddr) -> String {
    let text = address.to_string();
    match algorithm {
        HmacAlgorithm::Md5 => {
            let mut mac =
                HmacMd5::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
            mac.update(text.as_bytes());
            hex(&mac.finalize().into_bytes())
        },
        HmacAlgorithm::Sha1 => {
            let mut mac =
                HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
            mac.update(text.as_bytes());
            hex(&mac.finalize().into_bytes())
        },
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
