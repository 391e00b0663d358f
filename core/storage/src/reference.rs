//! Reference grammar shared by the adapters.
//!
//! A reference is `scheme://location[#id]`. Keyed backends put the store
//! location before `#` and the logical id after it; content-addressed
//! backends put the content identifier in the location and omit the id.

use sha2::{Digest, Sha256};
use std::fmt;

use tacostore_common::{Error, Result};

const SCHEME_SEPARATOR: &str = "://";

/// Scheme of content-addressed references.
pub const IPFS_SCHEME: &str = "ipfs";

/// Scheme of in-memory references.
pub const MEMORY_SCHEME: &str = "memory";

/// Scheme of SQLite references.
pub const SQLITE_SCHEME: &str = "sqlite";

const BACKEND_SCHEMES: &[&str] = &[MEMORY_SCHEME, SQLITE_SCHEME, IPFS_SCHEME];

/// A parsed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub scheme: &'a str,
    pub location: &'a str,
    pub id: Option<&'a str>,
}

impl<'a> Reference<'a> {
    /// Parse `input` as a reference.
    ///
    /// Returns `None` when `input` has no scheme and is therefore a bare id.
    pub fn parse(input: &'a str) -> Option<Self> {
        let (scheme, rest) = input.split_once(SCHEME_SEPARATOR)?;
        let (location, id) = match rest.split_once('#') {
            Some((location, id)) => (location, Some(id)),
            None => (rest, None),
        };
        Some(Self {
            scheme,
            location,
            id,
        })
    }

    /// Format a reference.
    pub fn format(scheme: &str, location: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}{}{}#{}", scheme, SCHEME_SEPARATOR, location, id),
            None => format!("{}{}{}", scheme, SCHEME_SEPARATOR, location),
        }
    }
}

impl fmt::Display for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::format(self.scheme, self.location, self.id))
    }
}

/// Scheme of `locator` when it is a reference of one of our backends.
///
/// Strings with any other scheme (`https://…`) are plain ids.
pub fn backend_scheme(locator: &str) -> Option<&str> {
    let (scheme, _) = locator.split_once(SCHEME_SEPARATOR)?;
    BACKEND_SCHEMES.contains(&scheme).then_some(scheme)
}

/// Resolve a keyed-backend locator to the logical id it names.
///
/// A locator starting with `scheme://location#` names the id after that
/// prefix, whatever characters it contains. Callers look the locator up as
/// a bare id first; this only decides what a locator means when it is not
/// a stored id.
///
/// # Errors
/// - `InvalidReference` for an empty locator, another backend's scheme,
///   another store's location, or a reference without an id
pub fn resolve_keyed<'a>(scheme: &str, location: &str, locator: &'a str) -> Result<&'a str> {
    if locator.trim().is_empty() {
        return Err(Error::InvalidReference("Locator cannot be empty".to_string()));
    }
    let prefix = format!("{}{}{}#", scheme, SCHEME_SEPARATOR, location);
    if let Some(id) = locator.strip_prefix(prefix.as_str()) {
        if id.is_empty() {
            return Err(Error::InvalidReference(format!(
                "Reference {} does not name an object",
                locator
            )));
        }
        return Ok(id);
    }
    match backend_scheme(locator) {
        None => Ok(locator),
        Some(found) if found == scheme => Err(Error::InvalidReference(format!(
            "Reference {} does not name an object in this {} store",
            locator, scheme
        ))),
        Some(_) => Err(Error::InvalidReference(format!(
            "Expected a {} reference, got {}",
            scheme, locator
        ))),
    }
}

/// A validated IPFS content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid(String);

const BASE32_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz234567";

impl Cid {
    /// Parse a CID string.
    ///
    /// Accepts CIDv0 (base58btc sha2-256 multihash, `Qm…`) and CIDv1 in
    /// lowercase base32 multibase (`b…`).
    ///
    /// # Errors
    /// - `InvalidReference` if `s` is not a CID
    pub fn parse(s: &str) -> Result<Self> {
        if Self::is_v0(s) || Self::is_v1_base32(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidReference(format!("Not a valid CID: {}", s)))
        }
    }

    /// Parse either `ipfs://<cid>` or a bare CID.
    ///
    /// # Errors
    /// - `InvalidReference` for another scheme or a malformed CID
    pub fn from_locator(locator: &str) -> Result<Self> {
        match Reference::parse(locator) {
            Some(reference) if reference.scheme == IPFS_SCHEME && reference.id.is_none() => {
                Self::parse(reference.location)
            }
            Some(_) => Err(Error::InvalidReference(format!(
                "Expected an {} reference, got {}",
                IPFS_SCHEME, locator
            ))),
            None => Self::parse(locator),
        }
    }

    /// CIDv0 of `data`: the base58btc sha2-256 multihash.
    pub fn v0_of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut multihash = Vec::with_capacity(34);
        multihash.push(0x12);
        multihash.push(0x20);
        multihash.extend_from_slice(&digest);
        Self(bs58::encode(multihash).into_string())
    }

    fn is_v0(s: &str) -> bool {
        if s.len() != 46 || !s.starts_with("Qm") {
            return false;
        }
        match bs58::decode(s).into_vec() {
            Ok(bytes) => bytes.len() == 34 && bytes[0] == 0x12 && bytes[1] == 0x20,
            Err(_) => false,
        }
    }

    fn is_v1_base32(s: &str) -> bool {
        // Multibase 'b', then the base32 of version byte 0x01, which always
        // starts with 'a'.
        s.len() >= 10
            && s.starts_with("ba")
            && s[1..].chars().all(|c| BASE32_ALPHABET.contains(c))
    }

    /// The CID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ipfs://<cid>`.
    pub fn to_reference(&self) -> String {
        Reference::format(IPFS_SCHEME, &self.0, None)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V0: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const V1: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    #[test]
    fn test_parse_keyed_reference() {
        let reference = Reference::parse("sqlite:///tmp/db.sqlite#doc-1").unwrap();
        assert_eq!(reference.scheme, "sqlite");
        assert_eq!(reference.location, "/tmp/db.sqlite");
        assert_eq!(reference.id, Some("doc-1"));
        assert_eq!(reference.to_string(), "sqlite:///tmp/db.sqlite#doc-1");
    }

    #[test]
    fn test_bare_id_is_not_a_reference() {
        assert!(Reference::parse("doc-1").is_none());
    }

    #[test]
    fn test_resolve_keyed() {
        assert_eq!(resolve_keyed("sqlite", "/a.db", "doc-1").unwrap(), "doc-1");
        assert_eq!(
            resolve_keyed("sqlite", "/a.db", "sqlite:///a.db#doc-1").unwrap(),
            "doc-1"
        );
        assert!(matches!(
            resolve_keyed("sqlite", "/a.db", "sqlite:///b.db#doc-1"),
            Err(Error::InvalidReference(_))
        ));
        assert!(matches!(
            resolve_keyed("sqlite", "/a.db", &format!("ipfs://{}", V0)),
            Err(Error::InvalidReference(_))
        ));
        assert!(resolve_keyed("sqlite", "/a.db", "sqlite:///a.db").is_err());
        assert!(resolve_keyed("sqlite", "/a.db", "sqlite:///a.db#").is_err());
        assert!(resolve_keyed("sqlite", "/a.db", "").is_err());
    }

    #[test]
    fn test_resolve_keyed_ids_with_reference_characters() {
        assert_eq!(
            resolve_keyed("sqlite", "/a.db", "sqlite:///a.db#report#2024").unwrap(),
            "report#2024"
        );
        assert_eq!(
            resolve_keyed("sqlite", "/a.db", "sqlite:///a.db#https://example.com/doc").unwrap(),
            "https://example.com/doc"
        );
        assert_eq!(
            resolve_keyed("sqlite", "/a.db", "https://example.com/doc").unwrap(),
            "https://example.com/doc"
        );
        assert_eq!(resolve_keyed("sqlite", "/a.db", "report#2024").unwrap(), "report#2024");
    }

    #[test]
    fn test_backend_scheme() {
        assert_eq!(backend_scheme("memory://x#doc"), Some("memory"));
        assert_eq!(backend_scheme(&format!("ipfs://{}", V0)), Some("ipfs"));
        assert_eq!(backend_scheme("https://example.com/doc"), None);
        assert_eq!(backend_scheme("doc"), None);
    }

    #[test]
    fn test_cid_versions() {
        assert_eq!(Cid::parse(V0).unwrap().as_str(), V0);
        assert_eq!(Cid::parse(V1).unwrap().as_str(), V1);
    }

    #[test]
    fn test_malformed_cids_rejected() {
        for bad in [
            "",
            "Qm",
            "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbd0",
            "bafyBEIG",
            "not-a-cid",
            "zdj7WWeQ43G6JJvLWQWZpyHuAMq6uYWRjkBXFad11vE2LHhQ7",
        ] {
            assert!(
                matches!(Cid::parse(bad), Err(Error::InvalidReference(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_cid_from_locator() {
        let reference = format!("ipfs://{}", V0);
        assert_eq!(Cid::from_locator(&reference).unwrap().as_str(), V0);
        assert_eq!(Cid::from_locator(V0).unwrap().as_str(), V0);
        assert!(Cid::from_locator("ipfs://garbage").is_err());
        assert!(Cid::from_locator(&format!("sqlite://x#{}", V0)).is_err());
    }

    #[test]
    fn test_v0_of_is_valid_and_deterministic() {
        let a = Cid::v0_of(b"hello");
        let b = Cid::v0_of(b"hello");
        assert_eq!(a, b);
        assert!(Cid::parse(a.as_str()).is_ok());
        assert_ne!(a, Cid::v0_of(b"world"));
        assert_eq!(a.to_reference(), format!("ipfs://{}", a));
    }
}
