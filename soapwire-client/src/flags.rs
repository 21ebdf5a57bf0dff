//! Per-request behaviour flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A set of flags handed to the network layer when a request is created.
///
/// Every request carries [`RequestFlags::BASE`]. [`RequestFlags::SECURE`] is
/// added or removed on each open depending on the endpoint scheme, and
/// [`RequestFlags::KEEP_CONNECTION`] is added when keep-alive was requested.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFlags(u32);

impl RequestFlags {
    /// Always fetch from the origin server.
    pub const RELOAD: Self = Self(1 << 0);
    /// Do not add the response to any cache.
    pub const NO_CACHE_WRITE: Self = Self(1 << 1);
    /// Force a `Pragma: no-cache` round trip through proxies.
    pub const PRAGMA_NOCACHE: Self = Self(1 << 2);
    /// Use TLS.
    pub const SECURE: Self = Self(1 << 3);
    /// Keep the connection open after the response.
    pub const KEEP_CONNECTION: Self = Self(1 << 4);
    /// Deliver redirect responses instead of following them.
    pub const NO_AUTO_REDIRECT: Self = Self(1 << 5);
    /// Never attach credentials automatically.
    pub const NO_AUTH: Self = Self(1 << 6);
    /// Neither send nor store cookies.
    pub const NO_COOKIES: Self = Self(1 << 7);
    /// Never show interactive prompts.
    pub const NO_UI: Self = Self(1 << 8);
    /// Accept a certificate whose name does not match the host.
    pub const IGNORE_CERT_CN_INVALID: Self = Self(1 << 9);
    /// Accept an expired or not yet valid certificate.
    pub const IGNORE_CERT_DATE_INVALID: Self = Self(1 << 10);
    /// Accept a certificate issued by an unknown authority.
    pub const IGNORE_UNKNOWN_CA: Self = Self(1 << 11);
    /// Allow a redirect from https to http.
    pub const IGNORE_REDIRECT_TO_HTTP: Self = Self(1 << 12);
    /// Allow a redirect from http to https.
    pub const IGNORE_REDIRECT_TO_HTTPS: Self = Self(1 << 13);

    /// Flags every request starts with.
    pub const BASE: Self =
        Self(Self::PRAGMA_NOCACHE.0 | Self::NO_CACHE_WRITE.0 | Self::RELOAD.0);

    const NAMES: [(Self, &'static str); 14] = [
        (Self::RELOAD, "RELOAD"),
        (Self::NO_CACHE_WRITE, "NO_CACHE_WRITE"),
        (Self::PRAGMA_NOCACHE, "PRAGMA_NOCACHE"),
        (Self::SECURE, "SECURE"),
        (Self::KEEP_CONNECTION, "KEEP_CONNECTION"),
        (Self::NO_AUTO_REDIRECT, "NO_AUTO_REDIRECT"),
        (Self::NO_AUTH, "NO_AUTH"),
        (Self::NO_COOKIES, "NO_COOKIES"),
        (Self::NO_UI, "NO_UI"),
        (Self::IGNORE_CERT_CN_INVALID, "IGNORE_CERT_CN_INVALID"),
        (Self::IGNORE_CERT_DATE_INVALID, "IGNORE_CERT_DATE_INVALID"),
        (Self::IGNORE_UNKNOWN_CA, "IGNORE_UNKNOWN_CA"),
        (Self::IGNORE_REDIRECT_TO_HTTP, "IGNORE_REDIRECT_TO_HTTP"),
        (Self::IGNORE_REDIRECT_TO_HTTPS, "IGNORE_REDIRECT_TO_HTTPS"),
    ];

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a set from raw bits. Unknown bits are kept but never named.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bits, unknown ones included.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set every flag in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear every flag in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Insert or remove `other` depending on `value`.
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for RequestFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RequestFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Comma separated flag names, e.g. `RELOAD, NO_CACHE_WRITE, SECURE`.
impl fmt::Display for RequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestFlags({self})")
    }
}
