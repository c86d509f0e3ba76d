// Device addressing: host resolution and endpoint URL construction.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Where the client considers itself to be running.
///
/// Used to resolve the literal `localhost` to a real bridge host, and to pick
/// `ws`/`wss` and `http`/`https`. A CLI on a workstation normally uses the
/// default (`localhost`, insecure), which leaves addresses untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOrigin {
    pub host: String,
    #[serde(default)]
    pub secure: bool,
}

impl Default for PageOrigin {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            secure: false,
        }
    }
}

impl PageOrigin {
    fn is_loopback(&self) -> bool {
        is_loopback(&self.host)
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

/// A device host: hostname, `ip[:port]`, or `localhost`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Parse user input, tolerating a pasted scheme prefix or trailing path.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        let without_scheme = ["ws://", "wss://", "http://", "https://"]
            .iter()
            .find_map(|p| trimmed.strip_prefix(p))
            .unwrap_or(trimmed);
        let host = without_scheme
            .split('/')
            .next()
            .unwrap_or_default()
            .trim();

        if host.is_empty() {
            return Err(Error::Validation {
                field: "address",
                reason: "device address is empty".into(),
            });
        }
        if host.chars().any(char::is_whitespace) {
            return Err(Error::Validation {
                field: "address",
                reason: format!("'{host}' contains whitespace"),
            });
        }

        Ok(Self(host.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve `localhost` to the origin host when the origin is not itself
    /// a loopback host. Every other address is returned unchanged.
    pub fn resolve(&self, origin: &PageOrigin) -> Self {
        if self.0.eq_ignore_ascii_case("localhost") && !origin.is_loopback() {
            Self(origin.host.clone())
        } else {
            self.clone()
        }
    }

    /// `ws(s)://<host>/ws` for this (already resolved) address.
    pub fn ws_url(&self, origin: &PageOrigin) -> Result<Url, Error> {
        let scheme = if origin.secure { "wss" } else { "ws" };
        Ok(Url::parse(&format!("{scheme}://{}/ws", self.0))?)
    }

    /// `http(s)://<host>/`, the root of the device's REST API.
    pub fn http_base(&self, origin: &PageOrigin) -> Result<Url, Error> {
        let scheme = if origin.secure { "https" } else { "http" };
        Ok(Url::parse(&format!("{scheme}://{}/", self.0))?)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(host: &str, secure: bool) -> PageOrigin {
        PageOrigin {
            host: host.into(),
            secure,
        }
    }

    #[test]
    fn localhost_resolves_to_remote_origin() {
        let addr = DeviceAddress::parse("localhost").unwrap();
        let resolved = addr.resolve(&origin("192.168.4.1", false));
        assert_eq!(resolved.as_str(), "192.168.4.1");
    }

    #[test]
    fn localhost_is_kept_for_loopback_origins() {
        let addr = DeviceAddress::parse("localhost").unwrap();
        assert_eq!(addr.resolve(&origin("localhost", false)).as_str(), "localhost");
        assert_eq!(addr.resolve(&origin("127.0.0.1", false)).as_str(), "localhost");
    }

    #[test]
    fn other_addresses_are_untouched() {
        let addr = DeviceAddress::parse("10.0.0.7:8080").unwrap();
        assert_eq!(addr.resolve(&origin("psu.lan", true)), addr);
    }

    #[test]
    fn parse_strips_scheme_and_path() {
        let addr = DeviceAddress::parse(" http://psu.local/index.html ").unwrap();
        assert_eq!(addr.as_str(), "psu.local");
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(DeviceAddress::parse("   ").is_err());
        assert!(DeviceAddress::parse("ws://").is_err());
    }

    #[test]
    fn urls_follow_origin_security() {
        let addr = DeviceAddress::parse("192.168.1.50").unwrap();
        assert_eq!(
            addr.ws_url(&origin("localhost", false)).unwrap().as_str(),
            "ws://192.168.1.50/ws"
        );
        assert_eq!(
            addr.ws_url(&origin("bench.example", true)).unwrap().as_str(),
            "wss://192.168.1.50/ws"
        );
        assert_eq!(
            addr.http_base(&origin("bench.example", true)).unwrap().as_str(),
            "https://192.168.1.50/"
        );
    }

    #[test]
    fn port_is_preserved_in_urls() {
        let addr = DeviceAddress::parse("127.0.0.1:9001").unwrap();
        assert_eq!(
            addr.ws_url(&PageOrigin::default()).unwrap().as_str(),
            "ws://127.0.0.1:9001/ws"
        );
    }
}
