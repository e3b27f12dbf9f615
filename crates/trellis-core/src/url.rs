//! The URL configuration abstraction.
//!
//! A [`Url`] is the principal input to adaptive dispatch: every runtime
//! decision in Trellis (which protocol, which balancer, which thread pool)
//! is answered by reading a keyed parameter from a URL. Parameters are kept
//! in a sorted map so two URLs with the same content render identically.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a URL descriptor.
#[derive(Debug, Clone, Error)]
pub enum UrlError {
    /// The descriptor has no `scheme://` part.
    #[error("url `{0}` is missing a scheme")]
    MissingScheme(String),

    /// The authority part could not be split into host and port.
    #[error("url `{0}` has an invalid port")]
    InvalidPort(String),
}

/// An immutable keyed parameter bag with method-scoped lookup.
///
/// The textual form is `scheme://host:port/path?key=value&key2=value2`.
/// Method-scoped parameters use a `method.key` compound key and fall back to
/// the plain `key` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    scheme: String,
    host: String,
    port: u16,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl Url {
    /// Creates a URL from its parts.
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            path: path.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// The URL scheme, also called the protocol.
    pub fn protocol(&self) -> &str {
        &self.scheme
    }

    /// The host part.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, `0` when unset.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The path without its leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Looks up a parameter. Empty values are treated as absent.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Looks up a parameter with a fallback.
    pub fn parameter_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.parameter(key).unwrap_or(default)
    }

    /// Looks up a method-scoped parameter (`method.key`), falling back to the
    /// plain key.
    pub fn method_parameter(&self, method: &str, key: &str) -> Option<&str> {
        self.parameter(&format!("{method}.{key}"))
            .or_else(|| self.parameter(key))
    }

    /// Parses a parameter into any `FromStr` type, yielding `None` on absent
    /// or unparseable values.
    pub fn typed_parameter<T: FromStr>(&self, key: &str) -> Option<T> {
        self.parameter(key).and_then(|v| v.parse().ok())
    }

    /// Parses a positive numeric parameter, substituting the default for
    /// absent, unparseable, or non-positive values.
    pub fn positive_parameter(&self, key: &str, default: u64) -> u64 {
        match self.typed_parameter::<u64>(key) {
            Some(v) if v > 0 => v,
            _ => default,
        }
    }

    /// All parameters, sorted by key.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Returns a new URL with the parameter added or replaced.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns a new URL with the parameter removed.
    pub fn without_parameter(mut self, key: &str) -> Self {
        self.parameters.remove(key);
        self
    }

    /// A stable identity string for cache keys: the full textual form.
    pub fn identity(&self) -> String {
        self.to_string()
    }
}

impl FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| UrlError::MissingScheme(s.to_string()))?;

        let (location, query) = match rest.split_once('?') {
            Some((l, q)) => (l, Some(q)),
            None => (rest, None),
        };

        let (authority, path) = match location.split_once('/') {
            Some((a, p)) => (a, p),
            None => (location, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (
                h,
                p.parse::<u16>()
                    .map_err(|_| UrlError::InvalidPort(s.to_string()))?,
            ),
            None => (authority, 0),
        };

        let mut parameters = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => parameters.insert(k.to_string(), v.to_string()),
                    None => parameters.insert(pair.to_string(), String::new()),
                };
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            parameters,
        })
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/{}", self.scheme, self.host, self.port, self.path)?;
        for (i, (k, v)) in self.parameters.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}
