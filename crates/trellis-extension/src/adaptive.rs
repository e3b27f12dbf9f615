//! Runtime support for synthesized adaptive dispatchers.
//!
//! Generated dispatcher methods call [`url_value`] once per adaptive key, in
//! declaration order, and fall back to the point's default name when no key
//! produces a value.

use trellis_core::Url;

/// Reads one adaptive key from a URL.
///
/// The reserved key `protocol` reads the URL scheme instead of a parameter.
/// With a method scope the lookup is method-scoped (`method.key` before
/// `key`).
pub fn url_value(url: &Url, method: Option<&str>, key: &str) -> Option<String> {
    if key == "protocol" {
        let protocol = url.protocol();
        return (!protocol.is_empty()).then(|| protocol.to_string());
    }
    match method {
        Some(method) => url.method_parameter(method, key),
        None => url.parameter(key),
    }
    .map(str::to_string)
}
