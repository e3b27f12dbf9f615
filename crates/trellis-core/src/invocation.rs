//! The invocation contract consumed by adaptive dispatch and load balancing.

use std::collections::BTreeMap;

/// One RPC call in flight: a method name plus free-form attachments.
///
/// Attachments override URL parameters during adaptive dispatch, so a single
/// call can be steered to a different extension than its service URL selects.
pub trait Invocation: Send + Sync {
    /// The invoked method name.
    fn method_name(&self) -> &str;

    /// Looks up a call attachment. Empty values are treated as absent.
    fn attachment(&self, key: &str) -> Option<&str>;
}

/// The standard [`Invocation`] value used by the framework itself.
#[derive(Debug, Clone, Default)]
pub struct RpcInvocation {
    method: String,
    attachments: BTreeMap<String, String>,
}

impl RpcInvocation {
    /// Creates an invocation of `method` with no attachments.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            attachments: BTreeMap::new(),
        }
    }

    /// Adds an attachment.
    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }
}

impl Invocation for RpcInvocation {
    fn method_name(&self) -> &str {
        &self.method
    }

    fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
