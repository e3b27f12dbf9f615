//! The cache contracts.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use trellis_core::{Invocation, Url};
use trellis_extension::{descriptor_resource, extension_point, Extension, ExtensionError};

/// Errors raised during cache resolution.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend resolution through the registry failed.
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

/// One keyed result store.
pub trait Cache: Send + Sync {
    /// Stores a value under `key`, replacing any previous one.
    fn put(&self, key: String, value: Value);

    /// Returns the stored value for `key`, if still present.
    fn get(&self, key: &str) -> Option<Value>;
}

/// Materializes [`Cache`] instances per service URL.
///
/// Extension point: the backend for a call is chosen by the `cache` URL key.
/// Factories memoize one cache per URL identity, so every call against the
/// same service shares a store.
#[extension_point(default = "lru")]
pub trait CacheFactory: Extension {
    /// The cache for `url`, created on first use.
    #[adaptive("cache")]
    fn cache(&self, url: &Url, invocation: &dyn Invocation) -> Result<Arc<dyn Cache>, CacheError>;
}

descriptor_resource!(
    CACHE_FACTORY_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "trellis_cache.factory.CacheFactory",
    contents = include_str!(
        "../resources/META-INF/trellis/internal/trellis_cache.factory.CacheFactory"
    ),
);
