//! The service endpoint contract.

use crate::url::Url;

/// A selectable service endpoint.
///
/// Load balancers only rely on this surface: the endpoint's configuration
/// URL (weight, warm-up and timestamp parameters live there) and its
/// availability. The invocation pipeline behind an endpoint is out of scope
/// for this crate.
pub trait Endpoint: Send + Sync {
    /// The endpoint's configuration URL.
    fn url(&self) -> &Url;

    /// Whether the endpoint is currently usable.
    fn is_available(&self) -> bool {
        true
    }
}
