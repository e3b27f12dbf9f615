//! Base contracts implemented by extensions and extension points.

use std::sync::Arc;

use crate::error::LifecycleError;
use crate::registry::ExtensionRegistry;

/// Base contract every extension implementation satisfies.
///
/// The single hook exposes the optional [`Lifecycle`] capability without
/// forcing every implementation to carry one; the registry queries it through
/// [`ExtensionPoint::lifecycle_of`] after wrapper folding and before handing
/// the instance out.
pub trait Extension: Send + Sync + 'static {
    /// The lifecycle capability of this implementation, if it manages
    /// resources that need explicit setup and teardown.
    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        None
    }
}

/// Optional lifecycle capability for extension instances.
///
/// `initialize` runs once, after construction, injection, and wrapper
/// folding. `destroy` runs during registry teardown; its errors are logged
/// and never prevent teardown of the remaining instances.
pub trait Lifecycle: Send + Sync {
    /// Called once before the instance is published.
    fn initialize(&self) -> Result<(), LifecycleError>;

    /// Called once during registry teardown.
    fn destroy(&self) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Marker implemented for the object type of every extension point trait.
///
/// Generated by `#[extension_point]`; do not implement by hand. The constants
/// drive descriptor lookup and adaptive key derivation, and
/// [`synthesize_adaptive`](Self::synthesize_adaptive) is the compile-time
/// synthesized dispatcher factory (absent when no method is
/// URL-addressable or synthesis was disabled).
///
/// The `Send + Sync` bound is carried by every `dyn Point` type through the
/// [`Extension`] supertrait; registries and instance caches rely on it.
pub trait ExtensionPoint: Send + Sync + 'static {
    /// The trait's simple name, e.g. `LoadBalance`.
    const NAME: &'static str;

    /// The qualified id (`module_path::Name`); its dotted form is the
    /// descriptor file basename.
    const QUALIFIED: &'static str;

    /// The declared default extension name, if any.
    const DEFAULT_NAME: Option<&'static str> = None;

    /// Queries the [`Lifecycle`] capability of an instance of this point.
    fn lifecycle_of(instance: &Self) -> Option<&dyn Lifecycle>;

    /// Builds the synthesized adaptive dispatcher for this point.
    fn synthesize_adaptive(registry: &Arc<ExtensionRegistry<Self>>) -> Option<Box<Self>> {
        let _ = registry;
        None
    }
}
