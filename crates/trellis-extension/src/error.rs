//! Error types for extension loading and selection.
//!
//! Construction-time failures of a single extension never abort a registry:
//! they are recorded per descriptor line and resurface as causes on the next
//! selection of the affected name. Selection-time failures always surface to
//! the caller.

use thiserror::Error;

/// Errors raised by the extension registry and its collaborators.
///
/// The type is `Clone` because several failures are memoized (the class
/// table, the adaptive instance) and re-raised on every subsequent call.
#[derive(Debug, Clone, Error)]
pub enum ExtensionError {
    /// An extension name was empty.
    #[error("extension name must not be empty")]
    EmptyName,

    /// `get` was called with an unknown or poisoned name. `causes` carries
    /// any recorded descriptor load errors whose key matches the name.
    #[error("no extension `{name}` registered for point `{point}`{causes}")]
    NoSuchExtension {
        /// Qualified extension point id.
        point: &'static str,
        /// The requested name.
        name: String,
        /// Pre-rendered descriptor load errors, empty when none matched.
        causes: String,
    },

    /// The point declares no default extension but one was required.
    #[error("no default extension declared for point `{point}`")]
    NoDefault {
        /// Qualified extension point id.
        point: &'static str,
    },

    /// Two classes claimed the same name without an overridable strategy.
    #[error(
        "duplicate extension `{name}` for point `{point}`: `{existing}` conflicts with `{duplicate}`"
    )]
    DuplicateExtension {
        /// Qualified extension point id.
        point: &'static str,
        /// The contested name.
        name: String,
        /// Type path already registered under the name.
        existing: String,
        /// Type path of the conflicting registration.
        duplicate: String,
    },

    /// More than one adaptive implementation was declared for one point.
    #[error(
        "more than one adaptive implementation for point `{point}`: `{existing}` and `{duplicate}`"
    )]
    MultipleAdaptive {
        /// Qualified extension point id.
        point: &'static str,
        /// Type path of the first adaptive class.
        existing: String,
        /// Type path of the second adaptive class.
        duplicate: String,
    },

    /// No adaptive instance could be produced for the point.
    #[error("failed to synthesize an adaptive dispatcher for point `{point}`: {reason}")]
    AdaptiveSynthesisFailed {
        /// Qualified extension point id.
        point: &'static str,
        /// Why synthesis was impossible.
        reason: String,
    },

    /// An extension constructor returned an error.
    #[error("failed to construct extension `{name}` for point `{point}`: {reason}")]
    InstantiationFailed {
        /// Qualified extension point id.
        point: &'static str,
        /// The extension name under construction.
        name: String,
        /// The constructor's error, rendered.
        reason: String,
    },

    /// `Lifecycle::initialize` failed after construction.
    #[error("failed to initialize extension `{name}` for point `{point}`: {reason}")]
    LifecycleFailed {
        /// Qualified extension point id.
        point: &'static str,
        /// The extension name being initialized.
        name: String,
        /// The lifecycle error, rendered.
        reason: String,
    },

    /// An extension resolved itself (same point, same name) during its own
    /// construction.
    #[error(
        "re-entrant resolution of extension `{name}` for point `{point}` during its construction"
    )]
    CyclicExtension {
        /// Qualified extension point id.
        point: &'static str,
        /// The name being constructed when the cycle closed.
        name: String,
    },

    /// An adaptive dispatcher method has no URL parameter to dispatch on.
    #[error("method `{method}` of point `{point}` has no URL-addressable parameter")]
    UnsupportedOperation {
        /// Qualified extension point id.
        point: &'static str,
        /// The undispatchable method.
        method: &'static str,
    },

    /// None of a method's adaptive keys produced a value and the point has
    /// no default name.
    #[error("none of the adaptive keys [{keys}] is present in the URL for point `{point}`")]
    MissingAdaptiveKey {
        /// Qualified extension point id.
        point: &'static str,
        /// The consulted keys, comma-joined.
        keys: &'static str,
    },

    /// `replace_extension` was called for a name that was never registered.
    #[error("cannot replace extension `{name}` of point `{point}`: not registered")]
    NotRegistered {
        /// Qualified extension point id.
        point: &'static str,
        /// The missing name.
        name: String,
    },
}

/// Result alias for registry operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// Error returned by [`Lifecycle`](crate::Lifecycle) hooks.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct LifecycleError(pub String);
