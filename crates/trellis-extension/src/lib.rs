//! # Trellis Extension
//!
//! The extension-loading and selection core of the Trellis RPC framework:
//! a name-indexed, lazily-loaded, dependency-injected, wrapper-chained
//! plugin container per extension point, with URL-keyed adaptive dispatch.
//!
//! ## Architecture
//!
//! ```text
//! descriptor files ──► Loader ──► ClassTable ──► ExtensionRegistry<T>
//!   (embedded +                     (classes,        │ get(name)
//!    filesystem)                     wrappers,       │ get_adaptive()
//!                                    adaptive,       │ get_activate(...)
//! class catalog  ─────────────────── activates)      ▼
//!   (linkme records)                              Arc<T> instances
//! ```
//!
//! - **Extension points** are object-safe traits marked with
//!   [`extension_point`]; the attribute generates the [`ExtensionPoint`]
//!   impl for the trait's object type and a compile-time synthesized
//!   adaptive dispatcher.
//! - **Classes** reach the registry two ways: descriptor files (embedded
//!   through [`descriptor_resource!`] or on disk under the registered
//!   extension directories) resolved against the [`EXTENSION_CLASSES`]
//!   catalog, and programmatic [`ExtensionRegistry::add_extension`].
//! - **Instances** are process-wide singletons: one instance per class,
//!   shared by every name and registry that resolves to it.
//!
//! ## Concurrency
//!
//! Registries are reached from any number of OS threads. The only blocking
//! points are the one-shot class-table load and per-name double-checked
//! construction behind [`Holder`]s.

pub mod adaptive;
mod class;
mod error;
mod holder;
mod inject;
mod loader;
mod macros;
mod point;
mod registry;

pub use class::{
    ActivateInfo, ClassRecord, Constructor, DescriptorResource, ExtensionClass, ExtensionRole,
    WrapperConstructor, DESCRIPTOR_RESOURCES, EXTENSION_CLASSES, register_class,
};
pub use error::{ExtensionError, ExtensionResult, LifecycleError};
pub use holder::Holder;
pub use inject::{
    AggregateObjectFactory, DependencyRequest, ExtensionInjector, ObjectFactory, SpiObjectFactory,
};
pub use loader::{
    add_extension_directory, add_loading_strategy, extension_directories, loading_strategies,
    set_extension_directories, set_loading_strategies, LoadingStrategy, DIR_FRAMEWORK,
    DIR_INTERNAL, DIR_SERVICES,
};
pub use point::{Extension, ExtensionPoint, Lifecycle};
pub use registry::{destroy_all, ExtensionRegistry, Shared};

pub use trellis_core::constants::TRUE_VALUE;

/// The adaptive dispatcher synthesizer.
pub use trellis_macros::extension_point;

/// Re-exported for the registration macros.
pub use linkme;
