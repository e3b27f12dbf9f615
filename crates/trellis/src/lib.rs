//! # Trellis
//!
//! A URL-configured RPC framework core whose behavior is assembled at
//! runtime from pluggable implementations.
//!
//! The crates compose in layers:
//!
//! - [`core`](trellis_core): the [`Url`] parameter bag and the
//!   [`Invocation`]/[`Endpoint`] contracts.
//! - [`extension`](trellis_extension): the registry (descriptor discovery,
//!   singleton instances, wrapper chains, activation, adaptive dispatch).
//! - [`cluster`](trellis_cluster): endpoint selection policies.
//! - [`executor`](trellis_executor): URL-configured thread pools.
//! - [`cache`](trellis_cache): the result-cache factory contract.
//! - [`runtime`](trellis_runtime): bootstrap and teardown.
//!
//! ## Selecting an implementation by URL
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis::{ExtensionRegistry, LoadBalance, RpcInvocation, Url};
//!
//! let url: Url = "trpc://10.0.0.1:20880/demo?loadbalance=least_active".parse()?;
//! let balancer = ExtensionRegistry::<dyn LoadBalance>::global().get_adaptive()?;
//! let chosen = balancer.select(&endpoints, &url, &RpcInvocation::new("find"))?;
//! ```

pub use trellis_core::{constants, Endpoint, Invocation, RpcInvocation, Url, UrlError};

pub use trellis_extension::{
    destroy_all, extension_point, ActivateInfo, Extension, ExtensionClass, ExtensionError,
    ExtensionInjector, ExtensionPoint, ExtensionRegistry, Lifecycle, LifecycleError,
    LoadingStrategy, ObjectFactory,
};

pub use trellis_cluster::{
    BalanceError, CallStatus, LeastActiveBalance, LoadBalance, RandomBalance,
};

pub use trellis_executor::{Executor, ExecutorError, ThreadPool};

pub use trellis_cache::{Cache, CacheError, CacheFactory};

pub use trellis_runtime::{bootstrap, shutdown, RuntimeEnv};
