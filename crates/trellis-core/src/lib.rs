//! # Trellis Core
//!
//! Foundation types for the Trellis RPC framework.
//!
//! Everything in Trellis is configured through [`Url`] descriptors: an
//! immutable bag of keyed parameters with method-scoped lookup. The remaining
//! types in this crate are the thin contracts the selection subsystems are
//! written against:
//!
//! - [`Invocation`]: one RPC call (method name + attachments), consumed by
//!   adaptive dispatch and load balancing.
//! - [`Endpoint`]: a selectable service endpoint carrying its configuration
//!   [`Url`].
//! - [`constants`]: the well-known parameter keys and their defaults.

pub mod constants;
mod endpoint;
mod invocation;
mod url;

pub use endpoint::Endpoint;
pub use invocation::{Invocation, RpcInvocation};
pub use url::{Url, UrlError};
