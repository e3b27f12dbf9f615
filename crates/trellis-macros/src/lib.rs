//! Procedural macros for Trellis extension points.
//!
//! The only public macro is [`macro@extension_point`], the compile-time
//! synthesizer for adaptive dispatchers: where the registry would otherwise
//! have to generate and compile dispatch code at runtime, the attribute emits
//! it while the extension point trait is being compiled.

mod point;

use proc_macro::TokenStream;

/// Marks a trait as a Trellis extension point.
///
/// The attribute generates the `ExtensionPoint` implementation for the
/// trait's object type and, unless disabled, a synthesized **adaptive
/// dispatcher**: a hidden type implementing the trait whose methods read a
/// name from their URL argument, resolve it through the extension registry,
/// and delegate.
///
/// # Arguments
///
/// - `default = "name"`: the point's default extension name.
/// - `adaptive = false`: suppress dispatcher synthesis (used when a
///   hand-written adaptive implementation is registered instead).
/// - `crate_path = some::path`: path to the `trellis-extension` crate
///   (defaults to `::trellis_extension`).
/// - `core_path = some::path`: path to the `trellis-core` crate
///   (defaults to `::trellis_core`).
///
/// # Method-level control
///
/// - `#[adaptive("key1", "key2")]` on a method sets the URL keys consulted,
///   in order. Without it, a single key is derived from the trait name by
///   splitting on case boundaries (`LoadBalance` → `load.balance`).
/// - `#[url]` on a parameter marks a value exposing `fn url(&self) -> &Url`
///   as the URL source; parameters typed `&Url` are picked up automatically.
///
/// # Dispatch contract
///
/// A method is dispatchable when it takes `&self`, has a URL source among
/// its parameters, and returns `Result<_, E>` with `E: From<ExtensionError>`.
/// When a `&dyn Invocation` parameter is present, its attachments are
/// consulted before the URL and parameter lookup is method-scoped.
/// Required methods that are not dispatchable are synthesized to fail with
/// `UnsupportedOperation`. When no method at all is dispatchable the point
/// synthesizes no dispatcher and `get_adaptive` reports the failure at
/// runtime.
///
/// # Example
///
/// ```rust,ignore
/// #[extension_point(default = "random")]
/// pub trait LoadBalance: Extension {
///     #[adaptive("loadbalance")]
///     fn select(
///         &self,
///         endpoints: &[Arc<dyn Endpoint>],
///         url: &Url,
///         invocation: &dyn Invocation,
///     ) -> Result<Arc<dyn Endpoint>, BalanceError>;
/// }
/// ```
#[proc_macro_attribute]
pub fn extension_point(attr: TokenStream, item: TokenStream) -> TokenStream {
    point::expand(attr, item)
}
