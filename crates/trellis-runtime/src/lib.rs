//! # Trellis Runtime
//!
//! Process bootstrap and teardown for the Trellis framework: logging setup,
//! environment-driven configuration of the extension loader and executor
//! diagnostics, and the `destroy_all` teardown entry point.
//!
//! ```rust,ignore
//! fn main() {
//!     trellis_runtime::bootstrap();
//!     // ... serve ...
//!     trellis_runtime::shutdown();
//! }
//! ```

mod env;
pub mod logging;

pub use env::RuntimeEnv;

use tracing::info;

/// Reads the `TRELLIS_*` environment, applies it, and initializes logging.
pub fn bootstrap() {
    let env = RuntimeEnv::from_env();
    if let Some(directive) = env.log.clone() {
        logging::init_with_filter(&directive);
    } else {
        logging::init();
    }
    env.apply();
}

/// Tears down every extension registry, running each materialized
/// instance's destroy hook best-effort.
pub fn shutdown() {
    trellis_extension::destroy_all();
    info!("Trellis runtime shut down");
}
