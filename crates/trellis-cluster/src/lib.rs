//! # Trellis Cluster
//!
//! Endpoint selection for cluster calls.
//!
//! [`LoadBalance`] is an extension point: the policy for a call is chosen by
//! the `loadbalance` URL key through the registry's adaptive dispatch. Two
//! policies ship built in:
//!
//! - `random` (the default): weighted random over all candidates.
//! - `least_active`: concurrency-aware selection over the candidates with
//!   the fewest active calls, weight-biased among ties.
//!
//! Both honor the warm-up curve: a freshly started endpoint's weight ramps
//! up linearly over its configured warm-up window.

pub mod balance;
mod least_active;
mod random;
mod status;

pub use balance::{effective_weight, BalanceError, LoadBalance};
pub use least_active::LeastActiveBalance;
pub use random::RandomBalance;
pub use status::{CallGuard, CallStatus};
