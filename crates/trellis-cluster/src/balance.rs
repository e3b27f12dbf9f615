//! The load-balance extension point and weight arithmetic.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use trellis_core::constants::{DEFAULT_WARMUP, DEFAULT_WEIGHT, TIMESTAMP_KEY, WARMUP_KEY, WEIGHT_KEY};
use trellis_core::{Endpoint, Invocation, Url};
use trellis_extension::{descriptor_resource, extension_point, Extension, ExtensionError};

/// Errors raised during endpoint selection.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// The caller passed an empty candidate list; the contract requires a
    /// non-empty one.
    #[error("cannot select from an empty endpoint list")]
    NoCandidates,

    /// Policy resolution through the registry failed.
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

/// A per-call endpoint selection policy.
///
/// `select` handles the list-shape shortcuts and delegates the real choice
/// to [`pick`](LoadBalance::pick); a single candidate is returned without
/// consulting the RNG.
#[extension_point(default = "random")]
pub trait LoadBalance: Extension {
    /// Picks one endpoint for the call.
    #[adaptive("loadbalance")]
    fn select(
        &self,
        endpoints: &[Arc<dyn Endpoint>],
        url: &Url,
        invocation: &dyn Invocation,
    ) -> Result<Arc<dyn Endpoint>, BalanceError> {
        match endpoints {
            [] => Err(BalanceError::NoCandidates),
            [single] => Ok(Arc::clone(single)),
            _ => self.pick(endpoints, url, invocation),
        }
    }

    /// The policy's choice among two or more candidates.
    #[adaptive("loadbalance")]
    fn pick(
        &self,
        endpoints: &[Arc<dyn Endpoint>],
        url: &Url,
        invocation: &dyn Invocation,
    ) -> Result<Arc<dyn Endpoint>, BalanceError>;
}

/// The endpoint's selection weight for a method, after the warm-up curve.
///
/// Weight comes from the endpoint URL's `weight` parameter (default 100).
/// When the URL carries a start `timestamp`, the weight ramps linearly from
/// 1 to its configured value over the `warmup` window (default ten minutes).
pub fn effective_weight(url: &Url, method: &str) -> u64 {
    let weight = url
        .method_parameter(method, WEIGHT_KEY)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_WEIGHT as i64);
    if weight <= 0 {
        return 0;
    }
    let weight = weight as u64;

    let Some(timestamp) = url.typed_parameter::<u64>(TIMESTAMP_KEY) else {
        return weight;
    };
    let now = now_millis();
    if now <= timestamp {
        return weight;
    }
    let uptime = now - timestamp;
    let warmup = url.positive_parameter(WARMUP_KEY, DEFAULT_WARMUP);
    if uptime >= warmup {
        return weight;
    }
    warmup_weight(uptime, warmup, weight)
}

/// The linear warm-up ramp, clamped to `[1, weight]`.
pub(crate) fn warmup_weight(uptime: u64, warmup: u64, weight: u64) -> u64 {
    let scaled = (uptime as f64 / (warmup as f64 / weight as f64)) as u64;
    scaled.clamp(1, weight)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

descriptor_resource!(
    LOAD_BALANCE_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "trellis_cluster.balance.LoadBalance",
    contents = include_str!(
        "../resources/META-INF/trellis/internal/trellis_cluster.balance.LoadBalance"
    ),
);
