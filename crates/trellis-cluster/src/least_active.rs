//! Least-active selection: prefer the endpoints with the fewest in-flight
//! calls, breaking ties by warm-up-adjusted weight.

use std::sync::Arc;

use rand::Rng;

use trellis_core::{Endpoint, Invocation, Url};
use trellis_extension::{extension_class, Extension};

use crate::balance::{effective_weight, BalanceError, LoadBalance};
use crate::status::CallStatus;

/// Selects among the endpoints whose active-call count is minimal.
///
/// With several least-active candidates of unequal weight the choice is
/// weight-biased; equal (or all-zero) weights fall back to a uniform pick.
/// One pass over the candidates, two scratch arrays.
#[derive(Default)]
pub struct LeastActiveBalance;

impl Extension for LeastActiveBalance {}

impl LoadBalance for LeastActiveBalance {
    fn pick(
        &self,
        endpoints: &[Arc<dyn Endpoint>],
        _url: &Url,
        invocation: &dyn Invocation,
    ) -> Result<Arc<dyn Endpoint>, BalanceError> {
        let mut rng = rand::thread_rng();
        pick_least_active(endpoints, invocation.method_name(), &mut |bound| {
            rng.gen_range(0..bound)
        })
    }
}

/// The selection algorithm, parameterized over the random draw for
/// deterministic tests. `draw(bound)` must return a value in `[0, bound)`.
pub(crate) fn pick_least_active(
    endpoints: &[Arc<dyn Endpoint>],
    method: &str,
    draw: &mut dyn FnMut(u64) -> u64,
) -> Result<Arc<dyn Endpoint>, BalanceError> {
    if endpoints.is_empty() {
        return Err(BalanceError::NoCandidates);
    }

    let n = endpoints.len();
    // Indexes of the least-active candidates and every candidate's weight.
    let mut least_indexes = vec![0usize; n];
    let mut weights = vec![0u64; n];
    let mut least_active: Option<u64> = None;
    let mut least_count = 0usize;
    let mut total_weight = 0u64;
    let mut first_weight = 0u64;
    let mut same_weight = true;

    for (index, endpoint) in endpoints.iter().enumerate() {
        let active = CallStatus::active_count(endpoint.url(), method);
        let weight = effective_weight(endpoint.url(), method);
        weights[index] = weight;

        if least_active.is_none() || Some(active) < least_active {
            least_active = Some(active);
            least_count = 1;
            least_indexes[0] = index;
            total_weight = weight;
            first_weight = weight;
            same_weight = true;
        } else if Some(active) == least_active {
            least_indexes[least_count] = index;
            least_count += 1;
            total_weight += weight;
            if same_weight && weight != first_weight {
                same_weight = false;
            }
        }
    }

    if least_count == 1 {
        return Ok(Arc::clone(&endpoints[least_indexes[0]]));
    }

    if !same_weight && total_weight > 0 {
        let mut offset = draw(total_weight) as i64;
        for &index in &least_indexes[..least_count] {
            offset -= weights[index] as i64;
            if offset < 0 {
                return Ok(Arc::clone(&endpoints[index]));
            }
        }
    }

    let index = least_indexes[draw(least_count as u64) as usize];
    Ok(Arc::clone(&endpoints[index]))
}

extension_class!(
    LEAST_ACTIVE_BALANCE,
    dyn LoadBalance,
    "trellis_cluster::least_active::LeastActiveBalance",
    normal = |_inj| Ok(Box::new(LeastActiveBalance)),
);
