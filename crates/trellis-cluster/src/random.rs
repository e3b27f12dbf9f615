//! Weighted random selection, the default policy.

use std::sync::Arc;

use rand::Rng;

use trellis_core::{Endpoint, Invocation, Url};
use trellis_extension::{extension_class, Extension};

use crate::balance::{effective_weight, BalanceError, LoadBalance};

/// Picks a candidate at random, biased by warm-up-adjusted weight; equal
/// weights degrade to a uniform pick.
#[derive(Default)]
pub struct RandomBalance;

impl Extension for RandomBalance {}

impl LoadBalance for RandomBalance {
    fn pick(
        &self,
        endpoints: &[Arc<dyn Endpoint>],
        _url: &Url,
        invocation: &dyn Invocation,
    ) -> Result<Arc<dyn Endpoint>, BalanceError> {
        let mut rng = rand::thread_rng();
        pick_random(endpoints, invocation.method_name(), &mut |bound| {
            rng.gen_range(0..bound)
        })
    }
}

/// The selection algorithm, parameterized over the random draw.
pub(crate) fn pick_random(
    endpoints: &[Arc<dyn Endpoint>],
    method: &str,
    draw: &mut dyn FnMut(u64) -> u64,
) -> Result<Arc<dyn Endpoint>, BalanceError> {
    if endpoints.is_empty() {
        return Err(BalanceError::NoCandidates);
    }

    let weights: Vec<u64> = endpoints
        .iter()
        .map(|e| effective_weight(e.url(), method))
        .collect();
    let total: u64 = weights.iter().sum();
    let same_weight = weights.windows(2).all(|w| w[0] == w[1]);

    if total > 0 && !same_weight {
        let mut offset = draw(total) as i64;
        for (index, weight) in weights.iter().enumerate() {
            offset -= *weight as i64;
            if offset < 0 {
                return Ok(Arc::clone(&endpoints[index]));
            }
        }
    }

    let index = draw(endpoints.len() as u64) as usize;
    Ok(Arc::clone(&endpoints[index]))
}

extension_class!(
    RANDOM_BALANCE,
    dyn LoadBalance,
    "trellis_cluster::random::RandomBalance",
    normal = |_inj| Ok(Box::new(RandomBalance)),
);
