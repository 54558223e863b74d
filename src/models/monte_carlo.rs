use crate::errors::{PricerError, PricerResult};
use crate::models::payoff::{BoundsPolicy, PayoffBounds};
use crate::models::{CancelToken, CliquetEstimator, Estimate};
use crate::request::PricingRequest;
use portable_atomic::{AtomicU64, Ordering};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

/// Paths per independent random stream. Fixed so the chunk layout (and hence
/// the result for a given seed) does not depend on the number of workers.
pub const CHUNK_PATHS: u64 = 4096;

/// Paths between cancellation checks inside a chunk.
const CANCEL_CHECK_EVERY: u64 = 256;

/// Spreads neighbouring base seeds apart so seed `s` and `s + 1` share no chunk streams.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Monte Carlo cliquet pricer under discretized GBM.
///
/// Each path walks `n_resets` periods:
///
/// S_new = S * exp((r - sigma^2/2)*dt + sigma*sqrt(dt)*z),  z ~ N(0,1)
///
/// and books `local.apply(max(S_new - S, 0))` before resetting the strike to
/// `S_new`. The path total goes through `global.apply`, and the price is
/// `exp(-r*T) * mean(total)`. Discounting is applied once to the aggregate
/// mean; period cashflows are treated as paid at maturity.
///
/// Paths are split into chunks of `CHUNK_PATHS`; chunk `k` owns a `StdRng`
/// seeded from `(seed, k)`. Chunks run on rayon and are reduced in chunk order,
/// so a seed reproduces the identical price on any thread count.
#[derive(Debug, Clone)]
pub struct MonteCarloCliquet {
    seed: u64,
    policy: BoundsPolicy,
}

impl MonteCarloCliquet {
    pub fn new(seed: u64) -> Self {
        Self { seed, policy: BoundsPolicy::default() }
    }

    /// Seed drawn from the thread RNG.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn with_policy(mut self, policy: BoundsPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Scalar price, no cancellation.
    pub fn price(&self, request: &PricingRequest) -> PricerResult<f64> {
        self.simulate(request, &CancelToken::new()).map(|e| e.price)
    }

    pub fn simulate(&self, request: &PricingRequest, cancel: &CancelToken) -> PricerResult<Estimate> {
        request.validate(self.policy)?;

        let params = PathParams::from_request(request);
        let n_paths = request.n_paths;
        let n_chunks = n_paths.div_ceil(CHUNK_PATHS);
        let paths_done = AtomicU64::new(0);

        let chunks: Option<Vec<PayoffSums>> = (0..n_chunks)
            .into_par_iter()
            .map(|k| {
                let len = CHUNK_PATHS.min(n_paths - k * CHUNK_PATHS);
                let mut rng = StdRng::seed_from_u64(chunk_seed(self.seed, k));
                let sums = simulate_chunk(&params, &mut rng, len, cancel)?;
                paths_done.fetch_add(len, Ordering::Relaxed);
                Some(sums)
            })
            .collect();

        let Some(chunks) = chunks else {
            let done = paths_done.load(Ordering::Relaxed);
            tracing::info!(paths_done = done, n_paths, "monte carlo run cancelled");
            return Err(PricerError::Cancelled { paths_done: done });
        };

        // In-order reduction keeps the floating-point sum reproducible.
        let total = chunks.into_iter().fold(PayoffSums::default(), PayoffSums::merge);

        let discount = request.discount_factor();
        let estimate = Estimate {
            price: discount * total.mean(),
            std_error: Some(discount * total.std_error()),
            n_paths: Some(total.paths),
            seed: Some(self.seed),
        };
        if !estimate.price.is_finite() || estimate.std_error.is_some_and(|se| !se.is_finite()) {
            tracing::warn!(seed = self.seed, price = estimate.price, "monte carlo run overflowed");
            return Err(PricerError::invalid(
                "request",
                format!("path payoffs overflow f64 (S0={}, sigma={})", request.s0, request.sigma),
            ));
        }

        tracing::debug!(
            seed = self.seed,
            n_paths,
            n_resets = request.n_resets,
            price = estimate.price,
            "monte carlo run complete"
        );

        Ok(estimate)
    }
}

impl CliquetEstimator for MonteCarloCliquet {
    #[inline]
    fn name(&self) -> &'static str {
        "mc"
    }

    fn estimate(&self, request: &PricingRequest, cancel: &CancelToken) -> PricerResult<Estimate> {
        self.simulate(request, cancel)
    }
}

/// Price a cliquet with a fixed seed. Same seed, same request, same price.
pub fn price(request: &PricingRequest, seed: u64) -> PricerResult<f64> {
    MonteCarloCliquet::new(seed).price(request)
}

#[inline]
fn chunk_seed(seed: u64, chunk: u64) -> u64 {
    seed.wrapping_mul(SEED_STRIDE).wrapping_add(chunk)
}

/// Per-call constants of the path loop. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy)]
struct PathParams {
    s0: f64,
    drift: f64,
    diffusion: f64,
    n_resets: u32,
    local: PayoffBounds,
    global: PayoffBounds,
}

impl PathParams {
    fn from_request(req: &PricingRequest) -> Self {
        let dt = req.dt();
        Self {
            s0: req.s0,
            drift: (req.r - 0.5 * req.sigma * req.sigma) * dt,
            diffusion: req.sigma * dt.sqrt(),
            n_resets: req.n_resets,
            local: req.local_bounds(),
            global: req.global_bounds(),
        }
    }
}

/// One path: O(1) state, one scalar out.
#[inline]
fn simulate_path(p: &PathParams, rng: &mut StdRng) -> f64 {
    let mut s = p.s0;
    let mut total = 0.0;
    for _ in 0..p.n_resets {
        let z: f64 = StandardNormal.sample(rng);
        let s_new = s * (p.drift + p.diffusion * z).exp();
        let gain = (s_new - s).max(0.0);
        total += p.local.apply(gain);
        // Reset: next period's strike is this period's close.
        s = s_new;
    }
    p.global.apply(total)
}

/// `None` if cancelled mid-chunk.
fn simulate_chunk(
    p: &PathParams,
    rng: &mut StdRng,
    len: u64,
    cancel: &CancelToken,
) -> Option<PayoffSums> {
    let mut sums = PayoffSums::default();
    for i in 0..len {
        if i % CANCEL_CHECK_EVERY == 0 && cancel.is_cancelled() {
            return None;
        }
        sums.push(simulate_path(p, rng));
    }
    Some(sums)
}

/// Running payoff sum plus Welford moments (mean, M2). The price is
/// `sum / paths`; the standard error comes from `m2`.
#[derive(Debug, Clone, Copy, Default)]
struct PayoffSums {
    sum: f64,
    mean: f64,
    m2: f64,
    paths: u64,
}

impl PayoffSums {
    #[inline]
    fn push(&mut self, payoff: f64) {
        self.paths += 1;
        self.sum += payoff;
        let delta = payoff - self.mean;
        self.mean += delta / self.paths as f64;
        self.m2 += delta * (payoff - self.mean);
    }

    /// Chan et al. pairwise combination of two chunks' moments.
    fn merge(self, other: Self) -> Self {
        if self.paths == 0 {
            return other;
        }
        if other.paths == 0 {
            return self;
        }
        let (na, nb) = (self.paths as f64, other.paths as f64);
        let n = na + nb;
        let delta = other.mean - self.mean;
        Self {
            sum: self.sum + other.sum,
            mean: self.mean + delta * nb / n,
            m2: self.m2 + other.m2 + delta * delta * na * nb / n,
            paths: self.paths + other.paths,
        }
    }

    fn mean(&self) -> f64 {
        self.sum / self.paths as f64
    }

    /// Standard error of the undiscounted mean.
    fn std_error(&self) -> f64 {
        if self.paths < 2 {
            return 0.0;
        }
        let n = self.paths as f64;
        let var = (self.m2 / (n - 1.0)).max(0.0);
        (var / n).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn desk_trade(n_paths: u64) -> PricingRequest {
        PricingRequest::new(100.0, 0.03, 0.2, 1.0, 12, n_paths)
            .with_local_bounds(0.0, Some(5.0))
            .with_global_bounds(0.0, Some(30.0))
    }

    #[test]
    fn test_reference_scenario_range_and_reproducibility() {
        let req = desk_trade(100_000);
        let a = price(&req, 42).unwrap();
        let b = price(&req, 42).unwrap();
        assert!((18.5..20.5).contains(&a), "reference price={a} outside expected range");
        assert_eq!(a.to_bits(), b.to_bits(), "same seed must reproduce the same price");

        let c = price(&req, 43).unwrap();
        assert_ne!(a.to_bits(), c.to_bits());
        assert!((a - c).abs() < 0.2, "seeds 42/43 disagree: {a} vs {c}");
    }

    #[test]
    fn test_result_independent_of_thread_count() {
        let req = desk_trade(3 * CHUNK_PATHS + 17);
        let engine = MonteCarloCliquet::new(7);
        let pooled = engine.price(&req).unwrap();
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| engine.price(&req).unwrap());
        assert_eq!(pooled.to_bits(), single.to_bits());
    }

    #[test]
    fn test_zero_vol_zero_rate_is_exactly_zero() {
        for n_paths in [1, 10, 5_000] {
            let req = PricingRequest::new(100.0, 0.0, 0.0, 1.0, 12, n_paths);
            assert_eq!(price(&req, 1).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_zero_vol_positive_rate_is_deterministic() {
        let req = PricingRequest::new(100.0, 0.05, 0.0, 2.0, 8, 100);
        let p = price(&req, 1).unwrap();
        // Telescoping gains: S0*(e^{rT} - 1), discounted once.
        let expected = (-0.05_f64 * 2.0).exp() * 100.0 * ((0.05_f64 * 2.0).exp() - 1.0);
        assert_relative_eq!(p, expected, max_relative = 1e-9);

        let est = MonteCarloCliquet::new(1).simulate(&req, &CancelToken::new()).unwrap();
        assert!(est.std_error.unwrap() < 1e-6);
    }

    #[test]
    fn test_floor_equal_to_cap_pins_every_period() {
        let req = PricingRequest::new(100.0, 0.03, 0.4, 1.0, 12, 2_000).with_local_bounds(2.0, Some(2.0));
        let p = price(&req, 9).unwrap();
        assert_relative_eq!(p, req.discount_factor() * 24.0, max_relative = 1e-12);
    }

    #[test]
    fn test_inverted_local_bounds_pin_to_floor_in_lenient_mode() {
        let req = PricingRequest::new(100.0, 0.03, 0.2, 1.0, 12, 1_000).with_local_bounds(6.0, Some(5.0));
        let p = price(&req, 3).unwrap();
        assert_relative_eq!(p, req.discount_factor() * 72.0, max_relative = 1e-12);

        let strict = MonteCarloCliquet::new(3).with_policy(BoundsPolicy::Strict);
        assert!(matches!(strict.price(&req), Err(PricerError::InconsistentBounds(_))));
    }

    #[test]
    fn test_global_floor_applies_after_accumulation() {
        let req = PricingRequest::new(100.0, 0.0, 0.0, 1.0, 4, 10).with_global_bounds(7.5, None);
        assert_relative_eq!(price(&req, 0).unwrap(), 7.5, max_relative = 1e-12);
    }

    #[test]
    fn test_monotone_in_local_cap() {
        let caps = [Some(0.5), Some(1.0), Some(2.5), Some(5.0), None];
        let prices: Vec<f64> = caps
            .iter()
            .map(|&cap| {
                let req = PricingRequest::new(100.0, 0.03, 0.25, 1.0, 12, 8_000).with_local_bounds(0.0, cap);
                price(&req, 11).unwrap()
            })
            .collect();
        for w in prices.windows(2) {
            assert!(w[0] <= w[1], "raising local cap lowered price: {prices:?}");
        }
    }

    #[test]
    fn test_monotone_in_global_cap() {
        let caps = [Some(5.0), Some(15.0), Some(30.0), None];
        let prices: Vec<f64> = caps
            .iter()
            .map(|&cap| {
                let req = PricingRequest::new(100.0, 0.03, 0.25, 1.0, 12, 8_000)
                    .with_local_bounds(0.0, Some(5.0))
                    .with_global_bounds(0.0, cap);
                price(&req, 11).unwrap()
            })
            .collect();
        for w in prices.windows(2) {
            assert!(w[0] <= w[1], "raising global cap lowered price: {prices:?}");
        }
    }

    #[test]
    fn test_scale_homogeneous_in_s0_when_unbounded() {
        let base = PricingRequest::new(100.0, 0.03, 0.2, 1.0, 12, 10_000);
        let scaled = PricingRequest { s0: 250.0, ..base.clone() };
        let p1 = price(&base, 5).unwrap();
        let p2 = price(&scaled, 5).unwrap();
        assert_relative_eq!(p2, 2.5 * p1, max_relative = 1e-9);
    }

    #[test]
    fn test_converges_as_paths_grow() {
        let small = PricingRequest::new(100.0, 0.03, 0.2, 1.0, 4, 10_000).with_local_bounds(0.0, Some(5.0));
        let large = PricingRequest { n_paths: 1_000_000, ..small.clone() };
        let cancel = CancelToken::new();

        let a = MonteCarloCliquet::new(21).simulate(&small, &cancel).unwrap();
        let b = MonteCarloCliquet::new(8_675_309).simulate(&large, &cancel).unwrap();

        let se_a = a.std_error.unwrap();
        let se_b = b.std_error.unwrap();
        assert!(se_b < se_a / 5.0, "std error should shrink ~1/sqrt(n): {se_a} vs {se_b}");

        let tol = 4.0 * (se_a * se_a + se_b * se_b).sqrt();
        assert!((a.price - b.price).abs() < tol, "{} vs {} (tol {tol})", a.price, b.price);
    }

    #[test]
    fn test_partial_last_chunk_counts_every_path() {
        let req = desk_trade(CHUNK_PATHS + 1);
        let est = MonteCarloCliquet::new(2).simulate(&req, &CancelToken::new()).unwrap();
        assert_eq!(est.n_paths, Some(CHUNK_PATHS + 1));
        assert_eq!(est.seed, Some(2));
        assert!(est.price > 0.0);
    }

    #[test]
    fn test_cancelled_run_returns_no_price() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let res = MonteCarloCliquet::new(1).simulate(&desk_trade(50_000), &cancel);
        assert!(matches!(res, Err(PricerError::Cancelled { .. })));
    }

    #[test]
    fn test_overflowing_inputs_are_rejected() {
        let cases = [
            PricingRequest::new(100.0, 800.0, 0.2, 1.0, 1, 10),
            PricingRequest::new(100.0, -800.0, 0.2, 1.0, 1, 10).with_local_bounds(1.0, None),
            PricingRequest::new(1e308, 0.03, 0.2, 1.0, 12, 10),
        ];
        for req in cases {
            match price(&req, 1) {
                Err(PricerError::InvalidParameter { .. }) => {}
                other => panic!("{req:?} -> {other:?}"),
            }
        }
    }

    #[test]
    fn test_payoff_overflow_is_an_error_not_a_price() {
        // Forward is representable, but uncapped path gains and their sum are not.
        let req = PricingRequest::new(1e307, 0.0, 2.0, 1.0, 1, 10_000);
        assert!(req.validate(BoundsPolicy::Strict).is_ok());
        match MonteCarloCliquet::new(4).simulate(&req, &CancelToken::new()) {
            Err(PricerError::InvalidParameter { name: "request", .. }) => {}
            other => panic!("expected overflow rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_std_error_stable_for_payoffs_far_from_zero() {
        let offset = 1e9;
        let mut a = PayoffSums::default();
        let mut b = PayoffSums::default();
        let mut single = PayoffSums::default();
        for (i, x) in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0].into_iter().enumerate() {
            single.push(offset + x);
            if i < 3 { a.push(offset + x) } else { b.push(offset + x) }
        }
        let merged = PayoffSums::default().merge(a).merge(b);

        // Sample variance of 1..=8 is 6, so the std error is sqrt(6/8).
        let expected = (6.0_f64 / 8.0).sqrt();
        assert_relative_eq!(single.std_error(), expected, max_relative = 1e-6);
        assert_relative_eq!(merged.std_error(), expected, max_relative = 1e-6);
        assert_eq!(merged.paths, 8);
        assert_relative_eq!(merged.mean(), offset + 4.5, max_relative = 1e-15);
    }

    #[test]
    fn test_invalid_request_rejected_before_simulation() {
        let req = PricingRequest::new(100.0, 0.03, f64::NAN, 1.0, 12, 1_000);
        assert!(matches!(price(&req, 1), Err(PricerError::InvalidParameter { name: "sigma", .. })));
    }
}
