use crate::errors::{PricerError, PricerResult};
use crate::models::payoff::{BoundsPolicy, Cap, PayoffBounds};

/// Parameters of one cliquet pricing call. Never mutated by the engine.
///
/// JSON field names follow the desk convention (`S0`, `T`), so a request
/// round-trips through the trade registry and the HTTP layer unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricingRequest {
    #[serde(rename = "S0")]
    pub s0: f64,
    pub r: f64,
    pub sigma: f64,
    #[serde(rename = "T")]
    pub t: f64,
    pub n_resets: u32,
    pub n_paths: u64,
    #[serde(default)]
    pub local_floor: f64,
    #[serde(default)]
    pub local_cap: Cap,
    #[serde(default)]
    pub global_floor: f64,
    #[serde(default)]
    pub global_cap: Cap,
}

impl PricingRequest {
    /// Request with zero floors and no caps.
    pub fn new(s0: f64, r: f64, sigma: f64, t: f64, n_resets: u32, n_paths: u64) -> Self {
        Self {
            s0,
            r,
            sigma,
            t,
            n_resets,
            n_paths,
            local_floor: 0.0,
            local_cap: Cap::Unbounded,
            global_floor: 0.0,
            global_cap: Cap::Unbounded,
        }
    }

    pub fn with_local_bounds(mut self, floor: f64, cap: Option<f64>) -> Self {
        self.local_floor = floor;
        self.local_cap = cap.into();
        self
    }

    pub fn with_global_bounds(mut self, floor: f64, cap: Option<f64>) -> Self {
        self.global_floor = floor;
        self.global_cap = cap.into();
        self
    }

    #[inline]
    pub fn local_bounds(&self) -> PayoffBounds {
        PayoffBounds::new(self.local_floor, self.local_cap)
    }

    #[inline]
    pub fn global_bounds(&self) -> PayoffBounds {
        PayoffBounds::new(self.global_floor, self.global_cap)
    }

    /// Length of one reset period in years.
    #[inline]
    pub fn dt(&self) -> f64 {
        self.t / self.n_resets as f64
    }

    #[inline]
    pub fn discount_factor(&self) -> f64 {
        (-self.r * self.t).exp()
    }

    /// Reject anything that would make the simulation produce NaN/Inf.
    /// Runs before any random draw.
    pub fn validate(&self, policy: BoundsPolicy) -> PricerResult<()> {
        if !self.s0.is_finite() || self.s0 <= 0.0 {
            return Err(PricerError::invalid("S0", format!("must be finite and > 0, got {}", self.s0)));
        }
        if !self.r.is_finite() {
            return Err(PricerError::invalid("r", format!("must be finite, got {}", self.r)));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(PricerError::invalid("sigma", format!("must be finite and >= 0, got {}", self.sigma)));
        }
        if !self.t.is_finite() || self.t <= 0.0 {
            return Err(PricerError::invalid("T", format!("must be finite and > 0, got {}", self.t)));
        }
        // Each input can be finite while the discount factor or forward is not.
        if !self.discount_factor().is_finite() {
            return Err(PricerError::invalid(
                "r",
                format!("exp(-r*T) overflows for r={} T={}", self.r, self.t),
            ));
        }
        let forward = self.s0 * (self.r * self.t).exp();
        if !forward.is_finite() {
            return Err(PricerError::invalid(
                "S0",
                format!("forward S0*exp(r*T) overflows for S0={} r={} T={}", self.s0, self.r, self.t),
            ));
        }
        if self.n_resets == 0 {
            return Err(PricerError::invalid("n_resets", "must be > 0"));
        }
        if self.n_paths == 0 {
            return Err(PricerError::invalid("n_paths", "must be > 0"));
        }
        if !self.local_floor.is_finite() {
            return Err(PricerError::invalid("local_floor", "must be finite"));
        }
        if !self.global_floor.is_finite() {
            return Err(PricerError::invalid("global_floor", "must be finite"));
        }
        check_cap("local_cap", self.local_cap)?;
        check_cap("global_cap", self.global_cap)?;

        check_ordering("local", self.local_bounds(), policy)?;
        check_ordering("global", self.global_bounds(), policy)?;
        Ok(())
    }
}

fn check_cap(name: &'static str, cap: Cap) -> PricerResult<()> {
    match cap {
        Cap::At(c) if !c.is_finite() || c <= 0.0 => {
            Err(PricerError::invalid(name, format!("must be finite and > 0 when set, got {c}")))
        }
        _ => Ok(()),
    }
}

fn check_ordering(scope: &str, bounds: PayoffBounds, policy: BoundsPolicy) -> PricerResult<()> {
    if !bounds.is_inverted() {
        return Ok(());
    }
    let cap = bounds.cap.value().unwrap_or(f64::INFINITY);
    match policy {
        BoundsPolicy::Strict => Err(PricerError::InconsistentBounds(format!(
            "{scope}_floor {} > {scope}_cap {cap}",
            bounds.floor
        ))),
        BoundsPolicy::CapThenFloor => {
            tracing::warn!(
                scope,
                floor = bounds.floor,
                cap,
                "floor above cap: payoff pinned to floor"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PricingRequest {
        PricingRequest::new(100.0, 0.03, 0.2, 1.0, 12, 1_000)
    }

    #[test]
    fn test_valid_request_passes() {
        let req = base().with_local_bounds(0.0, Some(5.0)).with_global_bounds(0.0, Some(30.0));
        assert!(req.validate(BoundsPolicy::Strict).is_ok());
    }

    #[test]
    fn test_rejects_out_of_domain_inputs() {
        let cases = [
            PricingRequest { s0: 0.0, ..base() },
            PricingRequest { s0: f64::NAN, ..base() },
            PricingRequest { r: f64::INFINITY, ..base() },
            PricingRequest { sigma: -0.1, ..base() },
            PricingRequest { t: 0.0, ..base() },
            PricingRequest { t: f64::NEG_INFINITY, ..base() },
            PricingRequest { n_resets: 0, ..base() },
            PricingRequest { n_paths: 0, ..base() },
            PricingRequest { local_floor: f64::NAN, ..base() },
            base().with_local_bounds(0.0, Some(0.0)),
            base().with_global_bounds(0.0, Some(f64::INFINITY)),
        ];
        for req in cases {
            let err = req.validate(BoundsPolicy::CapThenFloor).unwrap_err();
            assert!(matches!(err, PricerError::InvalidParameter { .. }), "{req:?} -> {err}");
        }
    }

    #[test]
    fn test_rejects_overflowing_discount_or_forward() {
        let cases = [
            (PricingRequest { r: 800.0, ..base() }, "S0"),
            (PricingRequest { r: -800.0, ..base() }, "r"),
            (PricingRequest { s0: 1e308, ..base() }, "S0"),
            (PricingRequest { r: 8.0, t: 100.0, ..base() }, "S0"),
        ];
        for (req, param) in cases {
            match req.validate(BoundsPolicy::CapThenFloor) {
                Err(PricerError::InvalidParameter { name, .. }) => assert_eq!(name, param, "{req:?}"),
                other => panic!("{req:?} -> {other:?}"),
            }
        }
        // Large but representable.
        assert!(PricingRequest { r: 5.0, t: 10.0, ..base() }.validate(BoundsPolicy::Strict).is_ok());
    }

    #[test]
    fn test_zero_sigma_is_valid() {
        let req = PricingRequest { sigma: 0.0, ..base() };
        assert!(req.validate(BoundsPolicy::Strict).is_ok());
    }

    #[test]
    fn test_inverted_bounds_policy() {
        let req = base().with_local_bounds(6.0, Some(5.0));
        assert!(req.validate(BoundsPolicy::CapThenFloor).is_ok());
        assert!(matches!(
            req.validate(BoundsPolicy::Strict),
            Err(PricerError::InconsistentBounds(_))
        ));

        let req = base().with_global_bounds(40.0, Some(30.0));
        assert!(matches!(
            req.validate(BoundsPolicy::Strict),
            Err(PricerError::InconsistentBounds(_))
        ));
    }

    #[test]
    fn test_json_field_names() {
        let req = base().with_local_bounds(0.0, Some(5.0));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["S0"], 100.0);
        assert_eq!(v["T"], 1.0);
        assert_eq!(v["local_cap"], 5.0);
        assert!(v["global_cap"].is_null());

        let back: PricingRequest = serde_json::from_value(serde_json::json!({
            "S0": 100.0, "r": 0.03, "sigma": 0.2, "T": 1.0, "n_resets": 12, "n_paths": 1000
        }))
        .unwrap();
        assert_eq!(back, base());
    }
}
