//! Floor/cap policy for cliquet payoffs.
//!
//! The same rule is used per period (local bounds) and on the accumulated
//! total (global bounds): apply the cap if set, then the floor. This is not a
//! symmetric clamp. When the floor sits above the cap the result is pinned to
//! the floor regardless of the input.

/// Upper bound on a payoff contribution. Absent means uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Cap {
    #[default]
    Unbounded,
    At(f64),
}

impl Cap {
    #[inline]
    pub fn value(&self) -> Option<f64> {
        match *self {
            Cap::Unbounded => None,
            Cap::At(c) => Some(c),
        }
    }

    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Cap::Unbounded => x,
            Cap::At(c) => x.min(c),
        }
    }
}

impl From<Option<f64>> for Cap {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cap::Unbounded, Cap::At)
    }
}

impl From<Cap> for Option<f64> {
    fn from(c: Cap) -> Self {
        c.value()
    }
}

/// How to treat a floor configured above its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    /// Keep cap-then-floor precedence; an inverted pair pins the payoff to the floor.
    #[default]
    CapThenFloor,
    /// Reject inverted floor/cap pairs before simulation.
    Strict,
}

/// A floor/cap pair, stack-allocated and Copy so the hot loop holds it by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoffBounds {
    pub floor: f64,
    pub cap: Cap,
}

impl PayoffBounds {
    pub fn new(floor: f64, cap: Cap) -> Self {
        Self { floor, cap }
    }

    /// Cap first, floor second.
    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        self.cap.apply(x).max(self.floor)
    }

    /// True when the floor exceeds the cap, i.e. every input maps to the floor.
    #[inline]
    pub fn is_inverted(&self) -> bool {
        matches!(self.cap, Cap::At(c) if self.floor > c)
    }
}
