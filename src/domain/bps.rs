//! Fixed-point percentages scaled to 1e5 (100_000 = 100%).

use serde::{Deserialize, Serialize};

/// Percentage in basis units of 1e5.
///
/// `Bps(100_000)` is 100%, `Bps(1)` is 0.001%. Applying a rate floors, so any
/// rounding remainder stays with the vault.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Bps(pub u32);

impl Bps {
    pub const SCALE: u32 = 100_000;
    pub const ZERO: Bps = Bps(0);
    pub const FULL: Bps = Bps(Self::SCALE);

    pub fn new(value: u32) -> Self {
        Bps(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// A fee rate must stay strictly below 100%.
    pub fn is_valid_fee(&self) -> bool {
        self.0 < Self::SCALE
    }

    /// `floor(amount * self / 100_000)`; `None` on overflow.
    pub fn apply(&self, amount: u128) -> Option<u128> {
        mul_div_floor(amount, u128::from(self.0), u128::from(Self::SCALE))
    }

    /// Sum of a slice of percentages, widened so it cannot wrap.
    pub fn sum(values: &[Bps]) -> u64 {
        values.iter().map(|b| u64::from(b.0)).sum()
    }

    /// Whether a list of allocations adds up to exactly 100%.
    pub fn sums_to_full(values: &[Bps]) -> bool {
        Self::sum(values) == u64::from(Self::SCALE)
    }

    /// Share of `part` in `whole`, floored, or zero when `whole` is zero.
    pub fn ratio(part: u128, whole: u128) -> Option<Bps> {
        if whole == 0 {
            return Some(Bps::ZERO);
        }
        let bps = mul_div_floor(part, u128::from(Self::SCALE), whole)?;
        u32::try_from(bps).ok().map(Bps)
    }
}

impl std::fmt::Display for Bps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, Self::SCALE)
    }
}

/// `floor(a * b / denominator)` with overflow and zero-denominator checks.
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    a.checked_mul(b).map(|product| product / denominator)
}
