//! Closed-form rational-power windowing.

use super::Windowing;

/// Closed-form [`Windowing`] for the rational-power decay `(p, q, r, s)`.
///
/// Group `k` consists of `r * k^(p-1)` windows of length `s * k^q`, so the
/// marker ending group `k` is `r * s * (1^e + 2^e + ... + k^e)` with
/// `e = p + q - 1`. For `e <= 3` that sum has a polynomial closed form and
/// any marker can be located by binary search over `k` without walking the
/// window sequence. The boundaries agree exactly with
/// [`GenericWindowing`](super::GenericWindowing) over
/// [`RationalPowerLengths`](super::RationalPowerLengths).
#[derive(Debug, Clone)]
pub struct RationalPowerWindowing {
    p: u32,
    q: u32,
    r: u64,
    s: u64,
    exponent: u32,
}

/// `1^e + 2^e + ... + k^e`.
fn power_sum(e: u32, k: u128) -> u128 {
    match e {
        0 => k,
        1 => k * (k + 1) / 2,
        2 => k * (k + 1) * (2 * k + 1) / 6,
        _ => {
            let triangle = k * (k + 1) / 2;
            triangle * triangle
        }
    }
}

fn saturate(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl RationalPowerWindowing {
    /// Returns `None` when `p + q - 1 > 3`, which has no closed form here.
    ///
    /// Parameters must already satisfy `p >= 1`, `r >= 1` and `s >= 1`.
    pub fn new(p: u32, q: u32, r: u64, s: u64) -> Option<Self> {
        let exponent = (p + q).checked_sub(1)?;
        if exponent > 3 {
            return None;
        }
        Some(Self {
            p,
            q,
            r,
            s,
            exponent,
        })
    }

    /// Length of every window in group `k`.
    fn group_length(&self, k: u128) -> u128 {
        u128::from(self.s).saturating_mul(k.saturating_pow(self.q))
    }

    fn group_count(&self, k: u128) -> u128 {
        u128::from(self.r).saturating_mul(k.saturating_pow(self.p - 1))
    }

    /// Marker following the last window of group `k` (0 for `k == 0`).
    fn group_end(&self, k: u128) -> u128 {
        u128::from(self.r)
            .saturating_mul(u128::from(self.s))
            .saturating_mul(power_sum(self.exponent, k))
    }

    /// Group holding age `a`: smallest `k >= 1` with `group_end(k) > a`.
    fn group_of(&self, a: u128) -> u128 {
        let mut hi = 1u128;
        while self.group_end(hi) <= a {
            hi *= 2;
        }
        let mut lo = 1u128;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.group_end(mid) > a {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Last age covered by the window holding age `a`.
    fn window_end(&self, a: u128) -> u128 {
        let k = self.group_of(a);
        let base = self.group_end(k - 1);
        let length = self.group_length(k);
        let start = base + (a - base) / length * length;
        start + length - 1
    }

    /// First group whose windows hold at least `length` elements.
    fn first_group_of_length(&self, length: u128) -> Option<u128> {
        if self.q == 0 {
            return (length <= u128::from(self.s)).then_some(1);
        }
        let mut hi = 1u128;
        while self.group_length(hi) < length {
            hi *= 2;
        }
        let mut lo = 1u128;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.group_length(mid) >= length {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Some(lo)
    }
}

impl Windowing for RationalPowerWindowing {
    fn first_containing_time(&mut self, tl: u64, tr: u64, t: u64) -> Option<u64> {
        debug_assert!(tl <= tr && tr < t);
        let (tl, tr, t) = (u128::from(tl), u128::from(tr), u128::from(t));
        let l = t - 1 - tr;
        let r = t - 1 - tl;
        let k0 = self.first_group_of_length(tr - tl + 1)?;
        let first_marker = self.group_end(k0 - 1);
        if first_marker >= l {
            return Some(saturate(first_marker + tr + 1));
        }
        let end = self.window_end(l);
        if r <= end {
            Some(saturate(t))
        } else {
            Some(saturate(end + tr + 2))
        }
    }

    fn first_window_size(&self) -> u64 {
        self.s
    }

    fn windows_covering_upto(&mut self, n: u64) -> Vec<u64> {
        let n = u128::from(n);
        let mut lengths = Vec::new();
        let mut total = 0u128;
        let mut k = 1u128;
        loop {
            let length = self.group_length(k);
            let count = self.group_count(k);
            let fit = ((n - total) / length).min(count);
            for _ in 0..fit {
                lengths.push(saturate(length));
            }
            total += fit * length;
            if fit < count {
                return lengths;
            }
            k += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windowing::{GenericWindowing, RationalPowerLengths};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SHAPES: &[(u32, u32, u64, u64)] = &[
        (1, 0, 1, 1),
        (1, 0, 2, 4),
        (1, 1, 1, 1),
        (2, 1, 1, 3),
        (1, 1, 1, 3),
        (2, 0, 1, 2),
        (1, 2, 1, 1),
        (2, 2, 1, 1),
    ];

    #[test]
    fn test_no_closed_form_for_high_exponents() {
        assert!(RationalPowerWindowing::new(3, 2, 1, 1).is_none());
        assert!(RationalPowerWindowing::new(2, 2, 1, 1).is_some());
    }

    #[test]
    fn test_agrees_with_generic_windowing() {
        let mut rng = StdRng::seed_from_u64(7);
        for &(p, q, r, s) in SHAPES {
            let mut closed = RationalPowerWindowing::new(p, q, r, s).unwrap();
            let mut generic = GenericWindowing::new(RationalPowerLengths::new(p, q, r, s));
            assert_eq!(closed.first_window_size(), generic.first_window_size());
            for _ in 0..2000 {
                let t = rng.random_range(1..3000u64);
                let tr = rng.random_range(0..t);
                let tl = rng.random_range(0..=tr);
                assert_eq!(
                    closed.first_containing_time(tl, tr, t),
                    generic.first_containing_time(tl, tr, t),
                    "shape ({p},{q},{r},{s}) tl={tl} tr={tr} t={t}"
                );
            }
            for n in 0..200 {
                assert_eq!(
                    closed.windows_covering_upto(n),
                    generic.windows_covering_upto(n),
                    "shape ({p},{q},{r},{s}) n={n}"
                );
            }
        }
    }

    #[test]
    fn test_extreme_ages() {
        let mut closed = RationalPowerWindowing::new(1, 1, 1, 1).unwrap();
        let t = 1u64 << 40;
        let merge = closed.first_containing_time(t - 1000, t - 1, t).unwrap();
        assert!(merge >= t);
    }
}
