//! Window length sequences.

/// Infinite, non-decreasing sequence of window lengths, newest window first.
pub trait WindowLengths: Send + Sync {
    /// Returns the next length. Never zero, never smaller than the previous
    /// length.
    fn next_length(&mut self) -> u64;

    /// Upper bound on any length this sequence will ever return.
    fn max_length(&self) -> u64 {
        u64::MAX
    }
}

/// `ceil(base^k)` for `k = 0, 1, 2, ...`.
#[derive(Debug, Clone)]
pub struct ExponentialLengths {
    next: f64,
    base: f64,
}

impl ExponentialLengths {
    /// Creates the sequence. `base` must be at least 1.
    pub fn new(base: f64) -> Self {
        Self { next: 1.0, base }
    }
}

impl WindowLengths for ExponentialLengths {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn next_length(&mut self) -> u64 {
        let current = self.next;
        self.next *= self.base;
        if current >= u64::MAX as f64 {
            u64::MAX
        } else {
            current.ceil() as u64
        }
    }

    fn max_length(&self) -> u64 {
        if self.base > 1.0 { u64::MAX } else { 1 }
    }
}

/// For `k = 1, 2, ...`: `r * k^(p-1)` windows, each of length `s * k^q`.
#[derive(Debug, Clone)]
pub struct RationalPowerLengths {
    p: u32,
    q: u32,
    r: u64,
    s: u64,
    k: u64,
    left_in_group: u64,
}

impl RationalPowerLengths {
    /// Creates the sequence. Requires `p >= 1`, `r >= 1` and `s >= 1`.
    pub fn new(p: u32, q: u32, r: u64, s: u64) -> Self {
        Self {
            p,
            q,
            r,
            s,
            k: 1,
            left_in_group: r,
        }
    }
}

impl WindowLengths for RationalPowerLengths {
    fn next_length(&mut self) -> u64 {
        if self.left_in_group == 0 {
            self.k += 1;
            self.left_in_group = self.r.saturating_mul(self.k.saturating_pow(self.p - 1));
        }
        self.left_in_group -= 1;
        self.s.saturating_mul(self.k.saturating_pow(self.q))
    }

    fn max_length(&self) -> u64 {
        if self.q == 0 { self.s } else { u64::MAX }
    }
}

/// Every window has the same length.
#[derive(Debug, Clone)]
pub struct ConstantLengths {
    length: u64,
}

impl ConstantLengths {
    /// Creates the sequence. `length` must be at least 1.
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

impl WindowLengths for ConstantLengths {
    fn next_length(&mut self) -> u64 {
        self.length
    }

    fn max_length(&self) -> u64 {
        self.length
    }
}
