// src/reduction.rs
//
// Reduction factor arithmetic for backend fast decode paths.

/// Number of times a fast decode path has already halved the source,
/// expressed so downstream geometry can rescale absolute-pixel math.
///
/// Returned by value from the decode step and threaded into the remaining
/// pure geometry functions; nothing mutates it through shared references.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReductionFactor {
    pub factor: u32,
}

impl ReductionFactor {
    pub fn new(factor: u32) -> Self {
        Self { factor }
    }

    /// Largest factor whose corresponding scale (2^-factor) is still >= the
    /// requested scale, capped at `max_factor`.
    ///
    /// A scale of 0.45 yields factor 1 (half size is the deepest reduction
    /// that still over-delivers); anything >= 1.0 yields factor 0.
    pub fn for_scale(scale: f64, max_factor: u32) -> Self {
        if scale <= 0.0 {
            return Self::new(max_factor);
        }
        let mut factor = 0;
        while factor < max_factor && Self::new(factor + 1).scale() >= scale {
            factor += 1;
        }
        Self::new(factor)
    }

    /// The scale this factor corresponds to: 2^-factor.
    pub fn scale(&self) -> f64 {
        1.0 / (1u64 << self.factor) as f64
    }

    pub fn is_none(&self) -> bool {
        self.factor == 0
    }
}
