//! The `params` module defines the ring and noise parameters shared by
//! both protocol participants, together with the construction-time
//! validation that keeps the rounding step correct.
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use thiserror::Error;

/// Errors raised while constructing a [`Parameters`] set. All of them
/// are fatal: an inconsistent parameter set is never clamped into a
/// usable one.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
  #[error("ring dimension must be a nonzero power of two, got {0}")]
  InvalidDimension(usize),
  #[error("modulus must be an odd integer larger than twice the target modulus")]
  InvalidModulus,
  #[error("target modulus must be a power of two no smaller than 2, got {0}")]
  InvalidTargetModulus(u64),
  #[error("noise bounds [{lo}, {hi}] must straddle zero and be non-empty")]
  InvalidNoiseBound { lo: i64, hi: i64 },
  #[error("worst-case noise {noise} reaches half the rounding interval (q/(2p) = {threshold})")]
  NoiseBudgetExceeded { noise: BigUint, threshold: BigUint },
}

/// The `Parameters` struct carries the immutable configuration of one
/// protocol instance: the ring `Z_q[X]/(X^n + 1)`, the signed range the
/// small secrets and noise terms are sampled from, the statistical
/// security exponent `sec` driving the evaluator's masking bound
/// `B = 2n * 2^sec`, and the rounding target modulus `p`.
///
/// Both participants must share one `Parameters` value for a protocol
/// run; it is cheap to clone and never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
  n: usize,
  q: BigUint,
  noise_lo: i64,
  noise_hi: i64,
  sec: u32,
  p: u64,
  mask_bound: BigUint,
  noise_total: BigUint,
  coeff_width: usize,
}

impl Parameters {
  /// Validates and builds a parameter set with the default rounding
  /// target modulus `p = 2` (one output bit per coefficient).
  pub fn new(
    n: usize,
    q: BigUint,
    noise_bound: (i64, i64),
    sec: u32,
  ) -> Result<Self, ParameterError> {
    Self::new_with_target(n, q, noise_bound, sec, 2)
  }

  /// Validates and builds a parameter set with an explicit rounding
  /// target modulus.
  ///
  /// The check that matters for correctness: the worst case of the
  /// accumulated noise `e'*k - e*s + E` is `2n*u^2 + B` coefficient-wise
  /// (`u` the largest small-noise magnitude). Rounding recovers the same
  /// lattice point on both sides only while that total stays strictly
  /// below half the rounding interval `q/(2p)`.
  pub fn new_with_target(
    n: usize,
    q: BigUint,
    noise_bound: (i64, i64),
    sec: u32,
    p: u64,
  ) -> Result<Self, ParameterError> {
    let (lo, hi) = noise_bound;
    if n == 0 || !n.is_power_of_two() {
      return Err(ParameterError::InvalidDimension(n));
    }
    if p < 2 || !p.is_power_of_two() {
      return Err(ParameterError::InvalidTargetModulus(p));
    }
    if !q.bit(0) || q <= BigUint::from(2 * p as u128) {
      return Err(ParameterError::InvalidModulus);
    }
    if lo > 0 || hi < 0 || (lo == 0 && hi == 0) {
      return Err(ParameterError::InvalidNoiseBound { lo, hi });
    }

    let u = lo.unsigned_abs().max(hi as u64) as u128;
    let mask_bound = BigUint::from(2 * n as u128) << sec;
    let noise_total = BigUint::from(2 * n as u128) * u * u + &mask_bound;
    // eta < q/(2p), compared without the division
    if &noise_total * (2u128 * p as u128) >= q {
      return Err(ParameterError::NoiseBudgetExceeded {
        noise: noise_total,
        threshold: &q / (2u128 * p as u128),
      });
    }

    let coeff_width = ((q.bits() + 7) / 8) as usize;
    Ok(Self {
      n,
      q,
      noise_lo: lo,
      noise_hi: hi,
      sec,
      p,
      mask_bound,
      noise_total,
      coeff_width,
    })
  }

  /// The parameter set the protocol is designed around: `n = 2^12`,
  /// `q` the first prime above `2^75`, ternary small noise and a `2^40`
  /// statistical masking margin.
  pub fn recommended() -> Self {
    let q = BigUint::from(37_778_931_862_957_161_709_601u128); // nextprime(2^75)
    Self::new(1 << 12, q, (-1, 1), 40)
      .expect("recommended parameter set validates")
  }

  /// A small-ring variant of [`Parameters::recommended`] keeping the
  /// same modulus and masking margin. The ring is far too small to be
  /// secure; it exists so tests and examples finish quickly while the
  /// rounding failure probability stays negligible.
  pub fn insecure_testing() -> Self {
    let q = BigUint::from(37_778_931_862_957_161_709_601u128);
    Self::new(64, q, (-1, 1), 40)
      .expect("testing parameter set validates")
  }

  /// Ring dimension `n`.
  pub fn ring_dimension(&self) -> usize {
    self.n
  }

  /// Coefficient modulus `q`.
  pub fn modulus(&self) -> &BigUint {
    &self.q
  }

  /// The inclusive signed range small secrets and noise are drawn from.
  pub fn noise_bound(&self) -> (i64, i64) {
    (self.noise_lo, self.noise_hi)
  }

  /// Statistical security exponent used for the masking bound.
  pub fn security_level(&self) -> u32 {
    self.sec
  }

  /// Rounding target modulus `p`; each coefficient of the rounded
  /// output lies in `[0, p)`.
  pub fn target_modulus(&self) -> u64 {
    self.p
  }

  /// Bound `B` of the evaluator's masking polynomial `E`, sampled from
  /// `[-B, B]`.
  pub fn mask_bound(&self) -> &BigUint {
    &self.mask_bound
  }

  /// Worst-case magnitude of the accumulated noise in the unblinded
  /// value, used as the ambiguity margin during checked rounding.
  pub fn noise_total(&self) -> &BigUint {
    &self.noise_total
  }

  /// Fixed width in bytes of one coefficient on the wire (the byte
  /// length of `q`, little-endian).
  pub fn coeff_width(&self) -> usize {
    self.coeff_width
  }

  /// Byte length of an encoded ring element.
  pub fn element_width(&self) -> usize {
    self.coeff_width * self.n
  }

  /// Probability that at least one coefficient of a single evaluation
  /// rounds to the wrong lattice point because the accumulated noise
  /// pushed it over a rounding boundary.
  ///
  /// Parameter sets with a noticeable rate still construct (the hard
  /// validation only rejects sets where rounding can fail outright);
  /// callers that need overwhelming correctness should check this value
  /// and pick a larger modulus or a smaller noise range.
  pub fn expected_failure_rate(&self) -> f64 {
    let noise = self.noise_total.to_f64().unwrap_or(f64::INFINITY);
    let q = self.q.to_f64().unwrap_or(f64::INFINITY);
    let per_coeff = (noise * self.p as f64 / (2.0 * q)).min(1.0);
    1.0 - (1.0 - per_coeff).powi(self.n as i32)
  }
}
