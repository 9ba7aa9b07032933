//! The `objects` module contains the ring element type the protocol
//! computes over, the two uniform sampling primitives, and the rounding
//! procedure both participants use to turn a noisy ring element into a
//! shared bit string.
use bitvec::prelude::*;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use rand_core::{CryptoRng, RngCore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while decoding a ring element received from a peer.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
  #[error("encoded ring element has the wrong length")]
  Length,
  #[error("encoded coefficient is not reduced modulo q")]
  CoefficientRange,
}

/// Raised by [`round_checked`] when a coefficient lies so close to a
/// rounding boundary that the two participants may round it apart.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("coefficient {index} lies within the rounding ambiguity margin")]
pub struct RoundingAmbiguity {
  pub index: usize,
}

/// An element of `Z_q[X]/(X^n + 1)`: exactly `n` coefficients, each
/// reduced into `[0, q)`. Negative values are represented as `q - |v|`.
///
/// The arithmetic methods take the modulus explicitly and treat a
/// dimension mismatch between operands as a programming error, not a
/// runtime condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poly {
  coeffs: Vec<BigUint>,
}

impl Poly {
  pub fn zero(n: usize) -> Self {
    Self {
      coeffs: vec![BigUint::default(); n],
    }
  }

  /// Wraps a coefficient vector. Callers are responsible for handing in
  /// coefficients already reduced modulo the ring modulus.
  pub fn from_coeffs(coeffs: Vec<BigUint>) -> Self {
    Self { coeffs }
  }

  pub fn coeffs(&self) -> &[BigUint] {
    &self.coeffs
  }

  pub fn dimension(&self) -> usize {
    self.coeffs.len()
  }

  /// Coefficient-wise addition modulo `q`.
  pub fn add(&self, rhs: &Poly, q: &BigUint) -> Poly {
    check_dimensions(self, rhs);
    let coeffs = self
      .coeffs
      .iter()
      .zip(rhs.coeffs.iter())
      .map(|(a, b)| (a + b) % q)
      .collect();
    Poly { coeffs }
  }

  /// Coefficient-wise subtraction modulo `q`.
  pub fn sub(&self, rhs: &Poly, q: &BigUint) -> Poly {
    check_dimensions(self, rhs);
    let coeffs = self
      .coeffs
      .iter()
      .zip(rhs.coeffs.iter())
      .map(|(a, b)| (a + q - b) % q)
      .collect();
    Poly { coeffs }
  }

  /// Negacyclic convolution: polynomial multiplication reduced modulo
  /// `X^n + 1` and `q`. Schoolbook over the output coefficients, spread
  /// across threads; wraparound terms pick up a sign flip.
  pub fn mul(&self, rhs: &Poly, q: &BigUint) -> Poly {
    check_dimensions(self, rhs);
    let n = self.coeffs.len();
    let a = &self.coeffs;
    let b = &rhs.coeffs;
    let coeffs = (0..n)
      .into_par_iter()
      .map(|k| {
        let mut pos = BigUint::default();
        let mut neg = BigUint::default();
        for i in 0..=k {
          pos += &a[i] * &b[k - i];
        }
        for i in (k + 1)..n {
          neg += &a[i] * &b[n + k - i];
        }
        (pos + (q - (neg % q))) % q
      })
      .collect();
    Poly { coeffs }
  }

  /// Scales every coefficient by `c` modulo `q`.
  pub fn scale(&self, c: &BigUint, q: &BigUint) -> Poly {
    let coeffs = self.coeffs.iter().map(|a| (a * c) % q).collect();
    Poly { coeffs }
  }

  /// Canonical wire encoding: each coefficient as `width` little-endian
  /// bytes, concatenated in order. The width is fixed by the parameter
  /// set (byte length of `q`) so no coefficient can be truncated.
  pub fn to_bytes(&self, width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(self.coeffs.len() * width);
    for coeff in &self.coeffs {
      let mut le = coeff.to_bytes_le();
      debug_assert!(le.len() <= width);
      le.resize(width, 0);
      out.extend_from_slice(&le);
    }
    out
  }

  /// Decodes and validates a canonical encoding: the length must match
  /// `n * width` exactly and every coefficient must be reduced.
  pub fn from_bytes(
    bytes: &[u8],
    n: usize,
    q: &BigUint,
    width: usize,
  ) -> Result<Poly, CodecError> {
    if bytes.len() != n * width {
      return Err(CodecError::Length);
    }
    let mut coeffs = Vec::with_capacity(n);
    for chunk in bytes.chunks_exact(width) {
      let v = BigUint::from_bytes_le(chunk);
      if v >= *q {
        return Err(CodecError::CoefficientRange);
      }
      coeffs.push(v);
    }
    Ok(Poly { coeffs })
  }
}

fn check_dimensions(a: &Poly, b: &Poly) {
  if a.coeffs.len() != b.coeffs.len() {
    panic!(
      "Ring element dimensions do not match: {} and {}",
      a.coeffs.len(),
      b.coeffs.len()
    );
  }
}

/// Draws a uniform integer from `[0, bound)` by rejection over raw
/// random bytes, so the result carries no modulo bias. Randomness
/// failures are surfaced to the caller rather than retried.
pub fn sample_biguint_below<R: RngCore + CryptoRng>(
  bound: &BigUint,
  rng: &mut R,
) -> Result<BigUint, rand_core::Error> {
  debug_assert!(!bound.is_zero());
  let bits = bound.bits();
  let nbytes = ((bits + 7) / 8) as usize;
  let top_mask: u8 = if bits % 8 == 0 {
    0xff
  } else {
    (1u8 << (bits % 8)) - 1
  };
  let mut buf = vec![0u8; nbytes];
  loop {
    rng.try_fill_bytes(&mut buf)?;
    buf[nbytes - 1] &= top_mask;
    let v = BigUint::from_bytes_le(&buf);
    if v < *bound {
      return Ok(v);
    }
  }
}

fn sample_u64_below<R: RngCore + CryptoRng>(
  width: u64,
  rng: &mut R,
) -> Result<u64, rand_core::Error> {
  debug_assert!(width > 0);
  // largest multiple of `width` representable in a u64 draw
  let zone = u64::MAX - (u64::MAX % width);
  loop {
    let mut buf = [0u8; 8];
    rng.try_fill_bytes(&mut buf)?;
    let r = u64::from_le_bytes(buf);
    if r < zone {
      return Ok(r % width);
    }
  }
}

/// Samples a ring element with coefficients uniform over `[0, bound)`.
/// Used for the common public value `a`.
pub fn sample_big_uniform<R: RngCore + CryptoRng>(
  n: usize,
  bound: &BigUint,
  rng: &mut R,
) -> Result<Poly, rand_core::Error> {
  let mut coeffs = Vec::with_capacity(n);
  for _ in 0..n {
    coeffs.push(sample_biguint_below(bound, rng)?);
  }
  Ok(Poly { coeffs })
}

/// Samples a ring element with coefficients uniform over the small
/// signed range `[lo, hi]`, negative values represented as `q - |v|`.
/// Used for the secrets `k`, `s` and the noise terms `e`, `e'`.
pub fn sample_small_uniform<R: RngCore + CryptoRng>(
  n: usize,
  lo: i64,
  hi: i64,
  q: &BigUint,
  rng: &mut R,
) -> Result<Poly, rand_core::Error> {
  debug_assert!(lo <= hi);
  let width = (hi - lo + 1) as u64;
  let mut coeffs = Vec::with_capacity(n);
  for _ in 0..n {
    let v = lo + sample_u64_below(width, rng)? as i64;
    let coeff = if v < 0 {
      q - BigUint::from((-v) as u64)
    } else {
      BigUint::from(v as u64)
    };
    coeffs.push(coeff);
  }
  Ok(Poly { coeffs })
}

/// Samples the evaluator's masking polynomial: coefficients uniform
/// over `[-bound, bound]`, represented modulo `q`.
pub fn sample_masking<R: RngCore + CryptoRng>(
  n: usize,
  bound: &BigUint,
  q: &BigUint,
  rng: &mut R,
) -> Result<Poly, rand_core::Error> {
  let span = (bound * 2u32) + 1u32;
  let mut coeffs = Vec::with_capacity(n);
  for _ in 0..n {
    let t = sample_biguint_below(&span, rng)?;
    let coeff = if t >= *bound {
      t - bound
    } else {
      q - (bound - t)
    };
    coeffs.push(coeff);
  }
  Ok(Poly { coeffs })
}

/// Rounds every coefficient of a ring element to the nearest multiple
/// of `q/p`, rescaled into `[0, p)`. Coefficients are first centered
/// into `[-(q-1)/2, (q-1)/2]`; ties round down, matching
/// `ceil(v/(q/p) - 1/2)` computed exactly over the integers.
///
/// Deterministic and total; this is the reconciliation step shared by
/// both participants.
pub fn round(poly: &Poly, q: &BigUint, p: u64) -> Vec<u64> {
  poly
    .coeffs()
    .iter()
    .map(|v| round_coefficient(v, q, p).0)
    .collect()
}

/// [`round`] with an explicit consistency check: any coefficient lying
/// within `margin` of a rounding boundary is reported instead of being
/// silently rounded, since noise up to `margin` could carry it across
/// the boundary on the other side of the protocol.
pub fn round_checked(
  poly: &Poly,
  q: &BigUint,
  p: u64,
  margin: &BigUint,
) -> Result<Vec<u64>, RoundingAmbiguity> {
  // distances are tracked in numerator units, 2p per coefficient step
  let threshold = BigInt::from(margin * (2 * p));
  let mut out = Vec::with_capacity(poly.dimension());
  for (index, v) in poly.coeffs().iter().enumerate() {
    let (value, boundary_distance) = round_coefficient(v, q, p);
    if boundary_distance < threshold {
      return Err(RoundingAmbiguity { index });
    }
    out.push(value);
  }
  Ok(out)
}

/// Rounds one coefficient; also reports its distance from the nearest
/// rounding boundary for the checked variant.
fn round_coefficient(v: &BigUint, q: &BigUint, p: u64) -> (u64, BigInt) {
  let q_int = BigInt::from(q.clone());
  let half = q >> 1;
  let x = if *v > half {
    BigInt::from(v.clone()) - &q_int
  } else {
    BigInt::from(v.clone())
  };
  // rounding index m = ceil((2vp - q) / 2q); boundaries sit where the
  // numerator is an exact multiple of 2q
  let a = x * (2 * p) - &q_int;
  let b = &q_int * 2;
  let m = ceil_div(&a, &b);
  let idx = mod_floor(&m, &BigInt::from(p));
  let r = mod_floor(&a, &b);
  let distance = (&b - &r).min(r);
  let value = idx.to_u64().expect("rounded index fits the target modulus");
  (value, distance)
}

fn ceil_div(a: &BigInt, b: &BigInt) -> BigInt {
  let d = a / b;
  let r = a - &d * b;
  if r.sign() == Sign::Plus {
    d + 1
  } else {
    d
  }
}

fn mod_floor(a: &BigInt, m: &BigInt) -> BigInt {
  let r = a % m;
  if r.sign() == Sign::Minus {
    r + m
  } else {
    r
  }
}

/// Packs rounded coefficients into bytes, `log2(p)` bits per
/// coefficient, least significant bit first.
pub fn pack_rounded(values: &[u64], p: u64) -> Vec<u8> {
  let bits = p.trailing_zeros();
  let mut bv = BitVec::<u8, Lsb0>::with_capacity(values.len() * bits as usize);
  for &v in values {
    for i in 0..bits {
      bv.push((v >> i) & 1 == 1);
    }
  }
  bv.into_vec()
}
