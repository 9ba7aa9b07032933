//! The `oprf` module contains the core functionality of the
//! lattice-based oblivious pseudorandom function: the two protocol
//! roles, the messages they exchange, and the orchestration of one
//! evaluation.
//!
//! One evaluation is a two-message exchange over the ring
//! `Z_q[X]/(X^n + 1)`. The evaluator holds the PRF key `k` and has
//! published the common values `(a, c = a*k + e)`. The client holds the
//! private evaluation input, encodes it as a ring element
//! `a_x = encode(x)` and sends the blinded request
//! `c_x = a*s + e' + a_x`. The evaluator answers
//! `d_x = c_x*k + E` with a wide uniform mask `E`, and the client
//! unblinds `y = d_x - c*s = a_x*k + (e'*k - e*s + E)`. Rounding `y`
//! erases the noise term and leaves `round(a_x*k)`, the same value the
//! evaluator can reach directly from `k` and `x`.
//!
//! # Example usage
//!
//! ```
//! use oprf_lattice::oprf::Oprf;
//! use oprf_lattice::params::Parameters;
//! use rand_core::OsRng;
//!
//! let pp = Parameters::insecure_testing();
//! let oprf = Oprf::new(pp, &mut OsRng).unwrap();
//!
//! // blinding randomness differs between runs, the PRF value does not
//! let secret = oprf.evaluate(b"session input", &mut OsRng).unwrap();
//! let again = oprf.evaluate(b"session input", &mut OsRng).unwrap();
//! assert_eq!(secret, again);
//! ```
use crate::objects::{
  pack_rounded, round, round_checked, sample_big_uniform, sample_masking,
  sample_small_uniform, CodecError, Poly, RoundingAmbiguity,
};
use crate::params::Parameters;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

const ENCODE_DOMAIN: &[u8] = b"oprf_lattice_encode";
const FINALISE_DOMAIN: &[u8] = b"oprf_lattice_finalise";

/// Errors surfaced while running the protocol.
#[derive(Debug, Error)]
pub enum OprfError {
  /// A peer message failed shape validation. Transport corruption and
  /// truncation surface here; nothing is recovered from a bad message.
  #[error("malformed message: {0}")]
  Malformed(#[from] CodecError),
  /// A coefficient of the unblinded value sat too close to a rounding
  /// boundary to guarantee both sides agree on the output.
  #[error(transparent)]
  Ambiguity(#[from] RoundingAmbiguity),
  /// The two derivations of the shared secret disagree. Re-running
  /// means a fresh session with fresh randomness; the protocol never
  /// retries on its own.
  #[error("client and evaluator derived different shared secrets")]
  Mismatch,
  /// The secure randomness source failed. Fatal; entropy failures are
  /// not transient enough to blindly retry.
  #[error("randomness source failure: {0}")]
  Randomness(#[from] rand_core::Error),
}

/// The fixed-length secret both participants derive from one
/// evaluation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl AsRef<[u8]> for SharedSecret {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl fmt::Debug for SharedSecret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SharedSecret(..)")
  }
}

/// The session's common public values: the uniform ring element `a`
/// and the evaluator's commitment `c = a*k + e`.
///
/// The handle is immutable once created and may be reused across any
/// number of evaluations against the same evaluator key, saving the
/// sampling and commitment step; both parties must agree on it
/// out-of-band when it is reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonValues {
  a: Poly,
  c: Poly,
}

impl CommonValues {
  /// The common public value `a`.
  pub fn public_value(&self) -> &Poly {
    &self.a
  }

  /// The evaluator's commitment `c = a*k + e`.
  pub fn commitment(&self) -> &Poly {
    &self.c
  }
}

/// The client's outbound message: the blinded evaluation input
/// `c_x = a*s + e' + encode(x)`.
///
/// On the wire a message is its ring element in the canonical encoding:
/// every coefficient as `Parameters::coeff_width` little-endian bytes
/// (the byte length of `q`), concatenated in coefficient order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
  pub c_x: Poly,
}

impl Request {
  pub fn to_bytes(&self, pp: &Parameters) -> Vec<u8> {
    self.c_x.to_bytes(pp.coeff_width())
  }

  pub fn from_bytes(bytes: &[u8], pp: &Parameters) -> Result<Self, OprfError> {
    let c_x = Poly::from_bytes(
      bytes,
      pp.ring_dimension(),
      pp.modulus(),
      pp.coeff_width(),
    )?;
    Ok(Self { c_x })
  }

  fn validate(&self, pp: &Parameters) -> Result<(), OprfError> {
    validate_element(&self.c_x, pp)
  }
}

/// The evaluator's response: `d_x = c_x*k + E`. Same wire encoding as
/// [`Request`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub d_x: Poly,
}

impl Response {
  pub fn to_bytes(&self, pp: &Parameters) -> Vec<u8> {
    self.d_x.to_bytes(pp.coeff_width())
  }

  pub fn from_bytes(bytes: &[u8], pp: &Parameters) -> Result<Self, OprfError> {
    let d_x = Poly::from_bytes(
      bytes,
      pp.ring_dimension(),
      pp.modulus(),
      pp.coeff_width(),
    )?;
    Ok(Self { d_x })
  }

  fn validate(&self, pp: &Parameters) -> Result<(), OprfError> {
    validate_element(&self.d_x, pp)
  }
}

fn validate_element(poly: &Poly, pp: &Parameters) -> Result<(), OprfError> {
  if poly.dimension() != pp.ring_dimension() {
    return Err(CodecError::Length.into());
  }
  for coeff in poly.coeffs() {
    if coeff >= pp.modulus() {
      return Err(CodecError::CoefficientRange.into());
    }
  }
  Ok(())
}

/// Hashes an evaluation input to a ring element: the input digest is
/// expanded per coefficient, each hash output taken modulo `q`. The
/// encoding is public; only who evaluates it on what stays private.
pub fn encode_input(pp: &Parameters, input: &[u8]) -> Poly {
  let digest = Sha256::digest(input);
  let mut coeffs = Vec::with_capacity(pp.ring_dimension());
  for i in 0..pp.ring_dimension() {
    let mut h = Sha256::new();
    h.update((i as u32).to_le_bytes());
    h.update(&digest);
    h.update(ENCODE_DOMAIN);
    coeffs.push(BigUint::from_bytes_le(&h.finalize()) % pp.modulus());
  }
  Poly::from_coeffs(coeffs)
}

// The protocol step formulas, shared by the plain and the timed
// orchestration.

fn compute_commitment(pp: &Parameters, a: &Poly, k: &Poly, e: &Poly) -> Poly {
  a.mul(k, pp.modulus()).add(e, pp.modulus())
}

fn compute_request(
  pp: &Parameters,
  a: &Poly,
  s: &Poly,
  e_prime: &Poly,
  a_x: &Poly,
) -> Poly {
  a.mul(s, pp.modulus())
    .add(e_prime, pp.modulus())
    .add(a_x, pp.modulus())
}

fn compute_response(pp: &Parameters, c_x: &Poly, k: &Poly, mask: &Poly) -> Poly {
  c_x.mul(k, pp.modulus()).add(mask, pp.modulus())
}

fn compute_unblinded(pp: &Parameters, d_x: &Poly, c: &Poly, s: &Poly) -> Poly {
  d_x.sub(&c.mul(s, pp.modulus()), pp.modulus())
}

fn derive_secret(pp: &Parameters, input: &[u8], rounded: &[u64]) -> SharedSecret {
  let packed = pack_rounded(rounded, pp.target_modulus());
  let mut h = Sha256::new();
  h.update(input);
  h.update(&packed);
  h.update(FINALISE_DOMAIN);
  SharedSecret(h.finalize().into())
}

/// The requesting role. Holds the private evaluation input and the
/// session's blinding secret; both are sampled fresh for every
/// evaluation and must never be reused across sessions.
pub struct Client {
  input: Vec<u8>,
  blind: Poly,
}

impl Client {
  /// Blinds `input` against the session's common values, producing the
  /// state needed for [`Client::finalize`] and the outbound request.
  pub fn request<R: RngCore + CryptoRng>(
    pp: &Parameters,
    common: &CommonValues,
    input: &[u8],
    rng: &mut R,
  ) -> Result<(Client, Request), OprfError> {
    let (lo, hi) = pp.noise_bound();
    let n = pp.ring_dimension();
    let s = sample_small_uniform(n, lo, hi, pp.modulus(), rng)?;
    let e_prime = sample_small_uniform(n, lo, hi, pp.modulus(), rng)?;
    let a_x = encode_input(pp, input);
    let c_x = compute_request(pp, common.public_value(), &s, &e_prime, &a_x);
    let client = Client {
      input: input.to_vec(),
      blind: s,
    };
    Ok((client, Request { c_x }))
  }

  /// Unblinds the evaluator's response and derives the shared secret.
  ///
  /// Rounding runs with the parameter set's worst-case noise as the
  /// ambiguity margin: a coefficient close enough to a rounding
  /// boundary that the evaluator might round it the other way is
  /// reported instead of silently producing a diverging secret.
  pub fn finalize(
    &self,
    pp: &Parameters,
    common: &CommonValues,
    response: &Response,
  ) -> Result<SharedSecret, OprfError> {
    response.validate(pp)?;
    let y = compute_unblinded(pp, &response.d_x, common.commitment(), &self.blind);
    let rounded = round_checked(
      &y,
      pp.modulus(),
      pp.target_modulus(),
      pp.noise_total(),
    )?;
    Ok(derive_secret(pp, &self.input, &rounded))
  }
}

/// The evaluating role: holds the PRF key `k` for the lifetime of the
/// session.
pub struct Evaluator {
  key: Poly,
}

impl Evaluator {
  /// Samples a fresh common public value together with a fresh key and
  /// publishes the commitment.
  pub fn setup<R: RngCore + CryptoRng>(
    pp: &Parameters,
    rng: &mut R,
  ) -> Result<(Evaluator, CommonValues), OprfError> {
    let a = sample_big_uniform(pp.ring_dimension(), pp.modulus(), rng)?;
    Self::with_common(pp, a, rng)
  }

  /// Builds an evaluator over an already-agreed common public value
  /// `a`, sampling only the key material and the commitment.
  pub fn with_common<R: RngCore + CryptoRng>(
    pp: &Parameters,
    a: Poly,
    rng: &mut R,
  ) -> Result<(Evaluator, CommonValues), OprfError> {
    let (lo, hi) = pp.noise_bound();
    let n = pp.ring_dimension();
    let k = sample_small_uniform(n, lo, hi, pp.modulus(), rng)?;
    let e = sample_small_uniform(n, lo, hi, pp.modulus(), rng)?;
    let c = compute_commitment(pp, &a, &k, &e);
    Ok((Evaluator { key: k }, CommonValues { a, c }))
  }

  /// Answers a blinded request: validates its shape, then masks the
  /// keyed product with a wide uniform noise term.
  pub fn respond<R: RngCore + CryptoRng>(
    &self,
    pp: &Parameters,
    request: &Request,
    rng: &mut R,
  ) -> Result<Response, OprfError> {
    request.validate(pp)?;
    let mask = sample_masking(
      pp.ring_dimension(),
      pp.mask_bound(),
      pp.modulus(),
      rng,
    )?;
    let d_x = compute_response(pp, &request.c_x, &self.key, &mask);
    Ok(Response { d_x })
  }

  /// Evaluates the PRF directly on a known input: `round(encode(x)*k)`.
  /// This is the evaluator's own derivation of the shared value, needing
  /// no round trip.
  pub fn evaluate(&self, pp: &Parameters, input: &[u8]) -> SharedSecret {
    let a_x = encode_input(pp, input);
    let w = a_x.mul(&self.key, pp.modulus());
    let rounded = round(&w, pp.modulus(), pp.target_modulus());
    derive_secret(pp, input, &rounded)
  }
}

/// One protocol instance: a parameter set, an evaluator key, and the
/// session's common values, reused across every evaluation made through
/// this handle.
pub struct Oprf {
  pp: Parameters,
  evaluator: Evaluator,
  common: CommonValues,
}

impl Oprf {
  /// Generates fresh common values and key material.
  pub fn new<R: RngCore + CryptoRng>(
    pp: Parameters,
    rng: &mut R,
  ) -> Result<Self, OprfError> {
    let (evaluator, common) = Evaluator::setup(&pp, rng)?;
    Ok(Self {
      pp,
      evaluator,
      common,
    })
  }

  /// Builds an instance over an already-agreed common public value.
  pub fn with_common<R: RngCore + CryptoRng>(
    pp: Parameters,
    a: Poly,
    rng: &mut R,
  ) -> Result<Self, OprfError> {
    let (evaluator, common) = Evaluator::with_common(&pp, a, rng)?;
    Ok(Self {
      pp,
      evaluator,
      common,
    })
  }

  pub fn parameters(&self) -> &Parameters {
    &self.pp
  }

  pub fn common_values(&self) -> &CommonValues {
    &self.common
  }

  /// Runs one full evaluation in memory: client request, evaluator
  /// response, client finalize, then a consistency check of the
  /// client's secret against the evaluator's direct derivation. A
  /// divergence is reported as [`OprfError::Mismatch`]; the caller
  /// decides whether to start a fresh session.
  pub fn evaluate<R: RngCore + CryptoRng>(
    &self,
    input: &[u8],
    rng: &mut R,
  ) -> Result<SharedSecret, OprfError> {
    let (client, request) = Client::request(&self.pp, &self.common, input, rng)?;
    let response = self.evaluator.respond(&self.pp, &request, rng)?;
    let blinded = client.finalize(&self.pp, &self.common, &response)?;
    let direct = self.evaluator.evaluate(&self.pp, input);
    if blinded != direct {
      return Err(OprfError::Mismatch);
    }
    Ok(blinded)
  }
}

/// The protocol phases measured by [`OprfWithTimings`], named after the
/// operations they wrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
  SamplingBigA,
  SamplingSmallK,
  SamplingSmallE,
  ComputeC,
  SamplingSmallS,
  SamplingSmallEPrime,
  ComputeAX,
  ComputeCX,
  SamplingBigE,
  ComputeDX,
  ComputeY,
  RoundingY,
}

impl Phase {
  pub const ALL: [Phase; 12] = [
    Phase::SamplingBigA,
    Phase::SamplingSmallK,
    Phase::SamplingSmallE,
    Phase::ComputeC,
    Phase::SamplingSmallS,
    Phase::SamplingSmallEPrime,
    Phase::ComputeAX,
    Phase::ComputeCX,
    Phase::SamplingBigE,
    Phase::ComputeDX,
    Phase::ComputeY,
    Phase::RoundingY,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Phase::SamplingBigA => "sampling_big_a",
      Phase::SamplingSmallK => "sampling_small_k",
      Phase::SamplingSmallE => "sampling_small_e",
      Phase::ComputeC => "compute_c",
      Phase::SamplingSmallS => "sampling_small_s",
      Phase::SamplingSmallEPrime => "sampling_small_e_prime",
      Phase::ComputeAX => "compute_a_x",
      Phase::ComputeCX => "compute_c_x",
      Phase::SamplingBigE => "sampling_big_E",
      Phase::ComputeDX => "compute_d_x",
      Phase::ComputeY => "compute_y",
      Phase::RoundingY => "rounding_y",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Accumulated per-phase wall-clock measurements across evaluations.
#[derive(Clone, Debug, Default)]
pub struct PhaseTimings {
  records: Vec<(Phase, Duration)>,
}

impl PhaseTimings {
  pub fn record(&mut self, phase: Phase, elapsed: Duration) {
    self.records.push((phase, elapsed));
  }

  pub fn count(&self, phase: Phase) -> usize {
    self.records.iter().filter(|(p, _)| *p == phase).count()
  }

  pub fn average(&self, phase: Phase) -> Option<Duration> {
    let durations: Vec<Duration> = self
      .records
      .iter()
      .filter(|(p, _)| *p == phase)
      .map(|(_, d)| *d)
      .collect();
    if durations.is_empty() {
      return None;
    }
    let total: Duration = durations.iter().sum();
    Some(total / durations.len() as u32)
  }

  pub fn total(&self) -> Duration {
    self.records.iter().map(|(_, d)| *d).sum()
  }
}

/// Measurement decorator around the protocol: one evaluation performs
/// exactly the same steps as [`Oprf::evaluate`] (through the same step
/// implementations), wrapping each phase with a timer. Common values
/// are resampled on every run so the sampling phases are measured too.
pub struct OprfWithTimings {
  pp: Parameters,
  timings: PhaseTimings,
}

impl OprfWithTimings {
  pub fn new(pp: Parameters) -> Self {
    Self {
      pp,
      timings: PhaseTimings::default(),
    }
  }

  pub fn parameters(&self) -> &Parameters {
    &self.pp
  }

  pub fn timings(&self) -> &PhaseTimings {
    &self.timings
  }

  /// Runs one fully-sampled evaluation, recording every phase.
  pub fn evaluate<R: RngCore + CryptoRng>(
    &mut self,
    input: &[u8],
    rng: &mut R,
  ) -> Result<SharedSecret, OprfError> {
    let pp = &self.pp;
    let n = pp.ring_dimension();
    let q = pp.modulus();
    let (lo, hi) = pp.noise_bound();

    let t = Instant::now();
    let a = sample_big_uniform(n, q, rng);
    self.timings.record(Phase::SamplingBigA, t.elapsed());
    let a = a?;

    let t = Instant::now();
    let k = sample_small_uniform(n, lo, hi, q, rng);
    self.timings.record(Phase::SamplingSmallK, t.elapsed());
    let k = k?;

    let t = Instant::now();
    let e = sample_small_uniform(n, lo, hi, q, rng);
    self.timings.record(Phase::SamplingSmallE, t.elapsed());
    let e = e?;

    let t = Instant::now();
    let c = compute_commitment(pp, &a, &k, &e);
    self.timings.record(Phase::ComputeC, t.elapsed());

    let t = Instant::now();
    let s = sample_small_uniform(n, lo, hi, q, rng);
    self.timings.record(Phase::SamplingSmallS, t.elapsed());
    let s = s?;

    let t = Instant::now();
    let e_prime = sample_small_uniform(n, lo, hi, q, rng);
    self.timings.record(Phase::SamplingSmallEPrime, t.elapsed());
    let e_prime = e_prime?;

    let t = Instant::now();
    let a_x = encode_input(pp, input);
    self.timings.record(Phase::ComputeAX, t.elapsed());

    let t = Instant::now();
    let c_x = compute_request(pp, &a, &s, &e_prime, &a_x);
    self.timings.record(Phase::ComputeCX, t.elapsed());

    let t = Instant::now();
    let mask = sample_masking(n, pp.mask_bound(), q, rng);
    self.timings.record(Phase::SamplingBigE, t.elapsed());
    let mask = mask?;

    let t = Instant::now();
    let d_x = compute_response(pp, &c_x, &k, &mask);
    self.timings.record(Phase::ComputeDX, t.elapsed());

    let t = Instant::now();
    let y = compute_unblinded(pp, &d_x, &c, &s);
    self.timings.record(Phase::ComputeY, t.elapsed());

    let t = Instant::now();
    let rounded = round_checked(&y, q, pp.target_modulus(), pp.noise_total());
    self.timings.record(Phase::RoundingY, t.elapsed());
    let rounded = rounded?;

    let secret = derive_secret(pp, input, &rounded);
    let w = a_x.mul(&k, q);
    let direct = derive_secret(pp, input, &round(&w, q, pp.target_modulus()));
    if secret != direct {
      return Err(OprfError::Mismatch);
    }
    Ok(secret)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use num_traits::ToPrimitive;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use std::collections::HashSet;

  fn reference_pp() -> Parameters {
    Parameters::new(512, BigUint::from(12_289u32), (-1, 1), 0).unwrap()
  }

  #[test]
  fn blinded_and_direct_evaluations_agree() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(101);
    let (evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();
    for i in 0..8 {
      let input = format!("evaluation input {}", i);
      let (client, request) =
        Client::request(&pp, &common, input.as_bytes(), &mut rng).unwrap();
      let response = evaluator.respond(&pp, &request, &mut rng).unwrap();
      let blinded = client.finalize(&pp, &common, &response).unwrap();
      let direct = evaluator.evaluate(&pp, input.as_bytes());
      assert_eq!(blinded, direct);
    }
  }

  #[test]
  fn orchestrator_reuses_common_values() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(102);
    let oprf = Oprf::new(pp, &mut rng).unwrap();
    let first = oprf.evaluate(b"stable input", &mut rng).unwrap();
    let second = oprf.evaluate(b"stable input", &mut rng).unwrap();
    assert_eq!(first, second);
    let other = oprf.evaluate(b"different input", &mut rng).unwrap();
    assert_ne!(first, other);
  }

  #[test]
  fn same_public_value_different_keys_diverge() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(103);
    let oprf = Oprf::new(pp.clone(), &mut rng).unwrap();
    let reference = oprf.evaluate(b"shared input", &mut rng).unwrap();

    let a = oprf.common_values().public_value().clone();
    let (other, _) = Evaluator::with_common(&pp, a, &mut rng).unwrap();
    assert_ne!(other.evaluate(&pp, b"shared input"), reference);
  }

  #[test]
  fn reference_params_fixed_seed_is_deterministic() {
    let pp = reference_pp();
    let run = || {
      let mut rng = StdRng::seed_from_u64(42);
      let (evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();
      let (client, request) =
        Client::request(&pp, &common, b"fixed input", &mut rng).unwrap();
      let response = evaluator.respond(&pp, &request, &mut rng).unwrap();
      // unchecked rounding: this reference set's noise margin covers
      // most of the rounding interval
      let y =
        compute_unblinded(&pp, &response.d_x, common.commitment(), &client.blind);
      let rounded = round(&y, pp.modulus(), pp.target_modulus());
      derive_secret(&pp, b"fixed input", &rounded)
    };
    assert_eq!(run(), run());
  }

  #[test]
  fn distinct_inputs_never_collide() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(104);
    let (evaluator, _) = Evaluator::setup(&pp, &mut rng).unwrap();
    let mut secrets = HashSet::new();
    let mut roundings = HashSet::new();
    for i in 0..10_000u32 {
      let input = format!("collision probe {}", i);
      let secret = evaluator.evaluate(&pp, input.as_bytes());
      secrets.insert(*secret.as_bytes());

      let w = encode_input(&pp, input.as_bytes())
        .mul(&evaluator.key, pp.modulus());
      let rounded = round(&w, pp.modulus(), pp.target_modulus());
      roundings.insert(pack_rounded(&rounded, pp.target_modulus()));
    }
    assert_eq!(secrets.len(), 10_000);
    assert_eq!(roundings.len(), 10_000);
  }

  #[test]
  fn request_coefficients_look_uniform() {
    // the request must hide the encoded input: its coefficients should
    // be indistinguishable from uniform whatever the input was
    let pp = reference_pp();
    let q = 12_289u64;
    let mut rng = StdRng::seed_from_u64(105);
    let (_evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();
    for input in [&b"first input"[..], &b"second input"[..]].iter() {
      let mut counts = [0u64; 16];
      for _ in 0..20 {
        let (_, request) = Client::request(&pp, &common, input, &mut rng).unwrap();
        for coeff in request.c_x.coeffs() {
          let bin = ((coeff * 16u32) / pp.modulus()).to_u64().unwrap() as usize;
          counts[bin] += 1;
        }
      }
      let total = (20 * 512) as f64;
      let mut chi = 0.0f64;
      for b in 0..16u64 {
        let width = ((b + 1) * q) / 16 - (b * q) / 16;
        let expected = total * width as f64 / q as f64;
        chi += (counts[b as usize] as f64 - expected).powi(2) / expected;
      }
      // 15 degrees of freedom; far beyond any plausible tail
      assert!(chi < 80.0, "chi-square statistic too large: {}", chi);
    }
  }

  #[test]
  fn tampered_response_changes_the_secret() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(106);
    let (evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();
    let (client, request) =
      Client::request(&pp, &common, b"tamper target", &mut rng).unwrap();
    let response = evaluator.respond(&pp, &request, &mut rng).unwrap();
    let reference = client.finalize(&pp, &common, &response).unwrap();

    // shifting a coefficient by a whole rounding interval flips its bit
    let mut coeffs = response.d_x.coeffs().to_vec();
    coeffs[0] = (&coeffs[0] + (pp.modulus() >> 1)) % pp.modulus();
    let tampered = Response {
      d_x: Poly::from_coeffs(coeffs),
    };
    let out = client.finalize(&pp, &common, &tampered).unwrap();
    assert_ne!(out, reference);
  }

  #[test]
  fn boundary_coefficient_is_reported_ambiguous() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(107);
    let (evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();
    let (client, request) =
      Client::request(&pp, &common, b"boundary probe", &mut rng).unwrap();
    let response = evaluator.respond(&pp, &request, &mut rng).unwrap();

    // steer the first unblinded coefficient onto a rounding boundary
    let y = compute_unblinded(&pp, &response.d_x, common.commitment(), &client.blind);
    let target = (pp.modulus() - 1u32) >> 2;
    let delta = (pp.modulus() + &target - &y.coeffs()[0]) % pp.modulus();
    let mut coeffs = response.d_x.coeffs().to_vec();
    coeffs[0] = (&coeffs[0] + delta) % pp.modulus();
    let steered = Response {
      d_x: Poly::from_coeffs(coeffs),
    };
    match client.finalize(&pp, &common, &steered) {
      Err(OprfError::Ambiguity(amb)) => assert_eq!(amb.index, 0),
      other => panic!("expected an ambiguity report, got {:?}", other.err()),
    }
  }

  #[test]
  fn malformed_messages_are_rejected() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(108);
    let (evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();

    let short = Request {
      c_x: Poly::zero(pp.ring_dimension() - 1),
    };
    assert!(matches!(
      evaluator.respond(&pp, &short, &mut rng),
      Err(OprfError::Malformed(CodecError::Length))
    ));

    let (client, request) =
      Client::request(&pp, &common, b"shape check", &mut rng).unwrap();
    let response = evaluator.respond(&pp, &request, &mut rng).unwrap();
    let mut coeffs = response.d_x.coeffs().to_vec();
    coeffs[3] = pp.modulus().clone();
    let unreduced = Response {
      d_x: Poly::from_coeffs(coeffs),
    };
    assert!(matches!(
      client.finalize(&pp, &common, &unreduced),
      Err(OprfError::Malformed(CodecError::CoefficientRange))
    ));
  }

  #[test]
  fn messages_round_trip_both_codecs() {
    let pp = Parameters::insecure_testing();
    let mut rng = StdRng::seed_from_u64(109);
    let (_evaluator, common) = Evaluator::setup(&pp, &mut rng).unwrap();
    let (_client, request) =
      Client::request(&pp, &common, b"codec probe", &mut rng).unwrap();

    let wire = request.to_bytes(&pp);
    assert_eq!(wire.len(), pp.element_width());
    assert_eq!(Request::from_bytes(&wire, &pp).unwrap(), request);
    assert!(matches!(
      Request::from_bytes(&wire[..wire.len() - 1], &pp),
      Err(OprfError::Malformed(CodecError::Length))
    ));

    let encoded = bincode::serialize(&request).unwrap();
    let decoded: Request = bincode::deserialize(&encoded).unwrap();
    assert_eq!(decoded, request);
  }

  #[test]
  fn timing_decorator_runs_the_full_protocol() {
    let pp = Parameters::insecure_testing();
    let mut runner = OprfWithTimings::new(pp);
    let mut rng = StdRng::seed_from_u64(110);
    runner.evaluate(b"timed input", &mut rng).unwrap();
    runner.evaluate(b"timed input", &mut rng).unwrap();
    for phase in Phase::ALL.iter().copied() {
      assert_eq!(runner.timings().count(phase), 2);
      assert!(runner.timings().average(phase).is_some());
    }
    assert!(runner.timings().total() > Duration::from_secs(0));
  }
}
