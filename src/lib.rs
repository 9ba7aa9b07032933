//! The `oprf-lattice` crate implements an oblivious pseudorandom
//! function over the power-of-two cyclotomic ring `Z_q[X]/(X^n + 1)`:
//! a client learns `PRF(k, x)` for its private evaluation input `x`
//! under the evaluator's key `k`, with learning-with-errors style
//! blinding hiding the input and a shared rounding step erasing the
//! protocol noise on both sides.
//!
//! Sessions are independent: every evaluation samples its own blinding
//! and masking material, so one [`oprf::Oprf`] instance can serve any
//! number of concurrent evaluations as long as each caller brings its
//! own randomness source.
pub mod auth;
pub mod objects;
pub mod oprf;
pub mod params;
