//! This binary runs iterated end-to-end evaluations and reports the
//! expected versus realized unblinding failure rate, per-phase average
//! runtimes, and the size of both protocol messages.
use oprf_lattice::oprf::{Client, Evaluator, OprfError, OprfWithTimings, Phase};
use oprf_lattice::params::Parameters;
use rand_core::OsRng;

fn main() {
  let iterations: usize = std::env::var("ITERATIONS")
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(25);
  let pp = if std::env::var("RECOMMENDED").is_ok() {
    Parameters::recommended()
  } else {
    Parameters::insecure_testing()
  };

  println!("Ring dimension n: {}", pp.ring_dimension());
  println!("Modulus q: {}", pp.modulus());
  println!("Noise bound: {:?}", pp.noise_bound());
  println!("Masking bound B: {}", pp.mask_bound());
  println!(
    "Expected unblinding failure rate: {:.6} %",
    pp.expected_failure_rate() * 100.0
  );

  let (evaluator, common) = Evaluator::setup(&pp, &mut OsRng).unwrap();
  let (_client, request) =
    Client::request(&pp, &common, b"size probe", &mut OsRng).unwrap();
  let response = evaluator.respond(&pp, &request, &mut OsRng).unwrap();
  println!("\n#### Sizes (bytes) ####\n");
  println!("\t* Request: {}", request.to_bytes(&pp).len());
  println!("\t* Response: {}", response.to_bytes(&pp).len());

  let mut runner = OprfWithTimings::new(pp);
  let mut failures = 0usize;
  for i in 0..iterations {
    let input = format!("evaluation-input-{}", i);
    match runner.evaluate(input.as_bytes(), &mut OsRng) {
      Ok(_) => {}
      Err(OprfError::Mismatch) | Err(OprfError::Ambiguity(_)) => failures += 1,
      Err(err) => panic!("protocol failure: {}", err),
    }
  }

  println!("\n------------------------------ RESULT ------------------------------");
  println!("Successful OPRF attempts: {}", iterations - failures);
  println!("Failed OPRF attempts: {}", failures);
  println!(
    "Realized unblinding failure rate: {:.6} %",
    failures as f64 / iterations as f64 * 100.0
  );
  println!("------------------------------ TIMING ------------------------------");
  for phase in Phase::ALL.iter().copied() {
    if let Some(avg) = runner.timings().average(phase) {
      println!(
        "Average {} runtime (ms): {:.3}",
        phase,
        avg.as_secs_f64() * 1e3
      );
    }
  }
}
