use criterion::{criterion_group, criterion_main, Criterion};

use oprf_lattice::oprf::{Client, Evaluator};
use oprf_lattice::params::Parameters;
use rand_core::OsRng;

struct ParamSet {
  p: Parameters,
  n: String,
}

fn criterion_benchmark(c: &mut Criterion) {
  let mut group = c.benchmark_group("lattice OPRF benchmarks");
  group.sample_size(10);

  let bench_params = [
    ParamSet {
      p: Parameters::insecure_testing(),
      n: String::from("n=64"),
    },
    ParamSet {
      p: Parameters::recommended(),
      n: String::from("n=4096"),
    },
  ];

  for params in bench_params {
    let pp = params.p;
    let (evaluator, common) = Evaluator::setup(&pp, &mut OsRng).unwrap();

    group.bench_function(
      format!("Client: generate blinded request ({})", params.n),
      |b| {
        b.iter(|| Client::request(&pp, &common, b"bench input", &mut OsRng).unwrap());
      },
    );

    group.bench_function(
      format!("Evaluator: blind evaluation ({})", params.n),
      |b| {
        let (_client, req) =
          Client::request(&pp, &common, b"bench input", &mut OsRng).unwrap();
        b.iter(|| evaluator.respond(&pp, &req, &mut OsRng).unwrap());
      },
    );

    group.bench_function(format!("Client: finalise ({})", params.n), |b| {
      let (client, req) =
        Client::request(&pp, &common, b"bench input", &mut OsRng).unwrap();
      let resp = evaluator.respond(&pp, &req, &mut OsRng).unwrap();
      b.iter(|| client.finalize(&pp, &common, &resp).unwrap());
    });

    group.bench_function(
      format!("Evaluator: direct evaluation ({})", params.n),
      |b| {
        b.iter(|| evaluator.evaluate(&pp, b"bench input"));
      },
    );

    group.bench_function(
      format!("Setup: common values and key ({})", params.n),
      |b| {
        b.iter(|| Evaluator::setup(&pp, &mut OsRng).unwrap());
      },
    );
  }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
