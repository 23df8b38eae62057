use criterion::{criterion_group, criterion_main, Criterion};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tessera_core::{c64, mul, ComplexField, Mat, Op, Parallelism};
use tessera_cholesky::{cholesky_in_place, CholeskyParams, Variant};

fn random_hpd(rng: &mut StdRng, n: usize) -> Mat<c64> {
    let b = Mat::<c64>::from_fn(n, n, |_, _| c64::random(rng));
    let mut a = Mat::<c64>::zeros(n, n);
    mul::matmul(
        a.as_mut(),
        Op::Normal,
        b.as_ref(),
        Op::Adjoint,
        b.as_ref(),
        None,
        c64::new(1.0, 0.0),
        Parallelism::None,
    );
    for i in 0..n {
        let bumped = a.read(i, i) + c64::new(n as f64, 0.0);
        a.write(i, i, bumped);
    }
    a
}

fn cholesky(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    for n in [64, 128, 256] {
        let input = random_hpd(&mut rng, n);
        for (name, variant) in [("lvar2", Variant::LVar2), ("lvar3", Variant::LVar3)] {
            c.bench_function(&format!("cholesky-{name}-{n}"), |bencher| {
                bencher.iter(|| {
                    let mut a = input.clone();
                    cholesky_in_place(
                        variant,
                        a.as_mut(),
                        CholeskyParams::default(),
                        Parallelism::None,
                    )
                    .unwrap();
                    a
                });
            });
        }
    }
}

criterion_group!(benches, cholesky);
criterion_main!(benches);
