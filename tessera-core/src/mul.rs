//! Matrix multiplication kernels on local tiles.

use crate::{join_raw, ComplexField, MatMut, MatRef, Op, Parallelism, Uplo};
use assert2::assert as fancy_assert;

#[inline(always)]
fn at<E: ComplexField>(mat: MatRef<'_, E>, op: Op, i: usize, j: usize) -> E {
    match op {
        Op::Normal => mat.read(i, j),
        Op::Transpose => mat.read(j, i),
        Op::Adjoint => mat.read(j, i).conj(),
    }
}

#[inline]
fn op_dims<E: ComplexField>(mat: MatRef<'_, E>, op: Op) -> (usize, usize) {
    match op {
        Op::Normal => (mat.nrows(), mat.ncols()),
        Op::Transpose | Op::Adjoint => (mat.ncols(), mat.nrows()),
    }
}

/// Splits the columns of `op(b)` at `mid`.
#[inline]
fn split_op_cols<E: ComplexField>(
    mat: MatRef<'_, E>,
    op: Op,
    mid: usize,
) -> (MatRef<'_, E>, MatRef<'_, E>) {
    match op {
        Op::Normal => mat.split_at_col(mid),
        Op::Transpose | Op::Adjoint => mat.split_at_row(mid),
    }
}

/// Splits the rows of `op(a)` at `mid`.
#[inline]
fn split_op_rows<E: ComplexField>(
    mat: MatRef<'_, E>,
    op: Op,
    mid: usize,
) -> (MatRef<'_, E>, MatRef<'_, E>) {
    match op {
        Op::Normal => mat.split_at_row(mid),
        Op::Transpose | Op::Adjoint => mat.split_at_col(mid),
    }
}

/// Computes `acc = alpha * acc + beta * op_a(a) * op_b(b)`, with `alpha =
/// None` meaning the accumulator is overwritten.
///
/// # Panics
///
/// Panics if the operand dimensions do not conform.
#[track_caller]
pub fn matmul<E: ComplexField>(
    acc: MatMut<'_, E>,
    op_a: Op,
    a: MatRef<'_, E>,
    op_b: Op,
    b: MatRef<'_, E>,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    let (m, ka) = op_dims(a, op_a);
    let (kb, n) = op_dims(b, op_b);
    fancy_assert!(ka == kb, "inner dimensions must match");
    fancy_assert!(acc.nrows() == m);
    fancy_assert!(acc.ncols() == n);
    matmul_impl(acc, op_a, a, op_b, b, alpha, beta, parallelism);
}

fn matmul_impl<E: ComplexField>(
    acc: MatMut<'_, E>,
    op_a: Op,
    a: MatRef<'_, E>,
    op_b: Op,
    b: MatRef<'_, E>,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    let mut acc = acc;
    let m = acc.nrows();
    let n = acc.ncols();
    let k = op_dims(a, op_a).1;

    if n >= 2 && m * n * k >= 32 * 32 * 32 {
        if let Parallelism::Rayon(_) = parallelism {
            let mid = n / 2;
            let (acc_left, acc_right) = acc.split_at_col(mid);
            let (b_left, b_right) = split_op_cols(b, op_b, mid);
            join_raw(
                |parallelism| matmul_impl(acc_left, op_a, a, op_b, b_left, alpha, beta, parallelism),
                |parallelism| {
                    matmul_impl(acc_right, op_a, a, op_b, b_right, alpha, beta, parallelism)
                },
                parallelism,
            );
            return;
        }
    }

    for j in 0..n {
        match alpha {
            Some(alpha) => {
                for i in 0..m {
                    let scaled = acc.read(i, j) * alpha;
                    acc.write(i, j, scaled);
                }
            }
            None => {
                for i in 0..m {
                    acc.write(i, j, E::zero());
                }
            }
        }
        for l in 0..k {
            let factor = beta * at(b, op_b, l, j);
            if factor == E::zero() {
                continue;
            }
            for i in 0..m {
                let updated = acc.read(i, j) + at(a, op_a, i, l) * factor;
                acc.write(i, j, updated);
            }
        }
    }
}

/// Computes `acc = alpha * acc + beta * op_a(a) * op_b(b)` on one
/// triangular half of `acc` only; the other half is never read or written.
///
/// # Panics
///
/// Panics if `acc` is not square or the operand dimensions do not conform.
#[track_caller]
pub fn triangular_rank_update<E: ComplexField>(
    uplo: Uplo,
    acc: MatMut<'_, E>,
    op_a: Op,
    a: MatRef<'_, E>,
    op_b: Op,
    b: MatRef<'_, E>,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    let (m, ka) = op_dims(a, op_a);
    let (kb, n) = op_dims(b, op_b);
    fancy_assert!(acc.nrows() == acc.ncols());
    fancy_assert!(ka == kb, "inner dimensions must match");
    fancy_assert!(acc.nrows() == m);
    fancy_assert!(acc.ncols() == n);
    triangular_impl(uplo, acc, op_a, a, op_b, b, alpha, beta, parallelism);
}

fn triangular_impl<E: ComplexField>(
    uplo: Uplo,
    acc: MatMut<'_, E>,
    op_a: Op,
    a: MatRef<'_, E>,
    op_b: Op,
    b: MatRef<'_, E>,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    let mut acc = acc;
    let n = acc.nrows();
    let k = op_dims(a, op_a).1;

    if n <= 16 {
        for j in 0..n {
            let rows = match uplo {
                Uplo::Lower => j..n,
                Uplo::Upper => 0..j + 1,
            };
            for i in rows.clone() {
                let base = match alpha {
                    Some(alpha) => acc.read(i, j) * alpha,
                    None => E::zero(),
                };
                acc.write(i, j, base);
            }
            for l in 0..k {
                let factor = beta * at(b, op_b, l, j);
                if factor == E::zero() {
                    continue;
                }
                for i in rows.clone() {
                    let updated = acc.read(i, j) + at(a, op_a, i, l) * factor;
                    acc.write(i, j, updated);
                }
            }
        }
        return;
    }

    // quadrant recursion: the off-diagonal block is a plain product, the
    // diagonal blocks recurse
    let mid = n / 2;
    let [acc_tl, acc_tr, acc_bl, acc_br] = acc.split_at(mid, mid);
    let (a_top, a_bot) = split_op_rows(a, op_a, mid);
    let (b_left, b_right) = split_op_cols(b, op_b, mid);

    match uplo {
        Uplo::Lower => {
            join_raw(
                |parallelism| {
                    triangular_impl(
                        uplo, acc_tl, op_a, a_top, op_b, b_left, alpha, beta, parallelism,
                    )
                },
                |parallelism| {
                    matmul_impl(acc_bl, op_a, a_bot, op_b, b_left, alpha, beta, parallelism);
                    triangular_impl(
                        uplo, acc_br, op_a, a_bot, op_b, b_right, alpha, beta, parallelism,
                    );
                },
                parallelism,
            );
            drop(acc_tr);
        }
        Uplo::Upper => {
            join_raw(
                |parallelism| {
                    triangular_impl(
                        uplo, acc_tl, op_a, a_top, op_b, b_left, alpha, beta, parallelism,
                    )
                },
                |parallelism| {
                    matmul_impl(acc_tr, op_a, a_top, op_b, b_right, alpha, beta, parallelism);
                    triangular_impl(
                        uplo, acc_br, op_a, a_bot, op_b, b_right, alpha, beta, parallelism,
                    );
                },
                parallelism,
            );
            drop(acc_bl);
        }
    }
}

/// Hermitian rank-k update `acc = alpha * acc + beta * op(a) * op(a)^H`
/// (`op = Normal`) or `beta * op(a)^H * op(a)` (`op = Adjoint`), writing
/// one triangular half of `acc` only.
#[track_caller]
pub fn rank_k_update<E: ComplexField>(
    uplo: Uplo,
    op: Op,
    acc: MatMut<'_, E>,
    a: MatRef<'_, E>,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    match op {
        Op::Normal => {
            triangular_rank_update(uplo, acc, Op::Normal, a, Op::Adjoint, a, alpha, beta, parallelism)
        }
        Op::Adjoint => {
            triangular_rank_update(uplo, acc, Op::Adjoint, a, Op::Normal, a, alpha, beta, parallelism)
        }
        Op::Transpose => panic!("rank-k updates are Hermitian: use Normal or Adjoint"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{c64, Mat};
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_mat(rng: &mut StdRng, m: usize, n: usize) -> Mat<c64> {
        Mat::from_fn(m, n, |_, _| c64::random(rng))
    }

    fn reference_matmul(op_a: Op, a: &Mat<c64>, op_b: Op, b: &Mat<c64>) -> Mat<c64> {
        let (m, k) = op_dims(a.as_ref(), op_a);
        let n = op_dims(b.as_ref(), op_b).1;
        Mat::from_fn(m, n, |i, j| {
            let mut sum = c64::new(0.0, 0.0);
            for l in 0..k {
                sum += at(a.as_ref(), op_a, i, l) * at(b.as_ref(), op_b, l, j);
            }
            sum
        })
    }

    #[test]
    fn matmul_matches_reference() {
        let mut rng = StdRng::seed_from_u64(0);
        for (op_a, op_b) in [
            (Op::Normal, Op::Normal),
            (Op::Normal, Op::Adjoint),
            (Op::Adjoint, Op::Normal),
            (Op::Transpose, Op::Normal),
        ] {
            let (m, n, k) = (7, 5, 6);
            let a = match op_a {
                Op::Normal => random_mat(&mut rng, m, k),
                _ => random_mat(&mut rng, k, m),
            };
            let b = match op_b {
                Op::Normal => random_mat(&mut rng, k, n),
                _ => random_mat(&mut rng, n, k),
            };
            let mut acc = random_mat(&mut rng, m, n);
            let acc_orig = acc.clone();
            let reference = reference_matmul(op_a, &a, op_b, &b);

            matmul(
                acc.as_mut(),
                op_a,
                a.as_ref(),
                op_b,
                b.as_ref(),
                Some(c64::new(1.0, 0.0)),
                -c64::new(1.0, 0.0),
                Parallelism::None,
            );
            for i in 0..m {
                for j in 0..n {
                    let expected = acc_orig.read(i, j) - reference.read(i, j);
                    assert_approx_eq!(acc.read(i, j).re, expected.re, 1e-12);
                    assert_approx_eq!(acc.read(i, j).im, expected.im, 1e-12);
                }
            }
        }
    }

    #[test]
    fn matmul_parallel_agrees() {
        let mut rng = StdRng::seed_from_u64(1);
        let (m, n, k) = (40, 40, 40);
        let a = random_mat(&mut rng, m, k);
        let b = random_mat(&mut rng, k, n);
        let mut seq = Mat::zeros(m, n);
        let mut par = Mat::zeros(m, n);
        matmul(
            seq.as_mut(),
            Op::Normal,
            a.as_ref(),
            Op::Normal,
            b.as_ref(),
            None,
            c64::new(1.0, 0.0),
            Parallelism::None,
        );
        matmul(
            par.as_mut(),
            Op::Normal,
            a.as_ref(),
            Op::Normal,
            b.as_ref(),
            None,
            c64::new(1.0, 0.0),
            Parallelism::Rayon(0),
        );
        for i in 0..m {
            for j in 0..n {
                assert_approx_eq!(seq.read(i, j).re, par.read(i, j).re, 1e-12);
                assert_approx_eq!(seq.read(i, j).im, par.read(i, j).im, 1e-12);
            }
        }
    }

    #[test]
    fn triangular_update_writes_one_half() {
        let mut rng = StdRng::seed_from_u64(2);
        let (n, k) = (20, 8);
        let a = random_mat(&mut rng, n, k);
        let mut acc = Mat::from_fn(n, n, |_, _| c64::new(7.0, 7.0));
        rank_k_update(
            Uplo::Lower,
            Op::Normal,
            acc.as_mut(),
            a.as_ref(),
            Some(c64::new(0.0, 0.0)),
            c64::new(1.0, 0.0),
            Parallelism::None,
        );
        let reference = reference_matmul(Op::Normal, &a, Op::Adjoint, &a);
        for i in 0..n {
            for j in 0..n {
                if i >= j {
                    assert_approx_eq!(acc.read(i, j).re, reference.read(i, j).re, 1e-12);
                    assert_approx_eq!(acc.read(i, j).im, reference.read(i, j).im, 1e-12);
                } else {
                    assert_eq!(acc.read(i, j), c64::new(7.0, 7.0));
                }
            }
        }
    }

    #[test]
    fn herk_adjoint_side() {
        let mut rng = StdRng::seed_from_u64(3);
        let (n, k) = (9, 4);
        let a = random_mat(&mut rng, k, n);
        let mut acc = Mat::zeros(n, n);
        rank_k_update(
            Uplo::Upper,
            Op::Adjoint,
            acc.as_mut(),
            a.as_ref(),
            None,
            c64::new(1.0, 0.0),
            Parallelism::None,
        );
        let reference = reference_matmul(Op::Adjoint, &a, Op::Normal, &a);
        for j in 0..n {
            for i in 0..j + 1 {
                assert_approx_eq!(acc.read(i, j).re, reference.read(i, j).re, 1e-12);
                assert_approx_eq!(acc.read(i, j).im, reference.read(i, j).im, 1e-12);
            }
        }
    }
}
