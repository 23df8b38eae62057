//! Triangular solve on local tiles.

use crate::{join_raw, ComplexField, Diag, MatMut, MatRef, Op, Parallelism, Side, Uplo};
use assert2::assert as fancy_assert;
use reborrow::*;

#[inline(always)]
fn tri_at<E: ComplexField>(a: MatRef<'_, E>, op: Op, i: usize, j: usize) -> E {
    match op {
        Op::Normal => a.read(i, j),
        Op::Transpose => a.read(j, i),
        Op::Adjoint => a.read(j, i).conj(),
    }
}

/// Solves the triangular system in place: `op(a) * X = alpha * b` for
/// `Side::Left`, `X * op(a) = alpha * b` for `Side::Right`, overwriting `b`
/// with `X`.
///
/// `a` is read on the `uplo` half only (plus the diagonal unless `diag` is
/// `Diag::Unit`).
///
/// # Panics
///
/// Panics if `a` is not square or `b` does not conform with the chosen
/// side.
#[track_caller]
pub fn trsm<E: ComplexField>(
    side: Side,
    uplo: Uplo,
    op: Op,
    diag: Diag,
    alpha: E,
    a: MatRef<'_, E>,
    b: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    fancy_assert!(a.nrows() == a.ncols(), "triangular operand must be square");
    match side {
        Side::Left => fancy_assert!(b.nrows() == a.ncols()),
        Side::Right => fancy_assert!(b.ncols() == a.nrows()),
    }

    let mut b = b;
    if alpha != E::one() {
        let ncols = b.ncols();
        for j in 0..ncols {
            for value in b.rb_mut().col_mut(j) {
                *value *= alpha;
            }
        }
    }
    solve_impl(side, uplo, op, diag, a, b, parallelism);
}

fn solve_impl<E: ComplexField>(
    side: Side,
    uplo: Uplo,
    op: Op,
    diag: Diag,
    a: MatRef<'_, E>,
    b: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    // independent right-hand sides split across the free dimension
    let split = match side {
        Side::Left => b.ncols(),
        Side::Right => b.nrows(),
    };
    if split >= 2 && a.nrows() * split >= 64 * 64 {
        if let Parallelism::Rayon(_) = parallelism {
            let mid = split / 2;
            let (b_first, b_second) = match side {
                Side::Left => b.split_at_col(mid),
                Side::Right => b.split_at_row(mid),
            };
            join_raw(
                |parallelism| solve_impl(side, uplo, op, diag, a, b_first, parallelism),
                |parallelism| solve_impl(side, uplo, op, diag, a, b_second, parallelism),
                parallelism,
            );
            return;
        }
    }

    // transposition flips the effective triangle
    let effective_upper = (uplo == Uplo::Upper) == (op == Op::Normal);
    let n = a.nrows();
    let mut b = b;

    match side {
        Side::Left => {
            let ncols = b.ncols();
            for j in 0..ncols {
                if effective_upper {
                    for i in (0..n).rev() {
                        let mut value = b.read(i, j);
                        for l in i + 1..n {
                            value = value - tri_at(a, op, i, l) * b.read(l, j);
                        }
                        if diag == Diag::NonUnit {
                            value = value * tri_at(a, op, i, i).inv();
                        }
                        b.write(i, j, value);
                    }
                } else {
                    for i in 0..n {
                        let mut value = b.read(i, j);
                        for l in 0..i {
                            value = value - tri_at(a, op, i, l) * b.read(l, j);
                        }
                        if diag == Diag::NonUnit {
                            value = value * tri_at(a, op, i, i).inv();
                        }
                        b.write(i, j, value);
                    }
                }
            }
        }
        Side::Right => {
            // X * M = B: column j of X depends on the columns M couples it
            // with, i.e. the rows of column j of M
            let nrows = b.nrows();
            if effective_upper {
                for j in 0..n {
                    for l in 0..j {
                        let factor = tri_at(a, op, l, j);
                        if factor == E::zero() {
                            continue;
                        }
                        for i in 0..nrows {
                            let updated = b.read(i, j) - b.read(i, l) * factor;
                            b.write(i, j, updated);
                        }
                    }
                    if diag == Diag::NonUnit {
                        let inv = tri_at(a, op, j, j).inv();
                        for i in 0..nrows {
                            let scaled = b.read(i, j) * inv;
                            b.write(i, j, scaled);
                        }
                    }
                }
            } else {
                for j in (0..n).rev() {
                    for l in j + 1..n {
                        let factor = tri_at(a, op, l, j);
                        if factor == E::zero() {
                            continue;
                        }
                        for i in 0..nrows {
                            let updated = b.read(i, j) - b.read(i, l) * factor;
                            b.write(i, j, updated);
                        }
                    }
                    if diag == Diag::NonUnit {
                        let inv = tri_at(a, op, j, j).inv();
                        for i in 0..nrows {
                            let scaled = b.read(i, j) * inv;
                            b.write(i, j, scaled);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{c64, mul, Mat};
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_triangular(rng: &mut StdRng, n: usize, uplo: Uplo) -> Mat<c64> {
        Mat::from_fn(n, n, |i, j| {
            let keep = match uplo {
                Uplo::Lower => i >= j,
                Uplo::Upper => i <= j,
            };
            if i == j {
                // well away from singular
                c64::new(2.0 + c64::random(rng).re, 0.5)
            } else if keep {
                c64::random(rng)
            } else {
                c64::new(0.0, 0.0)
            }
        })
    }

    fn check_solution(side: Side, op: Op, a: &Mat<c64>, x: &Mat<c64>, b: &Mat<c64>, alpha: c64) {
        let (m, n) = (x.nrows(), x.ncols());
        let mut lhs = Mat::zeros(m, n);
        match side {
            Side::Left => mul::matmul(
                lhs.as_mut(),
                op,
                a.as_ref(),
                Op::Normal,
                x.as_ref(),
                None,
                c64::new(1.0, 0.0),
                Parallelism::None,
            ),
            Side::Right => mul::matmul(
                lhs.as_mut(),
                Op::Normal,
                x.as_ref(),
                op,
                a.as_ref(),
                None,
                c64::new(1.0, 0.0),
                Parallelism::None,
            ),
        }
        for i in 0..m {
            for j in 0..n {
                let expected = b.read(i, j) * alpha;
                assert_approx_eq!(lhs.read(i, j).re, expected.re, 1e-10);
                assert_approx_eq!(lhs.read(i, j).im, expected.im, 1e-10);
            }
        }
    }

    #[test]
    fn solves_every_case() {
        let mut rng = StdRng::seed_from_u64(7);
        let alpha = c64::new(1.5, -0.5);
        for side in [Side::Left, Side::Right] {
            for uplo in [Uplo::Lower, Uplo::Upper] {
                for op in [Op::Normal, Op::Transpose, Op::Adjoint] {
                    let (n, k) = (8, 5);
                    let a = random_triangular(&mut rng, n, uplo);
                    let b = match side {
                        Side::Left => Mat::from_fn(n, k, |_, _| c64::random(&mut rng)),
                        Side::Right => Mat::from_fn(k, n, |_, _| c64::random(&mut rng)),
                    };
                    let mut x = b.clone();
                    trsm(
                        side,
                        uplo,
                        op,
                        Diag::NonUnit,
                        alpha,
                        a.as_ref(),
                        x.as_mut(),
                        Parallelism::None,
                    );
                    check_solution(side, op, &a, &x, &b, alpha);
                }
            }
        }
    }

    #[test]
    fn unit_diagonal_skips_division() {
        let mut rng = StdRng::seed_from_u64(8);
        let n = 6;
        let mut a = random_triangular(&mut rng, n, Uplo::Lower);
        // the unit variant must never read the stored diagonal
        for i in 0..n {
            a.write(i, i, c64::new(f64::NAN, f64::NAN));
        }
        let b = Mat::from_fn(n, 3, |_, _| c64::random(&mut rng));
        let mut x = b.clone();
        trsm(
            Side::Left,
            Uplo::Lower,
            Op::Normal,
            Diag::Unit,
            c64::new(1.0, 0.0),
            a.as_ref(),
            x.as_mut(),
            Parallelism::None,
        );
        let mut unit = a.clone();
        for i in 0..n {
            unit.write(i, i, c64::new(1.0, 0.0));
        }
        check_solution(Side::Left, Op::Normal, &unit, &x, &b, c64::new(1.0, 0.0));
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(9);
        let (n, k) = (64, 80);
        let a = random_triangular(&mut rng, n, Uplo::Upper);
        let b = Mat::from_fn(n, k, |_, _| c64::random(&mut rng));
        let mut seq = b.clone();
        let mut par = b.clone();
        trsm(
            Side::Left,
            Uplo::Upper,
            Op::Adjoint,
            Diag::NonUnit,
            c64::new(1.0, 0.0),
            a.as_ref(),
            seq.as_mut(),
            Parallelism::None,
        );
        trsm(
            Side::Left,
            Uplo::Upper,
            Op::Adjoint,
            Diag::NonUnit,
            c64::new(1.0, 0.0),
            a.as_ref(),
            par.as_mut(),
            Parallelism::Rayon(0),
        );
        for i in 0..n {
            for j in 0..k {
                assert_approx_eq!(seq.read(i, j).re, par.read(i, j).re, 1e-12);
                assert_approx_eq!(seq.read(i, j).im, par.read(i, j).im, 1e-12);
            }
        }
    }
}
