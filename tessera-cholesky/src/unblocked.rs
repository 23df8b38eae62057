//! Unblocked Cholesky kernels.
//!
//! These run on a tile that is entirely resident on the calling process
//! (serial base cases, or the replicated diagonal block of the distributed
//! sweeps). The forward variants factor `A = L L^H` / `A = U^H U`; the
//! reverse variants sweep from the last diagonal entry and produce
//! `A = L^H L` / `A = U U^H`.

use crate::CholeskyError;
use assert2::assert as fancy_assert;
use num_traits::Zero;
use tessera_core::{ComplexField, MatMut, RealField};

/// Factors the lower triangle in place: `A = L L^H`, forward sweep.
///
/// On failure the leading diagonal entries up to the offending one hold the
/// partial factor and the rest of the matrix is unspecified.
#[track_caller]
pub fn lower<E: ComplexField>(a: MatMut<'_, E>) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.nrows() == a.ncols(),
        "can only compute the Cholesky factor of square matrices"
    );
    let n = a.nrows();
    for j in 0..n {
        let alpha = a.read(j, j).real();
        if alpha <= E::Real::zero() {
            return Err(CholeskyError);
        }
        let alpha = alpha.sqrt();
        a.write(j, j, E::from_real(alpha));

        let alpha_inv = alpha.inv();
        for i in j + 1..n {
            let scaled = a.read(i, j).scale_real(alpha_inv);
            a.write(i, j, scaled);
        }

        for k in j + 1..n {
            let pivot = a.read(k, j).conj();
            for i in k..n {
                let updated = a.read(i, k) - a.read(i, j) * pivot;
                a.write(i, k, updated);
            }
        }
    }
    Ok(())
}

/// Factors the upper triangle in place: `A = U^H U`, forward sweep.
#[track_caller]
pub fn upper<E: ComplexField>(a: MatMut<'_, E>) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.nrows() == a.ncols(),
        "can only compute the Cholesky factor of square matrices"
    );
    let n = a.nrows();
    for j in 0..n {
        let alpha = a.read(j, j).real();
        if alpha <= E::Real::zero() {
            return Err(CholeskyError);
        }
        let alpha = alpha.sqrt();
        a.write(j, j, E::from_real(alpha));

        let alpha_inv = alpha.inv();
        for k in j + 1..n {
            let scaled = a.read(j, k).scale_real(alpha_inv);
            a.write(j, k, scaled);
        }

        for k in j + 1..n {
            let pivot = a.read(j, k);
            for i in j + 1..k + 1 {
                let updated = a.read(i, k) - a.read(j, i).conj() * pivot;
                a.write(i, k, updated);
            }
        }
    }
    Ok(())
}

/// Factors the upper triangle in place with a reverse sweep: `A = U U^H`.
#[track_caller]
pub fn reverse_upper<E: ComplexField>(a: MatMut<'_, E>) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.nrows() == a.ncols(),
        "can only compute the Cholesky factor of square matrices"
    );
    let n = a.nrows();
    for j in (0..n).rev() {
        let alpha = a.read(j, j).real();
        if alpha <= E::Real::zero() {
            return Err(CholeskyError);
        }
        let alpha = alpha.sqrt();
        a.write(j, j, E::from_real(alpha));

        let alpha_inv = alpha.inv();
        for i in 0..j {
            let scaled = a.read(i, j).scale_real(alpha_inv);
            a.write(i, j, scaled);
        }

        for i in 0..j {
            let pivot = a.read(i, j);
            for k in i..j {
                let updated = a.read(i, k) - a.read(k, j).conj() * pivot;
                a.write(i, k, updated);
            }
        }
    }
    Ok(())
}

/// Factors the lower triangle in place with a reverse sweep: `A = L^H L`.
#[track_caller]
pub fn reverse_lower<E: ComplexField>(a: MatMut<'_, E>) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.nrows() == a.ncols(),
        "can only compute the Cholesky factor of square matrices"
    );
    let n = a.nrows();
    for j in (0..n).rev() {
        let alpha = a.read(j, j).real();
        if alpha <= E::Real::zero() {
            return Err(CholeskyError);
        }
        let alpha = alpha.sqrt();
        a.write(j, j, E::from_real(alpha));

        let alpha_inv = alpha.inv();
        for i in 0..j {
            let scaled = a.read(j, i).scale_real(alpha_inv);
            a.write(j, i, scaled);
        }

        for i in 0..j {
            let pivot = a.read(j, i);
            for k in i..j {
                let updated = a.read(k, i) - a.read(j, k).conj() * pivot;
                a.write(k, i, updated);
            }
        }
    }
    Ok(())
}
