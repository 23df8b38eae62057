//! Blocked upper Cholesky sweeps.
//!
//! [`forward`] factors `A = U^H U` sweeping from the first diagonal block;
//! [`reverse`] factors `A = U U^H` sweeping from the last. The distributed
//! forms mirror the lower sweeps: replicate the diagonal block, solve the
//! panel in a vector layout, spread its transpose/adjoint, and fold the
//! trailing update into a local triangular rank-k.

use crate::{local_cholesky, local_reverse_cholesky, unblocked, CholeskyError, CholeskyParams};
use assert2::assert as fancy_assert;
use reborrow::*;
use tessera_core::dist_blas::{local_trrk, local_trsm};
use tessera_core::{
    mul, solve, ComplexField, Diag, Dist, DistMat, DistMatMut, MatMut, Op, Parallelism, Side, Uplo,
};

/// Serial right-looking upper sweep.
#[track_caller]
pub fn forward<E: ComplexField>(
    a: MatMut<'_, E>,
    params: CholeskyParams,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.nrows() == a.ncols(),
        "can only compute the Cholesky factor of square matrices"
    );
    fancy_assert!(params.block_size > 0);
    let n = a.nrows();
    let mut k = 0;
    while k < n {
        let nb = Ord::min(params.block_size, n - k);
        let (_, rows) = a.rb_mut().split_at_row(k);
        let (_, trailing) = rows.split_at_col(k);
        let [mut a11, mut a12, _, mut a22] = trailing.split_at(nb, nb);

        unblocked::upper(a11.rb_mut())?;
        solve::trsm(
            Side::Left,
            Uplo::Upper,
            Op::Adjoint,
            Diag::NonUnit,
            E::one(),
            a11.rb(),
            a12.rb_mut(),
            parallelism,
        );
        mul::rank_k_update(
            Uplo::Upper,
            Op::Adjoint,
            a22.rb_mut(),
            a12.rb(),
            Some(E::one()),
            -E::one(),
            parallelism,
        );

        k += nb;
    }
    Ok(())
}

/// Serial reverse upper sweep, factoring from the last diagonal block.
#[track_caller]
pub fn reverse<E: ComplexField>(
    a: MatMut<'_, E>,
    params: CholeskyParams,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.nrows() == a.ncols(),
        "can only compute the Cholesky factor of square matrices"
    );
    fancy_assert!(params.block_size > 0);
    let n = a.nrows();
    let mut k = 0;
    while k < n {
        let nb = Ord::min(params.block_size, n - k);
        let leading = n - (k + nb);
        let [mut a00, right, _, corner] = a.rb_mut().split_at(leading, leading);
        let (mut a01, _) = right.split_at_col(nb);
        let [mut a11, _, _, _] = corner.split_at(nb, nb);

        unblocked::reverse_upper(a11.rb_mut())?;
        solve::trsm(
            Side::Right,
            Uplo::Upper,
            Op::Normal,
            Diag::NonUnit,
            E::one(),
            a11.rb(),
            a01.rb_mut(),
            parallelism,
        );
        mul::rank_k_update(
            Uplo::Upper,
            Op::Normal,
            a00.rb_mut(),
            a01.rb(),
            Some(E::one()),
            -E::one(),
            parallelism,
        );

        k += nb;
    }
    Ok(())
}

/// Distributed right-looking upper sweep on an `[MC, MR]` matrix.
#[track_caller]
pub fn forward_dist<'g, E: ComplexField>(
    a: DistMatMut<'g, '_, E>,
    params: CholeskyParams,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.height() == a.width(),
        "can only compute the Cholesky factor of square matrices"
    );
    fancy_assert!(
        a.col_dist() == Dist::MC && a.row_dist() == Dist::MR,
        "the blocked sweeps factor [MC, MR] matrices"
    );
    fancy_assert!(params.block_size > 0);
    let grid = a.grid();
    let n = a.height();

    let mut a11_rep = DistMat::<E>::new(grid, Dist::Star, Dist::Star);
    let mut a12_vr = DistMat::<E>::new(grid, Dist::Star, Dist::VR);
    let mut a12_mc = DistMat::<E>::new(grid, Dist::Star, Dist::MC);
    let mut a12_mr = DistMat::<E>::new(grid, Dist::Star, Dist::MR);

    let mut k = 0;
    while k < n {
        let nb = Ord::min(params.block_size, n - k);
        let (_, rows) = a.rb_mut().split_at_row(k);
        let (_, trailing) = rows.split_at_col(k);
        let [mut a11, mut a12, _, mut a22] = trailing.split_at(nb, nb);

        a11_rep.assign(a11.rb());
        local_cholesky(Uplo::Upper, &mut a11_rep)?;
        a11.assign(a11_rep.as_ref());

        a12_vr.align_rows_with(a22.rb());
        a12_vr.assign(a12.rb());
        local_trsm(
            Side::Left,
            Uplo::Upper,
            Op::Adjoint,
            Diag::NonUnit,
            E::one(),
            a11_rep.as_ref(),
            &mut a12_vr,
            parallelism,
        );

        a12_mc.align_rows_with(a22.rb());
        a12_mc.assign(a12_vr.as_ref());
        a12_mr.align_rows_with(a22.rb());
        a12_mr.assign(a12_vr.as_ref());

        local_trrk(
            Uplo::Upper,
            a22.rb_mut(),
            Op::Adjoint,
            a12_mc.as_ref(),
            a12_mr.as_ref(),
            E::one(),
            -E::one(),
            parallelism,
        );
        a12.assign(a12_mr.as_ref());

        k += nb;
    }
    Ok(())
}

/// Distributed reverse upper sweep on an `[MC, MR]` matrix.
#[track_caller]
pub fn reverse_dist<'g, E: ComplexField>(
    a: DistMatMut<'g, '_, E>,
    params: CholeskyParams,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut a = a;
    fancy_assert!(
        a.height() == a.width(),
        "can only compute the Cholesky factor of square matrices"
    );
    fancy_assert!(
        a.col_dist() == Dist::MC && a.row_dist() == Dist::MR,
        "the blocked sweeps factor [MC, MR] matrices"
    );
    fancy_assert!(params.block_size > 0);
    let grid = a.grid();
    let n = a.height();

    let mut a11_rep = DistMat::<E>::new(grid, Dist::Star, Dist::Star);
    let mut a01_vc = DistMat::<E>::new(grid, Dist::VC, Dist::Star);
    let mut a01_vr = DistMat::<E>::new(grid, Dist::VR, Dist::Star);
    let mut a01_trans = DistMat::<E>::new(grid, Dist::Star, Dist::MC);
    let mut a01_adj = DistMat::<E>::new(grid, Dist::Star, Dist::MR);

    let mut k = 0;
    while k < n {
        let nb = Ord::min(params.block_size, n - k);
        let leading = n - (k + nb);
        let [mut a00, right, _, corner] = a.rb_mut().split_at(leading, leading);
        let (mut a01, _) = right.split_at_col(nb);
        let [mut a11, _, _, _] = corner.split_at(nb, nb);

        a11_rep.assign(a11.rb());
        local_reverse_cholesky(Uplo::Upper, &mut a11_rep)?;
        a11.assign(a11_rep.as_ref());

        a01_vc.align_cols_with(a00.rb());
        a01_vc.assign(a01.rb());
        local_trsm(
            Side::Right,
            Uplo::Upper,
            Op::Normal,
            Diag::NonUnit,
            E::one(),
            a11_rep.as_ref(),
            &mut a01_vc,
            parallelism,
        );

        a01_vr.align_cols_with(a00.rb());
        a01_vr.assign(a01_vc.as_ref());
        a01_trans.align_rows_with(a00.rb());
        a01_trans.transpose_from(a01_vc.as_ref());
        a01_adj.align_rows_with(a00.rb());
        a01_adj.adjoint_from(a01_vr.as_ref());

        local_trrk(
            Uplo::Upper,
            a00.rb_mut(),
            Op::Transpose,
            a01_trans.as_ref(),
            a01_adj.as_ref(),
            E::one(),
            -E::one(),
            parallelism,
        );
        a01.transpose_from(a01_trans.as_ref());

        k += nb;
    }
    Ok(())
}
