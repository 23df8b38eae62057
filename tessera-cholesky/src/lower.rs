//! Blocked lower Cholesky sweeps, `A = L L^H`.
//!
//! [`left_looking`] applies the already-factored panel to each diagonal
//! block just before factoring it (classical variant 2);
//! [`right_looking`] factors the diagonal block first and immediately
//! updates the trailing matrix (variant 3). The distributed forms follow
//! the same update sequences, with each panel operation realized by
//! redistributing the small operands into layouts that make the kernel
//! local: the trailing matrix itself never travels.

use crate::{local_cholesky, unblocked, CholeskyError, CholeskyParams};
use assert2::assert as fancy_assert;
use reborrow::*;
use tessera_core::dist_blas::{local_gemm, local_trrk, local_trsm};
use tessera_core::{
    mul, solve, ComplexField, Diag, Dist, DistMat, DistMatMut, MatMut, Op, Parallelism, Side, Uplo,
};

/// Serial left-looking blocked sweep.
#[track_caller]
pub fn left_looking<E: ComplexField>(
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
        let (mid, bot) = rows.split_at_row(nb);
        let (a10, mid_rest) = mid.split_at_col(k);
        let (mut a11, _) = mid_rest.split_at_col(nb);
        let (a20, bot_rest) = bot.split_at_col(k);
        let (mut a21, _) = bot_rest.split_at_col(nb);

        mul::rank_k_update(
            Uplo::Lower,
            Op::Normal,
            a11.rb_mut(),
            a10.rb(),
            Some(E::one()),
            -E::one(),
            parallelism,
        );
        unblocked::lower(a11.rb_mut())?;
        mul::matmul(
            a21.rb_mut(),
            Op::Normal,
            a20.rb(),
            Op::Adjoint,
            a10.rb(),
            Some(E::one()),
            -E::one(),
            parallelism,
        );
        solve::trsm(
            Side::Right,
            Uplo::Lower,
            Op::Adjoint,
            Diag::NonUnit,
            E::one(),
            a11.rb(),
            a21.rb_mut(),
            parallelism,
        );

        k += nb;
    }
    Ok(())
}

/// Serial right-looking blocked sweep.
#[track_caller]
pub fn right_looking<E: ComplexField>(
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
        let [mut a11, _, mut a21, mut a22] = trailing.split_at(nb, nb);

        unblocked::lower(a11.rb_mut())?;
        solve::trsm(
            Side::Right,
            Uplo::Lower,
            Op::Adjoint,
            Diag::NonUnit,
            E::one(),
            a11.rb(),
            a21.rb_mut(),
            parallelism,
        );
        mul::rank_k_update(
            Uplo::Lower,
            Op::Normal,
            a22.rb_mut(),
            a21.rb(),
            Some(E::one()),
            -E::one(),
            parallelism,
        );

        k += nb;
    }
    Ok(())
}

/// Distributed left-looking blocked sweep on an `[MC, MR]` matrix.
///
/// Per block: the adjoint of the factored panel is spread into `[MR, *]`,
/// the partial products `A10 A10^H` and `A20 A10^H` are formed locally in
/// `[MC, *]` and reduce-scattered into the diagonal block and the current
/// panel, the diagonal block is replicated, factored by the unblocked
/// kernel and pushed back, and the panel solve runs on `[VC, *]` rows
/// against the replicated triangle.
#[track_caller]
pub fn left_looking_dist<'g, E: ComplexField>(
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

    let mut a10_adj = DistMat::<E>::new(grid, Dist::MR, Dist::Star);
    let mut a11_rep = DistMat::<E>::new(grid, Dist::Star, Dist::Star);
    let mut a21_vc = DistMat::<E>::new(grid, Dist::VC, Dist::Star);
    let mut x11 = DistMat::<E>::new(grid, Dist::MC, Dist::Star);
    let mut x21 = DistMat::<E>::new(grid, Dist::MC, Dist::Star);

    let mut k = 0;
    while k < n {
        let nb = Ord::min(params.block_size, n - k);
        let (_, rows) = a.rb_mut().split_at_row(k);
        let (mid, bot) = rows.split_at_row(nb);
        let (a10, mid_rest) = mid.split_at_col(k);
        let (mut a11, _) = mid_rest.split_at_col(nb);
        let (a20, bot_rest) = bot.split_at_col(k);
        let (mut a21, _) = bot_rest.split_at_col(nb);

        a10_adj.align_cols_with(a10.rb());
        a10_adj.adjoint_from(a10.rb());

        x11.align_cols_with(a10.rb());
        local_gemm(&mut x11, a10.rb(), a10_adj.as_ref(), E::one(), parallelism);
        a11.sum_scatter_update(-E::one(), x11.as_ref());

        a11_rep.assign(a11.rb());
        local_cholesky(Uplo::Lower, &mut a11_rep)?;
        a11.assign(a11_rep.as_ref());

        x21.align_cols_with(a20.rb());
        local_gemm(&mut x21, a20.rb(), a10_adj.as_ref(), E::one(), parallelism);
        a21.sum_scatter_update(-E::one(), x21.as_ref());

        a21_vc.assign(a21.rb());
        local_trsm(
            Side::Right,
            Uplo::Lower,
            Op::Adjoint,
            Diag::NonUnit,
            E::one(),
            a11_rep.as_ref(),
            &mut a21_vc,
            parallelism,
        );
        a21.assign(a21_vc.as_ref());

        k += nb;
    }
    Ok(())
}

/// Distributed right-looking blocked sweep on an `[MC, MR]` matrix.
///
/// Per block: the diagonal block is replicated and factored, the panel
/// moves to `[VC, *]` for the local triangular solve, its transpose and
/// adjoint are spread into `[*, MC]` and `[*, MR]`, and the trailing
/// update runs as a local triangular rank-k over those replicated spreads.
#[track_caller]
pub fn right_looking_dist<'g, E: ComplexField>(
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
    let mut a21_vc = DistMat::<E>::new(grid, Dist::VC, Dist::Star);
    let mut a21_vr = DistMat::<E>::new(grid, Dist::VR, Dist::Star);
    let mut a21_trans = DistMat::<E>::new(grid, Dist::Star, Dist::MC);
    let mut a21_adj = DistMat::<E>::new(grid, Dist::Star, Dist::MR);

    let mut k = 0;
    while k < n {
        let nb = Ord::min(params.block_size, n - k);
        let (_, rows) = a.rb_mut().split_at_row(k);
        let (_, trailing) = rows.split_at_col(k);
        let [mut a11, _, mut a21, mut a22] = trailing.split_at(nb, nb);

        a11_rep.assign(a11.rb());
        local_cholesky(Uplo::Lower, &mut a11_rep)?;
        a11.assign(a11_rep.as_ref());

        a21_vc.align_cols_with(a22.rb());
        a21_vc.assign(a21.rb());
        local_trsm(
            Side::Right,
            Uplo::Lower,
            Op::Adjoint,
            Diag::NonUnit,
            E::one(),
            a11_rep.as_ref(),
            &mut a21_vc,
            parallelism,
        );

        a21_vr.align_cols_with(a22.rb());
        a21_vr.assign(a21_vc.as_ref());
        a21_trans.align_rows_with(a22.rb());
        a21_trans.transpose_from(a21_vc.as_ref());
        a21_adj.align_rows_with(a22.rb());
        a21_adj.adjoint_from(a21_vr.as_ref());

        local_trrk(
            Uplo::Lower,
            a22.rb_mut(),
            Op::Transpose,
            a21_trans.as_ref(),
            a21_adj.as_ref(),
            E::one(),
            -E::one(),
            parallelism,
        );
        a21.transpose_from(a21_trans.as_ref());

        k += nb;
    }
    Ok(())
}
