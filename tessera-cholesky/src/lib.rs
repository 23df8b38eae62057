//! Blocked Cholesky factorization of Hermitian positive-definite matrices,
//! serial and distributed.
//!
//! The factorization runs in place: on success the chosen triangular half
//! of the input holds the factor and the opposite strict half is left
//! untouched. Four blocked sweeps are provided through [`Variant`]:
//!
//! * [`Variant::LVar2`]: lower, left-looking;
//! * [`Variant::LVar3`]: lower, right-looking;
//! * [`Variant::UVar3`]: upper, right-looking;
//! * [`Variant::ReverseUVar3`]: upper, sweeping from the last diagonal
//!   block (`A = U U^H`).
//!
//! The distributed sweeps operate on `[MC, MR]` matrices over a process
//! grid. Only the current panel and the replicated diagonal block are ever
//! communicated; trailing updates stay in reduce-scatter form or run as
//! local triangular rank-k updates over replicated spreads of the panel.
//!
//! A failed positivity check aborts the factorization with
//! [`CholeskyError`] on every rank, leaving the matrix in an unspecified
//! partially-updated state.

use assert2::assert as fancy_assert;
use tessera_core::{ComplexField, Dist, DistMat, DistMatMut, MatMut, Parallelism, Uplo};

pub mod lower;
pub mod unblocked;
pub mod upper;

/// The matrix was not numerically Hermitian positive-definite: an
/// eliminated diagonal entry came out non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CholeskyError;

impl core::fmt::Display for CholeskyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("matrix was not numerically HPD")
    }
}

impl std::error::Error for CholeskyError {}

/// Default algorithmic block size of the blocked sweeps.
pub const DEFAULT_BLOCK_SIZE: usize = 32;

/// Tuning knobs of the blocked sweeps. The block size is decoupled from
/// the grid shape and may be overridden per call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CholeskyParams {
    pub block_size: usize,
}

impl Default for CholeskyParams {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Which blocked sweep to run, by its classical variant name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Lower, left-looking.
    LVar2,
    /// Lower, right-looking.
    LVar3,
    /// Upper, right-looking.
    UVar3,
    /// Upper, reverse sweep (`A = U U^H`).
    ReverseUVar3,
}

/// Serial in-place blocked Cholesky factorization.
#[track_caller]
pub fn cholesky_in_place<E: ComplexField>(
    variant: Variant,
    a: MatMut<'_, E>,
    params: CholeskyParams,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    match variant {
        Variant::LVar2 => lower::left_looking(a, params, parallelism),
        Variant::LVar3 => lower::right_looking(a, params, parallelism),
        Variant::UVar3 => upper::forward(a, params, parallelism),
        Variant::ReverseUVar3 => upper::reverse(a, params, parallelism),
    }
}

/// Distributed in-place blocked Cholesky factorization of an `[MC, MR]`
/// matrix.
///
/// This is a collective over the owning grid; every in-grid rank returns
/// the same verdict.
#[track_caller]
pub fn cholesky_in_place_dist<'g, E: ComplexField>(
    variant: Variant,
    a: DistMatMut<'g, '_, E>,
    params: CholeskyParams,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    match variant {
        Variant::LVar2 => lower::left_looking_dist(a, params, parallelism),
        Variant::LVar3 => lower::right_looking_dist(a, params, parallelism),
        Variant::UVar3 => upper::forward_dist(a, params, parallelism),
        Variant::ReverseUVar3 => upper::reverse_dist(a, params, parallelism),
    }
}

/// Forward unblocked factorization of a replicated `[*, *]` tile. Every
/// replica runs the identical kernel, so the verdict agrees on all ranks
/// without communication; ranks outside the grid hold no tile and report
/// success.
#[track_caller]
pub fn local_cholesky<E: ComplexField>(
    uplo: Uplo,
    a: &mut DistMat<'_, E>,
) -> Result<(), CholeskyError> {
    fancy_assert!(
        a.col_dist() == Dist::Star && a.row_dist() == Dist::Star,
        "the local kernel factors replicated tiles"
    );
    if !a.grid().in_grid() {
        return Ok(());
    }
    match uplo {
        Uplo::Lower => unblocked::lower(a.local_mut()),
        Uplo::Upper => unblocked::upper(a.local_mut()),
    }
}

/// Reverse-sweep counterpart of [`local_cholesky`].
#[track_caller]
pub fn local_reverse_cholesky<E: ComplexField>(
    uplo: Uplo,
    a: &mut DistMat<'_, E>,
) -> Result<(), CholeskyError> {
    fancy_assert!(
        a.col_dist() == Dist::Star && a.row_dist() == Dist::Star,
        "the local kernel factors replicated tiles"
    );
    if !a.grid().in_grid() {
        return Ok(());
    }
    match uplo {
        Uplo::Lower => unblocked::reverse_lower(a.local_mut()),
        Uplo::Upper => unblocked::reverse_upper(a.local_mut()),
    }
}
