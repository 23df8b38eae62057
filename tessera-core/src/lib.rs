//! `tessera-core` is the distribution layer of the tessera linear algebra
//! engine. It contains the building blocks that the solver crates are written
//! against:
//!
//! * Local matrix types: [`Mat`], [`MatRef`], and [`MatMut`], the strided
//! column-major tiles owned by a single process.
//! * The messaging contract and its backends: the [`comm`] module.
//! * The process grid: the [`grid`] module.
//! * Distributed matrices and redistribution between cyclic layouts: the
//! [`dist`] module.
//! * Reference BLAS-3 kernels on local tiles: the [`mul`] and [`solve`]
//! modules, plus their distributed-operand wrappers in [`dist_blas`].
//!
//! # Example
//! ```
//! use tessera_core::{mat, Mat};
//!
//! let a = mat![
//!     [1.0, 4.0],
//!     [2.0, 5.0],
//!     [3.0, 6.0f64],
//! ];
//!
//! let b = Mat::<f64>::from_fn(3, 2, |i, j| (i + j) as f64);
//! assert_eq!(a.read(2, 1), 6.0);
//! assert_eq!(b.read(2, 1), 3.0);
//! ```
//!
//! # Ownership of storage
//!
//! A [`Mat`] owns its storage and may be resized. [`MatRef`] and [`MatMut`]
//! are borrowed views: a `MatRef` may alias other `MatRef`s, a `MatMut` is
//! exclusive, and neither can ever be resized. The same split is used one
//! level up for distributed matrices ([`dist::DistMat`],
//! [`dist::DistMatRef`], [`dist::DistMatMut`]), so "is this a locked view?"
//! is a question answered by the type system rather than at run time.

use assert2::assert as fancy_assert;
use bytemuck::Pod;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};
use num_complex::Complex;
use num_traits::{Num, NumAssign, One, Zero};
use rand::Rng;

pub mod comm;
pub mod dist;
pub mod dist_blas;
pub mod grid;
pub mod mul;
pub mod solve;

mod redist;

pub use dist::{Dist, DistMat, DistMatMut, DistMatRef};
pub use grid::Grid;

/// Native complex floating point types with interleaved real and imaginary
/// parts, the layout expected by the packing routines and the messaging
/// layer.
#[allow(non_camel_case_types)]
pub type c32 = Complex<f32>;
/// See [`c32`].
#[allow(non_camel_case_types)]
pub type c64 = Complex<f64>;

/// Whether an operand is used as-is, transposed, or conjugate-transposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Normal,
    Transpose,
    Adjoint,
}

/// Which triangular half of a matrix an operation reads or writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Uplo {
    Lower,
    Upper,
}

/// Which side a triangular operand (or a trapezoidal region) is applied on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Whether a triangular operand has an implicit unit diagonal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diag {
    Unit,
    NonUnit,
}

/// Parallelism strategy that can be passed to the local kernels.
///
/// Parallelism never crosses a communication boundary: it only splits loop
/// nests inside a single process's tile, and every kernel produces the same
/// result whichever strategy is selected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parallelism {
    /// No parallelism. The code is executed sequentially on the calling
    /// thread.
    None,
    /// Rayon parallelism, on the current thread plus the active rayon thread
    /// pool. The contained value is a hint for the number of threads to use,
    /// with `0` meaning `rayon::current_num_threads()`.
    Rayon(usize),
}

#[inline]
#[doc(hidden)]
pub fn join_raw(
    op_a: impl Send + FnOnce(Parallelism),
    op_b: impl Send + FnOnce(Parallelism),
    parallelism: Parallelism,
) {
    fn implementation(
        op_a: &mut (dyn Send + FnMut(Parallelism)),
        op_b: &mut (dyn Send + FnMut(Parallelism)),
        parallelism: Parallelism,
    ) {
        match parallelism {
            Parallelism::None => {
                op_a(parallelism);
                op_b(parallelism);
            }
            Parallelism::Rayon(n_threads) => {
                if n_threads == 1 {
                    op_a(Parallelism::None);
                    op_b(Parallelism::None);
                } else {
                    let n_threads = if n_threads > 0 {
                        n_threads
                    } else {
                        rayon::current_num_threads()
                    };
                    let parallelism = Parallelism::Rayon(n_threads - n_threads / 2);
                    rayon::join(|| op_a(parallelism), || op_b(parallelism));
                }
            }
        }
    }
    let mut op_a = Some(op_a);
    let mut op_b = Some(op_b);
    implementation(
        &mut |parallelism| (op_a.take().unwrap())(parallelism),
        &mut |parallelism| (op_b.take().unwrap())(parallelism),
        parallelism,
    )
}

/// Unified real and complex scalar abstraction.
///
/// The four supported element types are [`f32`], [`f64`], [`c32`] and
/// [`c64`]. Every scalar projects onto an associated real base type
/// ([`ComplexField::Real`]) used for norms and diagonals.
///
/// The [`Pod`] bound is what lets tiles and packed buffers travel through
/// the byte-oriented messaging layer without any per-type plumbing.
pub trait ComplexField:
    Copy
    + Send
    + Sync
    + Debug
    + PartialEq
    + 'static
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + Pod
{
    /// Real base type of this scalar.
    type Real: RealField;

    /// Returns the scalar with the given real part and a zero imaginary
    /// part.
    fn from_real(re: Self::Real) -> Self;
    /// Returns the real part.
    fn real(self) -> Self::Real;
    /// Returns the imaginary part.
    fn imag(self) -> Self::Real;
    /// Returns the complex conjugate.
    fn conj(self) -> Self;
    /// Returns the squared modulus.
    fn abs2(self) -> Self::Real;
    /// Returns the multiplicative inverse.
    fn inv(self) -> Self;
    /// Multiplies by a real factor.
    fn scale_real(self, rhs: Self::Real) -> Self;
    /// Draws a value with uniform parts in `[0, 1)`.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

/// Scalars that are their own real base type.
pub trait RealField: ComplexField<Real = Self> + PartialOrd + Num + NumAssign {
    fn sqrt(self) -> Self;
    fn epsilon() -> Self;
}

macro_rules! impl_real_field {
    ($ty: ty) => {
        impl ComplexField for $ty {
            type Real = $ty;

            #[inline(always)]
            fn from_real(re: Self::Real) -> Self {
                re
            }
            #[inline(always)]
            fn real(self) -> Self::Real {
                self
            }
            #[inline(always)]
            fn imag(self) -> Self::Real {
                0.0
            }
            #[inline(always)]
            fn conj(self) -> Self {
                self
            }
            #[inline(always)]
            fn abs2(self) -> Self::Real {
                self * self
            }
            #[inline(always)]
            fn inv(self) -> Self {
                1.0 / self
            }
            #[inline(always)]
            fn scale_real(self, rhs: Self::Real) -> Self {
                self * rhs
            }
            #[inline(always)]
            fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
                rng.gen()
            }
        }

        impl RealField for $ty {
            #[inline(always)]
            fn sqrt(self) -> Self {
                <$ty>::sqrt(self)
            }
            #[inline(always)]
            fn epsilon() -> Self {
                <$ty>::EPSILON
            }
        }
    };
}

impl_real_field!(f32);
impl_real_field!(f64);

impl<T: RealField> ComplexField for Complex<T> {
    type Real = T;

    #[inline(always)]
    fn from_real(re: Self::Real) -> Self {
        Complex::new(re, T::zero())
    }
    #[inline(always)]
    fn real(self) -> Self::Real {
        self.re
    }
    #[inline(always)]
    fn imag(self) -> Self::Real {
        self.im
    }
    #[inline(always)]
    fn conj(self) -> Self {
        Complex::new(self.re, -self.im)
    }
    #[inline(always)]
    fn abs2(self) -> Self::Real {
        self.re * self.re + self.im * self.im
    }
    #[inline(always)]
    fn inv(self) -> Self {
        let factor = self.abs2().inv();
        Complex::new(self.re * factor, -self.im * factor)
    }
    #[inline(always)]
    fn scale_real(self, rhs: Self::Real) -> Self {
        Complex::new(self.re * rhs, self.im * rhs)
    }
    #[inline(always)]
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Complex::new(T::random(rng), T::random(rng))
    }
}

struct MatImpl<E: ComplexField> {
    ptr: *mut E,
    nrows: usize,
    ncols: usize,
    col_stride: usize,
}

impl<E: ComplexField> Copy for MatImpl<E> {}
impl<E: ComplexField> Clone for MatImpl<E> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

/// Immutable view over a matrix, similar to an immutable reference to a 2D
/// strided slice.
///
/// Storage is column-major: element `(i, j)` lives at offset
/// `i + j * col_stride`, with `col_stride >= nrows`, so every column is a
/// contiguous slice.
pub struct MatRef<'a, E: ComplexField> {
    inner: MatImpl<E>,
    __marker: PhantomData<&'a E>,
}

/// Mutable view over a matrix, similar to a mutable reference to a 2D
/// strided slice.
///
/// Since `MatMut` mutably borrows data, it cannot be `Copy`. Passing one by
/// value moves it; use the [`reborrow::ReborrowMut`] trait (`rb_mut`) to
/// borrow it again for the duration of a call, or [`reborrow::Reborrow`]
/// (`rb`) to view it immutably.
pub struct MatMut<'a, E: ComplexField> {
    inner: MatImpl<E>,
    __marker: PhantomData<&'a mut E>,
}

impl<E: ComplexField> Copy for MatRef<'_, E> {}
impl<E: ComplexField> Clone for MatRef<'_, E> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

unsafe impl<E: ComplexField> Send for MatRef<'_, E> {}
unsafe impl<E: ComplexField> Sync for MatRef<'_, E> {}
unsafe impl<E: ComplexField> Send for MatMut<'_, E> {}
unsafe impl<E: ComplexField> Sync for MatMut<'_, E> {}

use reborrow::{IntoConst, Reborrow, ReborrowMut};

impl<'a, E: ComplexField> IntoConst for MatMut<'a, E> {
    type Target = MatRef<'a, E>;

    #[inline(always)]
    fn into_const(self) -> Self::Target {
        MatRef {
            inner: self.inner,
            __marker: PhantomData,
        }
    }
}

impl<'short, 'a, E: ComplexField> Reborrow<'short> for MatMut<'a, E> {
    type Target = MatRef<'short, E>;

    #[inline(always)]
    fn rb(&'short self) -> Self::Target {
        MatRef {
            inner: self.inner,
            __marker: PhantomData,
        }
    }
}

impl<'short, 'a, E: ComplexField> ReborrowMut<'short> for MatMut<'a, E> {
    type Target = MatMut<'short, E>;

    #[inline(always)]
    fn rb_mut(&'short mut self) -> Self::Target {
        MatMut {
            inner: self.inner,
            __marker: PhantomData,
        }
    }
}

impl<'a, E: ComplexField> IntoConst for MatRef<'a, E> {
    type Target = MatRef<'a, E>;

    #[inline(always)]
    fn into_const(self) -> Self::Target {
        self
    }
}

impl<'short, 'a, E: ComplexField> Reborrow<'short> for MatRef<'a, E> {
    type Target = MatRef<'short, E>;

    #[inline(always)]
    fn rb(&'short self) -> Self::Target {
        *self
    }
}

impl<'short, 'a, E: ComplexField> ReborrowMut<'short> for MatRef<'a, E> {
    type Target = MatRef<'short, E>;

    #[inline(always)]
    fn rb_mut(&'short mut self) -> Self::Target {
        *self
    }
}

impl<'a, E: ComplexField> MatRef<'a, E> {
    /// Creates a view from a pointer to the first element and the matrix
    /// dimensions.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `col_stride * ncols` elements for
    /// the lifetime `'a`, with `col_stride >= nrows`, and no mutable alias
    /// may exist over that region.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *const E,
        nrows: usize,
        ncols: usize,
        col_stride: usize,
    ) -> Self {
        Self {
            inner: MatImpl {
                ptr: ptr as *mut E,
                nrows,
                ncols,
                col_stride,
            },
            __marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.inner.nrows
    }

    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.inner.ncols
    }

    #[inline(always)]
    pub fn col_stride(&self) -> usize {
        self.inner.col_stride
    }

    /// Returns the element at position `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    #[track_caller]
    #[inline(always)]
    pub fn read(&self, row: usize, col: usize) -> E {
        fancy_assert!(row < self.nrows());
        fancy_assert!(col < self.ncols());
        unsafe { *self.inner.ptr.add(row + col * self.inner.col_stride) }
    }

    /// Returns column `col` as a contiguous slice.
    #[track_caller]
    #[inline]
    pub fn col(self, col: usize) -> &'a [E] {
        fancy_assert!(col < self.ncols());
        unsafe {
            core::slice::from_raw_parts(
                self.inner.ptr.add(col * self.inner.col_stride),
                self.inner.nrows,
            )
        }
    }

    /// Returns the view over the sub-block starting at `(row_start,
    /// col_start)` with dimensions `(nrows, ncols)`.
    #[track_caller]
    #[inline]
    pub fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        fancy_assert!(row_start + nrows <= self.nrows());
        fancy_assert!(col_start + ncols <= self.ncols());
        unsafe {
            Self::from_raw_parts(
                self.inner
                    .ptr
                    .add(row_start + col_start * self.inner.col_stride),
                nrows,
                ncols,
                self.inner.col_stride,
            )
        }
    }

    /// Splits the view into four quadrants at row `row` and column `col`:
    /// `[top_left, top_right, bot_left, bot_right]`.
    #[track_caller]
    #[inline]
    pub fn split_at(self, row: usize, col: usize) -> [Self; 4] {
        fancy_assert!(row <= self.nrows());
        fancy_assert!(col <= self.ncols());
        let (m, n) = (self.nrows(), self.ncols());
        [
            self.submatrix(0, 0, row, col),
            self.submatrix(0, col, row, n - col),
            self.submatrix(row, 0, m - row, col),
            self.submatrix(row, col, m - row, n - col),
        ]
    }

    #[track_caller]
    #[inline]
    pub fn split_at_row(self, row: usize) -> (Self, Self) {
        let [top, _, bot, _] = self.split_at(row, self.ncols());
        (top, bot)
    }

    #[track_caller]
    #[inline]
    pub fn split_at_col(self, col: usize) -> (Self, Self) {
        let [left, right, _, _] = self.split_at(self.nrows(), col);
        (left, right)
    }
}

impl<'a, E: ComplexField> MatMut<'a, E> {
    /// Creates a mutable view from a pointer to the first element and the
    /// matrix dimensions.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `col_stride * ncols`
    /// elements for the lifetime `'a`, with `col_stride >= nrows`, and no
    /// other alias may exist over that region.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *mut E,
        nrows: usize,
        ncols: usize,
        col_stride: usize,
    ) -> Self {
        Self {
            inner: MatImpl {
                ptr,
                nrows,
                ncols,
                col_stride,
            },
            __marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.inner.nrows
    }

    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.inner.ncols
    }

    #[inline(always)]
    pub fn col_stride(&self) -> usize {
        self.inner.col_stride
    }

    /// Returns the element at position `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    #[track_caller]
    #[inline(always)]
    pub fn read(&self, row: usize, col: usize) -> E {
        self.rb().read(row, col)
    }

    /// Writes `value` at position `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    #[track_caller]
    #[inline(always)]
    pub fn write(&mut self, row: usize, col: usize, value: E) {
        fancy_assert!(row < self.nrows());
        fancy_assert!(col < self.ncols());
        unsafe { *self.inner.ptr.add(row + col * self.inner.col_stride) = value }
    }

    /// Returns column `col` as a contiguous mutable slice.
    #[track_caller]
    #[inline]
    pub fn col_mut(self, col: usize) -> &'a mut [E] {
        fancy_assert!(col < self.ncols());
        unsafe {
            core::slice::from_raw_parts_mut(
                self.inner.ptr.add(col * self.inner.col_stride),
                self.inner.nrows,
            )
        }
    }

    /// Returns the mutable view over the sub-block starting at `(row_start,
    /// col_start)` with dimensions `(nrows, ncols)`.
    #[track_caller]
    #[inline]
    pub fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        fancy_assert!(row_start + nrows <= self.nrows());
        fancy_assert!(col_start + ncols <= self.ncols());
        unsafe {
            Self::from_raw_parts(
                self.inner
                    .ptr
                    .add(row_start + col_start * self.inner.col_stride),
                nrows,
                ncols,
                self.inner.col_stride,
            )
        }
    }

    /// Splits the view into four non-aliasing quadrants at row `row` and
    /// column `col`: `[top_left, top_right, bot_left, bot_right]`.
    #[track_caller]
    #[inline]
    pub fn split_at(self, row: usize, col: usize) -> [Self; 4] {
        fancy_assert!(row <= self.nrows());
        fancy_assert!(col <= self.ncols());
        let MatImpl {
            ptr,
            nrows,
            ncols,
            col_stride,
        } = self.inner;
        // The four quadrants are disjoint index sets of the same allocation.
        unsafe {
            [
                Self::from_raw_parts(ptr, row, col, col_stride),
                Self::from_raw_parts(ptr.add(col * col_stride), row, ncols - col, col_stride),
                Self::from_raw_parts(ptr.add(row), nrows - row, col, col_stride),
                Self::from_raw_parts(
                    ptr.add(row + col * col_stride),
                    nrows - row,
                    ncols - col,
                    col_stride,
                ),
            ]
        }
    }

    #[track_caller]
    #[inline]
    pub fn split_at_row(self, row: usize) -> (Self, Self) {
        let ncols = self.ncols();
        let [top, _, bot, _] = self.split_at(row, ncols);
        (top, bot)
    }

    #[track_caller]
    #[inline]
    pub fn split_at_col(self, col: usize) -> (Self, Self) {
        let nrows = self.nrows();
        let [left, right, _, _] = self.split_at(nrows, col);
        (left, right)
    }

    /// Fills the view with zeros.
    pub fn fill_zero(&mut self) {
        let ncols = self.ncols();
        for j in 0..ncols {
            self.rb_mut().col_mut(j).fill(E::zero());
        }
    }

    /// Copies `src` into `self`.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions do not match.
    #[track_caller]
    pub fn copy_from(&mut self, src: MatRef<'_, E>) {
        fancy_assert!(self.nrows() == src.nrows());
        fancy_assert!(self.ncols() == src.ncols());
        let ncols = self.ncols();
        for j in 0..ncols {
            self.rb_mut().col_mut(j).copy_from_slice(src.col(j));
        }
    }
}

/// Owning column-major matrix with storage on the local process.
///
/// The leading dimension (column stride) may exceed the row count after a
/// shrinking [`Mat::resize`], which keeps the reallocation-free shrink the
/// tile layer relies on.
#[derive(Clone)]
pub struct Mat<E: ComplexField> {
    data: Vec<E>,
    nrows: usize,
    ncols: usize,
    col_stride: usize,
}

impl<E: ComplexField> Mat<E> {
    /// Returns an empty matrix of dimension `0×0`.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            nrows: 0,
            ncols: 0,
            col_stride: 0,
        }
    }

    /// Returns a zero matrix of dimension `nrows×ncols`.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![E::zero(); nrows * ncols],
            nrows,
            ncols,
            col_stride: nrows,
        }
    }

    /// Returns a matrix of dimension `nrows×ncols` with elements produced by
    /// `f(i, j)`.
    pub fn from_fn(nrows: usize, ncols: usize, f: impl FnMut(usize, usize) -> E) -> Self {
        let mut f = f;
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self {
            data,
            nrows,
            ncols,
            col_stride: nrows,
        }
    }

    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Resizes the matrix in place.
    ///
    /// Shrinking never reallocates: the column stride is left untouched so
    /// the retained columns keep their addresses. Growing allocates fresh
    /// zeroed storage and preserves the leading retained submatrix.
    pub fn resize(&mut self, nrows: usize, ncols: usize) {
        if nrows <= self.col_stride && self.col_stride * ncols <= self.data.len() {
            self.nrows = nrows;
            self.ncols = ncols;
            return;
        }
        let mut data = vec![E::zero(); nrows * ncols];
        let copy_rows = Ord::min(self.nrows, nrows);
        let copy_cols = Ord::min(self.ncols, ncols);
        for j in 0..copy_cols {
            let src = &self.data[j * self.col_stride..][..copy_rows];
            data[j * nrows..][..copy_rows].copy_from_slice(src);
        }
        self.data = data;
        self.nrows = nrows;
        self.ncols = ncols;
        self.col_stride = nrows;
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, E> {
        unsafe { MatRef::from_raw_parts(self.data.as_ptr(), self.nrows, self.ncols, self.col_stride) }
    }

    #[inline]
    pub fn as_mut(&mut self) -> MatMut<'_, E> {
        unsafe {
            MatMut::from_raw_parts(self.data.as_mut_ptr(), self.nrows, self.ncols, self.col_stride)
        }
    }

    #[track_caller]
    #[inline(always)]
    pub fn read(&self, row: usize, col: usize) -> E {
        self.as_ref().read(row, col)
    }

    #[track_caller]
    #[inline(always)]
    pub fn write(&mut self, row: usize, col: usize, value: E) {
        self.as_mut().write(row, col, value)
    }

    /// Fills the matrix with zeros.
    pub fn fill_zero(&mut self) {
        self.as_mut().fill_zero();
    }
}

impl<E: ComplexField> Default for Mat<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ComplexField> Debug for Mat<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mat")
            .field("nrows", &self.nrows)
            .field("ncols", &self.ncols)
            .finish()
    }
}

impl<E: ComplexField> Index<(usize, usize)> for Mat<E> {
    type Output = E;

    #[track_caller]
    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &E {
        fancy_assert!(row < self.nrows);
        fancy_assert!(col < self.ncols);
        &self.data[row + col * self.col_stride]
    }
}

impl<E: ComplexField> IndexMut<(usize, usize)> for Mat<E> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut E {
        fancy_assert!(row < self.nrows);
        fancy_assert!(col < self.ncols);
        &mut self.data[row + col * self.col_stride]
    }
}

/// Constructs a [`Mat`] from row-major element lists.
///
/// ```
/// use tessera_core::mat;
///
/// let m = mat![
///     [1.0, 2.0],
///     [3.0, 4.0f64],
/// ];
/// assert_eq!(m.read(1, 0), 3.0);
/// ```
#[macro_export]
macro_rules! mat {
    ($([$($v: expr),* $(,)?]),* $(,)?) => {{
        let rows = [$([$($v,)*],)*];
        let nrows = rows.len();
        let ncols = if nrows == 0 { 0 } else { rows[0].len() };
        $crate::Mat::from_fn(nrows, ncols, |i, j| rows[i][j])
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use reborrow::*;

    #[test]
    fn mat_basics() {
        let mut a = Mat::<f64>::zeros(3, 2);
        a.write(0, 0, 1.0);
        a.write(2, 1, 5.0);
        assert_eq!(a.read(0, 0), 1.0);
        assert_eq!(a.read(2, 1), 5.0);
        assert_eq!(a.read(1, 1), 0.0);
        assert_eq!(a[(2, 1)], 5.0);

        let b = mat![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0f64],
        ];
        assert_eq!(b.nrows(), 2);
        assert_eq!(b.ncols(), 3);
        assert_eq!(b.read(1, 2), 6.0);
        assert_eq!(b.as_ref().col(1), &[2.0, 5.0]);
    }

    #[test]
    fn mat_resize() {
        let mut a = Mat::<f64>::from_fn(4, 3, |i, j| (i + 10 * j) as f64);
        a.resize(2, 3);
        assert_eq!(a.nrows(), 2);
        assert_eq!(a.read(1, 2), 21.0);

        // shrink kept the stride, so growing back within the old footprint
        // exposes the old storage dimensions without reallocation
        a.resize(4, 3);
        assert_eq!(a.read(3, 0), 3.0);

        a.resize(5, 4);
        assert_eq!(a.nrows(), 5);
        assert_eq!(a.read(3, 2), 23.0);
        assert_eq!(a.read(4, 3), 0.0);
    }

    #[test]
    fn mat_split() {
        let mut a = Mat::<f64>::from_fn(4, 4, |i, j| (i + 4 * j) as f64);
        let [tl, tr, bl, br] = a.as_mut().split_at(2, 1);
        assert_eq!(tl.nrows(), 2);
        assert_eq!(tl.ncols(), 1);
        assert_eq!(tr.read(0, 0), 4.0);
        assert_eq!(bl.read(0, 0), 2.0);
        assert_eq!(br.read(1, 2), 15.0);

        let mut br = br;
        br.write(0, 0, -1.0);
        assert_eq!(a.read(2, 1), -1.0);
    }

    #[test]
    fn mat_copy_from() {
        let a = Mat::<f64>::from_fn(3, 3, |i, j| (i * 3 + j) as f64);
        let mut b = Mat::<f64>::zeros(2, 2);
        b.as_mut().copy_from(a.as_ref().submatrix(1, 1, 2, 2));
        assert_eq!(b.read(0, 0), a.read(1, 1));
        assert_eq!(b.read(1, 1), a.read(2, 2));
    }

    #[test]
    fn complex_field_ops() {
        let z = c64::new(3.0, -4.0);
        assert_eq!(z.conj(), c64::new(3.0, 4.0));
        assert_eq!(z.abs2(), 25.0);
        let w = z * z.inv();
        assert!((w - c64::new(1.0, 0.0)).abs2() < 1e-28);
        assert_eq!(c64::from_real(2.0), c64::new(2.0, 0.0));
        assert_eq!(z.scale_real(2.0), c64::new(6.0, -8.0));
    }

    #[test]
    fn reborrow_roundtrip() {
        let mut a = Mat::<f64>::zeros(2, 2);
        let mut view = a.as_mut();
        view.rb_mut().write(0, 1, 2.0);
        assert_eq!(view.rb().read(0, 1), 2.0);
        let shared = view.into_const();
        assert_eq!(shared.read(0, 1), 2.0);
    }
}
