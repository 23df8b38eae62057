//! Distributed matrix types.
//!
//! [`DistMat`] owns the local tile of a global matrix partitioned over a
//! [`Grid`] under a pair of [`Dist`] tags. [`DistMatRef`] and [`DistMatMut`]
//! are borrowed views over a block of an existing distributed matrix; they
//! can never be resized or re-aligned, and assignment into them demands an
//! exact size match.

use super::{assert_legal, local_length, shift, Dist};
use crate::comm::{self, MIN_COLL_MSG};
use crate::grid::Grid;
use crate::redist;
use crate::{ComplexField, Mat, MatMut, MatRef, Side, Uplo};
use assert2::assert as fancy_assert;
use rand::Rng;
use reborrow::{IntoConst, Reborrow, ReborrowMut};

#[derive(Copy, Clone, Debug)]
pub(crate) struct AxisInfo {
    pub dist: Dist,
    pub align: usize,
    pub shift: usize,
}

impl AxisInfo {
    pub(crate) fn new(grid: &Grid, dist: Dist, align: usize) -> Self {
        let period = dist.period(grid);
        fancy_assert!(align < period, "invalid alignment for {:?}", dist);
        let shift = match dist.axis_rank(grid) {
            Some(rank) => shift(rank, align, period),
            None => 0,
        };
        Self { dist, align, shift }
    }

    /// Number of indices of an axis of extent `n` stored on this process.
    pub(crate) fn local_len(&self, grid: &Grid, n: usize) -> usize {
        match self.dist.axis_rank(grid) {
            Some(_) => local_length(n, self.shift, self.dist.period(grid)),
            None => 0,
        }
    }

    /// Whether this process owns global index `index` along the axis.
    pub(crate) fn owns(&self, grid: &Grid, index: usize) -> bool {
        match self.dist.axis_rank(grid) {
            Some(_) => index % self.dist.period(grid) == self.shift,
            None => false,
        }
    }

    /// Local position of an owned global index.
    pub(crate) fn local_index(&self, grid: &Grid, index: usize) -> usize {
        (index - self.shift) / self.dist.period(grid)
    }

    /// View of a sub-range `[start, start + len)` of the axis: the derived
    /// axis info, the local offset of the range, and its local length.
    pub(crate) fn view(&self, grid: &Grid, start: usize, len: usize) -> (Self, usize, usize) {
        let period = self.dist.period(grid);
        let align = (self.align + start) % period;
        match self.dist.axis_rank(grid) {
            Some(rank) => {
                let new_shift = shift(rank, align, period);
                let offset = local_length(start, self.shift, period);
                let local = local_length(len, new_shift, period);
                (
                    Self {
                        dist: self.dist,
                        align,
                        shift: new_shift,
                    },
                    offset,
                    local,
                )
            }
            None => (
                Self {
                    dist: self.dist,
                    align,
                    shift: 0,
                },
                0,
                0,
            ),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct DistInfo {
    pub col: AxisInfo,
    pub row: AxisInfo,
    pub height: usize,
    pub width: usize,
}

impl DistInfo {
    pub(crate) fn local_nrows(&self, grid: &Grid) -> usize {
        self.col.local_len(grid, self.height)
    }

    pub(crate) fn local_ncols(&self, grid: &Grid) -> usize {
        self.row.local_len(grid, self.width)
    }

    /// VC rank of the process owning global element `(i, j)`, with grid
    /// coordinates left unpinned by a replicated axis defaulting to zero.
    /// The result is identical on every calling rank.
    pub(crate) fn owner_vc(&self, grid: &Grid, i: usize, j: usize) -> usize {
        let (r, c) = (grid.height(), grid.width());
        let mut mc = 0;
        let mut mr = 0;
        let mut pin = |axis: &AxisInfo, index: usize| {
            let period = axis.dist.period(grid);
            match axis.dist {
                Dist::MC => mc = (index + axis.align) % period,
                Dist::MR => mr = (index + axis.align) % period,
                Dist::VC => {
                    let v = (index + axis.align) % period;
                    mc = v % r;
                    mr = v / r;
                }
                Dist::VR => {
                    let v = (index + axis.align) % period;
                    mc = v / c;
                    mr = v % c;
                }
                Dist::MD => {
                    let k = (index + axis.align) % period;
                    mc = k % r;
                    mr = k % c;
                }
                Dist::Star => {}
            }
        };
        pin(&self.col, i);
        pin(&self.row, j);
        mc + r * mr
    }
}

/// Grow-only pack buffer reused across the redistribution and reduction
/// calls of one owning matrix.
pub struct Scratch<E: ComplexField> {
    buf: Vec<E>,
}

impl<E: ComplexField> Scratch<E> {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Returns a buffer of at least `len` elements, growing the pool if
    /// needed but never shrinking it.
    pub fn require(&mut self, len: usize) -> &mut [E] {
        if self.buf.len() < len {
            self.buf.resize(len, E::zero());
        }
        &mut self.buf[..len]
    }

    /// Returns the buffer to the pool. Storage is retained for the next
    /// [`Scratch::require`].
    pub fn release(&mut self) {}
}

impl<E: ComplexField> Default for Scratch<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owning distributed matrix: the local tile is sized exactly to this
/// process's owned slice and may be resized or re-aligned.
pub struct DistMat<'g, E: ComplexField> {
    pub(crate) grid: &'g Grid,
    pub(crate) info: DistInfo,
    pub(crate) constrained_col: bool,
    pub(crate) constrained_row: bool,
    pub(crate) local: Mat<E>,
    pub(crate) scratch: Scratch<E>,
}

/// Read-only view over a block of a distributed matrix.
pub struct DistMatRef<'g, 'a, E: ComplexField> {
    pub(crate) grid: &'g Grid,
    pub(crate) info: DistInfo,
    pub(crate) local: MatRef<'a, E>,
}

/// Mutable view over a block of a distributed matrix.
pub struct DistMatMut<'g, 'a, E: ComplexField> {
    pub(crate) grid: &'g Grid,
    pub(crate) info: DistInfo,
    pub(crate) local: MatMut<'a, E>,
}

impl<E: ComplexField> Copy for DistMatRef<'_, '_, E> {}
impl<E: ComplexField> Clone for DistMatRef<'_, '_, E> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'g, 'a, E: ComplexField> IntoConst for DistMatMut<'g, 'a, E> {
    type Target = DistMatRef<'g, 'a, E>;

    #[inline(always)]
    fn into_const(self) -> Self::Target {
        DistMatRef {
            grid: self.grid,
            info: self.info,
            local: self.local.into_const(),
        }
    }
}

impl<'short, 'g, 'a, E: ComplexField> Reborrow<'short> for DistMatMut<'g, 'a, E> {
    type Target = DistMatRef<'g, 'short, E>;

    #[inline(always)]
    fn rb(&'short self) -> Self::Target {
        DistMatRef {
            grid: self.grid,
            info: self.info,
            local: self.local.rb(),
        }
    }
}

impl<'short, 'g, 'a, E: ComplexField> ReborrowMut<'short> for DistMatMut<'g, 'a, E> {
    type Target = DistMatMut<'g, 'short, E>;

    #[inline(always)]
    fn rb_mut(&'short mut self) -> Self::Target {
        DistMatMut {
            grid: self.grid,
            info: self.info,
            local: self.local.rb_mut(),
        }
    }
}

macro_rules! impl_dist_accessors {
    ($ty: ident) => {
        impl<'g, 'a, E: ComplexField> $ty<'g, 'a, E> {
            #[inline]
            pub fn grid(&self) -> &'g Grid {
                self.grid
            }
            #[inline]
            pub fn height(&self) -> usize {
                self.info.height
            }
            #[inline]
            pub fn width(&self) -> usize {
                self.info.width
            }
            #[inline]
            pub fn col_dist(&self) -> Dist {
                self.info.col.dist
            }
            #[inline]
            pub fn row_dist(&self) -> Dist {
                self.info.row.dist
            }
            #[inline]
            pub fn col_align(&self) -> usize {
                self.info.col.align
            }
            #[inline]
            pub fn row_align(&self) -> usize {
                self.info.row.align
            }
            #[inline]
            pub fn col_shift(&self) -> usize {
                self.info.col.shift
            }
            #[inline]
            pub fn row_shift(&self) -> usize {
                self.info.row.shift
            }
            #[inline]
            pub fn local_nrows(&self) -> usize {
                self.info.local_nrows(self.grid)
            }
            #[inline]
            pub fn local_ncols(&self) -> usize {
                self.info.local_ncols(self.grid)
            }
        }
    };
}

impl_dist_accessors!(DistMatRef);
impl_dist_accessors!(DistMatMut);

impl<'g, 'a, E: ComplexField> DistMatRef<'g, 'a, E> {
    /// The local tile.
    #[inline]
    pub fn local(self) -> MatRef<'a, E> {
        self.local
    }

    /// Returns the global entry `(i, j)` on every calling process.
    ///
    /// The owner reads its local entry and a one-element broadcast on the
    /// viewing communicator delivers it everywhere, so this is a collective
    /// over the viewing communicator.
    #[track_caller]
    pub fn get(&self, i: usize, j: usize) -> E {
        fancy_assert!(i < self.info.height, "row index out of bounds");
        fancy_assert!(j < self.info.width, "column index out of bounds");
        let grid = self.grid;
        let owner = self.info.owner_vc(grid, i, j);
        let mut value = [E::zero()];
        if grid.in_grid() && grid.vc_rank() == owner {
            value[0] = self.local.read(
                self.info.col.local_index(grid, i),
                self.info.row.local_index(grid, j),
            );
        }
        comm::broadcast(grid.viewing_comm(), &mut value, grid.vc_to_viewing(owner));
        value[0]
    }

    /// View over the `height × width` block at `(i, j)`.
    #[track_caller]
    pub fn submatrix(self, i: usize, j: usize, height: usize, width: usize) -> Self {
        fancy_assert!(i + height <= self.info.height);
        fancy_assert!(j + width <= self.info.width);
        let (col, row_offset, local_height) = self.info.col.view(self.grid, i, height);
        let (row, col_offset, local_width) = self.info.row.view(self.grid, j, width);
        Self {
            grid: self.grid,
            info: DistInfo {
                col,
                row,
                height,
                width,
            },
            local: self
                .local
                .submatrix(row_offset, col_offset, local_height, local_width),
        }
    }

    /// Splits the view into four quadrants at global row `i` and global
    /// column `j`: `[top_left, top_right, bot_left, bot_right]`.
    #[track_caller]
    pub fn split_at(self, i: usize, j: usize) -> [Self; 4] {
        let (h, w) = (self.info.height, self.info.width);
        [
            self.submatrix(0, 0, i, j),
            self.submatrix(0, j, i, w - j),
            self.submatrix(i, 0, h - i, j),
            self.submatrix(i, j, h - i, w - j),
        ]
    }
}

impl<'g, 'a, E: ComplexField> DistMatMut<'g, 'a, E> {
    /// The local tile.
    #[inline]
    pub fn local_mut(self) -> MatMut<'a, E> {
        self.local
    }

    /// See [`DistMatRef::get`].
    #[track_caller]
    pub fn get(&self, i: usize, j: usize) -> E {
        self.rb().get(i, j)
    }

    /// Writes `value` at global position `(i, j)` on the owning process;
    /// other processes leave their tiles untouched. No communication.
    #[track_caller]
    pub fn set(&mut self, i: usize, j: usize, value: E) {
        fancy_assert!(i < self.info.height, "row index out of bounds");
        fancy_assert!(j < self.info.width, "column index out of bounds");
        let grid = self.grid;
        if self.info.col.owns(grid, i) && self.info.row.owns(grid, j) {
            let row = self.info.col.local_index(grid, i);
            let col = self.info.row.local_index(grid, j);
            self.local.write(row, col, value);
        }
    }

    /// Adds `value` to the global entry `(i, j)` on the owning process. No
    /// communication.
    #[track_caller]
    pub fn update(&mut self, i: usize, j: usize, value: E) {
        fancy_assert!(i < self.info.height, "row index out of bounds");
        fancy_assert!(j < self.info.width, "column index out of bounds");
        let grid = self.grid;
        if self.info.col.owns(grid, i) && self.info.row.owns(grid, j) {
            let row = self.info.col.local_index(grid, i);
            let col = self.info.row.local_index(grid, j);
            let old = self.local.read(row, col);
            self.local.write(row, col, old + value);
        }
    }

    /// See [`DistMatRef::submatrix`].
    #[track_caller]
    pub fn submatrix(self, i: usize, j: usize, height: usize, width: usize) -> Self {
        fancy_assert!(i + height <= self.info.height);
        fancy_assert!(j + width <= self.info.width);
        let (col, row_offset, local_height) = self.info.col.view(self.grid, i, height);
        let (row, col_offset, local_width) = self.info.row.view(self.grid, j, width);
        Self {
            grid: self.grid,
            info: DistInfo {
                col,
                row,
                height,
                width,
            },
            local: self
                .local
                .submatrix(row_offset, col_offset, local_height, local_width),
        }
    }

    /// Splits the view into four non-aliasing quadrants at global row `i`
    /// and global column `j`.
    #[track_caller]
    pub fn split_at(self, i: usize, j: usize) -> [Self; 4] {
        fancy_assert!(i <= self.info.height);
        fancy_assert!(j <= self.info.width);
        let grid = self.grid;
        let (col_top, _, local_i) = self.info.col.view(grid, 0, i);
        let (col_bot, _, _) = self.info.col.view(grid, i, self.info.height - i);
        let (row_left, _, local_j) = self.info.row.view(grid, 0, j);
        let (row_right, _, _) = self.info.row.view(grid, j, self.info.width - j);
        let (h, w) = (self.info.height, self.info.width);
        let [tl, tr, bl, br] = self.local.split_at(local_i, local_j);
        let quad = |col: AxisInfo, row: AxisInfo, height, width, local| DistMatMut {
            grid,
            info: DistInfo {
                col,
                row,
                height,
                width,
            },
            local,
        };
        [
            quad(col_top, row_left, i, j, tl),
            quad(col_top, row_right, i, w - j, tr),
            quad(col_bot, row_left, h - i, j, bl),
            quad(col_bot, row_right, h - i, w - j, br),
        ]
    }

    #[track_caller]
    pub fn split_at_row(self, i: usize) -> (Self, Self) {
        let w = self.info.width;
        let [top, _, bot, _] = self.split_at(i, w);
        (top, bot)
    }

    #[track_caller]
    pub fn split_at_col(self, j: usize) -> (Self, Self) {
        let h = self.info.height;
        let [left, right, _, _] = self.split_at(h, j);
        (left, right)
    }

    /// Redistributes `src` into this view. The view's distribution and
    /// alignment are fixed, so the source is rotated into place if
    /// misaligned; mismatched global dimensions are a fatal error.
    #[track_caller]
    pub fn assign(&mut self, src: DistMatRef<'g, '_, E>) {
        fancy_assert!(
            self.info.height == src.info.height && self.info.width == src.info.width,
            "assignment into a view requires matching global dimensions"
        );
        let mut aux = Scratch::new();
        let result = redist::redistribute(
            self.grid,
            self.info.col.dist,
            self.info.row.dist,
            Some(self.info.col.align),
            Some(self.info.row.align),
            src,
            &mut aux,
        );
        self.local.copy_from(result.local.as_ref());
    }

    /// Transposed redistribution of `src` into this view.
    #[track_caller]
    pub fn transpose_from(&mut self, src: DistMatRef<'g, '_, E>) {
        redist::transpose_into_view(self, src, false);
    }

    /// Conjugate-transposed redistribution of `src` into this view.
    #[track_caller]
    pub fn adjoint_from(&mut self, src: DistMatRef<'g, '_, E>) {
        redist::transpose_into_view(self, src, true);
    }

    /// Zeroes a trapezoidal region of the matrix.
    ///
    /// For `Uplo::Lower` the rows `[0, last_zero_row]` of column `j` are
    /// zeroed, with `last_zero_row = j - offset - 1` on the left side and
    /// `j - offset + height - width - 1` on the right; `Uplo::Upper` zeroes
    /// symmetrically from the first zero row down. Each process touches
    /// only the intersection with its own tile.
    pub fn make_trapezoidal(&mut self, side: Side, shape: Uplo, offset: isize) {
        if !self.grid.in_grid() {
            return;
        }
        let grid = self.grid;
        let info = self.info;
        let col_period = info.col.dist.period(grid);
        let row_period = info.row.dist.period(grid);
        let (h, w) = (info.height as isize, info.width as isize);
        let local_nrows = info.local_nrows(grid);
        let local_ncols = info.local_ncols(grid);

        for local_j in 0..local_ncols {
            let j = (info.row.shift + local_j * row_period) as isize;
            let col = self.local.rb_mut().col_mut(local_j);
            match shape {
                Uplo::Lower => {
                    let last_zero_row = match side {
                        Side::Left => j - offset - 1,
                        Side::Right => j - offset + h - w - 1,
                    };
                    if last_zero_row >= 0 {
                        let boundary = Ord::min(last_zero_row + 1, h) as usize;
                        let num_zero = local_length(boundary, info.col.shift, col_period);
                        col[..num_zero].fill(E::zero());
                    }
                }
                Uplo::Upper => {
                    let first_zero_row = match side {
                        Side::Left => Ord::max(j - offset + 1, 0),
                        Side::Right => Ord::max(j - offset + h - w + 1, 0),
                    };
                    let boundary = Ord::min(first_zero_row, h) as usize;
                    let num_nonzero = local_length(boundary, info.col.shift, col_period);
                    if num_nonzero < local_nrows {
                        col[num_nonzero..].fill(E::zero());
                    }
                }
            }
        }
    }

    /// Scales the kept trapezoid by `alpha`, the multiplicative counterpart
    /// of [`DistMatMut::make_trapezoidal`].
    pub fn scale_trapezoidal(&mut self, alpha: E, side: Side, shape: Uplo, offset: isize) {
        if !self.grid.in_grid() {
            return;
        }
        let grid = self.grid;
        let info = self.info;
        let col_period = info.col.dist.period(grid);
        let row_period = info.row.dist.period(grid);
        let (h, w) = (info.height as isize, info.width as isize);
        let local_ncols = info.local_ncols(grid);

        for local_j in 0..local_ncols {
            let j = (info.row.shift + local_j * row_period) as isize;
            let col = self.local.rb_mut().col_mut(local_j);
            match shape {
                Uplo::Upper => {
                    let last_row = match side {
                        Side::Left => j - offset,
                        Side::Right => j - offset + h - w,
                    };
                    let boundary = Ord::min(Ord::max(last_row + 1, 0), h) as usize;
                    let num_rows = local_length(boundary, info.col.shift, col_period);
                    for value in &mut col[..num_rows] {
                        *value *= alpha;
                    }
                }
                Uplo::Lower => {
                    let first_row = match side {
                        Side::Left => Ord::max(j - offset, 0),
                        Side::Right => Ord::max(j + h - w - offset, 0),
                    };
                    let boundary = Ord::min(first_row, h) as usize;
                    let num_skip = local_length(boundary, info.col.shift, col_period);
                    for value in &mut col[num_skip..] {
                        *value *= alpha;
                    }
                }
            }
        }
    }

    /// Zeroes the matrix and writes ones on the global diagonal.
    pub fn set_to_identity(&mut self) {
        if !self.grid.in_grid() {
            return;
        }
        let grid = self.grid;
        let info = self.info;
        self.local.fill_zero();
        let col_period = info.col.dist.period(grid);
        for local_i in 0..info.local_nrows(grid) {
            let i = info.col.shift + local_i * col_period;
            if i < info.width && info.row.owns(grid, i) {
                let local_j = info.row.local_index(grid, i);
                self.local.write(local_i, local_j, E::one());
            }
        }
    }

    /// Fills the matrix with random values. Replicated axes hold
    /// bit-identical data on every replica: the values are drawn on rank 0
    /// of the replicating communicator and broadcast along it.
    pub fn set_to_random<R: Rng>(&mut self, rng: &mut R) {
        let mut aux = Scratch::new();
        set_to_random_impl(self.grid, self.info, self.local.rb_mut(), &mut aux, rng);
    }

    /// In-place all-reduce (sum) of the local tile over the row
    /// communicator. The row axis must be replicated so that every
    /// participant holds a congruent tile.
    pub fn sum_over_row(&mut self) {
        let mut aux = Scratch::new();
        sum_over_impl(
            self.grid,
            self.info,
            self.local.rb_mut(),
            &mut aux,
            SumAxis::Row,
        );
    }

    /// In-place all-reduce (sum) of the local tile over the column
    /// communicator. The column axis must be replicated.
    pub fn sum_over_col(&mut self) {
        let mut aux = Scratch::new();
        sum_over_impl(
            self.grid,
            self.info,
            self.local.rb_mut(),
            &mut aux,
            SumAxis::Col,
        );
    }

    /// Reduce-scatters `x` along its replicated axis and adds `alpha` times
    /// the result into this `[MC, MR]` tile.
    #[track_caller]
    pub fn sum_scatter_update(&mut self, alpha: E, x: DistMatRef<'g, '_, E>) {
        let mut aux = Scratch::new();
        sum_scatter_update_impl(self.grid, self.info, self.local.rb_mut(), &mut aux, alpha, x);
    }
}

impl<'g, E: ComplexField> DistMat<'g, E> {
    /// Fresh owning matrix of dimension `0×0`, unaligned.
    pub fn new(grid: &'g Grid, col_dist: Dist, row_dist: Dist) -> Self {
        assert_legal(col_dist, row_dist);
        Self {
            grid,
            info: DistInfo {
                col: AxisInfo::new(grid, col_dist, 0),
                row: AxisInfo::new(grid, row_dist, 0),
                height: 0,
                width: 0,
            },
            constrained_col: false,
            constrained_row: false,
            local: Mat::new(),
            scratch: Scratch::new(),
        }
    }

    /// Fresh owning matrix of global dimension `height × width`, unaligned.
    pub fn with_dims(
        grid: &'g Grid,
        col_dist: Dist,
        row_dist: Dist,
        height: usize,
        width: usize,
    ) -> Self {
        let mut this = Self::new(grid, col_dist, row_dist);
        this.resize(height, width);
        this
    }

    /// Fresh owning matrix of dimension `0×0` with fixed alignments.
    pub fn aligned(
        grid: &'g Grid,
        col_dist: Dist,
        row_dist: Dist,
        col_align: usize,
        row_align: usize,
    ) -> Self {
        let mut this = Self::new(grid, col_dist, row_dist);
        this.align(col_align, row_align);
        this
    }

    #[inline]
    pub fn grid(&self) -> &'g Grid {
        self.grid
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.info.height
    }
    #[inline]
    pub fn width(&self) -> usize {
        self.info.width
    }
    #[inline]
    pub fn col_dist(&self) -> Dist {
        self.info.col.dist
    }
    #[inline]
    pub fn row_dist(&self) -> Dist {
        self.info.row.dist
    }
    #[inline]
    pub fn col_align(&self) -> usize {
        self.info.col.align
    }
    #[inline]
    pub fn row_align(&self) -> usize {
        self.info.row.align
    }
    #[inline]
    pub fn col_shift(&self) -> usize {
        self.info.col.shift
    }
    #[inline]
    pub fn row_shift(&self) -> usize {
        self.info.row.shift
    }
    #[inline]
    pub fn local_nrows(&self) -> usize {
        self.local.nrows()
    }
    #[inline]
    pub fn local_ncols(&self) -> usize {
        self.local.ncols()
    }

    /// The local tile.
    #[inline]
    pub fn local(&self) -> MatRef<'_, E> {
        self.local.as_ref()
    }

    /// The local tile, mutably.
    #[inline]
    pub fn local_mut(&mut self) -> MatMut<'_, E> {
        self.local.as_mut()
    }

    #[inline]
    pub fn as_ref(&self) -> DistMatRef<'g, '_, E> {
        DistMatRef {
            grid: self.grid,
            info: self.info,
            local: self.local.as_ref(),
        }
    }

    #[inline]
    pub fn as_mut(&mut self) -> DistMatMut<'g, '_, E> {
        DistMatMut {
            grid: self.grid,
            info: self.info,
            local: self.local.as_mut(),
        }
    }

    /// Resizes the global matrix, reallocating the local tile to exactly
    /// this process's owned slice.
    pub fn resize(&mut self, height: usize, width: usize) {
        self.info.height = height;
        self.info.width = width;
        let local_nrows = self.info.local_nrows(self.grid);
        let local_ncols = self.info.local_ncols(self.grid);
        self.local.resize(local_nrows, local_ncols);
    }

    /// Fixes both alignments. The local tile is invalidated (`0×0`) until
    /// the next resize or assignment.
    #[track_caller]
    pub fn align(&mut self, col_align: usize, row_align: usize) {
        self.align_cols(col_align);
        self.align_rows(row_align);
    }

    /// Fixes the column-axis alignment and invalidates the local tile.
    #[track_caller]
    pub fn align_cols(&mut self, col_align: usize) {
        self.info.col = AxisInfo::new(self.grid, self.info.col.dist, col_align);
        self.constrained_col = true;
        self.info.height = 0;
        self.info.width = 0;
        self.local.resize(0, 0);
    }

    /// Fixes the row-axis alignment and invalidates the local tile.
    #[track_caller]
    pub fn align_rows(&mut self, row_align: usize) {
        self.info.row = AxisInfo::new(self.grid, self.info.row.dist, row_align);
        self.constrained_row = true;
        self.info.height = 0;
        self.info.width = 0;
        self.local.resize(0, 0);
    }

    /// Copies the matching axis alignments from `other` so that a
    /// subsequent operation between the two proceeds without data movement.
    ///
    /// # Panics
    ///
    /// Panics if no axis of `other` shares a grid axis with this matrix.
    #[track_caller]
    pub fn align_with(&mut self, other: DistMatRef<'g, '_, E>) {
        let col = matching_alignment(self.grid, self.info.col.dist, &other.info);
        let row = matching_alignment(self.grid, self.info.row.dist, &other.info);
        fancy_assert!(
            col.is_some() || row.is_some(),
            "no recognized alignment pairing between ({:?}, {:?}) and ({:?}, {:?})",
            self.info.col.dist,
            self.info.row.dist,
            other.info.col.dist,
            other.info.row.dist
        );
        if let Some(align) = col {
            self.align_cols(align);
        }
        if let Some(align) = row {
            self.align_rows(align);
        }
    }

    /// Copies the column-axis alignment from the matching axis of `other`.
    #[track_caller]
    pub fn align_cols_with(&mut self, other: DistMatRef<'g, '_, E>) {
        match matching_alignment(self.grid, self.info.col.dist, &other.info) {
            Some(align) => self.align_cols(align),
            None => panic!(
                "no recognized column alignment pairing with ({:?}, {:?})",
                other.info.col.dist, other.info.row.dist
            ),
        }
    }

    /// Copies the row-axis alignment from the matching axis of `other`.
    #[track_caller]
    pub fn align_rows_with(&mut self, other: DistMatRef<'g, '_, E>) {
        match matching_alignment(self.grid, self.info.row.dist, &other.info) {
            Some(align) => self.align_rows(align),
            None => panic!(
                "no recognized row alignment pairing with ({:?}, {:?})",
                other.info.col.dist, other.info.row.dist
            ),
        }
    }

    /// Redistributes `src` into this matrix. An unconstrained destination
    /// adopts the source alignment; a constrained one rotates the data into
    /// its fixed alignment.
    #[track_caller]
    pub fn assign(&mut self, src: DistMatRef<'g, '_, E>) {
        let req_col = if self.constrained_col {
            Some(self.info.col.align)
        } else {
            None
        };
        let req_row = if self.constrained_row {
            Some(self.info.row.align)
        } else {
            None
        };
        let mut aux = core::mem::take(&mut self.scratch);
        let result = redist::redistribute(
            self.grid,
            self.info.col.dist,
            self.info.row.dist,
            req_col,
            req_row,
            src,
            &mut aux,
        );
        self.scratch = aux;
        self.info = result.info;
        self.local = result.local;
    }

    /// Transposed redistribution of `src` into this matrix.
    #[track_caller]
    pub fn transpose_from(&mut self, src: DistMatRef<'g, '_, E>) {
        self.transpose_from_impl(src, false);
    }

    /// Conjugate-transposed redistribution of `src` into this matrix.
    #[track_caller]
    pub fn adjoint_from(&mut self, src: DistMatRef<'g, '_, E>) {
        self.transpose_from_impl(src, true);
    }

    fn transpose_from_impl(&mut self, src: DistMatRef<'g, '_, E>, conj: bool) {
        let req_col = if self.constrained_col {
            Some(self.info.col.align)
        } else {
            None
        };
        let req_row = if self.constrained_row {
            Some(self.info.row.align)
        } else {
            None
        };
        let mut aux = core::mem::take(&mut self.scratch);
        let result = redist::transpose_redistribute(
            self.grid,
            self.info.col.dist,
            self.info.row.dist,
            req_col,
            req_row,
            src,
            conj,
            &mut aux,
        );
        self.scratch = aux;
        self.info = result.info;
        self.local = result.local;
    }

    /// See [`DistMatRef::get`].
    #[track_caller]
    pub fn get(&self, i: usize, j: usize) -> E {
        self.as_ref().get(i, j)
    }

    /// See [`DistMatMut::set`].
    #[track_caller]
    pub fn set(&mut self, i: usize, j: usize, value: E) {
        self.as_mut().set(i, j, value);
    }

    /// See [`DistMatMut::update`].
    #[track_caller]
    pub fn update(&mut self, i: usize, j: usize, value: E) {
        self.as_mut().update(i, j, value);
    }

    /// See [`DistMatMut::make_trapezoidal`].
    pub fn make_trapezoidal(&mut self, side: Side, shape: Uplo, offset: isize) {
        self.as_mut().make_trapezoidal(side, shape, offset);
    }

    /// See [`DistMatMut::scale_trapezoidal`].
    pub fn scale_trapezoidal(&mut self, alpha: E, side: Side, shape: Uplo, offset: isize) {
        self.as_mut().scale_trapezoidal(alpha, side, shape, offset);
    }

    /// See [`DistMatMut::set_to_identity`].
    pub fn set_to_identity(&mut self) {
        self.as_mut().set_to_identity();
    }

    /// See [`DistMatMut::set_to_random`].
    pub fn set_to_random<R: Rng>(&mut self, rng: &mut R) {
        let grid = self.grid;
        let info = self.info;
        set_to_random_impl(grid, info, self.local.as_mut(), &mut self.scratch, rng);
    }

    /// See [`DistMatMut::sum_over_row`].
    pub fn sum_over_row(&mut self) {
        let grid = self.grid;
        let info = self.info;
        sum_over_impl(grid, info, self.local.as_mut(), &mut self.scratch, SumAxis::Row);
    }

    /// See [`DistMatMut::sum_over_col`].
    pub fn sum_over_col(&mut self) {
        let grid = self.grid;
        let info = self.info;
        sum_over_impl(grid, info, self.local.as_mut(), &mut self.scratch, SumAxis::Col);
    }

    /// See [`DistMatMut::sum_scatter_update`].
    #[track_caller]
    pub fn sum_scatter_update(&mut self, alpha: E, x: DistMatRef<'g, '_, E>) {
        let grid = self.grid;
        let info = self.info;
        sum_scatter_update_impl(grid, info, self.local.as_mut(), &mut self.scratch, alpha, x);
    }
}

fn matching_alignment(grid: &Grid, my_dist: Dist, other: &DistInfo) -> Option<usize> {
    #[derive(PartialEq, Clone, Copy)]
    enum Family {
        GridRows,
        GridCols,
    }
    let family = |dist: Dist| match dist {
        Dist::MC | Dist::VC => Some(Family::GridRows),
        Dist::MR | Dist::VR => Some(Family::GridCols),
        Dist::MD | Dist::Star => None,
    };
    let mine = family(my_dist)?;
    let period = my_dist.period(grid);
    for axis in [&other.col, &other.row] {
        if family(axis.dist) == Some(mine) {
            return Some(axis.align % period);
        }
    }
    None
}

fn set_to_random_impl<E: ComplexField, R: Rng>(
    grid: &Grid,
    info: DistInfo,
    mut local: MatMut<'_, E>,
    aux: &mut Scratch<E>,
    rng: &mut R,
) {
    if !grid.in_grid() {
        return;
    }
    let pins_mc = info.col.dist.pins_mc() || info.row.dist.pins_mc();
    let pins_mr = info.col.dist.pins_mr() || info.row.dist.pins_mr();
    let replicas = match (pins_mc, pins_mr) {
        (true, true) => None,
        (true, false) => Some(grid.mr_comm()),
        (false, true) => Some(grid.mc_comm()),
        (false, false) => Some(grid.vc_comm()),
    };

    let local_nrows = local.nrows();
    let local_ncols = local.ncols();
    match replicas {
        None => {
            for j in 0..local_ncols {
                for value in local.rb_mut().col_mut(j) {
                    *value = E::random(rng);
                }
            }
        }
        Some(comm) => {
            let len = local_nrows * local_ncols;
            let buffer = aux.require(len);
            if comm.rank() == 0 {
                for value in buffer.iter_mut() {
                    *value = E::random(rng);
                }
            }
            comm::broadcast(comm, buffer, 0);
            for j in 0..local_ncols {
                local
                    .rb_mut()
                    .col_mut(j)
                    .copy_from_slice(&buffer[j * local_nrows..][..local_nrows]);
            }
            aux.release();
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum SumAxis {
    Row,
    Col,
}

fn sum_over_impl<E: ComplexField>(
    grid: &Grid,
    info: DistInfo,
    mut local: MatMut<'_, E>,
    aux: &mut Scratch<E>,
    axis: SumAxis,
) {
    if !grid.in_grid() {
        return;
    }
    match axis {
        SumAxis::Row => fancy_assert!(
            info.row.dist == Dist::Star,
            "sum_over_row requires a replicated row axis"
        ),
        SumAxis::Col => fancy_assert!(
            info.col.dist == Dist::Star,
            "sum_over_col requires a replicated column axis"
        ),
    }
    let comm = match axis {
        SumAxis::Row => grid.mr_comm(),
        SumAxis::Col => grid.mc_comm(),
    };

    let local_nrows = local.nrows();
    let local_ncols = local.ncols();
    let local_size = Ord::max(local_nrows * local_ncols, MIN_COLL_MSG);
    let buffer = aux.require(2 * local_size);
    let (send, recv) = buffer.split_at_mut(local_size);

    for j in 0..local_ncols {
        send[j * local_nrows..][..local_nrows].copy_from_slice(local.rb().col(j));
    }
    comm::all_reduce_sum(comm, send, recv);
    for j in 0..local_ncols {
        local
            .rb_mut()
            .col_mut(j)
            .copy_from_slice(&recv[j * local_nrows..][..local_nrows]);
    }
    aux.release();
}

fn sum_scatter_update_impl<'g, E: ComplexField>(
    grid: &Grid,
    info: DistInfo,
    mut local: MatMut<'_, E>,
    aux: &mut Scratch<E>,
    alpha: E,
    x: DistMatRef<'g, '_, E>,
) {
    fancy_assert!(
        info.col.dist == Dist::MC && info.row.dist == Dist::MR,
        "sum_scatter_update accumulates into an [MC, MR] matrix"
    );
    fancy_assert!(
        info.height == x.info.height && info.width == x.info.width,
        "sum_scatter_update requires matching global dimensions"
    );
    if !grid.in_grid() {
        return;
    }
    let (r, c) = (grid.height(), grid.width());
    let local_nrows = local.nrows();
    let local_ncols = local.ncols();

    if x.info.row.dist == Dist::Star {
        // X is [MC, *]: reduce-scatter its columns over the row communicator
        fancy_assert!(x.info.col.dist == Dist::MC);
        fancy_assert!(
            x.info.col.align == info.col.align,
            "sum_scatter_update requires an aligned operand"
        );
        let width = info.width;
        let size = Ord::max(local_nrows * width, MIN_COLL_MSG);
        let buffer = aux.require(2 * size);
        let (send, recv) = buffer.split_at_mut(size);
        for j in 0..width {
            send[j * local_nrows..][..local_nrows].copy_from_slice(x.local.col(j));
        }
        comm::all_reduce_sum(grid.mr_comm(), send, recv);
        for local_j in 0..local_ncols {
            let j = info.row.shift + local_j * c;
            let col = local.rb_mut().col_mut(local_j);
            let reduced = &recv[j * local_nrows..][..local_nrows];
            for (dst, src) in col.iter_mut().zip(reduced) {
                *dst += alpha * *src;
            }
        }
        aux.release();
    } else if x.info.col.dist == Dist::Star {
        // X is [*, MR]: reduce-scatter its rows over the column communicator
        fancy_assert!(x.info.row.dist == Dist::MR);
        fancy_assert!(
            x.info.row.align == info.row.align,
            "sum_scatter_update requires an aligned operand"
        );
        let height = info.height;
        let size = Ord::max(height * local_ncols, MIN_COLL_MSG);
        let buffer = aux.require(2 * size);
        let (send, recv) = buffer.split_at_mut(size);
        for local_j in 0..local_ncols {
            send[local_j * height..][..height].copy_from_slice(x.local.col(local_j));
        }
        comm::all_reduce_sum(grid.mc_comm(), send, recv);
        for local_j in 0..local_ncols {
            let col = local.rb_mut().col_mut(local_j);
            let reduced = &recv[local_j * height..][..height];
            for (local_i, dst) in col.iter_mut().enumerate() {
                let i = info.col.shift + local_i * r;
                *dst += alpha * reduced[i];
            }
        }
        aux.release();
    } else {
        panic!("sum_scatter_update requires a [MC, *] or [*, MR] operand");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::run_local;
    use crate::comm::Communicator;
    use crate::{c64, Dist, Grid};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn all_variants() -> Vec<(Dist, Dist)> {
        use Dist::*;
        vec![
            (MC, MR),
            (MC, Star),
            (Star, MC),
            (MR, MC),
            (MR, Star),
            (Star, MR),
            (VC, Star),
            (Star, VC),
            (VR, Star),
            (Star, VR),
            (MD, Star),
            (Star, MD),
            (Star, Star),
        ]
    }

    #[test]
    fn owner_uniqueness() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let (h, w) = (5, 4);
            for (col_dist, row_dist) in all_variants() {
                let a = DistMat::<f64>::with_dims(&grid, col_dist, row_dist, h, w);
                let view = a.as_ref();
                // replication is over exactly the grid dimensions left
                // unpinned by the tag pair
                let pins_mc = view.info.col.dist.pins_mc() || view.info.row.dist.pins_mc();
                let pins_mr = view.info.col.dist.pins_mr() || view.info.row.dist.pins_mr();
                let mut expected = 1usize;
                if !pins_mc {
                    expected *= grid.height();
                }
                if !pins_mr {
                    expected *= grid.width();
                }
                for i in 0..h {
                    for j in 0..w {
                        let owns = view.info.col.owns(&grid, i) && view.info.row.owns(&grid, j);
                        let count = [owns as u64];
                        let mut gathered = [0u64; 6];
                        crate::comm::all_gather(grid.vc_comm(), &count, &mut gathered);
                        let owners: u64 = gathered.iter().sum();
                        assert_eq!(
                            owners as usize, expected,
                            "({:?},{:?}) at ({},{})",
                            col_dist, row_dist, i, j
                        );
                        // the process the broadcast roots at is always an
                        // owner
                        let root = view.info.owner_vc(&grid, i, j);
                        if grid.vc_rank() == root {
                            assert!(owns);
                        }
                    }
                }
            }
        });
    }

    #[test]
    fn get_set_consistency() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            for (col_dist, row_dist) in all_variants() {
                let mut a = DistMat::<f64>::with_dims(&grid, col_dist, row_dist, 4, 5);
                for i in 0..4 {
                    for j in 0..5 {
                        a.set(i, j, (10 * i + j) as f64);
                    }
                }
                for i in 0..4 {
                    for j in 0..5 {
                        assert_eq!(
                            a.get(i, j),
                            (10 * i + j) as f64,
                            "({:?},{:?})",
                            col_dist,
                            row_dist
                        );
                    }
                }
                a.update(1, 2, 0.5);
                assert_eq!(a.get(1, 2), 12.5);
            }
        });
    }

    #[test]
    fn trapezoid_idempotent_and_band() {
        run_local(4, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 2);
            let (n, fill) = (6, 1.0f64);
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, n, n);
            for i in 0..n {
                for j in 0..n {
                    a.set(i, j, fill);
                }
            }
            a.make_trapezoidal(Side::Left, Uplo::Lower, 0);
            let mut b_entries = Vec::new();
            for i in 0..n {
                for j in 0..n {
                    b_entries.push(a.get(i, j));
                }
            }
            a.make_trapezoidal(Side::Left, Uplo::Lower, 0);
            for (k, (i, j)) in (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).enumerate() {
                assert_eq!(a.get(i, j), b_entries[k], "idempotence at ({i},{j})");
                // lower-shape zeroing with offset 0 keeps i >= j
                let expected = if i >= j { fill } else { 0.0 };
                assert_eq!(a.get(i, j), expected);
            }

            // the upper zeroing at offset 1 keeps exactly the complementary
            // region, so the two trapezoids partition the matrix
            let mut b = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, n, n);
            for i in 0..n {
                for j in 0..n {
                    b.set(i, j, fill);
                }
            }
            b.make_trapezoidal(Side::Left, Uplo::Upper, 1);
            for i in 0..n {
                for j in 0..n {
                    let expected = if i < j { fill } else { 0.0 };
                    assert_eq!(b.get(i, j), expected, "strict upper at ({i},{j})");
                    assert_eq!(a.get(i, j) + b.get(i, j), fill, "partition at ({i},{j})");
                }
            }
        });
    }

    #[test]
    fn scale_trapezoidal_scales_kept_region() {
        run_local(4, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 2);
            let n = 4;
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, n, n);
            for i in 0..n {
                for j in 0..n {
                    a.set(i, j, 1.0);
                }
            }
            a.scale_trapezoidal(3.0, Side::Left, Uplo::Lower, 0);
            for i in 0..n {
                for j in 0..n {
                    let expected = if i >= j { 3.0 } else { 1.0 };
                    assert_eq!(a.get(i, j), expected);
                }
            }
        });
    }

    #[test]
    fn identity_has_unit_diagonal() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            for (col_dist, row_dist) in all_variants() {
                let mut a = DistMat::<f64>::with_dims(&grid, col_dist, row_dist, 5, 5);
                a.set_to_identity();
                for i in 0..5 {
                    for j in 0..5 {
                        let expected = if i == j { 1.0 } else { 0.0 };
                        assert_eq!(a.get(i, j), expected, "({:?},{:?})", col_dist, row_dist);
                    }
                }
            }
        });
    }

    #[test]
    fn random_replicas_match() {
        run_local(6, |comm| {
            let rank = comm.rank();
            let grid = Grid::new(Box::new(comm), 2, 3);
            for (col_dist, row_dist) in [
                (Dist::MC, Dist::Star),
                (Dist::Star, Dist::MR),
                (Dist::Star, Dist::Star),
            ] {
                let mut a = DistMat::<c64>::with_dims(&grid, col_dist, row_dist, 5, 4);
                // intentionally different seeds per rank: only the replica
                // root's draws must be visible
                let mut rng = StdRng::seed_from_u64(1234 + rank as u64);
                a.set_to_random(&mut rng);

                // the local tiles must agree bit for bit across the
                // communicator that replicates this layout
                let replicas = match (col_dist, row_dist) {
                    (Dist::MC, Dist::Star) => grid.mr_comm(),
                    (Dist::Star, Dist::MR) => grid.mc_comm(),
                    _ => grid.vc_comm(),
                };
                let mut tile = Vec::new();
                for j in 0..a.local_ncols() {
                    tile.extend_from_slice(a.local().col(j));
                }
                let mut gathered = vec![c64::new(0.0, 0.0); tile.len() * replicas.size()];
                comm::all_gather(replicas, &tile, &mut gathered);
                for k in 0..replicas.size() {
                    assert_eq!(
                        &gathered[k * tile.len()..][..tile.len()],
                        &tile[..],
                        "({:?},{:?}) replica {}",
                        col_dist,
                        row_dist,
                        k
                    );
                }
            }
        });
    }

    #[test]
    fn sum_over_row_accumulates() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::Star, 4, 3);
            // every replica holds its grid column index
            let mr = grid.mr_rank() as f64;
            for j in 0..a.local_ncols() {
                for i in 0..a.local_nrows() {
                    a.local_mut().write(i, j, mr);
                }
            }
            a.sum_over_row();
            // 0 + 1 + 2
            for i in 0..4 {
                for j in 0..3 {
                    assert_eq!(a.get(i, j), 3.0);
                }
            }
        });
    }

    #[test]
    fn sum_scatter_update_reduces_panel() {
        run_local(4, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 2);
            let (h, w) = (4, 3);
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, h, w);
            for i in 0..h {
                for j in 0..w {
                    a.set(i, j, 1.0);
                }
            }
            // X[i, j] = i + j on every replica; the reduce-scatter sums the
            // c replicas
            let mut x = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::Star, h, w);
            let col_shift = x.col_shift();
            let r = grid.height();
            for local_i in 0..x.local_nrows() {
                for j in 0..w {
                    let i = col_shift + local_i * r;
                    x.local_mut().write(local_i, j, (i + j) as f64);
                }
            }
            a.sum_scatter_update(-1.0, x.as_ref());
            let c = grid.width() as f64;
            for i in 0..h {
                for j in 0..w {
                    assert_eq!(a.get(i, j), 1.0 - c * (i + j) as f64);
                }
            }
        });
    }

    #[test]
    fn views_track_alignment() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, 6, 6);
            for i in 0..6 {
                for j in 0..6 {
                    a.set(i, j, (10 * i + j) as f64);
                }
            }
            let view = a.as_ref().submatrix(1, 2, 3, 4);
            assert_eq!(view.col_align(), 1 % 2);
            assert_eq!(view.row_align(), 2 % 3);
            for i in 0..3 {
                for j in 0..4 {
                    assert_eq!(view.get(i, j), (10 * (i + 1) + (j + 2)) as f64);
                }
            }

            let [tl, tr, bl, br] = a.as_mut().split_at(2, 3);
            assert_eq!(tl.height(), 2);
            assert_eq!(tr.width(), 3);
            assert_eq!(bl.height(), 4);
            assert_eq!(br.get(0, 0), 23.0);
            let mut br = br;
            br.set(0, 0, -1.0);
            assert_eq!(a.get(2, 3), -1.0);
        });
    }

    #[test]
    fn md_element_access() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MD, Dist::Star, 7, 2);
            for i in 0..7 {
                for j in 0..2 {
                    a.set(i, j, (i * 2 + j) as f64);
                }
            }
            for i in 0..7 {
                for j in 0..2 {
                    assert_eq!(a.get(i, j), (i * 2 + j) as f64);
                }
            }
        });
    }

    #[test]
    fn align_with_copies_matching_axis() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let mut a = DistMat::<f64>::aligned(&grid, Dist::MC, Dist::MR, 1, 2);
            a.resize(4, 4);

            let mut x = DistMat::<f64>::new(&grid, Dist::MC, Dist::Star);
            x.align_cols_with(a.as_ref());
            assert_eq!(x.col_align(), 1);

            let mut y = DistMat::<f64>::new(&grid, Dist::VC, Dist::Star);
            y.align_with(a.as_ref());
            assert_eq!(y.col_align(), 1);

            let mut z = DistMat::<f64>::new(&grid, Dist::MR, Dist::Star);
            z.align_with(a.as_ref());
            assert_eq!(z.col_align(), 2);

            let mut w = DistMat::<f64>::new(&grid, Dist::Star, Dist::MC);
            w.align_rows_with(a.as_ref());
            assert_eq!(w.row_align(), 1);
        });
    }
}
