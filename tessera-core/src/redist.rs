//! Redistribution engine.
//!
//! Assignment between two distributed layouts is a pure function of the
//! (destination, source) tag pair, built from four families of primitive
//! steps:
//!
//! 1. *identity*: same tags, same alignments, a local tile copy;
//! 2. *local-pattern permutation*: [`remove_axis`] (all-gather a
//!    distributed axis into STAR over its communicator, with strided
//!    unpack), [`local_select`] (introduce a distribution onto a STAR axis
//!    or refine MC into VC / MR into VR without communication),
//!    [`coarsen`] (VC into MC / VR into MR through an all-gather over the
//!    complementary communicator with interleaved unpack), and
//!    [`vector_swap`] (the pairwise send-recv permutation between the VC
//!    and VR orderings);
//! 3. *misaligned same-pattern*: [`realign`], a pairwise send-recv
//!    rotation along the affected axis;
//! 4. *cross-pattern*: composition, where the routing in [`next_variant`] walks
//!    the conversion graph through row-replicated intermediates (e.g.
//!    `[MC,*] = [MR,MC]` proceeds via `[VR,*]` then `[VC,*]`), dropping
//!    each intermediate as soon as the next step has consumed it.
//!
//! Transposing redistributions (`transpose_from` / `adjoint_from`) fuse the
//! local transpose into the family-2 pack of the same collectives.
//!
//! Portions contributed to collectives are clamped to
//! [`MIN_COLL_MSG`] so empty tiles still produce valid traffic, and a
//! width-1 operand takes a single-column broadcast instead of the general
//! all-gather.

use crate::comm::{self, Communicator, MIN_COLL_MSG};
use crate::dist::matrix::{AxisInfo, DistInfo, DistMat, DistMatMut, DistMatRef, Scratch};
use crate::dist::{local_length, max_local_length, shift, vr_to_vc, Dist};
use crate::grid::Grid;
use crate::ComplexField;
use assert2::assert as fancy_assert;

/// Builds an owning matrix with explicit alignments, bypassing the
/// constrained-alignment bookkeeping of the public constructors.
fn make_dist<'g, E: ComplexField>(
    grid: &'g Grid,
    col_dist: Dist,
    row_dist: Dist,
    col_align: usize,
    row_align: usize,
    height: usize,
    width: usize,
) -> DistMat<'g, E> {
    let mut this = DistMat::new(grid, col_dist, row_dist);
    this.info.col = AxisInfo::new(grid, col_dist, col_align);
    this.info.row = AxisInfo::new(grid, row_dist, row_align);
    this.resize(height, width);
    this
}

fn axis_comm<'a>(grid: &'a Grid, dist: Dist) -> &'a dyn Communicator {
    match dist {
        Dist::MC => grid.mc_comm(),
        Dist::MR => grid.mr_comm(),
        Dist::VC => grid.vc_comm(),
        Dist::VR => grid.vr_comm(),
        Dist::MD | Dist::Star => unreachable!("no communicator cycles a {:?} axis", dist),
    }
}

fn warn_unaligned(grid: &Grid, what: &str) {
    if grid.in_grid() && grid.vc_rank() == 0 {
        log::warn!("unaligned redistribution on the {what} axis");
    }
}

fn involves_md(a: Dist, b: Dist, c: Dist, d: Dist) -> bool {
    [a, b, c, d].contains(&Dist::MD)
}

/// Redistributes `src` into a fresh owning matrix with the given layout.
/// `req_col` / `req_row` pin the destination alignments (constrained or
/// viewing destinations); `None` lets the natural alignment of the route be
/// adopted.
pub(crate) fn redistribute<'g, E: ComplexField>(
    grid: &'g Grid,
    col_dist: Dist,
    row_dist: Dist,
    req_col: Option<usize>,
    req_row: Option<usize>,
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let (src_cd, src_rd) = (src.col_dist(), src.row_dist());
    if involves_md(col_dist, row_dist, src_cd, src_rd) {
        let same = col_dist == src_cd
            && row_dist == src_rd
            && req_col.map_or(true, |a| a == src.col_align())
            && req_row.map_or(true, |a| a == src.row_align());
        if same {
            return copy_of(grid, src);
        }
        unimplemented!("redistribution involving the diagonal distribution");
    }

    let result = convert(grid, col_dist, row_dist, req_col, req_row, src, aux);
    finalize(grid, result, req_col, req_row, aux)
}

fn convert<'g, E: ComplexField>(
    grid: &'g Grid,
    col_dist: Dist,
    row_dist: Dist,
    req_col: Option<usize>,
    req_row: Option<usize>,
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    if src.col_dist() == col_dist && src.row_dist() == row_dist {
        return copy_of(grid, src);
    }
    let (c_next, r_next) = next_variant(src.col_dist(), src.row_dist(), col_dist, row_dist);
    let mut cur = apply_step(
        grid,
        c_next,
        r_next,
        (col_dist, req_col),
        (row_dist, req_row),
        src,
        aux,
    );
    // walk the remaining hops, dropping each intermediate as soon as the
    // next step has consumed it
    while cur.col_dist() != col_dist || cur.row_dist() != row_dist {
        let (c_next, r_next) = next_variant(cur.col_dist(), cur.row_dist(), col_dist, row_dist);
        let next = apply_step(
            grid,
            c_next,
            r_next,
            (col_dist, req_col),
            (row_dist, req_row),
            cur.as_ref(),
            aux,
        );
        cur = next;
    }
    cur
}

/// One hop of the single-axis conversion graph
/// `* - MC - VC - VR - MR - *`.
fn next_hop(from: Dist, to: Dist) -> Dist {
    use Dist::*;
    match (from, to) {
        (Star, _) => to,
        (_, Star) => Star,
        (MC, VC) | (VC, MC) | (MR, VR) | (VR, MR) | (VC, VR) | (VR, VC) => to,
        (MC, MR) | (MC, VR) => VC,
        (MR, MC) | (MR, VC) => VR,
        (VC, MR) => VR,
        (VR, MC) => VC,
        _ => unreachable!("no conversion from {:?} to {:?}", from, to),
    }
}

/// The next intermediate variant on the route from `(c1, r1)` to
/// `(c2, r2)`. Cross-pattern conversions strip the row distribution first,
/// walk the column axis through the vector orderings, and re-introduce the
/// row distribution last, so every intermediate stays a legal variant.
fn next_variant(c1: Dist, r1: Dist, c2: Dist, r2: Dist) -> (Dist, Dist) {
    use Dist::Star;
    if c1 != c2 && r1 != r2 {
        if r1 != Star {
            (c1, Star)
        } else {
            (next_hop(c1, c2), Star)
        }
    } else if c1 != c2 {
        if r1 == Star {
            (next_hop(c1, c2), Star)
        } else {
            // with an identical non-replicated row axis, only the
            // introduction or removal of the column distribution is a legal
            // move
            (c2, r1)
        }
    } else {
        if c1 == Star {
            (Star, next_hop(r1, r2))
        } else {
            (c1, r2)
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Axis {
    Col,
    Row,
}

fn apply_step<'g, E: ComplexField>(
    grid: &'g Grid,
    c_next: Dist,
    r_next: Dist,
    (c_final, req_col): (Dist, Option<usize>),
    (r_final, req_row): (Dist, Option<usize>),
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    use Dist::Star;
    let (c1, r1) = (src.col_dist(), src.row_dist());

    if r_next != r1 {
        let req = if r_next == r_final { req_row } else { None };
        match (r1, r_next) {
            (_, Star) => remove_axis(grid, Axis::Row, src, aux),
            (Star, _) => {
                let align = req.unwrap_or(0);
                local_select(grid, c1, r_next, src.col_align(), align, src)
            }
            (Dist::MC, Dist::VC) | (Dist::MR, Dist::VR) => {
                let base = r1.period(grid);
                let natural = src.row_align();
                let align = match req {
                    Some(a) if a % base == natural % base => a,
                    _ => natural,
                };
                local_select(grid, c1, r_next, src.col_align(), align, src)
            }
            (Dist::VC, Dist::MC) | (Dist::VR, Dist::MR) => coarsen(grid, Axis::Row, src, aux),
            (Dist::VC, Dist::VR) | (Dist::VR, Dist::VC) => {
                // when the axis later coarsens into a grid-axis
                // distribution, land the swap on an alignment the coarsening
                // accepts as-is
                let align = match (req, r_final, req_row) {
                    (Some(align), _, _) => align,
                    (None, Dist::MC | Dist::MR, Some(align)) => align,
                    _ => src.row_align(),
                };
                vector_swap(grid, Axis::Row, r_next, align, src, aux)
            }
            _ => unreachable!(),
        }
    } else {
        let req = if c_next == c_final { req_col } else { None };
        match (c1, c_next) {
            (_, Star) => remove_axis(grid, Axis::Col, src, aux),
            (Star, _) => {
                let align = req.unwrap_or(0);
                local_select(grid, c_next, r1, align, src.row_align(), src)
            }
            (Dist::MC, Dist::VC) | (Dist::MR, Dist::VR) => {
                let base = c1.period(grid);
                let natural = src.col_align();
                let align = match req {
                    Some(a) if a % base == natural % base => a,
                    _ => natural,
                };
                local_select(grid, c_next, r1, align, src.row_align(), src)
            }
            (Dist::VC, Dist::MC) | (Dist::VR, Dist::MR) => coarsen(grid, Axis::Col, src, aux),
            (Dist::VC, Dist::VR) | (Dist::VR, Dist::VC) => {
                let align = match (req, c_final, req_col) {
                    (Some(align), _, _) => align,
                    (None, Dist::MC | Dist::MR, Some(align)) => align,
                    _ => src.col_align(),
                };
                vector_swap(grid, Axis::Col, c_next, align, src, aux)
            }
            _ => unreachable!(),
        }
    }
}

/// Rotates constrained destination alignments into place, one send-recv per
/// mismatched axis.
fn finalize<'g, E: ComplexField>(
    grid: &'g Grid,
    cur: DistMat<'g, E>,
    req_col: Option<usize>,
    req_row: Option<usize>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let mut cur = cur;
    if let Some(align) = req_col {
        if align != cur.info.col.align && cur.info.col.dist != Dist::Star {
            warn_unaligned(grid, "column");
            let next = realign(grid, Axis::Col, align, cur.as_ref(), aux);
            cur = next;
        }
    }
    if let Some(align) = req_row {
        if align != cur.info.row.align && cur.info.row.dist != Dist::Star {
            warn_unaligned(grid, "row");
            let next = realign(grid, Axis::Row, align, cur.as_ref(), aux);
            cur = next;
        }
    }
    cur
}

fn copy_of<'g, E: ComplexField>(grid: &'g Grid, src: DistMatRef<'g, '_, E>) -> DistMat<'g, E> {
    let mut dst = make_dist(
        grid,
        src.col_dist(),
        src.row_dist(),
        src.col_align(),
        src.row_align(),
        src.height(),
        src.width(),
    );
    dst.local.as_mut().copy_from(src.local());
    dst
}

/// Family 3: pairwise rotation bringing `src` to a new alignment on one
/// axis.
fn realign<'g, E: ComplexField>(
    grid: &'g Grid,
    axis: Axis,
    new_align: usize,
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let axis_info = match axis {
        Axis::Col => info.col,
        Axis::Row => info.row,
    };
    let dist = axis_info.dist;
    let period = dist.period(grid);
    let (col_align, row_align) = match axis {
        Axis::Col => (new_align, info.row.align),
        Axis::Row => (info.col.align, new_align),
    };
    let mut dst = make_dist(
        grid,
        info.col.dist,
        info.row.dist,
        col_align,
        row_align,
        info.height,
        info.width,
    );
    if !grid.in_grid() {
        return dst;
    }

    let comm = axis_comm(grid, dist);
    let rank = dist.axis_rank(grid).unwrap();
    let old_align = axis_info.align;
    let send_rank = (rank + period + new_align - old_align) % period;
    let recv_rank = (rank + period + old_align - new_align) % period;

    let src_local = src.local();
    let (src_rows, src_cols) = (src_local.nrows(), src_local.ncols());
    let (dst_rows, dst_cols) = (dst.local.nrows(), dst.local.ncols());
    let send_size = src_rows * src_cols;
    let recv_size = dst_rows * dst_cols;
    let buffer = aux.require(send_size + recv_size);
    let (send, recv) = buffer.split_at_mut(send_size);

    for j in 0..src_cols {
        send[j * src_rows..][..src_rows].copy_from_slice(src_local.col(j));
    }
    comm::send_recv(comm, send, send_rank, recv, recv_rank);
    for j in 0..dst_cols {
        dst.local
            .as_mut()
            .col_mut(j)
            .copy_from_slice(&recv[j * dst_rows..][..dst_rows]);
    }
    aux.release();
    dst
}

/// Family 2, pattern removal: all-gathers a distributed axis into STAR over
/// that axis's communicator. A single-column operand takes the broadcast
/// fast path instead.
fn remove_axis<'g, E: ComplexField>(
    grid: &'g Grid,
    axis: Axis,
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let (height, width) = (info.height, info.width);
    let mut dst = match axis {
        Axis::Row => make_dist(grid, info.col.dist, Dist::Star, info.col.align, 0, height, width),
        Axis::Col => make_dist(grid, Dist::Star, info.row.dist, 0, info.row.align, height, width),
    };
    if !grid.in_grid() {
        return dst;
    }

    let removed = match axis {
        Axis::Row => info.row,
        Axis::Col => info.col,
    };
    let comm = axis_comm(grid, removed.dist);
    let count = removed.dist.period(grid);
    let src_local = src.local();

    if axis == Axis::Row && width == 1 {
        // single column: the owning member broadcasts it; every member
        // participates even with an empty tile
        let owner = removed.align % count;
        if comm.rank() == owner {
            dst.local.as_mut().col_mut(0).copy_from_slice(src_local.col(0));
        }
        comm::broadcast(comm, dst.local.as_mut().col_mut(0), owner);
        return dst;
    }

    match axis {
        Axis::Row => {
            let local_rows = src_local.nrows();
            let portion = Ord::max(local_rows * max_local_length(width, count), MIN_COLL_MSG);
            let buffer = aux.require((count + 1) * portion);
            let (send, gathered) = buffer.split_at_mut(portion);
            for j in 0..src_local.ncols() {
                send[j * local_rows..][..local_rows].copy_from_slice(src_local.col(j));
            }
            comm::all_gather(comm, send, gathered);
            for k in 0..count {
                let chunk = &gathered[k * portion..][..portion];
                let shift_k = shift(k, removed.align, count);
                let cols_k = local_length(width, shift_k, count);
                for j in 0..cols_k {
                    dst.local
                        .as_mut()
                        .col_mut(shift_k + j * count)
                        .copy_from_slice(&chunk[j * local_rows..][..local_rows]);
                }
            }
        }
        Axis::Col => {
            let local_cols = src_local.ncols();
            let local_rows = src_local.nrows();
            let portion = Ord::max(max_local_length(height, count) * local_cols, MIN_COLL_MSG);
            let buffer = aux.require((count + 1) * portion);
            let (send, gathered) = buffer.split_at_mut(portion);
            for j in 0..local_cols {
                send[j * local_rows..][..local_rows].copy_from_slice(src_local.col(j));
            }
            comm::all_gather(comm, send, gathered);
            for k in 0..count {
                let chunk = &gathered[k * portion..][..portion];
                let shift_k = shift(k, removed.align, count);
                let rows_k = local_length(height, shift_k, count);
                for j in 0..local_cols {
                    for i in 0..rows_k {
                        dst.local
                            .write(shift_k + i * count, j, chunk[j * rows_k + i]);
                    }
                }
            }
        }
    }
    aux.release();
    dst
}

/// Family 2, pattern introduction or refinement: purely local selection of
/// the destination's owned slice out of a source that holds a superset on
/// each axis.
fn local_select<'g, E: ComplexField>(
    grid: &'g Grid,
    col_dist: Dist,
    row_dist: Dist,
    col_align: usize,
    row_align: usize,
    src: DistMatRef<'g, '_, E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let mut dst = make_dist(
        grid,
        col_dist,
        row_dist,
        col_align,
        row_align,
        info.height,
        info.width,
    );
    if !grid.in_grid() {
        return dst;
    }

    let src_local = src.local();
    let (dst_rows, dst_cols) = (dst.local.nrows(), dst.local.ncols());
    let col_period = col_dist.period(grid);
    let row_period = row_dist.period(grid);
    let src_col_period = info.col.dist.period(grid);
    let src_row_period = info.row.dist.period(grid);
    // the source must own a superset of each destination axis
    fancy_assert!(col_period % src_col_period == 0);
    fancy_assert!(row_period % src_row_period == 0);
    fancy_assert!(dst_rows == 0 || dst.info.col.shift % src_col_period == info.col.shift);
    fancy_assert!(dst_cols == 0 || dst.info.row.shift % src_row_period == info.row.shift);

    let same_col_axis =
        info.col.dist == col_dist && info.col.shift == dst.info.col.shift;
    for local_j in 0..dst_cols {
        let j = dst.info.row.shift + local_j * row_period;
        let src_j = (j - info.row.shift) / src_row_period;
        if same_col_axis {
            dst.local
                .as_mut()
                .col_mut(local_j)
                .copy_from_slice(src_local.col(src_j));
        } else {
            for local_i in 0..dst_rows {
                let i = dst.info.col.shift + local_i * col_period;
                let src_i = (i - info.col.shift) / src_col_period;
                dst.local.write(local_i, local_j, src_local.read(src_i, src_j));
            }
        }
    }
    dst
}

/// Family 2, coarsening: converts a vector distribution back to its base
/// grid-axis distribution by an all-gather over the complementary
/// communicator with interleaved unpack.
fn coarsen<'g, E: ComplexField>(
    grid: &'g Grid,
    axis: Axis,
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let vector = match axis {
        Axis::Col => info.col,
        Axis::Row => info.row,
    };
    let p = grid.size();
    let (base, members) = match vector.dist {
        Dist::VC => (Dist::MC, grid.width()),
        Dist::VR => (Dist::MR, grid.height()),
        _ => unreachable!(),
    };
    let base_period = base.period(grid);
    let sub_stride = p / base_period;
    let natural = vector.align % base_period;

    let mut dst = match axis {
        Axis::Col => make_dist(grid, base, Dist::Star, natural, 0, info.height, info.width),
        Axis::Row => make_dist(grid, Dist::Star, base, 0, natural, info.height, info.width),
    };
    if !grid.in_grid() {
        return dst;
    }

    let comm = match vector.dist {
        Dist::VC => grid.mr_comm(),
        Dist::VR => grid.mc_comm(),
        _ => unreachable!(),
    };
    let base_rank = base.axis_rank(grid).unwrap();
    let src_local = src.local();
    let extent = match axis {
        Axis::Col => info.height,
        Axis::Row => info.width,
    };
    let other_extent = match axis {
        Axis::Col => info.width,
        Axis::Row => info.height,
    };
    let dst_shift = match axis {
        Axis::Col => dst.info.col.shift,
        Axis::Row => dst.info.row.shift,
    };

    let portion = Ord::max(max_local_length(extent, p) * other_extent, MIN_COLL_MSG);
    let buffer = aux.require((members + 1) * portion);
    let (send, gathered) = buffer.split_at_mut(portion);

    let (src_rows, src_cols) = (src_local.nrows(), src_local.ncols());
    for j in 0..src_cols {
        send[j * src_rows..][..src_rows].copy_from_slice(src_local.col(j));
    }
    comm::all_gather(comm, send, gathered);

    for k in 0..members {
        let chunk = &gathered[k * portion..][..portion];
        let peer_vector_rank = base_rank + base_period * k;
        let shift_k = shift(peer_vector_rank, vector.align, p);
        let len_k = local_length(extent, shift_k, p);
        let offset = (shift_k - dst_shift) / base_period;
        match axis {
            Axis::Col => {
                for j in 0..other_extent {
                    for i in 0..len_k {
                        dst.local
                            .write(offset + i * sub_stride, j, chunk[j * len_k + i]);
                    }
                }
            }
            Axis::Row => {
                for j in 0..len_k {
                    dst.local
                        .as_mut()
                        .col_mut(offset + j * sub_stride)
                        .copy_from_slice(&chunk[j * other_extent..][..other_extent]);
                }
            }
        }
    }
    aux.release();
    dst
}

/// Family 2, vector permutation: exchanges the VC and VR orderings with a
/// single pairwise send-recv over the grid communicator.
fn vector_swap<'g, E: ComplexField>(
    grid: &'g Grid,
    axis: Axis,
    to: Dist,
    new_align: usize,
    src: DistMatRef<'g, '_, E>,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let from_axis = match axis {
        Axis::Col => info.col,
        Axis::Row => info.row,
    };
    let from = from_axis.dist;
    let p = grid.size();

    let mut dst = match axis {
        Axis::Col => make_dist(grid, to, Dist::Star, new_align, 0, info.height, info.width),
        Axis::Row => make_dist(grid, Dist::Star, to, 0, new_align, info.height, info.width),
    };
    if !grid.in_grid() {
        return dst;
    }

    let to_vc = |dist: Dist, rank: usize| match dist {
        Dist::VC => rank,
        Dist::VR => vr_to_vc(grid, rank),
        _ => unreachable!(),
    };
    let dst_shift = match axis {
        Axis::Col => dst.info.col.shift,
        Axis::Row => dst.info.row.shift,
    };
    // my data's owner in the target ordering, and the process that owns my
    // target slice in the source ordering
    let send_rank = to_vc(to, (from_axis.shift + new_align) % p);
    let recv_rank = to_vc(from, (dst_shift + from_axis.align) % p);

    let src_local = src.local();
    let (src_rows, src_cols) = (src_local.nrows(), src_local.ncols());
    let (dst_rows, dst_cols) = (dst.local.nrows(), dst.local.ncols());
    let send_size = src_rows * src_cols;
    let recv_size = dst_rows * dst_cols;
    let buffer = aux.require(send_size + recv_size);
    let (send, recv) = buffer.split_at_mut(send_size);
    for j in 0..src_cols {
        send[j * src_rows..][..src_rows].copy_from_slice(src_local.col(j));
    }
    comm::send_recv(grid.vc_comm(), send, send_rank, recv, recv_rank);
    for j in 0..dst_cols {
        dst.local
            .as_mut()
            .col_mut(j)
            .copy_from_slice(&recv[j * dst_rows..][..dst_rows]);
    }
    aux.release();
    dst
}

fn src_info<'g, E: ComplexField>(src: &DistMatRef<'g, '_, E>) -> DistInfo {
    src.info
}

/// Transposed (optionally conjugated) redistribution into a fresh owning
/// matrix. The supported layout pairs are the ones the blocked
/// factorizations spread panels with; each fuses the transpose into one
/// family-2 collective or is purely local.
pub(crate) fn transpose_redistribute<'g, E: ComplexField>(
    grid: &'g Grid,
    col_dist: Dist,
    row_dist: Dist,
    req_col: Option<usize>,
    req_row: Option<usize>,
    src: DistMatRef<'g, '_, E>,
    conj: bool,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    use Dist::{Star, MC, MR, VC, VR};
    let op = |x: E| if conj { x.conj() } else { x };
    let result = match ((col_dist, row_dist), (src.col_dist(), src.row_dist())) {
        ((MR, Star), (MC, MR)) => transpose_mr_star_from_mc_mr(grid, src, op, aux),
        ((Star, MC), (VC, Star)) => transpose_star_base_from_vector(grid, MC, src, op, aux),
        ((Star, MR), (VR, Star)) => transpose_star_base_from_vector(grid, MR, src, op, aux),
        ((MC, MR), (Star, MC)) => transpose_mc_mr_from_star_mc(grid, req_row, src, op),
        (dst, src) => unimplemented!(
            "transposed redistribution {:?} <- {:?}",
            dst,
            src
        ),
    };
    finalize(grid, result, req_col, req_row, aux)
}

/// `[MR, *] <- op([MC, MR])`: the destination's rows are the source's local
/// columns; the missing source rows are gathered over the column
/// communicator with the transpose fused into the pack.
fn transpose_mr_star_from_mc_mr<'g, E: ComplexField>(
    grid: &'g Grid,
    src: DistMatRef<'g, '_, E>,
    op: impl Fn(E) -> E,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let (height, width) = (info.height, info.width);
    let mut dst = make_dist(grid, Dist::MR, Dist::Star, info.row.align, 0, width, height);
    if !grid.in_grid() {
        return dst;
    }
    let r = grid.height();
    let comm = grid.mc_comm();
    let src_local = src.local();
    let (src_rows, src_cols) = (src_local.nrows(), src_local.ncols());

    let portion = Ord::max(src_cols * max_local_length(height, r), MIN_COLL_MSG);
    let buffer = aux.require((r + 1) * portion);
    let (send, gathered) = buffer.split_at_mut(portion);
    for i in 0..src_rows {
        for j in 0..src_cols {
            send[j + i * src_cols] = op(src_local.read(i, j));
        }
    }
    comm::all_gather(comm, send, gathered);

    for k in 0..r {
        let chunk = &gathered[k * portion..][..portion];
        let shift_k = shift(k, info.col.align, r);
        let rows_k = local_length(height, shift_k, r);
        for i in 0..rows_k {
            dst.local
                .as_mut()
                .col_mut(shift_k + i * r)
                .copy_from_slice(&chunk[i * src_cols..][..src_cols]);
        }
    }
    aux.release();
    dst
}

/// `[*, MC] <- op([VC, *])` and `[*, MR] <- op([VR, *])`: the vector rows
/// become base-distributed columns; the complementary communicator supplies
/// the interleaved sub-shifts.
fn transpose_star_base_from_vector<'g, E: ComplexField>(
    grid: &'g Grid,
    base: Dist,
    src: DistMatRef<'g, '_, E>,
    op: impl Fn(E) -> E,
    aux: &mut Scratch<E>,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let (height, width) = (info.height, info.width);
    let p = grid.size();
    let base_period = base.period(grid);
    let sub_stride = p / base_period;
    let natural = info.col.align % base_period;
    let mut dst = make_dist(grid, Dist::Star, base, 0, natural, width, height);
    if !grid.in_grid() {
        return dst;
    }
    let comm = match base {
        Dist::MC => grid.mr_comm(),
        Dist::MR => grid.mc_comm(),
        _ => unreachable!(),
    };
    let members = match base {
        Dist::MC => grid.width(),
        Dist::MR => grid.height(),
        _ => unreachable!(),
    };
    let base_rank = base.axis_rank(grid).unwrap();
    let src_local = src.local();
    let src_rows = src_local.nrows();

    let portion = Ord::max(width * max_local_length(height, p), MIN_COLL_MSG);
    let buffer = aux.require((members + 1) * portion);
    let (send, gathered) = buffer.split_at_mut(portion);
    for i in 0..src_rows {
        for j in 0..width {
            send[j + i * width] = op(src_local.read(i, j));
        }
    }
    comm::all_gather(comm, send, gathered);

    let dst_shift = dst.info.row.shift;
    for k in 0..members {
        let chunk = &gathered[k * portion..][..portion];
        let peer_vector_rank = base_rank + base_period * k;
        let shift_k = shift(peer_vector_rank, info.col.align, p);
        let len_k = local_length(height, shift_k, p);
        let offset = (shift_k - dst_shift) / base_period;
        for i in 0..len_k {
            dst.local
                .as_mut()
                .col_mut(offset + i * sub_stride)
                .copy_from_slice(&chunk[i * width..][..width]);
        }
    }
    aux.release();
    dst
}

/// `[MC, MR] <- op([*, MC])`: purely local, since the source holds every
/// row and its columns already cycle the way the destination's rows do.
fn transpose_mc_mr_from_star_mc<'g, E: ComplexField>(
    grid: &'g Grid,
    req_row: Option<usize>,
    src: DistMatRef<'g, '_, E>,
    op: impl Fn(E) -> E,
) -> DistMat<'g, E> {
    let info = src_info(&src);
    let (height, width) = (info.width, info.height);
    let col_align = info.row.align;
    let row_align = req_row.unwrap_or(0);
    let mut dst = make_dist(grid, Dist::MC, Dist::MR, col_align, row_align, height, width);
    if !grid.in_grid() {
        return dst;
    }
    let c = grid.width();
    let src_local = src.local();
    let (dst_rows, dst_cols) = (dst.local.nrows(), dst.local.ncols());
    fancy_assert!(dst.info.col.shift == info.row.shift || dst_rows == 0);
    for local_j in 0..dst_cols {
        let j = dst.info.row.shift + local_j * c;
        for local_i in 0..dst_rows {
            dst.local.write(local_i, local_j, op(src_local.read(j, local_i)));
        }
    }
    dst
}

/// Transposed redistribution into a view: sizes must match exactly and the
/// view's alignments stand.
pub(crate) fn transpose_into_view<'g, E: ComplexField>(
    view: &mut DistMatMut<'g, '_, E>,
    src: DistMatRef<'g, '_, E>,
    conj: bool,
) {
    fancy_assert!(
        view.height() == src.width() && view.width() == src.height(),
        "transposed assignment into a view requires matching global dimensions"
    );
    let mut aux = Scratch::new();
    let result = transpose_redistribute(
        view.grid,
        view.col_dist(),
        view.row_dist(),
        Some(view.col_align()),
        Some(view.row_align()),
        src,
        conj,
        &mut aux,
    );
    view.local.copy_from(result.local.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::run_local;
    use crate::{c64, Dist, DistMat, Grid};
    use reborrow::*;

    fn all_comm_variants() -> Vec<(Dist, Dist)> {
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
            (Star, Star),
        ]
    }

    fn distinct_matrix<'g>(grid: &'g Grid, h: usize, w: usize) -> DistMat<'g, f64> {
        let mut a = DistMat::<f64>::with_dims(grid, Dist::MC, Dist::MR, h, w);
        for i in 0..h {
            for j in 0..w {
                a.set(i, j, (i + h * j) as f64);
            }
        }
        a
    }

    #[test]
    fn round_trip_every_variant() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let (h, w) = (8, 7);
            let a = distinct_matrix(&grid, h, w);
            for (col_dist, row_dist) in all_comm_variants() {
                let mut b = DistMat::<f64>::new(&grid, col_dist, row_dist);
                b.assign(a.as_ref());
                assert_eq!(b.height(), h);
                assert_eq!(b.width(), w);
                let mut back = DistMat::<f64>::new(&grid, Dist::MC, Dist::MR);
                back.assign(b.as_ref());
                for i in 0..h {
                    for j in 0..w {
                        assert_eq!(
                            back.get(i, j),
                            (i + h * j) as f64,
                            "({:?},{:?}) at ({},{})",
                            col_dist,
                            row_dist,
                            i,
                            j
                        );
                    }
                }
            }
        });
    }

    #[test]
    fn pairwise_redistributions() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let (h, w) = (5, 6);
            let a = distinct_matrix(&grid, h, w);
            for (cd1, rd1) in all_comm_variants() {
                let mut b = DistMat::<f64>::new(&grid, cd1, rd1);
                b.assign(a.as_ref());
                for (cd2, rd2) in all_comm_variants() {
                    let mut c = DistMat::<f64>::new(&grid, cd2, rd2);
                    c.assign(b.as_ref());
                    for i in 0..h {
                        for j in 0..w {
                            assert_eq!(
                                c.get(i, j),
                                (i + h * j) as f64,
                                "({:?},{:?}) <- ({:?},{:?})",
                                cd2,
                                rd2,
                                cd1,
                                rd1
                            );
                        }
                    }
                }
            }
        });
    }

    #[test]
    fn chain_recovers_bits() {
        // [MC,MR] -> [VC,*] -> [VR,*] -> [*,MR] -> [MC,MR] on a 2x2 grid,
        // integer-valued, must come back bit-identical
        run_local(4, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 2);
            let n = 8;
            let mut a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, n, n);
            for i in 0..n {
                for j in 0..n {
                    a.set(i, j, (i + 8 * j) as f64);
                }
            }
            let mut b = DistMat::<f64>::new(&grid, Dist::VC, Dist::Star);
            b.assign(a.as_ref());
            let mut c = DistMat::<f64>::new(&grid, Dist::VR, Dist::Star);
            c.assign(b.as_ref());
            let mut d = DistMat::<f64>::new(&grid, Dist::Star, Dist::MR);
            d.assign(c.as_ref());
            let mut e = DistMat::<f64>::new(&grid, Dist::MC, Dist::MR);
            e.assign(d.as_ref());
            for i in 0..n {
                for j in 0..n {
                    assert_eq!(e.get(i, j), (i + 8 * j) as f64);
                }
            }
        });
    }

    #[test]
    fn constrained_destination_rotates() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let (h, w) = (6, 6);
            let a = distinct_matrix(&grid, h, w);
            let mut b = DistMat::<f64>::aligned(&grid, Dist::MC, Dist::MR, 1, 2);
            b.assign(a.as_ref());
            assert_eq!(b.col_align(), 1);
            assert_eq!(b.row_align(), 2);
            for i in 0..h {
                for j in 0..w {
                    assert_eq!(b.get(i, j), (i + h * j) as f64);
                }
            }

            // unconstrained destinations adopt the source alignment
            let mut c = DistMat::<f64>::new(&grid, Dist::MC, Dist::MR);
            c.assign(b.as_ref());
            assert_eq!(c.col_align(), 1);
            assert_eq!(c.row_align(), 2);
        });
    }

    #[test]
    fn alignment_commutes_with_assignment() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let mut a = DistMat::<f64>::aligned(&grid, Dist::MC, Dist::MR, 1, 1);
            a.resize(5, 5);
            for i in 0..5 {
                for j in 0..5 {
                    a.set(i, j, (i * 5 + j) as f64);
                }
            }
            // aligning first then assigning produces the same logical data
            // as assigning into an unconstrained destination
            let mut with_align = DistMat::<f64>::new(&grid, Dist::MC, Dist::Star);
            with_align.align_with(a.as_ref());
            with_align.assign(a.as_ref());
            let mut without = DistMat::<f64>::new(&grid, Dist::MC, Dist::Star);
            without.assign(a.as_ref());
            assert_eq!(with_align.col_align(), 1);
            for i in 0..5 {
                for j in 0..5 {
                    assert_eq!(with_align.get(i, j), without.get(i, j));
                }
            }
        });
    }

    #[test]
    fn assign_into_view() {
        run_local(4, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 2);
            let n = 6;
            let mut a = distinct_matrix(&grid, n, n);
            let mut b = DistMat::<f64>::new(&grid, Dist::VC, Dist::Star);
            b.assign(a.as_ref().submatrix(2, 1, 4, 3));
            // scale through the vector layout and write back into the block
            let local = b.local_mut();
            let mut local = local;
            for j in 0..local.ncols() {
                for value in local.rb_mut().col_mut(j) {
                    *value *= 2.0;
                }
            }
            let mut view = a.as_mut().submatrix(2, 1, 4, 3);
            view.assign(b.as_ref());
            for i in 0..n {
                for j in 0..n {
                    let base = (i + n * j) as f64;
                    let expected = if (2..6).contains(&i) && (1..4).contains(&j) {
                        2.0 * base
                    } else {
                        base
                    };
                    assert_eq!(a.get(i, j), expected, "({i},{j})");
                }
            }
        });
    }

    #[test]
    fn width_one_broadcast_path() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let h = 7;
            let a = distinct_matrix(&grid, h, 1);
            let mut b = DistMat::<f64>::new(&grid, Dist::MC, Dist::Star);
            b.assign(a.as_ref());
            for i in 0..h {
                assert_eq!(b.get(i, 0), i as f64);
            }
        });
    }

    #[test]
    fn adjoint_from_mc_mr() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let (h, w) = (5, 4);
            let mut a = DistMat::<c64>::with_dims(&grid, Dist::MC, Dist::MR, h, w);
            for i in 0..h {
                for j in 0..w {
                    a.set(i, j, c64::new(i as f64, j as f64));
                }
            }
            let mut b = DistMat::<c64>::new(&grid, Dist::MR, Dist::Star);
            b.adjoint_from(a.as_ref());
            assert_eq!(b.height(), w);
            assert_eq!(b.width(), h);
            for i in 0..h {
                for j in 0..w {
                    assert_eq!(b.get(j, i), c64::new(i as f64, -(j as f64)));
                }
            }
        });
    }

    #[test]
    fn transpose_from_vector_layouts() {
        run_local(6, |comm| {
            let grid = Grid::new(Box::new(comm), 2, 3);
            let (h, w) = (7, 3);
            let mut a = DistMat::<c64>::with_dims(&grid, Dist::MC, Dist::MR, h, w);
            for i in 0..h {
                for j in 0..w {
                    a.set(i, j, c64::new((i * w + j) as f64, 1.0));
                }
            }
            let mut a_vc = DistMat::<c64>::new(&grid, Dist::VC, Dist::Star);
            a_vc.assign(a.as_ref());
            let mut a_vr = DistMat::<c64>::new(&grid, Dist::VR, Dist::Star);
            a_vr.assign(a_vc.as_ref());

            let mut t = DistMat::<c64>::new(&grid, Dist::Star, Dist::MC);
            t.transpose_from(a_vc.as_ref());
            let mut adj = DistMat::<c64>::new(&grid, Dist::Star, Dist::MR);
            adj.adjoint_from(a_vr.as_ref());
            for i in 0..h {
                for j in 0..w {
                    let v = c64::new((i * w + j) as f64, 1.0);
                    assert_eq!(t.get(j, i), v);
                    assert_eq!(adj.get(j, i), v.conj());
                }
            }

            // and back into an [MC, MR] destination through the local path
            let mut back = DistMat::<c64>::with_dims(&grid, Dist::MC, Dist::MR, h, w);
            back.as_mut().transpose_from(t.as_ref());
            for i in 0..h {
                for j in 0..w {
                    assert_eq!(back.get(i, j), c64::new((i * w + j) as f64, 1.0));
                }
            }
        });
    }

    #[test]
    #[should_panic]
    fn view_assignment_size_mismatch_is_fatal() {
        run_local(1, |comm| {
            let grid = Grid::new(Box::new(comm), 1, 1);
            let a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, 3, 3);
            let mut b = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, 4, 4);
            b.as_mut().assign(a.as_ref());
        });
    }

    #[test]
    #[should_panic(expected = "diagonal distribution")]
    fn md_redistribution_unimplemented() {
        run_local(1, |comm| {
            let grid = Grid::new(Box::new(comm), 1, 1);
            let a = DistMat::<f64>::with_dims(&grid, Dist::MC, Dist::MR, 3, 3);
            let mut b = DistMat::<f64>::new(&grid, Dist::MD, Dist::Star);
            b.assign(a.as_ref());
        });
    }

    #[test]
    fn single_process_grid_is_identity() {
        run_local(1, |comm| {
            let grid = Grid::new(Box::new(comm), 1, 1);
            let a = distinct_matrix(&grid, 4, 4);
            for (cd, rd) in all_comm_variants() {
                let mut b = DistMat::<f64>::new(&grid, cd, rd);
                b.assign(a.as_ref());
                assert_eq!(b.local_nrows(), 4);
                assert_eq!(b.local_ncols(), 4);
                for i in 0..4 {
                    for j in 0..4 {
                        assert_eq!(b.local().read(i, j), (i + 4 * j) as f64);
                    }
                }
            }
        });
    }
}
