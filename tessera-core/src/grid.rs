//! Two-dimensional process grid.
//!
//! A grid arranges the first `height * width` ranks of a parent
//! communicator into an `r × c` rectangle. The two grid axes are named MC
//! (the rows of the grid) and MR (the columns), and two one-dimensional
//! orderings are derived from them: VC enumerates the processes
//! column-major, VR row-major. Each ordering gets its own cached
//! communicator, created once at construction.
//!
//! Ranks of the parent communicator beyond `height * width` are *viewing*
//! ranks: they are not in the grid, hold no matrix data, and participate
//! only in collectives rooted on the viewing communicator (such as element
//! [`get`](crate::dist::DistMatRef::get)).

use crate::comm::Communicator;
use assert2::assert as fancy_assert;

pub struct Grid {
    height: usize,
    width: usize,
    mc_rank: usize,
    mr_rank: usize,
    vc_rank: usize,
    vr_rank: usize,
    in_grid: bool,
    vc_to_viewing: Vec<usize>,
    vr_to_viewing: Vec<usize>,
    mc_comm: Option<Box<dyn Communicator>>,
    mr_comm: Option<Box<dyn Communicator>>,
    vc_comm: Option<Box<dyn Communicator>>,
    vr_comm: Option<Box<dyn Communicator>>,
    grid_comm: Option<Box<dyn Communicator>>,
    viewing_comm: Box<dyn Communicator>,
}

impl Grid {
    /// Builds an `height × width` grid over `parent`.
    ///
    /// This is a collective over `parent`. The first `height * width` parent
    /// ranks join the grid in column-major (VC) order; any remaining ranks
    /// become viewing ranks with [`Grid::in_grid`] false.
    ///
    /// # Panics
    ///
    /// Panics if the grid does not fit in the parent communicator.
    pub fn new(parent: Box<dyn Communicator>, height: usize, width: usize) -> Self {
        fancy_assert!(height > 0);
        fancy_assert!(width > 0);
        let size = height * width;
        fancy_assert!(
            size <= parent.size(),
            "grid does not fit in the parent communicator"
        );

        let viewing_rank = parent.rank();
        let in_grid = viewing_rank < size;

        let (mc_rank, mr_rank, vc_rank, vr_rank) = if in_grid {
            let vc_rank = viewing_rank;
            let mc_rank = vc_rank % height;
            let mr_rank = vc_rank / height;
            let vr_rank = mr_rank + width * mc_rank;
            (mc_rank, mr_rank, vc_rank, vr_rank)
        } else {
            (0, 0, 0, 0)
        };

        let member = |color: usize, key: usize| -> (Option<usize>, usize) {
            if in_grid {
                (Some(color), key)
            } else {
                (None, 0)
            }
        };

        // the column communicator enumerates mc ranks, the row communicator
        // mr ranks, so each split key is the rank the axis cycles through
        let (color, key) = member(mr_rank, mc_rank);
        let mc_comm = parent.split(color, key);
        let (color, key) = member(mc_rank, mr_rank);
        let mr_comm = parent.split(color, key);
        let (color, key) = member(0, vc_rank);
        let vc_comm = parent.split(color, key);
        let (color, key) = member(0, vr_rank);
        let vr_comm = parent.split(color, key);
        let (color, key) = member(0, vc_rank);
        let grid_comm = parent.split(color, key);

        let vc_to_viewing: Vec<usize> = (0..size).collect();
        let vr_to_viewing: Vec<usize> = (0..size)
            .map(|vr| (vr / width) + height * (vr % width))
            .collect();

        Self {
            height,
            width,
            mc_rank,
            mr_rank,
            vc_rank,
            vr_rank,
            in_grid,
            vc_to_viewing,
            vr_to_viewing,
            mc_comm,
            mr_comm,
            vc_comm,
            vr_comm,
            grid_comm,
            viewing_comm: parent,
        }
    }

    /// Number of process rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of process columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of processes in the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.height * self.width
    }

    /// This process's row within the grid.
    #[inline]
    pub fn mc_rank(&self) -> usize {
        self.mc_rank
    }

    /// This process's column within the grid.
    #[inline]
    pub fn mr_rank(&self) -> usize {
        self.mr_rank
    }

    /// This process's rank in the column-major ordering.
    #[inline]
    pub fn vc_rank(&self) -> usize {
        self.vc_rank
    }

    /// This process's rank in the row-major ordering.
    #[inline]
    pub fn vr_rank(&self) -> usize {
        self.vr_rank
    }

    /// Whether this process holds grid data, as opposed to being a viewing
    /// rank.
    #[inline]
    pub fn in_grid(&self) -> bool {
        self.in_grid
    }

    /// Viewing rank of the process with the given VC rank.
    #[inline]
    pub fn vc_to_viewing(&self, vc_rank: usize) -> usize {
        self.vc_to_viewing[vc_rank]
    }

    /// Viewing rank of the process with the given VR rank.
    #[inline]
    pub fn vr_to_viewing(&self, vr_rank: usize) -> usize {
        self.vr_to_viewing[vr_rank]
    }

    /// Column communicator: the processes of this grid column, ranked by
    /// `mc_rank`.
    #[track_caller]
    #[inline]
    pub fn mc_comm(&self) -> &dyn Communicator {
        self.mc_comm.as_deref().expect("not in grid")
    }

    /// Row communicator: the processes of this grid row, ranked by
    /// `mr_rank`.
    #[track_caller]
    #[inline]
    pub fn mr_comm(&self) -> &dyn Communicator {
        self.mr_comm.as_deref().expect("not in grid")
    }

    /// All grid processes in column-major order.
    #[track_caller]
    #[inline]
    pub fn vc_comm(&self) -> &dyn Communicator {
        self.vc_comm.as_deref().expect("not in grid")
    }

    /// All grid processes in row-major order.
    #[track_caller]
    #[inline]
    pub fn vr_comm(&self) -> &dyn Communicator {
        self.vr_comm.as_deref().expect("not in grid")
    }

    /// All grid processes, in VC order.
    #[track_caller]
    #[inline]
    pub fn grid_comm(&self) -> &dyn Communicator {
        self.grid_comm.as_deref().expect("not in grid")
    }

    /// The parent communicator, including viewing ranks.
    #[inline]
    pub fn viewing_comm(&self) -> &dyn Communicator {
        self.viewing_comm.as_ref()
    }
}
