//! Messaging contract consumed by the distribution layer, with two
//! backends.
//!
//! The [`Communicator`] trait carries exactly the primitive set the engine
//! needs: blocking broadcast, all-gather, all-reduce, reduce, pairwise
//! send-recv, barrier, and communicator splitting. Buffers are raw bytes so
//! the trait stays object-safe; the typed wrappers in this module
//! ([`broadcast`], [`all_gather`], ...) do the casting for any [`Pod`]
//! element, and reductions are expressed as a plain function over byte
//! chunks (see [`sum_op`]) in the manner of MPI user operations.
//!
//! [`LocalComm`] is the in-process backend: every rank is an OS thread, and
//! each directed pair of ranks has a FIFO mailbox. Since all ranks issue
//! collectives on a shared communicator in the same program order, FIFO
//! delivery per pair is exactly MPI's non-overtaking guarantee, and the
//! matched-ordering contract for collectives follows. The test suites spin
//! up universes with [`run_local`].
//!
//! The `mpi` cargo feature adds [`mpi_backend::MpiComm`], a thin adapter
//! over `rsmpi` for running on a real cluster.

use bytemuck::Pod;
use std::rc::Rc;
use std::sync::mpsc;

use crate::ComplexField;

/// Floor on the element count of one participant's portion in a collective,
/// keeping collectives valid for empty tiles.
pub const MIN_COLL_MSG: usize = 4;

/// Element-wise reduction over two byte buffers of equal length:
/// `acc <- acc (op) src`.
pub type ReduceOp = fn(acc: &mut [u8], src: &[u8]);

/// Blocking collective communication over an ordered group of processes.
///
/// Every method is a collective (or, for [`Communicator::send_recv`], a
/// matched pair) and must be called by all members of the communicator in
/// the same order. A failure of the underlying transport is fatal: the
/// backend panics and takes the job down rather than returning control with
/// a half-completed collective.
pub trait Communicator {
    /// Rank of the calling process within this communicator.
    fn rank(&self) -> usize;
    /// Number of processes in this communicator.
    fn size(&self) -> usize;
    /// Blocks until every member has entered the barrier.
    fn barrier(&self);
    /// Replicates `buf` from `root` to every member.
    fn broadcast(&self, buf: &mut [u8], root: usize);
    /// Concatenates every member's `send` into `recv`, ordered by rank.
    /// `recv.len()` must equal `size() * send.len()`.
    fn all_gather(&self, send: &[u8], recv: &mut [u8]);
    /// Reduces `send` across all members with `op` and replicates the result
    /// into `recv` everywhere.
    fn all_reduce(&self, send: &[u8], recv: &mut [u8], op: ReduceOp);
    /// Reduces `send` across all members with `op` into `recv` on `root`.
    /// `recv` is ignored on other ranks.
    fn reduce(&self, send: &[u8], recv: &mut [u8], op: ReduceOp, root: usize);
    /// Sends `send` to `dst` while receiving into `recv` from `src`.
    fn send_recv(&self, send: &[u8], dst: usize, recv: &mut [u8], src: usize);
    /// Partitions the communicator into sub-communicators by `color`,
    /// ordering each group by `(key, rank)`. Members passing `None` opt out
    /// and receive `None`.
    fn split(&self, color: Option<usize>, key: usize) -> Option<Box<dyn Communicator>>;
    /// Returns an independent handle over the same group.
    fn duplicate(&self) -> Box<dyn Communicator>;
}

/// Summation reduction for a [`ComplexField`] element type, chunked through
/// unaligned reads since message buffers carry no alignment guarantee.
pub fn sum_op<E: ComplexField>() -> ReduceOp {
    fn op<E: ComplexField>(acc: &mut [u8], src: &[u8]) {
        let width = core::mem::size_of::<E>();
        debug_assert!(acc.len() == src.len());
        debug_assert!(acc.len() % width == 0);
        let count = acc.len() / width;
        for k in 0..count {
            let range = k * width..(k + 1) * width;
            let a: E = bytemuck::pod_read_unaligned(&acc[range.clone()]);
            let b: E = bytemuck::pod_read_unaligned(&src[range.clone()]);
            let sum = a + b;
            acc[range].copy_from_slice(bytemuck::bytes_of(&sum));
        }
    }
    op::<E>
}

/// Typed [`Communicator::broadcast`].
pub fn broadcast<T: Pod>(comm: &dyn Communicator, buf: &mut [T], root: usize) {
    comm.broadcast(bytemuck::cast_slice_mut(buf), root);
}

/// Typed [`Communicator::all_gather`].
pub fn all_gather<T: Pod>(comm: &dyn Communicator, send: &[T], recv: &mut [T]) {
    comm.all_gather(bytemuck::cast_slice(send), bytemuck::cast_slice_mut(recv));
}

/// Typed summing [`Communicator::all_reduce`].
pub fn all_reduce_sum<E: ComplexField>(comm: &dyn Communicator, send: &[E], recv: &mut [E]) {
    comm.all_reduce(
        bytemuck::cast_slice(send),
        bytemuck::cast_slice_mut(recv),
        sum_op::<E>(),
    );
}

/// Typed summing [`Communicator::reduce`].
pub fn reduce_sum<E: ComplexField>(
    comm: &dyn Communicator,
    send: &[E],
    recv: &mut [E],
    root: usize,
) {
    comm.reduce(
        bytemuck::cast_slice(send),
        bytemuck::cast_slice_mut(recv),
        sum_op::<E>(),
        root,
    );
}

/// Typed [`Communicator::send_recv`].
pub fn send_recv<T: Pod>(
    comm: &dyn Communicator,
    send: &[T],
    dst: usize,
    recv: &mut [T],
    src: usize,
) {
    comm.send_recv(
        bytemuck::cast_slice(send),
        dst,
        bytemuck::cast_slice_mut(recv),
        src,
    );
}

type Msg = Vec<u8>;

/// One process's mailboxes within a [`LocalComm`] universe. Produced by
/// [`universe`] on the launching thread and turned into a world
/// communicator with [`LocalComm::from_endpoint`] on the rank's own thread.
pub struct LocalEndpoint {
    global_rank: usize,
    universe_size: usize,
    senders: Vec<mpsc::Sender<Msg>>,
    receivers: Vec<mpsc::Receiver<Msg>>,
}

/// Creates the mailbox endpoints of an `n`-rank in-process universe.
pub fn universe(n: usize) -> Vec<LocalEndpoint> {
    let mut senders: Vec<Vec<Option<mpsc::Sender<Msg>>>> =
        (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
    let mut receivers: Vec<Vec<Option<mpsc::Receiver<Msg>>>> =
        (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
    for src in 0..n {
        for dst in 0..n {
            let (tx, rx) = mpsc::channel();
            senders[src][dst] = Some(tx);
            receivers[dst][src] = Some(rx);
        }
    }
    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(global_rank, (tx_row, rx_row))| LocalEndpoint {
            global_rank,
            universe_size: n,
            senders: tx_row.into_iter().map(Option::unwrap).collect(),
            receivers: rx_row.into_iter().map(Option::unwrap).collect(),
        })
        .collect()
}

/// In-process communicator backend mapping ranks to threads.
///
/// Handles derived from one endpoint (via [`Communicator::split`] or
/// [`Communicator::duplicate`]) share the endpoint's mailboxes and must stay
/// on the endpoint's thread.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    members: Rc<Vec<usize>>,
    endpoint: Rc<LocalEndpoint>,
}

impl LocalComm {
    /// Wraps an endpoint into the world communicator of its universe.
    pub fn from_endpoint(endpoint: LocalEndpoint) -> Self {
        let n = endpoint.universe_size;
        Self {
            rank: endpoint.global_rank,
            members: Rc::new((0..n).collect()),
            endpoint: Rc::new(endpoint),
        }
    }

    fn send_to(&self, member: usize, bytes: Msg) {
        let global = self.members[member];
        self.endpoint.senders[global]
            .send(bytes)
            .expect("communication failure: peer rank terminated");
    }

    fn recv_from(&self, member: usize) -> Msg {
        let global = self.members[member];
        self.endpoint.receivers[global]
            .recv()
            .expect("communication failure: peer rank terminated")
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn barrier(&self) {
        let send = [0u8; 1];
        let mut recv = vec![0u8; self.size()];
        self.all_gather(&send, &mut recv);
    }

    fn broadcast(&self, buf: &mut [u8], root: usize) {
        assert!(root < self.size());
        if self.rank == root {
            for k in 0..self.size() {
                if k != root {
                    self.send_to(k, buf.to_vec());
                }
            }
        } else {
            let msg = self.recv_from(root);
            assert!(msg.len() == buf.len(), "mismatched broadcast lengths");
            buf.copy_from_slice(&msg);
        }
    }

    fn all_gather(&self, send: &[u8], recv: &mut [u8]) {
        let portion = send.len();
        assert!(
            recv.len() == portion * self.size(),
            "mismatched all-gather lengths"
        );
        for k in 0..self.size() {
            if k != self.rank {
                self.send_to(k, send.to_vec());
            }
        }
        recv[self.rank * portion..][..portion].copy_from_slice(send);
        for k in 0..self.size() {
            if k != self.rank {
                let msg = self.recv_from(k);
                assert!(msg.len() == portion, "mismatched all-gather lengths");
                recv[k * portion..][..portion].copy_from_slice(&msg);
            }
        }
    }

    fn all_reduce(&self, send: &[u8], recv: &mut [u8], op: ReduceOp) {
        let len = send.len();
        assert!(recv.len() == len, "mismatched all-reduce lengths");
        let mut gathered = vec![0u8; len * self.size()];
        self.all_gather(send, &mut gathered);
        recv.copy_from_slice(&gathered[..len]);
        for k in 1..self.size() {
            op(recv, &gathered[k * len..][..len]);
        }
    }

    fn reduce(&self, send: &[u8], recv: &mut [u8], op: ReduceOp, root: usize) {
        assert!(root < self.size());
        if self.rank != root {
            self.send_to(root, send.to_vec());
            return;
        }
        let len = send.len();
        assert!(recv.len() == len, "mismatched reduce lengths");
        recv.fill(0);
        for k in 0..self.size() {
            if k == root {
                if k == 0 {
                    recv.copy_from_slice(send);
                } else {
                    op(recv, send);
                }
            } else {
                let msg = self.recv_from(k);
                assert!(msg.len() == len, "mismatched reduce lengths");
                if k == 0 {
                    recv.copy_from_slice(&msg);
                } else {
                    op(recv, &msg);
                }
            }
        }
    }

    fn send_recv(&self, send: &[u8], dst: usize, recv: &mut [u8], src: usize) {
        assert!(dst < self.size());
        assert!(src < self.size());
        self.send_to(dst, send.to_vec());
        let msg = self.recv_from(src);
        assert!(msg.len() == recv.len(), "mismatched send-recv lengths");
        recv.copy_from_slice(&msg);
    }

    fn split(&self, color: Option<usize>, key: usize) -> Option<Box<dyn Communicator>> {
        let mut send = [0u8; 24];
        send[0..8].copy_from_slice(&(color.is_some() as u64).to_le_bytes());
        send[8..16].copy_from_slice(&(color.unwrap_or(0) as u64).to_le_bytes());
        send[16..24].copy_from_slice(&(key as u64).to_le_bytes());
        let mut gathered = vec![0u8; 24 * self.size()];
        self.all_gather(&send, &mut gathered);

        let color = color?;
        let mut group = Vec::new();
        for member in 0..self.size() {
            let record = &gathered[24 * member..][..24];
            let has_color = u64::from_le_bytes(record[0..8].try_into().unwrap()) != 0;
            let member_color = u64::from_le_bytes(record[8..16].try_into().unwrap()) as usize;
            let member_key = u64::from_le_bytes(record[16..24].try_into().unwrap()) as usize;
            if has_color && member_color == color {
                group.push((member_key, member));
            }
        }
        group.sort_unstable();

        let members: Vec<usize> = group.iter().map(|&(_, member)| self.members[member]).collect();
        let rank = group
            .iter()
            .position(|&(_, member)| member == self.rank)
            .expect("calling rank missing from its own split group");
        Some(Box::new(LocalComm {
            rank,
            members: Rc::new(members),
            endpoint: Rc::clone(&self.endpoint),
        }))
    }

    fn duplicate(&self) -> Box<dyn Communicator> {
        Box::new(self.clone())
    }
}

/// Runs `f` once per rank of a fresh `n`-rank in-process universe, each on
/// its own thread. Panics from any rank propagate to the caller.
pub fn run_local<F>(n: usize, f: F)
where
    F: Fn(LocalComm) + Send + Sync,
{
    let endpoints = universe(n);
    std::thread::scope(|scope| {
        for endpoint in endpoints {
            let f = &f;
            scope.spawn(move || f(LocalComm::from_endpoint(endpoint)));
        }
    });
}

#[cfg(feature = "mpi")]
pub mod mpi_backend {
    //! `rsmpi` adapter implementing the [`Communicator`](super::Communicator)
    //! contract on a real MPI installation.

    use super::{Communicator, ReduceOp};
    use mpi::topology::{Color, Communicator as _, UserCommunicator};
    use mpi::traits::*;

    pub struct MpiComm {
        comm: UserCommunicator,
    }

    impl MpiComm {
        pub fn new(comm: UserCommunicator) -> Self {
            Self { comm }
        }

        /// Duplicates the world communicator of an initialized MPI
        /// environment.
        pub fn world(universe: &mpi::environment::Universe) -> Self {
            Self {
                comm: universe.world().duplicate(),
            }
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.comm.rank() as usize
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }

        fn barrier(&self) {
            self.comm.barrier();
        }

        fn broadcast(&self, buf: &mut [u8], root: usize) {
            self.comm.process_at_rank(root as i32).broadcast_into(buf);
        }

        fn all_gather(&self, send: &[u8], recv: &mut [u8]) {
            self.comm.all_gather_into(send, recv);
        }

        fn all_reduce(&self, send: &[u8], recv: &mut [u8], op: ReduceOp) {
            // gather-and-fold keeps the reduction identical on every rank
            // without registering an MPI user operation
            let mut gathered = vec![0u8; send.len() * self.size()];
            self.comm.all_gather_into(send, &mut gathered[..]);
            recv.copy_from_slice(&gathered[..send.len()]);
            for k in 1..self.size() {
                op(recv, &gathered[k * send.len()..][..send.len()]);
            }
        }

        fn reduce(&self, send: &[u8], recv: &mut [u8], op: ReduceOp, root: usize) {
            let root_process = self.comm.process_at_rank(root as i32);
            if self.rank() == root {
                let mut gathered = vec![0u8; send.len() * self.size()];
                root_process.gather_into_root(send, &mut gathered[..]);
                recv.copy_from_slice(&gathered[..send.len()]);
                for k in 1..self.size() {
                    op(recv, &gathered[k * send.len()..][..send.len()]);
                }
            } else {
                root_process.gather_into(send);
            }
        }

        fn send_recv(&self, send: &[u8], dst: usize, recv: &mut [u8], src: usize) {
            mpi::point_to_point::send_receive_into(
                send,
                &self.comm.process_at_rank(dst as i32),
                recv,
                &self.comm.process_at_rank(src as i32),
            );
        }

        fn split(&self, color: Option<usize>, key: usize) -> Option<Box<dyn Communicator>> {
            let color = match color {
                Some(c) => Color::with_value(c as i32),
                None => Color::undefined(),
            };
            self.comm
                .split_by_color_with_key(color, key as i32)
                .map(|comm| Box::new(MpiComm { comm }) as Box<dyn Communicator>)
        }

        fn duplicate(&self) -> Box<dyn Communicator> {
            Box::new(MpiComm {
                comm: self.comm.duplicate(),
            })
        }
    }
}
