//! Rank-to-rank transport seam.
//!
//! The core never talks to MPI directly; every collective goes through the
//! [`Transport`] trait. An exchange is always two rounds, mirroring how the
//! engine drives `MPI_Alltoall` plus paired nonblocking send/recv:
//!
//! 1. [`Transport::exchange_counts`] -- each rank tells every peer how many
//!    payload bytes to expect, so receivers can allocate.
//! 2. [`Transport::exchange_buffers`] -- the payload exchange, with the
//!    receive sizes agreed in round one.
//!
//! [`all_to_all`] packages the two rounds. Blocking inside a transport call
//! is the only suspension point in the library; ranks that arrive early spin
//! on completion and no user code runs during the wait.
//!
//! [`LocalExchange`] is the in-process implementation used by tests, demos
//! and single-host staging: every "rank" is a thread sharing a mailbox
//! table. An MPI-backed adapter implements the same trait out of tree.

use crate::error::{ErrorKind, Result};
use crate::ids::RankNo;
use crate::udm_error;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// Collective exchange between the ranks of one communicator.
///
/// Every rank must call the same sequence of transport operations in the
/// same order; this is a contract, not something the trait can enforce.
pub trait Transport: Send + Sync {
    /// This rank's number within the communicator.
    fn rank(&self) -> RankNo;

    /// Number of ranks in the communicator.
    fn world_size(&self) -> u32;

    /// All-to-all of one `u64` per peer. `counts[p]` goes to rank `p`;
    /// the result holds the value each peer sent to this rank.
    fn exchange_counts(&self, counts: &[u64]) -> Result<Vec<u64>>;

    /// All-to-all of byte buffers. `sends[p]` goes to rank `p`;
    /// `recv_sizes[p]` is the byte count rank `p` announced in the count
    /// round. Returns the received buffer per peer.
    fn exchange_buffers(&self, sends: Vec<Vec<u8>>, recv_sizes: &[u64]) -> Result<Vec<Vec<u8>>>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()>;
}

/// Two-round all-to-all: size exchange, then payload exchange.
pub fn all_to_all(transport: &dyn Transport, sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    let counts: Vec<u64> = sends.iter().map(|b| b.len() as u64).collect();
    let recv_sizes = transport.exchange_counts(&counts)?;
    transport.exchange_buffers(sends, &recv_sizes)
}

// |-------------------------|
// | In-process ranks (test) |
// |-------------------------|

struct BarrierState {
    epoch: u64,
    arrived: u32,
}

struct Shared {
    world: u32,
    mail: Mutex<HashMap<(u32, u32, u64), Vec<u8>>>,
    mail_cv: Condvar,
    barrier: Mutex<BarrierState>,
    barrier_cv: Condvar,
}

/// In-process [`Transport`]: one instance per simulated rank, all sharing a
/// mailbox table keyed by `(source, destination, sequence)`.
///
/// Sends never block; receives wait on a condvar until the matching message
/// arrives. Because every rank performs collectives in the same order, the
/// per-pair sequence numbers on both sides stay aligned.
///
/// ```
/// use udmesh::transport::{LocalExchange, Transport, all_to_all};
///
/// let ranks = LocalExchange::world(2);
/// std::thread::scope(|scope| {
///     for t in ranks {
///         scope.spawn(move || {
///             let me = t.rank();
///             let sends = vec![vec![me as u8]; 2];
///             let got = all_to_all(&t, sends).unwrap();
///             assert_eq!(got[1 - me as usize], vec![(1 - me) as u8]);
///         });
///     }
/// });
/// ```
pub struct LocalExchange {
    shared: Arc<Shared>,
    rank: RankNo,
    send_seq: Mutex<Vec<u64>>,
    recv_seq: Mutex<Vec<u64>>,
}

impl LocalExchange {
    /// Create a world of `n` connected ranks, returned in rank order.
    pub fn world(n: u32) -> Vec<LocalExchange> {
        assert!(n > 0, "a communicator needs at least one rank");
        let shared = Arc::new(Shared {
            world: n,
            mail: Mutex::new(HashMap::new()),
            mail_cv: Condvar::new(),
            barrier: Mutex::new(BarrierState {
                epoch: 0,
                arrived: 0,
            }),
            barrier_cv: Condvar::new(),
        });
        (0..n)
            .map(|rank| LocalExchange {
                shared: Arc::clone(&shared),
                rank,
                send_seq: Mutex::new(vec![0; n as usize]),
                recv_seq: Mutex::new(vec![0; n as usize]),
            })
            .collect()
    }

    fn post(&self, dst: RankNo, payload: Vec<u8>) {
        let seq = {
            let mut seqs = self.send_seq.lock().unwrap();
            let s = seqs[dst as usize];
            seqs[dst as usize] += 1;
            s
        };
        let mut mail = self.shared.mail.lock().unwrap();
        mail.insert((self.rank, dst, seq), payload);
        self.shared.mail_cv.notify_all();
    }

    fn collect(&self, src: RankNo) -> Vec<u8> {
        let seq = {
            let mut seqs = self.recv_seq.lock().unwrap();
            let s = seqs[src as usize];
            seqs[src as usize] += 1;
            s
        };
        let mut mail = self.shared.mail.lock().unwrap();
        loop {
            if let Some(buf) = mail.remove(&(src, self.rank, seq)) {
                return buf;
            }
            mail = self.shared.mail_cv.wait(mail).unwrap();
        }
    }

    fn check_fan(&self, len: usize, what: &str) -> Result<()> {
        if len != self.shared.world as usize {
            return Err(udm_error!(
                ErrorKind::TransportFailed,
                "{what} holds {len} entries for a {}-rank communicator",
                self.shared.world
            ));
        }
        Ok(())
    }
}

impl Transport for LocalExchange {
    fn rank(&self) -> RankNo {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.shared.world
    }

    fn exchange_counts(&self, counts: &[u64]) -> Result<Vec<u64>> {
        self.check_fan(counts.len(), "count list")?;
        for dst in 0..self.shared.world {
            if dst != self.rank {
                self.post(dst, counts[dst as usize].to_le_bytes().to_vec());
            }
        }
        let mut out = vec![0u64; self.shared.world as usize];
        for src in 0..self.shared.world {
            if src == self.rank {
                out[src as usize] = counts[src as usize];
            } else {
                let raw = self.collect(src);
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                    udm_error!(
                        ErrorKind::TransportFailed,
                        "count message from rank {src} has {} bytes",
                        raw.len()
                    )
                })?;
                out[src as usize] = u64::from_le_bytes(bytes);
            }
        }
        Ok(out)
    }

    fn exchange_buffers(&self, sends: Vec<Vec<u8>>, recv_sizes: &[u64]) -> Result<Vec<Vec<u8>>> {
        self.check_fan(sends.len(), "send list")?;
        self.check_fan(recv_sizes.len(), "receive-size list")?;
        let mut out: Vec<Vec<u8>> = vec![Vec::new(); self.shared.world as usize];
        for (dst, buf) in sends.into_iter().enumerate() {
            if dst as u32 == self.rank {
                out[dst] = buf;
            } else {
                self.post(dst as u32, buf);
            }
        }
        for src in 0..self.shared.world {
            if src != self.rank {
                out[src as usize] = self.collect(src);
            }
            let got = out[src as usize].len() as u64;
            if got != recv_sizes[src as usize] {
                return Err(udm_error!(
                    ErrorKind::TransportFailed,
                    "rank {src} announced {} bytes but sent {got}",
                    recv_sizes[src as usize]
                ));
            }
        }
        Ok(out)
    }

    fn barrier(&self) -> Result<()> {
        let mut st = self.shared.barrier.lock().unwrap();
        let epoch = st.epoch;
        st.arrived += 1;
        if st.arrived == self.shared.world {
            st.arrived = 0;
            st.epoch += 1;
            self.shared.barrier_cv.notify_all();
            return Ok(());
        }
        while st.epoch == epoch {
            st = self.shared.barrier_cv.wait(st).unwrap();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_world<T, F>(n: u32, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(LocalExchange) -> T + Sync,
    {
        let ranks = LocalExchange::world(n);
        let mut out: Vec<Option<T>> = (0..n).map(|_| None).collect();
        std::thread::scope(|scope| {
            for (slot, t) in out.iter_mut().zip(ranks) {
                let f = &f;
                scope.spawn(move || {
                    *slot = Some(f(t));
                });
            }
        });
        out.into_iter().map(|v| v.unwrap()).collect()
    }

    #[test]
    fn counts_roundtrip() {
        let results = run_world(3, |t| {
            let me = t.rank() as u64;
            let counts: Vec<u64> = (0..3).map(|p| me * 10 + p).collect();
            t.exchange_counts(&counts).unwrap()
        });
        for (me, got) in results.iter().enumerate() {
            for (src, &v) in got.iter().enumerate() {
                assert_eq!(v, src as u64 * 10 + me as u64);
            }
        }
    }

    #[test]
    fn buffers_roundtrip() {
        let results = run_world(3, |t| {
            let me = t.rank();
            let sends: Vec<Vec<u8>> = (0..3u8)
                .map(|p| vec![me as u8, p, me as u8 + p])
                .collect();
            all_to_all(&t, sends).unwrap()
        });
        for (me, got) in results.iter().enumerate() {
            for (src, buf) in got.iter().enumerate() {
                assert_eq!(buf, &vec![src as u8, me as u8, src as u8 + me as u8]);
            }
        }
    }

    #[test]
    fn repeated_collectives_stay_aligned() {
        let results = run_world(2, |t| {
            let mut sums = Vec::new();
            for round in 0..5u64 {
                let got = t.exchange_counts(&[round, round * 2]).unwrap();
                sums.push(got.iter().sum::<u64>());
                t.barrier().unwrap();
            }
            sums
        });
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn size_lie_is_detected() {
        let results = run_world(2, |t| {
            let me = t.rank() as usize;
            let sends = vec![vec![0u8; 4], vec![0u8; 4]];
            // both ranks claim the peer will send 4 bytes, then rank 1 sends 2
            let sizes = [4u64, 4];
            let sends = if me == 1 {
                vec![vec![0u8; 2], vec![0u8; 4]]
            } else {
                sends
            };
            t.exchange_buffers(sends, &sizes)
        });
        assert!(results.iter().any(|r| r.is_err()));
    }
}
