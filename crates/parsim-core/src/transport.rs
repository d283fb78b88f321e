//! # parsim-core::transport
//!
//! The seam between the sync layer and whatever moves bytes between ranks.
//! The core specifies what is exchanged and when; an MPI binding (or any
//! other fabric) implements this trait. `LocalTransport` is the in-process
//! implementation used by tests and single-host multi-rank runs.
//!
//! Collective discipline: every rank must call the same sequence of
//! collective operations. `exchange` always delivers one block to every
//! peer (empty if the caller had nothing queued) and returns exactly one
//! block from every peer, in ascending source-rank order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parsim_types::errors::SimError;
use std::sync::Arc;
use std::time::Duration;

pub trait Transport: Send + Sync {
    fn my_rank(&self) -> u32;
    fn num_ranks(&self) -> u32;

    /// Pairwise exchange. `outbound` holds at most one block per peer rank;
    /// peers without an entry receive an empty block. Returns the block
    /// received from each peer, ascending by source rank.
    fn exchange(&self, outbound: Vec<(u32, Bytes)>) -> Result<Vec<(u32, Bytes)>, SimError>;

    /// Or-reduction of the three signal flags across all ranks.
    fn allreduce_or(&self, flags: [u32; 3]) -> Result<[u32; 3], SimError>;

    /// Sum-reduction across all ranks (primary-component counts, untimed
    /// message counts).
    fn allreduce_sum(&self, value: u64) -> Result<u64, SimError>;

    /// Max-reduction across all ranks (end-of-simulation time agreement).
    fn allreduce_max(&self, value: u64) -> Result<u64, SimError>;
}

/// A single-rank transport: all collectives are identities.
pub struct SoloTransport;

impl Transport for SoloTransport {
    fn my_rank(&self) -> u32 {
        0
    }

    fn num_ranks(&self) -> u32 {
        1
    }

    fn exchange(&self, _outbound: Vec<(u32, Bytes)>) -> Result<Vec<(u32, Bytes)>, SimError> {
        Ok(Vec::new())
    }

    fn allreduce_or(&self, flags: [u32; 3]) -> Result<[u32; 3], SimError> {
        Ok(flags)
    }

    fn allreduce_sum(&self, value: u64) -> Result<u64, SimError> {
        Ok(value)
    }

    fn allreduce_max(&self, value: u64) -> Result<u64, SimError> {
        Ok(value)
    }
}

/// In-process transport: each "rank" is a thread group in one process and
/// blocks move over unbounded channels. A peer that fails to participate in
/// a collective within the timeout is a fatal condition.
pub struct LocalTransport {
    rank: u32,
    ranks: u32,
    /// Senders to every peer, indexed by peer rank (self slot is `None`).
    tx: Vec<Option<Sender<Bytes>>>,
    /// Receivers from every peer, indexed by peer rank.
    rx: Vec<Option<Receiver<Bytes>>>,
    timeout: Duration,
}

impl LocalTransport {
    /// Builds a fully-connected cluster of `n` ranks. Hand one element to
    /// each rank driver.
    pub fn cluster(n: u32, timeout: Duration) -> Vec<LocalTransport> {
        // channels[i][j]: i -> j
        let mut senders: Vec<Vec<Option<Sender<Bytes>>>> = (0..n)
            .map(|_| (0..n).map(|_| None).collect())
            .collect();
        let mut receivers: Vec<Vec<Option<Receiver<Bytes>>>> = (0..n)
            .map(|_| (0..n).map(|_| None).collect())
            .collect();
        for i in 0..n as usize {
            for j in 0..n as usize {
                if i == j {
                    continue;
                }
                let (tx, rx) = unbounded();
                senders[i][j] = Some(tx);
                receivers[j][i] = Some(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (tx, rx))| LocalTransport {
                rank: rank as u32,
                ranks: n,
                tx,
                rx,
                timeout,
            })
            .collect()
    }

    fn send_all(&self, mut outbound: Vec<(u32, Bytes)>) -> Result<(), SimError> {
        outbound.sort_by_key(|(dst, _)| *dst);
        for peer in 0..self.ranks {
            if peer == self.rank {
                continue;
            }
            let block = outbound
                .iter()
                .find(|(dst, _)| *dst == peer)
                .map(|(_, b)| b.clone())
                .unwrap_or_else(Bytes::new);
            self.tx[peer as usize]
                .as_ref()
                .expect("peer channel")
                .send(block)
                .map_err(|_| SimError::Transport(format!("peer rank {peer} hung up")))?;
        }
        Ok(())
    }

    fn recv_all(&self) -> Result<Vec<(u32, Bytes)>, SimError> {
        let mut inbound = Vec::with_capacity(self.ranks as usize - 1);
        for peer in 0..self.ranks {
            if peer == self.rank {
                continue;
            }
            let block = self.rx[peer as usize]
                .as_ref()
                .expect("peer channel")
                .recv_timeout(self.timeout)
                .map_err(|_| SimError::BarrierTimeout(self.timeout.as_millis() as u64))?;
            inbound.push((peer, block));
        }
        Ok(inbound)
    }

    fn allreduce_u64(
        &self,
        value: u64,
        fold: fn(u64, u64) -> u64,
    ) -> Result<u64, SimError> {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u64(value);
        let block = buf.freeze();
        let outbound = (0..self.ranks)
            .filter(|r| *r != self.rank)
            .map(|r| (r, block.clone()))
            .collect();
        let mut acc = value;
        for (_, mut b) in self.exchange(outbound)? {
            if b.remaining() < 8 {
                return Err(SimError::Transport("short allreduce block".to_string()));
            }
            acc = fold(acc, b.get_u64());
        }
        Ok(acc)
    }
}

impl Transport for LocalTransport {
    fn my_rank(&self) -> u32 {
        self.rank
    }

    fn num_ranks(&self) -> u32 {
        self.ranks
    }

    fn exchange(&self, outbound: Vec<(u32, Bytes)>) -> Result<Vec<(u32, Bytes)>, SimError> {
        self.send_all(outbound)?;
        self.recv_all()
    }

    fn allreduce_or(&self, flags: [u32; 3]) -> Result<[u32; 3], SimError> {
        let mut buf = BytesMut::with_capacity(12);
        for f in flags {
            buf.put_u32(f);
        }
        let block = buf.freeze();
        let outbound = (0..self.ranks)
            .filter(|r| *r != self.rank)
            .map(|r| (r, block.clone()))
            .collect();
        let mut acc = flags;
        for (_, mut b) in self.exchange(outbound)? {
            if b.remaining() < 12 {
                return Err(SimError::Transport("short signals block".to_string()));
            }
            for slot in acc.iter_mut() {
                // The usr slot carries 0/1/2; keep the maximum rather than a
                // bitwise or so USR2 survives the merge.
                *slot = (*slot).max(b.get_u32());
            }
        }
        Ok(acc)
    }

    fn allreduce_sum(&self, value: u64) -> Result<u64, SimError> {
        self.allreduce_u64(value, |a, b| a + b)
    }

    fn allreduce_max(&self, value: u64) -> Result<u64, SimError> {
        self.allreduce_u64(value, |a, b| a.max(b))
    }
}

/// Convenience for tests: a cluster with a generous default timeout.
pub fn local_cluster(n: u32) -> Vec<Arc<dyn Transport>> {
    LocalTransport::cluster(n, Duration::from_secs(30))
        .into_iter()
        .map(|t| Arc::new(t) as Arc<dyn Transport>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_rank_exchange_and_reductions() {
        let mut cluster = LocalTransport::cluster(2, Duration::from_secs(5));
        let t1 = cluster.pop().unwrap();
        let t0 = cluster.pop().unwrap();

        let h0 = std::thread::spawn(move || {
            let got = t0
                .exchange(vec![(1, Bytes::from_static(b"from0"))])
                .unwrap();
            assert_eq!(got, vec![(1, Bytes::from_static(b"from1"))]);
            assert_eq!(t0.allreduce_sum(3).unwrap(), 10);
            assert_eq!(t0.allreduce_max(3).unwrap(), 7);
            assert_eq!(t0.allreduce_or([1, 0, 0]).unwrap(), [1, 2, 0]);
        });
        let h1 = std::thread::spawn(move || {
            let got = t1
                .exchange(vec![(0, Bytes::from_static(b"from1"))])
                .unwrap();
            assert_eq!(got, vec![(0, Bytes::from_static(b"from0"))]);
            assert_eq!(t1.allreduce_sum(7).unwrap(), 10);
            assert_eq!(t1.allreduce_max(7).unwrap(), 7);
            assert_eq!(t1.allreduce_or([0, 2, 0]).unwrap(), [1, 2, 0]);
        });
        h0.join().unwrap();
        h1.join().unwrap();
    }
}
