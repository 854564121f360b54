//! Chunked datagram transport.
//!
//! Payloads larger than one datagram are split into chunks that carry a
//! transfer id, the chunk count and their own index. The receiver
//! reassembles per transfer and forgets transfers that stall.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Largest payload carried by a single chunk.
pub const MAX_CHUNK_PAYLOAD: usize = 1024;
/// Big-endian `transfer_id`, `total`, `index`.
pub const CHUNK_HEADER_LEN: usize = 12;
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("datagram too short for chunk header: {0} bytes")]
    ShortHeader(usize),
    #[error("chunk declares zero total")]
    ZeroTotal,
    #[error("chunk index {index} out of range for total {total}")]
    IndexOutOfRange { index: u32, total: u32 },
    #[error("chunk payload of {0} bytes exceeds the limit")]
    Oversized(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub transfer_id: u32,
    pub total: u32,
    pub index: u32,
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CHUNK_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.transfer_id.to_be_bytes());
        out.extend_from_slice(&self.total.to_be_bytes());
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, ChunkError> {
        if datagram.len() < CHUNK_HEADER_LEN {
            return Err(ChunkError::ShortHeader(datagram.len()));
        }
        let word = |at: usize| {
            u32::from_be_bytes([
                datagram[at],
                datagram[at + 1],
                datagram[at + 2],
                datagram[at + 3],
            ])
        };
        let (transfer_id, total, index) = (word(0), word(4), word(8));
        let payload = &datagram[CHUNK_HEADER_LEN..];

        if total == 0 {
            return Err(ChunkError::ZeroTotal);
        }
        if index >= total {
            return Err(ChunkError::IndexOutOfRange { index, total });
        }
        if payload.len() > MAX_CHUNK_PAYLOAD {
            return Err(ChunkError::Oversized(payload.len()));
        }

        Ok(Self {
            transfer_id,
            total,
            index,
            payload: payload.to_vec(),
        })
    }
}

/// Split `payload` into chunks of at most [`MAX_CHUNK_PAYLOAD`] bytes.
/// An empty payload still produces one (empty) chunk.
pub fn fragment(transfer_id: u32, payload: &[u8]) -> Vec<Chunk> {
    if payload.is_empty() {
        return vec![Chunk {
            transfer_id,
            total: 1,
            index: 0,
            payload: Vec::new(),
        }];
    }

    let total = payload.len().div_ceil(MAX_CHUNK_PAYLOAD) as u32;
    payload
        .chunks(MAX_CHUNK_PAYLOAD)
        .enumerate()
        .map(|(index, part)| Chunk {
            transfer_id,
            total,
            index: index as u32,
            payload: part.to_vec(),
        })
        .collect()
}

/// Fresh sender-side transfer id.
pub fn next_transfer_id() -> u32 {
    rand::random()
}

#[derive(Debug)]
struct Session {
    total: u32,
    parts: HashMap<u32, Vec<u8>>,
    last_seen: Instant,
}

impl Session {
    fn new(total: u32, now: Instant) -> Self {
        Self {
            total,
            parts: HashMap::new(),
            last_seen: now,
        }
    }

    fn is_complete(&self) -> bool {
        self.parts.len() as u32 == self.total
    }

    fn assemble(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        for index in 0..self.total {
            if let Some(part) = self.parts.remove(&index) {
                out.extend_from_slice(&part);
            }
        }
        out
    }
}

/// Receiver-side reassembly keyed by transfer id.
///
/// Owned by a single receive task; not shared.
#[derive(Debug)]
pub struct Reassembler {
    timeout: Duration,
    sessions: HashMap<u32, Session>,
    completed: HashMap<u32, Instant>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFER_TIMEOUT)
    }
}

impl Reassembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    /// Number of transfers currently in progress.
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }

    pub fn ingest(&mut self, chunk: Chunk) -> Option<Vec<u8>> {
        self.ingest_at(chunk, Instant::now())
    }

    /// Fold one chunk in, returning the payload when its transfer completes.
    pub fn ingest_at(&mut self, chunk: Chunk, now: Instant) -> Option<Vec<u8>> {
        self.sweep(now);

        if self.completed.contains_key(&chunk.transfer_id) {
            tracing::trace!(transfer_id = chunk.transfer_id, "Chunk for finished transfer ignored");
            return None;
        }

        let session = self
            .sessions
            .entry(chunk.transfer_id)
            .or_insert_with(|| Session::new(chunk.total, now));
        if session.total != chunk.total {
            tracing::warn!(
                transfer_id = chunk.transfer_id,
                expected = session.total,
                got = chunk.total,
                "Transfer total changed, restarting session"
            );
            *session = Session::new(chunk.total, now);
        }
        session.last_seen = now;
        session.parts.insert(chunk.index, chunk.payload);

        if !session.is_complete() {
            return None;
        }

        let session = self.sessions.remove(&chunk.transfer_id)?;
        self.completed.insert(chunk.transfer_id, now);
        Some(session.assemble())
    }

    fn sweep(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.sessions.retain(|id, session| {
            let alive = now.saturating_duration_since(session.last_seen) <= timeout;
            if !alive {
                tracing::debug!(
                    transfer_id = *id,
                    received = session.parts.len(),
                    total = session.total,
                    "Dropping stalled transfer"
                );
            }
            alive
        });
        self.completed
            .retain(|_, done| now.saturating_duration_since(*done) <= timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn chunk_header_is_big_endian() {
        let chunk = Chunk {
            transfer_id: 0x0102_0304,
            total: 2,
            index: 1,
            payload: vec![9],
        };
        let bytes = chunk.encode();
        assert_eq!(&bytes[..12], &[1, 2, 3, 4, 0, 0, 0, 2, 0, 0, 0, 1]);
        assert_eq!(Chunk::decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn decode_rejects_malformed_headers() {
        assert_eq!(Chunk::decode(&[0; 5]), Err(ChunkError::ShortHeader(5)));
        assert_eq!(Chunk::decode(&[0; 12]), Err(ChunkError::ZeroTotal));

        let bad_index = Chunk {
            transfer_id: 1,
            total: 2,
            index: 2,
            payload: Vec::new(),
        };
        assert_eq!(
            Chunk::decode(&bad_index.encode()),
            Err(ChunkError::IndexOutOfRange { index: 2, total: 2 })
        );

        let mut big = Chunk {
            transfer_id: 1,
            total: 1,
            index: 0,
            payload: Vec::new(),
        }
        .encode();
        big.extend(payload(MAX_CHUNK_PAYLOAD + 1));
        assert!(matches!(Chunk::decode(&big), Err(ChunkError::Oversized(_))));
    }

    #[test]
    fn fragment_sizes() {
        assert_eq!(fragment(1, &[]).len(), 1);
        assert_eq!(fragment(1, &payload(MAX_CHUNK_PAYLOAD)).len(), 1);
        let chunks = fragment(1, &payload(MAX_CHUNK_PAYLOAD * 2 + 1));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.total == 3));
        assert_eq!(chunks[2].payload.len(), 1);
    }

    #[test]
    fn reassembles_in_any_order_exactly_once() {
        let data = payload(3000);
        let mut chunks = fragment(7, &data);
        chunks.reverse();
        chunks.insert(1, chunks[0].clone());

        let mut rx = Reassembler::default();
        let mut results = Vec::new();
        for chunk in chunks.iter().cloned() {
            if let Some(out) = rx.ingest(chunk) {
                results.push(out);
            }
        }
        // Late duplicates after completion are swallowed.
        for chunk in chunks {
            assert!(rx.ingest(chunk).is_none());
        }

        assert_eq!(results, vec![data]);
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn every_arrival_order_yields_the_payload_once() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let data = payload(MAX_CHUNK_PAYLOAD * 4 + 100);
        let mut orders: Vec<Vec<usize>> = (0..5)
            .map(|r| (0..5).map(|i| (i + r) % 5).collect())
            .collect();
        orders.push(vec![4, 3, 2, 1, 0]);
        orders.push(vec![2, 0, 4, 1, 3]);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            let mut order: Vec<usize> = (0..5).collect();
            order.shuffle(&mut rng);
            orders.push(order);
        }

        let mut rx = Reassembler::default();
        for (n, order) in orders.iter().enumerate() {
            let chunks = fragment(100 + n as u32, &data);
            assert_eq!(chunks.len(), 5);

            let mut results = Vec::new();
            for &i in order {
                // Each chunk arrives twice.
                for _ in 0..2 {
                    if let Some(out) = rx.ingest(chunks[i].clone()) {
                        results.push(out);
                    }
                }
            }
            assert_eq!(results, vec![data.clone()], "order {order:?}");
            assert_eq!(rx.pending(), 0, "order {order:?}");
        }
    }

    #[test]
    fn empty_payload_completes_immediately() {
        let mut rx = Reassembler::default();
        let chunk = fragment(3, &[]).remove(0);
        assert_eq!(rx.ingest(chunk), Some(Vec::new()));
    }

    #[test]
    fn stalled_transfers_are_evicted() {
        let start = Instant::now();
        let mut rx = Reassembler::new(Duration::from_secs(10));
        let mut chunks = fragment(5, &payload(2048));

        assert!(rx.ingest_at(chunks.remove(0), start).is_none());
        assert_eq!(rx.pending(), 1);

        // Any later ingest sweeps the stale session first.
        let other = fragment(6, &payload(2048)).remove(0);
        assert!(rx.ingest_at(other, start + Duration::from_secs(11)).is_none());
        assert_eq!(rx.pending(), 1);

        // The surviving half of transfer 5 starts a fresh, incomplete session.
        assert!(rx
            .ingest_at(chunks.remove(0), start + Duration::from_secs(12))
            .is_none());
        assert_eq!(rx.pending(), 2);
    }

    #[test]
    fn total_mismatch_restarts_session() {
        let mut rx = Reassembler::default();
        let old = fragment(9, &payload(3000));
        let new = fragment(9, &payload(100));

        assert!(rx.ingest(old[0].clone()).is_none());
        assert_eq!(rx.ingest(new[0].clone()), Some(payload(100)));
    }
}
