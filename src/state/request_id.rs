use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::format_seq_hex;

/// Per-process id source: a random seed mixed with a monotonic sequence.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

/// Ids attached to one request.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub seq: u64,
    /// `chatcmpl-...` id reported to the client.
    pub completion_id: String,
    /// Conversation id sent upstream.
    pub chat_id: uuid::Uuid,
    /// Message id sent upstream.
    pub message_id: uuid::Uuid,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_ids(&self) -> RequestIds {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let base = self.seed ^ u128::from(seq);
        RequestIds {
            seq,
            completion_id: format_seq_hex("chatcmpl-", (self.seed as u64) ^ seq),
            chat_id: uuid::Uuid::from_u128(base),
            message_id: uuid::Uuid::from_u128(base.rotate_left(64)),
        }
    }
}
