use std::sync::{Mutex, PoisonError};

use chrono::Utc;

/// 2010-11-04T01:42:54.657Z, the customary snowflake epoch.
const EPOCH_MS: u64 = 1_288_834_974_657;
const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;

/// Generates unique, roughly time-ordered 63-bit ids.
#[derive(Debug)]
pub struct Snowflake {
    node: u64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_ms: u64,
    sequence: u64,
}

impl Snowflake {
    pub fn new(node: u64) -> Self {
        Self {
            node: node & NODE_MASK,
            state: Mutex::new(State::default()),
        }
    }

    /// A generator with a random node id.
    pub fn random() -> Self {
        Self::new(rand::random::<u64>())
    }

    pub fn next_id(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis())
            .unwrap_or_default()
            .saturating_sub(EPOCH_MS);
        self.next_at(now)
    }

    fn next_at(&self, now_ms: u64) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Never step backwards, even if the wall clock does.
        let mut ms = now_ms.max(state.last_ms);
        if ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                ms += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = ms;
        (ms << (NODE_BITS + SEQUENCE_BITS)) | (self.node << SEQUENCE_BITS) | state.sequence
    }
}
