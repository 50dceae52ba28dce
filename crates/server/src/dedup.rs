//! In-memory deduplication ring for pushed records.
//!
//! Keys are content hashes of `(source identity, timestamp, message
//! prefix)`. Entries expire after the configured window. Process-local
//! and best-effort: a restart forgets the ring, which the contract
//! allows.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

pub struct DedupRing {
    window: Duration,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<String>,
    order: VecDeque<(Instant, String)>,
}

impl DedupRing {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window: Duration::from_secs(window_seconds),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Content key for one pushed record.
    pub fn record_key(source_identity: &str, timestamp: &str, message: &str) -> String {
        let prefix: String = message.chars().take(200).collect();
        let digest = Sha256::digest(format!("{source_identity}|{timestamp}|{prefix}").as_bytes());
        hex::encode(&digest[..16])
    }

    /// Returns `true` when the key is new inside the window, recording it;
    /// `false` for a duplicate.
    pub fn insert(&self, key: String) -> bool {
        self.insert_at(key, Instant::now())
    }

    fn insert_at(&self, key: String, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        while let Some((seen_at, _)) = inner.order.front() {
            if now.duration_since(*seen_at) < self.window {
                break;
            }
            let (_, expired) = inner.order.pop_front().expect("front checked");
            inner.seen.remove(&expired);
        }

        if inner.seen.contains(&key) {
            return false;
        }
        inner.seen.insert(key.clone());
        inner.order.push_back((now, key));
        true
    }
}
