//! Single-slot hand-off between threads.
//!
//! A producer never blocks: when the slot is occupied the stale value is
//! evicted and counted, so the consumer always sees the newest value and a
//! backlog cannot build up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

/// Create a capacity-1 drop-oldest channel.
pub fn latest<T>() -> (LatestSender<T>, Receiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let sender = LatestSender {
        tx,
        evict: rx.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

pub struct LatestSender<T> {
    tx: Sender<T>,
    // Producer-side handle used to evict the stale value.
    evict: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> LatestSender<T> {
    /// Push a value, replacing any value the consumer has not taken yet.
    pub fn send(&self, mut value: T) {
        loop {
            match self.tx.try_send(value) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(v)) => {
                    value = v;
                    match self.evict.try_recv() {
                        Ok(_stale) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        // Consumer won the race; the slot is free now.
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return,
                    }
                }
            }
        }
    }

    /// Number of values evicted before the consumer saw them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared handle to the eviction counter.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}
