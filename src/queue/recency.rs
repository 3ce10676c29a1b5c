use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::Taken;

/// Bounded queue that favors recency over completeness: `put` never blocks,
/// and when the queue is over capacity it silently evicts the oldest
/// unconsumed entry. `take` hands out the oldest entry as a scoped borrow -
/// the entry keeps counting against capacity until the borrow is released,
/// but eviction may forget its bookkeeping key early, which is safe because
/// the borrower already owns the payload.
///
/// An entry taken out is gone once its borrow ends, whether or not the
/// consumer succeeded with it: telemetry favors forwarding the newest
/// available item over retrying a stale one.
pub struct RecencyQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    notify: Notify,
}

struct State<T> {
    /// ordinal -> slot; `None` marks an entry checked out by a consumer that
    /// still occupies capacity until released
    entries: BTreeMap<u64, Option<T>>,
    next_ordinal: u64,
    interrupted: bool,
}

impl<T> RecencyQueue<T> {
    pub fn new(capacity: usize) -> RecencyQueue<T> {
        RecencyQueue {
            capacity,
            state: Mutex::new(State {
                entries: BTreeMap::new(),
                next_ordinal: 0,
                interrupted: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn put(&self, value: T) {
        {
            let mut state = self.state.lock().unwrap();
            let ordinal = state.next_ordinal;
            state.next_ordinal = state.next_ordinal.wrapping_add(1);
            state.entries.insert(ordinal, Some(value));
            while state.entries.len() > self.capacity {
                state.entries.pop_first();
            }
        }
        self.notify.notify_waiters();
    }

    pub async fn take(&self) -> Taken<RecencyEntry<'_, T>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                if state.interrupted {
                    state.interrupted = false;
                    return Taken::Interrupted;
                }
                let oldest = state.entries.iter()
                    .find(|(_, slot)| slot.is_some())
                    .map(|(ordinal, _)| *ordinal);
                if let Some(ordinal) = oldest {
                    if let Some(value) = state.entries.get_mut(&ordinal).and_then(Option::take) {
                        return Taken::Value(RecencyEntry {
                            queue: self,
                            ordinal,
                            value,
                        });
                    }
                }
            }
            notified.await;
        }
    }

    pub fn interrupt(&self) {
        self.state.lock().unwrap().interrupted = true;
        self.notify.notify_waiters();
    }

    /// Entries not yet fully released, checked-out ones included.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, ordinal: u64) {
        // no-op if eviction already dropped the bookkeeping key
        self.state.lock().unwrap().entries.remove(&ordinal);
    }
}

/// Scoped borrow of the queue's oldest entry. The payload is owned by the
/// borrower; dropping the guard releases the entry's capacity slot on every
/// exit path, success or failure.
pub struct RecencyEntry<'a, T> {
    queue: &'a RecencyQueue<T>,
    ordinal: u64,
    value: T,
}

impl<'a, T> RecencyEntry<'a, T> {
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<'a, T> Drop for RecencyEntry<'a, T> {
    fn drop(&mut self) {
        self.queue.release(self.ordinal);
    }
}
