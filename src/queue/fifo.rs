use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::Taken;

/// Strict bounded FIFO with a cooperative one-shot interrupt: `interrupt`
/// injects a single sentinel that the next blocked `take` observes instead of
/// an item, after which the queue works normally again.
///
/// `put` blocks while the queue is full - used for keep-alive scheduling,
/// where backpressure on the ticker is exactly what we want.
pub struct FifoQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    notify: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    interrupted: bool,
}

impl<T> FifoQueue<T> {
    pub fn new(capacity: usize) -> FifoQueue<T> {
        FifoQueue {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::new(),
                interrupted: false,
            }),
            notify: Notify::new(),
        }
    }

    pub async fn put(&self, value: T) {
        let mut value = Some(value);
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                if state.items.len() < self.capacity {
                    if let Some(value) = value.take() {
                        state.items.push_back(value);
                        self.notify.notify_waiters();
                        return;
                    }
                }
            }
            notified.await;
        }
    }

    /// The interrupt sentinel takes precedence over queued items.
    pub async fn take(&self) -> Taken<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                if state.interrupted {
                    state.interrupted = false;
                    return Taken::Interrupted;
                }
                if let Some(value) = state.items.pop_front() {
                    self.notify.notify_waiters();
                    return Taken::Value(value);
                }
            }
            notified.await;
        }
    }

    pub fn interrupt(&self) {
        self.state.lock().unwrap().interrupted = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
