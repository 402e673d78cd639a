//! Pending remote-driven updates
//!
//! One slot per binding: a second write to the same binding before the next
//! drain replaces the first. Writes carry the store's commit sequence, so a
//! delivery that lost a race to a newer commit is dropped even after the
//! newer value has been drained. The lock is only held to insert or to swap
//! the pending map out.

use crate::models::WireValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;

/// Position of a binding in its engine, in discovery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub usize);

/// Queued, not yet applied update for one binding
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub binding: BindingId,
    pub raw: WireValue,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: HashMap<BindingId, WireValue>,
    /// Newest commit sequence seen per binding, kept across drains
    newest: HashMap<BindingId, u64>,
}

/// Thread-safe last-write-wins buffer between listeners and the apply cycle
#[derive(Debug, Default)]
pub struct ChangeQueue {
    state: Mutex<QueueState>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the remote value committed at `sequence` for `binding`,
    /// replacing any queued one.
    ///
    /// Returns `false` and keeps the queue unchanged when a later commit for
    /// the binding has already been seen.
    pub fn push(&self, binding: BindingId, sequence: u64, raw: WireValue) -> bool {
        let mut state = self.state.lock();
        match state.newest.get(&binding) {
            Some(&newest) if sequence < newest => return false,
            _ => {}
        }
        state.newest.insert(binding, sequence);
        state.pending.insert(binding, raw);
        true
    }

    /// Take everything queued so far, leaving the queue empty.
    ///
    /// Updates come back in binding order.
    pub fn take_all(&self) -> Vec<PendingUpdate> {
        let taken = mem::take(&mut self.state.lock().pending);

        let mut updates: Vec<PendingUpdate> = taken
            .into_iter()
            .map(|(binding, raw)| PendingUpdate { binding, raw })
            .collect();
        updates.sort_by_key(|u| u.binding);
        updates
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_replaces_pending_value() {
        let queue = ChangeQueue::new();
        queue.push(BindingId(0), 1, WireValue::Double(1.0));
        queue.push(BindingId(0), 2, WireValue::Double(2.0));

        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.take_all(),
            vec![PendingUpdate {
                binding: BindingId(0),
                raw: WireValue::Double(2.0),
            }]
        );
    }

    #[test]
    fn test_take_all_empties_queue() {
        let queue = ChangeQueue::new();
        queue.push(BindingId(2), 1, WireValue::Boolean(true));
        queue.push(BindingId(1), 2, WireValue::Double(3.0));

        let taken = queue.take_all();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].binding, BindingId(1));
        assert!(queue.is_empty());
        assert!(queue.take_all().is_empty());
    }

    #[test]
    fn test_older_commit_does_not_replace_newer() {
        let queue = ChangeQueue::new();
        assert!(queue.push(BindingId(0), 8, WireValue::Double(9.0)));
        assert!(!queue.push(BindingId(0), 7, WireValue::Double(5.0)));

        let taken = queue.take_all();
        assert_eq!(taken[0].raw, WireValue::Double(9.0));

        // Still stale after the newer value was drained
        assert!(!queue.push(BindingId(0), 7, WireValue::Double(5.0)));
        assert!(queue.is_empty());

        // Other bindings keep their own order
        assert!(queue.push(BindingId(1), 1, WireValue::Double(1.0)));
    }

    #[test]
    fn test_equal_sequence_replaces() {
        let queue = ChangeQueue::new();
        queue.push(BindingId(0), 0, WireValue::Double(1.0));
        queue.push(BindingId(0), 0, WireValue::Double(2.0));

        assert_eq!(queue.take_all()[0].raw, WireValue::Double(2.0));
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(ChangeQueue::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for n in 0..100 {
                        queue.push(BindingId(i), n, WireValue::Double(n as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let taken = queue.take_all();
        assert_eq!(taken.len(), 8);
        assert!(taken.iter().all(|u| u.raw == WireValue::Double(99.0)));
    }
}
