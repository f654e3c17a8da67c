//! Log transactions and the bounded queue holding them until delivery.

use std::collections::VecDeque;

/// Default number of transactions buffered while awaiting delivery.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;

/// Delivery progress of a queued transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnPhase {
    /// `openTransaction` has not been acknowledged yet.
    NotOpened,
    /// The Router acknowledged the open; lines and close are next.
    Opened,
}

/// One unit of log data bound for the Router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogTransaction {
    /// Microseconds since the Unix epoch at creation.
    pub timestamp: u64,
    pub category: String,
    /// Empty until supplied by the producer or assigned by the Router.
    pub txn_id: String,
    pub lines: Vec<Vec<u8>>,
    pub phase: TxnPhase,
}

impl LogTransaction {
    pub fn new(
        timestamp: u64,
        category: impl Into<String>,
        lines: Vec<Vec<u8>>,
        txn_id: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            category: category.into(),
            txn_id: txn_id.unwrap_or_default(),
            lines,
            phase: TxnPhase::NotOpened,
        }
    }
}

/// FIFO of transactions with a fixed capacity.
///
/// When full, new arrivals are rejected; queued entries are never evicted.
#[derive(Debug)]
pub struct TransactionQueue {
    items: VecDeque<LogTransaction>,
    capacity: usize,
}

impl TransactionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append `txn` at the tail, handing it back when the queue is full.
    pub fn push(&mut self, txn: LogTransaction) -> Result<(), LogTransaction> {
        if self.is_full() {
            return Err(txn);
        }
        self.items.push_back(txn);
        Ok(())
    }

    pub fn head(&self) -> Option<&LogTransaction> {
        self.items.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut LogTransaction> {
        self.items.front_mut()
    }

    pub fn pop_head(&mut self) -> Option<LogTransaction> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogTransaction> {
        self.items.iter()
    }
}

impl Default for TransactionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    fn txn(id: &str) -> LogTransaction {
        LogTransaction::new(1, "requests", vec![b"line".to_vec()], Some(id.to_owned()))
    }

    #[fixture]
    fn full_queue() -> TransactionQueue {
        let mut queue = TransactionQueue::default();
        for idx in 0..DEFAULT_QUEUE_CAPACITY {
            queue.push(txn(&idx.to_string())).expect("room available");
        }
        queue
    }

    #[rstest]
    fn new_transactions_start_unopened() {
        let fresh = LogTransaction::new(7, "exceptions", Vec::new(), None);
        assert_eq!(fresh.phase, TxnPhase::NotOpened);
        assert!(fresh.txn_id.is_empty());
    }

    #[rstest]
    fn overflow_drops_newest_and_keeps_contents(mut full_queue: TransactionQueue) {
        let before: Vec<_> = full_queue.iter().map(|t| t.txn_id.clone()).collect();
        let rejected = full_queue
            .push(txn("overflow"))
            .expect_err("queue is at capacity");
        assert_eq!(rejected.txn_id, "overflow");
        assert_eq!(full_queue.len(), full_queue.capacity());
        let after: Vec<_> = full_queue.iter().map(|t| t.txn_id.clone()).collect();
        assert_eq!(before, after);
    }

    #[rstest]
    fn pops_in_fifo_order() {
        let mut queue = TransactionQueue::new(3);
        for id in ["a", "b", "c"] {
            queue.push(txn(id)).expect("room available");
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_head())
            .map(|t| t.txn_id)
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    proptest! {
        #[test]
        fn admitted_count_is_bounded_by_capacity(
            capacity in 1usize..64,
            attempts in 0usize..200,
        ) {
            let mut queue = TransactionQueue::new(capacity);
            let admitted = (0..attempts)
                .filter(|idx| queue.push(txn(&idx.to_string())).is_ok())
                .count();
            prop_assert_eq!(admitted, attempts.min(capacity));
            let ids: Vec<_> = queue.iter().map(|t| t.txn_id.clone()).collect();
            let expected: Vec<_> = (0..admitted).map(|idx| idx.to_string()).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
